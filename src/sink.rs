use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::notify::NotificationDispatcher;
use crate::prayer::model::Prayer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub prayer_name: Prayer,
    pub prayer_time: String,
    pub azan_sound: String,
    pub azan_sound_enabled: bool,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("deferred work sink is shut down")]
    ShutDown,
    #[error("unable to persist sink journal {}: {source}", path.display())]
    Journal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sink journal {} is corrupt: {source}", path.display())]
    CorruptJournal {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub trait DeferredWorkSink: Send + Sync {
    fn submit(&self, delay: Duration, payload: NotificationPayload)
    -> Result<TaskHandle, SinkError>;
    fn cancel(&self, handle: TaskHandle) -> bool;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct QueueEntry {
    handle: u64,
    due_unix_ms: i64,
    payload: NotificationPayload,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JournalFile {
    #[serde(default)]
    next_handle: u64,
    #[serde(default)]
    pending: Vec<QueueEntry>,
}

struct SinkState {
    next_handle: u64,
    pending: Vec<QueueEntry>,
    shutdown: bool,
}

struct SinkShared {
    state: Mutex<SinkState>,
    wake: Condvar,
    dispatcher: Arc<dyn NotificationDispatcher>,
    journal: Option<PathBuf>,
}

pub struct ThreadSink {
    shared: Arc<SinkShared>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ThreadSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadSink").finish_non_exhaustive()
    }
}

impl ThreadSink {
    pub fn start(
        dispatcher: Arc<dyn NotificationDispatcher>,
        journal: Option<PathBuf>,
    ) -> Result<Self, SinkError> {
        let restored = match &journal {
            Some(path) if path.exists() => load_journal(path)?,
            _ => JournalFile::default(),
        };
        if !restored.pending.is_empty() {
            debug!(
                pending = restored.pending.len(),
                "restored pending notifications from journal"
            );
        }

        let shared = Arc::new(SinkShared {
            state: Mutex::new(SinkState {
                next_handle: restored.next_handle,
                pending: restored.pending,
                shutdown: false,
            }),
            wake: Condvar::new(),
            dispatcher,
            journal,
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::spawn(move || run_worker(&worker_shared));

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    pub fn pending(&self) -> usize {
        match self.shared.state.lock() {
            Ok(state) => state.pending.len(),
            Err(_) => 0,
        }
    }
}

impl DeferredWorkSink for ThreadSink {
    fn submit(
        &self,
        delay: Duration,
        payload: NotificationPayload,
    ) -> Result<TaskHandle, SinkError> {
        let mut state = match self.shared.state.lock() {
            Ok(state) => state,
            Err(_) => return Err(SinkError::ShutDown),
        };
        if state.shutdown {
            return Err(SinkError::ShutDown);
        }

        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        let due_unix_ms = unix_now_ms().saturating_add(delay_ms);
        let handle = state.next_handle;
        state.next_handle += 1;
        state.pending.push(QueueEntry {
            handle,
            due_unix_ms,
            payload,
        });

        if let Err(err) = persist(&self.shared, &state) {
            // A submission that cannot be made durable is dropped, not half-kept.
            state.pending.pop();
            return Err(err);
        }

        self.shared.wake.notify_all();
        Ok(TaskHandle(handle))
    }

    fn cancel(&self, handle: TaskHandle) -> bool {
        let mut state = match self.shared.state.lock() {
            Ok(state) => state,
            Err(_) => return false,
        };
        let before = state.pending.len();
        state.pending.retain(|entry| entry.handle != handle.0);
        let removed = state.pending.len() != before;
        if removed {
            if let Err(err) = persist(&self.shared, &state) {
                warn!(error = %err, "failed to persist journal after cancel");
            }
            self.shared.wake.notify_all();
        }
        removed
    }
}

impl Drop for ThreadSink {
    fn drop(&mut self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.shutdown = true;
        }
        self.shared.wake.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_worker(shared: &SinkShared) {
    let mut state = match shared.state.lock() {
        Ok(state) => state,
        Err(_) => return,
    };

    loop {
        if state.shutdown {
            return;
        }

        let now_ms = unix_now_ms();
        let next = state
            .pending
            .iter()
            .enumerate()
            .min_by_key(|(_, entry)| entry.due_unix_ms)
            .map(|(index, entry)| (index, entry.due_unix_ms));

        match next {
            None => {
                state = match shared.wake.wait(state) {
                    Ok(state) => state,
                    Err(_) => return,
                };
            }
            Some((index, due_ms)) if due_ms <= now_ms => {
                let entry = state.pending.remove(index);
                if let Err(err) = persist(shared, &state) {
                    warn!(error = %err, "failed to persist journal after firing");
                }
                drop(state);

                debug!(handle = entry.handle, prayer = %entry.payload.prayer_name, "firing notification");
                let outcome = shared.dispatcher.dispatch(&entry.payload);
                debug!(
                    shown = outcome.shown,
                    audio_played = outcome.audio_played,
                    "notification dispatched"
                );
                if outcome.retry_audio {
                    warn!(prayer = %entry.payload.prayer_name, "dispatcher requested audio-only retry");
                }

                state = match shared.state.lock() {
                    Ok(state) => state,
                    Err(_) => return,
                };
            }
            Some((_, due_ms)) => {
                let wait_ms = u64::try_from(due_ms - now_ms).unwrap_or(0);
                let (guard, _timed_out) = match shared
                    .wake
                    .wait_timeout(state, Duration::from_millis(wait_ms))
                {
                    Ok(pair) => pair,
                    Err(_) => return,
                };
                state = guard;
            }
        }
    }
}

fn persist(shared: &SinkShared, state: &MutexGuard<'_, SinkState>) -> Result<(), SinkError> {
    let Some(path) = &shared.journal else {
        return Ok(());
    };

    #[derive(Serialize)]
    struct JournalView<'a> {
        next_handle: u64,
        pending: &'a [QueueEntry],
    }

    let view = JournalView {
        next_handle: state.next_handle,
        pending: &state.pending,
    };
    let text = serde_json::to_string_pretty(&view).map_err(|err| SinkError::Journal {
        path: path.clone(),
        source: std::io::Error::other(err),
    })?;
    fs::write(path, format!("{text}\n")).map_err(|err| SinkError::Journal {
        path: path.clone(),
        source: err,
    })
}

fn load_journal(path: &Path) -> Result<JournalFile, SinkError> {
    let content = fs::read_to_string(path).map_err(|err| SinkError::Journal {
        path: path.to_path_buf(),
        source: err,
    })?;
    serde_json::from_str(&content).map_err(|err| SinkError::CorruptJournal {
        path: path.to_path_buf(),
        source: err,
    })
}

fn unix_now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Mutex;

    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::notify::DispatchOutcome;

    struct RecordingDispatcher {
        fired: Mutex<Vec<NotificationPayload>>,
    }

    impl RecordingDispatcher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                fired: Mutex::new(Vec::new()),
            })
        }

        fn fired(&self) -> Vec<NotificationPayload> {
            self.fired.lock().expect("fired lock").clone()
        }
    }

    impl NotificationDispatcher for RecordingDispatcher {
        fn dispatch(&self, payload: &NotificationPayload) -> DispatchOutcome {
            self.fired.lock().expect("fired lock").push(payload.clone());
            DispatchOutcome {
                shown: true,
                audio_played: false,
                retry_audio: false,
            }
        }
    }

    fn payload(prayer: Prayer, time: &str) -> NotificationPayload {
        NotificationPayload {
            prayer_name: prayer,
            prayer_time: time.to_string(),
            azan_sound: "azan_fajr.mp3".to_string(),
            azan_sound_enabled: false,
        }
    }

    #[test]
    fn fires_submitted_payload_once() {
        let dispatcher = RecordingDispatcher::new();
        let sink = ThreadSink::start(dispatcher.clone(), None).expect("start sink");

        sink.submit(Duration::from_millis(10), payload(Prayer::Fajr, "05:12:00"))
            .expect("submit");
        thread::sleep(Duration::from_millis(150));

        let fired = dispatcher.fired();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].prayer_name, Prayer::Fajr);
        assert_eq!(sink.pending(), 0);
    }

    #[test]
    fn fires_in_due_order() {
        let dispatcher = RecordingDispatcher::new();
        let sink = ThreadSink::start(dispatcher.clone(), None).expect("start sink");

        sink.submit(Duration::from_millis(80), payload(Prayer::Dhuhr, "12:30:00"))
            .expect("submit late");
        sink.submit(Duration::from_millis(10), payload(Prayer::Fajr, "05:12:00"))
            .expect("submit early");
        thread::sleep(Duration::from_millis(250));

        let fired = dispatcher.fired();
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[0].prayer_name, Prayer::Fajr);
        assert_eq!(fired[1].prayer_name, Prayer::Dhuhr);
    }

    #[test]
    fn cancel_prevents_firing() {
        let dispatcher = RecordingDispatcher::new();
        let sink = ThreadSink::start(dispatcher.clone(), None).expect("start sink");

        let handle = sink
            .submit(Duration::from_millis(100), payload(Prayer::Asr, "15:45:00"))
            .expect("submit");
        assert!(sink.cancel(handle));
        assert!(!sink.cancel(handle));
        thread::sleep(Duration::from_millis(200));

        assert!(dispatcher.fired().is_empty());
    }

    #[test]
    fn journal_restores_pending_across_restart() {
        let dir = tempdir().expect("tempdir");
        let journal = dir.path().join("sink.json");

        {
            let sink = ThreadSink::start(RecordingDispatcher::new(), Some(journal.clone()))
                .expect("start sink");
            sink.submit(Duration::from_secs(3600), payload(Prayer::Isha, "19:50:00"))
                .expect("submit");
            assert_eq!(sink.pending(), 1);
        }

        let dispatcher = RecordingDispatcher::new();
        let sink =
            ThreadSink::start(dispatcher.clone(), Some(journal.clone())).expect("restart sink");
        assert_eq!(sink.pending(), 1);
        assert!(dispatcher.fired().is_empty());

        let second = sink
            .submit(Duration::from_secs(3600), payload(Prayer::Fajr, "05:12:00"))
            .expect("submit after restart");
        assert!(second.0 >= 1, "restored handle counter must not restart");
    }

    #[test]
    fn past_due_journal_entries_fire_promptly_on_restart() {
        let dir = tempdir().expect("tempdir");
        let journal = dir.path().join("sink.json");
        let stale = json!({
            "next_handle": 7,
            "pending": [{
                "handle": 3,
                "due_unix_ms": unix_now_ms() - 60_000,
                "payload": {
                    "prayerName": "maghrib",
                    "prayerTime": "18:20:00",
                    "azanSound": "azan_maghrib.mp3",
                    "azanSoundEnabled": false
                }
            }]
        });
        fs::write(&journal, stale.to_string()).expect("write journal");

        let dispatcher = RecordingDispatcher::new();
        let _sink = ThreadSink::start(dispatcher.clone(), Some(journal)).expect("start sink");
        thread::sleep(Duration::from_millis(150));

        let fired = dispatcher.fired();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].prayer_name, Prayer::Maghrib);
    }

    #[test]
    fn corrupt_journal_is_reported() {
        let dir = tempdir().expect("tempdir");
        let journal = dir.path().join("sink.json");
        fs::write(&journal, "{ not-json ").expect("write journal");

        let err = ThreadSink::start(RecordingDispatcher::new(), Some(journal))
            .expect_err("corrupt journal");
        assert!(matches!(err, SinkError::CorruptJournal { .. }));
    }

    #[test]
    fn unwritable_journal_fails_that_submission_only() {
        let dir = tempdir().expect("tempdir");
        let journal = dir.path().join("missing-subdir").join("sink.json");

        let sink = ThreadSink::start(RecordingDispatcher::new(), Some(journal)).expect("start");
        let err = sink
            .submit(Duration::from_secs(60), payload(Prayer::Fajr, "05:12:00"))
            .expect_err("journal dir missing");
        assert!(matches!(err, SinkError::Journal { .. }));
        assert_eq!(sink.pending(), 0);
    }
}
