use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Days, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike};
use tracing::warn;

use crate::prayer::model::{AzanConfig, Prayer, PrayerSet, parse_prayer_time};
use crate::sink::{DeferredWorkSink, NotificationPayload, TaskHandle};

pub fn next_prayer<Tz>(set: &PrayerSet, now: &DateTime<Tz>) -> Option<Prayer>
where
    Tz: TimeZone,
    Tz::Offset: Copy,
{
    let today = now.date_naive();
    let timezone = now.timezone();
    for prayer in Prayer::ALL {
        let Some(candidate) = candidate_instant(set, prayer, today, &timezone) else {
            continue;
        };
        if candidate > *now {
            return Some(prayer);
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledNotification<Tz: TimeZone> {
    pub prayer: Prayer,
    pub fire_at: DateTime<Tz>,
    pub display_time: String,
    pub sound: String,
    pub sound_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct Projection<Tz: TimeZone> {
    pub notifications: Vec<ScheduledNotification<Tz>>,
    pub skipped_past: usize,
    pub skipped_invalid: usize,
}

pub fn project_window<Tz>(
    set: &PrayerSet,
    now: &DateTime<Tz>,
    window_days: u32,
    azan: &AzanConfig,
) -> Projection<Tz>
where
    Tz: TimeZone,
    Tz::Offset: Copy,
{
    let timezone = now.timezone();
    let mut projection = Projection {
        notifications: Vec::new(),
        skipped_past: 0,
        skipped_invalid: 0,
    };

    for day_offset in 0..u64::from(window_days) {
        let Some(date) = now.date_naive().checked_add_days(Days::new(day_offset)) else {
            break;
        };
        for prayer in Prayer::ALL {
            let Some(candidate) = candidate_instant(set, prayer, date, &timezone) else {
                projection.skipped_invalid += 1;
                continue;
            };
            if candidate <= *now {
                projection.skipped_past += 1;
                continue;
            }
            projection.notifications.push(ScheduledNotification {
                prayer,
                fire_at: candidate,
                display_time: set.time_of(prayer).to_string(),
                sound: azan.sound_for(prayer).to_string(),
                sound_enabled: azan.sound_enabled,
            });
        }
    }

    projection
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleOutcome {
    pub scheduled: usize,
    pub replaced: usize,
    pub skipped_past: usize,
    pub skipped_invalid: usize,
    pub submit_failures: usize,
}

pub struct NotificationScheduler {
    sink: Arc<dyn DeferredWorkSink>,
    registry: Mutex<HashMap<(Prayer, NaiveDate), TaskHandle>>,
}

impl NotificationScheduler {
    pub fn new(sink: Arc<dyn DeferredWorkSink>) -> Self {
        Self {
            sink,
            registry: Mutex::new(HashMap::new()),
        }
    }

    pub fn schedule<Tz>(
        &self,
        set: &PrayerSet,
        now: &DateTime<Tz>,
        window_days: u32,
        azan: &AzanConfig,
    ) -> ScheduleOutcome
    where
        Tz: TimeZone,
        Tz::Offset: Copy,
    {
        let projection = project_window(set, now, window_days, azan);
        let mut outcome = ScheduleOutcome {
            skipped_past: projection.skipped_past,
            skipped_invalid: projection.skipped_invalid,
            ..ScheduleOutcome::default()
        };

        let mut registry = match self.registry.lock() {
            Ok(registry) => registry,
            Err(_) => {
                warn!("notification registry lock poisoned; dropping this projection pass");
                outcome.submit_failures = projection.notifications.len();
                return outcome;
            }
        };

        let today = now.date_naive();
        registry.retain(|(_, date), _| *date >= today);

        for item in projection.notifications {
            let key = (item.prayer, item.fire_at.date_naive());
            if let Some(stale) = registry.remove(&key) {
                // Replace the slot's outstanding task instead of stacking a duplicate.
                if self.sink.cancel(stale) {
                    outcome.replaced += 1;
                }
            }

            let delay = item
                .fire_at
                .signed_duration_since(now)
                .to_std()
                .unwrap_or(Duration::ZERO);
            let payload = NotificationPayload {
                prayer_name: item.prayer,
                prayer_time: item.display_time,
                azan_sound: item.sound,
                azan_sound_enabled: item.sound_enabled,
            };

            match self.sink.submit(delay, payload) {
                Ok(handle) => {
                    registry.insert(key, handle);
                    outcome.scheduled += 1;
                }
                Err(err) => {
                    warn!(prayer = %item.prayer, error = %err, "failed to submit notification");
                    outcome.submit_failures += 1;
                }
            }
        }

        outcome
    }

    pub fn outstanding(&self) -> usize {
        match self.registry.lock() {
            Ok(registry) => registry.len(),
            Err(_) => 0,
        }
    }
}

fn candidate_instant<Tz>(
    set: &PrayerSet,
    prayer: Prayer,
    date: NaiveDate,
    timezone: &Tz,
) -> Option<DateTime<Tz>>
where
    Tz: TimeZone,
    Tz::Offset: Copy,
{
    let time = match parse_prayer_time(set.time_of(prayer)) {
        Ok(time) => time,
        Err(err) => {
            warn!(prayer = %prayer, error = %err, "skipping unparsable prayer time");
            return None;
        }
    };
    // Seconds are display-only; notifications fire on the whole minute.
    let time = time.with_second(0)?;
    resolve_local_datetime(timezone, date.and_time(time))
}

fn resolve_local_datetime<Tz>(timezone: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>>
where
    Tz: TimeZone,
    Tz::Offset: Copy,
{
    match timezone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(first, _second) => Some(first),
        LocalResult::None => None,
    }
}
