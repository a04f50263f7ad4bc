use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::sink::NotificationPayload;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("azan sound asset not found: {0}")]
    MissingAsset(String),
    #[error("azan sound asset unreadable: {0}")]
    UnreadableAsset(String),
}

pub trait AudioPlayer: Send + Sync {
    fn play(&self, asset: &str) -> Result<(), PlaybackError>;
}

pub struct AssetAudioPlayer {
    assets_dir: PathBuf,
}

impl AssetAudioPlayer {
    pub fn new(assets_dir: impl Into<PathBuf>) -> Self {
        Self {
            assets_dir: assets_dir.into(),
        }
    }

    fn resolve(&self, asset: &str) -> PathBuf {
        self.assets_dir.join(asset)
    }
}

impl AudioPlayer for AssetAudioPlayer {
    fn play(&self, asset: &str) -> Result<(), PlaybackError> {
        let path = self.resolve(asset);
        let metadata = path
            .metadata()
            .map_err(|_| PlaybackError::MissingAsset(path.display().to_string()))?;
        if !metadata.is_file() {
            return Err(PlaybackError::UnreadableAsset(path.display().to_string()));
        }
        info!(asset = %path.display(), "playing azan");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub shown: bool,
    pub audio_played: bool,
    pub retry_audio: bool,
}

pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, payload: &NotificationPayload) -> DispatchOutcome;
}

pub struct ConsoleDispatcher {
    audio: Box<dyn AudioPlayer>,
}

impl ConsoleDispatcher {
    pub fn new(audio: Box<dyn AudioPlayer>) -> Self {
        Self { audio }
    }

    pub fn with_assets_dir(assets_dir: impl Into<PathBuf>) -> Self {
        Self::new(Box::new(AssetAudioPlayer::new(assets_dir)))
    }
}

impl NotificationDispatcher for ConsoleDispatcher {
    fn dispatch(&self, payload: &NotificationPayload) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        if payload.azan_sound_enabled {
            match self.audio.play(&payload.azan_sound) {
                Ok(()) => outcome.audio_played = true,
                Err(err) => {
                    // Audio failure never suppresses the notification itself.
                    warn!(prayer = %payload.prayer_name, error = %err, "azan playback failed");
                    outcome.retry_audio = true;
                }
            }
        }

        println!(
            "Prayer Time: {} at {}",
            payload.prayer_name.name(),
            payload.prayer_time
        );
        outcome.shown = true;
        outcome
    }
}
