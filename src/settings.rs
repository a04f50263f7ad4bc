use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::prayer::model::{AzanConfig, Location, Prayer};

pub const DEFAULT_WINDOW_DAYS: u32 = 7;

#[derive(Debug, Clone)]
pub struct Settings {
    pub notifications_enabled: bool,
    pub azan: AzanConfig,
    pub window_days: u32,
    pub location: Location,
}

pub fn default_settings() -> Settings {
    Settings {
        notifications_enabled: true,
        azan: AzanConfig::default(),
        window_days: DEFAULT_WINDOW_DAYS,
        location: Location::City {
            name: "Tashkent".to_string(),
            country: "Uzbekistan".to_string(),
        },
    }
}

pub fn load_settings(path: &Path) -> Result<Settings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read settings file {}", path.display()))?;
    parse_settings_text(&content)
}

pub fn parse_settings_text(content: &str) -> Result<Settings> {
    let raw = serde_json::from_str::<SettingsFile>(content).map_err(|err| {
        let line = err.line();
        let column = err.column();
        anyhow::anyhow!("invalid JSON at line {line}, column {column}: {err}")
    })?;

    if raw.version != 1 {
        bail!(
            "unsupported settings version {}; expected version 1",
            raw.version
        );
    }
    if raw.window_days == 0 {
        bail!("window_days must be greater than zero");
    }
    if let Location::City { name, country } = &raw.location {
        if name.trim().is_empty() || country.trim().is_empty() {
            bail!("location city and country must not be empty");
        }
    }

    let mut sounds: HashMap<Prayer, String> = Prayer::ALL
        .iter()
        .map(|&prayer| (prayer, AzanConfig::default_sound(prayer).to_string()))
        .collect();
    for (prayer, sound) in raw.sounds {
        if sound.trim().is_empty() {
            bail!("azan sound for {prayer} must not be empty");
        }
        sounds.insert(prayer, sound);
    }

    Ok(Settings {
        notifications_enabled: raw.notifications_enabled,
        azan: AzanConfig {
            sound_enabled: raw.azan_sound_enabled,
            sounds,
        },
        window_days: raw.window_days,
        location: raw.location,
    })
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    let mut sounds = Map::new();
    for prayer in Prayer::ALL {
        sounds.insert(
            prayer.name().to_lowercase(),
            Value::String(settings.azan.sound_for(prayer).to_string()),
        );
    }

    let payload = json!({
        "version": 1,
        "notifications_enabled": settings.notifications_enabled,
        "azan_sound_enabled": settings.azan.sound_enabled,
        "window_days": settings.window_days,
        "sounds": sounds,
        "location": settings.location,
    });
    let text = serde_json::to_string_pretty(&payload)?;
    fs::write(path, format!("{text}\n"))
        .with_context(|| format!("unable to write settings file {}", path.display()))?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct SettingsFile {
    version: u32,
    #[serde(default = "default_enabled")]
    notifications_enabled: bool,
    #[serde(default = "default_enabled")]
    azan_sound_enabled: bool,
    #[serde(default = "default_window_days")]
    window_days: u32,
    #[serde(default)]
    sounds: HashMap<Prayer, String>,
    location: Location,
}

fn default_enabled() -> bool {
    true
}

fn default_window_days() -> u32 {
    DEFAULT_WINDOW_DAYS
}
