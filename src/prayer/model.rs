use std::collections::HashMap;
use std::fmt;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Prayer {
    Fajr,
    Dhuhr,
    Asr,
    Maghrib,
    Isha,
}

impl Prayer {
    pub const ALL: [Prayer; 5] = [
        Prayer::Fajr,
        Prayer::Dhuhr,
        Prayer::Asr,
        Prayer::Maghrib,
        Prayer::Isha,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Prayer::Fajr => "Fajr",
            Prayer::Dhuhr => "Dhuhr",
            Prayer::Asr => "Asr",
            Prayer::Maghrib => "Maghrib",
            Prayer::Isha => "Isha",
        }
    }
}

impl fmt::Display for Prayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Location {
    City { name: String, country: String },
    Coordinates { latitude: f64, longitude: f64 },
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::City { name, country } => write!(f, "{name}, {country}"),
            Location::Coordinates {
                latitude,
                longitude,
            } => write!(f, "{latitude:.4}, {longitude:.4}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrayerSet {
    pub fajr: String,
    pub dhuhr: String,
    pub asr: String,
    pub maghrib: String,
    pub isha: String,
    pub date: String,
    pub location: Location,
}

impl PrayerSet {
    pub fn time_of(&self, prayer: Prayer) -> &str {
        match prayer {
            Prayer::Fajr => &self.fajr,
            Prayer::Dhuhr => &self.dhuhr,
            Prayer::Asr => &self.asr,
            Prayer::Maghrib => &self.maghrib,
            Prayer::Isha => &self.isha,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AzanConfig {
    pub sound_enabled: bool,
    pub sounds: HashMap<Prayer, String>,
}

impl AzanConfig {
    pub fn default_sound(prayer: Prayer) -> &'static str {
        match prayer {
            Prayer::Fajr => "azan_fajr.mp3",
            Prayer::Dhuhr => "azan_dhuhr.mp3",
            Prayer::Asr => "azan_asr.mp3",
            Prayer::Maghrib => "azan_maghrib.mp3",
            Prayer::Isha => "azan_isha.mp3",
        }
    }

    // Prayers without a configured sound fall back to the Fajr entry.
    pub fn sound_for(&self, prayer: Prayer) -> &str {
        self.sounds
            .get(&prayer)
            .or_else(|| self.sounds.get(&Prayer::Fajr))
            .map(String::as_str)
            .unwrap_or_else(|| Self::default_sound(Prayer::Fajr))
    }
}

impl Default for AzanConfig {
    fn default() -> Self {
        let sounds = Prayer::ALL
            .iter()
            .map(|&prayer| (prayer, Self::default_sound(prayer).to_string()))
            .collect();
        Self {
            sound_enabled: true,
            sounds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid prayer time '{input}', expected HH:MM:SS")]
pub struct TimeParseError {
    pub input: String,
}

pub fn parse_prayer_time(input: &str) -> Result<NaiveTime, TimeParseError> {
    NaiveTime::parse_from_str(input, "%H:%M:%S").map_err(|_| TimeParseError {
        input: input.to_string(),
    })
}
