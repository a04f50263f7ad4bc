use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::prayer::model::{Location, PrayerSet};

pub const FETCH_ATTEMPTS: u32 = 3;
pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderRequest {
    City { city: String, country: String },
    Coordinates { latitude: f64, longitude: f64 },
}

impl ProviderRequest {
    pub fn from_location(location: &Location) -> Self {
        match location {
            Location::City { name, country } => ProviderRequest::City {
                city: name.clone(),
                country: country.clone(),
            },
            Location::Coordinates {
                latitude,
                longitude,
            } => ProviderRequest::Coordinates {
                latitude: *latitude,
                longitude: *longitude,
            },
        }
    }

    pub fn location(&self) -> Location {
        match self {
            ProviderRequest::City { city, country } => Location::City {
                name: city.clone(),
                country: country.clone(),
            },
            ProviderRequest::Coordinates {
                latitude,
                longitude,
            } => Location::Coordinates {
                latitude: *latitude,
                longitude: *longitude,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub fajr: String,
    pub dhuhr: String,
    pub asr: String,
    pub maghrib: String,
    pub isha: String,
    pub date: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl ProviderResponse {
    pub fn into_prayer_set(self, location: Location) -> PrayerSet {
        PrayerSet {
            fajr: self.fajr,
            dhuhr: self.dhuhr,
            asr: self.asr,
            maghrib: self.maghrib,
            isha: self.isha,
            date: self.date,
            location,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("provider document unavailable: {0}")]
    Unavailable(String),
    #[error("provider response malformed: {0}")]
    Malformed(String),
}

pub trait PrayerTimeProvider: Send + Sync {
    fn fetch(&self, request: &ProviderRequest) -> Result<ProviderResponse, FetchError>;
}

pub struct FileProvider {
    path: PathBuf,
}

impl FileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PrayerTimeProvider for FileProvider {
    fn fetch(&self, _request: &ProviderRequest) -> Result<ProviderResponse, FetchError> {
        let content = fs::read_to_string(&self.path)
            .map_err(|err| FetchError::Unavailable(format!("{}: {err}", self.path.display())))?;
        parse_provider_document(&content)
    }
}

pub fn parse_provider_document(content: &str) -> Result<ProviderResponse, FetchError> {
    let raw = serde_json::from_str::<ProviderDocument>(content).map_err(|err| {
        FetchError::Malformed(format!(
            "invalid JSON at line {}, column {}: {err}",
            err.line(),
            err.column()
        ))
    })?;

    Ok(ProviderResponse {
        fajr: raw.data.timings.fajr,
        dhuhr: raw.data.timings.dhuhr,
        asr: raw.data.timings.asr,
        maghrib: raw.data.timings.maghrib,
        isha: raw.data.timings.isha,
        date: raw.data.date.readable,
        latitude: raw.data.meta.latitude,
        longitude: raw.data.meta.longitude,
    })
}

pub fn fetch_with_retry(
    provider: &dyn PrayerTimeProvider,
    request: &ProviderRequest,
) -> Result<ProviderResponse, FetchError> {
    fetch_with_backoff(provider, request, RETRY_BASE_DELAY)
}

pub fn fetch_with_backoff(
    provider: &dyn PrayerTimeProvider,
    request: &ProviderRequest,
    base_delay: Duration,
) -> Result<ProviderResponse, FetchError> {
    let mut delay = base_delay;
    let mut last_error = FetchError::Unavailable("no fetch attempted".to_string());

    for attempt in 1..=FETCH_ATTEMPTS {
        match provider.fetch(request) {
            Ok(response) => return Ok(response),
            // A malformed response will not get better on retry.
            Err(err @ FetchError::Malformed(_)) => return Err(err),
            Err(err) => {
                warn!(attempt, error = %err, "prayer time fetch failed");
                last_error = err;
                if attempt < FETCH_ATTEMPTS {
                    thread::sleep(delay);
                    delay *= 2;
                }
            }
        }
    }

    Err(last_error)
}

#[derive(Debug, Deserialize)]
struct ProviderDocument {
    data: ProviderData,
}

#[derive(Debug, Deserialize)]
struct ProviderData {
    timings: TimingsData,
    date: DateData,
    meta: MetaData,
}

#[derive(Debug, Deserialize)]
struct TimingsData {
    #[serde(rename = "Fajr")]
    fajr: String,
    #[serde(rename = "Dhuhr")]
    dhuhr: String,
    #[serde(rename = "Asr")]
    asr: String,
    #[serde(rename = "Maghrib")]
    maghrib: String,
    #[serde(rename = "Isha")]
    isha: String,
}

#[derive(Debug, Deserialize)]
struct DateData {
    readable: String,
}

#[derive(Debug, Deserialize)]
struct MetaData {
    latitude: f64,
    longitude: f64,
}
