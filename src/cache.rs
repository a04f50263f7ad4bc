use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::provider::{PrayerTimeProvider, ProviderRequest, ProviderResponse, fetch_with_retry};

pub fn cache_date_key(today: NaiveDate) -> String {
    today.format("%d %b %Y").to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    city: Option<String>,
    country: Option<String>,
    latitude: f64,
    longitude: f64,
    date_key: String,
    fajr: String,
    dhuhr: String,
    asr: String,
    maghrib: String,
    isha: String,
    display_date: String,
}

impl CacheEntry {
    fn matches(&self, request: &ProviderRequest, date_key: &str) -> bool {
        if self.date_key != date_key {
            return false;
        }
        match request {
            ProviderRequest::City { city, .. } => self.city.as_deref() == Some(city.as_str()),
            ProviderRequest::Coordinates {
                latitude,
                longitude,
            } => self.city.is_none() && self.latitude == *latitude && self.longitude == *longitude,
        }
    }
}

pub struct PrayerCache {
    path: PathBuf,
}

impl PrayerCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn get(&self, request: &ProviderRequest, date_key: &str) -> Result<Option<ProviderResponse>> {
        let entries = self.load()?;
        let found = entries.into_iter().find(|entry| entry.matches(request, date_key));
        Ok(found.map(|entry| ProviderResponse {
            fajr: entry.fajr,
            dhuhr: entry.dhuhr,
            asr: entry.asr,
            maghrib: entry.maghrib,
            isha: entry.isha,
            date: entry.display_date,
            latitude: entry.latitude,
            longitude: entry.longitude,
        }))
    }

    pub fn insert(
        &self,
        request: &ProviderRequest,
        date_key: &str,
        response: &ProviderResponse,
    ) -> Result<()> {
        let mut entries = self.load()?;
        entries.retain(|entry| !entry.matches(request, date_key));

        let (city, country) = match request {
            ProviderRequest::City { city, country } => {
                (Some(city.clone()), Some(country.clone()))
            }
            ProviderRequest::Coordinates { .. } => (None, None),
        };
        entries.push(CacheEntry {
            city,
            country,
            latitude: response.latitude,
            longitude: response.longitude,
            date_key: date_key.to_string(),
            fajr: response.fajr.clone(),
            dhuhr: response.dhuhr.clone(),
            asr: response.asr.clone(),
            maghrib: response.maghrib.clone(),
            isha: response.isha.clone(),
            display_date: response.date.clone(),
        });
        self.save(&entries)
    }

    fn load(&self) -> Result<Vec<CacheEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("unable to read cache file {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("cache file {} is corrupt", self.path.display()))
    }

    fn save(&self, entries: &[CacheEntry]) -> Result<()> {
        let text = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, format!("{text}\n"))
            .with_context(|| format!("unable to write cache file {}", self.path.display()))
    }
}

pub fn read_through(
    cache: Option<&PrayerCache>,
    provider: &dyn PrayerTimeProvider,
    request: &ProviderRequest,
    today: NaiveDate,
) -> Result<ProviderResponse> {
    let date_key = cache_date_key(today);

    if let Some(cache) = cache {
        match cache.get(request, &date_key) {
            Ok(Some(cached)) => {
                debug!(%date_key, "prayer times served from cache");
                return Ok(cached);
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "cache read failed; falling back to provider"),
        }
    }

    let response = fetch_with_retry(provider, request)
        .context("failed to fetch prayer times from provider")?;

    if let Some(cache) = cache {
        if let Err(err) = cache.insert(request, &date_key, &response) {
            warn!(error = %err, "cache write failed; continuing with fetched times");
        }
    }

    Ok(response)
}
