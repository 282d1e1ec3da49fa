// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Irrigo.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use super::{
    DailyWeather, WeatherError, WeatherProvider, WeatherSource, WundergroundClient, YahooClient,
};
use async_trait::async_trait;
use chrono::Local;
use irrigo_core::{Subscription, WakeHandle};
use irrigo_types::{CurrentConditions, WeatherCondition};
use parking_lot::Mutex;
use reqwest::Client;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Provider endpoints and credentials
#[derive(Debug, Clone)]
pub struct WeatherSettings {
    /// Weather Underground key used by the water level plugin
    pub api_key: String,
    pub wunderground_base: String,
    pub autocomplete_base: String,
    pub yahoo_query_base: String,
    pub yahoo_forecast_base: String,
    pub timeout: Duration,
}

impl Default for WeatherSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            wunderground_base: "http://api.wunderground.com".to_owned(),
            autocomplete_base: "http://autocomplete.wunderground.com".to_owned(),
            yahoo_query_base: "http://query.yahooapis.com".to_owned(),
            yahoo_forecast_base: "http://weather.yahooapis.com".to_owned(),
            timeout: Duration::from_secs(30),
        }
    }
}

type Listeners = Arc<Mutex<BTreeMap<u64, WakeHandle>>>;

/// Shared weather access for all plugins.
///
/// Remembers the last resolved location and wakes subscribed workers when
/// it changes.
#[derive(Debug)]
pub struct WeatherService {
    wunderground: WundergroundClient,
    yahoo: YahooClient,
    api_key: String,
    resolved: Mutex<Option<(String, String)>>,
    listeners: Listeners,
    next_listener: AtomicU64,
}

impl WeatherService {
    pub fn new(settings: &WeatherSettings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {e}"))?;

        Ok(Self {
            wunderground: WundergroundClient::new(
                client.clone(),
                &settings.wunderground_base,
                &settings.autocomplete_base,
            ),
            yahoo: YahooClient::new(
                client,
                &settings.yahoo_query_base,
                &settings.yahoo_forecast_base,
            ),
            api_key: settings.api_key.clone(),
            resolved: Mutex::new(None),
            listeners: Arc::new(Mutex::new(BTreeMap::new())),
            next_listener: AtomicU64::new(0),
        })
    }

    /// Wake every subscribed worker
    pub fn notify_location_changed(&self) {
        for wake in self.listeners.lock().values() {
            wake.wake();
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    async fn location_id(&self, location: &str) -> Result<String, WeatherError> {
        let location = location.trim();
        let cached = self.resolved.lock().clone();
        if let Some((known, lid)) = &cached
            && known == location
        {
            return Ok(lid.clone());
        }

        let lid = self.wunderground.resolve_location(location).await?;
        // The first resolution is not a change; the caller is already fetching
        let changed = cached.as_ref().is_some_and(|(_, old)| *old != lid);
        *self.resolved.lock() = Some((location.to_owned(), lid.clone()));

        if changed {
            info!("Weather location changed to {lid}");
            self.notify_location_changed();
        } else {
            debug!("Weather location resolved to {lid}");
        }
        Ok(lid)
    }
}

#[async_trait]
impl WeatherSource for WeatherService {
    async fn current_condition(
        &self,
        provider: WeatherProvider,
        location: &str,
        api_key: &str,
    ) -> Result<WeatherCondition, WeatherError> {
        match provider {
            WeatherProvider::Yahoo => self.yahoo.condition(location).await,
            WeatherProvider::Wunderground => {
                let key = if api_key.trim().is_empty() {
                    self.api_key.as_str()
                } else {
                    api_key
                };
                if key.trim().is_empty() {
                    return Err(WeatherError::MissingApiKey);
                }
                let lid = self.location_id(location).await?;
                let (condition, _) = self.wunderground.conditions(key, &lid).await?;
                Ok(condition)
            }
        }
    }

    async fn history(&self, location: &str, days: u32) -> Result<DailyWeather, WeatherError> {
        if self.api_key.trim().is_empty() {
            return Err(WeatherError::MissingApiKey);
        }
        let lid = self.location_id(location).await?;
        let today = Local::now().date_naive();
        self.wunderground
            .history(&self.api_key, &lid, days, today)
            .await
    }

    async fn forecast(&self, location: &str, days: u32) -> Result<DailyWeather, WeatherError> {
        if self.api_key.trim().is_empty() {
            return Err(WeatherError::MissingApiKey);
        }
        let lid = self.location_id(location).await?;
        self.wunderground.forecast(&self.api_key, &lid, days).await
    }

    async fn conditions(&self, location: &str) -> Result<CurrentConditions, WeatherError> {
        if self.api_key.trim().is_empty() {
            return Err(WeatherError::MissingApiKey);
        }
        let lid = self.location_id(location).await?;
        let (_, current) = self.wunderground.conditions(&self.api_key, &lid).await?;
        Ok(current)
    }

    fn subscribe(&self, wake: WakeHandle) -> Subscription {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().insert(id, wake);

        let listeners = Arc::clone(&self.listeners);
        Subscription::new(move || {
            listeners.lock().remove(&id);
        })
    }
}
