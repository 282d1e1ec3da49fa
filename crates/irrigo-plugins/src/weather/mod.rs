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

//! Weather provider clients and the shared weather service.

mod service;
mod wunderground;
mod yahoo;

pub use service::{WeatherService, WeatherSettings};
pub use wunderground::WundergroundClient;
pub use yahoo::YahooClient;

use async_trait::async_trait;
use irrigo_core::{PluginError, Subscription, WakeHandle};
use irrigo_types::{CurrentConditions, DayWeather, WeatherCondition};
use std::collections::BTreeMap;
use thiserror::Error;

/// Day offset from today (negative = past) -> daily summary
pub type DailyWeather = BTreeMap<i64, DayWeather>;

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("Weather Underground API key is not set!")]
    MissingApiKey,

    #[error("Location is not set!")]
    MissingLocation,

    #[error("location '{0}' was not found")]
    LocationNotFound(String),

    #[error("weather service error: {0}")]
    Api(String),

    #[error("unexpected weather data: {0}")]
    InvalidData(String),

    #[error("weather request failed")]
    Http(#[from] reqwest::Error),
}

impl From<WeatherError> for PluginError {
    fn from(e: WeatherError) -> Self {
        match e {
            WeatherError::MissingApiKey | WeatherError::MissingLocation => {
                Self::NotConfigured(e.to_string())
            }
            WeatherError::LocationNotFound(_) => Self::NoDataAvailable(e.to_string()),
            WeatherError::InvalidData(message) => Self::InvalidData(message),
            WeatherError::Api(_) | WeatherError::Http(_) => Self::Other(anyhow::Error::new(e)),
        }
    }
}

/// Provider selected by the rain delay plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherProvider {
    Yahoo,
    Wunderground,
}

impl WeatherProvider {
    /// Option value -> provider; anything but `yahoo` means Weather Underground
    #[must_use]
    pub fn from_option(value: &str) -> Self {
        if value.eq_ignore_ascii_case("yahoo") {
            Self::Yahoo
        } else {
            Self::Wunderground
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yahoo => "yahoo",
            Self::Wunderground => "wunderground",
        }
    }
}

/// Weather data as seen by the plugins
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Current condition from the chosen provider.
    ///
    /// `api_key` overrides the service key for Weather Underground when not empty.
    async fn current_condition(
        &self,
        provider: WeatherProvider,
        location: &str,
        api_key: &str,
    ) -> Result<WeatherCondition, WeatherError>;

    /// Observed summaries for days `-days..=-1`
    async fn history(&self, location: &str, days: u32) -> Result<DailyWeather, WeatherError>;

    /// Forecast summaries for days `0..days`
    async fn forecast(&self, location: &str, days: u32) -> Result<DailyWeather, WeatherError>;

    async fn conditions(&self, location: &str) -> Result<CurrentConditions, WeatherError>;

    /// Wake the given worker whenever the resolved weather location changes
    fn subscribe(&self, wake: WakeHandle) -> Subscription;
}

/// Numeric JSON field that providers send either as a number or as text
pub(crate) fn json_number(value: Option<&serde_json::Value>) -> Option<f64> {
    match value? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => leading_number(s),
        _ => None,
    }
}

/// `"0.5 in (13 mm)"` -> 0.5, `"T"` (trace) -> 0.0
pub(crate) fn leading_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("t") {
        return Some(0.0);
    }
    let end = text
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && *c == '-')))
        .map_or(text.len(), |(i, _)| i);
    text.get(..end)?.parse().ok()
}
