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

use serde::{Deserialize, Serialize};

/// Daily weather summary (metric units)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DayWeather {
    pub temp_c: f64,
    /// Mean wind speed in m/s
    pub wind_ms: f64,
    /// Relative humidity in percent
    pub humidity: f64,
    pub rain_mm: f64,
}

/// Current observation, used for today's rain and the status page
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub description: String,
    pub icon: String,
    pub temp_c: Option<f64>,
    pub temp_f: Option<f64>,
    pub rain_mm: Option<f64>,
    pub temperature_string: String,
}

/// Provider specific condition code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionCode {
    /// Yahoo numeric code
    Yahoo(u32),
    /// Weather Underground icon name
    Icon(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherCondition {
    pub text: String,
    pub code: ConditionCode,
}
