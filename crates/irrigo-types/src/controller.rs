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

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Temperature unit used by the controller UI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TempUnit {
    #[default]
    #[serde(rename = "C")]
    Celsius,
    #[serde(rename = "F")]
    Fahrenheit,
}

impl TempUnit {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Celsius => "C",
            Self::Fahrenheit => "F",
        }
    }

    /// Convert a Celsius reading into this unit
    #[must_use]
    pub fn from_celsius(self, celsius: f64) -> f64 {
        match self {
            Self::Celsius => celsius,
            Self::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub index: usize,
    pub name: String,
    pub enabled: bool,
}

/// A station run that has completed (or was cut short by a rain block)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedRun {
    pub program_name: String,
    pub station: usize,
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub blocked: bool,
}

impl FinishedRun {
    /// Duration formatted as `mm:ss`
    #[must_use]
    #[expect(
        clippy::integer_division,
        clippy::modulo_arithmetic,
        reason = "splitting whole seconds into minutes and seconds"
    )]
    pub fn duration_label(&self) -> String {
        let secs = (self.end - self.start).num_seconds().max(0);
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fahrenheit_conversion() {
        assert!((TempUnit::Fahrenheit.from_celsius(2.0) - 35.6).abs() < 1e-9);
        assert!((TempUnit::Celsius.from_celsius(2.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_duration_label() {
        let start = Local.with_ymd_and_hms(2025, 6, 1, 6, 0, 0).unwrap();
        let run = FinishedRun {
            program_name: "Morning".to_owned(),
            station: 0,
            start,
            end: start + chrono::Duration::seconds(605),
            blocked: false,
        };
        assert_eq!(run.duration_label(), "10:05");
    }
}
