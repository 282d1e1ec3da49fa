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

pub mod controller;
pub mod events;
pub mod fields;
pub mod options;
pub mod weather;

// Re-export common types for convenience
pub use controller::{FinishedRun, Station, TempUnit};
pub use events::{LogEntry, Severity};
pub use fields::{Choice, FieldKind, FieldSpec};
pub use options::{OptionMap, OptionParseError, OptionValue};
pub use weather::{ConditionCode, CurrentConditions, DayWeather, WeatherCondition};
