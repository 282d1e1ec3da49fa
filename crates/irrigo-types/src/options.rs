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

//! Plugin option values.
//!
//! Every plugin declares a default set of options. The type of each default
//! decides how incoming form values are parsed, so the schema never drifts at
//! runtime.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Option name -> value, ordered for stable JSON output
pub type OptionMap = BTreeMap<String, OptionValue>;

/// A single plugin option value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<i64>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionParseError {
    #[error("expected a boolean, got '{0}'")]
    Bool(String),

    #[error("expected an integer, got '{0}'")]
    Int(String),

    #[error("expected a number, got '{0}'")]
    Float(String),

    #[error("expected a list of integers, got '{0}'")]
    List(String),
}

impl OptionValue {
    /// Short type name used in log messages
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "string",
            Self::List(_) => "list",
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers widen to floats
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        reason = "option integers are small user-entered values"
    )]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[i64]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// Parse raw form values into the same variant as `self`.
    ///
    /// Scalars take the last submitted value (checkbox forms send a hidden
    /// `off` before the checkbox itself). Lists take every non-empty value,
    /// each of which may itself be comma separated.
    pub fn parse_like<S: AsRef<str>>(&self, raw: &[S]) -> Result<Self, OptionParseError> {
        let last = raw.last().map_or("", AsRef::as_ref);

        match self {
            Self::Bool(_) => parse_bool(last).map(Self::Bool),
            Self::Int(_) => parse_int(last).map(Self::Int),
            Self::Float(_) => {
                let trimmed = last.trim();
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(Self::Float)
                    .ok_or_else(|| OptionParseError::Float(trimmed.to_owned()))
            }
            Self::Text(_) => Ok(Self::Text(last.to_owned())),
            Self::List(_) => {
                let mut items = Vec::new();
                for value in raw {
                    for part in value.as_ref().split(',') {
                        let part = part.trim();
                        if part.is_empty() {
                            continue;
                        }
                        let item = part
                            .parse::<i64>()
                            .map_err(|_| OptionParseError::List(part.to_owned()))?;
                        items.push(item);
                    }
                }
                Ok(Self::List(items))
            }
        }
    }

    /// Accept a persisted value if its type is compatible with `self` (the default).
    ///
    /// Integers are accepted for float defaults since JSON does not keep the
    /// distinction for whole numbers.
    #[must_use]
    pub fn adopt(&self, stored: &Self) -> Option<Self> {
        match (self, stored) {
            (Self::Bool(_), Self::Bool(_))
            | (Self::Int(_), Self::Int(_))
            | (Self::Float(_), Self::Float(_))
            | (Self::Text(_), Self::Text(_))
            | (Self::List(_), Self::List(_)) => Some(stored.clone()),
            (Self::Float(_), Self::Int(_)) => stored.as_f64().map(Self::Float),
            _ => None,
        }
    }
}

fn parse_bool(raw: &str) -> Result<bool, OptionParseError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "yes" | "checked" => Ok(true),
        "off" | "false" | "0" | "no" | "" => Ok(false),
        other => Err(OptionParseError::Bool(other.to_owned())),
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "only whole, finite floats are converted"
)]
fn parse_int(raw: &str) -> Result<i64, OptionParseError> {
    let trimmed = raw.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Ok(i);
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(f as i64),
        _ => Err(OptionParseError::Int(trimmed.to_owned())),
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", if *b { "on" } else { "off" }),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::List(items) => {
                let joined: Vec<String> = items.iter().map(ToString::to_string).collect();
                f.write_str(&joined.join(", "))
            }
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<Vec<i64>> for OptionValue {
    fn from(value: Vec<i64>) -> Self {
        Self::List(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_takes_last_value() {
        let default = OptionValue::Bool(false);
        assert_eq!(
            default.parse_like(&["off", "on"]).unwrap(),
            OptionValue::Bool(true)
        );
        assert_eq!(
            default.parse_like(&["off"]).unwrap(),
            OptionValue::Bool(false)
        );
        assert!(default.parse_like(&["maybe"]).is_err());
    }

    #[test]
    fn test_int_accepts_whole_floats() {
        let default = OptionValue::Int(24);
        assert_eq!(default.parse_like(&[" 12 "]).unwrap(), OptionValue::Int(12));
        assert_eq!(default.parse_like(&["48.0"]).unwrap(), OptionValue::Int(48));
        assert_eq!(
            default.parse_like(&["4.5"]),
            Err(OptionParseError::Int("4.5".to_owned()))
        );
    }

    #[test]
    fn test_float_rejects_garbage() {
        let default = OptionValue::Float(2.0);
        assert_eq!(
            default.parse_like(&["35.6"]).unwrap(),
            OptionValue::Float(35.6)
        );
        assert!(default.parse_like(&["warm"]).is_err());
        assert!(default.parse_like(&["inf"]).is_err());
    }

    #[test]
    fn test_list_collects_all_values() {
        let default = OptionValue::List(Vec::new());
        assert_eq!(
            default.parse_like(&["", "1", "3,4"]).unwrap(),
            OptionValue::List(vec![1, 3, 4])
        );
        assert_eq!(
            default.parse_like(&[""]).unwrap(),
            OptionValue::List(Vec::new())
        );
        assert!(default.parse_like(&["x"]).is_err());
    }

    #[test]
    fn test_text_is_verbatim() {
        let default = OptionValue::Text("yahoo".to_owned());
        assert_eq!(
            default.parse_like(&["wunderground"]).unwrap(),
            OptionValue::Text("wunderground".to_owned())
        );
    }

    #[test]
    fn test_adopt_checks_type() {
        let float_default = OptionValue::Float(2.0);
        assert_eq!(
            float_default.adopt(&OptionValue::Int(3)),
            Some(OptionValue::Float(3.0))
        );
        assert_eq!(OptionValue::Int(1).adopt(&OptionValue::Text("x".to_owned())), None);
        assert_eq!(
            OptionValue::Bool(false).adopt(&OptionValue::Bool(true)),
            Some(OptionValue::Bool(true))
        );
    }

    #[test]
    fn test_untagged_json() {
        let map: OptionMap = serde_json::from_str(
            r#"{"enabled": true, "delay_duration": 24, "protect_temp": 2.5, "wapikey": "k", "protect_months": [1, 2]}"#,
        )
        .unwrap();
        assert_eq!(map["enabled"], OptionValue::Bool(true));
        assert_eq!(map["delay_duration"], OptionValue::Int(24));
        assert_eq!(map["protect_temp"], OptionValue::Float(2.5));
        assert_eq!(map["wapikey"], OptionValue::Text("k".to_owned()));
        assert_eq!(map["protect_months"], OptionValue::List(vec![1, 2]));
    }
}
