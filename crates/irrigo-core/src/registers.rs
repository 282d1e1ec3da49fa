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

//! Shared decision registers read by the irrigation scheduler.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;

/// Plugin name -> decision value. Each plugin only touches its own key.
#[derive(Debug)]
pub struct Register<T> {
    values: RwLock<BTreeMap<String, T>>,
}

impl<T: Clone> Register<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn set(&self, plugin: &str, value: T) {
        self.values.write().insert(plugin.to_owned(), value);
    }

    /// Remove a plugin's entry, returning it if there was one
    pub fn remove(&self, plugin: &str) -> Option<T> {
        self.values.write().remove(plugin)
    }

    #[must_use]
    pub fn get(&self, plugin: &str) -> Option<T> {
        self.values.read().get(plugin).cloned()
    }

    #[must_use]
    pub fn contains(&self, plugin: &str) -> bool {
        self.values.read().contains_key(plugin)
    }

    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, T> {
        self.values.read().clone()
    }
}

impl<T: Clone> Default for Register<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
pub struct SharedRegisters {
    /// Irrigation is blocked until the stored instant
    pub rain_blocks: Register<DateTime<Utc>>,
    /// Water level multiplier (1.0 = 100 %)
    pub level_adjustments: Register<f64>,
}

/// Serializable view served to the scheduler
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistersSnapshot {
    pub rain_blocks: BTreeMap<String, DateTime<Utc>>,
    pub level_adjustments: BTreeMap<String, f64>,
}

impl SharedRegisters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every entry owned by `plugin`
    pub fn clear_plugin(&self, plugin: &str) {
        self.rain_blocks.remove(plugin);
        self.level_adjustments.remove(plugin);
    }

    #[must_use]
    pub fn snapshot(&self) -> RegistersSnapshot {
        RegistersSnapshot {
            rain_blocks: self.rain_blocks.snapshot(),
            level_adjustments: self.level_adjustments.snapshot(),
        }
    }

    /// Latest active rain block across all plugins
    #[must_use]
    pub fn blocked_until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.rain_blocks
            .snapshot()
            .into_values()
            .filter(|until| *until > now)
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_per_plugin_keys() {
        let registers = SharedRegisters::new();
        registers.level_adjustments.set("a", 0.8);
        registers.level_adjustments.set("b", 1.2);

        registers.clear_plugin("a");

        assert!(!registers.level_adjustments.contains("a"));
        assert_eq!(registers.level_adjustments.get("b"), Some(1.2));
    }

    #[test]
    fn test_blocked_until_ignores_expired() {
        let registers = SharedRegisters::new();
        let now = Utc::now();
        registers.rain_blocks.set("old", now - Duration::hours(1));
        assert_eq!(registers.blocked_until(now), None);

        registers.rain_blocks.set("new", now + Duration::hours(24));
        assert_eq!(registers.blocked_until(now), Some(now + Duration::hours(24)));
    }

    #[test]
    fn test_snapshot_serializes() {
        let registers = SharedRegisters::new();
        registers.level_adjustments.set("wl", 0.5);
        let json = serde_json::to_value(registers.snapshot()).unwrap();
        assert_eq!(json["level_adjustments"]["wl"], 0.5);
        assert!(json["rain_blocks"].as_object().unwrap().is_empty());
    }
}
