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

//! Process-wide options store.
//!
//! Each plugin registers its defaults once. The defaults fix the key set and
//! the type of every value; persisted values are merged in on registration and
//! web updates are coerced to the default's type.

use crate::persistence::{OptionsDocument, OptionsPersistence};
use irrigo_types::{OptionMap, OptionParseError, OptionValue};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("no options registered for plugin '{0}'")]
    UnknownPlugin(String),

    #[error(transparent)]
    Persist(#[from] anyhow::Error),
}

/// Outcome of a web update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateReport {
    /// Keys whose value was replaced
    pub updated: Vec<String>,
    /// Payload keys not present in the defaults
    pub ignored: Vec<String>,
    /// Keys whose value failed to parse; the old value stays
    pub rejected: Vec<(String, OptionParseError)>,
}

impl UpdateReport {
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.updated.is_empty()
    }
}

#[derive(Debug)]
struct PluginOptions {
    defaults: OptionMap,
    current: OptionMap,
}

#[derive(Debug)]
pub struct OptionsStore {
    persistence: Option<OptionsPersistence>,
    /// Values loaded from disk that are waiting for their plugin to register
    stored: RwLock<OptionsDocument>,
    plugins: RwLock<BTreeMap<String, PluginOptions>>,
}

impl OptionsStore {
    /// Store without a backing file
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            persistence: None,
            stored: RwLock::new(OptionsDocument::new()),
            plugins: RwLock::new(BTreeMap::new()),
        }
    }

    /// Open the store backed by `persistence`, loading any saved values.
    pub fn open(persistence: OptionsPersistence) -> anyhow::Result<Self> {
        let stored = persistence.load()?;
        Ok(Self {
            persistence: Some(persistence),
            stored: RwLock::new(stored),
            plugins: RwLock::new(BTreeMap::new()),
        })
    }

    /// Register a plugin's defaults and return its effective options.
    ///
    /// Stored keys missing from `defaults` are dropped and stored values of the
    /// wrong type fall back to the default. Registering twice keeps the
    /// current values.
    pub fn register(&self, name: &str, defaults: OptionMap) -> OptionMap {
        let mut plugins = self.plugins.write();
        if let Some(existing) = plugins.get(name) {
            return existing.current.clone();
        }

        let stored = self.stored.write().remove(name).unwrap_or_default();
        let mut current = defaults.clone();
        for (key, value) in &stored {
            match defaults.get(key) {
                Some(default) => match default.adopt(value) {
                    Some(adopted) => {
                        current.insert(key.clone(), adopted);
                    }
                    None => warn!(
                        plugin = %name,
                        key = %key,
                        "Stored {} does not match default {}, using default",
                        value.kind(),
                        default.kind()
                    ),
                },
                None => debug!(plugin = %name, key = %key, "Dropping stale stored option"),
            }
        }

        plugins.insert(
            name.to_owned(),
            PluginOptions {
                defaults,
                current: current.clone(),
            },
        );
        current
    }

    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.plugins.read().contains_key(name)
    }

    /// Snapshot of a plugin's current options
    #[must_use]
    pub fn get(&self, name: &str) -> Option<OptionMap> {
        self.plugins.read().get(name).map(|p| p.current.clone())
    }

    #[must_use]
    pub fn value(&self, name: &str, key: &str) -> Option<OptionValue> {
        self.plugins
            .read()
            .get(name)
            .and_then(|p| p.current.get(key).cloned())
    }

    /// Merge a multi-valued form payload into a plugin's options and persist.
    ///
    /// When the save fails the plugin's previous values are restored.
    pub fn web_update(
        &self,
        name: &str,
        form: &[(String, String)],
    ) -> Result<UpdateReport, OptionsError> {
        let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (key, value) in form {
            grouped.entry(key.as_str()).or_default().push(value.as_str());
        }

        let mut report = UpdateReport::default();
        let previous = {
            let mut plugins = self.plugins.write();
            let options = plugins
                .get_mut(name)
                .ok_or_else(|| OptionsError::UnknownPlugin(name.to_owned()))?;
            let previous = options.current.clone();

            for (key, values) in grouped {
                let Some(default) = options.defaults.get(key) else {
                    report.ignored.push(key.to_owned());
                    continue;
                };
                match default.parse_like(&values) {
                    Ok(parsed) => {
                        if options.current.get(key) != Some(&parsed) {
                            report.updated.push(key.to_owned());
                        }
                        options.current.insert(key.to_owned(), parsed);
                    }
                    Err(e) => {
                        warn!(plugin = %name, key = %key, "Rejected option value: {e}");
                        report.rejected.push((key.to_owned(), e));
                    }
                }
            }
            previous
        };

        self.persist_or_restore(name, previous)?;
        if report.changed() {
            info!(plugin = %name, updated = ?report.updated, "Options updated");
        }
        Ok(report)
    }

    /// Replace one value programmatically; the type must match the default.
    pub fn set(&self, name: &str, key: &str, value: OptionValue) -> Result<bool, OptionsError> {
        let previous = {
            let mut plugins = self.plugins.write();
            let options = plugins
                .get_mut(name)
                .ok_or_else(|| OptionsError::UnknownPlugin(name.to_owned()))?;
            match options.defaults.get(key).and_then(|d| d.adopt(&value)) {
                Some(adopted) => {
                    let previous = options.current.clone();
                    options.current.insert(key.to_owned(), adopted);
                    Some(previous)
                }
                None => None,
            }
        };
        match previous {
            Some(previous) => {
                self.persist_or_restore(name, previous)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Persist, putting `previous` back as the plugin's values if the save fails
    fn persist_or_restore(&self, name: &str, previous: OptionMap) -> Result<(), OptionsError> {
        if let Err(e) = self.persist() {
            warn!(plugin = %name, "Saving options failed, keeping previous values: {e:#}");
            if let Some(options) = self.plugins.write().get_mut(name) {
                options.current = previous;
            }
            return Err(OptionsError::Persist(e));
        }
        Ok(())
    }

    /// Write all registered options (plus values of plugins not yet
    /// registered) to the backing file.
    pub fn persist(&self) -> anyhow::Result<()> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };

        let mut document = self.stored.read().clone();
        for (name, options) in self.plugins.read().iter() {
            document.insert(name.clone(), options.current.clone());
        }
        persistence.save(&document)
    }
}
