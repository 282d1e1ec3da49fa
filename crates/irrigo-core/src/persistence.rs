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

//! Persistence layer for plugin options.
//!
//! All plugins share one JSON document: `{ "<plugin name>": { "<key>": value } }`.

use anyhow::{Context, Result};
use irrigo_types::{OptionMap, OptionValue};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default path for the options document.
pub const DEFAULT_OPTIONS_PATH: &str = "./data/options.json";

/// Persisted options of every plugin, keyed by plugin name
pub type OptionsDocument = BTreeMap<String, OptionMap>;

/// Options document persistence manager.
#[derive(Debug, Clone)]
pub struct OptionsPersistence {
    path: PathBuf,
}

impl OptionsPersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the options document.
    ///
    /// Returns an empty document if the file doesn't exist. Values that are not
    /// valid option values are skipped with a warning instead of failing the
    /// whole load.
    pub fn load(&self) -> Result<OptionsDocument> {
        if !self.path.exists() {
            info!(
                "Options file not found at {}, using defaults",
                self.path.display()
            );
            return Ok(OptionsDocument::new());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read options from {}", self.path.display()))?;

        let raw: BTreeMap<String, BTreeMap<String, Value>> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse options from {}", self.path.display()))?;

        let mut document = OptionsDocument::new();
        for (plugin, values) in raw {
            let mut options = OptionMap::new();
            for (key, value) in values {
                match serde_json::from_value::<OptionValue>(value) {
                    Ok(parsed) => {
                        options.insert(key, parsed);
                    }
                    Err(e) => {
                        warn!(plugin = %plugin, key = %key, "Skipping unreadable stored option: {e}");
                    }
                }
            }
            document.insert(plugin, options);
        }

        info!(
            "Loaded options for {} plugins from {}",
            document.len(),
            self.path.display()
        );

        Ok(document)
    }

    /// Save the options document.
    ///
    /// Uses atomic write (temp file + rename) to prevent corruption.
    pub fn save(&self, document: &OptionsDocument) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let json =
            serde_json::to_string_pretty(document).context("Failed to serialize options")?;

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, &json)
            .with_context(|| format!("Failed to write temp file {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to rename temp file to {}", self.path.display()))?;

        Ok(())
    }
}

impl Default for OptionsPersistence {
    fn default() -> Self {
        Self::new(DEFAULT_OPTIONS_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_nonexistent_file() {
        let dir = tempdir().unwrap();
        let persistence = OptionsPersistence::new(dir.path().join("missing.json"));

        assert!(persistence.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let persistence = OptionsPersistence::new(dir.path().join("nested/options.json"));

        let mut options = OptionMap::new();
        options.insert("enabled".to_owned(), OptionValue::Bool(true));
        options.insert("delay_duration".to_owned(), OptionValue::Int(48));
        let mut document = OptionsDocument::new();
        document.insert("Weather-based Rain Delay".to_owned(), options);

        persistence.save(&document).unwrap();
        let loaded = persistence.load().unwrap();

        assert_eq!(loaded, document);
        assert!(!dir.path().join("nested/options.tmp").exists());
    }

    #[test]
    fn test_unreadable_values_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("options.json");
        fs::write(
            &path,
            r#"{"Email Notifications": {"emlusr": "me@example.com", "emlbad": {"nested": 1}}}"#,
        )
        .unwrap();

        let loaded = OptionsPersistence::new(&path).load().unwrap();
        let email = &loaded["Email Notifications"];
        assert_eq!(email.len(), 1);
        assert_eq!(
            email["emlusr"],
            OptionValue::Text("me@example.com".to_owned())
        );
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("options.json");
        fs::write(&path, "not json").unwrap();

        assert!(OptionsPersistence::new(&path).load().is_err());
    }
}
