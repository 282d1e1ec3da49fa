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

//! TOML configuration for the `irrigo` binary.

use anyhow::{Context, Result, bail};
use irrigo_core::ControllerSettings;
use irrigo_plugins::{BuiltinSettings, MailSettings, WeatherSettings};
use irrigo_types::{Station, TempUnit};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IrrigoConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub controller: ControllerSection,
    #[serde(default)]
    pub weather: WeatherSection,
    #[serde(default)]
    pub email: EmailSection,
    #[serde(default)]
    pub update: UpdateSection,
    #[serde(default)]
    pub system: SystemSection,
    #[serde(default)]
    pub plugins: PluginsSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    /// Plugin options document
    #[serde(default = "default_options_path")]
    pub options_path: PathBuf,
    /// Event mirror file, attached to mails and shown by the debug page
    #[serde(default = "default_events_path")]
    pub events_path: Option<PathBuf>,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSection {
    #[serde(default = "default_system_name")]
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub temp_unit: TempUnit,
    #[serde(default)]
    pub rain_sensor_file: Option<PathBuf>,
    #[serde(default)]
    pub stations: Vec<StationConfig>,
}

/// Station entry; its index is its position in the list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherSection {
    /// Weather Underground API key
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_wunderground_base")]
    pub wunderground_base: String,
    #[serde(default = "default_autocomplete_base")]
    pub autocomplete_base: String,
    #[serde(default = "default_yahoo_query_base")]
    pub yahoo_query_base: String,
    #[serde(default = "default_yahoo_forecast_base")]
    pub yahoo_forecast_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSection {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default = "default_true")]
    pub use_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSection {
    /// Git checkout the update plugin tracks
    #[serde(default = "default_repo_path")]
    pub repo_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSection {
    /// Prefix for `/proc` and `/sys`
    #[serde(default = "default_system_root")]
    pub root: PathBuf,
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginsSection {
    /// Slugs to load; all built-in plugins when absent
    #[serde(default)]
    pub enabled: Option<Vec<String>>,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    8080
}

fn default_options_path() -> PathBuf {
    PathBuf::from("data/plugin_options.json")
}

#[expect(
    clippy::unnecessary_wraps,
    reason = "serde default for an optional path"
)]
fn default_events_path() -> Option<PathBuf> {
    Some(PathBuf::from("data/events.log"))
}

fn default_event_capacity() -> usize {
    1000
}

fn default_system_name() -> String {
    "Irrigo".to_owned()
}

fn default_true() -> bool {
    true
}

fn default_wunderground_base() -> String {
    WeatherSettings::default().wunderground_base
}

fn default_autocomplete_base() -> String {
    WeatherSettings::default().autocomplete_base
}

fn default_yahoo_query_base() -> String {
    WeatherSettings::default().yahoo_query_base
}

fn default_yahoo_forecast_base() -> String {
    WeatherSettings::default().yahoo_forecast_base
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_smtp_host() -> String {
    MailSettings::default().smtp_host
}

fn default_smtp_port() -> u16 {
    MailSettings::default().smtp_port
}

fn default_repo_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_system_root() -> PathBuf {
    PathBuf::from("/")
}

fn default_i2c_bus() -> u8 {
    1
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            options_path: default_options_path(),
            events_path: default_events_path(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            name: default_system_name(),
            location: String::new(),
            temp_unit: TempUnit::default(),
            rain_sensor_file: None,
            stations: Vec::new(),
        }
    }
}

impl Default for WeatherSection {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            wunderground_base: default_wunderground_base(),
            autocomplete_base: default_autocomplete_base(),
            yahoo_query_base: default_yahoo_query_base(),
            yahoo_forecast_base: default_yahoo_forecast_base(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for EmailSection {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            use_tls: true,
        }
    }
}

impl Default for UpdateSection {
    fn default() -> Self {
        Self {
            repo_path: default_repo_path(),
        }
    }
}

impl Default for SystemSection {
    fn default() -> Self {
        Self {
            root: default_system_root(),
            i2c_bus: default_i2c_bus(),
        }
    }
}

impl IrrigoConfig {
    /// Load and validate configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("server.port must be non-zero");
        }
        if self.storage.event_capacity == 0 {
            bail!("storage.event_capacity must be at least 1");
        }
        if self.controller.name.trim().is_empty() {
            bail!("controller.name must not be empty");
        }
        if self.weather.timeout_secs == 0 {
            bail!("weather.timeout_secs must be at least 1");
        }
        if self.email.smtp_host.trim().is_empty() {
            bail!("email.smtp_host must not be empty");
        }

        let mut names = BTreeSet::new();
        for station in &self.controller.stations {
            if !names.insert(station.name.as_str()) {
                bail!("Duplicate station name '{}'", station.name);
            }
        }

        if let Some(enabled) = &self.plugins.enabled {
            let mut seen = BTreeSet::new();
            for slug in enabled {
                if !seen.insert(slug.as_str()) {
                    bail!("Plugin '{slug}' is listed twice in plugins.enabled");
                }
            }
        }
        Ok(())
    }

    /// Whether the plugin with `slug` should be loaded
    pub fn plugin_enabled(&self, slug: &str) -> bool {
        self.plugins
            .enabled
            .as_ref()
            .is_none_or(|enabled| enabled.iter().any(|s| s == slug))
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        let section = &self.controller;
        ControllerSettings {
            name: section.name.clone(),
            location: section.location.clone(),
            temp_unit: section.temp_unit,
            stations: section
                .stations
                .iter()
                .enumerate()
                .map(|(index, station)| Station {
                    index,
                    name: station.name.clone(),
                    enabled: station.enabled,
                })
                .collect(),
            rain_sensor_file: section.rain_sensor_file.clone(),
        }
    }

    pub fn weather_settings(&self) -> WeatherSettings {
        let section = &self.weather;
        WeatherSettings {
            api_key: section.api_key.clone(),
            wunderground_base: section.wunderground_base.clone(),
            autocomplete_base: section.autocomplete_base.clone(),
            yahoo_query_base: section.yahoo_query_base.clone(),
            yahoo_forecast_base: section.yahoo_forecast_base.clone(),
            timeout: Duration::from_secs(section.timeout_secs),
        }
    }

    pub fn builtin_settings(&self) -> BuiltinSettings {
        BuiltinSettings {
            mail: MailSettings {
                smtp_host: self.email.smtp_host.clone(),
                smtp_port: self.email.smtp_port,
                use_tls: self.email.use_tls,
            },
            repo_path: self.update.repo_path.clone(),
            system_root: self.system.root.clone(),
            i2c_bus: self.system.i2c_bus,
        }
    }
}
