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

//! Built-in Irrigo plugins.

pub mod email;
pub mod git;
pub mod rain_delay;
pub mod system_debug;
pub mod system_info;
pub mod system_update;
pub mod water_level;
pub mod weather;

#[cfg(test)]
mod test_support;

pub use email::{EmailPlugin, MailSettings, MailTransport, OutgoingMail, SmtpMailer};
pub use git::{Git, GitRepo};
pub use rain_delay::RainDelayPlugin;
pub use system_debug::SystemDebugPlugin;
pub use system_info::SystemInfoPlugin;
pub use system_update::SystemUpdatePlugin;
pub use water_level::WaterLevelPlugin;
pub use weather::{WeatherError, WeatherService, WeatherSettings, WeatherSource};

use irrigo_core::Plugin;
use std::path::PathBuf;
use std::sync::Arc;

/// Host-level settings the built-in plugins need
#[derive(Debug, Clone)]
pub struct BuiltinSettings {
    pub mail: MailSettings,
    /// Checkout inspected by the update plugin
    pub repo_path: PathBuf,
    /// Prefix for `/proc` and `/sys` reads
    pub system_root: PathBuf,
    pub i2c_bus: u8,
}

impl Default for BuiltinSettings {
    fn default() -> Self {
        Self {
            mail: MailSettings::default(),
            repo_path: PathBuf::from("."),
            system_root: PathBuf::from("/"),
            i2c_bus: 1,
        }
    }
}

/// Every built-in plugin, in menu order
#[must_use]
pub fn builtin_plugins(settings: &BuiltinSettings, weather: &Arc<WeatherService>) -> Vec<Arc<dyn Plugin>> {
    let weather_source: Arc<dyn WeatherSource> = weather.clone();
    vec![
        Arc::new(RainDelayPlugin::new(weather_source.clone())),
        Arc::new(WaterLevelPlugin::new(weather_source)),
        Arc::new(EmailPlugin::new(Arc::new(SmtpMailer::new(
            settings.mail.clone(),
        )))),
        Arc::new(SystemUpdatePlugin::new(Arc::new(GitRepo::new(
            settings.repo_path.clone(),
        )))),
        Arc::new(SystemDebugPlugin),
        Arc::new(SystemInfoPlugin::new(
            settings.system_root.clone(),
            settings.i2c_bus,
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_builtin_slugs_are_unique() {
        let weather = Arc::new(WeatherService::new(&WeatherSettings::default()).unwrap());
        let plugins = builtin_plugins(&BuiltinSettings::default(), &weather);

        let slugs: BTreeSet<&str> = plugins.iter().map(|p| p.slug()).collect();
        assert_eq!(slugs.len(), 6);
        assert!(slugs.contains("weather_based_rain_delay"));
        assert!(slugs.contains("system_info"));
    }
}
