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

//! Weather-based rain delay.
//!
//! Blocks irrigation for `delay_duration` hours whenever the current weather
//! condition is adverse and lifts the block once the weather is good again.

use crate::weather::{WeatherProvider, WeatherSource};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use irrigo_core::{Plugin, PluginContext, PluginError, WorkerSchedule};
use irrigo_types::{Choice, ConditionCode, FieldSpec, OptionMap, OptionValue};
use std::sync::Arc;
use std::time::Duration;

pub const NAME: &str = "Weather-based Rain Delay";
pub const SLUG: &str = "weather_based_rain_delay";

const YAHOO_RESET: u32 = 36;
const WUNDERGROUND_ADVERSE: [&str; 5] = ["flurries", "sleet", "rain", "snow", "tstorms"];
const WUNDERGROUND_RESET: [&str; 4] = ["sunny", "clear", "mostlysunny", "partlycloudy"];

/// What a condition means for the rain block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RainDecision {
    /// Block irrigation for this many hours
    Block(i64),
    /// Remove an existing block
    Clear,
    NoChange,
}

fn yahoo_adverse(code: u32) -> bool {
    matches!(code, 0..=18 | 35 | 37..=47)
}

fn wunderground_adverse(icon: &str) -> bool {
    let icon = icon.strip_prefix("chance").unwrap_or(icon);
    WUNDERGROUND_ADVERSE.contains(&icon)
}

/// Map a provider condition code to a decision
#[must_use]
pub fn decide(code: &ConditionCode, delay_hours: i64) -> RainDecision {
    let (adverse, reset) = match code {
        ConditionCode::Yahoo(code) => (yahoo_adverse(*code), *code == YAHOO_RESET),
        ConditionCode::Icon(icon) => {
            let icon = icon.to_ascii_lowercase();
            (
                wunderground_adverse(&icon),
                WUNDERGROUND_RESET.contains(&icon.as_str()),
            )
        }
    };

    if adverse && delay_hours > 0 {
        RainDecision::Block(delay_hours)
    } else if reset {
        RainDecision::Clear
    } else {
        RainDecision::NoChange
    }
}

#[must_use]
pub fn block_until(now: DateTime<Utc>, hours: i64) -> DateTime<Utc> {
    now + ChronoDuration::hours(hours)
}

pub struct RainDelayPlugin {
    weather: Arc<dyn WeatherSource>,
}

impl std::fmt::Debug for RainDelayPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RainDelayPlugin").finish_non_exhaustive()
    }
}

impl RainDelayPlugin {
    pub fn new(weather: Arc<dyn WeatherSource>) -> Self {
        Self { weather }
    }
}

#[async_trait]
impl Plugin for RainDelayPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn slug(&self) -> &str {
        SLUG
    }

    fn defaults(&self) -> OptionMap {
        OptionMap::from([
            ("enabled".to_owned(), OptionValue::Bool(false)),
            ("delay_duration".to_owned(), OptionValue::Int(24)),
            ("weather_provider".to_owned(), OptionValue::from("yahoo")),
            ("wapikey".to_owned(), OptionValue::from("")),
        ])
    }

    fn fields(&self, _ctx: &PluginContext) -> Vec<FieldSpec> {
        vec![
            FieldSpec::checkbox("enabled", "Use weather-based rain delay"),
            FieldSpec::integer("delay_duration", "Delay duration (hours)"),
            FieldSpec::choice(
                "weather_provider",
                "Weather provider",
                vec![
                    Choice::new("yahoo", "Yahoo"),
                    Choice::new("wunderground", "Weather Underground"),
                ],
            ),
            FieldSpec::text("wapikey", "Weather Underground API key")
                .with_help("Only needed for the Weather Underground provider."),
        ]
    }

    fn schedule(&self) -> Option<WorkerSchedule> {
        Some(WorkerSchedule {
            retry_interval: Duration::from_secs(3600),
            ..WorkerSchedule::default()
        })
    }

    async fn run_cycle(&self, ctx: &PluginContext) -> Result<(), PluginError> {
        ctx.info("Checking rain status...");

        let provider = WeatherProvider::from_option(&ctx.option_str("weather_provider"));
        let location = ctx.controller().location();
        let condition = self
            .weather
            .current_condition(provider, &location, &ctx.option_str("wapikey"))
            .await?;

        match decide(&condition.code, ctx.option_i64("delay_duration")) {
            RainDecision::Block(hours) => {
                ctx.info(format!(
                    "Rain detected: {}. Adding delay of {hours} hours.",
                    condition.text
                ));
                ctx.registers()
                    .rain_blocks
                    .set(ctx.name(), block_until(Utc::now(), hours));
                ctx.controller().stop_on_rain();
            }
            RainDecision::NoChange => {
                ctx.info(format!(
                    "No rain detected: {}. No action.",
                    condition.text
                ));
            }
            RainDecision::Clear => {
                ctx.info(format!(
                    "Good weather detected: {}. Removing rain delay.",
                    condition.text
                ));
                ctx.registers().rain_blocks.remove(ctx.name());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeWeather, services};
    use irrigo_core::{InMemoryController, Services};
    use irrigo_types::WeatherCondition;

    fn condition(text: &str, code: ConditionCode) -> WeatherCondition {
        WeatherCondition {
            text: text.to_owned(),
            code,
        }
    }

    fn context(services: &Services, plugin: &RainDelayPlugin, pairs: &[(&str, &str)]) -> PluginContext {
        services.options.register(NAME, plugin.defaults());
        let form: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        services.options.web_update(NAME, &form).unwrap();
        PluginContext::new(NAME, services.clone())
    }

    #[test]
    fn test_yahoo_codes() {
        assert_eq!(decide(&ConditionCode::Yahoo(11), 24), RainDecision::Block(24));
        assert_eq!(decide(&ConditionCode::Yahoo(35), 24), RainDecision::Block(24));
        assert_eq!(decide(&ConditionCode::Yahoo(47), 24), RainDecision::Block(24));
        assert_eq!(decide(&ConditionCode::Yahoo(36), 24), RainDecision::Clear);
        assert_eq!(decide(&ConditionCode::Yahoo(32), 24), RainDecision::NoChange);
        assert_eq!(decide(&ConditionCode::Yahoo(19), 24), RainDecision::NoChange);
    }

    #[test]
    fn test_wunderground_icons() {
        let icon = |s: &str| ConditionCode::Icon(s.to_owned());
        assert_eq!(decide(&icon("rain"), 12), RainDecision::Block(12));
        assert_eq!(decide(&icon("chancetstorms"), 12), RainDecision::Block(12));
        assert_eq!(decide(&icon("mostlysunny"), 12), RainDecision::Clear);
        assert_eq!(decide(&icon("cloudy"), 12), RainDecision::NoChange);
        assert_eq!(decide(&icon("chancesunny"), 12), RainDecision::NoChange);
    }

    #[test]
    fn test_zero_duration_does_not_block() {
        assert_eq!(decide(&ConditionCode::Yahoo(11), 0), RainDecision::NoChange);
    }

    #[test]
    fn test_block_until() {
        let now = Utc::now();
        assert_eq!(block_until(now, 24), now + ChronoDuration::hours(24));
    }

    #[tokio::test]
    async fn test_adverse_weather_blocks_and_stops_stations() {
        let (services, controller) = services();
        let weather = Arc::new(FakeWeather::with_condition(condition(
            "Heavy Rain",
            ConditionCode::Yahoo(12),
        )));
        let plugin = RainDelayPlugin::new(weather);
        let ctx = context(&services, &plugin, &[("enabled", "on")]);

        let before = Utc::now();
        plugin.run_cycle(&ctx).await.unwrap();

        let until = services.registers.rain_blocks.get(NAME).unwrap();
        assert!(until >= before + ChronoDuration::hours(24));
        assert!(until <= Utc::now() + ChronoDuration::hours(24));
        assert_eq!(controller.stop_on_rain_calls(), 1);
    }

    #[tokio::test]
    async fn test_good_weather_clears_block() {
        let (services, _controller) = services();
        services.registers.rain_blocks.set(NAME, Utc::now());
        let weather = Arc::new(FakeWeather::with_condition(condition(
            "Sunny",
            ConditionCode::Icon("sunny".to_owned()),
        )));
        let plugin = RainDelayPlugin::new(weather);
        let ctx = context(
            &services,
            &plugin,
            &[("enabled", "on"), ("weather_provider", "wunderground"), ("wapikey", "k")],
        );

        plugin.run_cycle(&ctx).await.unwrap();

        assert!(!services.registers.rain_blocks.contains(NAME));
        let messages: Vec<String> = ctx.log_entries().into_iter().map(|e| e.message).collect();
        assert!(messages.iter().any(|m| m.contains("Removing rain delay")));
    }

    #[tokio::test]
    async fn test_neutral_weather_keeps_block() {
        let (services, _controller): (Services, Arc<InMemoryController>) = services();
        let existing = Utc::now() + ChronoDuration::hours(3);
        services.registers.rain_blocks.set(NAME, existing);
        let weather = Arc::new(FakeWeather::with_condition(condition(
            "Cloudy",
            ConditionCode::Yahoo(26),
        )));
        let plugin = RainDelayPlugin::new(weather);
        let ctx = context(&services, &plugin, &[("enabled", "on")]);

        plugin.run_cycle(&ctx).await.unwrap();

        assert_eq!(services.registers.rain_blocks.get(NAME), Some(existing));
    }
}
