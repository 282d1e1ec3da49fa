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

//! Weather-based water level.
//!
//! The baseline (100 %) assumes 4 mm of water per day. The need is scaled by
//! the mean temperature, wind and humidity of the days around today, reduced
//! by the rain that fell or is expected, and published as a level multiplier.
//! Optionally schedules a short frost protection run on cold days.

use crate::weather::{DailyWeather, WeatherSource};
use async_trait::async_trait;
use chrono::{Datelike, Local, NaiveTime, Timelike};
use irrigo_core::{Plugin, PluginContext, PluginError, Subscription, WakeHandle, WorkerSchedule};
use irrigo_types::{
    Choice, DayWeather, FieldSpec, OptionMap, OptionValue, Station, TempUnit,
};
use std::sync::Arc;
use std::time::Duration;

pub const NAME: &str = "Weather-based Water Level";
pub const SLUG: &str = "weather_based_water_level";

const WINDOW: std::ops::Range<i64> = -20..20;
const MM_PER_DAY: f64 = 4.0;

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Result of the water level computation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelReport {
    pub days: usize,
    pub water_needed: f64,
    pub total_rain: f64,
    pub water_left: f64,
    /// Percent, clamped to the configured bounds
    pub adjustment: f64,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Combine history and forecast into one map over the day window.
/// History wins where both have a day.
#[must_use]
pub fn merge_days(history: &DailyWeather, forecast: &DailyWeather) -> DailyWeather {
    WINDOW
        .filter_map(|day| {
            history
                .get(&day)
                .or_else(|| forecast.get(&day))
                .map(|info| (day, *info))
        })
        .collect()
}

/// Part of the day still ahead, 1.0 at midnight
#[must_use]
pub fn day_fraction_left(time: NaiveTime) -> f64 {
    1.0 - f64::from(time.hour() * 60 + time.minute()) / (24.0 * 60.0)
}

/// Replace today's forecast rain by the expected remainder plus what already fell
pub fn apply_today_rain(days: &mut DailyWeather, observed_today: Option<f64>, fraction_left: f64) {
    if let (Some(today), Some(observed)) = (days.get_mut(&0), observed_today) {
        today.rain_mm = today.rain_mm * fraction_left + observed;
    }
}

/// Compute the level adjustment; `None` when there is no data
#[must_use]
#[expect(
    clippy::cast_precision_loss,
    reason = "at most forty days of data"
)]
pub fn compute_adjustment(days: &DailyWeather, wl_min: f64, wl_max: f64) -> Option<LevelReport> {
    if days.is_empty() {
        return None;
    }
    let n = days.len() as f64;
    let mean = |f: fn(&DayWeather) -> f64| days.values().map(f).sum::<f64>() / n;

    let temp = mean(|d| d.temp_c);
    let wind = mean(|d| d.wind_ms);
    let humidity = mean(|d| d.humidity);
    let total_rain: f64 = days.values().map(|d| d.rain_mm).sum();

    let baseline = MM_PER_DAY * n;
    let water_needed = round1(
        baseline
            * (1.0 + (temp - 20.0) / 15.0)
            * (1.0 + wind / 100.0)
            * (1.0 - (humidity - 50.0) / 200.0),
    );
    let water_left = round1((water_needed - total_rain).clamp(0.0, 100.0));
    let adjustment = round1(water_left / baseline * 100.0).min(wl_max).max(wl_min);

    Some(LevelReport {
        days: days.len(),
        water_needed,
        total_rain,
        water_left,
        adjustment,
    })
}

/// Run-once durations for frost protection, `None` when it is not cold enough
/// or the month is not selected.
#[must_use]
pub fn frost_program(
    temperature: f64,
    protect_temp: f64,
    month: u32,
    months: &[i64],
    stations: &[Station],
    protect_stations: &[i64],
    minutes: i64,
) -> Option<Vec<Duration>> {
    if temperature >= protect_temp || !months.contains(&i64::from(month)) {
        return None;
    }

    let len = stations.iter().map(|s| s.index + 1).max().unwrap_or(0);
    let run = Duration::from_secs(u64::try_from(minutes.max(0)).unwrap_or(0) * 60);
    let mut durations = vec![Duration::ZERO; len];
    for station in stations.iter().filter(|s| s.enabled) {
        let selected = i64::try_from(station.index).is_ok_and(|i| protect_stations.contains(&i));
        if selected {
            durations[station.index] = run;
        }
    }
    Some(durations)
}

pub struct WaterLevelPlugin {
    weather: Arc<dyn WeatherSource>,
}

impl std::fmt::Debug for WaterLevelPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaterLevelPlugin").finish_non_exhaustive()
    }
}

impl WaterLevelPlugin {
    pub fn new(weather: Arc<dyn WeatherSource>) -> Self {
        Self { weather }
    }

    fn protect(&self, ctx: &PluginContext, today: &irrigo_types::CurrentConditions) {
        ctx.debug(format!("Temperature: {}", today.temperature_string));

        let controller = ctx.controller();
        let unit = controller.temp_unit();
        let temperature = match unit {
            TempUnit::Celsius => today.temp_c,
            TempUnit::Fahrenheit => today.temp_f.or(today.temp_c.map(|c| unit.from_celsius(c))),
        };
        let Some(temperature) = temperature else {
            ctx.debug("No current temperature, skipping frost protection.");
            return;
        };

        let stations = controller.stations();
        let Some(program) = frost_program(
            temperature,
            ctx.option_f64("protect_temp"),
            Local::now().month(),
            &ctx.option_list("protect_months"),
            &stations,
            &ctx.option_list("protect_stations"),
            ctx.option_i64("protect_minutes"),
        ) else {
            return;
        };

        let busy = stations
            .iter()
            .filter(|s| s.enabled)
            .any(|s| controller.run_once_active(s.index));
        if busy {
            return;
        }

        ctx.debug("Protection activated.");
        controller.set_run_once(program);
    }
}

#[async_trait]
impl Plugin for WaterLevelPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn slug(&self) -> &str {
        SLUG
    }

    fn defaults(&self) -> OptionMap {
        OptionMap::from([
            ("enabled".to_owned(), OptionValue::Bool(false)),
            ("wl_min".to_owned(), OptionValue::Int(0)),
            ("wl_max".to_owned(), OptionValue::Int(200)),
            ("days_history".to_owned(), OptionValue::Int(3)),
            ("days_forecast".to_owned(), OptionValue::Int(3)),
            ("protect_enabled".to_owned(), OptionValue::Bool(false)),
            ("protect_temp".to_owned(), OptionValue::Float(2.0)),
            ("protect_minutes".to_owned(), OptionValue::Int(10)),
            ("protect_stations".to_owned(), OptionValue::List(Vec::new())),
            ("protect_months".to_owned(), OptionValue::List(Vec::new())),
        ])
    }

    fn fields(&self, ctx: &PluginContext) -> Vec<FieldSpec> {
        let controller = ctx.controller();
        let stations = controller
            .stations()
            .into_iter()
            .filter(|s| s.enabled)
            .map(|s| Choice::new(s.index.to_string(), s.name))
            .collect();
        let months = (1..)
            .zip(MONTHS)
            .map(|(number, name): (u32, &str)| Choice::new(number.to_string(), name))
            .collect();

        vec![
            FieldSpec::checkbox("enabled", "Use weather-based water level"),
            FieldSpec::integer("wl_min", "Minimum water level (%)"),
            FieldSpec::integer("wl_max", "Maximum water level (%)"),
            FieldSpec::integer("days_history", "Days of history"),
            FieldSpec::integer("days_forecast", "Days of forecast"),
            FieldSpec::checkbox("protect_enabled", "Frost protection"),
            FieldSpec::decimal(
                "protect_temp",
                format!("Protection temperature ({})", controller.temp_unit().symbol()),
            ),
            FieldSpec::integer("protect_minutes", "Protection run (minutes)"),
            FieldSpec::multi_choice("protect_stations", "Protected stations", stations),
            FieldSpec::multi_choice("protect_months", "Protected months", months),
        ]
    }

    fn schedule(&self) -> Option<WorkerSchedule> {
        Some(WorkerSchedule {
            startup_delay: Duration::from_secs(10),
            retry_interval: Duration::from_secs(3600),
            ..WorkerSchedule::default()
        })
    }

    fn subscribe(&self, _ctx: &PluginContext, wake: WakeHandle) -> Vec<Subscription> {
        vec![self.weather.subscribe(wake)]
    }

    async fn on_start(&self, ctx: &PluginContext) -> Result<(), PluginError> {
        // The stored default is Celsius; convert once for Fahrenheit controllers
        let unit = ctx.controller().temp_unit();
        if unit == TempUnit::Fahrenheit && (ctx.option_f64("protect_temp") - 2.0).abs() < f64::EPSILON {
            ctx.services()
                .options
                .set(ctx.name(), "protect_temp", OptionValue::Float(35.6))
                .map_err(|e| PluginError::Other(anyhow::Error::new(e)))?;
        }
        Ok(())
    }

    async fn run_cycle(&self, ctx: &PluginContext) -> Result<(), PluginError> {
        ctx.debug("Checking weather status...");

        let location = ctx.controller().location();
        let history_days = u32::try_from(ctx.option_i64("days_history").max(0)).unwrap_or(0);
        let forecast_days = u32::try_from(ctx.option_i64("days_forecast").max(0)).unwrap_or(0);

        let history = self.weather.history(&location, history_days).await?;
        let forecast = self.weather.forecast(&location, forecast_days).await?;
        let today = self.weather.conditions(&location).await?;

        let mut days = merge_days(&history, &forecast);
        apply_today_rain(
            &mut days,
            today.rain_mm,
            day_fraction_left(Local::now().time()),
        );

        let Some(report) = compute_adjustment(
            &days,
            ctx.option_f64("wl_min"),
            ctx.option_f64("wl_max"),
        ) else {
            ctx.info(format!("{history:?}"));
            ctx.info(format!("{today:?}"));
            ctx.info(format!("{forecast:?}"));
            return Err(PluginError::NoDataAvailable(
                "No information available!".to_owned(),
            ));
        };

        ctx.info(format!("Using {} days of information.", report.days));
        ctx.info(format!(
            "Water needed ({} days): {:.1}mm",
            report.days, report.water_needed
        ));
        ctx.info(format!("Total rainfall       : {:.1}mm", report.total_rain));
        ctx.info("_______________________________");
        ctx.info(format!("Irrigation needed    : {:.1}mm", report.water_left));
        ctx.info(format!("Weather Adjustment   : {:.1}%", report.adjustment));

        ctx.registers()
            .level_adjustments
            .set(ctx.name(), report.adjustment / 100.0);

        if ctx.option_bool("protect_enabled") {
            self.protect(ctx, &today);
        }
        Ok(())
    }
}
