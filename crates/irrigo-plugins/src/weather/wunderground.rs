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

//! Weather Underground REST client.

use super::{DailyWeather, WeatherError, json_number};
use chrono::{Duration as ChronoDuration, NaiveDate};
use irrigo_types::{ConditionCode, CurrentConditions, DayWeather, WeatherCondition};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

const KPH_TO_MS: f64 = 1.0 / 3.6;

#[derive(Debug, Clone)]
pub struct WundergroundClient {
    client: Client,
    api_base: String,
    autocomplete_base: String,
}

impl WundergroundClient {
    pub fn new(
        client: Client,
        api_base: impl Into<String>,
        autocomplete_base: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_owned(),
            autocomplete_base: autocomplete_base.into().trim_end_matches('/').to_owned(),
        }
    }

    /// Resolve a free-form location into a query id (`zmw:...` or `pws:...`)
    pub async fn resolve_location(&self, location: &str) -> Result<String, WeatherError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(WeatherError::MissingLocation);
        }
        if location.starts_with("pws:") || location.starts_with("zmw:") {
            return Ok(location.to_owned());
        }

        let url = format!("{}/aq", self.autocomplete_base);
        debug!("Resolving weather location '{location}'");
        let data: Value = self
            .client
            .get(&url)
            .query(&[("h", "0"), ("query", location)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        data.pointer("/RESULTS/0/zmw")
            .and_then(Value::as_str)
            .map(|zmw| format!("zmw:{zmw}"))
            .ok_or_else(|| WeatherError::LocationNotFound(location.to_owned()))
    }

    pub async fn conditions(
        &self,
        api_key: &str,
        lid: &str,
    ) -> Result<(WeatherCondition, CurrentConditions), WeatherError> {
        let data = self.query(api_key, "conditions", lid).await?;
        parse_conditions(&data)
    }

    pub async fn forecast(
        &self,
        api_key: &str,
        lid: &str,
        days: u32,
    ) -> Result<DailyWeather, WeatherError> {
        let data = self.query(api_key, "forecast10day", lid).await?;
        parse_forecast(&data, days)
    }

    /// Observed days before `today`
    pub async fn history(
        &self,
        api_key: &str,
        lid: &str,
        days: u32,
        today: NaiveDate,
    ) -> Result<DailyWeather, WeatherError> {
        let mut result = DailyWeather::new();
        for offset in 1..=i64::from(days) {
            let date = today - ChronoDuration::days(offset);
            let feature = format!("history_{}", date.format("%Y%m%d"));
            let data = self.query(api_key, &feature, lid).await?;
            match parse_history_day(&data) {
                Some(day) => {
                    result.insert(-offset, day);
                }
                None => debug!("No history summary for {date}"),
            }
        }
        Ok(result)
    }

    async fn query(&self, api_key: &str, feature: &str, lid: &str) -> Result<Value, WeatherError> {
        if api_key.trim().is_empty() {
            return Err(WeatherError::MissingApiKey);
        }
        let url = format!("{}/api/{}/{feature}/q/{lid}.json", self.api_base, api_key.trim());
        let data: Value = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = data.pointer("/response/error") {
            let description = error
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(WeatherError::Api(description.to_owned()));
        }
        Ok(data)
    }
}

fn parse_conditions(data: &Value) -> Result<(WeatherCondition, CurrentConditions), WeatherError> {
    let observation = data
        .get("current_observation")
        .ok_or_else(|| WeatherError::InvalidData("missing current_observation".to_owned()))?;

    let text = observation
        .get("weather")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let icon = observation
        .get("icon")
        .and_then(Value::as_str)
        .filter(|icon| !icon.is_empty())
        .ok_or_else(|| WeatherError::InvalidData("missing condition icon".to_owned()))?
        .to_owned();

    let current = CurrentConditions {
        description: text.clone(),
        icon: icon.clone(),
        temp_c: json_number(observation.get("temp_c")),
        temp_f: json_number(observation.get("temp_f")),
        rain_mm: json_number(observation.get("precip_today_metric")),
        temperature_string: observation
            .get("temperature_string")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
    };

    Ok((
        WeatherCondition {
            text,
            code: ConditionCode::Icon(icon),
        },
        current,
    ))
}

fn parse_forecast(data: &Value, days: u32) -> Result<DailyWeather, WeatherError> {
    let forecast_days = data
        .pointer("/forecast/simpleforecast/forecastday")
        .and_then(Value::as_array)
        .ok_or_else(|| WeatherError::InvalidData("missing forecast days".to_owned()))?;

    let mut result = DailyWeather::new();
    for (offset, day) in (0_i64..).zip(forecast_days.iter().take(days as usize)) {
        let high = json_number(day.pointer("/high/celsius"));
        let low = json_number(day.pointer("/low/celsius"));
        let (Some(high), Some(low)) = (high, low) else {
            continue;
        };
        result.insert(
            offset,
            DayWeather {
                temp_c: (high + low) / 2.0,
                wind_ms: json_number(day.pointer("/avewind/kph")).unwrap_or(0.0) * KPH_TO_MS,
                humidity: json_number(day.get("avehumidity")).unwrap_or(50.0),
                rain_mm: json_number(day.pointer("/qpf_allday/mm")).unwrap_or(0.0),
            },
        );
    }
    Ok(result)
}

fn parse_history_day(data: &Value) -> Option<DayWeather> {
    let summary = data.pointer("/history/dailysummary/0")?;
    let temp_c = json_number(summary.get("meantempm"))?;
    let humidity = json_number(summary.get("humidity")).or_else(|| {
        let max = json_number(summary.get("maxhumidity"))?;
        let min = json_number(summary.get("minhumidity"))?;
        Some((max + min) / 2.0)
    })?;

    Some(DayWeather {
        temp_c,
        wind_ms: json_number(summary.get("meanwindspdm")).unwrap_or(0.0) * KPH_TO_MS,
        humidity,
        rain_mm: json_number(summary.get("precipm")).unwrap_or(0.0),
    })
}
