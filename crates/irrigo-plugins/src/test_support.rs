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

//! Shared fakes for plugin tests.

use crate::weather::{DailyWeather, WeatherError, WeatherProvider, WeatherSource};
use async_trait::async_trait;
use irrigo_core::{
    ControllerSettings, EventLog, InMemoryController, OptionsStore, Services, SharedRegisters,
    Subscription, WakeHandle,
};
use irrigo_types::{ConditionCode, CurrentConditions, Station, WeatherCondition};
use std::sync::Arc;

pub(crate) fn controller_settings() -> ControllerSettings {
    ControllerSettings {
        name: "Garden".to_owned(),
        location: "Prague".to_owned(),
        stations: vec![
            Station {
                index: 0,
                name: "Lawn".to_owned(),
                enabled: true,
            },
            Station {
                index: 1,
                name: "Roses".to_owned(),
                enabled: true,
            },
        ],
        ..ControllerSettings::default()
    }
}

pub(crate) fn services_with(settings: ControllerSettings, events: EventLog) -> (Services, Arc<InMemoryController>) {
    let controller = Arc::new(InMemoryController::new(settings));
    let services = Services {
        options: Arc::new(OptionsStore::in_memory()),
        events: Arc::new(events),
        registers: Arc::new(SharedRegisters::new()),
        controller: controller.clone(),
    };
    (services, controller)
}

pub(crate) fn services() -> (Services, Arc<InMemoryController>) {
    services_with(controller_settings(), EventLog::default())
}

/// Weather source answering from fixed data
#[derive(Debug, Clone)]
pub(crate) struct FakeWeather {
    pub condition: WeatherCondition,
    pub history: DailyWeather,
    pub forecast: DailyWeather,
    pub conditions: CurrentConditions,
}

impl Default for FakeWeather {
    fn default() -> Self {
        Self {
            condition: WeatherCondition {
                text: "Fair".to_owned(),
                code: ConditionCode::Yahoo(34),
            },
            history: DailyWeather::new(),
            forecast: DailyWeather::new(),
            conditions: CurrentConditions::default(),
        }
    }
}

impl FakeWeather {
    pub(crate) fn with_condition(condition: WeatherCondition) -> Self {
        Self {
            condition,
            ..Self::default()
        }
    }
}

#[async_trait]
impl WeatherSource for FakeWeather {
    async fn current_condition(
        &self,
        _provider: WeatherProvider,
        _location: &str,
        _api_key: &str,
    ) -> Result<WeatherCondition, WeatherError> {
        Ok(self.condition.clone())
    }

    async fn history(&self, _location: &str, days: u32) -> Result<DailyWeather, WeatherError> {
        let days = i64::from(days);
        Ok(self
            .history
            .iter()
            .filter(|(offset, _)| -**offset <= days)
            .map(|(k, v)| (*k, *v))
            .collect())
    }

    async fn forecast(&self, _location: &str, days: u32) -> Result<DailyWeather, WeatherError> {
        let days = i64::from(days);
        Ok(self
            .forecast
            .iter()
            .filter(|(offset, _)| **offset < days)
            .map(|(k, v)| (*k, *v))
            .collect())
    }

    async fn conditions(&self, _location: &str) -> Result<CurrentConditions, WeatherError> {
        Ok(self.conditions.clone())
    }

    fn subscribe(&self, _wake: WakeHandle) -> Subscription {
        Subscription::new(|| {})
    }
}
