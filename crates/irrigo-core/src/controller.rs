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

//! The part of the irrigation controller that plugins can see and drive.

use chrono::{DateTime, Duration as ChronoDuration, Local};
use irrigo_types::{FinishedRun, Station, TempUnit};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info};

/// Controller facade used by plugins
pub trait Controller: Send + Sync {
    fn system_name(&self) -> String;

    /// Free-form location used for weather lookups
    fn location(&self) -> String;

    fn temp_unit(&self) -> TempUnit;

    fn stations(&self) -> Vec<Station>;

    /// Current rain sensor state
    fn rain_sensed(&self) -> bool;

    /// Completed runs, oldest first
    fn finished_runs(&self) -> Vec<FinishedRun>;

    /// Whether a run-once program is currently active on `station`
    fn run_once_active(&self, station: usize) -> bool;

    /// Schedule a run-once program; one duration per station, zero skips it
    fn set_run_once(&self, durations: Vec<Duration>);

    /// Stop every station that is running because of a rain block
    fn stop_on_rain(&self);

    /// Ask the host to restart itself after `delay`
    fn request_restart(&self, delay: Duration);
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub name: String,
    pub location: String,
    pub temp_unit: TempUnit,
    pub stations: Vec<Station>,
    /// File holding the rain sensor state (`1`/`0`), read on every query
    pub rain_sensor_file: Option<PathBuf>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            name: "Irrigo".to_owned(),
            location: String::new(),
            temp_unit: TempUnit::Celsius,
            stations: Vec::new(),
            rain_sensor_file: None,
        }
    }
}

/// Controller state held in process memory
#[derive(Debug)]
pub struct InMemoryController {
    name: String,
    location: RwLock<String>,
    temp_unit: TempUnit,
    stations: RwLock<Vec<Station>>,
    rain_sensor_file: Option<PathBuf>,
    rain_sensed: AtomicBool,
    finished: RwLock<Vec<FinishedRun>>,
    /// Station index -> end of its run-once slot
    run_once: RwLock<BTreeMap<usize, DateTime<Local>>>,
    stop_on_rain_calls: AtomicUsize,
    restart: Notify,
    restart_delay: Mutex<Duration>,
}

impl InMemoryController {
    #[must_use]
    pub fn new(settings: ControllerSettings) -> Self {
        Self {
            name: settings.name,
            location: RwLock::new(settings.location),
            temp_unit: settings.temp_unit,
            stations: RwLock::new(settings.stations),
            rain_sensor_file: settings.rain_sensor_file,
            rain_sensed: AtomicBool::new(false),
            finished: RwLock::new(Vec::new()),
            run_once: RwLock::new(BTreeMap::new()),
            stop_on_rain_calls: AtomicUsize::new(0),
            restart: Notify::new(),
            restart_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn set_location(&self, location: impl Into<String>) {
        *self.location.write() = location.into();
    }

    pub fn set_rain_sensed(&self, sensed: bool) {
        self.rain_sensed.store(sensed, Ordering::SeqCst);
    }

    pub fn record_run(&self, run: FinishedRun) {
        self.finished.write().push(run);
    }

    #[must_use]
    pub fn stop_on_rain_calls(&self) -> usize {
        self.stop_on_rain_calls.load(Ordering::SeqCst)
    }

    /// Resolves once a restart has been requested, yielding the delay
    pub async fn restart_requested(&self) -> Duration {
        self.restart.notified().await;
        *self.restart_delay.lock()
    }

    fn read_rain_sensor_file(&self) -> Option<bool> {
        let path = self.rain_sensor_file.as_ref()?;
        match std::fs::read_to_string(path) {
            Ok(contents) => match contents.trim().to_ascii_lowercase().as_str() {
                "1" | "on" | "true" | "rain" => Some(true),
                "0" | "off" | "false" | "dry" | "" => Some(false),
                other => {
                    debug!("Unexpected rain sensor value '{other}' in {}", path.display());
                    None
                }
            },
            Err(e) => {
                debug!("Cannot read rain sensor file {}: {e}", path.display());
                None
            }
        }
    }
}

impl Controller for InMemoryController {
    fn system_name(&self) -> String {
        self.name.clone()
    }

    fn location(&self) -> String {
        self.location.read().clone()
    }

    fn temp_unit(&self) -> TempUnit {
        self.temp_unit
    }

    fn stations(&self) -> Vec<Station> {
        self.stations.read().clone()
    }

    fn rain_sensed(&self) -> bool {
        self.read_rain_sensor_file()
            .unwrap_or_else(|| self.rain_sensed.load(Ordering::SeqCst))
    }

    fn finished_runs(&self) -> Vec<FinishedRun> {
        self.finished.read().clone()
    }

    fn run_once_active(&self, station: usize) -> bool {
        self.run_once
            .read()
            .get(&station)
            .is_some_and(|until| *until > Local::now())
    }

    fn set_run_once(&self, durations: Vec<Duration>) {
        let now = Local::now();
        let mut run_once = self.run_once.write();
        run_once.clear();
        for (station, duration) in durations.into_iter().enumerate() {
            if duration.is_zero() {
                continue;
            }
            let length = ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::zero());
            run_once.insert(station, now + length);
        }
        info!(stations = run_once.len(), "Run-once program scheduled");
    }

    fn stop_on_rain(&self) {
        self.stop_on_rain_calls.fetch_add(1, Ordering::SeqCst);
        info!("Stopping stations because of rain block");
    }

    fn request_restart(&self, delay: Duration) {
        *self.restart_delay.lock() = delay;
        info!(delay_secs = delay.as_secs(), "Restart requested");
        self.restart.notify_one();
    }
}
