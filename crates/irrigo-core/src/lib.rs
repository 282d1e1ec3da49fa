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

//! Irrigo plugin host core.
//!
//! Holds the state every plugin shares (options, event log, decision
//! registers, controller facade) and runs one background worker per plugin.

pub mod controller;
pub mod event_log;
pub mod options_store;
pub mod persistence;
pub mod plugin;
pub mod registers;
pub mod sleep;
pub mod supervisor;
pub mod worker;

pub use controller::{Controller, ControllerSettings, InMemoryController};
pub use event_log::{EventLog, FileEvent, read_events_file};
pub use options_store::{OptionsError, OptionsStore, UpdateReport};
pub use persistence::OptionsPersistence;
pub use plugin::{
    ActionOutcome, PageAction, Plugin, PluginContext, PluginError, Services, WorkerSchedule,
};
pub use registers::{RegistersSnapshot, SharedRegisters};
pub use sleep::{SleepOutcome, Sleeper, Subscription, WakeHandle};
pub use supervisor::PluginSupervisor;
pub use worker::{CycleOutcome, WorkerStatus};
