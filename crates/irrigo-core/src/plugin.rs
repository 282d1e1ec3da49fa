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

//! Plugin trait and the context handed to every plugin hook.

use crate::controller::Controller;
use crate::event_log::EventLog;
use crate::options_store::OptionsStore;
use crate::registers::SharedRegisters;
use crate::sleep::{Subscription, WakeHandle};
use async_trait::async_trait;
use irrigo_types::{FieldSpec, LogEntry, OptionMap, OptionValue, Severity};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    /// Required settings are missing; the worker keeps its normal cadence
    #[error("{0}")]
    NotConfigured(String),

    #[error("no data available: {0}")]
    NoDataAvailable(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PluginError {
    /// The error message followed by every underlying cause
    #[must_use]
    pub fn chain(&self) -> String {
        if let Self::Other(e) = self {
            return format!("{e:#}");
        }
        let mut text = self.to_string();
        let mut source = self.source();
        while let Some(cause) = source {
            text.push_str(": ");
            text.push_str(&cause.to_string());
            source = cause.source();
        }
        text
    }
}

/// Sleep intervals of a plugin's background worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSchedule {
    /// Pause after a cycle while enabled
    pub active_interval: Duration,
    /// Pause while the plugin's enable option is off
    pub disabled_interval: Duration,
    /// Pause after a failed cycle
    pub retry_interval: Duration,
    /// Pause before the first cycle
    pub startup_delay: Duration,
}

impl Default for WorkerSchedule {
    fn default() -> Self {
        Self {
            active_interval: Duration::from_secs(3600),
            disabled_interval: Duration::from_secs(24 * 3600),
            retry_interval: Duration::from_secs(60),
            startup_delay: Duration::ZERO,
        }
    }
}

/// Button on a plugin page, posted to `/plugins/{slug}/actions/{id}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageAction {
    pub id: &'static str,
    pub label: String,
}

impl PageAction {
    pub fn new(id: &'static str, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
        }
    }
}

/// What the web layer does after an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Back to the plugin page
    Redirect,
    /// Wake the worker, wait for its cycle, then back to the plugin page
    RefreshAndRedirect,
    /// Show the restarting page
    Restarting,
}

/// Everything a plugin can reach, shared by all plugins
#[derive(Clone)]
pub struct Services {
    pub options: Arc<OptionsStore>,
    pub events: Arc<EventLog>,
    pub registers: Arc<SharedRegisters>,
    pub controller: Arc<dyn Controller>,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("options", &self.options)
            .field("events", &self.events.len())
            .field("registers", &self.registers)
            .field("controller", &self.controller.system_name())
            .finish()
    }
}

/// Services scoped to a single plugin
#[derive(Debug, Clone)]
pub struct PluginContext {
    name: Arc<str>,
    services: Services,
}

impl PluginContext {
    pub fn new(name: &str, services: Services) -> Self {
        Self {
            name: Arc::from(name),
            services,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn services(&self) -> &Services {
        &self.services
    }

    #[must_use]
    pub fn registers(&self) -> &SharedRegisters {
        &self.services.registers
    }

    #[must_use]
    pub fn controller(&self) -> &dyn Controller {
        self.services.controller.as_ref()
    }

    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.services.events
    }

    /// Snapshot of this plugin's options
    #[must_use]
    pub fn options(&self) -> OptionMap {
        self.services.options.get(&self.name).unwrap_or_default()
    }

    #[must_use]
    pub fn option(&self, key: &str) -> Option<OptionValue> {
        self.services.options.value(&self.name, key)
    }

    #[must_use]
    pub fn option_bool(&self, key: &str) -> bool {
        self.option(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    #[must_use]
    pub fn option_i64(&self, key: &str) -> i64 {
        self.option(key).and_then(|v| v.as_i64()).unwrap_or(0)
    }

    #[must_use]
    pub fn option_f64(&self, key: &str) -> f64 {
        self.option(key).and_then(|v| v.as_f64()).unwrap_or(0.0)
    }

    #[must_use]
    pub fn option_str(&self, key: &str) -> String {
        self.option(key)
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn option_list(&self, key: &str) -> Vec<i64> {
        self.option(key)
            .and_then(|v| v.as_list().map(<[i64]>::to_vec))
            .unwrap_or_default()
    }

    pub fn log(&self, severity: Severity, message: impl Into<String>) {
        self.services.events.append(&self.name, severity, message);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(Severity::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Severity::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(Severity::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Severity::Error, message);
    }

    pub fn clear_log(&self) {
        self.services.events.clear_plugin(&self.name);
    }

    #[must_use]
    pub fn log_entries(&self) -> Vec<LogEntry> {
        self.services.events.entries_for(&self.name)
    }
}

/// A controller plugin.
///
/// Plugins with a `schedule` get a background worker that calls `run_cycle`.
/// Page-only plugins leave `schedule` at `None`.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Display name, also the key in the options document, registers and event log
    fn name(&self) -> &str;

    /// URL segment of the plugin pages
    fn slug(&self) -> &str;

    fn defaults(&self) -> OptionMap {
        OptionMap::new()
    }

    /// Settings form fields
    fn fields(&self, _ctx: &PluginContext) -> Vec<FieldSpec> {
        Vec::new()
    }

    fn schedule(&self) -> Option<WorkerSchedule> {
        None
    }

    /// Boolean option gating the worker, `None` when the worker always runs
    fn enable_key(&self) -> Option<&'static str> {
        Some("enabled")
    }

    /// Whether the worker clears this plugin's log entries before each cycle
    fn clears_log_each_cycle(&self) -> bool {
        true
    }

    /// Register with external signal sources that should wake the worker
    fn subscribe(&self, _ctx: &PluginContext, _wake: WakeHandle) -> Vec<Subscription> {
        Vec::new()
    }

    async fn on_start(&self, _ctx: &PluginContext) -> Result<(), PluginError> {
        Ok(())
    }

    /// One fetch, compute, apply, log pass
    async fn run_cycle(&self, _ctx: &PluginContext) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called by the worker on every iteration while disabled
    fn on_disabled(&self, ctx: &PluginContext) {
        ctx.registers().clear_plugin(ctx.name());
    }

    /// Called after the worker has been joined
    fn on_stop(&self, ctx: &PluginContext) {
        ctx.registers().clear_plugin(ctx.name());
    }

    /// Lines shown in the status block of the plugin page
    async fn status(&self, _ctx: &PluginContext) -> Vec<String> {
        Vec::new()
    }

    /// Whether the page should wait for the worker's first cycle before rendering
    fn waits_for_first_cycle(&self) -> bool {
        false
    }

    fn actions(&self) -> Vec<PageAction> {
        Vec::new()
    }

    async fn handle_action(
        &self,
        _ctx: &PluginContext,
        action: &str,
    ) -> Result<ActionOutcome, PluginError> {
        Err(PluginError::Other(anyhow::anyhow!(
            "unsupported action '{action}'"
        )))
    }
}
