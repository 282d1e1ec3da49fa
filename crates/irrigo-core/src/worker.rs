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

//! Background worker loop shared by every scheduled plugin.
//!
//! One iteration:
//! 1. clear the plugin's log entries (unless the plugin opts out)
//! 2. if the enable option is off: clear owned registers, log, long sleep
//! 3. otherwise run the cycle and sleep the active interval
//!
//! Failures are logged once and followed by the retry interval. A panic in
//! the cycle is caught and treated the same way, so the loop only ends on stop.

use crate::plugin::{Plugin, PluginContext, PluginError, WorkerSchedule};
use crate::sleep::{SleepOutcome, Sleeper};
use chrono::{DateTime, Local};
use futures_util::FutureExt;
use irrigo_types::OptionValue;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub const DISABLED_MESSAGE: &str = "Plug-in is disabled.";

/// Result of one loop iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed,
    Disabled,
    NotConfigured(String),
    Failed(String),
}

impl CycleOutcome {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "ok",
            Self::Disabled => "disabled",
            Self::NotConfigured(_) => "not configured",
            Self::Failed(_) => "failed",
        }
    }
}

/// Published after every iteration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStatus {
    pub running: bool,
    pub cycles: u64,
    pub last_outcome: Option<CycleOutcome>,
    pub last_cycle_at: Option<DateTime<Local>>,
    pub next_run_at: Option<DateTime<Local>>,
}

/// Live worker owned by the supervisor
#[derive(Debug)]
pub struct WorkerHandle {
    sleeper: Sleeper,
    status: watch::Receiver<WorkerStatus>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn spawn(
        plugin: Arc<dyn Plugin>,
        ctx: PluginContext,
        schedule: WorkerSchedule,
        sleeper: Sleeper,
    ) -> Self {
        let (status_tx, status_rx) = watch::channel(WorkerStatus::default());
        let task = tokio::spawn(run_worker(plugin, ctx, schedule, sleeper.clone(), status_tx));
        Self {
            sleeper,
            status: status_rx,
            task,
        }
    }

    pub fn wake(&self) {
        self.sleeper.wake();
    }

    #[must_use]
    pub fn status(&self) -> WorkerStatus {
        self.status.borrow().clone()
    }

    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<WorkerStatus> {
        self.status.clone()
    }

    /// Request stop and wait for the loop to exit
    pub async fn shutdown(self) {
        self.sleeper.stop();
        if let Err(e) = self.task.await {
            debug!("Worker task ended abnormally: {e}");
        }
    }
}

pub async fn run_worker(
    plugin: Arc<dyn Plugin>,
    ctx: PluginContext,
    schedule: WorkerSchedule,
    sleeper: Sleeper,
    status: watch::Sender<WorkerStatus>,
) {
    status.send_modify(|s| s.running = true);
    let _subscriptions = plugin.subscribe(&ctx, sleeper.wake_handle());
    info!(plugin = %ctx.name(), "Worker started");

    if !schedule.startup_delay.is_zero()
        && sleeper.sleep_for(schedule.startup_delay).await == SleepOutcome::Stopped
    {
        finish(&ctx, &status);
        return;
    }

    match AssertUnwindSafe(plugin.on_start(&ctx)).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => ctx.error(e.chain()),
        Err(panic) => ctx.error(format!("Start-up panicked: {}", panic_message(&*panic))),
    }

    while !sleeper.is_stopped() {
        let (outcome, pause) = run_iteration(plugin.as_ref(), &ctx, &schedule).await;

        let now = Local::now();
        let next = chrono::Duration::from_std(pause).ok().map(|d| now + d);
        status.send_modify(|s| {
            s.cycles += 1;
            s.last_outcome = Some(outcome);
            s.last_cycle_at = Some(now);
            s.next_run_at = next;
        });

        if sleeper.sleep_for(pause).await == SleepOutcome::Stopped {
            break;
        }
    }

    finish(&ctx, &status);
}

fn finish(ctx: &PluginContext, status: &watch::Sender<WorkerStatus>) {
    status.send_modify(|s| {
        s.running = false;
        s.next_run_at = None;
    });
    info!(plugin = %ctx.name(), "Worker stopped");
}

/// Run one iteration and return its outcome plus the pause that follows it
async fn run_iteration(
    plugin: &dyn Plugin,
    ctx: &PluginContext,
    schedule: &WorkerSchedule,
) -> (CycleOutcome, Duration) {
    if plugin.clears_log_each_cycle() {
        ctx.clear_log();
    }

    if let Some(key) = plugin.enable_key()
        && !ctx
            .option(key)
            .and_then(|v| OptionValue::as_bool(&v))
            .unwrap_or(true)
    {
        plugin.on_disabled(ctx);
        ctx.info(DISABLED_MESSAGE);
        return (CycleOutcome::Disabled, schedule.disabled_interval);
    }

    match AssertUnwindSafe(plugin.run_cycle(ctx)).catch_unwind().await {
        Ok(Ok(())) => (CycleOutcome::Completed, schedule.active_interval),
        Ok(Err(PluginError::NotConfigured(message))) => {
            ctx.error(message.clone());
            (
                CycleOutcome::NotConfigured(message),
                schedule.active_interval,
            )
        }
        Ok(Err(e)) => {
            let chain = e.chain();
            ctx.error(format!("{}:\n{chain}", plugin.name()));
            (CycleOutcome::Failed(chain), schedule.retry_interval)
        }
        Err(panic) => {
            let message = format!("panicked: {}", panic_message(&*panic));
            ctx.error(format!("{}:\n{message}", plugin.name()));
            (CycleOutcome::Failed(message), schedule.retry_interval)
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ControllerSettings, InMemoryController};
    use crate::event_log::EventLog;
    use crate::options_store::OptionsStore;
    use crate::plugin::Services;
    use crate::registers::SharedRegisters;
    use async_trait::async_trait;
    use irrigo_types::{OptionMap, Severity};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn services() -> Services {
        Services {
            options: Arc::new(OptionsStore::in_memory()),
            events: Arc::new(EventLog::default()),
            registers: Arc::new(SharedRegisters::new()),
            controller: Arc::new(InMemoryController::new(ControllerSettings::default())),
        }
    }

    #[derive(Debug, Default)]
    struct Scripted {
        calls: AtomicUsize,
        fail_first: bool,
        panic_first: bool,
    }

    #[async_trait]
    impl Plugin for Scripted {
        fn name(&self) -> &str {
            "Scripted"
        }

        fn slug(&self) -> &str {
            "scripted"
        }

        fn defaults(&self) -> OptionMap {
            OptionMap::from([("enabled".to_owned(), OptionValue::Bool(true))])
        }

        fn schedule(&self) -> Option<WorkerSchedule> {
            Some(WorkerSchedule::default())
        }

        async fn run_cycle(&self, ctx: &PluginContext) -> Result<(), PluginError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 && self.panic_first {
                panic!("sensor exploded");
            }
            if call == 0 && self.fail_first {
                return Err(anyhow::anyhow!("upstream timeout").into());
            }
            ctx.registers().level_adjustments.set(ctx.name(), 0.5);
            Ok(())
        }
    }

    fn context(plugin: &dyn Plugin, services: &Services) -> PluginContext {
        services.options.register(plugin.name(), plugin.defaults());
        PluginContext::new(plugin.name(), services.clone())
    }

    async fn wait_for_cycles(rx: &mut watch::Receiver<WorkerStatus>, cycles: u64) -> WorkerStatus {
        rx.wait_for(|s| s.cycles >= cycles).await.unwrap().clone()
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_logs_once_and_retries() {
        let services = services();
        let plugin = Arc::new(Scripted {
            fail_first: true,
            ..Default::default()
        });
        let ctx = context(plugin.as_ref(), &services);
        let handle = WorkerHandle::spawn(plugin.clone(), ctx, WorkerSchedule::default(), Sleeper::new());
        let mut rx = handle.subscribe_status();

        let first = wait_for_cycles(&mut rx, 1).await;
        assert!(matches!(first.last_outcome, Some(CycleOutcome::Failed(_))));
        let errors: Vec<_> = services
            .events
            .entries_for("Scripted")
            .into_iter()
            .filter(|e| e.severity == Severity::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("upstream timeout"));

        // Retry comes after 60 s, not after the hour
        let started = tokio::time::Instant::now();
        let second = wait_for_cycles(&mut rx, 2).await;
        assert_eq!(second.last_outcome, Some(CycleOutcome::Completed));
        assert!(started.elapsed() <= Duration::from_secs(61));
        assert_eq!(services.registers.level_adjustments.get("Scripted"), Some(0.5));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_is_contained() {
        let services = services();
        let plugin = Arc::new(Scripted {
            panic_first: true,
            ..Default::default()
        });
        let ctx = context(plugin.as_ref(), &services);
        let handle = WorkerHandle::spawn(plugin.clone(), ctx, WorkerSchedule::default(), Sleeper::new());
        let mut rx = handle.subscribe_status();

        let first = wait_for_cycles(&mut rx, 1).await;
        assert!(matches!(first.last_outcome, Some(CycleOutcome::Failed(ref m)) if m.contains("sensor exploded")));

        let second = wait_for_cycles(&mut rx, 2).await;
        assert_eq!(second.last_outcome, Some(CycleOutcome::Completed));
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_clears_register_and_wake_reenables() {
        let services = services();
        let plugin = Arc::new(Scripted::default());
        let ctx = context(plugin.as_ref(), &services);
        let handle = WorkerHandle::spawn(plugin.clone(), ctx, WorkerSchedule::default(), Sleeper::new());
        let mut rx = handle.subscribe_status();

        wait_for_cycles(&mut rx, 1).await;
        assert!(services.registers.level_adjustments.contains("Scripted"));

        services
            .options
            .web_update("Scripted", &[("enabled".to_owned(), "off".to_owned())])
            .unwrap();
        handle.wake();
        let disabled = wait_for_cycles(&mut rx, 2).await;
        assert_eq!(disabled.last_outcome, Some(CycleOutcome::Disabled));
        assert!(!services.registers.level_adjustments.contains("Scripted"));
        let entries = services.events.entries_for("Scripted");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, DISABLED_MESSAGE);

        services
            .options
            .web_update("Scripted", &[("enabled".to_owned(), "on".to_owned())])
            .unwrap();
        handle.wake();
        let enabled = wait_for_cycles(&mut rx, 3).await;
        assert_eq!(enabled.last_outcome, Some(CycleOutcome::Completed));
        assert_eq!(services.registers.level_adjustments.get("Scripted"), Some(0.5));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_marks_not_running() {
        let services = services();
        let plugin = Arc::new(Scripted::default());
        let ctx = context(plugin.as_ref(), &services);
        let handle = WorkerHandle::spawn(plugin.clone(), ctx, WorkerSchedule::default(), Sleeper::new());
        let mut rx = handle.subscribe_status();
        wait_for_cycles(&mut rx, 1).await;

        handle.shutdown().await;

        let status = rx.borrow().clone();
        assert!(!status.running);
        assert_eq!(status.next_run_at, None);
        assert_eq!(plugin.calls.load(Ordering::SeqCst), 1);
    }
}
