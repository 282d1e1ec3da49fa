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

//! Plugin registry and worker ownership.

use crate::options_store::{OptionsError, UpdateReport};
use crate::plugin::{Plugin, PluginContext, Services};
use crate::sleep::Sleeper;
use crate::worker::{WorkerHandle, WorkerStatus};
use futures_util::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Worker slot for one plugin
#[derive(Debug)]
enum Slot {
    Running(WorkerHandle),
    /// Handle taken by `stop`; the task is still being joined
    Stopping,
}

impl Slot {
    fn handle(&self) -> Option<&WorkerHandle> {
        match self {
            Self::Running(handle) => Some(handle),
            Self::Stopping => None,
        }
    }
}

/// Owns every plugin and at most one worker per plugin.
///
/// `stop_all` is terminal: once it has run, `start` refuses to spawn.
pub struct PluginSupervisor {
    services: Services,
    plugins: Vec<Arc<dyn Plugin>>,
    workers: Mutex<HashMap<String, Slot>>,
    shutdown: CancellationToken,
}

impl fmt::Debug for PluginSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginSupervisor")
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.slug()).collect::<Vec<_>>(),
            )
            .field("running", &self.running_count())
            .finish_non_exhaustive()
    }
}

impl PluginSupervisor {
    /// Register `plugins` and their option defaults.
    ///
    /// When two plugins share a slug the later one replaces the earlier.
    pub fn new(services: Services, plugins: Vec<Arc<dyn Plugin>>) -> Self {
        let mut registry: Vec<Arc<dyn Plugin>> = Vec::with_capacity(plugins.len());
        for plugin in plugins {
            if let Some(pos) = registry.iter().position(|p| p.slug() == plugin.slug()) {
                warn!(slug = %plugin.slug(), "Duplicate plugin slug, keeping the later one");
                registry.remove(pos);
            }
            registry.push(plugin);
        }

        for plugin in &registry {
            services.options.register(plugin.name(), plugin.defaults());
            debug!(plugin = %plugin.name(), slug = %plugin.slug(), "Registered plugin");
        }

        Self {
            services,
            plugins: registry,
            workers: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn services(&self) -> &Services {
        &self.services
    }

    #[must_use]
    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }

    #[must_use]
    pub fn plugin(&self, slug: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.iter().find(|p| p.slug() == slug).cloned()
    }

    #[must_use]
    pub fn context(&self, plugin: &dyn Plugin) -> PluginContext {
        PluginContext::new(plugin.name(), self.services.clone())
    }

    /// Spawn the plugin's worker. Returns false when it is already running or
    /// still stopping, has no worker, the slug is unknown, or `stop_all` has run.
    pub fn start(&self, slug: &str) -> bool {
        if self.shutdown.is_cancelled() {
            warn!(slug = %slug, "Supervisor is shut down, not starting plugin");
            return false;
        }
        let Some(plugin) = self.plugin(slug) else {
            warn!(slug = %slug, "Cannot start unknown plugin");
            return false;
        };
        let Some(schedule) = plugin.schedule() else {
            return false;
        };

        let mut workers = self.workers.lock();
        match workers.get(slug) {
            Some(Slot::Running(_)) => {
                debug!(slug = %slug, "Plugin already running");
                return false;
            }
            Some(Slot::Stopping) => {
                debug!(slug = %slug, "Plugin is still stopping");
                return false;
            }
            None => {}
        }

        let ctx = self.context(plugin.as_ref());
        let sleeper = Sleeper::child_of(&self.shutdown);
        let handle = WorkerHandle::spawn(Arc::clone(&plugin), ctx, schedule, sleeper);
        workers.insert(slug.to_owned(), Slot::Running(handle));
        info!(plugin = %plugin.name(), "Plugin started");
        true
    }

    pub fn start_all(&self) {
        for plugin in &self.plugins {
            self.start(plugin.slug());
        }
    }

    /// Stop the plugin's worker and wait for it to exit. Returns false when
    /// it was not running.
    ///
    /// The slot stays reserved until the task is joined and the stop hook has
    /// run, so a concurrent `start` cannot overlap the old worker.
    pub async fn stop(&self, slug: &str) -> bool {
        let handle = {
            let mut workers = self.workers.lock();
            match workers.remove(slug) {
                Some(Slot::Running(handle)) => {
                    workers.insert(slug.to_owned(), Slot::Stopping);
                    handle
                }
                Some(Slot::Stopping) => {
                    workers.insert(slug.to_owned(), Slot::Stopping);
                    return false;
                }
                None => return false,
            }
        };

        handle.shutdown().await;
        if let Some(plugin) = self.plugin(slug) {
            plugin.on_stop(&self.context(plugin.as_ref()));
            info!(plugin = %plugin.name(), "Plugin stopped");
        }
        self.workers.lock().remove(slug);
        true
    }

    /// Stop every worker. The supervisor cannot start workers afterwards.
    pub async fn stop_all(&self) {
        self.shutdown.cancel();
        let handles: Vec<(String, WorkerHandle)> = {
            let mut workers = self.workers.lock();
            let running: Vec<String> = workers
                .iter()
                .filter(|(_, slot)| slot.handle().is_some())
                .map(|(slug, _)| slug.clone())
                .collect();
            running
                .into_iter()
                .filter_map(|slug| match workers.insert(slug.clone(), Slot::Stopping) {
                    Some(Slot::Running(handle)) => Some((slug, handle)),
                    Some(Slot::Stopping) | None => None,
                })
                .collect()
        };
        let slugs: Vec<String> = handles.iter().map(|(slug, _)| slug.clone()).collect();

        join_all(handles.into_iter().map(|(_, handle)| handle.shutdown())).await;

        for slug in slugs {
            if let Some(plugin) = self.plugin(&slug) {
                plugin.on_stop(&self.context(plugin.as_ref()));
            }
            self.workers.lock().remove(&slug);
        }
        info!("All plugins stopped");
    }

    #[must_use]
    pub fn is_running(&self, slug: &str) -> bool {
        self.workers.lock().get(slug).and_then(Slot::handle).is_some()
    }

    #[must_use]
    pub fn running_count(&self) -> usize {
        self.workers
            .lock()
            .values()
            .filter(|slot| slot.handle().is_some())
            .count()
    }

    /// Make the worker re-evaluate now. Returns false when it is not running.
    pub fn wake(&self, slug: &str) -> bool {
        match self.workers.lock().get(slug).and_then(Slot::handle) {
            Some(handle) => {
                handle.wake();
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn worker_status(&self, slug: &str) -> Option<WorkerStatus> {
        self.workers
            .lock()
            .get(slug)
            .and_then(Slot::handle)
            .map(WorkerHandle::status)
    }

    fn subscribe_status(&self, slug: &str) -> Option<tokio::sync::watch::Receiver<WorkerStatus>> {
        self.workers
            .lock()
            .get(slug)
            .and_then(Slot::handle)
            .map(WorkerHandle::subscribe_status)
    }

    /// Wake the worker and wait until it finishes its next iteration
    pub async fn wake_and_wait(&self, slug: &str, timeout: Duration) -> bool {
        let rx = {
            let workers = self.workers.lock();
            let Some(handle) = workers.get(slug).and_then(Slot::handle) else {
                return false;
            };
            let rx = handle.subscribe_status();
            handle.wake();
            rx
        };
        let seen = rx.borrow().cycles;
        wait_for_cycles(rx, seen + 1, timeout).await
    }

    /// Wait until the worker has completed at least one iteration
    pub async fn wait_for_first_cycle(&self, slug: &str, timeout: Duration) -> bool {
        let Some(rx) = self.subscribe_status(slug) else {
            return false;
        };
        wait_for_cycles(rx, 1, timeout).await
    }

    /// Apply a settings form to the plugin's options and wake its worker.
    ///
    /// A failed save keeps the previous values in effect and is reported as
    /// an error; the worker is not woken.
    pub fn update_options(
        &self,
        slug: &str,
        form: &[(String, String)],
    ) -> Result<UpdateReport, OptionsError> {
        let Some(plugin) = self.plugin(slug) else {
            return Err(OptionsError::UnknownPlugin(slug.to_owned()));
        };

        let report = self.services.options.web_update(plugin.name(), form)?;
        let ctx = self.context(plugin.as_ref());
        for (key, error) in &report.rejected {
            ctx.warn(format!("Ignoring invalid value for {key}: {error}"));
        }
        self.wake(slug);
        Ok(report)
    }
}

async fn wait_for_cycles(
    mut rx: tokio::sync::watch::Receiver<WorkerStatus>,
    cycles: u64,
    timeout: Duration,
) -> bool {
    matches!(
        tokio::time::timeout(timeout, rx.wait_for(|s| s.cycles >= cycles)).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ControllerSettings, InMemoryController};
    use crate::event_log::EventLog;
    use crate::options_store::OptionsStore;
    use crate::plugin::{PluginError, WorkerSchedule};
    use crate::registers::SharedRegisters;
    use async_trait::async_trait;
    use irrigo_types::{OptionMap, OptionValue};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn services() -> Services {
        Services {
            options: Arc::new(OptionsStore::in_memory()),
            events: Arc::new(EventLog::default()),
            registers: Arc::new(SharedRegisters::new()),
            controller: Arc::new(InMemoryController::new(ControllerSettings::default())),
        }
    }

    #[derive(Debug)]
    struct Counter {
        slug: &'static str,
        cycles: AtomicUsize,
    }

    impl Counter {
        fn new(slug: &'static str) -> Arc<Self> {
            Arc::new(Self {
                slug,
                cycles: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Plugin for Counter {
        fn name(&self) -> &str {
            self.slug
        }

        fn slug(&self) -> &str {
            self.slug
        }

        fn defaults(&self) -> OptionMap {
            OptionMap::from([
                ("enabled".to_owned(), OptionValue::Bool(true)),
                ("level".to_owned(), OptionValue::Int(100)),
            ])
        }

        fn schedule(&self) -> Option<WorkerSchedule> {
            Some(WorkerSchedule::default())
        }

        async fn run_cycle(&self, ctx: &PluginContext) -> Result<(), PluginError> {
            self.cycles.fetch_add(1, Ordering::SeqCst);
            #[expect(clippy::cast_precision_loss, reason = "test values")]
            let level = ctx.option_i64("level") as f64 / 100.0;
            ctx.registers().level_adjustments.set(ctx.name(), level);
            Ok(())
        }
    }

    /// Publishes a level, then holds the cycle open for ten seconds
    #[derive(Debug, Default)]
    struct Slow {
        entered: Notify,
        live: AtomicUsize,
        max_live: AtomicUsize,
    }

    #[async_trait]
    impl Plugin for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        fn slug(&self) -> &str {
            "slow"
        }

        fn enable_key(&self) -> Option<&'static str> {
            None
        }

        fn schedule(&self) -> Option<WorkerSchedule> {
            Some(WorkerSchedule::default())
        }

        async fn run_cycle(&self, ctx: &PluginContext) -> Result<(), PluginError> {
            let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_live.fetch_max(live, Ordering::SeqCst);
            ctx.registers().level_adjustments.set(ctx.name(), 0.5);
            self.entered.notify_one();
            tokio::time::sleep(Duration::from_secs(10)).await;
            self.live.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Debug)]
    struct PageOnly;

    #[async_trait]
    impl Plugin for PageOnly {
        fn name(&self) -> &str {
            "Page"
        }

        fn slug(&self) -> &str {
            "page"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let counter = Counter::new("counter");
        let supervisor = PluginSupervisor::new(services(), vec![counter.clone()]);

        assert!(supervisor.start("counter"));
        assert!(!supervisor.start("counter"));
        assert_eq!(supervisor.running_count(), 1);

        assert!(supervisor.wait_for_first_cycle("counter", Duration::from_secs(5)).await);
        assert_eq!(counter.cycles.load(Ordering::SeqCst), 1);
        supervisor.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_twice_is_noop_and_clears_registers() {
        let services = services();
        let supervisor = PluginSupervisor::new(services.clone(), vec![Counter::new("counter")]);
        supervisor.start("counter");
        supervisor.wait_for_first_cycle("counter", Duration::from_secs(5)).await;
        assert!(services.registers.level_adjustments.contains("counter"));

        assert!(supervisor.stop("counter").await);
        assert!(!supervisor.stop("counter").await);
        assert!(!supervisor.is_running("counter"));
        assert!(!services.registers.level_adjustments.contains("counter"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_options_wakes_worker() {
        let services = services();
        let supervisor = PluginSupervisor::new(services.clone(), vec![Counter::new("counter")]);
        supervisor.start("counter");
        supervisor.wait_for_first_cycle("counter", Duration::from_secs(5)).await;

        let report = supervisor
            .update_options(
                "counter",
                &[
                    ("level".to_owned(), "80".to_owned()),
                    ("junk".to_owned(), "x".to_owned()),
                ],
            )
            .unwrap();
        assert_eq!(report.ignored, vec!["junk".to_owned()]);

        // The hour-long sleep is cut short
        let status = supervisor.worker_status("counter").unwrap();
        let started = tokio::time::Instant::now();
        let mut rx = supervisor.subscribe_status("counter").unwrap();
        rx.wait_for(|s| s.cycles > status.cycles).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(services.registers.level_adjustments.get("counter"), Some(0.8));

        supervisor.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_wake_and_wait() {
        let counter = Counter::new("counter");
        let supervisor = PluginSupervisor::new(services(), vec![counter.clone()]);
        supervisor.start("counter");
        supervisor.wait_for_first_cycle("counter", Duration::from_secs(5)).await;

        assert!(supervisor.wake_and_wait("counter", Duration::from_secs(10)).await);
        assert_eq!(counter.cycles.load(Ordering::SeqCst), 2);
        assert!(!supervisor.wake_and_wait("missing", Duration::from_secs(1)).await);
        supervisor.stop_all().await;
    }

    #[tokio::test]
    async fn test_page_only_plugins_have_no_worker() {
        let supervisor = PluginSupervisor::new(services(), vec![Arc::new(PageOnly)]);

        assert!(!supervisor.start("page"));
        assert!(!supervisor.is_running("page"));
        assert!(!supervisor.wake("page"));
        assert!(supervisor.plugin("page").is_some());
    }

    #[tokio::test]
    async fn test_later_duplicate_wins() {
        let first = Counter::new("counter");
        let second = Counter::new("counter");
        let supervisor = PluginSupervisor::new(services(), vec![first, second.clone()]);

        assert_eq!(supervisor.plugins().len(), 1);
        let kept = supervisor.plugin("counter").unwrap();
        assert!(std::ptr::addr_eq(Arc::as_ptr(&kept), Arc::as_ptr(&second)));
    }

    #[test]
    fn test_unknown_slug_update() {
        let supervisor = PluginSupervisor::new(services(), Vec::new());
        assert!(matches!(
            supervisor.update_options("nope", &[]),
            Err(OptionsError::UnknownPlugin(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_refused_while_previous_worker_stops() {
        let services = services();
        let slow = Arc::new(Slow::default());
        let supervisor = Arc::new(PluginSupervisor::new(services.clone(), vec![slow.clone()]));

        assert!(supervisor.start("slow"));
        slow.entered.notified().await;

        let stopping = tokio::spawn({
            let supervisor = Arc::clone(&supervisor);
            async move { supervisor.stop("slow").await }
        });
        while !matches!(supervisor.workers.lock().get("slow"), Some(Slot::Stopping)) {
            tokio::task::yield_now().await;
        }

        assert!(!supervisor.start("slow"));
        assert!(!supervisor.is_running("slow"));
        assert!(stopping.await.unwrap());
        assert!(!services.registers.level_adjustments.contains("slow"));

        // A start after the old worker is joined publishes again and is not wiped
        assert!(supervisor.start("slow"));
        slow.entered.notified().await;
        assert_eq!(services.registers.level_adjustments.get("slow"), Some(0.5));
        assert!(supervisor.wait_for_first_cycle("slow", Duration::from_secs(30)).await);
        assert_eq!(services.registers.level_adjustments.get("slow"), Some(0.5));
        assert_eq!(slow.max_live.load(Ordering::SeqCst), 1);

        supervisor.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all_is_terminal() {
        let supervisor = PluginSupervisor::new(services(), vec![Counter::new("counter")]);
        assert!(supervisor.start("counter"));
        supervisor.stop_all().await;

        assert!(!supervisor.start("counter"));
        assert!(!supervisor.is_running("counter"));
        assert_eq!(supervisor.running_count(), 0);
        supervisor.start_all();
        assert_eq!(supervisor.running_count(), 0);
    }
}
