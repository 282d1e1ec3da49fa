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

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use irrigo_core::{
    EventLog, InMemoryController, OptionsPersistence, OptionsStore, PluginSupervisor, Services,
    SharedRegisters,
};
use irrigo_plugins::{WeatherService, builtin_plugins};
use irrigo_web::WebState;

use crate::config::IrrigoConfig;

/// Irrigation controller plugin host
#[derive(Debug, Parser)]
#[command(name = "irrigo", version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(default_value = "irrigo.toml")]
    config: PathBuf,
}

/// Why the main loop ended
#[derive(Debug)]
enum Exit {
    Shutdown,
    Restart(Duration),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!(path = %args.config.display(), "Loading configuration");
    let config = IrrigoConfig::from_file(&args.config)?;

    let options = OptionsStore::open(OptionsPersistence::new(&config.storage.options_path))?;
    info!(path = %config.storage.options_path.display(), "Plugin options loaded");

    let mut events = EventLog::new(config.storage.event_capacity);
    if let Some(path) = &config.storage.events_path {
        events = events.with_file(path);
    }

    let controller = Arc::new(InMemoryController::new(config.controller_settings()));
    let services = Services {
        options: Arc::new(options),
        events: Arc::new(events),
        registers: Arc::new(SharedRegisters::new()),
        controller: Arc::clone(&controller) as _,
    };

    let weather = Arc::new(WeatherService::new(&config.weather_settings())?);
    let plugins = builtin_plugins(&config.builtin_settings(), &weather)
        .into_iter()
        .filter(|plugin| config.plugin_enabled(plugin.slug()))
        .collect::<Vec<_>>();
    if let Some(enabled) = &config.plugins.enabled {
        for slug in enabled {
            if !plugins.iter().any(|p| p.slug() == slug) {
                warn!(slug = %slug, "Unknown plugin in plugins.enabled");
            }
        }
    }
    info!(count = plugins.len(), "Loading plugins");

    let supervisor = Arc::new(PluginSupervisor::new(services, plugins));
    supervisor.start_all();
    info!(workers = supervisor.running_count(), "Plugin workers started");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let bind_address = config.server.bind_address.clone();
    let port = config.server.port;
    let state = WebState::new(Arc::clone(&supervisor));
    let mut server = tokio::spawn(async move {
        irrigo_web::start_web_server(&bind_address, port, state, async {
            let _ = shutdown_rx.await;
        })
        .await
    });

    let exit = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Shutdown requested");
            Exit::Shutdown
        }
        delay = controller.restart_requested() => {
            info!(delay_secs = delay.as_secs(), "Restart requested");
            Exit::Restart(delay)
        }
        result = &mut server => {
            supervisor.stop_all().await;
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(e).context("Web server task failed"),
            };
        }
    };

    if let Exit::Restart(delay) = exit {
        tokio::time::sleep(delay).await;
    }

    supervisor.stop_all().await;
    let _ = shutdown_tx.send(());
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Web server error during shutdown: {e:#}"),
        Err(e) => error!("Web server task failed: {e}"),
    }

    if matches!(exit, Exit::Restart(_)) {
        restart_process()?;
    }
    info!("Irrigo stopped");
    Ok(())
}

/// Start a fresh copy of this binary with the same arguments
fn restart_process() -> anyhow::Result<()> {
    let exe = std::env::current_exe().context("Cannot locate the running executable")?;
    info!(path = %exe.display(), "Restarting");
    std::process::Command::new(&exe)
        .args(std::env::args_os().skip(1))
        .spawn()
        .with_context(|| format!("Failed to start {}", exe.display()))?;
    Ok(())
}
