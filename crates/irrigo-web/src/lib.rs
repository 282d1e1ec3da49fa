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

//! Plugin settings pages and JSON endpoints.

mod routes;
mod views;

use anyhow::{Context, Result};
use axum::{
    Router,
    routing::{get, post},
};
use irrigo_core::PluginSupervisor;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Application state for web handlers
#[derive(Clone, Debug)]
pub struct WebState {
    pub supervisor: Arc<PluginSupervisor>,
}

impl WebState {
    pub fn new(supervisor: Arc<PluginSupervisor>) -> Self {
        Self { supervisor }
    }
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/", get(routes::index_handler))
        .route("/health", get(routes::health_handler))
        .route("/api/registers", get(routes::registers_handler))
        .route(
            "/plugins/{slug}",
            get(routes::settings_page_handler).post(routes::settings_update_handler),
        )
        .route(
            "/plugins/{slug}/settings.json",
            get(routes::settings_json_handler),
        )
        .route(
            "/plugins/{slug}/actions/{action}",
            post(routes::action_handler),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    state: WebState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = listener.local_addr().context("Listener has no local address")?;
    info!("🌐 Web server listening on http://{addr}/");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Web server failed")
}

/// Bind `bind_address:port` and serve until `shutdown` resolves
pub async fn start_web_server(
    bind_address: &str,
    port: u16,
    state: WebState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = format!("{bind_address}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    serve(listener, state, shutdown).await
}
