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

use crate::WebState;
use crate::views::{
    ActionView, EventView, FieldView, IndexTemplate, PluginRow, RestartingTemplate,
    SettingsTemplate,
};
use askama::Template;
use axum::{
    Form, Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use irrigo_core::{ActionOutcome, OptionsError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How long a page waits for a worker before rendering anyway
const WORKER_WAIT: Duration = Duration::from_secs(10);

fn render(template: &impl Template) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!("Template render error: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to render page: {e}"),
            )
                .into_response()
        }
    }
}

fn not_found(what: &str) -> Response {
    (StatusCode::NOT_FOUND, format!("{what} not found")).into_response()
}

fn page_url(slug: &str) -> String {
    format!("/plugins/{slug}")
}

/// GET /
pub async fn index_handler(State(state): State<WebState>) -> Response {
    let supervisor = &state.supervisor;
    let rows = supervisor
        .plugins()
        .iter()
        .map(|plugin| {
            let status = supervisor.worker_status(plugin.slug());
            PluginRow::new(
                plugin.name(),
                plugin.slug(),
                plugin.schedule().is_some(),
                status.as_ref(),
            )
        })
        .collect();

    let services = supervisor.services();
    render(&IndexTemplate::new(
        services.controller.system_name(),
        rows,
        &services.registers.snapshot(),
    ))
}

/// GET /plugins/{slug}
pub async fn settings_page_handler(
    State(state): State<WebState>,
    Path(slug): Path<String>,
) -> Response {
    let supervisor = &state.supervisor;
    let Some(plugin) = supervisor.plugin(&slug) else {
        return not_found("Plugin");
    };

    if plugin.waits_for_first_cycle() && !supervisor.wait_for_first_cycle(&slug, WORKER_WAIT).await {
        debug!(plugin = %plugin.name(), "Rendering before the first worker cycle");
    }

    let ctx = supervisor.context(plugin.as_ref());
    let options = ctx.options();
    let fields = plugin
        .fields(&ctx)
        .iter()
        .map(|spec| FieldView::new(spec, options.get(spec.key)))
        .collect();

    let mut events: Vec<EventView> = ctx.log_entries().iter().map(EventView::from).collect();
    events.reverse();

    render(&SettingsTemplate {
        system_name: ctx.controller().system_name(),
        name: plugin.name().to_owned(),
        slug: slug.clone(),
        fields,
        status: plugin.status(&ctx).await,
        events,
        actions: plugin.actions().iter().map(ActionView::from).collect(),
    })
}

/// POST /plugins/{slug}
pub async fn settings_update_handler(
    State(state): State<WebState>,
    Path(slug): Path<String>,
    Form(form): Form<Vec<(String, String)>>,
) -> Response {
    let supervisor = Arc::clone(&state.supervisor);
    let target = slug.clone();
    let result =
        tokio::task::spawn_blocking(move || supervisor.update_options(&target, &form)).await;
    let result = match result {
        Ok(result) => result,
        Err(e) => {
            error!(plugin = %slug, "Settings update task failed: {e}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to save settings").into_response();
        }
    };

    match result {
        Ok(report) => {
            if report.changed() {
                info!(plugin = %slug, updated = report.updated.len(), "Settings updated");
            }
            Redirect::to(&page_url(&slug)).into_response()
        }
        Err(OptionsError::UnknownPlugin(_)) => not_found("Plugin"),
        Err(e) => {
            error!(plugin = %slug, "Failed to save settings: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to save settings",
            )
                .into_response()
        }
    }
}

/// GET /plugins/{slug}/settings.json
pub async fn settings_json_handler(
    State(state): State<WebState>,
    Path(slug): Path<String>,
) -> Response {
    let supervisor = &state.supervisor;
    let Some(plugin) = supervisor.plugin(&slug) else {
        return not_found("Plugin");
    };
    let options = supervisor.context(plugin.as_ref()).options();
    (
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
        Json(options),
    )
        .into_response()
}

/// POST /plugins/{slug}/actions/{action}
pub async fn action_handler(
    State(state): State<WebState>,
    Path((slug, action)): Path<(String, String)>,
) -> Response {
    let supervisor = &state.supervisor;
    let Some(plugin) = supervisor.plugin(&slug) else {
        return not_found("Plugin");
    };
    if !plugin.actions().iter().any(|a| a.id == action) {
        return not_found("Action");
    }

    let ctx = supervisor.context(plugin.as_ref());
    info!(plugin = %plugin.name(), action = %action, "Running page action");
    match plugin.handle_action(&ctx, &action).await {
        Ok(ActionOutcome::Redirect) => Redirect::to(&page_url(&slug)).into_response(),
        Ok(ActionOutcome::RefreshAndRedirect) => {
            if !supervisor.wake_and_wait(&slug, WORKER_WAIT).await {
                warn!(plugin = %plugin.name(), "Worker did not finish a cycle in time");
            }
            Redirect::to(&page_url(&slug)).into_response()
        }
        Ok(ActionOutcome::Restarting) => render(&RestartingTemplate {
            system_name: ctx.controller().system_name(),
            return_to: page_url(&slug),
        }),
        Err(e) => {
            ctx.error(format!("{}:\n{}", plugin.name(), e.chain()));
            Redirect::to(&page_url(&slug)).into_response()
        }
    }
}

/// GET /api/registers
pub async fn registers_handler(State(state): State<WebState>) -> impl IntoResponse {
    Json(state.supervisor.services().registers.snapshot())
}

/// GET /health
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
