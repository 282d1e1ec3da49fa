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

//! Events file viewer with per-severity filters.

use async_trait::async_trait;
use irrigo_core::{ActionOutcome, FileEvent, PageAction, Plugin, PluginContext, PluginError, read_events_file};
use irrigo_types::{FieldSpec, OptionMap, OptionValue, Severity};
use std::path::Path;
use tracing::warn;

pub const NAME: &str = "System Debug Information";
pub const SLUG: &str = "system_debug";

const LOG_MISSING: &str = "Error: Log file missing.";

fn option_key(severity: Severity) -> &'static str {
    match severity {
        Severity::Debug => "debug_event",
        Severity::Info => "info_event",
        Severity::Warning => "warning_event",
        Severity::Error => "error_event",
    }
}

/// Keep events whose severity is switched on, preserving order
#[must_use]
pub fn filter_events(events: Vec<FileEvent>, shown: impl Fn(Severity) -> bool) -> Vec<String> {
    events
        .into_iter()
        .filter(|event| event.severity.is_some_and(&shown))
        .map(|event| event.text.trim().to_owned())
        .collect()
}

#[derive(Debug, Default)]
pub struct SystemDebugPlugin;

#[async_trait]
impl Plugin for SystemDebugPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn slug(&self) -> &str {
        SLUG
    }

    fn defaults(&self) -> OptionMap {
        Severity::ALL
            .iter()
            .map(|severity| (option_key(*severity).to_owned(), OptionValue::Bool(true)))
            .collect()
    }

    fn fields(&self, _ctx: &PluginContext) -> Vec<FieldSpec> {
        vec![
            FieldSpec::checkbox("debug_event", "Show debug events"),
            FieldSpec::checkbox("info_event", "Show info events"),
            FieldSpec::checkbox("warning_event", "Show warning events"),
            FieldSpec::checkbox("error_event", "Show error events"),
        ]
    }

    async fn status(&self, ctx: &PluginContext) -> Vec<String> {
        let Some(path) = ctx.events().file_path().map(Path::to_path_buf) else {
            return vec![LOG_MISSING.to_owned()];
        };
        let read = tokio::task::spawn_blocking(move || read_events_file(&path)).await;
        match read {
            Ok(Ok(Some(events))) => {
                filter_events(events, |severity| ctx.option_bool(option_key(severity)))
            }
            Ok(Ok(None)) => vec![LOG_MISSING.to_owned()],
            Ok(Err(e)) => {
                warn!("{e:#}");
                vec![LOG_MISSING.to_owned()]
            }
            Err(e) => {
                warn!("Events file reader failed: {e}");
                vec![LOG_MISSING.to_owned()]
            }
        }
    }

    fn actions(&self) -> Vec<PageAction> {
        vec![PageAction::new("delete", "Delete log file")]
    }

    async fn handle_action(
        &self,
        ctx: &PluginContext,
        action: &str,
    ) -> Result<ActionOutcome, PluginError> {
        match action {
            "delete" => {
                if let Err(e) = ctx.events().delete_file() {
                    warn!("{e:#}");
                }
                Ok(ActionOutcome::Redirect)
            }
            other => Err(PluginError::Other(anyhow::anyhow!(
                "unsupported action '{other}'"
            ))),
        }
    }
}
