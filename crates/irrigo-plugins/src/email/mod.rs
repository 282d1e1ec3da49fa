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

//! E-mail notifications on power-on, rain onset and finished runs.

mod mailer;

pub use mailer::{MailSettings, MailTransport, OutgoingMail, SmtpMailer};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use irrigo_core::{ActionOutcome, PageAction, Plugin, PluginContext, PluginError, WorkerSchedule};
use irrigo_types::{FieldSpec, FinishedRun, OptionMap, OptionValue};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const NAME: &str = "Email Notifications";
pub const SLUG: &str = "email_notifications";

const NOT_CONFIGURED: &str = "E-mail plug-in is not properly configured!";

fn datetime_string(time: DateTime<Local>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Rain sensor edge and finished-run counter carried between cycles
#[derive(Debug, Default)]
struct WatchState {
    last_rain: bool,
    finished_count: usize,
}

pub struct EmailPlugin {
    transport: Arc<dyn MailTransport>,
    state: Mutex<WatchState>,
}

impl std::fmt::Debug for EmailPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailPlugin")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

fn completed_runs(ctx: &PluginContext) -> Vec<FinishedRun> {
    ctx.controller()
        .finished_runs()
        .into_iter()
        .filter(|run| !run.blocked)
        .collect()
}

/// Mail body for runs that finished since the last check
#[must_use]
pub fn finished_runs_body(now: DateTime<Local>, runs: &[FinishedRun], station_name: impl Fn(usize) -> String) -> String {
    let mut body = format!("{}:\n", datetime_string(now));
    for run in runs {
        body.push_str("Finished run:\n");
        body.push_str(&format!("  Program: {}\n", run.program_name));
        body.push_str(&format!("  Station: {}\n", station_name(run.station)));
        body.push_str(&format!("  Start time: {} \n", datetime_string(run.start)));
        body.push_str(&format!("  Duration: {}\n\n", run.duration_label()));
    }
    body
}

impl EmailPlugin {
    pub fn new(transport: Arc<dyn MailTransport>) -> Self {
        Self {
            transport,
            state: Mutex::new(WatchState::default()),
        }
    }

    /// Send a mail with the configured credentials
    async fn email(
        &self,
        ctx: &PluginContext,
        body: &str,
        subject: Option<&str>,
        attachment: Option<PathBuf>,
    ) -> Result<(), PluginError> {
        let username = ctx.option_str("emlusr");
        let password = ctx.option_str("emlpwd");
        let recipient = ctx.option_str("emladr");
        if username.is_empty() || password.is_empty() || recipient.is_empty() {
            return Err(PluginError::NotConfigured(NOT_CONFIGURED.to_owned()));
        }

        let mail = OutgoingMail {
            sender_name: ctx.controller().system_name(),
            username,
            password,
            recipient,
            subject: subject.map_or_else(|| ctx.option_str("emlsubject"), str::to_owned),
            body: body.to_owned(),
            attachment,
        };
        self.transport.send(mail).await?;
        Ok(())
    }

    /// Send and report the outcome in the plugin log, replacing earlier entries
    async fn try_mail(&self, ctx: &PluginContext, body: &str, attachment: Option<PathBuf>) {
        ctx.clear_log();
        match self.email(ctx, body, None, attachment).await {
            Ok(()) => ctx.info(format!("Email was sent:\n{body}")),
            Err(e) => ctx.error(format!("Email was not sent!\n{}", e.chain())),
        }
    }
}

#[async_trait]
impl Plugin for EmailPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn slug(&self) -> &str {
        SLUG
    }

    fn defaults(&self) -> OptionMap {
        OptionMap::from([
            ("emlpwron".to_owned(), OptionValue::Bool(false)),
            ("emllog".to_owned(), OptionValue::Bool(false)),
            ("emlrain".to_owned(), OptionValue::Bool(false)),
            ("emlrun".to_owned(), OptionValue::Bool(false)),
            ("emlusr".to_owned(), OptionValue::from("")),
            ("emlpwd".to_owned(), OptionValue::from("")),
            ("emladr".to_owned(), OptionValue::from("")),
            ("emlsubject".to_owned(), OptionValue::from("Report from Irrigo")),
        ])
    }

    fn fields(&self, _ctx: &PluginContext) -> Vec<FieldSpec> {
        vec![
            FieldSpec::checkbox("emlpwron", "Send e-mail on power on"),
            FieldSpec::checkbox("emllog", "Attach the event log"),
            FieldSpec::checkbox("emlrain", "Send e-mail when rain is detected"),
            FieldSpec::checkbox("emlrun", "Send e-mail after each finished run"),
            FieldSpec::text("emlusr", "SMTP username"),
            FieldSpec::password("emlpwd", "SMTP password"),
            FieldSpec::text("emladr", "Send e-mails to"),
            FieldSpec::text("emlsubject", "Subject"),
        ]
    }

    fn schedule(&self) -> Option<WorkerSchedule> {
        Some(WorkerSchedule {
            active_interval: Duration::from_secs(5),
            ..WorkerSchedule::default()
        })
    }

    fn enable_key(&self) -> Option<&'static str> {
        None
    }

    fn clears_log_each_cycle(&self) -> bool {
        false
    }

    async fn on_start(&self, ctx: &PluginContext) -> Result<(), PluginError> {
        let finished_count = completed_runs(ctx).len();
        *self.state.lock() = WatchState {
            last_rain: false,
            finished_count,
        };

        if ctx.option_bool("emlpwron") {
            let body = format!("{}: System was powered on.", datetime_string(Local::now()));
            let attachment = if ctx.option_bool("emllog") {
                ctx.events().file_path().map(std::path::Path::to_path_buf)
            } else {
                None
            };
            self.try_mail(ctx, &body, attachment).await;
        }
        Ok(())
    }

    async fn run_cycle(&self, ctx: &PluginContext) -> Result<(), PluginError> {
        let controller = ctx.controller();

        if ctx.option_bool("emlrain") {
            let rain = controller.rain_sensed();
            let onset = {
                let mut state = self.state.lock();
                let onset = rain && !state.last_rain;
                state.last_rain = rain;
                onset
            };
            if onset {
                let body = format!("{}: System detected rain.", datetime_string(Local::now()));
                self.try_mail(ctx, &body, None).await;
            }
        }

        if ctx.option_bool("emlrun") {
            let finished = completed_runs(ctx);
            let previous = std::mem::replace(&mut self.state.lock().finished_count, finished.len());
            if let Some(new_runs) = finished.get(previous..).filter(|runs| !runs.is_empty()) {
                let stations = controller.stations();
                let body = finished_runs_body(Local::now(), new_runs, |index| {
                    stations
                        .iter()
                        .find(|s| s.index == index)
                        .map_or_else(|| format!("Station {}", index + 1), |s| s.name.clone())
                });
                self.try_mail(ctx, &body, None).await;
            }
        }
        Ok(())
    }

    fn actions(&self) -> Vec<PageAction> {
        vec![PageAction::new("test", "Send test e-mail")]
    }

    async fn handle_action(
        &self,
        ctx: &PluginContext,
        action: &str,
    ) -> Result<ActionOutcome, PluginError> {
        match action {
            "test" => {
                let body = format!(
                    "{}: Test e-mail from e-mail notification plugin :-).",
                    datetime_string(Local::now())
                );
                self.try_mail(ctx, &body, None).await;
                Ok(ActionOutcome::Redirect)
            }
            other => Err(PluginError::Other(anyhow::anyhow!(
                "unsupported action '{other}'"
            ))),
        }
    }
}
