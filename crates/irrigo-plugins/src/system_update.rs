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

//! Compares the running checkout with its upstream branch and optionally
//! pulls the new revision and restarts.

use crate::git::{Git, Revision, RevisionState, classify_revision, revision};
use async_trait::async_trait;
use irrigo_core::{ActionOutcome, PageAction, Plugin, PluginContext, PluginError};
use irrigo_core::WorkerSchedule;
use irrigo_types::{FieldSpec, OptionMap, OptionValue};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

pub const NAME: &str = "System Update";
pub const SLUG: &str = "system_update";

const RESTART_DELAY: Duration = Duration::from_secs(3);

/// What the status page shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateStatus {
    pub local: Option<Revision>,
    pub remote: String,
    pub remote_branch: String,
    pub can_update: bool,
}

impl Default for UpdateStatus {
    fn default() -> Self {
        Self {
            local: None,
            remote: "None!".to_owned(),
            remote_branch: "origin/master".to_owned(),
            can_update: false,
        }
    }
}

pub struct SystemUpdatePlugin {
    git: Arc<dyn Git>,
    status: Mutex<UpdateStatus>,
}

impl std::fmt::Debug for SystemUpdatePlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemUpdatePlugin")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl SystemUpdatePlugin {
    pub fn new(git: Arc<dyn Git>) -> Self {
        Self {
            git,
            status: Mutex::new(UpdateStatus::default()),
        }
    }

    #[must_use]
    pub fn current_status(&self) -> UpdateStatus {
        self.status.lock().clone()
    }

    async fn local_revision(&self) -> anyhow::Result<Revision> {
        if let Some(local) = self.status.lock().local.clone() {
            return Ok(local);
        }
        let local = revision(self.git.as_ref(), "HEAD").await?;
        self.status.lock().local = Some(local.clone());
        Ok(local)
    }

    async fn update_rev_data(&self, ctx: &PluginContext) -> anyhow::Result<()> {
        let git = self.git.as_ref();
        let local = self.local_revision().await?;

        git.run(&["remote", "update"]).await?;

        let remote = git.run(&["config", "--get", "remote.origin.url"]).await?;
        let branch = git
            .run(&["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"])
            .await?;
        {
            let mut status = self.status.lock();
            if !remote.is_empty() {
                status.remote = remote;
            }
            if !branch.is_empty() {
                status.remote_branch = branch;
            }
        }
        let branch = self.status.lock().remote_branch.clone();

        let new = revision(git, &branch).await?;
        let range = format!("HEAD..{branch}");
        let changes = git.run(&["log", &range, "--oneline"]).await?;

        let state = classify_revision(&local, &new);
        match state {
            RevisionState::UpToDate => ctx.info("Up-to-date."),
            RevisionState::UpdateAvailable => {
                ctx.info("New version is available!");
                ctx.info(format!(
                    "Currently running revision: {} ({})",
                    local.count, local.date
                ));
                ctx.info(format!("Available revision: {} ({})", new.count, new.date));
                ctx.info(format!("Changes:\n  {}", changes.lines().collect::<Vec<_>>().join("\n  ")));
            }
            RevisionState::Unknown => {
                ctx.info("Running unknown version!");
                ctx.info(format!(
                    "Currently running revision: {} ({})",
                    local.count, local.date
                ));
                ctx.info(format!("Available revision: {} ({})", new.count, new.date));
            }
        }
        self.status.lock().can_update = state == RevisionState::UpdateAvailable;
        Ok(())
    }

    /// Hard-reset to the checked out branch, pull, then schedule a restart
    async fn perform_update(&self, ctx: &PluginContext) -> anyhow::Result<()> {
        let git = self.git.as_ref();
        git.run(&["config", "core.filemode", "false"]).await?;
        git.run(&["reset", "--hard"]).await?;
        let output = git.run(&["pull"]).await?;

        ctx.debug(format!("Update result: {output}"));
        ctx.controller().request_restart(RESTART_DELAY);
        Ok(())
    }
}

#[async_trait]
impl Plugin for SystemUpdatePlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn slug(&self) -> &str {
        SLUG
    }

    fn defaults(&self) -> OptionMap {
        OptionMap::from([
            ("auto_update".to_owned(), OptionValue::Bool(false)),
            ("use_update".to_owned(), OptionValue::Bool(false)),
        ])
    }

    fn fields(&self, _ctx: &PluginContext) -> Vec<FieldSpec> {
        vec![
            FieldSpec::checkbox("use_update", "Check for updates"),
            FieldSpec::checkbox("auto_update", "Install updates automatically"),
        ]
    }

    fn schedule(&self) -> Option<WorkerSchedule> {
        Some(WorkerSchedule {
            disabled_interval: Duration::from_secs(3600),
            ..WorkerSchedule::default()
        })
    }

    fn enable_key(&self) -> Option<&'static str> {
        Some("use_update")
    }

    async fn run_cycle(&self, ctx: &PluginContext) -> Result<(), PluginError> {
        self.update_rev_data(ctx).await?;

        if self.status.lock().can_update && ctx.option_bool("auto_update") {
            self.perform_update(ctx).await?;
        }
        Ok(())
    }

    async fn status(&self, _ctx: &PluginContext) -> Vec<String> {
        let status = self.current_status();
        let running = status.local.as_ref().map_or_else(
            || "Running revision: unknown".to_owned(),
            |local| format!("Running revision: {} ({})", local.count, local.date),
        );
        vec![
            running,
            format!("Remote: {}", status.remote),
            format!("Remote branch: {}", status.remote_branch),
            if status.can_update {
                "An update is available.".to_owned()
            } else {
                "No update available.".to_owned()
            },
        ]
    }

    fn waits_for_first_cycle(&self) -> bool {
        true
    }

    fn actions(&self) -> Vec<PageAction> {
        vec![
            PageAction::new("refresh", "Check now"),
            PageAction::new("update", "Update now"),
            PageAction::new("restart", "Restart"),
        ]
    }

    async fn handle_action(
        &self,
        ctx: &PluginContext,
        action: &str,
    ) -> Result<ActionOutcome, PluginError> {
        match action {
            "refresh" => Ok(ActionOutcome::RefreshAndRedirect),
            "update" => {
                self.perform_update(ctx).await?;
                Ok(ActionOutcome::Restarting)
            }
            "restart" => {
                ctx.controller().request_restart(RESTART_DELAY);
                Ok(ActionOutcome::Restarting)
            }
            other => Err(PluginError::Other(anyhow::anyhow!(
                "unsupported action '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::services;
    use std::collections::BTreeMap;

    /// Answers git commands from a table and records them
    #[derive(Debug, Default)]
    struct ScriptedGit {
        answers: BTreeMap<String, String>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedGit {
        fn new(answers: &[(&str, &str)]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Git for ScriptedGit {
        async fn run(&self, args: &[&str]) -> anyhow::Result<String> {
            let command = args.join(" ");
            self.calls.lock().push(command.clone());
            Ok(self.answers.get(&command).cloned().unwrap_or_default())
        }
    }

    fn repository(remote_count: &str, remote_date: &str) -> ScriptedGit {
        ScriptedGit::new(&[
            ("log -1 HEAD --format=%cd --date=short", "2025-05-01"),
            ("rev-list HEAD --count --first-parent", "120"),
            ("config --get remote.origin.url", "https://example.com/irrigo.git"),
            ("rev-parse --abbrev-ref --symbolic-full-name @{u}", "origin/main"),
            ("log -1 origin/main --format=%cd --date=short", remote_date),
            ("rev-list origin/main --count --first-parent", remote_count),
            ("log HEAD..origin/main --oneline", "abc123 Fix valves\ndef456 Add zones"),
            ("pull", "Fast-forward"),
        ])
    }

    fn context(plugin: &SystemUpdatePlugin, form: &[(&str, &str)]) -> (PluginContext, Arc<irrigo_core::InMemoryController>) {
        let (services, controller) = services();
        services.options.register(NAME, plugin.defaults());
        let form: Vec<(String, String)> = form
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        services.options.web_update(NAME, &form).unwrap();
        (PluginContext::new(NAME, services), controller)
    }

    fn messages(ctx: &PluginContext) -> Vec<String> {
        ctx.log_entries().into_iter().map(|e| e.message).collect()
    }

    #[tokio::test]
    async fn test_up_to_date() {
        let plugin = SystemUpdatePlugin::new(Arc::new(repository("120", "2025-05-01")));
        let (ctx, _controller) = context(&plugin, &[("use_update", "on")]);

        plugin.run_cycle(&ctx).await.unwrap();

        assert_eq!(messages(&ctx), vec!["Up-to-date.".to_owned()]);
        let status = plugin.current_status();
        assert!(!status.can_update);
        assert_eq!(status.remote_branch, "origin/main");
        assert_eq!(status.remote, "https://example.com/irrigo.git");
    }

    #[tokio::test]
    async fn test_update_available_lists_changes() {
        let git = Arc::new(repository("122", "2025-06-01"));
        let plugin = SystemUpdatePlugin::new(git.clone());
        let (ctx, _controller) = context(&plugin, &[("use_update", "on")]);

        plugin.run_cycle(&ctx).await.unwrap();

        let messages = messages(&ctx);
        assert!(messages.contains(&"New version is available!".to_owned()));
        assert!(messages.contains(&"Available revision: 122 (2025-06-01)".to_owned()));
        assert!(messages.contains(&"Changes:\n  abc123 Fix valves\n  def456 Add zones".to_owned()));
        assert!(plugin.current_status().can_update);
        assert!(!git.calls.lock().contains(&"pull".to_owned()));
    }

    #[tokio::test]
    async fn test_auto_update_pulls_and_restarts() {
        let git = Arc::new(repository("122", "2025-06-01"));
        let plugin = SystemUpdatePlugin::new(git.clone());
        let (ctx, controller) = context(&plugin, &[("use_update", "on"), ("auto_update", "on")]);

        plugin.run_cycle(&ctx).await.unwrap();

        let calls = git.calls.lock().clone();
        let tail: Vec<&str> = calls.iter().rev().take(3).rev().map(String::as_str).collect();
        assert_eq!(tail, vec!["config core.filemode false", "reset --hard", "pull"]);
        let delay = tokio::time::timeout(Duration::from_secs(1), controller.restart_requested())
            .await
            .unwrap();
        assert_eq!(delay, RESTART_DELAY);
    }

    #[tokio::test]
    async fn test_unknown_version() {
        let plugin = SystemUpdatePlugin::new(Arc::new(repository("100", "2025-01-01")));
        let (ctx, _controller) = context(&plugin, &[("use_update", "on")]);

        plugin.run_cycle(&ctx).await.unwrap();

        assert_eq!(messages(&ctx)[0], "Running unknown version!");
        assert!(!plugin.current_status().can_update);
    }

    #[tokio::test]
    async fn test_refresh_action() {
        let plugin = SystemUpdatePlugin::new(Arc::new(repository("120", "2025-05-01")));
        let (ctx, _controller) = context(&plugin, &[]);

        assert_eq!(
            plugin.handle_action(&ctx, "refresh").await.unwrap(),
            ActionOutcome::RefreshAndRedirect
        );
        assert!(plugin.handle_action(&ctx, "nope").await.is_err());
    }
}
