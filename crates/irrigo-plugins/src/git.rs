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

//! Thin wrapper over the `git` command line.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

/// Runs git subcommands in one repository and returns trimmed stdout
#[async_trait]
pub trait Git: Send + Sync {
    async fn run(&self, args: &[&str]) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct GitRepo {
    path: PathBuf,
}

impl GitRepo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Git for GitRepo {
    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!("git {}", args.join(" "));
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.path)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to run git in {}", self.path.display()))?;

        if !output.status.success() {
            bail!(
                "git {} failed ({}): {}",
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }
}

/// Revision number and commit date of a ref
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub count: u64,
    /// `YYYY-MM-DD`
    pub date: String,
}

pub async fn revision(git: &dyn Git, reference: &str) -> Result<Revision> {
    let date = git
        .run(&["log", "-1", reference, "--format=%cd", "--date=short"])
        .await?;
    let count = git
        .run(&["rev-list", reference, "--count", "--first-parent"])
        .await?;
    let count = count
        .parse()
        .with_context(|| format!("Unexpected revision count '{count}' for {reference}"))?;
    Ok(Revision { count, date })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionState {
    UpToDate,
    UpdateAvailable,
    /// Local revision is newer or diverged
    Unknown,
}

#[must_use]
pub fn classify_revision(local: &Revision, remote: &Revision) -> RevisionState {
    if local == remote {
        RevisionState::UpToDate
    } else if remote.count > local.count {
        RevisionState::UpdateAvailable
    } else {
        RevisionState::Unknown
    }
}
