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

//! Host overview read from `/proc`, `/sys` and `i2cdetect`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use irrigo_core::{Plugin, PluginContext};
use irrigo_types::TempUnit;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

pub const NAME: &str = "System Information";
pub const SLUG: &str = "system_info";

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Received and transmitted bytes of one interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetCounters {
    pub rx: u64,
    pub tx: u64,
}

/// `/proc/meminfo` as key -> value text (`"948304 kB"`)
#[must_use]
pub fn parse_meminfo(contents: &str) -> BTreeMap<String, String> {
    contents
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_owned(), value.trim().to_owned()))
        .collect()
}

/// `/proc/net/dev`, loopback excluded
#[must_use]
pub fn parse_netdev(contents: &str) -> BTreeMap<String, NetCounters> {
    contents
        .lines()
        .skip(2)
        .filter_map(|line| {
            let (name, data) = line.split_once(':')?;
            let name = name.trim();
            if name == "lo" {
                return None;
            }
            let fields: Vec<u64> = data
                .split_whitespace()
                .filter_map(|f| f.parse().ok())
                .collect();
            let rx = *fields.first()?;
            let tx = *fields.get(8)?;
            Some((name.to_owned(), NetCounters { rx, tx }))
        })
        .collect()
}

/// `/proc/uptime` -> `"3 days, 04:05:06"`
#[must_use]
#[expect(
    clippy::integer_division,
    clippy::modulo_arithmetic,
    reason = "splitting whole seconds into days, hours, minutes and seconds"
)]
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "uptime is a small positive number of seconds"
)]
pub fn format_uptime(contents: &str) -> Option<String> {
    let seconds: f64 = contents.split_whitespace().next()?.parse().ok()?;
    let total = seconds.max(0.0) as u64;
    let days = total / 86_400;
    let hours = total % 86_400 / 3600;
    let minutes = total % 3600 / 60;
    let secs = total % 60;
    Some(format!("{days} days, {hours:02}:{minutes:02}:{secs:02}"))
}

/// Thermal zone reading in millidegrees Celsius, converted to `unit`
#[must_use]
pub fn cpu_temperature(contents: &str, unit: TempUnit) -> Option<String> {
    let milli: f64 = contents.trim().parse().ok()?;
    Some(format!("{:.1}", unit.from_celsius(milli / 1000.0)))
}

#[must_use]
#[expect(clippy::cast_precision_loss, reason = "display only")]
pub fn format_netdev_line(name: &str, counters: NetCounters) -> String {
    format!(
        "{:<16} {:.3} MiB {:.3} MiB",
        format!("{name}:"),
        counters.rx as f64 / BYTES_PER_MIB,
        counters.tx as f64 / BYTES_PER_MIB
    )
}

#[derive(Debug, Clone)]
pub struct SystemInfoPlugin {
    root: PathBuf,
    i2c_bus: u8,
}

impl Default for SystemInfoPlugin {
    fn default() -> Self {
        Self::new("/", 1)
    }
}

impl SystemInfoPlugin {
    /// `root` prefixes every `/proc` and `/sys` path
    pub fn new(root: impl Into<PathBuf>, i2c_bus: u8) -> Self {
        Self {
            root: root.into(),
            i2c_bus,
        }
    }

    fn read(&self, relative: &str) -> Option<String> {
        let path = self.root.join(relative);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Some(contents),
            Err(e) => {
                debug!("Cannot read {}: {e}", path.display());
                None
            }
        }
    }

    fn read_trimmed(&self, relative: &str) -> String {
        self.read(relative)
            .map_or_else(|| "Unknown".to_owned(), |s| s.trim().to_owned())
    }

    fn mac_address(&self) -> String {
        ["sys/class/net/eth0/address", "sys/class/net/wlan0/address"]
            .into_iter()
            .filter_map(|p| self.read(p))
            .map(|s| s.trim().to_owned())
            .find(|mac| !mac.is_empty())
            .unwrap_or_else(|| "Unknown".to_owned())
    }

    async fn i2c_scan(&self) -> Result<String> {
        let output = Command::new("i2cdetect")
            .args(["-y", &self.i2c_bus.to_string()])
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to run i2cdetect")?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }

    /// Every line of the overview except the I2C scan
    #[must_use]
    pub fn overview(&self, unit: TempUnit) -> Vec<String> {
        let meminfo = self.read("proc/meminfo").map(|c| parse_meminfo(&c)).unwrap_or_default();
        let memory = |key: &str| meminfo.get(key).cloned().unwrap_or_else(|| "Unknown".to_owned());
        let netdevs = self.read("proc/net/dev").map(|c| parse_netdev(&c)).unwrap_or_default();

        let mut lines = vec![
            format!("System release: {}", self.read_trimmed("proc/sys/kernel/osrelease")),
            format!("System name:    {}", self.read_trimmed("proc/sys/kernel/ostype")),
            format!("Node:           {}", self.read_trimmed("proc/sys/kernel/hostname")),
            format!("Machine:        {}", std::env::consts::ARCH),
            format!("Total memory:   {}", memory("MemTotal")),
            format!("Free memory:    {}", memory("MemFree")),
        ];
        if netdevs.is_empty() {
            lines.push("Network:        Unknown".to_owned());
        } else {
            lines.extend(netdevs.iter().map(|(name, c)| format_netdev_line(name, *c)));
        }
        lines.push(format!(
            "Uptime:         {}",
            self.read("proc/uptime")
                .and_then(|c| format_uptime(&c))
                .unwrap_or_else(|| "Unknown".to_owned())
        ));
        lines.push(format!(
            "CPU temp:       {} {}",
            self.read("sys/class/thermal/thermal_zone0/temp")
                .and_then(|c| cpu_temperature(&c, unit))
                .unwrap_or_else(|| "-".to_owned()),
            unit.symbol()
        ));
        lines.push(format!("MAC address:    {}", self.mac_address()));
        lines
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Plugin for SystemInfoPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn slug(&self) -> &str {
        SLUG
    }

    async fn status(&self, ctx: &PluginContext) -> Vec<String> {
        ctx.clear_log();
        let mut lines = self.overview(ctx.controller().temp_unit());
        lines.push("I2C HEX Address:".to_owned());
        match self.i2c_scan().await {
            Ok(scan) => lines.push(scan),
            Err(e) => ctx.error(format!("{NAME}:\n{e:#}")),
        }
        lines
    }
}
