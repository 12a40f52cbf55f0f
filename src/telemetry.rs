//! Read-only host telemetry for the operator panel: uptime, load, memory,
//! and disk. Collection failures surface as errors to the operator and are
//! never fatal.

use tokio::process::Command;

use crate::error::{AppError, AppResult};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UsageStat {
    pub used: u64,
    pub total: u64,
}

impl UsageStat {
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.used as f64 / self.total as f64 * 100.0
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HostReport {
    pub uptime_secs: f64,
    pub cpu_percent: f64,
    pub mem: UsageStat,
    pub disk: UsageStat,
}

pub async fn collect() -> AppResult<HostReport> {
    let uptime_raw = tokio::fs::read_to_string("/proc/uptime").await?;
    let meminfo_raw = tokio::fs::read_to_string("/proc/meminfo").await?;
    let loadavg_raw = tokio::fs::read_to_string("/proc/loadavg").await?;
    let cpuinfo_raw = tokio::fs::read_to_string("/proc/cpuinfo").await?;

    let uptime_secs = parse_uptime(&uptime_raw)
        .ok_or_else(|| AppError::Message("unreadable /proc/uptime".into()))?;
    let mem = parse_meminfo(&meminfo_raw)
        .ok_or_else(|| AppError::Message("unreadable /proc/meminfo".into()))?;
    let cpus = cpuinfo_raw
        .lines()
        .filter(|line| line.starts_with("processor"))
        .count()
        .max(1);
    let cpu_percent = parse_loadavg(&loadavg_raw)
        .map(|load1| load1 / cpus as f64 * 100.0)
        .unwrap_or(0.0);

    let output = Command::new("df").args(["-B1", "/"]).output().await?;
    let disk = parse_df(&String::from_utf8_lossy(&output.stdout)).unwrap_or_default();

    Ok(HostReport {
        uptime_secs,
        cpu_percent,
        mem,
        disk,
    })
}

fn parse_uptime(raw: &str) -> Option<f64> {
    raw.split_whitespace().next()?.parse().ok()
}

fn parse_loadavg(raw: &str) -> Option<f64> {
    raw.split_whitespace().next()?.parse().ok()
}

/// Used = MemTotal - MemAvailable, both reported in kB.
fn parse_meminfo(raw: &str) -> Option<UsageStat> {
    let mut total = None;
    let mut available = None;
    for line in raw.lines() {
        let mut parts = line.split_whitespace();
        match parts.next()? {
            "MemTotal:" => total = parts.next()?.parse::<u64>().ok(),
            "MemAvailable:" => available = parts.next()?.parse::<u64>().ok(),
            _ => {}
        }
    }
    let total = total? * 1024;
    let available = available? * 1024;
    Some(UsageStat {
        used: total.saturating_sub(available),
        total,
    })
}

/// Last line of `df -B1 /`: filesystem, total, used, available, ...
fn parse_df(raw: &str) -> Option<UsageStat> {
    let line = raw.lines().last()?;
    let mut parts = line.split_whitespace().skip(1);
    let total = parts.next()?.parse().ok()?;
    let used = parts.next()?.parse().ok()?;
    Some(UsageStat { used, total })
}

pub fn format_uptime(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    let days = seconds / 86_400;
    let hours = seconds % 86_400 / 3_600;
    let minutes = seconds % 3_600 / 60;
    let secs = seconds % 60;
    format!("{days}d {hours}h {minutes}m {secs}s")
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let exponent = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exponent as i32);
    format!("{:.2} {}", value, UNITS[exponent])
}
