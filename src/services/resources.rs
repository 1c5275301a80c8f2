//! Resource guard
//!
//! Backpressure signal for the processor: processing idles while available
//! memory or (discharging) battery is critically low. Readings that cannot be
//! obtained count as healthy.

use crate::config::Settings;
use std::path::{Path, PathBuf};

const MEMINFO_PATH: &str = "/proc/meminfo";
const POWER_SUPPLY_DIR: &str = "/sys/class/power_supply";

/// Battery reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryStatus {
    pub percent: u8,
    pub discharging: bool,
}

/// One probe of the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceSnapshot {
    pub available_memory_mb: Option<u64>,
    pub battery: Option<BatteryStatus>,
}

#[derive(Debug, Clone)]
pub struct ResourceGuard {
    min_free_memory_mb: u64,
    min_battery_percent: u8,
    meminfo_path: PathBuf,
    power_supply_dir: PathBuf,
}

impl ResourceGuard {
    pub fn new(min_free_memory_mb: u64, min_battery_percent: u8) -> Self {
        Self {
            min_free_memory_mb,
            min_battery_percent,
            meminfo_path: PathBuf::from(MEMINFO_PATH),
            power_supply_dir: PathBuf::from(POWER_SUPPLY_DIR),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.min_free_memory_mb, settings.min_battery_percent)
    }

    /// Read from alternative probe locations
    pub fn with_probe_paths(mut self, meminfo: impl Into<PathBuf>, power_supply: impl Into<PathBuf>) -> Self {
        self.meminfo_path = meminfo.into();
        self.power_supply_dir = power_supply.into();
        self
    }

    pub fn snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            available_memory_mb: std::fs::read_to_string(&self.meminfo_path)
                .ok()
                .and_then(|raw| parse_meminfo(&raw)),
            battery: read_battery(&self.power_supply_dir),
        }
    }

    /// `true` when resources are sufficient to process a file
    pub fn check(&self) -> bool {
        self.evaluate(&self.snapshot())
    }

    pub fn evaluate(&self, snapshot: &ResourceSnapshot) -> bool {
        if let Some(battery) = snapshot.battery {
            if battery.discharging && battery.percent < self.min_battery_percent {
                tracing::warn!("Battery low ({}%). Pausing processing", battery.percent);
                return false;
            }
        }

        if let Some(available) = snapshot.available_memory_mb {
            if available < self.min_free_memory_mb {
                tracing::warn!("Low RAM ({} MB). Pausing processing", available);
                return false;
            }
        }

        true
    }
}

/// `MemAvailable` from `/proc/meminfo`, in MB
pub fn parse_meminfo(raw: &str) -> Option<u64> {
    raw.lines().find_map(|line| {
        let rest = line.strip_prefix("MemAvailable:")?;
        let kb: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
        Some(kb / 1024)
    })
}

/// First battery under a `power_supply` directory
fn read_battery(dir: &Path) -> Option<BatteryStatus> {
    let mut supplies: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    supplies.sort();

    supplies.into_iter().find_map(|supply| {
        let kind = std::fs::read_to_string(supply.join("type")).ok()?;
        if kind.trim() != "Battery" {
            return None;
        }

        let percent = std::fs::read_to_string(supply.join("capacity"))
            .ok()?
            .trim()
            .parse::<u8>()
            .ok()?;
        let status = std::fs::read_to_string(supply.join("status")).unwrap_or_default();

        Some(BatteryStatus {
            percent,
            discharging: status.trim() == "Discharging",
        })
    })
}
