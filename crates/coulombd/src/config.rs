//! Daemon configuration.
//!
//! Compiled defaults, overridden by an optional TOML file, overridden by
//! CLI flags. Everything the daemon touches on the host (proc paths,
//! sysfs paths, the data directory) is configurable so the whole daemon
//! can run against a fake tree in tests.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Default data directory.
pub const DATA_DIR: &str = "/var/lib/coulomb";

/// Persisted summary file name inside the data directory.
pub const STATS_FILENAME: &str = "batterystats.bin";

/// Status snapshot file name inside the data directory.
pub const STATUS_FILENAME: &str = "status.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where the summary and status snapshot live.
    pub data_dir: PathBuf,
    /// Kernel wakelock table.
    pub wakelocks_path: PathBuf,
    /// Per-uid byte counter directory.
    pub uid_stat_dir: PathBuf,
    /// Interface byte counter table.
    pub net_dev_path: PathBuf,
    /// Radio awake-time counter; absent on devices without a radio.
    pub radio_awake_path: Option<PathBuf>,
    /// Power-supply sysfs directory.
    pub power_supply_dir: PathBuf,
    /// How often to poll the power supply, seconds.
    pub poll_interval_secs: u64,
    /// How often to re-read the kernel wakelock table, seconds.
    pub wakelock_interval_secs: u64,
    /// How often to persist the summary and status snapshot, seconds.
    pub write_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DATA_DIR),
            wakelocks_path: PathBuf::from("/proc/wakelocks"),
            uid_stat_dir: PathBuf::from("/proc/uid_stat"),
            net_dev_path: PathBuf::from("/proc/net/dev"),
            radio_awake_path: None,
            power_supply_dir: PathBuf::from("/sys/class/power_supply"),
            poll_interval_secs: 5,
            wakelock_interval_secs: 60,
            write_interval_secs: 1800,
        }
    }
}

impl Config {
    /// Load from a TOML file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn stats_path(&self) -> PathBuf {
        self.data_dir.join(STATS_FILENAME)
    }

    pub fn status_path(&self) -> PathBuf {
        self.data_dir.join(STATUS_FILENAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_file() {
        let cfg = Config::load(None).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from(DATA_DIR));
        assert_eq!(cfg.poll_interval_secs, 5);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coulombd.toml");
        std::fs::write(&path, "data_dir = \"/tmp/coulomb-test\"\npoll_interval_secs = 1\n")
            .unwrap();
        let cfg = Config::load(Some(&path)).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/coulomb-test"));
        assert_eq!(cfg.poll_interval_secs, 1);
        assert_eq!(cfg.wakelock_interval_secs, 60);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coulombd.toml");
        std::fs::write(&path, "no_such_key = true\n").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }
}
