//! Power-supply sysfs poller.
//!
//! Walks `/sys/class/power_supply/*`: any non-battery supply reporting
//! `online = 1` means external power; the battery entry's `capacity` is
//! the displayed charge percentage. Unreadable entries are skipped: a
//! transient sysfs hiccup must not fabricate a plug/unplug transition.

use std::path::{Path, PathBuf};

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerState {
    pub on_battery: bool,
    /// Battery percentage, 0-100; -1 when no battery reports one.
    pub level: i32,
}

pub struct PowerSupplyPoller {
    dir: PathBuf,
}

impl PowerSupplyPoller {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read_trimmed(path: &Path) -> Option<String> {
        std::fs::read_to_string(path).ok().map(|s| s.trim().to_string())
    }

    /// Read the current power state. `None` when the directory is missing
    /// or holds no readable supplies.
    pub fn poll(&self) -> Option<PowerState> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(dir = %self.dir.display(), %err, "power supply dir unreadable");
                return None;
            }
        };

        let mut saw_supply = false;
        let mut external_online = false;
        let mut level = -1;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(kind) = Self::read_trimmed(&path.join("type")) else {
                continue;
            };
            saw_supply = true;
            if kind == "Battery" {
                if let Some(cap) = Self::read_trimmed(&path.join("capacity")) {
                    if let Ok(cap) = cap.parse::<i32>() {
                        level = cap.clamp(0, 100);
                    }
                }
            } else if let Some(online) = Self::read_trimmed(&path.join("online")) {
                if online == "1" {
                    external_online = true;
                }
            }
        }

        if !saw_supply {
            return None;
        }
        Some(PowerState { on_battery: !external_online, level })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_supply(dir: &Path, name: &str, kind: &str, files: &[(&str, &str)]) {
        let supply = dir.join(name);
        std::fs::create_dir_all(&supply).unwrap();
        std::fs::write(supply.join("type"), kind).unwrap();
        for (file, value) in files {
            std::fs::write(supply.join(file), value).unwrap();
        }
    }

    #[test]
    fn on_battery_when_no_supply_is_online() {
        let dir = tempfile::tempdir().unwrap();
        write_supply(dir.path(), "AC", "Mains", &[("online", "0")]);
        write_supply(dir.path(), "BAT0", "Battery", &[("capacity", "73")]);

        let state = PowerSupplyPoller::new(dir.path()).poll().unwrap();
        assert!(state.on_battery);
        assert_eq!(state.level, 73);
    }

    #[test]
    fn plugged_when_any_external_supply_is_online() {
        let dir = tempfile::tempdir().unwrap();
        write_supply(dir.path(), "AC", "Mains", &[("online", "0")]);
        write_supply(dir.path(), "USB", "USB", &[("online", "1")]);
        write_supply(dir.path(), "BAT0", "Battery", &[("capacity", "100")]);

        let state = PowerSupplyPoller::new(dir.path()).poll().unwrap();
        assert!(!state.on_battery);
        assert_eq!(state.level, 100);
    }

    #[test]
    fn missing_dir_polls_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let poller = PowerSupplyPoller::new(dir.path().join("power_supply"));
        assert!(poller.poll().is_none());
    }

    #[test]
    fn level_clamps_out_of_range_values() {
        let dir = tempfile::tempdir().unwrap();
        write_supply(dir.path(), "BAT0", "Battery", &[("capacity", "104")]);
        let state = PowerSupplyPoller::new(dir.path()).poll().unwrap();
        assert_eq!(state.level, 100);
    }
}
