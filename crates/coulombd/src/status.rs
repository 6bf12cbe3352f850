//! Periodic JSON status snapshot.
//!
//! External tooling reads this file instead of probing the daemon live.
//! Writes go through a temp file + rename so a reader never sees a
//! half-written document.

use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use coulomb_core::EngineStatus;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub written_at: DateTime<Utc>,
    pub version: String,
    #[serde(flatten)]
    pub engine: EngineStatus,
}

impl StatusSnapshot {
    pub fn new(engine: EngineStatus) -> Self {
        Self {
            written_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            engine,
        }
    }

    pub fn write(&self, path: &Path) -> io::Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp = path.with_extension("tmp");
        std::fs::write(&temp, content)?;
        std::fs::rename(&temp, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coulomb_core::{BatteryStats, ManualClock};

    #[test]
    fn snapshot_is_valid_json_with_engine_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");

        let clock = ManualClock::new();
        let mut stats = BatteryStats::new(Box::new(clock.clone()));
        stats.set_on_battery(true, 64);

        StatusSnapshot::new(stats.status()).write(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["on_battery"], true);
        assert_eq!(value["discharge_start_level"], 64);
        assert!(value["written_at"].is_string());
    }
}
