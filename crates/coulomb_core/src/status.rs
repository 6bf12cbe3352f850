//! Lightweight status view of the engine for external inspection.

use serde::Serialize;

use crate::engine::BatteryStats;
use crate::types::StatsKind;

/// A cheap, serializable summary of where the engine currently stands.
/// This is a reporting convenience, not part of the accounting itself.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub on_battery: bool,
    pub start_count: u32,
    pub discharge_start_level: i32,
    pub discharge_current_level: i32,
    pub battery_uptime_ms: u64,
    pub battery_realtime_ms: u64,
    pub screen_on_ms: u64,
    pub uid_count: usize,
    pub kernel_wakelock_count: usize,
}

impl BatteryStats {
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            on_battery: self.is_on_battery(),
            start_count: self.start_count(),
            discharge_start_level: self.discharge_start_level(),
            discharge_current_level: self.discharge_current_level(),
            battery_uptime_ms: self.battery_uptime_now() / 1000,
            battery_realtime_ms: self.battery_realtime_now() / 1000,
            screen_on_ms: self.screen_on_time(StatsKind::Current) / 1000,
            uid_count: self.uid_stats().len(),
            kernel_wakelock_count: self.kernel_wakelocks.len(),
        }
    }
}
