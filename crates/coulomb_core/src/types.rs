//! Shared value types for the query surface.

/// Which view of a statistic a query wants.
///
/// Every counter and timer keeps enough baselines to answer all four views;
/// the reported value is always `basis - baseline`, computed from snapshots
/// taken at load/plug/unplug time rather than subtracted by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsKind {
    /// Everything since the stats were first created, across boots.
    Total,
    /// Since this process loaded its stats (the current run).
    Current,
    /// The previous complete run, as recorded at load time.
    Last,
    /// Since the device was last unplugged from power.
    Unplugged,
}

/// Wakelock classes; each class shares one fairness pool across all holders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeClass {
    /// Keeps the CPU awake with the screen off.
    Partial,
    /// Keeps the screen on.
    Full,
    /// A window is holding the device awake.
    Window,
}

impl WakeClass {
    pub const ALL: [WakeClass; 3] = [WakeClass::Partial, WakeClass::Full, WakeClass::Window];
}

/// Reserved sensor handle used to account GPS time through the sensor path.
pub const GPS_SENSOR_HANDLE: i32 = -10_000;
