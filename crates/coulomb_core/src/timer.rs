//! Elapsed-time accumulators in the battery time base.
//!
//! `TimerBase` carries the four-baseline bookkeeping shared by every timer
//! kind; the concrete kinds compose it rather than inherit it. All times are
//! microseconds of battery realtime unless a field says otherwise; the
//! fine unit matters because pooled time is divided by the holder count.

use crate::arena::PoolId;
use crate::codec::{ByteReader, ByteWriter};
use crate::error::CodecError;
use crate::types::StatsKind;

/// Count and elapsed-time baselines common to all timer kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerBase {
    pub(crate) count: u32,
    pub(crate) loaded_count: u32,
    pub(crate) last_count: u32,
    pub(crate) unplugged_count: u32,

    /// Accumulated time up to the last settlement point.
    pub(crate) total_time: u64,
    /// Accumulated time at load; subtract for the current-run view.
    pub(crate) loaded_time: u64,
    /// The previous complete run, as loaded.
    pub(crate) last_time: u64,
    /// Run time captured at the last unplug.
    pub(crate) unplugged_time: u64,
}

impl TimerBase {
    pub fn time_for(&self, run_time: u64, kind: StatsKind) -> u64 {
        match kind {
            StatsKind::Last => self.last_time,
            StatsKind::Total => run_time,
            StatsKind::Unplugged => run_time.saturating_sub(self.unplugged_time),
            StatsKind::Current => run_time.saturating_sub(self.loaded_time),
        }
    }

    pub fn count_for(&self, current_count: u32, kind: StatsKind) -> u32 {
        match kind {
            StatsKind::Last => self.last_count,
            StatsKind::Total => current_count,
            StatsKind::Unplugged => current_count.saturating_sub(self.unplugged_count),
            StatsKind::Current => current_count.saturating_sub(self.loaded_count),
        }
    }

    /// Snapshot the run time and count as the new since-unplug baseline.
    pub(crate) fn unplug(&mut self, run_time: u64, count: u32) {
        self.unplugged_time = run_time;
        self.unplugged_count = count;
    }

    /// Fold pending run time into the permanent total at a plug event.
    pub(crate) fn plug(&mut self, run_time: u64, count: u32) {
        self.total_time = run_time;
        self.count = count;
    }

    /// Summary storage keeps milliseconds; the 500 is round-to-nearest.
    pub(crate) fn write_summary(&self, w: &mut ByteWriter, run_time: u64) {
        w.write_u64((run_time + 500) / 1000);
        w.write_u64((run_time.saturating_sub(self.loaded_time) + 500) / 1000);
        w.write_u32(self.count);
        w.write_u32(self.count - self.loaded_count);
    }

    pub(crate) fn read_summary(&mut self, r: &mut ByteReader<'_>) -> Result<(), CodecError> {
        self.total_time = r.read_u64()? * 1000;
        self.loaded_time = self.total_time;
        self.last_time = r.read_u64()? * 1000;
        self.unplugged_time = self.total_time;
        self.count = r.read_u32()?;
        self.loaded_count = self.count;
        self.last_count = r.read_u32()?;
        self.unplugged_count = self.count;
        Ok(())
    }

    pub(crate) fn write_full(&self, w: &mut ByteWriter, run_time: u64) {
        w.write_u32(self.count);
        w.write_u32(self.loaded_count);
        w.write_u32(self.last_count);
        w.write_u32(self.unplugged_count);
        w.write_u64(run_time);
        w.write_u64(self.loaded_time);
        w.write_u64(self.last_time);
        w.write_u64(self.unplugged_time);
    }

    pub(crate) fn read_full(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            count: r.read_u32()?,
            loaded_count: r.read_u32()?,
            last_count: r.read_u32()?,
            unplugged_count: r.read_u32()?,
            total_time: r.read_u64()?,
            loaded_time: r.read_u64()?,
            last_time: r.read_u64()?,
            unplugged_time: r.read_u64()?,
        })
    }
}

/// Timer driven by explicit, reentrant start/stop calls.
///
/// A timer may belong to a fairness pool; while pooled and running, its
/// share of elapsed time is the held interval divided by the number of
/// concurrent holders. Pool membership changes are settled by
/// [`TimerArena`](crate::arena::TimerArena), the only place that touches
/// multiple timers at once.
#[derive(Debug, Clone, Default)]
pub struct StopwatchTimer {
    pub(crate) base: TimerBase,

    /// Reentrant start depth; 0 means not running.
    pub(crate) nesting: u32,
    /// Battery realtime at the last pool settlement.
    pub(crate) update_time: u64,
    /// `total_time` captured at the last 0→1 start, used to detect holds
    /// that accrued no measurable time.
    pub(crate) acquire_time: u64,
    /// Caps how much time a holder that never stops can accrue.
    pub(crate) timeout: Option<u64>,
    pub(crate) pool: Option<PoolId>,
}

impl StopwatchTimer {
    pub(crate) fn new(pool: Option<PoolId>) -> Self {
        Self { pool, ..Self::default() }
    }

    pub fn is_running(&self) -> bool {
        self.nesting > 0
    }

    pub fn set_timeout(&mut self, timeout: Option<u64>) {
        self.timeout = timeout;
    }

    /// Run time as of `now`, with `pool_size` concurrent holders.
    ///
    /// Idempotent: querying does not move `update_time`, so repeated reads
    /// without intervening state changes return the same value.
    pub(crate) fn compute_run_time(&self, now: u64, pool_size: usize) -> u64 {
        let mut now = now;
        if let Some(timeout) = self.timeout {
            now = now.min(self.update_time + timeout);
        }
        if self.nesting > 0 {
            self.base.total_time
                + now.saturating_sub(self.update_time) / pool_size.max(1) as u64
        } else {
            self.base.total_time
        }
    }

    pub(crate) fn unplug(&mut self, battery_realtime: u64, pool_size: usize) {
        let run_time = self.compute_run_time(battery_realtime, pool_size);
        let count = self.base.count;
        self.base.unplug(run_time, count);
    }

    pub(crate) fn plug(&mut self, battery_realtime: u64, pool_size: usize) {
        if self.nesting > 0 {
            let run_time = self.compute_run_time(battery_realtime, pool_size);
            let count = self.base.count;
            self.base.plug(run_time, count);
            self.update_time = battery_realtime;
        }
    }
}

/// Timer whose authoritative values arrive from an external cumulative
/// report (kernel wakelock stats) instead of start/stop calls.
#[derive(Debug, Clone, Default)]
pub struct SamplingTimer {
    pub(crate) base: TimerBase,

    pub(crate) current_reported_count: u32,
    pub(crate) unplugged_reported_count: u32,
    pub(crate) current_reported_total_time: u64,
    pub(crate) unplugged_reported_total_time: u64,

    /// True between an unplug and the following plug.
    pub(crate) in_discharge: bool,
    /// False until the first external report after an unplug.
    pub(crate) tracking_reported_values: bool,
    /// Sequence stamp of the last ingestion round that mentioned this name.
    pub(crate) update_version: u32,
}

impl SamplingTimer {
    pub(crate) fn new(in_discharge: bool, track_reported_values: bool) -> Self {
        Self {
            in_discharge,
            tracking_reported_values: track_reported_values,
            ..Self::default()
        }
    }

    /// The external source stopped reporting this name; freeze it without
    /// destroying accumulated history.
    pub fn set_stale(&mut self) {
        self.tracking_reported_values = false;
        self.unplugged_reported_total_time = 0;
        self.unplugged_reported_count = 0;
    }

    pub fn update_current_reported_count(&mut self, count: u32) {
        if self.in_discharge && self.unplugged_reported_count == 0 {
            // First report since the unplug: this value is the baseline.
            self.unplugged_reported_count = count;
            self.tracking_reported_values = true;
        }
        self.current_reported_count = count;
    }

    pub fn update_current_reported_total_time(&mut self, total_time: u64) {
        if self.in_discharge && self.unplugged_reported_total_time == 0 {
            self.unplugged_reported_total_time = total_time;
            self.tracking_reported_values = true;
        }
        self.current_reported_total_time = total_time;
    }

    pub(crate) fn compute_run_time(&self) -> u64 {
        self.base.total_time
            + if self.in_discharge && self.tracking_reported_values {
                self.current_reported_total_time
                    .saturating_sub(self.unplugged_reported_total_time)
            } else {
                0
            }
    }

    pub(crate) fn compute_current_count(&self) -> u32 {
        self.base.count
            + if self.in_discharge && self.tracking_reported_values {
                self.current_reported_count
                    .saturating_sub(self.unplugged_reported_count)
            } else {
                0
            }
    }

    pub(crate) fn unplug(&mut self) {
        let run_time = self.compute_run_time();
        let count = self.base.count;
        self.base.unplug(run_time, count);
        if self.tracking_reported_values {
            self.unplugged_reported_total_time = self.current_reported_total_time;
            self.unplugged_reported_count = self.current_reported_count;
        }
        self.in_discharge = true;
    }

    /// Fold the in-discharge external delta into the permanent total;
    /// further reports are ignored until the next unplug.
    pub(crate) fn plug(&mut self) {
        let run_time = self.compute_run_time();
        let count = self.compute_current_count();
        self.base.plug(run_time, count);
        self.in_discharge = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_reconciliation_adds_reported_delta() {
        let mut t = SamplingTimer::new(true, true);
        t.base.total_time = 40;
        t.unplugged_reported_total_time = 100;
        t.update_current_reported_total_time(150);
        assert_eq!(t.compute_run_time(), 40 + 50);
    }

    #[test]
    fn first_report_after_unplug_becomes_baseline() {
        let mut t = SamplingTimer::new(true, false);
        t.update_current_reported_total_time(700);
        t.update_current_reported_count(3);
        assert!(t.tracking_reported_values);
        // The baseline equals the first report, so nothing has accrued yet.
        assert_eq!(t.compute_run_time(), 0);
        assert_eq!(t.compute_current_count(), 0);

        t.update_current_reported_total_time(900);
        t.update_current_reported_count(5);
        assert_eq!(t.compute_run_time(), 200);
        assert_eq!(t.compute_current_count(), 2);
    }

    #[test]
    fn plug_folds_delta_and_stops_tracking_reports() {
        let mut t = SamplingTimer::new(true, true);
        t.unplugged_reported_total_time = 100;
        t.unplugged_reported_count = 1;
        t.update_current_reported_total_time(160);
        t.update_current_reported_count(4);
        t.plug();
        assert_eq!(t.base.total_time, 60);
        assert_eq!(t.base.count, 3);
        // Plugged in: further reports do not change the run time.
        t.update_current_reported_total_time(400);
        assert_eq!(t.compute_run_time(), 60);
    }

    #[test]
    fn stale_resets_tracking_but_keeps_history() {
        let mut t = SamplingTimer::new(true, true);
        t.base.total_time = 500;
        t.unplugged_reported_total_time = 10;
        t.current_reported_total_time = 30;
        t.set_stale();
        assert!(!t.tracking_reported_values);
        assert_eq!(t.compute_run_time(), 500);
    }

    #[test]
    fn stopwatch_timeout_caps_run_time() {
        let mut t = StopwatchTimer::new(None);
        t.nesting = 1;
        t.update_time = 1_000;
        t.set_timeout(Some(2_000));
        assert_eq!(t.compute_run_time(2_500, 1), 1_500);
        assert_eq!(t.compute_run_time(10_000, 1), 2_000);
    }
}
