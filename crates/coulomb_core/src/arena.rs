//! Engine-owned storage for counters, timers and fairness pools.
//!
//! Aggregates refer to their counters and timers by id into these slabs
//! instead of holding references, so the pool-refresh step, the one
//! operation that must mutate several timers atomically, happens in one
//! place with plain indexed access and no shared-ownership cycles.

use crate::counter::Counter;
use crate::timer::{SamplingTimer, StopwatchTimer};
use crate::types::StatsKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CounterId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct StopwatchId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SamplingId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PoolId(pub(crate) u32);

/// Slabs of accounting primitives plus the active-timer pools.
///
/// Slots are never reclaimed: a timer lives as long as the engine run that
/// created it, and an explicitly removed aggregate simply leaves inert
/// slots behind (they are absent from the unpluggable registry and from
/// every pool, so nothing visits them again).
#[derive(Debug, Default)]
pub struct TimerArena {
    counters: Vec<Counter>,
    stopwatches: Vec<StopwatchTimer>,
    samplings: Vec<SamplingTimer>,
    /// Pool id -> ids of the members currently running.
    pools: Vec<Vec<StopwatchId>>,
}

impl TimerArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_pool(&mut self) -> PoolId {
        self.pools.push(Vec::new());
        PoolId(self.pools.len() as u32 - 1)
    }

    pub fn alloc_counter(&mut self) -> CounterId {
        self.counters.push(Counter::new());
        CounterId(self.counters.len() as u32 - 1)
    }

    pub fn alloc_stopwatch(&mut self, pool: Option<PoolId>) -> StopwatchId {
        self.stopwatches.push(StopwatchTimer::new(pool));
        StopwatchId(self.stopwatches.len() as u32 - 1)
    }

    pub(crate) fn insert_stopwatch(&mut self, timer: StopwatchTimer) -> StopwatchId {
        self.stopwatches.push(timer);
        StopwatchId(self.stopwatches.len() as u32 - 1)
    }

    pub fn alloc_sampling(&mut self, in_discharge: bool, track_reported_values: bool) -> SamplingId {
        self.samplings.push(SamplingTimer::new(in_discharge, track_reported_values));
        SamplingId(self.samplings.len() as u32 - 1)
    }

    pub(crate) fn insert_sampling(&mut self, timer: SamplingTimer) -> SamplingId {
        self.samplings.push(timer);
        SamplingId(self.samplings.len() as u32 - 1)
    }

    pub fn counter(&self, id: CounterId) -> &Counter {
        &self.counters[id.0 as usize]
    }

    pub fn counter_mut(&mut self, id: CounterId) -> &mut Counter {
        &mut self.counters[id.0 as usize]
    }

    pub fn stopwatch(&self, id: StopwatchId) -> &StopwatchTimer {
        &self.stopwatches[id.0 as usize]
    }

    pub fn stopwatch_mut(&mut self, id: StopwatchId) -> &mut StopwatchTimer {
        &mut self.stopwatches[id.0 as usize]
    }

    pub fn sampling(&self, id: SamplingId) -> &SamplingTimer {
        &self.samplings[id.0 as usize]
    }

    pub fn sampling_mut(&mut self, id: SamplingId) -> &mut SamplingTimer {
        &mut self.samplings[id.0 as usize]
    }

    fn pool_size_of(&self, id: StopwatchId) -> usize {
        match self.stopwatches[id.0 as usize].pool {
            Some(pool) => self.pools[pool.0 as usize].len(),
            None => 1,
        }
    }

    /// Settle every member's share of the interval since the last refresh.
    ///
    /// Must run before any membership change so the interval that just
    /// ended is divided by the holder count that was actually concurrent
    /// during it.
    fn refresh_pool(&mut self, pool: PoolId, battery_realtime: u64) {
        let members = std::mem::take(&mut self.pools[pool.0 as usize]);
        let n = members.len() as u64;
        for &id in &members {
            let t = &mut self.stopwatches[id.0 as usize];
            let held = battery_realtime.saturating_sub(t.update_time);
            if held > 0 {
                t.base.total_time += held / n;
            }
            t.update_time = battery_realtime;
        }
        self.pools[pool.0 as usize] = members;
    }

    /// Start (reentrant). On the 0→1 transition the timer joins its pool
    /// after the pool is settled, and the acquisition is counted.
    pub fn start_stopwatch(&mut self, id: StopwatchId, battery_realtime: u64) {
        let t = &mut self.stopwatches[id.0 as usize];
        t.nesting += 1;
        if t.nesting != 1 {
            return;
        }
        t.update_time = battery_realtime;
        let pool = t.pool;
        if let Some(pool) = pool {
            self.refresh_pool(pool, battery_realtime);
            self.pools[pool.0 as usize].push(id);
        }
        let t = &mut self.stopwatches[id.0 as usize];
        t.base.count += 1;
        t.acquire_time = t.base.total_time;
    }

    /// Stop (reentrant). Stopping a timer that is not running is a no-op.
    /// A start/stop pair that accrued no measurable time is uncounted.
    pub fn stop_stopwatch(&mut self, id: StopwatchId, battery_realtime: u64) {
        let t = &mut self.stopwatches[id.0 as usize];
        if t.nesting == 0 {
            return;
        }
        t.nesting -= 1;
        if t.nesting != 0 {
            return;
        }
        match t.pool {
            Some(pool) => {
                self.refresh_pool(pool, battery_realtime);
                self.pools[pool.0 as usize].retain(|m| *m != id);
            }
            None => {
                // Settle as if still running so the pending interval
                // (timeout-capped) lands in the total.
                t.nesting = 1;
                t.base.total_time = t.compute_run_time(battery_realtime, 1);
                t.nesting = 0;
            }
        }
        let t = &mut self.stopwatches[id.0 as usize];
        if t.base.total_time == t.acquire_time {
            t.base.count -= 1;
        }
    }

    pub fn stopwatch_run_time(&self, id: StopwatchId, battery_realtime: u64) -> u64 {
        self.stopwatches[id.0 as usize]
            .compute_run_time(battery_realtime, self.pool_size_of(id))
    }

    pub fn stopwatch_time_for(&self, id: StopwatchId, battery_realtime: u64, kind: StatsKind) -> u64 {
        let t = &self.stopwatches[id.0 as usize];
        t.base
            .time_for(t.compute_run_time(battery_realtime, self.pool_size_of(id)), kind)
    }

    pub fn stopwatch_count_for(&self, id: StopwatchId, kind: StatsKind) -> u32 {
        let t = &self.stopwatches[id.0 as usize];
        t.base.count_for(t.base.count, kind)
    }

    pub fn sampling_time_for(&self, id: SamplingId, kind: StatsKind) -> u64 {
        let t = &self.samplings[id.0 as usize];
        t.base.time_for(t.compute_run_time(), kind)
    }

    pub fn sampling_count_for(&self, id: SamplingId, kind: StatsKind) -> u32 {
        let t = &self.samplings[id.0 as usize];
        t.base.count_for(t.compute_current_count(), kind)
    }

    pub(crate) fn unplug_stopwatch(&mut self, id: StopwatchId, battery_realtime: u64) {
        let pool_size = self.pool_size_of(id);
        self.stopwatches[id.0 as usize].unplug(battery_realtime, pool_size);
    }

    pub(crate) fn plug_stopwatch(&mut self, id: StopwatchId, battery_realtime: u64) {
        let pool_size = self.pool_size_of(id);
        self.stopwatches[id.0 as usize].plug(battery_realtime, pool_size);
    }

    /// Drop a removed aggregate's timers out of their pools. Each affected
    /// pool is settled first so the survivors are credited for the shared
    /// interval before the holder count changes under them.
    pub(crate) fn evict_from_pools(&mut self, ids: &[StopwatchId], battery_realtime: u64) {
        for i in 0..self.pools.len() {
            if self.pools[i].iter().any(|m| ids.contains(m)) {
                self.refresh_pool(PoolId(i as u32), battery_realtime);
                self.pools[i].retain(|m| !ids.contains(m));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_split_for_simultaneous_holders() {
        let mut arena = TimerArena::new();
        let pool = arena.create_pool();
        let a = arena.alloc_stopwatch(Some(pool));
        let b = arena.alloc_stopwatch(Some(pool));
        let c = arena.alloc_stopwatch(Some(pool));

        for id in [a, b, c] {
            arena.start_stopwatch(id, 0);
        }
        for id in [a, b, c] {
            arena.stop_stopwatch(id, 900);
        }

        let total: u64 = [a, b, c]
            .iter()
            .map(|id| arena.stopwatch_time_for(*id, 900, StatsKind::Total))
            .sum();
        assert_eq!(total, 900);
        for id in [a, b, c] {
            assert_eq!(arena.stopwatch_time_for(id, 900, StatsKind::Total), 300);
        }
    }

    #[test]
    fn staggered_holders_split_only_the_overlap() {
        // A runs [0, 30), B runs [10, 40); they overlap on [10, 30).
        let mut arena = TimerArena::new();
        let pool = arena.create_pool();
        let a = arena.alloc_stopwatch(Some(pool));
        let b = arena.alloc_stopwatch(Some(pool));

        arena.start_stopwatch(a, 0);
        arena.start_stopwatch(b, 10);
        arena.stop_stopwatch(a, 30);
        arena.stop_stopwatch(b, 40);

        assert_eq!(arena.stopwatch_time_for(a, 40, StatsKind::Total), 20);
        assert_eq!(arena.stopwatch_time_for(b, 40, StatsKind::Total), 20);
    }

    #[test]
    fn running_pooled_timer_reports_live_share() {
        let mut arena = TimerArena::new();
        let pool = arena.create_pool();
        let a = arena.alloc_stopwatch(Some(pool));
        let b = arena.alloc_stopwatch(Some(pool));
        arena.start_stopwatch(a, 0);
        arena.start_stopwatch(b, 0);
        // Still running: each reports half of the elapsed interval.
        assert_eq!(arena.stopwatch_time_for(a, 100, StatsKind::Total), 50);
        assert_eq!(arena.stopwatch_time_for(b, 100, StatsKind::Total), 50);
    }

    #[test]
    fn zero_duration_hold_is_not_counted() {
        let mut arena = TimerArena::new();
        let id = arena.alloc_stopwatch(None);
        arena.start_stopwatch(id, 500);
        arena.stop_stopwatch(id, 500);
        assert_eq!(arena.stopwatch_count_for(id, StatsKind::Total), 0);
    }

    #[test]
    fn real_hold_is_counted_once() {
        let mut arena = TimerArena::new();
        let id = arena.alloc_stopwatch(None);
        arena.start_stopwatch(id, 0);
        arena.stop_stopwatch(id, 10);
        assert_eq!(arena.stopwatch_count_for(id, StatsKind::Total), 1);
        assert_eq!(arena.stopwatch_time_for(id, 10, StatsKind::Total), 10);
    }

    #[test]
    fn nested_starts_need_matching_stops() {
        let mut arena = TimerArena::new();
        let id = arena.alloc_stopwatch(None);
        arena.start_stopwatch(id, 0);
        arena.start_stopwatch(id, 5);
        arena.stop_stopwatch(id, 10);
        assert!(arena.stopwatch(id).is_running());
        arena.stop_stopwatch(id, 20);
        assert!(!arena.stopwatch(id).is_running());
        assert_eq!(arena.stopwatch_time_for(id, 20, StatsKind::Total), 20);
    }

    #[test]
    fn double_stop_is_a_no_op() {
        let mut arena = TimerArena::new();
        let id = arena.alloc_stopwatch(None);
        arena.stop_stopwatch(id, 100);
        assert_eq!(arena.stopwatch_time_for(id, 100, StatsKind::Total), 0);
        assert_eq!(arena.stopwatch_count_for(id, StatsKind::Total), 0);
    }
}
