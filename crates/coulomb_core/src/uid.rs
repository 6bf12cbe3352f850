//! Per-entity aggregates: everything attributed to one application uid.
//!
//! A `Uid` owns its child maps exclusively; the engine owns the uid map
//! exclusively. Nothing here is ever garbage-collected implicitly: a uid
//! and all its children live until the engine is told the app was removed.
//!
//! Child maps are `BTreeMap` so the serialization walks are byte-stable.

use std::collections::BTreeMap;

use crate::arena::{CounterId, PoolId, StopwatchId, TimerArena};
use crate::bins::NUM_USER_ACTIVITY_KINDS;
use crate::engine::Unpluggable;
use crate::net::NetworkSource;
use crate::types::{StatsKind, WakeClass};

pub(crate) fn new_registered_stopwatch(
    arena: &mut TimerArena,
    registry: &mut Vec<Unpluggable>,
    pool: Option<PoolId>,
) -> StopwatchId {
    let id = arena.alloc_stopwatch(pool);
    registry.push(Unpluggable::Stopwatch(id));
    id
}

pub(crate) fn new_registered_counter(
    arena: &mut TimerArena,
    registry: &mut Vec<Unpluggable>,
) -> CounterId {
    let id = arena.alloc_counter();
    registry.push(Unpluggable::Counter(id));
    id
}

/// Statistics for one uid.
#[derive(Debug)]
pub struct Uid {
    pub(crate) uid: u32,

    // TCP byte bookkeeping, reconciled against the network source at
    // plug/unplug boundaries. `started_*` is the live baseline captured at
    // unplug; `None` means we are not currently tracking.
    pub(crate) loaded_tcp_rx: u64,
    pub(crate) loaded_tcp_tx: u64,
    pub(crate) current_tcp_rx: u64,
    pub(crate) current_tcp_tx: u64,
    pub(crate) tcp_rx_at_unplug: u64,
    pub(crate) tcp_tx_at_unplug: u64,
    pub(crate) started_tcp_rx: Option<u64>,
    pub(crate) started_tcp_tx: Option<u64>,

    pub(crate) wifi_on: bool,
    pub(crate) wifi_on_timer: StopwatchId,
    pub(crate) full_wifi_lock: bool,
    pub(crate) full_wifi_lock_timer: StopwatchId,
    pub(crate) scan_wifi_lock: bool,
    pub(crate) scan_wifi_lock_timer: StopwatchId,
    pub(crate) wifi_multicast: bool,
    pub(crate) wifi_multicast_timer: StopwatchId,
    pub(crate) audio_on: bool,
    pub(crate) audio_timer: StopwatchId,
    pub(crate) video_on: bool,
    pub(crate) video_timer: StopwatchId,

    pub(crate) user_activity: Option<[CounterId; NUM_USER_ACTIVITY_KINDS]>,

    pub(crate) wakelocks: BTreeMap<String, Wakelock>,
    pub(crate) sensors: BTreeMap<i32, Sensor>,
    pub(crate) procs: BTreeMap<String, Proc>,
    pub(crate) pkgs: BTreeMap<String, Pkg>,
}

impl Uid {
    pub(crate) fn new(uid: u32, arena: &mut TimerArena, registry: &mut Vec<Unpluggable>) -> Self {
        Self {
            uid,
            loaded_tcp_rx: 0,
            loaded_tcp_tx: 0,
            current_tcp_rx: 0,
            current_tcp_tx: 0,
            tcp_rx_at_unplug: 0,
            tcp_tx_at_unplug: 0,
            started_tcp_rx: None,
            started_tcp_tx: None,
            wifi_on: false,
            wifi_on_timer: new_registered_stopwatch(arena, registry, None),
            full_wifi_lock: false,
            full_wifi_lock_timer: new_registered_stopwatch(arena, registry, None),
            scan_wifi_lock: false,
            scan_wifi_lock_timer: new_registered_stopwatch(arena, registry, None),
            wifi_multicast: false,
            wifi_multicast_timer: new_registered_stopwatch(arena, registry, None),
            audio_on: false,
            audio_timer: new_registered_stopwatch(arena, registry, None),
            video_on: false,
            video_timer: new_registered_stopwatch(arena, registry, None),
            user_activity: None,
            wakelocks: BTreeMap::new(),
            sensors: BTreeMap::new(),
            procs: BTreeMap::new(),
            pkgs: BTreeMap::new(),
        }
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn wakelocks(&self) -> &BTreeMap<String, Wakelock> {
        &self.wakelocks
    }

    pub fn sensors(&self) -> &BTreeMap<i32, Sensor> {
        &self.sensors
    }

    pub fn procs(&self) -> &BTreeMap<String, Proc> {
        &self.procs
    }

    pub fn pkgs(&self) -> &BTreeMap<String, Pkg> {
        &self.pkgs
    }

    pub fn wifi_on_timer_id(&self) -> StopwatchId {
        self.wifi_on_timer
    }

    pub fn full_wifi_lock_timer_id(&self) -> StopwatchId {
        self.full_wifi_lock_timer
    }

    pub fn scan_wifi_lock_timer_id(&self) -> StopwatchId {
        self.scan_wifi_lock_timer
    }

    pub fn wifi_multicast_timer_id(&self) -> StopwatchId {
        self.wifi_multicast_timer
    }

    pub fn audio_timer_id(&self) -> StopwatchId {
        self.audio_timer
    }

    pub fn video_timer_id(&self) -> StopwatchId {
        self.video_timer
    }

    pub fn user_activity_ids(&self) -> Option<[CounterId; NUM_USER_ACTIVITY_KINDS]> {
        self.user_activity
    }

    pub(crate) fn wakelock_timer(
        &mut self,
        name: &str,
        class: WakeClass,
        pool: PoolId,
        arena: &mut TimerArena,
        registry: &mut Vec<Unpluggable>,
    ) -> StopwatchId {
        let wl = self.wakelocks.entry(name.to_string()).or_default();
        let slot = match class {
            WakeClass::Partial => &mut wl.partial,
            WakeClass::Full => &mut wl.full,
            WakeClass::Window => &mut wl.window,
        };
        *slot.get_or_insert_with(|| new_registered_stopwatch(arena, registry, Some(pool)))
    }

    pub(crate) fn sensor_timer(
        &mut self,
        handle: i32,
        pool: PoolId,
        arena: &mut TimerArena,
        registry: &mut Vec<Unpluggable>,
    ) -> StopwatchId {
        let sensor = self
            .sensors
            .entry(handle)
            .or_insert_with(|| Sensor { handle, timer: None });
        *sensor
            .timer
            .get_or_insert_with(|| new_registered_stopwatch(arena, registry, Some(pool)))
    }

    /// Lookup without creating; stop paths must not materialize state.
    pub(crate) fn sensor_timer_opt(&self, handle: i32) -> Option<StopwatchId> {
        self.sensors.get(&handle).and_then(|s| s.timer)
    }

    pub(crate) fn user_activity_counters(
        &mut self,
        arena: &mut TimerArena,
        registry: &mut Vec<Unpluggable>,
    ) -> &[CounterId; NUM_USER_ACTIVITY_KINDS] {
        self.user_activity.get_or_insert_with(|| {
            [
                new_registered_counter(arena, registry),
                new_registered_counter(arena, registry),
                new_registered_counter(arena, registry),
            ]
        })
    }

    pub(crate) fn proc_mut(
        &mut self,
        name: &str,
        speed_steps: usize,
        arena: &mut TimerArena,
        registry: &mut Vec<Unpluggable>,
    ) -> &mut Proc {
        let uid = self.uid;
        self.procs.entry(name.to_string()).or_insert_with(|| {
            registry.push(Unpluggable::Proc { uid, name: name.to_string() });
            Proc::new(speed_steps, arena, registry)
        })
    }

    pub(crate) fn pkg_mut(&mut self, name: &str, registry: &mut Vec<Unpluggable>) -> &mut Pkg {
        let uid = self.uid;
        self.pkgs.entry(name.to_string()).or_insert_with(|| {
            registry.push(Unpluggable::Pkg { uid, name: name.to_string() });
            Pkg::default()
        })
    }

    pub(crate) fn serv_mut(
        &mut self,
        pkg: &str,
        name: &str,
        registry: &mut Vec<Unpluggable>,
    ) -> &mut Serv {
        let uid = self.uid;
        let package = self.pkg_mut(pkg, registry);
        package.servs.entry(name.to_string()).or_insert_with(|| {
            registry.push(Unpluggable::Serv {
                uid,
                pkg: pkg.to_string(),
                name: name.to_string(),
            });
            Serv::default()
        })
    }

    /// Bytes received since load, including the live delta while tracking.
    pub(crate) fn compute_current_tcp_rx(&self, net: &dyn NetworkSource) -> u64 {
        self.current_tcp_rx
            + self
                .started_tcp_rx
                .map(|s| net.uid_rx_bytes(self.uid).saturating_sub(s))
                .unwrap_or(0)
    }

    pub(crate) fn compute_current_tcp_tx(&self, net: &dyn NetworkSource) -> u64 {
        self.current_tcp_tx
            + self
                .started_tcp_tx
                .map(|s| net.uid_tx_bytes(self.uid).saturating_sub(s))
                .unwrap_or(0)
    }

    pub fn tcp_bytes_received(&self, net: &dyn NetworkSource, kind: StatsKind) -> u64 {
        match kind {
            StatsKind::Last => self.loaded_tcp_rx,
            StatsKind::Unplugged => self
                .compute_current_tcp_rx(net)
                .saturating_sub(self.tcp_rx_at_unplug),
            StatsKind::Total => self.compute_current_tcp_rx(net) + self.loaded_tcp_rx,
            StatsKind::Current => self.compute_current_tcp_rx(net),
        }
    }

    pub fn tcp_bytes_sent(&self, net: &dyn NetworkSource, kind: StatsKind) -> u64 {
        match kind {
            StatsKind::Last => self.loaded_tcp_tx,
            StatsKind::Unplugged => self
                .compute_current_tcp_tx(net)
                .saturating_sub(self.tcp_tx_at_unplug),
            StatsKind::Total => self.compute_current_tcp_tx(net) + self.loaded_tcp_tx,
            StatsKind::Current => self.compute_current_tcp_tx(net),
        }
    }

    /// Every counter id owned by this uid, for registry purging at removal.
    pub(crate) fn counter_ids(&self) -> Vec<CounterId> {
        let mut ids = Vec::new();
        if let Some(counters) = &self.user_activity {
            ids.extend_from_slice(counters);
        }
        for proc in self.procs.values() {
            ids.extend_from_slice(&proc.speed_bins);
        }
        ids
    }

    /// Every stopwatch id owned by this uid, for pool eviction at removal.
    pub(crate) fn stopwatch_ids(&self) -> Vec<StopwatchId> {
        let mut ids = vec![
            self.wifi_on_timer,
            self.full_wifi_lock_timer,
            self.scan_wifi_lock_timer,
            self.wifi_multicast_timer,
            self.audio_timer,
            self.video_timer,
        ];
        for wl in self.wakelocks.values() {
            ids.extend(wl.partial);
            ids.extend(wl.full);
            ids.extend(wl.window);
        }
        for sensor in self.sensors.values() {
            ids.extend(sensor.timer);
        }
        ids
    }
}

/// One named wakelock: up to three timers, one per class, each pooled with
/// every other holder of the same class.
#[derive(Debug, Default)]
pub struct Wakelock {
    pub(crate) partial: Option<StopwatchId>,
    pub(crate) full: Option<StopwatchId>,
    pub(crate) window: Option<StopwatchId>,
}

impl Wakelock {
    pub fn timer(&self, class: WakeClass) -> Option<StopwatchId> {
        match class {
            WakeClass::Partial => self.partial,
            WakeClass::Full => self.full,
            WakeClass::Window => self.window,
        }
    }
}

/// One sensor's usage; all holders of the same handle share a pool.
#[derive(Debug)]
pub struct Sensor {
    pub(crate) handle: i32,
    pub(crate) timer: Option<StopwatchId>,
}

impl Sensor {
    pub fn handle(&self) -> i32 {
        self.handle
    }

    pub fn timer(&self) -> Option<StopwatchId> {
        self.timer
    }
}

/// CPU accounting for one process. Times are in clock ticks (1/100 s) as
/// delivered by the process-stats reader, not battery realtime.
#[derive(Debug, Default)]
pub struct Proc {
    pub(crate) user_time: u64,
    pub(crate) system_time: u64,
    pub(crate) foreground_time: u64,
    pub(crate) starts: u32,

    pub(crate) loaded_user_time: u64,
    pub(crate) loaded_system_time: u64,
    pub(crate) loaded_foreground_time: u64,
    pub(crate) loaded_starts: u32,

    pub(crate) last_user_time: u64,
    pub(crate) last_system_time: u64,
    pub(crate) last_foreground_time: u64,
    pub(crate) last_starts: u32,

    pub(crate) unplugged_user_time: u64,
    pub(crate) unplugged_system_time: u64,
    pub(crate) unplugged_foreground_time: u64,
    pub(crate) unplugged_starts: u32,

    /// Ticks spent at each CPU speed step, batched from the kernel's
    /// time-in-state accounting.
    pub(crate) speed_bins: Vec<CounterId>,
}

impl Proc {
    pub(crate) fn new(
        speed_steps: usize,
        arena: &mut TimerArena,
        registry: &mut Vec<Unpluggable>,
    ) -> Self {
        Self {
            speed_bins: (0..speed_steps)
                .map(|_| new_registered_counter(arena, registry))
                .collect(),
            ..Self::default()
        }
    }

    pub fn add_cpu_time(&mut self, user_ticks: u64, system_ticks: u64) {
        self.user_time += user_ticks;
        self.system_time += system_ticks;
    }

    pub fn add_foreground_time(&mut self, ticks: u64) {
        self.foreground_time += ticks;
    }

    pub fn inc_starts(&mut self) {
        self.starts += 1;
    }

    pub fn user_time(&self, kind: StatsKind) -> u64 {
        baseline_u64(
            kind,
            self.user_time,
            self.loaded_user_time,
            self.last_user_time,
            self.unplugged_user_time,
        )
    }

    pub fn system_time(&self, kind: StatsKind) -> u64 {
        baseline_u64(
            kind,
            self.system_time,
            self.loaded_system_time,
            self.last_system_time,
            self.unplugged_system_time,
        )
    }

    pub fn foreground_time(&self, kind: StatsKind) -> u64 {
        baseline_u64(
            kind,
            self.foreground_time,
            self.loaded_foreground_time,
            self.last_foreground_time,
            self.unplugged_foreground_time,
        )
    }

    pub fn starts(&self, kind: StatsKind) -> u32 {
        baseline_u32(kind, self.starts, self.loaded_starts, self.last_starts, self.unplugged_starts)
    }

    pub fn speed_bins(&self) -> &[CounterId] {
        &self.speed_bins
    }

    pub(crate) fn unplug(&mut self) {
        self.unplugged_user_time = self.user_time;
        self.unplugged_system_time = self.system_time;
        self.unplugged_starts = self.starts;
        self.unplugged_foreground_time = self.foreground_time;
    }
}

/// Wakeup-alarm accounting for one package, plus its services.
#[derive(Debug, Default)]
pub struct Pkg {
    pub(crate) wakeups: u32,
    pub(crate) loaded_wakeups: u32,
    pub(crate) last_wakeups: u32,
    pub(crate) unplugged_wakeups: u32,

    pub(crate) servs: BTreeMap<String, Serv>,
}

impl Pkg {
    pub fn inc_wakeups(&mut self) {
        self.wakeups += 1;
    }

    pub fn wakeups(&self, kind: StatsKind) -> u32 {
        baseline_u32(kind, self.wakeups, self.loaded_wakeups, self.last_wakeups, self.unplugged_wakeups)
    }

    pub fn servs(&self) -> &BTreeMap<String, Serv> {
        &self.servs
    }

    pub(crate) fn unplug(&mut self) {
        self.unplugged_wakeups = self.wakeups;
    }
}

/// One service: "started" and "launched" are independently nested
/// intervals accounted in battery *uptime* (the device must be awake for a
/// service to run).
#[derive(Debug, Default)]
pub struct Serv {
    pub(crate) start_time: u64,
    pub(crate) running_since: u64,
    pub(crate) running: bool,
    pub(crate) starts: u32,

    pub(crate) launched_time: u64,
    pub(crate) launched_since: u64,
    pub(crate) launched: bool,
    pub(crate) launches: u32,

    pub(crate) loaded_start_time: u64,
    pub(crate) loaded_starts: u32,
    pub(crate) loaded_launches: u32,

    pub(crate) last_start_time: u64,
    pub(crate) last_starts: u32,
    pub(crate) last_launches: u32,

    pub(crate) unplugged_start_time: u64,
    pub(crate) unplugged_starts: u32,
    pub(crate) unplugged_launches: u32,
}

impl Serv {
    pub(crate) fn start_time_to_now(&self, battery_uptime: u64) -> u64 {
        if !self.running {
            return self.start_time;
        }
        self.start_time + battery_uptime.saturating_sub(self.running_since)
    }

    pub(crate) fn launch_time_to_now(&self, battery_uptime: u64) -> u64 {
        if !self.launched {
            return self.launched_time;
        }
        self.launched_time + battery_uptime.saturating_sub(self.launched_since)
    }

    pub fn start_running(&mut self, battery_uptime: u64) {
        if !self.running {
            self.starts += 1;
            self.running_since = battery_uptime;
            self.running = true;
        }
    }

    pub fn stop_running(&mut self, battery_uptime: u64) {
        if self.running {
            let time = battery_uptime.saturating_sub(self.running_since);
            if time > 0 {
                self.start_time += time;
            } else {
                // Nothing accrued: this was not a real start.
                self.starts -= 1;
            }
            self.running = false;
        }
    }

    pub fn start_launched(&mut self, battery_uptime: u64) {
        if !self.launched {
            self.launches += 1;
            self.launched_since = battery_uptime;
            self.launched = true;
        }
    }

    pub fn stop_launched(&mut self, battery_uptime: u64) {
        if self.launched {
            let time = battery_uptime.saturating_sub(self.launched_since);
            if time > 0 {
                self.launched_time += time;
            } else {
                self.launches -= 1;
            }
            self.launched = false;
        }
    }

    pub fn starts(&self, kind: StatsKind) -> u32 {
        baseline_u32(kind, self.starts, self.loaded_starts, self.last_starts, self.unplugged_starts)
    }

    pub fn launches(&self, kind: StatsKind) -> u32 {
        baseline_u32(kind, self.launches, self.loaded_launches, self.last_launches, self.unplugged_launches)
    }

    pub fn start_time(&self, battery_uptime: u64, kind: StatsKind) -> u64 {
        baseline_u64(
            kind,
            self.start_time_to_now(battery_uptime),
            self.loaded_start_time,
            self.last_start_time,
            self.unplugged_start_time,
        )
    }

    pub(crate) fn unplug(&mut self, battery_uptime: u64) {
        self.unplugged_start_time = self.start_time_to_now(battery_uptime);
        self.unplugged_starts = self.starts;
        self.unplugged_launches = self.launches;
    }
}

fn baseline_u64(kind: StatsKind, value: u64, loaded: u64, last: u64, unplugged: u64) -> u64 {
    match kind {
        StatsKind::Last => last,
        StatsKind::Total => value,
        StatsKind::Current => value.saturating_sub(loaded),
        StatsKind::Unplugged => value.saturating_sub(unplugged),
    }
}

fn baseline_u32(kind: StatsKind, value: u32, loaded: u32, last: u32, unplugged: u32) -> u32 {
    match kind {
        StatsKind::Last => last,
        StatsKind::Total => value,
        StatsKind::Current => value.saturating_sub(loaded),
        StatsKind::Unplugged => value.saturating_sub(unplugged),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serv_zero_duration_start_is_discarded() {
        let mut s = Serv::default();
        s.start_running(100);
        s.stop_running(100);
        assert_eq!(s.starts(StatsKind::Total), 0);
        assert_eq!(s.start_time(100, StatsKind::Total), 0);
    }

    #[test]
    fn serv_started_and_launched_nest_independently() {
        let mut s = Serv::default();
        s.start_running(0);
        s.start_launched(10);
        s.stop_launched(40);
        s.stop_running(100);
        assert_eq!(s.start_time(100, StatsKind::Total), 100);
        assert_eq!(s.launch_time_to_now(100), 30);
        assert_eq!(s.starts(StatsKind::Total), 1);
        assert_eq!(s.launches(StatsKind::Total), 1);
    }

    #[test]
    fn serv_running_time_accrues_live() {
        let mut s = Serv::default();
        s.start_running(50);
        assert_eq!(s.start_time(80, StatsKind::Total), 30);
        // Idempotent while nothing changes.
        assert_eq!(s.start_time(80, StatsKind::Total), 30);
    }

    #[test]
    fn proc_four_mode_views() {
        let mut p = Proc::default();
        p.add_cpu_time(100, 40);
        p.unplug();
        p.add_cpu_time(10, 5);
        assert_eq!(p.user_time(StatsKind::Total), 110);
        assert_eq!(p.user_time(StatsKind::Unplugged), 10);
        assert_eq!(p.system_time(StatsKind::Unplugged), 5);
        assert_eq!(p.starts(StatsKind::Total), 0);
    }
}
