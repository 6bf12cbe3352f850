//! The battery-stats engine: owns the time bases, every aggregate, and the
//! unpluggable registry.
//!
//! All information collected about things that can happen that impact
//! battery life lives behind this one type. Event sources call the
//! `note_*` methods; a power-supply monitor calls [`BatteryStats::set_on_battery`];
//! a background tick calls [`BatteryStats::update_kernel_wakelocks`].
//!
//! Times are microseconds in the battery realtime base except where a
//! field says otherwise. Mutation goes through `&mut self`: callers that
//! share the engine across threads put one mutex around the whole thing,
//! because pool refreshes touch several timers in a single step and
//! serialization must see a consistent whole.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::arena::{CounterId, PoolId, SamplingId, StopwatchId, TimerArena};
use crate::bins::{
    brightness_bin, data_bin, signal_bin, user_activity_kind, DataBin, PhoneServiceState,
    RadioTech, SignalBin, SignalReading, NUM_BRIGHTNESS_BINS, NUM_DATA_BINS, NUM_SIGNAL_BINS,
};
use crate::clock::Clock;
use crate::error::{CodecError, StoreError};
use crate::kernel::{parse_wakelock_table, KernelWakelockReader};
use crate::net::{ByteTracker, NetworkSource, NullNetwork, NullRadio, RadioUptimeSource};
use crate::store::StatsStore;
use crate::types::{StatsKind, WakeClass, GPS_SENSOR_HANDLE};
use crate::uid::{new_registered_counter, new_registered_stopwatch, Uid};
use crate::{snapshot, summary};

/// Minimum spacing between the automatic summary writes triggered by
/// power-state transitions.
const WRITE_INTERVAL_MS: u64 = 60_000;

/// An object that must re-base its accounting when the power source flips.
///
/// Entries refer into the arena or name their owner path; the registry is
/// insertion-ordered and membership is permanent until the owning aggregate
/// is explicitly destroyed.
#[derive(Debug, Clone)]
pub enum Unpluggable {
    Counter(CounterId),
    Stopwatch(StopwatchId),
    Sampling(SamplingId),
    Proc { uid: u32, name: String },
    Pkg { uid: u32, name: String },
    Serv { uid: u32, pkg: String, name: String },
}

/// Merge buffer entry for one kernel wakelock name.
#[derive(Debug, Clone)]
struct KernelEntry {
    count: u32,
    total_time_us: u64,
    version: u32,
}

impl std::fmt::Debug for BatteryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatteryStats").finish_non_exhaustive()
    }
}

pub struct BatteryStats {
    clock: Box<dyn Clock>,
    net: Box<dyn NetworkSource>,
    radio: Box<dyn RadioUptimeSource>,
    kernel_reader: Option<KernelWakelockReader>,
    store: Option<StatsStore>,

    pub(crate) arena: TimerArena,
    pub(crate) unpluggables: Vec<Unpluggable>,
    pub(crate) uid_stats: BTreeMap<u32, Uid>,

    pub(crate) start_count: u32,

    // Historical totals carried across boots by the summary format.
    pub(crate) battery_uptime: u64,
    pub(crate) battery_last_uptime: u64,
    pub(crate) battery_realtime: u64,
    pub(crate) battery_last_realtime: u64,
    pub(crate) uptime: u64,
    pub(crate) uptime_start: u64,
    pub(crate) last_uptime: u64,
    pub(crate) realtime: u64,
    pub(crate) realtime_start: u64,
    pub(crate) last_realtime: u64,

    pub(crate) screen_on: bool,
    pub(crate) screen_on_timer: StopwatchId,
    pub(crate) screen_brightness_bin: Option<usize>,
    pub(crate) screen_brightness_timers: [StopwatchId; NUM_BRIGHTNESS_BINS],
    pub(crate) input_event_counter: CounterId,
    pub(crate) phone_on: bool,
    pub(crate) phone_on_timer: StopwatchId,
    pub(crate) signal_strength_bin: Option<SignalBin>,
    pub(crate) signal_strength_timers: [StopwatchId; NUM_SIGNAL_BINS],
    pub(crate) signal_scanning_timer: StopwatchId,
    pub(crate) data_connection_bin: Option<usize>,
    pub(crate) data_connection_timers: [StopwatchId; NUM_DATA_BINS],
    pub(crate) wifi_on: bool,
    pub(crate) wifi_on_timer: StopwatchId,
    pub(crate) wifi_on_uid: Option<u32>,
    pub(crate) wifi_running: bool,
    pub(crate) wifi_running_timer: StopwatchId,
    pub(crate) bluetooth_on: bool,
    pub(crate) bluetooth_on_timer: StopwatchId,
    pub(crate) audio_on: bool,
    pub(crate) audio_on_timer: StopwatchId,
    pub(crate) video_on: bool,
    pub(crate) video_on_timer: StopwatchId,
    pub(crate) phone_service_state: Option<PhoneServiceState>,
    radio_scanning_timeout: Option<u64>,

    // The battery time base. `on_battery` is what callers observe;
    // `on_battery_internal` is what the base accrues by. They diverge only
    // on a freshly restored snapshot, where the recorded state says "on
    // battery" but this process is not accruing.
    pub(crate) on_battery: bool,
    pub(crate) on_battery_internal: bool,
    pub(crate) track_battery_past_uptime: u64,
    pub(crate) track_battery_uptime_start: u64,
    pub(crate) track_battery_past_realtime: u64,
    pub(crate) track_battery_realtime_start: u64,
    pub(crate) unplugged_battery_uptime: u64,
    pub(crate) unplugged_battery_realtime: u64,

    pub(crate) discharge_start_level: i32,
    pub(crate) discharge_current_level: i32,
    pub(crate) last_write_time_ms: u64,

    pub(crate) mobile_rx: ByteTracker,
    pub(crate) mobile_tx: ByteTracker,
    pub(crate) total_rx: ByteTracker,
    pub(crate) total_tx: ByteTracker,

    pub(crate) radio_data_uptime: u64,
    pub(crate) radio_data_start: Option<u64>,

    pub(crate) kernel_wakelocks: BTreeMap<String, SamplingId>,
    proc_wakelock_buffer: BTreeMap<String, KernelEntry>,
    kernel_update_version: u32,

    pub(crate) partial_pool: PoolId,
    pub(crate) full_pool: PoolId,
    pub(crate) window_pool: PoolId,
    pub(crate) sensor_pools: BTreeMap<i32, PoolId>,

    pub(crate) cpu_speed_steps: usize,
}

impl BatteryStats {
    pub fn new(clock: Box<dyn Clock>) -> Self {
        let mut stats = Self {
            clock,
            net: Box::new(NullNetwork),
            radio: Box::new(NullRadio),
            kernel_reader: None,
            store: None,
            arena: TimerArena::new(),
            unpluggables: Vec::new(),
            uid_stats: BTreeMap::new(),
            start_count: 0,
            battery_uptime: 0,
            battery_last_uptime: 0,
            battery_realtime: 0,
            battery_last_realtime: 0,
            uptime: 0,
            uptime_start: 0,
            last_uptime: 0,
            realtime: 0,
            realtime_start: 0,
            last_realtime: 0,
            screen_on: false,
            screen_on_timer: StopwatchId(0),
            screen_brightness_bin: None,
            screen_brightness_timers: [StopwatchId(0); NUM_BRIGHTNESS_BINS],
            input_event_counter: CounterId(0),
            phone_on: false,
            phone_on_timer: StopwatchId(0),
            signal_strength_bin: None,
            signal_strength_timers: [StopwatchId(0); NUM_SIGNAL_BINS],
            signal_scanning_timer: StopwatchId(0),
            data_connection_bin: None,
            data_connection_timers: [StopwatchId(0); NUM_DATA_BINS],
            wifi_on: false,
            wifi_on_timer: StopwatchId(0),
            wifi_on_uid: None,
            wifi_running: false,
            wifi_running_timer: StopwatchId(0),
            bluetooth_on: false,
            bluetooth_on_timer: StopwatchId(0),
            audio_on: false,
            audio_on_timer: StopwatchId(0),
            video_on: false,
            video_on_timer: StopwatchId(0),
            phone_service_state: None,
            radio_scanning_timeout: None,
            on_battery: false,
            on_battery_internal: false,
            track_battery_past_uptime: 0,
            track_battery_uptime_start: 0,
            track_battery_past_realtime: 0,
            track_battery_realtime_start: 0,
            unplugged_battery_uptime: 0,
            unplugged_battery_realtime: 0,
            discharge_start_level: 0,
            discharge_current_level: 0,
            last_write_time_ms: 0,
            mobile_rx: ByteTracker::default(),
            mobile_tx: ByteTracker::default(),
            total_rx: ByteTracker::default(),
            total_tx: ByteTracker::default(),
            radio_data_uptime: 0,
            radio_data_start: None,
            kernel_wakelocks: BTreeMap::new(),
            proc_wakelock_buffer: BTreeMap::new(),
            kernel_update_version: 0,
            partial_pool: PoolId(0),
            full_pool: PoolId(0),
            window_pool: PoolId(0),
            sensor_pools: BTreeMap::new(),
            cpu_speed_steps: 0,
        };
        stats.reset_stats();
        stats
    }

    pub fn set_network_source(&mut self, net: Box<dyn NetworkSource>) {
        self.net = net;
    }

    pub fn set_radio_source(&mut self, radio: Box<dyn RadioUptimeSource>) {
        self.radio = radio;
    }

    pub fn set_kernel_reader(&mut self, reader: KernelWakelockReader) {
        self.kernel_reader = Some(reader);
    }

    pub fn set_store(&mut self, store: StatsStore) {
        self.store = Some(store);
    }

    /// Rebuild every stat from zero. Also the recovery path when persisted
    /// data turns out to be malformed: nothing partial ever survives.
    pub(crate) fn reset_stats(&mut self) {
        self.arena = TimerArena::new();
        self.unpluggables.clear();
        self.uid_stats.clear();
        self.kernel_wakelocks.clear();
        self.proc_wakelock_buffer.clear();
        self.kernel_update_version = 0;
        self.sensor_pools.clear();
        self.partial_pool = self.arena.create_pool();
        self.full_pool = self.arena.create_pool();
        self.window_pool = self.arena.create_pool();

        self.screen_on = false;
        self.screen_on_timer =
            new_registered_stopwatch(&mut self.arena, &mut self.unpluggables, None);
        self.screen_brightness_bin = None;
        self.screen_brightness_timers = std::array::from_fn(|_| {
            new_registered_stopwatch(&mut self.arena, &mut self.unpluggables, None)
        });
        self.input_event_counter =
            new_registered_counter(&mut self.arena, &mut self.unpluggables);
        self.phone_on = false;
        self.phone_on_timer =
            new_registered_stopwatch(&mut self.arena, &mut self.unpluggables, None);
        self.signal_strength_bin = None;
        self.signal_strength_timers = std::array::from_fn(|_| {
            new_registered_stopwatch(&mut self.arena, &mut self.unpluggables, None)
        });
        self.signal_scanning_timer =
            new_registered_stopwatch(&mut self.arena, &mut self.unpluggables, None);
        self.arena
            .stopwatch_mut(self.signal_scanning_timer)
            .set_timeout(self.radio_scanning_timeout);
        self.data_connection_bin = None;
        self.data_connection_timers = std::array::from_fn(|_| {
            new_registered_stopwatch(&mut self.arena, &mut self.unpluggables, None)
        });
        self.wifi_on = false;
        self.wifi_on_timer =
            new_registered_stopwatch(&mut self.arena, &mut self.unpluggables, None);
        self.wifi_on_uid = None;
        self.wifi_running = false;
        self.wifi_running_timer =
            new_registered_stopwatch(&mut self.arena, &mut self.unpluggables, None);
        self.bluetooth_on = false;
        self.bluetooth_on_timer =
            new_registered_stopwatch(&mut self.arena, &mut self.unpluggables, None);
        self.audio_on = false;
        self.audio_on_timer =
            new_registered_stopwatch(&mut self.arena, &mut self.unpluggables, None);
        self.video_on = false;
        self.video_on_timer =
            new_registered_stopwatch(&mut self.arena, &mut self.unpluggables, None);
        self.phone_service_state = None;

        self.start_count = 1;
        self.battery_uptime = 0;
        self.battery_last_uptime = 0;
        self.battery_realtime = 0;
        self.battery_last_realtime = 0;
        self.uptime = 0;
        self.last_uptime = 0;
        self.realtime = 0;
        self.last_realtime = 0;
        let now_up = self.clock.uptime_us();
        let now_real = self.clock.realtime_us();
        self.uptime_start = now_up;
        self.realtime_start = now_real;
        self.on_battery = false;
        self.on_battery_internal = false;
        self.track_battery_past_uptime = 0;
        self.track_battery_past_realtime = 0;
        self.track_battery_uptime_start = now_up;
        self.track_battery_realtime_start = now_real;
        self.unplugged_battery_uptime = 0;
        self.unplugged_battery_realtime = 0;
        self.discharge_start_level = 0;
        self.discharge_current_level = 0;
        self.last_write_time_ms = 0;
        self.mobile_rx = ByteTracker::default();
        self.mobile_tx = ByteTracker::default();
        self.total_rx = ByteTracker::default();
        self.total_tx = ByteTracker::default();
        self.radio_data_uptime = 0;
        self.radio_data_start = None;
    }

    // ------------------------------------------------------------------
    // Time bases
    // ------------------------------------------------------------------

    pub(crate) fn battery_uptime_at(&self, cur_uptime: u64) -> u64 {
        let mut time = self.track_battery_past_uptime;
        if self.on_battery_internal {
            time += cur_uptime.saturating_sub(self.track_battery_uptime_start);
        }
        time
    }

    pub(crate) fn battery_realtime_at(&self, cur_realtime: u64) -> u64 {
        let mut time = self.track_battery_past_realtime;
        if self.on_battery_internal {
            time += cur_realtime.saturating_sub(self.track_battery_realtime_start);
        }
        time
    }

    pub fn battery_uptime_now(&self) -> u64 {
        self.battery_uptime_at(self.clock.uptime_us())
    }

    pub fn battery_realtime_now(&self) -> u64 {
        self.battery_realtime_at(self.clock.realtime_us())
    }

    pub fn compute_uptime(&self, kind: StatsKind) -> u64 {
        let cur = self.clock.uptime_us();
        match kind {
            StatsKind::Total => self.uptime + (cur - self.uptime_start),
            StatsKind::Last => self.last_uptime,
            StatsKind::Current => cur - self.uptime_start,
            StatsKind::Unplugged => cur.saturating_sub(self.track_battery_uptime_start),
        }
    }

    pub fn compute_realtime(&self, kind: StatsKind) -> u64 {
        let cur = self.clock.realtime_us();
        match kind {
            StatsKind::Total => self.realtime + (cur - self.realtime_start),
            StatsKind::Last => self.last_realtime,
            StatsKind::Current => cur - self.realtime_start,
            StatsKind::Unplugged => cur.saturating_sub(self.track_battery_realtime_start),
        }
    }

    pub fn compute_battery_uptime(&self, kind: StatsKind) -> u64 {
        match kind {
            StatsKind::Total => self.battery_uptime + self.battery_uptime_now(),
            StatsKind::Last => self.battery_last_uptime,
            StatsKind::Current => self.battery_uptime_now(),
            StatsKind::Unplugged => self
                .battery_uptime_now()
                .saturating_sub(self.unplugged_battery_uptime),
        }
    }

    pub fn compute_battery_realtime(&self, kind: StatsKind) -> u64 {
        match kind {
            StatsKind::Total => self.battery_realtime + self.battery_realtime_now(),
            StatsKind::Last => self.battery_last_realtime,
            StatsKind::Current => self.battery_realtime_now(),
            StatsKind::Unplugged => self
                .battery_realtime_now()
                .saturating_sub(self.unplugged_battery_realtime),
        }
    }

    /// Awake time spent on battery this run.
    pub fn awake_time_battery(&self) -> u64 {
        self.battery_uptime_now()
    }

    /// Awake time spent on external power this run.
    pub fn awake_time_plugged(&self) -> u64 {
        (self.clock.uptime_us() - self.uptime_start).saturating_sub(self.awake_time_battery())
    }

    pub fn is_on_battery(&self) -> bool {
        self.on_battery
    }

    pub fn start_count(&self) -> u32 {
        self.start_count
    }

    pub fn discharge_start_level(&self) -> i32 {
        self.discharge_start_level
    }

    pub fn discharge_current_level(&self) -> i32 {
        self.discharge_current_level
    }

    pub fn record_current_level(&mut self, level: i32) {
        self.discharge_current_level = level;
    }

    // ------------------------------------------------------------------
    // Power-source transitions
    // ------------------------------------------------------------------

    /// Flip the power-source state. The battery level is the displayed
    /// 1-100 percentage at the moment of the transition.
    pub fn set_on_battery(&mut self, on_battery: bool, level: i32) {
        self.update_kernel_wakelocks();
        if self.on_battery == on_battery {
            return;
        }
        debug!(on_battery, level, "power source changed");
        self.on_battery = on_battery;
        self.on_battery_internal = on_battery;

        let uptime = self.clock.uptime_us();
        let realtime = self.clock.realtime_us();
        if on_battery {
            self.track_battery_uptime_start = uptime;
            self.track_battery_realtime_start = realtime;
            self.unplugged_battery_uptime = self.battery_uptime_at(uptime);
            self.unplugged_battery_realtime = self.battery_realtime_at(realtime);
            self.discharge_start_level = level;
            self.discharge_current_level = level;
            let (bu, br) = (self.unplugged_battery_uptime, self.unplugged_battery_realtime);
            self.do_unplug(bu, br);
        } else {
            self.track_battery_past_uptime +=
                uptime.saturating_sub(self.track_battery_uptime_start);
            self.track_battery_past_realtime +=
                realtime.saturating_sub(self.track_battery_realtime_start);
            self.discharge_current_level = level;
            let (bu, br) = (self.battery_uptime_at(uptime), self.battery_realtime_at(realtime));
            self.do_plug(bu, br);
        }

        let realtime_ms = realtime / 1000;
        if self.store.is_some() && self.last_write_time_ms + WRITE_INTERVAL_MS < realtime_ms {
            if let Err(err) = self.persist_to_store() {
                warn!(%err, "failed to write battery statistics");
            }
        }
    }

    fn do_unplug(&mut self, battery_uptime: u64, battery_realtime: u64) {
        {
            let Self { uid_stats, net, .. } = self;
            for u in uid_stats.values_mut() {
                u.started_tcp_rx = Some(net.uid_rx_bytes(u.uid));
                u.started_tcp_tx = Some(net.uid_tx_bytes(u.uid));
                u.tcp_rx_at_unplug = u.current_tcp_rx;
                u.tcp_tx_at_unplug = u.current_tcp_tx;
            }
        }
        for i in 0..self.unpluggables.len() {
            let item = self.unpluggables[i].clone();
            self.apply_unplug(&item, battery_uptime, battery_realtime);
        }
        self.mobile_rx.unplug(self.net.mobile_rx_bytes());
        self.mobile_tx.unplug(self.net.mobile_tx_bytes());
        self.total_rx.unplug(self.net.total_rx_bytes());
        self.total_tx.unplug(self.net.total_tx_bytes());
        self.radio_data_start = Some(self.radio.awake_time_us());
        self.radio_data_uptime = 0;
    }

    fn do_plug(&mut self, battery_uptime: u64, battery_realtime: u64) {
        {
            let Self { uid_stats, net, .. } = self;
            for u in uid_stats.values_mut() {
                if u.started_tcp_rx.is_some() {
                    u.current_tcp_rx = u.compute_current_tcp_rx(net.as_ref());
                    u.started_tcp_rx = None;
                }
                if u.started_tcp_tx.is_some() {
                    u.current_tcp_tx = u.compute_current_tcp_tx(net.as_ref());
                    u.started_tcp_tx = None;
                }
            }
        }
        for i in 0..self.unpluggables.len() {
            let item = self.unpluggables[i].clone();
            self.apply_plug(&item, battery_uptime, battery_realtime);
        }
        self.mobile_rx.plug();
        self.mobile_tx.plug();
        self.total_rx.plug();
        self.total_tx.plug();
        self.radio_data_uptime = self.radio_data_uptime_now();
        self.radio_data_start = None;
    }

    fn apply_unplug(&mut self, item: &Unpluggable, battery_uptime: u64, battery_realtime: u64) {
        match item {
            Unpluggable::Counter(id) => self.arena.counter_mut(*id).unplug(),
            Unpluggable::Stopwatch(id) => self.arena.unplug_stopwatch(*id, battery_realtime),
            Unpluggable::Sampling(id) => self.arena.sampling_mut(*id).unplug(),
            Unpluggable::Proc { uid, name } => {
                if let Some(p) = self.uid_stats.get_mut(uid).and_then(|u| u.procs.get_mut(name)) {
                    p.unplug();
                }
            }
            Unpluggable::Pkg { uid, name } => {
                if let Some(p) = self.uid_stats.get_mut(uid).and_then(|u| u.pkgs.get_mut(name)) {
                    p.unplug();
                }
            }
            Unpluggable::Serv { uid, pkg, name } => {
                if let Some(s) = self
                    .uid_stats
                    .get_mut(uid)
                    .and_then(|u| u.pkgs.get_mut(pkg))
                    .and_then(|p| p.servs.get_mut(name))
                {
                    s.unplug(battery_uptime);
                }
            }
        }
    }

    fn apply_plug(&mut self, item: &Unpluggable, _battery_uptime: u64, battery_realtime: u64) {
        match item {
            Unpluggable::Counter(id) => self.arena.counter_mut(*id).plug(),
            Unpluggable::Stopwatch(id) => self.arena.plug_stopwatch(*id, battery_realtime),
            Unpluggable::Sampling(id) => self.arena.sampling_mut(*id).plug(),
            // Procs, pkgs and servs snapshot at unplug only.
            Unpluggable::Proc { .. } | Unpluggable::Pkg { .. } | Unpluggable::Serv { .. } => {}
        }
    }

    // ------------------------------------------------------------------
    // Kernel wakelock ingestion
    // ------------------------------------------------------------------

    /// Poll the kernel table and merge it in. Without a configured reader,
    /// or when the read fails, prior values are retained untouched.
    pub fn update_kernel_wakelocks(&mut self) {
        let Some(reader) = &self.kernel_reader else {
            return;
        };
        match reader.read_table() {
            Some(table) => self.ingest_kernel_wakelocks(&table),
            None => warn!("couldn't get kernel wakelock stats"),
        }
    }

    /// Merge one read of the kernel table. Split out from the polling so
    /// the blocking file read can happen outside the engine lock.
    pub fn ingest_kernel_wakelocks(&mut self, table: &str) {
        self.kernel_update_version += 1;
        let version = self.kernel_update_version;

        let mut updated_names = 0usize;
        for sample in parse_wakelock_table(table) {
            match self.proc_wakelock_buffer.get_mut(&sample.name) {
                None => {
                    self.proc_wakelock_buffer.insert(
                        sample.name,
                        KernelEntry { count: sample.count, total_time_us: sample.total_time_us, version },
                    );
                    updated_names += 1;
                }
                Some(entry) if entry.version == version => {
                    // The kernel can list one name twice in a single read.
                    entry.count += sample.count;
                    entry.total_time_us += sample.total_time_us;
                }
                Some(entry) => {
                    entry.count = sample.count;
                    entry.total_time_us = sample.total_time_us;
                    entry.version = version;
                    updated_names += 1;
                }
            }
        }
        if self.proc_wakelock_buffer.len() != updated_names {
            self.proc_wakelock_buffer.retain(|_, e| e.version == version);
        }

        let on_battery = self.on_battery_internal;
        {
            let Self {
                arena,
                unpluggables,
                kernel_wakelocks,
                proc_wakelock_buffer,
                ..
            } = self;
            for (name, entry) in proc_wakelock_buffer.iter() {
                let id = *kernel_wakelocks.entry(name.clone()).or_insert_with(|| {
                    let id = arena.alloc_sampling(on_battery, true);
                    unpluggables.push(Unpluggable::Sampling(id));
                    id
                });
                let timer = arena.sampling_mut(id);
                timer.update_current_reported_count(entry.count);
                timer.update_current_reported_total_time(entry.total_time_us);
                timer.update_version = version;
            }
        }

        if self.proc_wakelock_buffer.len() != self.kernel_wakelocks.len() {
            // Names absent from this read are frozen, not forgotten.
            for &id in self.kernel_wakelocks.values() {
                if self.arena.sampling(id).update_version != version {
                    self.arena.sampling_mut(id).set_stale();
                }
            }
        }
    }

    pub fn kernel_wakelocks(&self) -> impl Iterator<Item = (&str, SamplingId)> {
        self.kernel_wakelocks.iter().map(|(n, id)| (n.as_str(), *id))
    }

    pub fn kernel_wakelock_time(&self, name: &str, kind: StatsKind) -> Option<u64> {
        self.kernel_wakelocks
            .get(name)
            .map(|id| self.arena.sampling_time_for(*id, kind))
    }

    pub fn kernel_wakelock_count(&self, name: &str, kind: StatsKind) -> Option<u32> {
        self.kernel_wakelocks
            .get(name)
            .map(|id| self.arena.sampling_count_for(*id, kind))
    }

    // ------------------------------------------------------------------
    // Global note dispatch
    // ------------------------------------------------------------------

    pub fn note_screen_on(&mut self) {
        if self.screen_on {
            return;
        }
        self.screen_on = true;
        let br = self.battery_realtime_now();
        self.arena.start_stopwatch(self.screen_on_timer, br);
        if let Some(bin) = self.screen_brightness_bin {
            self.arena.start_stopwatch(self.screen_brightness_timers[bin], br);
        }
    }

    pub fn note_screen_off(&mut self) {
        if !self.screen_on {
            return;
        }
        self.screen_on = false;
        let br = self.battery_realtime_now();
        self.arena.stop_stopwatch(self.screen_on_timer, br);
        if let Some(bin) = self.screen_brightness_bin {
            self.arena.stop_stopwatch(self.screen_brightness_timers[bin], br);
        }
    }

    pub fn note_screen_brightness(&mut self, value: u32) {
        let bin = brightness_bin(value);
        if self.screen_brightness_bin == Some(bin) {
            return;
        }
        if self.screen_on {
            let br = self.battery_realtime_now();
            if let Some(old) = self.screen_brightness_bin {
                self.arena.stop_stopwatch(self.screen_brightness_timers[old], br);
            }
            self.arena.start_stopwatch(self.screen_brightness_timers[bin], br);
        }
        self.screen_brightness_bin = Some(bin);
    }

    pub fn note_input_event(&mut self) {
        self.arena.counter_mut(self.input_event_counter).step();
    }

    pub fn note_user_activity(&mut self, uid: u32, event_type: i32) {
        let kind = user_activity_kind(event_type);
        let Self { uid_stats, arena, unpluggables, .. } = self;
        let u = uid_stats
            .entry(uid)
            .or_insert_with(|| Uid::new(uid, arena, unpluggables));
        let counters = *u.user_activity_counters(arena, unpluggables);
        arena.counter_mut(counters[kind as usize]).step();
    }

    pub fn note_phone_on(&mut self) {
        if !self.phone_on {
            self.phone_on = true;
            let br = self.battery_realtime_now();
            self.arena.start_stopwatch(self.phone_on_timer, br);
        }
    }

    pub fn note_phone_off(&mut self) {
        if self.phone_on {
            self.phone_on = false;
            let br = self.battery_realtime_now();
            self.arena.stop_stopwatch(self.phone_on_timer, br);
        }
    }

    /// Bound how long the scanning timer can accrue without a stop.
    pub fn set_radio_scanning_timeout(&mut self, timeout_us: Option<u64>) {
        self.radio_scanning_timeout = timeout_us;
        self.arena
            .stopwatch_mut(self.signal_scanning_timer)
            .set_timeout(timeout_us);
    }

    /// Registration-state change from the telephony stack.
    pub fn note_phone_state(&mut self, state: PhoneServiceState) {
        let br = self.battery_realtime_now();
        // Leaving service (or cutting the radio) unwinds every
        // signal-strength timer, however deeply nested.
        if state == PhoneServiceState::PowerOff || state == PhoneServiceState::OutOfService {
            for i in 0..NUM_SIGNAL_BINS {
                let id = self.signal_strength_timers[i];
                while self.arena.stopwatch(id).is_running() {
                    self.arena.stop_stopwatch(id, br);
                }
            }
        }
        // Scanning stops whenever the state changes; it restarts below if
        // we ended up out of service.
        while self.arena.stopwatch(self.signal_scanning_timer).is_running() {
            self.arena.stop_stopwatch(self.signal_scanning_timer, br);
        }

        match state {
            PhoneServiceState::InService => {
                let bin = self.signal_strength_bin.unwrap_or(SignalBin::NoneOrUnknown);
                let id = self.signal_strength_timers[bin.index()];
                if !self.arena.stopwatch(id).is_running() {
                    self.arena.start_stopwatch(id, br);
                }
            }
            PhoneServiceState::OutOfService => {
                self.signal_strength_bin = Some(SignalBin::NoneOrUnknown);
                let id = self.signal_strength_timers[SignalBin::NoneOrUnknown.index()];
                if !self.arena.stopwatch(id).is_running() {
                    self.arena.start_stopwatch(id, br);
                }
                if !self.arena.stopwatch(self.signal_scanning_timer).is_running() {
                    self.arena.start_stopwatch(self.signal_scanning_timer, br);
                }
            }
            PhoneServiceState::EmergencyOnly | PhoneServiceState::PowerOff => {}
        }
        self.phone_service_state = Some(state);
    }

    pub fn note_signal_strength(&mut self, reading: SignalReading) {
        // Strength changes while the radio is off or unregistered are noise.
        if matches!(
            self.phone_service_state,
            Some(PhoneServiceState::PowerOff) | Some(PhoneServiceState::OutOfService)
        ) {
            return;
        }
        let bin = signal_bin(reading);
        if self.signal_strength_bin == Some(bin) {
            return;
        }
        let br = self.battery_realtime_now();
        if let Some(old) = self.signal_strength_bin {
            self.arena.stop_stopwatch(self.signal_strength_timers[old.index()], br);
        }
        self.signal_strength_bin = Some(bin);
        self.arena.start_stopwatch(self.signal_strength_timers[bin.index()], br);
    }

    pub fn note_data_connection(&mut self, tech: RadioTech, has_data: bool) {
        let bin = data_bin(tech, has_data);
        if self.data_connection_bin == Some(bin.index()) {
            return;
        }
        let br = self.battery_realtime_now();
        if let Some(old) = self.data_connection_bin {
            self.arena.stop_stopwatch(self.data_connection_timers[old], br);
        }
        self.data_connection_bin = Some(bin.index());
        self.arena.start_stopwatch(self.data_connection_timers[bin.index()], br);
    }

    pub fn note_wifi_on(&mut self, uid: u32) {
        let br = self.battery_realtime_now();
        if !self.wifi_on {
            self.wifi_on = true;
            self.arena.start_stopwatch(self.wifi_on_timer, br);
        }
        if self.wifi_on_uid != Some(uid) {
            if let Some(prev) = self.wifi_on_uid {
                self.uid_note_wifi_off(prev, br);
            }
            self.wifi_on_uid = Some(uid);
            self.uid_note_wifi_on(uid, br);
        }
    }

    pub fn note_wifi_off(&mut self) {
        let br = self.battery_realtime_now();
        if self.wifi_on {
            self.wifi_on = false;
            self.arena.stop_stopwatch(self.wifi_on_timer, br);
        }
        if let Some(prev) = self.wifi_on_uid.take() {
            self.uid_note_wifi_off(prev, br);
        }
    }

    fn uid_note_wifi_on(&mut self, uid: u32, br: u64) {
        let Self { uid_stats, arena, unpluggables, .. } = self;
        let u = uid_stats
            .entry(uid)
            .or_insert_with(|| Uid::new(uid, arena, unpluggables));
        if !u.wifi_on {
            u.wifi_on = true;
            arena.start_stopwatch(u.wifi_on_timer, br);
        }
    }

    fn uid_note_wifi_off(&mut self, uid: u32, br: u64) {
        if let Some(u) = self.uid_stats.get_mut(&uid) {
            if u.wifi_on {
                u.wifi_on = false;
                self.arena.stop_stopwatch(u.wifi_on_timer, br);
            }
        }
    }

    pub fn note_wifi_running(&mut self) {
        if !self.wifi_running {
            self.wifi_running = true;
            let br = self.battery_realtime_now();
            self.arena.start_stopwatch(self.wifi_running_timer, br);
        }
    }

    pub fn note_wifi_stopped(&mut self) {
        if self.wifi_running {
            self.wifi_running = false;
            let br = self.battery_realtime_now();
            self.arena.stop_stopwatch(self.wifi_running_timer, br);
        }
    }

    pub fn note_bluetooth_on(&mut self) {
        if !self.bluetooth_on {
            self.bluetooth_on = true;
            let br = self.battery_realtime_now();
            self.arena.start_stopwatch(self.bluetooth_on_timer, br);
        }
    }

    pub fn note_bluetooth_off(&mut self) {
        if self.bluetooth_on {
            self.bluetooth_on = false;
            let br = self.battery_realtime_now();
            self.arena.stop_stopwatch(self.bluetooth_on_timer, br);
        }
    }

    pub fn note_audio_on(&mut self, uid: u32) {
        let br = self.battery_realtime_now();
        if !self.audio_on {
            self.audio_on = true;
            self.arena.start_stopwatch(self.audio_on_timer, br);
        }
        let Self { uid_stats, arena, unpluggables, .. } = self;
        let u = uid_stats
            .entry(uid)
            .or_insert_with(|| Uid::new(uid, arena, unpluggables));
        if !u.audio_on {
            u.audio_on = true;
            arena.start_stopwatch(u.audio_timer, br);
        }
    }

    pub fn note_audio_off(&mut self, uid: u32) {
        let br = self.battery_realtime_now();
        if self.audio_on {
            self.audio_on = false;
            self.arena.stop_stopwatch(self.audio_on_timer, br);
        }
        if let Some(u) = self.uid_stats.get_mut(&uid) {
            if u.audio_on {
                u.audio_on = false;
                self.arena.stop_stopwatch(u.audio_timer, br);
            }
        }
    }

    pub fn note_video_on(&mut self, uid: u32) {
        let br = self.battery_realtime_now();
        if !self.video_on {
            self.video_on = true;
            self.arena.start_stopwatch(self.video_on_timer, br);
        }
        let Self { uid_stats, arena, unpluggables, .. } = self;
        let u = uid_stats
            .entry(uid)
            .or_insert_with(|| Uid::new(uid, arena, unpluggables));
        if !u.video_on {
            u.video_on = true;
            arena.start_stopwatch(u.video_timer, br);
        }
    }

    pub fn note_video_off(&mut self, uid: u32) {
        let br = self.battery_realtime_now();
        if self.video_on {
            self.video_on = false;
            self.arena.stop_stopwatch(self.video_on_timer, br);
        }
        if let Some(u) = self.uid_stats.get_mut(&uid) {
            if u.video_on {
                u.video_on = false;
                self.arena.stop_stopwatch(u.video_timer, br);
            }
        }
    }

    // ------------------------------------------------------------------
    // Per-uid note dispatch
    // ------------------------------------------------------------------

    pub fn note_full_wifi_lock_acquired(&mut self, uid: u32) {
        let br = self.battery_realtime_now();
        let Self { uid_stats, arena, unpluggables, .. } = self;
        let u = uid_stats
            .entry(uid)
            .or_insert_with(|| Uid::new(uid, arena, unpluggables));
        if !u.full_wifi_lock {
            u.full_wifi_lock = true;
            arena.start_stopwatch(u.full_wifi_lock_timer, br);
        }
    }

    pub fn note_full_wifi_lock_released(&mut self, uid: u32) {
        let br = self.battery_realtime_now();
        if let Some(u) = self.uid_stats.get_mut(&uid) {
            if u.full_wifi_lock {
                u.full_wifi_lock = false;
                self.arena.stop_stopwatch(u.full_wifi_lock_timer, br);
            }
        }
    }

    pub fn note_scan_wifi_lock_acquired(&mut self, uid: u32) {
        let br = self.battery_realtime_now();
        let Self { uid_stats, arena, unpluggables, .. } = self;
        let u = uid_stats
            .entry(uid)
            .or_insert_with(|| Uid::new(uid, arena, unpluggables));
        if !u.scan_wifi_lock {
            u.scan_wifi_lock = true;
            arena.start_stopwatch(u.scan_wifi_lock_timer, br);
        }
    }

    pub fn note_scan_wifi_lock_released(&mut self, uid: u32) {
        let br = self.battery_realtime_now();
        if let Some(u) = self.uid_stats.get_mut(&uid) {
            if u.scan_wifi_lock {
                u.scan_wifi_lock = false;
                self.arena.stop_stopwatch(u.scan_wifi_lock_timer, br);
            }
        }
    }

    pub fn note_wifi_multicast_enabled(&mut self, uid: u32) {
        let br = self.battery_realtime_now();
        let Self { uid_stats, arena, unpluggables, .. } = self;
        let u = uid_stats
            .entry(uid)
            .or_insert_with(|| Uid::new(uid, arena, unpluggables));
        if !u.wifi_multicast {
            u.wifi_multicast = true;
            arena.start_stopwatch(u.wifi_multicast_timer, br);
        }
    }

    pub fn note_wifi_multicast_disabled(&mut self, uid: u32) {
        let br = self.battery_realtime_now();
        if let Some(u) = self.uid_stats.get_mut(&uid) {
            if u.wifi_multicast {
                u.wifi_multicast = false;
                self.arena.stop_stopwatch(u.wifi_multicast_timer, br);
            }
        }
    }

    pub(crate) fn wake_pool(&self, class: WakeClass) -> PoolId {
        match class {
            WakeClass::Partial => self.partial_pool,
            WakeClass::Full => self.full_pool,
            WakeClass::Window => self.window_pool,
        }
    }

    pub fn note_start_wakelock(&mut self, uid: u32, name: &str, class: WakeClass) {
        let br = self.battery_realtime_now();
        let pool = self.wake_pool(class);
        let Self { uid_stats, arena, unpluggables, .. } = self;
        let u = uid_stats
            .entry(uid)
            .or_insert_with(|| Uid::new(uid, arena, unpluggables));
        let timer = u.wakelock_timer(name, class, pool, arena, unpluggables);
        arena.start_stopwatch(timer, br);
    }

    pub fn note_stop_wakelock(&mut self, uid: u32, name: &str, class: WakeClass) {
        let br = self.battery_realtime_now();
        let pool = self.wake_pool(class);
        let Self { uid_stats, arena, unpluggables, .. } = self;
        let u = uid_stats
            .entry(uid)
            .or_insert_with(|| Uid::new(uid, arena, unpluggables));
        let timer = u.wakelock_timer(name, class, pool, arena, unpluggables);
        arena.stop_stopwatch(timer, br);
    }

    pub fn note_start_sensor(&mut self, uid: u32, handle: i32) {
        let br = self.battery_realtime_now();
        let Self { uid_stats, arena, unpluggables, sensor_pools, .. } = self;
        let pool = *sensor_pools
            .entry(handle)
            .or_insert_with(|| arena.create_pool());
        let u = uid_stats
            .entry(uid)
            .or_insert_with(|| Uid::new(uid, arena, unpluggables));
        let timer = u.sensor_timer(handle, pool, arena, unpluggables);
        arena.start_stopwatch(timer, br);
    }

    /// Stop paths never create state that a missed start would imply.
    pub fn note_stop_sensor(&mut self, uid: u32, handle: i32) {
        let br = self.battery_realtime_now();
        if let Some(timer) = self
            .uid_stats
            .get(&uid)
            .and_then(|u| u.sensor_timer_opt(handle))
        {
            self.arena.stop_stopwatch(timer, br);
        }
    }

    pub fn note_start_gps(&mut self, uid: u32) {
        self.note_start_sensor(uid, GPS_SENSOR_HANDLE);
    }

    pub fn note_stop_gps(&mut self, uid: u32) {
        self.note_stop_sensor(uid, GPS_SENSOR_HANDLE);
    }

    // ------------------------------------------------------------------
    // Process / package / service accounting
    // ------------------------------------------------------------------

    /// CPU speed-step count, fixed at the first call and immutable after.
    pub fn set_cpu_speed_steps(&mut self, steps: usize) {
        if self.cpu_speed_steps == 0 {
            self.cpu_speed_steps = steps;
        }
    }

    pub fn cpu_speed_steps(&self) -> usize {
        self.cpu_speed_steps
    }

    pub fn add_proc_cpu_time(&mut self, uid: u32, name: &str, user_ticks: u64, system_ticks: u64) {
        let steps = self.cpu_speed_steps;
        let Self { uid_stats, arena, unpluggables, .. } = self;
        let u = uid_stats
            .entry(uid)
            .or_insert_with(|| Uid::new(uid, arena, unpluggables));
        u.proc_mut(name, steps, arena, unpluggables)
            .add_cpu_time(user_ticks, system_ticks);
    }

    pub fn add_proc_foreground_time(&mut self, uid: u32, name: &str, ticks: u64) {
        let steps = self.cpu_speed_steps;
        let Self { uid_stats, arena, unpluggables, .. } = self;
        let u = uid_stats
            .entry(uid)
            .or_insert_with(|| Uid::new(uid, arena, unpluggables));
        u.proc_mut(name, steps, arena, unpluggables)
            .add_foreground_time(ticks);
    }

    pub fn inc_proc_starts(&mut self, uid: u32, name: &str) {
        let steps = self.cpu_speed_steps;
        let Self { uid_stats, arena, unpluggables, .. } = self;
        let u = uid_stats
            .entry(uid)
            .or_insert_with(|| Uid::new(uid, arena, unpluggables));
        u.proc_mut(name, steps, arena, unpluggables).inc_starts();
    }

    /// Distribute time-in-state ticks across the process's speed bins.
    /// Extra entries beyond the configured step count are ignored.
    pub fn add_proc_speed_step_ticks(&mut self, uid: u32, name: &str, ticks: &[u32]) {
        let steps = self.cpu_speed_steps;
        let bins: Vec<CounterId> = {
            let Self { uid_stats, arena, unpluggables, .. } = self;
            let u = uid_stats
                .entry(uid)
                .or_insert_with(|| Uid::new(uid, arena, unpluggables));
            u.proc_mut(name, steps, arena, unpluggables).speed_bins.clone()
        };
        for (id, &t) in bins.iter().zip(ticks) {
            self.arena.counter_mut(*id).add(t);
        }
    }

    pub fn note_pkg_wakeup(&mut self, uid: u32, pkg: &str) {
        let Self { uid_stats, arena, unpluggables, .. } = self;
        let u = uid_stats
            .entry(uid)
            .or_insert_with(|| Uid::new(uid, arena, unpluggables));
        u.pkg_mut(pkg, unpluggables).inc_wakeups();
    }

    pub fn note_service_started(&mut self, uid: u32, pkg: &str, name: &str) {
        let bu = self.battery_uptime_now();
        self.with_serv(uid, pkg, name, |s| s.start_running(bu));
    }

    pub fn note_service_stopped(&mut self, uid: u32, pkg: &str, name: &str) {
        let bu = self.battery_uptime_now();
        self.with_serv(uid, pkg, name, |s| s.stop_running(bu));
    }

    pub fn note_service_launched(&mut self, uid: u32, pkg: &str, name: &str) {
        let bu = self.battery_uptime_now();
        self.with_serv(uid, pkg, name, |s| s.start_launched(bu));
    }

    pub fn note_service_exited(&mut self, uid: u32, pkg: &str, name: &str) {
        let bu = self.battery_uptime_now();
        self.with_serv(uid, pkg, name, |s| s.stop_launched(bu));
    }

    fn with_serv(
        &mut self,
        uid: u32,
        pkg: &str,
        name: &str,
        f: impl FnOnce(&mut crate::uid::Serv),
    ) {
        let Self { uid_stats, arena, unpluggables, .. } = self;
        let u = uid_stats
            .entry(uid)
            .or_insert_with(|| Uid::new(uid, arena, unpluggables));
        f(u.serv_mut(pkg, name, unpluggables));
    }

    // ------------------------------------------------------------------
    // Uid lifecycle
    // ------------------------------------------------------------------

    pub fn uid_stats(&self) -> &BTreeMap<u32, Uid> {
        &self.uid_stats
    }

    pub fn uid(&self, uid: u32) -> Option<&Uid> {
        self.uid_stats.get(&uid)
    }

    pub(crate) fn uid_mut_or_create(&mut self, uid: u32) -> &mut Uid {
        let Self { uid_stats, arena, unpluggables, .. } = self;
        uid_stats
            .entry(uid)
            .or_insert_with(|| Uid::new(uid, arena, unpluggables))
    }

    /// Forget a uid entirely (the app was removed). The only way any
    /// aggregate ever goes away.
    pub fn remove_uid(&mut self, uid: u32) {
        let Some(u) = self.uid_stats.remove(&uid) else {
            return;
        };
        let br = self.battery_realtime_now();
        let stopwatch_ids = u.stopwatch_ids();
        let counter_ids = u.counter_ids();
        self.arena.evict_from_pools(&stopwatch_ids, br);
        self.unpluggables.retain(|item| match item {
            Unpluggable::Stopwatch(id) => !stopwatch_ids.contains(id),
            Unpluggable::Counter(id) => !counter_ids.contains(id),
            Unpluggable::Sampling(_) => true,
            Unpluggable::Proc { uid: u2, .. }
            | Unpluggable::Pkg { uid: u2, .. }
            | Unpluggable::Serv { uid: u2, .. } => *u2 != uid,
        });
    }

    // ------------------------------------------------------------------
    // Query surface
    // ------------------------------------------------------------------

    /// Drill into any stopwatch timer owned by an aggregate.
    pub fn timer_time(&self, id: StopwatchId, kind: StatsKind) -> u64 {
        self.arena
            .stopwatch_time_for(id, self.battery_realtime_now(), kind)
    }

    pub fn timer_count(&self, id: StopwatchId, kind: StatsKind) -> u32 {
        self.arena.stopwatch_count_for(id, kind)
    }

    pub fn counter_count(&self, id: CounterId, kind: StatsKind) -> u32 {
        self.arena.counter(id).count_for(kind)
    }

    pub fn screen_on_time(&self, kind: StatsKind) -> u64 {
        self.timer_time(self.screen_on_timer, kind)
    }

    pub fn screen_brightness_time(&self, bin: usize, kind: StatsKind) -> u64 {
        self.timer_time(self.screen_brightness_timers[bin], kind)
    }

    pub fn input_event_count(&self, kind: StatsKind) -> u32 {
        self.counter_count(self.input_event_counter, kind)
    }

    pub fn phone_on_time(&self, kind: StatsKind) -> u64 {
        self.timer_time(self.phone_on_timer, kind)
    }

    pub fn signal_strength_time(&self, bin: SignalBin, kind: StatsKind) -> u64 {
        self.timer_time(self.signal_strength_timers[bin.index()], kind)
    }

    pub fn signal_scanning_time(&self, kind: StatsKind) -> u64 {
        self.timer_time(self.signal_scanning_timer, kind)
    }

    pub fn data_connection_time(&self, bin: DataBin, kind: StatsKind) -> u64 {
        self.timer_time(self.data_connection_timers[bin.index()], kind)
    }

    pub fn data_connection_count(&self, bin: DataBin, kind: StatsKind) -> u32 {
        self.timer_count(self.data_connection_timers[bin.index()], kind)
    }

    pub fn wifi_on_time(&self, kind: StatsKind) -> u64 {
        self.timer_time(self.wifi_on_timer, kind)
    }

    pub fn wifi_running_time(&self, kind: StatsKind) -> u64 {
        self.timer_time(self.wifi_running_timer, kind)
    }

    pub fn bluetooth_on_time(&self, kind: StatsKind) -> u64 {
        self.timer_time(self.bluetooth_on_timer, kind)
    }

    pub fn audio_on_time(&self, kind: StatsKind) -> u64 {
        self.timer_time(self.audio_on_timer, kind)
    }

    pub fn video_on_time(&self, kind: StatsKind) -> u64 {
        self.timer_time(self.video_on_timer, kind)
    }

    pub fn uid_tcp_bytes_received(&self, uid: u32, kind: StatsKind) -> u64 {
        self.uid_stats
            .get(&uid)
            .map(|u| u.tcp_bytes_received(self.net.as_ref(), kind))
            .unwrap_or(0)
    }

    pub fn uid_tcp_bytes_sent(&self, uid: u32, kind: StatsKind) -> u64 {
        self.uid_stats
            .get(&uid)
            .map(|u| u.tcp_bytes_sent(self.net.as_ref(), kind))
            .unwrap_or(0)
    }

    /// Engine-wide byte counters. Only the `Unplugged` view is precise;
    /// the rest inherit whatever guarantees the OS counters provide.
    pub fn mobile_bytes_received(&self, kind: StatsKind) -> u64 {
        self.mobile_rx.read(self.net.mobile_rx_bytes(), kind)
    }

    pub fn mobile_bytes_sent(&self, kind: StatsKind) -> u64 {
        self.mobile_tx.read(self.net.mobile_tx_bytes(), kind)
    }

    pub fn total_bytes_received(&self, kind: StatsKind) -> u64 {
        self.total_rx.read(self.net.total_rx_bytes(), kind)
    }

    pub fn total_bytes_sent(&self, kind: StatsKind) -> u64 {
        self.total_tx.read(self.net.total_tx_bytes(), kind)
    }

    pub(crate) fn radio_data_uptime_now(&self) -> u64 {
        match self.radio_data_start {
            None => self.radio_data_uptime,
            Some(start) => self.radio.awake_time_us().saturating_sub(start),
        }
    }

    /// Radio awake time attributable to data transfer; approximate.
    pub fn radio_data_uptime(&self) -> u64 {
        self.radio_data_uptime_now()
    }

    pub(crate) fn net_source(&self) -> &dyn NetworkSource {
        self.net.as_ref()
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Lossless point-in-time dump for crash/restart recovery.
    pub fn to_snapshot(&self) -> Vec<u8> {
        snapshot::encode(self)
    }

    /// Rebuild an engine from a snapshot. On any decode failure nothing of
    /// the buffer is trusted and the error is returned.
    pub fn from_snapshot(bytes: &[u8], clock: Box<dyn Clock>) -> Result<Self, CodecError> {
        snapshot::decode(bytes, clock)
    }

    /// Lossy cross-boot summary bytes.
    pub fn to_summary(&self) -> Vec<u8> {
        summary::encode(self)
    }

    /// Load a summary. On any failure (version mismatch, truncation,
    /// trailing garbage) the engine is left fully zeroed.
    pub fn load_summary(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        self.reset_stats();
        match summary::decode(self, bytes) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.reset_stats();
                Err(err)
            }
        }
    }

    /// Read the store and load whatever is there. Absent data and
    /// discarded history both leave a freshly zeroed engine.
    pub fn load_from_store(&mut self) {
        let Some(store) = &self.store else {
            return;
        };
        let bytes = match store.read() {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return,
            Err(err) => {
                warn!(%err, "error reading battery statistics");
                return;
            }
        };
        if let Err(err) = self.load_summary(&bytes) {
            warn!(%err, "discarding persisted battery statistics");
        }
    }

    /// Write the summary through the store's temp/backup promotion.
    pub fn persist_to_store(&mut self) -> Result<(), StoreError> {
        let bytes = self.to_summary();
        let Some(store) = &self.store else {
            return Ok(());
        };
        store.write(&bytes)?;
        self.last_write_time_ms = self.clock.realtime_us() / 1000;
        Ok(())
    }
}
