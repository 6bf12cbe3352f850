//! Lossless snapshot codec.
//!
//! A faithful point-in-time dump of the whole engine, suitable for
//! crash/restart recovery. Layout, in order:
//!
//! magic, version, start count, historical battery uptime/realtime totals,
//! every named engine timer (full form: 4 counts + 4 times + update time),
//! the raw uptime/realtime bookkeeping, the battery time base, discharge
//! levels, the engine byte trackers (unplugged view), radio data uptime,
//! the kernel wakelock table, the CPU speed-step count, then one block per
//! uid (wakelocks, sensors, processes, packages/services, TCP bytes, the
//! uid timers, user-activity counters).
//!
//! A decoded engine is not "running": nesting is cleared and pools are
//! rebuilt empty, because the holders that were live when the snapshot was
//! taken are gone. Bad magic or a version difference rejects the whole
//! buffer; nothing is ever partially trusted.

use crate::arena::StopwatchId;
use crate::clock::Clock;
use crate::codec::{ByteReader, ByteWriter};
use crate::counter::Counter;
use crate::engine::{BatteryStats, Unpluggable};
use crate::error::CodecError;
use crate::net::ByteTracker;
use crate::timer::{SamplingTimer, TimerBase};
use crate::types::{StatsKind, WakeClass};
use crate::uid::new_registered_counter;

/// Reads as "CLMB" when the little-endian u32 is viewed most significant
/// byte first.
pub const MAGIC: u32 = 0x434C_4D42;

/// Bumped whenever the field walk changes shape.
pub const SNAPSHOT_VERSION: u32 = 7;

fn write_stopwatch(w: &mut ByteWriter, stats: &BatteryStats, id: StopwatchId, br: u64) {
    let run_time = stats.arena.stopwatch_run_time(id, br);
    let t = stats.arena.stopwatch(id);
    t.base.write_full(w, run_time);
    w.write_u64(t.update_time);
}

fn write_opt_stopwatch(w: &mut ByteWriter, stats: &BatteryStats, id: Option<StopwatchId>, br: u64) {
    match id {
        None => w.write_bool(false),
        Some(id) => {
            w.write_bool(true);
            write_stopwatch(w, stats, id, br);
        }
    }
}

fn write_sampling(w: &mut ByteWriter, t: &SamplingTimer) {
    t.base.write_full(w, t.compute_run_time());
    w.write_u32(t.current_reported_count);
    w.write_u32(t.unplugged_reported_count);
    w.write_u64(t.current_reported_total_time);
    w.write_u64(t.unplugged_reported_total_time);
    w.write_bool(t.tracking_reported_values);
}

fn read_stopwatch_parts(r: &mut ByteReader<'_>) -> Result<(TimerBase, u64), CodecError> {
    let base = TimerBase::read_full(r)?;
    let update_time = r.read_u64()?;
    Ok((base, update_time))
}

fn read_stopwatch_into(
    r: &mut ByteReader<'_>,
    stats: &mut BatteryStats,
    id: StopwatchId,
) -> Result<(), CodecError> {
    let (base, update_time) = read_stopwatch_parts(r)?;
    let t = stats.arena.stopwatch_mut(id);
    t.acquire_time = base.total_time;
    t.base = base;
    t.update_time = update_time;
    t.nesting = 0;
    Ok(())
}

fn read_sampling(r: &mut ByteReader<'_>, in_discharge: bool) -> Result<SamplingTimer, CodecError> {
    let base = TimerBase::read_full(r)?;
    let current_reported_count = r.read_u32()?;
    let unplugged_reported_count = r.read_u32()?;
    let current_reported_total_time = r.read_u64()?;
    let unplugged_reported_total_time = r.read_u64()?;
    let tracking_reported_values = r.read_bool()?;
    Ok(SamplingTimer {
        base,
        current_reported_count,
        unplugged_reported_count,
        current_reported_total_time,
        unplugged_reported_total_time,
        in_discharge,
        tracking_reported_values,
        update_version: 0,
    })
}

pub(crate) fn encode(stats: &BatteryStats) -> Vec<u8> {
    let bu = stats.battery_uptime_now();
    let br = stats.battery_realtime_now();
    let mut w = ByteWriter::new();

    w.write_u32(MAGIC);
    w.write_u32(SNAPSHOT_VERSION);
    w.write_u32(stats.start_count);
    w.write_u64(stats.battery_uptime);
    w.write_u64(stats.battery_last_uptime);
    w.write_u64(stats.battery_realtime);
    w.write_u64(stats.battery_last_realtime);

    write_stopwatch(&mut w, stats, stats.screen_on_timer, br);
    for id in stats.screen_brightness_timers {
        write_stopwatch(&mut w, stats, id, br);
    }
    stats.arena.counter(stats.input_event_counter).write_full(&mut w);
    write_stopwatch(&mut w, stats, stats.phone_on_timer, br);
    for id in stats.signal_strength_timers {
        write_stopwatch(&mut w, stats, id, br);
    }
    write_stopwatch(&mut w, stats, stats.signal_scanning_timer, br);
    for id in stats.data_connection_timers {
        write_stopwatch(&mut w, stats, id, br);
    }
    write_stopwatch(&mut w, stats, stats.wifi_on_timer, br);
    write_stopwatch(&mut w, stats, stats.wifi_running_timer, br);
    write_stopwatch(&mut w, stats, stats.bluetooth_on_timer, br);
    write_stopwatch(&mut w, stats, stats.audio_on_timer, br);
    write_stopwatch(&mut w, stats, stats.video_on_timer, br);

    w.write_u64(stats.uptime);
    w.write_u64(stats.uptime_start);
    w.write_u64(stats.last_uptime);
    w.write_u64(stats.realtime);
    w.write_u64(stats.realtime_start);
    w.write_u64(stats.last_realtime);
    w.write_bool(stats.on_battery);
    w.write_u64(bu);
    w.write_u64(stats.track_battery_uptime_start);
    w.write_u64(br);
    w.write_u64(stats.track_battery_realtime_start);
    w.write_u64(stats.unplugged_battery_uptime);
    w.write_u64(stats.unplugged_battery_realtime);
    w.write_i32(stats.discharge_start_level);
    w.write_i32(stats.discharge_current_level);
    w.write_u64(stats.last_write_time_ms);

    w.write_u64(stats.mobile_bytes_received(StatsKind::Unplugged));
    w.write_u64(stats.mobile_bytes_sent(StatsKind::Unplugged));
    w.write_u64(stats.total_bytes_received(StatsKind::Unplugged));
    w.write_u64(stats.total_bytes_sent(StatsKind::Unplugged));
    w.write_u64(stats.radio_data_uptime());

    w.write_u32(stats.kernel_wakelocks.len() as u32);
    for (name, id) in stats.kernel_wakelocks.iter() {
        w.write_str(name);
        write_sampling(&mut w, stats.arena.sampling(*id));
    }

    w.write_u32(stats.cpu_speed_steps as u32);

    w.write_u32(stats.uid_stats.len() as u32);
    for (uid, u) in stats.uid_stats.iter() {
        w.write_u32(*uid);

        w.write_u32(u.wakelocks.len() as u32);
        for (name, wl) in u.wakelocks.iter() {
            w.write_str(name);
            write_opt_stopwatch(&mut w, stats, wl.partial, br);
            write_opt_stopwatch(&mut w, stats, wl.full, br);
            write_opt_stopwatch(&mut w, stats, wl.window, br);
        }

        w.write_u32(u.sensors.len() as u32);
        for (handle, sensor) in u.sensors.iter() {
            w.write_i32(*handle);
            write_opt_stopwatch(&mut w, stats, sensor.timer, br);
        }

        w.write_u32(u.procs.len() as u32);
        for (name, p) in u.procs.iter() {
            w.write_str(name);
            w.write_u64(p.user_time);
            w.write_u64(p.system_time);
            w.write_u64(p.foreground_time);
            w.write_u32(p.starts);
            w.write_u64(p.loaded_user_time);
            w.write_u64(p.loaded_system_time);
            w.write_u64(p.loaded_foreground_time);
            w.write_u32(p.loaded_starts);
            w.write_u64(p.last_user_time);
            w.write_u64(p.last_system_time);
            w.write_u64(p.last_foreground_time);
            w.write_u32(p.last_starts);
            w.write_u64(p.unplugged_user_time);
            w.write_u64(p.unplugged_system_time);
            w.write_u64(p.unplugged_foreground_time);
            w.write_u32(p.unplugged_starts);
            w.write_u32(p.speed_bins.len() as u32);
            for id in p.speed_bins.iter() {
                stats.arena.counter(*id).write_full(&mut w);
            }
        }

        w.write_u32(u.pkgs.len() as u32);
        for (name, p) in u.pkgs.iter() {
            w.write_str(name);
            w.write_u32(p.wakeups);
            w.write_u32(p.loaded_wakeups);
            w.write_u32(p.last_wakeups);
            w.write_u32(p.unplugged_wakeups);
            w.write_u32(p.servs.len() as u32);
            for (sname, s) in p.servs.iter() {
                w.write_str(sname);
                w.write_u64(s.start_time);
                w.write_u64(s.running_since);
                w.write_bool(s.running);
                w.write_u32(s.starts);
                w.write_u64(s.launched_time);
                w.write_u64(s.launched_since);
                w.write_bool(s.launched);
                w.write_u32(s.launches);
                w.write_u64(s.loaded_start_time);
                w.write_u32(s.loaded_starts);
                w.write_u32(s.loaded_launches);
                w.write_u64(s.last_start_time);
                w.write_u32(s.last_starts);
                w.write_u32(s.last_launches);
                w.write_u64(s.unplugged_start_time);
                w.write_u32(s.unplugged_starts);
                w.write_u32(s.unplugged_launches);
            }
        }

        w.write_u64(u.loaded_tcp_rx);
        w.write_u64(u.loaded_tcp_tx);
        w.write_u64(u.compute_current_tcp_rx(stats.net_source()));
        w.write_u64(u.compute_current_tcp_tx(stats.net_source()));
        w.write_u64(u.tcp_rx_at_unplug);
        w.write_u64(u.tcp_tx_at_unplug);

        write_stopwatch(&mut w, stats, u.wifi_on_timer, br);
        write_stopwatch(&mut w, stats, u.full_wifi_lock_timer, br);
        write_stopwatch(&mut w, stats, u.audio_timer, br);
        write_stopwatch(&mut w, stats, u.video_timer, br);
        write_stopwatch(&mut w, stats, u.scan_wifi_lock_timer, br);
        write_stopwatch(&mut w, stats, u.wifi_multicast_timer, br);

        match &u.user_activity {
            None => w.write_bool(false),
            Some(ids) => {
                w.write_bool(true);
                for id in ids {
                    stats.arena.counter(*id).write_full(&mut w);
                }
            }
        }
    }

    w.into_bytes()
}

pub(crate) fn decode(bytes: &[u8], clock: Box<dyn Clock>) -> Result<BatteryStats, CodecError> {
    let mut r = ByteReader::new(bytes);

    let magic = r.read_u32()?;
    if magic != MAGIC {
        return Err(CodecError::BadMagic { got: magic, expected: MAGIC });
    }
    let version = r.read_u32()?;
    if version != SNAPSHOT_VERSION {
        return Err(CodecError::VersionMismatch { got: version, expected: SNAPSHOT_VERSION });
    }

    let mut stats = BatteryStats::new(clock);
    stats.start_count = r.read_u32()?;
    stats.battery_uptime = r.read_u64()?;
    stats.battery_last_uptime = r.read_u64()?;
    stats.battery_realtime = r.read_u64()?;
    stats.battery_last_realtime = r.read_u64()?;

    let id = stats.screen_on_timer;
    read_stopwatch_into(&mut r, &mut stats, id)?;
    for i in 0..stats.screen_brightness_timers.len() {
        let id = stats.screen_brightness_timers[i];
        read_stopwatch_into(&mut r, &mut stats, id)?;
    }
    *stats.arena.counter_mut(stats.input_event_counter) = Counter::read_full(&mut r)?;
    let id = stats.phone_on_timer;
    read_stopwatch_into(&mut r, &mut stats, id)?;
    for i in 0..stats.signal_strength_timers.len() {
        let id = stats.signal_strength_timers[i];
        read_stopwatch_into(&mut r, &mut stats, id)?;
    }
    let id = stats.signal_scanning_timer;
    read_stopwatch_into(&mut r, &mut stats, id)?;
    for i in 0..stats.data_connection_timers.len() {
        let id = stats.data_connection_timers[i];
        read_stopwatch_into(&mut r, &mut stats, id)?;
    }
    let id = stats.wifi_on_timer;
    read_stopwatch_into(&mut r, &mut stats, id)?;
    let id = stats.wifi_running_timer;
    read_stopwatch_into(&mut r, &mut stats, id)?;
    let id = stats.bluetooth_on_timer;
    read_stopwatch_into(&mut r, &mut stats, id)?;
    let id = stats.audio_on_timer;
    read_stopwatch_into(&mut r, &mut stats, id)?;
    let id = stats.video_on_timer;
    read_stopwatch_into(&mut r, &mut stats, id)?;

    stats.uptime = r.read_u64()?;
    stats.uptime_start = r.read_u64()?;
    stats.last_uptime = r.read_u64()?;
    stats.realtime = r.read_u64()?;
    stats.realtime_start = r.read_u64()?;
    stats.last_realtime = r.read_u64()?;
    stats.on_battery = r.read_bool()?;
    // This process was not the one accruing: the base stays frozen until
    // the next real power transition.
    stats.on_battery_internal = false;
    stats.track_battery_past_uptime = r.read_u64()?;
    stats.track_battery_uptime_start = r.read_u64()?;
    stats.track_battery_past_realtime = r.read_u64()?;
    stats.track_battery_realtime_start = r.read_u64()?;
    stats.unplugged_battery_uptime = r.read_u64()?;
    stats.unplugged_battery_realtime = r.read_u64()?;
    stats.discharge_start_level = r.read_i32()?;
    stats.discharge_current_level = r.read_i32()?;
    stats.last_write_time_ms = r.read_u64()?;

    stats.mobile_rx = ByteTracker { last: r.read_u64()?, ..ByteTracker::default() };
    stats.mobile_tx = ByteTracker { last: r.read_u64()?, ..ByteTracker::default() };
    stats.total_rx = ByteTracker { last: r.read_u64()?, ..ByteTracker::default() };
    stats.total_tx = ByteTracker { last: r.read_u64()?, ..ByteTracker::default() };
    stats.radio_data_uptime = r.read_u64()?;
    stats.radio_data_start = None;

    let kernel_count = r.read_u32()?;
    for _ in 0..kernel_count {
        let name = r.read_string()?;
        let timer = read_sampling(&mut r, stats.on_battery)?;
        let id = stats.arena.insert_sampling(timer);
        stats.unpluggables.push(Unpluggable::Sampling(id));
        stats.kernel_wakelocks.insert(name, id);
    }

    stats.cpu_speed_steps = r.read_u32()? as usize;

    let uid_count = r.read_u32()?;
    for _ in 0..uid_count {
        let uid = r.read_u32()?;
        stats.uid_mut_or_create(uid);

        let wakelock_count = r.read_u32()?;
        for _ in 0..wakelock_count {
            let name = r.read_string()?;
            for class in WakeClass::ALL {
                if r.read_bool()? {
                    let (base, update_time) = read_stopwatch_parts(&mut r)?;
                    let pool = stats.wake_pool(class);
                    let id = {
                        let BatteryStats { uid_stats, arena, unpluggables, .. } = &mut stats;
                        let u = uid_stats.get_mut(&uid).expect("uid created above");
                        u.wakelock_timer(&name, class, pool, arena, unpluggables)
                    };
                    let t = stats.arena.stopwatch_mut(id);
                    t.acquire_time = base.total_time;
                    t.base = base;
                    t.update_time = update_time;
                }
            }
        }

        let sensor_count = r.read_u32()?;
        for _ in 0..sensor_count {
            let handle = r.read_i32()?;
            if r.read_bool()? {
                let (base, update_time) = read_stopwatch_parts(&mut r)?;
                let pool = {
                    let BatteryStats { sensor_pools, arena, .. } = &mut stats;
                    *sensor_pools.entry(handle).or_insert_with(|| arena.create_pool())
                };
                let id = {
                    let BatteryStats { uid_stats, arena, unpluggables, .. } = &mut stats;
                    let u = uid_stats.get_mut(&uid).expect("uid created above");
                    u.sensor_timer(handle, pool, arena, unpluggables)
                };
                let t = stats.arena.stopwatch_mut(id);
                t.acquire_time = base.total_time;
                t.base = base;
                t.update_time = update_time;
            }
        }

        let proc_count = r.read_u32()?;
        for _ in 0..proc_count {
            let name = r.read_string()?;
            let user_time = r.read_u64()?;
            let system_time = r.read_u64()?;
            let foreground_time = r.read_u64()?;
            let starts = r.read_u32()?;
            let loaded_user_time = r.read_u64()?;
            let loaded_system_time = r.read_u64()?;
            let loaded_foreground_time = r.read_u64()?;
            let loaded_starts = r.read_u32()?;
            let last_user_time = r.read_u64()?;
            let last_system_time = r.read_u64()?;
            let last_foreground_time = r.read_u64()?;
            let last_starts = r.read_u32()?;
            let unplugged_user_time = r.read_u64()?;
            let unplugged_system_time = r.read_u64()?;
            let unplugged_foreground_time = r.read_u64()?;
            let unplugged_starts = r.read_u32()?;
            let bin_count = r.read_u32()?;
            let mut bins = Vec::with_capacity(bin_count as usize);
            for _ in 0..bin_count {
                let counter = Counter::read_full(&mut r)?;
                let id = new_registered_counter(&mut stats.arena, &mut stats.unpluggables);
                *stats.arena.counter_mut(id) = counter;
                bins.push(id);
            }
            let BatteryStats { uid_stats, arena, unpluggables, .. } = &mut stats;
            let u = uid_stats.get_mut(&uid).expect("uid created above");
            let p = u.proc_mut(&name, 0, arena, unpluggables);
            p.user_time = user_time;
            p.system_time = system_time;
            p.foreground_time = foreground_time;
            p.starts = starts;
            p.loaded_user_time = loaded_user_time;
            p.loaded_system_time = loaded_system_time;
            p.loaded_foreground_time = loaded_foreground_time;
            p.loaded_starts = loaded_starts;
            p.last_user_time = last_user_time;
            p.last_system_time = last_system_time;
            p.last_foreground_time = last_foreground_time;
            p.last_starts = last_starts;
            p.unplugged_user_time = unplugged_user_time;
            p.unplugged_system_time = unplugged_system_time;
            p.unplugged_foreground_time = unplugged_foreground_time;
            p.unplugged_starts = unplugged_starts;
            p.speed_bins = bins;
        }

        let pkg_count = r.read_u32()?;
        for _ in 0..pkg_count {
            let name = r.read_string()?;
            let wakeups = r.read_u32()?;
            let loaded_wakeups = r.read_u32()?;
            let last_wakeups = r.read_u32()?;
            let unplugged_wakeups = r.read_u32()?;
            {
                let BatteryStats { uid_stats, unpluggables, .. } = &mut stats;
                let u = uid_stats.get_mut(&uid).expect("uid created above");
                let p = u.pkg_mut(&name, unpluggables);
                p.wakeups = wakeups;
                p.loaded_wakeups = loaded_wakeups;
                p.last_wakeups = last_wakeups;
                p.unplugged_wakeups = unplugged_wakeups;
            }
            let serv_count = r.read_u32()?;
            for _ in 0..serv_count {
                let sname = r.read_string()?;
                let start_time = r.read_u64()?;
                let running_since = r.read_u64()?;
                let running = r.read_bool()?;
                let starts = r.read_u32()?;
                let launched_time = r.read_u64()?;
                let launched_since = r.read_u64()?;
                let launched = r.read_bool()?;
                let launches = r.read_u32()?;
                let loaded_start_time = r.read_u64()?;
                let loaded_starts = r.read_u32()?;
                let loaded_launches = r.read_u32()?;
                let last_start_time = r.read_u64()?;
                let last_starts = r.read_u32()?;
                let last_launches = r.read_u32()?;
                let unplugged_start_time = r.read_u64()?;
                let unplugged_starts = r.read_u32()?;
                let unplugged_launches = r.read_u32()?;
                let BatteryStats { uid_stats, unpluggables, .. } = &mut stats;
                let u = uid_stats.get_mut(&uid).expect("uid created above");
                let s = u.serv_mut(&name, &sname, unpluggables);
                s.start_time = start_time;
                s.running_since = running_since;
                s.running = running;
                s.starts = starts;
                s.launched_time = launched_time;
                s.launched_since = launched_since;
                s.launched = launched;
                s.launches = launches;
                s.loaded_start_time = loaded_start_time;
                s.loaded_starts = loaded_starts;
                s.loaded_launches = loaded_launches;
                s.last_start_time = last_start_time;
                s.last_starts = last_starts;
                s.last_launches = last_launches;
                s.unplugged_start_time = unplugged_start_time;
                s.unplugged_starts = unplugged_starts;
                s.unplugged_launches = unplugged_launches;
            }
        }

        let loaded_tcp_rx = r.read_u64()?;
        let loaded_tcp_tx = r.read_u64()?;
        let current_tcp_rx = r.read_u64()?;
        let current_tcp_tx = r.read_u64()?;
        let tcp_rx_at_unplug = r.read_u64()?;
        let tcp_tx_at_unplug = r.read_u64()?;
        let timer_ids = {
            let u = stats.uid_stats.get_mut(&uid).expect("uid created above");
            u.loaded_tcp_rx = loaded_tcp_rx;
            u.loaded_tcp_tx = loaded_tcp_tx;
            u.current_tcp_rx = current_tcp_rx;
            u.current_tcp_tx = current_tcp_tx;
            u.tcp_rx_at_unplug = tcp_rx_at_unplug;
            u.tcp_tx_at_unplug = tcp_tx_at_unplug;
            u.started_tcp_rx = None;
            u.started_tcp_tx = None;
            [
                u.wifi_on_timer,
                u.full_wifi_lock_timer,
                u.audio_timer,
                u.video_timer,
                u.scan_wifi_lock_timer,
                u.wifi_multicast_timer,
            ]
        };
        for id in timer_ids {
            read_stopwatch_into(&mut r, &mut stats, id)?;
        }

        if r.read_bool()? {
            let ids = {
                let BatteryStats { uid_stats, arena, unpluggables, .. } = &mut stats;
                let u = uid_stats.get_mut(&uid).expect("uid created above");
                *u.user_activity_counters(arena, unpluggables)
            };
            for id in ids {
                *stats.arena.counter_mut(id) = Counter::read_full(&mut r)?;
            }
        }
    }

    r.finish()?;
    Ok(stats)
}
