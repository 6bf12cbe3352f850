//! Lossy summary codec, the cross-boot persisted format.
//!
//! Only `(value, value - loaded)` pairs are stored for counters and
//! timers (no pool, nesting or acquire state), so a reload cannot resume
//! mid-accumulation, but it carries the cumulative history across boots.
//! On reload each pair maps to (`loaded`, `last`): what was "since load"
//! in the previous run becomes the previous-run view of this one.
//!
//! Timer times are stored as rounded milliseconds; everything in memory
//! stays microseconds. The format is gated by its own version tag; any
//! mismatch discards the entire persisted history.

use crate::arena::StopwatchId;
use crate::codec::{ByteReader, ByteWriter};
use crate::engine::{BatteryStats, Unpluggable};
use crate::error::CodecError;
use crate::types::{StatsKind, WakeClass};

/// Bumped whenever the field walk changes shape.
pub const SUMMARY_VERSION: u32 = 12;

fn write_stopwatch_summary(w: &mut ByteWriter, stats: &BatteryStats, id: StopwatchId, br: u64) {
    let run_time = stats.arena.stopwatch_run_time(id, br);
    stats.arena.stopwatch(id).base.write_summary(w, run_time);
}

fn read_stopwatch_summary(
    r: &mut ByteReader<'_>,
    stats: &mut BatteryStats,
    id: StopwatchId,
) -> Result<(), CodecError> {
    let t = stats.arena.stopwatch_mut(id);
    t.base.read_summary(r)?;
    t.nesting = 0;
    t.acquire_time = t.base.total_time;
    Ok(())
}

pub(crate) fn encode(stats: &BatteryStats) -> Vec<u8> {
    let bu = stats.battery_uptime_now();
    let br = stats.battery_realtime_now();
    let mut w = ByteWriter::new();

    w.write_u32(SUMMARY_VERSION);
    w.write_u32(stats.start_count);
    w.write_u64(stats.compute_battery_uptime(StatsKind::Total));
    w.write_u64(stats.compute_battery_uptime(StatsKind::Current));
    w.write_u64(stats.compute_battery_realtime(StatsKind::Total));
    w.write_u64(stats.compute_battery_realtime(StatsKind::Current));
    w.write_u64(stats.compute_uptime(StatsKind::Total));
    w.write_u64(stats.compute_uptime(StatsKind::Current));
    w.write_u64(stats.compute_realtime(StatsKind::Total));
    w.write_u64(stats.compute_realtime(StatsKind::Current));
    w.write_i32(stats.discharge_start_level);
    w.write_i32(stats.discharge_current_level);

    write_stopwatch_summary(&mut w, stats, stats.screen_on_timer, br);
    for id in stats.screen_brightness_timers {
        write_stopwatch_summary(&mut w, stats, id, br);
    }
    stats.arena.counter(stats.input_event_counter).write_summary(&mut w);
    write_stopwatch_summary(&mut w, stats, stats.phone_on_timer, br);
    for id in stats.signal_strength_timers {
        write_stopwatch_summary(&mut w, stats, id, br);
    }
    write_stopwatch_summary(&mut w, stats, stats.signal_scanning_timer, br);
    for id in stats.data_connection_timers {
        write_stopwatch_summary(&mut w, stats, id, br);
    }
    write_stopwatch_summary(&mut w, stats, stats.wifi_on_timer, br);
    write_stopwatch_summary(&mut w, stats, stats.wifi_running_timer, br);
    write_stopwatch_summary(&mut w, stats, stats.bluetooth_on_timer, br);
    write_stopwatch_summary(&mut w, stats, stats.audio_on_timer, br);
    write_stopwatch_summary(&mut w, stats, stats.video_on_timer, br);

    w.write_u32(stats.kernel_wakelocks.len() as u32);
    for (name, id) in stats.kernel_wakelocks.iter() {
        let t = stats.arena.sampling(*id);
        w.write_str(name);
        t.base.write_summary(&mut w, t.compute_run_time());
        w.write_u64(t.current_reported_total_time);
        w.write_u32(t.current_reported_count);
        w.write_bool(t.tracking_reported_values);
    }

    w.write_u32(stats.cpu_speed_steps as u32);

    w.write_u32(stats.uid_stats.len() as u32);
    for (uid, u) in stats.uid_stats.iter() {
        w.write_u32(*uid);

        write_stopwatch_summary(&mut w, stats, u.wifi_on_timer, br);
        write_stopwatch_summary(&mut w, stats, u.full_wifi_lock_timer, br);
        write_stopwatch_summary(&mut w, stats, u.audio_timer, br);
        write_stopwatch_summary(&mut w, stats, u.video_timer, br);
        write_stopwatch_summary(&mut w, stats, u.scan_wifi_lock_timer, br);
        write_stopwatch_summary(&mut w, stats, u.wifi_multicast_timer, br);

        match &u.user_activity {
            None => w.write_bool(false),
            Some(ids) => {
                w.write_bool(true);
                for id in ids {
                    stats.arena.counter(*id).write_summary(&mut w);
                }
            }
        }

        w.write_u32(u.wakelocks.len() as u32);
        for (name, wl) in u.wakelocks.iter() {
            w.write_str(name);
            for class in WakeClass::ALL {
                match wl.timer(class) {
                    None => w.write_bool(false),
                    Some(id) => {
                        w.write_bool(true);
                        write_stopwatch_summary(&mut w, stats, id, br);
                    }
                }
            }
        }

        w.write_u32(u.sensors.len() as u32);
        for (handle, sensor) in u.sensors.iter() {
            w.write_i32(*handle);
            match sensor.timer {
                None => w.write_bool(false),
                Some(id) => {
                    w.write_bool(true);
                    write_stopwatch_summary(&mut w, stats, id, br);
                }
            }
        }

        w.write_u32(u.procs.len() as u32);
        for (name, p) in u.procs.iter() {
            w.write_str(name);
            w.write_u64(p.user_time);
            w.write_u64(p.user_time - p.loaded_user_time);
            w.write_u64(p.system_time);
            w.write_u64(p.system_time - p.loaded_system_time);
            w.write_u32(p.starts);
            w.write_u32(p.starts - p.loaded_starts);
        }

        w.write_u32(u.pkgs.len() as u32);
        for (name, p) in u.pkgs.iter() {
            w.write_str(name);
            w.write_u32(p.wakeups);
            w.write_u32(p.wakeups - p.loaded_wakeups);
            w.write_u32(p.servs.len() as u32);
            for (sname, s) in p.servs.iter() {
                let time = s.start_time_to_now(bu);
                w.write_str(sname);
                w.write_u64(time);
                w.write_u64(time - s.loaded_start_time);
                w.write_u32(s.starts);
                w.write_u32(s.starts - s.loaded_starts);
                w.write_u32(s.launches);
                w.write_u32(s.launches - s.loaded_launches);
            }
        }

        w.write_u64(u.tcp_bytes_received(stats.net_source(), StatsKind::Total));
        w.write_u64(u.tcp_bytes_sent(stats.net_source(), StatsKind::Total));
    }

    w.into_bytes()
}

/// Decode into a freshly reset engine. The caller guarantees the reset and
/// re-resets on error, so a failed decode can never leave partial state.
pub(crate) fn decode(stats: &mut BatteryStats, bytes: &[u8]) -> Result<(), CodecError> {
    let mut r = ByteReader::new(bytes);

    let version = r.read_u32()?;
    if version != SUMMARY_VERSION {
        return Err(CodecError::VersionMismatch { got: version, expected: SUMMARY_VERSION });
    }

    stats.start_count = r.read_u32()?;
    stats.battery_uptime = r.read_u64()?;
    stats.battery_last_uptime = r.read_u64()?;
    stats.battery_realtime = r.read_u64()?;
    stats.battery_last_realtime = r.read_u64()?;
    stats.uptime = r.read_u64()?;
    stats.last_uptime = r.read_u64()?;
    stats.realtime = r.read_u64()?;
    stats.last_realtime = r.read_u64()?;
    stats.discharge_start_level = r.read_i32()?;
    stats.discharge_current_level = r.read_i32()?;
    stats.start_count += 1;

    read_stopwatch_summary(&mut r, stats, stats.screen_on_timer)?;
    for i in 0..stats.screen_brightness_timers.len() {
        read_stopwatch_summary(&mut r, stats, stats.screen_brightness_timers[i])?;
    }
    stats.arena.counter_mut(stats.input_event_counter).read_summary(&mut r)?;
    read_stopwatch_summary(&mut r, stats, stats.phone_on_timer)?;
    for i in 0..stats.signal_strength_timers.len() {
        read_stopwatch_summary(&mut r, stats, stats.signal_strength_timers[i])?;
    }
    read_stopwatch_summary(&mut r, stats, stats.signal_scanning_timer)?;
    for i in 0..stats.data_connection_timers.len() {
        read_stopwatch_summary(&mut r, stats, stats.data_connection_timers[i])?;
    }
    read_stopwatch_summary(&mut r, stats, stats.wifi_on_timer)?;
    read_stopwatch_summary(&mut r, stats, stats.wifi_running_timer)?;
    read_stopwatch_summary(&mut r, stats, stats.bluetooth_on_timer)?;
    read_stopwatch_summary(&mut r, stats, stats.audio_on_timer)?;
    read_stopwatch_summary(&mut r, stats, stats.video_on_timer)?;

    let kernel_count = r.read_u32()?;
    for _ in 0..kernel_count {
        let name = r.read_string()?;
        let id = {
            let BatteryStats { arena, unpluggables, kernel_wakelocks, .. } = stats;
            *kernel_wakelocks.entry(name).or_insert_with(|| {
                let id = arena.alloc_sampling(false, true);
                unpluggables.push(Unpluggable::Sampling(id));
                id
            })
        };
        let t = stats.arena.sampling_mut(id);
        t.base.read_summary(&mut r)?;
        let reported_total = r.read_u64()?;
        t.current_reported_total_time = reported_total;
        t.unplugged_reported_total_time = reported_total;
        let reported_count = r.read_u32()?;
        t.current_reported_count = reported_count;
        t.unplugged_reported_count = reported_count;
        t.tracking_reported_values = r.read_bool()?;
    }

    stats.cpu_speed_steps = r.read_u32()? as usize;

    let uid_count = r.read_u32()?;
    for _ in 0..uid_count {
        let uid = r.read_u32()?;
        let timer_ids = {
            let u = stats.uid_mut_or_create(uid);
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
            read_stopwatch_summary(&mut r, stats, id)?;
        }

        if r.read_bool()? {
            let ids = {
                let BatteryStats { uid_stats, arena, unpluggables, .. } = stats;
                let u = uid_stats.get_mut(&uid).expect("uid created above");
                *u.user_activity_counters(arena, unpluggables)
            };
            for id in ids {
                stats.arena.counter_mut(id).read_summary(&mut r)?;
            }
        }

        let wakelock_count = r.read_u32()?;
        for _ in 0..wakelock_count {
            let name = r.read_string()?;
            for class in WakeClass::ALL {
                if r.read_bool()? {
                    let pool = stats.wake_pool(class);
                    let id = {
                        let BatteryStats { uid_stats, arena, unpluggables, .. } = stats;
                        let u = uid_stats.get_mut(&uid).expect("uid created above");
                        u.wakelock_timer(&name, class, pool, arena, unpluggables)
                    };
                    read_stopwatch_summary(&mut r, stats, id)?;
                }
            }
        }

        let sensor_count = r.read_u32()?;
        for _ in 0..sensor_count {
            let handle = r.read_i32()?;
            if r.read_bool()? {
                let pool = {
                    let BatteryStats { sensor_pools, arena, .. } = stats;
                    *sensor_pools.entry(handle).or_insert_with(|| arena.create_pool())
                };
                let id = {
                    let BatteryStats { uid_stats, arena, unpluggables, .. } = stats;
                    let u = uid_stats.get_mut(&uid).expect("uid created above");
                    u.sensor_timer(handle, pool, arena, unpluggables)
                };
                read_stopwatch_summary(&mut r, stats, id)?;
            }
        }

        let proc_count = r.read_u32()?;
        for _ in 0..proc_count {
            let name = r.read_string()?;
            let user_time = r.read_u64()?;
            let last_user_time = r.read_u64()?;
            let system_time = r.read_u64()?;
            let last_system_time = r.read_u64()?;
            let starts = r.read_u32()?;
            let last_starts = r.read_u32()?;
            let steps = stats.cpu_speed_steps;
            let BatteryStats { uid_stats, arena, unpluggables, .. } = stats;
            let u = uid_stats.get_mut(&uid).expect("uid created above");
            let p = u.proc_mut(&name, steps, arena, unpluggables);
            p.user_time = user_time;
            p.loaded_user_time = user_time;
            p.last_user_time = last_user_time;
            p.system_time = system_time;
            p.loaded_system_time = system_time;
            p.last_system_time = last_system_time;
            p.starts = starts;
            p.loaded_starts = starts;
            p.last_starts = last_starts;
        }

        let pkg_count = r.read_u32()?;
        for _ in 0..pkg_count {
            let name = r.read_string()?;
            let wakeups = r.read_u32()?;
            let last_wakeups = r.read_u32()?;
            {
                let BatteryStats { uid_stats, unpluggables, .. } = stats;
                let u = uid_stats.get_mut(&uid).expect("uid created above");
                let p = u.pkg_mut(&name, unpluggables);
                p.wakeups = wakeups;
                p.loaded_wakeups = wakeups;
                p.last_wakeups = last_wakeups;
            }
            let serv_count = r.read_u32()?;
            for _ in 0..serv_count {
                let sname = r.read_string()?;
                let start_time = r.read_u64()?;
                let last_start_time = r.read_u64()?;
                let starts = r.read_u32()?;
                let last_starts = r.read_u32()?;
                let launches = r.read_u32()?;
                let last_launches = r.read_u32()?;
                let BatteryStats { uid_stats, unpluggables, .. } = stats;
                let u = uid_stats.get_mut(&uid).expect("uid created above");
                let s = u.serv_mut(&name, &sname, unpluggables);
                s.start_time = start_time;
                s.loaded_start_time = start_time;
                s.last_start_time = last_start_time;
                s.starts = starts;
                s.loaded_starts = starts;
                s.last_starts = last_starts;
                s.launches = launches;
                s.loaded_launches = launches;
                s.last_launches = last_launches;
            }
        }

        let loaded_tcp_rx = r.read_u64()?;
        let loaded_tcp_tx = r.read_u64()?;
        let u = stats.uid_stats.get_mut(&uid).expect("uid created above");
        u.loaded_tcp_rx = loaded_tcp_rx;
        u.loaded_tcp_tx = loaded_tcp_tx;
    }

    r.finish()
}
