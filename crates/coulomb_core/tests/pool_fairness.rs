//! Fairness properties of pooled timers, driven through the engine's
//! wakelock and sensor surface the way real event sources drive it.

use coulomb_core::{BatteryStats, ManualClock, StatsKind, WakeClass};

fn on_battery_engine(clock: &ManualClock) -> BatteryStats {
    let mut stats = BatteryStats::new(Box::new(clock.clone()));
    stats.set_on_battery(true, 90);
    stats
}

fn wakelock_time(
    stats: &BatteryStats,
    uid: u32,
    name: &str,
    class: WakeClass,
    kind: StatsKind,
) -> u64 {
    let id = stats
        .uid(uid)
        .unwrap()
        .wakelocks()
        .get(name)
        .unwrap()
        .timer(class)
        .unwrap();
    stats.timer_time(id, kind)
}

fn wakelock_count(stats: &BatteryStats, uid: u32, name: &str, class: WakeClass) -> u32 {
    let id = stats
        .uid(uid)
        .unwrap()
        .wakelocks()
        .get(name)
        .unwrap()
        .timer(class)
        .unwrap();
    stats.timer_count(id, StatsKind::Total)
}

#[test]
fn n_way_equal_split_sums_to_wall_clock() {
    let clock = ManualClock::new();
    let mut stats = on_battery_engine(&clock);

    for uid in [1000, 1001, 1002] {
        stats.note_start_wakelock(uid, "sync", WakeClass::Partial);
    }
    clock.advance_us(900_000);
    for uid in [1000, 1001, 1002] {
        stats.note_stop_wakelock(uid, "sync", WakeClass::Partial);
    }

    let mut sum = 0;
    for uid in [1000, 1001, 1002] {
        let t = wakelock_time(&stats, uid, "sync", WakeClass::Partial, StatsKind::Total);
        assert_eq!(t, 300_000);
        sum += t;
    }
    assert_eq!(sum, 900_000);
}

#[test]
fn staggered_holders_each_get_twenty() {
    // A holds [0, 30), B holds [10, 40): A gets 10 + 20/2, B gets 20/2 + 10.
    let clock = ManualClock::new();
    let mut stats = on_battery_engine(&clock);

    stats.note_start_wakelock(1, "wl", WakeClass::Partial);
    clock.advance_us(10);
    stats.note_start_wakelock(2, "wl", WakeClass::Partial);
    clock.advance_us(20);
    stats.note_stop_wakelock(1, "wl", WakeClass::Partial);
    clock.advance_us(10);
    stats.note_stop_wakelock(2, "wl", WakeClass::Partial);

    assert_eq!(wakelock_time(&stats, 1, "wl", WakeClass::Partial, StatsKind::Total), 20);
    assert_eq!(wakelock_time(&stats, 2, "wl", WakeClass::Partial, StatsKind::Total), 20);
}

#[test]
fn zero_duration_acquisition_is_discarded() {
    let clock = ManualClock::new();
    let mut stats = on_battery_engine(&clock);

    stats.note_start_wakelock(1, "blip", WakeClass::Partial);
    stats.note_stop_wakelock(1, "blip", WakeClass::Partial);

    assert_eq!(wakelock_count(&stats, 1, "blip", WakeClass::Partial), 0);
    assert_eq!(wakelock_time(&stats, 1, "blip", WakeClass::Partial, StatsKind::Total), 0);

    // A hold with real duration counts normally afterwards.
    stats.note_start_wakelock(1, "blip", WakeClass::Partial);
    clock.advance_us(1_000);
    stats.note_stop_wakelock(1, "blip", WakeClass::Partial);
    assert_eq!(wakelock_count(&stats, 1, "blip", WakeClass::Partial), 1);
}

#[test]
fn different_classes_do_not_share_a_pool() {
    let clock = ManualClock::new();
    let mut stats = on_battery_engine(&clock);

    stats.note_start_wakelock(1, "wl", WakeClass::Partial);
    stats.note_start_wakelock(2, "wl", WakeClass::Full);
    clock.advance_us(100);
    stats.note_stop_wakelock(1, "wl", WakeClass::Partial);
    stats.note_stop_wakelock(2, "wl", WakeClass::Full);

    // No cross-class splitting: each holder gets the full interval.
    assert_eq!(wakelock_time(&stats, 1, "wl", WakeClass::Partial, StatsKind::Total), 100);
    assert_eq!(wakelock_time(&stats, 2, "wl", WakeClass::Full, StatsKind::Total), 100);
}

#[test]
fn same_sensor_handle_shares_a_pool_across_uids() {
    let clock = ManualClock::new();
    let mut stats = on_battery_engine(&clock);

    stats.note_start_sensor(1, 42);
    stats.note_start_sensor(2, 42);
    stats.note_start_sensor(3, 7);
    clock.advance_us(600);
    stats.note_stop_sensor(1, 42);
    stats.note_stop_sensor(2, 42);
    stats.note_stop_sensor(3, 7);

    let t1 = {
        let id = stats.uid(1).unwrap().sensors().get(&42).unwrap().timer().unwrap();
        stats.timer_time(id, StatsKind::Total)
    };
    let t2 = {
        let id = stats.uid(2).unwrap().sensors().get(&42).unwrap().timer().unwrap();
        stats.timer_time(id, StatsKind::Total)
    };
    let t3 = {
        let id = stats.uid(3).unwrap().sensors().get(&7).unwrap().timer().unwrap();
        stats.timer_time(id, StatsKind::Total)
    };
    assert_eq!(t1, 300);
    assert_eq!(t2, 300);
    assert_eq!(t3, 600);
}

#[test]
fn running_pool_reports_live_shares_idempotently() {
    let clock = ManualClock::new();
    let mut stats = on_battery_engine(&clock);

    stats.note_start_wakelock(1, "wl", WakeClass::Partial);
    stats.note_start_wakelock(2, "wl", WakeClass::Partial);
    clock.advance_us(1_000);

    let a = wakelock_time(&stats, 1, "wl", WakeClass::Partial, StatsKind::Total);
    let b = wakelock_time(&stats, 1, "wl", WakeClass::Partial, StatsKind::Total);
    assert_eq!(a, 500);
    // Querying twice without state changes returns the same value.
    assert_eq!(a, b);
}

#[test]
fn stop_without_start_is_ignored() {
    let clock = ManualClock::new();
    let mut stats = on_battery_engine(&clock);

    stats.note_start_wakelock(1, "wl", WakeClass::Partial);
    clock.advance_us(50);
    // uid 2 never started this wakelock; its stop must not disturb uid 1.
    stats.note_stop_wakelock(2, "wl", WakeClass::Partial);
    clock.advance_us(50);
    stats.note_stop_wakelock(1, "wl", WakeClass::Partial);

    assert_eq!(wakelock_time(&stats, 1, "wl", WakeClass::Partial, StatsKind::Total), 100);
}
