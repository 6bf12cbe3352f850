//! Battery-epoch lifecycle: plug/unplug transitions, the frozen-while-
//! plugged time base, kernel wakelock ingestion, and uid removal.

use coulomb_core::{BatteryStats, ManualClock, StatsKind, WakeClass};

fn engine(clock: &ManualClock) -> BatteryStats {
    BatteryStats::new(Box::new(clock.clone()))
}

#[test]
fn battery_realtime_is_frozen_while_plugged() {
    let clock = ManualClock::new();
    let mut stats = engine(&clock);

    // Plugged in: the screen is on but nothing accrues.
    stats.note_screen_on();
    clock.advance_us(5_000);
    assert_eq!(stats.screen_on_time(StatsKind::Total), 0);

    stats.set_on_battery(true, 80);
    clock.advance_us(3_000);
    assert_eq!(stats.screen_on_time(StatsKind::Total), 3_000);

    stats.set_on_battery(false, 78);
    clock.advance_us(10_000);
    assert_eq!(stats.screen_on_time(StatsKind::Total), 3_000);

    // A second discharge resumes exactly where the first left off.
    stats.set_on_battery(true, 78);
    clock.advance_us(2_000);
    assert_eq!(stats.screen_on_time(StatsKind::Total), 5_000);
    assert_eq!(stats.screen_on_time(StatsKind::Unplugged), 2_000);
}

#[test]
fn unplug_plug_round_trip_is_neutral() {
    let clock = ManualClock::new();
    let mut stats = engine(&clock);

    stats.set_on_battery(true, 90);
    stats.note_screen_on();
    clock.advance_us(5_000);
    stats.note_screen_off();

    stats.set_on_battery(false, 88);
    stats.set_on_battery(true, 88);
    assert_eq!(stats.screen_on_time(StatsKind::Unplugged), 0);
    assert_eq!(stats.screen_on_time(StatsKind::Total), 5_000);
}

#[test]
fn unplugged_view_rebases_at_each_unplug() {
    let clock = ManualClock::new();
    let mut stats = engine(&clock);

    stats.set_on_battery(true, 90);
    stats.note_screen_on();
    clock.advance_us(4_000);
    stats.set_on_battery(false, 85);
    clock.advance_us(1_000);
    stats.set_on_battery(true, 85);
    clock.advance_us(1_500);

    assert_eq!(stats.screen_on_time(StatsKind::Total), 5_500);
    assert_eq!(stats.screen_on_time(StatsKind::Unplugged), 1_500);
    assert_eq!(stats.compute_battery_realtime(StatsKind::Unplugged), 1_500);
}

#[test]
fn discharge_levels_track_transitions() {
    let clock = ManualClock::new();
    let mut stats = engine(&clock);

    stats.set_on_battery(true, 95);
    assert_eq!(stats.discharge_start_level(), 95);
    assert_eq!(stats.discharge_current_level(), 95);

    stats.record_current_level(81);
    assert_eq!(stats.discharge_current_level(), 81);

    stats.set_on_battery(false, 80);
    assert_eq!(stats.discharge_start_level(), 95);
    assert_eq!(stats.discharge_current_level(), 80);

    stats.set_on_battery(true, 77);
    assert_eq!(stats.discharge_start_level(), 77);
}

#[test]
fn battery_uptime_excludes_sleep() {
    let clock = ManualClock::new();
    let mut stats = engine(&clock);

    stats.set_on_battery(true, 90);
    clock.advance_us(2_000);
    clock.sleep_us(8_000);
    assert_eq!(stats.compute_battery_uptime(StatsKind::Current), 2_000);
    assert_eq!(stats.compute_battery_realtime(StatsKind::Current), 10_000);
}

#[test]
fn service_time_accrues_in_battery_uptime() {
    let clock = ManualClock::new();
    let mut stats = engine(&clock);

    stats.set_on_battery(true, 90);
    stats.note_service_started(1000, "com.example.mail", "SyncService");
    clock.advance_us(3_000);
    clock.sleep_us(5_000); // asleep: started time must not grow
    clock.advance_us(1_000);
    stats.note_service_stopped(1000, "com.example.mail", "SyncService");

    let bu = stats.battery_uptime_now();
    let s = &stats.uid(1000).unwrap().pkgs()["com.example.mail"].servs()["SyncService"];
    assert_eq!(s.start_time(bu, StatsKind::Total), 4_000);
    assert_eq!(s.starts(StatsKind::Total), 1);
}

#[test]
fn kernel_ingestion_baselines_then_tracks_deltas() {
    let clock = ManualClock::new();
    let mut stats = engine(&clock);
    stats.set_on_battery(true, 90);

    stats.ingest_kernel_wakelocks(
        "name\tcount\tec\twc\tas\ttotal\nalarm\t10\t0\t0\t0\t4000000\n",
    );
    // The first report after an unplug is the baseline, not usage.
    assert_eq!(stats.kernel_wakelock_time("alarm", StatsKind::Total), Some(0));

    stats.ingest_kernel_wakelocks(
        "name\tcount\tec\twc\tas\ttotal\nalarm\t16\t0\t0\t0\t9000000\n",
    );
    assert_eq!(stats.kernel_wakelock_time("alarm", StatsKind::Total), Some(5_000));
    assert_eq!(stats.kernel_wakelock_count("alarm", StatsKind::Total), Some(6));
}

#[test]
fn missing_kernel_name_goes_stale_without_losing_history() {
    let clock = ManualClock::new();
    let mut stats = engine(&clock);
    stats.set_on_battery(true, 90);

    let header = "name\tcount\tec\twc\tas\ttotal\n";
    stats.ingest_kernel_wakelocks(&format!("{header}alarm\t10\t0\t0\t0\t1000000\n"));
    stats.ingest_kernel_wakelocks(&format!("{header}alarm\t12\t0\t0\t0\t3000000\n"));
    assert_eq!(stats.kernel_wakelock_time("alarm", StatsKind::Total), Some(2_000));

    // The name disappears this cycle: frozen, not deleted.
    stats.ingest_kernel_wakelocks(&format!("{header}other\t1\t0\t0\t0\t500000\n"));
    assert_eq!(stats.kernel_wakelock_time("alarm", StatsKind::Total), Some(0));
    assert!(stats.kernel_wakelock_time("other", StatsKind::Total).is_some());
}

#[test]
fn duplicate_names_in_one_read_accumulate() {
    let clock = ManualClock::new();
    let mut stats = engine(&clock);
    stats.set_on_battery(true, 90);

    let header = "name\tcount\tec\twc\tas\ttotal\n";
    stats.ingest_kernel_wakelocks(&format!(
        "{header}irq\t3\t0\t0\t0\t1000000\nirq\t2\t0\t0\t0\t2000000\n"
    ));
    stats.ingest_kernel_wakelocks(&format!("{header}irq\t10\t0\t0\t0\t4000000\n"));
    // Baseline was 3ms from the merged first read.
    assert_eq!(stats.kernel_wakelock_time("irq", StatsKind::Total), Some(1_000));
}

#[test]
fn wifi_attribution_hands_off_between_uids() {
    let clock = ManualClock::new();
    let mut stats = engine(&clock);
    stats.set_on_battery(true, 90);

    stats.note_wifi_on(1000);
    clock.advance_us(100);
    stats.note_wifi_on(1001); // ownership moves
    clock.advance_us(300);
    stats.note_wifi_off();

    let t1 = stats.timer_time(stats.uid(1000).unwrap().wifi_on_timer_id(), StatsKind::Total);
    let t2 = stats.timer_time(stats.uid(1001).unwrap().wifi_on_timer_id(), StatsKind::Total);
    assert_eq!(t1, 100);
    assert_eq!(t2, 300);
    assert_eq!(stats.wifi_on_time(StatsKind::Total), 400);
}

#[test]
fn removed_uid_is_forgotten_and_leaves_pools_consistent() {
    let clock = ManualClock::new();
    let mut stats = engine(&clock);
    stats.set_on_battery(true, 90);

    stats.note_start_wakelock(1000, "wl", WakeClass::Partial);
    stats.note_start_wakelock(1001, "wl", WakeClass::Partial);
    clock.advance_us(100);
    stats.remove_uid(1000);
    clock.advance_us(100);
    stats.note_stop_wakelock(1001, "wl", WakeClass::Partial);

    assert!(stats.uid(1000).is_none());
    // Once the dead holder is evicted the survivor accrues alone.
    let id = stats
        .uid(1001)
        .unwrap()
        .wakelocks()
        .get("wl")
        .unwrap()
        .timer(WakeClass::Partial)
        .unwrap();
    let t = stats.timer_time(id, StatsKind::Total);
    assert_eq!(t, 150);
}

#[test]
fn scanning_timeout_caps_runaway_accrual() {
    let clock = ManualClock::new();
    let mut stats = engine(&clock);
    stats.set_on_battery(true, 90);
    stats.set_radio_scanning_timeout(Some(1_000));

    // Out of service: the scanning timer starts and nobody stops it.
    stats.note_phone_state(coulomb_core::bins::PhoneServiceState::OutOfService);
    clock.advance_us(5_000);
    assert_eq!(stats.signal_scanning_time(StatsKind::Total), 1_000);
}

#[test]
fn data_connection_time_follows_bin_switches() {
    use coulomb_core::bins::{DataBin, RadioTech};

    let clock = ManualClock::new();
    let mut stats = engine(&clock);
    stats.set_on_battery(true, 90);

    stats.note_data_connection(RadioTech::Umts, true);
    clock.advance_us(400);
    stats.note_data_connection(RadioTech::Edge, true);
    clock.advance_us(100);
    stats.note_data_connection(RadioTech::Edge, false);
    clock.advance_us(250);

    assert_eq!(stats.data_connection_time(DataBin::Umts, StatsKind::Total), 400);
    assert_eq!(stats.data_connection_time(DataBin::Edge, StatsKind::Total), 100);
    assert_eq!(stats.data_connection_time(DataBin::None, StatsKind::Total), 250);
    assert_eq!(stats.data_connection_count(DataBin::Umts, StatsKind::Total), 1);
}

#[test]
fn user_activity_counters_are_lazily_created_and_binned() {
    let clock = ManualClock::new();
    let mut stats = engine(&clock);

    stats.note_user_activity(1000, 1); // button
    stats.note_user_activity(1000, 2); // touch
    stats.note_user_activity(1000, 99); // clamps to touch

    let u = stats.uid(1000).unwrap();
    let ids = u.user_activity_ids().unwrap();
    assert_eq!(stats.counter_count(ids[0], StatsKind::Total), 0);
    assert_eq!(stats.counter_count(ids[1], StatsKind::Total), 1);
    assert_eq!(stats.counter_count(ids[2], StatsKind::Total), 2);
}
