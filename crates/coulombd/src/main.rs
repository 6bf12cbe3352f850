//! coulombd - battery usage accounting daemon.
//!
//! Hosts the accounting engine: loads persisted history at start, polls the
//! power supply for plug/unplug transitions, re-reads the kernel wakelock
//! table on a background tick, and persists the summary rate-limited and on
//! shutdown. Event sources (screen, radio, per-app services) reach the
//! engine through the same mutex this loop holds.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use coulomb_core::{
    BatteryStats, KernelWakelockReader, ProcNetReader, StatsStore, SysfsRadioUptime, SystemClock,
};
use coulombd::config::Config;
use coulombd::power::PowerSupplyPoller;
use coulombd::status::StatusSnapshot;

#[derive(Parser, Debug)]
#[command(name = "coulombd", version, about = "Battery usage accounting daemon")]
struct Args {
    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    info!(data_dir = %config.data_dir.display(), "coulombd starting");

    let mut stats = BatteryStats::new(Box::new(SystemClock::new()));
    stats.set_network_source(Box::new(ProcNetReader::new(
        &config.uid_stat_dir,
        &config.net_dev_path,
    )));
    if let Some(radio_path) = &config.radio_awake_path {
        stats.set_radio_source(Box::new(SysfsRadioUptime::new(radio_path)));
    }
    stats.set_kernel_reader(KernelWakelockReader::new(&config.wakelocks_path));
    stats.set_store(StatsStore::new(config.stats_path()));
    stats.load_from_store();
    info!(start_count = stats.start_count(), "statistics loaded");

    let stats = Arc::new(Mutex::new(stats));
    let poller = PowerSupplyPoller::new(&config.power_supply_dir);
    let wakelocks_path = config.wakelocks_path.clone();

    let mut poll_tick = tokio::time::interval(Duration::from_secs(config.poll_interval_secs));
    let mut wakelock_tick =
        tokio::time::interval(Duration::from_secs(config.wakelock_interval_secs));
    let mut write_tick = tokio::time::interval(Duration::from_secs(config.write_interval_secs));

    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    loop {
        tokio::select! {
            _ = poll_tick.tick() => {
                if let Some(state) = poller.poll() {
                    let mut stats = stats.lock().unwrap();
                    stats.set_on_battery(state.on_battery, state.level);
                    if state.on_battery && state.level >= 0 {
                        stats.record_current_level(state.level);
                    }
                }
            }
            _ = wakelock_tick.tick() => {
                // The blocking file read stays off the engine lock; only
                // the merge runs under it.
                let path = wakelocks_path.clone();
                let table = tokio::task::spawn_blocking(move || {
                    KernelWakelockReader::new(path).read_table()
                })
                .await
                .unwrap_or(None);
                if let Some(table) = table {
                    stats.lock().unwrap().ingest_kernel_wakelocks(&table);
                }
            }
            _ = write_tick.tick() => {
                persist(&stats, &config);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, writing final statistics");
                break;
            }
            _ = sigterm.recv() => {
                info!("terminated, writing final statistics");
                break;
            }
        }
    }

    persist(&stats, &config);
    Ok(())
}

fn persist(stats: &Arc<Mutex<BatteryStats>>, config: &Config) {
    let mut stats = stats.lock().unwrap();
    if let Err(err) = stats.persist_to_store() {
        warn!(%err, "failed to persist battery statistics");
    }
    if let Err(err) = StatusSnapshot::new(stats.status()).write(&config.status_path()) {
        warn!(%err, "failed to write status snapshot");
    }
}
