use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};

use drive_score_rs::{
    spawn_monitor, BackgroundStore, DrivingMonitor, FileStore, MonitorConfig, PersistenceGateway,
    SensorEvent, SensorSource, SpeedUnit, SystemClock, TaskSensorHub, UserProfile,
};

#[derive(Parser, Debug)]
#[command(name = "drive_score")]
#[command(about = "Live driving score monitor", long_about = None)]
struct Args {
    /// Trip duration in seconds (0 = until Ctrl-C)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// Monitor config (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Speed limit in display units (overrides config)
    #[arg(long)]
    speed_limit: Option<f64>,

    /// Display units: mph or kmh (overrides config)
    #[arg(long)]
    unit: Option<String>,

    /// Sensor source (auto, termux, simulated)
    #[arg(long, default_value = "auto")]
    source: String,

    /// Persistence directory (overrides config)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Seconds between status snapshots
    #[arg(long, default_value = "5")]
    status_interval: u64,

    /// Driver name stored in the profile
    #[arg(long)]
    driver: Option<String>,
}

fn build_config(args: &Args) -> Result<MonitorConfig> {
    let mut config = match args.config.as_ref() {
        Some(path) => MonitorConfig::load(path)?,
        None => MonitorConfig::default(),
    };
    if let Some(limit) = args.speed_limit {
        config.default_speed_limit = limit;
    }
    if let Some(unit) = args.unit.as_deref() {
        config.speed_unit = match unit {
            "mph" => SpeedUnit::Mph,
            "kmh" => SpeedUnit::Kmh,
            other => anyhow::bail!("Unknown unit '{}', expected mph or kmh", other),
        };
    }
    if let Some(dir) = args.data_dir.as_ref() {
        config.data_dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn parse_source(source: &str) -> Result<SensorSource> {
    match source {
        "auto" => Ok(SensorSource::Auto),
        "termux" => Ok(SensorSource::Termux),
        "simulated" => Ok(SensorSource::Simulated),
        other => anyhow::bail!("Unknown sensor source '{}'", other),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = build_config(&args)?;
    let source = parse_source(&args.source)?;
    let data_dir = config.data_dir.clone();

    println!("[{}] Drive Score RS Starting", ts_now());
    println!("  Duration: {} seconds (0=continuous)", args.duration);
    println!(
        "  Speed Limit: {:.0} {}",
        config.default_speed_limit,
        config.speed_unit.suffix()
    );
    println!("  Sensor Source: {:?}", source);
    println!("  Data Dir: {}", data_dir.display());

    std::fs::create_dir_all(&data_dir)?;
    let store = BackgroundStore::new(FileStore::open(&data_dir)?);

    let (sample_tx, sample_rx) = mpsc::channel::<SensorEvent>(500);
    let hub = TaskSensorHub::new(sample_tx, source);

    let mut monitor = DrivingMonitor::load(
        config,
        Arc::new(SystemClock::new()),
        PersistenceGateway::new(store),
        Box::new(hub),
    );
    if let Some(name) = args.driver.clone() {
        let profile = UserProfile {
            name: Some(name),
            ..monitor.profile().clone()
        };
        monitor.update_profile(profile);
    }
    let (handle, task) = spawn_monitor(monitor, sample_rx);

    handle.start_trip().await?;
    println!("[{}] Trip started", ts_now());

    let status_path = data_dir.join("live_status.json");
    let start = Utc::now();
    let mut ticker = interval(Duration::from_secs(args.status_interval.max(1)));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = handle.snapshot();
                if let Err(e) = snapshot.save(&status_path) {
                    log::warn!("Failed to write {}: {}", status_path.display(), e);
                }
                println!("[{}] {}", ts_now(), snapshot.summary());

                if args.duration > 0 {
                    let elapsed = Utc::now().signed_duration_since(start).num_seconds().max(0) as u64;
                    if elapsed >= args.duration {
                        println!("[{}] Duration reached", ts_now());
                        break;
                    }
                }
            }
            _ = &mut ctrl_c => {
                println!("[{}] Interrupted", ts_now());
                break;
            }
        }
    }

    if let Err(e) = handle.stop_trip().await {
        log::warn!("Stop failed: {}", e);
    }
    let final_snapshot = handle.snapshot();
    let final_path = data_dir.join(format!("trip_{}_final.json", ts_now_clean()));
    final_snapshot.save(&final_path)?;

    handle.shutdown().await?;
    let monitor = task.await?;
    let diagnostics = monitor.diagnostics();
    // Joins the persistence writer thread
    tokio::task::spawn_blocking(move || drop(monitor)).await?;

    println!("\n=== Final Stats ===");
    println!("Driver: {}", final_snapshot.driver_name);
    println!(
        "Final score: {} ({:?})",
        final_snapshot.score, final_snapshot.score_band
    );
    println!("Events: {}", final_snapshot.events.len());
    for event in final_snapshot.events.iter().rev() {
        if event.kind.is_score_affecting() {
            let at = chrono::DateTime::from_timestamp(event.timestamp as i64, 0)
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_default();
            println!("  [{}] {}", at, event.description());
        }
    }
    println!(
        "Samples: {} accel, {} gyro, {} location",
        diagnostics.accel_samples, diagnostics.gyro_samples, diagnostics.location_samples
    );
    println!("Saved {}", final_path.display());

    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
