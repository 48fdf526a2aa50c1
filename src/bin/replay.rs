use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use drive_score_rs::clock::Clock;
use drive_score_rs::{
    AccelSample, DrivingMonitor, EventKind, GyroSample, LocationSample, ManualClock, MemoryStore,
    MonitorConfig, NoSensors, PersistenceGateway, SpeedUnit,
};
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::json;

/// Score a recorded drive offline
#[derive(Parser, Debug)]
struct Args {
    /// Path to a sensor log (.json or .json.gz)
    #[arg(long, conflicts_with = "log_dir")]
    log: Option<PathBuf>,

    /// Directory of logs to batch replay
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Monitor config (JSON); defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Speed limit in display units (overrides config)
    #[arg(long)]
    speed_limit: Option<f64>,

    /// Display units: mph or kmh (overrides config)
    #[arg(long)]
    unit: Option<String>,

    /// Include every event in the output
    #[arg(long, default_value_t = false)]
    events: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct AxisData {
    x: f64,
    y: f64,
    z: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct GpsData {
    speed: f64,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Reading {
    timestamp: f64,
    #[serde(default)]
    accel: Option<AxisData>,
    #[serde(default)]
    gyro: Option<AxisData>,
    #[serde(default, alias = "location")]
    gps: Option<GpsData>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LogFile {
    Wrapped { readings: Vec<Reading> },
    Bare(Vec<Reading>),
}

impl LogFile {
    fn into_readings(self) -> Vec<Reading> {
        match self {
            LogFile::Wrapped { readings } | LogFile::Bare(readings) => readings,
        }
    }
}

fn load_log(path: &Path) -> anyhow::Result<Vec<Reading>> {
    let file = File::open(path)?;
    let log: LogFile = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        serde_json::from_reader(BufReader::new(GzDecoder::new(file)))?
    } else {
        serde_json::from_reader(BufReader::new(file))?
    };
    Ok(log.into_readings())
}

/// Drive a fresh monitor through `readings` on a virtual clock. Timers due
/// between two readings fire before the later one is applied.
fn replay(mut readings: Vec<Reading>, config: MonitorConfig, speed_limit: f64) -> anyhow::Result<DrivingMonitor> {
    readings.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    let start = readings.first().map(|r| r.timestamp).unwrap_or(0.0);

    let clock = ManualClock::new(start);
    let mut monitor = DrivingMonitor::load(
        config,
        Arc::new(clock.clone()),
        PersistenceGateway::new(MemoryStore::new()),
        Box::new(NoSensors),
    );
    monitor.set_speed_limit(speed_limit)?;
    monitor.start_trip()?;

    for r in &readings {
        monitor.fire_due_timers(r.timestamp);
        clock.set(r.timestamp);

        if let Some(a) = r.accel {
            monitor.on_acceleration_sample(&AccelSample::new(a.x, a.y, a.z, r.timestamp));
        }
        if let Some(g) = r.gyro {
            monitor.on_rotation_sample(&GyroSample::new(g.x, g.y, g.z, r.timestamp));
        }
        if let Some(gps) = r.gps {
            let mut fix = LocationSample::new(gps.speed, r.timestamp);
            if let (Some(lat), Some(lon)) = (gps.latitude, gps.longitude) {
                fix = fix.with_position(lat, lon);
            }
            monitor.on_location_sample(&fix);
        }
    }

    monitor.fire_due_timers(clock.now());
    monitor.stop_trip()?;
    Ok(monitor)
}

fn run_once(path: &Path, config: &MonitorConfig, speed_limit: f64, args: &Args) -> anyhow::Result<serde_json::Value> {
    let readings = load_log(path)?;
    let total = readings.len();
    let span = match (readings.first(), readings.last()) {
        (Some(first), Some(last)) => (last.timestamp - first.timestamp).abs(),
        _ => 0.0,
    };

    let monitor = replay(readings, config.clone(), speed_limit)?;
    let snapshot = monitor.snapshot();

    let mut by_kind = BTreeMap::new();
    for kind in EventKind::ALL {
        let count = monitor.events().count_of(kind);
        if count > 0 && !kind.is_informational() {
            by_kind.insert(kind.label(), count);
        }
    }

    let mut result = json!({
        "log": path.display().to_string(),
        "readings": total,
        "duration_secs": span,
        "speed_limit": speed_limit,
        "speed_unit": config.speed_unit,
        "final_score": snapshot.score,
        "score_band": snapshot.score_band,
        "events_by_kind": by_kind,
        "diagnostics": snapshot.diagnostics,
    });
    if args.events {
        let events: Vec<String> = monitor.events().iter().rev().map(|e| e.description()).collect();
        result["events"] = json!(events);
    }
    Ok(result)
}

fn load_config(args: &Args) -> anyhow::Result<MonitorConfig> {
    let mut config = match args.config.as_ref() {
        Some(path) => MonitorConfig::load(path)?,
        None => MonitorConfig::default(),
    };
    if let Some(unit) = args.unit.as_deref() {
        config.speed_unit = match unit {
            "mph" => SpeedUnit::Mph,
            "kmh" => SpeedUnit::Kmh,
            other => anyhow::bail!("Unknown unit '{}', expected mph or kmh", other),
        };
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let speed_limit = args.speed_limit.unwrap_or(config.default_speed_limit);
    let mut results = Vec::new();

    if let Some(dir) = args.log_dir.as_ref() {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !(name.ends_with(".json") || name.ends_with(".json.gz")) {
                continue;
            }
            match run_once(&path, &config, speed_limit, &args) {
                Ok(res) => results.push(res),
                Err(e) => eprintln!("Failed {}: {}", path.display(), e),
            }
        }
    } else if let Some(log) = args.log.as_ref() {
        results.push(run_once(log, &config, speed_limit, &args)?);
    } else {
        anyhow::bail!("Provide --log or --log-dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
