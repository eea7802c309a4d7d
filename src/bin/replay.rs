use std::path::{Path, PathBuf};

use clap::Parser;
use env_logger::Env;
use ride_meter::replay::{load_log, replay};
use ride_meter::MeterConfig;
use serde_json::{json, Value};

#[derive(Parser, Debug)]
struct Args {
    /// Path to a ride_*.json[.gz] log
    #[arg(long, conflicts_with = "log_dir")]
    log: Option<PathBuf>,

    /// Directory of ride logs to batch replay (processes ride_*.json[.gz])
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Time zone used when a log does not record one
    #[arg(long)]
    time_zone: Option<String>,

    /// Override the accuracy filter (metres)
    #[arg(long)]
    max_accuracy: Option<f64>,

    /// Override the motion threshold (g)
    #[arg(long)]
    stationary_threshold: Option<f64>,
}

fn run_once(path: &Path, config: &MeterConfig) -> anyhow::Result<Value> {
    let log = load_log(path)?;
    let outcome = replay(&log, config);
    Ok(json!({
        "log": path.display().to_string(),
        "time_zone": outcome.final_state.time_zone,
        "elapsed_seconds": outcome.final_state.elapsed_seconds,
        "distance_km": outcome.final_state.distance_km,
        "stationary_time_seconds": outcome.final_state.stationary_time_seconds,
        "error": outcome.final_state.error_message,
        "fare": outcome.final_state.fare,
        "breakdown": outcome.breakdown,
        "stats": outcome.stats,
    }))
}

fn is_ride_log(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.starts_with("ride_") && (name.ends_with(".json") || name.ends_with(".json.gz"))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => MeterConfig::load(path)?,
        None => MeterConfig::default(),
    };
    if let Some(tz) = &args.time_zone {
        config.time_zone = Some(tz.clone());
    }
    if let Some(max_accuracy) = args.max_accuracy {
        config.feed.max_accuracy_m = max_accuracy;
    }
    if let Some(threshold) = args.stationary_threshold {
        config.motion.stationary_threshold_g = threshold;
    }
    config.validate()?;

    let mut results = Vec::new();
    if let Some(dir) = args.log_dir.as_ref() {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && is_ride_log(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        for path in paths {
            match run_once(&path, &config) {
                Ok(res) => results.push(res),
                Err(e) => eprintln!("Failed {}: {}", path.display(), e),
            }
        }
    } else if let Some(log) = args.log.as_ref() {
        results.push(run_once(log, &config)?);
    } else {
        anyhow::bail!("Provide --log or --log-dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
