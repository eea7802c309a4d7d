use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use env_logger::Env;
use serde_json::json;
use tokio::time::{interval, Duration, Instant};

use ride_meter::readout::{format_fare, Readout};
use ride_meter::sensors::{SimulatedLocation, SimulatedMotion};
use ride_meter::termux::{TermuxLocation, TermuxMotion};
use ride_meter::{
    Clock, LocationSource, Meter, MeterConfig, MotionSource, RidePhase, SystemClock, Visibility,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Source {
    /// Simulated vehicle and accelerometer
    Sim,
    /// termux-location / termux-sensor on Android
    Termux,
}

#[derive(Parser, Debug)]
#[command(name = "ride_meter")]
#[command(about = "Ride fare meter - GPS distance, waiting time and night surcharge", long_about = None)]
struct Args {
    /// Ride duration in seconds before the meter is stopped
    #[arg(long, value_name = "SECONDS", default_value = "60")]
    duration: u64,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// IANA time zone for the night surcharge (overrides config and TZ)
    #[arg(long)]
    time_zone: Option<String>,

    /// Sensor source
    #[arg(long, value_enum, default_value_t = Source::Sim)]
    source: Source,

    /// Seconds into the ride at which the app goes to the background
    #[arg(long, value_name = "SECONDS")]
    background_at: Option<u64>,

    /// Seconds into the ride at which the app returns to the foreground
    #[arg(long, value_name = "SECONDS")]
    foreground_at: Option<u64>,

    /// Simulated vehicle speed
    #[arg(long, default_value = "30.0")]
    speed_kmh: f64,

    /// Reported accuracy of simulated fixes (metres)
    #[arg(long, default_value = "8.0")]
    sim_accuracy: f64,

    /// Interval between simulated fixes
    #[arg(long, value_name = "MS", default_value = "1000")]
    fix_interval_ms: u64,

    /// Seconds the simulated vehicle waits before setting off
    #[arg(long, value_name = "SECONDS", default_value = "0")]
    wait: u64,

    /// Print the final state and fare breakdown as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => MeterConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => MeterConfig::default(),
    };
    if let Some(tz) = &args.time_zone {
        config.time_zone = Some(tz.clone());
    }
    config.validate()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.time_zone.as_deref()));

    println!("[{}] Ride Meter Starting", ts_now());
    println!("  Duration: {} seconds", args.duration);
    println!("  Source: {:?}", args.source);
    println!("  Time zone: {}", clock.time_zone());

    let sim_motion = SimulatedMotion::new(args.wait == 0);
    let (location, motion): (Arc<dyn LocationSource>, Arc<dyn MotionSource>) = match args.source {
        Source::Sim => (
            Arc::new(
                SimulatedLocation::new(12.9716, 77.5946, args.speed_kmh)
                    .with_accuracy(args.sim_accuracy)
                    .with_fix_interval(Duration::from_millis(args.fix_interval_ms.max(1)))
                    .with_departure_delay(Duration::from_secs(args.wait)),
            ),
            Arc::new(sim_motion.clone()),
        ),
        Source::Termux => (Arc::new(TermuxLocation::default()), Arc::new(TermuxMotion::default())),
    };

    let (meter, handle) = Meter::new(&config, location, motion, Arc::clone(&clock));
    let meter_task = tokio::spawn(meter.run());

    handle.start().await?;
    let started = Instant::now();
    let mut ticker = interval(Duration::from_secs(1));
    let mut backgrounded = false;
    let mut foregrounded = false;

    loop {
        ticker.tick().await;
        let secs = started.elapsed().as_secs();

        if args.source == Source::Sim && secs >= args.wait {
            sim_motion.set_moving(true);
        }
        if !backgrounded && args.background_at.is_some_and(|at| secs >= at) {
            handle.set_visibility(Visibility::Background).await?;
            backgrounded = true;
        }
        if !foregrounded && args.foreground_at.is_some_and(|at| secs >= at) {
            handle.set_visibility(Visibility::Foreground).await?;
            foregrounded = true;
        }

        if !args.json {
            println!("[{}] {}", ts_now(), Readout(&handle.snapshot()));
        }
        if secs >= args.duration {
            break;
        }
    }

    handle.stop().await?;
    let stopped = handle
        .subscribe()
        .wait_for(|s| s.phase == RidePhase::Stopped)
        .await?
        .clone();
    handle.shutdown().await?;
    meter_task.await??;

    let breakdown = stopped.fare_breakdown(&config.fare);
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "state": stopped,
                "breakdown": breakdown,
            }))?
        );
    } else {
        println!("\n=== Ride Summary ===");
        println!("{}", Readout(&stopped));
        if let Some(b) = breakdown {
            println!("Base fare:      {}", format_fare(b.base_fare));
            println!("Time charge:    {}", format_fare(b.time_charge));
            println!("Distance:       {}", format_fare(b.distance_charge));
            println!("Platform fee:   {}", format_fare(b.platform_fee));
            println!("Night surcharge: {}", if b.night_surcharge { "yes" } else { "no" });
            println!("Wait surcharge:  {}", if b.wait_time_surcharge { "yes" } else { "no" });
            if b.minimum_applied {
                println!("Minimum fare applied");
            }
            println!("Total:          {}", format_fare(b.total));
        }
    }

    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
