//! Offline replay of recorded rides through the same state machine the live meter uses.
//!
//! Timing comes entirely from the log: a tick is synthesised at every whole tick interval after
//! `start_ms`, interleaved with the recorded samples in timestamp order.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::MeterConfig;
use crate::error::MeterResult;
use crate::fare::FareBreakdown;
use crate::feed::normalize_reading;
use crate::motion::MotionClassifier;
use crate::ride::{RideEvent, RideMachine, RideState};
use crate::types::{AccelSample, LocationFix, MovementStatus};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LogSample {
    pub timestamp_ms: i64,
    #[serde(default)]
    pub gps: Option<LocationFix>,
    #[serde(default)]
    pub accel: Option<AccelSample>,
    /// Location error message as reported by the platform.
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RideLog {
    #[serde(default)]
    pub time_zone: Option<String>,
    pub start_ms: i64,
    /// Defaults to the last sample's timestamp.
    #[serde(default)]
    pub stop_ms: Option<i64>,
    #[serde(default)]
    pub samples: Vec<LogSample>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ReplayStats {
    pub ticks: u64,
    pub fixes_accepted: u64,
    pub fixes_discarded: u64,
    pub accel_samples: u64,
    pub errors: u64,
    /// Samples outside `[start_ms, stop_ms]`.
    pub samples_skipped: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReplayOutcome {
    pub final_state: RideState,
    pub breakdown: Option<FareBreakdown>,
    pub stats: ReplayStats,
}

/// Reads a `.json` or `.json.gz` ride log.
pub fn load_log(path: &Path) -> MeterResult<RideLog> {
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(serde_json::from_reader(BufReader::new(reader))?)
}

struct Replayer<'a> {
    config: &'a MeterConfig,
    machine: RideMachine,
    classifier: MotionClassifier,
    /// `None` once the tick schedule runs past the end of the timestamp range.
    next_tick_ms: Option<i64>,
    tick_ms: i64,
    stats: ReplayStats,
}

impl Replayer<'_> {
    fn tick_until(&mut self, until_ms: i64) {
        while let Some(now_ms) = self.next_tick_ms.filter(|&t| t <= until_ms) {
            self.machine.apply(&RideEvent::Tick { now_ms });
            self.stats.ticks += 1;
            self.next_tick_ms = now_ms.checked_add(self.tick_ms);
        }
    }

    fn sample(&mut self, sample: &LogSample) {
        if let Some(mut fix) = sample.gps {
            if fix.timestamp_ms == 0 {
                fix.timestamp_ms = sample.timestamp_ms;
            }
            match normalize_reading(Ok(fix), &self.config.feed) {
                Some(event) => {
                    self.stats.fixes_accepted += 1;
                    self.machine.apply(&event);
                }
                None => self.stats.fixes_discarded += 1,
            }
        }
        if let Some(accel) = &sample.accel {
            self.stats.accel_samples += 1;
            if let Some(status) = self.classifier.update(accel) {
                self.machine.apply(&RideEvent::MotionUpdate {
                    is_moving: status == MovementStatus::Moving,
                });
            }
        }
        if let Some(message) = &sample.error {
            self.stats.errors += 1;
            self.machine
                .apply(&RideEvent::SetError(Some(format!("Location Error: {message}"))));
        }
    }
}

pub fn replay(log: &RideLog, config: &MeterConfig) -> ReplayOutcome {
    let time_zone = log
        .time_zone
        .clone()
        .or_else(|| config.time_zone.clone())
        .unwrap_or_else(|| "UTC".to_string());

    let mut samples = log.samples.clone();
    samples.sort_by_key(|s| s.timestamp_ms);
    let stop_ms = log
        .stop_ms
        .or_else(|| samples.last().map(|s| s.timestamp_ms))
        .unwrap_or(log.start_ms)
        .max(log.start_ms);

    let tick_ms = config.feed.tick_interval_ms.max(1) as i64;
    let mut replayer = Replayer {
        config,
        machine: RideMachine::new(time_zone.clone(), config.ride.clone(), config.fare.clone()),
        classifier: MotionClassifier::new(config.motion.clone()),
        next_tick_ms: log.start_ms.checked_add(tick_ms),
        tick_ms,
        stats: ReplayStats::default(),
    };

    replayer.machine.apply(&RideEvent::Start {
        now_ms: log.start_ms,
        time_zone,
    });

    for sample in &samples {
        if sample.timestamp_ms < log.start_ms || sample.timestamp_ms > stop_ms {
            replayer.stats.samples_skipped += 1;
            continue;
        }
        replayer.tick_until(sample.timestamp_ms);
        replayer.sample(sample);
    }
    replayer.tick_until(stop_ms);
    replayer.machine.apply(&RideEvent::Stop { now_ms: stop_ms });

    let final_state = replayer.machine.state().clone();
    let breakdown = final_state.fare_breakdown(&config.fare);
    debug!("Replay stats: {:?}", replayer.stats);
    info!(
        "Replayed {} samples: {:.3} km, {}s, fare {:?}",
        samples.len(),
        final_state.distance_km,
        final_state.elapsed_seconds,
        final_state.fare
    );

    ReplayOutcome {
        final_state,
        breakdown,
        stats: replayer.stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RidePhase;
    use approx::assert_relative_eq;
    use std::io::Write;

    const NOON: i64 = 1_710_072_000_000; // 2024-03-10 12:00:00 UTC

    fn gps(t: i64, lat: f64, accuracy: f64) -> LogSample {
        LogSample {
            timestamp_ms: t,
            gps: Some(LocationFix {
                latitude: lat,
                longitude: 77.0,
                accuracy,
                timestamp_ms: 0,
            }),
            accel: None,
            error: None,
        }
    }

    fn accel(t: i64, x: f64) -> LogSample {
        LogSample {
            timestamp_ms: t,
            gps: None,
            accel: Some(AccelSample::new(x, 0.0, 0.0)),
            error: None,
        }
    }

    fn moving_log() -> RideLog {
        let mut samples = Vec::new();
        // Strong push for one second so the classifier settles on Moving
        for i in 0..50 {
            samples.push(accel(NOON + i * 20, 2.0));
        }
        for i in 0..=10 {
            samples.push(gps(NOON + 1_000 + i * 1_000, 12.0 + i as f64 * 0.001, 5.0));
        }
        RideLog {
            time_zone: Some("UTC".to_string()),
            start_ms: NOON,
            stop_ms: Some(NOON + 600_000),
            samples,
        }
    }

    #[test]
    fn test_replay_accrues_distance_and_prices_ride() {
        let outcome = replay(&moving_log(), &MeterConfig::default());
        let state = &outcome.final_state;
        assert_eq!(state.phase, RidePhase::Stopped);
        assert_eq!(state.elapsed_seconds, 600);
        assert_eq!(outcome.stats.ticks, 600);
        assert_eq!(outcome.stats.fixes_accepted, 11);
        // Ten 0.001° steps of latitude
        assert_relative_eq!(state.distance_km, 1.111949, epsilon = 1e-5);

        let breakdown = outcome.breakdown.unwrap();
        assert_relative_eq!(breakdown.total, state.fare.unwrap(), epsilon = 1e-12);
        assert!(!breakdown.night_surcharge);
        assert!(!breakdown.wait_time_surcharge);
    }

    #[test]
    fn test_replay_discards_inaccurate_fixes_and_records_errors() {
        let mut log = moving_log();
        log.samples.push(gps(NOON + 20_000, 13.0, 80.0));
        log.samples.push(LogSample {
            timestamp_ms: NOON + 30_000,
            gps: None,
            accel: None,
            error: Some("User denied Geolocation".to_string()),
        });
        let outcome = replay(&log, &MeterConfig::default());
        assert_eq!(outcome.stats.fixes_discarded, 1);
        assert_eq!(outcome.stats.errors, 1);
        assert_eq!(
            outcome.final_state.error_message.as_deref(),
            Some("Location Error: User denied Geolocation")
        );
        assert_relative_eq!(outcome.final_state.distance_km, 1.111949, epsilon = 1e-5);
    }

    #[test]
    fn test_replay_without_motion_samples_accrues_nothing() {
        let mut log = moving_log();
        log.samples.retain(|s| s.accel.is_none());
        let outcome = replay(&log, &MeterConfig::default());
        assert_eq!(outcome.final_state.distance_km, 0.0);
        assert_eq!(outcome.final_state.movement_status, MovementStatus::Unknown);
    }

    #[test]
    fn test_replay_out_of_order_samples_are_sorted() {
        let mut log = moving_log();
        log.samples.reverse();
        let outcome = replay(&log, &MeterConfig::default());
        assert_relative_eq!(outcome.final_state.distance_km, 1.111949, epsilon = 1e-5);
    }

    #[test]
    fn test_replay_near_end_of_timestamp_range() {
        let start_ms = i64::MAX - 1_500;
        let log = RideLog {
            time_zone: Some("UTC".to_string()),
            start_ms,
            stop_ms: Some(i64::MAX),
            samples: vec![accel(i64::MAX - 100, 2.0)],
        };
        let outcome = replay(&log, &MeterConfig::default());
        // One tick fits before the schedule runs off the end
        assert_eq!(outcome.stats.ticks, 1);
        assert_eq!(outcome.final_state.elapsed_seconds, 1);
        assert_eq!(outcome.final_state.phase, RidePhase::Stopped);
        assert!(outcome.final_state.fare.is_some());
    }

    #[test]
    fn test_load_gzipped_log() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let path = std::env::temp_dir().join(format!("ride_meter_replay_{}.json.gz", std::process::id()));
        let json = serde_json::to_vec(&moving_log()).unwrap();
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(&json).unwrap();
        encoder.finish().unwrap();

        let log = load_log(&path).unwrap();
        assert_eq!(log.samples.len(), 61);
        std::fs::remove_file(&path).unwrap();
    }
}
