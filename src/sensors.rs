//! Location and motion sources.
//!
//! The meter consumes sensors only through [`LocationSource`] and [`MotionSource`]. Platform
//! adapters live in [`crate::termux`]; the simulated sources here drive the CLI demo and tests.

use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use log::debug;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{interval, Instant};

use crate::error::SensorError;
use crate::geo::EARTH_RADIUS_KM;
use crate::types::{AccelSample, LocationFix};

/// Request options passed to every location request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocationOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// Oldest cached fix the source may return. Zero forces a fresh fix.
    pub maximum_age: Duration,
}

impl Default for LocationOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(10),
            maximum_age: Duration::ZERO,
        }
    }
}

pub type LocationReading = Result<LocationFix, SensorError>;

pub trait LocationSource: Send + Sync + 'static {
    /// Continuous subscription. Dropping the receiver unsubscribes.
    fn watch(&self, options: &LocationOptions) -> mpsc::Receiver<LocationReading>;

    /// Single-shot request for the current position.
    fn current_position(&self, options: &LocationOptions) -> BoxFuture<'static, LocationReading>;
}

pub trait MotionSource: Send + Sync + 'static {
    /// Stream of acceleration samples, or `None` when the device has no motion sensor.
    /// Dropping the receiver unsubscribes.
    fn subscribe(&self) -> Option<mpsc::Receiver<AccelSample>>;
}

impl<T: LocationSource + ?Sized> LocationSource for Arc<T> {
    fn watch(&self, options: &LocationOptions) -> mpsc::Receiver<LocationReading> {
        (**self).watch(options)
    }

    fn current_position(&self, options: &LocationOptions) -> BoxFuture<'static, LocationReading> {
        (**self).current_position(options)
    }
}

impl<T: MotionSource + ?Sized> MotionSource for Arc<T> {
    fn subscribe(&self) -> Option<mpsc::Receiver<AccelSample>> {
        (**self).subscribe()
    }
}

// ─── Simulated location ───

/// Vehicle heading due north at a constant speed from a fixed origin.
#[derive(Clone, Debug)]
pub struct SimulatedLocation {
    origin_lat: f64,
    origin_lon: f64,
    speed_kmh: f64,
    accuracy_m: f64,
    fix_interval: Duration,
    departure_delay: Duration,
    started: Instant,
}

impl SimulatedLocation {
    pub fn new(origin_lat: f64, origin_lon: f64, speed_kmh: f64) -> Self {
        Self {
            origin_lat,
            origin_lon,
            speed_kmh,
            accuracy_m: 8.0,
            fix_interval: Duration::from_secs(1),
            departure_delay: Duration::ZERO,
            started: Instant::now(),
        }
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = accuracy_m;
        self
    }

    pub fn with_fix_interval(mut self, fix_interval: Duration) -> Self {
        self.fix_interval = fix_interval;
        self
    }

    /// Holds position at the origin for `delay` before setting off.
    pub fn with_departure_delay(mut self, delay: Duration) -> Self {
        self.departure_delay = delay;
        self
    }

    fn fix_now(&self) -> LocationFix {
        let driving = self.started.elapsed().saturating_sub(self.departure_delay);
        let hours = driving.as_secs_f64() / 3600.0;
        let travelled_km = self.speed_kmh * hours;
        let lat = self.origin_lat + (travelled_km / EARTH_RADIUS_KM) * 180.0 / PI;
        // Small wobble so the reported accuracy is not perfectly constant
        let seq = self.started.elapsed().as_secs_f64();
        LocationFix {
            latitude: lat,
            longitude: self.origin_lon,
            accuracy: self.accuracy_m + (seq * 0.1).sin() * 2.0,
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }
}

impl LocationSource for SimulatedLocation {
    fn watch(&self, _options: &LocationOptions) -> mpsc::Receiver<LocationReading> {
        let (tx, rx) = mpsc::channel(16);
        let source = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(source.fix_interval);
            let mut fixes = 0u64;
            loop {
                ticker.tick().await;
                match tx.try_send(Ok(source.fix_now())) {
                    Ok(()) => fixes += 1,
                    Err(TrySendError::Closed(_)) => {
                        debug!("[sim-gps] Watch released after {} fixes", fixes);
                        break;
                    }
                    Err(TrySendError::Full(_)) => {
                        // Consumer is behind, drop this fix
                    }
                }
            }
        });
        rx
    }

    fn current_position(&self, _options: &LocationOptions) -> BoxFuture<'static, LocationReading> {
        let fix = self.fix_now();
        async move { Ok(fix) }.boxed()
    }
}

// ─── Simulated motion ───

/// Accelerometer at ~50 Hz. Reports a forward push with road vibration while `moving` is set,
/// sensor noise otherwise.
#[derive(Clone, Debug)]
pub struct SimulatedMotion {
    moving: Arc<AtomicBool>,
    available: bool,
    sample_interval: Duration,
}

impl SimulatedMotion {
    pub fn new(moving: bool) -> Self {
        Self {
            moving: Arc::new(AtomicBool::new(moving)),
            available: true,
            sample_interval: Duration::from_millis(20),
        }
    }

    /// A device without a motion sensor.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(false)
        }
    }

    pub fn set_moving(&self, moving: bool) {
        self.moving.store(moving, Ordering::Relaxed);
    }
}

pub fn simulated_accel(moving: bool, t: f64) -> AccelSample {
    if moving {
        AccelSample::new(
            0.6 + (t * 2.0 * PI).sin() * 0.3,
            (t * 2.0 * PI).cos() * 0.2,
            (t * PI).sin() * 0.1,
        )
    } else {
        AccelSample::new(
            (t * 7.0).sin() * 0.02,
            (t * 5.0).cos() * 0.02,
            (t * 3.0).sin() * 0.01,
        )
    }
}

impl MotionSource for SimulatedMotion {
    fn subscribe(&self) -> Option<mpsc::Receiver<AccelSample>> {
        if !self.available {
            return None;
        }
        let (tx, rx) = mpsc::channel(64);
        let moving = Arc::clone(&self.moving);
        let period = self.sample_interval;
        tokio::spawn(async move {
            let mut ticker = interval(period);
            let mut sample_count = 0u64;
            loop {
                ticker.tick().await;
                let t = sample_count as f64 * period.as_secs_f64();
                let sample = simulated_accel(moving.load(Ordering::Relaxed), t);
                match tx.try_send(sample) {
                    Ok(()) => sample_count += 1,
                    Err(TrySendError::Closed(_)) => {
                        debug!("[sim-accel] Subscription released after {} samples", sample_count);
                        break;
                    }
                    Err(TrySendError::Full(_)) => {
                        // Channel full, drop this sample
                    }
                }
            }
        });
        Some(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::haversine_km;
    use crate::motion::{MotionClassifier, MotionConfig};
    use crate::types::MovementStatus;

    #[tokio::test(start_paused = true)]
    async fn test_simulated_location_advances_north() {
        let source = SimulatedLocation::new(12.9716, 77.5946, 36.0);
        let first = source.current_position(&LocationOptions::default()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        let second = source.current_position(&LocationOptions::default()).await.unwrap();

        assert!(second.latitude > first.latitude);
        // 36 km/h for 10 s is 100 m
        let km = haversine_km(&first.to_geo_fix(), &second.to_geo_fix());
        assert!((km - 0.1).abs() < 1e-3, "travelled {km} km");
    }

    #[tokio::test(start_paused = true)]
    async fn test_departure_delay_holds_position() {
        let source = SimulatedLocation::new(12.9716, 77.5946, 36.0)
            .with_departure_delay(Duration::from_secs(5));
        let first = source.current_position(&LocationOptions::default()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(4)).await;
        let parked = source.current_position(&LocationOptions::default()).await.unwrap();
        assert_eq!(first.latitude, parked.latitude);

        tokio::time::sleep(Duration::from_secs(6)).await;
        let moved = source.current_position(&LocationOptions::default()).await.unwrap();
        assert!(moved.latitude > parked.latitude);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_stops_when_receiver_dropped() {
        let source = SimulatedLocation::new(0.0, 0.0, 10.0);
        let mut rx = source.watch(&LocationOptions::default());
        assert!(rx.recv().await.unwrap().is_ok());
        drop(rx);
        // The producer notices the closed channel on its next tick and exits
        tokio::time::sleep(Duration::from_secs(3)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_follows_fix_interval_and_accuracy() {
        let source = SimulatedLocation::new(12.9716, 77.5946, 36.0)
            .with_accuracy(60.0)
            .with_fix_interval(Duration::from_millis(250));
        let mut rx = source.watch(&LocationOptions::default());

        let started = Instant::now();
        for _ in 0..5 {
            let fix = rx.recv().await.unwrap().unwrap();
            assert!((58.0..=62.0).contains(&fix.accuracy), "accuracy {}", fix.accuracy);
        }
        // First fix is immediate, then one per interval
        assert_eq!(started.elapsed(), Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_motion_has_no_stream() {
        assert!(SimulatedMotion::unavailable().subscribe().is_none());
        assert!(SimulatedMotion::new(true).subscribe().is_some());
    }

    #[test]
    fn test_simulated_accel_classifies_as_intended() {
        let mut moving = MotionClassifier::new(MotionConfig::default());
        let mut still = MotionClassifier::new(MotionConfig::default());
        let mut last_moving = None;
        let mut last_still = None;
        for i in 0..200 {
            let t = i as f64 * 0.02;
            last_moving = moving.update(&simulated_accel(true, t));
            last_still = still.update(&simulated_accel(false, t));
        }
        assert_eq!(last_moving, Some(MovementStatus::Moving));
        assert_eq!(last_still, Some(MovementStatus::Stationary));
    }
}
