//! Sensor feed controller.
//!
//! Converts raw location readings, accelerometer samples and the one-second timer into
//! [`RideEvent`]s on the meter's queue. Acquisition runs only while the ride is Running; the
//! meter calls [`SensorFeed::sync_phase`] after every event it applies.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};

use crate::clock::Clock;
use crate::error::SensorError;
use crate::motion::{MotionClassifier, MotionConfig};
use crate::ride::RideEvent;
use crate::sensors::{LocationOptions, LocationReading, LocationSource, MotionSource};
use crate::types::{MovementStatus, RidePhase, Visibility};

pub const MOTION_UNAVAILABLE: &str = "Motion Error: Motion sensors are not available on this device";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Fixes with a larger accuracy radius (metres) are discarded.
    pub max_accuracy_m: f64,
    pub background_poll_interval_ms: u64,
    pub location_timeout_ms: u64,
    pub tick_interval_ms: u64,
    pub high_accuracy: bool,
    pub maximum_age_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            max_accuracy_m: 50.0,
            background_poll_interval_ms: 30_000,
            location_timeout_ms: 10_000,
            tick_interval_ms: 1_000,
            high_accuracy: true,
            maximum_age_ms: 0,
        }
    }
}

impl FeedConfig {
    pub fn location_options(&self) -> LocationOptions {
        LocationOptions {
            high_accuracy: self.high_accuracy,
            timeout: Duration::from_millis(self.location_timeout_ms),
            maximum_age: Duration::from_millis(self.maximum_age_ms),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionMode {
    Stopped,
    /// Foreground: continuous subscription.
    Continuous,
    /// Background: one request per poll interval.
    Polling,
}

/// Maps one location reading to the event it produces, if any.
pub fn normalize_reading(reading: LocationReading, config: &FeedConfig) -> Option<RideEvent> {
    match reading {
        Ok(fix) => {
            // NaN accuracy is rejected too
            if !(fix.accuracy <= config.max_accuracy_m) {
                trace!("Discarding fix with accuracy {:.1} m", fix.accuracy);
                return None;
            }
            Some(RideEvent::LocationUpdate(fix.to_geo_fix()))
        }
        Err(e) => {
            warn!("Location error: {}", e);
            Some(RideEvent::SetError(Some(format!("Location Error: {e}"))))
        }
    }
}

pub struct SensorFeed<L, M> {
    location: Arc<L>,
    motion: Arc<M>,
    clock: Arc<dyn Clock>,
    events: mpsc::Sender<RideEvent>,
    config: FeedConfig,
    motion_config: MotionConfig,
    visibility: Visibility,
    acquiring: bool,
    tick_task: Option<JoinHandle<()>>,
    location_task: Option<JoinHandle<()>>,
    motion_task: Option<JoinHandle<()>>,
}

impl<L: LocationSource, M: MotionSource> SensorFeed<L, M> {
    pub fn new(
        location: L,
        motion: M,
        clock: Arc<dyn Clock>,
        events: mpsc::Sender<RideEvent>,
        config: FeedConfig,
        motion_config: MotionConfig,
    ) -> Self {
        Self {
            location: Arc::new(location),
            motion: Arc::new(motion),
            clock,
            events,
            config,
            motion_config,
            visibility: Visibility::Foreground,
            acquiring: false,
            tick_task: None,
            location_task: None,
            motion_task: None,
        }
    }

    pub fn mode(&self) -> AcquisitionMode {
        if !self.acquiring {
            AcquisitionMode::Stopped
        } else if self.visibility == Visibility::Foreground {
            AcquisitionMode::Continuous
        } else {
            AcquisitionMode::Polling
        }
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_acquiring(&self) -> bool {
        self.acquiring
    }

    /// Starts acquisition when the ride enters Running, releases everything when it leaves.
    pub fn sync_phase(&mut self, phase: RidePhase) {
        let should_acquire = phase == RidePhase::Running;
        if should_acquire && !self.acquiring {
            self.start();
        } else if !should_acquire && self.acquiring {
            self.stop();
        }
    }

    /// Records the new visibility; while acquiring, location restarts in the matching mode.
    pub fn set_visibility(&mut self, visibility: Visibility) {
        if visibility == self.visibility {
            return;
        }
        self.visibility = visibility;
        if self.acquiring {
            self.abort_location();
            self.location_task = Some(self.spawn_location());
            info!("Location acquisition switched to {:?}", self.mode());
        }
    }

    pub fn shutdown(&mut self) {
        if self.acquiring {
            self.stop();
        }
    }

    fn start(&mut self) {
        self.acquiring = true;
        self.tick_task = Some(self.spawn_ticks());
        self.motion_task = self.spawn_motion();
        self.location_task = Some(self.spawn_location());
        info!("Sensor acquisition started ({:?})", self.mode());
    }

    fn stop(&mut self) {
        self.abort_location();
        for handle in [self.tick_task.take(), self.motion_task.take()].into_iter().flatten() {
            handle.abort();
        }
        self.acquiring = false;
        info!("Sensor acquisition stopped");
    }

    fn abort_location(&mut self) {
        if let Some(handle) = self.location_task.take() {
            handle.abort();
        }
    }

    fn report(&self, event: RideEvent) {
        if let Err(e) = self.events.try_send(event) {
            warn!("Dropping feed event: {}", e);
        }
    }

    // ─── Tasks ───

    fn spawn_ticks(&self) -> JoinHandle<()> {
        let events = self.events.clone();
        let clock = Arc::clone(&self.clock);
        let period = Duration::from_millis(self.config.tick_interval_ms);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let tick = RideEvent::Tick {
                    now_ms: clock.now_millis(),
                };
                if events.send(tick).await.is_err() {
                    break;
                }
            }
        })
    }

    fn spawn_motion(&self) -> Option<JoinHandle<()>> {
        let Some(mut samples) = self.motion.subscribe() else {
            warn!("No motion sensor; distance will not accrue");
            self.report(RideEvent::SetError(Some(MOTION_UNAVAILABLE.to_string())));
            return None;
        };
        let events = self.events.clone();
        let mut classifier = MotionClassifier::new(self.motion_config.clone());
        Some(tokio::spawn(async move {
            let mut last: Option<MovementStatus> = None;
            while let Some(sample) = samples.recv().await {
                let Some(status) = classifier.update(&sample) else {
                    continue;
                };
                if last != Some(status) {
                    debug!("Movement {:?} ({:.4} g)", status, classifier.magnitude_g());
                    last = Some(status);
                }
                // Every classification is forwarded: a restarted ride begins at Unknown.
                let update = RideEvent::MotionUpdate {
                    is_moving: status == MovementStatus::Moving,
                };
                match events.try_send(update) {
                    Ok(()) => {}
                    Err(TrySendError::Closed(_)) => return,
                    Err(TrySendError::Full(_)) => {
                        // Queue full, drop this classification
                    }
                }
            }
            warn!("Motion stream ended after {} samples", classifier.samples_seen());
        }))
    }

    fn spawn_location(&self) -> JoinHandle<()> {
        let events = self.events.clone();
        let source = Arc::clone(&self.location);
        let config = self.config.clone();
        let options = config.location_options();

        match self.visibility {
            Visibility::Foreground => tokio::spawn(async move {
                let mut readings = source.watch(&options);
                while let Some(reading) = readings.recv().await {
                    if let Some(event) = normalize_reading(reading, &config) {
                        if events.send(event).await.is_err() {
                            return;
                        }
                    }
                }
                debug!("Location watch ended");
            }),
            Visibility::Background => tokio::spawn(async move {
                let period = Duration::from_millis(config.background_poll_interval_ms);
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    let reading = match timeout(options.timeout, source.current_position(&options)).await {
                        Ok(reading) => reading,
                        Err(_) => Err(SensorError::Timeout),
                    };
                    if let Some(event) = normalize_reading(reading, &config) {
                        if events.send(event).await.is_err() {
                            return;
                        }
                    }
                }
            }),
        }
    }
}

impl<L, M> Drop for SensorFeed<L, M> {
    fn drop(&mut self) {
        for handle in [
            self.tick_task.take(),
            self.location_task.take(),
            self.motion_task.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sensors::{SimulatedLocation, SimulatedMotion};
    use crate::types::LocationFix;

    fn fix(accuracy: f64) -> LocationFix {
        LocationFix {
            latitude: 12.0,
            longitude: 77.0,
            accuracy,
            timestamp_ms: 5,
        }
    }

    fn feed(
        motion: SimulatedMotion,
    ) -> (SensorFeed<SimulatedLocation, SimulatedMotion>, mpsc::Receiver<RideEvent>) {
        let (tx, rx) = mpsc::channel(256);
        let feed = SensorFeed::new(
            SimulatedLocation::new(12.0, 77.0, 30.0),
            motion,
            Arc::new(ManualClock::new(0, "UTC")),
            tx,
            FeedConfig::default(),
            MotionConfig::default(),
        );
        (feed, rx)
    }

    #[test]
    fn test_accuracy_filter() {
        let config = FeedConfig::default();
        assert!(matches!(
            normalize_reading(Ok(fix(50.0)), &config),
            Some(RideEvent::LocationUpdate(_))
        ));
        assert_eq!(normalize_reading(Ok(fix(50.1)), &config), None);
        assert_eq!(normalize_reading(Ok(fix(f64::NAN)), &config), None);
    }

    #[test]
    fn test_location_error_message() {
        let event = normalize_reading(Err(SensorError::Timeout), &FeedConfig::default());
        assert_eq!(
            event,
            Some(RideEvent::SetError(Some("Location Error: Timeout expired".to_string())))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_mode_follows_phase_and_visibility() {
        let (mut feed, _rx) = feed(SimulatedMotion::new(false));
        assert_eq!(feed.mode(), AcquisitionMode::Stopped);

        feed.set_visibility(Visibility::Background);
        assert_eq!(feed.mode(), AcquisitionMode::Stopped);

        feed.sync_phase(RidePhase::Running);
        assert_eq!(feed.mode(), AcquisitionMode::Polling);

        feed.set_visibility(Visibility::Foreground);
        assert_eq!(feed.mode(), AcquisitionMode::Continuous);

        feed.sync_phase(RidePhase::Stopped);
        assert_eq!(feed.mode(), AcquisitionMode::Stopped);
        assert!(!feed.is_acquiring());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_period() {
        let (mut feed, mut rx) = feed(SimulatedMotion::new(false));
        let started = Instant::now();
        feed.sync_phase(RidePhase::Running);
        loop {
            if let Some(RideEvent::Tick { .. }) = rx.recv().await {
                break;
            }
        }
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_motion_sensor_reported_once() {
        let (mut feed, mut rx) = feed(SimulatedMotion::unavailable());
        feed.sync_phase(RidePhase::Running);
        feed.sync_phase(RidePhase::Running);
        assert_eq!(
            rx.try_recv().unwrap(),
            RideEvent::SetError(Some(MOTION_UNAVAILABLE.to_string()))
        );
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        feed.shutdown();
        while let Ok(event) = rx.try_recv() {
            assert!(!matches!(event, RideEvent::SetError(_)), "unexpected {event:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_releases_everything() {
        let (mut feed, mut rx) = feed(SimulatedMotion::new(true));
        feed.sync_phase(RidePhase::Running);
        tokio::time::sleep(Duration::from_secs(3)).await;
        feed.sync_phase(RidePhase::Idle);
        while rx.try_recv().is_ok() {}

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_first_poll_after_interval() {
        let (mut feed, mut rx) = feed(SimulatedMotion::unavailable());
        feed.set_visibility(Visibility::Background);
        let started = Instant::now();
        feed.sync_phase(RidePhase::Running);
        loop {
            if let Some(RideEvent::LocationUpdate(_)) = rx.recv().await {
                break;
            }
        }
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }
}
