//! Scripted sensor sources and a tokio-driven clock for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use ride_meter::sensors::{LocationOptions, LocationReading, LocationSource, MotionSource};
use ride_meter::{AccelSample, Clock, LocationFix};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

pub const NOON_UTC: i64 = 1_710_072_000_000; // 2024-03-10 12:00:00 UTC

/// Wall clock that follows tokio's (pausable) time.
pub struct TokioClock {
    origin_ms: i64,
    origin: Instant,
    time_zone: String,
}

impl TokioClock {
    pub fn new(origin_ms: i64, time_zone: &str) -> Self {
        Self {
            origin_ms,
            origin: Instant::now(),
            time_zone: time_zone.to_string(),
        }
    }
}

impl Clock for TokioClock {
    fn now_millis(&self) -> i64 {
        self.origin_ms + self.origin.elapsed().as_millis() as i64
    }

    fn time_zone(&self) -> String {
        self.time_zone.clone()
    }
}

pub fn fix(latitude: f64, accuracy: f64) -> LocationFix {
    LocationFix {
        latitude,
        longitude: 77.5946,
        accuracy,
        timestamp_ms: 0,
    }
}

// ─── Location ───

#[derive(Debug, Clone)]
pub enum PollResponse {
    Reply(LocationReading),
    Hang,
}

#[derive(Default)]
struct LocationShared {
    watchers: Vec<mpsc::Sender<LocationReading>>,
    polls: VecDeque<PollResponse>,
    poll_count: usize,
}

/// Replays a fixed script on every `watch`, relative to when the watch started; answers
/// single-shot requests from a queue.
#[derive(Clone, Default)]
pub struct ScriptedLocation {
    script: Vec<(Duration, LocationReading)>,
    shared: Arc<Mutex<LocationShared>>,
}

impl ScriptedLocation {
    pub fn new(script: Vec<(Duration, LocationReading)>) -> Self {
        Self {
            script,
            shared: Arc::default(),
        }
    }

    pub fn with_polls(self, polls: Vec<PollResponse>) -> Self {
        self.shared.lock().unwrap().polls = polls.into();
        self
    }

    pub fn watch_count(&self) -> usize {
        self.shared.lock().unwrap().watchers.len()
    }

    pub fn active_watches(&self) -> usize {
        let shared = self.shared.lock().unwrap();
        shared.watchers.iter().filter(|tx| !tx.is_closed()).count()
    }

    pub fn poll_count(&self) -> usize {
        self.shared.lock().unwrap().poll_count
    }
}

impl LocationSource for ScriptedLocation {
    fn watch(&self, _options: &LocationOptions) -> mpsc::Receiver<LocationReading> {
        let (tx, rx) = mpsc::channel(16);
        self.shared.lock().unwrap().watchers.push(tx.clone());
        let script = self.script.clone();
        let started = Instant::now();
        tokio::spawn(async move {
            for (at, reading) in script {
                sleep_until(started + at).await;
                if tx.send(reading).await.is_err() {
                    return;
                }
            }
            tx.closed().await;
        });
        rx
    }

    fn current_position(&self, _options: &LocationOptions) -> BoxFuture<'static, LocationReading> {
        let mut shared = self.shared.lock().unwrap();
        shared.poll_count += 1;
        match shared.polls.pop_front() {
            Some(PollResponse::Reply(reading)) => future::ready(reading).boxed(),
            Some(PollResponse::Hang) | None => future::pending().boxed(),
        }
    }
}

// ─── Motion ───

/// Motion source whose samples are pushed by the test.
#[derive(Clone)]
pub struct ScriptedMotion {
    available: bool,
    subscribers: Arc<Mutex<Vec<mpsc::Sender<AccelSample>>>>,
}

impl ScriptedMotion {
    pub fn new() -> Self {
        Self {
            available: true,
            subscribers: Arc::default(),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    pub fn active_subscriptions(&self) -> usize {
        let subscribers = self.subscribers.lock().unwrap();
        subscribers.iter().filter(|tx| !tx.is_closed()).count()
    }

    /// Sends `count` identical samples to the newest subscription.
    pub async fn push(&self, sample: AccelSample, count: usize) {
        let tx = self
            .subscribers
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no motion subscription");
        for _ in 0..count {
            tx.send(sample).await.expect("motion subscription closed");
        }
    }
}

impl MotionSource for ScriptedMotion {
    fn subscribe(&self) -> Option<mpsc::Receiver<AccelSample>> {
        if !self.available {
            return None;
        }
        let (tx, rx) = mpsc::channel(64);
        self.subscribers.lock().unwrap().push(tx);
        Some(rx)
    }
}
