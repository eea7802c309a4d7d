use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;

/// Wall clock and time zone used to stamp user commands and ticks.
///
/// The ride machine itself never reads a clock; only the runtime does, through this trait.
pub trait Clock: Send + Sync + 'static {
    fn now_millis(&self) -> i64;
    fn time_zone(&self) -> String;
}

#[derive(Clone, Debug)]
pub struct SystemClock {
    time_zone: String,
}

impl SystemClock {
    /// Uses `configured` if given, else the `TZ` environment variable, else `UTC`.
    pub fn new(configured: Option<&str>) -> Self {
        let time_zone = configured
            .map(str::to_string)
            .or_else(|| std::env::var("TZ").ok().filter(|tz| !tz.is_empty()))
            .unwrap_or_else(|| "UTC".to_string());
        Self { time_zone }
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn time_zone(&self) -> String {
        self.time_zone.clone()
    }
}

/// Settable clock for tests and replay. Clones share the same instant.
#[derive(Clone, Debug)]
pub struct ManualClock {
    now_ms: Arc<AtomicI64>,
    time_zone: String,
}

impl ManualClock {
    pub fn new(now_ms: i64, time_zone: impl Into<String>) -> Self {
        Self {
            now_ms: Arc::new(AtomicI64::new(now_ms)),
            time_zone: time_zone.into(),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn time_zone(&self) -> String {
        self.time_zone.clone()
    }
}
