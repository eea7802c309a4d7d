//! Night-surcharge window evaluation.
//!
//! The surcharge depends on the local wall-clock hour at the rider's location, not on UTC.
//! Time-zone failures never reach the caller: an unknown zone falls back to the host's local
//! hour with the same window rule.

use chrono::{DateTime, Local, Timelike, Utc};
use chrono_tz::Tz;
use log::warn;
use serde::{Deserialize, Serialize};

/// Local hours during which the night surcharge applies: `[start_hour, end_hour)`.
/// When `start_hour > end_hour` the window wraps midnight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for NightWindow {
    fn default() -> Self {
        Self {
            start_hour: 23,
            end_hour: 6,
        }
    }
}

impl NightWindow {
    /// Hours outside 0–23 are never night.
    pub fn contains(&self, hour: u32) -> bool {
        if hour > 23 {
            return false;
        }
        if self.start_hour > self.end_hour {
            hour >= self.start_hour || hour < self.end_hour
        } else {
            hour >= self.start_hour && hour < self.end_hour
        }
    }
}

pub fn is_night_hour(hour: u32, window: &NightWindow) -> bool {
    window.contains(hour)
}

/// Local hour of `instant` in the IANA zone `time_zone`, or `None` if the zone is unknown.
pub fn local_hour(instant: DateTime<Utc>, time_zone: &str) -> Option<u32> {
    match time_zone.parse::<Tz>() {
        Ok(tz) => Some(instant.with_timezone(&tz).hour()),
        Err(err) => {
            warn!("Unknown time zone {:?} ({}), falling back to host local time", time_zone, err);
            None
        }
    }
}

pub fn is_night_time(instant: DateTime<Utc>, time_zone: &str, window: &NightWindow) -> bool {
    let hour = local_hour(instant, time_zone)
        .unwrap_or_else(|| instant.with_timezone(&Local).hour());
    window.contains(hour)
}

/// Same as [`is_night_time`] for a millisecond epoch timestamp. Out-of-range timestamps are
/// treated as daytime.
pub fn is_night_at_millis(now_ms: i64, time_zone: &str, window: &NightWindow) -> bool {
    match DateTime::<Utc>::from_timestamp_millis(now_ms) {
        Some(instant) => is_night_time(instant, time_zone, window),
        None => {
            warn!("Timestamp {} out of range for night evaluation", now_ms);
            false
        }
    }
}
