use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MeterError, MeterResult};
use crate::fare::FareConfig;
use crate::feed::FeedConfig;
use crate::motion::MotionConfig;
use crate::ride::RideConfig;

/// Top-level meter configuration.
///
/// Every section has defaults, so a JSON file only needs the fields it overrides:
///
/// ```json
/// { "time_zone": "Asia/Kolkata", "fare": { "base_fare": 25.0 } }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    pub fare: FareConfig,
    pub motion: MotionConfig,
    pub ride: RideConfig,
    pub feed: FeedConfig,
    /// IANA zone for the night surcharge. Falls back to `TZ`, then UTC.
    pub time_zone: Option<String>,
}

impl MeterConfig {
    pub fn load(path: impl AsRef<Path>) -> MeterResult<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: MeterConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MeterResult<()> {
        let fare = &self.fare;
        let rates = [
            ("fare.base_fare", fare.base_fare),
            ("fare.time_fare_per_minute", fare.time_fare_per_minute),
            ("fare.distance_fare_per_km", fare.distance_fare_per_km),
            ("fare.platform_fee", fare.platform_fee),
            ("fare.minimum_fare", fare.minimum_fare),
            ("fare.night_surcharge_rate", fare.night_surcharge_rate),
            ("fare.wait_time_surcharge_rate", fare.wait_time_surcharge_rate),
            ("fare.wait_time_threshold_minutes", fare.wait_time_threshold_minutes),
            ("ride.significance_threshold_m", self.ride.significance_threshold_m),
            ("motion.stationary_threshold_g", self.motion.stationary_threshold_g),
        ];
        for (name, value) in rates {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("{name} must be a non-negative number, got {value}")));
            }
        }

        if fare.night_window.start_hour > 23 || fare.night_window.end_hour > 23 {
            return Err(invalid(format!(
                "night window hours must be 0-23, got {}-{}",
                fare.night_window.start_hour, fare.night_window.end_hour
            )));
        }

        let alpha = self.motion.lpf_alpha;
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(invalid(format!("motion.lpf_alpha must be in (0, 1], got {alpha}")));
        }
        if !(self.motion.gravity > 0.0) {
            return Err(invalid("motion.gravity must be positive".to_string()));
        }

        let feed = &self.feed;
        if !(feed.max_accuracy_m > 0.0) {
            return Err(invalid("feed.max_accuracy_m must be positive".to_string()));
        }
        for (name, value) in [
            ("feed.tick_interval_ms", feed.tick_interval_ms),
            ("feed.background_poll_interval_ms", feed.background_poll_interval_ms),
            ("feed.location_timeout_ms", feed.location_timeout_ms),
        ] {
            if value == 0 {
                return Err(invalid(format!("{name} must be positive")));
            }
        }

        Ok(())
    }
}

fn invalid(message: String) -> MeterError {
    MeterError::InvalidConfig(message)
}
