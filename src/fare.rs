//! Fare engine
//! Computes the final fare from accumulated trip metrics. The stop instant and the rider's time
//! zone are passed in, never read from the environment.

use serde::{Deserialize, Serialize};

use crate::night::{is_night_at_millis, NightWindow};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FareConfig {
    pub base_fare: f64,
    pub time_fare_per_minute: f64,
    pub distance_fare_per_km: f64,
    pub platform_fee: f64,
    pub minimum_fare: f64,
    pub night_surcharge_rate: f64,
    pub wait_time_surcharge_rate: f64,
    pub wait_time_threshold_minutes: f64,
    pub night_window: NightWindow,
}

impl Default for FareConfig {
    fn default() -> Self {
        Self {
            base_fare: 19.0,
            time_fare_per_minute: 0.5,
            distance_fare_per_km: 20.0,
            platform_fee: 2.5,
            minimum_fare: 20.0,
            night_surcharge_rate: 0.20,
            wait_time_surcharge_rate: 0.20,
            wait_time_threshold_minutes: 3.0,
            night_window: NightWindow::default(),
        }
    }
}

/// Trip metrics at the moment the ride stops.
#[derive(Clone, Debug, PartialEq)]
pub struct FareInputs<'a> {
    pub elapsed_seconds: u64,
    pub distance_km: f64,
    pub stationary_time_seconds: u64,
    pub now_ms: i64,
    pub time_zone: &'a str,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FareBreakdown {
    pub base_fare: f64,
    pub time_charge: f64,
    pub distance_charge: f64,
    pub platform_fee: f64,
    /// Sum of the four components above, before surcharges.
    pub subtotal: f64,
    pub night_surcharge: bool,
    pub wait_time_surcharge: bool,
    pub minimum_applied: bool,
    pub total: f64,
}

pub fn fare_breakdown(inputs: &FareInputs<'_>, config: &FareConfig) -> FareBreakdown {
    let minutes = inputs.elapsed_seconds as f64 / 60.0;
    let stationary_minutes = inputs.stationary_time_seconds as f64 / 60.0;

    let time_charge = minutes * config.time_fare_per_minute;
    let distance_charge = inputs.distance_km * config.distance_fare_per_km;
    let subtotal = config.base_fare + time_charge + distance_charge + config.platform_fee;

    let night_surcharge = is_night_at_millis(inputs.now_ms, inputs.time_zone, &config.night_window);
    let wait_time_surcharge = stationary_minutes > config.wait_time_threshold_minutes;

    // Surcharges stack multiplicatively; the floor comes last.
    let mut total = subtotal;
    if night_surcharge {
        total *= 1.0 + config.night_surcharge_rate;
    }
    if wait_time_surcharge {
        total *= 1.0 + config.wait_time_surcharge_rate;
    }
    let minimum_applied = total < config.minimum_fare;
    if minimum_applied {
        total = config.minimum_fare;
    }

    FareBreakdown {
        base_fare: config.base_fare,
        time_charge,
        distance_charge,
        platform_fee: config.platform_fee,
        subtotal,
        night_surcharge,
        wait_time_surcharge,
        minimum_applied,
        total,
    }
}

pub fn compute_fare(
    elapsed_seconds: u64,
    distance_km: f64,
    stationary_time_seconds: u64,
    now_ms: i64,
    time_zone: &str,
    config: &FareConfig,
) -> f64 {
    let inputs = FareInputs {
        elapsed_seconds,
        distance_km,
        stationary_time_seconds,
        now_ms,
        time_zone,
    };
    fare_breakdown(&inputs, config).total
}
