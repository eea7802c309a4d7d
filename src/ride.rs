//! Ride state machine.
//!
//! Every change to [`RideState`] goes through [`RideMachine::next_state`], one discrete
//! [`RideEvent`] at a time. Events carry their own timestamps and time zone so the machine never
//! reads a clock.
//!
//! ```text
//!   Idle ──Start──▶ Running ──Stop──▶ Stopped
//!    ▲                 │                 │
//!    └─────Reset───────┴──────Reset──────┘      (Start is accepted from any phase)
//! ```

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::fare::{compute_fare, fare_breakdown, FareBreakdown, FareConfig, FareInputs};
use crate::geo::haversine_km;
use crate::types::{GeoFix, MovementStatus, RidePhase};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RideConfig {
    /// Minimum distance between consecutive fixes credited to the trip, in metres.
    pub significance_threshold_m: f64,
}

impl Default for RideConfig {
    fn default() -> Self {
        Self {
            significance_threshold_m: 5.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RideState {
    pub phase: RidePhase,
    pub movement_status: MovementStatus,
    pub distance_km: f64,
    pub start_time_ms: Option<i64>,
    /// Instant of the Stop that priced the ride.
    pub end_time_ms: Option<i64>,
    pub elapsed_seconds: u64,
    pub fare: Option<f64>,
    pub last_fix: Option<GeoFix>,
    pub stationary_time_seconds: u64,
    pub error_message: Option<String>,
    pub time_zone: String,
}

impl RideState {
    pub fn idle(time_zone: impl Into<String>) -> Self {
        Self {
            phase: RidePhase::Idle,
            movement_status: MovementStatus::Unknown,
            distance_km: 0.0,
            start_time_ms: None,
            end_time_ms: None,
            elapsed_seconds: 0,
            fare: None,
            last_fix: None,
            stationary_time_seconds: 0,
            error_message: None,
            time_zone: time_zone.into(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase == RidePhase::Running
    }

    /// Itemised fare for a stopped ride.
    pub fn fare_breakdown(&self, config: &FareConfig) -> Option<FareBreakdown> {
        let end_time_ms = self.end_time_ms.filter(|_| self.phase == RidePhase::Stopped)?;
        Some(fare_breakdown(
            &FareInputs {
                elapsed_seconds: self.elapsed_seconds,
                distance_km: self.distance_km,
                stationary_time_seconds: self.stationary_time_seconds,
                now_ms: end_time_ms,
                time_zone: &self.time_zone,
            },
            config,
        ))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RideEvent {
    Start { now_ms: i64, time_zone: String },
    Stop { now_ms: i64 },
    Reset,
    Tick { now_ms: i64 },
    LocationUpdate(GeoFix),
    MotionUpdate { is_moving: bool },
    SetError(Option<String>),
}

impl RideEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RideEvent::Start { .. } => "start",
            RideEvent::Stop { .. } => "stop",
            RideEvent::Reset => "reset",
            RideEvent::Tick { .. } => "tick",
            RideEvent::LocationUpdate(_) => "location",
            RideEvent::MotionUpdate { .. } => "motion",
            RideEvent::SetError(_) => "error",
        }
    }
}

pub struct RideMachine {
    ride_config: RideConfig,
    fare_config: FareConfig,
    initial: RideState,
    state: RideState,
}

impl RideMachine {
    /// Creates an idle machine. `time_zone` is the zone captured at process start; Reset returns
    /// to exactly this initial state.
    pub fn new(time_zone: impl Into<String>, ride_config: RideConfig, fare_config: FareConfig) -> Self {
        let initial = RideState::idle(time_zone);
        Self {
            ride_config,
            fare_config,
            state: initial.clone(),
            initial,
        }
    }

    pub fn state(&self) -> &RideState {
        &self.state
    }

    pub fn initial_state(&self) -> &RideState {
        &self.initial
    }

    /// Applies one event. Returns whether the state changed.
    pub fn apply(&mut self, event: &RideEvent) -> bool {
        let next = self.next_state(&self.state, event);
        if next == self.state {
            return false;
        }
        if next.phase != self.state.phase {
            info!(
                "Ride {:?} -> {:?} on {} (distance {:.3} km, elapsed {}s, fare {:?})",
                self.state.phase,
                next.phase,
                event.name(),
                next.distance_km,
                next.elapsed_seconds,
                next.fare
            );
        }
        self.state = next;
        true
    }

    /// Pure transition function: the state after `event`, given `state`.
    pub fn next_state(&self, state: &RideState, event: &RideEvent) -> RideState {
        match event {
            RideEvent::Start { now_ms, time_zone } => {
                if state.is_running() {
                    debug!("Start while running discards the current ride without a fare");
                }
                RideState {
                    phase: RidePhase::Running,
                    start_time_ms: Some(*now_ms),
                    ..RideState::idle(time_zone.clone())
                }
            }

            RideEvent::Stop { now_ms } => {
                if !state.is_running() {
                    return state.clone();
                }
                let fare = compute_fare(
                    state.elapsed_seconds,
                    state.distance_km,
                    state.stationary_time_seconds,
                    *now_ms,
                    &state.time_zone,
                    &self.fare_config,
                );
                RideState {
                    phase: RidePhase::Stopped,
                    end_time_ms: Some(*now_ms),
                    fare: Some(fare),
                    ..state.clone()
                }
            }

            RideEvent::Reset => self.initial.clone(),

            RideEvent::Tick { now_ms } => {
                let Some(start) = state.start_time_ms.filter(|_| state.is_running()) else {
                    return state.clone();
                };
                let elapsed_seconds = (now_ms.saturating_sub(start).max(0) / 1000) as u64;
                let stationary_time_seconds = if state.movement_status == MovementStatus::Stationary {
                    (state.stationary_time_seconds + 1).min(elapsed_seconds)
                } else {
                    state.stationary_time_seconds
                };
                RideState {
                    elapsed_seconds,
                    stationary_time_seconds,
                    ..state.clone()
                }
            }

            RideEvent::LocationUpdate(fix) => {
                if !state.is_running() {
                    return state.clone();
                }
                let Some(last) = state.last_fix else {
                    return RideState {
                        last_fix: Some(*fix),
                        ..state.clone()
                    };
                };
                let increment_km = haversine_km(&last, fix);
                let significant = increment_km * 1000.0 > self.ride_config.significance_threshold_m;
                let distance_km = if state.movement_status == MovementStatus::Moving && significant {
                    state.distance_km + increment_km
                } else {
                    state.distance_km
                };
                RideState {
                    distance_km,
                    last_fix: Some(*fix),
                    ..state.clone()
                }
            }

            RideEvent::MotionUpdate { is_moving } => RideState {
                movement_status: MovementStatus::from_moving(*is_moving),
                ..state.clone()
            },

            RideEvent::SetError(message) => RideState {
                error_message: message.clone(),
                ..state.clone()
            },
        }
    }
}
