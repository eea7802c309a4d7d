use std::fmt;

use crate::ride::RideState;
use crate::types::{MovementStatus, RidePhase};

/// `MM:SS`; minutes keep counting past 59.
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

pub fn format_fare(fare: f64) -> String {
    format!("₹{:.2}", fare)
}

/// One-line meter display for a ride state.
pub struct Readout<'a>(pub &'a RideState);

impl fmt::Display for Readout<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0;
        let phase = match state.phase {
            RidePhase::Idle => "IDLE",
            RidePhase::Running => "RUNNING",
            RidePhase::Stopped => "STOPPED",
        };
        let movement = match state.movement_status {
            MovementStatus::Unknown => "-",
            MovementStatus::Moving => "moving",
            MovementStatus::Stationary => "waiting",
        };
        write!(
            f,
            "[{:<7}] {}  {:.2} km  {:<7}",
            phase,
            format_elapsed(state.elapsed_seconds),
            state.distance_km,
            movement
        )?;
        if let Some(fare) = state.fare {
            write!(f, "  fare {}", format_fare(fare))?;
        }
        if let Some(error) = &state.error_message {
            write!(f, "  ! {}", error)?;
        }
        Ok(())
    }
}
