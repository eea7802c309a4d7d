// Ride Meter Library
// Metered ride fares from GPS distance, elapsed time and accelerometer motion state

pub mod clock;
pub mod config;
pub mod error;
pub mod fare;
pub mod feed;
pub mod geo;
pub mod meter;
pub mod motion;
pub mod night;
pub mod readout;
pub mod replay;
pub mod ride;
pub mod sensors;
pub mod smoothing;
pub mod termux;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::MeterConfig;
pub use error::{MeterError, MeterResult, SensorError};
pub use fare::{compute_fare, fare_breakdown, FareBreakdown, FareConfig, FareInputs};
pub use feed::{AcquisitionMode, FeedConfig, SensorFeed};
pub use geo::haversine_km;
pub use meter::{Meter, MeterHandle};
pub use motion::{MotionClassifier, MotionConfig};
pub use night::{is_night_hour, is_night_time, NightWindow};
pub use ride::{RideConfig, RideEvent, RideMachine, RideState};
pub use sensors::{LocationOptions, LocationReading, LocationSource, MotionSource};
pub use types::{AccelSample, GeoFix, LocationFix, MovementStatus, RidePhase, Visibility};
