use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RidePhase {
    Idle,
    Running,
    Stopped,
}

/// Derived from the motion classifier; independent of the ride phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementStatus {
    Unknown,
    Moving,
    Stationary,
}

impl MovementStatus {
    pub fn from_moving(is_moving: bool) -> Self {
        if is_moving {
            MovementStatus::Moving
        } else {
            MovementStatus::Stationary
        }
    }
}

/// Host visibility as reported by the platform shell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Foreground,
    Background,
}

/// An accepted position sample. Timestamp is milliseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoFix {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp_ms: i64,
}

impl GeoFix {
    pub fn new(latitude: f64, longitude: f64, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp_ms,
        }
    }
}

/// Raw location sample as delivered by a location source, before filtering.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius in metres.
    pub accuracy: f64,
    #[serde(default)]
    pub timestamp_ms: i64,
}

impl LocationFix {
    pub fn to_geo_fix(&self) -> GeoFix {
        GeoFix::new(self.latitude, self.longitude, self.timestamp_ms)
    }
}

/// Gravity-compensated acceleration in m/s². Platforms may report any axis as missing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccelSample {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

impl AccelSample {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
        }
    }

    /// All three axes, or `None` when the sample is incomplete.
    pub fn axes(&self) -> Option<(f64, f64, f64)> {
        Some((self.x?, self.y?, self.z?))
    }
}
