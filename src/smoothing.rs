use nalgebra::Vector3;

/// Per-axis exponential smoothing state for accelerometer samples.
///
/// The state is a plain value: [`LowPassState::apply`] consumes it and returns the updated
/// state, so callers own the accumulator explicitly.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LowPassState {
    smoothed: Vector3<f64>,
}

impl Default for LowPassState {
    fn default() -> Self {
        Self::new()
    }
}

impl LowPassState {
    /// Starts from rest (all axes zero), matching a device that has not reported yet.
    pub fn new() -> Self {
        Self {
            smoothed: Vector3::zeros(),
        }
    }

    /// `s = alpha * sample + (1 - alpha) * s_prev` on every axis.
    pub fn apply(self, sample: Vector3<f64>, alpha: f64) -> Self {
        Self {
            smoothed: sample * alpha + self.smoothed * (1.0 - alpha),
        }
    }

    pub fn smoothed(&self) -> Vector3<f64> {
        self.smoothed
    }

    /// Euclidean magnitude of the smoothed vector in m/s².
    pub fn magnitude(&self) -> f64 {
        self.smoothed.norm()
    }
}
