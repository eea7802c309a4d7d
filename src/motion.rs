//! Moving/stationary classification from smoothed acceleration.
//!
//! GPS drifts a few metres even when the vehicle is parked, so distance only accrues while the
//! accelerometer says the device is moving. The classifier low-pass filters each axis and
//! thresholds the magnitude of the smoothed vector in units of g.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::smoothing::LowPassState;
use crate::types::{AccelSample, MovementStatus};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Smoothing factor for the per-axis low-pass filter.
    pub lpf_alpha: f64,
    /// Smoothed magnitude above which the device counts as moving (g).
    pub stationary_threshold_g: f64,
    pub gravity: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            lpf_alpha: 0.1,
            stationary_threshold_g: 0.035,
            gravity: 9.81,
        }
    }
}

/// Pure classification step: returns the updated filter state and the classification, or
/// `None` (state untouched) when the sample is missing an axis.
pub fn classify(
    state: LowPassState,
    sample: &AccelSample,
    config: &MotionConfig,
) -> (LowPassState, Option<MovementStatus>) {
    let Some((x, y, z)) = sample.axes() else {
        return (state, None);
    };
    let next = state.apply(Vector3::new(x, y, z), config.lpf_alpha);
    let magnitude_g = next.magnitude() / config.gravity;
    let status = MovementStatus::from_moving(magnitude_g > config.stationary_threshold_g);
    (next, Some(status))
}

/// Owns a [`LowPassState`] across samples for callers that feed a live stream.
#[derive(Clone, Debug)]
pub struct MotionClassifier {
    config: MotionConfig,
    state: LowPassState,
    samples_seen: u64,
}

impl MotionClassifier {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            state: LowPassState::new(),
            samples_seen: 0,
        }
    }

    pub fn update(&mut self, sample: &AccelSample) -> Option<MovementStatus> {
        let (next, status) = classify(self.state, sample, &self.config);
        self.state = next;
        if status.is_some() {
            self.samples_seen += 1;
        }
        status
    }

    /// Current smoothed magnitude in g.
    pub fn magnitude_g(&self) -> f64 {
        self.state.magnitude() / self.config.gravity
    }

    pub fn samples_seen(&self) -> u64 {
        self.samples_seen
    }

    pub fn state(&self) -> LowPassState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_still_device_is_stationary() {
        let mut classifier = MotionClassifier::new(MotionConfig::default());
        let status = classifier.update(&AccelSample::new(0.01, -0.02, 0.01));
        assert_eq!(status, Some(MovementStatus::Stationary));
    }

    #[test]
    fn test_sustained_acceleration_becomes_moving() {
        let mut classifier = MotionClassifier::new(MotionConfig::default());
        // 1 m/s² is ~0.1 g; after one sample the smoothed value is only 0.1 m/s² (~0.0102 g)
        assert_eq!(
            classifier.update(&AccelSample::new(1.0, 0.0, 0.0)),
            Some(MovementStatus::Stationary)
        );
        let mut last = None;
        for _ in 0..10 {
            last = classifier.update(&AccelSample::new(1.0, 0.0, 0.0));
        }
        assert_eq!(last, Some(MovementStatus::Moving));
        assert!(classifier.magnitude_g() > 0.035);
    }

    #[test]
    fn test_incomplete_sample_is_dropped() {
        let mut classifier = MotionClassifier::new(MotionConfig::default());
        classifier.update(&AccelSample::new(2.0, 0.0, 0.0));
        let before = classifier.state();

        let partial = AccelSample {
            x: Some(5.0),
            y: None,
            z: Some(5.0),
        };
        assert_eq!(classifier.update(&partial), None);
        assert_eq!(classifier.state(), before);
        assert_eq!(classifier.samples_seen(), 1);
    }

    #[test]
    fn test_classify_is_pure() {
        let config = MotionConfig::default();
        let sample = AccelSample::new(3.0, 0.0, 0.0);
        let (a, status_a) = classify(LowPassState::new(), &sample, &config);
        let (b, status_b) = classify(LowPassState::new(), &sample, &config);
        assert_eq!(a, b);
        assert_eq!(status_a, status_b);
        // 0.3 m/s² / 9.81 ≈ 0.0306 g
        assert_eq!(status_a, Some(MovementStatus::Stationary));
    }

    #[test]
    fn test_decays_back_to_stationary() {
        let mut classifier = MotionClassifier::new(MotionConfig::default());
        for _ in 0..50 {
            classifier.update(&AccelSample::new(2.0, 1.0, 0.5));
        }
        let mut last = None;
        for _ in 0..100 {
            last = classifier.update(&AccelSample::new(0.0, 0.0, 0.0));
        }
        assert_eq!(last, Some(MovementStatus::Stationary));
    }
}
