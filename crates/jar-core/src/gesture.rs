//! Shake and tilt classification.
//!
//! Shake energy is an attack/decay accumulator, not a low-pass filter: every
//! fast sample adds its full speed, every slow sample bleeds a fixed amount.
//! Direction is ignored, so a fast back-and-forth charges the jar exactly as
//! quickly as a straight fling.

use serde::{Deserialize, Serialize};

use crate::constants::{DECAY_RATE, ENERGY_THRESHOLD, MAX_TILT_DEG, SPEED_THRESHOLD, TILT_GAIN};
use crate::pointer::MotionSample;

/// Tunables for tilt and shake detection.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Degrees of tilt per px/ms of horizontal velocity.
    pub tilt_gain: f64,
    /// Tilt is clamped to `[-max_tilt_deg, max_tilt_deg]`.
    pub max_tilt_deg: f64,
    /// Samples covering more than this many px add to the energy.
    pub speed_threshold: f64,
    /// Energy lost per slow sample.
    pub decay_rate: f64,
    /// Energy above which a shake fires.
    pub energy_threshold: f64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            tilt_gain: TILT_GAIN,
            max_tilt_deg: MAX_TILT_DEG,
            speed_threshold: SPEED_THRESHOLD,
            decay_rate: DECAY_RATE,
            energy_threshold: ENERGY_THRESHOLD,
        }
    }
}

/// Result of classifying one motion sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GestureOutput {
    /// Current tilt, degrees.
    pub tilt: f64,
    /// True exactly on the sample that crossed the energy threshold.
    pub shake: bool,
}

/// Turns motion samples into a tilt angle and one-shot shake events.
#[derive(Clone, Debug)]
pub struct GestureClassifier {
    config: GestureConfig,
    energy: f64,
    tilt: f64,
}

impl GestureClassifier {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            energy: 0.0,
            tilt: 0.0,
        }
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    pub fn tilt(&self) -> f64 {
        self.tilt
    }

    /// Feed one sample. `is_shaking` is the consumer's report that a pop is
    /// already underway; while set, energy still accumulates but no event
    /// fires.
    pub fn observe(&mut self, sample: MotionSample, is_shaking: bool) -> GestureOutput {
        let limit = self.config.max_tilt_deg.abs();
        let target = sample.vx * self.config.tilt_gain;
        if !target.is_nan() {
            self.tilt = target.clamp(-limit, limit);
        }

        if sample.speed > self.config.speed_threshold {
            self.energy += sample.speed;
        } else {
            self.energy = (self.energy - self.config.decay_rate).max(0.0);
        }

        let shake = self.energy > self.config.energy_threshold && !is_shaking;
        if shake {
            self.energy = 0.0;
        }

        GestureOutput {
            tilt: self.tilt,
            shake,
        }
    }

    /// Drag ended: tilt snaps upright and energy is forgotten.
    pub fn reset(&mut self) {
        self.energy = 0.0;
        self.tilt = 0.0;
    }
}

impl Default for GestureClassifier {
    fn default() -> Self {
        Self::new(GestureConfig::default())
    }
}
