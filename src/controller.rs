//! # Proportional Controller
//!
//! Maps a position error to a saturated actuation level:
//!
//! ```text
//! error      = setpoint - measured
//! magnitude  = trunc(gain * |error|)
//! actuation  = clamp(sign(error) * magnitude, sat_min, sat_max)
//! ```
//!
//! Truncation (not rounding) gives the loop a small natural deadband: with
//! `gain = 0.1` any error below 10 ticks produces no drive. There is no
//! integral or derivative term.

use crate::config::{ConfigError, ControllerConfig};

/// Saturating proportional position controller.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Controller {
    setpoint: i32,
    gain: f32,
    sat_min: i32,
    sat_max: i32,
    last_error: i32,
    last_actuation: i32,
}

impl Controller {
    /// Build a controller, rejecting `sat_min > sat_max`.
    pub fn new(config: ControllerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            setpoint: config.setpoint,
            gain: config.gain,
            sat_min: config.sat_min,
            sat_max: config.sat_max,
            last_error: 0,
            last_actuation: 0,
        })
    }

    /// Compute the actuation for `measured` against `setpoint`.
    ///
    /// The setpoint is stored for later [`Controller::update`] calls.
    /// The same inputs always produce the same output. A NaN or infinite
    /// gain produces no drive.
    pub fn run(&mut self, setpoint: i32, measured: i32) -> i32 {
        self.setpoint = setpoint;

        // 64-bit so i32::MAX - i32::MIN cannot overflow
        let error = i64::from(setpoint) - i64::from(measured);
        // `as` truncates toward zero and saturates
        let magnitude = if self.gain.is_finite() {
            (self.gain * error.unsigned_abs() as f32) as i64
        } else {
            0
        };
        let mut actuation = if error < 0 {
            magnitude.saturating_neg()
        } else {
            magnitude
        };

        if actuation > i64::from(self.sat_max) {
            actuation = i64::from(self.sat_max);
        }
        if actuation < i64::from(self.sat_min) {
            actuation = i64::from(self.sat_min);
        }

        self.last_error = error.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
        self.last_actuation = actuation as i32;
        self.last_actuation
    }

    /// Run against the stored setpoint.
    pub fn update(&mut self, measured: i32) -> i32 {
        self.run(self.setpoint, measured)
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn set_setpoint(&mut self, setpoint: i32) {
        self.setpoint = setpoint;
    }

    pub fn setpoint(&self) -> i32 {
        self.setpoint
    }

    /// Error seen by the most recent run, saturated to `i32`.
    pub fn last_error(&self) -> i32 {
        self.last_error
    }

    /// Output of the most recent run.
    pub fn last_actuation(&self) -> i32 {
        self.last_actuation
    }

    /// `(sat_min, sat_max)`.
    pub fn limits(&self) -> (i32, i32) {
        (self.sat_min, self.sat_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SAT_MAX, SAT_MIN};

    fn controller(gain: f32) -> Controller {
        Controller::new(ControllerConfig::new(0, gain)).unwrap()
    }

    #[test]
    fn test_proportional_truncates_toward_zero() {
        let mut ctrl = controller(0.1);
        assert_eq!(ctrl.run(100, 0), 10);
        assert_eq!(ctrl.run(19, 0), 1);
        assert_eq!(ctrl.run(9, 0), 0);
        assert_eq!(ctrl.run(0, 19), -1);
        assert_eq!(ctrl.run(0, 9), 0);
        assert_eq!(ctrl.last_error(), -9);
    }

    #[test]
    fn test_zero_error_is_zero_actuation() {
        for gain in [0.0, 0.1, 1.0, 250.0, -3.0] {
            let mut ctrl = controller(gain);
            assert_eq!(ctrl.run(16_384, 16_384), 0, "gain {}", gain);
            assert_eq!(ctrl.run(-7, -7), 0, "gain {}", gain);
        }
    }

    #[test]
    fn test_repeated_inputs_repeat_output() {
        let mut ctrl = controller(0.37);
        let first = ctrl.run(1234, -56);
        let second = ctrl.run(1234, -56);
        assert_eq!(first, second);
        assert_eq!(ctrl.last_actuation(), first);
    }

    #[test]
    fn test_output_within_limits() {
        let setpoints = [i32::MIN, -16_384, -1, 0, 1, 500, 16_384, i32::MAX];
        let gains = [0.0, 0.05, 1.0, 1e6, -2.0, f32::INFINITY, f32::NAN];
        let limits = [(-100, 100), (0, 50), (-20, -10), (5, 5), (SAT_MIN, SAT_MAX)];

        for &(sat_min, sat_max) in &limits {
            for &gain in &gains {
                let config = ControllerConfig::new(0, gain).with_saturation(sat_min, sat_max);
                let mut ctrl = Controller::new(config).unwrap();
                for &setpoint in &setpoints {
                    for &measured in &setpoints {
                        let act = ctrl.run(setpoint, measured);
                        assert!(
                            (sat_min..=sat_max).contains(&act),
                            "act {} outside [{}, {}]",
                            act,
                            sat_min,
                            sat_max
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_non_finite_gain_is_zero_drive() {
        for gain in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let mut ctrl = controller(gain);
            assert_eq!(ctrl.run(16_384, 0), 0);
            assert_eq!(ctrl.run(-16_384, 0), 0);
        }

        // Pinned limits still win
        let config = ControllerConfig::new(0, f32::NAN).with_saturation(5, 5);
        let mut ctrl = Controller::new(config).unwrap();
        assert_eq!(ctrl.run(100, 0), 5);
    }

    #[test]
    fn test_saturation() {
        let mut ctrl = controller(1.0);
        assert_eq!(ctrl.run(16_384, 0), SAT_MAX);
        assert_eq!(ctrl.run(-16_384, 0), SAT_MIN);
        assert_eq!(ctrl.run(50, 0), 50);
    }

    #[test]
    fn test_invalid_limits_fail_fast() {
        let config = ControllerConfig::new(0, 1.0).with_saturation(10, -10);
        assert_eq!(
            Controller::new(config),
            Err(ConfigError::InvalidSaturation { min: 10, max: -10 })
        );
    }

    #[test]
    fn test_gain_and_setpoint_setters() {
        let mut ctrl = controller(0.1);
        assert_eq!(ctrl.gain(), 0.1);

        ctrl.set_gain(0.5);
        assert_eq!(ctrl.gain(), 0.5);

        ctrl.set_setpoint(40);
        assert_eq!(ctrl.update(0), 20);

        // `run` replaces the stored setpoint
        ctrl.run(-40, 0);
        assert_eq!(ctrl.setpoint(), -40);
        assert_eq!(ctrl.update(0), -20);
        assert_eq!(ctrl.limits(), (SAT_MIN, SAT_MAX));
    }
}
