//! # Configuration
//!
//! Compile-time constants for the kit, plus the validated runtime
//! configuration handed to controllers. All limits are fixed at compile
//! time. No dynamic allocation.

use thiserror::Error;

/// Maximum number of tasks the scheduler can hold.
/// Bounds the inline task table; the kit needs three (two loops, one logger).
pub const MAX_TASKS: usize = 8;

/// SysTick frequency in Hz. One tick is one scheduler millisecond.
pub const TICK_HZ: u32 = 1000;

/// Core clock frequency in Hz (STM32L476 running from the 80 MHz PLL).
pub const SYSTEM_CLOCK_HZ: u32 = 80_000_000;

/// Modulus of the 16-bit encoder timers.
pub const ENCODER_PERIOD: u32 = 1 << 16;

/// Largest duty cycle, in percent, the actuator ever forwards to a channel.
pub const DUTY_MAX: u8 = 100;

/// Default actuation limits, matching the duty-cycle range in both directions.
pub const SAT_MIN: i32 = -100;
pub const SAT_MAX: i32 = 100;

/// Position setpoint in encoder ticks (a quarter of the counter range).
pub const DEFAULT_SETPOINT: i32 = 16_384;

/// Proportional gain used when no operator value is supplied.
pub const DEFAULT_GAIN: f32 = 0.1;

/// Control loop period and priority.
pub const CONTROL_PERIOD_MS: u32 = 10;
pub const CONTROL_PRIORITY: u8 = 2;

/// Telemetry logger period and priority. Must stay below `CONTROL_PRIORITY`.
pub const LOGGER_PERIOD_MS: u32 = 20;
pub const LOGGER_PRIORITY: u8 = 1;

/// Telemetry queue depth in lines. At one line per control period and two
/// periods per logger run, the logger drains it long before it fills.
pub const TELEMETRY_DEPTH: usize = 64;

/// Longest telemetry record: 10 digits of `u32` milliseconds, a comma,
/// 20 characters of `i64` ticks and the `\r\n` terminator.
pub const TELEMETRY_LINE_LEN: usize = 40;

/// Length of a step-response capture, in milliseconds since the loop started.
pub const CAPTURE_WINDOW_MS: u32 = 2000;

/// Longest operator input line (a gain), in characters.
pub const INPUT_LINE_LEN: usize = 24;

/// Receive-side quiet time that ends the gain prompts, in milliseconds.
/// Leftover input (a trailing `\n`, a repeated value) is discarded until
/// the line has been idle this long, so it cannot stop the run.
pub const INPUT_SETTLE_MS: u32 = 50;

/// Bytes held while the console is busy transmitting.
pub const CONSOLE_RX_BUFFER: usize = 32;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Rejected configuration. Raised at construction, never mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Actuation lower bound above the upper bound.
    #[error("saturation lower bound {min} exceeds upper bound {max}")]
    InvalidSaturation { min: i32, max: i32 },

    /// A periodic task needs a non-zero period.
    #[error("task period must be non-zero")]
    ZeroPeriod,

    /// The unwrap arithmetic needs a period of at least two counts.
    #[error("encoder period {0} is below the minimum of 2")]
    InvalidEncoderPeriod(u32),

    /// Operator gain text that is empty, non-numeric or not finite.
    #[error("gain is not a finite decimal number")]
    InvalidGain,
}

// ---------------------------------------------------------------------------
// Controller configuration
// ---------------------------------------------------------------------------

/// Initial state of a proportional controller.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControllerConfig {
    /// Position setpoint in encoder ticks.
    pub setpoint: i32,
    /// Proportional gain (duty percent per tick of error).
    pub gain: f32,
    /// Lowest actuation the controller may emit.
    pub sat_min: i32,
    /// Highest actuation the controller may emit.
    pub sat_max: i32,
}

impl ControllerConfig {
    /// Configuration with the default `[SAT_MIN, SAT_MAX]` limits.
    pub const fn new(setpoint: i32, gain: f32) -> Self {
        Self {
            setpoint,
            gain,
            sat_min: SAT_MIN,
            sat_max: SAT_MAX,
        }
    }

    /// Replace the saturation limits.
    pub const fn with_saturation(mut self, sat_min: i32, sat_max: i32) -> Self {
        self.sat_min = sat_min;
        self.sat_max = sat_max;
        self
    }

    /// Check the saturation limits are ordered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sat_min > self.sat_max {
            return Err(ConfigError::InvalidSaturation {
                min: self.sat_min,
                max: self.sat_max,
            });
        }
        Ok(())
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SETPOINT, DEFAULT_GAIN)
    }
}

/// Parse an operator-entered gain such as `"0.1"`.
///
/// Surrounding whitespace (including the `\r` a terminal sends) is ignored.
/// Empty, non-numeric, NaN and infinite inputs are rejected.
pub fn parse_gain(text: &str) -> Result<f32, ConfigError> {
    let gain: f32 = text.trim().parse().map_err(|_| ConfigError::InvalidGain)?;
    if !gain.is_finite() {
        return Err(ConfigError::InvalidGain);
    }
    Ok(gain)
}
