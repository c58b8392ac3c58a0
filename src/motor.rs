//! # H-Bridge Motor Actuator
//!
//! Drives a DC motor through two complementary PWM inputs of an H-bridge:
//!
//! | level   | channel A         | channel B          | motor            |
//! |---------|-------------------|--------------------|------------------|
//! | `> 0`   | `min(level, 100)` | 0                  | forward          |
//! | `< 0`   | 0                 | `min(-level, 100)` | reverse          |
//! | `0`     | 0                 | 0                  | both low (coast) |
//!
//! The clamp to 100 % is applied here whatever the caller passes, on top
//! of the controller's own saturation. Duty values above 100 % never reach
//! the PWM peripheral.

use embedded_hal::pwm::{Error as _, ErrorKind, SetDutyCycle};
use thiserror::Error;

use crate::config::DUTY_MAX;

/// One of the two H-bridge inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    A,
    B,
}

/// A PWM channel refused a duty-cycle update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("PWM channel {channel:?} rejected duty cycle ({kind:?})")]
pub struct DriveError {
    pub channel: Channel,
    pub kind: ErrorKind,
}

/// Split a signed level into `(channel A, channel B)` duty percentages.
pub fn duty_split(level: i32) -> (u8, u8) {
    let magnitude = level.unsigned_abs().min(u32::from(DUTY_MAX)) as u8;
    match level.signum() {
        1 => (magnitude, 0),
        -1 => (0, magnitude),
        _ => (0, 0),
    }
}

/// Two-channel H-bridge driver. Sole owner of its PWM channels.
pub struct MotorActuator<A, B> {
    channel_a: A,
    channel_b: B,
    level: i32,
}

impl<A, B> MotorActuator<A, B>
where
    A: SetDutyCycle,
    B: SetDutyCycle,
{
    /// Take ownership of both channels and drive them to 0 %.
    pub fn new(channel_a: A, channel_b: B) -> Result<Self, DriveError> {
        let mut motor = Self {
            channel_a,
            channel_b,
            level: 0,
        };
        motor.set_duty_cycle(0)?;
        Ok(motor)
    }

    /// Drive the motor at a signed duty level, clamped to ±100 %.
    ///
    /// The channel going to zero is written first, so a direction change
    /// never has both inputs high at once.
    pub fn set_duty_cycle(&mut self, level: i32) -> Result<(), DriveError> {
        let (duty_a, duty_b) = duty_split(level);

        if duty_a > 0 {
            self.write_b(0)?;
            self.write_a(duty_a)?;
        } else {
            self.write_a(0)?;
            self.write_b(duty_b)?;
        }

        self.level = level;
        Ok(())
    }

    /// Both channels low.
    pub fn stop(&mut self) -> Result<(), DriveError> {
        self.set_duty_cycle(0)
    }

    /// Last level passed to a successful `set_duty_cycle`, before clamping.
    pub fn level(&self) -> i32 {
        self.level
    }

    /// Give the channels back.
    pub fn release(self) -> (A, B) {
        (self.channel_a, self.channel_b)
    }

    fn write_a(&mut self, percent: u8) -> Result<(), DriveError> {
        self.channel_a
            .set_duty_cycle_percent(percent)
            .map_err(|e| DriveError {
                channel: Channel::A,
                kind: e.kind(),
            })
    }

    fn write_b(&mut self, percent: u8) -> Result<(), DriveError> {
        self.channel_b
            .set_duty_cycle_percent(percent)
            .map_err(|e| DriveError {
                channel: Channel::B,
                kind: e.kind(),
            })
    }
}
