//! # Encoder Tracking
//!
//! Turns a free-running, wrapping hardware counter into an unbounded signed
//! shaft position.
//!
//! ## Unwrap Rule
//!
//! Between two samples the raw difference is ambiguous. A counter that went
//! from `65530` to `10` either moved forward 22 counts across the wrap or
//! backward 65520 counts. The tracker assumes the shorter distance:
//!
//! ```text
//! delta = raw - last_raw                      (signed, 64-bit)
//! delta >  period/2   =>  delta -= period     (wrapped backward through 0)
//! delta < -period/2   =>  delta += period     (wrapped forward through 0)
//! ```
//!
//! This holds as long as the shaft moves less than half a period between
//! samples. Faster motion aliases silently; the caller must sample often
//! enough. Nothing here detects or reports it.

use crate::config::{ConfigError, ENCODER_PERIOD};

/// Source of raw counter snapshots, such as a timer in encoder mode.
///
/// The hardware keeps counting while software runs, so a snapshot is
/// taken exactly once per sample and never re-read.
pub trait CounterSource {
    /// Current raw count, in `[0, period)`.
    fn snapshot(&mut self) -> u32;
}

/// Unwraps raw counter samples into an accumulated position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EncoderTracker {
    /// Counter modulus.
    period: u32,
    /// Raw value at the previous sample.
    last_raw_count: u32,
    /// Unbounded position in ticks.
    position: i64,
    /// Corrected delta from the previous sample.
    delta: i64,
}

impl EncoderTracker {
    /// Tracker for a 16-bit hardware counter.
    pub const fn sixteen_bit() -> Self {
        Self {
            period: ENCODER_PERIOD,
            last_raw_count: 0,
            position: 0,
            delta: 0,
        }
    }

    /// Tracker for a counter that wraps at `period`.
    pub fn new(period: u32) -> Result<Self, ConfigError> {
        if period < 2 {
            return Err(ConfigError::InvalidEncoderPeriod(period));
        }
        Ok(Self {
            period,
            ..Self::sixteen_bit()
        })
    }

    /// Fold one raw sample into the position and return the corrected delta.
    pub fn update(&mut self, raw_count: u32) -> i64 {
        let period = i64::from(self.period);
        let half = period / 2;

        let mut delta = i64::from(raw_count) - i64::from(self.last_raw_count);
        if delta > half {
            delta -= period;
        } else if delta < -half {
            delta += period;
        }

        self.position += delta;
        self.last_raw_count = raw_count;
        self.delta = delta;
        delta
    }

    /// Take one snapshot from `source` and fold it in.
    pub fn sample<C: CounterSource>(&mut self, source: &mut C) -> i64 {
        let raw_count = source.snapshot();
        self.update(raw_count)
    }

    /// Accumulated position in ticks.
    #[inline]
    pub fn read(&self) -> i64 {
        self.position
    }

    /// Reset the position to zero. The last raw sample is kept, so the next
    /// update still measures motion from where the counter really was.
    pub fn zero(&mut self) {
        self.position = 0;
    }

    /// Corrected delta from the most recent update.
    pub fn delta(&self) -> i64 {
        self.delta
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    pub fn last_raw_count(&self) -> u32 {
        self.last_raw_count
    }
}

impl Default for EncoderTracker {
    fn default() -> Self {
        Self::sixteen_bit()
    }
}
