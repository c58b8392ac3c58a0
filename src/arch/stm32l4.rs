//! # STM32L476 Peripheral Adapters
//!
//! Thin register-level wrappers that put the board's peripherals behind the
//! crate's seams:
//!
//! | Peripheral         | Adapter          | Seam                         |
//! |--------------------|------------------|------------------------------|
//! | TIM4, TIM8 (enc.)  | [`TimerCounter`] | [`CounterSource`]            |
//! | TIM3, TIM5 CH1/CH2 | [`TimerPwm`]     | `embedded_hal` `SetDutyCycle`|
//! | USART2 TX          | [`UsartTx`]      | `core::fmt::Write`           |
//! | USART2 RX          | [`UsartRx`]      | [`StopSignal`]               |
//! | USART2 (prompts)   | [`Console`]      | [`LineEditor`]               |
//!
//! Clocks, GPIO alternate functions, timer modes and the baud rate are set
//! up by board bring-up before these are constructed. The adapters only
//! touch the data registers listed below, so they never disturb that setup.
//!
//! Register offsets are from RM0351 (STM32L4x5/L4x6 reference manual).

use core::convert::Infallible;
use core::fmt;
use core::ptr::{read_volatile, write_volatile};

use embedded_hal::pwm::{ErrorType, SetDutyCycle};
use heapless::Deque;

use crate::config::CONSOLE_RX_BUFFER;
use crate::console::{Edit, LineEditor};
use crate::encoder::CounterSource;
use crate::kernel::{Clock, StopSignal};
use crate::task::Millis;

// ---------------------------------------------------------------------------
// Memory map
// ---------------------------------------------------------------------------

pub const TIM3_BASE: usize = 0x4000_0400;
pub const TIM4_BASE: usize = 0x4000_0800;
pub const TIM5_BASE: usize = 0x4000_0C00;
pub const TIM8_BASE: usize = 0x4001_3400;
pub const USART2_BASE: usize = 0x4000_4400;

const TIM_CNT: usize = 0x24;
const TIM_ARR: usize = 0x2C;
const TIM_CCR1: usize = 0x34;
const TIM_CCR2: usize = 0x38;

const USART_ISR: usize = 0x1C;
const USART_ICR: usize = 0x20;
const USART_RDR: usize = 0x24;
const USART_TDR: usize = 0x28;

const ISR_ORE: u32 = 1 << 3;
const ISR_RXNE: u32 = 1 << 5;
const ISR_TXE: u32 = 1 << 7;
const ICR_ORECF: u32 = 1 << 3;

/// # Safety
/// `base + offset` must be a readable peripheral register.
#[inline(always)]
unsafe fn read_reg(base: usize, offset: usize) -> u32 {
    read_volatile((base + offset) as *const u32)
}

/// # Safety
/// `base + offset` must be a writable peripheral register.
#[inline(always)]
unsafe fn write_reg(base: usize, offset: usize, value: u32) {
    write_volatile((base + offset) as *mut u32, value)
}

// ---------------------------------------------------------------------------
// Encoder counter
// ---------------------------------------------------------------------------

/// A timer running in encoder mode, read through its 16-bit counter.
pub struct TimerCounter {
    base: usize,
}

impl TimerCounter {
    /// # Safety
    /// `base` must be a general-purpose or advanced timer already configured
    /// in encoder mode with `ARR = 0xFFFF`, and no other code may use it.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }
}

impl CounterSource for TimerCounter {
    fn snapshot(&mut self) -> u32 {
        // SAFETY: `base` is a timer per `new`'s contract
        unsafe { read_reg(self.base, TIM_CNT) & 0xFFFF }
    }
}

// ---------------------------------------------------------------------------
// PWM channel
// ---------------------------------------------------------------------------

/// Capture/compare channel used for PWM output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareChannel {
    Ch1,
    Ch2,
}

impl CompareChannel {
    const fn offset(self) -> usize {
        match self {
            CompareChannel::Ch1 => TIM_CCR1,
            CompareChannel::Ch2 => TIM_CCR2,
        }
    }
}

/// One PWM output of a timer. Duty is the compare value against `ARR`.
pub struct TimerPwm {
    base: usize,
    channel: CompareChannel,
}

impl TimerPwm {
    /// # Safety
    /// `base` must be a timer with `channel` already in PWM mode 1 and its
    /// output enabled, and no other `TimerPwm` may drive the same channel.
    pub const unsafe fn new(base: usize, channel: CompareChannel) -> Self {
        Self { base, channel }
    }

    /// Both PWM outputs of one timer, as an H-bridge pair.
    ///
    /// # Safety
    /// Same contract as [`TimerPwm::new`], for both channels.
    pub const unsafe fn pair(base: usize) -> (Self, Self) {
        (
            Self::new(base, CompareChannel::Ch1),
            Self::new(base, CompareChannel::Ch2),
        )
    }
}

impl ErrorType for TimerPwm {
    type Error = Infallible;
}

impl SetDutyCycle for TimerPwm {
    fn max_duty_cycle(&self) -> u16 {
        // SAFETY: `base` is a timer per `new`'s contract
        let arr = unsafe { read_reg(self.base, TIM_ARR) };
        // TIM5 has a 32-bit ARR; duty resolution is capped at 16 bits
        arr.min(u32::from(u16::MAX)) as u16
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        // SAFETY: `base` is a timer per `new`'s contract
        unsafe { write_reg(self.base, self.channel.offset(), u32::from(duty)) };
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// USART
// ---------------------------------------------------------------------------

/// Split an enabled USART into its transmit and receive halves.
///
/// # Safety
/// `base` must be a USART with TE, RE and UE set, and this may be called
/// at most once per USART.
pub const unsafe fn usart(base: usize) -> (UsartTx, UsartRx) {
    (
        UsartTx { base },
        UsartRx {
            base,
            pending: Deque::new(),
        },
    )
}

/// Transmit half. Writes block until each byte is accepted.
pub struct UsartTx {
    base: usize,
}

impl UsartTx {
    pub fn write_byte(&mut self, byte: u8) {
        while !self.ready() {}
        self.send(byte);
    }

    fn ready(&self) -> bool {
        // SAFETY: `base` is an enabled USART per `usart`'s contract
        unsafe { read_reg(self.base, USART_ISR) & ISR_TXE != 0 }
    }

    fn send(&mut self, byte: u8) {
        // SAFETY: `base` is an enabled USART per `usart`'s contract
        unsafe { write_reg(self.base, USART_TDR, u32::from(byte)) }
    }
}

impl fmt::Write for UsartTx {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
        Ok(())
    }
}

/// Receive half. Never blocks.
///
/// Bytes picked up by a [`Console`] while it was transmitting are buffered
/// and handed out before anything still in the data register.
pub struct UsartRx {
    base: usize,
    pending: Deque<u8, CONSOLE_RX_BUFFER>,
}

impl UsartRx {
    /// The next received byte, if one is waiting.
    pub fn read_byte(&mut self) -> Option<u8> {
        self.pending.pop_front().or_else(|| self.receive())
    }

    /// Discard input until none has arrived for `quiet_ms`. Returns the
    /// number of bytes thrown away.
    pub fn settle(&mut self, clock: &impl Clock, quiet_ms: u32) -> usize {
        let mut discarded = 0;
        let mut quiet_since = clock.now();
        while clock.now().saturating_sub(quiet_since) < Millis::from(quiet_ms) {
            if self.read_byte().is_some() {
                discarded += 1;
                quiet_since = clock.now();
            }
        }
        discarded
    }

    fn receive(&mut self) -> Option<u8> {
        // SAFETY: `base` is an enabled USART per `usart`'s contract
        unsafe {
            let isr = read_reg(self.base, USART_ISR);
            if isr & ISR_ORE != 0 {
                // An overrun stalls reception until cleared
                write_reg(self.base, USART_ICR, ICR_ORECF);
                warn!("usart: receive overrun");
            }
            if isr & ISR_RXNE != 0 {
                Some(read_reg(self.base, USART_RDR) as u8)
            } else {
                None
            }
        }
    }

    /// Move a waiting byte, if any, into the buffer.
    fn poll(&mut self) {
        if let Some(byte) = self.receive() {
            if self.pending.push_back(byte).is_err() {
                warn!("usart: receive buffer full");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Operator console
// ---------------------------------------------------------------------------

/// Both USART halves, used for the interactive prompts before the run.
///
/// Transmission keeps draining the receiver, so input typed (or sent by a
/// script) while a prompt is going out is not lost to an overrun.
pub struct Console {
    tx: UsartTx,
    rx: UsartRx,
}

impl Console {
    pub fn new(tx: UsartTx, rx: UsartRx) -> Self {
        Self { tx, rx }
    }

    pub fn into_parts(self) -> (UsartTx, UsartRx) {
        (self.tx, self.rx)
    }

    /// Block until `editor` finishes a line, echoing the edits.
    pub fn read_line<'e, const N: usize>(&mut self, editor: &'e mut LineEditor<N>) -> &'e str {
        editor.clear();
        loop {
            let Some(byte) = self.rx.read_byte() else {
                continue;
            };
            match editor.feed(byte) {
                Edit::Ignored => {}
                Edit::Echo(b) => self.write_byte(b),
                Edit::Erase => self.write_bytes(b"\x08 \x08"),
                Edit::Done => {
                    self.write_bytes(b"\r\n");
                    return editor.line();
                }
            }
        }
    }

    fn write_byte(&mut self, byte: u8) {
        while !self.tx.ready() {
            self.rx.poll();
        }
        self.tx.send(byte);
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.write_byte(byte);
        }
    }
}

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

impl StopSignal for UsartRx {
    /// Any byte at all ends the run.
    fn stop_requested(&mut self) -> bool {
        self.read_byte().is_some()
    }
}
