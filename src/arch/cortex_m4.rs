//! # Cortex-M4 Port Layer
//!
//! Provides the scheduler's millisecond clock on an ARM Cortex-M4.
//!
//! ## Tick Source
//!
//! SysTick counts down from `SYSTEM_CLOCK_HZ / TICK_HZ - 1` on the core
//! clock and raises its exception at `TICK_HZ`. The handler does one thing:
//! advance [`TICKS`]. Everything else, dispatch included, happens in thread
//! mode, so the only state shared with an interrupt is the tick counter.
//!
//! ## Interrupt Priorities
//!
//! SysTick keeps its reset priority (0, highest configurable). The handler
//! is a few instructions inside a critical section, so it never delays
//! other interrupts by more than that.

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::SYST;
use cortex_m_rt::exception;

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::sync::TickCounter;
use crate::task::Millis;

/// Milliseconds since `configure_systick`. Written only by the SysTick
/// exception.
pub static TICKS: TickCounter = TickCounter::new();

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure SysTick to fire at `TICK_HZ` from the processor clock.
///
/// # Parameters
/// - `syst`: the SysTick peripheral, taken from `cortex_m::Peripherals`
pub fn configure_systick(syst: &mut SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
    debug!("systick: reload {} for {} Hz", reload, TICK_HZ);
}

/// The scheduler clock.
#[inline]
pub fn clock() -> &'static TickCounter {
    &TICKS
}

/// Current time, in milliseconds since SysTick was started.
#[inline]
pub fn now() -> Millis {
    TICKS.now()
}

/// Sleep until the next interrupt. Used once the kernel has stopped.
#[inline]
pub fn idle() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

#[exception]
fn SysTick() {
    TICKS.advance();
}
