//! # Synchronization Primitives
//!
//! State shared between interrupt handlers and the host loop.
//!
//! Task-to-task data goes through [`crate::share`], which needs no locking
//! because tasks never preempt each other. The millisecond tick is different:
//! SysTick writes it from interrupt context while the host loop reads it, and
//! a 64-bit value cannot be read atomically on a Cortex-M4. Both sides
//! therefore go through a `critical_section::Mutex`.

use core::cell::Cell;

use critical_section::Mutex;

use crate::kernel::Clock;
use crate::task::Millis;

/// Millisecond tick counter, advanced from an interrupt handler.
///
/// Declared as a `static` and shared by reference; `new` is `const` for
/// that reason.
pub struct TickCounter {
    ticks: Mutex<Cell<Millis>>,
}

impl TickCounter {
    pub const fn new() -> Self {
        Self {
            ticks: Mutex::new(Cell::new(0)),
        }
    }

    /// Add one tick. Called once per SysTick interrupt.
    #[inline]
    pub fn advance(&self) {
        critical_section::with(|cs| {
            let ticks = self.ticks.borrow(cs);
            ticks.set(ticks.get().wrapping_add(1));
        });
    }

    /// Ticks since boot, read as one consistent snapshot.
    #[inline]
    pub fn now(&self) -> Millis {
        critical_section::with(|cs| self.ticks.borrow(cs).get())
    }
}

impl Default for TickCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TickCounter {
    fn now(&self) -> Millis {
        TickCounter::now(self)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    static TICKS: TickCounter = TickCounter::new();

    #[test]
    fn test_tick_counter_advances() {
        let ticks = TickCounter::new();
        assert_eq!(ticks.now(), 0);
        for _ in 0..1500 {
            ticks.advance();
        }
        assert_eq!(ticks.now(), 1500);
        assert_eq!(Clock::now(&ticks), 1500);
    }

    #[test]
    fn test_static_counter_across_threads() {
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..250 {
                        TICKS.advance();
                    }
                });
            }
        });
        assert_eq!(TICKS.now(), 1000);
    }
}
