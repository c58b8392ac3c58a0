//! # Kernel
//!
//! The host loop that drives a [`Scheduler`] until told to stop.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► arch::cortex_m4::configure_systick()  ← start the ms clock
//!         ├─► build channels, loops, logger
//!         ├─► Scheduler::add()  (×N)                 ← register tasks
//!         └─► kernel::run()                          ← dispatch until stop
//!               ├─► Scheduler::dispatch_timed(clock)  (hot loop)
//!               ├─► StopSignal::stop_requested()     (between dispatches)
//!               └─► Scheduler::shutdown()            ← on_stop hooks
//! ```
//!
//! The clock and the stop signal are traits so the same loop runs against
//! SysTick and a USART on the board, and against plain counters in tests.

use crate::scheduler::Scheduler;
use crate::task::Millis;

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Monotonic millisecond time source.
pub trait Clock {
    fn now(&self) -> Millis;
}

/// External request to end the host loop.
pub trait StopSignal {
    /// Polled between dispatches. Must not block.
    fn stop_requested(&mut self) -> bool;
}

impl<F> StopSignal for F
where
    F: FnMut() -> bool,
{
    fn stop_requested(&mut self) -> bool {
        self()
    }
}

// ---------------------------------------------------------------------------
// Host loop
// ---------------------------------------------------------------------------

/// What happened during [`run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RunSummary {
    /// Task bodies executed.
    pub dispatches: u64,
    /// Loop iterations, including those where nothing was due.
    pub polls: u64,
    /// Clock reading when the stop signal was seen.
    pub stopped_at: Millis,
}

/// Dispatch due tasks until `stop` fires, then shut the scheduler down.
///
/// The stop signal is checked before every dispatch, so a task that is due
/// at the moment the signal arrives does not run. Task state is left intact
/// and stays readable through the scheduler afterwards.
pub fn run<const N: usize>(
    scheduler: &mut Scheduler<'_, N>,
    clock: &impl Clock,
    stop: &mut impl StopSignal,
) -> RunSummary {
    info!("kernel running {} tasks", scheduler.len());

    let mut dispatches: u64 = 0;
    let mut polls: u64 = 0;

    let stopped_at = loop {
        if stop.stop_requested() {
            break clock.now();
        }
        polls = polls.wrapping_add(1);
        if scheduler.dispatch_timed(clock).is_some() {
            dispatches = dispatches.wrapping_add(1);
        }
    };

    scheduler.shutdown();
    info!("stop requested at {} ms", stopped_at);

    RunSummary {
        dispatches,
        polls,
        stopped_at,
    }
}

/// Log per-task statistics.
pub fn report<const N: usize>(scheduler: &Scheduler<'_, N>) {
    for task in scheduler.tasks() {
        let stats = task.stats();
        info!(
            "{}: {} runs, {} late, worst lateness {} ms, run time mean {} ms worst {} ms",
            task.name(),
            stats.runs,
            stats.late_runs,
            stats.max_lateness_ms,
            stats.mean_run_ms(),
            stats.max_run_ms
        );
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
