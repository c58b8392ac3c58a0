//! # Task Model
//!
//! A task is a resumable, state-holding value that the scheduler invokes
//! once per period. Each invocation runs the body to completion and returns;
//! whatever the task must remember between periods lives in its own fields.
//!
//! There is no preemption. A body that never returns starves every other
//! task, and nothing here detects it. Bodies must stay short and
//! non-blocking.

use crate::config::ConfigError;

/// Scheduler time, in milliseconds since boot.
pub type Millis = u64;

// ---------------------------------------------------------------------------
// Task trait
// ---------------------------------------------------------------------------

/// A unit of periodic work.
pub trait Task {
    /// Run one period's worth of work. `now` is the dispatch time.
    fn run(&mut self, now: Millis);

    /// Called once when the scheduler shuts down.
    fn on_stop(&mut self) {}
}

impl<F> Task for F
where
    F: FnMut(Millis),
{
    fn run(&mut self, now: Millis) {
        self(now)
    }
}

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a scheduled task.
///
/// ```text
///   ┌──────────┐     dispatch()      ┌─────────┐
///   │   Idle   │ ──────────────────► │ Running │
///   └──────────┘                     └─────────┘
///        ▲            body returns        │
///        └────────────────────────────────┘
///        │
///        │ shutdown()                ┌─────────┐
///        └─────────────────────────► │ Stopped │
///                                    └─────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskState {
    /// Waiting for its next due time.
    Idle,
    /// Body is executing.
    Running,
    /// Scheduler has shut down; the task will not run again.
    Stopped,
}

// ---------------------------------------------------------------------------
// Task configuration (immutable after registration)
// ---------------------------------------------------------------------------

/// Static scheduling parameters, fixed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskConfig {
    /// Name used in diagnostics.
    pub name: &'static str,

    /// Higher runs first when several tasks are due. Range: 0–255.
    pub priority: u8,

    /// Interval between due times, in milliseconds. Must be non-zero.
    pub period_ms: u32,
}

impl TaskConfig {
    pub const fn new(name: &'static str, priority: u8, period_ms: u32) -> Self {
        Self {
            name,
            priority,
            period_ms,
        }
    }

    /// Reject a zero period.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period_ms == 0 {
            return Err(ConfigError::ZeroPeriod);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Run statistics
// ---------------------------------------------------------------------------

/// Per-task counters, kept across shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskStats {
    /// Completed dispatches.
    pub runs: u32,

    /// Dispatches that started a full period or more after the due time.
    pub late_runs: u32,

    /// Largest `now - next_due` seen at dispatch, in milliseconds.
    pub max_lateness_ms: u64,

    /// Longest body run time, in whole milliseconds. Only timed dispatches
    /// (see `Scheduler::dispatch_timed`) contribute.
    pub max_run_ms: u64,

    /// Sum of timed body run times, in milliseconds.
    pub total_run_ms: u64,
}

impl TaskStats {
    pub const fn new() -> Self {
        Self {
            runs: 0,
            late_runs: 0,
            max_lateness_ms: 0,
            max_run_ms: 0,
            total_run_ms: 0,
        }
    }

    /// Mean timed run time over all runs, in milliseconds.
    pub fn mean_run_ms(&self) -> u64 {
        match self.runs {
            0 => 0,
            runs => self.total_run_ms / u64::from(runs),
        }
    }

    fn record(&mut self, lateness_ms: u64, period_ms: u32) {
        self.runs = self.runs.wrapping_add(1);
        if lateness_ms >= u64::from(period_ms) {
            self.late_runs = self.late_runs.wrapping_add(1);
        }
        if lateness_ms > self.max_lateness_ms {
            self.max_lateness_ms = lateness_ms;
        }
    }

    fn record_run_time(&mut self, run_ms: u64) {
        self.total_run_ms = self.total_run_ms.saturating_add(run_ms);
        self.max_run_ms = self.max_run_ms.max(run_ms);
    }
}

// ---------------------------------------------------------------------------
// Scheduled task
// ---------------------------------------------------------------------------

/// A registered task: its body plus the scheduler's bookkeeping for it.
pub struct ScheduledTask<'a> {
    config: TaskConfig,
    next_due: Millis,
    state: TaskState,
    stats: TaskStats,
    body: &'a mut (dyn Task + 'a),
}

impl<'a> ScheduledTask<'a> {
    /// First due at `start`.
    pub fn new(config: TaskConfig, body: &'a mut (dyn Task + 'a), start: Millis) -> Self {
        Self {
            config,
            next_due: start,
            state: TaskState::Idle,
            stats: TaskStats::new(),
            body,
        }
    }

    /// Idle and due at or before `now`.
    #[inline]
    pub fn is_ready(&self, now: Millis) -> bool {
        self.state == TaskState::Idle && self.next_due <= now
    }

    /// Run the body once and advance the due time by exactly one period.
    ///
    /// The advance is from the previous due time, not from `now`, so the
    /// schedule does not drift. A task that fell several periods behind is
    /// due again immediately and catches up one run per dispatch.
    pub(crate) fn dispatch(&mut self, now: Millis) {
        let lateness = now.saturating_sub(self.next_due);
        self.stats.record(lateness, self.config.period_ms);

        self.state = TaskState::Running;
        self.body.run(now);
        self.state = TaskState::Idle;

        self.next_due += Millis::from(self.config.period_ms);
    }

    /// Account `run_ms` to the body run that just finished.
    pub(crate) fn record_run_time(&mut self, run_ms: u64) {
        self.stats.record_run_time(run_ms);
    }

    /// Call the stop hook and park the task. Idempotent.
    pub(crate) fn stop(&mut self) {
        if self.state != TaskState::Stopped {
            self.body.on_stop();
            self.state = TaskState::Stopped;
        }
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }

    pub fn priority(&self) -> u8 {
        self.config.priority
    }

    pub fn next_due(&self) -> Millis {
        self.next_due
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn stats(&self) -> &TaskStats {
        &self.stats
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        runs: u32,
        last_now: Millis,
        stopped: u32,
    }

    impl Task for Counter {
        fn run(&mut self, now: Millis) {
            self.runs += 1;
            self.last_now = now;
        }

        fn on_stop(&mut self) {
            self.stopped += 1;
        }
    }

    fn counter() -> Counter {
        Counter {
            runs: 0,
            last_now: 0,
            stopped: 0,
        }
    }

    #[test]
    fn test_task_initialization() {
        let mut body = counter();
        let task = ScheduledTask::new(TaskConfig::new("ctrl", 2, 10), &mut body, 5);

        assert_eq!(task.state(), TaskState::Idle);
        assert_eq!(task.name(), "ctrl");
        assert_eq!(task.priority(), 2);
        assert_eq!(task.next_due(), 5);
        assert_eq!(task.stats(), &TaskStats::new());
        assert!(!task.is_ready(4));
        assert!(task.is_ready(5));
        assert!(task.is_ready(6));
    }

    #[test]
    fn test_dispatch_advances_from_due_time() {
        let mut body = counter();
        {
            let mut task = ScheduledTask::new(TaskConfig::new("ctrl", 2, 10), &mut body, 0);

            // Dispatched 3 ms late: the next due time ignores the lateness
            task.dispatch(3);
            assert_eq!(task.next_due(), 10);
            assert_eq!(task.state(), TaskState::Idle);
            assert_eq!(task.stats().runs, 1);
            assert_eq!(task.stats().late_runs, 0);
            assert_eq!(task.stats().max_lateness_ms, 3);
        }
        assert_eq!(body.runs, 1);
        assert_eq!(body.last_now, 3);
    }

    #[test]
    fn test_late_run_accounting() {
        let mut body = counter();
        let mut task = ScheduledTask::new(TaskConfig::new("log", 1, 20), &mut body, 0);

        task.dispatch(19);
        assert_eq!(task.stats().late_runs, 0);

        // Due at 20, dispatched at 45: a full period behind
        task.dispatch(45);
        assert_eq!(task.stats().late_runs, 1);
        assert_eq!(task.stats().max_lateness_ms, 25);
        assert_eq!(task.next_due(), 40);
        assert!(task.is_ready(45));
    }

    #[test]
    fn test_run_time_accounting() {
        let mut body = counter();
        let mut task = ScheduledTask::new(TaskConfig::new("ctrl", 2, 10), &mut body, 0);
        assert_eq!(task.stats().mean_run_ms(), 0);

        task.dispatch(0);
        task.record_run_time(4);
        task.dispatch(10);
        task.record_run_time(1);
        task.dispatch(20);
        task.record_run_time(1);

        assert_eq!(task.stats().max_run_ms, 4);
        assert_eq!(task.stats().total_run_ms, 6);
        assert_eq!(task.stats().mean_run_ms(), 2);
    }

    #[test]
    fn test_stop_runs_hook_once() {
        let mut body = counter();
        {
            let mut task = ScheduledTask::new(TaskConfig::new("ctrl", 2, 10), &mut body, 0);
            task.dispatch(0);
            task.stop();
            task.stop();

            assert_eq!(task.state(), TaskState::Stopped);
            assert!(!task.is_ready(1_000));
            // Stats survive the stop
            assert_eq!(task.stats().runs, 1);
        }
        assert_eq!(body.stopped, 1);
    }

    #[test]
    fn test_closure_is_a_task() {
        let mut seen: Millis = 0;
        {
            let mut body = |now: Millis| seen = now;
            let mut task = ScheduledTask::new(TaskConfig::new("closure", 0, 1), &mut body, 0);
            task.dispatch(42);
            // Default hook does nothing
            task.stop();
        }
        assert_eq!(seen, 42);
    }

    #[test]
    fn test_zero_period_rejected() {
        assert_eq!(
            TaskConfig::new("bad", 1, 0).validate(),
            Err(ConfigError::ZeroPeriod)
        );
        assert!(TaskConfig::new("ok", 1, 1).validate().is_ok());
    }
}
