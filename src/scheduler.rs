//! # Scheduler
//!
//! Cooperative, priority-ordered dispatcher for periodic tasks.
//!
//! ## Scheduling Algorithm
//!
//! On every call to [`Scheduler::dispatch`]:
//! 1. **Collect**: every Idle task with `next_due <= now` is ready
//! 2. **Select**: the ready task with the highest priority wins. Ties go to
//!    the task registered first
//! 3. **Run**: the winner's body runs to completion, then its `next_due`
//!    advances by one period
//!
//! At most one task runs per call. The host calls `dispatch` in a hot loop
//! (see [`crate::kernel::run`]), so several tasks due in the same
//! millisecond run on consecutive calls, highest priority first.
//!
//! ## Starvation
//!
//! There is no preemption and no aging. A high-priority task that is always
//! due keeps lower-priority tasks waiting indefinitely, and a body that
//! never returns blocks everything. Periods and body run times must leave
//! idle time for the lowest priority.

use heapless::Vec;
use thiserror::Error;

use crate::config::{ConfigError, MAX_TASKS};
use crate::kernel::Clock;
use crate::task::{Millis, ScheduledTask, Task, TaskConfig};

/// Registration failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchedulerError {
    /// The fixed task table has no free slot.
    #[error("task table is full")]
    TaskListFull,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// Registry of periodic tasks, held inline (no heap).
///
/// Task ids are registration indices. Bodies are borrowed for `'a`, so the
/// caller keeps ownership and can inspect them once the scheduler is gone.
pub struct Scheduler<'a, const N: usize = MAX_TASKS> {
    tasks: Vec<ScheduledTask<'a>, N>,
    dispatches: u64,
    stopped: bool,
}

impl<'a, const N: usize> Scheduler<'a, N> {
    pub const fn new() -> Self {
        Self {
            tasks: Vec::new(),
            dispatches: 0,
            stopped: false,
        }
    }

    /// Register a task whose first due time is `start`.
    ///
    /// # Returns
    /// - `Ok(task_id)`: the task's index, in registration order
    /// - `Err(SchedulerError::Config)`: zero period
    /// - `Err(SchedulerError::TaskListFull)`: `N` tasks already registered
    pub fn add(
        &mut self,
        config: TaskConfig,
        body: &'a mut (dyn Task + 'a),
        start: Millis,
    ) -> Result<usize, SchedulerError> {
        config.validate()?;

        let id = self.tasks.len();
        self.tasks
            .push(ScheduledTask::new(config, body, start))
            .map_err(|_| SchedulerError::TaskListFull)?;

        debug!(
            "task {} '{}' registered: priority {}, period {} ms",
            id, config.name, config.priority, config.period_ms
        );
        Ok(id)
    }

    /// The task that would run at `now`, without running it.
    ///
    /// Strict `>` keeps the earliest registered task among equal priorities.
    pub fn select(&self, now: Millis) -> Option<usize> {
        let mut best: Option<(usize, u8)> = None;

        for (id, task) in self.tasks.iter().enumerate() {
            if !task.is_ready(now) {
                continue;
            }
            match best {
                Some((_, priority)) if task.priority() <= priority => {}
                _ => best = Some((id, task.priority())),
            }
        }

        best.map(|(id, _)| id)
    }

    /// Run at most one due task.
    ///
    /// # Returns
    /// The id of the task that ran, or `None` if nothing was due (or the
    /// scheduler has been shut down).
    pub fn dispatch(&mut self, now: Millis) -> Option<usize> {
        if self.stopped {
            return None;
        }

        let id = self.select(now)?;
        trace!("dispatch task {} at {} ms", id, now);
        self.tasks[id].dispatch(now);
        self.dispatches = self.dispatches.wrapping_add(1);
        Some(id)
    }

    /// [`Scheduler::dispatch`] at `clock.now()`, also recording how long
    /// the body ran in the task's statistics.
    pub fn dispatch_timed(&mut self, clock: &impl Clock) -> Option<usize> {
        let start = clock.now();
        let id = self.dispatch(start)?;
        let run_ms = clock.now().saturating_sub(start);
        self.tasks[id].record_run_time(run_ms);
        Some(id)
    }

    /// Call every task's stop hook once and stop dispatching.
    ///
    /// Task bodies and statistics are left intact for inspection.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        for task in self.tasks.iter_mut() {
            task.stop();
        }
        self.stopped = true;
        info!("scheduler stopped after {} dispatches", self.dispatches);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn task(&self, id: usize) -> Option<&ScheduledTask<'a>> {
        self.tasks.get(id)
    }

    pub fn tasks(&self) -> &[ScheduledTask<'a>] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Total dispatches since creation.
    pub fn dispatches(&self) -> u64 {
        self.dispatches
    }
}

impl<const N: usize> Default for Scheduler<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
