//! # Telemetry
//!
//! Position records travel from a control loop to a byte sink as text lines:
//!
//! ```text
//! <elapsed_ms>,<position_ticks>\r\n
//! ```
//!
//! `elapsed_ms` counts from the start of the loop's capture window and
//! `position_ticks` is the unwrapped encoder position. Host tooling splits on
//! the comma, so the record has exactly these two fields.
//!
//! The control loop only formats and enqueues. A lower-priority
//! [`TelemetryLogger`] drains the queue into the sink when the control loops
//! are idle, so a slow serial port never delays a control period.

use core::fmt::Write;

use heapless::String;

use crate::config::{TELEMETRY_DEPTH, TELEMETRY_LINE_LEN};
use crate::share::Queue;
use crate::task::{Millis, Task};

/// One formatted record, terminator included.
pub type TelemetryLine = String<TELEMETRY_LINE_LEN>;

/// Queue carrying records from a control loop to the logger.
pub type TelemetryQueue = Queue<TelemetryLine, TELEMETRY_DEPTH>;

/// Format one record.
///
/// Fails only if the line does not fit, which `TELEMETRY_LINE_LEN` rules out
/// for any `u32`/`i64` pair.
pub fn format_record(elapsed_ms: u32, position: i64) -> Result<TelemetryLine, core::fmt::Error> {
    let mut line = TelemetryLine::new();
    write!(line, "{},{}\r\n", elapsed_ms, position)?;
    Ok(line)
}

/// Task that moves queued records into a text sink.
///
/// Each run drains everything queued at that moment. A line the sink rejects
/// is counted and dropped; the logger carries on with the next one.
pub struct TelemetryLogger<'a, W> {
    queue: &'a TelemetryQueue,
    sink: W,
    written: u32,
    failed: u32,
}

impl<'a, W: Write> TelemetryLogger<'a, W> {
    pub fn new(queue: &'a TelemetryQueue, sink: W) -> Self {
        Self {
            queue,
            sink,
            written: 0,
            failed: 0,
        }
    }

    /// Move every queued line into the sink. Returns the number moved.
    pub fn drain(&mut self) -> usize {
        let mut moved = 0;
        while let Ok(line) = self.queue.get() {
            moved += 1;
            match self.sink.write_str(&line) {
                Ok(()) => self.written = self.written.wrapping_add(1),
                Err(_) => self.failed = self.failed.wrapping_add(1),
            }
        }
        moved
    }

    /// Lines written successfully.
    pub fn written(&self) -> u32 {
        self.written
    }

    /// Lines the sink refused.
    pub fn failed(&self) -> u32 {
        self.failed
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }

    pub fn into_sink(self) -> W {
        self.sink
    }
}

impl<W: Write> Task for TelemetryLogger<'_, W> {
    fn run(&mut self, _now: Millis) {
        let moved = self.drain();
        if moved > 0 {
            trace!("telemetry: {} lines from '{}'", moved, self.queue.name());
        }
    }

    fn on_stop(&mut self) {
        // Flush what the loops queued before the stop
        self.drain();
        if self.queue.dropped() > 0 {
            warn!(
                "telemetry '{}' dropped {} lines (max depth {})",
                self.queue.name(),
                self.queue.dropped(),
                self.queue.max_full()
            );
        }
        debug!(
            "telemetry: {} lines written, {} failed",
            self.written,
            self.failed
        );
    }
}
