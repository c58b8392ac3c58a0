//! # Control Loop
//!
//! One closed position loop per motor, run as a scheduler task:
//!
//! ```text
//!  Share<f32> gain ─┐        Share<i32> setpoint
//!                   ▼               │
//!  counter ──► EncoderTracker ──► Controller ──► MotorActuator ──► H-bridge
//!                   │
//!                   └──► "<elapsed_ms>,<position>\r\n" ──► TelemetryQueue
//! ```
//!
//! Every period the loop takes one counter snapshot, runs the proportional
//! law against the latest setpoint and gain, drives the motor and, if it has
//! a telemetry queue, records the position. The loop owns its counter,
//! encoder state, controller and motor outright; nothing else touches them.

use embedded_hal::pwm::SetDutyCycle;

use crate::controller::Controller;
use crate::encoder::{CounterSource, EncoderTracker};
use crate::motor::{DriveError, MotorActuator};
use crate::share::Share;
use crate::task::{Millis, Task};
use crate::telemetry::{format_record, TelemetryQueue};

/// Closed position loop for one motor.
pub struct ControlLoop<'a, C, A, B> {
    name: &'static str,
    counter: C,
    encoder: EncoderTracker,
    controller: Controller,
    motor: MotorActuator<A, B>,
    setpoint: &'a Share<i32>,
    gain: &'a Share<f32>,
    telemetry: Option<&'a TelemetryQueue>,
    capture_ms: Option<u32>,
    start_time: Option<Millis>,
    faults: u32,
    last_fault: Option<DriveError>,
}

impl<'a, C, A, B> ControlLoop<'a, C, A, B>
where
    C: CounterSource,
    A: SetDutyCycle,
    B: SetDutyCycle,
{
    /// Build a loop over a 16-bit encoder counter.
    ///
    /// The counter is sampled once here so that position zero is wherever
    /// the shaft sits at construction. Until something is put into
    /// `setpoint` or `gain`, the controller's own values are used.
    pub fn new(
        name: &'static str,
        counter: C,
        controller: Controller,
        motor: MotorActuator<A, B>,
        setpoint: &'a Share<i32>,
        gain: &'a Share<f32>,
    ) -> Self {
        let mut control = Self {
            name,
            counter,
            encoder: EncoderTracker::sixteen_bit(),
            controller,
            motor,
            setpoint,
            gain,
            telemetry: None,
            capture_ms: None,
            start_time: None,
            faults: 0,
            last_fault: None,
        };
        control.zero();
        control
    }

    /// Replace the encoder tracker, for counters that do not wrap at 2^16.
    pub fn with_encoder(mut self, encoder: EncoderTracker) -> Self {
        self.encoder = encoder;
        self.zero();
        self
    }

    /// Record positions into `queue`. With `capture_ms`, only the first
    /// `capture_ms` milliseconds after the loop starts are recorded.
    pub fn with_telemetry(mut self, queue: &'a TelemetryQueue, capture_ms: Option<u32>) -> Self {
        self.telemetry = Some(queue);
        self.capture_ms = capture_ms;
        self
    }

    /// One control period: sample, compute, drive, record.
    ///
    /// Telemetry is recorded even when the motor write fails, since the
    /// position reading is still valid.
    pub fn step(&mut self, now: Millis) -> Result<i32, DriveError> {
        if let Some(gain) = self.gain.get() {
            self.controller.set_gain(gain);
        }
        let setpoint = self.setpoint.get_or(self.controller.setpoint());

        self.encoder.sample(&mut self.counter);
        let position = self.encoder.read();
        let measured = position.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;

        let actuation = self.controller.run(setpoint, measured);
        let drive = self.motor.set_duty_cycle(actuation);

        let start = *self.start_time.get_or_insert(now);
        self.record(now.saturating_sub(start), position);

        drive.map(|()| actuation)
    }

    /// Restart from position zero at the current counter value, and
    /// restart the capture window at the next step.
    pub fn zero(&mut self) {
        self.encoder.sample(&mut self.counter);
        self.encoder.zero();
        self.start_time = None;
    }

    fn record(&mut self, elapsed: Millis, position: i64) {
        let Some(queue) = self.telemetry else {
            return;
        };
        if let Some(window) = self.capture_ms {
            if elapsed >= Millis::from(window) {
                return;
            }
        }

        let elapsed = u32::try_from(elapsed).unwrap_or(u32::MAX);
        match format_record(elapsed, position) {
            Ok(line) => {
                if queue.put(line).is_some() {
                    trace!("{}: telemetry queue full", self.name);
                }
            }
            Err(_) => warn!("{}: telemetry record too long", self.name),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Unwrapped position in ticks.
    pub fn position(&self) -> i64 {
        self.encoder.read()
    }

    pub fn encoder(&self) -> &EncoderTracker {
        &self.encoder
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn motor(&self) -> &MotorActuator<A, B> {
        &self.motor
    }

    /// Motor writes that failed since construction.
    pub fn faults(&self) -> u32 {
        self.faults
    }

    pub fn last_fault(&self) -> Option<DriveError> {
        self.last_fault
    }
}

impl<C, A, B> Task for ControlLoop<'_, C, A, B>
where
    C: CounterSource,
    A: SetDutyCycle,
    B: SetDutyCycle,
{
    fn run(&mut self, now: Millis) {
        if let Err(e) = self.step(now) {
            self.faults = self.faults.wrapping_add(1);
            self.last_fault = Some(e);
            warn!("{}: {}", self.name, e);
        }
    }

    /// Leave the motor de-energized.
    fn on_stop(&mut self) {
        match self.motor.stop() {
            Ok(()) => info!(
                "{}: stopped at position {} ({} faults)",
                self.name,
                self.encoder.read(),
                self.faults
            ),
            Err(e) => error!("{}: could not stop motor: {}", self.name, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    use crate::config::{ControllerConfig, DEFAULT_GAIN, DEFAULT_SETPOINT, ENCODER_PERIOD};
    use crate::kernel::{self, Clock};
    use crate::motor::tests::FakePwm;
    use crate::motor::Channel;
    use crate::scheduler::Scheduler;
    use crate::share::{Overflow, Queue};
    use crate::task::TaskConfig;
    use crate::telemetry::TelemetryLogger;
    use embedded_hal::pwm::{ErrorKind, ErrorType};

    /// DC motor and encoder: each `advance` moves the shaft two ticks per
    /// percent of net duty.
    struct Plant {
        position: Cell<i64>,
        duty_a: Cell<u16>,
        duty_b: Cell<u16>,
        writes: Cell<u32>,
    }

    impl Plant {
        fn at(position: i64) -> Self {
            Self {
                position: Cell::new(position),
                duty_a: Cell::new(0),
                duty_b: Cell::new(0),
                writes: Cell::new(0),
            }
        }

        fn net_duty(&self) -> i64 {
            i64::from(FakePwm::percent(&self.duty_a)) - i64::from(FakePwm::percent(&self.duty_b))
        }

        fn advance(&self) {
            self.position.set(self.position.get() + 2 * self.net_duty());
        }

        fn counter(&self) -> SimCounter<'_> {
            SimCounter(&self.position)
        }

        fn motor(&self) -> MotorActuator<FakePwm<'_>, FakePwm<'_>> {
            MotorActuator::new(
                FakePwm { duty: &self.duty_a, writes: &self.writes },
                FakePwm { duty: &self.duty_b, writes: &self.writes },
            )
            .unwrap()
        }
    }

    /// 16-bit wrapping view of the plant's true position.
    struct SimCounter<'a>(&'a Cell<i64>);

    impl CounterSource for SimCounter<'_> {
        fn snapshot(&mut self) -> u32 {
            self.0.get().rem_euclid(i64::from(ENCODER_PERIOD)) as u32
        }
    }

    type SimLoop<'a> = ControlLoop<'a, SimCounter<'a>, FakePwm<'a>, FakePwm<'a>>;

    fn controller() -> Controller {
        Controller::new(ControllerConfig::new(DEFAULT_SETPOINT, DEFAULT_GAIN)).unwrap()
    }

    fn sim_loop<'a>(plant: &'a Plant, setpoint: &'a Share<i32>, gain: &'a Share<f32>) -> SimLoop<'a> {
        ControlLoop::new("motor", plant.counter(), controller(), plant.motor(), setpoint, gain)
    }

    fn simulate(control: &mut SimLoop<'_>, plant: &Plant, steps: u64) {
        for i in 0..steps {
            control.step(i * 10).unwrap();
            plant.advance();
        }
    }

    #[test]
    fn test_converges_to_setpoint() {
        let plant = Plant::at(0);
        let setpoint = Share::new("setpoint");
        let gain = Share::new("kp");
        setpoint.put(16_384);
        gain.put(0.1);

        let mut control = sim_loop(&plant, &setpoint, &gain);
        simulate(&mut control, &plant, 400);

        // Truncation leaves a deadband of under 10 ticks, approached from below
        let position = control.position();
        assert!((16_375..=16_384).contains(&position), "position {}", position);
        assert_eq!(position, plant.position.get());
        assert_eq!(control.controller().last_actuation(), 0);
        assert_eq!(plant.net_duty(), 0);
        assert_eq!(control.faults(), 0);
    }

    #[test]
    fn test_converges_backward_across_wrap() {
        let plant = Plant::at(0);
        let setpoint = Share::new("setpoint");
        let gain = Share::new("kp");
        setpoint.put(-1000);

        let mut control = sim_loop(&plant, &setpoint, &gain);
        simulate(&mut control, &plant, 100);

        let position = control.position();
        assert!((-1000..=-991).contains(&position), "position {}", position);
        // The raw counter wrapped below zero on the way
        assert!(control.encoder().last_raw_count() > 60_000);
        assert_eq!(plant.net_duty(), 0);
    }

    #[test]
    fn test_position_relative_to_start() {
        let plant = Plant::at(70_000);
        let setpoint = Share::new("setpoint");
        let gain = Share::new("kp");
        setpoint.put(0);

        let mut control = sim_loop(&plant, &setpoint, &gain);
        assert_eq!(control.position(), 0);
        assert_eq!(control.step(0), Ok(0));

        plant.position.set(70_500);
        assert_eq!(control.step(10), Ok(-50));
        assert_eq!(control.position(), 500);
    }

    #[test]
    fn test_gain_update_takes_effect() {
        let plant = Plant::at(0);
        let setpoint = Share::new("setpoint");
        let gain = Share::new("kp");
        setpoint.put(200);
        gain.put(0.1);

        let mut control = sim_loop(&plant, &setpoint, &gain);
        assert_eq!(control.step(0), Ok(20));

        gain.put(0.25);
        assert_eq!(control.step(10), Ok(50));
        assert_eq!(control.controller().gain(), 0.25);
        assert_eq!(plant.net_duty(), 50);
    }

    #[test]
    fn test_controller_defaults_without_shares() {
        let plant = Plant::at(0);
        let setpoint = Share::new("setpoint");
        let gain = Share::new("kp");

        let mut control = sim_loop(&plant, &setpoint, &gain);
        // DEFAULT_SETPOINT with DEFAULT_GAIN saturates
        assert_eq!(control.step(0), Ok(100));
        assert_eq!(control.controller().setpoint(), DEFAULT_SETPOINT);
    }

    #[test]
    fn test_telemetry_capture_window() {
        let plant = Plant::at(0);
        let setpoint = Share::new("setpoint");
        let gain = Share::new("kp");
        let queue: TelemetryQueue = Queue::new("telemetry", Overflow::DropNewest);
        setpoint.put(1000);

        let mut control = sim_loop(&plant, &setpoint, &gain).with_telemetry(&queue, Some(30));

        // Loop starts at 500 ms; records are relative to that
        for now in [500, 510, 520, 530, 540] {
            control.step(now).unwrap();
            plant.advance();
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.get().unwrap().as_str(), "0,0\r\n");
        assert_eq!(queue.get().unwrap().as_str(), "10,200\r\n");
        assert_eq!(queue.get().unwrap().as_str(), "20,360\r\n");

        // Zeroing restarts both the position and the window
        control.zero();
        control.step(900).unwrap();
        assert_eq!(queue.get().unwrap().as_str(), "0,0\r\n");
    }

    /// Channel that fails every write while `fail` is set.
    struct FlakyPwm<'a> {
        fail: &'a Cell<bool>,
    }

    impl ErrorType for FlakyPwm<'_> {
        type Error = ErrorKind;
    }

    impl SetDutyCycle for FlakyPwm<'_> {
        fn max_duty_cycle(&self) -> u16 {
            100
        }

        fn set_duty_cycle(&mut self, _duty: u16) -> Result<(), Self::Error> {
            if self.fail.get() {
                Err(ErrorKind::Other)
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_drive_fault_counted() {
        let plant = Plant::at(0);
        let setpoint = Share::new("setpoint");
        let gain = Share::new("kp");
        let queue: TelemetryQueue = Queue::new("telemetry", Overflow::DropNewest);
        let fail = Cell::new(false);

        let motor = MotorActuator::new(FlakyPwm { fail: &fail }, FlakyPwm { fail: &fail }).unwrap();
        let mut control = ControlLoop::new("flaky", plant.counter(), controller(), motor, &setpoint, &gain)
            .with_telemetry(&queue, None);

        control.run(0);
        assert_eq!(control.faults(), 0);

        // Driving forward writes channel B low first, so B reports the fault
        fail.set(true);
        control.run(10);
        assert_eq!(control.faults(), 1);
        assert_eq!(
            control.last_fault(),
            Some(DriveError {
                channel: Channel::B,
                kind: ErrorKind::Other,
            })
        );
        // The position was still recorded
        assert_eq!(queue.len(), 2);

        // The next period runs normally
        fail.set(false);
        control.run(20);
        assert_eq!(control.faults(), 1);
    }

    #[test]
    fn test_stop_zeroes_motor() {
        let plant = Plant::at(0);
        let setpoint = Share::new("setpoint");
        let gain = Share::new("kp");
        setpoint.put(5000);

        let mut control = sim_loop(&plant, &setpoint, &gain);
        control.run(0);
        assert_eq!(plant.net_duty(), 100);

        control.on_stop();
        assert_eq!(plant.net_duty(), 0);
        assert_eq!(control.motor().level(), 0);
    }

    /// Clock that advances one millisecond per read.
    struct SteppingClock(Cell<Millis>);

    impl Clock for SteppingClock {
        fn now(&self) -> Millis {
            let now = self.0.get();
            self.0.set(now + 1);
            now
        }
    }

    #[test]
    fn test_full_system() {
        let plant = Plant::at(0);
        let setpoint = Share::new("motor1setpoint");
        let gain = Share::new("kp1");
        let queue: TelemetryQueue = Queue::new("telemetry", Overflow::DropNewest);
        setpoint.put(DEFAULT_SETPOINT);
        gain.put(DEFAULT_GAIN);

        let mut control = sim_loop(&plant, &setpoint, &gain).with_telemetry(&queue, Some(2000));
        let mut logger = TelemetryLogger::new(&queue, heapless::String::<4096>::new());
        let mut physics = |_now: Millis| plant.advance();

        {
            let mut scheduler: Scheduler = Scheduler::new();
            scheduler.add(TaskConfig::new("plant", 3, 10), &mut physics, 0).unwrap();
            scheduler.add(TaskConfig::new("motor1", 2, 10), &mut control, 0).unwrap();
            scheduler.add(TaskConfig::new("logger", 1, 20), &mut logger, 0).unwrap();

            let clock = SteppingClock(Cell::new(0));
            let mut polls = 0u32;
            let mut stop = || {
                polls += 1;
                polls > 4000
            };
            let summary = kernel::run(&mut scheduler, &clock, &mut stop);
            assert!(summary.stopped_at >= 4000);

            for task in scheduler.tasks() {
                assert_eq!(task.stats().late_runs, 0, "{} ran late", task.name());
            }
        }

        // Converged, then de-energized by the stop hook
        assert!((16_375..=16_384).contains(&control.position()));
        assert_eq!(plant.net_duty(), 0);

        // One record per control period inside the 2 s window, all flushed
        assert_eq!(logger.written(), 200);
        assert_eq!(queue.dropped(), 0);
        assert!(queue.is_empty());

        let sink = logger.into_sink();
        let mut lines = sink.split("\r\n").filter(|l| !l.is_empty());
        assert_eq!(lines.next(), Some("0,0"));
        assert_eq!(lines.next(), Some("10,200"));
        let last = lines.last().unwrap();
        assert!(last.starts_with("1990,"), "last record {}", last);
    }
}
