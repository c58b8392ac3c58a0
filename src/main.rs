//! # quadloop Firmware
//!
//! Two position loops and a telemetry logger on an STM32L476 Nucleo with a
//! dual H-bridge and two quadrature encoders:
//!
//! | Task      | Priority | Period | Hardware                              |
//! |-----------|----------|--------|---------------------------------------|
//! | `motor1`  | 2        | 10 ms  | encoder TIM4, PWM TIM3 CH1/CH2        |
//! | `motor2`  | 2        | 10 ms  | encoder TIM8, PWM TIM5 CH1/CH2        |
//! | `logger`  | 1        | 20 ms  | USART2 TX                             |
//!
//! ## Session
//!
//! 1. The operator is prompted on USART2 for `kp1` and `kp2`. Lines end on
//!    `\r`, `\n` or `\r\n`, and backspace edits. Anything that does not
//!    parse falls back to `DEFAULT_GAIN`. Input is then discarded until the
//!    line has been quiet for `INPUT_SETTLE_MS`.
//! 2. Both loops drive to `DEFAULT_SETPOINT`. `motor2` records its step
//!    response for `CAPTURE_WINDOW_MS` as `<ms>,<ticks>` lines on USART2.
//! 3. Any byte received on USART2 stops the scheduler. Both motors are
//!    zeroed, queued telemetry is flushed and per-task statistics are
//!    logged over RTT.

#![no_std]
#![no_main]

use core::fmt::Write;

use cortex_m_rt::entry;
use defmt_rtt as _;
use panic_halt as _;

use quadloop::arch::cortex_m4;
use quadloop::arch::stm32l4::{
    self, Console, TimerCounter, TimerPwm, TIM3_BASE, TIM4_BASE, TIM5_BASE, TIM8_BASE,
    USART2_BASE,
};
use quadloop::config::{
    parse_gain, ControllerConfig, CAPTURE_WINDOW_MS, CONTROL_PERIOD_MS, CONTROL_PRIORITY,
    DEFAULT_GAIN, DEFAULT_SETPOINT, INPUT_LINE_LEN, INPUT_SETTLE_MS, LOGGER_PERIOD_MS,
    LOGGER_PRIORITY,
};
use quadloop::console::LineEditor;
use quadloop::control::ControlLoop;
use quadloop::controller::Controller;
use quadloop::kernel;
use quadloop::motor::MotorActuator;
use quadloop::scheduler::Scheduler;
use quadloop::share::{Overflow, Queue, Share};
use quadloop::task::TaskConfig;
use quadloop::telemetry::{TelemetryLogger, TelemetryQueue};

// ---------------------------------------------------------------------------
// Operator input
// ---------------------------------------------------------------------------

/// Ask for a gain on the serial console. Blocks until a line arrives.
fn prompt_gain(
    name: &str,
    console: &mut Console,
    editor: &mut LineEditor<INPUT_LINE_LEN>,
) -> f32 {
    write!(console, "{} [{}]: ", name, DEFAULT_GAIN).ok();
    let line = console.read_line(editor);

    match parse_gain(line) {
        Ok(gain) => {
            defmt::info!("{} = {}", name, gain);
            gain
        }
        Err(e) => {
            defmt::warn!("{}: {}, using {}", name, e, DEFAULT_GAIN);
            write!(console, "{}, using {}\r\n", e, DEFAULT_GAIN).ok();
            DEFAULT_GAIN
        }
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Firmware entry point. Builds the loops, runs them until the operator
/// sends a byte, then parks the core. Does not return.
#[entry]
fn main() -> ! {
    let mut cp = cortex_m::Peripherals::take().expect("Failed to take core peripherals");
    cortex_m4::configure_systick(&mut cp.SYST);

    // SAFETY: USART2 was enabled by board bring-up and is split only here
    let (tx, rx) = unsafe { stm32l4::usart(USART2_BASE) };
    let mut console = Console::new(tx, rx);
    let mut editor: LineEditor<INPUT_LINE_LEN> = LineEditor::new();

    // --- Inter-task channels ---

    let motor1_setpoint: Share<i32> = Share::new("motor1setpoint");
    let motor2_setpoint: Share<i32> = Share::new("motor2setpoint");
    let kp1: Share<f32> = Share::new("kp1");
    let kp2: Share<f32> = Share::new("kp2");
    let telemetry: TelemetryQueue = Queue::new("enc2reading", Overflow::DropNewest);

    motor1_setpoint.put(DEFAULT_SETPOINT);
    motor2_setpoint.put(DEFAULT_SETPOINT);
    kp1.put(prompt_gain("kp1", &mut console, &mut editor));
    kp2.put(prompt_gain("kp2", &mut console, &mut editor));

    // Leftover input would otherwise read as a stop request
    let (tx, mut rx) = console.into_parts();
    let discarded = rx.settle(cortex_m4::clock(), INPUT_SETTLE_MS);
    if discarded > 0 {
        defmt::debug!("discarded {} bytes of input", discarded);
    }

    // --- Hardware ---

    // SAFETY: each timer was configured by board bring-up (TIM3/TIM5 in PWM
    // mode on both channels, TIM4/TIM8 in encoder mode) and is wrapped once
    let (motor1_a, motor1_b) = unsafe { TimerPwm::pair(TIM3_BASE) };
    let (motor2_a, motor2_b) = unsafe { TimerPwm::pair(TIM5_BASE) };
    let encoder1 = unsafe { TimerCounter::new(TIM4_BASE) };
    let encoder2 = unsafe { TimerCounter::new(TIM8_BASE) };

    let motor1 = MotorActuator::new(motor1_a, motor1_b).expect("Failed to zero motor1");
    let motor2 = MotorActuator::new(motor2_a, motor2_b).expect("Failed to zero motor2");

    // --- Tasks ---

    let controller1 = Controller::new(ControllerConfig::new(DEFAULT_SETPOINT, DEFAULT_GAIN))
        .expect("Invalid motor1 controller configuration");
    let controller2 = Controller::new(ControllerConfig::new(DEFAULT_SETPOINT, DEFAULT_GAIN))
        .expect("Invalid motor2 controller configuration");

    let mut motor1_task = ControlLoop::new(
        "motor1",
        encoder1,
        controller1,
        motor1,
        &motor1_setpoint,
        &kp1,
    );
    let mut motor2_task = ControlLoop::new(
        "motor2",
        encoder2,
        controller2,
        motor2,
        &motor2_setpoint,
        &kp2,
    )
    .with_telemetry(&telemetry, Some(CAPTURE_WINDOW_MS));
    let mut logger_task = TelemetryLogger::new(&telemetry, tx);

    let start = cortex_m4::now();
    let mut scheduler: Scheduler = Scheduler::new();
    scheduler
        .add(
            TaskConfig::new("motor1", CONTROL_PRIORITY, CONTROL_PERIOD_MS),
            &mut motor1_task,
            start,
        )
        .expect("Failed to add motor1");
    scheduler
        .add(
            TaskConfig::new("motor2", CONTROL_PRIORITY, CONTROL_PERIOD_MS),
            &mut motor2_task,
            start,
        )
        .expect("Failed to add motor2");
    scheduler
        .add(
            TaskConfig::new("logger", LOGGER_PRIORITY, LOGGER_PERIOD_MS),
            &mut logger_task,
            start,
        )
        .expect("Failed to add logger");

    // --- Run until any byte arrives ---

    let summary = kernel::run(&mut scheduler, cortex_m4::clock(), &mut rx);
    defmt::info!(
        "stopped at {} ms: {} dispatches over {} polls",
        summary.stopped_at,
        summary.dispatches,
        summary.polls
    );
    kernel::report(&scheduler);
    defmt::info!(
        "{}: max depth {} of {}, {} dropped",
        telemetry.name(),
        telemetry.max_full(),
        telemetry.capacity(),
        telemetry.dropped()
    );

    cortex_m4::idle()
}
