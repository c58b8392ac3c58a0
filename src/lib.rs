//! # quadloop
//!
//! Closed-loop position control for a two-motor encoder kit, scheduled
//! cooperatively on a bare-metal ARM Cortex-M4.
//!
//! ## Overview
//!
//! Each motor gets a proportional position loop: a wrapping 16-bit encoder
//! counter is unwrapped into an unbounded position, compared against a
//! setpoint, and the saturated error drives a two-channel H-bridge. The
//! loops, plus a low-priority telemetry logger, run as periodic tasks under
//! a priority scheduler with:
//!
//! - **No preemption**: a task body runs to completion before anything else
//! - **Fixed priorities**: the highest-priority due task runs first, ties go
//!   to the task registered first
//! - **No drift**: each due time is the previous one plus the period
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │        Firmware (main.rs): two loops + logger           │
//! ├────────────────────────────────────────────────────────┤
//! │                Host loop (kernel.rs)                    │
//! │           run() · report() · Clock · StopSignal         │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Scheduler   │   Tasks            │  Channels         │
//! │  scheduler.rs│   control.rs       │  share.rs         │
//! │  ─ add()     │   ─ ControlLoop    │  ─ Share<T>       │
//! │  ─ dispatch()│   telemetry.rs     │  ─ Queue<T, N>    │
//! │  ─ shutdown()│   ─ TelemetryLogger│                   │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │   encoder.rs · controller.rs · motor.rs · task.rs       │
//! │   EncoderTracker · Controller · MotorActuator · Task    │
//! ├────────────────────────────────────────────────────────┤
//! │   Ports: arch/cortex_m4.rs (SysTick, sync.rs ticks)     │
//! │          arch/stm32l4.rs (timers, USART)                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: everything is inline or borrowed from `main`'s frame
//! - **No `alloc`**: `core` and `heapless` only
//! - **Bounded tables**: up to `MAX_TASKS` tasks, queues sized by const generic
//! - **One lock**: the SysTick counter, behind `critical_section::Mutex`
//!
//! ## Features
//!
//! - `defmt`: log through `defmt` and derive `defmt::Format` on public types
//! - `firmware`: the Cortex-M runtime, RTT logging and the STM32L476 ports

#![no_std]

mod fmt;

pub mod config;
pub mod share;
pub mod encoder;
pub mod controller;
pub mod motor;
pub mod task;
pub mod scheduler;
pub mod kernel;
pub mod sync;
pub mod telemetry;
pub mod console;
pub mod control;
#[cfg(feature = "firmware")]
pub mod arch;
