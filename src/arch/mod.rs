//! # Architecture Abstraction Layer
//!
//! Hardware boundary for the firmware build. `cortex_m4` supplies the core
//! timer; `stm32l4` adapts the board's timers and USART to the crate's
//! counter, PWM and text seams.

pub mod cortex_m4;
pub mod stm32l4;
