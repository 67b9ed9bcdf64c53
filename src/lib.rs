//! Extended-range timer scheduling for AVR microcontrollers
//!
//! The 8- and 16-bit timer/counters of an AVR wrap within milliseconds. This
//! crate extends them to a 32-bit monotonic tick count ([`ExtendedClock`]) and
//! schedules pin changes on their output-compare units at exact extended
//! deadlines ([`DeadlineAction`], [`PulseSequencer`]). A deadline either
//! happens in hardware on the exact tick or is reported as missed.
//!
//! All scheduling logic is generic over the traits in [`hal::timer`]; the
//! ATmega128 implementation lives in `hal::atmega128` and a simulated timer
//! for host tests in `hal::mock`.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod logging;

pub mod action;
pub mod clock;
pub mod config;
pub mod critical;
pub mod error;
pub mod hal;
pub mod pulse;
pub mod testing;
pub mod ticks;

pub use action::{ActionHandler, ActionState, DeadlineAction, ScheduleConfig};
pub use clock::ExtendedClock;
pub use error::{Result, TimerError};
pub use pulse::{PulseHandler, PulseSequencer, PulseState};
pub use ticks::{NarrowTicks, Ticks};
