//! Configuration constants for the timer scheduling core

use crate::hal::timer::TimerClock;

/// CPU frequency in Hz
pub const CPU_FREQ_HZ: u32 = 16_000_000;

/// Prescaler the demos and the default schedule margin assume
pub const DEFAULT_CLOCK: TimerClock = TimerClock::Clk;

/// How far `DeadlineAction::schedule` backdates the origin, in CPU cycles.
///
/// Tuned by hand on a 16 MHz ATmega running the timer at `Clk`. It has to
/// cover the worst-case time between the caller reading the clock and the
/// compare register being written. Other clock setups may need their own
/// value, see `ScheduleConfig`.
pub const BACKDATE_CYCLES: u32 = 1024;
