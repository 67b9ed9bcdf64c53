//! Extended tick arithmetic and tick/time conversions

use crate::config::CPU_FREQ_HZ;
use crate::hal::timer::TimerClock;

/// Timer ticks in the extended (overflow-counted) range
pub type Ticks = u32;

/// Raw counter or compare register value. 8-bit timers only use the low byte.
pub type NarrowTicks = u16;

/// Returns `true` once `now` lies strictly past `deadline`, with both measured
/// from `origin`.
///
/// The distances use wrapping subtraction, so the answer stays right when the
/// extended count rolls over `u32::MAX` between `origin` and `deadline`.
///
/// Precondition: `deadline` and `now` are each less than half the extended
/// range (2^31 ticks) ahead of `origin`. A time *before* `origin` aliases to
/// a huge distance and reads as "elapsed".
#[inline]
pub const fn has_elapsed(now: Ticks, deadline: Ticks, origin: Ticks) -> bool {
    now.wrapping_sub(origin) > deadline.wrapping_sub(origin)
}

/// Like [`has_elapsed`] but also true when `now` is exactly `deadline`.
///
/// Used after a compare match, where the counter is known to have arrived.
#[inline]
pub const fn has_reached(now: Ticks, deadline: Ticks, origin: Ticks) -> bool {
    now.wrapping_sub(origin) >= deadline.wrapping_sub(origin)
}

/// CPU cycles covered by `ticks` at the given prescaler
pub const fn ticks_to_cycles(ticks: Ticks, clock: TimerClock) -> u32 {
    ticks.wrapping_mul(clock.divisor() as u32)
}

/// Whole ticks that fit in `cycles`. A stopped timer never ticks.
pub const fn cycles_to_ticks(cycles: u32, clock: TimerClock) -> Ticks {
    match clock.divisor() {
        0 => 0,
        divisor => cycles / divisor as u32,
    }
}

pub fn ticks_to_micros(ticks: Ticks, clock: TimerClock) -> u32 {
    let cycles = ticks as u64 * clock.divisor() as u64;
    (cycles * 1_000_000 / CPU_FREQ_HZ as u64) as u32
}

pub fn ticks_to_millis(ticks: Ticks, clock: TimerClock) -> u32 {
    let cycles = ticks as u64 * clock.divisor() as u64;
    (cycles * 1_000 / CPU_FREQ_HZ as u64) as u32
}

pub fn micros_to_ticks(micros: u32, clock: TimerClock) -> Ticks {
    match clock.divisor() {
        0 => 0,
        divisor => {
            let cycles = micros as u64 * CPU_FREQ_HZ as u64 / 1_000_000;
            (cycles / divisor as u64) as Ticks
        }
    }
}

pub fn millis_to_ticks(millis: u32, clock: TimerClock) -> Ticks {
    match clock.divisor() {
        0 => 0,
        divisor => {
            let cycles = millis as u64 * CPU_FREQ_HZ as u64 / 1_000;
            (cycles / divisor as u64) as Ticks
        }
    }
}
