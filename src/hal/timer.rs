//! Timer/counter peripheral traits
//!
//! The scheduling core only talks to a timer through these traits. Every
//! method takes `&self`: the registers behind them are memory-mapped and
//! shared with interrupt handlers anyway, so there is nothing for `&mut` to
//! protect.

use crate::error::Result;
use crate::ticks::NarrowTicks;

/// Width of the hardware counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CounterWidth {
    Bits8,
    Bits16,
}

impl CounterWidth {
    pub const fn bits(self) -> u32 {
        match self {
            CounterWidth::Bits8 => 8,
            CounterWidth::Bits16 => 16,
        }
    }

    /// Number of distinct counter values (2^bits)
    pub const fn range(self) -> u32 {
        1 << self.bits()
    }

    /// Largest counter value
    pub const fn max(self) -> NarrowTicks {
        (self.range() - 1) as NarrowTicks
    }

    /// First value of the upper half of the counter range
    pub const fn half(self) -> NarrowTicks {
        (self.range() / 2) as NarrowTicks
    }
}

/// What the output pin does on a compare match.
///
/// The discriminants are the AVR COMnx1:COMnx0 bit pattern for normal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CompareAction {
    Nothing = 0b00,
    Toggle = 0b01,
    Clear = 0b10,
    Set = 0b11,
}

impl CompareAction {
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => CompareAction::Nothing,
            0b01 => CompareAction::Toggle,
            0b10 => CompareAction::Clear,
            _ => CompareAction::Set,
        }
    }

    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Pin level after this action is applied to `level`
    pub const fn apply(self, level: bool) -> bool {
        match self {
            CompareAction::Nothing => level,
            CompareAction::Toggle => !level,
            CompareAction::Clear => false,
            CompareAction::Set => true,
        }
    }
}

/// Timer clock source. The discriminant is the prescaler divisor.
///
/// Not every timer supports every divisor: on the ATmega128 only Timer0 has
/// the `/32` and `/128` taps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum TimerClock {
    /// Timer stopped
    None = 0,
    Clk = 1,
    ClkDiv8 = 8,
    ClkDiv32 = 32,
    ClkDiv64 = 64,
    ClkDiv128 = 128,
    ClkDiv256 = 256,
    ClkDiv1024 = 1024,
}

impl TimerClock {
    /// CPU cycles per timer tick, 0 when stopped
    pub const fn divisor(self) -> u16 {
        self as u16
    }
}

/// Global interrupt masking
pub trait InterruptControl {
    /// Saved interrupt-enable state
    type Token;

    /// Mask interrupts and return the state to restore later
    fn disable_save(&self) -> Self::Token;

    /// Put back a state returned by [`disable_save`](Self::disable_save)
    fn restore(&self, token: Self::Token);
}

/// A free-running hardware counter with an overflow flag
pub trait TimerCounter: InterruptControl {
    fn width(&self) -> CounterWidth;

    fn count(&self) -> NarrowTicks;

    fn set_count(&self, value: NarrowTicks);

    fn overflow_pending(&self) -> bool;

    fn clear_overflow_pending(&self);

    fn enable_overflow_interrupt(&self);

    /// Select the clock source. Fails with `UnsupportedClock` when this timer
    /// has no such prescaler tap.
    fn set_clock(&self, clock: TimerClock) -> Result<()>;
}

/// One output-compare unit of a [`TimerCounter`]
pub trait CompareChannel {
    fn match_pending(&self) -> bool;

    fn clear_match_pending(&self);

    fn set_compare(&self, value: NarrowTicks);

    fn enable_interrupt(&self);

    fn disable_interrupt(&self);

    /// Arm the pin action performed on the next compare match
    fn set_action(&self, action: CompareAction);

    fn action(&self) -> CompareAction;
}
