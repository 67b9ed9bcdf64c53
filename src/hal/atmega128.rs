//! ATmega128 timer/counters
//!
//! Register addresses are data-space addresses from the ATmega128 datasheet.
//! The 16-bit timers (1 and 3) go through the shared TEMP byte, so a 16-bit
//! access must not be interrupted by another access to the same timer. The
//! scheduling core only makes those accesses inside critical sections.
//!
//! Interrupt mask registers are shared between timers and are only modified
//! with interrupts disabled. Flag registers are cleared by writing a one to
//! the flag, never read-modify-written.

use core::ptr::{read_volatile, write_volatile};

use avr_device::interrupt::{self, IrqFlag};

use crate::error::{Result, TimerError};
use crate::hal::timer::{
    CompareAction, CompareChannel, CounterWidth, InterruptControl, TimerClock, TimerCounter,
};
use crate::ticks::NarrowTicks;

/// One byte-wide I/O register
#[derive(Clone, Copy)]
pub(crate) struct Reg8(usize);

impl Reg8 {
    pub(crate) const fn at(addr: usize) -> Self {
        Self(addr)
    }

    #[inline(always)]
    pub(crate) fn read(self) -> u8 {
        unsafe { read_volatile(self.0 as *const u8) }
    }

    #[inline(always)]
    pub(crate) fn write(self, value: u8) {
        unsafe { write_volatile(self.0 as *mut u8, value) }
    }

    /// Read-modify-write with interrupts disabled
    #[inline(always)]
    pub(crate) fn modify(self, f: impl FnOnce(u8) -> u8) {
        interrupt::free(|_| self.write(f(self.read())));
    }
}

/// Counter or compare register, one byte or a low/high pair
#[derive(Clone, Copy)]
struct TimerReg {
    low: usize,
    wide: bool,
}

impl TimerReg {
    const fn narrow(addr: usize) -> Self {
        Self { low: addr, wide: false }
    }

    const fn wide(low: usize) -> Self {
        Self { low, wide: true }
    }

    #[inline(always)]
    fn read(self) -> NarrowTicks {
        // Low byte first latches the high byte into TEMP
        let low = Reg8::at(self.low).read();
        if !self.wide {
            return NarrowTicks::from(low);
        }
        let high = Reg8::at(self.low + 1).read();
        NarrowTicks::from_le_bytes([low, high])
    }

    #[inline(always)]
    fn write(self, value: NarrowTicks) {
        let [low, high] = value.to_le_bytes();
        if self.wide {
            Reg8::at(self.low + 1).write(high);
        }
        Reg8::at(self.low).write(low);
    }
}

mod regs {
    use super::{Reg8, TimerReg};

    pub const TIMSK: Reg8 = Reg8::at(0x57);
    pub const TIFR: Reg8 = Reg8::at(0x56);
    pub const ETIMSK: Reg8 = Reg8::at(0x7d);
    pub const ETIFR: Reg8 = Reg8::at(0x7c);

    pub const TCCR0: Reg8 = Reg8::at(0x53);
    pub const TCNT0: TimerReg = TimerReg::narrow(0x52);
    pub const OCR0: TimerReg = TimerReg::narrow(0x51);

    pub const TCCR1A: Reg8 = Reg8::at(0x4f);
    pub const TCCR1B: Reg8 = Reg8::at(0x4e);
    pub const TCNT1: TimerReg = TimerReg::wide(0x4c);
    pub const OCR1A: TimerReg = TimerReg::wide(0x4a);
    pub const OCR1B: TimerReg = TimerReg::wide(0x48);
    pub const OCR1C: TimerReg = TimerReg::wide(0x78);

    pub const TCCR2: Reg8 = Reg8::at(0x45);
    pub const TCNT2: TimerReg = TimerReg::narrow(0x44);
    pub const OCR2: TimerReg = TimerReg::narrow(0x43);

    pub const TCCR3A: Reg8 = Reg8::at(0x8b);
    pub const TCCR3B: Reg8 = Reg8::at(0x8a);
    pub const TCNT3: TimerReg = TimerReg::wide(0x88);
    pub const OCR3A: TimerReg = TimerReg::wide(0x86);
    pub const OCR3B: TimerReg = TimerReg::wide(0x84);
    pub const OCR3C: TimerReg = TimerReg::wide(0x82);
}

const CS_MASK: u8 = 0b111;

/// CS0 bits of Timer0, which has its own prescaler with /32 and /128 taps
const fn timer0_clock_select(clock: TimerClock) -> Option<u8> {
    match clock {
        TimerClock::None => Some(0),
        TimerClock::Clk => Some(1),
        TimerClock::ClkDiv8 => Some(2),
        TimerClock::ClkDiv32 => Some(3),
        TimerClock::ClkDiv64 => Some(4),
        TimerClock::ClkDiv128 => Some(5),
        TimerClock::ClkDiv256 => Some(6),
        TimerClock::ClkDiv1024 => Some(7),
    }
}

/// CS bits of Timers 1, 2 and 3
const fn shared_clock_select(clock: TimerClock) -> Option<u8> {
    match clock {
        TimerClock::None => Some(0),
        TimerClock::Clk => Some(1),
        TimerClock::ClkDiv8 => Some(2),
        TimerClock::ClkDiv64 => Some(3),
        TimerClock::ClkDiv256 => Some(4),
        TimerClock::ClkDiv1024 => Some(5),
        TimerClock::ClkDiv32 | TimerClock::ClkDiv128 => None,
    }
}

macro_rules! impl_timer_counter {
    ($name:ident, $width:expr, count: $count:expr, control: $control:expr,
     mask: $mask:expr, flags: $flags:expr, bit: $bit:expr, select: $select:path) => {
        pub struct $name {
            _private: (),
        }

        impl $name {
            pub const fn new() -> Self {
                Self { _private: () }
            }
        }

        impl InterruptControl for $name {
            type Token = IrqFlag;

            #[inline(always)]
            fn disable_save(&self) -> IrqFlag {
                interrupt::disable_save()
            }

            #[inline(always)]
            fn restore(&self, token: IrqFlag) {
                // Token came from disable_save on this core
                unsafe { interrupt::restore(token) }
            }
        }

        impl TimerCounter for $name {
            fn width(&self) -> CounterWidth {
                $width
            }

            fn count(&self) -> NarrowTicks {
                $count.read()
            }

            fn set_count(&self, value: NarrowTicks) {
                $count.write(value);
            }

            fn overflow_pending(&self) -> bool {
                $flags.read() & (1 << $bit) != 0
            }

            fn clear_overflow_pending(&self) {
                $flags.write(1 << $bit);
            }

            fn enable_overflow_interrupt(&self) {
                $mask.modify(|r| r | (1 << $bit));
            }

            fn set_clock(&self, clock: TimerClock) -> Result<()> {
                let cs = $select(clock).ok_or(TimerError::UnsupportedClock)?;
                $control.modify(|r| (r & !CS_MASK) | cs);
                Ok(())
            }
        }
    };
}

macro_rules! impl_compare_channel {
    ($name:ident, compare: $compare:expr, control: $control:expr, shift: $shift:expr,
     mask: $mask:expr, flags: $flags:expr, bit: $bit:expr) => {
        pub struct $name {
            _private: (),
        }

        impl $name {
            pub const fn new() -> Self {
                Self { _private: () }
            }
        }

        impl CompareChannel for $name {
            fn match_pending(&self) -> bool {
                $flags.read() & (1 << $bit) != 0
            }

            fn clear_match_pending(&self) {
                $flags.write(1 << $bit);
            }

            fn set_compare(&self, value: NarrowTicks) {
                $compare.write(value);
            }

            fn enable_interrupt(&self) {
                $mask.modify(|r| r | (1 << $bit));
            }

            fn disable_interrupt(&self) {
                $mask.modify(|r| r & !(1 << $bit));
            }

            fn set_action(&self, action: CompareAction) {
                $control.modify(|r| (r & !(0b11 << $shift)) | (action.bits() << $shift));
            }

            fn action(&self) -> CompareAction {
                CompareAction::from_bits($control.read() >> $shift)
            }
        }
    };
}

impl_timer_counter!(Timer0, CounterWidth::Bits8, count: regs::TCNT0, control: regs::TCCR0,
    mask: regs::TIMSK, flags: regs::TIFR, bit: 0, select: timer0_clock_select);
impl_timer_counter!(Timer1, CounterWidth::Bits16, count: regs::TCNT1, control: regs::TCCR1B,
    mask: regs::TIMSK, flags: regs::TIFR, bit: 2, select: shared_clock_select);
impl_timer_counter!(Timer2, CounterWidth::Bits8, count: regs::TCNT2, control: regs::TCCR2,
    mask: regs::TIMSK, flags: regs::TIFR, bit: 6, select: shared_clock_select);
impl_timer_counter!(Timer3, CounterWidth::Bits16, count: regs::TCNT3, control: regs::TCCR3B,
    mask: regs::ETIMSK, flags: regs::ETIFR, bit: 2, select: shared_clock_select);

impl_compare_channel!(Oc0, compare: regs::OCR0, control: regs::TCCR0, shift: 4,
    mask: regs::TIMSK, flags: regs::TIFR, bit: 1);
impl_compare_channel!(Oc2, compare: regs::OCR2, control: regs::TCCR2, shift: 4,
    mask: regs::TIMSK, flags: regs::TIFR, bit: 7);
impl_compare_channel!(Oc1a, compare: regs::OCR1A, control: regs::TCCR1A, shift: 6,
    mask: regs::TIMSK, flags: regs::TIFR, bit: 4);
impl_compare_channel!(Oc1b, compare: regs::OCR1B, control: regs::TCCR1A, shift: 4,
    mask: regs::TIMSK, flags: regs::TIFR, bit: 3);
impl_compare_channel!(Oc1c, compare: regs::OCR1C, control: regs::TCCR1A, shift: 2,
    mask: regs::ETIMSK, flags: regs::ETIFR, bit: 0);
impl_compare_channel!(Oc3a, compare: regs::OCR3A, control: regs::TCCR3A, shift: 6,
    mask: regs::ETIMSK, flags: regs::ETIFR, bit: 4);
impl_compare_channel!(Oc3b, compare: regs::OCR3B, control: regs::TCCR3A, shift: 4,
    mask: regs::ETIMSK, flags: regs::ETIFR, bit: 3);
impl_compare_channel!(Oc3c, compare: regs::OCR3C, control: regs::TCCR3A, shift: 2,
    mask: regs::ETIMSK, flags: regs::ETIFR, bit: 1);
