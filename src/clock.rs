//! Extended-range clock on top of a narrow hardware counter
//!
//! The hardware counter is 8 or 16 bits wide and wraps within milliseconds.
//! [`ExtendedClock`] counts its overflows in software so that the pair reads
//! as one 32-bit monotonic tick count:
//!
//! ```text
//! extended = overflow_ticks + narrow
//! ```
//!
//! The overflow interrupt can lag behind the counter. When the overflow flag
//! is still pending and the counter sits in the lower half of its range, the
//! wrap already happened and one more range is added. A pending flag with the
//! counter in the upper half means the wrap came after the counter was read.

use core::cell::Cell;

use crate::critical::CriticalSection;
use crate::error::Result;
use crate::hal::timer::{CounterWidth, TimerClock, TimerCounter};
use crate::ticks::{NarrowTicks, Ticks};

pub struct ExtendedClock<K> {
    counter: K,
    /// Whole counter ranges seen so far. Always a multiple of the range.
    overflow_ticks: Cell<Ticks>,
    on_overflow: Cell<Option<fn()>>,
}

impl<K> ExtendedClock<K> {
    pub const fn new(counter: K) -> Self {
        Self {
            counter,
            overflow_ticks: Cell::new(0),
            on_overflow: Cell::new(None),
        }
    }

    pub fn counter(&self) -> &K {
        &self.counter
    }

    /// Called from the overflow ISR after the accumulator is updated.
    /// Runs in interrupt context and must not block.
    pub fn set_overflow_callback(&self, callback: Option<fn()>) {
        self.on_overflow.set(callback);
    }
}

impl<K: TimerCounter> ExtendedClock<K> {
    /// Select the prescaler and start counting overflows
    pub fn configure(&self, clock: TimerClock) -> Result<()> {
        self.counter.set_clock(clock)?;
        self.counter.enable_overflow_interrupt();
        log_debug!("clock configured, divisor {}", clock.divisor());
        Ok(())
    }

    pub fn width(&self) -> CounterWidth {
        self.counter.width()
    }

    /// Largest lead time the compare hardware can express directly
    pub fn max_sys_ticks(&self) -> Ticks {
        self.width().range() - 1
    }

    /// Mask interrupts until the returned guard is dropped
    pub fn critical_section(&self) -> CriticalSection<'_, K> {
        CriticalSection::enter(&self.counter)
    }

    /// Accumulator corrected for a pending overflow, and the narrow count it
    /// was corrected against
    fn snapshot(&self) -> (Ticks, NarrowTicks) {
        let _cs = self.critical_section();
        let mut base = self.overflow_ticks.get();
        let narrow = self.counter.count();
        if self.counter.overflow_pending() && narrow < self.width().half() {
            base = base.wrapping_add(self.width().range());
        }
        (base, narrow)
    }

    pub fn now(&self) -> Ticks {
        let (base, narrow) = self.snapshot();
        base.wrapping_add(Ticks::from(narrow))
    }

    /// Move the clock to `ticks`. Clears a pending overflow.
    pub fn set(&self, ticks: Ticks) {
        let mask = self.max_sys_ticks();
        let _cs = self.critical_section();
        self.counter.set_count(self.compress(ticks));
        self.overflow_ticks.set(ticks & !mask);
        self.counter.clear_overflow_pending();
    }

    /// Extended value of a narrow time known to be now or in the future
    pub fn extend(&self, narrow: NarrowTicks) -> Ticks {
        let (base, now) = self.snapshot();
        let narrow = narrow & self.width().max();
        let ticks = base.wrapping_add(Ticks::from(narrow));
        if narrow < now {
            ticks.wrapping_add(self.width().range())
        } else {
            ticks
        }
    }

    /// Extended value of a narrow time known to be now or in the past
    pub fn extend_in_past(&self, narrow: NarrowTicks) -> Ticks {
        let (base, now) = self.snapshot();
        let narrow = narrow & self.width().max();
        let ticks = base.wrapping_add(Ticks::from(narrow));
        if narrow > now {
            ticks.wrapping_sub(self.width().range())
        } else {
            ticks
        }
    }

    /// Narrow counter value at which `ticks` falls
    pub fn compress(&self, ticks: Ticks) -> NarrowTicks {
        (ticks & self.max_sys_ticks()) as NarrowTicks
    }

    /// Overflow ISR body
    pub fn process_overflow(&self) {
        let _cs = self.critical_section();
        self.overflow_ticks
            .set(self.overflow_ticks.get().wrapping_add(self.width().range()));
        if let Some(callback) = self.on_overflow.get() {
            callback();
        }
    }

    /// Extended ticks contributed by serviced overflows. An overflow whose
    /// vector has not run yet is not included, unlike in [`now`](Self::now).
    pub fn overflow_ticks(&self) -> Ticks {
        let _cs = self.critical_section();
        self.overflow_ticks.get()
    }

    /// Serviced overflows since the last reset
    pub fn overflow_count(&self) -> u32 {
        self.overflow_ticks() >> self.width().bits()
    }

    pub fn reset_overflow_count(&self) {
        let _cs = self.critical_section();
        self.overflow_ticks.set(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::{self, Simulator};
    use core::sync::atomic::{AtomicU32, Ordering};

    fn check_arithmetic(width: CounterWidth) {
        let sim = Simulator::new(width);
        let clock = ExtendedClock::new(sim.counter());
        let range = width.range();

        for overflows in [0u32, 1, 7, 300] {
            clock.reset_overflow_count();
            for _ in 0..overflows {
                clock.process_overflow();
            }
            for offset in [0, 1, width.half(), width.max()] {
                sim.set_count(offset);
                let expected = overflows.wrapping_mul(range) + Ticks::from(offset);
                assert_eq!(clock.now(), expected);
                assert_eq!(clock.overflow_count(), overflows);
            }
        }
    }

    #[test]
    fn test_arithmetic_8bit() {
        check_arithmetic(CounterWidth::Bits8);
    }

    #[test]
    fn test_arithmetic_16bit() {
        check_arithmetic(CounterWidth::Bits16);
    }

    #[test]
    fn test_max_sys_ticks() {
        let sim8 = Simulator::new(CounterWidth::Bits8);
        let sim16 = Simulator::new(CounterWidth::Bits16);
        assert_eq!(ExtendedClock::new(sim8.counter()).max_sys_ticks(), 255);
        assert_eq!(ExtendedClock::new(sim16.counter()).max_sys_ticks(), 65_535);
    }

    #[test]
    fn test_monotonic_while_running() {
        let sim = Simulator::new(CounterWidth::Bits8).with_access_cost(1);
        let clock = ExtendedClock::new(sim.counter());
        clock.configure(TimerClock::Clk).unwrap();

        let mut last = clock.now();
        for _ in 0..2_000 {
            sim.tick();
            mock::dispatch(&clock, &[]);
            let now = clock.now();
            assert!(now > last, "clock went from {} to {}", last, now);
            last = now;
        }
        assert!(clock.overflow_count() > 5);
    }

    #[test]
    fn test_pending_overflow_counts_before_isr() {
        let sim = Simulator::new(CounterWidth::Bits16);
        let clock = ExtendedClock::new(sim.counter());

        sim.set_count(0xffff);
        assert_eq!(clock.now(), 0xffff);
        sim.tick();
        // Flag is set but nobody serviced the vector
        assert_eq!(clock.now(), 0x1_0000);
        assert_eq!(clock.overflow_ticks(), 0);

        // Counter read just before the wrap, flag seen set afterwards
        sim.set_count(0xfff0);
        assert_eq!(clock.now(), 0xfff0);
    }

    #[test]
    fn test_overflow_count_ignores_unserviced_overflow() {
        let sim = Simulator::new(CounterWidth::Bits8);
        let clock = ExtendedClock::new(sim.counter());
        clock.process_overflow();
        clock.process_overflow();

        sim.raise_overflow();
        assert_eq!(clock.overflow_count(), 2);
        clock.reset_overflow_count();
        assert_eq!(clock.overflow_count(), 0);
        assert_eq!(clock.overflow_ticks(), 0);

        clock.process_overflow();
        assert_eq!(clock.overflow_count(), 1);
    }

    #[test]
    fn test_set_round_trip() {
        let sim = Simulator::new(CounterWidth::Bits16);
        let clock = ExtendedClock::new(sim.counter());
        clock.counter().set_clock(TimerClock::None).unwrap();

        sim.raise_overflow();
        clock.set(0x1234_5678);
        assert_eq!(clock.now(), 0x1234_5678);
        assert_eq!(clock.overflow_ticks(), 0x1234_0000);
        assert!(!sim.counter().overflow_pending());
    }

    #[test]
    fn test_set_8bit() {
        let sim = Simulator::new(CounterWidth::Bits8);
        let clock = ExtendedClock::new(sim.counter());
        clock.set(0xabcd_ef01);
        assert_eq!(clock.now(), 0xabcd_ef01);
        assert_eq!(sim.counter().count(), 0x01);
        assert_eq!(clock.overflow_count(), 0x00ab_cdef);
    }

    #[test]
    fn test_extend_future_and_past() {
        let sim = Simulator::new(CounterWidth::Bits16);
        let clock = ExtendedClock::new(sim.counter());

        clock.process_overflow();
        assert_eq!(clock.now(), 0x1_0000);
        assert_eq!(clock.extend(0x00ff), 0x1_00ff);
        assert_eq!(clock.extend_in_past(0x00ff), 0x0_00ff);

        sim.set_count(0x0100);
        assert_eq!(clock.now(), 0x1_0100);
        assert_eq!(clock.extend(0x00ff), 0x2_00ff);
        assert_eq!(clock.extend_in_past(0x00ff), 0x1_00ff);

        clock.process_overflow();
        sim.set_count(0);
        assert_eq!(clock.extend(0x00ff), 0x2_00ff);
        assert_eq!(clock.extend_in_past(0x00ff), 0x1_00ff);

        // Unserviced overflow
        sim.raise_overflow();
        assert_eq!(clock.now(), 0x3_0000);
        assert_eq!(clock.extend(0x00ff), 0x3_00ff);
        assert_eq!(clock.extend_in_past(0x00ff), 0x2_00ff);
    }

    #[test]
    fn test_extend_equal_to_now() {
        let sim = Simulator::new(CounterWidth::Bits16);
        let clock = ExtendedClock::new(sim.counter());
        clock.set(0x3_00ff);
        assert_eq!(clock.extend(0x00ff), 0x3_00ff);
        assert_eq!(clock.extend_in_past(0x00ff), 0x3_00ff);
    }

    #[test]
    fn test_extend_and_past_differ_by_at_most_one_range() {
        let sim = Simulator::new(CounterWidth::Bits8);
        let clock = ExtendedClock::new(sim.counter());
        clock.set(0x0004_2280);
        for narrow in 0..=0xff {
            let diff = clock.extend(narrow) - clock.extend_in_past(narrow);
            assert!(diff == 0 || diff == 0x100);
        }
    }

    #[test]
    fn test_compress_inverts_extend() {
        let sim = Simulator::new(CounterWidth::Bits16);
        let clock = ExtendedClock::new(sim.counter());
        clock.set(0x0007_8000);
        let later = 0x0008_1234;
        assert_eq!(clock.extend(clock.compress(later)), later);
    }

    static OVERFLOWS: AtomicU32 = AtomicU32::new(0);

    fn count_overflow() {
        OVERFLOWS.fetch_add(1, Ordering::Relaxed);
    }

    #[test]
    fn test_overflow_callback() {
        let sim = Simulator::new(CounterWidth::Bits8);
        let clock = ExtendedClock::new(sim.counter());
        clock.configure(TimerClock::ClkDiv8).unwrap();
        clock.set_overflow_callback(Some(count_overflow));

        mock::run(&clock, &[], 3 * 256);
        assert_eq!(OVERFLOWS.load(Ordering::Relaxed), 3);
        assert_eq!(clock.overflow_count(), 3);

        clock.reset_overflow_count();
        assert_eq!(clock.overflow_count(), 0);
    }
}
