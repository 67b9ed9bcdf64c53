//! Simulated timer peripheral for host tests
//!
//! [`Simulator`] models one timer/counter with three compare channels at tick
//! granularity. Time only moves when a test calls [`Simulator::tick`] or
//! [`Simulator::advance`], or when code touches a register: every register
//! access first lets `access_cost` ticks pass, which stands in for the
//! instructions the firmware spends between two accesses. Raising the cost
//! makes a channel "slow" and is how the tests provoke rejected schedules.
//!
//! Interrupts are never delivered on their own. [`dispatch`] services pending
//! vectors the way the AVR does (compare before overflow) and [`run`] ticks
//! and dispatches in lock step.

use core::cell::Cell;
use core::convert::Infallible;

use embedded_hal::digital::v2::InputPin;

use crate::action::DeadlineAction;
use crate::clock::ExtendedClock;
use crate::error::Result;
use crate::hal::timer::{
    CompareAction, CompareChannel, CounterWidth, InterruptControl, TimerClock, TimerCounter,
};
use crate::ticks::NarrowTicks;

/// Compare channels per simulated timer (A, B, C)
pub const CHANNELS: usize = 3;

struct SimChannel {
    compare: Cell<NarrowTicks>,
    match_flag: Cell<bool>,
    irq_enabled: Cell<bool>,
    action: Cell<CompareAction>,
    pin: Cell<bool>,
}

impl SimChannel {
    const fn new() -> Self {
        Self {
            compare: Cell::new(0),
            match_flag: Cell::new(false),
            irq_enabled: Cell::new(false),
            action: Cell::new(CompareAction::Nothing),
            pin: Cell::new(false),
        }
    }
}

pub struct Simulator {
    width: CounterWidth,
    count: Cell<NarrowTicks>,
    overflow_flag: Cell<bool>,
    overflow_irq_enabled: Cell<bool>,
    interrupts_enabled: Cell<bool>,
    clock: Cell<TimerClock>,
    access_cost: Cell<u32>,
    elapsed: Cell<u64>,
    channels: [SimChannel; CHANNELS],
}

impl Simulator {
    /// A running timer at zero with free register access and interrupts on
    pub const fn new(width: CounterWidth) -> Self {
        Self {
            width,
            count: Cell::new(0),
            overflow_flag: Cell::new(false),
            overflow_irq_enabled: Cell::new(false),
            interrupts_enabled: Cell::new(true),
            clock: Cell::new(TimerClock::Clk),
            access_cost: Cell::new(0),
            elapsed: Cell::new(0),
            channels: [SimChannel::new(), SimChannel::new(), SimChannel::new()],
        }
    }

    pub fn with_access_cost(self, ticks: u32) -> Self {
        self.access_cost.set(ticks);
        self
    }

    pub fn set_access_cost(&self, ticks: u32) {
        self.access_cost.set(ticks);
    }

    pub fn width(&self) -> CounterWidth {
        self.width
    }

    pub fn counter(&self) -> MockCounter<'_> {
        MockCounter { sim: self }
    }

    /// # Panics
    ///
    /// When `index` is not below [`CHANNELS`].
    pub fn channel(&self, index: usize) -> MockChannel<'_> {
        assert!(index < CHANNELS, "no compare channel {}", index);
        MockChannel { sim: self, index }
    }

    /// Output pin driven by compare channel `index`
    pub fn pin(&self, index: usize) -> MockPin<'_> {
        assert!(index < CHANNELS, "no compare channel {}", index);
        MockPin { sim: self, index }
    }

    /// Advance the counter by one timer tick. A stopped timer does not move.
    pub fn tick(&self) {
        if self.clock.get() == TimerClock::None {
            return;
        }
        self.elapsed.set(self.elapsed.get() + 1);

        let count = self.count.get().wrapping_add(1) & self.width.max();
        self.count.set(count);
        if count == 0 {
            self.overflow_flag.set(true);
        }

        for channel in &self.channels {
            if channel.compare.get() & self.width.max() == count {
                channel.match_flag.set(true);
                channel.pin.set(channel.action.get().apply(channel.pin.get()));
            }
        }
    }

    pub fn advance(&self, ticks: u32) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    /// Ticks simulated since construction
    pub fn elapsed(&self) -> u64 {
        self.elapsed.get()
    }

    /// Write the counter without charging any access cost
    pub fn set_count(&self, value: NarrowTicks) {
        self.count.set(value & self.width.max());
    }

    /// Set the overflow flag as if the counter had just wrapped
    pub fn raise_overflow(&self) {
        self.overflow_flag.set(true);
    }

    pub fn set_pin(&self, index: usize, level: bool) {
        self.channels[index].pin.set(level);
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.interrupts_enabled.get()
    }

    pub fn set_interrupts_enabled(&self, enabled: bool) {
        self.interrupts_enabled.set(enabled);
    }

    /// Acknowledge the overflow vector if the CPU would take it now
    pub fn take_overflow_irq(&self) -> bool {
        let taken = self.interrupts_enabled.get()
            && self.overflow_irq_enabled.get()
            && self.overflow_flag.get();
        if taken {
            self.overflow_flag.set(false);
        }
        taken
    }

    /// Acknowledge the compare vector of channel `index` if the CPU would take it now
    pub fn take_compare_irq(&self, index: usize) -> bool {
        let channel = &self.channels[index];
        let taken = self.interrupts_enabled.get()
            && channel.irq_enabled.get()
            && channel.match_flag.get();
        if taken {
            channel.match_flag.set(false);
        }
        taken
    }

    /// Run `isr` the way the CPU runs a vector: after the entry latency and
    /// with interrupts masked until it returns.
    pub fn run_isr<R>(&self, isr: impl FnOnce() -> R) -> R {
        self.charge();
        let was_enabled = self.interrupts_enabled.replace(false);
        let result = isr();
        self.interrupts_enabled.set(was_enabled);
        result
    }

    fn charge(&self) {
        self.advance(self.access_cost.get());
    }

    fn channel_state(&self, index: usize) -> &SimChannel {
        &self.channels[index]
    }
}

/// Counter half of a [`Simulator`]
pub struct MockCounter<'s> {
    sim: &'s Simulator,
}

impl<'s> MockCounter<'s> {
    pub fn sim(&self) -> &'s Simulator {
        self.sim
    }
}

impl InterruptControl for MockCounter<'_> {
    type Token = bool;

    fn disable_save(&self) -> bool {
        self.sim.interrupts_enabled.replace(false)
    }

    fn restore(&self, token: bool) {
        self.sim.interrupts_enabled.set(token);
    }
}

impl TimerCounter for MockCounter<'_> {
    fn width(&self) -> CounterWidth {
        self.sim.width
    }

    fn count(&self) -> NarrowTicks {
        self.sim.charge();
        self.sim.count.get()
    }

    fn set_count(&self, value: NarrowTicks) {
        self.sim.charge();
        self.sim.set_count(value);
    }

    fn overflow_pending(&self) -> bool {
        self.sim.charge();
        self.sim.overflow_flag.get()
    }

    fn clear_overflow_pending(&self) {
        self.sim.charge();
        self.sim.overflow_flag.set(false);
    }

    fn enable_overflow_interrupt(&self) {
        self.sim.charge();
        self.sim.overflow_irq_enabled.set(true);
    }

    fn set_clock(&self, clock: TimerClock) -> Result<()> {
        self.sim.charge();
        self.sim.clock.set(clock);
        Ok(())
    }
}

/// One compare channel of a [`Simulator`]
pub struct MockChannel<'s> {
    sim: &'s Simulator,
    index: usize,
}

impl<'s> MockChannel<'s> {
    pub fn sim(&self) -> &'s Simulator {
        self.sim
    }

    pub fn index(&self) -> usize {
        self.index
    }

    fn state(&self) -> &'s SimChannel {
        self.sim.channel_state(self.index)
    }
}

impl CompareChannel for MockChannel<'_> {
    fn match_pending(&self) -> bool {
        self.sim.charge();
        self.state().match_flag.get()
    }

    fn clear_match_pending(&self) {
        self.sim.charge();
        self.state().match_flag.set(false);
    }

    fn set_compare(&self, value: NarrowTicks) {
        self.sim.charge();
        self.state().compare.set(value & self.sim.width.max());
    }

    fn enable_interrupt(&self) {
        self.sim.charge();
        self.state().irq_enabled.set(true);
    }

    fn disable_interrupt(&self) {
        self.sim.charge();
        self.state().irq_enabled.set(false);
    }

    fn set_action(&self, action: CompareAction) {
        self.sim.charge();
        self.state().action.set(action);
    }

    fn action(&self) -> CompareAction {
        self.sim.charge();
        self.state().action.get()
    }
}

/// Read-only view of a simulated output-compare pin
pub struct MockPin<'s> {
    sim: &'s Simulator,
    index: usize,
}

impl InputPin for MockPin<'_> {
    type Error = Infallible;

    fn is_high(&self) -> core::result::Result<bool, Infallible> {
        Ok(self.sim.channels[self.index].pin.get())
    }

    fn is_low(&self) -> core::result::Result<bool, Infallible> {
        Ok(!self.sim.channels[self.index].pin.get())
    }
}

/// Service every interrupt the CPU would take right now.
///
/// Compare vectors go first, in the order of `actions`, then the overflow
/// vector, and the loop repeats until nothing is pending.
pub fn dispatch<'a, 's: 'a>(
    clock: &ExtendedClock<MockCounter<'s>>,
    actions: &[&DeadlineAction<'a, MockCounter<'s>, MockChannel<'s>>],
) {
    let sim = clock.counter().sim();
    loop {
        let compare = actions
            .iter()
            .find(|action| sim.take_compare_irq(action.channel().index()));
        if let Some(action) = compare {
            sim.run_isr(|| action.process_interrupt());
            continue;
        }
        if sim.take_overflow_irq() {
            sim.run_isr(|| clock.process_overflow());
            continue;
        }
        break;
    }
}

/// Let `ticks` timer ticks pass, servicing interrupts after each one
pub fn run<'a, 's: 'a>(
    clock: &ExtendedClock<MockCounter<'s>>,
    actions: &[&DeadlineAction<'a, MockCounter<'s>, MockChannel<'s>>],
    ticks: u32,
) {
    let sim = clock.counter().sim();
    for _ in 0..ticks {
        sim.tick();
        dispatch(clock, actions);
    }
}
