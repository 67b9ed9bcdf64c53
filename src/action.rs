//! One-shot compare-match actions at extended deadlines
//!
//! A [`DeadlineAction`] owns one compare channel of a timer. Given a deadline
//! in extended ticks and a pin action it arms the hardware so the pin changes
//! on the exact tick, or reports that the deadline could not be met.
//!
//! The compare register only holds the narrow part of the deadline, so a
//! deadline more than one counter range away cannot be armed right away. The
//! action then waits in [`ActionState::WaitingToSchedule`] with the pin action
//! disarmed, and every compare interrupt on the way re-checks whether the
//! deadline has come within range.
//!
//! ```text
//!            schedule                 in range
//!   Idle ─────────────▶ Waiting ─────────────▶ Scheduled
//!    ▲                    │                        │
//!    │        elapsed     ▼                        │ elapsed
//!    │              MissedAction                   │
//!    └─────────────────────────────────────────────┘
//! ```
//!
//! "Elapsed" is always judged relative to the origin the deadline was
//! scheduled from, see [`has_elapsed`].

use core::cell::Cell;

use crate::clock::ExtendedClock;
use crate::config::{BACKDATE_CYCLES, DEFAULT_CLOCK};
use crate::error::{Result, TimerError};
use crate::hal::timer::{CompareAction, CompareChannel, TimerClock, TimerCounter};
use crate::ticks::{cycles_to_ticks, has_elapsed, has_reached, Ticks};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ActionState {
    /// Nothing pending. Also the state after the action fired.
    Idle,
    /// Deadline accepted but more than one counter range away
    WaitingToSchedule,
    /// Pin action armed in hardware
    Scheduled,
    /// Deadline passed without the hardware performing the action
    MissedAction,
}

/// Completion callback of a [`DeadlineAction`].
///
/// Invoked exactly once per schedule attempt: when the action fires, when it
/// is missed, or when the schedule call itself is rejected. It usually runs in
/// interrupt context and must not block. It may schedule the same action
/// again.
pub trait ActionHandler<'a, K, C> {
    fn on_action(&self, action: &DeadlineAction<'a, K, C>);
}

impl<'a, K, C, F> ActionHandler<'a, K, C> for F
where
    F: Fn(&DeadlineAction<'a, K, C>),
{
    fn on_action(&self, action: &DeadlineAction<'a, K, C>) {
        self(action)
    }
}

/// Timing margins for [`DeadlineAction::schedule`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScheduleConfig {
    /// How far before "now" the implied origin is placed. Must cover the time
    /// from the caller reading the clock to the compare register write.
    pub backdate_ticks: Ticks,
}

impl ScheduleConfig {
    /// [`BACKDATE_CYCLES`] expressed in ticks of `clock`
    pub const fn for_clock(clock: TimerClock) -> Self {
        Self {
            backdate_ticks: cycles_to_ticks(BACKDATE_CYCLES, clock),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self::for_clock(DEFAULT_CLOCK)
    }
}

pub struct DeadlineAction<'a, K, C> {
    clock: &'a ExtendedClock<K>,
    channel: C,
    config: ScheduleConfig,
    state: Cell<ActionState>,
    action_ticks: Cell<Ticks>,
    origin_ticks: Cell<Ticks>,
    action: Cell<CompareAction>,
    previous_action: Cell<CompareAction>,
    handler: Cell<Option<&'a dyn ActionHandler<'a, K, C>>>,
}

impl<'a, K, C> DeadlineAction<'a, K, C> {
    pub const fn new(clock: &'a ExtendedClock<K>, channel: C) -> Self {
        Self::with_config(clock, channel, ScheduleConfig::for_clock(DEFAULT_CLOCK))
    }

    pub const fn with_config(clock: &'a ExtendedClock<K>, channel: C, config: ScheduleConfig) -> Self {
        Self {
            clock,
            channel,
            config,
            state: Cell::new(ActionState::Idle),
            action_ticks: Cell::new(0),
            origin_ticks: Cell::new(0),
            action: Cell::new(CompareAction::Nothing),
            previous_action: Cell::new(CompareAction::Nothing),
            handler: Cell::new(None),
        }
    }

    pub fn state(&self) -> ActionState {
        self.state.get()
    }

    pub fn is_pending(&self) -> bool {
        matches!(
            self.state.get(),
            ActionState::WaitingToSchedule | ActionState::Scheduled
        )
    }

    pub fn action_ticks(&self) -> Ticks {
        self.action_ticks.get()
    }

    pub fn origin_ticks(&self) -> Ticks {
        self.origin_ticks.get()
    }

    /// Pin action of the current or last deadline
    pub fn action(&self) -> CompareAction {
        self.action.get()
    }

    /// Pin action the channel had armed before the current deadline
    pub fn previous_action(&self) -> CompareAction {
        self.previous_action.get()
    }

    pub fn clock(&self) -> &'a ExtendedClock<K> {
        self.clock
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn config(&self) -> ScheduleConfig {
        self.config
    }

    /// Handler of the current or last deadline, for chaining from inside it
    pub fn handler(&self) -> Option<&'a dyn ActionHandler<'a, K, C>> {
        self.handler.get()
    }

    /// Non-blocking completion check.
    ///
    /// `Ok` once the action fired (or when nothing was ever scheduled),
    /// `Missed` after a miss or rejection, `WouldBlock` while pending.
    pub fn poll(&self) -> nb::Result<(), TimerError> {
        match self.state.get() {
            ActionState::Idle => Ok(()),
            ActionState::MissedAction => Err(nb::Error::Other(TimerError::Missed)),
            ActionState::WaitingToSchedule | ActionState::Scheduled => Err(nb::Error::WouldBlock),
        }
    }

    fn notify(&self) {
        if let Some(handler) = self.handler.get() {
            handler.on_action(self);
        }
    }
}

impl<'a, K: TimerCounter, C: CompareChannel> DeadlineAction<'a, K, C> {
    /// Schedule `action` at `action_ticks`, with the origin backdated from the
    /// current time by [`ScheduleConfig::backdate_ticks`].
    pub fn schedule(
        &self,
        action_ticks: Ticks,
        action: CompareAction,
        handler: Option<&'a dyn ActionHandler<'a, K, C>>,
    ) -> Result<()> {
        let origin_ticks = self.clock.now().wrapping_sub(self.config.backdate_ticks);
        self.schedule_from(action_ticks, action, origin_ticks, handler)
    }

    /// Schedule `action` at `action_ticks`.
    ///
    /// `origin_ticks` is a time known to be at or before the moment the caller
    /// decided on the deadline. The deadline counts as already past once the
    /// clock is further from the origin than the deadline is, so it must lie
    /// less than 2^31 ticks after the origin.
    ///
    /// Any pending deadline is cancelled first. Returns `Rejected` when the
    /// deadline had passed by the time the compare register was written; the
    /// handler has then already been told about the miss.
    pub fn schedule_from(
        &self,
        action_ticks: Ticks,
        action: CompareAction,
        origin_ticks: Ticks,
        handler: Option<&'a dyn ActionHandler<'a, K, C>>,
    ) -> Result<()> {
        {
            let _cs = self.clock.critical_section();
            if self.is_pending() {
                self.channel.disable_interrupt();
                self.channel.set_action(self.previous_action.get());
                log_debug!("preempted deadline {}", self.action_ticks.get());
            }
            self.previous_action.set(self.channel.action());

            self.handler.set(handler);
            self.action.set(action);
            self.action_ticks.set(action_ticks);
            self.origin_ticks.set(origin_ticks);
            self.state.set(ActionState::WaitingToSchedule);

            // Park the compare register behind the origin so a match before
            // the real value is written cannot look like the deadline.
            self.channel
                .set_compare(self.clock.compress(origin_ticks.wrapping_sub(1)));
            self.channel.clear_match_pending();
        }

        self.channel.enable_interrupt();
        self.try_schedule_sys_range(self.clock.now());

        let _cs = self.clock.critical_section();
        self.channel.set_compare(self.clock.compress(action_ticks));
        let now = self.clock.now();
        if has_elapsed(now, action_ticks, origin_ticks) && !self.channel.match_pending() {
            self.channel.disable_interrupt();
            self.channel.set_action(self.previous_action.get());
            self.state.set(ActionState::MissedAction);
            log_warn!("deadline {} rejected at {}", action_ticks, now);
            self.notify();
            return Err(TimerError::Rejected);
        }

        // The compare register now holds the deadline. If no earlier match of
        // it lies ahead, the next match is the deadline itself.
        self.try_schedule_sys_range(now);

        log_debug!("deadline {} accepted at {}", action_ticks, now);
        Ok(())
    }

    /// Arm the pin action once the deadline is within one counter range.
    ///
    /// `now` must have been read after the compare register last changed.
    fn try_schedule_sys_range(&self, now: Ticks) {
        let _cs = self.clock.critical_section();
        let action_ticks = self.action_ticks.get();
        if self.state.get() == ActionState::WaitingToSchedule
            && !has_reached(now, action_ticks, self.origin_ticks.get())
            && action_ticks.wrapping_sub(now) <= self.clock.max_sys_ticks()
        {
            self.channel.set_action(self.action.get());
            self.state.set(ActionState::Scheduled);
        }
    }

    /// Compare-match ISR body
    pub fn process_interrupt(&self) {
        let now = self.clock.now();
        let state = self.state.get();
        if !self.is_pending() {
            self.channel.disable_interrupt();
            return;
        }

        // A match at the deadline tick itself counts
        if !has_reached(now, self.action_ticks.get(), self.origin_ticks.get()) {
            self.try_schedule_sys_range(now);
            return;
        }

        self.channel.disable_interrupt();
        self.channel.set_action(self.previous_action.get());
        if state == ActionState::Scheduled {
            self.state.set(ActionState::Idle);
            log_debug!("deadline {} fired", self.action_ticks.get());
        } else {
            self.state.set(ActionState::MissedAction);
            log_warn!("deadline {} missed at {}", self.action_ticks.get(), now);
        }

        // The handler may reschedule, nothing below this line
        self.notify();
    }

    /// Cancel the pending deadline.
    ///
    /// Fails with `NotPending` if nothing is scheduled. Fails with `TooLate`
    /// if the hardware performed the action before the cancellation took
    /// effect. The channel is disarmed either way, but after `TooLate` the
    /// state is left as it was and the handler is not called.
    pub fn cancel(&self) -> Result<()> {
        let _cs = self.clock.critical_section();
        match self.state.get() {
            ActionState::Idle | ActionState::MissedAction => Err(TimerError::NotPending),
            ActionState::WaitingToSchedule => {
                self.channel.disable_interrupt();
                self.channel.set_action(self.previous_action.get());
                self.state.set(ActionState::Idle);
                log_debug!("deadline {} cancelled", self.action_ticks.get());
                Ok(())
            }
            ActionState::Scheduled => {
                // Move the match as far away as possible, then see whether the
                // real one got in first.
                let behind = self.clock.counter().count().wrapping_sub(1);
                self.channel
                    .set_compare(behind & self.clock.width().max());
                let fired = self.channel.match_pending();
                self.channel.disable_interrupt();
                self.channel.set_action(self.previous_action.get());

                if fired {
                    log_warn!("cancel of deadline {} too late", self.action_ticks.get());
                    return Err(TimerError::TooLate);
                }
                self.state.set(ActionState::Idle);
                log_debug!("deadline {} cancelled", self.action_ticks.get());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::{self, MockCounter, Simulator};
    use crate::hal::timer::CounterWidth;
    use embedded_hal::digital::v2::InputPin;

    const RANGE: u32 = 1 << 16;

    #[derive(Default)]
    struct Recorder {
        calls: Cell<u32>,
        last: Cell<Option<ActionState>>,
    }

    impl<'a, K, C> ActionHandler<'a, K, C> for Recorder {
        fn on_action(&self, action: &DeadlineAction<'a, K, C>) {
            self.calls.set(self.calls.get() + 1);
            self.last.set(Some(action.state()));
        }
    }

    fn running_clock(sim: &Simulator) -> ExtendedClock<MockCounter<'_>> {
        let clock = ExtendedClock::new(sim.counter());
        clock.configure(TimerClock::Clk).unwrap();
        clock
    }

    fn fires(action: CompareAction, initial: bool, expected: bool) {
        let sim = Simulator::new(CounterWidth::Bits16).with_access_cost(4);
        sim.set_pin(0, initial);
        let clock = running_clock(&sim);
        let deadline = DeadlineAction::new(&clock, sim.channel(0));

        let target = clock.now() + 10_000;
        deadline.schedule(target, action, None).unwrap();
        assert_eq!(deadline.state(), ActionState::Scheduled);

        mock::run(&clock, &[&deadline], 10_100);
        assert_eq!(deadline.state(), ActionState::Idle);
        assert_eq!(sim.pin(0).is_high().unwrap(), expected);
        assert!(clock.now() > target);
    }

    #[test]
    fn test_set_fires() {
        fires(CompareAction::Set, false, true);
    }

    #[test]
    fn test_clear_fires() {
        fires(CompareAction::Clear, true, false);
    }

    #[test]
    fn test_toggle_fires_once() {
        fires(CompareAction::Toggle, false, true);
    }

    #[test]
    fn test_pin_changes_on_the_deadline_tick() {
        let sim = Simulator::new(CounterWidth::Bits16).with_access_cost(4);
        let clock = running_clock(&sim);
        let deadline = DeadlineAction::new(&clock, sim.channel(0));

        let target = clock.now() + 5_000;
        deadline.schedule(target, CompareAction::Set, None).unwrap();
        while clock.now() < target - 20 {
            mock::run(&clock, &[&deadline], 1);
        }
        assert!(sim.pin(0).is_low().unwrap());

        sim.set_access_cost(0);
        while clock.now() < target {
            mock::run(&clock, &[&deadline], 1);
        }
        assert!(sim.pin(0).is_high().unwrap());
        assert_eq!(clock.now(), target);
        assert_eq!(deadline.state(), ActionState::Idle);
    }

    #[test]
    fn test_short_lead_on_slow_channel_is_rejected() {
        let sim = Simulator::new(CounterWidth::Bits16).with_access_cost(16);
        let clock = running_clock(&sim);
        let recorder = Recorder::default();
        let deadline = DeadlineAction::new(&clock, sim.channel(0));

        let target = clock.now() + 100;
        let result = deadline.schedule(target, CompareAction::Set, Some(&recorder));
        assert_eq!(result, Err(TimerError::Rejected));
        assert_eq!(deadline.state(), ActionState::MissedAction);
        assert_eq!(recorder.calls.get(), 1);
        assert_eq!(recorder.last.get(), Some(ActionState::MissedAction));

        mock::run(&clock, &[&deadline], 2 * RANGE);
        assert!(sim.pin(0).is_low().unwrap());
        assert_eq!(recorder.calls.get(), 1);
    }

    #[test]
    fn test_far_future_waits_then_fires() {
        let sim = Simulator::new(CounterWidth::Bits16).with_access_cost(4);
        let clock = running_clock(&sim);
        let recorder = Recorder::default();
        let deadline = DeadlineAction::new(&clock, sim.channel(0));

        let target = clock.now() + 3 * RANGE + 1_000;
        deadline
            .schedule(target, CompareAction::Set, Some(&recorder))
            .unwrap();
        assert_eq!(deadline.state(), ActionState::WaitingToSchedule);

        mock::run(&clock, &[&deadline], RANGE);
        assert_eq!(deadline.state(), ActionState::WaitingToSchedule);

        mock::run(&clock, &[&deadline], RANGE + 1_100);
        assert_eq!(deadline.state(), ActionState::Scheduled);
        assert!(sim.pin(0).is_low().unwrap());
        assert_eq!(recorder.calls.get(), 0);

        mock::run(&clock, &[&deadline], RANGE);
        assert_eq!(deadline.state(), ActionState::Idle);
        assert!(sim.pin(0).is_high().unwrap());
        assert_eq!(recorder.calls.get(), 1);
        assert_eq!(recorder.last.get(), Some(ActionState::Idle));
    }

    #[test]
    fn test_far_future_waits_then_fires_8bit() {
        let sim = Simulator::new(CounterWidth::Bits8).with_access_cost(1);
        let clock = running_clock(&sim);
        let recorder = Recorder::default();
        let deadline = DeadlineAction::new(&clock, sim.channel(1));

        let target = clock.now() + 5 * 256 + 100;
        deadline
            .schedule(target, CompareAction::Set, Some(&recorder))
            .unwrap();
        assert_eq!(deadline.state(), ActionState::WaitingToSchedule);

        while clock.now() < target - 300 {
            mock::run(&clock, &[&deadline], 1);
            assert_eq!(deadline.state(), ActionState::WaitingToSchedule);
        }
        while clock.now() < target - 20 {
            mock::run(&clock, &[&deadline], 1);
        }
        assert_eq!(deadline.state(), ActionState::Scheduled);
        assert!(sim.pin(1).is_low().unwrap());

        mock::run(&clock, &[&deadline], 40);
        assert_eq!(deadline.state(), ActionState::Idle);
        assert!(sim.pin(1).is_high().unwrap());
        assert_eq!(recorder.calls.get(), 1);
    }

    fn leads_around_one_range(width: CounterWidth, access_cost: u32) {
        let range = width.range();
        for lead in range - 16..range + 64 {
            let sim = Simulator::new(width).with_access_cost(access_cost);
            let clock = running_clock(&sim);
            let deadline = DeadlineAction::new(&clock, sim.channel(0));

            let target = clock.now() + lead;
            assert_eq!(
                deadline.schedule(target, CompareAction::Set, None),
                Ok(()),
                "lead {}",
                lead
            );
            mock::run(&clock, &[&deadline], lead + 64);
            assert_eq!(deadline.state(), ActionState::Idle, "lead {}", lead);
            assert!(sim.pin(0).is_high().unwrap(), "lead {}", lead);
        }
    }

    #[test]
    fn test_leads_around_one_range_never_miss_16bit() {
        leads_around_one_range(CounterWidth::Bits16, 4);
    }

    #[test]
    fn test_leads_around_one_range_never_miss_8bit() {
        leads_around_one_range(CounterWidth::Bits8, 1);
        leads_around_one_range(CounterWidth::Bits8, 4);
    }

    #[test]
    fn test_timed_callback_without_pin_action() {
        let sim = Simulator::new(CounterWidth::Bits16).with_access_cost(4);
        let clock = running_clock(&sim);
        let recorder = Recorder::default();
        let deadline = DeadlineAction::new(&clock, sim.channel(2));

        let target = clock.now() + 2 * RANGE + 500;
        deadline
            .schedule(target, CompareAction::Nothing, Some(&recorder))
            .unwrap();

        while deadline.is_pending() {
            mock::run(&clock, &[&deadline], 1);
        }
        assert_eq!(deadline.state(), ActionState::Idle);
        assert_eq!(recorder.calls.get(), 1);
        assert_eq!(recorder.last.get(), Some(ActionState::Idle));
        let fired_at = clock.now();
        assert!(fired_at >= target && fired_at < target + 64);
        assert!(sim.pin(2).is_low().unwrap());
    }

    #[test]
    fn test_deadline_across_extended_rollover() {
        let sim = Simulator::new(CounterWidth::Bits16).with_access_cost(4);
        let clock = running_clock(&sim);
        clock.set(u32::MAX - 10_000);
        let deadline = DeadlineAction::new(&clock, sim.channel(0));

        deadline.schedule(100, CompareAction::Set, None).unwrap();
        assert_eq!(deadline.state(), ActionState::Scheduled);
        assert!(deadline.origin_ticks() > u32::MAX - 20_000);

        mock::run(&clock, &[&deadline], 10_300);
        assert_eq!(deadline.state(), ActionState::Idle);
        assert!(sim.pin(0).is_high().unwrap());
        assert!(clock.now() > 100 && clock.now() < 1_000);
    }

    #[test]
    fn test_late_interrupt_is_a_miss() {
        let sim = Simulator::new(CounterWidth::Bits16).with_access_cost(4);
        let clock = running_clock(&sim);
        let recorder = Recorder::default();
        let deadline = DeadlineAction::new(&clock, sim.channel(0));

        let target = clock.now() + RANGE + 1_000;
        deadline
            .schedule(target, CompareAction::Set, Some(&recorder))
            .unwrap();
        assert_eq!(deadline.state(), ActionState::WaitingToSchedule);

        // Compare vector held off, overflows still serviced
        while clock.now() < target + 100 {
            sim.tick();
            if sim.take_overflow_irq() {
                sim.run_isr(|| clock.process_overflow());
            }
        }
        assert_eq!(deadline.state(), ActionState::WaitingToSchedule);

        mock::dispatch(&clock, &[&deadline]);
        assert_eq!(deadline.state(), ActionState::MissedAction);
        assert_eq!(recorder.last.get(), Some(ActionState::MissedAction));
        assert!(sim.pin(0).is_low().unwrap());
        assert_eq!(deadline.poll(), Err(nb::Error::Other(TimerError::Missed)));
    }

    #[test]
    fn test_deadline_at_origin_is_rejected() {
        let sim = Simulator::new(CounterWidth::Bits16).with_access_cost(4);
        let clock = running_clock(&sim);
        let deadline = DeadlineAction::new(&clock, sim.channel(0));

        let origin = clock.now();
        let result = deadline.schedule_from(origin, CompareAction::Set, origin, None);
        assert_eq!(result, Err(TimerError::Rejected));
        assert_eq!(deadline.state(), ActionState::MissedAction);
    }

    #[test]
    fn test_deadline_just_before_origin_is_far_future() {
        let sim = Simulator::new(CounterWidth::Bits16).with_access_cost(4);
        let clock = running_clock(&sim);
        let deadline = DeadlineAction::new(&clock, sim.channel(0));

        let origin = clock.now();
        deadline
            .schedule_from(origin.wrapping_sub(1), CompareAction::Set, origin, None)
            .unwrap();
        assert_eq!(deadline.state(), ActionState::WaitingToSchedule);
    }

    #[test]
    fn test_cancel_before_deadline() {
        let sim = Simulator::new(CounterWidth::Bits16).with_access_cost(4);
        let clock = running_clock(&sim);
        let recorder = Recorder::default();
        let deadline = DeadlineAction::new(&clock, sim.channel(0));

        let target = clock.now() + 10_000;
        deadline
            .schedule(target, CompareAction::Set, Some(&recorder))
            .unwrap();
        mock::run(&clock, &[&deadline], 1_000);

        assert_eq!(deadline.cancel(), Ok(()));
        assert_eq!(deadline.state(), ActionState::Idle);
        assert_eq!(sim.channel(0).action(), CompareAction::Nothing);

        mock::run(&clock, &[&deadline], 2 * RANGE);
        assert!(sim.pin(0).is_low().unwrap());
        assert_eq!(recorder.calls.get(), 0);
    }

    #[test]
    fn test_cancel_waiting_deadline() {
        let sim = Simulator::new(CounterWidth::Bits16).with_access_cost(4);
        let clock = running_clock(&sim);
        let deadline = DeadlineAction::new(&clock, sim.channel(0));

        let target = clock.now() + 2 * RANGE;
        deadline.schedule(target, CompareAction::Set, None).unwrap();
        assert_eq!(deadline.cancel(), Ok(()));
        assert_eq!(deadline.state(), ActionState::Idle);
    }

    #[test]
    fn test_cancel_after_hardware_fired() {
        let sim = Simulator::new(CounterWidth::Bits16).with_access_cost(4);
        let clock = running_clock(&sim);
        let recorder = Recorder::default();
        let deadline = DeadlineAction::new(&clock, sim.channel(0));

        let target = clock.now() + 200;
        deadline
            .schedule(target, CompareAction::Set, Some(&recorder))
            .unwrap();
        // Pin changes but the compare vector never runs
        sim.advance(300);
        assert!(sim.pin(0).is_high().unwrap());

        assert_eq!(deadline.cancel(), Err(TimerError::TooLate));
        assert_eq!(deadline.state(), ActionState::Scheduled);
        assert_eq!(sim.channel(0).action(), CompareAction::Nothing);
        assert_eq!(recorder.calls.get(), 0);

        // Disarmed: the compare vector stays quiet and nothing is reported
        mock::run(&clock, &[&deadline], 2 * RANGE);
        assert!(sim.pin(0).is_high().unwrap());
        assert_eq!(recorder.calls.get(), 0);
    }

    #[test]
    fn test_cancel_with_nothing_pending() {
        let sim = Simulator::new(CounterWidth::Bits8);
        let clock = running_clock(&sim);
        let deadline = DeadlineAction::new(&clock, sim.channel(2));
        assert_eq!(deadline.cancel(), Err(TimerError::NotPending));
    }

    #[test]
    fn test_reschedule_replaces_pending_deadline() {
        let sim = Simulator::new(CounterWidth::Bits16).with_access_cost(4);
        let clock = running_clock(&sim);
        let deadline = DeadlineAction::new(&clock, sim.channel(0));

        let now = clock.now();
        deadline.schedule(now + 3_000, CompareAction::Set, None).unwrap();
        deadline.schedule(now + 6_000, CompareAction::Set, None).unwrap();
        assert_eq!(deadline.previous_action(), CompareAction::Nothing);
        assert_eq!(deadline.action_ticks(), now + 6_000);

        mock::run(&clock, &[&deadline], 4_000);
        assert!(sim.pin(0).is_low().unwrap());
        assert_eq!(deadline.state(), ActionState::Scheduled);

        mock::run(&clock, &[&deadline], 3_000);
        assert!(sim.pin(0).is_high().unwrap());
        assert_eq!(deadline.state(), ActionState::Idle);
    }

    struct Retrigger {
        remaining: Cell<u32>,
    }

    impl<'a, K: TimerCounter, C: CompareChannel> ActionHandler<'a, K, C> for Retrigger {
        fn on_action(&self, action: &DeadlineAction<'a, K, C>) {
            let left = self.remaining.get();
            if action.state() != ActionState::Idle || left == 0 {
                return;
            }
            self.remaining.set(left - 1);
            let last = action.action_ticks();
            let _ = action.schedule_from(last + 1_000, action.action(), last, action.handler());
        }
    }

    #[test]
    fn test_handler_can_reschedule() {
        let sim = Simulator::new(CounterWidth::Bits16).with_access_cost(4);
        let clock = running_clock(&sim);
        let retrigger = Retrigger {
            remaining: Cell::new(2),
        };
        let deadline = DeadlineAction::new(&clock, sim.channel(1));

        let first = clock.now() + 1_000;
        deadline
            .schedule(first, CompareAction::Toggle, Some(&retrigger))
            .unwrap();
        mock::run(&clock, &[&deadline], 4_000);

        assert_eq!(deadline.state(), ActionState::Idle);
        assert_eq!(deadline.action_ticks(), first + 2_000);
        assert_eq!(retrigger.remaining.get(), 0);
        // Three toggles
        assert!(sim.pin(1).is_high().unwrap());
    }

    #[test]
    fn test_poll_tracks_completion() {
        let sim = Simulator::new(CounterWidth::Bits16).with_access_cost(4);
        let clock = running_clock(&sim);
        let deadline = DeadlineAction::new(&clock, sim.channel(0));
        assert_eq!(deadline.poll(), Ok(()));

        deadline
            .schedule(clock.now() + 1_000, CompareAction::Set, None)
            .unwrap();
        assert_eq!(deadline.poll(), Err(nb::Error::WouldBlock));

        mock::run(&clock, &[&deadline], 1_100);
        assert_eq!(deadline.poll(), Ok(()));
    }

    #[test]
    fn test_backdate_scales_with_prescaler() {
        assert_eq!(ScheduleConfig::for_clock(TimerClock::Clk).backdate_ticks, 1024);
        assert_eq!(ScheduleConfig::for_clock(TimerClock::ClkDiv64).backdate_ticks, 16);
        assert_eq!(ScheduleConfig::for_clock(TimerClock::None).backdate_ticks, 0);
        assert_eq!(ScheduleConfig::default(), ScheduleConfig::for_clock(DEFAULT_CLOCK));
    }
}
