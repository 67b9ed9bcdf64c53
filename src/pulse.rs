//! Two-edge pulses on one compare channel
//!
//! A [`PulseSequencer`] drives its pin high at `start` and low again at `end`
//! by chaining two deadlines on the same [`DeadlineAction`]: the start edge
//! is scheduled by the caller, the end edge from the start edge's completion,
//! measured from `start` as origin.
//!
//! `end` has to be reachable from `start`: the distance must exceed the time
//! the compare interrupt needs to re-arm the channel, otherwise the pulse
//! ends in [`PulseState::MissedEnd`] with the pin left high.

use core::cell::Cell;

use crate::action::{ActionHandler, ActionState, DeadlineAction};
use crate::error::{Result, TimerError};
use crate::hal::timer::{CompareAction, CompareChannel, TimerCounter};
use crate::ticks::Ticks;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PulseState {
    Idle,
    ScheduledStart,
    ScheduledEnd,
    MissedStart,
    MissedEnd,
}

/// State-change callback of a [`PulseSequencer`].
///
/// Called on every transition, usually from interrupt context. Must not block.
pub trait PulseHandler<'a, K, C> {
    fn on_state_change(&self, pulse: &PulseSequencer<'a, K, C>);
}

impl<'a, K, C, F> PulseHandler<'a, K, C> for F
where
    F: Fn(&PulseSequencer<'a, K, C>),
{
    fn on_state_change(&self, pulse: &PulseSequencer<'a, K, C>) {
        self(pulse)
    }
}

pub struct PulseSequencer<'a, K, C> {
    action: &'a DeadlineAction<'a, K, C>,
    state: Cell<PulseState>,
    start: Cell<Ticks>,
    end: Cell<Ticks>,
    on_change: Cell<Option<&'a dyn PulseHandler<'a, K, C>>>,
}

impl<'a, K, C> PulseSequencer<'a, K, C> {
    pub const fn new(action: &'a DeadlineAction<'a, K, C>) -> Self {
        Self {
            action,
            state: Cell::new(PulseState::Idle),
            start: Cell::new(0),
            end: Cell::new(0),
            on_change: Cell::new(None),
        }
    }

    pub fn state(&self) -> PulseState {
        self.state.get()
    }

    pub fn start(&self) -> Ticks {
        self.start.get()
    }

    pub fn end(&self) -> Ticks {
        self.end.get()
    }

    pub fn action(&self) -> &'a DeadlineAction<'a, K, C> {
        self.action
    }

    pub fn set_state_change_callback(&self, handler: Option<&'a dyn PulseHandler<'a, K, C>>) {
        self.on_change.set(handler);
    }

    /// `Ok` once the pulse completed, `Missed` if either edge was missed
    pub fn poll(&self) -> nb::Result<(), TimerError> {
        match self.state.get() {
            PulseState::Idle => Ok(()),
            PulseState::MissedStart | PulseState::MissedEnd => {
                Err(nb::Error::Other(TimerError::Missed))
            }
            PulseState::ScheduledStart | PulseState::ScheduledEnd => Err(nb::Error::WouldBlock),
        }
    }

    fn transition(&self, state: PulseState) {
        self.state.set(state);
        if let Some(handler) = self.on_change.get() {
            handler.on_state_change(self);
        }
    }
}

impl<'a, K: TimerCounter + 'a, C: CompareChannel + 'a> PulseSequencer<'a, K, C> {
    /// Schedule a pulse from `start` to `end`.
    ///
    /// Replaces a pulse that is still in progress. Fails with `Rejected` when
    /// the start edge can no longer be met, leaving the state `MissedStart`.
    pub fn schedule(&'a self, start: Ticks, end: Ticks) -> Result<()> {
        let _cs = self.action.clock().critical_section();
        self.start.set(start);
        self.end.set(end);
        self.state.set(PulseState::ScheduledStart);

        // On rejection the handler below has already moved us to MissedStart
        self.action.schedule(start, CompareAction::Set, Some(self))?;
        log_debug!("pulse {}..{} scheduled", start, end);
        self.transition(PulseState::ScheduledStart);
        Ok(())
    }

    /// Cancel a pulse whose start edge has not fired.
    ///
    /// If the start edge fires before the cancellation takes effect this
    /// fails with `TooLate`. The channel is disarmed regardless, so the pin
    /// stays high and the state stays `ScheduledStart` until the next
    /// [`schedule`](Self::schedule).
    pub fn cancel(&self) -> Result<()> {
        self.cancel_in(PulseState::ScheduledStart)
    }

    /// Cancel the end edge of a pulse that has already started. The pin stays
    /// high.
    pub fn cancel_end(&self) -> Result<()> {
        self.cancel_in(PulseState::ScheduledEnd)
    }

    fn cancel_in(&self, expected: PulseState) -> Result<()> {
        let _cs = self.action.clock().critical_section();
        if self.state.get() != expected {
            return Err(TimerError::NotPending);
        }
        self.action.cancel()?;
        self.transition(PulseState::Idle);
        Ok(())
    }

    fn start_fired(&self, action: &DeadlineAction<'a, K, C>) {
        self.state.set(PulseState::ScheduledEnd);
        let chained = action.schedule_from(
            self.end.get(),
            CompareAction::Clear,
            self.start.get(),
            action.handler(),
        );
        // A rejected end edge has already been reported as MissedEnd
        if chained.is_ok() {
            self.transition(PulseState::ScheduledEnd);
        }
    }
}

impl<'a, K: TimerCounter + 'a, C: CompareChannel + 'a> ActionHandler<'a, K, C>
    for PulseSequencer<'a, K, C>
{
    fn on_action(&self, action: &DeadlineAction<'a, K, C>) {
        match (self.state.get(), action.state()) {
            (PulseState::ScheduledStart, ActionState::Idle) => self.start_fired(action),
            (PulseState::ScheduledStart, _) => {
                log_warn!("pulse start {} missed", self.start.get());
                self.transition(PulseState::MissedStart);
            }
            (PulseState::ScheduledEnd, ActionState::Idle) => self.transition(PulseState::Idle),
            (PulseState::ScheduledEnd, _) => {
                log_warn!("pulse end {} missed", self.end.get());
                self.transition(PulseState::MissedEnd);
            }
            _ => {}
        }
    }
}
