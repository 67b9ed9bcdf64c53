//! Scoped critical sections
//!
//! A [`CriticalSection`] masks interrupts for as long as it lives and puts back
//! whatever interrupt-enable state the caller had when it is dropped. Guards
//! nest: an inner guard restores "disabled" and only the outermost one turns
//! interrupts back on.
//!
//! [`IsrShared`] places the crate's timer objects in `static`s that thread
//! and interrupt context share.

use core::ops::Deref;

use crate::action::DeadlineAction;
use crate::clock::ExtendedClock;
use crate::hal::timer::{CompareChannel, InterruptControl, TimerCounter};
use crate::pulse::PulseSequencer;

/// Interrupts stay masked until this guard is dropped.
#[must_use = "interrupts are re-enabled as soon as the guard is dropped"]
pub struct CriticalSection<'a, I: InterruptControl + ?Sized> {
    irq: &'a I,
    saved: Option<I::Token>,
}

impl<'a, I: InterruptControl + ?Sized> CriticalSection<'a, I> {
    #[inline]
    pub fn enter(irq: &'a I) -> Self {
        let saved = irq.disable_save();
        Self {
            irq,
            saved: Some(saved),
        }
    }
}

impl<I: InterruptControl + ?Sized> Drop for CriticalSection<'_, I> {
    #[inline]
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.irq.restore(saved);
        }
    }
}

/// Types that can be shared between thread and interrupt context on a
/// single-core MCU.
///
/// # Safety
///
/// Every mutation must go through `Cell`s, and every update that spans more
/// than one field or register access must run inside a [`CriticalSection`].
/// Plain data without that discipline belongs in
/// `avr_device::interrupt::Mutex` instead.
pub unsafe trait IsrSafe {}

unsafe impl<K: TimerCounter> IsrSafe for ExtendedClock<K> {}
unsafe impl<K: TimerCounter, C: CompareChannel> IsrSafe for DeadlineAction<'_, K, C> {}
unsafe impl<K: TimerCounter, C: CompareChannel> IsrSafe for PulseSequencer<'_, K, C> {}

/// A clock, action or pulse in a `static`, reachable from its ISRs.
///
/// Unlike a `Mutex` the value is usable without a critical-section token,
/// which lets statics reference each other in their initializers.
pub struct IsrShared<T: IsrSafe>(pub T);

// Single core, and `T` upholds the `IsrSafe` contract
unsafe impl<T: IsrSafe> Sync for IsrShared<T> {}

impl<T: IsrSafe> IsrShared<T> {
    pub const fn new(value: T) -> Self {
        Self(value)
    }
}

impl<T: IsrSafe> Deref for IsrShared<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}
