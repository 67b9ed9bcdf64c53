pub mod timer;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(target_arch = "avr")]
pub mod atmega128;
#[cfg(target_arch = "avr")]
pub mod uart;

pub use timer::{
    CompareAction, CompareChannel, CounterWidth, InterruptControl, TimerClock, TimerCounter,
};

#[cfg(target_arch = "avr")]
pub use atmega128::{
    Oc0, Oc1a, Oc1b, Oc1c, Oc2, Oc3a, Oc3b, Oc3c, Timer0, Timer1, Timer2, Timer3,
};
#[cfg(target_arch = "avr")]
pub use uart::Uart;
