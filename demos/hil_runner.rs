//! Hardware-in-the-loop timer tests
//!
//! Runs the timer test cases on Timer3 (16-bit) and Timer2 (8-bit) and prints
//! the report on USART0.

#![cfg_attr(target_arch = "avr", no_std)]
#![cfg_attr(target_arch = "avr", no_main)]
#![cfg_attr(target_arch = "avr", feature(abi_avr_interrupt))]

#[cfg(target_arch = "avr")]
mod board {
    use panic_halt as _;

    use avr_timer_ext::critical::IsrShared;
    use avr_timer_ext::hal::{Oc2, Oc3a, Timer2, Timer3, TimerClock, Uart};
    use avr_timer_ext::testing::{
        CancelBeforeDeadline, ClockMonotonic, FiresOnTime, RejectsElapsedDeadline, TestRunner,
    };
    use avr_timer_ext::{DeadlineAction, ExtendedClock};
    use ufmt::uwriteln;

    static CLOCK3: IsrShared<ExtendedClock<Timer3>> =
        IsrShared::new(ExtendedClock::new(Timer3::new()));
    static ACTION3A: IsrShared<DeadlineAction<'static, Timer3, Oc3a>> =
        IsrShared::new(DeadlineAction::new(&CLOCK3.0, Oc3a::new()));

    static CLOCK2: IsrShared<ExtendedClock<Timer2>> =
        IsrShared::new(ExtendedClock::new(Timer2::new()));
    static ACTION2: IsrShared<DeadlineAction<'static, Timer2, Oc2>> =
        IsrShared::new(DeadlineAction::new(&CLOCK2.0, Oc2::new()));

    #[avr_device::interrupt(atmega128a)]
    fn TIMER3_OVF() {
        CLOCK3.process_overflow();
    }

    #[avr_device::interrupt(atmega128a)]
    fn TIMER3_COMPA() {
        ACTION3A.process_interrupt();
    }

    #[avr_device::interrupt(atmega128a)]
    fn TIMER2_OVF() {
        CLOCK2.process_overflow();
    }

    #[avr_device::interrupt(atmega128a)]
    fn TIMER2_COMP() {
        ACTION2.process_interrupt();
    }

    fn idle() {}

    #[avr_device::entry]
    fn main() -> ! {
        let mut runner = TestRunner::new(Uart::new(9600));

        let clock3 = CLOCK3.configure(TimerClock::ClkDiv8);
        let clock2 = CLOCK2.configure(TimerClock::ClkDiv64);
        unsafe { avr_device::interrupt::enable() };

        if clock3.is_err() || clock2.is_err() {
            let mut serial = runner.into_inner();
            uwriteln!(&mut serial, "timer setup failed").ok();
            #[allow(clippy::empty_loop)]
            loop {}
        }

        let timer3_tests = (
            ClockMonotonic {
                clock: &CLOCK3.0,
                samples: 20_000,
                idle,
            },
            FiresOnTime {
                action: &ACTION3A.0,
                lead: 5_000,
                timeout: 1_000_000,
                idle,
            },
            FiresOnTime {
                action: &ACTION3A.0,
                lead: 200_000,
                timeout: 1_000_000,
                idle,
            },
            RejectsElapsedDeadline { action: &ACTION3A.0 },
            CancelBeforeDeadline {
                action: &ACTION3A.0,
                lead: 50_000,
                idle,
            },
        );
        runner.run_suite(
            "Timer3",
            &[
                &timer3_tests.0,
                &timer3_tests.1,
                &timer3_tests.2,
                &timer3_tests.3,
                &timer3_tests.4,
            ],
        );

        let timer2_tests = (
            ClockMonotonic {
                clock: &CLOCK2.0,
                samples: 20_000,
                idle,
            },
            FiresOnTime {
                action: &ACTION2.0,
                lead: 2_000,
                timeout: 1_000_000,
                idle,
            },
            RejectsElapsedDeadline { action: &ACTION2.0 },
        );
        runner.run_suite(
            "Timer2",
            &[&timer2_tests.0, &timer2_tests.1, &timer2_tests.2],
        );

        let passed = runner.all_passed();
        let mut serial = runner.into_inner();
        uwriteln!(&mut serial, "{}", if passed { "ALL PASS" } else { "FAILURES" }).ok();

        #[allow(clippy::empty_loop)]
        loop {}
    }
}

#[cfg(not(target_arch = "avr"))]
fn main() {
    eprintln!("hil_runner is AVR firmware");
}
