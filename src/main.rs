//! Pulse demo firmware
//!
//! Drives a 1 ms pulse on OC1A (PB5) every 10 ms from Timer1 and reports
//! each result on USART0.

#![cfg_attr(target_arch = "avr", no_std)]
#![cfg_attr(target_arch = "avr", no_main)]
#![cfg_attr(target_arch = "avr", feature(abi_avr_interrupt))]

#[cfg(target_arch = "avr")]
mod firmware {
    use panic_halt as _;

    use avr_timer_ext::config::DEFAULT_CLOCK;
    use avr_timer_ext::critical::IsrShared;
    use avr_timer_ext::hal::{Oc1a, Timer1, Uart};
    use avr_timer_ext::ticks::millis_to_ticks;
    use avr_timer_ext::{DeadlineAction, ExtendedClock, PulseSequencer};
    use ufmt::uwriteln;

    const BAUD: u32 = 9600;
    const DDRB: *mut u8 = 0x37 as *mut u8;
    const OC1A_PIN: u8 = 1 << 5;

    static CLOCK: IsrShared<ExtendedClock<Timer1>> =
        IsrShared::new(ExtendedClock::new(Timer1::new()));
    static ACTION: IsrShared<DeadlineAction<'static, Timer1, Oc1a>> =
        IsrShared::new(DeadlineAction::new(&CLOCK.0, Oc1a::new()));
    static PULSE: IsrShared<PulseSequencer<'static, Timer1, Oc1a>> =
        IsrShared::new(PulseSequencer::new(&ACTION.0));

    #[avr_device::interrupt(atmega128a)]
    fn TIMER1_OVF() {
        CLOCK.process_overflow();
    }

    #[avr_device::interrupt(atmega128a)]
    fn TIMER1_COMPA() {
        ACTION.process_interrupt();
    }

    #[avr_device::entry]
    fn main() -> ! {
        let mut serial = Uart::new(BAUD);

        unsafe {
            core::ptr::write_volatile(DDRB, core::ptr::read_volatile(DDRB) | OC1A_PIN);
        }

        if let Err(err) = CLOCK.configure(DEFAULT_CLOCK) {
            uwriteln!(&mut serial, "timer setup failed: {}", err).ok();
            #[allow(clippy::empty_loop)]
            loop {}
        }
        unsafe { avr_device::interrupt::enable() };

        uwriteln!(&mut serial, "ATmega128 pulse demo").ok();

        let width = millis_to_ticks(1, DEFAULT_CLOCK);
        let period = millis_to_ticks(10, DEFAULT_CLOCK);
        let mut start = CLOCK.now().wrapping_add(period);
        let mut pulses: u32 = 0;

        loop {
            let end = start.wrapping_add(width);
            let result = PULSE
                .schedule(start, end)
                .and_then(|()| nb::block!(PULSE.poll()));

            match result {
                Ok(()) => {
                    pulses = pulses.wrapping_add(1);
                    if pulses % 100 == 0 {
                        uwriteln!(&mut serial, "{} pulses, t={}", pulses, CLOCK.now()).ok();
                    }
                }
                Err(err) => {
                    uwriteln!(&mut serial, "pulse at {} failed: {}", start, err).ok();
                    // Start over from the present
                    start = CLOCK.now();
                }
            }
            start = start.wrapping_add(period);
        }
    }
}

#[cfg(not(target_arch = "avr"))]
fn main() {
    eprintln!("pulse_demo is AVR firmware; run the library tests on the host instead");
}
