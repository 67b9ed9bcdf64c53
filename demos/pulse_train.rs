//! Interrupt-driven pulse train on OC3A (PE3)
//!
//! Each completed pulse schedules the next one from its state-change callback,
//! so the train keeps its period without the main loop. A missed edge is
//! counted and the main loop restarts the train from the current time.

#![cfg_attr(target_arch = "avr", no_std)]
#![cfg_attr(target_arch = "avr", no_main)]
#![cfg_attr(target_arch = "avr", feature(abi_avr_interrupt))]

#[cfg(target_arch = "avr")]
mod board {
    use core::cell::Cell;

    use avr_device::interrupt::{self, Mutex};
    use panic_halt as _;

    use avr_timer_ext::critical::IsrShared;
    use avr_timer_ext::hal::{Oc3a, Timer3, TimerClock, Uart};
    use avr_timer_ext::ticks::{micros_to_ticks, Ticks};
    use avr_timer_ext::{DeadlineAction, ExtendedClock, PulseSequencer, PulseState};
    use ufmt::uwriteln;

    const CLOCK_SOURCE: TimerClock = TimerClock::ClkDiv8;
    const DDRE: *mut u8 = 0x22 as *mut u8;
    const OC3A_PIN: u8 = 1 << 3;

    type Pulse = PulseSequencer<'static, Timer3, Oc3a>;

    static CLOCK: IsrShared<ExtendedClock<Timer3>> =
        IsrShared::new(ExtendedClock::new(Timer3::new()));
    static ACTION: IsrShared<DeadlineAction<'static, Timer3, Oc3a>> =
        IsrShared::new(DeadlineAction::new(&CLOCK.0, Oc3a::new()));
    static PULSE: IsrShared<Pulse> = IsrShared::new(PulseSequencer::new(&ACTION.0));

    static TRAIN: Mutex<Train> = Mutex::new(Train {
        width: Cell::new(0),
        period: Cell::new(0),
        done: Cell::new(0),
        missed: Cell::new(0),
        restart: Cell::new(false),
    });

    struct Train {
        width: Cell<Ticks>,
        period: Cell<Ticks>,
        done: Cell<u32>,
        missed: Cell<u32>,
        restart: Cell<bool>,
    }

    impl Train {
        fn launch(&self, start: Ticks) {
            let end = start.wrapping_add(self.width.get());
            // A rejected start comes back through `next_pulse` as MissedStart
            let _ = PULSE.schedule(start, end);
        }
    }

    fn next_pulse(pulse: &Pulse) {
        interrupt::free(|cs| {
            let train = TRAIN.borrow(cs);
            match pulse.state() {
                PulseState::Idle => {
                    train.done.set(train.done.get().wrapping_add(1));
                    train.launch(pulse.start().wrapping_add(train.period.get()));
                }
                PulseState::MissedStart | PulseState::MissedEnd => {
                    // Relaunched by the main loop, never from inside a rejection
                    train.missed.set(train.missed.get().wrapping_add(1));
                    train.restart.set(true);
                }
                PulseState::ScheduledStart | PulseState::ScheduledEnd => {}
            }
        });
    }

    #[avr_device::interrupt(atmega128a)]
    fn TIMER3_OVF() {
        CLOCK.process_overflow();
    }

    #[avr_device::interrupt(atmega128a)]
    fn TIMER3_COMPA() {
        ACTION.process_interrupt();
    }

    #[avr_device::entry]
    fn main() -> ! {
        let mut serial = Uart::new(9600);
        unsafe {
            core::ptr::write_volatile(DDRE, core::ptr::read_volatile(DDRE) | OC3A_PIN);
        }

        if CLOCK.configure(CLOCK_SOURCE).is_err() {
            uwriteln!(&mut serial, "timer setup failed").ok();
            #[allow(clippy::empty_loop)]
            loop {}
        }

        interrupt::free(|cs| {
            let train = TRAIN.borrow(cs);
            train.width.set(micros_to_ticks(250, CLOCK_SOURCE));
            train.period.set(micros_to_ticks(1_000, CLOCK_SOURCE));
            train.restart.set(true);
        });
        PULSE.set_state_change_callback(Some(&next_pulse));
        unsafe { avr_device::interrupt::enable() };

        let report_every = micros_to_ticks(1_000_000, CLOCK_SOURCE);
        let mut report_at = CLOCK.now();
        loop {
            interrupt::free(|cs| {
                let train = TRAIN.borrow(cs);
                if train.restart.replace(false) {
                    train.launch(CLOCK.now().wrapping_add(train.period.get()));
                }
            });

            let now = CLOCK.now();
            if now.wrapping_sub(report_at) < report_every {
                continue;
            }
            report_at = now;

            let (done, missed) = interrupt::free(|cs| {
                let train = TRAIN.borrow(cs);
                (train.done.get(), train.missed.get())
            });
            uwriteln!(&mut serial, "pulses {} missed {}", done, missed).ok();
        }
    }
}

#[cfg(not(target_arch = "avr"))]
fn main() {
    eprintln!("pulse_train is AVR firmware");
}
