//! Logging abstraction
//!
//! The scheduling core logs from interrupt context, so the macros have to stay
//! cheap on the target:
//! - `defmt` feature: lowered to `defmt` (needs a global logger in the firmware)
//! - Host tests: `println!`
//! - Anything else: compiled out

/// Log a state-machine transition or other trace detail
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::debug!($($arg)*);

        #[cfg(all(not(feature = "defmt"), test))]
        ::std::println!("[DEBUG] {}", ::std::format!($($arg)*));
    }};
}

/// Log a missed deadline or a failed cancellation
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::warn!($($arg)*);

        #[cfg(all(not(feature = "defmt"), test))]
        ::std::println!("[WARN] {}", ::std::format!($($arg)*));
    }};
}
