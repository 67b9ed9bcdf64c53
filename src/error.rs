//! Error types for scheduling and cancellation
//!
//! Nothing in this crate panics or retries. Every failure comes back to the
//! caller as a `TimerError` and, where a deadline is involved, is also
//! reflected in the owning state machine.

use core::fmt;

/// Result type for timer operations
pub type Result<T> = core::result::Result<T, TimerError>;

/// Timer scheduling errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerError {
    /// The deadline was already behind the counter when the compare register was written
    Rejected,
    /// An accepted deadline elapsed without the hardware performing the action
    Missed,
    /// The action had already fired when cancellation reached the hardware
    TooLate,
    /// There is no pending deadline to cancel
    NotPending,
    /// The timer cannot run from the requested prescaler
    UnsupportedClock,
}

impl TimerError {
    pub const fn as_str(self) -> &'static str {
        match self {
            TimerError::Rejected => "schedule rejected: not enough lead time",
            TimerError::Missed => "deadline missed",
            TimerError::TooLate => "cancel too late: action already fired",
            TimerError::NotPending => "nothing to cancel",
            TimerError::UnsupportedClock => "prescaler not supported by this timer",
        }
    }
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ufmt::uDisplay for TimerError {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> core::result::Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_serial_output() {
        let mut serial = String::new();
        ufmt::uwrite!(&mut serial, "{}", TimerError::TooLate).unwrap();
        assert_eq!(serial, TimerError::TooLate.to_string());
        assert_eq!(serial, "cancel too late: action already fired");
    }

    #[test]
    fn test_every_error_has_a_message() {
        for err in [
            TimerError::Rejected,
            TimerError::Missed,
            TimerError::TooLate,
            TimerError::NotPending,
            TimerError::UnsupportedClock,
        ] {
            assert!(!err.as_str().is_empty());
        }
    }
}
