//! On-target test runner
//!
//! Runs [`TestCase`]s against real timers and reports over any `ufmt` writer,
//! normally the serial port. The timer cases are generic over the peripheral
//! traits, so the same cases also run on the host against `hal::mock`.
//!
//! Every case that waits takes an `idle` hook. On the board it can be a no-op
//! (interrupts do the work); the simulator uses it to advance time.

use ufmt::{uDisplay, uWrite, uwrite, Formatter};

use crate::action::{ActionState, DeadlineAction};
use crate::clock::ExtendedClock;
use crate::error::TimerError;
use crate::hal::timer::{CompareAction, CompareChannel, TimerCounter};
use crate::ticks::Ticks;

pub struct TestRunner<W> {
    out: W,
    total_tests: u32,
    passed_tests: u32,
    current_suite: &'static str,
}

pub trait TestCase {
    fn run(&self) -> TestResult;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestResult {
    Pass,
    Fail(TestError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestError {
    AssertionFailed(&'static str),
    Timeout,
    Timer(TimerError),
}

impl From<TimerError> for TestError {
    fn from(err: TimerError) -> Self {
        TestError::Timer(err)
    }
}

impl uDisplay for TestError {
    fn fmt<W>(&self, f: &mut Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: uWrite + ?Sized,
    {
        match self {
            TestError::AssertionFailed(msg) => f.write_str(msg),
            TestError::Timeout => f.write_str("timeout"),
            TestError::Timer(err) => uwrite!(f, "timer error: {}", err),
        }
    }
}

impl<W: uWrite> TestRunner<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            total_tests: 0,
            passed_tests: 0,
            current_suite: "",
        }
    }

    pub fn run_suite(&mut self, name: &'static str, tests: &[&dyn TestCase]) {
        self.current_suite = name;
        uwrite!(&mut self.out, "\n=== Test Suite: {} ===\n", name).ok();

        for test in tests {
            self.total_tests += 1;
            uwrite!(&mut self.out, "Running {}: ", test.name()).ok();

            match test.run() {
                TestResult::Pass => {
                    self.passed_tests += 1;
                    self.out.write_str("PASS\n").ok();
                }
                TestResult::Fail(err) => {
                    uwrite!(&mut self.out, "FAIL - {}\n", err).ok();
                }
            }
        }

        self.print_summary();
    }

    fn print_summary(&mut self) {
        let percent = match self.total_tests {
            0 => 0,
            total => self.passed_tests * 100 / total,
        };
        uwrite!(&mut self.out, "\nTest Summary for {}:\n", self.current_suite).ok();
        uwrite!(
            &mut self.out,
            "Passed: {}/{} ({}%)\n",
            self.passed_tests,
            self.total_tests,
            percent
        )
        .ok();
    }

    pub fn passed(&self) -> u32 {
        self.passed_tests
    }

    pub fn total(&self) -> u32 {
        self.total_tests
    }

    pub fn all_passed(&self) -> bool {
        self.passed_tests == self.total_tests
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[macro_export]
macro_rules! check_eq {
    ($left:expr, $right:expr) => {
        if ($left) != ($right) {
            return $crate::testing::TestResult::Fail($crate::testing::TestError::AssertionFailed(
                concat!(
                    "check failed: `",
                    stringify!($left),
                    " == ",
                    stringify!($right),
                    "`"
                ),
            ));
        }
    };
}

#[macro_export]
macro_rules! check_within {
    ($value:expr, $target:expr, $tolerance:expr) => {
        if ($value).abs_diff($target) > $tolerance {
            return $crate::testing::TestResult::Fail($crate::testing::TestError::AssertionFailed(
                concat!(
                    "check failed: `",
                    stringify!($value),
                    "` within ",
                    stringify!($tolerance),
                    " of `",
                    stringify!($target),
                    "`"
                ),
            ));
        }
    };
}

/// Poll `$cond`, calling `$idle` between polls, for at most `$budget` rounds
#[macro_export]
macro_rules! check_timeout {
    ($cond:expr, $budget:expr, $idle:expr) => {
        let mut budget: u32 = $budget;
        while !$cond {
            if budget == 0 {
                return $crate::testing::TestResult::Fail($crate::testing::TestError::Timeout);
            }
            budget -= 1;
            ($idle)();
        }
    };
}

/// Extended clock never runs backwards across overflows
pub struct ClockMonotonic<'r, K, F> {
    pub clock: &'r ExtendedClock<K>,
    pub samples: u32,
    pub idle: F,
}

impl<K: TimerCounter, F: Fn()> TestCase for ClockMonotonic<'_, K, F> {
    fn name(&self) -> &'static str {
        "Clock Monotonic"
    }

    fn run(&self) -> TestResult {
        let start = self.clock.now();
        let mut last = start;
        for _ in 0..self.samples {
            (self.idle)();
            let now = self.clock.now();
            check_eq!(now.wrapping_sub(start) >= last.wrapping_sub(start), true);
            last = now;
        }
        check_eq!(last != start, true);
        TestResult::Pass
    }
}

/// Toggle scheduled `lead` ticks ahead completes without a miss
pub struct FiresOnTime<'r, 'a, K, C, F> {
    pub action: &'r DeadlineAction<'a, K, C>,
    pub lead: Ticks,
    pub timeout: u32,
    pub idle: F,
}

impl<'a, K: TimerCounter, C: CompareChannel, F: Fn()> TestCase for FiresOnTime<'_, 'a, K, C, F> {
    fn name(&self) -> &'static str {
        "Deadline Fires"
    }

    fn run(&self) -> TestResult {
        let clock = self.action.clock();
        let target = clock.now().wrapping_add(self.lead);
        if let Err(err) = self.action.schedule(target, CompareAction::Toggle, None) {
            return TestResult::Fail(err.into());
        }

        check_timeout!(self.action.poll().is_ok(), self.timeout, self.idle);
        check_eq!(self.action.state(), ActionState::Idle);
        check_within!(clock.now(), target, self.lead);
        TestResult::Pass
    }
}

/// A deadline equal to its own origin must come back `Rejected`
pub struct RejectsElapsedDeadline<'r, 'a, K, C> {
    pub action: &'r DeadlineAction<'a, K, C>,
}

impl<'a, K: TimerCounter, C: CompareChannel> TestCase for RejectsElapsedDeadline<'_, 'a, K, C> {
    fn name(&self) -> &'static str {
        "Elapsed Deadline Rejected"
    }

    fn run(&self) -> TestResult {
        let origin = self.action.clock().now();
        let result = self
            .action
            .schedule_from(origin, CompareAction::Toggle, origin, None);
        check_eq!(result, Err(TimerError::Rejected));
        check_eq!(self.action.state(), ActionState::MissedAction);
        TestResult::Pass
    }
}

/// Cancelling well ahead of the deadline succeeds and nothing fires
pub struct CancelBeforeDeadline<'r, 'a, K, C, F> {
    pub action: &'r DeadlineAction<'a, K, C>,
    pub lead: Ticks,
    pub idle: F,
}

impl<'a, K: TimerCounter, C: CompareChannel, F: Fn()> TestCase
    for CancelBeforeDeadline<'_, 'a, K, C, F>
{
    fn name(&self) -> &'static str {
        "Cancel Before Deadline"
    }

    fn run(&self) -> TestResult {
        let target = self.action.clock().now().wrapping_add(self.lead);
        if let Err(err) = self.action.schedule(target, CompareAction::Toggle, None) {
            return TestResult::Fail(err.into());
        }
        (self.idle)();
        check_eq!(self.action.cancel(), Ok(()));
        check_eq!(self.action.state(), ActionState::Idle);
        check_eq!(self.action.cancel(), Err(TimerError::NotPending));
        TestResult::Pass
    }
}
