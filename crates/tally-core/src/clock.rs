//! Time source shared by credential cooldowns and period resolution
//!
//! Production code uses [`SystemClock`]; tests use [`ManualClock`] to step
//! through cooldown windows and pin "today".

use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::NaiveDate;

/// Source of monotonic time and the current calendar date
pub trait Clock: Send + Sync {
    /// Monotonic instant (cooldown bookkeeping)
    fn now(&self) -> Instant;

    /// Today's date in the bot's local time zone
    fn today(&self) -> NaiveDate;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

/// Manually advanced clock for tests and offline tooling
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<(Instant, NaiveDate)>,
}

impl ManualClock {
    /// Create a clock pinned to `today`, starting at the current instant
    pub fn new(today: NaiveDate) -> Self {
        Self {
            state: Mutex::new((Instant::now(), today)),
        }
    }

    /// Move the monotonic time forward
    pub fn advance(&self, by: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.0 += by;
        }
    }

    /// Change the calendar date
    pub fn set_today(&self, today: NaiveDate) {
        if let Ok(mut state) = self.state.lock() {
            state.1 = today;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.state
            .lock()
            .map(|s| s.0)
            .unwrap_or_else(|poisoned| poisoned.into_inner().0)
    }

    fn today(&self) -> NaiveDate {
        self.state
            .lock()
            .map(|s| s.1)
            .unwrap_or_else(|poisoned| poisoned.into_inner().1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(NaiveDate::from_ymd_opt(2025, 9, 10).unwrap());
        let start = clock.now();
        clock.advance(Duration::from_secs(300));
        assert_eq!(clock.now() - start, Duration::from_secs(300));
    }

    #[test]
    fn test_manual_clock_today() {
        let clock = ManualClock::new(NaiveDate::from_ymd_opt(2025, 9, 10).unwrap());
        clock.set_today(NaiveDate::from_ymd_opt(2026, 1, 2).unwrap());
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2026, 1, 2).unwrap());
    }
}
