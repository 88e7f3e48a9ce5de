//! Wall-clock access for timers, study days and record timestamps.

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};

/// 2023-11-14T22:13:20Z, a Tuesday.
const FIXED_EPOCH_SECS: i64 = 1_700_000_000;

/// Source of "now" shared by every service.
///
/// `Fixed` only moves when advanced, so timer and calendar tests stay
/// deterministic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Clock {
    #[default]
    Default,
    Fixed(DateTime<Utc>),
}

impl Clock {
    #[must_use]
    pub fn default_clock() -> Self {
        Self::Default
    }

    #[must_use]
    pub fn now(self) -> DateTime<Utc> {
        match self {
            Clock::Default => Utc::now(),
            Clock::Fixed(at) => at,
        }
    }

    /// The study day in the user's timezone.
    #[must_use]
    pub fn today(self) -> NaiveDate {
        local_date(self.now())
    }

    /// Move a fixed clock forward. The system clock ignores this.
    pub fn advance(&mut self, by: Duration) {
        if let Clock::Fixed(at) = self {
            *at += by;
        }
    }
}

/// Local calendar day of a UTC instant.
#[must_use]
pub fn local_date(at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&Local).date_naive()
}

#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::from_timestamp(FIXED_EPOCH_SECS, 0).unwrap_or_default()
}

#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::Fixed(fixed_now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_only_moves_when_advanced() {
        let mut clock = fixed_clock();
        assert_eq!(clock.now(), clock.now());
        clock.advance(Duration::seconds(90));
        assert_eq!(clock.now(), fixed_now() + Duration::seconds(90));
    }

    #[test]
    fn system_clock_ignores_advance() {
        let mut clock = Clock::default_clock();
        clock.advance(Duration::days(3));
        assert_eq!(clock, Clock::Default);
    }

    #[test]
    fn today_follows_the_local_calendar() {
        let mut clock = fixed_clock();
        let start = clock.today();
        clock.advance(Duration::days(1));
        assert_eq!(clock.today(), start.succ_opt().unwrap());
        assert_eq!(start, local_date(fixed_now()));
    }
}
