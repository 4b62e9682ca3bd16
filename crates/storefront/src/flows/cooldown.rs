//! Resend cooldown countdown.
//!
//! A [`Cooldown`] is a pure value: the instant it was armed plus a duration.
//! Callers sample it against a clock to render the remaining seconds or to
//! decide whether a resend is allowed. There is no ticking task and nothing
//! to cancel; re-arming simply replaces the value. The display resets on a
//! page reload because the value is never persisted — server-side rate
//! limiting stays authoritative regardless.

use chrono::{DateTime, TimeDelta, Utc};

/// A countdown gating code-resend requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cooldown {
    armed_at: DateTime<Utc>,
    seconds: u32,
}

impl Cooldown {
    /// Arm a cooldown of `seconds` starting at `now`.
    #[must_use]
    pub const fn arm(now: DateTime<Utc>, seconds: u32) -> Self {
        Self {
            armed_at: now,
            seconds,
        }
    }

    /// The instant the cooldown elapses.
    #[must_use]
    pub fn deadline(&self) -> DateTime<Utc> {
        self.armed_at + TimeDelta::seconds(i64::from(self.seconds))
    }

    /// Whether a resend is allowed at `now`.
    ///
    /// Ready at exactly the deadline, not one tick later.
    #[must_use]
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline()
    }

    /// Whole seconds left at `now`, for display; zero once ready.
    ///
    /// Rounds up, so a cooldown with 200ms left still shows 1.
    #[must_use]
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> u32 {
        let left = (self.deadline() - now).num_milliseconds();
        if left <= 0 {
            return 0;
        }
        u32::try_from((left as u64).div_ceil(1000)).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_counts_down_to_ready() {
        let cooldown = Cooldown::arm(t0(), 60);

        assert!(!cooldown.is_ready(t0()));
        assert_eq!(cooldown.remaining_seconds(t0()), 60);

        let halfway = t0() + TimeDelta::seconds(30);
        assert!(!cooldown.is_ready(halfway));
        assert_eq!(cooldown.remaining_seconds(halfway), 30);
    }

    #[test]
    fn test_ready_at_exactly_the_deadline() {
        let cooldown = Cooldown::arm(t0(), 60);

        let just_before = t0() + TimeDelta::milliseconds(59_999);
        assert!(!cooldown.is_ready(just_before));
        assert_eq!(cooldown.remaining_seconds(just_before), 1);

        let deadline = t0() + TimeDelta::seconds(60);
        assert!(cooldown.is_ready(deadline));
        assert_eq!(cooldown.remaining_seconds(deadline), 0);
    }

    #[test]
    fn test_remaining_rounds_up() {
        let cooldown = Cooldown::arm(t0(), 60);
        let almost = t0() + TimeDelta::milliseconds(59_800);
        assert_eq!(cooldown.remaining_seconds(almost), 1);
    }

    #[test]
    fn test_rearm_resets_the_countdown() {
        let first = Cooldown::arm(t0(), 60);
        let later = t0() + TimeDelta::seconds(45);
        let second = Cooldown::arm(later, 60);

        assert_eq!(first.remaining_seconds(later), 15);
        assert_eq!(second.remaining_seconds(later), 60);
    }

    #[test]
    fn test_remaining_after_deadline_stays_zero() {
        let cooldown = Cooldown::arm(t0(), 60);
        let long_after = t0() + TimeDelta::seconds(600);
        assert!(cooldown.is_ready(long_after));
        assert_eq!(cooldown.remaining_seconds(long_after), 0);
    }
}
