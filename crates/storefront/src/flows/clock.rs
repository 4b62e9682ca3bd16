//! Injectable wall-clock time source.
//!
//! Flow controllers never read the system time directly; they sample a
//! [`Clock`]. Production code uses [`SystemClock`]; tests inject a manual
//! clock and step it to exercise cooldown edges deterministically.

use chrono::{DateTime, Utc};

/// A source of wall-clock time.
pub trait Clock {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
