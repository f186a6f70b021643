//! Deterministic clock for tests.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;
use trotro_core::environment::Clock;

/// A clock that only moves when told to.
///
/// # Example
///
/// ```ignore
/// let clock = Arc::new(FixedClock::at("2025-06-01T06:00:00Z"));
/// clock.advance(Duration::seconds(90));
/// ```
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Creates a clock frozen at the given instant.
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable in tests
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    /// Jumps the clock to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable in tests
        let mut now = self.now.lock().unwrap();
        *now = to;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable in tests
        let now = self.now.lock().unwrap();
        *now
    }
}
