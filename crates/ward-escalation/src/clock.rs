//! Wall-clock timestamps driven by the tokio clock.
//!
//! Alert timestamps are `DateTime<Utc>`, but timers run on tokio time. The
//! [`EngineClock`] anchors one to the other when the engine starts so both
//! advance together, including under a paused test runtime.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Maps tokio instants onto UTC timestamps.
#[derive(Debug, Clone, Copy)]
pub struct EngineClock {
    anchor_wall: DateTime<Utc>,
    anchor_instant: Instant,
}

impl EngineClock {
    /// Creates a clock anchored at the current time.
    #[must_use]
    pub fn new() -> Self {
        Self::anchored_at(Utc::now())
    }

    /// Creates a clock whose current tokio instant reads as `wall`.
    #[must_use]
    pub fn anchored_at(wall: DateTime<Utc>) -> Self {
        Self {
            anchor_wall: wall,
            anchor_instant: Instant::now(),
        }
    }

    /// Returns the current time.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.at(Instant::now())
    }

    /// Converts a tokio instant to a UTC timestamp.
    #[must_use]
    pub fn at(&self, instant: Instant) -> DateTime<Utc> {
        let elapsed = instant.saturating_duration_since(self.anchor_instant);
        chrono::Duration::from_std(elapsed)
            .map_or(self.anchor_wall, |d| self.anchor_wall + d)
    }
}

impl Default for EngineClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn clock_follows_tokio_time() {
        let start = Utc::now();
        let clock = EngineClock::anchored_at(start);
        assert_eq!(clock.now(), start);

        tokio::time::advance(Duration::from_secs(150)).await;
        assert_eq!(clock.now(), start + chrono::Duration::seconds(150));
    }

    #[test]
    fn instants_before_anchor_saturate() {
        let clock = EngineClock::new();
        let wall = clock.at(clock.anchor_instant);
        assert_eq!(wall, clock.anchor_wall);
    }
}
