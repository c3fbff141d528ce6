//! Wall-clock sources for the local expiry clock

use chrono::{DateTime, Utc};

/// Source of the current time used to compare against `expires_at`.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall time derived from a fixed anchor plus elapsed `tokio::time::Instant`.
///
/// Immune to system clock jumps after the anchor is taken, and follows tokio's
/// paused clock in tests.
#[derive(Debug, Clone, Copy)]
pub struct AnchoredClock {
    wall: DateTime<Utc>,
    mono: tokio::time::Instant,
}

impl AnchoredClock {
    pub fn new(wall: DateTime<Utc>) -> Self {
        Self {
            wall,
            mono: tokio::time::Instant::now(),
        }
    }

    /// Anchors at the current system time.
    pub fn start() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for AnchoredClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.mono.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + elapsed
    }
}
