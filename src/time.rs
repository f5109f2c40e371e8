use std::{
    fmt,
    ops::{Add, Sub},
    time::{Duration, Instant as StdInstant},
};

const DAY_IN_SECONDS: u64 = 24 * 60 * 60;
const OFFSET: Duration = Duration::from_secs(7 * DAY_IN_SECONDS);

/// Monotonic timestamp for bucket and contact accounting.
///
/// Same as `std::time::Instant` but shifted into the future by `OFFSET`, so that a timestamp
/// can always be moved back by up to a week (e.g. to mark a bucket as idle since before the
/// table existed) without `checked_sub` returning `None` on platforms whose clock starts near
/// zero.
#[derive(Clone, Copy, PartialOrd, PartialEq, Ord, Eq)]
pub(crate) struct Instant {
    std_instant: StdInstant,
}

impl Instant {
    pub fn now() -> Self {
        Self {
            std_instant: StdInstant::now() + OFFSET,
        }
    }

    /// Time passed since this instant, zero if it lies in the future.
    pub fn elapsed(&self) -> Duration {
        Self::now().saturating_duration_since(*self)
    }

    pub fn saturating_duration_since(&self, earlier: Instant) -> Duration {
        self.std_instant
            .saturating_duration_since(earlier.std_instant)
    }

    #[cfg(test)]
    pub fn checked_sub(&self, rhs: Duration) -> Option<Self> {
        self.std_instant
            .checked_sub(rhs)
            .map(|std_instant| Self { std_instant })
    }
}

impl Add<Duration> for Instant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self {
            std_instant: self.std_instant + rhs,
        }
    }
}

impl Sub<Duration> for Instant {
    type Output = Self;

    fn sub(self, rhs: Duration) -> Self {
        Self {
            std_instant: self.std_instant - rhs,
        }
    }
}

impl fmt::Debug for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{:?} ago", self.elapsed())
    }
}
