//! Time measurement and scheduling.

use core::fmt;
use core::ops;

use manyfmt::Refmt as _;

use crate::util::ConciseDebug;

// -------------------------------------------------------------------------------------------------

#[doc(no_inline)]
pub use core::time::Duration;
#[doc(no_inline)]
pub use web_time::Instant;

// -------------------------------------------------------------------------------------------------

/// Decides when a periodic activity, such as polling an external service, is next due.
///
/// The cadence is driven entirely by the instants passed to [`Cadence::poll_due()`]; it never
/// reads the clock itself, so its behavior is deterministic under test.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Cadence {
    interval: Duration,
    last: Option<Instant>,
}

impl Cadence {
    /// Constructs a [`Cadence`] whose first check is immediately due.
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Changes the interval. The next activity is due `interval` after the previous one.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Returns whether the activity is due at `now`, and if so, records `now` as the time
    /// it was performed.
    ///
    /// An activity is due if it has never been performed, if at least the interval has
    /// elapsed since the last time, or if `now` is earlier than the last time (the clock
    /// source was replaced).
    pub fn poll_due(&mut self, now: Instant) -> bool {
        let due = match self.last {
            None => true,
            Some(last) => match now.checked_duration_since(last) {
                Some(elapsed) => elapsed >= self.interval,
                None => true,
            },
        };
        if due {
            self.last = Some(now);
        }
        due
    }

    /// Makes the next check due regardless of elapsed time.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

// -------------------------------------------------------------------------------------------------

/// Summary of the time taken by a set of events.
///
/// It may be created by [`TimeStats::default()`] (empty), or [`TimeStats::one()`] (single event),
/// and multiple events may be aggregated using the `+=` operator.
/// It may be formatted for reading using the [`fmt::Display`] implementation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct TimeStats {
    /// The number of events aggregated into this [`TimeStats`].
    pub count: usize,
    /// The sum of the durations of all events.
    pub sum: Duration,
    /// The minimum duration of all events, or [`None`] if there were no events.
    pub min: Option<Duration>,
    /// The maximum duration of all events, or [`Duration::ZERO`] if there were no events.
    pub max: Duration,
}

impl TimeStats {
    /// Constructs a [`TimeStats`] for a single event.
    #[inline]
    pub const fn one(duration: Duration) -> Self {
        Self {
            count: 1,
            sum: duration,
            min: Some(duration),
            max: duration,
        }
    }

    /// Returns the mean duration, or [`None`] if there were no events.
    pub fn mean(&self) -> Option<Duration> {
        let count = u32::try_from(self.count).ok().filter(|&c| c > 0)?;
        Some(self.sum / count)
    }
}

impl ops::AddAssign for TimeStats {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = TimeStats {
            count: self.count + rhs.count,
            sum: self.sum + rhs.sum,
            min: match (self.min, rhs.min) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            },
            max: self.max.max(rhs.max),
        };
    }
}

impl fmt::Display for TimeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let max = self.max.refmt(&ConciseDebug);
        let count = self.count;
        let sum = self.sum.refmt(&ConciseDebug);
        match self.min {
            None => write!(f, "(-------- .. {max}) for {count:3}, total {sum}"),
            Some(min) => {
                let min = min.refmt(&ConciseDebug);
                write!(f, "({min} .. {max}) for {count:3}, total {sum}")
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------
