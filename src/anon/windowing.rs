//! Time intervals and the scheduler that hands them out.
//!
//! Intervals are closed on both ends. Aligned intervals stop one nanosecond
//! before the next bucket begins, so consecutive buckets never share a record.

use super::AnonError;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// A closed time range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    /// Create an interval; `start` must not be after `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, AnonError> {
        if start > end {
            return Err(AnonError::InvalidInterval(format!(
                "start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The `size` long interval ending at `now`.
    pub fn last_elapsed(now: DateTime<Utc>, size: std::time::Duration) -> Result<Self, AnonError> {
        let size = to_delta(size)?;
        Ok(Self {
            start: now - size,
            end: now,
        })
    }

    /// The epoch-aligned bucket of length `size` that contains `ts`.
    pub fn aligned(ts: DateTime<Utc>, size: std::time::Duration) -> Result<Self, AnonError> {
        let size = to_delta(size)?;
        let start = ts
            .duration_trunc(size)
            .map_err(|e| AnonError::InvalidInterval(e.to_string()))?;
        Ok(Self {
            start,
            end: start + size - TimeDelta::nanoseconds(1),
        })
    }

    /// The interval of the same length starting right after this one.
    pub fn next(&self) -> Self {
        let start = self.end + TimeDelta::nanoseconds(1);
        Self {
            start,
            end: start + (self.end - self.start),
        }
    }

    /// Check if a timestamp falls within this interval (inclusive).
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}]",
            self.start.format("%Y-%m-%d %H:%M:%S"),
            self.end.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

/// Hands out consecutive aligned intervals once each has fully elapsed.
///
/// The scheduler remembers the end of the last interval it returned, so a
/// caller driving it from a timer never processes the same bucket twice.
#[derive(Debug, Clone)]
pub struct IntervalScheduler {
    size: std::time::Duration,
    last: Option<Interval>,
}

impl IntervalScheduler {
    pub fn new(size: std::time::Duration) -> Result<Self, AnonError> {
        to_delta(size)?;
        Ok(Self { size, last: None })
    }

    /// Continue after an interval that was already processed.
    pub fn resume_after(mut self, processed: Interval) -> Self {
        self.last = Some(processed);
        self
    }

    /// The last interval handed out, if any.
    pub fn last(&self) -> Option<Interval> {
        self.last
    }

    /// Intervals that have fully elapsed by `now` and were not yet handed out.
    ///
    /// The first call yields only the most recent complete bucket; later calls
    /// catch up on every bucket completed since.
    pub fn due(&mut self, now: DateTime<Utc>) -> Result<Vec<Interval>, AnonError> {
        let current = Interval::aligned(now, self.size)?;

        let mut next = match self.last {
            Some(last) => last.next(),
            None => Interval::aligned(current.start - TimeDelta::nanoseconds(1), self.size)?,
        };

        let mut due = Vec::new();
        while next.end < current.start {
            due.push(next);
            next = next.next();
        }

        if let Some(last) = due.last() {
            self.last = Some(*last);
        }
        Ok(due)
    }
}

fn to_delta(size: std::time::Duration) -> Result<TimeDelta, AnonError> {
    if size.is_zero() {
        return Err(AnonError::ZeroInterval);
    }
    TimeDelta::from_std(size).map_err(|e| AnonError::InvalidInterval(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    const TEN_MINUTES: Duration = Duration::from_secs(600);

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_interval_contains_both_ends() {
        let interval = Interval::new(at(9, 0, 0), at(9, 10, 0)).unwrap();

        assert!(interval.contains(at(9, 0, 0)));
        assert!(interval.contains(at(9, 5, 0)));
        assert!(interval.contains(at(9, 10, 0)));
        assert!(!interval.contains(at(9, 10, 1)));
        assert!(!interval.contains(at(8, 59, 59)));
    }

    #[test]
    fn test_inverted_interval_is_rejected() {
        assert!(Interval::new(at(9, 10, 0), at(9, 0, 0)).is_err());
    }

    #[test]
    fn test_last_elapsed() {
        let interval = Interval::last_elapsed(at(9, 17, 0), TEN_MINUTES).unwrap();
        assert_eq!(interval.start, at(9, 7, 0));
        assert_eq!(interval.end, at(9, 17, 0));
        assert!(Interval::last_elapsed(at(9, 17, 0), Duration::ZERO).is_err());
    }

    #[test]
    fn test_aligned_buckets_do_not_overlap() {
        let bucket = Interval::aligned(at(9, 17, 30), TEN_MINUTES).unwrap();
        assert_eq!(bucket.start, at(9, 10, 0));
        assert!(bucket.contains(at(9, 19, 59)));
        assert!(!bucket.contains(at(9, 20, 0)));

        let next = bucket.next();
        assert_eq!(next.start, at(9, 20, 0));
        assert_eq!(next.duration(), bucket.duration());
    }

    #[test]
    fn test_scheduler_first_call_yields_latest_complete_bucket() {
        let mut scheduler = IntervalScheduler::new(TEN_MINUTES).unwrap();

        let due = scheduler.due(at(9, 17, 0)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].start, at(9, 0, 0));

        // Nothing new until the 09:10 bucket completes.
        assert!(scheduler.due(at(9, 19, 0)).unwrap().is_empty());

        let due = scheduler.due(at(9, 20, 0)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].start, at(9, 10, 0));
    }

    #[test]
    fn test_scheduler_catches_up_after_gap() {
        let processed = Interval::aligned(at(9, 0, 0), TEN_MINUTES).unwrap();
        let mut scheduler = IntervalScheduler::new(TEN_MINUTES)
            .unwrap()
            .resume_after(processed);

        let due = scheduler.due(at(9, 45, 0)).unwrap();
        let starts: Vec<_> = due.iter().map(|i| i.start).collect();
        assert_eq!(starts, [at(9, 10, 0), at(9, 20, 0), at(9, 30, 0)]);
        assert_eq!(scheduler.last().map(|i| i.start), Some(at(9, 30, 0)));
    }

    #[test]
    fn test_scheduler_rejects_zero_size() {
        assert!(matches!(
            IntervalScheduler::new(Duration::ZERO),
            Err(AnonError::ZeroInterval)
        ));
    }
}
