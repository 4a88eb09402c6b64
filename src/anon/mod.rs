//! Interval-based anonymization.
//!
//! Raw records of a source type are reduced, one interval at a time, into
//! coarse aggregate records of a target type:
//!
//! ```text
//!  producer ──▶ Store<S>.save
//!                   │
//!   scheduler ──▶ Service::process_interval(start, end)
//!                   │  find_between(start, end)
//!                   ▼
//!              S::anonymize(records, start) ──▶ Store<T>.save (per aggregate)
//! ```
//!
//! Every aggregate is stamped with the interval start. Processing is
//! append-only: running the same interval twice writes a second set of
//! aggregates.

mod service;
mod windowing;

pub use service::{AnonymizerConfig, IntervalReport, Service};
pub use windowing::{Interval, IntervalScheduler};

use crate::record::Record;
use crate::store::StoreError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// A source record type that knows how to reduce a batch of itself into `T`.
pub trait Anonymize<T>: Record {
    /// Reduce the records of one interval. Every returned record must be
    /// timestamped with `interval_start`.
    fn anonymize(records: &[Self], interval_start: DateTime<Utc>) -> Result<Vec<T>, AnonError>;
}

/// Errors raised while configuring or running anonymization.
#[derive(Debug, Error)]
pub enum AnonError {
    #[error("interval size must be greater than 0")]
    ZeroInterval,

    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    #[error("failed to fetch records: {0}")]
    Fetch(#[source] StoreError),

    #[error("failed to anonymize records: {0}")]
    Anonymize(String),

    #[error("failed to save anonymized data ({written} of {total} saved): {source}")]
    PartialWrite {
        written: usize,
        total: usize,
        #[source]
        source: StoreError,
    },
}
