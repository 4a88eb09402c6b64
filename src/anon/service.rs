//! The anonymization service for one source/target store pair.

use super::{AnonError, Anonymize, Interval};
use crate::record::Record;
use crate::store::{SharedStore, Store};
use crate::transparency::SharedTransparencyLog;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for an anonymization service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnonymizerConfig {
    /// Expected length of the intervals the scheduler hands in
    pub interval: Duration,
}

impl Default for AnonymizerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10 * 60),
        }
    }
}

/// Outcome of one processed interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalReport {
    pub interval: Interval,
    /// Raw records found in the interval
    pub source_records: usize,
    /// Aggregates saved to the target store
    pub aggregates_written: usize,
}

impl IntervalReport {
    /// True when the interval held no source records.
    pub fn is_empty(&self) -> bool {
        self.source_records == 0
    }
}

/// Reduces records of type `S` into aggregates of type `T`, one interval per call.
///
/// The service does not serialize its own calls. Whoever drives it must not
/// run overlapping intervals for the same store pair concurrently.
pub struct Service<S, T> {
    source: SharedStore<S>,
    target: SharedStore<T>,
    config: AnonymizerConfig,
    transparency: Option<SharedTransparencyLog>,
    _types: PhantomData<fn(S) -> T>,
}

impl<S, T> Service<S, T>
where
    S: Anonymize<T>,
    T: Record,
{
    /// Create a service reading from `source` and appending to `target`.
    pub fn new(
        source: impl Store<S> + 'static,
        target: impl Store<T> + 'static,
        config: AnonymizerConfig,
    ) -> Result<Self, AnonError> {
        if config.interval.is_zero() {
            return Err(AnonError::ZeroInterval);
        }

        Ok(Self {
            source: Arc::new(source),
            target: Arc::new(target),
            config,
            transparency: None,
            _types: PhantomData,
        })
    }

    /// Report processed intervals and written aggregates to a transparency log.
    pub fn with_transparency(mut self, log: SharedTransparencyLog) -> Self {
        self.transparency = Some(log);
        self
    }

    pub fn config(&self) -> &AnonymizerConfig {
        &self.config
    }

    /// Anonymize every source record with a timestamp in `[start, end]`.
    ///
    /// An interval without records is a successful no-op. If saving an
    /// aggregate fails, the aggregates saved before it stay in the target store
    /// and [`AnonError::PartialWrite`] reports how many made it.
    pub fn process_interval(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<IntervalReport, AnonError> {
        let result = self.run(start, end);

        if let Some(ref log) = self.transparency {
            match &result {
                Ok(report) if report.is_empty() => log.record_empty_interval(),
                Ok(report) => {
                    log.record_interval_processed();
                    log.record_aggregates_written(report.aggregates_written as u64);
                }
                Err(AnonError::PartialWrite { written, .. }) => {
                    log.record_aggregates_written(*written as u64);
                    log.record_aggregation_failure();
                }
                Err(_) => log.record_aggregation_failure(),
            }
        }

        result
    }

    /// Process a whole [`Interval`].
    pub fn process(&self, interval: Interval) -> Result<IntervalReport, AnonError> {
        self.process_interval(interval.start, interval.end)
    }

    fn run(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<IntervalReport, AnonError> {
        let interval = Interval { start, end };

        let records = self
            .source
            .find_between(start, end)
            .map_err(AnonError::Fetch)?;

        if records.is_empty() {
            debug!(%interval, "no {} records to anonymize", S::type_name());
            return Ok(IntervalReport {
                interval,
                source_records: 0,
                aggregates_written: 0,
            });
        }

        let aggregates = S::anonymize(&records, start)?;

        if let Some(stray) = aggregates.iter().find(|a| a.timestamp() != start) {
            return Err(AnonError::Anonymize(format!(
                "{} aggregate stamped {} instead of interval start {start}",
                T::type_name(),
                stray.timestamp()
            )));
        }

        let total = aggregates.len();
        for (written, aggregate) in aggregates.into_iter().enumerate() {
            if let Err(source) = self.target.save(aggregate) {
                warn!(%interval, written, total, "aggregate save failed: {source}");
                return Err(AnonError::PartialWrite {
                    written,
                    total,
                    source,
                });
            }
        }

        info!(
            %interval,
            records = records.len(),
            aggregates = total,
            "anonymized {} into {}",
            S::type_name(),
            T::type_name()
        );

        Ok(IntervalReport {
            interval,
            source_records: records.len(),
            aggregates_written: total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{KeypressAnonymousStats, KeypressData};
    use crate::store::RelationalStore;
    use crate::transparency::create_shared_log;
    use chrono::TimeZone;

    fn at(m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, m, s).unwrap()
    }

    fn stores() -> (
        Arc<RelationalStore<KeypressData>>,
        Arc<RelationalStore<KeypressAnonymousStats>>,
    ) {
        (
            Arc::new(RelationalStore::open_in_memory().unwrap()),
            Arc::new(RelationalStore::open_in_memory().unwrap()),
        )
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let (source, target) = stores();
        let result = Service::new(
            source,
            target,
            AnonymizerConfig {
                interval: Duration::ZERO,
            },
        );
        assert!(matches!(result, Err(AnonError::ZeroInterval)));
    }

    #[test]
    fn test_empty_interval_is_a_noop() {
        let (source, target) = stores();
        let log = create_shared_log();
        let service = Service::new(source, target.clone(), AnonymizerConfig::default())
            .unwrap()
            .with_transparency(log.clone());

        let report = service.process_interval(at(0, 0), at(10, 0)).unwrap();
        assert!(report.is_empty());
        assert_eq!(report.aggregates_written, 0);
        assert_eq!(target.count().unwrap(), 0);
        assert_eq!(log.stats().empty_intervals, 1);
    }

    #[test]
    fn test_aggregate_is_stamped_with_interval_start() {
        let (source, target) = stores();
        for s in [5, 20, 40] {
            source.save(KeypressData::at("k", at(3, s))).unwrap();
        }
        let service = Service::new(source, target.clone(), AnonymizerConfig::default()).unwrap();

        let report = service.process_interval(at(0, 0), at(10, 0)).unwrap();
        assert_eq!(report.source_records, 3);
        assert_eq!(report.aggregates_written, 1);

        let stats = target.get_all().unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].timestamp, at(0, 0));
        assert_eq!(stats[0].keypresses_count, 3);
    }

    #[test]
    fn test_reprocessing_appends_second_aggregate() {
        let (source, target) = stores();
        source.save(KeypressData::at("k", at(1, 0))).unwrap();
        let service = Service::new(source, target.clone(), AnonymizerConfig::default()).unwrap();

        service.process_interval(at(0, 0), at(10, 0)).unwrap();
        service.process_interval(at(0, 0), at(10, 0)).unwrap();
        assert_eq!(target.count().unwrap(), 2);
    }
}
