//! Privacy-preserving transparency log.
//!
//! Tracks how much was collected and what was reduced, without storing any
//! record content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Transparency statistics for the current session.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Raw records handed to a store
    records_collected: AtomicU64,
    /// Raw records a store refused
    save_failures: AtomicU64,
    /// Intervals that produced aggregates
    intervals_processed: AtomicU64,
    /// Intervals without any source records
    empty_intervals: AtomicU64,
    /// Anonymized aggregates written
    aggregates_written: AtomicU64,
    /// Intervals that failed to process
    aggregation_failures: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    /// Create a new transparency log.
    pub fn new() -> Self {
        Self {
            records_collected: AtomicU64::new(0),
            save_failures: AtomicU64::new(0),
            intervals_processed: AtomicU64::new(0),
            empty_intervals: AtomicU64::new(0),
            aggregates_written: AtomicU64::new(0),
            aggregation_failures: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that continues the counts saved at `path`.
    ///
    /// An unreadable file is logged and the counts start from zero.
    pub fn with_persistence(path: PathBuf) -> Self {
        let log = Self {
            persist_path: Some(path),
            ..Self::new()
        };
        match log.load() {
            Ok(Some(previous)) => log.restore(&previous),
            Ok(None) => {}
            Err(e) => warn!("could not load previous transparency stats: {e}"),
        }
        log
    }

    pub fn record_collected(&self) {
        self.records_collected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_save_failure(&self) {
        self.save_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_interval_processed(&self) {
        self.intervals_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty_interval(&self) {
        self.empty_intervals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_aggregates_written(&self, count: u64) {
        self.aggregates_written.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_aggregation_failure(&self) {
        self.aggregation_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            records_collected: self.records_collected.load(Ordering::Relaxed),
            save_failures: self.save_failures.load(Ordering::Relaxed),
            intervals_processed: self.intervals_processed.load(Ordering::Relaxed),
            empty_intervals: self.empty_intervals.load(Ordering::Relaxed),
            aggregates_written: self.aggregates_written.load(Ordering::Relaxed),
            aggregation_failures: self.aggregation_failures.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Records collected: {}\n\
             - Records rejected by storage: {}\n\
             - Intervals anonymized: {}\n\
             - Empty intervals: {}\n\
             - Aggregates written: {}\n\
             - Failed intervals: {}\n\
             - Session duration: {} seconds\n\
             \n\
             Privacy Guarantee:\n\
             - Aggregates carry counts only\n\
             - No key sequences or file paths in aggregates\n\
             - Raw records never leave this machine",
            stats.records_collected,
            stats.save_failures,
            stats.intervals_processed,
            stats.empty_intervals,
            stats.aggregates_written,
            stats.aggregation_failures,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            // Ensure parent directory exists
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                records_collected: stats.records_collected,
                save_failures: stats.save_failures,
                intervals_processed: stats.intervals_processed,
                empty_intervals: stats.empty_intervals,
                aggregates_written: stats.aggregates_written,
                aggregation_failures: stats.aggregation_failures,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&self) -> Result<Option<PersistedStats>, std::io::Error> {
        let Some(ref path) = self.persist_path else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(std::io::Error::other)
    }

    fn restore(&self, previous: &PersistedStats) {
        let counters = [
            (&self.records_collected, previous.records_collected),
            (&self.save_failures, previous.save_failures),
            (&self.intervals_processed, previous.intervals_processed),
            (&self.empty_intervals, previous.empty_intervals),
            (&self.aggregates_written, previous.aggregates_written),
            (&self.aggregation_failures, previous.aggregation_failures),
        ];
        for (counter, value) in counters {
            counter.store(value, Ordering::Relaxed);
        }
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub records_collected: u64,
    pub save_failures: u64,
    pub intervals_processed: u64,
    pub empty_intervals: u64,
    pub aggregates_written: u64,
    pub aggregation_failures: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    records_collected: u64,
    save_failures: u64,
    intervals_processed: u64,
    empty_intervals: u64,
    aggregates_written: u64,
    aggregation_failures: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a new shared transparency log.
pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

/// Create a new shared transparency log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}
