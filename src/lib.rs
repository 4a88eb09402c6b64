//! devstats - Privacy-first developer activity statistics.
//!
//! This library persists typed activity records (key presses, file changes)
//! and periodically reduces them into anonymous per-interval counts.
//!
//! # Privacy Guarantees
//!
//! - **Local only**: Raw and anonymized records stay in local files
//! - **No paths**: File changes keep the language, never the path
//! - **Counts only**: Aggregates hold an interval start and a count
//! - **Transparency**: All collection is logged and auditable
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          devstats                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌──────────────────┐    │
//! │  │  Collector  │──▶│  Store<S>   │──▶│ anon::Service    │    │
//! │  │  (channel)  │   │ file/sqlite │   │ (10 min buckets) │    │
//! │  └─────────────┘   └─────────────┘   └──────────────────┘    │
//! │         │                                    │               │
//! │         ▼                                    ▼               │
//! │  ┌─────────────┐                     ┌──────────────────┐    │
//! │  │Transparency │                     │    Store<T>      │    │
//! │  │    Log      │                     │   (aggregates)   │    │
//! │  └─────────────┘                     └──────────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use devstats::anon::{AnonymizerConfig, Service};
//! use devstats::domain::{KeypressAnonymousStats, KeypressData};
//! use devstats::store::{RelationalStore, Store};
//! use std::sync::Arc;
//!
//! let raw = Arc::new(RelationalStore::<KeypressData>::open("devstats.db")?);
//! let anon = RelationalStore::<KeypressAnonymousStats>::open("devstats_anon.db")?;
//!
//! raw.save(KeypressData::new("a"))?;
//!
//! let service = Service::new(raw, anon, AnonymizerConfig::default())?;
//! let now = chrono::Utc::now();
//! service.process_interval(now - chrono::TimeDelta::minutes(10), now)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod anon;
pub mod collector;
pub mod config;
pub mod domain;
pub mod record;
pub mod store;
pub mod transparency;

// Re-export key types at crate root for convenience
pub use anon::{AnonError, Anonymize, AnonymizerConfig, Interval, IntervalScheduler, Service};
pub use collector::{Collector, CollectorError, CollectorHandle};
pub use config::{Backend, Config};
pub use record::Record;
pub use store::{FlatFileStore, ReadMode, RelationalStore, SharedStore, Store, StoreError};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Privacy declaration that can be displayed to users.
pub const PRIVACY_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║                 DEVSTATS - PRIVACY DECLARATION                   ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent records coding activity for your own statistics.     ║
║                                                                  ║
║  ✓ WHAT WE RECORD:                                               ║
║    • Key names and when they were pressed                        ║
║    • The language of files you change, and when                  ║
║                                                                  ║
║  ✓ WHAT WE KEEP LONG TERM:                                       ║
║    • Key presses per 10 minute interval (count only)             ║
║    • File changes per language per interval (count only)         ║
║                                                                  ║
║  ✗ WHAT WE NEVER RECORD:                                         ║
║    • File paths or file contents                                 ║
║    • Window titles or application names                          ║
║    • Any screen content                                          ║
║                                                                  ║
║  All data is stored locally and never sent anywhere.             ║
║                                                                  ║
║  You can view collection statistics anytime with:                ║
║    devstats status                                               ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privacy_declaration_contents() {
        assert!(PRIVACY_DECLARATION.contains("PRIVACY"));
        assert!(PRIVACY_DECLARATION.contains("NEVER RECORD"));
        assert!(PRIVACY_DECLARATION.contains("File paths"));
    }
}
