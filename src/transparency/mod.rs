//! Transparency module for devstats.
//!
//! Counts what the agent collects and reduces so a user can audit it at any time.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog,
    TransparencyStats,
};
