//! Concrete record types captured by the agent and their anonymized summaries.

mod filechange;
mod keypress;

pub use filechange::{
    is_blacklisted_dir, language_for_path, should_skip_dir, FileAction, FileChangeAnonymousStats,
    FileChangeData,
};
pub use keypress::{key_name, KeypressAnonymousStats, KeypressData};
