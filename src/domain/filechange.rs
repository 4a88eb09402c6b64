//! File change records and the path classification used by file watchers.

use crate::anon::{AnonError, Anonymize};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

/// Kind of change reported for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Created,
    Modified,
    Removed,
}

impl std::fmt::Display for FileAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FileAction::Created => "created",
            FileAction::Modified => "modified",
            FileAction::Removed => "removed",
        })
    }
}

impl FromStr for FileAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "created" | "create" => Ok(FileAction::Created),
            "modified" | "write" => Ok(FileAction::Modified),
            "removed" | "remove" => Ok(FileAction::Removed),
            other => Err(format!("unknown file action `{other}`")),
        }
    }
}

crate::text_field!(FileAction);

crate::record! {
    /// A change to a source file. Only the language is kept, never the path.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct FileChangeData {
        pub language: String,
        pub action: FileAction,
        pub timestamp: DateTime<Utc>,
    }
}

crate::record! {
    /// Number of file changes per language in one interval.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct FileChangeAnonymousStats as "filechanges_anonymous" {
        pub timestamp: DateTime<Utc> => "DATETIME NOT NULL",
        pub language: String => "TEXT NOT NULL",
        pub changes_count: i64 => "INTEGER NOT NULL",
    }
}

impl FileChangeData {
    pub fn at(language: impl Into<String>, action: FileAction, timestamp: DateTime<Utc>) -> Self {
        Self {
            language: language.into(),
            action,
            timestamp,
        }
    }

    /// A change captured now, or `None` when the path is not a recognized source file.
    pub fn from_path(path: &Path, action: FileAction) -> Option<Self> {
        language_for_path(path).map(|language| Self::at(language, action, Utc::now()))
    }
}

impl Anonymize<FileChangeAnonymousStats> for FileChangeData {
    fn anonymize(
        records: &[Self],
        interval_start: DateTime<Utc>,
    ) -> Result<Vec<FileChangeAnonymousStats>, AnonError> {
        let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
        for record in records {
            *counts.entry(record.language.as_str()).or_default() += 1;
        }

        Ok(counts
            .into_iter()
            .map(|(language, changes_count)| FileChangeAnonymousStats {
                timestamp: interval_start,
                language: language.to_string(),
                changes_count,
            })
            .collect())
    }
}

/// Language of a source file, judged by its extension.
pub fn language_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?;
    let language = match ext {
        "go" => "go",
        "js" => "javascript",
        "ts" => "typescript",
        "svelte" => "svelte",
        "py" => "python",
        "rb" => "ruby",
        "md" => "markdown",
        "java" => "java",
        "c" => "c",
        "rs" => "rust",
        "css" => "css",
        "html" => "html",
        "sql" => "sql",
        "sh" => "shell",
        "yaml" | "yml" => "yaml",
        _ => return None,
    };
    Some(language)
}

/// Directories a watcher never descends into.
pub fn is_blacklisted_dir(path: &Path) -> bool {
    const BLACKLIST: &[&str] = &[
        // macOS system directories
        "Library",
        "Applications",
        "System",
        "Volumes",
        "cores",
        "private",
        // build output and dependencies
        "node_modules",
        "vendor",
        "dist",
        "build",
        "target",
        "coverage",
        "tmp",
        "temp",
        "go",
        "rails",
        "bower_components",
        "jspm_packages",
        "packages",
        // editors and version control
        ".idea",
        ".vscode",
        ".eclipse",
        ".settings",
        ".git",
        ".svn",
        ".hg",
        // caches
        ".Trash",
        ".cache",
        ".npm",
        ".yarn",
    ];

    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| BLACKLIST.contains(&name))
}

/// Hidden or blacklisted directories.
pub fn should_skip_dir(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'));
    hidden || is_blacklisted_dir(path)
}
