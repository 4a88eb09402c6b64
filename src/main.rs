//! devstats CLI
//!
//! Records coding activity locally and keeps anonymous per-interval counts.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use devstats::{
    anon::{AnonymizerConfig, Interval, IntervalScheduler, Service},
    collector::{Collector, CollectorHandle},
    config::{Backend, Config},
    domain::{
        should_skip_dir, FileAction, FileChangeAnonymousStats, FileChangeData,
        KeypressAnonymousStats, KeypressData,
    },
    record::Record,
    store::{FlatFileStore, RelationalStore, SharedStore, Store},
    transparency::{create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog},
    PRIVACY_DECLARATION, VERSION,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "devstats")]
#[command(version = VERSION)]
#[command(about = "Privacy-first developer activity statistics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record one key press
    RecordKey {
        /// Key name, e.g. `a` or `space`
        key: String,
    },

    /// Record a change to a source file (only its language is kept)
    RecordChange {
        path: PathBuf,

        /// created, modified or removed
        #[arg(long, default_value = "modified")]
        action: FileAction,
    },

    /// Anonymize one interval now
    Aggregate {
        /// Interval start (RFC 3339); defaults to one interval before --end
        #[arg(long)]
        start: Option<DateTime<Utc>>,

        /// Interval end (RFC 3339); defaults to now
        #[arg(long)]
        end: Option<DateTime<Utc>>,
    },

    /// Collect records from stdin and anonymize every elapsed interval
    Run {
        /// Read `key <name>`, `keycode <n>` and `change <path> [action]` lines from stdin
        #[arg(long)]
        stdin: bool,
    },

    /// Show store sizes and cumulative statistics
    Status,

    /// Show configuration
    Config,

    /// Display privacy declaration
    Privacy,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::RecordKey { key } => cmd_record_key(key),
        Commands::RecordChange { path, action } => cmd_record_change(&path, action),
        Commands::Aggregate { start, end } => cmd_aggregate(start, end),
        Commands::Run { stdin } => cmd_run(stdin),
        Commands::Status => cmd_status(),
        Commands::Config => cmd_config(),
        Commands::Privacy => {
            println!("{PRIVACY_DECLARATION}");
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("{e:#}");
        std::process::exit(1);
    }
}

/// Raw and anonymized stores for both record families.
struct Stores {
    keypresses: SharedStore<KeypressData>,
    keypress_stats: SharedStore<KeypressAnonymousStats>,
    file_changes: SharedStore<FileChangeData>,
    file_change_stats: SharedStore<FileChangeAnonymousStats>,
}

impl Stores {
    fn open(config: &Config) -> Result<Self> {
        config
            .ensure_directories()
            .context("could not create data directory")?;

        let raw = config.raw_db_path();
        let anon = config.anon_db_path();
        Ok(Self {
            keypresses: open_store(config, &raw)?,
            keypress_stats: open_store(config, &anon)?,
            file_changes: open_store(config, &raw)?,
            file_change_stats: open_store(config, &anon)?,
        })
    }

    fn services(
        &self,
        config: &Config,
        log: &SharedTransparencyLog,
    ) -> Result<(
        Service<KeypressData, KeypressAnonymousStats>,
        Service<FileChangeData, FileChangeAnonymousStats>,
    )> {
        let anon_config = AnonymizerConfig {
            interval: config.interval(),
        };
        let keypresses = Service::new(
            self.keypresses.clone(),
            self.keypress_stats.clone(),
            anon_config,
        )?
        .with_transparency(log.clone());
        let file_changes = Service::new(
            self.file_changes.clone(),
            self.file_change_stats.clone(),
            anon_config,
        )?
        .with_transparency(log.clone());
        Ok((keypresses, file_changes))
    }
}

fn open_store<T>(config: &Config, db_path: &Path) -> Result<SharedStore<T>>
where
    T: Record + Serialize + DeserializeOwned,
{
    let store: SharedStore<T> = match config.backend {
        Backend::Sqlite => Arc::new(
            RelationalStore::<T>::open(db_path)
                .with_context(|| format!("could not open {}", db_path.display()))?
                .with_read_mode(config.read_mode),
        ),
        Backend::File => {
            let path = config.file_store_path(&T::table_name());
            Arc::new(
                FlatFileStore::<T>::open(&path)
                    .with_context(|| format!("could not open {}", path.display()))?,
            )
        }
    };
    Ok(store)
}

fn cmd_record_key(key: String) -> Result<()> {
    let config = Config::load()?;
    let stores = Stores::open(&config)?;
    let log = create_shared_log_with_persistence(config.transparency_path());

    stores.keypresses.save(KeypressData::new(key))?;
    log.record_collected();
    log.save()?;
    Ok(())
}

fn cmd_record_change(path: &Path, action: FileAction) -> Result<()> {
    let Some(record) = file_change_for(path, action) else {
        println!("Ignoring {}: not a tracked source file", path.display());
        return Ok(());
    };

    let config = Config::load()?;
    let stores = Stores::open(&config)?;
    let log = create_shared_log_with_persistence(config.transparency_path());

    stores.file_changes.save(record)?;
    log.record_collected();
    log.save()?;
    Ok(())
}

/// A file change record, unless the path is untracked or inside a skipped directory.
fn file_change_for(path: &Path, action: FileAction) -> Option<FileChangeData> {
    if path.ancestors().skip(1).any(should_skip_dir) {
        return None;
    }
    FileChangeData::from_path(path, action)
}

fn cmd_aggregate(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<()> {
    let config = Config::load()?;
    let stores = Stores::open(&config)?;
    let log = create_shared_log_with_persistence(config.transparency_path());
    let (keypresses, file_changes) = stores.services(&config, &log)?;

    let end = end.unwrap_or_else(Utc::now);
    let interval = match start {
        Some(start) => Interval::new(start, end)?,
        None => Interval::last_elapsed(end, config.interval())?,
    };

    let keys = keypresses.process(interval)?;
    let changes = file_changes.process(interval)?;
    log.save()?;

    println!("Interval {interval}");
    println!(
        "  Key presses: {} records -> {} aggregates",
        keys.source_records, keys.aggregates_written
    );
    println!(
        "  File changes: {} records -> {} aggregates",
        changes.source_records, changes.aggregates_written
    );
    Ok(())
}

fn cmd_run(read_stdin: bool) -> Result<()> {
    let config = Config::load()?;
    let stores = Stores::open(&config)?;
    let log = create_shared_log_with_persistence(config.transparency_path());
    let (keypresses, file_changes) = stores.services(&config, &log)?;

    println!("devstats v{VERSION}");
    println!("  Backend: {:?}", config.backend);
    println!("  Data path: {}", config.data_path.display());
    println!("  Interval: {}s", config.interval_secs);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let mut key_collector =
        Collector::new(stores.keypresses.clone()).with_transparency(log.clone());
    let mut change_collector =
        Collector::new(stores.file_changes.clone()).with_transparency(log.clone());
    key_collector.start()?;
    change_collector.start()?;

    if read_stdin {
        let keys = key_collector.handle();
        let changes = change_collector.handle();
        thread::spawn(move || read_events(std::io::stdin().lock(), &keys, &changes));
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("could not install Ctrl+C handler")?;

    // The first pass covers the most recent complete interval.
    let mut scheduler = IntervalScheduler::new(config.interval())?;
    while running.load(Ordering::SeqCst) {
        for interval in scheduler.due(Utc::now())? {
            if let Err(e) = keypresses.process(interval) {
                warn!(%interval, "key press anonymization failed: {e}");
            }
            if let Err(e) = file_changes.process(interval) {
                warn!(%interval, "file change anonymization failed: {e}");
            }
            if let Err(e) = log.save() {
                warn!("could not save transparency log: {e}");
            }
        }
        thread::sleep(Duration::from_millis(500));
    }

    info!("shutting down");
    key_collector.stop();
    change_collector.stop();

    if let Err(e) = log.save() {
        warn!("could not save transparency log: {e}");
    }

    println!();
    println!("{}", log.summary());
    Ok(())
}

/// Feed `key <name>`, `keycode <n>` and `change <path> [action]` lines into the collectors.
fn read_events(
    input: impl BufRead,
    keys: &CollectorHandle<KeypressData>,
    changes: &CollectorHandle<FileChangeData>,
) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("stopped reading stdin: {e}");
                return;
            }
        };

        let mut parts = line.split_whitespace();
        let sent = match (parts.next(), parts.next()) {
            (Some("key"), Some(key)) => keys.record(KeypressData::new(key)),
            (Some("keycode"), Some(code)) => match code.parse() {
                Ok(code) => keys.record(KeypressData::from_keycode(code)),
                Err(e) => {
                    warn!("invalid keycode `{code}`: {e}");
                    continue;
                }
            },
            (Some("change"), Some(path)) => {
                let action = match parts.next().map(str::parse::<FileAction>) {
                    None => FileAction::Modified,
                    Some(Ok(action)) => action,
                    Some(Err(e)) => {
                        warn!("{e}");
                        continue;
                    }
                };
                match file_change_for(Path::new(path), action) {
                    Some(record) => changes.record(record),
                    None => continue,
                }
            }
            (None, _) => continue,
            _ => {
                warn!("unrecognized input line: {line}");
                continue;
            }
        };

        if let Err(e) = sent {
            warn!("dropped event: {e}");
        }
    }
}

fn cmd_status() -> Result<()> {
    let config = Config::load()?;

    println!("devstats Status");
    println!("===============");
    println!();
    println!("Configuration:");
    println!("  Backend: {:?}", config.backend);
    println!("  Interval: {}s", config.interval_secs);
    println!("  Data path: {}", config.data_path.display());
    println!();

    let stores = Stores::open(&config)?;
    println!("Stored records:");
    println!("  Key presses: {}", stores.keypresses.get_all()?.len());
    println!(
        "  Key press aggregates: {}",
        stores.keypress_stats.get_all()?.len()
    );
    println!("  File changes: {}", stores.file_changes.get_all()?.len());
    println!(
        "  File change aggregates: {}",
        stores.file_change_stats.get_all()?.len()
    );
    println!();

    let stats_path = config.transparency_path();
    if stats_path.exists() {
        let stats = TransparencyLog::with_persistence(stats_path).stats();
        println!("Cumulative Statistics:");
        println!("  Records collected: {}", stats.records_collected);
        println!("  Records rejected: {}", stats.save_failures);
        println!("  Intervals anonymized: {}", stats.intervals_processed);
        println!("  Empty intervals: {}", stats.empty_intervals);
        println!("  Aggregates written: {}", stats.aggregates_written);
        println!("  Failed intervals: {}", stats.aggregation_failures);
    } else {
        println!("No previous session data found.");
    }
    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = Config::load()?;
    let path = Config::config_path();

    println!("devstats Configuration");
    println!("======================");
    println!();
    println!("Config file: {}", path.display());
    if !path.exists() {
        println!("  (not found, showing defaults)");
    }
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_change_for_skips_untracked_paths() {
        assert!(file_change_for(Path::new("src/main.rs"), FileAction::Modified).is_some());
        assert!(file_change_for(Path::new("notes.txt"), FileAction::Created).is_none());
        assert!(
            file_change_for(Path::new("web/node_modules/lib/index.js"), FileAction::Modified)
                .is_none()
        );
        assert!(file_change_for(Path::new("repo/.git/hooks/x.sh"), FileAction::Created).is_none());
    }

    #[test]
    fn test_read_events_routes_lines() {
        let keys_store = Arc::new(RelationalStore::<KeypressData>::open_in_memory().unwrap());
        let changes_store = Arc::new(RelationalStore::<FileChangeData>::open_in_memory().unwrap());
        let mut keys = Collector::new(keys_store.clone());
        let mut changes = Collector::new(changes_store.clone());
        keys.start().unwrap();
        changes.start().unwrap();

        let input = "key a\nkey space\nkeycode 0\nkeycode x\n\nchange src/lib.rs created\nchange README.txt\nbogus\n";
        read_events(input.as_bytes(), &keys.handle(), &changes.handle());
        keys.stop();
        changes.stop();

        let keys: Vec<_> = keys_store
            .get_all()
            .unwrap()
            .into_iter()
            .map(|k| k.key)
            .collect();
        assert_eq!(keys, ["a", "space", "a"]);
        let stored = changes_store.get_all().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].language, "rust");
        assert_eq!(stored[0].action, FileAction::Created);
    }
}
