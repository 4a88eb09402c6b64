//! Producer plumbing between capture callbacks and a store.
//!
//! OS hooks fire on their own threads and must return quickly, so they only
//! push records into a bounded channel. One writer thread owned by the
//! [`Collector`] drains the channel into the store.

use crate::record::Record;
use crate::store::{SharedStore, Store};
use crate::transparency::SharedTransparencyLog;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Default number of records buffered between producers and the writer.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors that can occur during collection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CollectorError {
    #[error("collector is already running")]
    AlreadyRunning,

    #[error("collector is not running")]
    NotRunning,

    #[error("collector queue is full")]
    QueueFull,

    #[error("failed to spawn writer thread: {0}")]
    Spawn(String),
}

/// Owns the writer thread that persists records handed to its handles.
pub struct Collector<T: Record> {
    store: SharedStore<T>,
    sender: Sender<T>,
    receiver: Receiver<T>,
    running: Arc<AtomicBool>,
    /// Held shared by producers while they check `running` and send.
    gate: Arc<RwLock<()>>,
    thread_handle: Option<JoinHandle<()>>,
    transparency: Option<SharedTransparencyLog>,
}

impl<T: Record> Collector<T> {
    pub fn new(store: impl Store<T> + 'static) -> Self {
        Self::with_capacity(store, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(store: impl Store<T> + 'static, capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            store: Arc::new(store),
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            gate: Arc::new(RwLock::new(())),
            thread_handle: None,
            transparency: None,
        }
    }

    /// Count saved and rejected records in a transparency log.
    pub fn with_transparency(mut self, log: SharedTransparencyLog) -> Self {
        self.transparency = Some(log);
        self
    }

    /// Start the writer thread.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }

        let writer = Writer {
            store: self.store.clone(),
            receiver: self.receiver.clone(),
            running: self.running.clone(),
            transparency: self.transparency.clone(),
        };

        let spawned = thread::Builder::new()
            .name(format!("{}-writer", T::type_name().to_lowercase()))
            .spawn(move || writer.run());

        match spawned {
            Ok(handle) => {
                self.thread_handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                error!("failed to spawn writer thread: {e}");
                self.running.store(false, Ordering::SeqCst);
                Err(CollectorError::Spawn(e.to_string()))
            }
        }
    }

    /// Stop accepting records, flush what is queued and join the writer.
    pub fn stop(&mut self) {
        {
            // Wait out in-flight sends so the writer's final drain sees them.
            let _gate = self.gate.write().unwrap_or_else(PoisonError::into_inner);
            self.running.store(false, Ordering::SeqCst);
        }
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("{} writer thread panicked", T::type_name());
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// A cheap handle for producers. Capture it in hook closures.
    pub fn handle(&self) -> CollectorHandle<T> {
        CollectorHandle {
            sender: self.sender.clone(),
            running: self.running.clone(),
            gate: self.gate.clone(),
        }
    }
}

impl<T: Record> Drop for Collector<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Producer side of a [`Collector`].
pub struct CollectorHandle<T> {
    sender: Sender<T>,
    running: Arc<AtomicBool>,
    gate: Arc<RwLock<()>>,
}

impl<T> Clone for CollectorHandle<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            running: self.running.clone(),
            gate: self.gate.clone(),
        }
    }
}

impl<T> CollectorHandle<T> {
    /// Queue a record without blocking.
    ///
    /// `Ok` means the record will reach the store's `save`: a concurrent
    /// `stop` waits for this call and flushes the queue afterwards.
    pub fn record(&self, record: T) -> Result<(), CollectorError> {
        let _gate = self.gate.read().unwrap_or_else(PoisonError::into_inner);
        if !self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::NotRunning);
        }
        self.sender.try_send(record).map_err(|e| match e {
            TrySendError::Full(_) => CollectorError::QueueFull,
            TrySendError::Disconnected(_) => CollectorError::NotRunning,
        })
    }
}

struct Writer<T> {
    store: SharedStore<T>,
    receiver: Receiver<T>,
    running: Arc<AtomicBool>,
    transparency: Option<SharedTransparencyLog>,
}

impl<T: Record> Writer<T> {
    fn run(self) {
        debug!("{} writer started", T::type_name());

        while self.running.load(Ordering::SeqCst) {
            match self.receiver.recv_timeout(POLL_INTERVAL) {
                Ok(record) => self.persist(record),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // Flush whatever producers queued before stop.
        while let Ok(record) = self.receiver.try_recv() {
            self.persist(record);
        }

        debug!("{} writer stopped", T::type_name());
    }

    fn persist(&self, record: T) {
        match self.store.save(record) {
            Ok(()) => {
                if let Some(ref log) = self.transparency {
                    log.record_collected();
                }
            }
            Err(e) => {
                warn!("failed to save {}: {e}", T::type_name());
                if let Some(ref log) = self.transparency {
                    log.record_save_failure();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::KeypressData;
    use crate::store::RelationalStore;
    use crate::transparency::create_shared_log;

    fn store() -> Arc<RelationalStore<KeypressData>> {
        Arc::new(RelationalStore::open_in_memory().unwrap())
    }

    #[test]
    fn test_double_start_is_rejected() {
        let mut collector = Collector::new(store());
        collector.start().unwrap();
        assert_eq!(collector.start(), Err(CollectorError::AlreadyRunning));
        collector.stop();
        assert!(!collector.is_running());
    }

    #[test]
    fn test_record_before_start_fails() {
        let collector = Collector::new(store());
        let handle = collector.handle();
        assert_eq!(
            handle.record(KeypressData::new("a")),
            Err(CollectorError::NotRunning)
        );
    }

    #[test]
    fn test_stop_flushes_queued_records() {
        let store = store();
        let log = create_shared_log();
        let mut collector = Collector::new(store.clone()).with_transparency(log.clone());
        collector.start().unwrap();

        let handle = collector.handle();
        for key in ["a", "b", "c"] {
            handle.record(KeypressData::new(key)).unwrap();
        }
        collector.stop();

        assert_eq!(store.count().unwrap(), 3);
        assert_eq!(log.stats().records_collected, 3);
        assert_eq!(
            handle.record(KeypressData::new("d")),
            Err(CollectorError::NotRunning)
        );
    }

    #[test]
    fn test_concurrent_producers() {
        let store = store();
        let mut collector = Collector::new(store.clone());
        collector.start().unwrap();

        let producers: Vec<_> = (0..4)
            .map(|n| {
                let handle = collector.handle();
                thread::spawn(move || {
                    for i in 0..25 {
                        handle
                            .record(KeypressData::new(format!("key_{n}_{i}")))
                            .unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        collector.stop();

        assert_eq!(store.count().unwrap(), 100);
    }

    #[test]
    fn test_accepted_records_survive_concurrent_stop() {
        let store = store();
        let mut collector = Collector::new(store.clone());
        collector.start().unwrap();

        let producers: Vec<_> = (0..4)
            .map(|n| {
                let handle = collector.handle();
                thread::spawn(move || {
                    let mut accepted = 0;
                    for i in 0..500 {
                        match handle.record(KeypressData::new(format!("key_{n}_{i}"))) {
                            Ok(()) => accepted += 1,
                            Err(CollectorError::NotRunning) => break,
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                    accepted
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(5));
        collector.stop();

        let accepted: usize = producers.into_iter().map(|p| p.join().unwrap()).sum();
        assert_eq!(store.count().unwrap(), accepted);
        assert!(collector.receiver.is_empty());
    }

    #[test]
    fn test_spawn_failure_is_distinct_from_not_running() {
        let err = CollectorError::Spawn("Resource temporarily unavailable".to_string());
        assert_ne!(err, CollectorError::NotRunning);
        assert_eq!(
            err.to_string(),
            "failed to spawn writer thread: Resource temporarily unavailable"
        );
    }

    #[test]
    fn test_full_queue_reports_backpressure() {
        let collector = Collector::with_capacity(store(), 1);
        // Mark running without a writer so nothing drains the queue.
        collector.running.store(true, Ordering::SeqCst);
        let handle = collector.handle();

        handle.record(KeypressData::new("a")).unwrap();
        assert_eq!(
            handle.record(KeypressData::new("b")),
            Err(CollectorError::QueueFull)
        );
        collector.running.store(false, Ordering::SeqCst);
    }
}
