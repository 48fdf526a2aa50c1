use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{MonitorError, MonitorResult};
use crate::events::EventLog;
use crate::profile::UserProfile;
use crate::scoring::Score;
use crate::trip::TripState;

/// The four independently persisted entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    Profile,
    Score,
    EventLog,
    TripState,
}

impl StoreKey {
    pub const ALL: [StoreKey; 4] = [
        StoreKey::Profile,
        StoreKey::Score,
        StoreKey::EventLog,
        StoreKey::TripState,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StoreKey::Profile => "userProfile",
            StoreKey::Score => "currentScore",
            StoreKey::EventLog => "drivingEvents",
            StoreKey::TripState => "currentTripState",
        }
    }
}

/// Blob store behind the gateway
pub trait Persistence: Send + Sync {
    fn save(&self, key: StoreKey, blob: Vec<u8>) -> MonitorResult<()>;

    fn load(&self, key: StoreKey) -> MonitorResult<Option<Vec<u8>>>;

    /// Ask for pending writes to reach the backing store.
    fn flush(&self) -> MonitorResult<()> {
        Ok(())
    }
}

/// Keeps blobs in memory; cloning shares the same map
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blobs: Arc<Mutex<HashMap<StoreKey, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: StoreKey) -> bool {
        self.blobs
            .lock()
            .map(|b| b.contains_key(&key))
            .unwrap_or(false)
    }

    /// Write raw bytes directly, bypassing encoding.
    pub fn put_raw(&self, key: StoreKey, blob: &[u8]) {
        if let Ok(mut blobs) = self.blobs.lock() {
            blobs.insert(key, blob.to_vec());
        }
    }
}

impl Persistence for MemoryStore {
    fn save(&self, key: StoreKey, blob: Vec<u8>) -> MonitorResult<()> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| MonitorError::StorageError("Failed to acquire store lock".to_string()))?;
        blobs.insert(key, blob);
        Ok(())
    }

    fn load(&self, key: StoreKey) -> MonitorResult<Option<Vec<u8>>> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|_| MonitorError::StorageError("Failed to acquire store lock".to_string()))?;
        Ok(blobs.get(&key).cloned())
    }
}

/// One JSON file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl AsRef<Path>) -> MonitorResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, key: StoreKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.name()))
    }
}

impl Persistence for FileStore {
    fn save(&self, key: StoreKey, blob: Vec<u8>) -> MonitorResult<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, blob)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn load(&self, key: StoreKey) -> MonitorResult<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

enum WriteRequest {
    Save(StoreKey, Vec<u8>),
    Flush,
    Shutdown,
}

/// Moves writes off the caller's thread. Consecutive saves to the same key
/// are coalesced so only the latest blob is written.
pub struct BackgroundStore<S: Persistence + 'static> {
    inner: Arc<S>,
    tx: Sender<WriteRequest>,
    writer: Option<JoinHandle<()>>,
}

impl<S: Persistence + 'static> BackgroundStore<S> {
    pub fn new(inner: S) -> Self {
        let inner = Arc::new(inner);
        let (tx, rx) = channel::unbounded();
        let writer_store = Arc::clone(&inner);
        let writer = thread::Builder::new()
            .name("drive-score-writer".to_string())
            .spawn(move || writer_loop(writer_store, rx))
            .ok();

        if writer.is_none() {
            log::warn!("Could not spawn persistence writer, saves will be dropped");
        }

        Self { inner, tx, writer }
    }
}

fn writer_loop<S: Persistence>(store: Arc<S>, rx: Receiver<WriteRequest>) {
    let mut pending: HashMap<StoreKey, Vec<u8>> = HashMap::new();
    let mut running = true;

    while running {
        let first = match rx.recv() {
            Ok(req) => req,
            Err(_) => break,
        };

        for req in std::iter::once(first).chain(rx.try_iter()) {
            match req {
                WriteRequest::Save(key, blob) => {
                    pending.insert(key, blob);
                }
                WriteRequest::Flush => {}
                WriteRequest::Shutdown => running = false,
            }
        }

        for (key, blob) in pending.drain() {
            if let Err(e) = store.save(key, blob) {
                log::warn!("Failed to persist {}: {}", key.name(), e);
            }
        }
    }
}

impl<S: Persistence + 'static> Persistence for BackgroundStore<S> {
    fn save(&self, key: StoreKey, blob: Vec<u8>) -> MonitorResult<()> {
        self.tx
            .send(WriteRequest::Save(key, blob))
            .map_err(|_| MonitorError::StorageError("Writer thread gone".to_string()))
    }

    fn load(&self, key: StoreKey) -> MonitorResult<Option<Vec<u8>>> {
        self.inner.load(key)
    }

    fn flush(&self) -> MonitorResult<()> {
        self.tx
            .send(WriteRequest::Flush)
            .map_err(|_| MonitorError::StorageError("Writer thread gone".to_string()))
    }
}

impl<S: Persistence + 'static> Drop for BackgroundStore<S> {
    fn drop(&mut self) {
        let _ = self.tx.send(WriteRequest::Shutdown);
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
    }
}

/// Typed load/save of monitor state. Never fails: unreadable or missing
/// blobs become defaults, failed writes are logged and counted.
pub struct PersistenceGateway {
    store: Box<dyn Persistence>,
    save_failures: AtomicU64,
}

impl PersistenceGateway {
    pub fn new(store: impl Persistence + 'static) -> Self {
        Self {
            store: Box::new(store),
            save_failures: AtomicU64::new(0),
        }
    }

    pub fn save_failures(&self) -> u64 {
        self.save_failures.load(Ordering::Relaxed)
    }

    pub fn load_profile(&self) -> UserProfile {
        self.load_or_default(StoreKey::Profile)
    }

    /// Missing score means a first launch: a full 100.
    pub fn load_score(&self) -> Score {
        self.load_or_default(StoreKey::Score)
    }

    pub fn load_events(&self) -> EventLog {
        self.load_or_default(StoreKey::EventLog)
    }

    pub fn load_trip_state(&self) -> TripState {
        self.load_or_default(StoreKey::TripState)
    }

    pub fn save_profile(&self, profile: &UserProfile) {
        self.save_value(StoreKey::Profile, profile);
    }

    pub fn save_score_and_events(&self, score: Score, events: &EventLog) {
        self.save_value(StoreKey::Score, &score);
        self.save_value(StoreKey::EventLog, events);
    }

    pub fn save_trip_state(&self, state: TripState) {
        self.save_value(StoreKey::TripState, &state);
    }

    pub fn flush(&self) {
        if let Err(e) = self.store.flush() {
            self.save_failures.fetch_add(1, Ordering::Relaxed);
            log::warn!("Persistence flush failed: {}", e);
        }
    }

    fn load_or_default<T: DeserializeOwned + Default>(&self, key: StoreKey) -> T {
        let blob = match self.store.load(key) {
            Ok(Some(blob)) => blob,
            Ok(None) => return T::default(),
            Err(e) => {
                log::warn!("Failed to load {}: {}, using default", key.name(), e);
                return T::default();
            }
        };

        serde_json::from_slice(&blob).unwrap_or_else(|e| {
            let err = MonitorError::DecodeError {
                key: key.name(),
                reason: e.to_string(),
            };
            log::warn!("{}, using default", err);
            T::default()
        })
    }

    fn save_value<T: Serialize>(&self, key: StoreKey, value: &T) {
        let result = serde_json::to_vec(value)
            .map_err(|e| MonitorError::StorageError(e.to_string()))
            .and_then(|blob| self.store.save(key, blob));

        if let Err(e) = result {
            self.save_failures.fetch_add(1, Ordering::Relaxed);
            log::warn!("Failed to save {}: {}", key.name(), e);
        }
    }
}
