//! Receiver registry
//!
//! Maps receiver ids to their fixed positions. Readers take an `Arc` snapshot
//! of the whole map; registration builds a new map and swaps it in, so a
//! concurrent estimation pass always sees one consistent registry.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::core::{ReceiverLocation, ReceiverMap, ReceiverPosition};
use crate::validation::PersistenceError;

#[derive(Debug, Default)]
pub struct ReceiverRegistry {
    receivers: RwLock<Arc<ReceiverMap>>,
    path: Option<PathBuf>,
    /// Serialises merge-and-save so files land in registration order
    persist: Mutex<()>,
}

impl ReceiverRegistry {
    /// Empty, memory-only registry
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(receivers: ReceiverMap) -> Self {
        Self {
            receivers: RwLock::new(Arc::new(receivers)),
            ..Self::default()
        }
    }

    /// Registry backed by a JSON file. A missing file starts empty.
    pub fn with_persistence<P: Into<PathBuf>>(path: P) -> Result<Self, PersistenceError> {
        let path = path.into();
        let receivers = match Self::load(&path) {
            Ok(map) => map,
            Err(PersistenceError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "no receiver file yet, starting empty");
                ReceiverMap::new()
            }
            Err(e) => return Err(e),
        };
        Ok(Self {
            receivers: RwLock::new(Arc::new(receivers)),
            path: Some(path),
            persist: Mutex::new(()),
        })
    }

    /// Read a receiver map from a JSON object of `id -> {x, y[, z]}`
    pub fn load(path: &Path) -> Result<ReceiverMap, PersistenceError> {
        let text = fs::read_to_string(path).map_err(|source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let receivers: ReceiverMap = serde_json::from_str(&text).map_err(|source| PersistenceError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), receivers = receivers.len(), "receiver positions loaded");
        Ok(receivers)
    }

    /// Write `receivers` as pretty JSON with sorted keys. The file is written
    /// next to its destination and renamed into place.
    pub fn save(path: &Path, receivers: &ReceiverMap) -> Result<(), PersistenceError> {
        let sorted: BTreeMap<&String, &ReceiverLocation> = receivers.iter().collect();
        let text = serde_json::to_string_pretty(&sorted).map_err(|source| PersistenceError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        let io_err = |source| PersistenceError::Io { path: path.to_path_buf(), source };
        let mut staging = path.as_os_str().to_owned();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);
        fs::write(&staging, text).map_err(io_err)?;
        fs::rename(&staging, path).map_err(io_err)?;
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current registry; later registrations do not affect the returned map
    pub fn snapshot(&self) -> Arc<ReceiverMap> {
        Arc::clone(&self.receivers.read())
    }

    pub fn get(&self, receiver_id: &str) -> Option<ReceiverLocation> {
        self.receivers.read().get(receiver_id).copied()
    }

    pub fn len(&self) -> usize {
        self.receivers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.receivers.read().is_empty()
    }

    /// Merge receivers into the registry, overwriting existing ids, and
    /// persist the result when file-backed. Returns the registry size.
    ///
    /// The in-memory registry is updated even if persisting fails.
    pub fn register<I>(&self, receivers: I) -> Result<usize, PersistenceError>
    where
        I: IntoIterator<Item = ReceiverPosition>,
    {
        let _guard = self.persist.lock();

        let mut merged = ReceiverMap::clone(&self.snapshot());
        let mut added = 0usize;
        for receiver in receivers {
            if merged.insert(receiver.receiver_id, receiver.position).is_none() {
                added += 1;
            }
        }
        let merged = Arc::new(merged);
        *self.receivers.write() = Arc::clone(&merged);
        info!(added, total = merged.len(), "receivers registered");

        self.persist_map(&merged)?;
        Ok(merged.len())
    }

    /// Replace the whole registry
    pub fn replace_all(&self, receivers: ReceiverMap) -> Result<(), PersistenceError> {
        let _guard = self.persist.lock();
        let receivers = Arc::new(receivers);
        *self.receivers.write() = Arc::clone(&receivers);
        self.persist_map(&receivers)
    }

    fn persist_map(&self, receivers: &ReceiverMap) -> Result<(), PersistenceError> {
        match &self.path {
            Some(path) => Self::save(path, receivers).map_err(|e| {
                warn!(error = %e, "failed to persist receiver positions");
                e
            }),
            None => Ok(()),
        }
    }
}
