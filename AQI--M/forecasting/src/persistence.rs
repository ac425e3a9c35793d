use std::{
    fmt,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::snapshot::ModelSnapshot;

/// Bumped whenever the stored layout changes incompatibly.
pub const STORE_FORMAT_VERSION: u32 = 1;

/// Errors raised by model stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// Encoding or decoding failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Record decoded but failed consistency checks.
    #[error("corrupt model record: {0}")]
    Corrupt(String),
}

/// Durable slot holding at most one trained model.
///
/// `save` replaces parameters and metadata together; `load` returning `Ok(None)` means
/// nothing has been saved yet.
pub trait ModelStore: Send + Sync + fmt::Debug {
    /// Atomically replaces the stored model.
    fn save(&self, snapshot: &ModelSnapshot) -> Result<(), StoreError>;
    /// Reads the stored model, if any.
    fn load(&self) -> Result<Option<ModelSnapshot>, StoreError>;
    /// Removes the stored model. Clearing an empty store is not an error.
    fn clear(&self) -> Result<(), StoreError>;
}

#[derive(Serialize)]
struct StoredModelRef<'a> {
    format_version: u32,
    snapshot: &'a ModelSnapshot,
}

#[derive(Deserialize)]
struct StoredModel {
    format_version: u32,
    snapshot: ModelSnapshot,
}

fn encode(snapshot: &ModelSnapshot) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec(&StoredModelRef {
        format_version: STORE_FORMAT_VERSION,
        snapshot,
    })?)
}

fn decode(bytes: &[u8]) -> Result<ModelSnapshot, StoreError> {
    let stored: StoredModel = serde_json::from_slice(bytes)?;
    if stored.format_version != STORE_FORMAT_VERSION {
        return Err(StoreError::Corrupt(format!(
            "unsupported format version {}",
            stored.format_version
        )));
    }
    if !stored.snapshot.is_consistent() {
        return Err(StoreError::Corrupt(format!(
            "snapshot {} has inconsistent parameters or metadata",
            stored.snapshot.id
        )));
    }
    Ok(stored.snapshot)
}

/// Single JSON document on disk, replaced via write-to-temp then rename.
#[derive(Debug, Clone)]
pub struct FileModelStore {
    path: PathBuf,
}

impl FileModelStore {
    /// Store backed by `path`. Nothing touches disk until the first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the model document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl ModelStore for FileModelStore {
    fn save(&self, snapshot: &ModelSnapshot) -> Result<(), StoreError> {
        let bytes = encode(snapshot)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let staging = self.staging_path();
        let written = File::create(&staging).and_then(|mut file| {
            file.write_all(&bytes)?;
            file.sync_all()
        });
        if let Err(err) = written.and_then(|()| fs::rename(&staging, &self.path)) {
            let _ = fs::remove_file(&staging);
            return Err(err.into());
        }
        Ok(())
    }

    fn load(&self) -> Result<Option<ModelSnapshot>, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) => decode(&bytes).map(Some),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Process-local store holding the encoded record, for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryModelStore {
    record: Mutex<Option<Vec<u8>>>,
}

impl MemoryModelStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the raw record, bypassing encoding.
    pub fn put_raw(&self, bytes: impl Into<Vec<u8>>) {
        *self.record.lock() = Some(bytes.into());
    }
}

impl ModelStore for MemoryModelStore {
    fn save(&self, snapshot: &ModelSnapshot) -> Result<(), StoreError> {
        let bytes = encode(snapshot)?;
        *self.record.lock() = Some(bytes);
        Ok(())
    }

    fn load(&self) -> Result<Option<ModelSnapshot>, StoreError> {
        self.record.lock().as_deref().map(decode).transpose()
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.record.lock() = None;
        Ok(())
    }
}
