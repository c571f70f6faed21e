//! Durable session storage.
//!
//! The session survives restarts as one JSON record:
//!
//! ```json
//! { "schemaVersion": 1, "revision": 4,
//!   "state": { "user": { ... }, "token": "...", "isAuthenticated": true } }
//! ```
//!
//! Records written by the web client (`{ "state": { ... }, "version": 0 }`)
//! are still accepted.

use super::state::{SessionState, User};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Storage key of the persisted session.
pub const STORAGE_KEY: &str = "auth-storage";

/// Schema version written by this client.
pub const SCHEMA_VERSION: u32 = 1;

/// Envelope version of the legacy web client record.
const LEGACY_VERSION: u32 = 0;

/// Persistence failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Reading or writing the backing store failed.
    #[error("Session storage I/O failed: {0}")]
    Io(String),

    /// The stored record is not a session.
    #[error("Stored session is corrupt: {0}")]
    Corrupt(String),

    /// The record was written by a newer client.
    #[error("Stored session has unsupported schema version {0}")]
    UnsupportedVersion(u32),
}

/// The persisted part of [`SessionState`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    /// Signed-in user
    #[serde(default)]
    pub user: Option<User>,
    /// Bearer token
    #[serde(default)]
    pub token: Option<String>,
    /// Authenticated flag at write time (recomputed on start)
    #[serde(default)]
    pub is_authenticated: bool,
}

/// Versioned on-disk session record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    /// Record layout version
    pub schema_version: u32,
    /// Revision of the mutation that produced this record
    #[serde(default)]
    pub revision: u64,
    /// Session fields
    pub state: PersistedState,
}

impl PersistedSession {
    /// Snapshot the persisted fields of `state`.
    #[must_use]
    pub fn snapshot(state: &SessionState) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            revision: state.revision,
            state: PersistedState {
                user: state.user.clone(),
                token: state.token.clone(),
                is_authenticated: state.is_authenticated,
            },
        }
    }

    /// Rebuild session state from the record.
    #[must_use]
    pub fn into_state(self) -> SessionState {
        SessionState {
            token: self.state.token,
            user: self.state.user,
            is_authenticated: self.state.is_authenticated,
            revision: self.revision,
        }
    }

    /// Encode as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupt`] if serialization fails.
    pub fn encode(&self) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    /// Decode a stored record, accepting the legacy envelope.
    ///
    /// # Errors
    ///
    /// - [`StorageError::UnsupportedVersion`] for records from a newer client
    /// - [`StorageError::Corrupt`] for anything that is not a session record
    pub fn decode(raw: &str) -> Result<Self, StorageError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct VersionHeader {
            schema_version: Option<u32>,
            version: Option<u32>,
        }

        #[derive(Deserialize)]
        struct LegacyEnvelope {
            state: PersistedState,
        }

        let header: VersionHeader =
            serde_json::from_str(raw).map_err(|e| StorageError::Corrupt(e.to_string()))?;

        match (header.schema_version, header.version) {
            (Some(SCHEMA_VERSION), _) => {
                serde_json::from_str(raw).map_err(|e| StorageError::Corrupt(e.to_string()))
            },
            (Some(other), _) => Err(StorageError::UnsupportedVersion(other)),
            (None, Some(LEGACY_VERSION)) => {
                let legacy: LegacyEnvelope = serde_json::from_str(raw)
                    .map_err(|e| StorageError::Corrupt(e.to_string()))?;
                Ok(Self {
                    schema_version: SCHEMA_VERSION,
                    revision: 0,
                    state: legacy.state,
                })
            },
            (None, Some(other)) => Err(StorageError::UnsupportedVersion(other)),
            (None, None) => Err(StorageError::Corrupt("missing schema version".to_string())),
        }
    }
}

/// Backing store for the persisted session record.
///
/// Calls are blocking; the writer runs them off the async executor.
pub trait SessionStorage: Send + Sync {
    /// Read the raw record, `None` if nothing was ever written.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the backend cannot be read.
    fn load(&self) -> Result<Option<String>, StorageError>;

    /// Replace the raw record.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the backend cannot be written.
    fn save(&self, raw: &str) -> Result<(), StorageError>;
}

/// JSON file storage.
///
/// Writes go to a sibling temp file that is renamed over the record, so a
/// crash mid-write leaves the previous record intact.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Storage backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The record path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStorage for FileStorage {
    fn load(&self) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e.to_string())),
        }
    }

    fn save(&self, raw: &str) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
        }

        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);

        std::fs::write(&temp, raw).map_err(|e| StorageError::Io(e.to_string()))?;
        std::fs::rename(&temp, &self.path).map_err(|e| StorageError::Io(e.to_string()))
    }
}

/// Load and decode the stored session.
///
/// Corrupt or newer records are logged and treated as absent, so a bad file
/// never blocks startup.
pub async fn restore(storage: Arc<dyn SessionStorage>) -> Option<PersistedSession> {
    let loaded = tokio::task::spawn_blocking(move || storage.load()).await;

    let raw = match loaded {
        Ok(Ok(Some(raw))) => raw,
        Ok(Ok(None)) => return None,
        Ok(Err(error)) => {
            tracing::warn!(%error, key = STORAGE_KEY, "Could not read stored session");
            return None;
        },
        Err(error) => {
            tracing::error!(%error, "Session load task failed");
            return None;
        },
    };

    match PersistedSession::decode(&raw) {
        Ok(session) => {
            tracing::debug!(revision = session.revision, "Restored stored session");
            Some(session)
        },
        Err(error) => {
            tracing::warn!(%error, key = STORAGE_KEY, "Discarding stored session");
            metrics::counter!("session.restore.discarded").increment(1);
            None
        },
    }
}

/// Writes session snapshots in revision order.
///
/// Snapshot effects may finish out of order. The writer remembers the last
/// revision written and drops anything older, so the record never regresses.
#[derive(Clone)]
pub struct SnapshotWriter {
    storage: Arc<dyn SessionStorage>,
    last_written: Arc<Mutex<u64>>,
}

impl SnapshotWriter {
    /// Writer over `storage`, treating `revision` as already written.
    #[must_use]
    pub fn new(storage: Arc<dyn SessionStorage>, revision: u64) -> Self {
        Self {
            storage,
            last_written: Arc::new(Mutex::new(revision)),
        }
    }

    /// Write `snapshot` unless a newer one already landed.
    ///
    /// Returns whether the snapshot was written. Failures are logged; the
    /// in-memory session stays authoritative.
    pub async fn write(&self, snapshot: PersistedSession) -> bool {
        let mut last_written = self.last_written.lock().await;
        if snapshot.revision <= *last_written {
            tracing::debug!(
                revision = snapshot.revision,
                last_written = *last_written,
                "Skipping stale session snapshot"
            );
            return false;
        }

        let raw = match snapshot.encode() {
            Ok(raw) => raw,
            Err(error) => {
                tracing::error!(%error, "Could not encode session snapshot");
                return false;
            },
        };

        let storage = Arc::clone(&self.storage);
        match tokio::task::spawn_blocking(move || storage.save(&raw)).await {
            Ok(Ok(())) => {
                *last_written = snapshot.revision;
                true
            },
            Ok(Err(error)) => {
                tracing::warn!(%error, revision = snapshot.revision, "Session snapshot not saved");
                metrics::counter!("session.persist.failures").increment(1);
                false
            },
            Err(error) => {
                tracing::error!(%error, "Session save task failed");
                false
            },
        }
    }
}

impl std::fmt::Debug for SnapshotWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotWriter").finish_non_exhaustive()
    }
}
