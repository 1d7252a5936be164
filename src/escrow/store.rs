//! Session persistence with optimistic concurrency.
//!
//! Every write names the version it was derived from. A write against a stale
//! version fails with `Conflict`, which is how two concurrent settlements of
//! the same session are told apart: exactly one compare-and-swap wins.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::escrow::session::{EscrowSession, EscrowState, SessionId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session {0} not found")]
    NotFound(SessionId),

    #[error("version conflict: expected {expected}, found {actual}")]
    Conflict { expected: u64, actual: u64 },

    #[error("session {0} already exists")]
    Duplicate(SessionId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Strongly consistent per-session storage.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store a new session at version 1.
    async fn insert(&self, session: EscrowSession) -> Result<EscrowSession, StoreError>;

    async fn get(&self, id: SessionId) -> Result<Option<EscrowSession>, StoreError>;

    /// Replace the stored session if it is still at `expected_version`.
    ///
    /// Returns the stored copy with its version bumped.
    async fn compare_and_swap(
        &self,
        session: EscrowSession,
        expected_version: u64,
    ) -> Result<EscrowSession, StoreError>;

    /// All sessions, optionally filtered by state.
    async fn list(&self, state: Option<EscrowState>) -> Result<Vec<EscrowSession>, StoreError>;
}

/// In-process store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: DashMap<SessionId, EscrowSession>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// The session as `insert` would store it, without storing it.
    fn check_insert(&self, mut session: EscrowSession) -> Result<EscrowSession, StoreError> {
        if self.sessions.contains_key(&session.id()) {
            return Err(StoreError::Duplicate(session.id()));
        }
        session.set_version(1);
        Ok(session)
    }

    /// The session as `compare_and_swap` would store it, without storing it.
    fn check_swap(&self, mut session: EscrowSession, expected_version: u64) -> Result<EscrowSession, StoreError> {
        let id = session.id();
        let actual = self
            .sessions
            .get(&id)
            .map(|stored| stored.version())
            .ok_or(StoreError::NotFound(id))?;
        if actual != expected_version {
            return Err(StoreError::Conflict {
                expected: expected_version,
                actual,
            });
        }
        session.set_version(expected_version + 1);
        Ok(session)
    }

    fn insert_sync(&self, mut session: EscrowSession) -> Result<EscrowSession, StoreError> {
        match self.sessions.entry(session.id()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(session.id())),
            Entry::Vacant(slot) => {
                session.set_version(1);
                slot.insert(session.clone());
                Ok(session)
            }
        }
    }

    fn swap_sync(&self, mut session: EscrowSession, expected_version: u64) -> Result<EscrowSession, StoreError> {
        let id = session.id();
        // The shard write lock is held for the whole check-and-replace.
        let mut stored = self.sessions.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if stored.version() != expected_version {
            return Err(StoreError::Conflict {
                expected: expected_version,
                actual: stored.version(),
            });
        }
        session.set_version(expected_version + 1);
        *stored = session.clone();
        Ok(session)
    }

    fn list_sync(&self, state: Option<EscrowState>) -> Vec<EscrowSession> {
        let mut sessions: Vec<EscrowSession> = self
            .sessions
            .iter()
            .filter(|entry| state.map_or(true, |s| entry.state() == s))
            .map(|entry| entry.value().clone())
            .collect();
        sessions.sort_by_key(|s| (s.created_at(), s.id()));
        sessions
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: EscrowSession) -> Result<EscrowSession, StoreError> {
        self.insert_sync(session)
    }

    async fn get(&self, id: SessionId) -> Result<Option<EscrowSession>, StoreError> {
        Ok(self.sessions.get(&id).map(|entry| entry.value().clone()))
    }

    async fn compare_and_swap(
        &self,
        session: EscrowSession,
        expected_version: u64,
    ) -> Result<EscrowSession, StoreError> {
        self.swap_sync(session, expected_version)
    }

    async fn list(&self, state: Option<EscrowState>) -> Result<Vec<EscrowSession>, StoreError> {
        Ok(self.list_sync(state))
    }
}

/// Memory store mirrored to a JSON file on every write.
///
/// A write is committed to memory only after the file holding it has been
/// replaced, so a failed write leaves both copies at the previous version.
/// The file is replaced atomically (write to a temp file, then rename) and
/// restricted to the owner on Unix. It holds only ciphertext of escrow secrets.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemorySessionStore,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open `path`, loading existing sessions. A missing file starts empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let inner = MemorySessionStore::new();

        if path.exists() {
            let json = std::fs::read_to_string(&path)?;
            let sessions: Vec<EscrowSession> = serde_json::from_str(&json)?;
            for session in sessions {
                inner.sessions.insert(session.id(), session);
            }
            tracing::info!(path = %path.display(), count = inner.len(), "Session store loaded");
        } else {
            tracing::info!(path = %path.display(), "Session store file not found, starting empty");
        }

        Ok(Self {
            path,
            inner,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current sessions with `session` added or replacing its stored copy.
    fn snapshot_with(&self, session: &EscrowSession) -> Vec<EscrowSession> {
        let mut sessions = self.inner.list_sync(None);
        match sessions.iter_mut().find(|s| s.id() == session.id()) {
            Some(slot) => *slot = session.clone(),
            None => sessions.push(session.clone()),
        }
        sessions
    }

    async fn persist(&self, sessions: &[EscrowSession]) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(sessions)?;
        let tmp = self.path.with_extension("json.tmp");

        tokio::fs::write(&tmp, json).await?;

        // Restrict file permissions to owner-only on Unix (0o600 = rw-------).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }

        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::debug!(path = %self.path.display(), count = sessions.len(), "Session store saved");
        Ok(())
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn insert(&self, session: EscrowSession) -> Result<EscrowSession, StoreError> {
        let _guard = self.write_lock.lock().await;
        let stored = self.inner.check_insert(session)?;
        self.persist(&self.snapshot_with(&stored)).await?;
        self.inner.sessions.insert(stored.id(), stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: SessionId) -> Result<Option<EscrowSession>, StoreError> {
        self.inner.get(id).await
    }

    async fn compare_and_swap(
        &self,
        session: EscrowSession,
        expected_version: u64,
    ) -> Result<EscrowSession, StoreError> {
        // Every mutation of `inner` happens under this lock, so the version
        // checked here is still current when the write is committed.
        let _guard = self.write_lock.lock().await;
        let stored = self.inner.check_swap(session, expected_version)?;
        self.persist(&self.snapshot_with(&stored)).await?;
        self.inner.sessions.insert(stored.id(), stored.clone());
        Ok(stored)
    }

    async fn list(&self, state: Option<EscrowState>) -> Result<Vec<EscrowSession>, StoreError> {
        self.inner.list(state).await
    }
}
