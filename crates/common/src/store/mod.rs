//! Session storage
//!
//! Provides:
//! - The `SessionStore` interface the orchestrator and HTTP layer depend on
//! - An in-memory backend
//! - Best-effort JSON snapshot persistence with a periodic flusher

use crate::errors::{AppError, Result};
use crate::models::Session;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

/// Mutation applied to the freshest copy of a session
pub type SessionUpdate<'a> = Box<dyn FnOnce(&mut Session) -> Result<()> + Send + 'a>;

/// Key/value access to sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a session by id
    async fn get(&self, id: &str) -> Result<Option<Session>>;

    /// Insert or replace a session (last write wins)
    async fn put(&self, session: Session) -> Result<()>;

    /// Remove a session; returns whether it existed
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Number of stored sessions
    async fn len(&self) -> Result<usize>;

    /// Fetch a session or create an empty one under the given id
    async fn get_or_create(&self, id: &str) -> Result<Session> {
        match self.get(id).await? {
            Some(session) => Ok(session),
            None => {
                let session = Session::new(id);
                self.put(session.clone()).await?;
                debug!(session_id = %id, "Session created");
                Ok(session)
            }
        }
    }

    /// Re-read a session (creating it if missing), apply `apply` and store the
    /// result. Nothing is written when `apply` fails.
    ///
    /// The default is read-modify-write; backends override it to hold their
    /// lock across the whole step.
    async fn update(&self, id: &str, apply: SessionUpdate<'_>) -> Result<Session> {
        let mut session = self.get_or_create(id).await?;
        apply(&mut session)?;
        self.put(session.clone()).await?;
        Ok(session)
    }

    /// Fetch an existing session or fail with `SessionNotFound`
    async fn require(&self, id: &str) -> Result<Session> {
        self.get(id)
            .await?
            .ok_or_else(|| AppError::SessionNotFound { id: id.to_string() })
    }
}

/// In-memory session store
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Session>>,
    dirty: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store seeded with existing sessions
    pub fn with_sessions(sessions: HashMap<String, Session>) -> Self {
        Self {
            sessions: RwLock::new(sessions),
            dirty: AtomicBool::new(false),
        }
    }

    /// Whether anything changed since the last snapshot
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Clone all sessions and clear the dirty flag
    pub async fn snapshot(&self) -> HashMap<String, Session> {
        let sessions = self.sessions.read().await;
        self.dirty.store(false, Ordering::Release);
        sessions.clone()
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn put(&self, session: Session) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
        self.mark_dirty();
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            self.mark_dirty();
        }
        Ok(removed)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.sessions.read().await.len())
    }

    async fn update(&self, id: &str, apply: SessionUpdate<'_>) -> Result<Session> {
        let mut sessions = self.sessions.write().await;
        let mut session = sessions.get(id).cloned().unwrap_or_else(|| Session::new(id));
        apply(&mut session)?;
        sessions.insert(id.to_string(), session.clone());
        self.mark_dirty();
        Ok(session)
    }
}

/// Writes `MemoryStore` snapshots to a JSON file
#[derive(Debug, Clone)]
pub struct SnapshotPersister {
    path: PathBuf,
}

impl SnapshotPersister {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load sessions from disk. A missing or unreadable file yields an empty map.
    pub async fn load(&self) -> HashMap<String, Session> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No session snapshot found, starting empty");
                return HashMap::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read session snapshot");
                return HashMap::new();
            }
        };

        match serde_json::from_slice::<HashMap<String, Session>>(&bytes) {
            Ok(sessions) => {
                info!(path = %self.path.display(), sessions = sessions.len(), "Session snapshot loaded");
                sessions
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Corrupt session snapshot ignored");
                HashMap::new()
            }
        }
    }

    /// Write a snapshot atomically (temp file, then rename)
    pub async fn save(&self, sessions: &HashMap<String, Session>) -> Result<()> {
        let json = serde_json::to_vec_pretty(sessions)?;
        let tmp = self.path.with_extension("json.tmp");

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), sessions = sessions.len(), bytes = json.len(), "Session snapshot written");
        Ok(())
    }

    /// Flush the store if it changed since the last snapshot
    pub async fn flush(&self, store: &MemoryStore) -> Result<bool> {
        if !store.is_dirty() {
            return Ok(false);
        }
        let sessions = store.snapshot().await;
        if let Err(e) = self.save(&sessions).await {
            // Keep the store dirty so the next tick retries
            store.mark_dirty();
            return Err(e);
        }
        Ok(true)
    }

    /// Spawn the periodic flusher. It writes once more when `shutdown` fires.
    pub fn spawn_flusher(
        self,
        store: Arc<MemoryStore>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.flush(&store).await {
                            error!(error = %e, "Periodic session snapshot failed");
                        }
                    }
                    _ = shutdown.changed() => {
                        break;
                    }
                }
            }

            match self.flush(&store).await {
                Ok(true) => info!("Final session snapshot written"),
                Ok(false) => debug!("No session changes to persist on shutdown"),
                Err(e) => error!(error = %e, "Final session snapshot failed"),
            }
        })
    }
}
