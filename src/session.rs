//! Session state persistence and the single-session lock.
//!
//! The engine assumes one active editing session at a time. The state file
//! carries the stage collections and the command history between CLI
//! invocations; the advisory file lock turns the single-session assumption
//! into an enforced precondition instead of a silent one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

use crate::pipeline::{CommandHistory, PipelineState};

pub const SESSION_VERSION: &str = "1";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session state version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },

    #[error("Another session holds the lock at {path}")]
    Locked { path: PathBuf },
}

/// Everything a session needs to resume: live state plus undo/redo history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub version: String,
    pub pipeline: PipelineState,
    pub history: CommandHistory,
    pub last_saved: DateTime<Utc>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            version: SESSION_VERSION.to_string(),
            pipeline: PipelineState::default(),
            history: CommandHistory::default(),
            last_saved: Utc::now(),
        }
    }
}

/// Loads and saves the session state file.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file means a fresh session, not an error.
    pub async fn load(&self) -> Result<SessionState, SessionError> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "No session state found, starting fresh");
            return Ok(SessionState::default());
        }
        let bytes = fs::read(&self.path).await?;
        let state: SessionState = serde_json::from_slice(&bytes)?;
        if state.version != SESSION_VERSION {
            return Err(SessionError::VersionMismatch {
                expected: SESSION_VERSION.to_string(),
                found: state.version,
            });
        }
        debug!(path = %self.path.display(), "Session state loaded");
        Ok(state)
    }

    pub async fn save(&self, state: &mut SessionState) -> Result<(), SessionError> {
        state.last_saved = Utc::now();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(state)?;
        fs::write(&self.path, payload).await?;
        debug!(path = %self.path.display(), "Session state saved");
        Ok(())
    }
}

/// Advisory lock over the session. Holding the returned guard keeps the
/// lock; dropping it releases.
pub struct SessionLock {
    path: PathBuf,
    lock: fd_lock::RwLock<File>,
}

impl SessionLock {
    pub fn open(path: &Path) -> Result<Self, SessionError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            lock: fd_lock::RwLock::new(file),
        })
    }

    pub fn try_acquire(&mut self) -> Result<fd_lock::RwLockWriteGuard<'_, File>, SessionError> {
        let path = self.path.clone();
        self.lock.try_write().map_err(|err| {
            if err.kind() == std::io::ErrorKind::WouldBlock {
                SessionError::Locked { path }
            } else {
                SessionError::Io(err)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{OrderRecord, Stage};

    #[tokio::test]
    async fn test_state_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));

        let mut state = SessionState::default();
        state
            .pipeline
            .registry
            .insert(
                Stage::Pending,
                OrderRecord::new("1HGCM82633A004352", "Dana Li").with_id("o1"),
            )
            .unwrap();
        state.history.record("intake", PipelineState::default());
        store.save(&mut state).await.unwrap();

        let restored = store.load().await.unwrap();
        assert_eq!(restored.pipeline, state.pipeline);
        assert!(restored.history.can_undo());
    }

    #[tokio::test]
    async fn test_missing_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("absent.json"));
        let state = store.load().await.unwrap();
        assert!(state.pipeline.registry.is_empty());
    }

    #[tokio::test]
    async fn test_version_mismatch_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut state = SessionState::default();
        state.version = "0".to_string();
        std::fs::write(&path, serde_json::to_vec(&state).unwrap()).unwrap();

        let err = SessionStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, SessionError::VersionMismatch { .. }));
    }

    #[test]
    fn test_second_session_is_locked_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.lock");

        let mut first = SessionLock::open(&path).unwrap();
        let _guard = first.try_acquire().unwrap();

        let mut second = SessionLock::open(&path).unwrap();
        assert!(matches!(
            second.try_acquire().unwrap_err(),
            SessionError::Locked { .. }
        ));
    }
}
