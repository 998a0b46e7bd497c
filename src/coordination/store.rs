use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::types::CoordinationState;
use crate::config::CoordinationConfig;

/// Errors raised by the file-backed coordination store
#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Advisory lock {path} unavailable after {attempts} attempts")]
    LockUnavailable { path: String, attempts: u32 },
}

/// Shared JSON document guarded by an advisory lock file.
///
/// Every operation runs acquire lock → read → prune → apply → write → release.
/// The lock is an OS-level exclusive lock on `lock_path`, so independent agent
/// processes (and independent handles inside one process) exclude each other.
#[derive(Debug, Clone)]
pub struct CoordinationStore {
    file_path: PathBuf,
    lock_path: PathBuf,
    lock_attempts: u32,
    lock_retry_delay: Duration,
}

impl CoordinationStore {
    pub fn new(file_path: impl Into<PathBuf>, lock_path: impl Into<PathBuf>) -> Self {
        let defaults = CoordinationConfig::default();
        Self {
            file_path: file_path.into(),
            lock_path: lock_path.into(),
            lock_attempts: defaults.lock_attempts,
            lock_retry_delay: Duration::from_millis(defaults.lock_retry_delay_ms),
        }
    }

    pub fn from_config(config: &CoordinationConfig) -> Self {
        Self::new(&config.file_path, &config.lock_path).with_lock_retry(
            config.lock_attempts,
            Duration::from_millis(config.lock_retry_delay_ms),
        )
    }

    /// Override how many non-blocking lock attempts are made before failing closed.
    pub fn with_lock_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.lock_attempts = attempts.max(1);
        self.lock_retry_delay = delay;
        self
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Read the document under the advisory lock. Expired records are pruned
    /// and, if anything was pruned, the cleaned document is written back.
    pub async fn read(&self) -> Result<CoordinationState, CoordinationError> {
        self.update(|state, _now| state.clone()).await
    }

    /// Run `apply` against the pruned document under the advisory lock and
    /// persist the result. `apply` runs at most once.
    pub async fn update<F, T>(&self, apply: F) -> Result<T, CoordinationError>
    where
        F: FnOnce(&mut CoordinationState, DateTime<Utc>) -> T,
    {
        let mut lock = RwLock::new(self.open_lock_file()?);
        let mut apply = Some(apply);

        for attempt in 1..=self.lock_attempts {
            if let Some(result) = self.try_locked(&mut lock, &mut apply)? {
                return Ok(result);
            }
            debug!(
                lock_path = %self.lock_path.display(),
                attempt = attempt,
                "Coordination lock busy"
            );
            if attempt < self.lock_attempts {
                tokio::time::sleep(self.lock_retry_delay).await;
            }
        }

        warn!(
            lock_path = %self.lock_path.display(),
            attempts = self.lock_attempts,
            "Coordination lock unavailable, failing closed"
        );
        Err(CoordinationError::LockUnavailable {
            path: self.lock_path.display().to_string(),
            attempts: self.lock_attempts,
        })
    }

    /// Best-effort read without taking the lock. Expired records are pruned in
    /// memory only; nothing is written.
    pub fn peek(&self) -> CoordinationState {
        let mut state = self.load_document();
        state.prune(Utc::now());
        state
    }

    /// Persist `state` verbatim under the lock, replacing the document.
    pub async fn replace(&self, state: CoordinationState) -> Result<(), CoordinationError> {
        self.update(move |current, _now| *current = state).await
    }

    fn try_locked<F, T>(
        &self,
        lock: &mut RwLock<File>,
        apply: &mut Option<F>,
    ) -> Result<Option<T>, CoordinationError>
    where
        F: FnOnce(&mut CoordinationState, DateTime<Utc>) -> T,
    {
        let _guard = match lock.try_write() {
            Ok(guard) => guard,
            Err(_) => return Ok(None),
        };
        let Some(apply) = apply.take() else {
            return Ok(None);
        };

        let now = Utc::now();
        let mut state = self.load_document();
        let original = state.clone();
        let pruned = state.prune(now);
        let result = apply(&mut state, now);

        if state != original {
            self.write_document(&state)?;
            debug!(
                file = %self.file_path.display(),
                pruned = pruned,
                locks = state.locks.len(),
                has_leader = state.leader.is_some(),
                "Coordination document written"
            );
        }

        Ok(Some(result))
    }

    fn open_lock_file(&self) -> Result<File, CoordinationError> {
        ensure_parent(&self.lock_path)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.lock_path)?;
        Ok(file)
    }

    /// Missing or malformed documents read as an empty store.
    fn load_document(&self) -> CoordinationState {
        let contents = match fs::read_to_string(&self.file_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return CoordinationState::default(),
            Err(e) => {
                warn!(file = %self.file_path.display(), error = %e, "Unreadable coordination document, treating as empty");
                return CoordinationState::default();
            }
        };

        if contents.trim().is_empty() {
            return CoordinationState::default();
        }

        match serde_json::from_str(&contents) {
            Ok(state) => state,
            Err(e) => {
                warn!(file = %self.file_path.display(), error = %e, "Malformed coordination document, treating as empty");
                CoordinationState::default()
            }
        }
    }

    fn write_document(&self, state: &CoordinationState) -> Result<(), CoordinationError> {
        ensure_parent(&self.file_path)?;
        let serialized = serde_json::to_string_pretty(state)?;

        // Write to temporary file first, then rename
        let temp_file = format!("{}.tmp", self.file_path.display());
        fs::write(&temp_file, serialized)?;
        fs::rename(&temp_file, &self.file_path)?;
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
