//! Auto-save of the session being edited.

use super::{FileStorage, SessionState, Storage, StorageResult};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default auto-save interval in seconds.
pub const DEFAULT_AUTOSAVE_INTERVAL_SECS: u64 = 30;

/// Key under which the most recently saved session is mirrored.
pub const LAST_SESSION_KEY: &str = "__last_session__";

/// Name used when a session was never given one.
pub const DEFAULT_SESSION_NAME: &str = "untitled";

/// Saves a dirty session periodically and remembers the last one opened.
pub struct AutoSaveManager<S: Storage> {
    storage: Arc<S>,
    interval: Duration,
    last_save: Option<Instant>,
    dirty: bool,
    session_name: Option<String>,
}

impl<S: Storage> AutoSaveManager<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            interval: Duration::from_secs(DEFAULT_AUTOSAVE_INTERVAL_SECS),
            last_save: None,
            dirty: false,
            session_name: None,
        }
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Record that the session changed since the last save.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_session_name(&mut self, name: Option<String>) {
        self.session_name = name;
    }

    pub fn session_name(&self) -> &str {
        self.session_name.as_deref().unwrap_or(DEFAULT_SESSION_NAME)
    }

    /// Dirty, and the interval has elapsed since the last save.
    pub fn should_save(&self) -> bool {
        if !self.dirty {
            return false;
        }
        match self.last_save {
            Some(last) => last.elapsed() >= self.interval,
            None => true,
        }
    }

    /// Save if [`should_save`](Self::should_save). Returns whether a save happened.
    pub async fn maybe_save(&mut self, state: &SessionState) -> StorageResult<bool> {
        if !self.should_save() {
            return Ok(false);
        }
        self.save(state).await?;
        Ok(true)
    }

    /// Save immediately, under the session name and as the last session.
    pub async fn save(&mut self, state: &SessionState) -> StorageResult<()> {
        let name = self.session_name().to_string();
        self.storage.save(&name, state).await?;
        self.storage.save(LAST_SESSION_KEY, state).await?;

        self.last_save = Some(Instant::now());
        self.dirty = false;
        Ok(())
    }

    /// Load a session by name and make it the current one.
    pub async fn load(&mut self, name: &str) -> StorageResult<SessionState> {
        let state = self.storage.load(name).await?;
        self.session_name = Some(name.to_string());
        self.dirty = false;
        self.last_save = Some(Instant::now());
        Ok(state)
    }

    /// The most recently saved session, if any.
    pub async fn load_last(&mut self) -> Option<SessionState> {
        match self.storage.load(LAST_SESSION_KEY).await {
            Ok(state) => {
                self.dirty = false;
                self.last_save = Some(Instant::now());
                Some(state)
            }
            Err(e) => {
                log::debug!("No last session: {}", e);
                None
            }
        }
    }

    pub async fn delete(&self, name: &str) -> StorageResult<()> {
        self.storage.delete(name).await
    }

    /// Saved session names, without the last-session mirror.
    pub async fn list_sessions(&self) -> StorageResult<Vec<String>> {
        let mut names = self.storage.list().await?;
        names.retain(|name| name != LAST_SESSION_KEY);
        Ok(names)
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }
}

/// File storage in the platform data directory.
pub fn create_default_storage() -> StorageResult<Arc<FileStorage>> {
    Ok(Arc::new(FileStorage::default_location()?))
}

/// Auto-save manager over [`create_default_storage`].
pub fn create_autosave_manager() -> StorageResult<AutoSaveManager<FileStorage>> {
    Ok(AutoSaveManager::new(create_default_storage()?))
}
