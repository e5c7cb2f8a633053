//! In-memory storage implementation.

use super::{BoxFuture, SessionState, Storage, StorageError, StorageResult};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory storage for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStorage {
    sessions: RwLock<HashMap<String, SessionState>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Other(format!("Lock error: {}", e))
}

impl Storage for MemoryStorage {
    fn save(&self, name: &str, state: &SessionState) -> BoxFuture<'_, StorageResult<()>> {
        let name = name.to_string();
        let state = state.clone();
        Box::pin(async move {
            let mut sessions = self.sessions.write().map_err(lock_error)?;
            sessions.insert(name, state);
            Ok(())
        })
    }

    fn load(&self, name: &str) -> BoxFuture<'_, StorageResult<SessionState>> {
        let name = name.to_string();
        Box::pin(async move {
            let sessions = self.sessions.read().map_err(lock_error)?;
            sessions.get(&name).cloned().ok_or(StorageError::NotFound(name))
        })
    }

    fn delete(&self, name: &str) -> BoxFuture<'_, StorageResult<()>> {
        let name = name.to_string();
        Box::pin(async move {
            let mut sessions = self.sessions.write().map_err(lock_error)?;
            sessions.remove(&name);
            Ok(())
        })
    }

    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
        Box::pin(async move {
            let sessions = self.sessions.read().map_err(lock_error)?;
            Ok(sessions.keys().cloned().collect())
        })
    }

    fn exists(&self, name: &str) -> BoxFuture<'_, StorageResult<bool>> {
        let name = name.to_string();
        Box::pin(async move {
            let sessions = self.sessions.read().map_err(lock_error)?;
            Ok(sessions.contains_key(&name))
        })
    }
}
