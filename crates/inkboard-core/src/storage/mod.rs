//! Storage abstraction for persisting drawing sessions.

mod autosave;
mod file;
mod memory;

pub use autosave::{
    AutoSaveManager, DEFAULT_AUTOSAVE_INTERVAL_SECS, DEFAULT_SESSION_NAME, LAST_SESSION_KEY, create_autosave_manager,
    create_default_storage,
};
pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::action::Action;
use crate::history::History;
use crate::position::CanvasPosition;
use crate::tools::{Brush, BrushSettings};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future returned by collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything needed to restore a drawing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub brush: Brush,
    pub pen_size: f64,
    pub eraser_size: f64,
    #[serde(default)]
    pub position: CanvasPosition,
    #[serde(default)]
    pub history: Vec<Action>,
    /// Undone actions, most recently undone first.
    #[serde(default)]
    pub redo: Vec<Action>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(BrushSettings::default(), CanvasPosition::default(), &History::new())
    }
}

impl SessionState {
    pub fn new(brush: BrushSettings, position: CanvasPosition, history: &History) -> Self {
        let (history, redo) = history.to_parts();
        Self {
            brush: brush.brush,
            pen_size: brush.pen_size,
            eraser_size: brush.eraser_size,
            position,
            history,
            redo,
        }
    }

    pub fn brush_settings(&self) -> BrushSettings {
        BrushSettings {
            brush: self.brush,
            pen_size: self.pen_size,
            eraser_size: self.eraser_size,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Trait for session storage backends.
pub trait Storage: Send + Sync {
    /// Save a session under `name`.
    fn save(&self, name: &str, state: &SessionState) -> BoxFuture<'_, StorageResult<()>>;

    /// Load the session saved under `name`.
    fn load(&self, name: &str) -> BoxFuture<'_, StorageResult<SessionState>>;

    /// Delete a session.
    fn delete(&self, name: &str) -> BoxFuture<'_, StorageResult<()>>;

    /// List all saved session names.
    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>>;

    /// Check if a session exists.
    fn exists(&self, name: &str) -> BoxFuture<'_, StorageResult<bool>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Point;

    #[test]
    fn test_state_json_round_trip() {
        let mut history = History::new();
        history.commit(Action::stamp(Point::new(10.0, 20.0)));
        history.commit(Action::stamp(Point::new(30.0, 40.0)));
        history.undo();

        let brush = BrushSettings {
            brush: Brush::Eraser,
            ..BrushSettings::default()
        };
        let state = SessionState::new(brush, CanvasPosition::new(2.0, 5.0, 6.0), &history);
        let back = SessionState::from_json(&state.to_json().unwrap()).unwrap();

        assert_eq!(back, state);
        assert_eq!(back.history.len(), 1);
        assert_eq!(back.redo.len(), 1);
        assert_eq!(back.brush_settings(), brush);
    }

    #[test]
    fn test_state_tolerates_missing_history() {
        let state = SessionState::from_json(r#"{ "brush": "stamp", "pen_size": 3.0, "eraser_size": 9.0 }"#).unwrap();
        assert_eq!(state.brush, Brush::Stamp);
        assert!(state.history.is_empty());
        assert_eq!(state.position, CanvasPosition::default());
    }
}
