//! Inkboard Core Library
//!
//! Raster-free core of the Inkboard freehand drawing engine: stroke geometry,
//! the action data model, undo/redo history with compaction planning, pointer
//! input and the persistence and sharing contracts.

pub mod action;
pub mod config;
pub mod geometry;
pub mod history;
pub mod input;
pub mod position;
pub mod share;
pub mod storage;
pub mod tools;

pub use action::{Action, ActionId, ActionRef, Snapshot, Stamp, Stroke, StrokeKind, aggregate_bounds};
pub use config::{CompactionPolicy, ConfigError, EngineConfig, ExportSettings};
pub use geometry::{InputPoint, StrokePath, bounds_of, points_to_path};
pub use history::{CompactionOutcome, CompactionPlan, History, InkGroup};
pub use input::{PointerEvent, PointerId, PointerPhase, PointerTracker, PointerUpdate};
pub use position::CanvasPosition;
pub use share::{BackgroundSource, ShareError, ShareRequest, ShareService};
pub use storage::{SessionState, Storage, StorageError, StorageResult};
pub use tools::{Brush, BrushSettings};
