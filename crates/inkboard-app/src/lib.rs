//! Inkboard Application
//!
//! Command-line host for the drawing engine: replays recorded input through a
//! session, exports drawings and manages saved sessions.

mod cli;
mod script;
mod shortcuts;

pub use cli::{AppError, Arguments, Command, run};
pub use script::{ReplaySummary, Script, ScriptError, Step, Viewport, replay};
pub use shortcuts::{Shortcut, ShortcutAction, ShortcutRegistry};
