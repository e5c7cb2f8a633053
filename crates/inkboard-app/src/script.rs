//! Replay scripts: recorded input fed through a [`Session`].

use crate::shortcuts::{ShortcutAction, ShortcutRegistry};
use inkboard_core::{Brush, CanvasPosition, CompactionOutcome, PointerEvent, PointerUpdate};
use inkboard_render::{RenderError, Session};
use kurbo::Size;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Invalid script: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Step {step}: unknown shortcut {chord:?}")]
    UnknownShortcut { step: usize, chord: String },
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// One recorded input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    Pointer(PointerEvent),
    /// Switch brush, optionally resizing it.
    Brush {
        brush: Brush,
        #[serde(default)]
        size: Option<f64>,
    },
    /// A keyboard chord such as "Ctrl+Z".
    Key { chord: String },
    View(CanvasPosition),
    Undo,
    Redo,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1024.0,
            height: 768.0,
        }
    }
}

impl Viewport {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

/// A replay script with the surface it was recorded on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default = "default_pixel_ratio")]
    pub pixel_ratio: f64,
    pub steps: Vec<Step>,
}

fn default_pixel_ratio() -> f64 {
    1.0
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScriptFile {
    Full(Script),
    Steps(Vec<Step>),
}

impl Script {
    /// Parse a script object, or a bare list of steps.
    pub fn from_json(json: &str) -> Result<Self, ScriptError> {
        Ok(match serde_json::from_str(json)? {
            ScriptFile::Full(script) => script,
            ScriptFile::Steps(steps) => Self {
                viewport: Viewport::default(),
                pixel_ratio: default_pixel_ratio(),
                steps,
            },
        })
    }
}

/// What a replay did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub steps: usize,
    /// Strokes and stamps committed by pointer input.
    pub committed: usize,
    pub compactions: usize,
    pub discarded_compactions: usize,
}

/// Feed `steps` through `session`, rendering and compacting after each one.
pub async fn replay(session: &mut Session, steps: &[Step]) -> Result<ReplaySummary, ScriptError> {
    let mut summary = ReplaySummary::default();
    for (index, step) in steps.iter().enumerate() {
        apply(session, index, step, &mut summary)?;
        match session.run_pending_compaction().await? {
            Some(CompactionOutcome::Applied { .. }) => summary.compactions += 1,
            Some(CompactionOutcome::Discarded) => summary.discarded_compactions += 1,
            None => {}
        }
        session.render();
        summary.steps += 1;
    }
    log::debug!("Replayed {:?}", summary);
    Ok(summary)
}

fn apply(session: &mut Session, index: usize, step: &Step, summary: &mut ReplaySummary) -> Result<(), ScriptError> {
    match step {
        Step::Pointer(event) => {
            let before = session.history().len();
            let update = session.handle_pointer(*event)?;
            if matches!(update, PointerUpdate::Finished { .. }) && session.history().len() > before {
                summary.committed += 1;
            }
        }
        Step::Brush { brush, size } => {
            session.set_brush(*brush);
            match (brush, size) {
                (Brush::Pen, Some(size)) => session.set_pen_size(*size),
                (Brush::Eraser, Some(size)) => session.set_eraser_size(*size),
                (Brush::Stamp, Some(_)) => log::warn!("Step {}: stamps have a fixed size", index),
                (_, None) => {}
            }
        }
        Step::Key { chord } => {
            let shortcut = ShortcutRegistry::lookup(chord).ok_or_else(|| ScriptError::UnknownShortcut {
                step: index,
                chord: chord.clone(),
            })?;
            match shortcut.action {
                ShortcutAction::Undo => {
                    session.undo();
                }
                ShortcutAction::Redo => {
                    session.redo();
                }
                ShortcutAction::SelectBrush(brush) => session.set_brush(brush),
                ShortcutAction::Cancel => session.cancel_strokes(),
            }
        }
        Step::View(position) => session.set_position(*position),
        Step::Undo => {
            session.undo();
        }
        Step::Redo => {
            session.redo();
        }
    }
    Ok(())
}
