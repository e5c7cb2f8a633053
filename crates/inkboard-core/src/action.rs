//! Drawing actions: the immutable units of history.

use crate::geometry::{InputPoint, StrokePath, points_to_path};
use kurbo::{Point, Rect, Size};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier of an action. Also keys cached snapshot bitmaps.
pub type ActionId = Uuid;

/// Shared handle to a committed action.
pub type ActionRef = Arc<Action>;

/// Side length of the stamp bitmap, in world units.
pub const STAMP_SIZE: f64 = 48.0;

/// Whether a stroke deposits ink or removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrokeKind {
    Pen,
    Eraser,
}

/// A pen or eraser stroke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    id: ActionId,
    pub kind: StrokeKind,
    pub path: StrokePath,
}

impl Stroke {
    pub fn new(kind: StrokeKind, path: StrokePath) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            path,
        }
    }

    /// Build a stroke straight from sampled points.
    pub fn from_points(kind: StrokeKind, points: &[InputPoint], size: f64) -> Self {
        Self::new(kind, points_to_path(points, size))
    }

    pub fn id(&self) -> ActionId {
        self.id
    }
}

/// A fixed-size decorative bitmap centred on a point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stamp {
    id: ActionId,
    pub x: f64,
    pub y: f64,
}

impl Stamp {
    pub fn new(center: Point) -> Self {
        Self {
            id: Uuid::new_v4(),
            x: center.x,
            y: center.y,
        }
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn center(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn rect(&self) -> Rect {
        Rect::from_center_size(self.center(), Size::new(STAMP_SIZE, STAMP_SIZE))
    }
}

/// A flattened raster standing in for a run of older actions.
///
/// The image is a PNG, kept base64-encoded so a history serializes to plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    id: ActionId,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    data_base64: String,
}

impl Snapshot {
    /// Wrap encoded image bytes placed at `rect` in world space.
    pub fn new(rect: Rect, png: &[u8]) -> Self {
        use base64::{Engine, engine::general_purpose::STANDARD};

        Self {
            id: Uuid::new_v4(),
            x: rect.x0,
            y: rect.y0,
            width: rect.width(),
            height: rect.height(),
            data_base64: STANDARD.encode(png),
        }
    }

    /// A snapshot of a run that left no visible ink.
    pub fn empty() -> Self {
        Self {
            id: Uuid::new_v4(),
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            data_base64: String::new(),
        }
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0 || self.data_base64.is_empty()
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }

    /// The encoded image bytes, `None` if the stored data is not valid base64.
    pub fn data(&self) -> Option<Vec<u8>> {
        use base64::{Engine, engine::general_purpose::STANDARD};
        STANDARD.decode(&self.data_base64).ok()
    }
}

/// One entry of drawing history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Stroke(Stroke),
    Stamp(Stamp),
    Snapshot(Snapshot),
}

impl Action {
    pub fn pen(path: StrokePath) -> Self {
        Action::Stroke(Stroke::new(StrokeKind::Pen, path))
    }

    pub fn eraser(path: StrokePath) -> Self {
        Action::Stroke(Stroke::new(StrokeKind::Eraser, path))
    }

    pub fn stamp(center: Point) -> Self {
        Action::Stamp(Stamp::new(center))
    }

    pub fn id(&self) -> ActionId {
        match self {
            Action::Stroke(stroke) => stroke.id(),
            Action::Stamp(stamp) => stamp.id(),
            Action::Snapshot(snapshot) => snapshot.id(),
        }
    }

    pub fn is_eraser(&self) -> bool {
        matches!(self, Action::Stroke(Stroke { kind: StrokeKind::Eraser, .. }))
    }

    /// Region this action covers, whatever its effect.
    pub fn extent(&self) -> Option<Rect> {
        match self {
            Action::Stroke(stroke) => stroke.path.bounds(),
            Action::Stamp(stamp) => Some(stamp.rect()),
            Action::Snapshot(snapshot) if snapshot.is_empty() => None,
            Action::Snapshot(snapshot) => Some(snapshot.rect()),
        }
    }

    /// Region this action adds visible ink to. Erasers never contribute.
    pub fn bounds(&self) -> Option<Rect> {
        if self.is_eraser() {
            return None;
        }
        self.extent()
    }
}

impl From<Stroke> for Action {
    fn from(stroke: Stroke) -> Self {
        Action::Stroke(stroke)
    }
}

impl From<Stamp> for Action {
    fn from(stamp: Stamp) -> Self {
        Action::Stamp(stamp)
    }
}

impl From<Snapshot> for Action {
    fn from(snapshot: Snapshot) -> Self {
        Action::Snapshot(snapshot)
    }
}

/// Union of the visible bounds of `actions`.
pub fn aggregate_bounds<'a, I>(actions: I) -> Option<Rect>
where
    I: IntoIterator<Item = &'a Action>,
{
    actions
        .into_iter()
        .filter_map(Action::bounds)
        .reduce(|acc, rect| acc.union(rect))
}
