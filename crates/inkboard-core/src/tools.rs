//! Brushes and the actions they produce.

use crate::action::{Action, Stroke, StrokeKind};
use crate::geometry::{InputPoint, StrokePath, points_to_path};
use serde::{Deserialize, Serialize};

/// Default pen width in world units.
pub const DEFAULT_PEN_SIZE: f64 = 6.0;
/// Default eraser width in world units.
pub const DEFAULT_ERASER_SIZE: f64 = 24.0;

/// Available brushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Brush {
    #[default]
    Pen,
    Eraser,
    Stamp,
}

/// Brush selection and sizes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrushSettings {
    pub brush: Brush,
    pub pen_size: f64,
    pub eraser_size: f64,
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self {
            brush: Brush::default(),
            pen_size: DEFAULT_PEN_SIZE,
            eraser_size: DEFAULT_ERASER_SIZE,
        }
    }
}

impl BrushSettings {
    /// Width of the current brush, `None` for the stamp.
    pub fn size(&self) -> Option<f64> {
        match self.brush {
            Brush::Pen => Some(self.pen_size),
            Brush::Eraser => Some(self.eraser_size),
            Brush::Stamp => None,
        }
    }

    /// Outline of an in-progress stroke, `None` for the stamp.
    pub fn preview_path(&self, points: &[InputPoint]) -> Option<(StrokeKind, StrokePath)> {
        match self.brush {
            Brush::Pen => Some((StrokeKind::Pen, points_to_path(points, self.pen_size))),
            Brush::Eraser => Some((StrokeKind::Eraser, points_to_path(points, self.eraser_size))),
            Brush::Stamp => None,
        }
    }

    /// The action committed when a pointer is released after sampling `points`.
    ///
    /// Stamps land where the pointer was released.
    pub fn finish(&self, points: &[InputPoint]) -> Option<Action> {
        let last = points.last()?;
        let action = match self.brush {
            Brush::Pen => Stroke::from_points(StrokeKind::Pen, points, self.pen_size).into(),
            Brush::Eraser => Stroke::from_points(StrokeKind::Eraser, points, self.eraser_size).into(),
            Brush::Stamp => Action::stamp(last.position()),
        };
        Some(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Point;

    #[test]
    fn test_finish_requires_points() {
        assert!(BrushSettings::default().finish(&[]).is_none());
    }

    #[test]
    fn test_finish_by_brush() {
        let points = [InputPoint::new(0.0, 0.0), InputPoint::new(30.0, 10.0)];
        let mut settings = BrushSettings::default();

        let pen = settings.finish(&points).unwrap();
        assert!(matches!(pen, Action::Stroke(ref s) if s.kind == StrokeKind::Pen));

        settings.brush = Brush::Eraser;
        let eraser = settings.finish(&points).unwrap();
        assert!(eraser.is_eraser());

        settings.brush = Brush::Stamp;
        let stamp = settings.finish(&points).unwrap();
        match stamp {
            Action::Stamp(stamp) => assert_eq!(stamp.center(), Point::new(30.0, 10.0)),
            other => panic!("expected stamp, got {other:?}"),
        }
    }

    #[test]
    fn test_eraser_uses_eraser_size() {
        let points = [InputPoint::new(0.0, 0.0), InputPoint::new(100.0, 0.0)];
        let settings = BrushSettings {
            brush: Brush::Eraser,
            pen_size: 4.0,
            eraser_size: 40.0,
        };
        let (kind, path) = settings.preview_path(&points).unwrap();
        assert_eq!(kind, StrokeKind::Eraser);
        assert!(path.bounds().unwrap().height() > 20.0);
        assert_eq!(settings.size(), Some(40.0));
    }
}
