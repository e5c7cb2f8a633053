//! View state: pan and zoom of the drawing surface.

use kurbo::{Affine, Point, Vec2};
use serde::{Deserialize, Serialize};

/// Zoom is kept strictly above this value.
pub const MIN_ZOOM: f64 = 0.05;
/// Largest allowed zoom.
pub const MAX_ZOOM: f64 = 15.0;

/// Pan and zoom of the view.
///
/// `x`/`y` is the world point shown at the top-left corner of the surface:
/// `screen = (world - (x, y)) * zoom`, before the device pixel ratio is applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasPosition {
    pub zoom: f64,
    pub x: f64,
    pub y: f64,
}

impl Default for CanvasPosition {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            x: 0.0,
            y: 0.0,
        }
    }
}

/// Clamp a zoom factor into `(MIN_ZOOM, MAX_ZOOM]`.
pub fn clamp_zoom(zoom: f64) -> f64 {
    if !zoom.is_finite() {
        return if zoom == f64::INFINITY { MAX_ZOOM } else { 1.0 };
    }
    zoom.clamp(MIN_ZOOM.next_up(), MAX_ZOOM)
}

impl CanvasPosition {
    pub fn new(zoom: f64, x: f64, y: f64) -> Self {
        Self {
            zoom: clamp_zoom(zoom),
            x,
            y,
        }
    }

    pub fn pan_offset(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    /// World to logical screen coordinates.
    pub fn transform(&self) -> Affine {
        Affine::scale(self.zoom) * Affine::translate(-self.pan_offset())
    }

    /// World to device pixels for a surface with the given pixel ratio.
    pub fn device_transform(&self, pixel_ratio: f64) -> Affine {
        Affine::scale(pixel_ratio) * self.transform()
    }

    /// Logical screen to world coordinates.
    pub fn inverse_transform(&self) -> Affine {
        Affine::translate(self.pan_offset()) * Affine::scale(1.0 / self.zoom)
    }

    pub fn screen_to_world(&self, screen_point: Point) -> Point {
        self.inverse_transform() * screen_point
    }

    pub fn world_to_screen(&self, world_point: Point) -> Point {
        self.transform() * world_point
    }

    /// Pan by a delta in screen coordinates.
    pub fn pan(&mut self, screen_delta: Vec2) {
        let world_delta = screen_delta / self.zoom;
        self.x -= world_delta.x;
        self.y -= world_delta.y;
    }

    /// Zoom by `factor`, keeping the world point under `screen_point` fixed.
    pub fn zoom_at(&mut self, screen_point: Point, factor: f64) {
        let new_zoom = clamp_zoom(self.zoom * factor);
        if (new_zoom - self.zoom).abs() < f64::EPSILON {
            return;
        }

        let world_point = self.screen_to_world(screen_point);
        self.zoom = new_zoom;
        self.anchor(world_point, screen_point);
    }

    /// Move the pan offset so that `world_point` is shown at `screen_point`.
    pub fn anchor(&mut self, world_point: Point, screen_point: Point) {
        self.x = world_point.x - screen_point.x / self.zoom;
        self.y = world_point.y - screen_point.y / self.zoom;
    }

    /// Reset to the origin at 100%.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
