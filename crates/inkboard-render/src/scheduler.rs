//! Two-layer render scheduling.
//!
//! The static layer holds committed history and is only repainted from
//! scratch when it has to be: a view change, a resize, or history that no
//! longer extends what was painted last time. Appended actions are painted
//! on top of the existing pixels. The live layer holds strokes still being
//! drawn and is cleared and redrawn on every sample, limited to the region
//! those strokes touch.

use crate::cache::ImageCache;
use crate::error::{RenderError, RenderResult};
use crate::surface::{PaintMode, RasterSurface};
use inkboard_core::action::{ActionId, ActionRef, StrokeKind};
use inkboard_core::config::EngineConfig;
use inkboard_core::geometry::StrokePath;
use inkboard_core::position::CanvasPosition;
use kurbo::Size;
use peniko::Color;
use tiny_skia::{FilterQuality, IntRect, Pixmap, PixmapPaint, Transform};

/// How the static layer has to be brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepaintKind {
    /// Already shows the current history.
    None,
    /// Paint the actions from index `from` on top of the current pixels.
    Incremental { from: usize },
    /// Clear and repaint everything.
    Full,
}

/// Owns the static and live layers and decides how much to repaint.
pub struct RenderScheduler {
    static_layer: RasterSurface,
    live_layer: RasterSurface,
    viewport: Size,
    pixel_ratio: f64,
    degraded_ratio: f64,
    gesture_active: bool,
    /// Ids painted on the static layer, in order.
    rendered: Vec<ActionId>,
    /// Forces the next static pass to repaint everything.
    invalidated: bool,
    /// Device region of the live layer painted last frame.
    live_region: Option<IntRect>,
}

impl RenderScheduler {
    pub fn new(viewport: Size, pixel_ratio: f64, config: &EngineConfig) -> RenderResult<Self> {
        let ink = config.ink_color();
        let mut static_layer = RasterSurface::new(viewport, pixel_ratio)?;
        let mut live_layer = RasterSurface::new(viewport, pixel_ratio)?;
        static_layer.set_ink(ink);
        live_layer.set_ink(ink);

        Ok(Self {
            static_layer,
            live_layer,
            viewport,
            pixel_ratio,
            degraded_ratio: config.degraded_pixel_ratio,
            gesture_active: false,
            rendered: Vec::new(),
            invalidated: true,
            live_region: None,
        })
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    pub fn pixel_ratio(&self) -> f64 {
        self.pixel_ratio
    }

    pub fn position(&self) -> CanvasPosition {
        self.static_layer.position()
    }

    /// Pixel ratio the static layer currently renders at.
    pub fn static_pixel_ratio(&self) -> f64 {
        if self.gesture_active {
            self.pixel_ratio * self.degraded_ratio
        } else {
            self.pixel_ratio
        }
    }

    pub fn is_gesture_active(&self) -> bool {
        self.gesture_active
    }

    /// Ids of the actions currently painted on the static layer.
    pub fn rendered(&self) -> &[ActionId] {
        &self.rendered
    }

    /// Force the next static pass to repaint everything.
    pub fn invalidate(&mut self) {
        self.invalidated = true;
    }

    /// Change pan/zoom. Any change invalidates the static layer.
    pub fn set_view(&mut self, position: CanvasPosition) {
        if position != self.static_layer.position() {
            self.static_layer.set_position(position);
            self.live_layer.set_position(position);
            self.invalidated = true;
        }
    }

    pub fn set_ink(&mut self, ink: Color) {
        if ink != self.static_layer.ink() {
            self.static_layer.set_ink(ink);
            self.live_layer.set_ink(ink);
            self.invalidated = true;
        }
    }

    /// Reallocate both layers for a new viewport or pixel ratio.
    pub fn resize(&mut self, viewport: Size, pixel_ratio: f64) -> RenderResult<()> {
        if viewport == self.viewport && pixel_ratio == self.pixel_ratio {
            return Ok(());
        }
        self.viewport = viewport;
        self.pixel_ratio = pixel_ratio;
        self.live_layer.resize(viewport, pixel_ratio)?;
        self.static_layer.resize(viewport, self.static_pixel_ratio())?;
        self.live_region = None;
        self.invalidated = true;
        Ok(())
    }

    /// Enter or leave degraded quality while a multi-pointer gesture is active.
    pub fn set_gesture_active(&mut self, active: bool) -> RenderResult<()> {
        if active == self.gesture_active {
            return Ok(());
        }
        self.gesture_active = active;
        self.static_layer.resize(self.viewport, self.static_pixel_ratio())?;
        self.invalidated = true;
        log::debug!(
            "Static layer at pixel ratio {} (gesture {})",
            self.static_pixel_ratio(),
            if active { "started" } else { "ended" }
        );
        Ok(())
    }

    /// Decide how the static layer has to change to show `history`.
    pub fn plan_static(&self, history: &[ActionRef]) -> RepaintKind {
        if self.invalidated || self.rendered.len() > history.len() {
            return RepaintKind::Full;
        }
        let is_prefix = self
            .rendered
            .iter()
            .zip(history)
            .all(|(rendered, action)| *rendered == action.id());
        if !is_prefix {
            RepaintKind::Full
        } else if self.rendered.len() == history.len() {
            RepaintKind::None
        } else {
            RepaintKind::Incremental {
                from: self.rendered.len(),
            }
        }
    }

    /// Bring the static layer up to date with `history`.
    ///
    /// A snapshot whose bitmap is missing from `cache` is skipped, and the next
    /// pass repaints everything so it is retried.
    pub fn render_static(&mut self, history: &[ActionRef], cache: &ImageCache) -> RepaintKind {
        let kind = self.plan_static(history);
        let from = match kind {
            RepaintKind::None => return kind,
            RepaintKind::Incremental { from } => from,
            RepaintKind::Full => {
                self.static_layer.clear();
                self.rendered.clear();
                0
            }
        };

        let appended = &history[from..];
        let complete = self
            .static_layer
            .paint_actions(appended.iter().map(AsRef::as_ref), cache, PaintMode::Commit);
        self.rendered.extend(appended.iter().map(|action| action.id()));
        self.invalidated = !complete;

        log::debug!("Static layer {:?}: painted {} of {} actions", kind, appended.len(), history.len());
        kind
    }

    /// Redraw the strokes in progress on the live layer.
    pub fn render_live(&mut self, strokes: &[(StrokeKind, StrokePath)]) {
        let bounds = strokes
            .iter()
            .filter_map(|(_, path)| path.bounds())
            .reduce(|acc, rect| acc.union(rect));
        let region = bounds.and_then(|rect| self.live_layer.device_region(rect));

        if let Some(dirty) = union(self.live_region, region) {
            self.live_layer.clear_region(dirty);
        }
        for (kind, path) in strokes {
            self.live_layer.paint_stroke(*kind, path, PaintMode::Preview);
        }
        self.live_region = region;
    }

    pub fn static_layer(&self) -> &RasterSurface {
        &self.static_layer
    }

    pub fn live_layer(&self) -> &RasterSurface {
        &self.live_layer
    }

    /// The frame shown on screen: the static layer scaled to full resolution,
    /// with the live layer on top.
    pub fn compose(&self) -> RenderResult<Pixmap> {
        let (width, height) = (self.live_layer.width(), self.live_layer.height());
        let mut frame = Pixmap::new(width, height).ok_or(RenderError::SurfaceAlloc { width, height })?;

        let scale = (self.pixel_ratio / self.static_layer.pixel_ratio()) as f32;
        let static_paint = PixmapPaint {
            quality: if self.gesture_active {
                FilterQuality::Bilinear
            } else {
                FilterQuality::Nearest
            },
            ..PixmapPaint::default()
        };
        frame.draw_pixmap(
            0,
            0,
            self.static_layer.pixmap().as_ref(),
            &static_paint,
            Transform::from_scale(scale, scale),
            None,
        );
        frame.draw_pixmap(
            0,
            0,
            self.live_layer.pixmap().as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
        Ok(frame)
    }
}

fn union(a: Option<IntRect>, b: Option<IntRect>) -> Option<IntRect> {
    match (a, b) {
        (Some(a), Some(b)) => IntRect::from_ltrb(
            a.left().min(b.left()),
            a.top().min(b.top()),
            a.right().max(b.right()),
            a.bottom().max(b.bottom()),
        ),
        (a, None) => a,
        (None, b) => b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkboard_core::action::{Action, Stroke};
    use inkboard_core::geometry::{InputPoint, points_to_path};
    use inkboard_core::history::History;
    use kurbo::{Point, Rect};
    use std::sync::Arc;

    fn pen(from: (f64, f64), to: (f64, f64)) -> Action {
        let points = [InputPoint::new(from.0, from.1), InputPoint::new(to.0, to.1)];
        Action::Stroke(Stroke::new(StrokeKind::Pen, points_to_path(&points, 6.0)))
    }

    fn eraser(from: (f64, f64), to: (f64, f64)) -> Action {
        let points = [InputPoint::new(from.0, from.1), InputPoint::new(to.0, to.1)];
        Action::Stroke(Stroke::new(StrokeKind::Eraser, points_to_path(&points, 20.0)))
    }

    fn scheduler() -> RenderScheduler {
        RenderScheduler::new(Size::new(120.0, 80.0), 1.0, &EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_first_pass_is_full() {
        let scheduler = scheduler();
        assert_eq!(scheduler.plan_static(&[]), RepaintKind::Full);
    }

    #[test]
    fn test_prefix_scan() {
        let cache = ImageCache::new();
        let mut scheduler = scheduler();
        let mut history = History::new();

        history.commit(pen((10.0, 10.0), (50.0, 10.0)));
        assert_eq!(scheduler.render_static(history.actions(), &cache), RepaintKind::Full);
        assert_eq!(scheduler.render_static(history.actions(), &cache), RepaintKind::None);

        history.commit(pen((10.0, 30.0), (50.0, 30.0)));
        history.commit(Action::stamp(Point::new(80.0, 40.0)));
        assert_eq!(
            scheduler.render_static(history.actions(), &cache),
            RepaintKind::Incremental { from: 1 }
        );
        assert_eq!(scheduler.rendered(), history.ids().as_slice());

        history.undo();
        assert_eq!(scheduler.plan_static(history.actions()), RepaintKind::Full);
        scheduler.render_static(history.actions(), &cache);

        // Same length, different last action.
        history.commit(pen((60.0, 60.0), (100.0, 60.0)));
        scheduler.render_static(history.actions(), &cache);
        history.undo();
        history.commit(pen((60.0, 70.0), (100.0, 70.0)));
        assert_eq!(scheduler.plan_static(history.actions()), RepaintKind::Full);
    }

    #[test]
    fn test_incremental_matches_full() {
        let cache = ImageCache::new();
        let actions: Vec<ActionRef> = vec![
            Arc::new(pen((10.0, 10.0), (110.0, 70.0))),
            Arc::new(Action::stamp(Point::new(40.0, 50.0))),
            Arc::new(eraser((60.0, 0.0), (60.0, 80.0))),
            Arc::new(pen((10.0, 70.0), (110.0, 10.0))),
        ];

        let mut incremental = scheduler();
        for end in 1..=actions.len() {
            incremental.render_static(&actions[..end], &cache);
        }

        let mut full = scheduler();
        assert_eq!(full.render_static(&actions, &cache), RepaintKind::Full);

        assert_eq!(incremental.static_layer().pixmap().data(), full.static_layer().pixmap().data());
    }

    #[test]
    fn test_view_change_forces_full() {
        let cache = ImageCache::new();
        let mut scheduler = scheduler();
        let actions: Vec<ActionRef> = vec![Arc::new(pen((10.0, 10.0), (50.0, 10.0)))];
        scheduler.render_static(&actions, &cache);

        scheduler.set_view(CanvasPosition::new(1.0, 0.0, 0.0));
        assert_eq!(scheduler.plan_static(&actions), RepaintKind::None);

        scheduler.set_view(CanvasPosition::new(2.0, 0.0, 0.0));
        assert_eq!(scheduler.plan_static(&actions), RepaintKind::Full);
        scheduler.render_static(&actions, &cache);

        scheduler.resize(Size::new(200.0, 100.0), 1.0).unwrap();
        assert_eq!(scheduler.plan_static(&actions), RepaintKind::Full);
    }

    #[test]
    fn test_missing_snapshot_retried() {
        use inkboard_core::action::Snapshot;

        let mut cache = ImageCache::new();
        let mut scheduler = scheduler();
        let mut bitmap = Pixmap::new(4, 4).unwrap();
        bitmap.fill(tiny_skia::Color::BLACK);
        let snapshot = Snapshot::new(Rect::new(0.0, 0.0, 4.0, 4.0), &crate::codec::encode_png_rgba(&bitmap).unwrap());
        let actions: Vec<ActionRef> = vec![Arc::new(snapshot.clone().into())];

        assert_eq!(scheduler.render_static(&actions, &cache), RepaintKind::Full);
        assert_eq!(scheduler.plan_static(&actions), RepaintKind::Full);

        assert!(cache.resolve(&snapshot));
        scheduler.render_static(&actions, &cache);
        assert_eq!(scheduler.plan_static(&actions), RepaintKind::None);
        assert_eq!(scheduler.static_layer().pixmap().pixel(1, 1).map(|px| px.alpha()), Some(255));
    }

    #[test]
    fn test_gesture_degrades_static_layer() {
        let cache = ImageCache::new();
        let mut scheduler = RenderScheduler::new(Size::new(100.0, 100.0), 2.0, &EngineConfig::default()).unwrap();
        let actions: Vec<ActionRef> = vec![Arc::new(pen((10.0, 10.0), (90.0, 90.0)))];
        scheduler.render_static(&actions, &cache);

        scheduler.set_gesture_active(true).unwrap();
        assert!((scheduler.static_pixel_ratio() - 1.5).abs() < f64::EPSILON);
        assert_eq!(scheduler.static_layer().width(), 150);
        assert_eq!(scheduler.plan_static(&actions), RepaintKind::Full);
        scheduler.render_static(&actions, &cache);

        let frame = scheduler.compose().unwrap();
        assert_eq!((frame.width(), frame.height()), (200, 200));

        scheduler.set_gesture_active(false).unwrap();
        assert_eq!(scheduler.static_layer().width(), 200);
        assert_eq!(scheduler.plan_static(&actions), RepaintKind::Full);
    }

    #[test]
    fn test_live_layer_redraws_region() {
        let mut scheduler = scheduler();
        let first = points_to_path(&[InputPoint::new(10.0, 10.0), InputPoint::new(30.0, 10.0)], 6.0);
        scheduler.render_live(&[(StrokeKind::Pen, first)]);
        assert!(scheduler.live_layer().pixmap().pixel(20, 10).unwrap().alpha() > 0);

        let second = points_to_path(&[InputPoint::new(60.0, 60.0), InputPoint::new(90.0, 60.0)], 6.0);
        scheduler.render_live(&[(StrokeKind::Pen, second)]);
        assert_eq!(scheduler.live_layer().pixmap().pixel(20, 10).unwrap().alpha(), 0);
        assert!(scheduler.live_layer().pixmap().pixel(75, 60).unwrap().alpha() > 0);

        scheduler.render_live(&[]);
        assert!(crate::surface::opaque_bounds(scheduler.live_layer().pixmap()).is_none());
    }

    #[test]
    fn test_compose_layers_static_then_live() {
        let cache = ImageCache::new();
        let mut scheduler = scheduler();
        let actions: Vec<ActionRef> = vec![Arc::new(pen((10.0, 40.0), (110.0, 40.0)))];
        scheduler.render_static(&actions, &cache);

        let live = points_to_path(&[InputPoint::new(60.0, 10.0), InputPoint::new(60.0, 70.0)], 20.0);
        scheduler.render_live(&[(StrokeKind::Eraser, live)]);

        let frame = scheduler.compose().unwrap();
        // The in-progress eraser cannot cut through the static layer.
        assert_eq!(frame.pixel(60, 40).unwrap().alpha(), 255);
        assert!(frame.pixel(60, 15).unwrap().alpha() > 0);
    }
}
