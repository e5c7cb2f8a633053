//! CPU raster surface.
//!
//! A premultiplied RGBA pixel buffer sized in device pixels, with the view
//! transform (translate by the pan offset, then scale by zoom and pixel ratio)
//! applied to everything painted on it.

use crate::cache::ImageCache;
use crate::error::{RenderError, RenderResult};
use inkboard_core::action::{Action, STAMP_SIZE, Snapshot, Stamp, StrokeKind};
use inkboard_core::geometry::StrokePath;
use inkboard_core::position::CanvasPosition;
use kurbo::{BezPath, PathEl, Point, Rect, Size};
use peniko::Color;
use std::f32::consts::PI;
use tiny_skia::{
    BlendMode, FillRule, FilterQuality, IntRect, Paint, Path, PathBuilder, Pixmap, PixmapPaint, Transform,
};

/// Stamp sprites are rasterized at this multiple of their world size.
const STAMP_SPRITE_SCALE: f64 = 2.0;

/// Colour of an eraser stroke while it is still being drawn.
const ERASER_TRAIL: (u8, u8, u8, u8) = (160, 160, 160, 110);

/// Extra device pixels around a region to cover anti-aliasing.
const REGION_MARGIN: f64 = 2.0;

/// How an action is applied to the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaintMode {
    /// Final compositing: erasers cut through existing pixels.
    #[default]
    Commit,
    /// In-progress drawing on the live layer: erasers show as a trail.
    Preview,
}

/// A pixel buffer with a world-to-device transform.
pub struct RasterSurface {
    pixmap: Pixmap,
    pixel_ratio: f64,
    position: CanvasPosition,
    ink: Color,
    stamp: Option<Pixmap>,
}

impl RasterSurface {
    /// A surface covering `logical` screen pixels at `pixel_ratio` device pixels each.
    pub fn new(logical: Size, pixel_ratio: f64) -> RenderResult<Self> {
        let (width, height) = device_size(logical, pixel_ratio);
        Self::with_pixels(width, height, pixel_ratio, CanvasPosition::default())
    }

    /// An offscreen surface at world scale whose top-left pixel is the world point `origin`.
    pub fn offscreen(width: u32, height: u32, origin: Point) -> RenderResult<Self> {
        Self::with_pixels(width, height, 1.0, CanvasPosition::new(1.0, origin.x, origin.y))
    }

    fn with_pixels(width: u32, height: u32, pixel_ratio: f64, position: CanvasPosition) -> RenderResult<Self> {
        let pixmap = Pixmap::new(width, height).ok_or(RenderError::SurfaceAlloc { width, height })?;
        let ink = Color::BLACK;
        Ok(Self {
            pixmap,
            pixel_ratio,
            position,
            ink,
            stamp: stamp_sprite(to_skia_color(ink)),
        })
    }

    /// Reallocate for a new size or pixel ratio. Previous content is lost.
    pub fn resize(&mut self, logical: Size, pixel_ratio: f64) -> RenderResult<()> {
        let (width, height) = device_size(logical, pixel_ratio);
        self.pixmap = Pixmap::new(width, height).ok_or(RenderError::SurfaceAlloc { width, height })?;
        self.pixel_ratio = pixel_ratio;
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn pixel_ratio(&self) -> f64 {
        self.pixel_ratio
    }

    pub fn position(&self) -> CanvasPosition {
        self.position
    }

    pub fn set_position(&mut self, position: CanvasPosition) {
        self.position = position;
    }

    pub fn ink(&self) -> Color {
        self.ink
    }

    /// Change the colour pens and stamps paint with.
    pub fn set_ink(&mut self, ink: Color) {
        if ink != self.ink {
            self.ink = ink;
            self.stamp = stamp_sprite(to_skia_color(ink));
        }
    }

    /// Clear every pixel to transparent.
    pub fn clear(&mut self) {
        self.pixmap.fill(tiny_skia::Color::TRANSPARENT);
    }

    /// Clear a rectangle of device pixels to transparent.
    pub fn clear_region(&mut self, region: IntRect) {
        let paint = Paint {
            blend_mode: BlendMode::Clear,
            anti_alias: false,
            ..Paint::default()
        };
        self.pixmap.fill_rect(region.to_rect(), &paint, Transform::identity(), None);
    }

    /// World to device pixels.
    pub fn transform(&self) -> Transform {
        let scale = (self.position.zoom * self.pixel_ratio) as f32;
        Transform::from_scale(scale, scale).pre_translate(-self.position.x as f32, -self.position.y as f32)
    }

    /// Device pixels touched by the world rectangle `world`, clipped to the surface.
    pub fn device_region(&self, world: Rect) -> Option<IntRect> {
        let device = self.position.device_transform(self.pixel_ratio).transform_rect_bbox(world);
        let expanded = device.inflate(REGION_MARGIN, REGION_MARGIN).expand();
        let clipped = expanded.intersect(Rect::new(0.0, 0.0, self.width() as f64, self.height() as f64));
        if clipped.width() <= 0.0 || clipped.height() <= 0.0 {
            return None;
        }
        IntRect::from_ltrb(clipped.x0 as i32, clipped.y0 as i32, clipped.x1 as i32, clipped.y1 as i32)
    }

    /// Paint one action. Returns `false` if it could not be painted completely
    /// because a snapshot bitmap is not in `cache`.
    pub fn paint_action(&mut self, action: &Action, cache: &ImageCache, mode: PaintMode) -> bool {
        match action {
            Action::Stroke(stroke) => {
                self.paint_stroke(stroke.kind, &stroke.path, mode);
                true
            }
            Action::Stamp(stamp) => {
                self.paint_stamp(stamp);
                true
            }
            Action::Snapshot(snapshot) => self.paint_snapshot(snapshot, cache),
        }
    }

    /// Paint actions in order. Returns `false` if any snapshot was skipped.
    pub fn paint_actions<'a, I>(&mut self, actions: I, cache: &ImageCache, mode: PaintMode) -> bool
    where
        I: IntoIterator<Item = &'a Action>,
    {
        actions
            .into_iter()
            .fold(true, |complete, action| self.paint_action(action, cache, mode) && complete)
    }

    /// Fill a stroke outline.
    pub fn paint_stroke(&mut self, kind: StrokeKind, path: &StrokePath, mode: PaintMode) {
        let Some(path) = to_skia_path(&path.to_bez_path()) else {
            return;
        };
        let paint = match (kind, mode) {
            (StrokeKind::Pen, _) => solid(to_skia_color(self.ink), BlendMode::SourceOver),
            (StrokeKind::Eraser, PaintMode::Commit) => solid(tiny_skia::Color::BLACK, BlendMode::DestinationOut),
            (StrokeKind::Eraser, PaintMode::Preview) => {
                let (r, g, b, a) = ERASER_TRAIL;
                solid(tiny_skia::Color::from_rgba8(r, g, b, a), BlendMode::SourceOver)
            }
        };
        let transform = self.transform();
        self.pixmap.fill_path(&path, &paint, FillRule::Winding, transform, None);
    }

    fn paint_stamp(&mut self, stamp: &Stamp) {
        let Some(sprite) = &self.stamp else {
            return;
        };
        let rect = stamp.rect();
        let inverse = (1.0 / STAMP_SPRITE_SCALE) as f32;
        let transform = self
            .transform()
            .pre_translate(rect.x0 as f32, rect.y0 as f32)
            .pre_scale(inverse, inverse);
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        self.pixmap.draw_pixmap(0, 0, sprite.as_ref(), &paint, transform, None);
    }

    fn paint_snapshot(&mut self, snapshot: &Snapshot, cache: &ImageCache) -> bool {
        if snapshot.is_empty() {
            return true;
        }
        let Some(bitmap) = cache.get(snapshot.id()) else {
            log::debug!("Snapshot {} not loaded, skipping", snapshot.id());
            return false;
        };

        let sx = (snapshot.width / bitmap.width() as f64) as f32;
        let sy = (snapshot.height / bitmap.height() as f64) as f32;
        let transform = self
            .transform()
            .pre_translate(snapshot.x as f32, snapshot.y as f32)
            .pre_scale(sx, sy);
        let paint = PixmapPaint {
            quality: if is_pixel_aligned(&transform) {
                FilterQuality::Nearest
            } else {
                FilterQuality::Bilinear
            },
            ..PixmapPaint::default()
        };
        self.pixmap.draw_pixmap(0, 0, bitmap.as_ref(), &paint, transform, None);
        true
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn into_pixmap(self) -> Pixmap {
        self.pixmap
    }
}

/// Smallest rectangle containing every pixel with non-zero alpha.
pub fn opaque_bounds(pixmap: &Pixmap) -> Option<IntRect> {
    let width = pixmap.width() as usize;
    let mut min = (usize::MAX, usize::MAX);
    let mut max = (0, 0);
    let mut found = false;

    for (row, pixels) in pixmap.pixels().chunks_exact(width).enumerate() {
        let Some(first) = pixels.iter().position(|px| px.alpha() > 0) else {
            continue;
        };
        let last = pixels.iter().rposition(|px| px.alpha() > 0).unwrap_or(first);
        found = true;
        min = (min.0.min(first), min.1.min(row));
        max = (max.0.max(last), max.1.max(row));
    }

    if !found {
        return None;
    }
    IntRect::from_ltrb(min.0 as i32, min.1 as i32, max.0 as i32 + 1, max.1 as i32 + 1)
}

/// Convert a kurbo path to a tiny-skia one. `None` for empty paths.
pub fn to_skia_path(path: &BezPath) -> Option<Path> {
    let mut builder = PathBuilder::new();
    for el in path.elements() {
        match *el {
            PathEl::MoveTo(p) => builder.move_to(p.x as f32, p.y as f32),
            PathEl::LineTo(p) => builder.line_to(p.x as f32, p.y as f32),
            PathEl::QuadTo(c, p) => builder.quad_to(c.x as f32, c.y as f32, p.x as f32, p.y as f32),
            PathEl::CurveTo(c1, c2, p) => {
                builder.cubic_to(c1.x as f32, c1.y as f32, c2.x as f32, c2.y as f32, p.x as f32, p.y as f32)
            }
            PathEl::ClosePath => builder.close(),
        }
    }
    builder.finish()
}

pub fn to_skia_color(color: Color) -> tiny_skia::Color {
    let rgba = color.to_rgba8();
    tiny_skia::Color::from_rgba8(rgba.r, rgba.g, rgba.b, rgba.a)
}

fn solid(color: tiny_skia::Color, blend_mode: BlendMode) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(color);
    paint.blend_mode = blend_mode;
    paint.anti_alias = true;
    paint
}

fn device_size(logical: Size, pixel_ratio: f64) -> (u32, u32) {
    let width = (logical.width * pixel_ratio).ceil().max(1.0);
    let height = (logical.height * pixel_ratio).ceil().max(1.0);
    (width as u32, height as u32)
}

/// Unit scale and whole-pixel translation: a blit copies pixels exactly.
fn is_pixel_aligned(transform: &Transform) -> bool {
    transform.sx == 1.0
        && transform.sy == 1.0
        && transform.kx == 0.0
        && transform.ky == 0.0
        && transform.tx.fract() == 0.0
        && transform.ty.fract() == 0.0
}

/// Five-pointed star filled with `ink`.
fn stamp_sprite(ink: tiny_skia::Color) -> Option<Pixmap> {
    let side = (STAMP_SIZE * STAMP_SPRITE_SCALE).round() as u32;
    let mut sprite = Pixmap::new(side, side)?;

    let center = side as f32 / 2.0;
    let outer = center * 0.95;
    let inner = outer * 0.42;
    let mut builder = PathBuilder::new();
    for i in 0..10 {
        let radius = if i % 2 == 0 { outer } else { inner };
        let angle = -PI / 2.0 + i as f32 * PI / 5.0;
        let (x, y) = (center + radius * angle.cos(), center + radius * angle.sin());
        if i == 0 {
            builder.move_to(x, y);
        } else {
            builder.line_to(x, y);
        }
    }
    builder.close();
    let star = builder.finish()?;

    sprite.fill_path(&star, &solid(ink, BlendMode::SourceOver), FillRule::Winding, Transform::identity(), None);
    Some(sprite)
}
