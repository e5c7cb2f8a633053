//! Bounded-crop PNG export.

use crate::cache::ImageCache;
use crate::codec::encode_png_rgb;
use crate::error::{RenderError, RenderResult};
use crate::surface::{PaintMode, RasterSurface, opaque_bounds};
use inkboard_core::action::{ActionRef, aggregate_bounds};
use inkboard_core::config::ExportSettings;
use kurbo::Point;
use peniko::Color;
use tiny_skia::{FilterQuality, Pixmap, PixmapPaint, Transform};

/// An encoded export.
#[derive(Debug, Clone)]
pub struct ExportedImage {
    /// Opaque RGB PNG.
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Factor the content was scaled by to fit the maximum dimension.
    pub scale: f64,
}

/// Render `history` onto white, cropped to its ink plus padding.
pub async fn export(
    history: &[ActionRef],
    cache: &mut ImageCache,
    settings: &ExportSettings,
    ink: Color,
) -> RenderResult<ExportedImage> {
    let missing = cache.preload(history).await;
    if missing > 0 {
        log::warn!("Exporting with {} snapshot(s) that failed to load", missing);
    }

    let padding = settings.padding.max(0.0).round();
    let Some(bounds) = aggregate_bounds(history.iter().map(AsRef::as_ref)) else {
        return blank(padding);
    };

    // Rasterize at world scale with room for the padding on every side.
    let origin = Point::new((bounds.x0 - padding).floor(), (bounds.y0 - padding).floor());
    let width = ((bounds.x1 + padding).ceil() - origin.x) as u32;
    let height = ((bounds.y1 + padding).ceil() - origin.y) as u32;
    let mut surface = RasterSurface::offscreen(width, height, origin)?;
    surface.set_ink(ink);
    surface.paint_actions(history.iter().map(AsRef::as_ref), cache, PaintMode::Commit);
    let content = surface.into_pixmap();

    let Some(tight) = opaque_bounds(&content) else {
        return blank(padding);
    };
    let cropped = content.clone_rect(tight).ok_or(RenderError::SurfaceAlloc {
        width: tight.width(),
        height: tight.height(),
    })?;

    let longer = tight.width().max(tight.height()) as f64;
    let scale = if longer > settings.max_dimension {
        settings.max_dimension / longer
    } else {
        1.0
    };
    let scaled_width = ((tight.width() as f64 * scale).round() as u32).max(1);
    let scaled_height = ((tight.height() as f64 * scale).round() as u32).max(1);

    let pad = padding as u32;
    let out_width = scaled_width + 2 * pad;
    let out_height = scaled_height + 2 * pad;
    let mut output = white(out_width, out_height)?;

    let paint = PixmapPaint {
        quality: if scale < 1.0 {
            FilterQuality::Bicubic
        } else {
            FilterQuality::Nearest
        },
        ..PixmapPaint::default()
    };
    let transform = Transform::from_translate(padding as f32, padding as f32).pre_scale(scale as f32, scale as f32);
    output.draw_pixmap(0, 0, cropped.as_ref(), &paint, transform, None);

    let png = encode_png_rgb(&output)?;
    log::info!(
        "Exported {}x{} image (content {}x{}, scale {:.3})",
        out_width,
        out_height,
        tight.width(),
        tight.height(),
        scale
    );
    Ok(ExportedImage {
        png,
        width: out_width,
        height: out_height,
        scale,
    })
}

/// A blank canvas of twice the padding on each side.
fn blank(padding: f64) -> RenderResult<ExportedImage> {
    let side = ((2.0 * padding) as u32).max(1);
    let output = white(side, side)?;
    log::info!("Exported blank {}x{} image", side, side);
    Ok(ExportedImage {
        png: encode_png_rgb(&output)?,
        width: side,
        height: side,
        scale: 1.0,
    })
}

fn white(width: u32, height: u32) -> RenderResult<Pixmap> {
    let mut pixmap = Pixmap::new(width, height).ok_or(RenderError::SurfaceAlloc { width, height })?;
    pixmap.fill(tiny_skia::Color::WHITE);
    Ok(pixmap)
}
