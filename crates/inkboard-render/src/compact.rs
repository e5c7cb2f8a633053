//! Rasterization of a history prefix into a snapshot.

use crate::cache::ImageCache;
use crate::codec::encode_png_rgba;
use crate::error::{RenderError, RenderResult};
use crate::surface::{PaintMode, RasterSurface, opaque_bounds};
use inkboard_core::action::{Action, Snapshot};
use inkboard_core::history::CompactionPlan;
use kurbo::{Point, Rect};
use peniko::Color;
use tiny_skia::Pixmap;

/// A rasterized compaction prefix, ready to be applied to history.
#[derive(Debug)]
pub struct Compacted {
    pub snapshot: Snapshot,
    /// The exact pixels behind `snapshot`, `None` when nothing visible remained.
    pub bitmap: Option<Pixmap>,
}

impl Compacted {
    /// Put the bitmap into `cache` under the snapshot id.
    pub fn cache_bitmap(self, cache: &mut ImageCache) -> Snapshot {
        if let Some(bitmap) = self.bitmap {
            cache.insert(self.snapshot.id(), bitmap);
        }
        self.snapshot
    }
}

/// Rasterize the captured prefix at world scale into one snapshot.
///
/// Snapshots inside the prefix are painted from `cache`, so resolve them first.
/// The result is cropped to the pixels the prefix left visible and placed on
/// whole world units, so painting it at unit scale reproduces the prefix exactly.
pub async fn rasterize(plan: &CompactionPlan, cache: &ImageCache, ink: Color) -> RenderResult<Compacted> {
    flatten(plan, cache, ink)
}

/// Blocking form of [`rasterize`].
///
/// Fails with [`RenderError::SnapshotsMissing`] when a snapshot in the prefix
/// has no bitmap in `cache`.
pub fn flatten(plan: &CompactionPlan, cache: &ImageCache, ink: Color) -> RenderResult<Compacted> {
    let missing = plan
        .actions()
        .iter()
        .filter(|action| match action.as_ref() {
            Action::Snapshot(snapshot) => !snapshot.is_empty() && !cache.contains(snapshot.id()),
            _ => false,
        })
        .count();
    if missing > 0 {
        return Err(RenderError::SnapshotsMissing(missing));
    }

    let Some(bounds) = plan.bounds() else {
        return Ok(Compacted {
            snapshot: Snapshot::empty(),
            bitmap: None,
        });
    };

    let origin = Point::new(bounds.x0.floor() - 1.0, bounds.y0.floor() - 1.0);
    let width = (bounds.x1.ceil() + 1.0 - origin.x) as u32;
    let height = (bounds.y1.ceil() + 1.0 - origin.y) as u32;

    let mut surface = RasterSurface::offscreen(width, height, origin)?;
    surface.set_ink(ink);
    surface.paint_actions(plan.actions().iter().map(AsRef::as_ref), cache, PaintMode::Commit);
    let pixmap = surface.into_pixmap();

    let Some(visible) = opaque_bounds(&pixmap) else {
        log::debug!("Compacted prefix of {} actions left nothing visible", plan.split());
        return Ok(Compacted {
            snapshot: Snapshot::empty(),
            bitmap: None,
        });
    };
    let Some(bitmap) = pixmap.clone_rect(visible) else {
        return Ok(Compacted {
            snapshot: Snapshot::empty(),
            bitmap: None,
        });
    };

    let rect = Rect::new(
        origin.x + visible.x() as f64,
        origin.y + visible.y() as f64,
        origin.x + visible.right() as f64,
        origin.y + visible.bottom() as f64,
    );
    let png = encode_png_rgba(&bitmap)?;
    log::debug!(
        "Compacted {} actions into a {}x{} snapshot ({} bytes)",
        plan.split(),
        bitmap.width(),
        bitmap.height(),
        png.len()
    );

    Ok(Compacted {
        snapshot: Snapshot::new(rect, &png),
        bitmap: Some(bitmap),
    })
}
