//! Decoded snapshot bitmaps, keyed by action id.

use crate::codec::decode_png;
use inkboard_core::action::{Action, ActionId, ActionRef, Snapshot};
use std::collections::HashMap;
use std::sync::Arc;
use tiny_skia::Pixmap;

/// Bitmaps of snapshot actions, decoded once and shared by every surface.
///
/// Entries are added lazily and live as long as the cache.
#[derive(Debug, Default, Clone)]
pub struct ImageCache {
    bitmaps: HashMap<ActionId, Arc<Pixmap>>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ActionId) -> Option<&Pixmap> {
        self.bitmaps.get(&id).map(|bitmap| &**bitmap)
    }

    pub fn contains(&self, id: ActionId) -> bool {
        self.bitmaps.contains_key(&id)
    }

    pub fn insert(&mut self, id: ActionId, bitmap: impl Into<Arc<Pixmap>>) {
        self.bitmaps.insert(id, bitmap.into());
    }

    pub fn remove(&mut self, id: ActionId) -> Option<Arc<Pixmap>> {
        self.bitmaps.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.bitmaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bitmaps.is_empty()
    }

    /// Make sure the bitmap of `snapshot` is loaded, decoding it if needed.
    ///
    /// Returns `false` when the snapshot has image data that fails to decode.
    /// Failures are not cached, so the next call tries again.
    pub fn resolve(&mut self, snapshot: &Snapshot) -> bool {
        if snapshot.is_empty() || self.contains(snapshot.id()) {
            return true;
        }

        let decoded = snapshot
            .data()
            .ok_or_else(|| "invalid base64 data".to_string())
            .and_then(|bytes| decode_png(&bytes).map_err(|e| e.to_string()));
        match decoded {
            Ok(bitmap) => {
                self.insert(snapshot.id(), bitmap);
                true
            }
            Err(e) => {
                log::warn!("Failed to decode snapshot {}: {}", snapshot.id(), e);
                false
            }
        }
    }

    /// Resolve the bitmap of every snapshot in `actions`. Returns how many could not be loaded.
    pub async fn preload(&mut self, actions: &[ActionRef]) -> usize {
        self.resolve_all(actions)
    }

    /// Blocking form of [`preload`](Self::preload).
    pub fn resolve_all(&mut self, actions: &[ActionRef]) -> usize {
        actions
            .iter()
            .filter_map(|action| match action.as_ref() {
                Action::Snapshot(snapshot) => Some(snapshot),
                _ => None,
            })
            .filter(|snapshot| !self.resolve(snapshot))
            .count()
    }
}
