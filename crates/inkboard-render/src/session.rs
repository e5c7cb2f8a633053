//! A drawing session: input, history, layers and collaborators wired together.

use crate::cache::ImageCache;
use crate::compact::{self, Compacted};
use crate::error::{RenderResult, SessionError};
use crate::export::{self, ExportedImage};
use crate::scheduler::{RenderScheduler, RepaintKind};
use inkboard_core::action::{Action, Snapshot};
use inkboard_core::config::EngineConfig;
use inkboard_core::history::{CompactionOutcome, CompactionPlan, History};
use inkboard_core::input::{PointerEvent, PointerTracker, PointerUpdate};
use inkboard_core::position::CanvasPosition;
use inkboard_core::share::{BackgroundSource, ShareRequest, ShareService};
use inkboard_core::storage::{SessionState, Storage};
use inkboard_core::tools::{Brush, BrushSettings};
use kurbo::Size;
use tiny_skia::Pixmap;

/// One drawing surface and everything it owns.
pub struct Session {
    config: EngineConfig,
    history: History,
    cache: ImageCache,
    scheduler: RenderScheduler,
    tracker: PointerTracker,
    brush: BrushSettings,
    position: CanvasPosition,
    background: Option<String>,
    /// History outgrew the compaction threshold since the last attempt.
    compaction_pending: bool,
}

impl Session {
    pub fn new(config: EngineConfig, viewport: Size, pixel_ratio: f64) -> RenderResult<Self> {
        let scheduler = RenderScheduler::new(viewport, pixel_ratio, &config)?;
        let brush = BrushSettings {
            brush: Brush::default(),
            pen_size: config.default_pen_size,
            eraser_size: config.default_eraser_size,
        };
        Ok(Self {
            history: History::with_policy(config.compaction),
            cache: ImageCache::new(),
            scheduler,
            tracker: PointerTracker::new(),
            brush,
            position: CanvasPosition::default(),
            background: None,
            compaction_pending: false,
            config,
        })
    }

    /// Restore a session from persisted state.
    pub fn from_state(state: SessionState, config: EngineConfig, viewport: Size, pixel_ratio: f64) -> RenderResult<Self> {
        let mut session = Self::new(config, viewport, pixel_ratio)?;
        session.brush = state.brush_settings();
        session.set_position(state.position);
        session.history = History::from_parts(state.history, state.redo, session.config.compaction);
        session.compaction_pending = session.history.needs_compaction();
        Ok(session)
    }

    /// Persistable state of the session.
    pub fn state(&self) -> SessionState {
        SessionState::new(self.brush, self.position, &self.history)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    pub fn scheduler(&self) -> &RenderScheduler {
        &self.scheduler
    }

    pub fn brush(&self) -> BrushSettings {
        self.brush
    }

    pub fn set_brush(&mut self, brush: Brush) {
        self.brush.brush = brush;
    }

    pub fn set_pen_size(&mut self, size: f64) {
        self.brush.pen_size = size;
    }

    pub fn set_eraser_size(&mut self, size: f64) {
        self.brush.eraser_size = size;
    }

    pub fn position(&self) -> CanvasPosition {
        self.position
    }

    pub fn set_position(&mut self, position: CanvasPosition) {
        self.position = position;
        self.scheduler.set_view(position);
    }

    pub fn resize(&mut self, viewport: Size, pixel_ratio: f64) -> RenderResult<()> {
        self.scheduler.resize(viewport, pixel_ratio)
    }

    /// Feed a pointer event. Finished strokes are committed and pinches move the view.
    pub fn handle_pointer(&mut self, event: PointerEvent) -> RenderResult<PointerUpdate> {
        let update = self.tracker.handle(event, &self.position);
        match &update {
            PointerUpdate::Finished { points, .. } => {
                if let Some(action) = self.brush.finish(points) {
                    self.commit(action);
                }
            }
            PointerUpdate::GestureStarted => self.scheduler.set_gesture_active(true)?,
            PointerUpdate::Gesture(position) => self.set_position(*position),
            PointerUpdate::GestureEnded => self.scheduler.set_gesture_active(false)?,
            PointerUpdate::Ignored | PointerUpdate::Stroke(_) | PointerUpdate::Cancelled(_) => {}
        }
        Ok(update)
    }

    /// Abandon every stroke in progress. Their pointers stay inert until lifted.
    pub fn cancel_strokes(&mut self) {
        self.tracker.cancel_strokes();
    }

    /// Append an action to history.
    pub fn commit(&mut self, action: impl Into<Action>) {
        let action = action.into();
        log::debug!("Commit {} (history {})", action.id(), self.history.len() + 1);
        self.history.commit(action);
        self.check_compaction();
    }

    pub fn undo(&mut self) -> bool {
        self.history.undo()
    }

    pub fn redo(&mut self) -> bool {
        let redone = self.history.redo();
        self.check_compaction();
        redone
    }

    fn check_compaction(&mut self) {
        if self.history.needs_compaction() {
            log::debug!("Compaction due at {} actions", self.history.len());
            self.compaction_pending = true;
        }
    }

    /// Whether the next [`render`](Self::render) will compact history.
    pub fn is_compaction_pending(&self) -> bool {
        self.compaction_pending
    }

    /// Bring both layers up to date. Returns what the static layer did.
    ///
    /// A compaction that became due since the last frame runs first.
    pub fn render(&mut self) -> RepaintKind {
        if self.compaction_pending {
            self.compact_pending();
        }
        for action in self.history.actions() {
            if let Action::Snapshot(snapshot) = action.as_ref() {
                self.cache.resolve(snapshot);
            }
        }
        let kind = self.scheduler.render_static(self.history.actions(), &self.cache);

        let previews: Vec<_> = self
            .tracker
            .active_strokes()
            .filter_map(|points| self.brush.preview_path(points))
            .collect();
        self.scheduler.render_live(&previews);
        kind
    }

    /// The composed on-screen frame.
    pub fn frame(&self) -> RenderResult<Pixmap> {
        self.scheduler.compose()
    }

    /// Flatten the due prefix in place. Failures leave history untouched until the next commit.
    fn compact_pending(&mut self) {
        self.compaction_pending = false;
        let Some(plan) = self.history.plan_compaction() else {
            return;
        };
        let missing = self.cache.resolve_all(plan.actions());
        if !self.prefix_loadable(missing) {
            return;
        }
        match compact::flatten(&plan, &self.cache, self.config.ink_color()) {
            Ok(compacted) => {
                self.apply_compaction(plan, compacted);
            }
            Err(e) => log::warn!("Compaction failed: {}", e),
        }
    }

    fn prefix_loadable(&self, missing: usize) -> bool {
        if missing > 0 {
            log::warn!("Skipping compaction: prefix has {} unloadable snapshot(s)", missing);
        }
        missing == 0
    }

    /// Capture the prefix to compact, if compaction is due.
    ///
    /// Snapshots inside the prefix are decoded first so the rasterizer can paint
    /// them. A prefix holding a snapshot that fails to decode is not compacted.
    pub async fn plan_compaction(&mut self) -> Option<CompactionPlan> {
        let plan = self.history.plan_compaction()?;
        let missing = self.cache.preload(plan.actions()).await;
        self.prefix_loadable(missing).then_some(plan)
    }

    /// Apply a rasterized plan. A stale result is dropped together with its bitmap.
    pub fn apply_compaction(&mut self, plan: CompactionPlan, compacted: Compacted) -> CompactionOutcome {
        let Compacted { snapshot, bitmap } = compacted;
        let id = snapshot.id();
        let outcome = self.history.apply_compaction(plan, snapshot);
        if let (CompactionOutcome::Applied { .. }, Some(bitmap)) = (outcome, bitmap) {
            self.cache.insert(id, bitmap);
        }
        outcome
    }

    /// Plan, rasterize and apply one compaction if history has outgrown its threshold.
    pub async fn run_pending_compaction(&mut self) -> RenderResult<Option<CompactionOutcome>> {
        self.compaction_pending = false;
        let Some(plan) = self.plan_compaction().await else {
            return Ok(None);
        };
        let compacted = compact::rasterize(&plan, &self.cache, self.config.ink_color()).await?;
        Ok(Some(self.apply_compaction(plan, compacted)))
    }

    /// Rasterize a plan against this session's bitmaps, without applying it.
    pub async fn rasterize(&self, plan: &CompactionPlan) -> RenderResult<Compacted> {
        compact::rasterize(plan, &self.cache, self.config.ink_color()).await
    }

    /// Export the current history as a cropped PNG.
    pub async fn export(&mut self) -> RenderResult<ExportedImage> {
        export::export(self.history.actions(), &mut self.cache, &self.config.export, self.config.ink_color()).await
    }

    /// Export and hand the image to a sharing service.
    pub async fn share<S, I, E>(
        &mut self,
        service: &S,
        sender_name: &str,
        recipients: I,
        include_owner_cc: bool,
    ) -> Result<(), SessionError>
    where
        S: ShareService + ?Sized,
        I: IntoIterator<Item = E>,
        E: AsRef<str>,
    {
        let exported = self.export().await?;
        let request = ShareRequest::new(sender_name, recipients, include_owner_cc, exported.png);
        log::info!("Sharing with {} recipient(s)", request.recipient_emails.len());
        service.share(request).await?;
        Ok(())
    }

    /// Ask `source` for a decorative background. The handle is kept but never inspected.
    pub async fn refresh_background<B: BackgroundSource + ?Sized>(&mut self, source: &B) {
        self.background = source.background().await;
    }

    pub fn background(&self) -> Option<&str> {
        self.background.as_deref()
    }

    pub async fn save<S: Storage + ?Sized>(&self, storage: &S, name: &str) -> Result<(), SessionError> {
        storage.save(name, &self.state()).await?;
        Ok(())
    }

    pub async fn load<S: Storage + ?Sized>(
        storage: &S,
        name: &str,
        config: EngineConfig,
        viewport: Size,
        pixel_ratio: f64,
    ) -> Result<Self, SessionError> {
        let state = storage.load(name).await?;
        log::info!("Loaded session {} ({} actions)", name, state.history.len());
        Ok(Self::from_state(state, config, viewport, pixel_ratio)?)
    }

    /// Snapshots in history whose bitmap is loaded.
    pub fn loaded_snapshots(&self) -> impl Iterator<Item = &Snapshot> {
        self.history.actions().iter().filter_map(|action| match action.as_ref() {
            Action::Snapshot(snapshot) if self.cache.contains(snapshot.id()) => Some(snapshot),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkboard_core::config::CompactionPolicy;
    use inkboard_core::share::ShareError;
    use inkboard_core::storage::{BoxFuture, MemoryStorage, StorageError};
    use kurbo::{Point, Rect};
    use pollster::block_on;
    use std::sync::Mutex;

    fn session() -> Session {
        Session::new(EngineConfig::default(), Size::new(200.0, 150.0), 1.0).unwrap()
    }

    fn small_session() -> Session {
        let config = EngineConfig {
            compaction: CompactionPolicy {
                target_tail: 2,
                hysteresis: 1,
            },
            ..EngineConfig::default()
        };
        Session::new(config, Size::new(200.0, 150.0), 1.0).unwrap()
    }

    fn draw(session: &mut Session, id: u64, points: &[(f64, f64)]) {
        let (first, rest) = points.split_first().unwrap();
        session.handle_pointer(PointerEvent::down(id, first.0, first.1)).unwrap();
        for (x, y) in rest {
            session.handle_pointer(PointerEvent::moved(id, *x, *y)).unwrap();
        }
        let last = points.last().unwrap();
        session.handle_pointer(PointerEvent::up(id, last.0, last.1)).unwrap();
    }

    #[derive(Default)]
    struct RecordingShare {
        requests: Mutex<Vec<ShareRequest>>,
        reject: Option<String>,
    }

    impl ShareService for RecordingShare {
        fn share(&self, request: ShareRequest) -> BoxFuture<'_, Result<(), ShareError>> {
            Box::pin(async move {
                if let Some(reason) = &self.reject {
                    return Err(ShareError::Rejected(reason.clone()));
                }
                self.requests.lock().map_err(|_| ShareError::Failed)?.push(request);
                Ok(())
            })
        }
    }

    struct FixedBackground;

    impl BackgroundSource for FixedBackground {
        fn background(&self) -> BoxFuture<'_, Option<String>> {
            Box::pin(async { Some("https://example.com/paper.png".to_string()) })
        }
    }

    #[test]
    fn test_pointer_stroke_commits_and_renders() {
        let mut session = session();
        draw(&mut session, 1, &[(10.0, 10.0), (40.0, 20.0), (80.0, 30.0)]);
        assert_eq!(session.history().len(), 1);

        assert_eq!(session.render(), RepaintKind::Full);
        let frame = session.frame().unwrap();
        assert!(crate::surface::opaque_bounds(&frame).is_some());
    }

    #[test]
    fn test_live_stroke_is_not_committed() {
        let mut session = session();
        session.handle_pointer(PointerEvent::down(1, 10.0, 10.0)).unwrap();
        session.handle_pointer(PointerEvent::moved(1, 60.0, 10.0)).unwrap();
        session.render();

        assert!(session.history().is_empty());
        assert!(crate::surface::opaque_bounds(session.scheduler().live_layer().pixmap()).is_some());
        assert!(crate::surface::opaque_bounds(session.scheduler().static_layer().pixmap()).is_none());

        session.handle_pointer(PointerEvent::cancel(1)).unwrap();
        session.render();
        assert!(session.history().is_empty());
        assert!(crate::surface::opaque_bounds(session.scheduler().live_layer().pixmap()).is_none());
    }

    #[test]
    fn test_stamp_brush() {
        let mut session = session();
        session.set_brush(Brush::Stamp);
        draw(&mut session, 1, &[(50.0, 50.0), (70.0, 60.0)]);

        let action = session.history().actions()[0].clone();
        match action.as_ref() {
            Action::Stamp(stamp) => assert_eq!(stamp.center(), Point::new(70.0, 60.0)),
            other => panic!("expected stamp, got {other:?}"),
        }
    }

    #[test]
    fn test_pinch_moves_view_and_restores_quality() {
        let mut session = session();
        session.handle_pointer(PointerEvent::down(1, 50.0, 50.0)).unwrap();
        session.handle_pointer(PointerEvent::down(2, 150.0, 50.0)).unwrap();
        assert!(session.scheduler().is_gesture_active());

        session.handle_pointer(PointerEvent::moved(2, 250.0, 50.0)).unwrap();
        assert!((session.position().zoom - 2.0).abs() < 1e-9);

        session.handle_pointer(PointerEvent::up(2, 250.0, 50.0)).unwrap();
        assert!(!session.scheduler().is_gesture_active());
        session.handle_pointer(PointerEvent::up(1, 50.0, 50.0)).unwrap();
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_undo_redo_repaint() {
        let mut session = session();
        draw(&mut session, 1, &[(10.0, 10.0), (80.0, 10.0)]);
        draw(&mut session, 1, &[(10.0, 50.0), (80.0, 50.0)]);
        session.render();

        assert!(session.undo());
        assert_eq!(session.render(), RepaintKind::Full);
        assert!(session.redo());
        assert_eq!(session.render(), RepaintKind::Incremental { from: 1 });
        assert!(!session.redo());
    }

    #[test]
    fn test_compaction_cadence() {
        let mut session = session();
        session.set_brush(Brush::Stamp);
        let mut max_len = 0;
        let mut compactions = 0;

        for i in 0..130 {
            let (x, y) = ((i % 10) as f64 * 15.0, (i / 10) as f64 * 10.0);
            draw(&mut session, 1, &[(x, y)]);
            max_len = max_len.max(session.history().len());
            if let Some(outcome) = block_on(session.run_pending_compaction()).unwrap() {
                assert_eq!(outcome, CompactionOutcome::Applied { replaced: 21 });
                compactions += 1;
            }
        }

        assert_eq!(compactions, 1);
        assert_eq!(max_len, 121);
        assert_eq!(session.history().len(), 110);
        assert_eq!(session.loaded_snapshots().count(), 1);
    }

    #[test]
    fn test_render_compacts_when_due() {
        let mut session = session();
        session.set_brush(Brush::Stamp);
        let threshold = session.config().compaction.threshold();

        for i in 0..200 {
            let (x, y) = ((i % 10) as f64 * 15.0, (i / 10) as f64 * 7.0);
            draw(&mut session, 1, &[(x, y)]);
            assert!(session.history().len() <= threshold + 1);
            session.render();
            assert!(session.history().len() <= threshold);
            assert!(!session.is_compaction_pending());
        }

        // Compacted at commits 121, 141, 161 and 181.
        assert_eq!(session.history().len(), 120);
        assert_eq!(session.loaded_snapshots().count(), 1);
    }

    #[test]
    fn test_undecodable_snapshot_is_not_compacted() {
        let mut session = small_session();
        session.commit(Action::Snapshot(Snapshot::new(Rect::new(0.0, 0.0, 10.0, 10.0), b"not a png")));
        let bad_id = session.history().actions()[0].id();
        for i in 0..3 {
            session.commit(Action::stamp(Point::new(40.0 + i as f64 * 40.0, 40.0)));
        }
        assert!(session.is_compaction_pending());

        session.render();
        assert!(!session.is_compaction_pending());
        assert_eq!(session.history().len(), 4);
        assert_eq!(session.history().actions()[0].id(), bad_id);

        assert_eq!(block_on(session.run_pending_compaction()).unwrap(), None);
        assert_eq!(session.history().len(), 4);
        assert_eq!(session.history().actions()[0].id(), bad_id);
    }

    #[test]
    fn test_commit_during_compaction_is_kept() {
        let mut session = small_session();
        for i in 0..4 {
            session.commit(Action::stamp(Point::new(20.0 + i as f64 * 30.0, 40.0)));
        }

        let plan = block_on(session.plan_compaction()).unwrap();
        let compacted = block_on(session.rasterize(&plan)).unwrap();
        session.commit(Action::stamp(Point::new(100.0, 100.0)));

        let outcome = session.apply_compaction(plan, compacted);
        assert_eq!(outcome, CompactionOutcome::Applied { replaced: 2 });
        assert_eq!(session.history().len(), 4);
        assert_eq!(session.loaded_snapshots().count(), 1);
    }

    #[test]
    fn test_undo_during_compaction_discards_result() {
        let mut session = small_session();
        for i in 0..4 {
            session.commit(Action::stamp(Point::new(20.0 + i as f64 * 30.0, 40.0)));
        }

        let plan = block_on(session.plan_compaction()).unwrap();
        let compacted = block_on(session.rasterize(&plan)).unwrap();
        let snapshot_id = compacted.snapshot.id();
        session.undo();
        session.undo();
        session.undo();

        assert_eq!(session.apply_compaction(plan, compacted), CompactionOutcome::Discarded);
        assert_eq!(session.history().len(), 1);
        assert!(!session.cache().contains(snapshot_id));
    }

    #[test]
    fn test_export_unchanged_by_compaction() {
        let mut session = small_session();
        for i in 0..3 {
            draw(&mut session, 1, &[(20.0, 20.0 + i as f64 * 30.0), (150.0, 25.0 + i as f64 * 30.0)]);
        }
        session.set_brush(Brush::Eraser);
        draw(&mut session, 1, &[(80.0, 0.0), (85.0, 120.0)]);
        let before = block_on(session.export()).unwrap();

        let outcome = block_on(session.run_pending_compaction()).unwrap();
        assert_eq!(outcome, Some(CompactionOutcome::Applied { replaced: 2 }));
        let after = block_on(session.export()).unwrap();

        assert_eq!((before.width, before.height), (after.width, after.height));
        let before = image::load_from_memory(&before.png).unwrap().to_rgb8();
        let after = image::load_from_memory(&after.png).unwrap().to_rgb8();
        let diff = before.as_raw().iter().zip(after.as_raw()).map(|(a, b)| a.abs_diff(*b)).max();
        assert_eq!(diff.unwrap_or(0), 0);
    }

    #[test]
    fn test_save_and_load() {
        let storage = MemoryStorage::new();
        let mut session = session();
        session.set_brush(Brush::Eraser);
        draw(&mut session, 1, &[(10.0, 10.0), (50.0, 50.0)]);
        draw(&mut session, 1, &[(60.0, 10.0), (90.0, 50.0)]);
        session.undo();
        block_on(session.save(&storage, "sketch")).unwrap();

        let restored = block_on(Session::load(
            &storage,
            "sketch",
            EngineConfig::default(),
            Size::new(100.0, 100.0),
            2.0,
        ))
        .unwrap();
        assert_eq!(restored.brush().brush, Brush::Eraser);
        assert_eq!(restored.history().ids(), session.history().ids());
        assert!(restored.history().can_redo());

        let missing = block_on(Session::load(&storage, "other", EngineConfig::default(), Size::new(1.0, 1.0), 1.0));
        assert!(matches!(missing, Err(SessionError::Storage(StorageError::NotFound(_)))));
    }

    #[test]
    fn test_restored_snapshot_renders() {
        let mut session = small_session();
        for i in 0..4 {
            session.commit(Action::stamp(Point::new(30.0 + i as f64 * 40.0, 50.0)));
        }
        block_on(session.run_pending_compaction()).unwrap();
        session.render();
        let before = session.frame().unwrap();

        let mut restored =
            Session::from_state(session.state(), session.config().clone(), Size::new(200.0, 150.0), 1.0).unwrap();
        assert!(restored.cache().is_empty());
        restored.render();
        let after = restored.frame().unwrap();

        let diff = before.data().iter().zip(after.data()).map(|(a, b)| a.abs_diff(*b)).max();
        assert!(diff.unwrap_or(0) <= 2);
    }

    #[test]
    fn test_share_sends_export() {
        let mut session = session();
        draw(&mut session, 1, &[(10.0, 10.0), (80.0, 40.0)]);
        let service = RecordingShare::default();

        block_on(session.share(&service, "Ada", ["friend@example.com"], false)).unwrap();
        let requests = service.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].sender_name, "Ada");
        assert!(image::load_from_memory(&requests[0].image).is_ok());
    }

    #[test]
    fn test_share_rejection_surfaces_reason() {
        let mut session = session();
        let service = RecordingShare {
            reject: Some("Mailbox full".to_string()),
            ..RecordingShare::default()
        };

        let result = block_on(session.share(&service, "Ada", ["x@example.com"], true));
        match result {
            Err(SessionError::Share(error)) => assert_eq!(error.to_string(), "Mailbox full"),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_background_is_opaque_handle() {
        let mut session = session();
        assert!(session.background().is_none());
        block_on(session.refresh_background(&FixedBackground));
        assert_eq!(session.background(), Some("https://example.com/paper.png"));
    }
}
