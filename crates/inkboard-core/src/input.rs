//! Pointer input: per-pointer stroke sampling and two-finger pinch gestures.

use crate::geometry::InputPoint;
use crate::position::{CanvasPosition, clamp_zoom};
use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Identifier assigned to a pointer by the host platform.
pub type PointerId = u64;

/// Below this finger spacing (screen pixels) a pinch only pans.
const MIN_PINCH_DISTANCE: f64 = 1.0;

/// Phase of a pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerPhase {
    Down,
    Move,
    Up,
    Cancel,
}

/// A pointer event in logical screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    pub pointer_id: PointerId,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    pub phase: PointerPhase,
}

impl PointerEvent {
    pub fn new(pointer_id: PointerId, phase: PointerPhase, x: f64, y: f64) -> Self {
        Self {
            pointer_id,
            x,
            y,
            pressure: None,
            phase,
        }
    }

    pub fn down(pointer_id: PointerId, x: f64, y: f64) -> Self {
        Self::new(pointer_id, PointerPhase::Down, x, y)
    }

    pub fn moved(pointer_id: PointerId, x: f64, y: f64) -> Self {
        Self::new(pointer_id, PointerPhase::Move, x, y)
    }

    pub fn up(pointer_id: PointerId, x: f64, y: f64) -> Self {
        Self::new(pointer_id, PointerPhase::Up, x, y)
    }

    pub fn cancel(pointer_id: PointerId) -> Self {
        Self::new(pointer_id, PointerPhase::Cancel, 0.0, 0.0)
    }

    pub fn with_pressure(mut self, pressure: f64) -> Self {
        self.pressure = Some(pressure);
        self
    }

    pub fn screen_point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// What a pointer event did.
#[derive(Debug, Clone, PartialEq)]
pub enum PointerUpdate {
    /// Anomalous or irrelevant event; nothing changed.
    Ignored,
    /// A stroke started or received a new sample.
    Stroke(PointerId),
    /// A stroke ended; `points` are its world-space samples.
    Finished {
        pointer_id: PointerId,
        points: Vec<InputPoint>,
    },
    /// A stroke was abandoned without committing.
    Cancelled(PointerId),
    /// A second pointer landed; every in-progress stroke was dropped.
    GestureStarted,
    /// The pinch moved the view.
    Gesture(CanvasPosition),
    /// One of the pinching pointers lifted.
    GestureEnded,
}

#[derive(Debug, Clone, Copy)]
struct Pinch {
    first: PointerId,
    second: PointerId,
    start_distance: f64,
    start_zoom: f64,
    /// World point under the initial finger midpoint.
    anchor: Point,
}

impl Pinch {
    fn involves(&self, id: PointerId) -> bool {
        self.first == id || self.second == id
    }
}

/// Tracks active pointers and turns their events into strokes or view gestures.
#[derive(Debug, Default)]
pub struct PointerTracker {
    /// Every pointer that is currently down, in screen coordinates.
    contacts: BTreeMap<PointerId, Point>,
    /// World-space samples of strokes in progress.
    strokes: BTreeMap<PointerId, Vec<InputPoint>>,
    /// Pointers that stay inert until lifted.
    suppressed: BTreeSet<PointerId>,
    pinch: Option<Pinch>,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pointers currently down.
    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_gesture_active(&self) -> bool {
        self.pinch.is_some()
    }

    /// Samples of every stroke in progress, ordered by pointer id.
    pub fn active_strokes(&self) -> impl Iterator<Item = &[InputPoint]> {
        self.strokes.values().map(Vec::as_slice)
    }

    pub fn has_active_strokes(&self) -> bool {
        !self.strokes.is_empty()
    }

    /// Drop all strokes in progress without committing them.
    pub fn cancel_strokes(&mut self) {
        let ids: Vec<PointerId> = self.strokes.keys().copied().collect();
        self.suppressed.extend(ids);
        self.strokes.clear();
    }

    /// Process an event. `position` converts screen coordinates to world space.
    pub fn handle(&mut self, event: PointerEvent, position: &CanvasPosition) -> PointerUpdate {
        let screen = event.screen_point();
        if event.phase != PointerPhase::Cancel && !(screen.x.is_finite() && screen.y.is_finite()) {
            log::debug!("Ignoring non-finite pointer event {:?}", event);
            return PointerUpdate::Ignored;
        }

        match event.phase {
            PointerPhase::Down => self.on_down(event, screen, position),
            PointerPhase::Move => self.on_move(event, screen, position),
            PointerPhase::Up => self.on_up(event, screen, position),
            PointerPhase::Cancel => self.on_cancel(event.pointer_id),
        }
    }

    fn on_down(&mut self, event: PointerEvent, screen: Point, position: &CanvasPosition) -> PointerUpdate {
        let id = event.pointer_id;
        if self.contacts.contains_key(&id) {
            return PointerUpdate::Ignored;
        }
        self.contacts.insert(id, screen);

        if self.pinch.is_some() {
            self.suppressed.insert(id);
            return PointerUpdate::Ignored;
        }

        if self.contacts.len() >= 2 {
            let mut others = self.contacts.iter().filter(|(other, _)| **other != id);
            let Some((&other, &other_screen)) = others.next() else {
                return PointerUpdate::Ignored;
            };
            self.cancel_strokes();
            let mid = screen.midpoint(other_screen);
            self.pinch = Some(Pinch {
                first: other,
                second: id,
                start_distance: screen.distance(other_screen),
                start_zoom: position.zoom,
                anchor: position.screen_to_world(mid),
            });
            log::debug!("Pinch started by pointers {} and {}", other, id);
            return PointerUpdate::GestureStarted;
        }

        self.strokes.insert(id, vec![world_sample(&event, screen, position)]);
        PointerUpdate::Stroke(id)
    }

    fn on_move(&mut self, event: PointerEvent, screen: Point, position: &CanvasPosition) -> PointerUpdate {
        let id = event.pointer_id;
        let Some(contact) = self.contacts.get_mut(&id) else {
            return PointerUpdate::Ignored;
        };
        *contact = screen;

        if let Some(pinch) = self.pinch {
            if pinch.involves(id) {
                return self.pinch_position(&pinch, position).map_or(PointerUpdate::Ignored, PointerUpdate::Gesture);
            }
            return PointerUpdate::Ignored;
        }

        match self.strokes.get_mut(&id) {
            Some(points) => {
                points.push(world_sample(&event, screen, position));
                PointerUpdate::Stroke(id)
            }
            None => PointerUpdate::Ignored,
        }
    }

    fn on_up(&mut self, event: PointerEvent, screen: Point, position: &CanvasPosition) -> PointerUpdate {
        let id = event.pointer_id;
        if self.contacts.remove(&id).is_none() {
            return PointerUpdate::Ignored;
        }
        if let Some(update) = self.end_pinch_for(id) {
            return update;
        }
        if self.suppressed.remove(&id) {
            return PointerUpdate::Ignored;
        }

        match self.strokes.remove(&id) {
            Some(mut points) => {
                let last = world_sample(&event, screen, position);
                if points.last().map(InputPoint::position) != Some(last.position()) {
                    points.push(last);
                }
                PointerUpdate::Finished { pointer_id: id, points }
            }
            None => PointerUpdate::Ignored,
        }
    }

    fn on_cancel(&mut self, id: PointerId) -> PointerUpdate {
        if self.contacts.remove(&id).is_none() {
            return PointerUpdate::Ignored;
        }
        if let Some(update) = self.end_pinch_for(id) {
            return update;
        }
        self.suppressed.remove(&id);
        match self.strokes.remove(&id) {
            Some(_) => PointerUpdate::Cancelled(id),
            None => PointerUpdate::Ignored,
        }
    }

    /// End the pinch if `id` was one of its pointers. Remaining contacts stay inert.
    fn end_pinch_for(&mut self, id: PointerId) -> Option<PointerUpdate> {
        let pinch = self.pinch.filter(|pinch| pinch.involves(id))?;
        self.pinch = None;
        self.suppressed.remove(&id);
        self.suppressed.extend(self.contacts.keys().copied());
        log::debug!("Pinch ended by pointer {} ({} -> {})", id, pinch.first, pinch.second);
        Some(PointerUpdate::GestureEnded)
    }

    fn pinch_position(&self, pinch: &Pinch, position: &CanvasPosition) -> Option<CanvasPosition> {
        let a = *self.contacts.get(&pinch.first)?;
        let b = *self.contacts.get(&pinch.second)?;

        let mut next = *position;
        if pinch.start_distance >= MIN_PINCH_DISTANCE {
            next.zoom = clamp_zoom(pinch.start_zoom * a.distance(b) / pinch.start_distance);
        }
        next.anchor(pinch.anchor, a.midpoint(b));
        Some(next)
    }
}

fn world_sample(event: &PointerEvent, screen: Point, position: &CanvasPosition) -> InputPoint {
    let world = position.screen_to_world(screen);
    match event.pressure.filter(|p| p.is_finite()) {
        Some(pressure) => InputPoint::with_pressure(world.x, world.y, pressure),
        None => InputPoint::new(world.x, world.y),
    }
}
