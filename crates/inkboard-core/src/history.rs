//! Committed drawing history with undo/redo and compaction.
//!
//! History is an ordered list of [`ActionRef`]s. It only ever changes in three
//! ways: an action is appended (`commit`/`redo`), the last action is removed
//! (`undo`), or a prefix is atomically replaced by a single snapshot
//! (`apply_compaction`).
//!
//! Compaction is split into steps so the expensive rasterization can run while
//! new actions keep arriving:
//!
//! 1. [`History::plan_compaction`] captures the prefix to flatten.
//! 2. The caller rasterizes the plan into a [`Snapshot`] (possibly suspending).
//! 3. [`History::apply_compaction`] swaps the prefix for the snapshot, unless
//!    the captured prefix is no longer the current prefix, in which case the
//!    result is discarded.

use crate::action::{Action, ActionId, ActionRef, Snapshot, aggregate_bounds};
use crate::config::CompactionPolicy;
use kurbo::Rect;
use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;

/// A prefix of history captured for flattening.
#[derive(Debug, Clone)]
pub struct CompactionPlan {
    prefix: Vec<ActionRef>,
}

impl CompactionPlan {
    /// The actions to flatten, in paint order.
    pub fn actions(&self) -> &[ActionRef] {
        &self.prefix
    }

    /// Number of history entries the snapshot replaces.
    pub fn split(&self) -> usize {
        self.prefix.len()
    }

    /// Visible bounds of the prefix.
    pub fn bounds(&self) -> Option<Rect> {
        aggregate_bounds(self.prefix.iter().map(|a| a.as_ref()))
    }
}

/// Result of applying a compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// The prefix was replaced by the snapshot.
    Applied { replaced: usize },
    /// History changed underneath the plan; nothing was modified.
    Discarded,
}

/// A contiguous run of ink together with the later erasers that touch it.
#[derive(Debug, Clone, PartialEq)]
pub struct InkGroup {
    /// History indices of the ink run (pen, stamp and snapshot actions).
    pub ink: Range<usize>,
    /// History indices of erasers after the run whose extent intersects it.
    pub erasers: Vec<usize>,
    /// Visible bounds of the ink run.
    pub bounds: Rect,
}

/// Undo/redo state machine over committed actions.
#[derive(Debug, Clone, Default)]
pub struct History {
    actions: Vec<ActionRef>,
    /// Front is the most recently undone action.
    redo: VecDeque<ActionRef>,
    policy: CompactionPolicy,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: CompactionPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Rebuild history from persisted actions.
    pub fn from_parts(actions: Vec<Action>, redo: Vec<Action>, policy: CompactionPolicy) -> Self {
        Self {
            actions: actions.into_iter().map(Arc::new).collect(),
            redo: redo.into_iter().map(Arc::new).collect(),
            policy,
        }
    }

    pub fn policy(&self) -> CompactionPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: CompactionPolicy) {
        self.policy = policy;
    }

    pub fn actions(&self) -> &[ActionRef] {
        &self.actions
    }

    /// Redo stack, next action to redo first.
    pub fn redo_stack(&self) -> impl ExactSizeIterator<Item = &ActionRef> {
        self.redo.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        !self.actions.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Append an action. Clears the redo stack.
    pub fn commit(&mut self, action: impl Into<ActionRef>) {
        self.actions.push(action.into());
        self.redo.clear();
    }

    /// Move the last action to the front of the redo stack.
    /// Returns true if anything was undone.
    pub fn undo(&mut self) -> bool {
        match self.actions.pop() {
            Some(action) => {
                self.redo.push_front(action);
                true
            }
            None => false,
        }
    }

    /// Re-append the most recently undone action.
    /// Returns true if anything was redone.
    pub fn redo(&mut self) -> bool {
        match self.redo.pop_front() {
            Some(action) => {
                self.actions.push(action);
                true
            }
            None => false,
        }
    }

    /// Visible bounds of the whole drawing.
    pub fn bounds(&self) -> Option<Rect> {
        aggregate_bounds(self.actions.iter().map(|a| a.as_ref()))
    }

    /// Whether history has outgrown the compaction threshold.
    pub fn needs_compaction(&self) -> bool {
        self.actions.len() > self.policy.threshold()
    }

    /// Capture the prefix that should be flattened, if compaction is due.
    pub fn plan_compaction(&self) -> Option<CompactionPlan> {
        if !self.needs_compaction() {
            return None;
        }
        let split = self.actions.len() - self.policy.target_tail;
        Some(CompactionPlan {
            prefix: self.actions[..split].to_vec(),
        })
    }

    /// Replace the planned prefix with `snapshot`.
    ///
    /// Discarded when history no longer starts with exactly the planned
    /// actions (an undo dropped part of it, or another compaction won).
    pub fn apply_compaction(&mut self, plan: CompactionPlan, snapshot: Snapshot) -> CompactionOutcome {
        let split = plan.split();
        let still_current = self.actions.len() >= split
            && self.actions[..split]
                .iter()
                .zip(&plan.prefix)
                .all(|(current, planned)| Arc::ptr_eq(current, planned));

        if !still_current {
            log::debug!(
                "discarding stale compaction of {} actions (history now {})",
                split,
                self.actions.len()
            );
            return CompactionOutcome::Discarded;
        }

        let snapshot: ActionRef = Arc::new(Action::Snapshot(snapshot));
        self.actions.splice(..split, std::iter::once(snapshot));
        log::debug!(
            "compacted {} actions into one snapshot (history now {})",
            split,
            self.actions.len()
        );
        CompactionOutcome::Applied { replaced: split }
    }

    /// Group each ink run with the later erasers that can affect it.
    pub fn ink_groups(&self) -> Vec<InkGroup> {
        let mut groups: Vec<InkGroup> = Vec::new();
        let mut i = 0;

        while i < self.actions.len() {
            if self.actions[i].is_eraser() {
                i += 1;
                continue;
            }

            let start = i;
            let mut bounds: Option<Rect> = None;
            while i < self.actions.len() && !self.actions[i].is_eraser() {
                if let Some(rect) = self.actions[i].bounds() {
                    bounds = Some(bounds.map_or(rect, |b| b.union(rect)));
                }
                i += 1;
            }

            let Some(bounds) = bounds else {
                continue;
            };

            let erasers = self.actions[i..]
                .iter()
                .enumerate()
                .filter(|(_, action)| action.is_eraser())
                .filter(|(_, action)| {
                    action
                        .extent()
                        .is_some_and(|extent| extent.intersect(bounds).area() > 0.0)
                })
                .map(|(offset, _)| i + offset)
                .collect();

            groups.push(InkGroup {
                ink: start..i,
                erasers,
                bounds,
            });
        }

        groups
    }

    /// Ids of the current actions, in order.
    pub fn ids(&self) -> Vec<ActionId> {
        self.actions.iter().map(|a| a.id()).collect()
    }

    /// Owned copies of history and redo stack, for persistence.
    pub fn to_parts(&self) -> (Vec<Action>, Vec<Action>) {
        (
            self.actions.iter().map(|a| a.as_ref().clone()).collect(),
            self.redo.iter().map(|a| a.as_ref().clone()).collect(),
        )
    }
}
