use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use inkroom_shared::snapshot::Snapshot;
use inkroom_shared::{Operation, OperationKind, RoomStats, Stroke};

use crate::state::{now_millis, DEFAULT_HISTORY_LIMIT};

/// Authoritative drawing state of one room.
///
/// Undo and redo work on a single stack shared by everyone in the room, so
/// any participant can revert the latest action of any other participant.
pub struct DrawingState {
    strokes: HashMap<String, Stroke>,
    history: VecDeque<Operation>,
    redo_stack: Vec<Operation>,
    history_limit: usize,
}

impl Default for DrawingState {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl DrawingState {
    pub fn new(history_limit: usize) -> Self {
        Self {
            strokes: HashMap::new(),
            history: VecDeque::new(),
            redo_stack: Vec::new(),
            history_limit: history_limit.max(1),
        }
    }

    pub fn add_stroke(&mut self, stroke: Stroke, actor_id: &str) {
        self.strokes.insert(stroke.id.clone(), stroke.clone());
        self.record(Operation::add(stroke, actor_id, now_millis()));
    }

    /// Returns false when the stroke is not present.
    pub fn remove_stroke(&mut self, stroke_id: &str, actor_id: &str) -> bool {
        let Some(stroke) = self.strokes.remove(stroke_id) else {
            return false;
        };
        self.record(Operation::remove(stroke, actor_id, now_millis()));
        true
    }

    pub fn clear(&mut self, actor_id: &str) {
        self.record(Operation::clear(actor_id, now_millis()));
        self.strokes.clear();
    }

    /// Reverts the most recent operation, whoever performed it.
    ///
    /// Undoing a clear restores nothing: the clear does not remember what it
    /// removed. The slot is still consumed and the clear can be redone.
    pub fn undo(&mut self, _actor_id: &str) -> Option<Operation> {
        let operation = self.history.pop_back()?;
        match operation.kind {
            OperationKind::Add => {
                if let Some(id) = &operation.stroke_id {
                    self.strokes.remove(id);
                }
            }
            OperationKind::Remove => {
                if let Some(stroke) = &operation.stroke {
                    self.strokes.insert(stroke.id.clone(), stroke.clone());
                }
            }
            OperationKind::Clear => {}
        }
        self.redo_stack.push(operation.clone());
        Some(operation)
    }

    pub fn redo(&mut self, _actor_id: &str) -> Option<Operation> {
        let operation = self.redo_stack.pop()?;
        match operation.kind {
            OperationKind::Add => {
                if let Some(stroke) = &operation.stroke {
                    self.strokes.insert(stroke.id.clone(), stroke.clone());
                }
            }
            OperationKind::Remove => {
                if let Some(id) = &operation.stroke_id {
                    self.strokes.remove(id);
                }
            }
            OperationKind::Clear => self.strokes.clear(),
        }
        self.history.push_back(operation.clone());
        self.trim_history();
        Some(operation)
    }

    pub fn snapshot(&self) -> Vec<Stroke> {
        Snapshot::new(self.strokes.values().cloned().collect()).strokes
    }

    /// Replaces all strokes and forgets history. Only for hydrating a room
    /// wholesale, never for incremental sync.
    pub fn restore(&mut self, strokes: Vec<Stroke>) {
        self.strokes = strokes
            .into_iter()
            .map(|stroke| (stroke.id.clone(), stroke))
            .collect();
        self.history.clear();
        self.redo_stack.clear();
    }

    /// `now` is in epoch millis. History is left alone.
    pub fn evict_older_than(&mut self, max_age: Duration, now: i64) -> usize {
        let max_age = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let before = self.strokes.len();
        self.strokes
            .retain(|_, stroke| now.saturating_sub(stroke.created_at) <= max_age);
        before - self.strokes.len()
    }

    pub fn stroke(&self, id: &str) -> Option<&Stroke> {
        self.strokes.get(id)
    }

    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn stats(&self) -> RoomStats {
        RoomStats {
            total_strokes: self.strokes.len(),
            total_points: self.strokes.values().map(|s| s.points.len()).sum(),
            history_size: self.history.len(),
            redo_stack_size: self.redo_stack.len(),
        }
    }

    fn record(&mut self, operation: Operation) {
        self.history.push_back(operation);
        self.redo_stack.clear();
        self.trim_history();
    }

    fn trim_history(&mut self) {
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkroom_shared::{Point, Tool};

    fn stroke(id: &str, created_at: i64) -> Stroke {
        Stroke {
            id: id.to_string(),
            author_id: "alice".to_string(),
            points: vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0)],
            color: "#1f1f1f".to_string(),
            width: 3.0,
            tool: Tool::Brush,
            created_at,
        }
    }

    fn ids(state: &DrawingState) -> Vec<String> {
        state.snapshot().into_iter().map(|s| s.id).collect()
    }

    #[test]
    fn add_undo_redo_scenario() {
        let mut state = DrawingState::default();
        let s1 = stroke("s1", 1);
        state.add_stroke(s1.clone(), "alice");
        assert_eq!(state.snapshot(), vec![s1.clone()]);

        let undone = state.undo("alice").unwrap();
        assert_eq!(undone.kind, OperationKind::Add);
        assert_eq!(undone.stroke_id.as_deref(), Some("s1"));
        assert!(state.snapshot().is_empty());

        let redone = state.redo("alice").unwrap();
        assert_eq!(redone, undone);
        assert_eq!(state.snapshot(), vec![s1]);
    }

    #[test]
    fn undo_then_redo_restores_content_and_stack_sizes() {
        let mut state = DrawingState::default();
        for i in 0..5 {
            state.add_stroke(stroke(&format!("s{i}"), i), "alice");
        }
        let before = state.snapshot();
        let stats_before = state.stats();

        state.undo("bob").unwrap();
        state.redo("bob").unwrap();

        assert_eq!(state.snapshot(), before);
        assert_eq!(state.stats(), stats_before);
    }

    #[test]
    fn undo_is_global_across_actors() {
        let mut state = DrawingState::default();
        state.add_stroke(stroke("s1", 1), "alice");
        state.add_stroke(stroke("s2", 2), "bob");

        let undone = state.undo("alice").unwrap();
        assert_eq!(undone.stroke_id.as_deref(), Some("s2"));
        assert_eq!(undone.actor_id, "bob");
        assert_eq!(ids(&state), ["s1"]);
    }

    #[test]
    fn history_is_capped_and_latest_stays_undoable() {
        let mut state = DrawingState::default();
        for i in 0..1001 {
            state.add_stroke(stroke(&format!("s{i}"), i), "alice");
        }
        assert_eq!(state.stats().history_size, 1000);
        assert_eq!(state.len(), 1001);

        let undone = state.undo("alice").unwrap();
        assert_eq!(undone.stroke_id.as_deref(), Some("s1000"));
        assert!(state.stroke("s1000").is_none());
    }

    #[test]
    fn snapshot_is_ordered_by_creation_time() {
        let mut state = DrawingState::default();
        state.add_stroke(stroke("s2", 20), "alice");
        state.add_stroke(stroke("s1", 10), "alice");
        assert_eq!(ids(&state), ["s1", "s2"]);
    }

    #[test]
    fn remove_is_idempotent_and_undoable() {
        let mut state = DrawingState::default();
        state.add_stroke(stroke("s1", 1), "alice");

        assert!(state.remove_stroke("s1", "bob"));
        assert!(!state.remove_stroke("s1", "bob"));
        assert!(state.is_empty());
        assert_eq!(state.history_len(), 2);

        let undone = state.undo("bob").unwrap();
        assert_eq!(undone.kind, OperationKind::Remove);
        assert_eq!(ids(&state), ["s1"]);

        state.redo("bob").unwrap();
        assert!(state.is_empty());
    }

    #[test]
    fn undoing_a_clear_does_not_restore_strokes() {
        let mut state = DrawingState::default();
        state.add_stroke(stroke("s1", 1), "alice");
        state.add_stroke(stroke("s2", 2), "alice");
        state.clear("bob");
        assert!(state.is_empty());

        let undone = state.undo("alice").unwrap();
        assert_eq!(undone.kind, OperationKind::Clear);
        assert!(state.is_empty());
        assert_eq!(state.history_len(), 2);
        assert_eq!(state.redo_len(), 1);

        // The next undo reaches the add beneath the clear, whose stroke is
        // already gone.
        let undone = state.undo("alice").unwrap();
        assert_eq!(undone.stroke_id.as_deref(), Some("s2"));
        assert!(state.is_empty());
    }

    #[test]
    fn redo_of_clear_empties_again() {
        let mut state = DrawingState::default();
        state.clear("bob");
        state.undo("bob").unwrap();
        state.add_stroke(stroke("s1", 1), "alice");
        assert_eq!(state.redo_len(), 0);

        state.clear("bob");
        state.undo("bob").unwrap();
        state.redo("bob").unwrap();
        assert!(state.is_empty());
    }

    #[test]
    fn new_operation_clears_redo_stack() {
        let mut state = DrawingState::default();
        state.add_stroke(stroke("s1", 1), "alice");
        state.undo("alice").unwrap();
        assert_eq!(state.redo_len(), 1);

        state.add_stroke(stroke("s2", 2), "bob");
        assert_eq!(state.redo_len(), 0);
        assert!(state.redo("alice").is_none());
    }

    #[test]
    fn empty_stacks_yield_nothing() {
        let mut state = DrawingState::default();
        assert!(state.undo("alice").is_none());
        assert!(state.redo("alice").is_none());
        state.clear("alice");
        assert_eq!(state.history_len(), 1);
    }

    #[test]
    fn restore_replaces_strokes_and_forgets_history() {
        let mut state = DrawingState::default();
        state.add_stroke(stroke("s1", 1), "alice");
        state.undo("alice").unwrap();
        state.add_stroke(stroke("s2", 2), "alice");

        state.restore(vec![stroke("s9", 9), stroke("s8", 8)]);
        assert_eq!(ids(&state), ["s8", "s9"]);
        assert_eq!(state.history_len(), 0);
        assert_eq!(state.redo_len(), 0);
    }

    #[test]
    fn eviction_leaves_history_alone() {
        let mut state = DrawingState::default();
        state.add_stroke(stroke("old", 1_000), "alice");
        state.add_stroke(stroke("new", 9_000), "alice");

        let removed = state.evict_older_than(Duration::from_secs(5), 10_000);
        assert_eq!(removed, 1);
        assert_eq!(ids(&state), ["new"]);
        assert_eq!(state.history_len(), 2);
    }

    #[test]
    fn stats_count_points() {
        let mut state = DrawingState::default();
        state.add_stroke(stroke("s1", 1), "alice");
        state.add_stroke(stroke("s2", 2), "alice");
        state.undo("alice").unwrap();
        assert_eq!(
            state.stats(),
            RoomStats {
                total_strokes: 1,
                total_points: 2,
                history_size: 1,
                redo_stack_size: 1,
            }
        );
    }
}
