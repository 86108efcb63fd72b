//! A participant's local mirror of a room.
//!
//! The drawing surface feeds every [`ServerMessage`] it receives into
//! [`CanvasView::apply`] and paints [`CanvasView::strokes`]. Strokes that are
//! still being drawn by someone else live in a separate preview set until
//! their `stroke:end` arrives.

use std::collections::HashMap;

use crate::snapshot::{sort_by_creation, Snapshot, SnapshotError};
use crate::{OperationKind, Point, ServerMessage, Stroke, UserInfo};

#[derive(Debug, Default)]
pub struct CanvasView {
    strokes: Vec<Stroke>,
    live: HashMap<String, Stroke>,
    users: Vec<UserInfo>,
    cursors: HashMap<String, Point>,
}

impl CanvasView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn stroke_ids(&self) -> Vec<&str> {
        self.strokes.iter().map(|stroke| stroke.id.as_str()).collect()
    }

    pub fn live_stroke(&self, id: &str) -> Option<&Stroke> {
        self.live.get(id)
    }

    pub fn users(&self) -> &[UserInfo] {
        &self.users
    }

    pub fn cursor(&self, participant_id: &str) -> Option<Point> {
        self.cursors.get(participant_id).copied()
    }

    /// Records a stroke the local participant just committed, before the
    /// authority has seen it.
    pub fn commit_local(&mut self, stroke: Stroke) {
        if stroke.is_committable() {
            self.live.remove(&stroke.id);
            self.upsert(stroke);
        }
    }

    /// Mirrors a local erase. The authority does not echo `stroke:removed`
    /// back to the participant who erased.
    pub fn erase_local(&mut self, stroke_id: &str) {
        self.remove(stroke_id);
    }

    /// Mirrors a local clear.
    pub fn clear_local(&mut self) {
        self.strokes.clear();
        self.live.clear();
    }

    pub fn apply(&mut self, message: ServerMessage) -> Result<(), SnapshotError> {
        match message {
            ServerMessage::FullState { strokes } => {
                let snapshot = Snapshot::validate(strokes)?;
                self.strokes = snapshot.strokes;
                self.live.clear();
            }
            ServerMessage::Users { users } => {
                self.cursors
                    .retain(|id, _| users.iter().any(|user| &user.id == id));
                self.users = users;
            }
            ServerMessage::StrokeStart { stroke } => {
                if stroke.is_committable() {
                    self.upsert(stroke);
                } else {
                    self.live.insert(stroke.id.clone(), stroke);
                }
            }
            ServerMessage::StrokePoint {
                stroke_id, point, ..
            } => {
                if let Some(stroke) = self.live.get_mut(&stroke_id) {
                    stroke.points.push(point);
                }
            }
            ServerMessage::StrokeEnd { stroke } => {
                self.live.remove(&stroke.id);
                self.upsert(stroke);
            }
            ServerMessage::StrokeRemoved { stroke_id, .. } => {
                self.remove(&stroke_id);
            }
            ServerMessage::Undo { operation } => match operation.kind {
                OperationKind::Add => {
                    if let Some(id) = operation.stroke_id {
                        self.remove(&id);
                    }
                }
                OperationKind::Remove => {
                    if let Some(stroke) = operation.stroke {
                        self.upsert(stroke);
                    }
                }
                // The authority cannot restore a clear either.
                OperationKind::Clear => {}
            },
            ServerMessage::Redo { operation } => match operation.kind {
                OperationKind::Add => {
                    if let Some(stroke) = operation.stroke {
                        self.upsert(stroke);
                    }
                }
                OperationKind::Remove => {
                    if let Some(id) = operation.stroke_id {
                        self.remove(&id);
                    }
                }
                OperationKind::Clear => self.clear_local(),
            },
            ServerMessage::Clear { .. } => self.clear_local(),
            ServerMessage::CursorMove {
                participant_id,
                point,
            } => {
                self.cursors.insert(participant_id, point);
            }
            ServerMessage::UserLeft { participant_id } => {
                self.users.retain(|user| user.id != participant_id);
                self.cursors.remove(&participant_id);
                self.live
                    .retain(|_, stroke| stroke.author_id != participant_id);
            }
            ServerMessage::Error { .. } => {}
        }
        Ok(())
    }

    fn upsert(&mut self, stroke: Stroke) {
        self.remove(&stroke.id);
        self.strokes.push(stroke);
        sort_by_creation(&mut self.strokes);
    }

    fn remove(&mut self, id: &str) {
        self.strokes.retain(|stroke| stroke.id != id);
    }
}
