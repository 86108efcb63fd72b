use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

pub mod snapshot;
pub mod view;
pub mod wire;

pub use snapshot::{Snapshot, SnapshotError};

/// Strokes with fewer points are taps and never get committed.
pub const MIN_COMMITTED_POINTS: usize = 2;

#[derive(Serialize, Deserialize, Encode, Decode, Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Serialize, Deserialize, Encode, Decode, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Brush,
    Eraser,
}

#[derive(Serialize, Deserialize, Encode, Decode, Clone, Debug, PartialEq)]
pub struct Stroke {
    pub id: String,
    #[serde(default)]
    pub author_id: String,
    pub points: Vec<Point>,
    pub color: String,
    pub width: f64,
    #[serde(default)]
    pub tool: Tool,
    /// Milliseconds since the Unix epoch. Zero means "stamp on arrival".
    #[serde(default)]
    pub created_at: i64,
}

impl Stroke {
    pub fn is_committable(&self) -> bool {
        self.points.len() >= MIN_COMMITTED_POINTS
    }
}

#[derive(Serialize, Deserialize, Encode, Decode, Clone, Debug, PartialEq, Eq)]
pub struct UserInfo {
    pub id: String,
    pub color: String,
    pub display_name: String,
}

#[derive(Serialize, Deserialize, Encode, Decode, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Add,
    Remove,
    Clear,
}

/// A recorded state transition of a room, kept for global undo/redo.
///
/// `Add` and `Remove` carry the full stroke so either direction can be
/// replayed. `Clear` carries nothing, which is why undoing a clear cannot
/// bring the strokes back.
#[derive(Serialize, Deserialize, Encode, Decode, Clone, Debug, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<Stroke>,
    pub actor_id: String,
    pub applied_at: i64,
}

impl Operation {
    pub fn add(stroke: Stroke, actor_id: &str, applied_at: i64) -> Self {
        Self {
            kind: OperationKind::Add,
            stroke_id: Some(stroke.id.clone()),
            stroke: Some(stroke),
            actor_id: actor_id.to_string(),
            applied_at,
        }
    }

    pub fn remove(stroke: Stroke, actor_id: &str, applied_at: i64) -> Self {
        Self {
            kind: OperationKind::Remove,
            stroke_id: Some(stroke.id.clone()),
            stroke: Some(stroke),
            actor_id: actor_id.to_string(),
            applied_at,
        }
    }

    pub fn clear(actor_id: &str, applied_at: i64) -> Self {
        Self {
            kind: OperationKind::Clear,
            stroke_id: None,
            stroke: None,
            actor_id: actor_id.to_string(),
            applied_at,
        }
    }
}

#[derive(Serialize, Deserialize, Encode, Decode, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoomStats {
    pub total_strokes: usize,
    pub total_points: usize,
    pub history_size: usize,
    pub redo_stack_size: usize,
}

#[derive(Serialize, Deserialize, Encode, Decode, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "join")]
    Join {
        room_id: String,
        #[serde(default)]
        color: Option<String>,
        #[serde(default)]
        display_name: Option<String>,
    },
    #[serde(rename = "stroke:start")]
    StrokeStart { stroke: Stroke },
    #[serde(rename = "stroke:point")]
    StrokePoint { stroke_id: String, point: Point },
    #[serde(rename = "stroke:end")]
    StrokeEnd { stroke: Stroke },
    #[serde(rename = "erase")]
    Erase { stroke_id: String },
    #[serde(rename = "undo")]
    Undo,
    #[serde(rename = "redo")]
    Redo,
    #[serde(rename = "clear")]
    Clear,
    #[serde(rename = "cursor:move")]
    CursorMove { point: Point },
    #[serde(rename = "leave")]
    Leave,
}

#[derive(Serialize, Deserialize, Encode, Decode, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "users")]
    Users { users: Vec<UserInfo> },
    #[serde(rename = "full-state")]
    FullState { strokes: Vec<Stroke> },
    #[serde(rename = "stroke:start")]
    StrokeStart { stroke: Stroke },
    #[serde(rename = "stroke:point")]
    StrokePoint {
        participant_id: String,
        stroke_id: String,
        point: Point,
    },
    #[serde(rename = "stroke:end")]
    StrokeEnd { stroke: Stroke },
    #[serde(rename = "stroke:removed")]
    StrokeRemoved {
        stroke_id: String,
        participant_id: String,
    },
    #[serde(rename = "undo")]
    Undo { operation: Operation },
    #[serde(rename = "redo")]
    Redo { operation: Operation },
    #[serde(rename = "clear")]
    Clear { participant_id: String },
    #[serde(rename = "cursor:move")]
    CursorMove { participant_id: String, point: Point },
    #[serde(rename = "user:left")]
    UserLeft { participant_id: String },
    #[serde(rename = "error")]
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_uses_type_tag() {
        let message: ClientMessage =
            serde_json::from_str(r#"{"type":"join","room_id":"r1"}"#).unwrap();
        assert_eq!(
            message,
            ClientMessage::Join {
                room_id: "r1".into(),
                color: None,
                display_name: None,
            }
        );

        let undo: ClientMessage = serde_json::from_str(r#"{"type":"undo"}"#).unwrap();
        assert_eq!(undo, ClientMessage::Undo);
    }

    #[test]
    fn stroke_defaults_missing_author_and_tool() {
        let json = r##"{"id":"s1","points":[{"x":0,"y":0},{"x":5,"y":5}],"color":"#000","width":3}"##;
        let stroke: Stroke = serde_json::from_str(json).unwrap();
        assert_eq!(stroke.author_id, "");
        assert_eq!(stroke.tool, Tool::Brush);
        assert_eq!(stroke.created_at, 0);
        assert!(stroke.is_committable());
    }

    #[test]
    fn clear_operation_has_no_payload() {
        let op = Operation::clear("a", 10);
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["kind"], "clear");
        assert!(json.get("stroke").is_none());
        assert!(json.get("stroke_id").is_none());
    }

    #[test]
    fn eraser_tool_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Tool::Eraser).unwrap(), "\"eraser\"");
    }
}
