use std::time::{Duration, Instant};

use inkroom_shared::{ClientMessage, Point, ServerMessage, Stroke};
use tracing::{debug, info, warn};

use crate::presence::{resolve_user, CursorThrottle};
use crate::rooms::{Outbox, ParticipantId, Room, RoomHandle, RoomRegistry};
use crate::state::{now_millis, AppState, MAX_ID_LEN, MAX_POINTS_PER_STROKE};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Audience {
    Others,
    /// The rest of the room plus the sender. Undo/redo echo back to the
    /// sender as a protocol extension: with one shared stack it cannot know
    /// which operation it reverted.
    Everyone,
}

#[derive(Debug, PartialEq)]
pub struct Dispatch {
    pub messages: Vec<ServerMessage>,
    pub audience: Audience,
}

impl Dispatch {
    fn others(message: ServerMessage) -> Self {
        Self {
            messages: vec![message],
            audience: Audience::Others,
        }
    }

    fn everyone(message: ServerMessage) -> Self {
        Self {
            messages: vec![message],
            audience: Audience::Everyone,
        }
    }
}

pub struct Connection {
    pub participant: ParticipantId,
    outbox: Outbox,
    cursor: CursorThrottle,
}

impl Connection {
    pub fn new(participant: ParticipantId, outbox: Outbox, cursor_interval: Duration) -> Self {
        Self {
            participant,
            outbox,
            cursor: CursorThrottle::new(cursor_interval),
        }
    }

    pub fn reply(&self, message: ServerMessage) {
        let _ = self.outbox.send(message);
    }
}

/// Applies a drawing message to the sender's room and decides what to fan
/// out. Must run under the room lock.
pub fn apply_client_message(
    room: &mut Room,
    sender: ParticipantId,
    message: ClientMessage,
) -> Option<Dispatch> {
    let actor = sender.to_string();
    match message {
        ClientMessage::StrokeStart { stroke } => {
            let stroke = sanitize_stroke(stroke, &actor)?;
            if stroke.is_committable() {
                room.state.add_stroke(stroke.clone(), &actor);
            }
            Some(Dispatch::others(ServerMessage::StrokeStart { stroke }))
        }
        ClientMessage::StrokePoint { stroke_id, point } => {
            if !valid_id(&stroke_id) {
                return None;
            }
            let point = normalize_point(point)?;
            Some(Dispatch::others(ServerMessage::StrokePoint {
                participant_id: actor,
                stroke_id,
                point,
            }))
        }
        ClientMessage::StrokeEnd { mut stroke } => {
            // An unstamped end keeps the timestamp its own start was given.
            if stroke.created_at <= 0 {
                if let Some(committed) = room
                    .state
                    .stroke(&stroke.id)
                    .filter(|committed| committed.author_id == actor)
                {
                    stroke.created_at = committed.created_at;
                }
            }
            let stroke = sanitize_stroke(stroke, &actor)?;
            if !stroke.is_committable() {
                return None;
            }
            // Already committed verbatim by its stroke:start.
            if room.state.stroke(&stroke.id) != Some(&stroke) {
                room.state.add_stroke(stroke.clone(), &actor);
            }
            Some(Dispatch::others(ServerMessage::StrokeEnd { stroke }))
        }
        ClientMessage::Erase { stroke_id } => {
            if !room.state.remove_stroke(&stroke_id, &actor) {
                return None;
            }
            Some(Dispatch::others(ServerMessage::StrokeRemoved {
                stroke_id,
                participant_id: actor,
            }))
        }
        ClientMessage::Undo => {
            let operation = room.state.undo(&actor)?;
            Some(Dispatch::everyone(ServerMessage::Undo { operation }))
        }
        ClientMessage::Redo => {
            let operation = room.state.redo(&actor)?;
            Some(Dispatch::everyone(ServerMessage::Redo { operation }))
        }
        ClientMessage::Clear => {
            room.state.clear(&actor);
            Some(Dispatch::others(ServerMessage::Clear {
                participant_id: actor,
            }))
        }
        // Membership and presence go through the registry, not the room state.
        ClientMessage::Join { .. } | ClientMessage::Leave | ClientMessage::CursorMove { .. } => {
            None
        }
    }
}

pub fn deliver(room: &mut Room, sender: ParticipantId, dispatch: Dispatch) {
    for message in dispatch.messages {
        match dispatch.audience {
            Audience::Others => room.broadcast_except(sender, message),
            Audience::Everyone => room.broadcast_all(message),
        }
    }
}

pub async fn handle_client_message(
    state: &AppState,
    connection: &mut Connection,
    message: ClientMessage,
) {
    let participant = connection.participant;
    match message {
        ClientMessage::Join {
            room_id,
            color,
            display_name,
        } => join_room(state, connection, room_id, color, display_name).await,
        ClientMessage::Leave => leave_room(&state.registry, participant).await,
        ClientMessage::CursorMove { point } => {
            let Some(point) = normalize_point(point) else {
                return;
            };
            if !connection.cursor.allow(Instant::now()) {
                return;
            }
            if let Some(room) = state.registry.room_of(participant).await {
                room.lock().await.broadcast_except(
                    participant,
                    ServerMessage::CursorMove {
                        participant_id: participant.to_string(),
                        point,
                    },
                );
            }
        }
        message => {
            let Some(room) = state.registry.room_of(participant).await else {
                connection.reply(ServerMessage::Error {
                    message: "join a room first".to_string(),
                });
                return;
            };
            let mut room = room.lock().await;
            if let Some(dispatch) = apply_client_message(&mut room, participant, message) {
                deliver(&mut room, participant, dispatch);
            }
        }
    }
}

async fn join_room(
    state: &AppState,
    connection: &Connection,
    room_id: String,
    color: Option<String>,
    display_name: Option<String>,
) {
    let participant = connection.participant;
    if !valid_id(&room_id) {
        connection.reply(ServerMessage::Error {
            message: format!("invalid room id {room_id:?}"),
        });
        return;
    }
    let user = resolve_user(participant, color, display_name);
    let joined = state
        .registry
        .join(participant, &room_id, user.color, user.display_name)
        .await;
    if let Some(vacated) = joined.vacated {
        announce_departure(&vacated, participant).await;
    }

    // Attaching and snapshotting under one lock: the joiner sees every
    // committed operation exactly once, either in the snapshot or as an event.
    let mut room = joined.room.lock().await;
    room.attach(participant, connection.outbox.clone());
    let users = room.users();
    room.send_to(
        participant,
        ServerMessage::Users {
            users: users.clone(),
        },
    );
    room.broadcast_except(participant, ServerMessage::Users { users });
    let strokes = room.state.snapshot();
    info!(
        room_id = %room_id,
        participant_id = %participant,
        strokes = strokes.len(),
        created_room = joined.created,
        "participant joined"
    );
    room.send_to(participant, ServerMessage::FullState { strokes });
}

/// Removes the participant from its room and tells whoever remains.
pub async fn leave_room(registry: &RoomRegistry, participant: ParticipantId) {
    let Some(room) = registry.leave(participant).await else {
        debug!(participant_id = %participant, "left with no remaining peers to notify");
        return;
    };
    announce_departure(&room, participant).await;
}

async fn announce_departure(room: &RoomHandle, participant: ParticipantId) {
    let mut room = room.lock().await;
    info!(room_id = %room.id(), participant_id = %participant, "participant left");
    room.broadcast_all(ServerMessage::UserLeft {
        participant_id: participant.to_string(),
    });
    let users = room.users();
    room.broadcast_all(ServerMessage::Users { users });
}

/// Evicts strokes older than `max_age` in every room. Rooms that lost
/// strokes get a fresh full state so their views converge again.
pub async fn evict_expired(registry: &RoomRegistry, max_age: Duration) -> usize {
    let now = now_millis();
    let mut total = 0;
    for handle in registry.rooms().await {
        let mut room = handle.lock().await;
        let removed = room.state.evict_older_than(max_age, now);
        if removed > 0 {
            debug!(room_id = %room.id(), removed, "evicted expired strokes");
            let strokes = room.state.snapshot();
            room.broadcast_all(ServerMessage::FullState { strokes });
        }
        total += removed;
    }
    if total > 0 {
        info!(removed = total, "stroke eviction pass finished");
    }
    total
}

fn valid_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_ID_LEN
}

fn normalize_point(point: Point) -> Option<Point> {
    if !point.is_finite() {
        return None;
    }
    Some(point)
}

fn sanitize_color(mut color: String) -> String {
    if color.is_empty() {
        return "#1f1f1f".to_string();
    }
    if color.len() > 32 {
        let mut end = 32;
        while !color.is_char_boundary(end) {
            end -= 1;
        }
        color.truncate(end);
    }
    color
}

fn sanitize_width(width: f64) -> f64 {
    let width = if width.is_finite() { width } else { 6.0 };
    width.clamp(1.0, 60.0)
}

fn sanitize_stroke(mut stroke: Stroke, author_id: &str) -> Option<Stroke> {
    if !valid_id(&stroke.id) {
        warn!(author_id, "dropping stroke with invalid id");
        return None;
    }
    stroke.author_id = author_id.to_string();
    stroke.color = sanitize_color(stroke.color);
    stroke.width = sanitize_width(stroke.width);
    stroke.points = stroke
        .points
        .into_iter()
        .filter_map(normalize_point)
        .take(MAX_POINTS_PER_STROKE)
        .collect();
    if stroke.points.is_empty() {
        return None;
    }
    if stroke.created_at <= 0 {
        stroke.created_at = now_millis();
    }
    Some(stroke)
}
