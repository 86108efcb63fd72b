use std::collections::HashMap;
use std::sync::Arc;

use inkroom_shared::{RoomStats, ServerMessage, Stroke, UserInfo};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::drawing::DrawingState;

pub type ParticipantId = Uuid;
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;
pub type RoomHandle = Arc<Mutex<Room>>;

struct Member {
    participant: ParticipantId,
    info: UserInfo,
}

/// One collaborative session: its members, their outbound channels and the
/// drawing state they share.
pub struct Room {
    id: String,
    members: Vec<Member>,
    peers: HashMap<ParticipantId, Outbox>,
    pub state: DrawingState,
}

impl Room {
    pub fn new(id: impl Into<String>, history_limit: usize) -> Self {
        Self {
            id: id.into(),
            members: Vec::new(),
            peers: HashMap::new(),
            state: DrawingState::new(history_limit),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Members in join order.
    pub fn users(&self) -> Vec<UserInfo> {
        self.members.iter().map(|member| member.info.clone()).collect()
    }

    pub fn has_user(&self, participant: ParticipantId) -> bool {
        self.members
            .iter()
            .any(|member| member.participant == participant)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn add_user(&mut self, participant: ParticipantId, info: UserInfo) -> bool {
        if self.has_user(participant) {
            return false;
        }
        self.members.push(Member { participant, info });
        true
    }

    fn remove_user(&mut self, participant: ParticipantId) -> bool {
        self.peers.remove(&participant);
        let before = self.members.len();
        self.members.retain(|member| member.participant != participant);
        before != self.members.len()
    }

    /// Registers the channel that delivers this room's events to a member.
    pub fn attach(&mut self, participant: ParticipantId, outbox: Outbox) {
        self.peers.insert(participant, outbox);
    }

    pub fn send_to(&mut self, participant: ParticipantId, message: ServerMessage) {
        let delivered = self
            .peers
            .get(&participant)
            .is_some_and(|tx| tx.send(message).is_ok());
        if !delivered {
            self.peers.remove(&participant);
        }
    }

    pub fn broadcast_except(&mut self, sender: ParticipantId, message: ServerMessage) {
        let mut stale = Vec::new();
        for (id, tx) in &self.peers {
            if *id == sender {
                continue;
            }
            if tx.send(message.clone()).is_err() {
                stale.push(*id);
            }
        }
        self.drop_stale(stale);
    }

    pub fn broadcast_all(&mut self, message: ServerMessage) {
        let mut stale = Vec::new();
        for (id, tx) in &self.peers {
            if tx.send(message.clone()).is_err() {
                stale.push(*id);
            }
        }
        self.drop_stale(stale);
    }

    fn drop_stale(&mut self, stale: Vec<ParticipantId>) {
        for id in stale {
            debug!(room_id = %self.id, participant_id = %id, "dropping closed peer channel");
            self.peers.remove(&id);
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct RoomSummary {
    pub room_id: String,
    pub users: usize,
    pub strokes: usize,
}

pub struct Joined {
    pub room: RoomHandle,
    pub created: bool,
    /// The room the participant was in before, if it still has members.
    pub vacated: Option<RoomHandle>,
}

#[derive(Default)]
struct Rooms {
    rooms: HashMap<String, RoomHandle>,
    memberships: HashMap<ParticipantId, String>,
}

impl Rooms {
    async fn detach(&mut self, participant: ParticipantId) -> Option<RoomHandle> {
        let room_id = self.memberships.remove(&participant)?;
        let handle = self.rooms.get(&room_id)?.clone();
        let now_empty = {
            let mut room = handle.lock().await;
            room.remove_user(participant);
            room.is_empty()
        };
        if now_empty {
            self.rooms.remove(&room_id);
            info!(room_id = %room_id, "room destroyed");
            None
        } else {
            Some(handle)
        }
    }
}

/// Owns every room of the process and the participant to room index.
///
/// Lock order is registry first, then a single room. Room locks are never
/// held while waiting for the registry.
pub struct RoomRegistry {
    inner: RwLock<Rooms>,
    history_limit: usize,
}

impl RoomRegistry {
    pub fn new(history_limit: usize) -> Self {
        Self {
            inner: RwLock::new(Rooms::default()),
            history_limit,
        }
    }

    /// Puts a participant into a room, creating the room on first use. A
    /// participant already in another room leaves it first.
    pub async fn join(
        &self,
        participant: ParticipantId,
        room_id: &str,
        color: String,
        display_name: String,
    ) -> Joined {
        let mut inner = self.inner.write().await;

        let switching = inner
            .memberships
            .get(&participant)
            .is_some_and(|current| current != room_id);
        let vacated = if switching {
            inner.detach(participant).await
        } else {
            None
        };

        let mut created = false;
        let handle = inner
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| {
                created = true;
                Arc::new(Mutex::new(Room::new(room_id, self.history_limit)))
            })
            .clone();
        if created {
            info!(room_id, "room created");
        }

        handle.lock().await.add_user(
            participant,
            UserInfo {
                id: participant.to_string(),
                color,
                display_name,
            },
        );
        inner
            .memberships
            .insert(participant, room_id.to_string());

        Joined {
            room: handle,
            created,
            vacated,
        }
    }

    /// Removes a participant from its room and destroys the room once empty.
    /// Returns the room if members remain in it.
    pub async fn leave(&self, participant: ParticipantId) -> Option<RoomHandle> {
        let mut inner = self.inner.write().await;
        inner.detach(participant).await
    }

    pub async fn current_room(&self, participant: ParticipantId) -> Option<String> {
        self.inner.read().await.memberships.get(&participant).cloned()
    }

    pub async fn room(&self, room_id: &str) -> Option<RoomHandle> {
        self.inner.read().await.rooms.get(room_id).cloned()
    }

    pub async fn room_of(&self, participant: ParticipantId) -> Option<RoomHandle> {
        let inner = self.inner.read().await;
        let room_id = inner.memberships.get(&participant)?;
        inner.rooms.get(room_id).cloned()
    }

    pub async fn room_users(&self, room_id: &str) -> Vec<UserInfo> {
        match self.room(room_id).await {
            Some(room) => room.lock().await.users(),
            None => Vec::new(),
        }
    }

    pub async fn all_strokes(&self, room_id: &str) -> Vec<Stroke> {
        match self.room(room_id).await {
            Some(room) => room.lock().await.state.snapshot(),
            None => Vec::new(),
        }
    }

    pub async fn stats(&self, room_id: &str) -> Option<RoomStats> {
        let room = self.room(room_id).await?;
        let stats = room.lock().await.state.stats();
        Some(stats)
    }

    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }

    pub async fn rooms(&self) -> Vec<RoomHandle> {
        self.inner.read().await.rooms.values().cloned().collect()
    }

    pub async fn room_summaries(&self) -> Vec<RoomSummary> {
        let mut summaries = Vec::new();
        for handle in self.rooms().await {
            let room = handle.lock().await;
            summaries.push(RoomSummary {
                room_id: room.id().to_string(),
                users: room.members.len(),
                strokes: room.state.len(),
            });
        }
        summaries.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkroom_shared::{Point, Tool};

    async fn join(registry: &RoomRegistry, participant: ParticipantId, room_id: &str) -> Joined {
        registry
            .join(participant, room_id, "#e63946".into(), "Guest".into())
            .await
    }

    fn stroke(id: &str) -> Stroke {
        Stroke {
            id: id.into(),
            author_id: String::new(),
            points: vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)],
            color: "#000000".into(),
            width: 2.0,
            tool: Tool::Brush,
            created_at: 1,
        }
    }

    #[tokio::test]
    async fn room_lifecycle_follows_membership() {
        let registry = RoomRegistry::new(1000);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        assert!(join(&registry, alice, "r1").await.created);
        assert!(!join(&registry, bob, "r1").await.created);
        assert_eq!(registry.room_users("r1").await.len(), 2);

        assert!(registry.leave(alice).await.is_some());
        assert_eq!(registry.room_users("r1").await.len(), 1);
        assert!(registry.stats("r1").await.is_some());

        assert!(registry.leave(bob).await.is_none());
        assert!(registry.stats("r1").await.is_none());
        assert!(registry.room_users("r1").await.is_empty());
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn joining_twice_does_not_duplicate() {
        let registry = RoomRegistry::new(1000);
        let alice = Uuid::new_v4();
        join(&registry, alice, "r1").await;
        join(&registry, alice, "r1").await;

        let users = registry.room_users("r1").await;
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, alice.to_string());
        assert_eq!(registry.current_room(alice).await.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn switching_rooms_leaves_the_old_one() {
        let registry = RoomRegistry::new(1000);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        join(&registry, alice, "r1").await;
        join(&registry, bob, "r1").await;

        let joined = join(&registry, alice, "r2").await;
        assert!(joined.vacated.is_some());
        assert_eq!(registry.room_users("r1").await.len(), 1);
        assert_eq!(registry.current_room(alice).await.as_deref(), Some("r2"));

        let joined = join(&registry, bob, "r2").await;
        assert!(joined.vacated.is_none());
        assert!(registry.room("r1").await.is_none());
    }

    #[tokio::test]
    async fn leave_is_idempotent() {
        let registry = RoomRegistry::new(1000);
        let stranger = Uuid::new_v4();
        assert!(registry.leave(stranger).await.is_none());
        assert!(registry.current_room(stranger).await.is_none());

        let alice = Uuid::new_v4();
        join(&registry, alice, "r1").await;
        registry.leave(alice).await;
        registry.leave(alice).await;
        assert!(registry.current_room(alice).await.is_none());
    }

    #[tokio::test]
    async fn unknown_rooms_read_as_empty() {
        let registry = RoomRegistry::new(1000);
        assert!(registry.all_strokes("missing").await.is_empty());
        assert!(registry.room_users("missing").await.is_empty());
        assert!(registry.stats("missing").await.is_none());
    }

    #[tokio::test]
    async fn rooms_keep_separate_state() {
        let registry = RoomRegistry::new(1000);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let room = join(&registry, alice, "r1").await.room;
        join(&registry, bob, "r2").await;

        room.lock().await.state.add_stroke(stroke("s1"), "alice");
        assert_eq!(registry.all_strokes("r1").await.len(), 1);
        assert!(registry.all_strokes("r2").await.is_empty());

        let summaries = registry.room_summaries().await;
        assert_eq!(
            summaries,
            vec![
                RoomSummary {
                    room_id: "r1".into(),
                    users: 1,
                    strokes: 1,
                },
                RoomSummary {
                    room_id: "r2".into(),
                    users: 1,
                    strokes: 0,
                },
            ]
        );
    }

    #[tokio::test]
    async fn broadcast_skips_sender_and_drops_closed_peers() {
        let mut room = Room::new("r1", 1000);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let carol = Uuid::new_v4();
        let (alice_tx, mut alice_rx) = mpsc::unbounded_channel();
        let (bob_tx, mut bob_rx) = mpsc::unbounded_channel();
        let (carol_tx, carol_rx) = mpsc::unbounded_channel();
        room.attach(alice, alice_tx);
        room.attach(bob, bob_tx);
        room.attach(carol, carol_tx);
        drop(carol_rx);

        room.broadcast_except(
            alice,
            ServerMessage::Clear {
                participant_id: alice.to_string(),
            },
        );
        assert!(alice_rx.try_recv().is_err());
        assert!(matches!(bob_rx.try_recv(), Ok(ServerMessage::Clear { .. })));
        assert!(!room.peers.contains_key(&carol));
    }
}
