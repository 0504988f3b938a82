//! The connection registry. One task owns the connection and room maps and is
//! their only mutator; every other call site enqueues a [`HubCommand`] through
//! the intake channel, so membership changes are linearized without locks on
//! the fan-out path.

use std::collections::{HashMap, HashSet};

use axum::extract::ws::Utf8Bytes;
use protocol::{CHANNEL_BUFFER_SIZE, Envelope};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

pub type ConnectionId = Uuid;

/// The hub's lookup view of one live connection. The outbound sender is the
/// only clone outside the connection's write loop; dropping it on eviction or
/// unregistration closes the loop's queue.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub player_id: String,
    pub room_id: Option<String>,
    pub outbound: mpsc::Sender<Utf8Bytes>,
}

/// A diagnostic view of one room, for the management listing.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub room_id: String,
    pub members: usize,
}

enum HubCommand {
    Register(ConnectionHandle),
    Unregister(ConnectionId),
    Broadcast(Envelope),
    JoinRoom { id: ConnectionId, room: String },
    LeaveRoom { id: ConnectionId, room: String },
    Snapshot(oneshot::Sender<Vec<RoomSnapshot>>),
    Shutdown,
}

/// Cloneable handle onto the hub task.
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::Sender<HubCommand>,
}

impl Hub {
    /// Spawns the control loop and returns the handle to it.
    pub fn spawn() -> Hub {
        let (commands, intake) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        tokio::spawn(run(intake));
        Hub { commands }
    }

    pub async fn register(&self, handle: ConnectionHandle) {
        self.send(HubCommand::Register(handle)).await;
    }

    /// Removes a connection and its room membership. Unknown ids are a no-op.
    pub async fn unregister(&self, id: ConnectionId) {
        self.send(HubCommand::Unregister(id)).await;
    }

    /// Fans a message out to its room, or to every connection when it carries
    /// no room id. Best-effort: members that cannot keep up are evicted.
    pub async fn broadcast(&self, message: Envelope) {
        self.send(HubCommand::Broadcast(message)).await;
    }

    pub async fn join_room(&self, id: ConnectionId, room: String) {
        self.send(HubCommand::JoinRoom { id, room }).await;
    }

    pub async fn leave_room(&self, id: ConnectionId, room: String) {
        self.send(HubCommand::LeaveRoom { id, room }).await;
    }

    /// Room listing for the management endpoint.
    pub async fn snapshot(&self) -> Vec<RoomSnapshot> {
        let (reply, response) = oneshot::channel();
        self.send(HubCommand::Snapshot(reply)).await;
        response.await.unwrap_or_default()
    }

    /// Releases every connection and stops the control loop.
    pub async fn shutdown(&self) {
        self.send(HubCommand::Shutdown).await;
    }

    async fn send(&self, command: HubCommand) {
        if self.commands.send(command).await.is_err() {
            tracing::debug!("hub control loop is gone, command dropped");
        }
    }
}

#[derive(Default)]
struct HubState {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

async fn run(mut intake: mpsc::Receiver<HubCommand>) {
    let mut state = HubState::default();
    while let Some(command) = intake.recv().await {
        match command {
            HubCommand::Register(handle) => {
                if let Some(room) = &handle.room_id {
                    state.rooms.entry(room.clone()).or_default().insert(handle.id);
                }
                tracing::info!(connection = %handle.id, player = handle.player_id, "connection registered");
                state.connections.insert(handle.id, handle);
            }
            HubCommand::Unregister(id) => {
                if remove_connection(&mut state, id) {
                    tracing::info!(connection = %id, "connection unregistered");
                }
            }
            HubCommand::Broadcast(message) => broadcast(&mut state, &message),
            HubCommand::JoinRoom { id, room } => join_room(&mut state, id, room),
            HubCommand::LeaveRoom { id, room } => leave_room(&mut state, id, &room),
            HubCommand::Snapshot(reply) => {
                let _ = reply.send(snapshot(&state));
            }
            HubCommand::Shutdown => {
                tracing::info!(connections = state.connections.len(), "hub shutting down");
                // Dropping the handles closes every outbound queue; the write
                // loops drain what is already buffered and exit.
                state.connections.clear();
                state.rooms.clear();
                break;
            }
        }
    }
}

fn broadcast(state: &mut HubState, message: &Envelope) {
    let text: Utf8Bytes = match serde_json::to_string(message) {
        Ok(raw) => raw.into(),
        Err(err) => {
            tracing::error!(?err, "failed to encode broadcast");
            return;
        }
    };

    let targets: Vec<ConnectionId> = match &message.room_id {
        // A missing room is a silent drop, not an error.
        Some(room) => match state.rooms.get(room) {
            Some(members) => members.iter().copied().collect(),
            None => return,
        },
        None => state.connections.keys().copied().collect(),
    };

    for id in targets {
        let Some(connection) = state.connections.get(&id) else {
            continue;
        };
        // Non-blocking delivery: a full queue flags a slow consumer, which is
        // dropped so the remaining members still get the message.
        if connection.outbound.try_send(text.clone()).is_err() {
            tracing::warn!(connection = %id, "evicting slow consumer");
            remove_connection(state, id);
        }
    }
}

/// Removes the connection from both maps, scoped to its own room only.
/// Returns false for unknown ids.
fn remove_connection(state: &mut HubState, id: ConnectionId) -> bool {
    let Some(connection) = state.connections.remove(&id) else {
        return false;
    };
    if let Some(room) = &connection.room_id {
        drop_member(&mut state.rooms, room, id);
    }
    true
}

fn join_room(state: &mut HubState, id: ConnectionId, room: String) {
    let Some(previous) = state.connections.get(&id).map(|c| c.room_id.clone()) else {
        return;
    };
    if previous.as_deref() == Some(room.as_str()) {
        return;
    }
    if let Some(old) = previous {
        drop_member(&mut state.rooms, &old, id);
    }
    if let Some(connection) = state.connections.get_mut(&id) {
        connection.room_id = Some(room.clone());
    }
    state.rooms.entry(room).or_default().insert(id);
}

fn leave_room(state: &mut HubState, id: ConnectionId, room: &str) {
    let Some(connection) = state.connections.get_mut(&id) else {
        return;
    };
    if connection.room_id.as_deref() == Some(room) {
        connection.room_id = None;
        drop_member(&mut state.rooms, room, id);
    }
}

/// Rooms exist only while non-empty.
fn drop_member(rooms: &mut HashMap<String, HashSet<ConnectionId>>, room: &str, id: ConnectionId) {
    if let Some(members) = rooms.get_mut(room) {
        members.remove(&id);
        if members.is_empty() {
            rooms.remove(room);
        }
    }
}

fn snapshot(state: &HubState) -> Vec<RoomSnapshot> {
    let mut rooms: Vec<RoomSnapshot> = state
        .rooms
        .iter()
        .map(|(room_id, members)| RoomSnapshot {
            room_id: room_id.clone(),
            members: members.len(),
        })
        .collect();
    rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));
    rooms
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::MessageKind;
    use serde_json::Value;
    use tokio::time::{Duration, timeout};

    fn envelope(room: Option<&str>) -> Envelope {
        Envelope {
            kind: MessageKind::Other("ping".into()),
            payload: Value::Null,
            room_id: room.map(str::to_string),
            sender_id: Some("test".into()),
        }
    }

    /// Registers a connection with the given queue capacity; returns the id,
    /// the receiver end of its queue and a sender clone for pre-filling.
    async fn connect(
        hub: &Hub,
        room: Option<&str>,
        capacity: usize,
    ) -> (ConnectionId, mpsc::Receiver<Utf8Bytes>, mpsc::Sender<Utf8Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        let id = Uuid::now_v7();
        hub.register(ConnectionHandle {
            id,
            player_id: format!("player-{id}"),
            room_id: room.map(str::to_string),
            outbound: tx.clone(),
        })
        .await;
        (id, rx, tx)
    }

    async fn expect_message(rx: &mut mpsc::Receiver<Utf8Bytes>) -> Utf8Bytes {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for broadcast")
            .expect("queue closed unexpectedly")
    }

    #[tokio::test]
    async fn room_broadcast_reaches_only_that_room() {
        let hub = Hub::spawn();
        let (_a, mut rx_a, _) = connect(&hub, Some("alpha"), 8).await;
        let (_b, mut rx_b, _) = connect(&hub, Some("alpha"), 8).await;
        let (_c, mut rx_c, _) = connect(&hub, Some("beta"), 8).await;

        hub.broadcast(envelope(Some("alpha"))).await;

        expect_message(&mut rx_a).await;
        expect_message(&mut rx_b).await;
        assert!(
            timeout(Duration::from_millis(100), rx_c.recv()).await.is_err(),
            "other room must not receive the message"
        );
    }

    #[tokio::test]
    async fn global_broadcast_reaches_everyone() {
        let hub = Hub::spawn();
        let (_a, mut rx_a, _) = connect(&hub, Some("alpha"), 8).await;
        let (_b, mut rx_b, _) = connect(&hub, None, 8).await;

        hub.broadcast(envelope(None)).await;

        expect_message(&mut rx_a).await;
        expect_message(&mut rx_b).await;
    }

    #[tokio::test]
    async fn slow_consumer_is_evicted_and_others_still_delivered() {
        let hub = Hub::spawn();
        let (slow, _slow_rx, slow_tx) = connect(&hub, Some("alpha"), 1).await;
        let (_b, mut rx_b, _) = connect(&hub, Some("alpha"), 8).await;
        let (_c, mut rx_c, _) = connect(&hub, Some("alpha"), 8).await;

        // Fill the slow member's queue so the next try_send fails.
        slow_tx.try_send("stuck".into()).unwrap();

        hub.broadcast(envelope(Some("alpha"))).await;

        expect_message(&mut rx_b).await;
        expect_message(&mut rx_c).await;

        let rooms = hub.snapshot().await;
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].members, 2);

        // The evicted connection no longer receives anything.
        hub.broadcast(envelope(Some("alpha"))).await;
        expect_message(&mut rx_b).await;
        drop(slow_tx);
        let _ = slow;
    }

    #[tokio::test]
    async fn no_room_is_ever_left_empty() {
        let hub = Hub::spawn();
        let (a, _rx_a, _ta) = connect(&hub, Some("alpha"), 8).await;
        let (b, _rx_b, _tb) = connect(&hub, Some("alpha"), 8).await;

        hub.unregister(a).await;
        let rooms = hub.snapshot().await;
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].members, 1);

        hub.unregister(b).await;
        assert!(hub.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn unregistering_an_unknown_id_is_a_noop() {
        let hub = Hub::spawn();
        let (_a, _rx, _tx) = connect(&hub, Some("alpha"), 8).await;
        hub.unregister(Uuid::now_v7()).await;
        let rooms = hub.snapshot().await;
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].members, 1);
    }

    #[tokio::test]
    async fn broadcast_to_absent_room_is_silently_dropped() {
        let hub = Hub::spawn();
        let (_a, mut rx_a, _) = connect(&hub, Some("alpha"), 8).await;
        hub.broadcast(envelope(Some("ghost"))).await;
        assert!(timeout(Duration::from_millis(100), rx_a.recv()).await.is_err());
    }

    #[tokio::test]
    async fn join_room_moves_the_connection_between_rooms() {
        let hub = Hub::spawn();
        let (a, mut rx_a, _) = connect(&hub, Some("alpha"), 8).await;
        let (_b, _rx_b, _tb) = connect(&hub, Some("alpha"), 8).await;

        hub.join_room(a, "beta".into()).await;

        let rooms = hub.snapshot().await;
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].room_id, "alpha");
        assert_eq!(rooms[0].members, 1);
        assert_eq!(rooms[1].room_id, "beta");
        assert_eq!(rooms[1].members, 1);

        hub.broadcast(envelope(Some("beta"))).await;
        expect_message(&mut rx_a).await;
    }

    #[tokio::test]
    async fn leave_room_deletes_the_room_when_it_empties() {
        let hub = Hub::spawn();
        let (a, _rx_a, _ta) = connect(&hub, Some("alpha"), 8).await;
        hub.leave_room(a, "alpha".into()).await;
        assert!(hub.snapshot().await.is_empty());

        // Leaving a room the connection is not in changes nothing.
        hub.join_room(a, "beta".into()).await;
        hub.leave_room(a, "alpha".into()).await;
        let rooms = hub.snapshot().await;
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].room_id, "beta");
    }

    #[tokio::test]
    async fn shutdown_closes_every_outbound_queue() {
        let hub = Hub::spawn();
        let (_a, mut rx_a, _) = connect(&hub, Some("alpha"), 8).await;
        hub.shutdown().await;
        let closed = timeout(Duration::from_secs(1), rx_a.recv()).await;
        assert_eq!(closed.expect("timed out"), None);
    }
}
