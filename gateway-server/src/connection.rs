//! One actor per live socket: an inbound loop that feeds the protocol state
//! machine and an outbound loop that drains the bounded send queue. The hub
//! is signalled to unregister exactly once, whatever way the loops end.

use std::sync::Arc;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use protocol::{CHANNEL_BUFFER_SIZE, Envelope, MAX_FRAME_BYTES, MessageKind, WaveStartedPayload};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::AppState;
use crate::dispatch::{self, RoundState};
use crate::hub::{ConnectionHandle, ConnectionId, Hub};
use crate::store::GameStore;

/// Identity and room supplied on connection establishment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    #[serde(default)]
    pub player_id: String,
    #[serde(default)]
    pub room_id: Option<String>,
}

/// Upgrades the request to a websocket, capping inbound frames.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| connection(socket, params, state))
}

/// Drives a connection from registration to cleanup.
async fn connection(stream: WebSocket, params: ConnectParams, app: Arc<AppState>) {
    // By splitting, we can send and receive at the same time.
    let (socket_sender, socket_receiver) = stream.split();

    let id = Uuid::now_v7();
    let player_id = if params.player_id.is_empty() {
        id.to_string()
    } else {
        params.player_id
    };
    let room_id = params.room_id.filter(|room| !room.is_empty());
    tracing::info!(connection = %id, player = player_id, room = ?room_id, "socket upgraded");

    let (outbound_sender, outbound_receiver) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    app.hub
        .register(ConnectionHandle {
            id,
            player_id: player_id.clone(),
            room_id: room_id.clone(),
            outbound: outbound_sender,
        })
        .await;
    if let Some(room) = &room_id {
        app.store.add_room_member(room, &player_id).await;
    }

    let context = ConnectionContext {
        id,
        player_id: player_id.clone(),
        room_id: room_id.clone(),
        hub: app.hub.clone(),
        store: app.store.clone(),
    };
    let mut inbound_task = tokio::spawn(inbound_loop(socket_receiver, context));
    let mut outbound_task = tokio::spawn(outbound_loop(socket_sender, outbound_receiver, id));

    // If any one of the tasks runs to completion, we abort the other.
    let result = tokio::select! {
        inbound = &mut inbound_task => { outbound_task.abort(); inbound }
        outbound = &mut outbound_task => { inbound_task.abort(); outbound }
    };
    let reason = result.unwrap_or_else(|err| {
        tracing::error!(connection = %id, ?err, "connection task panicked");
        "internal task failure"
    });

    // Cleanup does not depend on why the loops ended.
    app.hub.unregister(id).await;
    if let Some(room) = &room_id {
        app.store.remove_room_member(room, &player_id).await;
    }
    tracing::info!(connection = %id, player = player_id, reason, "connection closed");
}

struct ConnectionContext {
    id: ConnectionId,
    player_id: String,
    room_id: Option<String>,
    hub: Hub,
    store: Arc<GameStore>,
}

/// Reads frames until the socket fails or closes. Malformed envelopes are
/// logged and skipped; every decoded one runs through the state machine and
/// its emissions go out via the hub's broadcast path.
async fn inbound_loop(mut receiver: SplitStream<WebSocket>, context: ConnectionContext) -> &'static str {
    let mut round = RoundState::new();

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(raw)) => {
                let mut envelope: Envelope = match serde_json::from_str(raw.as_str()) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        tracing::warn!(connection = %context.id, ?err, "discarding malformed envelope");
                        continue;
                    }
                };
                if envelope.sender_id.is_none() {
                    envelope.sender_id = Some(context.player_id.clone());
                }
                if envelope.room_id.is_none() {
                    envelope.room_id = context.room_id.clone();
                }

                let emissions = dispatch::handle_envelope(&mut round, envelope, &mut rand::rng());
                persist_round(&context, &round, &emissions).await;
                for emission in emissions {
                    context.hub.broadcast(emission).await;
                }
            }
            Ok(Message::Close(_)) => return "client closed connection",
            // Ping/pong is answered by the websocket layer; other frame kinds
            // are ignored.
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(connection = %context.id, ?err, "read failed");
                return "connection lost";
            }
        }
    }
    "connection lost"
}

/// Mirrors the round's hand and a freshly started wave into the store. Store
/// trouble is never fatal to the protocol path.
async fn persist_round(context: &ConnectionContext, round: &RoundState, emissions: &[Envelope]) {
    let Some(room) = &context.room_id else {
        return;
    };
    context
        .store
        .set_player_hand(room, &context.player_id, round.hand.clone())
        .await;
    for emission in emissions {
        if emission.kind == MessageKind::WaveStarted {
            match serde_json::from_value::<WaveStartedPayload>(emission.payload.clone()) {
                Ok(payload) => context.store.set_current_wave(room, payload.wave).await,
                Err(err) => tracing::warn!(?err, "wave emission did not round-trip to the store"),
            }
        }
    }
}

/// Writes queued messages to the socket until the queue closes (eviction or
/// shutdown) or a write fails.
async fn outbound_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Utf8Bytes>,
    id: ConnectionId,
) -> &'static str {
    while let Some(text) = outbound.recv().await {
        if let Err(err) = sender.send(Message::Text(text)).await {
            tracing::debug!(connection = %id, ?err, "write failed");
            return "connection lost";
        }
    }
    // Queue closed by the hub; say goodbye properly.
    let _ = sender.send(Message::Close(None)).await;
    "outbound queue closed"
}
