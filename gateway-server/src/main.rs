mod connection;
mod dispatch;
mod hub;
mod store;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::hub::Hub;
use crate::store::{GameStore, ScoreEntry};

/// Everything the handlers share: the hub task handle and the game store.
pub struct AppState {
    pub hub: Hub,
    pub store: Arc<GameStore>,
}

#[tokio::main]
/// Activates error tracing, spawns a watchdog task that purges expired store
/// entries, then sets up the routing system to serve the websocket endpoint
/// and the management pages. The bind address comes from GATEWAY_ADDR.
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=trace", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    let app_state = Arc::new(AppState {
        hub: Hub::spawn(),
        store: Arc::new(GameStore::new()),
    });

    let watchdog_store = app_state.store.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(1200)); // 20 Min
        loop {
            interval.tick().await;
            let purged = watchdog_store.purge_expired().await;
            if purged > 0 {
                tracing::info!(purged, "Dropped expired game state.");
            }
        }
    });

    let app = Router::new()
        .route("/ws", get(connection::websocket_handler))
        .route("/health", get(health_handler))
        .route("/rooms", get(rooms_handler))
        .route("/api/highscores", get(highscores_handler).post(save_highscore_handler))
        .with_state(app_state.clone());

    let address = std::env::var("GATEWAY_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&address).await.unwrap();
    tracing::info!(address, "Gateway listening.");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    // Closing the hub drops every outbound sender, which lets the per
    // connection write loops run their close handshake before we exit.
    app_state.hub.shutdown().await;
    tokio::time::sleep(tokio::time::Duration::from_millis(250)).await;
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
    tracing::info!("Shutdown requested.");
}

async fn health_handler() -> &'static str {
    "ok"
}

/// Generates a list with the current rooms and the amount of connections in
/// each. This is a plain-text diagnostic page.
async fn rooms_handler(State(state): State<Arc<AppState>>) -> String {
    state
        .hub
        .snapshot()
        .await
        .iter()
        .map(|room| format!("Room: {:<30}  Connections: {:03}", room.room_id, room.members))
        .collect::<Vec<_>>()
        .join("\n")
}

async fn highscores_handler(State(state): State<Arc<AppState>>) -> Json<Vec<ScoreEntry>> {
    Json(state.store.high_scores(10).await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveScoreRequest {
    player_name: String,
    score: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveScoreResponse {
    is_high_score: bool,
}

async fn save_highscore_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SaveScoreRequest>,
) -> (StatusCode, Json<SaveScoreResponse>) {
    let is_high_score = state
        .store
        .save_high_score(&request.player_name, request.score, game_rules::unix_millis())
        .await;
    tracing::info!(
        player = request.player_name,
        score = request.score,
        is_high_score,
        "Score submitted."
    );
    (StatusCode::CREATED, Json(SaveScoreResponse { is_high_score }))
}
