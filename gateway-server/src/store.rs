//! Key-scoped storage for game state: ephemeral per-room/per-player entries
//! with a fixed expiry, and durable player/session/score records with a
//! descending high-score list. In-process behind one handle; protocol-path
//! callers treat every miss as recoverable.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use protocol::model::{Card, EnemyWave, Tower};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// How long ephemeral game state lives without being rewritten.
const EPHEMERAL_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// How many high scores are retained.
const HIGH_SCORE_LIMIT: usize = 10;

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("no entry for {0}")]
    NotFound(String),
}

/// A player's in-room state as stored per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub player_id: String,
    pub username: String,
    pub health: u32,
    pub gold: u32,
    pub score: i64,
    pub cards: Vec<Card>,
    pub towers: Vec<Tower>,
    pub is_ready: bool,
    pub is_active: bool,
    pub last_seen: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

/// Snapshot of a room's whole game.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub session_id: String,
    pub room_id: String,
    pub round: u32,
    pub phase: String,
    pub players: HashMap<String, PlayerState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_wave: Option<EnemyWave>,
    pub started_at: i64,
    pub updated_at: i64,
    pub status: SessionStatus,
}

/// Durable player record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub id: String,
    pub username: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Durable game session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSession {
    pub id: String,
    pub room_id: String,
    pub started_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<i64>,
    pub status: SessionStatus,
}

/// One retained high score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    pub player_name: String,
    pub score: i64,
    pub created_at: i64,
}

struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    fn fresh(value: T) -> Self {
        Expiring { value, expires_at: Instant::now() + EPHEMERAL_TTL }
    }

    fn live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

#[derive(Default)]
struct Ephemeral {
    game_states: HashMap<String, Expiring<GameState>>,
    hands: HashMap<(String, String), Expiring<Vec<Card>>>,
    towers: HashMap<(String, String), Expiring<Vec<Tower>>>,
    waves: HashMap<String, Expiring<EnemyWave>>,
    members: HashMap<String, Expiring<HashSet<String>>>,
    ready: HashMap<String, Expiring<HashSet<String>>>,
}

#[derive(Default)]
struct Durable {
    players: HashMap<String, PlayerRecord>,
    sessions: HashMap<String, GameSession>,
    scores: HashMap<(String, String), i64>,
    high_scores: Vec<ScoreEntry>,
}

/// The store handle shared across connections and HTTP handlers.
#[derive(Default)]
pub struct GameStore {
    ephemeral: RwLock<Ephemeral>,
    durable: RwLock<Durable>,
}

fn get_live<K, T>(map: &mut HashMap<K, Expiring<T>>, key: &K, describe: impl Fn() -> String) -> Result<T, StoreError>
where
    K: std::hash::Hash + Eq + Clone,
    T: Clone,
{
    match map.get(key) {
        Some(entry) if entry.live() => Ok(entry.value.clone()),
        Some(_) => {
            map.remove(key);
            Err(StoreError::NotFound(describe()))
        }
        None => Err(StoreError::NotFound(describe())),
    }
}

impl GameStore {
    pub fn new() -> Self {
        GameStore::default()
    }

    // Room game state.

    pub async fn set_game_state(&self, room: &str, state: GameState) {
        let mut ephemeral = self.ephemeral.write().await;
        ephemeral.game_states.insert(room.to_string(), Expiring::fresh(state));
    }

    pub async fn get_game_state(&self, room: &str) -> Result<GameState, StoreError> {
        let mut ephemeral = self.ephemeral.write().await;
        get_live(&mut ephemeral.game_states, &room.to_string(), || format!("game:{room}"))
    }

    pub async fn delete_game_state(&self, room: &str) {
        let mut ephemeral = self.ephemeral.write().await;
        ephemeral.game_states.remove(room);
    }

    // Per-player hand and towers.

    pub async fn set_player_hand(&self, room: &str, player: &str, hand: Vec<Card>) {
        let mut ephemeral = self.ephemeral.write().await;
        ephemeral
            .hands
            .insert((room.to_string(), player.to_string()), Expiring::fresh(hand));
    }

    pub async fn get_player_hand(&self, room: &str, player: &str) -> Result<Vec<Card>, StoreError> {
        let mut ephemeral = self.ephemeral.write().await;
        let key = (room.to_string(), player.to_string());
        get_live(&mut ephemeral.hands, &key, || format!("cards:{room}:{player}"))
    }

    pub async fn set_towers(&self, room: &str, player: &str, towers: Vec<Tower>) {
        let mut ephemeral = self.ephemeral.write().await;
        ephemeral
            .towers
            .insert((room.to_string(), player.to_string()), Expiring::fresh(towers));
    }

    pub async fn get_towers(&self, room: &str, player: &str) -> Result<Vec<Tower>, StoreError> {
        let mut ephemeral = self.ephemeral.write().await;
        let key = (room.to_string(), player.to_string());
        get_live(&mut ephemeral.towers, &key, || format!("towers:{room}:{player}"))
    }

    // Current wave.

    pub async fn set_current_wave(&self, room: &str, wave: EnemyWave) {
        let mut ephemeral = self.ephemeral.write().await;
        ephemeral.waves.insert(room.to_string(), Expiring::fresh(wave));
    }

    pub async fn get_current_wave(&self, room: &str) -> Result<EnemyWave, StoreError> {
        let mut ephemeral = self.ephemeral.write().await;
        get_live(&mut ephemeral.waves, &room.to_string(), || format!("wave:{room}"))
    }

    // Room membership and readiness.

    pub async fn add_room_member(&self, room: &str, player: &str) {
        let mut ephemeral = self.ephemeral.write().await;
        let entry = ephemeral
            .members
            .entry(room.to_string())
            .or_insert_with(|| Expiring::fresh(HashSet::new()));
        entry.value.insert(player.to_string());
        entry.expires_at = Instant::now() + EPHEMERAL_TTL;
    }

    pub async fn remove_room_member(&self, room: &str, player: &str) {
        let mut ephemeral = self.ephemeral.write().await;
        let emptied = match ephemeral.members.get_mut(room) {
            Some(entry) => {
                entry.value.remove(player);
                entry.value.is_empty()
            }
            None => false,
        };
        if emptied {
            ephemeral.members.remove(room);
        }
        if let Some(entry) = ephemeral.ready.get_mut(room) {
            entry.value.remove(player);
        }
    }

    pub async fn room_members(&self, room: &str) -> Vec<String> {
        let ephemeral = self.ephemeral.read().await;
        match ephemeral.members.get(room) {
            Some(entry) if entry.live() => entry.value.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub async fn mark_ready(&self, room: &str, player: &str) {
        let mut ephemeral = self.ephemeral.write().await;
        let entry = ephemeral
            .ready
            .entry(room.to_string())
            .or_insert_with(|| Expiring::fresh(HashSet::new()));
        entry.value.insert(player.to_string());
        entry.expires_at = Instant::now() + EPHEMERAL_TTL;
    }

    pub async fn clear_ready(&self, room: &str) {
        let mut ephemeral = self.ephemeral.write().await;
        ephemeral.ready.remove(room);
    }

    /// All current members are flagged ready, and there is at least one.
    pub async fn is_room_ready(&self, room: &str) -> bool {
        let ephemeral = self.ephemeral.read().await;
        let members = match ephemeral.members.get(room) {
            Some(entry) if entry.live() => &entry.value,
            _ => return false,
        };
        let ready = match ephemeral.ready.get(room) {
            Some(entry) if entry.live() => &entry.value,
            _ => return false,
        };
        !members.is_empty() && members.is_subset(ready)
    }

    // Durable records.

    pub async fn upsert_player(&self, player: PlayerRecord) {
        let mut durable = self.durable.write().await;
        durable.players.insert(player.id.clone(), player);
    }

    pub async fn player(&self, id: &str) -> Result<PlayerRecord, StoreError> {
        let durable = self.durable.read().await;
        durable
            .players
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("player:{id}")))
    }

    pub async fn upsert_session(&self, session: GameSession) {
        let mut durable = self.durable.write().await;
        durable.sessions.insert(session.id.clone(), session);
    }

    pub async fn session(&self, id: &str) -> Result<GameSession, StoreError> {
        let durable = self.durable.read().await;
        durable
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("session:{id}")))
    }

    pub async fn end_session(&self, id: &str, status: SessionStatus, ended_at: i64) -> Result<(), StoreError> {
        let mut durable = self.durable.write().await;
        let session = durable
            .sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("session:{id}")))?;
        session.status = status;
        session.ended_at = Some(ended_at);
        Ok(())
    }

    pub async fn record_score(&self, player: &str, session: &str, score: i64) {
        let mut durable = self.durable.write().await;
        durable
            .scores
            .insert((player.to_string(), session.to_string()), score);
    }

    pub async fn session_score(&self, player: &str, session: &str) -> Result<i64, StoreError> {
        let durable = self.durable.read().await;
        durable
            .scores
            .get(&(player.to_string(), session.to_string()))
            .copied()
            .ok_or_else(|| StoreError::NotFound(format!("score:{player}:{session}")))
    }

    /// Saves a score if it makes the top list; returns whether it did. The
    /// list is capped at [`HIGH_SCORE_LIMIT`] entries.
    pub async fn save_high_score(&self, name: &str, score: i64, created_at: i64) -> bool {
        let mut durable = self.durable.write().await;
        let qualifies = durable.high_scores.len() < HIGH_SCORE_LIMIT
            || durable
                .high_scores
                .iter()
                .map(|entry| entry.score)
                .min()
                .is_some_and(|lowest| score > lowest);
        if !qualifies {
            return false;
        }
        durable.high_scores.push(ScoreEntry {
            player_name: name.to_string(),
            score,
            created_at,
        });
        durable.high_scores.sort_by(|a, b| b.score.cmp(&a.score));
        durable.high_scores.truncate(HIGH_SCORE_LIMIT);
        true
    }

    /// The top scores, highest first.
    pub async fn high_scores(&self, limit: usize) -> Vec<ScoreEntry> {
        let durable = self.durable.read().await;
        durable.high_scores.iter().take(limit).cloned().collect()
    }

    /// Drops every expired ephemeral entry; returns how many were removed.
    /// Run periodically by the watchdog task.
    pub async fn purge_expired(&self) -> usize {
        let mut ephemeral = self.ephemeral.write().await;
        let before = ephemeral.game_states.len()
            + ephemeral.hands.len()
            + ephemeral.towers.len()
            + ephemeral.waves.len()
            + ephemeral.members.len()
            + ephemeral.ready.len();
        ephemeral.game_states.retain(|_, entry| entry.live());
        ephemeral.hands.retain(|_, entry| entry.live());
        ephemeral.towers.retain(|_, entry| entry.live());
        ephemeral.waves.retain(|_, entry| entry.live());
        ephemeral.members.retain(|_, entry| entry.live());
        ephemeral.ready.retain(|_, entry| entry.live());
        before
            - (ephemeral.game_states.len()
                + ephemeral.hands.len()
                + ephemeral.towers.len()
                + ephemeral.waves.len()
                + ephemeral.members.len()
                + ephemeral.ready.len())
    }
}
