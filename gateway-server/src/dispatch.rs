//! The per-connection protocol state machine. It interprets one inbound
//! envelope against the connection's round state and produces the envelopes
//! to broadcast; it never touches a socket or the hub itself. Only the owning
//! inbound loop calls into here, so each round state has a single writer.

use protocol::model::{Card, TowerKind};
use protocol::{
    CardsDealtPayload, Envelope, HAND_SIZE, HoldCardPayload, MAX_DRAWS, MessageKind,
    PlaceTowerPayload, SERVER_SENDER, TowerPayload, UpgradeTowerPayload, WaveStartedPayload,
};
use rand::Rng;
use serde::Serialize;
use serde_json::Value;

use game_rules::{deck, poker, towers, waves};

/// A connection's progress through the card-draw mini-game and combat.
#[derive(Debug, Default)]
pub struct RoundState {
    /// Draws taken this round, 0 through [`MAX_DRAWS`].
    pub draw_count: u8,
    /// The current 5-card hand, or empty before the first deal.
    pub hand: Vec<Card>,
    /// The undealt remainder of the round's deck.
    pub deck: Vec<Card>,
    /// Monotonically increasing combat wave level.
    pub wave_level: u32,
}

impl RoundState {
    pub fn new() -> Self {
        RoundState::default()
    }
}

/// Applies one inbound envelope to the round state and returns the envelopes
/// to broadcast. State mutation always completes before an emission is built.
pub fn handle_envelope(
    state: &mut RoundState,
    envelope: Envelope,
    rng: &mut impl Rng,
) -> Vec<Envelope> {
    match envelope.kind {
        MessageKind::DealCards => vec![deal(state, envelope.room_id, rng)],
        MessageKind::HoldHand => {
            // Skip straight to the final draw by entering the internal deal
            // transition, the same path plain deals take.
            state.draw_count = MAX_DRAWS - 1;
            vec![deal(state, envelope.room_id, rng)]
        }
        MessageKind::HoldCard => set_held(state, envelope, true),
        MessageKind::DiscardCard => set_held(state, envelope, false),
        MessageKind::StartWave => vec![start_wave(state, envelope.room_id, rng)],
        MessageKind::PlaceTower => place_tower(&envelope),
        MessageKind::UpgradeTower => upgrade_tower(&envelope),
        // Everything else, including server-emitted kinds echoed back by a
        // client, is forwarded to the room unmodified.
        MessageKind::CardsDealt
        | MessageKind::WaveStarted
        | MessageKind::TowerPlaced
        | MessageKind::TowerUpgraded
        | MessageKind::Other(_) => vec![envelope],
    }
}

/// The deal transition shared by `deal_cards` and `hold_hand`. A round past
/// its last draw resets first; a fresh round draws a new shuffled deck, a
/// running one keeps held cards and redraws the rest from the stored deck.
fn deal(state: &mut RoundState, room_id: Option<String>, rng: &mut impl Rng) -> Envelope {
    if state.draw_count >= MAX_DRAWS {
        state.draw_count = 0;
        state.hand.clear();
        state.deck.clear();
    }

    if state.draw_count == 0 {
        let (hand, rest) = deck::deal(deck::new_shuffled_deck(rng), HAND_SIZE);
        state.hand = hand;
        state.deck = rest;
    } else {
        let (mut kept, discarded): (Vec<Card>, Vec<Card>) =
            state.hand.drain(..).partition(|card| card.held);
        let (drawn, rest) = deck::deal(std::mem::take(&mut state.deck), discarded.len());
        kept.extend(drawn);
        state.hand = kept;
        state.deck = rest;
    }
    state.draw_count += 1;

    let hand_rank = poker::evaluate_hand(&state.hand);
    let gold_earned =
        (state.draw_count >= MAX_DRAWS).then(|| poker::gold_for_hand(&hand_rank));
    let payload = CardsDealtPayload {
        cards: state.hand.clone(),
        hand_rank,
        draw_count: state.draw_count,
        max_draws: MAX_DRAWS,
        gold_earned,
    };
    server_envelope(MessageKind::CardsDealt, &payload, room_id)
}

/// Flags a card in the hand as held or not; unknown card ids are ignored.
/// The client's envelope is mirrored to the room so everyone sees the toggle.
fn set_held(state: &mut RoundState, envelope: Envelope, held: bool) -> Vec<Envelope> {
    let payload: HoldCardPayload = match serde_json::from_value(envelope.payload.clone()) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!(?err, "malformed hold/discard payload, dropping");
            return Vec::new();
        }
    };
    if let Some(card) = state.hand.iter_mut().find(|card| card.id == payload.card_id) {
        card.held = held;
    }
    vec![envelope]
}

fn start_wave(state: &mut RoundState, room_id: Option<String>, rng: &mut impl Rng) -> Envelope {
    state.wave_level += 1;
    let wave = waves::generate_wave(state.wave_level, rng);
    // A new combat wave opens a fresh card round.
    state.draw_count = 0;
    server_envelope(MessageKind::WaveStarted, &WaveStartedPayload { wave }, room_id)
}

fn place_tower(envelope: &Envelope) -> Vec<Envelope> {
    let payload: PlaceTowerPayload = match serde_json::from_value(envelope.payload.clone()) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!(?err, "malformed place_tower payload, dropping");
            return Vec::new();
        }
    };
    let kind = towers::kind_from_label(&payload.tower_type);
    let tower = towers::new_tower(sender(envelope), kind, payload.x, payload.y);
    vec![server_envelope(
        MessageKind::TowerPlaced,
        &TowerPayload { tower },
        envelope.room_id.clone(),
    )]
}

/// Derives the next-level stats for the requested tower. Tower inventory is
/// client-side, so the upgrade starts from the basic base profile.
fn upgrade_tower(envelope: &Envelope) -> Vec<Envelope> {
    let payload: UpgradeTowerPayload = match serde_json::from_value(envelope.payload.clone()) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!(?err, "malformed upgrade_tower payload, dropping");
            return Vec::new();
        }
    };
    let tower = towers::tower_at_level(
        payload.tower_id,
        sender(envelope),
        TowerKind::Basic,
        2,
        300.0,
        300.0,
    );
    vec![server_envelope(
        MessageKind::TowerUpgraded,
        &TowerPayload { tower },
        envelope.room_id.clone(),
    )]
}

fn sender(envelope: &Envelope) -> &str {
    envelope.sender_id.as_deref().unwrap_or_default()
}

fn server_envelope<T: Serialize>(kind: MessageKind, payload: &T, room_id: Option<String>) -> Envelope {
    let payload = match serde_json::to_value(payload) {
        Ok(value) => value,
        Err(err) => {
            tracing::error!(?err, "failed to encode emission payload");
            Value::Null
        }
    };
    Envelope {
        kind,
        payload,
        room_id,
        sender_id: Some(SERVER_SENDER.to_string()),
    }
}
