//! Deck construction, shuffling and dealing.

use protocol::model::{Card, Rank, Suit};
use rand::Rng;
use rand::seq::SliceRandom;

/// A full ordered 52-card deck, one card per suit/rank combination.
pub fn fresh_deck() -> Vec<Card> {
    let mut deck = Vec::with_capacity(52);
    for suit in Suit::ALL {
        for rank in Rank::ALL {
            deck.push(Card::new(suit, rank));
        }
    }
    deck
}

/// A freshly shuffled 52-card deck.
pub fn new_shuffled_deck(rng: &mut impl Rng) -> Vec<Card> {
    let mut deck = fresh_deck();
    deck.shuffle(rng);
    deck
}

/// Splits the first `count` cards off the deck. Asking for more cards than
/// the deck holds yields the whole remainder.
pub fn deal(mut deck: Vec<Card>, count: usize) -> (Vec<Card>, Vec<Card>) {
    let count = count.min(deck.len());
    let rest = deck.split_off(count);
    (deck, rest)
}
