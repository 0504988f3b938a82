//! The game data model shared by the card mini-game and the tower-defense
//! combat: cards and hand ranks, towers, enemies and waves. Field names on the
//! wire are camelCase to match the client.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four card suits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    Hearts,
    Diamonds,
    Clubs,
    Spades,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades];

    pub fn as_str(self) -> &'static str {
        match self {
            Suit::Hearts => "hearts",
            Suit::Diamonds => "diamonds",
            Suit::Clubs => "clubs",
            Suit::Spades => "spades",
        }
    }
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the thirteen card ranks. Wire labels follow the client convention
/// of `"2"`..`"10"` and `"J"`/`"Q"`/`"K"`/`"A"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rank {
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "6")]
    Six,
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "9")]
    Nine,
    #[serde(rename = "10")]
    Ten,
    #[serde(rename = "J")]
    Jack,
    #[serde(rename = "Q")]
    Queen,
    #[serde(rename = "K")]
    King,
    #[serde(rename = "A")]
    Ace,
}

impl Rank {
    pub const ALL: [Rank; 13] = [
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
        Rank::Ace,
    ];

    /// The numeric value used for hand evaluation, 2 through 14.
    pub fn value(self) -> u8 {
        match self {
            Rank::Two => 2,
            Rank::Three => 3,
            Rank::Four => 4,
            Rank::Five => 5,
            Rank::Six => 6,
            Rank::Seven => 7,
            Rank::Eight => 8,
            Rank::Nine => 9,
            Rank::Ten => 10,
            Rank::Jack => 11,
            Rank::Queen => 12,
            Rank::King => 13,
            Rank::Ace => 14,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
            Rank::Ace => "A",
        }
    }
}

/// A playing card. Identity is `"{suit}-{rank}"`, unique within a deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub suit: Suit,
    pub rank: Rank,
    pub value: u8,
    /// Whether the card is kept across the next draw.
    pub held: bool,
    pub active: bool,
}

impl Card {
    pub fn new(suit: Suit, rank: Rank) -> Self {
        Card {
            id: format!("{}-{}", suit.as_str(), rank.as_str()),
            suit,
            rank,
            value: rank.value(),
            held: false,
            active: true,
        }
    }
}

/// The ten poker hand categories in ascending order of value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandCategory {
    HighCard,
    Pair,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
    RoyalFlush,
}

impl HandCategory {
    /// Numeric value 1 (high card) through 10 (royal flush).
    pub fn value(self) -> u8 {
        self as u8 + 1
    }

    pub fn display_name(self) -> &'static str {
        match self {
            HandCategory::HighCard => "High Card",
            HandCategory::Pair => "Pair",
            HandCategory::TwoPair => "Two Pair",
            HandCategory::ThreeOfAKind => "Three of a Kind",
            HandCategory::Straight => "Straight",
            HandCategory::Flush => "Flush",
            HandCategory::FullHouse => "Full House",
            HandCategory::FourOfAKind => "Four of a Kind",
            HandCategory::StraightFlush => "Straight Flush",
            HandCategory::RoyalFlush => "Royal Flush",
        }
    }
}

/// The evaluated rank of a 5-card hand as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandRank {
    #[serde(rename = "type")]
    pub category: HandCategory,
    pub value: u8,
    pub name: String,
}

impl From<HandCategory> for HandRank {
    fn from(category: HandCategory) -> Self {
        HandRank {
            category,
            value: category.value(),
            name: category.display_name().to_string(),
        }
    }
}

/// The defense tower kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TowerKind {
    Basic,
    Splash,
    Sniper,
    Slow,
}

/// A placed defense tower with its derived stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tower {
    pub id: String,
    pub player_id: String,
    #[serde(rename = "type")]
    pub kind: TowerKind,
    pub level: u32,
    pub x: f64,
    pub y: f64,
    pub range: f64,
    pub damage: u32,
    /// Attacks per second.
    pub speed: f64,
    pub cost: u32,
    pub last_shot: i64,
}

/// The enemy tiers, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnemyKind {
    Basic,
    Fast,
    Tank,
    Boss,
}

/// A single enemy walking the wave path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enemy {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EnemyKind,
    pub health: u32,
    pub max_health: u32,
    pub speed: f64,
    /// Damage to the player base on breakthrough.
    pub damage: u32,
    /// Gold reward for a kill.
    pub gold: u32,
    pub x: f64,
    pub y: f64,
    pub path_index: usize,
    pub active: bool,
}

/// A 2D point of the wave path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveStatus {
    Pending,
    Active,
    Completed,
}

/// A generated batch of enemies following a fixed path, scaled by difficulty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnemyWave {
    pub id: String,
    pub round: u32,
    pub level: u32,
    pub enemies: Vec<Enemy>,
    pub path: Vec<Point>,
    pub status: WaveStatus,
    /// Unix milliseconds at which the wave begins moving.
    pub start_at: i64,
}
