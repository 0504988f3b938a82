//! 5-card poker hand evaluation and the gold reward table.

use protocol::HAND_SIZE;
use protocol::model::{Card, HandCategory, HandRank};

/// Evaluates a 5-card hand. Order of the input cards does not matter. Hands
/// of any other size rank as a high card.
pub fn evaluate_hand(cards: &[Card]) -> HandRank {
    if cards.len() != HAND_SIZE {
        return HandCategory::HighCard.into();
    }

    let mut values = [0u8; HAND_SIZE];
    for (slot, card) in values.iter_mut().zip(cards) {
        *slot = card.value;
    }
    values.sort_unstable_by(|a, b| b.cmp(a));
    let flush = cards.iter().all(|card| card.suit == cards[0].suit);

    category(&values, flush).into()
}

/// Gold earned for completing a round with the given hand rank.
pub fn gold_for_hand(rank: &HandRank) -> u32 {
    match rank.value {
        2 => 20,
        3 => 30,
        4 => 50,
        5 => 80,
        6 => 100,
        7 => 150,
        8 => 200,
        9 => 300,
        10 => 500,
        _ => 10,
    }
}

/// Classifies descending-sorted card values.
fn category(values: &[u8; 5], flush: bool) -> HandCategory {
    let straight = is_straight(values);
    if flush && *values == [14, 13, 12, 11, 10] {
        return HandCategory::RoyalFlush;
    }
    if flush && straight {
        return HandCategory::StraightFlush;
    }
    match group_sizes(values).as_slice() {
        [4, 1] => HandCategory::FourOfAKind,
        [3, 2] => HandCategory::FullHouse,
        _ if flush => HandCategory::Flush,
        _ if straight => HandCategory::Straight,
        [3, 1, 1] => HandCategory::ThreeOfAKind,
        [2, 2, 1] => HandCategory::TwoPair,
        [2, 1, 1, 1] => HandCategory::Pair,
        _ => HandCategory::HighCard,
    }
}

/// Five consecutive values, including the A-5-4-3-2 wheel.
fn is_straight(values: &[u8; 5]) -> bool {
    if *values == [14, 5, 4, 3, 2] {
        return true;
    }
    values.windows(2).all(|pair| pair[0] == pair[1] + 1)
}

/// Run lengths of equal values, largest first. Input must be sorted.
fn group_sizes(values: &[u8; 5]) -> Vec<u8> {
    let mut sizes = Vec::with_capacity(HAND_SIZE);
    let mut run = 1u8;
    for pair in values.windows(2) {
        if pair[0] == pair[1] {
            run += 1;
        } else {
            sizes.push(run);
            run = 1;
        }
    }
    sizes.push(run);
    sizes.sort_unstable_by(|a, b| b.cmp(a));
    sizes
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::model::{Rank, Suit};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use rand::seq::SliceRandom;

    fn hand(cards: &[(Suit, Rank)]) -> Vec<Card> {
        cards.iter().map(|&(suit, rank)| Card::new(suit, rank)).collect()
    }

    #[test]
    fn recognizes_every_category() {
        use Rank::*;
        use Suit::*;
        let cases: Vec<(Vec<Card>, HandCategory)> = vec![
            (
                hand(&[(Hearts, Ace), (Hearts, King), (Hearts, Queen), (Hearts, Jack), (Hearts, Ten)]),
                HandCategory::RoyalFlush,
            ),
            (
                hand(&[(Clubs, Nine), (Clubs, Eight), (Clubs, Seven), (Clubs, Six), (Clubs, Five)]),
                HandCategory::StraightFlush,
            ),
            (
                hand(&[(Hearts, Queen), (Clubs, Queen), (Spades, Queen), (Diamonds, Queen), (Hearts, Two)]),
                HandCategory::FourOfAKind,
            ),
            (
                hand(&[(Hearts, Jack), (Clubs, Jack), (Spades, Jack), (Diamonds, Four), (Hearts, Four)]),
                HandCategory::FullHouse,
            ),
            (
                hand(&[(Spades, King), (Spades, Ten), (Spades, Seven), (Spades, Four), (Spades, Two)]),
                HandCategory::Flush,
            ),
            (
                hand(&[(Hearts, Eight), (Clubs, Seven), (Spades, Six), (Diamonds, Five), (Hearts, Four)]),
                HandCategory::Straight,
            ),
            (
                hand(&[(Hearts, Nine), (Clubs, Nine), (Spades, Nine), (Diamonds, King), (Hearts, Two)]),
                HandCategory::ThreeOfAKind,
            ),
            (
                hand(&[(Hearts, Ten), (Clubs, Ten), (Spades, Three), (Diamonds, Three), (Hearts, Ace)]),
                HandCategory::TwoPair,
            ),
            (
                hand(&[(Hearts, Six), (Clubs, Six), (Spades, King), (Diamonds, Nine), (Hearts, Two)]),
                HandCategory::Pair,
            ),
            (
                hand(&[(Hearts, Ace), (Clubs, Ten), (Spades, Eight), (Diamonds, Five), (Hearts, Three)]),
                HandCategory::HighCard,
            ),
        ];
        for (cards, expected) in cases {
            assert_eq!(evaluate_hand(&cards).category, expected, "hand: {cards:?}");
        }
    }

    #[test]
    fn wheel_counts_as_a_straight() {
        use Rank::*;
        use Suit::*;
        let cards = hand(&[(Hearts, Ace), (Clubs, Five), (Spades, Four), (Diamonds, Three), (Hearts, Two)]);
        assert_eq!(evaluate_hand(&cards).category, HandCategory::Straight);
    }

    #[test]
    fn evaluation_is_permutation_invariant() {
        use Rank::*;
        use Suit::*;
        let mut cards = hand(&[(Hearts, Jack), (Clubs, Jack), (Spades, Jack), (Diamonds, Four), (Hearts, Four)]);
        let baseline = evaluate_hand(&cards);
        let mut rng = SmallRng::seed_from_u64(11);
        for _ in 0..20 {
            cards.shuffle(&mut rng);
            assert_eq!(evaluate_hand(&cards), baseline);
        }
    }

    #[test]
    fn undersized_hand_ranks_as_high_card() {
        let cards = hand(&[(Suit::Hearts, Rank::Ace)]);
        assert_eq!(evaluate_hand(&cards).category, HandCategory::HighCard);
    }

    #[test]
    fn gold_follows_the_reward_table() {
        let expectations = [
            (HandCategory::HighCard, 10),
            (HandCategory::Pair, 20),
            (HandCategory::TwoPair, 30),
            (HandCategory::ThreeOfAKind, 50),
            (HandCategory::Straight, 80),
            (HandCategory::Flush, 100),
            (HandCategory::FullHouse, 150),
            (HandCategory::FourOfAKind, 200),
            (HandCategory::StraightFlush, 300),
            (HandCategory::RoyalFlush, 500),
        ];
        for (category, gold) in expectations {
            assert_eq!(gold_for_hand(&category.into()), gold);
        }
    }
}
