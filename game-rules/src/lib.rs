//! Pure, server-authoritative rule tables: deck handling, poker hand
//! evaluation, tower stat derivation and enemy wave generation. Everything
//! here is deterministic given an `Rng`, which keeps the protocol state
//! machine testable.

pub mod deck;
pub mod poker;
pub mod towers;
pub mod waves;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as Unix milliseconds, the timestamp unit used on the wire.
pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}
