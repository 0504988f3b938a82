//! Tower stat derivation: base profiles per kind and per-level upgrades.

use protocol::model::{Tower, TowerKind};
use uuid::Uuid;

/// The stat block a tower carries at a given level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TowerProfile {
    pub range: f64,
    pub damage: u32,
    pub speed: f64,
    pub cost: u32,
}

/// Maps a client-supplied label onto a tower kind. Unrecognized labels fall
/// back to the basic tower rather than failing.
pub fn kind_from_label(label: &str) -> TowerKind {
    match label {
        "splash" => TowerKind::Splash,
        "sniper" => TowerKind::Sniper,
        "slow" => TowerKind::Slow,
        _ => TowerKind::Basic,
    }
}

/// Level-1 stats for a tower kind.
pub fn base_profile(kind: TowerKind) -> TowerProfile {
    match kind {
        TowerKind::Basic => TowerProfile { range: 100.0, damage: 10, speed: 1.0, cost: 50 },
        TowerKind::Splash => TowerProfile { range: 75.0, damage: 5, speed: 0.5, cost: 100 },
        TowerKind::Sniper => TowerProfile { range: 200.0, damage: 30, speed: 0.5, cost: 150 },
        TowerKind::Slow => TowerProfile { range: 100.0, damage: 5, speed: 1.5, cost: 75 },
    }
}

/// Stats for a tower kind at the given level. Each level past the first
/// multiplies range and speed by 1.2 and damage and cost by 1.5.
pub fn stats_for(kind: TowerKind, level: u32) -> TowerProfile {
    let mut profile = base_profile(kind);
    for _ in 1..level {
        profile = upgraded_profile(profile);
    }
    profile
}

fn upgraded_profile(profile: TowerProfile) -> TowerProfile {
    TowerProfile {
        range: profile.range * 1.2,
        damage: (profile.damage as f64 * 1.5) as u32,
        speed: profile.speed * 1.2,
        cost: (profile.cost as f64 * 1.5) as u32,
    }
}

/// A freshly placed level-1 tower.
pub fn new_tower(player_id: &str, kind: TowerKind, x: f64, y: f64) -> Tower {
    tower_at_level(Uuid::now_v7().to_string(), player_id, kind, 1, x, y)
}

/// A tower with the stats of the requested level, used when upgrading.
pub fn tower_at_level(id: String, player_id: &str, kind: TowerKind, level: u32, x: f64, y: f64) -> Tower {
    let profile = stats_for(kind, level);
    Tower {
        id,
        player_id: player_id.to_string(),
        kind,
        level,
        x,
        y,
        range: profile.range,
        damage: profile.damage,
        speed: profile.speed,
        cost: profile.cost,
        last_shot: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniper_profile_is_fixed_regardless_of_position() {
        for (x, y) in [(0.0, 0.0), (123.0, 456.0)] {
            let tower = new_tower("p1", TowerKind::Sniper, x, y);
            assert_eq!(tower.range, 200.0);
            assert_eq!(tower.damage, 30);
            assert_eq!(tower.speed, 0.5);
            assert_eq!(tower.cost, 150);
            assert_eq!(tower.level, 1);
        }
    }

    #[test]
    fn unknown_label_falls_back_to_basic() {
        assert_eq!(kind_from_label("laser"), TowerKind::Basic);
        assert_eq!(kind_from_label(""), TowerKind::Basic);
        assert_eq!(kind_from_label("sniper"), TowerKind::Sniper);
    }

    #[test]
    fn level_two_basic_matches_the_upgrade_multipliers() {
        let profile = stats_for(TowerKind::Basic, 2);
        assert_eq!(profile.range, 120.0);
        assert_eq!(profile.damage, 15);
        assert!((profile.speed - 1.2).abs() < 1e-9);
        assert_eq!(profile.cost, 75);
    }

    #[test]
    fn placed_towers_get_distinct_ids() {
        let a = new_tower("p1", TowerKind::Basic, 0.0, 0.0);
        let b = new_tower("p1", TowerKind::Basic, 0.0, 0.0);
        assert_ne!(a.id, b.id);
    }
}
