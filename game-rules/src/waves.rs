//! Enemy wave generation: count and tier distribution scale with the wave
//! level, and every 5th level appends a guaranteed boss.

use protocol::model::{Enemy, EnemyKind, EnemyWave, Point, WaveStatus};
use rand::Rng;
use uuid::Uuid;

use crate::unix_millis;

/// The fixed closed path enemies follow, a square walked clockwise.
pub const WAVE_PATH: [Point; 5] = [
    Point { x: 50.0, y: 50.0 },
    Point { x: 550.0, y: 50.0 },
    Point { x: 550.0, y: 450.0 },
    Point { x: 50.0, y: 450.0 },
    Point { x: 50.0, y: 50.0 },
];

/// Delay between wave creation and the enemies starting to move.
const WAVE_LEAD_TIME_MS: i64 = 5_000;

/// Cumulative-roll probabilities for the enemy tiers at a given level.
struct TierWeights {
    boss: f64,
    tank: f64,
    fast: f64,
}

fn tier_weights(level: u32) -> TierWeights {
    match level {
        0..=1 => TierWeights { boss: 0.0, tank: 0.0, fast: 0.0 },
        2..=3 => TierWeights { boss: 0.0, tank: 0.0, fast: 0.3 },
        4..=6 => TierWeights { boss: 0.0, tank: 0.1, fast: 0.3 },
        7..=9 => TierWeights { boss: 0.05, tank: 0.15, fast: 0.3 },
        _ => TierWeights { boss: 0.1, tank: 0.2, fast: 0.3 },
    }
}

/// Base stats per enemy tier: health, speed, damage, gold.
fn base_stats(kind: EnemyKind) -> (u32, f64, u32, u32) {
    match kind {
        EnemyKind::Basic => (150, 1.0, 2, 6),
        EnemyKind::Fast => (120, 1.7, 2, 9),
        EnemyKind::Tank => (300, 0.8, 3, 12),
        EnemyKind::Boss => (800, 0.6, 5, 25),
    }
}

/// Difficulty multipliers for a wave level: health, speed, gold.
fn multipliers(level: u32) -> (f64, f64, f64) {
    let steps = level.saturating_sub(1) as f64;
    (1.0 + steps * 0.2, 1.0 + steps * 0.05, 1.0 + steps * 0.1)
}

/// Generates the enemy wave for a difficulty level. Enemy count is
/// `5 + level * 3`; level 1 draws only from the lowest tier.
pub fn generate_wave(level: u32, rng: &mut impl Rng) -> EnemyWave {
    let count = 5 + level * 3;
    let weights = tier_weights(level);
    let (health_mul, speed_mul, gold_mul) = multipliers(level);

    let mut enemies = Vec::with_capacity(count as usize + 1);
    for _ in 0..count {
        let roll: f64 = rng.random();
        let kind = if roll < weights.boss {
            EnemyKind::Boss
        } else if roll < weights.boss + weights.tank {
            EnemyKind::Tank
        } else if roll < weights.boss + weights.tank + weights.fast {
            EnemyKind::Fast
        } else {
            EnemyKind::Basic
        };
        enemies.push(spawn(kind, health_mul, speed_mul, gold_mul));
    }

    // Boss waves carry one guaranteed boss on top of the rolled enemies.
    if level > 0 && level.is_multiple_of(5) {
        enemies.push(spawn(EnemyKind::Boss, health_mul, speed_mul, gold_mul));
    }

    EnemyWave {
        id: Uuid::now_v7().to_string(),
        round: level,
        level,
        enemies,
        path: WAVE_PATH.to_vec(),
        status: WaveStatus::Pending,
        start_at: unix_millis() + WAVE_LEAD_TIME_MS,
    }
}

fn spawn(kind: EnemyKind, health_mul: f64, speed_mul: f64, gold_mul: f64) -> Enemy {
    let (health, speed, damage, gold) = base_stats(kind);
    let health = (health as f64 * health_mul) as u32;
    Enemy {
        id: Uuid::now_v7().to_string(),
        kind,
        health,
        max_health: health,
        speed: speed * speed_mul,
        damage,
        gold: (gold as f64 * gold_mul) as u32,
        x: WAVE_PATH[0].x,
        y: WAVE_PATH[0].y,
        path_index: 0,
        active: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use std::collections::HashSet;

    #[test]
    fn level_one_wave_is_eight_unscaled_basics() {
        let wave = generate_wave(1, &mut SmallRng::seed_from_u64(1));
        assert_eq!(wave.enemies.len(), 8);
        for enemy in &wave.enemies {
            assert_eq!(enemy.kind, EnemyKind::Basic);
            assert_eq!(enemy.health, 150);
            assert_eq!(enemy.max_health, 150);
            assert_eq!(enemy.speed, 1.0);
            assert_eq!(enemy.gold, 6);
            assert!(enemy.active);
        }
    }

    #[test]
    fn every_fifth_level_appends_a_boss() {
        let wave = generate_wave(5, &mut SmallRng::seed_from_u64(2));
        assert_eq!(wave.enemies.len(), 5 + 5 * 3 + 1);
        assert_eq!(wave.enemies.last().map(|enemy| enemy.kind), Some(EnemyKind::Boss));
        let off_cycle = generate_wave(4, &mut SmallRng::seed_from_u64(3));
        assert_eq!(off_cycle.enemies.len(), 5 + 4 * 3);
    }

    #[test]
    fn multipliers_scale_with_level() {
        let (health, speed, gold) = multipliers(3);
        assert!((health - 1.4).abs() < 1e-9);
        assert!((speed - 1.1).abs() < 1e-9);
        assert!((gold - 1.2).abs() < 1e-9);
    }

    #[test]
    fn path_is_closed_and_enemies_start_on_it() {
        let wave = generate_wave(2, &mut SmallRng::seed_from_u64(4));
        assert_eq!(wave.path.first(), wave.path.last());
        for enemy in &wave.enemies {
            assert_eq!(enemy.x, WAVE_PATH[0].x);
            assert_eq!(enemy.y, WAVE_PATH[0].y);
            assert_eq!(enemy.path_index, 0);
        }
    }

    #[test]
    fn wave_starts_pending_in_the_near_future() {
        let before = unix_millis();
        let wave = generate_wave(1, &mut SmallRng::seed_from_u64(5));
        assert_eq!(wave.status, WaveStatus::Pending);
        assert!(wave.start_at >= before + WAVE_LEAD_TIME_MS);
        assert_eq!(wave.round, 1);
        assert_eq!(wave.level, 1);
    }

    #[test]
    fn enemy_ids_are_unique() {
        let wave = generate_wave(10, &mut SmallRng::seed_from_u64(6));
        let ids: HashSet<&str> = wave.enemies.iter().map(|enemy| enemy.id.as_str()).collect();
        assert_eq!(ids.len(), wave.enemies.len());
    }
}
