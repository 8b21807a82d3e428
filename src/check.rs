//! Ability check and attack resolution.
//!
//! A thin layer over the dice engine: checks compare 1d20 + modifiers
//! against a DC, attacks against an armor class. Callers with several
//! simultaneous advantage sources must fold them into a single [`Advantage`]
//! with [`Advantage::combine`] before calling; 5e cancels advantage and
//! disadvantage to normal whenever both apply, no matter how many sources
//! are on each side.

use crate::dice::{Advantage, DiceFormula, RollResult};
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Result of an ability check against a DC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub success: bool,
    pub total: i32,
    pub dc: i32,
    /// Combined ability modifier + proficiency bonus.
    pub modifier: i32,
    pub roll: RollResult,
}

/// Result of an attack roll against an armor class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackOutcome {
    pub hit: bool,
    pub is_critical: bool,
    pub is_fumble: bool,
    pub total: i32,
    pub target_ac: i32,
    pub attack_bonus: i32,
    pub roll: RollResult,
}

/// Resolve an ability check: 1d20 + ability modifier + proficiency vs DC.
///
/// A natural 20 does not auto-succeed a check and a natural 1 does not
/// auto-fail one; only attack rolls carry those rules in 5e. The critical
/// flags on the returned roll are still set so callers can narrate them.
pub fn resolve_check(
    ability_modifier: i32,
    proficiency_bonus: i32,
    dc: i32,
    advantage: Advantage,
) -> CheckOutcome {
    resolve_check_with_rng(ability_modifier, proficiency_bonus, dc, advantage, &mut OsRng)
}

/// Resolve an ability check with a specific RNG.
pub fn resolve_check_with_rng<R: Rng>(
    ability_modifier: i32,
    proficiency_bonus: i32,
    dc: i32,
    advantage: Advantage,
    rng: &mut R,
) -> CheckOutcome {
    let roll = DiceFormula::d20().roll_with_rng(advantage, rng);
    let modifier = ability_modifier + proficiency_bonus;
    let total = roll.total + modifier;
    CheckOutcome {
        success: total >= dc,
        total,
        dc,
        modifier,
        roll,
    }
}

/// Resolve an attack roll: 1d20 + attack bonus vs armor class.
///
/// Natural 1 always misses, natural 20 always hits (and crits).
pub fn resolve_attack(attack_bonus: i32, target_ac: i32, advantage: Advantage) -> AttackOutcome {
    resolve_attack_with_rng(attack_bonus, target_ac, advantage, &mut OsRng)
}

/// Resolve an attack roll with a specific RNG.
pub fn resolve_attack_with_rng<R: Rng>(
    attack_bonus: i32,
    target_ac: i32,
    advantage: Advantage,
    rng: &mut R,
) -> AttackOutcome {
    let roll = DiceFormula::d20().roll_with_rng(advantage, rng);
    let total = roll.total + attack_bonus;
    let is_critical = roll.is_critical_success;
    let is_fumble = roll.is_critical_failure;
    let hit = !is_fumble && (is_critical || total >= target_ac);
    AttackOutcome {
        hit,
        is_critical,
        is_fumble,
        total,
        target_ac,
        attack_bonus,
        roll,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// The face a seeded resolver will draw, replayed with an identical rng.
    fn probe_d20(seed: u64) -> u32 {
        StdRng::seed_from_u64(seed).gen_range(1..=20u32)
    }

    #[test]
    fn test_attack_natural_20_always_hits() {
        // Sweep enough seeds that both extremes occur, and assert the hit
        // rule holds on every single one.
        let mut saw_nat_20 = false;
        let mut saw_nat_1 = false;
        for seed in 0..500u64 {
            let face = probe_d20(seed);
            let mut rng = StdRng::seed_from_u64(seed);
            let outcome = resolve_attack_with_rng(0, 25, Advantage::Normal, &mut rng);
            if face == 20 {
                saw_nat_20 = true;
                // 0 + 20 = 20 < 25, yet a natural 20 hits and crits.
                assert!(outcome.hit);
                assert!(outcome.is_critical);
            } else {
                assert!(!outcome.hit, "total {} cannot reach AC 25", outcome.total);
            }
            if face == 1 {
                saw_nat_1 = true;
            }
        }
        assert!(saw_nat_20, "seed sweep never produced a natural 20");
        assert!(saw_nat_1, "seed sweep never produced a natural 1");
    }

    #[test]
    fn test_attack_natural_1_always_misses() {
        for seed in 0..500u64 {
            let face = probe_d20(seed);
            let mut rng = StdRng::seed_from_u64(seed);
            // +30 against AC 10: everything hits except the natural 1.
            let outcome = resolve_attack_with_rng(30, 10, Advantage::Normal, &mut rng);
            if face == 1 {
                assert!(!outcome.hit);
                assert!(outcome.is_fumble);
            } else {
                assert!(outcome.hit);
            }
        }
    }

    #[test]
    fn test_check_no_natural_20_auto_success() {
        for seed in 0..500u64 {
            let face = probe_d20(seed);
            let mut rng = StdRng::seed_from_u64(seed);
            let outcome = resolve_check_with_rng(0, 0, 25, Advantage::Normal, &mut rng);
            // DC 25 is unreachable on a flat d20; even a natural 20 fails.
            assert!(!outcome.success);
            assert_eq!(outcome.roll.is_critical_success, face == 20);
        }
    }

    #[test]
    fn test_check_no_natural_1_auto_fail() {
        for seed in 0..500u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            // +5 against DC 2: every face succeeds, the natural 1 included.
            let outcome = resolve_check_with_rng(3, 2, 2, Advantage::Normal, &mut rng);
            assert!(outcome.success);
        }
    }

    #[test]
    fn test_check_applies_both_modifiers() {
        for seed in 0..50u64 {
            let face = probe_d20(seed) as i32;
            let mut rng = StdRng::seed_from_u64(seed);
            let outcome = resolve_check_with_rng(3, 2, 15, Advantage::Normal, &mut rng);
            assert_eq!(outcome.modifier, 5);
            assert_eq!(outcome.total, face + 5);
            assert_eq!(outcome.success, face + 5 >= 15);
        }
    }

    #[test]
    fn test_attack_with_advantage_uses_higher_face() {
        for seed in 0..100u64 {
            let mut probe = StdRng::seed_from_u64(seed);
            let first = probe.gen_range(1..=20u32);
            let second = probe.gen_range(1..=20u32);

            let mut rng = StdRng::seed_from_u64(seed);
            let outcome = resolve_attack_with_rng(4, 12, Advantage::Advantage, &mut rng);
            assert_eq!(outcome.total, first.max(second) as i32 + 4);
        }
    }
}
