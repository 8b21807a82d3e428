//! D&D dice rolling system.
//!
//! Supports standard dice notation (`2d6+3`), advantage/disadvantage on
//! single d20 rolls, and critical detection. Default entropy comes from the
//! operating system CSPRNG (`OsRng`) so rolls are fair and unpredictable;
//! every rolling function has a `*_with_rng` twin for deterministic tests.

use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for dice parsing and rolling.
#[derive(Debug, Error)]
pub enum DiceError {
    #[error("Invalid dice formula: {0}")]
    InvalidFormula(String),
    #[error("Invalid die size: {0}")]
    InvalidDieSize(u32),
}

/// Advantage state for d20 rolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Advantage {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl Advantage {
    /// Combine two advantage states (advantage + disadvantage = normal).
    ///
    /// This is the 5e rule for stacking sources: any number of advantage
    /// sources and any number of disadvantage sources cancel to normal.
    pub fn combine(self, other: Advantage) -> Advantage {
        match (self, other) {
            (Advantage::Normal, x) | (x, Advantage::Normal) => x,
            (Advantage::Advantage, Advantage::Disadvantage) => Advantage::Normal,
            (Advantage::Disadvantage, Advantage::Advantage) => Advantage::Normal,
            (Advantage::Advantage, Advantage::Advantage) => Advantage::Advantage,
            (Advantage::Disadvantage, Advantage::Disadvantage) => Advantage::Disadvantage,
        }
    }
}

/// A parsed dice formula: `count` dice of `sides` plus a flat modifier.
///
/// Grammar is `[N]dS[+M|-M]`, whitespace-tolerant and case-insensitive,
/// with the count defaulting to 1 (`"d8"` is `"1d8"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceFormula {
    pub count: u32,
    pub sides: u32,
    pub modifier: i32,
}

impl DiceFormula {
    /// Most dice a single formula may request.
    pub const MAX_COUNT: u32 = 100;
    /// Largest die a formula may request.
    pub const MAX_SIDES: u32 = 1000;

    /// A bare d20, the roll behind every check and attack.
    pub fn d20() -> Self {
        Self {
            count: 1,
            sides: 20,
            modifier: 0,
        }
    }

    /// Parse a dice notation string.
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let cleaned: String = notation
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let invalid = || DiceError::InvalidFormula(notation.trim().to_string());

        let d_pos = cleaned.find('d').ok_or_else(invalid)?;
        let count_str = &cleaned[..d_pos];
        let rest = &cleaned[d_pos + 1..];

        let count: u32 = if count_str.is_empty() {
            1
        } else {
            count_str.parse().map_err(|_| invalid())?
        };

        // Everything from the first sign onward must parse as one signed
        // integer, so "2d6+3+2" is rejected rather than summed.
        let (sides_str, modifier) = match rest.find(['+', '-']) {
            Some(pos) => {
                let modifier: i32 = rest[pos..].parse().map_err(|_| invalid())?;
                (&rest[..pos], modifier)
            }
            None => (rest, 0),
        };

        let sides: u32 = sides_str.parse().map_err(|_| invalid())?;

        if count == 0 || count > Self::MAX_COUNT {
            return Err(invalid());
        }
        if sides < 2 || sides > Self::MAX_SIDES {
            return Err(invalid());
        }

        Ok(DiceFormula {
            count,
            sides,
            modifier,
        })
    }

    /// Roll this formula with the OS CSPRNG.
    pub fn roll(&self, advantage: Advantage) -> RollResult {
        self.roll_with_rng(advantage, &mut OsRng)
    }

    /// Roll with a specific RNG (useful for testing).
    ///
    /// Advantage and disadvantage only ever apply to a single d20: the die
    /// is drawn twice and the higher/lower face kept. For any other formula
    /// the advantage argument is silently ignored, because 5e has no notion
    /// of advantage on damage-style rolls.
    pub fn roll_with_rng<R: Rng>(&self, advantage: Advantage, rng: &mut R) -> RollResult {
        let single_d20 = self.count == 1 && self.sides == 20;

        if single_d20 && advantage != Advantage::Normal {
            let first = rng.gen_range(1..=20u32);
            let second = rng.gen_range(1..=20u32);
            let kept = match advantage {
                Advantage::Advantage => first.max(second),
                Advantage::Disadvantage => first.min(second),
                Advantage::Normal => unreachable!(),
            };
            let dropped = if kept == first { second } else { first };

            return RollResult {
                formula: *self,
                rolls: vec![first, second],
                discarded: vec![dropped],
                modifier: self.modifier,
                total: kept as i32 + self.modifier,
                advantage,
                is_critical_success: kept == 20,
                is_critical_failure: kept == 1,
            };
        }

        let rolls: Vec<u32> = (0..self.count)
            .map(|_| rng.gen_range(1..=self.sides))
            .collect();
        let sum: i32 = rolls.iter().map(|&r| r as i32).sum();
        let (crit, fumble) = if single_d20 {
            (rolls[0] == 20, rolls[0] == 1)
        } else {
            (false, false)
        };

        RollResult {
            formula: *self,
            rolls,
            discarded: Vec::new(),
            modifier: self.modifier,
            total: sum + self.modifier,
            advantage: Advantage::Normal,
            is_critical_success: crit,
            is_critical_failure: fumble,
        }
    }
}

impl FromStr for DiceFormula {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiceFormula::parse(s)
    }
}

impl fmt::Display for DiceFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifier != 0 {
            write!(f, "{}d{}{:+}", self.count, self.sides, self.modifier)
        } else {
            write!(f, "{}d{}", self.count, self.sides)
        }
    }
}

/// Complete, immutable result of a dice roll.
///
/// `rolls` holds every raw face in the order drawn, including faces that
/// advantage/disadvantage discarded; `discarded` lists exactly those. The
/// critical flags are mutually exclusive and only ever set for a single
/// d20 roll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollResult {
    pub formula: DiceFormula,
    pub rolls: Vec<u32>,
    pub discarded: Vec<u32>,
    pub modifier: i32,
    pub total: i32,
    pub advantage: Advantage,
    pub is_critical_success: bool,
    pub is_critical_failure: bool,
}

impl RollResult {
    /// Check if the roll meets or exceeds a DC.
    pub fn meets_dc(&self, dc: i32) -> bool {
        self.total >= dc
    }

    /// Format the individual dice for display, discarded faces in parens.
    pub fn dice_display(&self) -> String {
        let mut dropped_used = vec![false; self.discarded.len()];
        let shown: Vec<String> = self
            .rolls
            .iter()
            .map(|&roll| {
                let is_dropped = self.discarded.iter().enumerate().any(|(i, &d)| {
                    if d == roll && !dropped_used[i] {
                        dropped_used[i] = true;
                        true
                    } else {
                        false
                    }
                });
                if is_dropped {
                    format!("({roll})")
                } else {
                    format!("{roll}")
                }
            })
            .collect();

        let dice_str = format!("[{}]", shown.join(", "));
        if self.modifier > 0 {
            format!("{} + {}", dice_str, self.modifier)
        } else if self.modifier < 0 {
            format!("{} - {}", dice_str, self.modifier.abs())
        } else {
            dice_str
        }
    }
}

impl fmt::Display for RollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.dice_display(), self.total)
    }
}

/// Roll one die with the OS CSPRNG. `sides` must be at least 1.
pub fn roll_die(sides: u32) -> Result<u32, DiceError> {
    roll_die_with_rng(sides, &mut OsRng)
}

/// Roll one die with a specific RNG.
pub fn roll_die_with_rng<R: Rng>(sides: u32, rng: &mut R) -> Result<u32, DiceError> {
    if sides == 0 {
        return Err(DiceError::InvalidDieSize(sides));
    }
    Ok(rng.gen_range(1..=sides))
}

/// Convenience function to roll dice from a notation string.
pub fn roll(notation: &str) -> Result<RollResult, DiceError> {
    Ok(DiceFormula::parse(notation)?.roll(Advantage::Normal))
}

/// Roll a formula with an advantage state (only meaningful for `1d20`).
pub fn roll_formula(notation: &str, advantage: Advantage) -> Result<RollResult, DiceError> {
    Ok(DiceFormula::parse(notation)?.roll(advantage))
}

/// Roll a formula with an advantage state and a specific RNG.
pub fn roll_formula_with_rng<R: Rng>(
    notation: &str,
    advantage: Advantage,
    rng: &mut R,
) -> Result<RollResult, DiceError> {
    Ok(DiceFormula::parse(notation)?.roll_with_rng(advantage, rng))
}

/// Roll damage dice. A critical hit doubles the number of dice rolled; the
/// flat modifier is applied exactly once (`2d6+3` crits as 4d6+3, not
/// 4d6+6).
pub fn roll_damage(notation: &str, is_critical: bool) -> Result<RollResult, DiceError> {
    roll_damage_with_rng(notation, is_critical, &mut OsRng)
}

/// Roll damage dice with a specific RNG.
pub fn roll_damage_with_rng<R: Rng>(
    notation: &str,
    is_critical: bool,
    rng: &mut R,
) -> Result<RollResult, DiceError> {
    let mut formula = DiceFormula::parse(notation)?;
    if is_critical {
        // Dice double on a crit; the count cap is parse-time input
        // validation, so a legal 100d6 crit legitimately rolls 200 dice.
        formula.count *= 2;
    }
    Ok(formula.roll_with_rng(Advantage::Normal, rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_parse_simple() {
        let formula = DiceFormula::parse("1d20").unwrap();
        assert_eq!(formula.count, 1);
        assert_eq!(formula.sides, 20);
        assert_eq!(formula.modifier, 0);
    }

    #[test]
    fn test_parse_with_modifier() {
        assert_eq!(
            DiceFormula::parse("2d6+3").unwrap(),
            DiceFormula {
                count: 2,
                sides: 6,
                modifier: 3
            }
        );
        assert_eq!(
            DiceFormula::parse("1d20-1").unwrap(),
            DiceFormula {
                count: 1,
                sides: 20,
                modifier: -1
            }
        );
    }

    #[test]
    fn test_parse_default_count() {
        let formula = DiceFormula::parse("d8").unwrap();
        assert_eq!(formula.count, 1);
        assert_eq!(formula.sides, 8);
    }

    #[test]
    fn test_parse_whitespace_and_case() {
        let formula = DiceFormula::parse(" 2D6 + 3 ").unwrap();
        assert_eq!(formula.count, 2);
        assert_eq!(formula.sides, 6);
        assert_eq!(formula.modifier, 3);
    }

    #[test]
    fn test_parse_invalid() {
        for bad in ["bad", "", "2x6", "d", "2d", "2d6+3+2", "2d6++3", "0d6", "2d1", "2d0", "500d6", "2d9999"] {
            assert!(
                DiceFormula::parse(bad).is_err(),
                "expected {bad:?} to fail"
            );
        }
    }

    #[test]
    fn test_formula_display_roundtrip() {
        for text in ["2d6+3", "1d20-1", "3d8"] {
            let formula = DiceFormula::parse(text).unwrap();
            assert_eq!(formula.to_string(), text);
        }
    }

    #[test]
    fn test_roll_die_range() {
        for _ in 0..200 {
            let value = roll_die(20).unwrap();
            assert!((1..=20).contains(&value));
        }
        assert_eq!(roll_die(1).unwrap(), 1);
    }

    #[test]
    fn test_roll_die_zero_sides() {
        assert!(matches!(roll_die(0), Err(DiceError::InvalidDieSize(0))));
    }

    #[test]
    fn test_roll_die_uniformity() {
        // Chi-square over 10,000 d6 rolls from the CSPRNG. With df = 5 a
        // statistic above 30 is roughly a one-in-a-hundred-thousand event.
        let samples = 10_000usize;
        let mut counts = [0usize; 6];
        for _ in 0..samples {
            let face = roll_die(6).unwrap();
            counts[(face - 1) as usize] += 1;
        }
        let expected = samples as f64 / 6.0;
        let chi_square: f64 = counts
            .iter()
            .map(|&observed| {
                let delta = observed as f64 - expected;
                delta * delta / expected
            })
            .sum();
        assert!(
            chi_square < 30.0,
            "d6 distribution looks biased: chi-square {chi_square:.2}, counts {counts:?}"
        );
    }

    #[test]
    fn test_roll_formula_range() {
        for _ in 0..100 {
            let result = roll("2d6+3").unwrap();
            assert!((5..=15).contains(&result.total));
            assert_eq!(result.rolls.len(), 2);
            assert!(result.discarded.is_empty());
        }
    }

    #[test]
    fn test_advantage_keeps_higher() {
        // Replay the exact draw sequence with an identically seeded probe.
        for seed in 0..100u64 {
            let mut probe = StdRng::seed_from_u64(seed);
            let first = probe.gen_range(1..=20u32);
            let second = probe.gen_range(1..=20u32);

            let mut rng = StdRng::seed_from_u64(seed);
            let result =
                roll_formula_with_rng("1d20+3", Advantage::Advantage, &mut rng).unwrap();
            assert_eq!(result.total, first.max(second) as i32 + 3);
            assert_eq!(result.rolls, vec![first, second]);
            assert_eq!(result.discarded, vec![first.min(second)]);
        }
    }

    #[test]
    fn test_disadvantage_keeps_lower() {
        for seed in 0..100u64 {
            let mut probe = StdRng::seed_from_u64(seed);
            let first = probe.gen_range(1..=20u32);
            let second = probe.gen_range(1..=20u32);

            let mut rng = StdRng::seed_from_u64(seed);
            let result =
                roll_formula_with_rng("1d20", Advantage::Disadvantage, &mut rng).unwrap();
            assert_eq!(result.total, first.min(second) as i32);
        }
    }

    #[test]
    fn test_normal_rolls_once() {
        for seed in 0..20u64 {
            let mut probe = StdRng::seed_from_u64(seed);
            let face = probe.gen_range(1..=20u32);

            let mut rng = StdRng::seed_from_u64(seed);
            let result = roll_formula_with_rng("1d20", Advantage::Normal, &mut rng).unwrap();
            assert_eq!(result.rolls, vec![face]);
            assert!(result.discarded.is_empty());
        }
    }

    #[test]
    fn test_advantage_ignored_for_damage_formulas() {
        let result = roll_formula("2d6+1", Advantage::Advantage).unwrap();
        assert_eq!(result.rolls.len(), 2);
        assert!(result.discarded.is_empty());
        assert_eq!(result.advantage, Advantage::Normal);
        assert!(!result.is_critical_success);
        assert!(!result.is_critical_failure);

        // A single die that is not a d20 gets no advantage either.
        let result = roll_formula("1d6", Advantage::Disadvantage).unwrap();
        assert_eq!(result.rolls.len(), 1);
    }

    #[test]
    fn test_critical_flags_single_d20_only() {
        for _ in 0..200 {
            let result = roll("1d20").unwrap();
            assert!(!(result.is_critical_success && result.is_critical_failure));
            assert_eq!(result.is_critical_success, result.rolls[0] == 20);
            assert_eq!(result.is_critical_failure, result.rolls[0] == 1);
        }
        for _ in 0..50 {
            let result = roll("3d20").unwrap();
            assert!(!result.is_critical_success);
            assert!(!result.is_critical_failure);
        }
    }

    #[test]
    fn test_critical_damage_doubles_dice_only() {
        for seed in 0..20u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let result = roll_damage_with_rng("2d6+3", true, &mut rng).unwrap();
            assert_eq!(result.rolls.len(), 4, "crit doubles the die count");
            let dice_sum: i32 = result.rolls.iter().map(|&r| r as i32).sum();
            // The +3 modifier is applied exactly once, crit or not.
            assert_eq!(result.total, dice_sum + 3);
        }

        let normal = roll_damage("2d6+3", false).unwrap();
        assert_eq!(normal.rolls.len(), 2);
    }

    #[test]
    fn test_advantage_combine() {
        assert_eq!(
            Advantage::Normal.combine(Advantage::Advantage),
            Advantage::Advantage
        );
        assert_eq!(
            Advantage::Advantage.combine(Advantage::Disadvantage),
            Advantage::Normal
        );
        assert_eq!(
            Advantage::Disadvantage.combine(Advantage::Advantage),
            Advantage::Normal
        );
        assert_eq!(
            Advantage::Disadvantage.combine(Advantage::Disadvantage),
            Advantage::Disadvantage
        );
    }

    #[test]
    fn test_dice_display_marks_discarded() {
        let result = RollResult {
            formula: DiceFormula::d20(),
            rolls: vec![17, 4],
            discarded: vec![4],
            modifier: 5,
            total: 22,
            advantage: Advantage::Advantage,
            is_critical_success: false,
            is_critical_failure: false,
        };
        assert_eq!(result.dice_display(), "[17, (4)] + 5");
        assert_eq!(result.to_string(), "[17, (4)] + 5 = 22");
    }
}
