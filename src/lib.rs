//! D&D 5e rules engine: dice, checks, conditions, and combat.
//!
//! This crate provides:
//! - Dice rolling with standard notation and CSPRNG-backed fairness
//! - Ability check and attack resolution with advantage/disadvantage
//! - The SRD conditions with duration tracking and aggregated effects
//! - Combat encounters with initiative, turns, damage, and an audit log
//!
//! The engine is pure and synchronous: no I/O, no locking, no globals.
//! Each game session owns one [`CombatEncounter`] and one
//! [`ConditionTracker`]; serializing concurrent mutation of the same
//! instances is the caller's job. Everything public is serde-serializable
//! so the surrounding server can persist rolls, logs, and state as it
//! sees fit.
//!
//! # Quick Start
//!
//! ```ignore
//! use dnd_rules::{Advantage, CombatEncounter, ConditionTracker, Participant};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hero = Participant::new("Aerith", 3, 12, 16);
//!     let hero_id = hero.entity;
//!     let goblin = Participant::new("Goblin", 2, 7, 13);
//!     let goblin_id = goblin.entity;
//!
//!     let mut encounter = CombatEncounter::start(vec![hero, goblin])?;
//!     let conditions = ConditionTracker::new();
//!
//!     let report =
//!         encounter.resolve_attack(&conditions, hero_id, goblin_id, 5, Advantage::Normal)?;
//!     if report.outcome.hit {
//!         let damage = dnd_rules::roll_damage("1d8+3", report.outcome.is_critical)?;
//!         encounter.apply_damage(goblin_id, damage.total)?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod check;
pub mod combat;
pub mod conditions;
pub mod dice;
pub mod id;

// Primary public API
pub use check::{resolve_attack, resolve_check, AttackOutcome, CheckOutcome};
pub use combat::{
    AttackReport, CombatEncounter, CombatError, Combatant, DamageReport, HealReport, LogEntry,
    Participant,
};
pub use conditions::{
    ConditionDuration, ConditionEffects, ConditionError, ConditionInstance, ConditionKind,
    ConditionTracker, MAX_EXHAUSTION,
};
pub use dice::{
    roll, roll_damage, roll_die, roll_formula, Advantage, DiceError, DiceFormula, RollResult,
};
pub use id::{CharacterId, EncounterId, EntityId};
