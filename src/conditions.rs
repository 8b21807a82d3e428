//! D&D 5e conditions and per-entity status tracking.
//!
//! Two halves: [`ConditionKind`] is the registry of the SRD conditions and
//! what each contributes mechanically; [`ConditionTracker`] owns active
//! instances per entity, advances durations round by round, and folds
//! everything into one [`ConditionEffects`] record for the combat layer.
//!
//! Exhaustion is not an instance like the others: it is a per-entity
//! integer level from 0 to 6, with each level keeping the penalties of the
//! ones below it.

use crate::dice::Advantage;
use crate::id::EntityId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Exhaustion caps at level 6, which the SRD defines as death.
pub const MAX_EXHAUSTION: u8 = 6;

/// Error type for condition tracking.
#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("Exhaustion level must be 0-{MAX_EXHAUSTION}, got {0}")]
    InvalidExhaustionLevel(u8),
}

/// The 14 boolean SRD conditions (PHB Appendix A). Exhaustion is tracked
/// separately as a level, see [`ConditionTracker::set_exhaustion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionKind {
    Blinded,
    Charmed,
    Deafened,
    Frightened,
    Grappled,
    Incapacitated,
    Invisible,
    Paralyzed,
    Petrified,
    Poisoned,
    Prone,
    Restrained,
    Stunned,
    Unconscious,
}

impl ConditionKind {
    pub const ALL: [ConditionKind; 14] = [
        ConditionKind::Blinded,
        ConditionKind::Charmed,
        ConditionKind::Deafened,
        ConditionKind::Frightened,
        ConditionKind::Grappled,
        ConditionKind::Incapacitated,
        ConditionKind::Invisible,
        ConditionKind::Paralyzed,
        ConditionKind::Petrified,
        ConditionKind::Poisoned,
        ConditionKind::Prone,
        ConditionKind::Restrained,
        ConditionKind::Stunned,
        ConditionKind::Unconscious,
    ];

    /// Get the condition name for display
    pub fn name(&self) -> &'static str {
        match self {
            ConditionKind::Blinded => "Blinded",
            ConditionKind::Charmed => "Charmed",
            ConditionKind::Deafened => "Deafened",
            ConditionKind::Frightened => "Frightened",
            ConditionKind::Grappled => "Grappled",
            ConditionKind::Incapacitated => "Incapacitated",
            ConditionKind::Invisible => "Invisible",
            ConditionKind::Paralyzed => "Paralyzed",
            ConditionKind::Petrified => "Petrified",
            ConditionKind::Poisoned => "Poisoned",
            ConditionKind::Prone => "Prone",
            ConditionKind::Restrained => "Restrained",
            ConditionKind::Stunned => "Stunned",
            ConditionKind::Unconscious => "Unconscious",
        }
    }

    /// Short rules summary for display.
    pub fn description(&self) -> &'static str {
        match self {
            ConditionKind::Blinded => {
                "Cannot see; attack rolls have disadvantage and attacks \
                 against have advantage"
            }
            ConditionKind::Charmed => {
                "Cannot attack the charmer or target them with harmful \
                 effects; the charmer has advantage on social checks"
            }
            ConditionKind::Deafened => {
                "Cannot hear; automatically fails checks that require hearing"
            }
            ConditionKind::Frightened => {
                "Disadvantage on checks and attacks while the source of fear \
                 is in sight; cannot willingly move closer to it"
            }
            ConditionKind::Grappled => {
                "Speed is 0; ends if the grappler is incapacitated or moved \
                 away"
            }
            ConditionKind::Incapacitated => "Cannot take actions or reactions",
            ConditionKind::Invisible => {
                "Cannot be seen without magic; attack rolls have advantage \
                 and attacks against have disadvantage"
            }
            ConditionKind::Paralyzed => {
                "Incapacitated, cannot move or speak; auto-fails Strength \
                 and Dexterity saves; attacks against have advantage, and \
                 hits from within 5 feet are critical"
            }
            ConditionKind::Petrified => {
                "Turned to stone; incapacitated and unaware; auto-fails \
                 Strength and Dexterity saves; attacks against have \
                 advantage; resistant to all damage"
            }
            ConditionKind::Poisoned => {
                "Disadvantage on attack rolls and ability checks"
            }
            ConditionKind::Prone => {
                "Attack rolls have disadvantage; attacks against have \
                 advantage from within 5 feet, disadvantage beyond"
            }
            ConditionKind::Restrained => {
                "Speed is 0; attack rolls have disadvantage, attacks against \
                 have advantage; disadvantage on Dexterity saves"
            }
            ConditionKind::Stunned => {
                "Incapacitated, cannot move; auto-fails Strength and \
                 Dexterity saves; attacks against have advantage"
            }
            ConditionKind::Unconscious => {
                "Incapacitated, prone, and unaware; auto-fails Strength and \
                 Dexterity saves; attacks against have advantage, and hits \
                 from within 5 feet are critical"
            }
        }
    }

    /// Check if this condition prevents taking actions
    pub fn is_incapacitating(&self) -> bool {
        matches!(
            self,
            ConditionKind::Incapacitated
                | ConditionKind::Paralyzed
                | ConditionKind::Petrified
                | ConditionKind::Stunned
                | ConditionKind::Unconscious
        )
    }

    /// Check if this condition reduces speed to 0
    pub fn zeroes_speed(&self) -> bool {
        matches!(
            self,
            ConditionKind::Grappled
                | ConditionKind::Paralyzed
                | ConditionKind::Petrified
                | ConditionKind::Restrained
                | ConditionKind::Stunned
                | ConditionKind::Unconscious
        )
    }

    /// Attack roll advantage granted by this condition to its bearer.
    /// `Some(true)` is advantage, `Some(false)` disadvantage.
    pub fn attack_advantage(&self) -> Option<bool> {
        match self {
            ConditionKind::Blinded
            | ConditionKind::Frightened
            | ConditionKind::Poisoned
            | ConditionKind::Prone
            | ConditionKind::Restrained => Some(false),
            ConditionKind::Invisible => Some(true),
            _ => None,
        }
    }

    /// Advantage on attack rolls made against the bearer. Prone is absent
    /// on purpose: its against-advantage depends on attacker proximity,
    /// which is the caller's to judge via [`ConditionEffects::is_prone`].
    pub fn attacks_against_advantage(&self) -> Option<bool> {
        match self {
            ConditionKind::Blinded
            | ConditionKind::Paralyzed
            | ConditionKind::Petrified
            | ConditionKind::Restrained
            | ConditionKind::Stunned
            | ConditionKind::Unconscious => Some(true),
            ConditionKind::Invisible => Some(false),
            _ => None,
        }
    }

    /// Check if this condition imposes disadvantage on ability checks
    pub fn check_disadvantage(&self) -> bool {
        matches!(self, ConditionKind::Frightened | ConditionKind::Poisoned)
    }

    /// Check if this condition auto-fails Strength and Dexterity saves
    pub fn auto_fails_str_dex_saves(&self) -> bool {
        matches!(
            self,
            ConditionKind::Paralyzed
                | ConditionKind::Petrified
                | ConditionKind::Stunned
                | ConditionKind::Unconscious
        )
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How long a condition lasts.
///
/// Re-application compares durations under the total order
/// `Permanent > UntilSave > Rounds(n)`, round counts numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionDuration {
    /// Ends after this many round advancements.
    Rounds(u32),
    /// Ends on a successful save against this DC; the tracker never rolls
    /// the save itself, the caller resolves it and calls `remove`.
    UntilSave { dc: u8 },
    /// Lasts until explicitly removed.
    Permanent,
}

impl ConditionDuration {
    fn rank(&self) -> (u8, u32) {
        match self {
            ConditionDuration::Rounds(n) => (0, *n),
            ConditionDuration::UntilSave { .. } => (1, 0),
            ConditionDuration::Permanent => (2, 0),
        }
    }

    /// True if this duration outlasts `other` (ties do not).
    pub fn outlasts(&self, other: &ConditionDuration) -> bool {
        self.rank() > other.rank()
    }
}

impl fmt::Display for ConditionDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionDuration::Rounds(n) => {
                write!(f, "{} round{}", n, if *n == 1 { "" } else { "s" })
            }
            ConditionDuration::UntilSave { dc } => write!(f, "until DC {dc} save"),
            ConditionDuration::Permanent => write!(f, "permanent"),
        }
    }
}

/// One applied condition on one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionInstance {
    pub kind: ConditionKind,
    pub duration: ConditionDuration,
    /// Narrative origin ("ghoul claws", "web spell").
    pub source: String,
    /// Display only; expiry decisions never read this.
    pub applied_at: DateTime<Utc>,
}

impl ConditionInstance {
    pub fn is_expired(&self) -> bool {
        matches!(self.duration, ConditionDuration::Rounds(0))
    }

    pub fn remaining_rounds(&self) -> Option<u32> {
        match self.duration {
            ConditionDuration::Rounds(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for ConditionInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) [source: {}]",
            self.kind, self.duration, self.source
        )
    }
}

/// Aggregated mechanical effects of everything active on one entity.
///
/// Opposed advantage/disadvantage pairs are already cancelled: if one
/// condition grants advantage on attack rolls and another imposes
/// disadvantage, both flags come back false. This single record, not
/// per-condition queries, is what the combat layer consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionEffects {
    pub can_take_actions: bool,
    pub can_move: bool,
    pub attack_advantage: bool,
    pub attack_disadvantage: bool,
    pub attacks_against_advantage: bool,
    pub attacks_against_disadvantage: bool,
    pub ability_check_disadvantage: bool,
    /// Disadvantage on all saving throws (Exhaustion level 3+).
    pub saving_throw_disadvantage: bool,
    /// Disadvantage on Dexterity saves specifically (Restrained).
    pub dexterity_save_disadvantage: bool,
    pub auto_fail_strength_saves: bool,
    pub auto_fail_dexterity_saves: bool,
    /// `Some(0)` while any speed-zeroing condition is active.
    pub speed_override: Option<u32>,
    /// Speed halved (Exhaustion level 2+).
    pub speed_halved: bool,
    /// Hit point maximum halved (Exhaustion level 4+).
    pub hp_max_halved: bool,
    /// Resistance to all damage (Petrified).
    pub damage_resistance: bool,
    /// Proximity-dependent against-advantage is the caller's call; this
    /// flag is the input to that call.
    pub is_prone: bool,
    pub exhaustion_level: u8,
    /// Active condition kinds, for display.
    pub active: Vec<ConditionKind>,
}

impl Default for ConditionEffects {
    fn default() -> Self {
        Self {
            can_take_actions: true,
            can_move: true,
            attack_advantage: false,
            attack_disadvantage: false,
            attacks_against_advantage: false,
            attacks_against_disadvantage: false,
            ability_check_disadvantage: false,
            saving_throw_disadvantage: false,
            dexterity_save_disadvantage: false,
            auto_fail_strength_saves: false,
            auto_fail_dexterity_saves: false,
            speed_override: None,
            speed_halved: false,
            hp_max_halved: false,
            damage_resistance: false,
            is_prone: false,
            exhaustion_level: 0,
            active: Vec::new(),
        }
    }
}

impl ConditionEffects {
    /// The bearer's own attack rolls, as a single advantage state.
    pub fn attack_advantage_state(&self) -> Advantage {
        match (self.attack_advantage, self.attack_disadvantage) {
            (true, false) => Advantage::Advantage,
            (false, true) => Advantage::Disadvantage,
            _ => Advantage::Normal,
        }
    }

    /// Attack rolls made against the bearer, as a single advantage state.
    pub fn attacks_against_state(&self) -> Advantage {
        match (
            self.attacks_against_advantage,
            self.attacks_against_disadvantage,
        ) {
            (true, false) => Advantage::Advantage,
            (false, true) => Advantage::Disadvantage,
            _ => Advantage::Normal,
        }
    }

    pub fn is_incapacitated(&self) -> bool {
        !self.can_take_actions
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct EntityConditions {
    conditions: Vec<ConditionInstance>,
    exhaustion: u8,
}

/// Per-entity collection of active condition instances.
///
/// Owned by the caller alongside its `CombatEncounter`; one tracker per
/// game session, no internal locking.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionTracker {
    entities: HashMap<EntityId, EntityConditions>,
}

impl ConditionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a condition to an entity.
    ///
    /// Re-applying a kind the entity already has keeps whichever duration
    /// is longer (`Permanent > UntilSave > Rounds`, rounds numerically);
    /// conditions never stack.
    pub fn apply(
        &mut self,
        entity: EntityId,
        kind: ConditionKind,
        duration: ConditionDuration,
        source: impl Into<String>,
    ) -> &ConditionInstance {
        let entry = self.entities.entry(entity).or_default();
        let instance = ConditionInstance {
            kind,
            duration,
            source: source.into(),
            applied_at: Utc::now(),
        };

        let index = match entry.conditions.iter().position(|c| c.kind == kind) {
            Some(i) => {
                if instance.duration.outlasts(&entry.conditions[i].duration) {
                    entry.conditions[i] = instance;
                }
                i
            }
            None => {
                entry.conditions.push(instance);
                entry.conditions.len() - 1
            }
        };

        debug!(%entity, condition = %entry.conditions[index].kind, duration = %entry.conditions[index].duration, "condition applied");
        &entry.conditions[index]
    }

    /// Remove a condition from an entity. Returns false (not an error) if
    /// the entity did not have it.
    pub fn remove(&mut self, entity: EntityId, kind: ConditionKind) -> bool {
        let Some(entry) = self.entities.get_mut(&entity) else {
            return false;
        };
        let before = entry.conditions.len();
        entry.conditions.retain(|c| c.kind != kind);
        before != entry.conditions.len()
    }

    /// Check if an entity currently has a condition.
    pub fn has_condition(&self, entity: EntityId, kind: ConditionKind) -> bool {
        self.entities
            .get(&entity)
            .map(|e| {
                e.conditions
                    .iter()
                    .any(|c| c.kind == kind && !c.is_expired())
            })
            .unwrap_or(false)
    }

    /// All active (non-expired) instances on an entity.
    pub fn active_conditions(&self, entity: EntityId) -> Vec<&ConditionInstance> {
        self.entities
            .get(&entity)
            .map(|e| e.conditions.iter().filter(|c| !c.is_expired()).collect())
            .unwrap_or_default()
    }

    /// Advance an entity's round-counted conditions by one round.
    ///
    /// Returns the kinds that expired this call so the caller can narrate
    /// them; expired instances are purged.
    pub fn advance_round(&mut self, entity: EntityId) -> Vec<ConditionKind> {
        let Some(entry) = self.entities.get_mut(&entity) else {
            return Vec::new();
        };

        let mut expired = Vec::new();
        for condition in &mut entry.conditions {
            if let ConditionDuration::Rounds(ref mut remaining) = condition.duration {
                *remaining = remaining.saturating_sub(1);
                if *remaining == 0 {
                    expired.push(condition.kind);
                }
            }
        }
        entry.conditions.retain(|c| !c.is_expired());

        if !expired.is_empty() {
            debug!(%entity, ?expired, "conditions expired");
        }
        expired
    }

    /// Clear every condition and reset exhaustion on an entity. Returns how
    /// many active instances were dropped.
    pub fn clear_all(&mut self, entity: EntityId) -> usize {
        let Some(entry) = self.entities.get_mut(&entity) else {
            return 0;
        };
        let count = entry.conditions.iter().filter(|c| !c.is_expired()).count();
        entry.conditions.clear();
        entry.exhaustion = 0;
        count
    }

    /// Set an entity's exhaustion level directly (0 clears it).
    pub fn set_exhaustion(&mut self, entity: EntityId, level: u8) -> Result<(), ConditionError> {
        if level > MAX_EXHAUSTION {
            return Err(ConditionError::InvalidExhaustionLevel(level));
        }
        self.entities.entry(entity).or_default().exhaustion = level;
        Ok(())
    }

    /// Add exhaustion levels, clamped at 6. Returns the new level.
    pub fn add_exhaustion(&mut self, entity: EntityId, levels: u8) -> u8 {
        let entry = self.entities.entry(entity).or_default();
        entry.exhaustion = entry.exhaustion.saturating_add(levels).min(MAX_EXHAUSTION);
        entry.exhaustion
    }

    /// An entity's exhaustion level, 0 if none.
    pub fn exhaustion_level(&self, entity: EntityId) -> u8 {
        self.entities.get(&entity).map(|e| e.exhaustion).unwrap_or(0)
    }

    /// Aggregate everything active on an entity into one effects record.
    pub fn effects_for(&self, entity: EntityId) -> ConditionEffects {
        let mut effects = ConditionEffects::default();
        let Some(entry) = self.entities.get(&entity) else {
            return effects;
        };

        let mut attack_adv = false;
        let mut attack_dis = false;
        let mut against_adv = false;
        let mut against_dis = false;

        for condition in entry.conditions.iter().filter(|c| !c.is_expired()) {
            effects.active.push(condition.kind);

            if condition.kind.is_incapacitating() {
                effects.can_take_actions = false;
            }
            if condition.kind.zeroes_speed() {
                effects.speed_override = Some(0);
                effects.can_move = false;
            }
            match condition.kind.attack_advantage() {
                Some(true) => attack_adv = true,
                Some(false) => attack_dis = true,
                None => {}
            }
            match condition.kind.attacks_against_advantage() {
                Some(true) => against_adv = true,
                Some(false) => against_dis = true,
                None => {}
            }
            if condition.kind.check_disadvantage() {
                effects.ability_check_disadvantage = true;
            }
            if condition.kind.auto_fails_str_dex_saves() {
                effects.auto_fail_strength_saves = true;
                effects.auto_fail_dexterity_saves = true;
            }
            match condition.kind {
                ConditionKind::Prone | ConditionKind::Unconscious => effects.is_prone = true,
                ConditionKind::Restrained => effects.dexterity_save_disadvantage = true,
                ConditionKind::Petrified => effects.damage_resistance = true,
                _ => {}
            }
        }

        // Exhaustion is cumulative: every level keeps the penalties below it.
        let level = entry.exhaustion;
        effects.exhaustion_level = level;
        if level >= 1 {
            effects.ability_check_disadvantage = true;
        }
        if level >= 2 {
            effects.speed_halved = true;
        }
        if level >= 3 {
            attack_dis = true;
            effects.saving_throw_disadvantage = true;
        }
        if level >= 4 {
            effects.hp_max_halved = true;
        }
        if level >= 5 {
            effects.speed_override = Some(0);
            effects.can_move = false;
        }

        // Opposed sources cancel rather than stack, the same rule as
        // Advantage::combine.
        effects.attack_advantage = attack_adv && !attack_dis;
        effects.attack_disadvantage = attack_dis && !attack_adv;
        effects.attacks_against_advantage = against_adv && !against_dis;
        effects.attacks_against_disadvantage = against_dis && !against_adv;

        effects
    }
}
