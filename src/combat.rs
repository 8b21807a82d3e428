//! D&D 5e combat encounters.
//!
//! Initiative order, turn advancement, attack resolution, and damage and
//! healing with an append-only combat log. One encounter per fight, owned
//! by the caller for its lifetime; the condition tracker stays a separate
//! caller-owned value and is borrowed only while resolving attacks.

use crate::check::{self, AttackOutcome};
use crate::conditions::ConditionTracker;
use crate::dice::{Advantage, DiceFormula};
use crate::id::{CharacterId, EncounterId, EntityId};
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Error type for combat operations.
#[derive(Debug, Error)]
pub enum CombatError {
    #[error("Cannot start an encounter with no participants")]
    EmptyEncounter,
    #[error("Participant '{0}' must have at least 1 hit point")]
    InvalidParticipant(String),
    #[error("Unknown combatant: {0}")]
    UnknownCombatant(EntityId),
    #[error("Encounter is no longer active")]
    EncounterEnded,
    #[error("Amount must be non-negative, got {0}")]
    InvalidAmount(i32),
}

/// Input descriptor for one encounter participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Key shared with the caller's `ConditionTracker`.
    pub entity: EntityId,
    /// Persistent character record, if any; improvised NPCs have none.
    pub character: Option<CharacterId>,
    pub name: String,
    pub initiative_modifier: i32,
    pub max_hp: u32,
    pub armor_class: i32,
}

impl Participant {
    pub fn new(
        name: impl Into<String>,
        initiative_modifier: i32,
        max_hp: u32,
        armor_class: i32,
    ) -> Self {
        Self {
            entity: EntityId::new(),
            character: None,
            name: name.into(),
            initiative_modifier,
            max_hp,
            armor_class,
        }
    }

    pub fn with_entity(mut self, entity: EntityId) -> Self {
        self.entity = entity;
        self
    }

    pub fn with_character(mut self, character: CharacterId) -> Self {
        self.character = Some(character);
        self
    }
}

/// A participant in a running encounter.
///
/// Hit points stay clamped to `[0, max_hp]` through every mutation; being
/// alive is derived from them, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Combatant {
    pub id: EntityId,
    pub character: Option<CharacterId>,
    pub name: String,
    pub current_hp: u32,
    pub max_hp: u32,
    pub armor_class: i32,
    pub initiative: i32,
    pub initiative_modifier: i32,
}

impl Combatant {
    pub fn is_alive(&self) -> bool {
        self.current_hp > 0
    }
}

impl fmt::Display for Combatant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} HP, AC {}, initiative {}",
            self.name, self.current_hp, self.max_hp, self.armor_class, self.initiative
        )
    }
}

/// One line of the append-only combat log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub round: u32,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[round {}] {}", self.round, self.message)
    }
}

/// Outcome of one resolved attack, before any damage is applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackReport {
    pub attacker: EntityId,
    pub target: EntityId,
    /// Net advantage state actually rolled with, after merging attacker
    /// conditions, target conditions, and the caller's override.
    pub advantage: Advantage,
    pub outcome: AttackOutcome,
}

/// Outcome of a damage application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DamageReport {
    pub target: EntityId,
    pub dealt: u32,
    pub remaining_hp: u32,
    /// True only when this application dropped the target to 0.
    pub defeated: bool,
    /// True when the damage left at most one combatant standing.
    pub encounter_ended: bool,
}

/// Outcome of a healing application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealReport {
    pub target: EntityId,
    pub healed: u32,
    pub current_hp: u32,
}

/// A running combat encounter.
///
/// Combatants sit in initiative order for the whole fight; the dead keep
/// their slot so the order and the log stay intact. The encounter ends when
/// at most one combatant is left alive or when [`CombatEncounter::end`] is
/// called, and every mutating operation on an ended encounter fails with
/// [`CombatError::EncounterEnded`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatEncounter {
    id: EncounterId,
    round: u32,
    active_index: usize,
    is_active: bool,
    combatants: Vec<Combatant>,
    log: Vec<LogEntry>,
}

impl CombatEncounter {
    /// Start an encounter: roll initiative for every participant and sort
    /// the order.
    pub fn start(participants: Vec<Participant>) -> Result<Self, CombatError> {
        Self::start_with_rng(participants, &mut OsRng)
    }

    /// Start with a specific RNG (useful for testing).
    pub fn start_with_rng<R: Rng>(
        participants: Vec<Participant>,
        rng: &mut R,
    ) -> Result<Self, CombatError> {
        if participants.is_empty() {
            return Err(CombatError::EmptyEncounter);
        }

        let mut combatants = Vec::with_capacity(participants.len());
        for p in participants {
            if p.max_hp == 0 {
                return Err(CombatError::InvalidParticipant(p.name));
            }
            let roll = DiceFormula::d20().roll_with_rng(Advantage::Normal, rng);
            combatants.push(Combatant {
                id: p.entity,
                character: p.character,
                name: p.name,
                current_hp: p.max_hp,
                max_hp: p.max_hp,
                armor_class: p.armor_class,
                initiative: roll.total + p.initiative_modifier,
                initiative_modifier: p.initiative_modifier,
            });
        }

        // Highest initiative first; ties go to the higher modifier, then to
        // whoever joined first (the sort is stable).
        combatants.sort_by(|a, b| {
            b.initiative
                .cmp(&a.initiative)
                .then_with(|| b.initiative_modifier.cmp(&a.initiative_modifier))
        });

        let order = combatants
            .iter()
            .map(|c| format!("{} ({})", c.name, c.initiative))
            .collect::<Vec<_>>()
            .join(", ");

        let mut encounter = Self {
            id: EncounterId::new(),
            round: 1,
            active_index: 0,
            is_active: true,
            combatants,
            log: Vec::new(),
        };
        encounter.push_log(format!("Combat begins! Initiative order: {order}"));
        debug!(encounter = %encounter.id, "combat started");
        Ok(encounter)
    }

    pub fn id(&self) -> EncounterId {
        self.id
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Combatants in initiative order, the dead included.
    pub fn combatants(&self) -> &[Combatant] {
        &self.combatants
    }

    /// The append-only combat log.
    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    /// The combatant whose turn it is, or `None` once the encounter ended.
    pub fn current_turn(&self) -> Option<&Combatant> {
        if !self.is_active {
            return None;
        }
        self.combatants.get(self.active_index)
    }

    /// Advance to the next living combatant's turn.
    ///
    /// Wrapping past the end of the order starts a new round. Returns the
    /// combatant now acting, or `Ok(None)` if at most one combatant was
    /// still alive and the encounter ended instead.
    pub fn advance_turn(&mut self) -> Result<Option<&Combatant>, CombatError> {
        if !self.is_active {
            return Err(CombatError::EncounterEnded);
        }

        if self.living_count() <= 1 {
            self.finish();
            return Ok(None);
        }

        self.advance_to_next_living();
        Ok(self.combatants.get(self.active_index))
    }

    /// Resolve an attack between two combatants. Rolls to hit and logs the
    /// result; damage is the caller's separate [`CombatEncounter::apply_damage`]
    /// call, so narration and damage-type choices can happen in between.
    pub fn resolve_attack(
        &mut self,
        conditions: &ConditionTracker,
        attacker: EntityId,
        target: EntityId,
        attack_bonus: i32,
        advantage_override: Advantage,
    ) -> Result<AttackReport, CombatError> {
        self.resolve_attack_with_rng(
            conditions,
            attacker,
            target,
            attack_bonus,
            advantage_override,
            &mut OsRng,
        )
    }

    /// Resolve an attack with a specific RNG.
    pub fn resolve_attack_with_rng<R: Rng>(
        &mut self,
        conditions: &ConditionTracker,
        attacker: EntityId,
        target: EntityId,
        attack_bonus: i32,
        advantage_override: Advantage,
        rng: &mut R,
    ) -> Result<AttackReport, CombatError> {
        if !self.is_active {
            return Err(CombatError::EncounterEnded);
        }
        let attacker_name = self.combatant(attacker)?.name.clone();
        let target_combatant = self.combatant(target)?;
        let target_name = target_combatant.name.clone();
        let target_ac = target_combatant.armor_class;

        // Net advantage: the attacker's own conditions, what the target's
        // conditions concede to incoming attacks, and whatever the caller
        // knows that this engine does not (cover, Frightened visibility,
        // Prone proximity).
        let advantage = conditions
            .effects_for(attacker)
            .attack_advantage_state()
            .combine(conditions.effects_for(target).attacks_against_state())
            .combine(advantage_override);

        let outcome = check::resolve_attack_with_rng(attack_bonus, target_ac, advantage, rng);

        let message = if outcome.hit {
            if outcome.is_critical {
                format!(
                    "CRITICAL HIT! {attacker_name} strikes {target_name} ({} vs AC {target_ac})",
                    outcome.total
                )
            } else {
                format!(
                    "{attacker_name} hits {target_name} ({} vs AC {target_ac})",
                    outcome.total
                )
            }
        } else if outcome.is_fumble {
            format!("{attacker_name} critically misses {target_name}!")
        } else {
            format!(
                "{attacker_name} misses {target_name} ({} vs AC {target_ac})",
                outcome.total
            )
        };
        self.push_log(message);

        Ok(AttackReport {
            attacker,
            target,
            advantage,
            outcome,
        })
    }

    /// Apply damage to a combatant, clamping at 0 HP.
    ///
    /// A combatant dropped to 0 is logged as defeated, and the encounter
    /// ends if at most one combatant remains alive afterwards.
    pub fn apply_damage(
        &mut self,
        target: EntityId,
        amount: i32,
    ) -> Result<DamageReport, CombatError> {
        if !self.is_active {
            return Err(CombatError::EncounterEnded);
        }
        if amount < 0 {
            return Err(CombatError::InvalidAmount(amount));
        }

        let combatant = self.combatant_mut(target)?;
        let dealt = amount as u32;
        let was_alive = combatant.is_alive();
        combatant.current_hp = combatant.current_hp.saturating_sub(dealt);

        let remaining_hp = combatant.current_hp;
        let max_hp = combatant.max_hp;
        let defeated = was_alive && !combatant.is_alive();
        let name = combatant.name.clone();

        self.push_log(format!(
            "{name} takes {dealt} damage ({remaining_hp}/{max_hp} HP remaining)"
        ));
        if defeated {
            self.push_log(format!("{name} has been defeated!"));
            debug!(encounter = %self.id, combatant = %name, "combatant defeated");
        }

        let mut encounter_ended = false;
        if self.living_count() <= 1 {
            self.finish();
            encounter_ended = true;
        } else if !self.combatants[self.active_index].is_alive() {
            // Damage outside the active combatant's own turn can kill them;
            // the active slot must keep pointing at someone living.
            self.advance_to_next_living();
        }

        Ok(DamageReport {
            target,
            dealt,
            remaining_hp,
            defeated,
            encounter_ended,
        })
    }

    /// Apply healing to a combatant, clamping at max HP.
    ///
    /// Healing never brings back a combatant at 0 HP (the report shows 0
    /// healed); that takes an explicit [`CombatEncounter::revive`] once the
    /// caller's death rules allow it.
    pub fn apply_healing(
        &mut self,
        target: EntityId,
        amount: i32,
    ) -> Result<HealReport, CombatError> {
        if !self.is_active {
            return Err(CombatError::EncounterEnded);
        }
        if amount < 0 {
            return Err(CombatError::InvalidAmount(amount));
        }

        let combatant = self.combatant_mut(target)?;
        if !combatant.is_alive() {
            return Ok(HealReport {
                target,
                healed: 0,
                current_hp: 0,
            });
        }

        let before = combatant.current_hp;
        combatant.current_hp = combatant
            .current_hp
            .saturating_add(amount as u32)
            .min(combatant.max_hp);
        let healed = combatant.current_hp - before;
        let current_hp = combatant.current_hp;
        let max_hp = combatant.max_hp;
        let name = combatant.name.clone();

        self.push_log(format!("{name} heals {healed} HP ({current_hp}/{max_hp} HP)"));
        Ok(HealReport {
            target,
            healed,
            current_hp,
        })
    }

    /// Explicitly restore a combatant at 0 HP to `hp` (at least 1, at most
    /// their maximum). This is the revival policy hook: death saves and
    /// revival thresholds live with the caller, not here.
    pub fn revive(&mut self, target: EntityId, hp: u32) -> Result<HealReport, CombatError> {
        if !self.is_active {
            return Err(CombatError::EncounterEnded);
        }
        let combatant = self.combatant_mut(target)?;
        let was_down = !combatant.is_alive();
        combatant.current_hp = hp.clamp(1, combatant.max_hp);
        let current_hp = combatant.current_hp;
        let name = combatant.name.clone();

        if was_down {
            self.push_log(format!("{name} is back on their feet with {current_hp} HP!"));
        }
        Ok(HealReport {
            target,
            healed: current_hp,
            current_hp,
        })
    }

    /// End the encounter regardless of who is still standing.
    pub fn end(&mut self) -> Result<(), CombatError> {
        if !self.is_active {
            return Err(CombatError::EncounterEnded);
        }
        self.is_active = false;
        self.push_log("Combat ended by DM.".to_string());
        debug!(encounter = %self.id, round = self.round, "combat ended manually");
        Ok(())
    }

    fn living_count(&self) -> usize {
        self.combatants.iter().filter(|c| c.is_alive()).count()
    }

    fn combatant(&self, id: EntityId) -> Result<&Combatant, CombatError> {
        self.combatants
            .iter()
            .find(|c| c.id == id)
            .ok_or(CombatError::UnknownCombatant(id))
    }

    fn combatant_mut(&mut self, id: EntityId) -> Result<&mut Combatant, CombatError> {
        self.combatants
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(CombatError::UnknownCombatant(id))
    }

    /// Move the active index forward to the next living combatant, rolling
    /// the round over on wrap. Callers guarantee at least two are alive.
    fn advance_to_next_living(&mut self) {
        loop {
            self.active_index += 1;
            if self.active_index >= self.combatants.len() {
                self.active_index = 0;
                self.round += 1;
                let round = self.round;
                self.push_log(format!("Round {round} begins."));
            }
            if self.combatants[self.active_index].is_alive() {
                break;
            }
        }
    }

    fn finish(&mut self) {
        let message = {
            let living: Vec<&Combatant> = self.combatants.iter().filter(|c| c.is_alive()).collect();
            match living.as_slice() {
                [last] => format!("Combat ends! {} is the last one standing.", last.name),
                [] => "Combat ends! No one is left standing.".to_string(),
                _ => "Combat ends!".to_string(),
            }
        };
        self.is_active = false;
        self.push_log(message);
        debug!(encounter = %self.id, round = self.round, "combat ended");
    }

    fn push_log(&mut self, message: String) {
        self.log.push(LogEntry {
            round: self.round,
            message,
        });
    }
}
