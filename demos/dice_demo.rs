//! Walk through the dice and combat API from the command line.

use dnd_rules::{Advantage, CombatEncounter, ConditionTracker, Participant};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Dice ===\n");

    for notation in ["1d20", "2d6+3", "1d20-1", "8d6"] {
        let result = dnd_rules::roll(notation)?;
        println!("{notation:>8}: {result}");
    }

    let advantage = dnd_rules::roll_formula("1d20+5", Advantage::Advantage)?;
    println!("1d20+5 with advantage: {advantage}");

    let crit = dnd_rules::roll_damage("2d6+3", true)?;
    println!("2d6+3 critical damage: {crit}");

    println!("\n=== Combat ===\n");

    let hero = Participant::new("Aerith", 3, 12, 16);
    let hero_id = hero.entity;
    let goblin = Participant::new("Goblin", 2, 7, 13);
    let goblin_id = goblin.entity;

    let mut encounter = CombatEncounter::start(vec![hero, goblin])?;
    let conditions = ConditionTracker::new();

    let report = encounter.resolve_attack(&conditions, hero_id, goblin_id, 5, Advantage::Normal)?;
    if report.outcome.hit {
        let damage = dnd_rules::roll_damage("1d8+3", report.outcome.is_critical)?;
        encounter.apply_damage(goblin_id, damage.total)?;
    }

    for entry in encounter.log() {
        println!("{entry}");
    }

    Ok(())
}
