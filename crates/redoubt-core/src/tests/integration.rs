//! End-to-end tests of the placement/battle/round-end flow.

use glam::Vec3;

use crate::context::Terrain;
use crate::entity::{Side, UnitKind};
use crate::events::SimEvent;
use crate::phase::PhaseKind;
use crate::simulation::Simulation;

use super::helpers::{run_ticks, setup_battle, skirmish_config};

/// Steps until the battle phase ends or the tick limit runs out.
fn run_until_battle_ends(sim: &mut Simulation, max_ticks: u32) {
    for _ in 0..max_ticks {
        sim.step();
        if sim.phase() != PhaseKind::Battle {
            return;
        }
    }
    panic!("battle did not resolve within {max_ticks} ticks");
}

#[test]
fn melee_battle_resolves_with_a_winner() {
    let mut sim = Simulation::with_config(11, skirmish_config(), Terrain::default());
    setup_battle(&mut sim, UnitKind::Footman, UnitKind::Footman);

    run_until_battle_ends(&mut sim, 3000);

    let events = sim.drain_events();
    let outcome = events
        .iter()
        .find_map(|e| match e {
            SimEvent::RoundResolved { outcome } => Some(*outcome),
            _ => None,
        })
        .expect("a round outcome");
    assert!(outcome.winner.is_some(), "symmetric melee still picks a winner");
    assert!(outcome.damage > 0);
}

#[test]
fn ranged_units_win_from_standoff_distance() {
    let mut sim = Simulation::with_config(13, skirmish_config(), Terrain::default());
    setup_battle(&mut sim, UnitKind::Archer, UnitKind::Footman);

    run_until_battle_ends(&mut sim, 4000);

    let events = sim.drain_events();
    // The archer opened fire: projectiles were launched and hit.
    assert!(events
        .iter()
        .any(|e| matches!(e, SimEvent::ProjectileLaunched { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, SimEvent::ProjectileImpact { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, SimEvent::EntityDied { .. })));
}

#[test]
fn mortar_splash_hits_clustered_enemies() {
    let mut config = skirmish_config();
    // A 3-man cluster for the shell to land in, and a mortar sturdy and
    // fast-firing enough to shell it at point-blank range.
    config.catalog.get_mut(&UnitKind::Footman).unwrap().squad_size = 3;
    {
        let mortar = config.catalog.get_mut(&UnitKind::Mortar).unwrap();
        mortar.hp = 300;
        mortar.attack_interval = 1.0;
    }
    let mut sim = Simulation::with_config(17, config, Terrain::default());
    setup_battle(&mut sim, UnitKind::Mortar, UnitKind::Footman);

    // Let a few shells land without requiring full resolution.
    run_ticks(&mut sim, 900);

    let events = sim.drain_events();
    // The mortar's element is fire; only its splash deals fire damage.
    let splash_hits: usize = events
        .iter()
        .filter(|e| {
            matches!(
                e,
                SimEvent::DamageApplied {
                    element: crate::entity::Element::Fire,
                    ..
                }
            )
        })
        .count();
    assert!(
        splash_hits >= 2,
        "expected shells to splash the clustered squad, saw {splash_hits} fire hits"
    );
}

#[test]
fn rounds_chain_into_a_campaign_until_game_over() {
    let mut config = skirmish_config();
    // One lost round ends the match.
    config.team_health = 10;
    config.round_end_seconds = 0.5;
    let mut sim = Simulation::with_config(19, config, Terrain::default());
    setup_battle(&mut sim, UnitKind::Footman, UnitKind::Footman);

    run_until_battle_ends(&mut sim, 3000);

    assert_eq!(sim.phase(), PhaseKind::Complete, "pool of 10 cannot survive");
    assert!(sim.winner().is_some());

    // Terminal: further orders are rejected, stepping is harmless.
    assert!(sim.place_squad(Side::Home, UnitKind::Footman, Vec3::ZERO).is_err());
    run_ticks(&mut sim, 10);
    assert_eq!(sim.phase(), PhaseKind::Complete);
}

#[test]
fn next_round_placement_reuses_surviving_gold() {
    let mut config = skirmish_config();
    config.round_end_seconds = 0.2;
    let mut sim = Simulation::with_config(23, config, Terrain::default());
    let gold_start = sim.gold(Side::Home);
    setup_battle(&mut sim, UnitKind::Footman, UnitKind::Footman);

    run_until_battle_ends(&mut sim, 3000);
    assert_eq!(sim.phase(), PhaseKind::RoundEnd);

    // Ride out the intermission into round 2.
    run_ticks(&mut sim, 60);
    assert_eq!(sim.phase(), PhaseKind::Placement);
    assert_eq!(sim.round(), 2);

    // Income arrived; a new placement works and the roster grew.
    let cost = sim.config().unit_spec(UnitKind::Footman).unwrap().cost;
    assert!(sim.gold(Side::Home) >= gold_start - cost);
    let roster_before = sim.roster().len();
    sim.place_squad(Side::Home, UnitKind::Archer, Vec3::new(-4.0, 0.0, 0.0))
        .expect("second-round placement");
    assert_eq!(sim.roster().len(), roster_before + 1);
}

#[test]
fn placement_countdown_starts_the_battle_without_readiness() {
    let mut config = skirmish_config();
    config.placement_seconds = 0.5;
    let mut sim = Simulation::with_config(29, config, Terrain::default());
    sim.place_squad(Side::Home, UnitKind::Footman, Vec3::new(-3.0, 0.0, 0.0))
        .unwrap();
    sim.place_squad(Side::Away, UnitKind::Footman, Vec3::new(3.0, 0.0, 0.0))
        .unwrap();

    // Nobody readies up; the countdown forces the transition.
    run_ticks(&mut sim, 45);
    assert_eq!(sim.phase(), PhaseKind::Battle);
}

#[test]
fn phase_changes_are_announced_as_events() {
    let mut config = skirmish_config();
    config.placement_seconds = 0.2;
    let mut sim = Simulation::with_config(31, config, Terrain::default());

    run_ticks(&mut sim, 30);

    let events = sim.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        SimEvent::PhaseChanged {
            from: PhaseKind::Placement,
            to: PhaseKind::Battle,
            ..
        }
    )));
}
