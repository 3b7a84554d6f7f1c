//! Test helper functions for setting up simulations and battles.

use glam::Vec3;

use crate::arena::Arena;
use crate::config::SimConfig;
use crate::entity::{
    Combat, EntityId, EntityProto, Health, Order, PlacementId, Side, Team, Transform, Unit,
    UnitFlags, UnitKind, Velocity,
};
use crate::simulation::Simulation;

/// A configuration tuned so battles resolve within a few simulated
/// seconds: tiny squads, low hit points, no crits.
#[must_use]
pub fn skirmish_config() -> SimConfig {
    let mut config = SimConfig::default();
    for spec in config.catalog.values_mut() {
        spec.hp = spec.hp.min(30);
        spec.squad_size = 1;
        spec.crit_chance = 0.0;
    }
    config
}

/// Places one squad per side facing each other and starts the battle.
///
/// Returns the two placement ids (home, away).
pub fn setup_battle(
    sim: &mut Simulation,
    home: UnitKind,
    away: UnitKind,
) -> (PlacementId, PlacementId) {
    let home_id = sim
        .place_squad(Side::Home, home, Vec3::new(-3.0, 0.0, 0.0))
        .expect("home placement");
    let away_id = sim
        .place_squad(Side::Away, away, Vec3::new(3.0, 0.0, 0.0))
        .expect("away placement");
    sim.set_ready(Side::Home).expect("home ready");
    sim.set_ready(Side::Away).expect("away ready");
    sim.step();
    (home_id, away_id)
}

/// Steps the simulation `ticks` times.
pub fn run_ticks(sim: &mut Simulation, ticks: u32) {
    for _ in 0..ticks {
        sim.step();
    }
}

/// Spawns a bare combat unit directly into an arena (bypassing placement
/// rules), for system-level scenarios.
pub fn spawn_unit(arena: &mut Arena, side: Side, position: Vec3) -> EntityId {
    arena.spawn(EntityProto {
        flags: UnitFlags::GRAVITY,
        transform: Some(Transform::at(position)),
        velocity: Some(Velocity::with_max_speed(2.6)),
        health: Some(Health::new(100)),
        team: Some(Team::new(side)),
        unit: Some(Unit::default()),
        combat: Some(Combat::default()),
        order: Some(Order::default()),
        ..EntityProto::default()
    })
}

/// Current position of an entity.
#[must_use]
pub fn get_position(arena: &Arena, id: EntityId) -> Vec3 {
    arena
        .get(id)
        .and_then(|e| e.transform())
        .map(|t| t.position)
        .expect("entity has a transform")
}

/// Current hit points of an entity.
#[must_use]
pub fn get_hp(arena: &Arena, id: EntityId) -> i32 {
    arena
        .get(id)
        .and_then(|e| e.health())
        .map(|h| h.current)
        .expect("entity has health")
}

/// Serializes the arena for bit-exact comparison between runs.
#[must_use]
pub fn arena_digest(arena: &Arena) -> String {
    serde_json::to_string(arena).expect("arena serializes")
}
