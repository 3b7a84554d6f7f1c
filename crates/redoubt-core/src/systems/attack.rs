//! Targeting and auto attacks.
//!
//! Every living combat unit picks a target (explicit order first, then the
//! last entity that hit it, then the nearest living enemy), anchors itself
//! while in range, and attacks on its cooldown: melee through the damage
//! pipeline, ranged by firing a projectile. Runs in sorted id order during
//! the battle phase; the anchored flag it maintains is what the movement
//! system consumes next tick.

use rand::Rng;

use crate::arena::Arena;
use crate::context::TickContext;
use crate::entity::{ComponentMask, EntityId, Side, UnitFlags};
use crate::systems::combat::{self, DamageOptions};
use crate::systems::projectile;

/// Runs targeting and attacks for every combat unit.
pub fn run(arena: &mut Arena, ctx: &mut TickContext<'_>) {
    let attackers = arena.ids_with(
        ComponentMask::TRANSFORM
            | ComponentMask::HEALTH
            | ComponentMask::TEAM
            | ComponentMask::COMBAT
            | ComponentMask::UNIT,
    );
    for id in attackers {
        step_one(arena, ctx, id);
    }
}

fn step_one(arena: &mut Arena, ctx: &mut TickContext<'_>, id: EntityId) {
    let Some(entity) = arena.get(id) else { return };
    if !entity.is_alive() {
        return;
    }
    let Some(side) = entity.team().map(|t| t.side) else {
        return;
    };
    let Some(position) = entity.transform().map(|t| t.position) else {
        return;
    };
    let Some(combat) = entity.combat().cloned() else {
        return;
    };
    let last_attacker = entity.health().and_then(|h| h.last_attacker);
    let ordered = entity.order().and_then(|o| o.target);

    // Explicit order first, then retaliation, then the nearest enemy.
    let target = ordered
        .filter(|tid| is_valid_enemy(arena, *tid, side))
        .or_else(|| last_attacker.filter(|tid| is_valid_enemy(arena, *tid, side)))
        .or_else(|| nearest_enemy(arena, id, side));

    let cooldown = (combat.cooldown - ctx.dt).max(0.0);

    let Some(target) = target else {
        if let Some(entity) = arena.get_mut(id) {
            entity.flags_mut().remove(UnitFlags::ANCHORED);
            if let Some(c) = entity.combat_mut() {
                c.cooldown = cooldown;
            }
        }
        return;
    };

    let target_pos = arena
        .get(target)
        .and_then(|t| t.transform())
        .map(|t| t.position);
    let target_radius = arena
        .get(target)
        .and_then(|t| t.unit())
        .map_or(0.0, |u| u.radius);
    let Some(target_pos) = target_pos else { return };

    let distance = glam::Vec3::new(
        target_pos.x - position.x,
        0.0,
        target_pos.z - position.z,
    )
    .length();
    let in_range = distance <= combat.range + target_radius;

    let attack_now = in_range && cooldown <= 0.0;
    let critical = attack_now
        && combat.crit_chance > 0.0
        && ctx.rng.gen::<f32>() < combat.crit_chance;

    // Write own state before touching the rest of the arena.
    if let Some(entity) = arena.get_mut(id) {
        if in_range {
            entity.flags_mut().insert(UnitFlags::ANCHORED);
        } else {
            entity.flags_mut().remove(UnitFlags::ANCHORED);
        }
        if let Some(order) = entity.order_mut() {
            order.target = Some(target);
        }
        if let Some(c) = entity.combat_mut() {
            c.cooldown = if attack_now {
                combat.attack_interval
            } else {
                cooldown
            };
        }
    }

    if !attack_now {
        return;
    }

    match combat.projectile {
        Some(spec) => {
            let mut damage = combat.damage;
            if critical {
                #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
                {
                    damage = (damage as f32 * ctx.config.crit_multiplier).floor() as i32;
                }
            }
            projectile::fire_projectile(arena, ctx, id, target, &spec, damage, combat.range);
        }
        None => {
            combat::apply_damage(
                arena,
                ctx,
                Some(id),
                target,
                combat.damage,
                combat.element,
                &DamageOptions {
                    critical,
                    ..DamageOptions::default()
                },
            );
        }
    }
}

fn is_valid_enemy(arena: &Arena, id: EntityId, my_side: Side) -> bool {
    arena.get(id).is_some_and(|e| {
        e.is_alive() && e.team().is_some_and(|t| t.side != my_side) && e.transform().is_some()
    })
}

/// Nearest living enemy unit; distance ties resolve to the lower id since
/// candidates are visited in sorted order and only strict improvements win.
fn nearest_enemy(arena: &Arena, id: EntityId, my_side: Side) -> Option<EntityId> {
    let position = arena.get(id)?.transform()?.position;
    let candidates = arena.ids_with(
        ComponentMask::TEAM
            | ComponentMask::HEALTH
            | ComponentMask::TRANSFORM
            | ComponentMask::UNIT,
    );
    let mut best: Option<(f32, EntityId)> = None;
    for candidate in candidates {
        if candidate == id {
            continue;
        }
        let Some(entity) = arena.get(candidate) else { continue };
        if !entity.is_alive() || !entity.team().is_some_and(|t| t.side != my_side) {
            continue;
        }
        let Some(other_pos) = entity.transform().map(|t| t.position) else {
            continue;
        };
        let distance = position.distance_squared(other_pos);
        let better = match best {
            None => true,
            Some((best_d, _)) => distance < best_d,
        };
        if better {
            best = Some((distance, candidate));
        }
    }
    best.map(|(_, id)| id)
}

// =============================================================================
// Tests
// =============================================================================
