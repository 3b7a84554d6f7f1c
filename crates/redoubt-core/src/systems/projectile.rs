//! Projectile ballistics: launch, flight, homing, and impact.
//!
//! Direct projectiles fly a straight, speed-normalized line and run
//! continuous collision tests against candidate segments each tick,
//! resolving the closest hit first (ties broken by id). Ballistic
//! projectiles fly a gravity arc solved at launch so the shell lands on
//! the target's position at fire time, and check only terrain impact per
//! tick; on landing they splash, strike an occupant, or stick into the
//! ground inert until their lifetime runs out.

use glam::Vec3;
use tracing::debug;

use crate::arena::Arena;
use crate::context::TickContext;
use crate::entity::{
    ComponentMask, EntityId, EntityProto, Projectile, ProjectileSpec, Transform, UnitFlags,
    Velocity,
};
use crate::events::SimEvent;
use crate::systems::combat::{self, DamageOptions};

/// Height above the ground at which projectiles launch and are aimed.
const MUZZLE_HEIGHT: f32 = 0.5;

/// Launch elevation at point-blank range (steep).
const ANGLE_CLOSE: f32 = 1.2;
/// Launch elevation at maximum range (shallow).
const ANGLE_FAR: f32 = 0.55;

/// Default collision radius for targets without a unit component.
const DEFAULT_TARGET_RADIUS: f32 = 0.3;

// =============================================================================
// Launch
// =============================================================================

/// Fires a projectile from `source` at `target`.
///
/// `range` is the firer's weapon range; ballistic launch elevation
/// interpolates from steep at close range to shallow at max range, and the
/// launch speed is solved from `R = v^2 * sin(2 theta) / g` so the arc
/// lands where the target stands now. The vertical component is corrected
/// for the height difference over the time of flight.
///
/// Returns the projectile entity id, or `None` when source or target no
/// longer exist (a dead-by-this-tick firer simply does not shoot).
pub fn fire_projectile(
    arena: &mut Arena,
    ctx: &mut TickContext<'_>,
    source: EntityId,
    target: EntityId,
    spec: &ProjectileSpec,
    damage: i32,
    range: f32,
) -> Option<EntityId> {
    let side = arena.get(source)?.team()?.side;
    let source_pos = arena.get(source)?.transform()?.position;
    let target_pos = arena.get(target)?.transform()?.position;

    let origin = source_pos + Vec3::Y * MUZZLE_HEIGHT;
    let gravity = ctx.config.gravity;

    let horizontal = Vec3::new(target_pos.x - origin.x, 0.0, target_pos.z - origin.z);
    let reach = horizontal.length();

    let (velocity, launch_angle, time_to_target, ballistic) = if spec.ballistic && reach > 0.1 {
        let dir_h = horizontal / reach;
        // Steeper close, shallower far.
        let t = (reach / range.max(0.1)).clamp(0.0, 1.0);
        let angle = ANGLE_CLOSE + (ANGLE_FAR - ANGLE_CLOSE) * t;
        let speed = (reach * gravity / (2.0 * angle).sin()).sqrt();
        let speed_h = speed * angle.cos();
        let tof = reach / speed_h;
        // Correct the vertical component for the height difference so the
        // arc comes down exactly at the aim point.
        let dy = target_pos.y - origin.y;
        let vy = dy / tof + 0.5 * gravity * tof;
        (dir_h * speed_h + Vec3::Y * vy, angle, tof, true)
    } else {
        let aim = target_pos + Vec3::Y * MUZZLE_HEIGHT;
        let to_target = aim - origin;
        let distance = to_target.length().max(1e-4);
        let dir = to_target / distance;
        (dir * spec.speed, 0.0, distance / spec.speed, false)
    };

    let homing_target = if spec.homing_strength > 0.0 {
        Some(target)
    } else {
        None
    };

    let mut flags = UnitFlags::empty();
    if ballistic {
        flags.insert(UnitFlags::GRAVITY);
    }

    let projectile = arena.spawn(EntityProto {
        flags,
        transform: Some(Transform::new(origin, velocity.z.atan2(velocity.x))),
        velocity: Some(Velocity {
            velocity,
            max_speed: spec.speed.max(velocity.length()),
        }),
        projectile: Some(Projectile {
            damage,
            speed: spec.speed,
            source,
            side,
            target: homing_target,
            target_pos,
            ballistic,
            launch_angle,
            time_to_target,
            flight_time: 0.0,
            element: spec.element,
            splash_radius: spec.splash_radius,
            lifetime: spec.lifetime,
            homing_strength: spec.homing_strength,
            hit_radius: spec.hit_radius,
        }),
        ..EntityProto::default()
    });

    ctx.events.push(SimEvent::ProjectileLaunched {
        projectile,
        source,
        target: homing_target,
    });
    Some(projectile)
}

// =============================================================================
// Flight
// =============================================================================

/// Advances every projectile by one tick, in sorted id order.
pub fn run(arena: &mut Arena, ctx: &mut TickContext<'_>) {
    let ids =
        arena.ids_with(ComponentMask::TRANSFORM | ComponentMask::VELOCITY | ComponentMask::PROJECTILE);
    for id in ids {
        step_one(arena, ctx, id);
    }
}

#[allow(clippy::too_many_lines)]
fn step_one(arena: &mut Arena, ctx: &mut TickContext<'_>, id: EntityId) {
    let Some(entity) = arena.get(id) else { return };
    let Some(mut state) = entity.projectile().copied() else {
        return;
    };
    let Some(transform) = entity.transform().copied() else {
        return;
    };
    let Some(mut velocity) = entity.velocity().copied() else {
        return;
    };
    let stuck = entity.flags().contains(UnitFlags::STUCK);

    state.lifetime -= ctx.dt;

    // Stuck shells are inert; they only wait out their lifetime.
    if stuck {
        if state.lifetime <= 0.0 {
            arena.despawn(id);
            ctx.events.push(SimEvent::ProjectileExpired { projectile: id });
        } else if let Some(entity) = arena.get_mut(id) {
            entity.set_projectile(state);
        }
        return;
    }

    state.flight_time += ctx.dt;

    // Homing: blend toward a recomputed intercept velocity.
    if state.homing_strength > 0.0 {
        let target_pos = state
            .target
            .and_then(|tid| arena.get(tid))
            .filter(|t| t.is_alive())
            .and_then(|t| t.transform())
            .map(|t| t.position);
        if let Some(target_pos) = target_pos {
            if state.ballistic {
                // Only the horizontal component, only before the apex, at
                // roughly a third strength so the arc survives.
                if velocity.velocity.y > 0.0 {
                    let to_target = Vec3::new(
                        target_pos.x - transform.position.x,
                        0.0,
                        target_pos.z - transform.position.z,
                    );
                    let reach = to_target.length();
                    if reach > 1e-4 {
                        let speed_h =
                            Vec3::new(velocity.velocity.x, 0.0, velocity.velocity.z).length();
                        let desired = to_target / reach * speed_h;
                        let blend = (state.homing_strength / 3.0 * ctx.dt).clamp(0.0, 1.0);
                        velocity.velocity.x += (desired.x - velocity.velocity.x) * blend;
                        velocity.velocity.z += (desired.z - velocity.velocity.z) * blend;
                    }
                }
            } else {
                let aim = target_pos + Vec3::Y * MUZZLE_HEIGHT;
                let to_target = aim - transform.position;
                let distance = to_target.length();
                if distance > 1e-4 {
                    let desired = to_target / distance * state.speed;
                    let blend = (state.homing_strength * ctx.dt).clamp(0.0, 1.0);
                    velocity.velocity += (desired - velocity.velocity) * blend;
                }
            }
        }
    }

    if state.ballistic {
        velocity.velocity.y -= ctx.config.gravity * ctx.dt;
    }

    let p0 = transform.position;
    let p1 = p0 + velocity.velocity * ctx.dt;

    // Collision.
    if state.ballistic {
        let ground = ctx.terrain.height_at(p1.x, p1.z);
        if p1.y <= ground {
            let impact = Vec3::new(p1.x, ground, p1.z);
            land_ballistic(arena, ctx, id, &state, impact);
            return;
        }
    } else if let Some((t, victim)) = closest_hit(arena, &state, p0, p1) {
        let impact = p0 + (p1 - p0) * t;
        strike(arena, ctx, id, &state, impact, Some(victim));
        return;
    }

    if state.lifetime <= 0.0 {
        arena.despawn(id);
        ctx.events.push(SimEvent::ProjectileExpired { projectile: id });
        return;
    }

    // Write back and keep flying.
    if let Some(entity) = arena.get_mut(id) {
        if let Some(t) = entity.transform_mut() {
            t.position = p1;
            let speed_h = Vec3::new(velocity.velocity.x, 0.0, velocity.velocity.z).length();
            if speed_h > 1e-4 {
                t.yaw = velocity.velocity.z.atan2(velocity.velocity.x);
            }
        }
        if let Some(v) = entity.velocity_mut() {
            *v = velocity;
        }
        entity.set_projectile(state);
    }
    arena.update_spatial(id);
}

/// Finds the closest enemy struck by the segment `p0 -> p1`, if any.
///
/// Candidates are living Team+Health+Transform entities on the other side,
/// tested at chest height against `hit_radius + unit radius`. The earliest
/// hit along the segment wins; exact ties resolve to the lower id (the
/// candidate list is already id-sorted).
fn closest_hit(
    arena: &Arena,
    state: &Projectile,
    p0: Vec3,
    p1: Vec3,
) -> Option<(f32, EntityId)> {
    let candidates =
        arena.ids_with(ComponentMask::TEAM | ComponentMask::HEALTH | ComponentMask::TRANSFORM);
    let mut best: Option<(f32, EntityId)> = None;
    for candidate in candidates {
        let Some(entity) = arena.get(candidate) else { continue };
        if !entity.is_alive() {
            continue;
        }
        if entity.team().is_some_and(|t| t.side == state.side) {
            continue;
        }
        let Some(position) = entity.transform().map(|t| t.position) else {
            continue;
        };
        let radius = entity
            .unit()
            .map_or(DEFAULT_TARGET_RADIUS, |u| u.radius);
        let center = position + Vec3::Y * MUZZLE_HEIGHT;

        let (distance, t) = segment_point_distance(p0, p1, center);
        if distance <= state.hit_radius + radius {
            let better = match best {
                None => true,
                Some((best_t, _)) => t < best_t,
            };
            if better {
                best = Some((t, candidate));
            }
        }
    }
    best
}

/// Distance from `point` to segment `a -> b`, and the parameter `t` of the
/// closest approach.
fn segment_point_distance(a: Vec3, b: Vec3, point: Vec3) -> (f32, f32) {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= 1e-8 {
        return (a.distance(point), 0.0);
    }
    let t = ((point - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    let closest = a + ab * t;
    (closest.distance(point), t)
}

/// Resolves a ballistic shell reaching the ground.
fn land_ballistic(
    arena: &mut Arena,
    ctx: &mut TickContext<'_>,
    id: EntityId,
    state: &Projectile,
    impact: Vec3,
) {
    if state.splash_radius > 0.0 {
        strike(arena, ctx, id, state, impact, None);
        return;
    }

    // Single-target shell: hit whoever occupies the landing point, or
    // stick into the ground.
    let occupant = occupant_at(arena, state, impact);
    match occupant {
        Some(victim) => strike(arena, ctx, id, state, impact, Some(victim)),
        None => {
            debug!(projectile = %id, "shell stuck in ground");
            if let Some(entity) = arena.get_mut(id) {
                entity.flags_mut().insert(UnitFlags::STUCK);
                if let Some(t) = entity.transform_mut() {
                    t.position = impact;
                }
                if let Some(v) = entity.velocity_mut() {
                    v.velocity = Vec3::ZERO;
                }
                let mut state = *state;
                state.target = None;
                entity.set_projectile(state);
            }
            arena.update_spatial(id);
            ctx.events.push(SimEvent::ProjectileImpact {
                projectile: id,
                position: impact,
                struck: None,
            });
        }
    }
}

/// Finds the closest living unit occupying the landing point, ties broken
/// by id order.
fn occupant_at(arena: &Arena, state: &Projectile, impact: Vec3) -> Option<EntityId> {
    let candidates = arena.ids_with(
        ComponentMask::TEAM | ComponentMask::HEALTH | ComponentMask::TRANSFORM | ComponentMask::UNIT,
    );
    let mut best: Option<(f32, EntityId)> = None;
    for candidate in candidates {
        let Some(entity) = arena.get(candidate) else { continue };
        if !entity.is_alive() {
            continue;
        }
        let Some(position) = entity.transform().map(|t| t.position) else {
            continue;
        };
        let radius = entity.unit().map_or(DEFAULT_TARGET_RADIUS, |u| u.radius);
        let distance =
            Vec3::new(impact.x - position.x, 0.0, impact.z - position.z).length();
        if distance <= state.hit_radius + radius {
            let better = match best {
                None => true,
                Some((best_d, _)) => distance < best_d,
            };
            if better {
                best = Some((distance, candidate));
            }
        }
    }
    best.map(|(_, id)| id)
}

/// Applies a projectile's payload at `impact` and destroys it.
fn strike(
    arena: &mut Arena,
    ctx: &mut TickContext<'_>,
    id: EntityId,
    state: &Projectile,
    impact: Vec3,
    struck: Option<EntityId>,
) {
    ctx.events.push(SimEvent::ProjectileImpact {
        projectile: id,
        position: impact,
        struck,
    });
    arena.despawn(id);

    let opts = DamageOptions::default();
    if state.splash_radius > 0.0 {
        combat::apply_splash(
            arena,
            ctx,
            Some(state.source),
            impact,
            state.damage,
            state.splash_radius,
            state.element,
            &opts,
        );
    } else if let Some(victim) = struck {
        let outcome = combat::apply_damage(
            arena,
            ctx,
            Some(state.source),
            victim,
            state.damage,
            state.element,
            &opts,
        );
        if outcome.is_prevented() {
            debug!(projectile = %id, "impact damage prevented");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
