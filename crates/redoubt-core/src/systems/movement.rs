//! Movement and steering.
//!
//! Runs during the battle phase only, over every Transform+Velocity entity
//! except projectiles (those integrate in the projectile system), in
//! sorted id order. Per entity the pipeline is:
//!
//! 1. Desired velocity toward the order target (zero when anchored)
//! 2. Separation: averaged repulsion from a bounded set of close neighbors
//! 3. Avoidance: look-ahead sampling with a persisted deflection side
//! 4. Exponential-smoothing blend, damped by the oscillation detector
//! 5. Integration, gravity + terrain clamp, world-boundary clamp, facing
//!
//! Entities are mutated in place one at a time; earlier ids see the world
//! as already advanced for lower ids, which is deterministic because the
//! order is.

use glam::Vec3;

use crate::arena::Arena;
use crate::config::SteeringConfig;
use crate::context::TickContext;
use crate::entity::{ComponentMask, EntityId, SteeringMemory, UnitFlags};

/// Advances every movable, non-projectile entity by one tick.
pub fn run(arena: &mut Arena, ctx: &mut TickContext<'_>) {
    let movers = arena.ids_with(ComponentMask::TRANSFORM | ComponentMask::VELOCITY);
    for id in movers {
        let is_projectile = arena
            .get(id)
            .map_or(true, |e| e.has(ComponentMask::PROJECTILE));
        if is_projectile {
            continue;
        }
        if let Some(plan) = plan(arena, ctx, id) {
            apply(arena, ctx, id, plan);
            arena.update_spatial(id);
        }
    }
}

/// Everything the mutable pass needs, computed from an immutable read.
struct MovePlan {
    new_velocity: Vec3,
    steering: Option<SteeringMemory>,
}

fn horizontal(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

fn perp(dir: Vec3) -> Vec3 {
    Vec3::new(-dir.z, 0.0, dir.x)
}

#[allow(clippy::too_many_lines)]
fn plan(arena: &Arena, ctx: &mut TickContext<'_>, id: EntityId) -> Option<MovePlan> {
    let cfg = &ctx.config.steering;
    let entity = arena.get(id)?;
    let transform = entity.transform()?;
    let velocity = entity.velocity()?;
    let flags = entity.flags();
    let position = transform.position;
    let radius = entity.unit().map_or(0.0, |u| u.radius);
    let mut memory = entity.order().map(|o| o.steering);

    let mut vertical = velocity.velocity.y;
    if flags.contains(UnitFlags::GRAVITY) {
        vertical -= ctx.config.gravity * ctx.dt;
    }

    // Dying entities coast to a stop; no steering, no facing.
    if entity.health().is_some() && !entity.is_alive() {
        return Some(MovePlan {
            new_velocity: Vec3::new(0.0, vertical, 0.0),
            steering: memory,
        });
    }

    // 1. Desired velocity toward the order target.
    let chase_target = entity.order().and_then(|o| o.target);
    let target_point = if flags.contains(UnitFlags::ANCHORED) {
        None
    } else {
        chase_target
            .and_then(|tid| arena.get(tid))
            .filter(|t| t.is_alive())
            .and_then(|t| t.transform())
            .map(|t| t.position)
            .or_else(|| entity.order().and_then(|o| o.destination))
    };
    let desired = match target_point {
        Some(point) => {
            let to_target = horizontal(point - position);
            let distance = to_target.length();
            if distance <= cfg.arrive_distance {
                Vec3::ZERO
            } else {
                to_target / distance * velocity.max_speed
            }
        }
        None => Vec3::ZERO,
    };

    // 2. Separation from nearby units, bounded candidate count.
    let mut separation = Vec3::ZERO;
    if radius > 0.0 {
        let query_radius = (radius * 4.0).max(1.5);
        let mut considered = 0usize;
        let mut sum = Vec3::ZERO;
        for other_id in arena.spatial().query_radius(position, query_radius) {
            if considered >= cfg.max_neighbors {
                break;
            }
            if other_id == id {
                continue;
            }
            let Some(other) = arena.get(other_id) else { continue };
            let Some(other_unit) = other.unit() else { continue };
            let Some(other_pos) = other.transform().map(|t| t.position) else {
                continue;
            };
            let min_dist = radius + other_unit.radius;
            let offset = horizontal(position - other_pos);
            let distance = offset.length();
            if distance >= min_dist {
                continue;
            }
            let away = if distance > 1e-4 {
                offset / distance
            } else {
                // Coincident units: split deterministically by id order.
                if id < other_id { Vec3::X } else { -Vec3::X }
            };
            sum += away * ((min_dist - distance) / min_dist);
            considered += 1;
        }
        if considered > 0 {
            #[allow(clippy::cast_precision_loss)]
            {
                separation = sum / considered as f32 * velocity.max_speed;
            }
        }
    }

    // 3. Obstacle avoidance, chasing units only.
    let mut avoidance = Vec3::ZERO;
    if let (Some(target), Some(mem)) = (chase_target, memory.as_mut()) {
        let desired_len = desired.length();
        if desired_len > 1e-4 {
            let dir = desired / desired_len;
            let mut obstacle: Option<Vec3> = None;
            #[allow(clippy::cast_precision_loss)]
            for step in 1..=cfg.avoid_samples {
                let sample = position + dir * (cfg.avoid_spacing * step as f32);
                for other_id in arena
                    .spatial()
                    .query_radius(sample, cfg.avoid_check_radius)
                {
                    if other_id == id || other_id == target {
                        continue;
                    }
                    let Some(other) = arena.get(other_id) else { continue };
                    if other.unit().is_none() || !other.is_alive() {
                        continue;
                    }
                    if let Some(t) = other.transform() {
                        obstacle = Some(t.position);
                        break;
                    }
                }
                if obstacle.is_some() {
                    break;
                }
            }

            match obstacle {
                Some(obstacle_pos) => {
                    let side = match mem.avoid_side {
                        Some(side) => side,
                        None => {
                            // Deflect away from the obstacle's side of the
                            // desired direction.
                            let to_obstacle = horizontal(obstacle_pos - position);
                            let lateral = perp(dir).dot(to_obstacle);
                            let side = if lateral > 0.0 { -1.0 } else { 1.0 };
                            mem.avoid_side = Some(side);
                            mem.avoid_origin = position;
                            side
                        }
                    };
                    avoidance = perp(dir) * side * velocity.max_speed;
                }
                None => {
                    // Keep the chosen side until the unit clears the
                    // repath distance; this is what stops side flipping.
                    if mem.avoid_side.is_some()
                        && position.distance(mem.avoid_origin) > cfg.repath_distance
                    {
                        mem.avoid_side = None;
                    }
                }
            }
        }
    }

    // 4. Blend with exponential smoothing; oscillation damping.
    let mut forces = separation * cfg.separation_weight + avoidance * cfg.avoidance_weight;
    let mut alpha = 1.0 - (-cfg.smoothing_rate * ctx.dt).exp();
    if let Some(mem) = memory.as_mut() {
        let raw_dir = horizontal(desired + forces);
        let damped = note_direction(mem, raw_dir, ctx.dt, cfg);
        if damped {
            forces *= 0.5;
            alpha *= 0.5;
        }
    }
    let raw = desired + forces;

    let current_h = horizontal(velocity.velocity);
    let mut new_h = current_h + (raw - current_h) * alpha;
    let speed = new_h.length();
    if speed > velocity.max_speed {
        new_h = new_h / speed * velocity.max_speed;
    }

    Some(MovePlan {
        new_velocity: Vec3::new(new_h.x, vertical, new_h.z),
        steering: memory,
    })
}

/// Feeds the oscillation detector one steering direction. Returns `true`
/// when recent reversals crossed the threshold and the blend should damp.
pub(crate) fn note_direction(
    memory: &mut SteeringMemory,
    raw_dir: Vec3,
    dt: f32,
    cfg: &SteeringConfig,
) -> bool {
    memory.reversal_timer += dt;
    while memory.reversal_timer >= cfg.reversal_decay {
        memory.reversal_timer -= cfg.reversal_decay;
        memory.reversals = memory.reversals.saturating_sub(1);
    }

    let len = raw_dir.length();
    if len > 1e-4 {
        let dir = raw_dir / len;
        if memory.last_dir.length_squared() > 0.0 && dir.dot(memory.last_dir) < -0.2 {
            memory.reversals += 1;
        }
        memory.last_dir = dir;
    }

    memory.reversals >= cfg.reversal_threshold
}

fn apply(arena: &mut Arena, ctx: &mut TickContext<'_>, id: EntityId, plan: MovePlan) {
    let half = ctx.config.world_half_extent;
    let Some(entity) = arena.get_mut(id) else { return };

    let flags = entity.flags();
    let radius = entity.unit().map_or(0.0, |u| u.radius);
    let min_face_speed = ctx.config.steering.min_face_speed;

    if let Some(order) = entity.order_mut() {
        if let Some(steering) = plan.steering {
            order.steering = steering;
        }
    }

    let Some((transform, velocity)) = entity.kinematics_mut() else {
        return;
    };
    velocity.velocity = plan.new_velocity;
    transform.position += velocity.velocity * ctx.dt;

    // Ground contact clamps vertical motion.
    if flags.contains(UnitFlags::GRAVITY) {
        let ground = ctx.terrain.height_at(transform.position.x, transform.position.z);
        if transform.position.y <= ground {
            transform.position.y = ground;
            velocity.velocity.y = 0.0;
        }
    }

    // World boundary, inset by unit radius; anchored entities are exempt.
    if !flags.contains(UnitFlags::ANCHORED) {
        let limit = (half - radius).max(0.0);
        transform.position.x = transform.position.x.clamp(-limit, limit);
        transform.position.z = transform.position.z.clamp(-limit, limit);
    }

    // Facing only above the minimum speed threshold.
    let speed_h = horizontal(velocity.velocity).length();
    if speed_h > min_face_speed {
        transform.yaw = velocity.velocity.z.atan2(velocity.velocity.x);
    }
}

// =============================================================================
// Tests
// =============================================================================
