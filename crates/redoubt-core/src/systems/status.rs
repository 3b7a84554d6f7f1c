//! Status effect upkeep: poison damage ticks and buff expiry.
//!
//! Runs once per battle tick after instant damage. Poison damage bypasses
//! mitigation entirely (it was accepted at application time and is never
//! resisted); death handling and event emission are shared with the
//! instant-damage path.

use crate::arena::Arena;
use crate::context::TickContext;
use crate::entity::{ComponentMask, Element, EntityId};
use crate::systems::combat;

/// Ticks poison and prunes expired buffs for every affected entity, in
/// sorted id order.
pub fn run(arena: &mut Arena, ctx: &mut TickContext<'_>) {
    tick_poison(arena, ctx);
    prune_buffs(arena, ctx);
}

#[allow(clippy::cast_possible_wrap)]
fn tick_poison(arena: &mut Arena, ctx: &mut TickContext<'_>) {
    let poisoned = arena.ids_with(ComponentMask::POISON | ComponentMask::HEALTH);
    for id in poisoned {
        let Some(entity) = arena.get_mut(id) else { continue };
        if !entity.is_alive() {
            entity.remove_poison();
            continue;
        }

        // Advance timers and collect the damage ticks that became due.
        let mut pending: Vec<(Option<EntityId>, i32)> = Vec::new();
        let mut expired = false;
        if let Some(poison) = entity.poison_mut() {
            poison.remaining -= ctx.dt;
            poison.since_last_tick += ctx.dt;
            while poison.since_last_tick >= poison.tick_interval {
                poison.since_last_tick -= poison.tick_interval;
                let amount = poison.damage_per_stack * poison.stacks as i32;
                pending.push((poison.source, amount));
            }
            if poison.remaining <= 0.0 {
                expired = true;
            }
        }
        if expired {
            entity.remove_poison();
        }

        for (source, amount) in pending {
            let outcome = combat::commit(arena, ctx, source, id, amount, 0, Element::Poison);
            if outcome.is_prevented() {
                // Target died mid-loop; remaining ticks are moot.
                break;
            }
        }
    }
}

fn prune_buffs(arena: &mut Arena, ctx: &mut TickContext<'_>) {
    let buffed = arena.ids_with(ComponentMask::BUFFS);
    for id in buffed {
        let Some(entity) = arena.get_mut(id) else { continue };
        let mut drop_component = false;
        if let Some(buffs) = entity.buffs_mut() {
            buffs.prune(ctx.now);
            drop_component = buffs.active.is_empty();
        }
        if drop_component {
            entity.remove_buffs();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::CtxHarness;
    use crate::entity::{
        BuffKind, Buffs, EntityProto, Health, Poison, Side, Team, Transform, Unit,
    };
    use crate::events::SimEvent;
    use glam::Vec3;

    fn poisoned_unit(arena: &mut Arena, stacks: u32, per_stack: i32, duration: f32) -> EntityId {
        arena.spawn(EntityProto {
            transform: Some(Transform::at(Vec3::ZERO)),
            health: Some(Health::new(100)),
            team: Some(Team::new(Side::Away)),
            unit: Some(Unit::default()),
            poison: Some(Poison {
                stacks,
                damage_per_stack: per_stack,
                tick_interval: 1.0,
                remaining: duration,
                since_last_tick: 0.0,
                source: None,
            }),
            ..EntityProto::default()
        })
    }

    #[test]
    fn poison_ticks_damage_per_stack_times_stacks() {
        let mut harness = CtxHarness::new();
        let mut arena = Arena::new();
        let target = poisoned_unit(&mut arena, 4, 3, 10.0);

        // One full interval in a single tick.
        let mut ctx = harness.ctx();
        ctx.dt = 1.0;
        run(&mut arena, &mut ctx);

        assert_eq!(arena.get(target).unwrap().health().unwrap().current, 88);
    }

    #[test]
    fn poison_does_not_tick_before_the_interval() {
        let mut harness = CtxHarness::new();
        let mut arena = Arena::new();
        let target = poisoned_unit(&mut arena, 4, 3, 10.0);

        let mut ctx = harness.ctx();
        ctx.dt = 0.5;
        run(&mut arena, &mut ctx);
        assert_eq!(arena.get(target).unwrap().health().unwrap().current, 100);

        let mut ctx = harness.ctx();
        ctx.dt = 0.5;
        run(&mut arena, &mut ctx);
        assert_eq!(arena.get(target).unwrap().health().unwrap().current, 88);
    }

    #[test]
    fn poison_expires_after_duration() {
        let mut harness = CtxHarness::new();
        let mut arena = Arena::new();
        let target = poisoned_unit(&mut arena, 1, 1, 1.5);

        for _ in 0..2 {
            let mut ctx = harness.ctx();
            ctx.dt = 1.0;
            run(&mut arena, &mut ctx);
        }
        assert!(arena.get(target).unwrap().poison().is_none());
        // One tick landed before expiry.
        assert_eq!(arena.get(target).unwrap().health().unwrap().current, 99);
    }

    #[test]
    fn lethal_poison_kills_and_removes_itself() {
        let mut harness = CtxHarness::new();
        let mut arena = Arena::new();
        let target = poisoned_unit(&mut arena, 10, 50, 10.0);

        let mut ctx = harness.ctx();
        ctx.dt = 1.0;
        run(&mut arena, &mut ctx);

        let entity = arena.get(target).unwrap();
        assert!(!entity.is_alive());
        assert!(entity.poison().is_none());

        let died = harness
            .events
            .drain()
            .into_iter()
            .any(|e| matches!(e, SimEvent::EntityDied { .. }));
        assert!(died);
    }

    #[test]
    fn expired_buff_components_are_dropped() {
        let mut harness = CtxHarness::new();
        harness.now = 100.0;
        let mut arena = Arena::new();
        let id = arena.spawn(EntityProto {
            transform: Some(Transform::at(Vec3::ZERO)),
            health: Some(Health::new(10)),
            ..EntityProto::default()
        });
        let mut buffs = Buffs::default();
        buffs.apply(BuffKind::Fury, 1, 5.0);
        arena.get_mut(id).unwrap().set_buffs(buffs);

        let mut ctx = harness.ctx();
        run(&mut arena, &mut ctx);

        assert!(arena.get(id).unwrap().buffs().is_none());
    }

    #[test]
    fn live_buffs_survive_pruning() {
        let mut harness = CtxHarness::new();
        let mut arena = Arena::new();
        let id = arena.spawn(EntityProto {
            health: Some(Health::new(10)),
            ..EntityProto::default()
        });
        let mut buffs = Buffs::default();
        buffs.apply(BuffKind::Ward, 2, 50.0);
        arena.get_mut(id).unwrap().set_buffs(buffs);

        let mut ctx = harness.ctx();
        run(&mut arena, &mut ctx);

        assert_eq!(arena.get(id).unwrap().buffs().unwrap().active.len(), 1);
    }
}
