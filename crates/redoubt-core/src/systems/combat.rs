//! Damage resolution: mitigation, splash, poison application, and the
//! delayed-damage queue.
//!
//! The pipeline is integral end to end: after every multiplicative step the
//! intermediate result is floored to an integer, so two peers replaying the
//! same inputs agree on every hit point. Invalid targets are not errors;
//! they produce a typed [`DamageOutcome::Prevented`] with a reason code and
//! leave the arena untouched.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::arena::Arena;
use crate::config::StackPolicy;
use crate::context::TickContext;
use crate::entity::{ComponentMask, DeathState, Element, EntityId, Poison};
use crate::events::SimEvent;

/// Minimum damage a physical hit can resolve to.
pub const MIN_DAMAGE: i32 = 1;

/// Effective resistance bounds applied at mitigation time.
pub const RESISTANCE_MIN: f32 = -1.0;
/// Upper bound of the effective resistance range.
pub const RESISTANCE_MAX: f32 = 0.9;

/// Splash damage never falls below this fraction inside the radius.
pub const SPLASH_FLOOR: f32 = 0.2;

const POISON_DEFAULT_INTERVAL: f32 = 1.0;
const POISON_DEFAULT_DURATION: f32 = 4.0;

// =============================================================================
// Outcome types
// =============================================================================

/// Caller-supplied switches for one damage application.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DamageOptions {
    /// Multiply by the configured critical multiplier before mitigation.
    pub critical: bool,
    /// Allow splash to hit the source's own side.
    pub friendly_fire: bool,
}

/// Why a damage or poison application was prevented.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreventReason {
    /// The target is missing, has no health, or is not alive.
    TargetInvalid,
    /// Poison reapplication hit the stack cap under the reject policy.
    StackLimit,
}

/// What one damage application did.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageReport {
    /// Final damage taken off the target's health.
    pub damage: i32,
    /// Damage removed by armor/resistance mitigation (negative when a
    /// vulnerability amplified the hit).
    pub mitigated: i32,
    /// Whether the hit was lethal.
    pub fatal: bool,
    /// Element the damage resolved as.
    pub element: Element,
}

/// Result of a damage entry point: applied, or prevented with a reason.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DamageOutcome {
    /// Damage (or a poison application) went through.
    Applied(DamageReport),
    /// Nothing happened; the reason says why.
    Prevented(PreventReason),
}

impl DamageOutcome {
    /// Returns the report when damage was applied.
    #[must_use]
    pub const fn report(&self) -> Option<&DamageReport> {
        match self {
            Self::Applied(report) => Some(report),
            Self::Prevented(_) => None,
        }
    }

    /// Returns `true` when the application was prevented.
    #[must_use]
    pub const fn is_prevented(&self) -> bool {
        matches!(self, Self::Prevented(_))
    }
}

// =============================================================================
// Core pipeline
// =============================================================================

/// Applies `base_damage` of `element` from `source` to `target`.
///
/// Pipeline order: attacker buff multiplier, critical multiplier, element
/// mitigation, defender damage-taken multiplier, then flat damage reduction,
/// flooring to an integer after every multiplicative step. Poison damage
/// never takes this path; it redirects to [`apply_poison`] with default
/// stack parameters.
///
/// Lethal damage marks death exactly once, emits
/// [`SimEvent::EntityDied`] (the start-death-process hook), and records the
/// attacker on the target for retaliation targeting.
pub fn apply_damage(
    arena: &mut Arena,
    ctx: &mut TickContext<'_>,
    source: Option<EntityId>,
    target: EntityId,
    base_damage: i32,
    element: Element,
    opts: &DamageOptions,
) -> DamageOutcome {
    if !arena.get(target).is_some_and(crate::entity::Entity::is_alive) {
        return DamageOutcome::Prevented(PreventReason::TargetInvalid);
    }

    let element = match element {
        Element::Unknown => {
            warn!("unknown damage element, falling back to physical");
            Element::Physical
        }
        Element::Poison => {
            // DoT path: poison is never resisted and never mitigated here.
            return apply_poison(
                arena,
                ctx,
                source,
                target,
                PoisonApplication {
                    stacks: 1,
                    damage_per_stack: base_damage,
                    tick_interval: POISON_DEFAULT_INTERVAL,
                    duration: POISON_DEFAULT_DURATION,
                },
            );
        }
        other => other,
    };

    // Attacker side: buff multiplier, then critical, each floored.
    let attack_mult = source
        .and_then(|id| arena.get(id))
        .and_then(|e| e.buffs())
        .map_or(1.0, |buffs| buffs.attack_multiplier(ctx.now));
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let mut amount = (base_damage as f32 * attack_mult).floor() as i32;
    if opts.critical {
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        {
            amount = (amount as f32 * ctx.config.crit_multiplier).floor() as i32;
        }
    }
    let pre_mitigation = amount;

    // Defender side: element mitigation.
    let (armor, resistances) = arena
        .get(target)
        .and_then(|e| e.combat())
        .map_or((0, crate::entity::Resistances::default()), |combat| {
            (combat.armor, combat.resistances)
        });
    let mut after = match element {
        Element::Physical => (amount - armor).max(MIN_DAMAGE),
        Element::Fire | Element::Cold | Element::Lightning => {
            let resistance = resistances
                .for_element(element)
                .clamp(RESISTANCE_MIN, RESISTANCE_MAX);
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
            {
                (amount as f32 * (1.0 - resistance)).floor() as i32
            }
        }
        // Holy and shadow are unmitigable.
        Element::Holy | Element::Shadow => amount,
        Element::Poison | Element::Unknown => unreachable!("handled above"),
    };

    // Defender buffs: damage-taken multiplier, then flat reduction.
    let (taken_mult, reduction) = arena
        .get(target)
        .and_then(|e| e.buffs())
        .map_or((1.0, 0.0), |buffs| {
            (buffs.taken_multiplier(ctx.now), buffs.damage_reduction(ctx.now))
        });
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    {
        after = (after as f32 * taken_mult).floor() as i32;
        after = (after as f32 * (1.0 - reduction)).floor() as i32;
    }
    if element == Element::Physical {
        after = after.max(MIN_DAMAGE);
    }
    after = after.max(0);

    let mitigated = pre_mitigation - after;
    commit(arena, ctx, source, target, after, mitigated, element)
}

/// Writes resolved damage onto the target, handling death bookkeeping and
/// event emission. Shared by the mitigation path and the poison ticker.
pub(crate) fn commit(
    arena: &mut Arena,
    ctx: &mut TickContext<'_>,
    source: Option<EntityId>,
    target: EntityId,
    amount: i32,
    mitigated: i32,
    element: Element,
) -> DamageOutcome {
    let Some(entity) = arena.get_mut(target) else {
        return DamageOutcome::Prevented(PreventReason::TargetInvalid);
    };
    let Some(health) = entity.health_mut() else {
        return DamageOutcome::Prevented(PreventReason::TargetInvalid);
    };
    if !health.is_alive() {
        return DamageOutcome::Prevented(PreventReason::TargetInvalid);
    }

    health.current = (health.current - amount).max(0);
    health.last_attacker = source;
    health.last_hit_time = ctx.now;

    let fatal = health.current == 0;
    if fatal {
        // Death triggers exactly once; the drained event is the external
        // "start death process" hook.
        health.death_state = DeathState::Dying;
    }
    if fatal {
        entity.remove_poison();
        ctx.events.push(SimEvent::EntityDied {
            entity: target,
            killer: source,
        });
    }

    ctx.events.push(SimEvent::DamageApplied {
        source,
        target,
        amount,
        mitigated,
        element,
        fatal,
    });

    DamageOutcome::Applied(DamageReport {
        damage: amount,
        mitigated,
        fatal,
        element,
    })
}

// =============================================================================
// Poison
// =============================================================================

/// Parameters for one poison application.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoisonApplication {
    /// Stacks to add.
    pub stacks: u32,
    /// Damage per stack per tick interval.
    pub damage_per_stack: i32,
    /// Seconds between damage ticks.
    pub tick_interval: f32,
    /// Seconds until expiry; reapplication refreshes this.
    pub duration: f32,
}

/// Adds or refreshes poison on `target`.
///
/// Reapplication refreshes the duration. At the stack cap the configured
/// policy decides: `RefreshDuration` keeps the cap and refreshes,
/// `Reject` returns [`PreventReason::StackLimit`] without touching state.
pub fn apply_poison(
    arena: &mut Arena,
    ctx: &mut TickContext<'_>,
    source: Option<EntityId>,
    target: EntityId,
    application: PoisonApplication,
) -> DamageOutcome {
    let cap = ctx.config.poison_stack_cap;
    let policy = ctx.config.poison_policy;

    let Some(entity) = arena.get_mut(target) else {
        return DamageOutcome::Prevented(PreventReason::TargetInvalid);
    };
    if !entity.is_alive() {
        return DamageOutcome::Prevented(PreventReason::TargetInvalid);
    }

    let stacks = match entity.poison_mut() {
        Some(poison) => {
            let requested = poison.stacks + application.stacks;
            if requested > cap && policy == StackPolicy::Reject {
                return DamageOutcome::Prevented(PreventReason::StackLimit);
            }
            poison.stacks = requested.min(cap);
            poison.remaining = application.duration;
            poison.damage_per_stack = application.damage_per_stack;
            poison.tick_interval = application.tick_interval;
            poison.source = source.or(poison.source);
            poison.stacks
        }
        None => {
            let stacks = application.stacks.min(cap);
            entity.set_poison(Poison {
                stacks,
                damage_per_stack: application.damage_per_stack,
                tick_interval: application.tick_interval,
                remaining: application.duration,
                since_last_tick: 0.0,
                source,
            });
            stacks
        }
    };

    ctx.events.push(SimEvent::PoisonApplied {
        source,
        target,
        stacks,
    });

    DamageOutcome::Applied(DamageReport {
        damage: 0,
        mitigated: 0,
        fatal: false,
        element: Element::Poison,
    })
}

// =============================================================================
// Splash
// =============================================================================

/// Applies area damage around `center`.
///
/// Victims are every Transform+Health+Team entity inside `radius`, visited
/// in sorted id order (required for cross-peer determinism). The source
/// itself and its own side are excluded unless `opts.friendly_fire`.
/// Damage falls off as `max(0.2, 1 - d/radius)` and recurses into
/// [`apply_damage`] per hit.
pub fn apply_splash(
    arena: &mut Arena,
    ctx: &mut TickContext<'_>,
    source: Option<EntityId>,
    center: Vec3,
    base_damage: i32,
    radius: f32,
    element: Element,
    opts: &DamageOptions,
) -> Vec<(EntityId, DamageOutcome)> {
    if radius <= 0.0 {
        return Vec::new();
    }

    let source_side = source
        .and_then(|id| arena.get(id))
        .and_then(|e| e.team())
        .map(|t| t.side);

    let candidates =
        arena.ids_with(ComponentMask::TRANSFORM | ComponentMask::HEALTH | ComponentMask::TEAM);

    let mut results = Vec::new();
    for id in candidates {
        if Some(id) == source {
            continue;
        }
        let Some(entity) = arena.get(id) else { continue };
        if !opts.friendly_fire {
            let same_side = match (source_side, entity.team()) {
                (Some(side), Some(team)) => team.side == side,
                _ => false,
            };
            if same_side {
                continue;
            }
        }
        let Some(position) = entity.transform().map(|t| t.position) else {
            continue;
        };
        let distance = center.distance(position);
        if distance > radius {
            continue;
        }

        let falloff = (1.0 - distance / radius).max(SPLASH_FLOOR);
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let scaled = (base_damage as f32 * falloff).floor() as i32;
        let outcome = apply_damage(arena, ctx, source, id, scaled, element, opts);
        results.push((id, outcome));
    }
    results
}

// =============================================================================
// Delayed damage
// =============================================================================

/// A damage application scheduled for a future tick.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayedDamage {
    /// Attacking entity, if attributable.
    pub source: Option<EntityId>,
    /// Target entity.
    pub target: EntityId,
    /// Base damage to apply when due.
    pub amount: i32,
    /// Damage element.
    pub element: Element,
    /// Options forwarded to [`apply_damage`].
    pub options: DamageOptions,
    /// Tick at which the request becomes due.
    pub trigger_tick: u64,
}

/// Queue of delayed damage requests keyed deterministically.
///
/// The key string is `(trigger tick, source, target, counter)` with every
/// field zero-padded, and due requests are processed in sorted key order;
/// the ordering exists solely to make replay bit-identical across peers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelayQueue {
    entries: BTreeMap<String, DelayedDamage>,
    counter: u64,
}

impl DelayQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a request, returning its key.
    pub fn schedule(&mut self, request: DelayedDamage) -> String {
        let source = request.source.map_or(u64::MAX, EntityId::as_u64);
        let key = format!(
            "{:020}:{:020}:{:020}:{:010}",
            request.trigger_tick,
            source,
            request.target.as_u64(),
            self.counter
        );
        self.counter += 1;
        self.entries.insert(key.clone(), request);
        key
    }

    /// Cancels a scheduled request by key.
    pub fn cancel(&mut self, key: &str) -> Option<DelayedDamage> {
        self.entries.remove(key)
    }

    /// Returns the number of pending requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Applies every request whose trigger tick has passed, in sorted key
    /// order.
    pub fn run_due(&mut self, arena: &mut Arena, ctx: &mut TickContext<'_>) {
        let due: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, request)| request.trigger_tick <= ctx.tick)
            .map(|(key, _)| key.clone())
            .collect();

        for key in due {
            if let Some(request) = self.entries.remove(&key) {
                let outcome = apply_damage(
                    arena,
                    ctx,
                    request.source,
                    request.target,
                    request.amount,
                    request.element,
                    &request.options,
                );
                if outcome.is_prevented() {
                    debug!(%key, "delayed damage prevented");
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
