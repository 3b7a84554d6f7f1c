//! Typed simulation events.
//!
//! Systems report discrete happenings (damage, deaths, impacts, phase
//! changes) by pushing [`SimEvent`]s onto the [`EventBus`]; the host drains
//! the bus after each tick and fans events out to rendering, audio, and
//! networking. This replaces ad hoc string-keyed dispatch with one typed
//! enum routed at the wiring site.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::entity::{Element, EntityId, Side};
use crate::phase::PhaseKind;
use crate::team::RoundOutcome;

/// A discrete simulation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimEvent {
    /// Damage was applied to an entity.
    DamageApplied {
        /// Entity that caused the damage, if attributable.
        source: Option<EntityId>,
        /// Entity that received the damage.
        target: EntityId,
        /// Final damage after mitigation.
        amount: i32,
        /// Damage removed by mitigation.
        mitigated: i32,
        /// Element of the hit.
        element: Element,
        /// Whether the hit was lethal.
        fatal: bool,
    },
    /// An entity's death process started. Fired exactly once per entity.
    EntityDied {
        /// The entity that died.
        entity: EntityId,
        /// The entity credited with the kill, if attributable.
        killer: Option<EntityId>,
    },
    /// Poison was applied or refreshed on a target.
    PoisonApplied {
        /// Entity that applied the poison.
        source: Option<EntityId>,
        /// Poisoned entity.
        target: EntityId,
        /// Stack count after application.
        stacks: u32,
    },
    /// A projectile was launched.
    ProjectileLaunched {
        /// The projectile entity.
        projectile: EntityId,
        /// The firing entity.
        source: EntityId,
        /// The homing target, if any.
        target: Option<EntityId>,
    },
    /// A projectile hit something (a unit or the ground).
    ProjectileImpact {
        /// The projectile entity.
        projectile: EntityId,
        /// Impact position.
        position: Vec3,
        /// Unit struck directly, if any.
        struck: Option<EntityId>,
    },
    /// A projectile reached the end of its lifetime without further
    /// effect. Rendering should release any trail/visual state it holds
    /// for the entity.
    ProjectileExpired {
        /// The projectile entity.
        projectile: EntityId,
    },
    /// The phase machine moved to a new phase.
    PhaseChanged {
        /// Phase before the transition.
        from: PhaseKind,
        /// Phase after the transition.
        to: PhaseKind,
        /// Round counter after the transition.
        round: u32,
    },
    /// A battle round was resolved.
    RoundResolved {
        /// The computed outcome.
        outcome: RoundOutcome,
    },
    /// Gold was credited to a side.
    GoldAwarded {
        /// Receiving side.
        side: Side,
        /// Amount credited.
        amount: i32,
    },
}

/// FIFO queue of simulation events for one or more ticks.
#[derive(Debug, Default)]
pub struct EventBus {
    events: Vec<SimEvent>,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn push(&mut self, event: SimEvent) {
        self.events.push(event);
    }

    /// Removes and returns all queued events in emission order.
    pub fn drain(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }

    /// Returns the queued events without draining them.
    #[must_use]
    pub fn pending(&self) -> &[SimEvent] {
        &self.events
    }

    /// Returns the number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` when no events are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
