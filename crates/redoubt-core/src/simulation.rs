//! The tick driver.
//!
//! `Simulation` owns the arena, the phase machine, the team health pools,
//! the gold ledger, the squad roster, and the deterministic RNG, and runs
//! one fixed-order tick per [`Simulation::step`]:
//!
//! 1. Apply queued snapshots whose server time the local clock has reached
//! 2. Advance phase timers (the phase gate)
//! 3. During battle: movement, projectile flight, attacks, delayed damage,
//!    status upkeep, in that order, single-threaded, mutating in place
//! 4. Check the team-health condition and resolve the round
//!
//! # Determinism
//!
//! Same seed, same config, same order sequence: two simulations produce
//! bit-identical arenas after any number of ticks. Every system iterates
//! entities in sorted id order and the RNG is consumed only inside that
//! iteration.

use glam::Vec3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

use crate::arena::Arena;
use crate::config::SimConfig;
use crate::context::{Terrain, TickContext};
use crate::entity::{
    Combat, EntityId, EntityProto, Health, Order, Placement, PlacementId, Side, Team, Transform,
    Unit, UnitFlags, UnitKind, Velocity,
};
use crate::events::{EventBus, SimEvent};
use crate::net::{reconcile, ReconcileConfig, WorldSnapshot};
use crate::phase::{GoldLedger, PhaseKind, PhaseMachine};
use crate::systems::combat::DelayQueue;
use crate::systems::{attack, movement, projectile, status};
use crate::team::{self, RoundOutcome, TeamHealth};

/// Why an order was rejected. Synchronous, state-untouched rejections.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderRejection {
    /// The order is not allowed in the current phase.
    #[error("order not allowed during the {phase:?} phase")]
    WrongPhase {
        /// The phase the order arrived in.
        phase: PhaseKind,
    },
    /// The side cannot afford the placement.
    #[error("not enough gold: need {needed}, have {have}")]
    InsufficientGold {
        /// Cost of the order.
        needed: i32,
        /// Gold available.
        have: i32,
    },
    /// No such squad in the roster.
    #[error("unknown squad {placement}")]
    UnknownSquad {
        /// The unknown placement id.
        placement: PlacementId,
    },
    /// The squad belongs to the other side.
    #[error("squad {placement} is not owned by {side}")]
    NotOwner {
        /// The squad in question.
        placement: PlacementId,
        /// The side that issued the order.
        side: Side,
    },
    /// The unit kind has no catalog entry.
    #[error("unit kind has no catalog entry")]
    UnknownUnit,
}

/// Persistent squad metadata, preserved across round cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquadRecord {
    /// Owning side.
    pub owner: Side,
    /// Unit archetype.
    pub kind: UnitKind,
    /// Base value for round-end scoring.
    pub base_value: i32,
}

/// The authoritative (or client-replicated) match simulation.
pub struct Simulation {
    arena: Arena,
    config: SimConfig,
    terrain: Terrain,
    phase: PhaseMachine,
    team_health: TeamHealth,
    gold: GoldLedger,
    roster: BTreeMap<PlacementId, SquadRecord>,
    next_placement: u64,
    delayed: DelayQueue,
    pending_snapshots: Vec<WorldSnapshot>,
    reconcile_config: ReconcileConfig,
    events: EventBus,
    rng: ChaCha8Rng,
    master_seed: u64,
    sim_time: f64,
}

impl Simulation {
    /// Creates a simulation with the default config and flat terrain.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, SimConfig::default(), Terrain::default())
    }

    /// Creates a simulation with explicit config and terrain.
    #[must_use]
    pub fn with_config(seed: u64, config: SimConfig, terrain: Terrain) -> Self {
        let phase = PhaseMachine::new(&config);
        let team_health = TeamHealth::new(config.team_health);
        let gold = GoldLedger::new(config.starting_gold);
        Self {
            arena: Arena::new(),
            phase,
            team_health,
            gold,
            roster: BTreeMap::new(),
            next_placement: 0,
            delayed: DelayQueue::new(),
            pending_snapshots: Vec::new(),
            reconcile_config: ReconcileConfig {
                epsilon: config.snapshot_epsilon,
                ..ReconcileConfig::default()
            },
            events: EventBus::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            master_seed: seed,
            sim_time: 0.0,
            config,
            terrain,
        }
    }

    /// Runs one fixed-timestep tick.
    pub fn step(&mut self) {
        self.apply_due_snapshots();

        let dt = self.config.dt;
        if let Some(change) = self.phase.advance(dt) {
            if change.to == PhaseKind::Placement {
                self.phase.set_countdown(self.config.placement_seconds);
            }
            self.events.push(SimEvent::PhaseChanged {
                from: change.from,
                to: change.to,
                round: change.round,
            });
        }

        if self.phase.is_battle() {
            let mut ctx = TickContext {
                dt,
                tick: self.arena.current_tick(),
                now: self.sim_time,
                config: &self.config,
                terrain: &self.terrain,
                rng: &mut self.rng,
                events: &mut self.events,
            };
            movement::run(&mut self.arena, &mut ctx);
            projectile::run(&mut self.arena, &mut ctx);
            attack::run(&mut self.arena, &mut ctx);
            self.delayed.run_due(&mut self.arena, &mut ctx);
            status::run(&mut self.arena, &mut ctx);

            if let Some(outcome) = team::resolve_round(&self.arena, &mut self.team_health) {
                self.finish_round(&outcome);
            }
        }

        self.arena.advance_tick();
        self.sim_time += f64::from(dt);
    }

    /// Resolves a finished battle: events, gold, cleanup, phase change.
    fn finish_round(&mut self, outcome: &RoundOutcome) {
        self.events.push(SimEvent::RoundResolved { outcome: *outcome });

        for side in [Side::Home, Side::Away] {
            let mut amount = self.config.gold_income;
            if outcome.winner == Some(side) {
                amount += self.config.gold_win_bonus;
            }
            self.gold.award(side, amount);
            self.events.push(SimEvent::GoldAwarded { side, amount });
        }

        self.clear_battlefield();

        let change = self
            .phase
            .end_battle(&self.config, outcome.game_over, outcome.winner);
        self.events.push(SimEvent::PhaseChanged {
            from: change.from,
            to: change.to,
            round: change.round,
        });
    }

    /// Despawns transient battlefield entities (units and projectiles),
    /// preserving client-only decorations and the squad roster.
    fn clear_battlefield(&mut self) {
        let transient: Vec<EntityId> = self
            .arena
            .entities_sorted()
            .filter(|e| !e.flags().contains(UnitFlags::CLIENT_ONLY))
            .filter(|e| e.unit().is_some() || e.projectile().is_some())
            .map(crate::entity::Entity::id)
            .collect();
        for id in transient {
            self.arena.despawn(id);
        }
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Places a squad of `kind` around `position` for `side`.
    ///
    /// Allowed during placement only; costs catalog gold. Units spawn in a
    /// small deterministic formation and join the roster under a fresh
    /// placement id.
    ///
    /// # Errors
    ///
    /// [`OrderRejection::WrongPhase`], [`OrderRejection::UnknownUnit`], or
    /// [`OrderRejection::InsufficientGold`]; state is untouched on error.
    pub fn place_squad(
        &mut self,
        side: Side,
        kind: UnitKind,
        position: Vec3,
    ) -> Result<PlacementId, OrderRejection> {
        if self.phase.kind() != PhaseKind::Placement {
            return Err(OrderRejection::WrongPhase {
                phase: self.phase.kind(),
            });
        }
        let spec = self
            .config
            .unit_spec(kind)
            .ok_or(OrderRejection::UnknownUnit)?
            .clone();
        if !self.gold.try_spend(side, spec.cost) {
            return Err(OrderRejection::InsufficientGold {
                needed: spec.cost,
                have: self.gold.gold(side),
            });
        }

        let placement = PlacementId(self.next_placement);
        self.next_placement += 1;
        self.roster.insert(
            placement,
            SquadRecord {
                owner: side,
                kind,
                base_value: spec.base_value,
            },
        );

        let spacing = spec.radius * 2.5;
        for i in 0..spec.squad_size {
            // Two-column formation, deterministic for a given squad size.
            #[allow(clippy::cast_precision_loss)]
            let offset = Vec3::new(
                ((i % 2) as f32 - 0.5) * spacing,
                0.0,
                (i / 2) as f32 * spacing,
            );
            let ground = self.terrain.height_below(position + offset);
            self.arena.spawn(EntityProto {
                flags: UnitFlags::GRAVITY,
                transform: Some(Transform::at(Vec3::new(
                    position.x + offset.x,
                    ground,
                    position.z + offset.z,
                ))),
                velocity: Some(Velocity::with_max_speed(spec.speed)),
                health: Some(Health::new(spec.hp)),
                team: Some(Team::new(side)),
                unit: Some(Unit {
                    kind,
                    radius: spec.radius,
                }),
                combat: Some(Combat {
                    damage: spec.damage,
                    range: spec.range,
                    armor: spec.armor,
                    resistances: spec.resistances,
                    attack_interval: spec.attack_interval,
                    cooldown: 0.0,
                    crit_chance: spec.crit_chance,
                    element: spec.element,
                    projectile: spec.projectile,
                }),
                order: Some(Order::default()),
                placement: Some(Placement {
                    placement,
                    base_value: spec.base_value,
                }),
                ..EntityProto::default()
            });
        }

        Ok(placement)
    }

    /// Points a squad at a destination. A new order supersedes the old
    /// one. Allowed during placement and battle.
    ///
    /// # Errors
    ///
    /// [`OrderRejection::WrongPhase`], [`OrderRejection::UnknownSquad`],
    /// or [`OrderRejection::NotOwner`]; state is untouched on error.
    pub fn set_squad_target(
        &mut self,
        side: Side,
        placement: PlacementId,
        destination: Vec3,
    ) -> Result<(), OrderRejection> {
        if !matches!(self.phase.kind(), PhaseKind::Placement | PhaseKind::Battle) {
            return Err(OrderRejection::WrongPhase {
                phase: self.phase.kind(),
            });
        }
        let record = self
            .roster
            .get(&placement)
            .ok_or(OrderRejection::UnknownSquad { placement })?;
        if record.owner != side {
            return Err(OrderRejection::NotOwner { placement, side });
        }

        let members: Vec<EntityId> = self
            .arena
            .entities_sorted()
            .filter(|e| e.placement().is_some_and(|p| p.placement == placement))
            .map(crate::entity::Entity::id)
            .collect();
        for id in members {
            if let Some(order) = self.arena.get_mut(id).and_then(|e| e.order_mut()) {
                order.destination = Some(destination);
                order.target = None;
            }
        }
        Ok(())
    }

    /// Marks `side` ready during placement; both sides ready starts the
    /// battle on the next tick.
    ///
    /// # Errors
    ///
    /// [`OrderRejection::WrongPhase`] outside placement.
    pub fn set_ready(&mut self, side: Side) -> Result<(), OrderRejection> {
        if self.phase.kind() != PhaseKind::Placement {
            return Err(OrderRejection::WrongPhase {
                phase: self.phase.kind(),
            });
        }
        self.phase.set_ready(side);
        Ok(())
    }

    // =========================================================================
    // Networking
    // =========================================================================

    /// Queues an authoritative snapshot for reconciliation.
    ///
    /// Application waits until the local clock reaches the snapshot's
    /// server time; until then the snapshot stays queued (no backward
    /// snap of entities the client is still simulating toward it).
    pub fn submit_snapshot(&mut self, snapshot: WorldSnapshot) {
        self.pending_snapshots.push(snapshot);
    }

    /// Schedules a delayed damage request on the internal queue.
    pub fn schedule_damage(&mut self, request: crate::systems::combat::DelayedDamage) -> String {
        self.delayed.schedule(request)
    }

    fn apply_due_snapshots(&mut self) {
        if self.pending_snapshots.is_empty() {
            return;
        }
        self.pending_snapshots
            .sort_by(|a, b| a.server_time.total_cmp(&b.server_time));
        while let Some(first) = self.pending_snapshots.first() {
            if first.server_time > self.sim_time {
                break;
            }
            let snapshot = self.pending_snapshots.remove(0);
            let report = reconcile(&mut self.arena, &snapshot, &self.reconcile_config);
            debug!(
                created = report.created.len(),
                deleted = report.deleted.len(),
                patched = report.patched,
                skipped = report.skipped,
                drift = report.drift,
                "applied snapshot"
            );
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Read-only access to the entity store.
    #[must_use]
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Mutable access to the entity store, for setup and tests.
    #[must_use]
    pub fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }

    /// Drains the events emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        self.events.drain()
    }

    /// Current tick count.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.arena.current_tick()
    }

    /// Simulation clock in seconds.
    #[must_use]
    pub const fn time(&self) -> f64 {
        self.sim_time
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> PhaseKind {
        self.phase.kind()
    }

    /// 1-based round counter.
    #[must_use]
    pub const fn round(&self) -> u32 {
        self.phase.round()
    }

    /// Match winner once complete.
    #[must_use]
    pub const fn winner(&self) -> Option<Side> {
        self.phase.winner()
    }

    /// A side's gold.
    #[must_use]
    pub const fn gold(&self, side: Side) -> i32 {
        self.gold.gold(side)
    }

    /// A side's team health pool.
    #[must_use]
    pub const fn team_health(&self, side: Side) -> i32 {
        self.team_health.pool(side)
    }

    /// The persistent squad roster.
    #[must_use]
    pub const fn roster(&self) -> &BTreeMap<PlacementId, SquadRecord> {
        &self.roster
    }

    /// The master seed.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.master_seed
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &SimConfig {
        &self.config
    }
}

// =============================================================================
// Tests
// =============================================================================
