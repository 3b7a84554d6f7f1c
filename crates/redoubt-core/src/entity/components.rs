//! Typed component blocks attached to entities.
//!
//! Components are plain serde-friendly data: numbers, strings, and nested
//! vectors. Every component here mirrors one row of the wire format used by
//! snapshots, so an entity can be exported to and patched from plain nested
//! key-value data without a separate DTO layer.

use bitflags::bitflags;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::EntityId;

// =============================================================================
// Shared enums
// =============================================================================

/// Faction tag. A battle always has exactly two sides.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum Side {
    /// The locally-owned side.
    #[default]
    Home,
    /// The opposing side.
    Away,
}

impl Side {
    /// Returns the opposing side.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Self::Home => Self::Away,
            Self::Away => Self::Home,
        }
    }

    /// Index into per-side arrays (`[T; 2]`).
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Home => 0,
            Self::Away => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Home => write!(f, "Home"),
            Self::Away => write!(f, "Away"),
        }
    }
}

/// Damage element, dispatched to a mitigation path by the damage pipeline.
///
/// Unrecognized element strings coming off the wire deserialize to
/// [`Element::Unknown`]; the pipeline logs and treats them as physical.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Element {
    /// Mitigated by flat armor, floored at 1.
    Physical,
    /// Mitigated by the fire resistance fraction.
    Fire,
    /// Mitigated by the cold resistance fraction.
    Cold,
    /// Mitigated by the lightning resistance fraction.
    Lightning,
    /// Unmitigable.
    Holy,
    /// Unmitigable.
    Shadow,
    /// Redirected to the damage-over-time path; never resisted.
    Poison,
    /// Anything the wire sent that this build does not know.
    #[serde(other)]
    Unknown,
}

/// Lifecycle state of a [`Health`] component.
///
/// Death triggers exactly once: the transition `Alive -> Dying` happens the
/// first time current health reaches zero, and the external death process
/// (animation, loot, despawn) runs off the emitted event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeathState {
    /// Taking damage, counting for round outcome.
    #[default]
    Alive,
    /// Lethal damage received; death process started.
    Dying,
    /// Death process finished; awaiting cleanup.
    Dead,
}

bitflags! {
    /// Per-entity boolean state shared across systems.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct UnitFlags: u8 {
        /// Holding position (in attack range); movement desires zero translation.
        const ANCHORED = 1 << 0;
        /// Affected by gravity and clamped to terrain height.
        const GRAVITY = 1 << 1;
        /// Never tracked server-side; reconciliation must not delete it.
        const CLIENT_ONLY = 1 << 2;
        /// Ballistic projectile embedded in the ground, inert until expiry.
        const STUCK = 1 << 3;
    }
}

// =============================================================================
// Spatial components
// =============================================================================

/// World-space position and facing. Mutated each tick by movement and
/// projectile integration.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Transform {
    /// World position (x/z horizontal, y up).
    pub position: Vec3,
    /// Facing angle in radians, counter-clockwise around +Y from +X.
    pub yaw: f32,
}

impl Transform {
    /// Creates a transform at `position` facing `yaw`.
    #[must_use]
    pub const fn new(position: Vec3, yaw: f32) -> Self {
        Self { position, yaw }
    }

    /// Creates a transform at `position` with default facing.
    #[must_use]
    pub const fn at(position: Vec3) -> Self {
        Self::new(position, 0.0)
    }
}

/// Current velocity and speed limit.
///
/// The gravity-affected and anchored flags live in [`UnitFlags`] on the
/// entity so that systems can test them without touching this component.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    /// Velocity vector in m/s.
    pub velocity: Vec3,
    /// Maximum horizontal speed in m/s.
    pub max_speed: f32,
}

impl Velocity {
    /// Creates a zero velocity with the given speed limit.
    #[must_use]
    pub const fn with_max_speed(max_speed: f32) -> Self {
        Self {
            velocity: Vec3::ZERO,
            max_speed,
        }
    }
}

impl Default for Velocity {
    fn default() -> Self {
        Self::with_max_speed(3.0)
    }
}

// =============================================================================
// Combat components
// =============================================================================

/// Hit points and death bookkeeping.
///
/// `current <= max` always holds. Damage is integral: every multiplicative
/// step of the damage pipeline floors to an integer so that independently
/// executing peers agree bit-for-bit.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    /// Current hit points.
    pub current: i32,
    /// Maximum hit points.
    pub max: i32,
    /// Death lifecycle state.
    pub death_state: DeathState,
    /// Last entity that damaged this one, for retaliation targeting.
    pub last_attacker: Option<EntityId>,
    /// Simulation time of the last hit, in seconds.
    pub last_hit_time: f64,
}

impl Health {
    /// Creates a full-health component.
    #[must_use]
    pub const fn new(max: i32) -> Self {
        Self {
            current: max,
            max,
            death_state: DeathState::Alive,
            last_attacker: None,
            last_hit_time: 0.0,
        }
    }

    /// Returns `true` while the entity is in the alive death-state.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.death_state == DeathState::Alive
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Team membership. Immutable for the lifetime of the entity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Team {
    /// The faction this entity fights for.
    pub side: Side,
}

impl Team {
    /// Creates a team tag for `side`.
    #[must_use]
    pub const fn new(side: Side) -> Self {
        Self { side }
    }
}

/// Elemental resistance fractions in `[-1.0, 0.9]` after clamping.
///
/// Negative values are vulnerabilities. Raw values outside the legal range
/// are accepted here and clamped at mitigation time.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Resistances {
    /// Fire resistance fraction.
    pub fire: f32,
    /// Cold resistance fraction.
    pub cold: f32,
    /// Lightning resistance fraction.
    pub lightning: f32,
}

impl Resistances {
    /// Returns the raw (unclamped) resistance for an elemental damage type.
    ///
    /// Non-elemental types have no resistance and return 0.
    #[must_use]
    pub fn for_element(&self, element: Element) -> f32 {
        match element {
            Element::Fire => self.fire,
            Element::Cold => self.cold,
            Element::Lightning => self.lightning,
            _ => 0.0,
        }
    }
}

/// Projectile parameters for ranged attackers, consumed by
/// [`fire_projectile`](crate::systems::projectile::fire_projectile).
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileSpec {
    /// Muzzle speed in m/s (direct) or ballistic speed ceiling.
    pub speed: f32,
    /// Parabolic arc instead of a straight, speed-normalized line.
    pub ballistic: bool,
    /// Damage element carried by the projectile.
    pub element: Element,
    /// Splash radius on impact; 0 means single-target.
    pub splash_radius: f32,
    /// Homing blend strength per second; 0 disables homing.
    pub homing_strength: f32,
    /// Seconds before the projectile self-destructs.
    pub lifetime: f32,
    /// Collision test radius around the projectile center.
    pub hit_radius: f32,
}

impl Default for ProjectileSpec {
    fn default() -> Self {
        Self {
            speed: 18.0,
            ballistic: false,
            element: Element::Physical,
            splash_radius: 0.0,
            homing_strength: 0.0,
            lifetime: 6.0,
            hit_radius: 0.35,
        }
    }
}

/// Offensive and defensive combat data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combat {
    /// Base damage per hit.
    pub damage: i32,
    /// Attack range in meters, measured center to surface.
    pub range: f32,
    /// Flat armor subtracted from physical damage.
    pub armor: i32,
    /// Elemental resistance fractions.
    pub resistances: Resistances,
    /// Seconds between attacks.
    pub attack_interval: f32,
    /// Seconds until the next attack is allowed.
    pub cooldown: f32,
    /// Probability in `[0, 1]` that a hit is critical.
    pub crit_chance: f32,
    /// Element of this entity's attacks.
    pub element: Element,
    /// Present for ranged attackers; `None` means melee.
    pub projectile: Option<ProjectileSpec>,
}

impl Default for Combat {
    fn default() -> Self {
        Self {
            damage: 10,
            range: 1.5,
            armor: 0,
            resistances: Resistances::default(),
            attack_interval: 1.0,
            cooldown: 0.0,
            crit_chance: 0.0,
            element: Element::Physical,
            projectile: None,
        }
    }
}

/// Unit archetype; which one an entity is decides its catalog stats, not
/// its behavior (behavior follows from components).
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// Melee line infantry.
    #[default]
    Footman,
    /// Direct-fire ranged unit.
    Archer,
    /// Ballistic splash artillery.
    Mortar,
}

/// Marks an entity as a combat unit that counts for round outcome.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    /// Catalog archetype.
    pub kind: UnitKind,
    /// Collision radius in meters, used by separation and boundary clamps.
    pub radius: f32,
}

impl Default for Unit {
    fn default() -> Self {
        Self {
            kind: UnitKind::Footman,
            radius: 0.5,
        }
    }
}

// =============================================================================
// Status components
// =============================================================================

/// Buff archetype. Per-stack effects are linear in stack count.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuffKind {
    /// +15% damage dealt per stack.
    Fury,
    /// -10% damage taken per stack.
    Bulwark,
    /// 5% flat damage reduction per stack.
    Ward,
}

impl BuffKind {
    /// Damage-dealt multiplier contribution per stack.
    #[must_use]
    pub const fn attack_bonus_per_stack(self) -> f32 {
        match self {
            Self::Fury => 0.15,
            Self::Bulwark | Self::Ward => 0.0,
        }
    }

    /// Damage-taken multiplier contribution per stack (negative reduces).
    #[must_use]
    pub const fn taken_bonus_per_stack(self) -> f32 {
        match self {
            Self::Bulwark => -0.10,
            Self::Fury | Self::Ward => 0.0,
        }
    }

    /// Flat damage-reduction fraction per stack.
    #[must_use]
    pub const fn reduction_per_stack(self) -> f32 {
        match self {
            Self::Ward => 0.05,
            Self::Fury | Self::Bulwark => 0.0,
        }
    }
}

/// One active buff instance.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Buff {
    /// Which buff this is.
    pub kind: BuffKind,
    /// Stack count; effects scale linearly with it.
    pub stacks: u32,
    /// Simulation time at which the buff expires. Active while `now <= end_time`.
    pub end_time: f64,
}

/// The set of buffs on an entity.
///
/// Expired buffs are treated as absent by every query; [`Buffs::prune`]
/// additionally drops them from storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Buffs {
    /// Active (and possibly expired-but-unpruned) buff instances.
    pub active: Vec<Buff>,
}

impl Buffs {
    /// Adds stacks of `kind` expiring at `end_time`, merging with an
    /// existing instance of the same kind (later expiry wins).
    pub fn apply(&mut self, kind: BuffKind, stacks: u32, end_time: f64) {
        if let Some(buff) = self.active.iter_mut().find(|b| b.kind == kind) {
            buff.stacks += stacks;
            buff.end_time = buff.end_time.max(end_time);
        } else {
            self.active.push(Buff {
                kind,
                stacks,
                end_time,
            });
        }
    }

    /// Damage-dealt multiplier from all buffs active at `now`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn attack_multiplier(&self, now: f64) -> f32 {
        let mut mult = 1.0;
        for buff in self.active.iter().filter(|b| now <= b.end_time) {
            mult += buff.kind.attack_bonus_per_stack() * buff.stacks as f32;
        }
        mult.max(0.0)
    }

    /// Damage-taken multiplier from all buffs active at `now`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn taken_multiplier(&self, now: f64) -> f32 {
        let mut mult = 1.0;
        for buff in self.active.iter().filter(|b| now <= b.end_time) {
            mult += buff.kind.taken_bonus_per_stack() * buff.stacks as f32;
        }
        mult.max(0.0)
    }

    /// Flat damage-reduction fraction from all buffs active at `now`,
    /// clamped to `[0, 0.9]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn damage_reduction(&self, now: f64) -> f32 {
        let mut total = 0.0;
        for buff in self.active.iter().filter(|b| now <= b.end_time) {
            total += buff.kind.reduction_per_stack() * buff.stacks as f32;
        }
        total.clamp(0.0, 0.9)
    }

    /// Drops expired instances from storage.
    pub fn prune(&mut self, now: f64) {
        self.active.retain(|b| now <= b.end_time);
    }

    /// Returns `true` if no buff is active at `now`.
    #[must_use]
    pub fn is_inert(&self, now: f64) -> bool {
        !self.active.iter().any(|b| now <= b.end_time)
    }
}

/// Aggregated poison state: one record holding the stack count rather than
/// a list of individual stack instances.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poison {
    /// Current stack count, capped by config.
    pub stacks: u32,
    /// Damage dealt per stack per tick interval.
    pub damage_per_stack: i32,
    /// Seconds between damage ticks.
    pub tick_interval: f32,
    /// Seconds until the poison expires; reapplication refreshes this.
    pub remaining: f32,
    /// Seconds accumulated toward the next damage tick.
    pub since_last_tick: f32,
    /// Entity that applied the poison, credited with kills.
    pub source: Option<EntityId>,
}

impl Default for Poison {
    fn default() -> Self {
        Self {
            stacks: 1,
            damage_per_stack: 1,
            tick_interval: 1.0,
            remaining: 0.0,
            since_last_tick: 0.0,
            source: None,
        }
    }
}

// =============================================================================
// Projectile component
// =============================================================================

/// In-flight projectile state.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    /// Damage applied on impact, pre-mitigation.
    pub damage: i32,
    /// Nominal flight speed in m/s.
    pub speed: f32,
    /// Entity that fired the projectile.
    pub source: EntityId,
    /// Side of the firer, captured at launch (the firer may die mid-flight).
    pub side: Side,
    /// Homing target, if any.
    pub target: Option<EntityId>,
    /// Position aimed at when launched.
    pub target_pos: Vec3,
    /// Parabolic gravity arc instead of a straight line.
    pub ballistic: bool,
    /// Launch elevation angle in radians (0 for direct fire).
    pub launch_angle: f32,
    /// Predicted seconds to the aim point at launch.
    pub time_to_target: f32,
    /// Seconds in flight so far.
    pub flight_time: f32,
    /// Damage element.
    pub element: Element,
    /// Splash radius on impact; 0 means single-target.
    pub splash_radius: f32,
    /// Seconds of flight remaining before self-destruction.
    pub lifetime: f32,
    /// Homing blend strength per second; 0 disables homing.
    pub homing_strength: f32,
    /// Collision test radius.
    pub hit_radius: f32,
}

impl Default for Projectile {
    fn default() -> Self {
        Self {
            damage: 0,
            speed: 0.0,
            source: EntityId::new(0),
            side: Side::Home,
            target: None,
            target_pos: Vec3::ZERO,
            ballistic: false,
            launch_angle: 0.0,
            time_to_target: 0.0,
            flight_time: 0.0,
            element: Element::Physical,
            splash_radius: 0.0,
            lifetime: 0.0,
            homing_strength: 0.0,
            hit_radius: 0.35,
        }
    }
}

// =============================================================================
// Orders and steering
// =============================================================================

/// Scratch state the steering pipeline persists between ticks.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SteeringMemory {
    /// Chosen avoidance side: `+1` (left) or `-1` (right). Persisted so the
    /// unit does not flip sides every tick while skirting an obstacle.
    pub avoid_side: Option<f32>,
    /// Position where the avoidance side was chosen; the choice resets once
    /// the unit has moved the repath distance away from it.
    pub avoid_origin: Vec3,
    /// Steering direction of the previous tick.
    pub last_dir: Vec3,
    /// Count of recent direction reversals feeding the oscillation detector.
    pub reversals: u32,
    /// Seconds since the reversal count last decayed.
    pub reversal_timer: f32,
}

/// Current order: chase a target entity or move to a position.
///
/// A new order supersedes the previous one; explicit cancellation clears
/// both fields.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Order {
    /// Entity being chased/attacked. Takes precedence over `destination`.
    pub target: Option<EntityId>,
    /// Ground position to move to.
    pub destination: Option<Vec3>,
    /// Steering scratch state.
    pub steering: SteeringMemory,
}

impl Order {
    /// Creates an order to move to `destination`.
    #[must_use]
    pub fn move_to(destination: Vec3) -> Self {
        Self {
            destination: Some(destination),
            ..Self::default()
        }
    }

    /// Creates an order to chase `target`.
    #[must_use]
    pub fn chase(target: EntityId) -> Self {
        Self {
            target: Some(target),
            ..Self::default()
        }
    }
}

// =============================================================================
// Placement
// =============================================================================

/// Stable identifier grouping the units of one placement (squad).
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct PlacementId(pub u64);

impl fmt::Display for PlacementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "placement:{}", self.0)
    }
}

/// Squad membership for round-end survival scoring.
///
/// Every unit of a squad carries the squad's full base value; scoring
/// counts each surviving squad once, not each surviving unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Placement {
    /// The squad this unit belongs to.
    pub placement: PlacementId,
    /// The squad's base value for team-health damage.
    pub base_value: i32,
}

// =============================================================================
// Tests
// =============================================================================
