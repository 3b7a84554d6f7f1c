//! Entities and their component storage.
//!
//! An entity is an opaque [`EntityId`] that exists only through its attached
//! components. Storage is a struct of optional typed slots plus a
//! [`ComponentMask`] kept in sync on attach/remove; capability queries
//! ("entities with X, Y, Z") are mask-intersection filters, evaluated in
//! sorted id order by the arena.
//!
//! # Ordering
//!
//! Entity ids are ordered by their numeric value. Every cross-entity
//! iteration in the simulation walks ids in this order, which is what keeps
//! independently executing peers bit-identical.

pub mod components;

use bitflags::bitflags;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub use components::{
    Buff, BuffKind, Buffs, Combat, DeathState, Element, Health, Order, Placement, PlacementId,
    Poison, Projectile, ProjectileSpec, Resistances, Side, SteeringMemory, Team, Transform, Unit,
    UnitFlags, UnitKind, Velocity,
};

/// Unique identifier for an entity.
///
/// `EntityId` is a newtype wrapper around `u64`. Ids are assigned
/// monotonically by the arena (or dictated by the server during
/// reconciliation) and are unique within a battle.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates an `EntityId` from a raw `u64` value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw `u64` value of this identifier.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl From<EntityId> for u64 {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

bitflags! {
    /// Capability index: one bit per component slot.
    ///
    /// Stored on every entity and kept in sync by the attach/remove
    /// methods, so "entities with Transform+Health+Team" is a single
    /// `mask.contains(...)` test during sorted iteration.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ComponentMask: u16 {
        /// [`Transform`] slot.
        const TRANSFORM = 1 << 0;
        /// [`Velocity`] slot.
        const VELOCITY = 1 << 1;
        /// [`Health`] slot.
        const HEALTH = 1 << 2;
        /// [`Team`] slot.
        const TEAM = 1 << 3;
        /// [`Combat`] slot.
        const COMBAT = 1 << 4;
        /// [`Unit`] slot.
        const UNIT = 1 << 5;
        /// [`Buffs`] slot.
        const BUFFS = 1 << 6;
        /// [`Poison`] slot.
        const POISON = 1 << 7;
        /// [`Projectile`] slot.
        const PROJECTILE = 1 << 8;
        /// [`Order`] slot.
        const ORDER = 1 << 9;
        /// [`Placement`] slot.
        const PLACEMENT = 1 << 10;
    }
}

/// Error produced when patching a component from wire data.
#[derive(Debug, Error)]
pub enum ComponentError {
    /// The component name is not one this build knows.
    #[error("unknown component type `{0}`")]
    Unknown(String),
    /// The payload did not decode into the component's shape.
    #[error("malformed component data: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Component bundle used to spawn an entity.
///
/// Build one with struct-update syntax and hand it to
/// [`Arena::spawn`](crate::arena::Arena::spawn):
///
/// ```
/// use glam::Vec3;
/// use redoubt_core::entity::{EntityProto, Health, Transform};
///
/// let proto = EntityProto {
///     transform: Some(Transform::at(Vec3::ZERO)),
///     health: Some(Health::new(80)),
///     ..EntityProto::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EntityProto {
    /// Boolean per-entity state.
    pub flags: UnitFlags,
    /// Position and facing.
    pub transform: Option<Transform>,
    /// Velocity and speed limit.
    pub velocity: Option<Velocity>,
    /// Hit points.
    pub health: Option<Health>,
    /// Faction tag.
    pub team: Option<Team>,
    /// Combat stats.
    pub combat: Option<Combat>,
    /// Unit marker and radius.
    pub unit: Option<Unit>,
    /// Buff set.
    pub buffs: Option<Buffs>,
    /// Poison state.
    pub poison: Option<Poison>,
    /// Projectile flight state.
    pub projectile: Option<Projectile>,
    /// Current order.
    pub order: Option<Order>,
    /// Squad membership.
    pub placement: Option<Placement>,
}

/// A stored entity: id, flags, mask, and the optional component slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    id: EntityId,
    flags: UnitFlags,
    mask: ComponentMask,
    transform: Option<Transform>,
    velocity: Option<Velocity>,
    health: Option<Health>,
    team: Option<Team>,
    combat: Option<Combat>,
    unit: Option<Unit>,
    buffs: Option<Buffs>,
    poison: Option<Poison>,
    projectile: Option<Projectile>,
    order: Option<Order>,
    placement: Option<Placement>,
}

macro_rules! component_accessors {
    ($name:ident, $name_mut:ident, $setter:ident, $remover:ident, $field:ident, $ty:ty, $bit:ident) => {
        /// Returns the component, if attached.
        #[must_use]
        pub fn $name(&self) -> Option<&$ty> {
            self.$field.as_ref()
        }

        /// Returns the component mutably, if attached.
        #[must_use]
        pub fn $name_mut(&mut self) -> Option<&mut $ty> {
            self.$field.as_mut()
        }

        /// Attaches or replaces the component.
        pub fn $setter(&mut self, value: $ty) {
            self.$field = Some(value);
            self.mask.insert(ComponentMask::$bit);
        }

        /// Detaches the component, returning it if it was attached.
        pub fn $remover(&mut self) -> Option<$ty> {
            self.mask.remove(ComponentMask::$bit);
            self.$field.take()
        }
    };
}

impl Entity {
    /// Builds an entity from a component bundle, deriving the mask from the
    /// populated slots.
    #[must_use]
    pub fn from_proto(id: EntityId, proto: EntityProto) -> Self {
        let mut mask = ComponentMask::empty();
        let set = |present: bool, bit: ComponentMask, mask: &mut ComponentMask| {
            if present {
                mask.insert(bit);
            }
        };
        set(proto.transform.is_some(), ComponentMask::TRANSFORM, &mut mask);
        set(proto.velocity.is_some(), ComponentMask::VELOCITY, &mut mask);
        set(proto.health.is_some(), ComponentMask::HEALTH, &mut mask);
        set(proto.team.is_some(), ComponentMask::TEAM, &mut mask);
        set(proto.combat.is_some(), ComponentMask::COMBAT, &mut mask);
        set(proto.unit.is_some(), ComponentMask::UNIT, &mut mask);
        set(proto.buffs.is_some(), ComponentMask::BUFFS, &mut mask);
        set(proto.poison.is_some(), ComponentMask::POISON, &mut mask);
        set(proto.projectile.is_some(), ComponentMask::PROJECTILE, &mut mask);
        set(proto.order.is_some(), ComponentMask::ORDER, &mut mask);
        set(proto.placement.is_some(), ComponentMask::PLACEMENT, &mut mask);

        Self {
            id,
            flags: proto.flags,
            mask,
            transform: proto.transform,
            velocity: proto.velocity,
            health: proto.health,
            team: proto.team,
            combat: proto.combat,
            unit: proto.unit,
            buffs: proto.buffs,
            poison: proto.poison,
            projectile: proto.projectile,
            order: proto.order,
            placement: proto.placement,
        }
    }

    /// Returns the entity's unique identifier.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Returns the entity's capability mask.
    #[must_use]
    pub const fn mask(&self) -> ComponentMask {
        self.mask
    }

    /// Returns `true` if every bit of `required` is attached.
    #[must_use]
    pub const fn has(&self, required: ComponentMask) -> bool {
        self.mask.contains(required)
    }

    /// Returns the entity's flags.
    #[must_use]
    pub const fn flags(&self) -> UnitFlags {
        self.flags
    }

    /// Returns the entity's flags mutably.
    #[must_use]
    pub fn flags_mut(&mut self) -> &mut UnitFlags {
        &mut self.flags
    }

    component_accessors!(transform, transform_mut, set_transform, remove_transform, transform, Transform, TRANSFORM);
    component_accessors!(velocity, velocity_mut, set_velocity, remove_velocity, velocity, Velocity, VELOCITY);
    component_accessors!(health, health_mut, set_health, remove_health, health, Health, HEALTH);
    component_accessors!(team, team_mut, set_team, remove_team, team, Team, TEAM);
    component_accessors!(combat, combat_mut, set_combat, remove_combat, combat, Combat, COMBAT);
    component_accessors!(unit, unit_mut, set_unit, remove_unit, unit, Unit, UNIT);
    component_accessors!(buffs, buffs_mut, set_buffs, remove_buffs, buffs, Buffs, BUFFS);
    component_accessors!(poison, poison_mut, set_poison, remove_poison, poison, Poison, POISON);
    component_accessors!(projectile, projectile_mut, set_projectile, remove_projectile, projectile, Projectile, PROJECTILE);
    component_accessors!(order, order_mut, set_order, remove_order, order, Order, ORDER);
    component_accessors!(placement, placement_mut, set_placement, remove_placement, placement, Placement, PLACEMENT);

    /// Returns transform and velocity together for integration passes.
    #[must_use]
    pub fn kinematics_mut(&mut self) -> Option<(&mut Transform, &mut Velocity)> {
        match (self.transform.as_mut(), self.velocity.as_mut()) {
            (Some(transform), Some(velocity)) => Some((transform, velocity)),
            _ => None,
        }
    }

    /// Returns `true` if the entity has a health component in the alive
    /// death-state.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.health.as_ref().is_some_and(Health::is_alive)
    }

    /// Exports all attached components as plain nested key-value data,
    /// keyed by wire component name.
    #[must_use]
    pub fn export(&self) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        let mut put = |name: &str, value: Option<Value>| {
            if let Some(value) = value {
                out.insert(name.to_string(), value);
            }
        };
        put("flags", serde_json::to_value(self.flags).ok());
        put("transform", self.transform.and_then(|c| serde_json::to_value(c).ok()));
        put("velocity", self.velocity.and_then(|c| serde_json::to_value(c).ok()));
        put("health", self.health.and_then(|c| serde_json::to_value(c).ok()));
        put("team", self.team.and_then(|c| serde_json::to_value(c).ok()));
        put("combat", self.combat.as_ref().and_then(|c| serde_json::to_value(c).ok()));
        put("unit", self.unit.and_then(|c| serde_json::to_value(c).ok()));
        put("buffs", self.buffs.as_ref().and_then(|c| serde_json::to_value(c).ok()));
        put("poison", self.poison.and_then(|c| serde_json::to_value(c).ok()));
        put("projectile", self.projectile.and_then(|c| serde_json::to_value(c).ok()));
        put("order", self.order.and_then(|c| serde_json::to_value(c).ok()));
        put("placement", self.placement.and_then(|c| serde_json::to_value(c).ok()));
        out
    }

    /// Patches one component from wire data.
    ///
    /// If the component is attached, the reported fields are merged over it
    /// and unreported (or purely local) fields survive. If it is missing,
    /// the patch is merged over the component's default and attached.
    ///
    /// # Errors
    ///
    /// [`ComponentError::Unknown`] for unrecognized names,
    /// [`ComponentError::Decode`] when the merged value does not decode.
    pub fn merge_component(&mut self, name: &str, patch: &Value) -> Result<(), ComponentError> {
        let bit = match name {
            "flags" => {
                self.flags = serde_json::from_value(patch.clone())?;
                return Ok(());
            }
            "transform" => {
                merge_typed(&mut self.transform, patch)?;
                ComponentMask::TRANSFORM
            }
            "velocity" => {
                merge_typed(&mut self.velocity, patch)?;
                ComponentMask::VELOCITY
            }
            "health" => {
                merge_typed(&mut self.health, patch)?;
                ComponentMask::HEALTH
            }
            "team" => {
                merge_typed(&mut self.team, patch)?;
                ComponentMask::TEAM
            }
            "combat" => {
                merge_typed(&mut self.combat, patch)?;
                ComponentMask::COMBAT
            }
            "unit" => {
                merge_typed(&mut self.unit, patch)?;
                ComponentMask::UNIT
            }
            "buffs" => {
                merge_typed(&mut self.buffs, patch)?;
                ComponentMask::BUFFS
            }
            "poison" => {
                merge_typed(&mut self.poison, patch)?;
                ComponentMask::POISON
            }
            "projectile" => {
                merge_typed(&mut self.projectile, patch)?;
                ComponentMask::PROJECTILE
            }
            "order" => {
                merge_typed(&mut self.order, patch)?;
                ComponentMask::ORDER
            }
            "placement" => {
                merge_typed(&mut self.placement, patch)?;
                ComponentMask::PLACEMENT
            }
            other => return Err(ComponentError::Unknown(other.to_string())),
        };
        self.mask.insert(bit);
        Ok(())
    }
}

/// Merges `patch` over the serialized form of the slot (or the type's
/// default when the slot is empty) and decodes the result back.
fn merge_typed<T>(slot: &mut Option<T>, patch: &Value) -> Result<(), serde_json::Error>
where
    T: Serialize + DeserializeOwned + Default,
{
    let mut base = match slot.as_ref() {
        Some(value) => serde_json::to_value(value)?,
        None => serde_json::to_value(T::default())?,
    };
    deep_merge(&mut base, patch);
    *slot = Some(serde_json::from_value(base)?);
    Ok(())
}

/// Recursively merges `patch` into `base`: objects merge key-by-key, every
/// other value (including arrays, so vectors replace wholesale) overwrites.
pub(crate) fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, patch_value),
                    None => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

// =============================================================================
// Tests
// =============================================================================
