//! Arena: the single shared entity/component store.
//!
//! The arena is the container for all entities in a battle. It provides:
//! - Entity storage with deterministic iteration order (`BTreeMap`)
//! - A spatial index for proximity queries
//! - Entity lifecycle management (spawn/despawn)
//! - Capability queries over the component masks
//!
//! # Determinism
//!
//! Entity ids are monotonically increasing and the `BTreeMap`'s natural
//! ordering guarantees consistent iteration across platforms. Every query
//! that can influence simulation state returns ids in sorted order.
//!
//! # Spatial index synchronization
//!
//! The spatial index is NOT automatically synchronized when entity
//! positions change through `get_mut()`. Systems that move entities must
//! call [`Arena::update_spatial`] afterward. Spawning and despawning keep
//! the index in sync on their own.

use std::collections::{BTreeMap, HashMap};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::entity::{ComponentMask, Entity, EntityId, EntityProto};

// =============================================================================
// Spatial Index
// =============================================================================

/// Position index for proximity queries.
///
/// Backed by a `HashMap`, which is acceptable because lookups are by known
/// id and radius queries sort their results before returning; the map's
/// iteration order never reaches simulation state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpatialIndex {
    /// Entity positions indexed by id.
    positions: HashMap<EntityId, Vec3>,
}

impl SpatialIndex {
    /// Creates a new empty spatial index.
    #[must_use]
    pub fn new() -> Self {
        Self {
            positions: HashMap::new(),
        }
    }

    /// Inserts or updates an entity's position in the index.
    pub fn insert(&mut self, id: EntityId, pos: Vec3) {
        self.positions.insert(id, pos);
    }

    /// Removes an entity from the spatial index.
    pub fn remove(&mut self, id: EntityId) {
        self.positions.remove(&id);
    }

    /// Returns the position of an entity, if known.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<Vec3> {
        self.positions.get(&id).copied()
    }

    /// Queries for entities within `radius` of `center`.
    ///
    /// Returns entity ids sorted by id for deterministic consumption.
    #[must_use]
    pub fn query_radius(&self, center: Vec3, radius: f32) -> Vec<EntityId> {
        let radius_sq = radius * radius;
        let mut results: Vec<EntityId> = self
            .positions
            .iter()
            .filter(|(_, pos)| center.distance_squared(**pos) <= radius_sq)
            .map(|(id, _)| *id)
            .collect();

        // Sort for deterministic order
        results.sort_unstable();
        results
    }

    /// Returns the number of indexed entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns `true` if the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

// =============================================================================
// Arena
// =============================================================================

/// Entity/component store for one battle.
///
/// # Example
///
/// ```
/// use glam::Vec3;
/// use redoubt_core::arena::Arena;
/// use redoubt_core::entity::{ComponentMask, EntityProto, Health, Transform};
///
/// let mut arena = Arena::new();
/// let id = arena.spawn(EntityProto {
///     transform: Some(Transform::at(Vec3::ZERO)),
///     health: Some(Health::new(100)),
///     ..EntityProto::default()
/// });
///
/// let with_health = arena.ids_with(ComponentMask::TRANSFORM | ComponentMask::HEALTH);
/// assert_eq!(with_health, vec![id]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arena {
    /// Monotonically increasing entity id counter.
    next_id: u64,
    /// Entity storage with deterministic iteration order.
    entities: BTreeMap<EntityId, Entity>,
    /// Spatial index for proximity queries.
    spatial: SpatialIndex,
    /// Current simulation tick.
    tick: u64,
}

impl Arena {
    /// Creates a new empty arena at tick 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 0,
            entities: BTreeMap::new(),
            spatial: SpatialIndex::new(),
            tick: 0,
        }
    }

    /// Spawns a new entity, assigning the next free id.
    ///
    /// The entity is added to the spatial index when it has a transform.
    pub fn spawn(&mut self, proto: EntityProto) -> EntityId {
        let id = EntityId::new(self.next_id);
        self.next_id += 1;
        self.insert(id, proto);
        id
    }

    /// Spawns an entity under a caller-chosen id.
    ///
    /// Used by reconciliation to materialize server-known entities whose
    /// ids are authoritative. Replaces any existing entity under that id
    /// and bumps the id counter past it so local spawns never collide.
    pub fn spawn_at(&mut self, id: EntityId, proto: EntityProto) {
        self.next_id = self.next_id.max(id.as_u64() + 1);
        self.insert(id, proto);
    }

    fn insert(&mut self, id: EntityId, proto: EntityProto) {
        let entity = Entity::from_proto(id, proto);
        if let Some(transform) = entity.transform() {
            self.spatial.insert(id, transform.position);
        }
        self.entities.insert(id, entity);
    }

    /// Despawns an entity, returning it if it existed.
    pub fn despawn(&mut self, id: EntityId) -> Option<Entity> {
        self.spatial.remove(id);
        self.entities.remove(&id)
    }

    /// Returns a reference to an entity by id.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Returns a mutable reference to an entity by id.
    #[must_use]
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Returns an iterator over entity ids in deterministic (sorted) order.
    pub fn ids_sorted(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    /// Returns an iterator over entities in deterministic (sorted) order.
    pub fn entities_sorted(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.entities.values()
    }

    /// Returns an iterator over mutable entities in deterministic order.
    pub fn entities_sorted_mut(&mut self) -> impl Iterator<Item = &mut Entity> + '_ {
        self.entities.values_mut()
    }

    /// Capability query: ids of entities carrying every bit of `required`,
    /// in sorted order.
    #[must_use]
    pub fn ids_with(&self, required: ComponentMask) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|entity| entity.has(required))
            .map(Entity::id)
            .collect()
    }

    /// Returns the number of entities in the arena.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the arena has no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Returns a reference to the spatial index.
    #[must_use]
    pub fn spatial(&self) -> &SpatialIndex {
        &self.spatial
    }

    /// Returns the current simulation tick.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Advances the simulation tick counter.
    pub fn advance_tick(&mut self) {
        self.tick += 1;
    }

    /// Re-syncs the spatial index entry for an entity after its position
    /// changed through `get_mut()`.
    pub fn update_spatial(&mut self, id: EntityId) {
        if let Some(entity) = self.entities.get(&id) {
            if let Some(transform) = entity.transform() {
                self.spatial.insert(id, transform.position);
            }
        }
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Health, Side, Team, Transform, Unit};

    fn proto_at(x: f32, z: f32) -> EntityProto {
        EntityProto {
            transform: Some(Transform::at(Vec3::new(x, 0.0, z))),
            health: Some(Health::new(100)),
            team: Some(Team::new(Side::Home)),
            unit: Some(Unit::default()),
            ..EntityProto::default()
        }
    }

    mod spatial_index_tests {
        use super::*;

        #[test]
        fn insert_and_get() {
            let mut index = SpatialIndex::new();
            index.insert(EntityId::new(1), Vec3::new(1.0, 2.0, 3.0));
            assert_eq!(index.get(EntityId::new(1)), Some(Vec3::new(1.0, 2.0, 3.0)));
            assert_eq!(index.len(), 1);
        }

        #[test]
        fn remove_deletes_entry() {
            let mut index = SpatialIndex::new();
            index.insert(EntityId::new(1), Vec3::ZERO);
            index.remove(EntityId::new(1));
            assert!(index.get(EntityId::new(1)).is_none());
            assert!(index.is_empty());
        }

        #[test]
        fn query_radius_finds_entities_within() {
            let mut index = SpatialIndex::new();
            index.insert(EntityId::new(1), Vec3::ZERO);
            index.insert(EntityId::new(2), Vec3::new(5.0, 0.0, 0.0));
            index.insert(EntityId::new(3), Vec3::new(15.0, 0.0, 0.0));

            let results = index.query_radius(Vec3::ZERO, 10.0);
            assert_eq!(results, vec![EntityId::new(1), EntityId::new(2)]);
        }

        #[test]
        fn query_radius_returns_sorted_results() {
            let mut index = SpatialIndex::new();
            index.insert(EntityId::new(8), Vec3::new(1.0, 0.0, 0.0));
            index.insert(EntityId::new(2), Vec3::new(2.0, 0.0, 0.0));
            index.insert(EntityId::new(5), Vec3::new(3.0, 0.0, 0.0));

            let results = index.query_radius(Vec3::ZERO, 100.0);
            assert_eq!(
                results,
                vec![EntityId::new(2), EntityId::new(5), EntityId::new(8)]
            );
        }

        #[test]
        fn query_radius_boundary_is_inclusive() {
            let mut index = SpatialIndex::new();
            index.insert(EntityId::new(1), Vec3::new(10.0, 0.0, 0.0));
            assert_eq!(
                index.query_radius(Vec3::ZERO, 10.0),
                vec![EntityId::new(1)]
            );
        }
    }

    mod arena_tests {
        use super::*;

        #[test]
        fn spawn_assigns_sequential_ids() {
            let mut arena = Arena::new();
            let id1 = arena.spawn(proto_at(0.0, 0.0));
            let id2 = arena.spawn(proto_at(1.0, 0.0));
            assert_eq!(id1, EntityId::new(0));
            assert_eq!(id2, EntityId::new(1));
            assert_eq!(arena.entity_count(), 2);
        }

        #[test]
        fn spawn_adds_to_spatial_index() {
            let mut arena = Arena::new();
            let id = arena.spawn(proto_at(3.0, 4.0));
            assert_eq!(arena.spatial().get(id), Some(Vec3::new(3.0, 0.0, 4.0)));
        }

        #[test]
        fn spawn_without_transform_skips_spatial_index() {
            let mut arena = Arena::new();
            let id = arena.spawn(EntityProto::default());
            assert!(arena.spatial().get(id).is_none());
        }

        #[test]
        fn spawn_at_bumps_id_counter() {
            let mut arena = Arena::new();
            arena.spawn_at(EntityId::new(10), proto_at(0.0, 0.0));
            let next = arena.spawn(proto_at(1.0, 0.0));
            assert_eq!(next, EntityId::new(11));
        }

        #[test]
        fn despawn_removes_entity_and_spatial_entry() {
            let mut arena = Arena::new();
            let id = arena.spawn(proto_at(0.0, 0.0));
            assert!(arena.despawn(id).is_some());
            assert!(arena.get(id).is_none());
            assert!(arena.spatial().get(id).is_none());
        }

        #[test]
        fn despawn_nonexistent_returns_none() {
            let mut arena = Arena::new();
            assert!(arena.despawn(EntityId::new(99)).is_none());
        }

        #[test]
        fn ids_with_filters_by_mask() {
            let mut arena = Arena::new();
            let unit = arena.spawn(proto_at(0.0, 0.0));
            let bare = arena.spawn(EntityProto {
                transform: Some(Transform::at(Vec3::ZERO)),
                ..EntityProto::default()
            });

            let combatants = arena.ids_with(
                ComponentMask::TRANSFORM | ComponentMask::HEALTH | ComponentMask::TEAM,
            );
            assert_eq!(combatants, vec![unit]);

            let positioned = arena.ids_with(ComponentMask::TRANSFORM);
            assert_eq!(positioned, vec![unit, bare]);
        }

        #[test]
        fn iteration_order_is_sorted_after_despawn() {
            let mut arena = Arena::new();
            let id0 = arena.spawn(proto_at(0.0, 0.0));
            let id1 = arena.spawn(proto_at(1.0, 0.0));
            let id2 = arena.spawn(proto_at(2.0, 0.0));
            arena.despawn(id1);

            let ids: Vec<_> = arena.ids_sorted().collect();
            assert_eq!(ids, vec![id0, id2]);
        }

        #[test]
        fn update_spatial_resyncs_position() {
            let mut arena = Arena::new();
            let id = arena.spawn(proto_at(0.0, 0.0));

            arena
                .get_mut(id)
                .unwrap()
                .transform_mut()
                .unwrap()
                .position = Vec3::new(7.0, 0.0, 7.0);

            // Index is stale until resynced.
            assert_eq!(arena.spatial().get(id), Some(Vec3::ZERO));
            arena.update_spatial(id);
            assert_eq!(arena.spatial().get(id), Some(Vec3::new(7.0, 0.0, 7.0)));
        }

        #[test]
        fn advance_tick_increments() {
            let mut arena = Arena::new();
            assert_eq!(arena.current_tick(), 0);
            arena.advance_tick();
            arena.advance_tick();
            assert_eq!(arena.current_tick(), 2);
        }

        #[test]
        fn serialization_roundtrip_preserves_counters() {
            let mut arena = Arena::new();
            arena.spawn(proto_at(1.0, 2.0));
            arena.advance_tick();

            let json = serde_json::to_string(&arena).unwrap();
            let mut back: Arena = serde_json::from_str(&json).unwrap();

            assert_eq!(back.entity_count(), 1);
            assert_eq!(back.current_tick(), 1);
            assert_eq!(back.spawn(proto_at(0.0, 0.0)), EntityId::new(1));
        }
    }
}
