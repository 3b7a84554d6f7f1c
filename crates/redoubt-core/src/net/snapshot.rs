//! Authoritative snapshots and client reconciliation.
//!
//! A snapshot maps entity id to `{component name -> data}`. Reconciliation
//! diffs it against the local arena:
//!
//! 1. Server-only entities are created with deep copies of every reported
//!    component.
//! 2. Local-only entities are deleted, unless flagged client-only
//!    (decorative entities the server never tracks).
//! 3. Entities present on both sides get each reported component merged
//!    field-by-field; unreported and purely-local fields survive.
//!
//! Per-entity failures are logged and skipped, never aborting the pass.
//! The "wait until the local clock catches up to the snapshot's server
//! timestamp" gate lives in the simulation driver, which queues snapshots
//! and applies them on the first tick whose clock has caught up.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::arena::Arena;
use crate::entity::{Entity, EntityId, EntityProto, UnitFlags};

/// One entity's reported components, keyed by wire component name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EntitySnapshot {
    /// Component payloads, plain nested key-value data.
    pub components: BTreeMap<String, Value>,
}

impl EntitySnapshot {
    /// Captures an entity's attached components.
    #[must_use]
    pub fn of(entity: &Entity) -> Self {
        Self {
            components: entity.export(),
        }
    }
}

/// An authoritative world snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Server simulation clock at capture time, in seconds.
    pub server_time: f64,
    /// Reported entities keyed by raw entity id.
    pub entities: BTreeMap<u64, EntitySnapshot>,
}

impl WorldSnapshot {
    /// Captures every server-tracked entity in the arena.
    ///
    /// Client-only entities are never part of a snapshot.
    #[must_use]
    pub fn capture(arena: &Arena, server_time: f64) -> Self {
        let mut entities = BTreeMap::new();
        for entity in arena.entities_sorted() {
            if entity.flags().contains(UnitFlags::CLIENT_ONLY) {
                continue;
            }
            entities.insert(entity.id().as_u64(), EntitySnapshot::of(entity));
        }
        Self {
            server_time,
            entities,
        }
    }
}

/// Knobs for the reconciliation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Numeric leaves closer than this count as equal in diagnostics.
    pub epsilon: f64,
    /// Field names excluded from drift comparison (purely visual state
    /// the client owns, e.g. facing).
    pub excluded_fields: Vec<String>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.001,
            excluded_fields: vec!["yaw".to_string()],
        }
    }
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Entities materialized from the snapshot.
    pub created: Vec<EntityId>,
    /// Local entities removed because the server no longer reports them.
    pub deleted: Vec<EntityId>,
    /// Entities whose components were merged.
    pub patched: usize,
    /// Component payloads that failed to apply and were skipped.
    pub skipped: usize,
    /// Numeric leaves that drifted beyond epsilon before patching.
    pub drift: usize,
}

/// Reconciles the local arena against an authoritative snapshot.
pub fn reconcile(
    arena: &mut Arena,
    snapshot: &WorldSnapshot,
    config: &ReconcileConfig,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    // 2. Local entities the server no longer reports are deleted, unless
    //    flagged client-only.
    let stale: Vec<EntityId> = arena
        .entities_sorted()
        .filter(|e| !e.flags().contains(UnitFlags::CLIENT_ONLY))
        .filter(|e| !snapshot.entities.contains_key(&e.id().as_u64()))
        .map(Entity::id)
        .collect();
    for id in stale {
        arena.despawn(id);
        report.deleted.push(id);
    }

    // 1 & 3. Create or patch reported entities, in id order.
    for (&raw_id, entity_snapshot) in &snapshot.entities {
        let id = EntityId::new(raw_id);
        let existed = arena.get(id).is_some();
        if !existed {
            arena.spawn_at(id, EntityProto::default());
        }

        let Some(entity) = arena.get_mut(id) else { continue };

        // Diagnostics before patching: how far had we drifted?
        if existed {
            let local = entity.export();
            for (name, server_value) in &entity_snapshot.components {
                if let Some(local_value) = local.get(name) {
                    report.drift += count_drift(
                        local_value,
                        server_value,
                        config.epsilon,
                        &config.excluded_fields,
                    );
                }
            }
        }

        for (name, value) in &entity_snapshot.components {
            if let Err(error) = entity.merge_component(name, value) {
                warn!(entity = %id, component = %name, %error, "skipping component during reconciliation");
                report.skipped += 1;
            }
        }

        arena.update_spatial(id);
        if existed {
            report.patched += 1;
        } else {
            debug!(entity = %id, "materialized server entity");
            report.created.push(id);
        }
    }

    report
}

/// Counts numeric leaves differing by more than `epsilon` between two
/// component values. Objects recurse key-by-key (comparing only keys both
/// sides have), arrays recurse element-wise, and excluded field names are
/// skipped wherever they appear.
fn count_drift(local: &Value, server: &Value, epsilon: f64, excluded: &[String]) -> usize {
    match (local, server) {
        (Value::Object(local_map), Value::Object(server_map)) => server_map
            .iter()
            .filter(|(key, _)| !excluded.iter().any(|e| e == *key))
            .filter_map(|(key, server_value)| {
                local_map
                    .get(key)
                    .map(|local_value| count_drift(local_value, server_value, epsilon, excluded))
            })
            .sum(),
        (Value::Array(local_items), Value::Array(server_items)) => local_items
            .iter()
            .zip(server_items)
            .map(|(l, s)| count_drift(l, s, epsilon, excluded))
            .sum(),
        (Value::Number(local_num), Value::Number(server_num)) => {
            let l = local_num.as_f64().unwrap_or(0.0);
            let s = server_num.as_f64().unwrap_or(0.0);
            usize::from((l - s).abs() > epsilon)
        }
        (l, s) => usize::from(l != s),
    }
}

// =============================================================================
// Tests
// =============================================================================
