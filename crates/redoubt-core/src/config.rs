//! Simulation configuration.
//!
//! All tunables live in [`SimConfig`], which is plain serde data so a match
//! setup can be loaded from JSON. Defaults are the values the game ships
//! with; tests override individual fields with struct-update syntax.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::entity::{Element, ProjectileSpec, Resistances, UnitKind};

/// Fixed timestep used by the default configuration (60 Hz).
pub const FIXED_DT: f32 = 1.0 / 60.0;

/// What happens when poison is reapplied at the stack cap.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StackPolicy {
    /// Keep the cap, refresh the duration.
    #[default]
    RefreshDuration,
    /// Reject the application outright.
    Reject,
}

/// Steering tunables consumed by the movement system.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct SteeringConfig {
    /// Exponential smoothing rate per second for velocity blending.
    pub smoothing_rate: f32,
    /// Weight of the separation force.
    pub separation_weight: f32,
    /// Maximum neighbor candidates considered for separation.
    pub max_neighbors: usize,
    /// Weight of the avoidance force.
    pub avoidance_weight: f32,
    /// Number of look-ahead sample points.
    pub avoid_samples: u32,
    /// Spacing between look-ahead samples in meters.
    pub avoid_spacing: f32,
    /// Radius checked for obstacles around each sample point.
    pub avoid_check_radius: f32,
    /// Distance the unit must travel before its avoidance side resets.
    pub repath_distance: f32,
    /// Minimum speed below which facing stops updating.
    pub min_face_speed: f32,
    /// Direction reversals inside the decay window that trip the
    /// oscillation detector.
    pub reversal_threshold: u32,
    /// Seconds between reversal-count decays.
    pub reversal_decay: f32,
    /// Distance at which a move order counts as arrived.
    pub arrive_distance: f32,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            smoothing_rate: 8.0,
            separation_weight: 2.0,
            max_neighbors: 6,
            avoidance_weight: 1.5,
            avoid_samples: 3,
            avoid_spacing: 0.8,
            avoid_check_radius: 0.7,
            repath_distance: 2.5,
            min_face_speed: 0.05,
            reversal_threshold: 3,
            reversal_decay: 1.0,
            arrive_distance: 0.25,
        }
    }
}

/// Catalog entry describing one unit archetype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSpec {
    /// Gold cost to place one squad.
    pub cost: i32,
    /// Squad base value for team-health damage.
    pub base_value: i32,
    /// Hit points per unit.
    pub hp: i32,
    /// Base damage per hit.
    pub damage: i32,
    /// Attack range in meters.
    pub range: f32,
    /// Flat armor.
    pub armor: i32,
    /// Elemental resistances.
    pub resistances: Resistances,
    /// Movement speed in m/s.
    pub speed: f32,
    /// Collision radius in meters.
    pub radius: f32,
    /// Seconds between attacks.
    pub attack_interval: f32,
    /// Critical hit probability in `[0, 1]`.
    pub crit_chance: f32,
    /// Attack element.
    pub element: Element,
    /// Projectile parameters; `None` means melee.
    pub projectile: Option<ProjectileSpec>,
    /// Units spawned per placement.
    pub squad_size: u32,
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Fixed timestep in seconds.
    pub dt: f32,
    /// Half extent of the square battlefield on x/z; entities are clamped
    /// inside `[-half, half]` inset by their radius.
    pub world_half_extent: f32,
    /// Gravity in m/s² (positive down).
    pub gravity: f32,
    /// Placement phase countdown in seconds.
    pub placement_seconds: f32,
    /// Round-end intermission in seconds.
    pub round_end_seconds: f32,
    /// Starting team health pool per side.
    pub team_health: i32,
    /// Gold both sides start with.
    pub starting_gold: i32,
    /// Gold income awarded after every round.
    pub gold_income: i32,
    /// Extra gold for the round winner.
    pub gold_win_bonus: i32,
    /// Critical hit damage multiplier.
    pub crit_multiplier: f32,
    /// Maximum poison stacks on one target.
    pub poison_stack_cap: u32,
    /// Behavior when reapplying poison at the cap.
    pub poison_policy: StackPolicy,
    /// Steering tunables.
    pub steering: SteeringConfig,
    /// Numeric tolerance for snapshot comparison.
    pub snapshot_epsilon: f64,
    /// Unit catalog keyed by archetype.
    pub catalog: BTreeMap<UnitKind, UnitSpec>,
}

impl SimConfig {
    /// Parses a configuration from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns the underlying decode error when the document is malformed.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Looks up the catalog entry for a unit kind.
    #[must_use]
    pub fn unit_spec(&self, kind: UnitKind) -> Option<&UnitSpec> {
        self.catalog.get(&kind)
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        let mut catalog = BTreeMap::new();
        catalog.insert(
            UnitKind::Footman,
            UnitSpec {
                cost: 3,
                base_value: 30,
                hp: 120,
                damage: 12,
                range: 0.8,
                armor: 3,
                resistances: Resistances::default(),
                speed: 2.6,
                radius: 0.45,
                attack_interval: 1.1,
                crit_chance: 0.1,
                element: Element::Physical,
                projectile: None,
                squad_size: 4,
            },
        );
        catalog.insert(
            UnitKind::Archer,
            UnitSpec {
                cost: 4,
                base_value: 40,
                hp: 70,
                damage: 15,
                range: 9.0,
                armor: 0,
                resistances: Resistances {
                    fire: 0.1,
                    ..Resistances::default()
                },
                speed: 2.9,
                radius: 0.4,
                attack_interval: 1.4,
                crit_chance: 0.15,
                element: Element::Physical,
                projectile: Some(ProjectileSpec {
                    speed: 22.0,
                    ballistic: false,
                    element: Element::Physical,
                    splash_radius: 0.0,
                    homing_strength: 6.0,
                    lifetime: 4.0,
                    hit_radius: 0.3,
                }),
                squad_size: 3,
            },
        );
        catalog.insert(
            UnitKind::Mortar,
            UnitSpec {
                cost: 6,
                base_value: 60,
                hp: 55,
                damage: 28,
                range: 14.0,
                armor: 0,
                resistances: Resistances::default(),
                speed: 1.8,
                radius: 0.55,
                attack_interval: 3.2,
                crit_chance: 0.0,
                element: Element::Fire,
                projectile: Some(ProjectileSpec {
                    speed: 16.0,
                    ballistic: true,
                    element: Element::Fire,
                    splash_radius: 2.5,
                    homing_strength: 2.0,
                    lifetime: 10.0,
                    hit_radius: 0.4,
                }),
                squad_size: 1,
            },
        );

        Self {
            dt: FIXED_DT,
            world_half_extent: 24.0,
            gravity: 9.8,
            placement_seconds: 30.0,
            round_end_seconds: 4.0,
            team_health: 500,
            starting_gold: 10,
            gold_income: 5,
            gold_win_bonus: 2,
            crit_multiplier: 1.5,
            poison_stack_cap: 10,
            poison_policy: StackPolicy::RefreshDuration,
            steering: SteeringConfig::default(),
            snapshot_epsilon: 0.001,
            catalog,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
