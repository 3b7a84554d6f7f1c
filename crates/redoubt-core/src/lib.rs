//! # Redoubt Core
//!
//! Real-time tactical simulation core for Redoubt, a multiplayer
//! auto-battler. Entities with position, velocity, health, and combat data
//! move, collide, and exchange damage; the round/phase state machine gates
//! placement against combat; and the client reconciles its entity store
//! against authoritative server snapshots.
//!
//! ## Architecture
//!
//! - **Arena**: `BTreeMap`-backed entity/component store with sorted,
//!   deterministic iteration and a spatial index
//! - **Systems**: movement/steering, projectile ballistics, attacks,
//!   damage resolution, status upkeep, run in a fixed order each tick
//! - **Simulation**: the tick driver owning the phase machine, team
//!   health, gold, and the deterministic RNG
//! - **Net**: snapshot reconciliation and order request tracking
//!
//! ## Determinism
//!
//! The central invariant: every cross-entity iteration that can influence
//! simulation state walks entities in sorted id order, and randomness
//! comes only from a seeded RNG consumed inside that order. Two peers
//! stepping the same inputs stay bit-identical.
//!
//! ## Usage
//!
//! ```
//! use glam::Vec3;
//! use redoubt_core::entity::{Side, UnitKind};
//! use redoubt_core::simulation::Simulation;
//!
//! let mut sim = Simulation::new(42);
//! sim.place_squad(Side::Home, UnitKind::Footman, Vec3::new(-5.0, 0.0, 0.0))?;
//! sim.place_squad(Side::Away, UnitKind::Archer, Vec3::new(5.0, 0.0, 0.0))?;
//! sim.set_ready(Side::Home)?;
//! sim.set_ready(Side::Away)?;
//!
//! for _ in 0..10 {
//!     sim.step();
//! }
//! let _events = sim.drain_events(); // feed rendering, audio, networking
//! # Ok::<(), redoubt_core::simulation::OrderRejection>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod arena;
pub mod config;
pub mod context;
pub mod entity;
pub mod events;
pub mod net;
pub mod phase;
pub mod simulation;
pub mod systems;
pub mod team;

#[cfg(test)]
mod tests;

pub use arena::Arena;
pub use config::SimConfig;
pub use entity::{EntityId, Side};
pub use events::SimEvent;
pub use simulation::Simulation;
