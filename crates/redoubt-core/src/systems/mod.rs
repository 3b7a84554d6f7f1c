//! Simulation systems, one module per tick stage.
//!
//! The tick driver runs them in a fixed order during the battle phase:
//! movement, projectile flight, attacks, delayed damage, then status
//! upkeep. Each system takes the arena plus the per-tick context and
//! mutates entities in place; within a tick exactly one system writes at a
//! time, and each iterates entities in sorted id order.

pub mod attack;
pub mod combat;
pub mod movement;
pub mod projectile;
pub mod status;
