//! Per-tick context handed to every system.
//!
//! There is no global simulation state: the tick driver builds a
//! [`TickContext`] each step and passes it into each system call. The
//! context carries the clock, config, terrain, the deterministic RNG, and
//! the event bus.

use glam::Vec3;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::SimConfig;
use crate::events::EventBus;

// =============================================================================
// Terrain
// =============================================================================

/// Height-field terrain query.
///
/// The default is a flat plane at height 0. A grid variant samples the
/// nearest cell, which keeps the query deterministic (no interpolation
/// order concerns across platforms).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Terrain {
    /// Flat ground at a fixed height.
    Flat {
        /// Ground height in meters.
        height: f32,
    },
    /// Regular grid of heights centered on the origin.
    Grid {
        /// Cell edge length in meters.
        cell_size: f32,
        /// Cells per axis.
        cells: u32,
        /// Row-major heights, `cells * cells` entries.
        heights: Vec<f32>,
    },
}

impl Terrain {
    /// Creates flat terrain at `height`.
    #[must_use]
    pub const fn flat(height: f32) -> Self {
        Self::Flat { height }
    }

    /// Returns the ground height at a world-space x/z position.
    ///
    /// Positions outside a grid fall back to the nearest edge cell.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        match self {
            Self::Flat { height } => *height,
            Self::Grid {
                cell_size,
                cells,
                heights,
            } => {
                if heights.is_empty() || *cells == 0 {
                    return 0.0;
                }
                let half = *cells as f32 * cell_size / 2.0;
                let col = ((x + half) / cell_size).floor().clamp(0.0, (*cells - 1) as f32) as usize;
                let row = ((z + half) / cell_size).floor().clamp(0.0, (*cells - 1) as f32) as usize;
                heights
                    .get(row * *cells as usize + col)
                    .copied()
                    .unwrap_or(0.0)
            }
        }
    }

    /// Returns the ground height below a world position.
    #[must_use]
    pub fn height_below(&self, position: Vec3) -> f32 {
        self.height_at(position.x, position.z)
    }
}

impl Default for Terrain {
    fn default() -> Self {
        Self::flat(0.0)
    }
}

// =============================================================================
// TickContext
// =============================================================================

/// Everything a system needs for one tick besides the arena itself.
///
/// Built fresh by the tick driver each step; systems never hold on to it.
pub struct TickContext<'a> {
    /// Fixed timestep for this tick, in seconds.
    pub dt: f32,
    /// Tick counter at the start of this step.
    pub tick: u64,
    /// Simulation clock in seconds at the start of this step.
    pub now: f64,
    /// Simulation configuration.
    pub config: &'a SimConfig,
    /// Terrain height queries.
    pub terrain: &'a Terrain,
    /// Deterministic RNG; consumed only inside sorted iteration.
    pub rng: &'a mut ChaCha8Rng,
    /// Typed event sink drained by the host after the tick.
    pub events: &'a mut EventBus,
}

// =============================================================================
// Test support
// =============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use super::{SimConfig, Terrain, TickContext};
    use crate::events::EventBus;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// Owns everything a [`TickContext`] borrows, for unit tests.
    pub(crate) struct CtxHarness {
        pub config: SimConfig,
        pub terrain: Terrain,
        pub rng: ChaCha8Rng,
        pub events: EventBus,
        pub tick: u64,
        pub now: f64,
    }

    impl CtxHarness {
        pub fn new() -> Self {
            Self {
                config: SimConfig::default(),
                terrain: Terrain::default(),
                rng: ChaCha8Rng::seed_from_u64(7),
                events: EventBus::new(),
                tick: 0,
                now: 0.0,
            }
        }

        pub fn ctx(&mut self) -> TickContext<'_> {
            TickContext {
                dt: self.config.dt,
                tick: self.tick,
                now: self.now,
                config: &self.config,
                terrain: &self.terrain,
                rng: &mut self.rng,
                events: &mut self.events,
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_terrain_is_constant() {
        let terrain = Terrain::flat(2.5);
        assert!((terrain.height_at(0.0, 0.0) - 2.5).abs() < f32::EPSILON);
        assert!((terrain.height_at(-100.0, 42.0) - 2.5).abs() < f32::EPSILON);
    }

    #[test]
    fn grid_terrain_samples_cells() {
        // 2x2 grid of 1m cells centered on origin.
        let terrain = Terrain::Grid {
            cell_size: 1.0,
            cells: 2,
            heights: vec![0.0, 1.0, 2.0, 3.0],
        };
        assert!((terrain.height_at(-0.5, -0.5) - 0.0).abs() < f32::EPSILON);
        assert!((terrain.height_at(0.5, -0.5) - 1.0).abs() < f32::EPSILON);
        assert!((terrain.height_at(-0.5, 0.5) - 2.0).abs() < f32::EPSILON);
        assert!((terrain.height_at(0.5, 0.5) - 3.0).abs() < f32::EPSILON);
    }

    #[test]
    fn grid_terrain_clamps_to_edges() {
        let terrain = Terrain::Grid {
            cell_size: 1.0,
            cells: 2,
            heights: vec![0.0, 1.0, 2.0, 3.0],
        };
        // Far outside the grid: nearest edge cell.
        assert!((terrain.height_at(100.0, 100.0) - 3.0).abs() < f32::EPSILON);
        assert!((terrain.height_at(-100.0, -100.0) - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_grid_falls_back_to_zero() {
        let terrain = Terrain::Grid {
            cell_size: 1.0,
            cells: 0,
            heights: vec![],
        };
        assert_eq!(terrain.height_at(0.0, 0.0), 0.0);
    }
}
