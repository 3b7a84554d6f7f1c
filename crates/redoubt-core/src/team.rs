//! Team health pools and round outcome evaluation.
//!
//! A round ends when one side has no living units left. The winning side
//! deals damage to the loser's pooled health equal to the summed base value
//! of its *surviving squads*: squads are grouped by placement id, and one
//! survivor preserves the squad's full value.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::arena::Arena;
use crate::entity::{ComponentMask, PlacementId, Side};

/// The two pooled team health values of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamHealth {
    pools: [i32; 2],
}

impl TeamHealth {
    /// Creates both pools at `initial`.
    #[must_use]
    pub const fn new(initial: i32) -> Self {
        Self {
            pools: [initial, initial],
        }
    }

    /// Returns a side's current pool.
    #[must_use]
    pub const fn pool(&self, side: Side) -> i32 {
        self.pools[side.index()]
    }

    /// Applies round damage to a side's pool, clamped at zero. Returns the
    /// remaining pool.
    pub fn apply_damage(&mut self, side: Side, amount: i32) -> i32 {
        let pool = &mut self.pools[side.index()];
        *pool = (*pool - amount).max(0);
        *pool
    }

    /// Returns `true` when a side's pool has reached zero.
    #[must_use]
    pub const fn is_depleted(&self, side: Side) -> bool {
        self.pools[side.index()] == 0
    }
}

/// Which way a finished battle went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BattleVerdict {
    /// One side still has living units.
    Winner(
        /// The side with survivors.
        Side,
    ),
    /// Both sides were wiped in the same tick.
    Draw,
}

/// Result of resolving one round against the team health pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundOutcome {
    /// Winning side; `None` on a draw.
    pub winner: Option<Side>,
    /// Losing side; `None` on a draw.
    pub loser: Option<Side>,
    /// Damage dealt to the loser's pool (0 on a draw).
    pub damage: i32,
    /// Loser's pool after the damage.
    pub loser_pool: i32,
    /// `true` when the loser's pool reached zero: the match is over.
    pub game_over: bool,
}

/// Counts living units on `side`: entities with Team, Health, and Unit
/// components whose health is in the alive death-state.
#[must_use]
pub fn living_units(arena: &Arena, side: Side) -> usize {
    arena
        .entities_sorted()
        .filter(|e| e.has(ComponentMask::TEAM | ComponentMask::HEALTH | ComponentMask::UNIT))
        .filter(|e| e.team().is_some_and(|t| t.side == side))
        .filter(|e| e.is_alive())
        .count()
}

/// Checks whether the battle is decided.
///
/// Returns `None` while both sides still have living units; otherwise the
/// verdict, with a simultaneous wipe reported as a draw.
#[must_use]
pub fn battle_verdict(arena: &Arena) -> Option<BattleVerdict> {
    let home = living_units(arena, Side::Home);
    let away = living_units(arena, Side::Away);
    match (home, away) {
        (0, 0) => Some(BattleVerdict::Draw),
        (0, _) => Some(BattleVerdict::Winner(Side::Away)),
        (_, 0) => Some(BattleVerdict::Winner(Side::Home)),
        _ => None,
    }
}

/// Sums the base values of the winner's surviving squads.
///
/// Units are grouped by placement id; a squad with at least one living
/// member contributes its full base value exactly once, a fully dead squad
/// contributes nothing.
#[must_use]
pub fn surviving_squad_value(arena: &Arena, winner: Side) -> i32 {
    let mut squads: BTreeMap<PlacementId, i32> = BTreeMap::new();
    for entity in arena.entities_sorted() {
        if !entity.has(
            ComponentMask::TEAM
                | ComponentMask::HEALTH
                | ComponentMask::UNIT
                | ComponentMask::PLACEMENT,
        ) {
            continue;
        }
        if !entity.team().is_some_and(|t| t.side == winner) || !entity.is_alive() {
            continue;
        }
        if let Some(placement) = entity.placement() {
            squads.insert(placement.placement, placement.base_value);
        }
    }
    squads.values().sum()
}

/// Resolves a decided battle against the team health pools.
///
/// Returns `None` while the battle is still running. A draw deals no
/// damage and never ends the match.
pub fn resolve_round(arena: &Arena, health: &mut TeamHealth) -> Option<RoundOutcome> {
    match battle_verdict(arena)? {
        BattleVerdict::Draw => Some(RoundOutcome {
            winner: None,
            loser: None,
            damage: 0,
            loser_pool: 0,
            game_over: false,
        }),
        BattleVerdict::Winner(winner) => {
            let loser = winner.opponent();
            let damage = surviving_squad_value(arena, winner);
            let loser_pool = health.apply_damage(loser, damage);
            Some(RoundOutcome {
                winner: Some(winner),
                loser: Some(loser),
                damage,
                loser_pool,
                game_over: loser_pool == 0,
            })
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
