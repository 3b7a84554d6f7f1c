//! Round/phase state machine and the gold ledger.
//!
//! Phases cycle `Placement -> Battle -> RoundEnd -> Placement` until the
//! match completes. The machine owns timers and readiness flags; the tick
//! driver feeds it `dt` and asks for transitions, and decides itself when a
//! battle has been won (that condition lives in [`crate::team`]).

use serde::{Deserialize, Serialize};

use crate::config::SimConfig;
use crate::entity::Side;

/// The discrete phases of a match.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    /// Units are placed and orders issued; combat systems are gated off.
    Placement,
    /// The simulation systems run.
    Battle,
    /// Intermission between battle and the next placement.
    RoundEnd,
    /// The match is over.
    Complete,
}

/// A phase transition, reported for event emission.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseChange {
    /// Phase before the transition.
    pub from: PhaseKind,
    /// Phase after the transition.
    pub to: PhaseKind,
    /// Round counter after the transition.
    pub round: u32,
}

/// Phase state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseMachine {
    kind: PhaseKind,
    /// Seconds left in a timed phase (placement, round end).
    remaining: f32,
    round: u32,
    ready: [bool; 2],
    winner: Option<Side>,
}

impl PhaseMachine {
    /// Creates the machine in the first placement phase.
    #[must_use]
    pub fn new(config: &SimConfig) -> Self {
        Self {
            kind: PhaseKind::Placement,
            remaining: config.placement_seconds,
            round: 1,
            ready: [false, false],
            winner: None,
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub const fn kind(&self) -> PhaseKind {
        self.kind
    }

    /// Returns the 1-based round counter.
    #[must_use]
    pub const fn round(&self) -> u32 {
        self.round
    }

    /// Returns seconds remaining in the current timed phase.
    #[must_use]
    pub const fn remaining(&self) -> f32 {
        self.remaining
    }

    /// Returns the match winner once the machine is complete.
    #[must_use]
    pub const fn winner(&self) -> Option<Side> {
        self.winner
    }

    /// Returns `true` while combat systems should run.
    #[must_use]
    pub fn is_battle(&self) -> bool {
        self.kind == PhaseKind::Battle
    }

    /// Marks a side ready during placement. Both sides ready skips the
    /// countdown on the next advance.
    pub fn set_ready(&mut self, side: Side) {
        if self.kind == PhaseKind::Placement {
            self.ready[side.index()] = true;
        }
    }

    /// Returns a side's readiness flag.
    #[must_use]
    pub const fn is_ready(&self, side: Side) -> bool {
        self.ready[side.index()]
    }

    /// Advances timers by `dt` and performs timer-driven transitions.
    ///
    /// Battle does not end here; the tick driver detects the win
    /// condition and calls [`PhaseMachine::end_battle`].
    pub fn advance(&mut self, dt: f32) -> Option<PhaseChange> {
        match self.kind {
            PhaseKind::Placement => {
                self.remaining -= dt;
                if self.remaining <= 0.0 || (self.ready[0] && self.ready[1]) {
                    self.kind = PhaseKind::Battle;
                    self.remaining = 0.0;
                    self.ready = [false, false];
                    return Some(PhaseChange {
                        from: PhaseKind::Placement,
                        to: PhaseKind::Battle,
                        round: self.round,
                    });
                }
                None
            }
            PhaseKind::RoundEnd => {
                self.remaining -= dt;
                if self.remaining <= 0.0 {
                    return Some(self.start_placement());
                }
                None
            }
            PhaseKind::Battle | PhaseKind::Complete => None,
        }
    }

    /// Ends the battle phase after round resolution.
    ///
    /// `game_over` short-circuits to [`PhaseKind::Complete`]; otherwise the
    /// round-end intermission starts.
    pub fn end_battle(
        &mut self,
        config: &SimConfig,
        game_over: bool,
        winner: Option<Side>,
    ) -> PhaseChange {
        let from = self.kind;
        if game_over {
            self.kind = PhaseKind::Complete;
            self.remaining = 0.0;
            self.winner = winner;
        } else {
            self.kind = PhaseKind::RoundEnd;
            self.remaining = config.round_end_seconds;
        }
        PhaseChange {
            from,
            to: self.kind,
            round: self.round,
        }
    }

    /// Starts the next placement phase, bumping the round counter.
    fn start_placement(&mut self) -> PhaseChange {
        let from = self.kind;
        self.kind = PhaseKind::Placement;
        self.round += 1;
        self.ready = [false, false];
        self.remaining = 0.0; // Reset by the driver, which owns the config.
        PhaseChange {
            from,
            to: PhaseKind::Placement,
            round: self.round,
        }
    }

    /// Sets the placement countdown. Called by the driver right after a
    /// transition into placement.
    pub fn set_countdown(&mut self, seconds: f32) {
        self.remaining = seconds;
    }
}

/// Per-side gold, mutated by round income and placement costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldLedger {
    gold: [i32; 2],
}

impl GoldLedger {
    /// Creates both ledgers at `starting`.
    #[must_use]
    pub const fn new(starting: i32) -> Self {
        Self {
            gold: [starting, starting],
        }
    }

    /// Returns a side's gold.
    #[must_use]
    pub const fn gold(&self, side: Side) -> i32 {
        self.gold[side.index()]
    }

    /// Credits gold to a side.
    pub fn award(&mut self, side: Side, amount: i32) {
        self.gold[side.index()] += amount;
    }

    /// Debits `amount` if the side can afford it. Returns `false` (and
    /// leaves the ledger untouched) otherwise.
    pub fn try_spend(&mut self, side: Side, amount: i32) -> bool {
        let gold = &mut self.gold[side.index()];
        if *gold < amount {
            return false;
        }
        *gold -= amount;
        true
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> (PhaseMachine, SimConfig) {
        let config = SimConfig::default();
        (PhaseMachine::new(&config), config)
    }

    mod phase_tests {
        use super::*;

        #[test]
        fn starts_in_placement_round_one() {
            let (machine, _) = machine();
            assert_eq!(machine.kind(), PhaseKind::Placement);
            assert_eq!(machine.round(), 1);
        }

        #[test]
        fn placement_times_out_into_battle() {
            let (mut machine, config) = machine();
            let change = machine.advance(config.placement_seconds + 0.1).unwrap();
            assert_eq!(change.from, PhaseKind::Placement);
            assert_eq!(change.to, PhaseKind::Battle);
            assert!(machine.is_battle());
        }

        #[test]
        fn mutual_readiness_skips_the_countdown() {
            let (mut machine, _) = machine();
            machine.set_ready(Side::Home);
            assert!(machine.advance(0.01).is_none());
            machine.set_ready(Side::Away);
            let change = machine.advance(0.01).unwrap();
            assert_eq!(change.to, PhaseKind::Battle);
        }

        #[test]
        fn one_ready_side_is_not_enough() {
            let (mut machine, _) = machine();
            machine.set_ready(Side::Home);
            machine.set_ready(Side::Home);
            assert!(machine.advance(0.01).is_none());
            assert_eq!(machine.kind(), PhaseKind::Placement);
        }

        #[test]
        fn end_battle_enters_round_end_then_next_placement() {
            let (mut machine, config) = machine();
            machine.advance(config.placement_seconds + 0.1);

            let change = machine.end_battle(&config, false, Some(Side::Home));
            assert_eq!(change.to, PhaseKind::RoundEnd);

            let change = machine.advance(config.round_end_seconds + 0.1).unwrap();
            assert_eq!(change.to, PhaseKind::Placement);
            assert_eq!(machine.round(), 2);
        }

        #[test]
        fn game_over_completes_the_match() {
            let (mut machine, config) = machine();
            machine.advance(config.placement_seconds + 0.1);

            let change = machine.end_battle(&config, true, Some(Side::Away));
            assert_eq!(change.to, PhaseKind::Complete);
            assert_eq!(machine.winner(), Some(Side::Away));
            // Complete is terminal.
            assert!(machine.advance(1000.0).is_none());
        }

        #[test]
        fn readiness_ignored_outside_placement() {
            let (mut machine, config) = machine();
            machine.advance(config.placement_seconds + 0.1);
            machine.set_ready(Side::Home);
            assert!(!machine.is_ready(Side::Home));
        }
    }

    mod gold_tests {
        use super::*;

        #[test]
        fn award_and_spend() {
            let mut ledger = GoldLedger::new(10);
            ledger.award(Side::Home, 5);
            assert_eq!(ledger.gold(Side::Home), 15);
            assert!(ledger.try_spend(Side::Home, 12));
            assert_eq!(ledger.gold(Side::Home), 3);
        }

        #[test]
        fn overspend_is_rejected_without_mutation() {
            let mut ledger = GoldLedger::new(4);
            assert!(!ledger.try_spend(Side::Away, 5));
            assert_eq!(ledger.gold(Side::Away), 4);
        }
    }
}
