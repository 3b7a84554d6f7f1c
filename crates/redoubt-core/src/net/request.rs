//! Outbound order requests and their response tracking.
//!
//! Orders travel to the server as request/response pairs. The tracker
//! remembers what was sent so a response (or a timeout) can be matched
//! back to the originating request. Timed-out requests are not retried;
//! they surface to the caller, who decides whether to reissue.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::entity::{PlacementId, Side, UnitKind};

/// Correlation id for one outbound request.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request:{}", self.0)
    }
}

/// An order sent to the authoritative server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderRequest {
    /// Place a squad of units during the placement phase.
    SubmitPlacement {
        /// Owning side.
        side: Side,
        /// Unit archetype to place.
        unit: UnitKind,
        /// Requested squad center.
        position: Vec3,
    },
    /// Point one or more squads at a destination.
    SetSquadTargets {
        /// Owning side.
        side: Side,
        /// Squads to redirect.
        placements: Vec<PlacementId>,
        /// Destination position.
        destination: Vec3,
    },
    /// Signal readiness to start the battle.
    ReadyForBattle {
        /// The side that is ready.
        side: Side,
    },
}

/// The server's answer to an [`OrderRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderResponse {
    /// The order was accepted and applied.
    Accepted {
        /// The request this answers.
        request: RequestId,
    },
    /// The order was rejected.
    Rejected {
        /// The request this answers.
        request: RequestId,
        /// Human-readable rejection reason.
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PendingOrder {
    request: OrderRequest,
    issued_at: f64,
}

/// Tracks in-flight order requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestTracker {
    pending: BTreeMap<RequestId, PendingOrder>,
    next_id: u64,
    timeout_seconds: f64,
}

impl RequestTracker {
    /// Creates a tracker with the given timeout.
    #[must_use]
    pub fn new(timeout_seconds: f64) -> Self {
        Self {
            pending: BTreeMap::new(),
            next_id: 0,
            timeout_seconds,
        }
    }

    /// Registers an outbound request, returning its correlation id.
    pub fn issue(&mut self, request: OrderRequest, now: f64) -> RequestId {
        let id = RequestId(self.next_id);
        self.next_id += 1;
        self.pending.insert(
            id,
            PendingOrder {
                request,
                issued_at: now,
            },
        );
        id
    }

    /// Resolves a request when its response arrives, returning the
    /// original order. Unknown ids (already timed out, duplicate
    /// response) return `None`.
    pub fn resolve(&mut self, id: RequestId) -> Option<OrderRequest> {
        self.pending.remove(&id).map(|p| p.request)
    }

    /// Removes and returns every request older than the timeout.
    ///
    /// Timed-out requests are not retried here; the caller surfaces them
    /// to the UI for reissue.
    pub fn sweep_timed_out(&mut self, now: f64) -> Vec<(RequestId, OrderRequest)> {
        let expired: Vec<RequestId> = self
            .pending
            .iter()
            .filter(|(_, p)| now - p.issued_at >= self.timeout_seconds)
            .map(|(id, _)| *id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| self.pending.remove(&id).map(|p| (id, p.request)))
            .collect()
    }

    /// Returns the number of in-flight requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new(5.0)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> OrderRequest {
        OrderRequest::ReadyForBattle { side: Side::Home }
    }

    #[test]
    fn issue_and_resolve_roundtrip() {
        let mut tracker = RequestTracker::new(5.0);
        let id = tracker.issue(ready(), 0.0);
        assert_eq!(tracker.pending_count(), 1);

        let request = tracker.resolve(id).unwrap();
        assert_eq!(request, ready());
        assert_eq!(tracker.pending_count(), 0);

        // Duplicate responses are ignored.
        assert!(tracker.resolve(id).is_none());
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let mut tracker = RequestTracker::new(5.0);
        let a = tracker.issue(ready(), 0.0);
        let b = tracker.issue(ready(), 0.0);
        assert!(a < b);
    }

    #[test]
    fn timed_out_requests_are_swept_not_retried() {
        let mut tracker = RequestTracker::new(2.0);
        let old = tracker.issue(ready(), 0.0);
        let fresh = tracker.issue(
            OrderRequest::SetSquadTargets {
                side: Side::Away,
                placements: vec![PlacementId(1)],
                destination: Vec3::new(1.0, 0.0, 2.0),
            },
            1.5,
        );

        let expired = tracker.sweep_timed_out(2.5);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, old);
        // The fresh request is still in flight.
        assert_eq!(tracker.pending_count(), 1);
        assert!(tracker.resolve(fresh).is_some());
    }

    #[test]
    fn requests_roundtrip_through_json() {
        let request = OrderRequest::SubmitPlacement {
            side: Side::Home,
            unit: UnitKind::Archer,
            position: Vec3::new(-3.0, 0.0, 4.0),
        };
        let json = serde_json::to_string(&request).unwrap();
        let back: OrderRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(request, back);

        let response = OrderResponse::Rejected {
            request: RequestId(7),
            reason: "wrong phase".to_string(),
        };
        let json = serde_json::to_string(&response).unwrap();
        let back: OrderResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(response, back);
    }
}
