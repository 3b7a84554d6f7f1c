//! Client-side networking: authoritative snapshots, reconciliation, and
//! order request/response plumbing.
//!
//! The wire format is plain nested key-value data (numbers, strings,
//! nested vectors); no binary framing is defined at this layer.

mod request;
mod snapshot;

pub use request::{OrderRequest, OrderResponse, RequestId, RequestTracker};
pub use snapshot::{
    reconcile, EntitySnapshot, ReconcileConfig, ReconcileReport, WorldSnapshot,
};
