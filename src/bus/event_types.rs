//! Event names and payload bodies.
//!
//! Single source of truth for the events services exchange over the bus.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

pub const RESOURCE_DELETED: &str = "resource.deleted";
pub const RESOURCE_COMPLETED: &str = "resource.completed";

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDeleted {
    pub resource_id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCompleted {
    pub resource_id: String,
}
