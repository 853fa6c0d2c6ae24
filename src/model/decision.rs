//! Decision log types: append-only records of cross-instance decisions.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// One immutable entry in the decision log.
///
/// Corrections are made by appending a new entry, never by editing. The
/// author id is metadata only — entries stay readable after the authoring
/// instance is long gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionLogEntry {
    /// Date plus per-day sequence, e.g. `D-20260806-003`.
    pub decision_id: String,
    pub category: String,
    pub title: String,
    pub description: String,
    /// What the decision applies to (a path, a subsystem, "global").
    pub scope: Option<String>,
    pub timestamp: Timestamp,
    pub author_instance_id: String,
}

/// A decision as submitted, before an id and timestamp are assigned.
#[derive(Debug, Clone)]
pub struct DecisionDraft {
    pub category: String,
    pub title: String,
    pub description: String,
    pub scope: Option<String>,
    pub author_instance_id: String,
}
