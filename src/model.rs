//! Core data model for crew.
//!
//! These types mirror the persisted state one-to-one: instances and their
//! heartbeats, advisory file locks, and decision-log entries. Liveness and
//! lock outcomes are derived at read time, never stored.

mod decision;
mod instance;
mod lock;

use serde::Serialize;

pub use decision::{DecisionDraft, DecisionLogEntry};
pub use instance::{Heartbeat, Instance, InstanceStatus, generate_instance_id};
pub use lock::{Acquire, Conflict, FileLock, LockState, Renew};

/// Snapshot view of one instance: its registration, derived liveness,
/// and the locks it currently holds.
///
/// Held locks are derived from the locks directory at read time — the
/// registry document never stores them, so the two cannot disagree.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceReport {
    #[serde(flatten)]
    pub instance: Instance,
    pub status: InstanceStatus,
    pub locks: Vec<FileLock>,
}
