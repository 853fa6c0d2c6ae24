//! Instance types: one record per running agent process.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered agent process cooperating on the shared tree.
///
/// Created on registration, removed on unregister or when a stale sweep
/// purges it. Liveness is not a field here — it is derived from the
/// instance's heartbeat age whenever someone looks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    /// What this instance is working on.
    pub task: String,
    /// Agent role label (e.g. "implementer", "reviewer").
    pub role: String,
    /// VCS branch the instance works on. Informational only.
    pub branch: Option<String>,
    pub registered_at: Timestamp,
}

/// Liveness record, one per instance.
///
/// Written only by the instance it belongs to; other processes may delete
/// it (after confirming staleness) but never edit it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub instance_id: String,
    pub last_ping: Timestamp,
}

/// Derived liveness, computed from heartbeat age at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// Heartbeat seen within the staleness timeout.
    Active,
    /// No heartbeat within the timeout — presumed crashed or abandoned.
    Stale,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Stale => write!(f, "stale"),
        }
    }
}

/// Generate a fresh instance id: a UTC timestamp plus a random suffix.
///
/// The timestamp makes ids sort by registration order when listed; the
/// suffix keeps two processes registering in the same second distinct.
pub fn generate_instance_id() -> String {
    let stamp = Timestamp::now().strftime("%Y%m%d-%H%M%S");
    let uuid = Uuid::new_v4().simple().to_string();
    format!("i-{stamp}-{}", &uuid[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = generate_instance_id();
        let b = generate_instance_id();
        assert_ne!(a, b);
    }

    #[test]
    fn generated_id_has_expected_shape() {
        let id = generate_instance_id();
        // i-YYYYMMDD-HHMMSS-xxxxxxxx
        assert!(id.starts_with("i-"));
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 6);
        assert_eq!(parts[3].len(), 8);
    }
}
