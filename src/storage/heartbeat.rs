//! Heartbeat storage: one small liveness document per instance.

use std::{fs, io};

use crate::model::Heartbeat;

use super::{Result, Store, StorageError};

impl Store {
    /// Upserts an instance's heartbeat. A single rename-based write — this
    /// runs on every tool use, so it must stay cheap and must never wait
    /// on the registry guard or any lock.
    pub fn write_heartbeat(&self, heartbeat: &Heartbeat) -> Result<()> {
        self.write_doc(&self.heartbeat_path(&heartbeat.instance_id), heartbeat)
    }

    pub fn load_heartbeat(&self, instance_id: &str) -> Result<Option<Heartbeat>> {
        self.read_doc(&self.heartbeat_path(instance_id))
    }

    /// Deletes an instance's heartbeat. Only unregister and the stale
    /// sweep call this; nothing ever edits another instance's heartbeat.
    pub fn remove_heartbeat(&self, instance_id: &str) -> Result<bool> {
        self.remove_doc(&self.heartbeat_path(instance_id))
    }

    /// All heartbeat documents, including orphans whose instance has
    /// already been purged from the registry.
    pub fn list_heartbeats(&self) -> Result<Vec<Heartbeat>> {
        let dir = self.root().join("heartbeats");
        let mut heartbeats = Vec::new();
        let entries = match fs::read_dir(&dir) {
            Ok(e) => e,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(heartbeats),
            Err(e) => return Err(StorageError::Io(e)),
        };
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(hb) = self.read_doc(&path)? {
                heartbeats.push(hb);
            }
        }
        Ok(heartbeats)
    }
}
