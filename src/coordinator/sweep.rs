//! Stale-instance sweep: the self-healing path for crashed processes.
//!
//! No daemon runs this. Registration and lock acquisition call
//! [`Coordinator::maybe_sweep`], which does the full scan only when the
//! stamp file says one hasn't run recently; the `cleanup` CLI verb calls
//! [`Coordinator::cleanup_stale_instances`] unconditionally.

use std::collections::HashSet;

use jiff::{SignedDuration, Timestamp};

use crate::model::{Instance, InstanceStatus};
use crate::storage::Result;

use super::Coordinator;

impl Coordinator {
    /// Purges every instance whose heartbeat has lapsed: registry entry,
    /// heartbeat document, and all locks it owned. Returns the purged
    /// instances.
    ///
    /// Safe to run from any number of processes at once — every deletion
    /// here tolerates the record being gone already.
    pub fn cleanup_stale_instances(&self) -> Result<Vec<Instance>> {
        let mut failure = None;
        let stale = self.store.with_registry(|reg| {
            let mut stale = Vec::new();
            reg.retain(|instance| match self.is_stale(instance) {
                Ok(true) => {
                    stale.push(instance.clone());
                    false
                }
                Ok(false) => true,
                Err(e) => {
                    // Keep the entry; a later sweep retries it.
                    failure = Some(e);
                    true
                }
            });
            stale
        })?;
        if let Some(e) = failure {
            return Err(e);
        }

        for instance in &stale {
            self.store.remove_heartbeat(&instance.instance_id)?;
        }

        // Orphan heartbeats: a crash between registry removal and
        // heartbeat deletion leaves a document with no instance. Purge
        // them by the same age rule.
        let registered: HashSet<String> = self
            .store
            .load_registry()?
            .into_iter()
            .map(|i| i.instance_id)
            .collect();
        for hb in self.store.list_heartbeats()? {
            if !registered.contains(&hb.instance_id)
                && Timestamp::now().duration_since(hb.last_ping) > self.stale_after
            {
                self.store.remove_heartbeat(&hb.instance_id)?;
            }
        }

        // Release everything the purged instances held. A failed delete
        // leaves the lock for lease expiry, same as unregister.
        let stale_ids: HashSet<&str> = stale.iter().map(|i| i.instance_id.as_str()).collect();
        for lock in self.store.list_locks()? {
            if stale_ids.contains(lock.owner_instance_id.as_str()) {
                if let Err(e) = self.store.remove_lock(&lock.path) {
                    eprintln!("warning: leaving lock on {} for expiry: {e}", lock.path);
                }
            }
        }

        self.store.touch_sweep_stamp()?;
        Ok(stale)
    }

    /// Runs the sweep unless one ran within the configured interval.
    /// The check is a single stamp-file stat, cheap enough for every
    /// mutating entry point.
    pub(crate) fn maybe_sweep(&self) -> Result<()> {
        let due = self
            .store
            .sweep_stamp_age()
            .is_none_or(|age| age >= self.sweep_every);
        if due {
            self.cleanup_stale_instances()?;
        }
        Ok(())
    }

    /// Liveness derived from heartbeat age, never stored.
    pub(crate) fn instance_status(&self, instance: &Instance) -> Result<InstanceStatus> {
        Ok(if self.is_stale(instance)? {
            InstanceStatus::Stale
        } else {
            InstanceStatus::Active
        })
    }

    fn is_stale(&self, instance: &Instance) -> Result<bool> {
        Ok(self.heartbeat_age(instance)? > self.stale_after)
    }

    /// Time since the instance last pinged. A hand-deleted heartbeat
    /// document falls back to registration time, so the instance ages out
    /// instead of living forever.
    pub(crate) fn heartbeat_age(&self, instance: &Instance) -> Result<SignedDuration> {
        let last_ping = self
            .store
            .load_heartbeat(&instance.instance_id)?
            .map_or(instance.registered_at, |hb| hb.last_ping);
        Ok(Timestamp::now().duration_since(last_ping))
    }
}
