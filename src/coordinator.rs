//! The coordination façade: registration, liveness, locks, and decisions.
//!
//! One `Coordinator` per process, wrapping the shared document store. The
//! protocol is deliberately non-blocking: contention, expiry, and
//! conflicts come back as values and the caller owns any retry policy.
//! Nothing here waits on another process except inside the store's
//! create-if-absent and guard primitives.
//!
//! Staleness is self-healing rather than supervised: there is no daemon.
//! Mutating entry points run an opportunistic sweep (throttled by a cheap
//! stamp-file check) that purges instances whose heartbeat has lapsed and
//! releases whatever they held.

mod locks;
mod sweep;

use std::{path::PathBuf, time::Duration};

use jiff::{SignedDuration, Timestamp};

use crate::config::Config;
use crate::model::{
    DecisionDraft, DecisionLogEntry, FileLock, Heartbeat, Instance, InstanceReport,
    generate_instance_id,
};
use crate::storage::{Result, Store};

/// Result of a heartbeat call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Beat {
    Recorded,
    /// The instance is not in the registry — it never registered, or a
    /// sweep purged it as stale. Either way: re-register.
    Unknown,
}

/// Coordination façade over the shared state directory.
pub struct Coordinator {
    store: Store,
    lease: SignedDuration,
    stale_after: SignedDuration,
    sweep_every: Duration,
    /// Root of the tree being coordinated; lock paths resolve against it
    /// when fingerprinting file contents.
    work_root: PathBuf,
}

impl Coordinator {
    pub fn new(store: Store, config: &Config, work_root: PathBuf) -> Self {
        Self {
            store,
            lease: SignedDuration::from_secs(i64::from(config.lease_secs)),
            stale_after: SignedDuration::from_secs(i64::from(config.stale_secs)),
            sweep_every: Duration::from_secs(u64::from(config.sweep_interval_secs)),
            work_root,
        }
    }

    // ── Instance registry ──

    /// Registers a new instance and writes its initial heartbeat.
    ///
    /// Sweeps first, so the registry never accumulates dead entries no
    /// matter how instances come and go.
    pub fn register(&self, task: &str, role: &str, branch: Option<&str>) -> Result<Instance> {
        self.maybe_sweep()?;

        let instance = Instance {
            instance_id: generate_instance_id(),
            task: task.to_string(),
            role: role.to_string(),
            branch: branch.map(String::from),
            registered_at: Timestamp::now(),
        };

        self.store.with_registry(|reg| reg.push(instance.clone()))?;
        self.store.write_heartbeat(&Heartbeat {
            instance_id: instance.instance_id.clone(),
            last_ping: instance.registered_at,
        })?;

        Ok(instance)
    }

    /// Removes an instance, its heartbeat, and (best-effort) every lock it
    /// holds. Unregistering an unknown instance is a no-op.
    pub fn unregister(&self, instance_id: &str) -> Result<()> {
        self.store
            .with_registry(|reg| reg.retain(|i| i.instance_id != instance_id))?;
        self.store.remove_heartbeat(instance_id)?;

        for lock in self.store.list_locks()? {
            if lock.owner_instance_id == instance_id {
                // A lock that fails to delete stays behind and is
                // reclaimed through lease expiry.
                if let Err(e) = self.store.remove_lock(&lock.path) {
                    eprintln!("warning: leaving lock on {} for expiry: {e}", lock.path);
                }
            }
        }
        Ok(())
    }

    /// Snapshot of every registered instance with derived liveness and
    /// held locks.
    pub fn list_instances(&self) -> Result<Vec<InstanceReport>> {
        let locks = self.store.list_locks()?;
        self.store
            .load_registry()?
            .into_iter()
            .map(|instance| self.report(instance, &locks))
            .collect()
    }

    /// One instance's registration and current state, `None` if unknown.
    pub fn get_work(&self, instance_id: &str) -> Result<Option<InstanceReport>> {
        let Some(instance) = self
            .store
            .load_registry()?
            .into_iter()
            .find(|i| i.instance_id == instance_id)
        else {
            return Ok(None);
        };
        let locks = self.store.list_locks()?;
        Ok(Some(self.report(instance, &locks)?))
    }

    fn report(&self, instance: Instance, locks: &[FileLock]) -> Result<InstanceReport> {
        let status = self.instance_status(&instance)?;
        let held = locks
            .iter()
            .filter(|l| l.owner_instance_id == instance.instance_id)
            .cloned()
            .collect();
        Ok(InstanceReport {
            instance,
            status,
            locks: held,
        })
    }

    // ── Heartbeats ──

    /// Records liveness for an instance: a single timestamp write, no
    /// guard, no lock traffic. This sits on the hot path of every tool
    /// use, so it must not contend with anything.
    pub fn heartbeat(&self, instance_id: &str) -> Result<Beat> {
        let known = self
            .store
            .load_registry()?
            .iter()
            .any(|i| i.instance_id == instance_id);
        if !known {
            return Ok(Beat::Unknown);
        }
        self.store.write_heartbeat(&Heartbeat {
            instance_id: instance_id.to_string(),
            last_ping: Timestamp::now(),
        })?;
        Ok(Beat::Recorded)
    }

    // ── Decision log ──

    /// Appends an immutable decision entry. Corrections are new entries.
    pub fn log_decision(&self, draft: DecisionDraft) -> Result<DecisionLogEntry> {
        self.store.append_decision(draft)
    }

    /// Decisions, most recent first, optionally filtered by category and
    /// truncated to `limit`.
    pub fn query_decisions(
        &self,
        category: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<DecisionLogEntry>> {
        let mut entries = self.store.load_decisions()?;
        if let Some(category) = category {
            entries.retain(|e| e.category == category);
        }
        entries.reverse();
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::model::InstanceStatus;

    pub(super) fn test_coordinator() -> (TempDir, Coordinator) {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().join("state")).unwrap();
        // Zero sweep interval: every mutating call sweeps, which makes
        // staleness behavior deterministic in tests.
        let config = Config {
            lease_secs: 300,
            stale_secs: 300,
            sweep_interval_secs: 0,
        };
        let coordinator = Coordinator::new(store, &config, dir.path().to_path_buf());
        (dir, coordinator)
    }

    pub(super) fn backdate_heartbeat(coordinator: &Coordinator, instance_id: &str, secs: i64) {
        coordinator
            .store
            .write_heartbeat(&Heartbeat {
                instance_id: instance_id.to_string(),
                last_ping: Timestamp::now() - SignedDuration::from_secs(secs),
            })
            .unwrap();
    }

    fn draft(title: &str, category: &str, author: &str) -> DecisionDraft {
        DecisionDraft {
            category: category.into(),
            title: title.into(),
            description: "Because.".into(),
            scope: None,
            author_instance_id: author.into(),
        }
    }

    #[test]
    fn register_and_list() {
        let (_dir, coordinator) = test_coordinator();

        let a = coordinator.register("Fix widget", "implementer", Some("main")).unwrap();
        let b = coordinator.register("Review widget", "reviewer", None).unwrap();
        assert_ne!(a.instance_id, b.instance_id);

        let reports = coordinator.list_instances().unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.status == InstanceStatus::Active));
    }

    #[test]
    fn unregister_removes_instance_heartbeat_and_locks() {
        let (_dir, coordinator) = test_coordinator();
        let a = coordinator.register("Fix widget", "implementer", None).unwrap();
        coordinator.acquire(&a.instance_id, "src/widget.rs", "edit").unwrap();

        coordinator.unregister(&a.instance_id).unwrap();

        assert!(coordinator.list_instances().unwrap().is_empty());
        assert!(coordinator.store.load_heartbeat(&a.instance_id).unwrap().is_none());
        assert!(coordinator.store.load_lock("src/widget.rs").unwrap().is_none());
    }

    #[test]
    fn unregister_unknown_instance_is_a_noop() {
        let (_dir, coordinator) = test_coordinator();
        coordinator.unregister("i-never-existed").unwrap();
    }

    #[test]
    fn heartbeat_advances_last_ping() {
        let (_dir, coordinator) = test_coordinator();
        let a = coordinator.register("Fix widget", "implementer", None).unwrap();
        backdate_heartbeat(&coordinator, &a.instance_id, 60);

        assert_eq!(coordinator.heartbeat(&a.instance_id).unwrap(), Beat::Recorded);

        let hb = coordinator.store.load_heartbeat(&a.instance_id).unwrap().unwrap();
        assert!(Timestamp::now().duration_since(hb.last_ping) < SignedDuration::from_secs(5));
    }

    #[test]
    fn heartbeat_for_unknown_instance_reports_unknown() {
        let (_dir, coordinator) = test_coordinator();
        assert_eq!(coordinator.heartbeat("i-ghost").unwrap(), Beat::Unknown);
        // No orphan heartbeat document appears.
        assert!(coordinator.store.load_heartbeat("i-ghost").unwrap().is_none());
    }

    #[test]
    fn get_work_finds_registered_instance() {
        let (_dir, coordinator) = test_coordinator();
        let a = coordinator.register("Fix widget", "implementer", None).unwrap();

        let report = coordinator.get_work(&a.instance_id).unwrap().unwrap();
        assert_eq!(report.instance.task, "Fix widget");
        assert!(coordinator.get_work("i-ghost").unwrap().is_none());
    }

    #[test]
    fn decisions_query_is_most_recent_first() {
        let (_dir, coordinator) = test_coordinator();
        coordinator.log_decision(draft("First", "architecture", "i-a")).unwrap();
        coordinator.log_decision(draft("Second", "naming", "i-a")).unwrap();
        coordinator.log_decision(draft("Third", "architecture", "i-b")).unwrap();

        let all = coordinator.query_decisions(None, None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].title, "Third");

        let arch = coordinator.query_decisions(Some("architecture"), None).unwrap();
        assert_eq!(arch.len(), 2);
        assert_eq!(arch[0].title, "Third");
        assert_eq!(arch[1].title, "First");

        let limited = coordinator.query_decisions(None, Some(1)).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].title, "Third");
    }

    #[test]
    fn decision_log_survives_author_unregistering() {
        let (_dir, coordinator) = test_coordinator();
        let a = coordinator.register("Fix widget", "implementer", None).unwrap();
        coordinator
            .log_decision(draft("Keep JSONL", "storage", &a.instance_id))
            .unwrap();

        coordinator.unregister(&a.instance_id).unwrap();

        let decisions = coordinator.query_decisions(None, None).unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].author_instance_id, a.instance_id);
    }
}
