//! CLI interface for crew.
//!
//! Designed for agents and humans alike: each subcommand is
//! non-interactive, arguments in, a status line and an exit code out.
//! Hooks and scripts branch on the exit codes, so those are contract:
//!
//! - 0 — success
//! - 1 — fatal (storage I/O, bad usage)
//! - 10 — lock held by another instance
//! - 11 — lock expired or gone during this call
//! - 12 — optimistic conflict detected
//! - 13 — calling instance unknown (stale or never registered)
//!
//! Data goes to stdout, commentary to stderr, so `$(crew register)` and
//! `crew status --json | jq` compose cleanly.

mod format;

use std::collections::HashSet;

use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::coordinator::{Beat, Coordinator};
use crate::identity;
use crate::model::{
    Acquire, Conflict, DecisionDraft, DecisionLogEntry, FileLock, InstanceReport, LockState, Renew,
};

use format::{describe_lock, format_decision_line, format_instance_line, format_ttl};

/// crew — coordination for multiple agent processes editing one tree.
#[derive(Debug, Parser)]
#[command(name = "crew", after_long_help = WORKFLOW_HELP)]
pub struct Cli {
    /// Act as this instance id (overrides the INSTANCE_ID env var).
    #[arg(long = "as", global = true, value_name = "INSTANCE_ID")]
    acting_as: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

const WORKFLOW_HELP: &str = r#"Workflow: a coordinated editing session
  1. crew register --task "Fix widget crash" --role implementer
     → prints an instance id (e.g. i-20260806-143015-a3b0fc12)
  2. export INSTANCE_ID=i-20260806-143015-a3b0fc12
  3. crew lock acquire src/widget.rs --intent "refactor crash path"
  4. ...edit...
  5. crew lock conflict src/widget.rs    # before overwriting
  6. crew lock release src/widget.rs
  7. crew unregister

Liveness:
  crew heartbeat        # run on every tool use; a single cheap write

Exit codes: 10 lock held, 11 lock expired/gone, 12 conflict, 13 unknown instance."#;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register this process as a new instance. Prints the instance id.
    Register {
        /// What this instance is working on.
        #[arg(long)]
        task: String,

        /// Agent role label (e.g. "implementer", "reviewer").
        #[arg(long)]
        role: String,

        /// VCS branch being worked on. Informational only.
        #[arg(long)]
        branch: Option<String>,
    },

    /// Remove this instance's registration and release its locks.
    ///
    /// Idempotent: unregistering an unknown instance is a no-op.
    Unregister,

    /// Record liveness for this instance. Run on every tool use.
    Heartbeat,

    /// Show the calling instance's registered work and held locks.
    Work,

    /// Show instances, their locks, and recent decisions.
    Status {
        /// Machine-readable output.
        #[arg(long)]
        json: bool,

        /// Include lock intents and fingerprints.
        #[arg(long)]
        verbose: bool,
    },

    /// Purge stale instances and release everything they held.
    Cleanup,

    /// Advisory per-file locks.
    Lock {
        #[command(subcommand)]
        command: LockCommand,
    },

    /// The append-only log of cross-instance decisions.
    Decision {
        #[command(subcommand)]
        command: DecisionCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum LockCommand {
    /// Take the lock on a path. Fails fast when someone else holds it.
    Acquire {
        /// Repository-relative path to lock.
        path: String,

        /// Why the lock is being taken.
        #[arg(long)]
        intent: Option<String>,
    },

    /// Release the caller's lock. No-op if not held by the caller.
    Release { path: String },

    /// Extend the caller's lease and refresh the content fingerprint.
    Renew { path: String },

    /// Report a path's lock state without changing anything.
    Check { path: String },

    /// Compare the file against the fingerprint taken at acquisition.
    Conflict { path: String },

    /// List every lock document, live and expired.
    List {
        /// Machine-readable output.
        #[arg(long)]
        json: bool,
    },

    /// Delete expired lock documents.
    Cleanup,
}

#[derive(Debug, Subcommand)]
pub enum DecisionCommand {
    /// Append a decision. Prints the new decision id.
    Add {
        /// Decision category (e.g. "architecture", "naming").
        #[arg(long)]
        category: String,

        /// One-line summary.
        #[arg(long)]
        title: String,

        /// What the decision applies to (a path, a subsystem, "global").
        #[arg(long)]
        scope: Option<String>,

        /// Full rationale.
        description: String,
    },

    /// List decisions, most recent first.
    List {
        /// Only this category.
        #[arg(long)]
        category: Option<String>,

        /// At most this many entries.
        #[arg(long)]
        limit: Option<usize>,

        /// Machine-readable output.
        #[arg(long)]
        json: bool,
    },
}

/// Protocol outcome of a command, mapped onto the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Lock held by another instance.
    LockHeld,
    /// Lock expired or gone during this call.
    LockExpired,
    /// File changed out-of-band since lock acquisition.
    ConflictDetected,
    /// Calling instance unknown: stale-swept or never registered.
    UnknownInstance,
}

impl Outcome {
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::LockHeld => 10,
            Self::LockExpired => 11,
            Self::ConflictDetected => 12,
            Self::UnknownInstance => 13,
        }
    }
}

/// Everything `status --json` reports, in one document.
#[derive(Debug, Serialize)]
struct StatusReport {
    instances: Vec<InstanceReport>,
    /// Locks whose owner is no longer registered; they free up when
    /// their lease expires.
    dangling_locks: Vec<FileLock>,
    recent_decisions: Vec<DecisionLogEntry>,
}

/// Run the CLI. `Ok` carries the protocol outcome for the exit code;
/// `Err` is a fatal, human-readable failure.
pub fn run(coordinator: &Coordinator) -> Result<Outcome, String> {
    let cli = Cli::parse();
    let acting_as = cli.acting_as.as_deref();

    match cli.command {
        Command::Register { task, role, branch } => {
            cmd_register(coordinator, &task, &role, branch.as_deref())
        }
        Command::Unregister => {
            let id = identity::resolve_instance(acting_as)?;
            cmd_unregister(coordinator, &id)
        }
        Command::Heartbeat => {
            let id = identity::resolve_instance(acting_as)?;
            cmd_heartbeat(coordinator, &id)
        }
        Command::Work => {
            let id = identity::resolve_instance(acting_as)?;
            cmd_work(coordinator, &id)
        }
        Command::Status { json, verbose } => cmd_status(coordinator, json, verbose),
        Command::Cleanup => cmd_cleanup(coordinator),
        Command::Lock { command } => match command {
            LockCommand::Acquire { path, intent } => {
                let id = identity::resolve_instance(acting_as)?;
                cmd_lock_acquire(coordinator, &id, &path, intent.as_deref().unwrap_or_default())
            }
            LockCommand::Release { path } => {
                let id = identity::resolve_instance(acting_as)?;
                cmd_lock_release(coordinator, &id, &path)
            }
            LockCommand::Renew { path } => {
                let id = identity::resolve_instance(acting_as)?;
                cmd_lock_renew(coordinator, &id, &path)
            }
            LockCommand::Check { path } => {
                let id = identity::resolve_instance(acting_as)?;
                cmd_lock_check(coordinator, &id, &path)
            }
            LockCommand::Conflict { path } => {
                let id = identity::resolve_instance(acting_as)?;
                cmd_lock_conflict(coordinator, &id, &path)
            }
            LockCommand::List { json } => cmd_lock_list(coordinator, json),
            LockCommand::Cleanup => cmd_lock_cleanup(coordinator),
        },
        Command::Decision { command } => match command {
            DecisionCommand::Add {
                category,
                title,
                scope,
                description,
            } => {
                let id = identity::resolve_instance(acting_as)?;
                cmd_decision_add(coordinator, id, category, title, scope, description)
            }
            DecisionCommand::List {
                category,
                limit,
                json,
            } => cmd_decision_list(coordinator, category.as_deref(), limit, json),
        },
    }
}

fn cmd_register(
    coordinator: &Coordinator,
    task: &str,
    role: &str,
    branch: Option<&str>,
) -> Result<Outcome, String> {
    let instance = coordinator
        .register(task, role, branch)
        .map_err(|e| format!("failed to register: {e}"))?;

    println!("{}", instance.instance_id);
    eprintln!("Registered. For subsequent commands:");
    eprintln!("  export INSTANCE_ID={}", instance.instance_id);
    Ok(Outcome::Success)
}

fn cmd_unregister(coordinator: &Coordinator, id: &str) -> Result<Outcome, String> {
    coordinator
        .unregister(id)
        .map_err(|e| format!("failed to unregister: {e}"))?;
    eprintln!("Instance {id} unregistered");
    Ok(Outcome::Success)
}

fn cmd_heartbeat(coordinator: &Coordinator, id: &str) -> Result<Outcome, String> {
    match coordinator
        .heartbeat(id)
        .map_err(|e| format!("failed to record heartbeat: {e}"))?
    {
        Beat::Recorded => Ok(Outcome::Success),
        Beat::Unknown => {
            eprintln!("Instance {id} is not registered (swept as stale, or never registered).");
            eprintln!("Run `crew register` and export the new id.");
            Ok(Outcome::UnknownInstance)
        }
    }
}

fn cmd_work(coordinator: &Coordinator, id: &str) -> Result<Outcome, String> {
    let Some(report) = coordinator
        .get_work(id)
        .map_err(|e| format!("failed to look up instance: {e}"))?
    else {
        eprintln!("Instance {id} is not registered.");
        return Ok(Outcome::UnknownInstance);
    };

    println!("{}", format_instance_line(&report));
    for lock in &report.locks {
        println!("    {}", describe_lock(lock, true));
    }
    Ok(Outcome::Success)
}

fn cmd_status(coordinator: &Coordinator, json: bool, verbose: bool) -> Result<Outcome, String> {
    let instances = coordinator
        .list_instances()
        .map_err(|e| format!("failed to list instances: {e}"))?;
    let all_locks = coordinator
        .list_locks()
        .map_err(|e| format!("failed to list locks: {e}"))?;
    let recent_decisions = coordinator
        .query_decisions(None, Some(5))
        .map_err(|e| format!("failed to read decisions: {e}"))?;

    let registered: HashSet<&str> = instances
        .iter()
        .map(|r| r.instance.instance_id.as_str())
        .collect();
    let dangling_locks: Vec<FileLock> = all_locks
        .into_iter()
        .filter(|l| !registered.contains(l.owner_instance_id.as_str()))
        .collect();

    if json {
        let report = StatusReport {
            instances,
            dangling_locks,
            recent_decisions,
        };
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("failed to serialize status: {e}"))?;
        println!("{out}");
        return Ok(Outcome::Success);
    }

    if instances.is_empty() {
        println!("No instances");
    } else {
        println!("Instances ({}):", instances.len());
        for report in &instances {
            println!("  {}", format_instance_line(report));
            for lock in &report.locks {
                println!("      {}", describe_lock(lock, verbose));
            }
        }
    }

    if !dangling_locks.is_empty() {
        println!("Dangling locks (owner gone, will free on expiry):");
        for lock in &dangling_locks {
            println!("  {}", describe_lock(lock, verbose));
        }
    }

    if !recent_decisions.is_empty() {
        println!("Recent decisions:");
        for entry in &recent_decisions {
            println!("  {}", format_decision_line(entry));
        }
    }

    Ok(Outcome::Success)
}

fn cmd_cleanup(coordinator: &Coordinator) -> Result<Outcome, String> {
    let purged = coordinator
        .cleanup_stale_instances()
        .map_err(|e| format!("cleanup failed: {e}"))?;

    if purged.is_empty() {
        eprintln!("No stale instances");
    } else {
        for instance in &purged {
            eprintln!("Purged {} ({})", instance.instance_id, instance.task);
        }
    }
    Ok(Outcome::Success)
}

fn cmd_lock_acquire(
    coordinator: &Coordinator,
    id: &str,
    path: &str,
    intent: &str,
) -> Result<Outcome, String> {
    match coordinator
        .acquire(id, path, intent)
        .map_err(|e| format!("failed to acquire lock: {e}"))?
    {
        Acquire::Acquired(lock) => {
            eprintln!("Acquired {} ({})", lock.path, format_ttl(lock.expires_at));
            Ok(Outcome::Success)
        }
        Acquire::Held(lock) => {
            eprintln!(
                "{} is held by {} ({})",
                lock.path,
                lock.owner_instance_id,
                format_ttl(lock.expires_at)
            );
            if !lock.intent.is_empty() {
                eprintln!("Intent: {}", lock.intent);
            }
            Ok(Outcome::LockHeld)
        }
    }
}

fn cmd_lock_release(coordinator: &Coordinator, id: &str, path: &str) -> Result<Outcome, String> {
    coordinator
        .release(id, path)
        .map_err(|e| format!("failed to release lock: {e}"))?;
    eprintln!("Released {path}");
    Ok(Outcome::Success)
}

fn cmd_lock_renew(coordinator: &Coordinator, id: &str, path: &str) -> Result<Outcome, String> {
    match coordinator
        .renew(id, path)
        .map_err(|e| format!("failed to renew lock: {e}"))?
    {
        Renew::Renewed(lock) => {
            eprintln!("Renewed {} ({})", lock.path, format_ttl(lock.expires_at));
            Ok(Outcome::Success)
        }
        Renew::Lost => {
            eprintln!("Lock on {path} is gone or no longer yours — re-acquire before continuing.");
            Ok(Outcome::LockExpired)
        }
    }
}

fn cmd_lock_check(coordinator: &Coordinator, id: &str, path: &str) -> Result<Outcome, String> {
    match coordinator
        .check(id, path)
        .map_err(|e| format!("failed to check lock: {e}"))?
    {
        LockState::Free => {
            println!("free");
            Ok(Outcome::Success)
        }
        LockState::HeldByCaller(lock) => {
            println!("held by you ({})", format_ttl(lock.expires_at));
            Ok(Outcome::Success)
        }
        LockState::HeldByOther(lock) => {
            println!(
                "held by {} ({})",
                lock.owner_instance_id,
                format_ttl(lock.expires_at)
            );
            Ok(Outcome::LockHeld)
        }
        LockState::Expired(lock) => {
            println!("expired (was held by {})", lock.owner_instance_id);
            Ok(Outcome::LockExpired)
        }
    }
}

fn cmd_lock_conflict(coordinator: &Coordinator, id: &str, path: &str) -> Result<Outcome, String> {
    match coordinator
        .detect_conflict(id, path)
        .map_err(|e| format!("failed to check for conflicts: {e}"))?
    {
        Conflict::Clean => {
            println!("no conflict");
            Ok(Outcome::Success)
        }
        Conflict::Detected { .. } => {
            println!("conflict: {path} changed since the lock was taken");
            eprintln!("Re-read the file, merge or abort, then re-acquire to capture the new state.");
            Ok(Outcome::ConflictDetected)
        }
        Conflict::NoLock => {
            eprintln!("No lock held on {path} — acquire before checking for conflicts.");
            Ok(Outcome::LockExpired)
        }
    }
}

fn cmd_lock_list(coordinator: &Coordinator, json: bool) -> Result<Outcome, String> {
    let locks = coordinator
        .list_locks()
        .map_err(|e| format!("failed to list locks: {e}"))?;

    if json {
        let out = serde_json::to_string_pretty(&locks)
            .map_err(|e| format!("failed to serialize locks: {e}"))?;
        println!("{out}");
        return Ok(Outcome::Success);
    }

    if locks.is_empty() {
        println!("No locks");
        return Ok(Outcome::Success);
    }
    for lock in &locks {
        println!("{}", describe_lock(lock, true));
    }
    Ok(Outcome::Success)
}

fn cmd_lock_cleanup(coordinator: &Coordinator) -> Result<Outcome, String> {
    let purged = coordinator
        .purge_expired()
        .map_err(|e| format!("failed to purge expired locks: {e}"))?;

    if purged.is_empty() {
        eprintln!("No expired locks");
    } else {
        for lock in &purged {
            eprintln!("Purged expired lock on {} (was {})", lock.path, lock.owner_instance_id);
        }
    }
    Ok(Outcome::Success)
}

fn cmd_decision_add(
    coordinator: &Coordinator,
    author_instance_id: String,
    category: String,
    title: String,
    scope: Option<String>,
    description: String,
) -> Result<Outcome, String> {
    let entry = coordinator
        .log_decision(DecisionDraft {
            category,
            title,
            description,
            scope,
            author_instance_id,
        })
        .map_err(|e| format!("failed to log decision: {e}"))?;

    println!("{}", entry.decision_id);
    Ok(Outcome::Success)
}

fn cmd_decision_list(
    coordinator: &Coordinator,
    category: Option<&str>,
    limit: Option<usize>,
    json: bool,
) -> Result<Outcome, String> {
    let entries = coordinator
        .query_decisions(category, limit)
        .map_err(|e| format!("failed to read decisions: {e}"))?;

    if json {
        let out = serde_json::to_string_pretty(&entries)
            .map_err(|e| format!("failed to serialize decisions: {e}"))?;
        println!("{out}");
        return Ok(Outcome::Success);
    }

    if entries.is_empty() {
        println!("No decisions");
        return Ok(Outcome::Success);
    }
    for entry in &entries {
        println!("{}", format_decision_line(entry));
        println!("    {}", entry.description);
    }
    Ok(Outcome::Success)
}
