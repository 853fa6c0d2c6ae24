//! Instance identity resolution for crew commands.
//!
//! Every coordination call acts on behalf of one instance. Rather than
//! requiring the id as an argument on every invocation, identity resolves
//! through a chain:
//!
//! 1. `--as <instance-id>` — explicit per-command override
//! 2. `INSTANCE_ID` env var — process/session level (exported once after
//!    `crew register` prints the id)
//!
//! There is no config-file tier: an instance id names one running
//! process, so a shared default would let two processes impersonate each
//! other.

use std::env;

/// Error message shown when no instance id can be resolved.
pub const INSTANCE_REQUIRED: &str = "instance id required: pass --as <instance-id>, \
    or export INSTANCE_ID (printed by `crew register`)";

/// Resolve the acting instance id from the resolution chain.
///
/// Checks the explicit `--as` value, then the `INSTANCE_ID` env var.
/// Returns [`INSTANCE_REQUIRED`] when neither yields a value, and rejects
/// ids that could not have come from `crew register` — the id becomes a
/// file name under the state root, so it must not carry path separators.
pub fn resolve_instance(explicit: Option<&str>) -> Result<String, String> {
    // 1. Explicit --as flag.
    if let Some(id) = explicit {
        return validated(id.to_string());
    }

    // 2. INSTANCE_ID environment variable.
    if let Ok(id) = env::var("INSTANCE_ID")
        && !id.is_empty()
    {
        return validated(id);
    }

    Err(INSTANCE_REQUIRED.to_string())
}

fn validated(id: String) -> Result<String, String> {
    if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
        return Err(format!("invalid instance id {id:?}"));
    }
    Ok(id)
}
