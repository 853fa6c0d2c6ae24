//! Crew configuration.
//!
//! Loaded from `<root>/config.toml` when present. Every knob has a
//! default, so a fresh repository needs no setup at all — the file exists
//! for teams that want different lease or staleness windows.

use std::path::{Path, PathBuf};
use std::{env, fs, io};

use serde::Deserialize;

/// Tunable timeouts, all in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// Lock lease duration: how long an acquisition holds without renewal.
    pub lease_secs: u32,
    /// Heartbeat staleness timeout: silence longer than this marks an
    /// instance stale and eligible for the sweep.
    pub stale_secs: u32,
    /// Minimum time between ambient sweeps. Zero sweeps on every
    /// mutating call.
    pub sweep_interval_secs: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lease_secs: 300,
            stale_secs: 300,
            sweep_interval_secs: 30,
        }
    }
}

impl Config {
    /// Load config from `<root>/config.toml`, falling back to defaults
    /// when the file is missing.
    pub fn load(root: &Path) -> Result<Self, String> {
        let path = root.join("config.toml");

        let contents = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(format!("failed to read {}: {e}", path.display())),
        };

        toml::from_str(&contents).map_err(|e| format!("invalid config at {}: {e}", path.display()))
    }
}

/// The shared state root: `CREW_DIR` when set, else `./.crew`.
///
/// Relative to the working directory: the state directory belongs to the
/// tree being coordinated, like `.git` does.
pub fn state_root() -> PathBuf {
    match env::var("CREW_DIR") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(".crew"),
    }
}
