//! Host platform utility functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::env;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Name of the environment variable pointing at the software root.
pub const SW_ROOT_ENV_VAR: &str = "REPLAY_SW_ROOT";

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the root directory of the software, which contains the `params` and
/// `sessions` directories.
pub fn get_replay_sw_root() -> Result<PathBuf, env::VarError> {
    env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}

/// Short description of the host this execution is running on.
pub fn get_host_info() -> String {
    format!(
        "{} ({}, {} family)",
        env::consts::OS,
        env::consts::ARCH,
        env::consts::FAMILY
    )
}
