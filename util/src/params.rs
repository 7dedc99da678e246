//! TOML parameter loading
//!
//! Parameter files live in `$REPLAY_SW_ROOT/params` and are deserialised
//! straight into each executable's parameter struct.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// Internal
use crate::host;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{} is not set, cannot locate the params directory", host::SW_ROOT_ENV_VAR)]
    SwRootNotSet,

    #[error("Could not read parameter file {0:?}: {1}")]
    FileLoadError(PathBuf, std::io::Error),

    #[error("Invalid parameters: {0}")]
    DeserialiseError(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a parameter file, given relative to `$REPLAY_SW_ROOT/params`.
pub fn load<P>(file_name: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    let root = host::get_replay_sw_root().map_err(|_| LoadError::SwRootNotSet)?;

    load_from_path(root.join("params").join(file_name))
}

pub fn load_from_path<P, F>(path: F) -> Result<P, LoadError>
where
    P: DeserializeOwned,
    F: AsRef<Path>,
{
    let path = path.as_ref();
    let text =
        fs::read_to_string(path).map_err(|e| LoadError::FileLoadError(path.to_path_buf(), e))?;

    from_str(&text)
}

/// Parse parameters from TOML text.
pub fn from_str<P>(text: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    Ok(toml::from_str(text)?)
}
