//! Run sessions.
//!
//! Every execution of a replay executable owns one session directory under
//! `$REPLAY_SW_ROOT/<sessions_dir>`, holding the log file and any artefacts
//! (recorded profiles, action lists) the run wants to keep alongside it. The
//! session also fixes the epoch that log timestamps are measured from.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use chrono::{DateTime, Utc};
use conquer_once::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// Internal imports
use crate::{host, time};

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

/// Wall clock instant the session was opened at. Set once per process.
static EPOCH: OnceCell<DateTime<Utc>> = OnceCell::uninit();

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// strftime format of the directory name timestamp.
const DIR_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An open run session.
#[derive(Clone, Debug)]
pub struct Session {
    /// Directory of this session, `<sessions_dir>/<exec>_<tag>_<stamp>`
    pub session_root: PathBuf,

    /// Log file inside the session directory
    pub log_file_path: PathBuf,

    /// What the run is doing, for example `record` or `play`
    pub tag: String,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{} is not set, cannot locate the sessions directory", host::SW_ROOT_ENV_VAR)]
    SwRootNotSet,

    #[error("Could not create session directory {0:?}: {1}")]
    CannotCreateDir(PathBuf, std::io::Error),

    #[error("A session is already open in this process")]
    AlreadyOpen,

    #[error("Artefact name {0:?} must be a bare file name")]
    InvalidArtefactName(String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Session {
    /// Open the session for this process.
    ///
    /// Only one session may be opened per process since it fixes the log
    /// epoch.
    pub fn new(exec_name: &str, tag: &str, sessions_dir: &str) -> Result<Self, SessionError> {
        EPOCH
            .try_init_once(Utc::now)
            .map_err(|_| SessionError::AlreadyOpen)?;
        let stamp = epoch()
            .ok_or(SessionError::AlreadyOpen)?
            .format(DIR_STAMP_FORMAT);

        let root = host::get_replay_sw_root().map_err(|_| SessionError::SwRootNotSet)?;
        let session_root = root
            .join(sessions_dir)
            .join(format!("{}_{}_{}", exec_name, tag, stamp));

        fs::create_dir_all(&session_root)
            .map_err(|e| SessionError::CannotCreateDir(session_root.clone(), e))?;

        Ok(Session {
            log_file_path: session_root.join(format!("{}.log", exec_name)),
            session_root,
            tag: tag.to_string(),
        })
    }

    /// Path of an artefact file kept in the session directory.
    pub fn artefact_path(&self, name: &str) -> Result<PathBuf, SessionError> {
        let is_bare = Path::new(name)
            .file_name()
            .map(|f| f == name)
            .unwrap_or(false);

        if is_bare {
            Ok(self.session_root.join(name))
        } else {
            Err(SessionError::InvalidArtefactName(name.to_string()))
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// The session epoch, `None` before a session is opened.
pub fn epoch() -> Option<&'static DateTime<Utc>> {
    EPOCH.get()
}

/// Seconds since the session was opened, `NAN` if no session is open.
///
/// Logging from unit tests goes through here without a session, so this must
/// never panic.
pub fn get_elapsed_seconds() -> f64 {
    epoch()
        .and_then(|e| time::duration_to_seconds(Utc::now() - *e))
        .unwrap_or(std::f64::NAN)
}
