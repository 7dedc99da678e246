//! # Trajectory streaming
//!
//! This module streams a `Profile` into the bounded buffers of one device per
//! channel, keeping every channel's staging buffer topped up while the
//! devices execute. A stream goes through the states
//!
//! - `Waiting` - Constructed, devices untouched.
//! - `Started` - Devices disabled, staging buffers filling. Once every
//!   channel holds strictly more than `min_points` staged points all
//!   channels are enabled together.
//! - `Executing` - Filling continues. Once every channel's active point is
//!   its last point all channels are disabled and cleared.
//! - `Finished` - Done.
//! - `Interrupted` - Stopped by `on_interrupt`, devices disabled.
//!
//! The engine never pushes into a full staging buffer, and interrupting
//! always leaves every device disabled.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod channel;
mod engine;
mod params;
mod state;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use util::task::TaskError;

use crate::eqpt::DeviceError;

pub use channel::ChannelBinding;
pub use engine::{StreamCore, StreamEngine};
pub use params::StreamParams;
pub use state::{ChannelStatus, StreamReport, StreamState};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur while streaming a profile.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Tried to run an empty profile")]
    EmptyProfile,

    #[error("Profile of {0} points does not exceed the {1} point start threshold")]
    ProfileTooShort(usize, usize),

    #[error("The profile is not bound to any devices")]
    NotBound,

    #[error("The stream has already been started (currently {0})")]
    AlreadyStarted(StreamState),

    #[error("Profile has {0} channels but {1} devices were bound")]
    ChannelCountMismatch(usize, usize),

    #[error("Device error on channel {0}: {1}")]
    DeviceError(String, DeviceError),

    #[error("Stream core lock is poisoned")]
    LockPoisoned,

    #[error("Could not start a stream task: {0}")]
    TaskError(TaskError),
}
