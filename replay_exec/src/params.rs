//! # Replay Executable Parameters
//!
//! This module provides parameters for the replay executable, loaded from
//! `replay_exec.toml`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use crate::{
    actions::ActionParams, eqpt::SimParams, profile::RecorderParams, traj_stream::StreamParams,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayExecParams {
    /// Target period of one main loop cycle.
    ///
    /// Units: seconds
    pub cycle_period_s: f64,

    /// Channels to record and replay, in profile order
    pub channels: Vec<ChannelParams>,

    pub recorder: RecorderParams,

    pub stream: StreamParams,

    pub actions: ActionParams,

    /// Simulated actuator used for every channel
    pub sim: SimParams,

    /// Directory, relative to the software root, holding profile and action
    /// files given without a directory
    pub store_dir: String,

    /// A playback with no progress for this long is cancelled.
    ///
    /// Units: seconds
    pub stall_timeout_s: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelParams {
    pub name: String,

    /// Gain set used while replaying this channel
    pub gain_slot: u8,
}
