//! Stream engine states and status reports

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Serialize;
use std::fmt;

use crate::eqpt::BufferStatus;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Snapshot of an engine, published after every management tick.
#[derive(Debug, Clone, Serialize)]
pub struct StreamReport {
    pub state: StreamState,

    pub channels: Vec<ChannelStatus>,

    /// The profile's `dt` is not a supported point duration, points are being
    /// pushed with the nearest supported one.
    pub invalid_duration: bool,

    /// The last device error encountered, if any.
    pub fault: Option<String>,

    /// Number of management ticks run so far
    pub ticks: u64,
}

/// Status of one channel of the engine.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStatus {
    pub name: String,

    /// Index of the next point to push
    pub next_index: usize,

    /// Number of points in the channel's trajectory
    pub length: usize,

    pub gain_slot: u8,

    /// Last buffer status read from the device
    pub buffer: BufferStatus,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// States of a stream engine.
///
/// States only ever advance in declaration order, `Interrupted` can be
/// reached from any non-terminal state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum StreamState {
    /// Constructed, devices are untouched
    Waiting,

    /// Filling staging buffers with execution disabled
    Started,

    /// Every channel is executing its trajectory
    Executing,

    /// Every channel reached its last point
    Finished,

    /// Stopped by an explicit interrupt
    Interrupted,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl StreamState {
    /// Returns `true` for `Finished` and `Interrupted`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamState::Finished | StreamState::Interrupted)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StreamState::Waiting => "WAITING",
            StreamState::Started => "STARTED",
            StreamState::Executing => "EXECUTING",
            StreamState::Finished => "FINISHED",
            StreamState::Interrupted => "INTERRUPTED",
        };

        write!(f, "{}", s)
    }
}

impl StreamReport {
    pub(crate) fn new(channels: Vec<ChannelStatus>, invalid_duration: bool) -> Self {
        Self {
            state: StreamState::Waiting,
            channels,
            invalid_duration,
            fault: None,
            ticks: 0,
        }
    }
}
