//! # Equipment interfaces
//!
//! This module defines what the rest of the library needs from an actuator:
//! a two-stage trajectory buffer for playback (`TrajDevice`) and live sensor
//! readings for recording (`SensorSource`). The wire protocol and register
//! layout of real actuators are hidden behind these traits.
//!
//! The device-side buffer has two stages. Points pushed by the host land in
//! the staging buffer, which has a fixed capacity. The device moves them into
//! its execution buffer each time `advance_buffer` is called, and only
//! executes points from the execution buffer.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Simulated actuator
pub mod sim;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

pub use sim::{SimActuator, SimHandle, SimParams};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// An actuator able to execute a streamed trajectory.
///
/// Implementors must be `Send` since the buffer-advance and management tasks
/// run on their own threads. A device shall only ever be driven by one
/// stream engine at a time, this is not checked.
pub trait TrajDevice: Send {
    /// Human readable name, used in logs.
    fn name(&self) -> &str;

    /// Fixed capacity of the staging buffer.
    fn staging_capacity(&self) -> usize;

    /// Push a point into the staging buffer.
    ///
    /// Pushing into a full buffer is an error, callers must check the
    /// staging count first.
    fn push_point(&mut self, point: &TrajPoint) -> Result<BufferStatus, DeviceError>;

    /// Get the current status of the device buffers.
    fn get_status(&mut self) -> Result<BufferStatus, DeviceError>;

    /// Set the output mode of the device.
    fn set_mode(&mut self, mode: DeviceMode) -> Result<(), DeviceError>;

    /// Clear both buffers and any active point.
    fn clear_buffer(&mut self) -> Result<(), DeviceError>;

    /// Move points from the staging buffer into the execution buffer.
    fn advance_buffer(&mut self) -> Result<(), DeviceError>;

    /// Select how the device times each point.
    fn configure_point_period(&mut self, mode: PointPeriodMode) -> Result<(), DeviceError>;
}

/// Something which can be sampled while an operator drives the robot.
pub trait SensorSource: Send {
    /// Human readable name, used in logs.
    fn name(&self) -> &str;

    /// Read the latest sensor values.
    fn read_sample(&mut self) -> Result<Sample, DeviceError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One timed setpoint sent to a device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajPoint {
    /// Position demand in raw sensor units
    pub position: f64,

    /// Feed-forward demand (velocity or voltage) in raw units
    pub feed_forward: f64,

    /// Time the device should hold this point for.
    ///
    /// Units: milliseconds
    pub duration_ms: u32,

    /// Gain set the device uses while executing this point
    pub gain_slot: u8,

    /// The device zeroes its position reference on this point
    pub is_first: bool,

    /// This is the final point of the trajectory
    pub is_last: bool,
}

/// Snapshot of a device's trajectory buffers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferStatus {
    /// Number of points in the staging buffer
    pub staging_count: usize,

    /// Number of points in the execution buffer
    pub execution_count: usize,

    /// The device has a point it is currently executing
    pub active_point_valid: bool,

    /// The active point is the last point of the trajectory
    pub active_is_last: bool,
}

/// Live sensor readings from an actuator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Position in raw sensor units
    pub position: f64,

    /// Velocity in raw sensor units per 100 ms
    pub velocity: f64,

    /// Applied output voltage
    pub voltage: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Output modes of a device executing a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceMode {
    /// Output is neutral, nothing is executed
    Disabled,

    /// The device executes points from its execution buffer
    Enabled,

    /// The device holds the current point
    Hold,
}

/// How a device decides the duration of each point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointPeriodMode {
    /// Every point is held for the same duration regardless of its own value
    Global(PointDuration),

    /// Each point carries its own duration
    PerPoint,
}

/// Quantity recorded and replayed as the feed-forward term of each point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedForwardKind {
    Velocity,
    Voltage,
}

/// Point durations supported by the device firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PointDuration {
    Ms0,
    Ms5,
    Ms10,
    Ms20,
    Ms30,
    Ms40,
    Ms50,
    Ms100,
}

/// Errors reported by devices.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Staging buffer of {0} is full (capacity {1})")]
    BufferFull(String, usize),

    #[error("Device {0} did not respond: {1}")]
    CommsError(String, String),

    #[error("Device state lock is poisoned")]
    LockPoisoned,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PointDuration {
    /// Every supported duration, shortest first.
    pub const ALL: [PointDuration; 8] = [
        PointDuration::Ms0,
        PointDuration::Ms5,
        PointDuration::Ms10,
        PointDuration::Ms20,
        PointDuration::Ms30,
        PointDuration::Ms40,
        PointDuration::Ms50,
        PointDuration::Ms100,
    ];

    pub fn as_ms(&self) -> u32 {
        match self {
            PointDuration::Ms0 => 0,
            PointDuration::Ms5 => 5,
            PointDuration::Ms10 => 10,
            PointDuration::Ms20 => 20,
            PointDuration::Ms30 => 30,
            PointDuration::Ms40 => 40,
            PointDuration::Ms50 => 50,
            PointDuration::Ms100 => 100,
        }
    }

    /// Get the duration code matching `ms` exactly, or `None` if the device
    /// doesn't support it.
    pub fn from_ms(ms: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|d| d.as_ms() == ms)
    }

    /// Get the supported duration closest to `ms`. Ties go to the shorter
    /// duration.
    pub fn nearest(ms: u32) -> Self {
        let mut best = PointDuration::Ms0;

        for d in Self::ALL.iter().copied() {
            let dist = (d.as_ms() as i64 - ms as i64).abs();
            let best_dist = (best.as_ms() as i64 - ms as i64).abs();
            if dist < best_dist {
                best = d;
            }
        }

        best
    }
}

impl FeedForwardKind {
    /// Pick the feed-forward quantity out of a sample.
    pub fn select(&self, sample: &Sample) -> f64 {
        match self {
            FeedForwardKind::Velocity => sample.velocity,
            FeedForwardKind::Voltage => sample.voltage,
        }
    }
}

impl Default for FeedForwardKind {
    fn default() -> Self {
        FeedForwardKind::Velocity
    }
}
