//! # Stream channels
//!
//! A channel pairs one trajectory with the device executing it and keeps the
//! cursor of the next point to push. Channels are owned by a single
//! `StreamCore` and are never shared between engines.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;

use super::{ChannelStatus, StreamError};
use crate::{
    eqpt::{BufferStatus, DeviceMode, PointDuration, PointPeriodMode, TrajDevice, TrajPoint},
    profile::ProfilePoint,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A device to bind one channel of a profile to.
pub struct ChannelBinding {
    pub device: Box<dyn TrajDevice>,

    /// Gain set the device uses for every point of this channel
    pub gain_slot: u8,
}

pub(crate) struct Channel {
    traj: Vec<ProfilePoint>,

    next_index: usize,

    device: Box<dyn TrajDevice>,

    gain_slot: u8,

    duration: PointDuration,

    status: BufferStatus,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ChannelBinding {
    pub fn new(device: Box<dyn TrajDevice>, gain_slot: u8) -> Self {
        Self { device, gain_slot }
    }
}

impl Channel {
    pub(crate) fn new(
        traj: Vec<ProfilePoint>,
        binding: ChannelBinding,
        duration: PointDuration,
    ) -> Self {
        Self {
            traj,
            next_index: 0,
            device: binding.device,
            gain_slot: binding.gain_slot,
            duration,
            status: BufferStatus::default(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.device.name()
    }

    pub(crate) fn buffer(&self) -> &BufferStatus {
        &self.status
    }

    /// Push points until the staging buffer is full or the trajectory is
    /// exhausted.
    ///
    /// Before the first point of a run the device buffers are cleared and the
    /// device is switched to per-point timing.
    pub(crate) fn fill(&mut self) -> Result<usize, StreamError> {
        if self.next_index == 0 && !self.traj.is_empty() {
            self.device.clear_buffer().map_err(|e| self.err(e))?;
            self.device
                .configure_point_period(PointPeriodMode::PerPoint)
                .map_err(|e| self.err(e))?;
            self.poll()?;
        }

        let capacity = self.device.staging_capacity();
        let mut pushed = 0;

        while self.status.staging_count < capacity && self.next_index < self.traj.len() {
            let point = self.point(self.next_index);
            self.device.push_point(&point).map_err(|e| self.err(e))?;
            self.poll()?;
            self.next_index += 1;
            pushed += 1;
        }

        if pushed > 0 {
            trace!(
                "{}: pushed {} points, next index {}/{}",
                self.name(),
                pushed,
                self.next_index,
                self.traj.len()
            );
        }

        Ok(pushed)
    }

    /// Refresh the buffer status from the device.
    pub(crate) fn poll(&mut self) -> Result<&BufferStatus, StreamError> {
        self.status = self.device.get_status().map_err(|e| self.err(e))?;
        Ok(&self.status)
    }

    pub(crate) fn advance(&mut self) -> Result<(), StreamError> {
        self.device.advance_buffer().map_err(|e| self.err(e))
    }

    pub(crate) fn set_mode(&mut self, mode: DeviceMode) -> Result<(), StreamError> {
        self.device.set_mode(mode).map_err(|e| self.err(e))
    }

    pub(crate) fn clear(&mut self) -> Result<(), StreamError> {
        self.device.clear_buffer().map_err(|e| self.err(e))
    }

    pub(crate) fn status(&self) -> ChannelStatus {
        ChannelStatus {
            name: self.name().to_string(),
            next_index: self.next_index,
            length: self.traj.len(),
            gain_slot: self.gain_slot,
            buffer: self.status,
        }
    }

    fn point(&self, index: usize) -> TrajPoint {
        let p = &self.traj[index];

        TrajPoint {
            position: p.position,
            feed_forward: p.feed_forward,
            duration_ms: self.duration.as_ms(),
            gain_slot: self.gain_slot,
            is_first: index == 0,
            is_last: index + 1 == self.traj.len(),
        }
    }

    fn err(&self, e: crate::eqpt::DeviceError) -> StreamError {
        StreamError::DeviceError(self.name().to_string(), e)
    }
}
