//! # Motion profiles
//!
//! A motion profile is a set of per-channel trajectories which share a
//! length and a per-point hold duration (`dt`). Profiles are produced by
//! stopping a `Recorder` and converting the resulting `Recording`, or by
//! reading rows back from storage with a `ProfileParser`.
//!
//! A profile only holds trajectory data. To run it, `bind` it to one device
//! per channel, which deep-copies the trajectories into a new
//! `StreamEngine`, then drive it with `execute`, `on_interrupt` and
//! `is_finished`.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod parser;
pub mod recorder;
pub mod recording;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{error, warn};
use serde::{Deserialize, Serialize};

use crate::traj_stream::{ChannelBinding, StreamEngine, StreamError, StreamParams, StreamReport};

pub use parser::{ProfileParser, ProfileParserError};
pub use recorder::{Recorder, RecorderError, RecorderParams};
pub use recording::{Recording, RecordingError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// One recorded point of a channel's trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfilePoint {
    /// Position in raw sensor units
    pub position: f64,

    /// Feed-forward (velocity or voltage) in raw units
    pub feed_forward: f64,
}

/// A multi-channel motion profile.
pub struct Profile {
    /// Number of points in every trajectory
    length: usize,

    /// Time each point is held for.
    ///
    /// Units: milliseconds
    dt_ms: u32,

    /// One trajectory per channel
    trajectories: Vec<Vec<ProfilePoint>>,

    /// The engine created by the last call to `bind`
    engine: Option<StreamEngine>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("Trajectories have differing lengths: {0:?}")]
    MismatchedLengths(Vec<usize>),

    #[error("Row {0} has {1} columns, expected {2}")]
    RaggedRow(usize, usize, usize),

    #[error("Rows must have a pos/ff pair per channel then dt, found {0} columns")]
    InvalidRowWidth(usize),

    #[error("Invalid point duration {0} on row {1}")]
    InvalidDt(f64, usize),

    #[error("Row {0} has dt {1} but the profile dt is {2}")]
    NonUniformDt(usize, u32, u32),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Profile {
    /// Create a new profile from one trajectory per channel.
    ///
    /// All trajectories must have the same length.
    pub fn new(trajectories: Vec<Vec<ProfilePoint>>, dt_ms: u32) -> Result<Self, ProfileError> {
        let lengths: Vec<usize> = trajectories.iter().map(|t| t.len()).collect();

        if lengths.windows(2).any(|w| w[0] != w[1]) {
            return Err(ProfileError::MismatchedLengths(lengths));
        }

        Ok(Self::from_parts(trajectories, dt_ms))
    }

    /// Create an empty profile with no channels.
    pub fn empty(dt_ms: u32) -> Self {
        Self::from_parts(Vec::new(), dt_ms)
    }

    /// Build a profile from trajectories already known to share a length.
    pub(crate) fn from_parts(trajectories: Vec<Vec<ProfilePoint>>, dt_ms: u32) -> Self {
        let length = trajectories.first().map(|t| t.len()).unwrap_or(0);

        Self {
            length,
            dt_ms,
            trajectories,
            engine: None,
        }
    }

    /// Number of points in each trajectory.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Hold duration of every point in milliseconds.
    pub fn dt_ms(&self) -> u32 {
        self.dt_ms
    }

    pub fn num_channels(&self) -> usize {
        self.trajectories.len()
    }

    /// Get the trajectory of a channel.
    pub fn trajectory(&self, channel: usize) -> Option<&[ProfilePoint]> {
        self.trajectories.get(channel).map(|t| t.as_slice())
    }

    /// Convert the profile into rows of `[pos_0, ff_0, ..., pos_n, ff_n, dt]`.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.length)
            .map(|i| {
                let mut row = Vec::with_capacity(self.trajectories.len() * 2 + 1);
                for traj in self.trajectories.iter() {
                    row.push(traj[i].position);
                    row.push(traj[i].feed_forward);
                }
                row.push(self.dt_ms as f64);
                row
            })
            .collect()
    }

    /// Build a profile from rows of `[pos_0, ff_0, ..., pos_n, ff_n, dt]`.
    ///
    /// The number of channels is inferred from the row width. An empty set of
    /// rows gives an empty profile.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, ProfileError> {
        let width = match rows.first() {
            Some(r) => r.len(),
            None => return Ok(Self::empty(0)),
        };

        if width < 3 || width % 2 == 0 {
            return Err(ProfileError::InvalidRowWidth(width));
        }

        let num_channels = (width - 1) / 2;
        let mut trajectories = vec![Vec::with_capacity(rows.len()); num_channels];
        let mut dt_ms = None;

        for (i, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(ProfileError::RaggedRow(i, row.len(), width));
            }

            let row_dt = row[width - 1];
            if row_dt < 0.0 || row_dt.fract() != 0.0 || row_dt > u32::MAX as f64 {
                return Err(ProfileError::InvalidDt(row_dt, i));
            }
            let row_dt = row_dt as u32;

            match dt_ms {
                None => dt_ms = Some(row_dt),
                Some(dt) if dt != row_dt => {
                    return Err(ProfileError::NonUniformDt(i, row_dt, dt))
                }
                Some(_) => (),
            }

            for (c, traj) in trajectories.iter_mut().enumerate() {
                traj.push(ProfilePoint {
                    position: row[2 * c],
                    feed_forward: row[2 * c + 1],
                });
            }
        }

        Ok(Self::from_parts(trajectories, dt_ms.unwrap_or(0)))
    }

    /// Bind the profile to one device per channel, ready for `execute`.
    ///
    /// The trajectories are copied into a new engine, so binding the same
    /// profile again gives an independent playback. An engine bound earlier
    /// is interrupted and replaced.
    pub fn bind(
        &mut self,
        bindings: Vec<ChannelBinding>,
        params: &StreamParams,
    ) -> Result<(), StreamError> {
        let engine = StreamEngine::new(self, bindings, params.clone())?;

        if let Some(mut old) = self.engine.replace(engine) {
            if old.is_streaming() {
                warn!("Replacing a bound engine which is still streaming, interrupting it");
                old.on_interrupt();
            }
        }

        Ok(())
    }

    /// Start executing the profile on the bound devices.
    pub fn execute(&mut self) -> Result<(), StreamError> {
        if self.length == 0 {
            error!("Tried to run empty profile!");
            return Err(StreamError::EmptyProfile);
        }

        match self.engine {
            Some(ref mut e) => e.execute(),
            None => {
                error!("Tried to execute a profile which is not bound to any devices");
                Err(StreamError::NotBound)
            }
        }
    }

    /// Stop executing the profile and disable every device.
    ///
    /// Safe to call at any time, including more than once.
    pub fn on_interrupt(&mut self) {
        match self.engine {
            Some(ref mut e) => e.on_interrupt(),
            None => warn!("No bound engine to interrupt!"),
        }
    }

    /// Returns `true` once the bound engine has streamed the whole profile.
    pub fn is_finished(&self) -> bool {
        self.engine.as_ref().map(|e| e.is_finished()).unwrap_or(false)
    }

    /// Latest status report of the bound engine.
    pub fn status(&self) -> Option<StreamReport> {
        self.engine.as_ref().map(|e| e.status())
    }
}

impl Clone for Profile {
    /// Copies the trajectory data only, the clone is not bound to anything.
    fn clone(&self) -> Self {
        Self::from_parts(self.trajectories.clone(), self.dt_ms)
    }
}

impl std::fmt::Debug for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profile")
            .field("length", &self.length)
            .field("dt_ms", &self.dt_ms)
            .field("num_channels", &self.trajectories.len())
            .field("bound", &self.engine.is_some())
            .finish()
    }
}

impl PartialEq for Profile {
    fn eq(&self, other: &Self) -> bool {
        self.dt_ms == other.dt_ms && self.trajectories == other.trajectories
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    pub(crate) fn ramp_profile(num_channels: usize, length: usize, dt_ms: u32) -> Profile {
        let trajectories = (0..num_channels)
            .map(|c| {
                (0..length)
                    .map(|i| ProfilePoint {
                        position: (i * (c + 1)) as f64,
                        feed_forward: 0.5 + c as f64,
                    })
                    .collect()
            })
            .collect();

        Profile::new(trajectories, dt_ms).unwrap()
    }

    #[test]
    fn test_mismatched_lengths() {
        let a = vec![ProfilePoint { position: 1.0, feed_forward: 0.0 }; 3];
        let b = vec![ProfilePoint { position: 1.0, feed_forward: 0.0 }; 2];

        match Profile::new(vec![a, b], 10) {
            Err(ProfileError::MismatchedLengths(l)) => assert_eq!(l, vec![3, 2]),
            r => panic!("Expected MismatchedLengths, got {:?}", r),
        }
    }

    #[test]
    fn test_rows_round_trip() {
        let mut profile = ramp_profile(2, 4, 10);
        // Values which don't have a short decimal form
        profile.trajectories[1][2].position = 0.1 + 0.2;
        profile.trajectories[0][3].feed_forward = -1.0 / 3.0;

        let rows = profile.to_rows();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].len(), 5);
        assert_eq!(rows[2][4], 10.0);

        let parsed = Profile::from_rows(&rows).unwrap();
        assert_eq!(parsed, profile);
        assert_eq!(parsed.length(), 4);
        assert_eq!(parsed.dt_ms(), 10);
        assert_eq!(parsed.num_channels(), 2);
    }

    #[test]
    fn test_from_rows_errors() {
        match Profile::from_rows(&[vec![1.0, 2.0]]) {
            Err(ProfileError::InvalidRowWidth(2)) => (),
            r => panic!("Expected InvalidRowWidth, got {:?}", r),
        }

        match Profile::from_rows(&[vec![1.0, 2.0, 10.0], vec![1.0, 10.0]]) {
            Err(ProfileError::RaggedRow(1, 2, 3)) => (),
            r => panic!("Expected RaggedRow, got {:?}", r),
        }

        match Profile::from_rows(&[vec![1.0, 2.0, 10.0], vec![1.0, 2.0, 20.0]]) {
            Err(ProfileError::NonUniformDt(1, 20, 10)) => (),
            r => panic!("Expected NonUniformDt, got {:?}", r),
        }

        match Profile::from_rows(&[vec![1.0, 2.0, 2.5]]) {
            Err(ProfileError::InvalidDt(_, 0)) => (),
            r => panic!("Expected InvalidDt, got {:?}", r),
        }
    }

    #[test]
    fn test_empty_rows() {
        let p = Profile::from_rows(&[]).unwrap();
        assert!(p.is_empty());
        assert_eq!(p.num_channels(), 0);
    }

    #[test]
    fn test_execute_unbound_or_empty() {
        let mut p = Profile::empty(10);
        match p.execute() {
            Err(StreamError::EmptyProfile) => (),
            r => panic!("Expected EmptyProfile, got {:?}", r),
        }

        let mut p = ramp_profile(1, 10, 10);
        match p.execute() {
            Err(StreamError::NotBound) => (),
            r => panic!("Expected NotBound, got {:?}", r),
        }
        assert!(!p.is_finished());

        // Interrupting an unbound profile is only a warning
        p.on_interrupt();
    }

    #[test]
    fn test_clone_is_unbound_copy() {
        let p = ramp_profile(2, 3, 10);
        let c = p.clone();
        assert_eq!(c, p);
        assert!(c.status().is_none());
    }
}
