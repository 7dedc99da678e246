//! # Recordings
//!
//! A recording is the raw output of a `Recorder`: one signal per sampled
//! quantity, laid out as `[pos_0, ff_0, pos_1, ff_1, ...]`. Converting it into
//! a `Profile` aligns the signals and drops the idle lead-in before the
//! operator first moved anything.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::debug;

use super::{Profile, ProfilePoint};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Raw sampled signals of a recording session.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    signals: Vec<Vec<f64>>,

    dt_ms: u32,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    #[error("Signals must come in position/feed-forward pairs, got {0} signals")]
    OddSignalCount(usize),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Recording {
    /// Create a recording from interleaved position/feed-forward signals.
    pub fn new(signals: Vec<Vec<f64>>, dt_ms: u32) -> Result<Self, RecordingError> {
        if signals.len() % 2 != 0 {
            return Err(RecordingError::OddSignalCount(signals.len()));
        }

        Ok(Self { signals, dt_ms })
    }

    /// Create a recording with no samples.
    pub fn empty(num_channels: usize, dt_ms: u32) -> Self {
        Self {
            signals: vec![Vec::new(); num_channels * 2],
            dt_ms,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.signals.len() / 2
    }

    pub fn dt_ms(&self) -> u32 {
        self.dt_ms
    }

    /// Number of samples in the shortest signal.
    pub fn len(&self) -> usize {
        self.signals.iter().map(|s| s.len()).min().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn signals(&self) -> &[Vec<f64>] {
        &self.signals
    }

    /// Convert the recording into a profile.
    ///
    /// Signals are truncated to the shortest one, then every leading sample
    /// where all signals are exactly zero is removed. A recording which never
    /// leaves zero gives a profile of length 0.
    pub fn into_profile(self) -> Profile {
        let Recording { mut signals, dt_ms } = self;

        let min_len = signals.iter().map(|s| s.len()).min().unwrap_or(0);
        for s in signals.iter_mut() {
            s.truncate(min_len);
        }

        let lead_in = (0..min_len)
            .take_while(|&i| signals.iter().all(|s| s[i] == 0.0))
            .count();

        if lead_in > 0 {
            debug!("Trimming {} idle samples from the start of the recording", lead_in);
            for s in signals.iter_mut() {
                s.drain(..lead_in);
            }
        }

        let trajectories = signals
            .chunks(2)
            .map(|pair| {
                pair[0]
                    .iter()
                    .zip(pair[1].iter())
                    .map(|(&position, &feed_forward)| ProfilePoint {
                        position,
                        feed_forward,
                    })
                    .collect()
            })
            .collect();

        Profile::from_parts(trajectories, dt_ms)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_trim_leading_zeros() {
        let signals = vec![vec![0.0, 0.0, 0.0, 5.0, 6.0]; 4];
        let profile = Recording::new(signals, 10).unwrap().into_profile();

        assert_eq!(profile.length(), 2);
        assert_eq!(profile.num_channels(), 2);
        assert_eq!(profile.dt_ms(), 10);
        for c in 0..2 {
            let traj = profile.trajectory(c).unwrap();
            assert_eq!(traj[0], ProfilePoint { position: 5.0, feed_forward: 5.0 });
            assert_eq!(traj[1], ProfilePoint { position: 6.0, feed_forward: 6.0 });
        }
    }

    #[test]
    fn test_trim_keeps_partial_zeros() {
        // Index 1 has one non-zero signal so only index 0 is trimmed
        let signals = vec![
            vec![0.0, 0.0, 1.0],
            vec![0.0, 0.0, 1.0],
            vec![0.0, 2.0, 1.0],
            vec![0.0, 0.0, 1.0],
        ];
        let profile = Recording::new(signals, 10).unwrap().into_profile();

        assert_eq!(profile.length(), 2);
        assert_eq!(profile.trajectory(1).unwrap()[0].position, 2.0);
        assert_eq!(profile.trajectory(0).unwrap()[0].position, 0.0);
    }

    #[test]
    fn test_truncate_to_shortest() {
        let signals = vec![vec![1.0, 2.0, 3.0], vec![1.0, 2.0]];
        let recording = Recording::new(signals, 20).unwrap();
        assert_eq!(recording.len(), 2);

        let profile = recording.into_profile();
        assert_eq!(profile.length(), 2);
        assert_eq!(profile.trajectory(0).unwrap().len(), 2);
    }

    #[test]
    fn test_all_zero_is_empty() {
        let signals = vec![vec![0.0; 10]; 2];
        let profile = Recording::new(signals, 10).unwrap().into_profile();

        assert_eq!(profile.length(), 0);
        assert!(profile.is_empty());
        assert_eq!(profile.num_channels(), 1);
    }

    #[test]
    fn test_odd_signal_count() {
        match Recording::new(vec![vec![0.0]; 3], 10) {
            Err(RecordingError::OddSignalCount(3)) => (),
            r => panic!("Expected OddSignalCount, got {:?}", r),
        }
    }
}
