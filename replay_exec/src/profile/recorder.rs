//! # Recorder
//!
//! The recorder samples the position and feed-forward of every channel at a
//! fixed period while armed. Sampling runs on its own `PeriodicTask`, the
//! sample buffers are shared with it behind a mutex so `stop` can take them
//! at any time.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, info, warn};
use serde::Deserialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use util::task::{PeriodicTask, TaskError, TaskFlow};

use super::Recording;
use crate::eqpt::{FeedForwardKind, SensorSource};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of a recorder.
#[derive(Debug, Clone, Deserialize)]
pub struct RecorderParams {
    /// Sampling period, also the duration of each point in the resulting
    /// profile.
    ///
    /// Units: milliseconds
    pub dt_ms: u32,

    /// Quantity recorded as the feed-forward of each point.
    #[serde(default)]
    pub feed_forward: FeedForwardKind,

    /// Number of samples to preallocate in each buffer.
    #[serde(default)]
    pub initial_capacity: usize,
}

/// Samples channels into growable buffers while armed.
pub struct Recorder {
    params: RecorderParams,

    shared: Arc<Mutex<RecorderState>>,

    sampler: Option<PeriodicTask>,
}

struct RecorderState {
    sources: Vec<Box<dyn SensorSource>>,

    /// Interleaved position/feed-forward buffers, two per source
    signals: Vec<Vec<f64>>,

    armed: bool,

    feed_forward: FeedForwardKind,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("Recorder state lock is poisoned")]
    LockPoisoned,

    #[error("Could not start the sampling task: {0}")]
    SamplerError(TaskError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Recorder {
    /// Create a new recorder sampling the given sources, one per channel.
    pub fn new(sources: Vec<Box<dyn SensorSource>>, params: RecorderParams) -> Self {
        let signals = vec![Vec::with_capacity(params.initial_capacity); sources.len() * 2];

        Self {
            shared: Arc::new(Mutex::new(RecorderState {
                sources,
                signals,
                armed: false,
                feed_forward: params.feed_forward,
            })),
            sampler: None,
            params,
        }
    }

    /// Clear the buffers and start sampling every `dt_ms`.
    ///
    /// Starting a recorder which is already recording discards the samples
    /// taken so far.
    pub fn start(&mut self) -> Result<(), RecorderError> {
        if let Some(mut s) = self.sampler.take() {
            warn!("Recorder started while already recording, discarding current samples");
            s.stop();
        }

        {
            let mut state = self.lock()?;
            let capacity = self.params.initial_capacity;
            for s in state.signals.iter_mut() {
                s.clear();
                s.reserve(capacity);
            }
            state.armed = true;
        }

        let shared = self.shared.clone();
        let sampler = PeriodicTask::spawn(
            "recorder",
            Duration::from_millis(self.params.dt_ms as u64),
            move || match shared.lock() {
                Ok(mut state) => {
                    if state.armed {
                        state.add_sample();
                        TaskFlow::Continue
                    } else {
                        TaskFlow::Stop
                    }
                }
                Err(_) => TaskFlow::Stop,
            },
        );

        match sampler {
            Ok(s) => self.sampler = Some(s),
            Err(e) => {
                self.lock()?.armed = false;
                return Err(RecorderError::SamplerError(e));
            }
        }

        info!(
            "Recording {} channels every {} ms",
            self.lock()?.sources.len(),
            self.params.dt_ms
        );

        Ok(())
    }

    /// Stop sampling and return the recording taken since `start`.
    ///
    /// Stopping a recorder which isn't recording returns an empty recording.
    pub fn stop(&mut self) -> Result<Recording, RecorderError> {
        if let Some(mut s) = self.sampler.take() {
            s.stop();
        }

        let mut state = self.lock()?;
        let num_channels = state.sources.len();

        if !state.armed {
            warn!("Recorder stopped without being started");
            return Ok(Recording::empty(num_channels, self.params.dt_ms));
        }

        state.armed = false;

        let signals: Vec<Vec<f64>> = state
            .signals
            .iter_mut()
            .map(std::mem::take)
            .collect();

        debug!(
            "Recorder stopped with {} samples",
            signals.iter().map(|s| s.len()).min().unwrap_or(0)
        );

        Ok(Recording::from_signal_pairs(signals, self.params.dt_ms))
    }

    /// Returns `true` while the recorder is armed.
    pub fn is_recording(&self) -> bool {
        match self.shared.lock() {
            Ok(s) => s.armed,
            Err(_) => false,
        }
    }

    /// Take one sample of every channel.
    ///
    /// This is called by the sampling task, it is exposed so that callers
    /// with their own timing can drive the recorder directly.
    pub fn add_sample(&self) -> Result<(), RecorderError> {
        self.lock()?.add_sample();
        Ok(())
    }

    pub fn params(&self) -> &RecorderParams {
        &self.params
    }

    fn lock(&self) -> Result<MutexGuard<RecorderState>, RecorderError> {
        self.shared.lock().map_err(|_| RecorderError::LockPoisoned)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Some(mut s) = self.sampler.take() {
            s.stop();
        }
    }
}

impl RecorderState {
    fn add_sample(&mut self) {
        if !self.armed {
            warn!("Sample requested while the recorder is not armed");
            return;
        }

        let feed_forward = self.feed_forward;
        let RecorderState {
            sources, signals, ..
        } = self;

        for (i, source) in sources.iter_mut().enumerate() {
            match source.read_sample() {
                Ok(sample) => {
                    signals[2 * i].push(sample.position);
                    signals[2 * i + 1].push(feed_forward.select(&sample));
                }
                // A missed sample is absorbed by truncating to the shortest
                // signal when converting to a profile
                Err(e) => warn!("Could not sample {}: {}", source.name(), e),
            }
        }
    }
}

impl Recording {
    /// Build a recording from signals known to come in pairs.
    pub(crate) fn from_signal_pairs(signals: Vec<Vec<f64>>, dt_ms: u32) -> Self {
        match Recording::new(signals, dt_ms) {
            Ok(r) => r,
            Err(_) => Recording::empty(0, dt_ms),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::eqpt::{Sample, SimActuator, SimParams};

    fn sim_params() -> SimParams {
        SimParams {
            staging_capacity: 128,
            execution_capacity: 16,
            step_ms: 5.0,
        }
    }

    fn sources(sims: Vec<SimActuator>) -> Vec<Box<dyn SensorSource>> {
        sims.into_iter()
            .map(|s| Box::new(s) as Box<dyn SensorSource>)
            .collect()
    }

    fn recorder_params(dt_ms: u32) -> RecorderParams {
        RecorderParams {
            dt_ms,
            feed_forward: FeedForwardKind::Velocity,
            initial_capacity: 0,
        }
    }

    #[test]
    fn test_three_samples() {
        let left = SimActuator::new("left", &sim_params());
        let right = SimActuator::new("right", &sim_params());
        let (lh, rh) = (left.handle(), right.handle());

        // A long period so only the manual samples are taken
        let mut recorder = Recorder::new(
            sources(vec![left, right]),
            recorder_params(60_000),
        );
        recorder.start().unwrap();
        assert!(recorder.is_recording());

        for i in 1..=3 {
            lh.set_sample(Sample {
                position: i as f64,
                velocity: 10.0,
                voltage: 1.0,
            });
            rh.set_sample(Sample {
                position: -(i as f64),
                velocity: -10.0,
                voltage: -1.0,
            });
            recorder.add_sample().unwrap();
        }

        let recording = recorder.stop().unwrap();
        assert!(!recorder.is_recording());
        assert_eq!(recording.len(), 3);
        assert_eq!(recording.num_channels(), 2);

        let profile = recording.into_profile();
        assert_eq!(profile.length(), 3);
        assert_eq!(profile.dt_ms(), 60_000);
        assert_eq!(profile.trajectory(0).unwrap()[2].position, 3.0);
        assert_eq!(profile.trajectory(1).unwrap()[0].feed_forward, -10.0);
    }

    #[test]
    fn test_stop_without_start() {
        let sim = SimActuator::new("sim", &sim_params());
        let mut recorder = Recorder::new(sources(vec![sim]), recorder_params(10));

        let recording = recorder.stop().unwrap();
        assert!(recording.is_empty());
        assert_eq!(recording.num_channels(), 1);
        assert_eq!(recording.dt_ms(), 10);

        // Unarmed samples are ignored
        recorder.add_sample().unwrap();
        recorder.start().unwrap();
        let recording = recorder.stop().unwrap();
        assert!(recording.len() <= 1);
    }

    #[test]
    fn test_restart_clears_buffers() {
        let sim = SimActuator::new("sim", &sim_params());
        let handle = sim.handle();
        handle.set_sample(Sample {
            position: 1.0,
            velocity: 0.0,
            voltage: 2.0,
        });

        let mut params = recorder_params(60_000);
        params.feed_forward = FeedForwardKind::Voltage;
        let mut recorder = Recorder::new(sources(vec![sim]), params);

        recorder.start().unwrap();
        recorder.add_sample().unwrap();
        recorder.add_sample().unwrap();
        recorder.start().unwrap();
        recorder.add_sample().unwrap();

        let recording = recorder.stop().unwrap();
        assert_eq!(recording.len(), 1);
        assert_eq!(recording.signals()[1][0], 2.0);
    }

    #[test]
    fn test_faulty_sample_is_skipped() {
        let a = SimActuator::new("a", &sim_params());
        let b = SimActuator::new("b", &sim_params());
        let bh = b.handle();
        let mut recorder = Recorder::new(sources(vec![a, b]), recorder_params(60_000));

        recorder.start().unwrap();
        recorder.add_sample().unwrap();
        bh.state().inject_faults = 1;
        recorder.add_sample().unwrap();
        recorder.add_sample().unwrap();

        let recording = recorder.stop().unwrap();
        assert_eq!(recording.signals()[0].len(), 3);
        assert_eq!(recording.signals()[2].len(), 2);
        assert_eq!(recording.len(), 2);
    }

    #[test]
    fn test_periodic_sampling() {
        let sim = SimActuator::new("sim", &sim_params());
        let mut recorder = Recorder::new(sources(vec![sim]), recorder_params(2));

        recorder.start().unwrap();
        std::thread::sleep(Duration::from_millis(50));
        let recording = recorder.stop().unwrap();

        assert!(recording.len() > 0);
    }
}
