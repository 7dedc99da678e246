//! # Routines
//!
//! Routines tie a profile and an action list together so an application's
//! control loop can drive them with plain method calls:
//!
//! - `AutoRoutine` replays a bound profile and an action list side by side.
//! - `RecordSession` records a profile and the live actions at the same time.
//!
//! Both have the same lifecycle: `begin` once, `poll` every cycle, then
//! either `end` or `cancel`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{error, info, warn};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    actions::{ActionError, ActionList, ActionRecorder},
    profile::{Profile, Recorder, RecorderError, Recording},
    traj_stream::{StreamError, StreamReport},
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Replays a profile and an action list together.
pub struct AutoRoutine {
    profile: Profile,

    actions: ActionList,

    state: RoutineState,

    /// The profile was accepted by its engine in `begin`
    profile_running: bool,
}

/// Records a profile and the operator's actions together.
pub struct RecordSession {
    recorder: Recorder,

    action_recorder: Arc<ActionRecorder>,

    state: RoutineState,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum RoutineState {
    Idle,
    Running,
    Finished,
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum RoutineError {
    #[error("The routine has already begun")]
    AlreadyBegun,

    #[error("Stream error: {0}")]
    StreamError(#[from] StreamError),

    #[error("Recorder error: {0}")]
    RecorderError(#[from] RecorderError),

    #[error("Action error: {0}")]
    ActionError(#[from] ActionError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl AutoRoutine {
    /// Create a new routine. The profile must already be bound to its
    /// devices.
    pub fn new(profile: Profile, actions: ActionList) -> Self {
        Self {
            profile,
            actions,
            state: RoutineState::Idle,
            profile_running: false,
        }
    }

    /// Start the profile and the action list.
    ///
    /// A profile which can't be executed is logged and skipped, the actions
    /// are still replayed.
    pub fn begin(&mut self) -> Result<(), RoutineError> {
        if self.state != RoutineState::Idle {
            return Err(RoutineError::AlreadyBegun);
        }

        self.profile_running = match self.profile.execute() {
            Ok(()) => true,
            Err(e) => {
                error!("Trajectory will not be replayed: {}", e);
                false
            }
        };

        if let Err(e) = self.actions.execute() {
            self.profile.on_interrupt();
            return Err(e.into());
        }

        self.state = RoutineState::Running;
        info!(
            "Auto routine started ({} points, {} actions)",
            self.profile.length(),
            self.actions.len()
        );

        Ok(())
    }

    /// Check for completion, returns `true` once the routine finished.
    ///
    /// The routine finishes once the profile finished, every action fired
    /// and every fired behaviour ended.
    pub fn poll(&mut self) -> bool {
        if self.state == RoutineState::Running
            && (!self.profile_running || self.profile.is_finished())
            && self.actions.is_finished()
            && self.actions.num_running() == 0
        {
            info!("Auto routine finished");
            self.state = RoutineState::Finished;
        }

        self.state == RoutineState::Finished
    }

    /// End the routine, cancelling it if it hasn't finished.
    pub fn end(&mut self) {
        if self.state == RoutineState::Running && !self.poll() {
            warn!("Auto routine ended before finishing");
            self.cancel();
        }
    }

    /// Interrupt the profile and every action.
    pub fn cancel(&mut self) {
        if matches!(self.state, RoutineState::Finished | RoutineState::Cancelled) {
            return;
        }

        if self.profile_running {
            self.profile.on_interrupt();
        }
        self.actions.on_interrupt();
        self.state = RoutineState::Cancelled;

        info!("Auto routine cancelled");
    }

    pub fn state(&self) -> RoutineState {
        self.state
    }

    /// Status of the profile's engine.
    pub fn status(&self) -> Option<StreamReport> {
        self.profile.status()
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn actions(&self) -> &ActionList {
        &self.actions
    }
}

impl Drop for AutoRoutine {
    fn drop(&mut self) {
        if self.state == RoutineState::Running {
            self.cancel();
        }
    }
}

impl RecordSession {
    pub fn new(recorder: Recorder, action_recorder: Arc<ActionRecorder>) -> Self {
        Self {
            recorder,
            action_recorder,
            state: RoutineState::Idle,
        }
    }

    /// Start recording samples and actions.
    pub fn begin(&mut self) -> Result<(), RoutineError> {
        if self.state != RoutineState::Idle {
            return Err(RoutineError::AlreadyBegun);
        }

        self.recorder.start()?;
        if let Err(e) = self.action_recorder.start() {
            self.recorder.stop().ok();
            return Err(e.into());
        }

        self.state = RoutineState::Running;

        Ok(())
    }

    /// Returns `true` once the session is no longer recording.
    pub fn poll(&self) -> bool {
        self.state != RoutineState::Running || !self.recorder.is_recording()
    }

    /// Stop recording and return what was recorded.
    pub fn end(&mut self) -> Result<(Recording, ActionList), RoutineError> {
        if self.state != RoutineState::Running {
            warn!("Record session ended without running");
        }

        let recording = self.recorder.stop()?;
        let actions = self.action_recorder.stop()?;
        self.state = RoutineState::Finished;

        info!(
            "Recorded {} samples and {} actions",
            recording.len(),
            actions.len()
        );

        Ok((recording, actions))
    }

    /// Stop recording and discard everything recorded.
    pub fn cancel(&mut self) {
        if self.state != RoutineState::Running {
            return;
        }

        if let Err(e) = self.recorder.stop() {
            error!("Could not stop the recorder: {}", e);
        }
        if let Err(e) = self.action_recorder.stop() {
            error!("Could not stop the action recorder: {}", e);
        }
        self.state = RoutineState::Cancelled;

        info!("Record session cancelled");
    }

    pub fn state(&self) -> RoutineState {
        self.state
    }

    /// The action recorder live actions should report to.
    pub fn action_recorder(&self) -> &Arc<ActionRecorder> {
        &self.action_recorder
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }
}
