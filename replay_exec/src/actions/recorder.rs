//! # Action recorder
//!
//! Collects the actions completed by live behaviours while a recording is
//! armed. Live `RecordableAction`s hold an `Arc` to the recorder and read its
//! clock when they begin and end.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};

use util::time::Stopwatch;

use super::{Action, ActionError, ActionList, ActionRegistry};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

pub struct ActionRecorder {
    /// Registry used to build the list returned by `stop`
    registry: Arc<ActionRegistry>,

    poll_period_ms: u32,

    state: Mutex<RecorderState>,
}

#[derive(Default)]
struct RecorderState {
    armed: bool,

    clock: Stopwatch,

    buffer: Vec<Action>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ActionRecorder {
    pub fn new(registry: Arc<ActionRegistry>, poll_period_ms: u32) -> Self {
        Self {
            registry,
            poll_period_ms,
            state: Mutex::new(RecorderState::default()),
        }
    }

    /// Clear the buffer and start the clock.
    ///
    /// Starting a recorder which is already recording does nothing.
    pub fn start(&self) -> Result<(), ActionError> {
        let mut state = self.lock()?;

        if state.armed {
            debug!("Action recorder already started");
            return Ok(());
        }

        state.buffer.clear();
        state.clock.reset();
        state.clock.start();
        state.armed = true;

        info!("Action recording started");

        Ok(())
    }

    /// Stop recording and return the recorded actions as a list.
    ///
    /// Stopping a recorder which isn't recording returns an empty list.
    pub fn stop(&self) -> Result<ActionList, ActionError> {
        let mut state = self.lock()?;

        if !state.armed {
            warn!("Action recorder stopped without being started");
            return Ok(ActionList::empty(self.poll_period_ms));
        }

        state.armed = false;
        state.clock.stop();
        let actions = std::mem::take(&mut state.buffer);

        info!("Action recording stopped with {} actions", actions.len());

        Ok(ActionList::new(actions, &self.registry, self.poll_period_ms))
    }

    /// Append a completed action. Ignored with a warning if not recording.
    pub fn add_action(&self, action: Action) -> Result<(), ActionError> {
        let mut state = self.lock()?;

        if !state.armed {
            warn!("Action \"{}\" not recorded, recorder is not started", action.name());
            return Ok(());
        }

        debug!(
            "Recorded {} from {} s to {} s",
            action.name(),
            action.start_time_s(),
            action.end_time_s()
        );
        state.buffer.push(action);

        Ok(())
    }

    /// Seconds since `start`, frozen once stopped.
    pub fn elapsed_s(&self) -> f64 {
        match self.state.lock() {
            Ok(s) => s.clock.elapsed_s(),
            Err(poisoned) => poisoned.into_inner().clock.elapsed_s(),
        }
    }

    pub fn is_recording(&self) -> bool {
        match self.state.lock() {
            Ok(s) => s.armed,
            Err(_) => false,
        }
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    fn lock(&self) -> Result<MutexGuard<RecorderState>, ActionError> {
        self.state.lock().map_err(|_| ActionError::LockPoisoned)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::actions::{counting_registry, RecordableAction};
    use std::time::Duration;

    fn recorder() -> Arc<ActionRecorder> {
        let (registry, _) = counting_registry(&["Intake"]);
        Arc::new(ActionRecorder::new(Arc::new(registry), 10))
    }

    #[test]
    fn test_stop_without_start() {
        let rec = recorder();
        let list = rec.stop().unwrap();
        assert!(list.is_empty());

        // Not armed, nothing kept
        rec.add_action(Action::new("Intake", 0.0, 1.0)).unwrap();
        rec.start().unwrap();
        assert!(rec.stop().unwrap().is_empty());
    }

    #[test]
    fn test_records_added_actions() {
        let rec = recorder();
        rec.start().unwrap();
        assert!(rec.is_recording());

        rec.add_action(Action::new("Intake", 0.1, 0.5)).unwrap();
        rec.add_action(Action::new("Intake", 0.7, 0.9)).unwrap();

        // Starting again keeps the buffer
        rec.start().unwrap();

        let list = rec.stop().unwrap();
        assert!(!rec.is_recording());
        assert_eq!(list.len(), 2);
        assert_eq!(list.actions()[1], Action::new("Intake", 0.7, 0.9));
    }

    #[test]
    fn test_live_action_records_itself() {
        let rec = recorder();
        let behaviour = rec.registry().create("Intake").unwrap();
        let mut action = RecordableAction::live("Intake", behaviour, rec.clone());

        rec.start().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        action.begin();
        action.poll();
        std::thread::sleep(Duration::from_millis(20));
        action.end();

        let list = rec.stop().unwrap();
        assert_eq!(list.len(), 1);

        let a = &list.actions()[0];
        assert_eq!(a.name(), "Intake");
        assert!(a.start_time_s() >= 0.02);
        assert!(a.end_time_s() - a.start_time_s() >= 0.019);
    }

    #[test]
    fn test_playback_action_not_recorded() {
        let rec = recorder();
        let behaviour = rec.registry().create("Intake").unwrap();
        let mut action = RecordableAction::playback("Intake", behaviour, 0.0);

        rec.start().unwrap();
        action.begin();
        assert!(action.poll());

        assert!(rec.stop().unwrap().is_empty());
    }
}
