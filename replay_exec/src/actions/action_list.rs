//! # Action list
//!
//! The list polls its pending actions every period, firing each one once the
//! list's clock reaches its start offset. Actions are not assumed to be
//! sorted, every poll scans the whole pending list.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, error, info, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};
use std::time::Duration;

use util::{
    task::{PeriodicTask, TaskFlow},
    time::Stopwatch,
};

use super::{Action, ActionError, ActionRegistry, ActionRunner, BehaviourFactory, RecordableAction};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A list of actions to replay at their recorded offsets.
pub struct ActionList {
    /// Every action the list was built from
    actions: Vec<Action>,

    poll_period: Duration,

    shared: Arc<Mutex<ListState>>,

    finished: Arc<AtomicBool>,

    poll_task: Option<PeriodicTask>,
}

struct ListState {
    pending: Vec<Pending>,

    running: Vec<ActionRunner>,

    clock: Stopwatch,

    runner_period: Duration,
}

#[derive(Clone)]
struct Pending {
    action: Action,

    /// `None` if the name isn't registered
    factory: Option<BehaviourFactory>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ActionList {
    /// Build a list, resolving every action's behaviour in `registry`.
    ///
    /// Actions with unknown names stay in the list but are dropped without
    /// running when they come due.
    pub fn new(actions: Vec<Action>, registry: &ActionRegistry, poll_period_ms: u32) -> Self {
        let pending = actions
            .iter()
            .map(|a| {
                let factory = registry.resolve(a.name());
                if factory.is_none() {
                    warn!("No behaviour registered for action \"{}\"", a.name());
                }
                Pending {
                    action: a.clone(),
                    factory,
                }
            })
            .collect();

        Self::from_pending(actions, pending, poll_period_ms)
    }

    /// Create a list with no actions.
    pub fn empty(poll_period_ms: u32) -> Self {
        Self::from_pending(Vec::new(), Vec::new(), poll_period_ms)
    }

    fn from_pending(actions: Vec<Action>, pending: Vec<Pending>, poll_period_ms: u32) -> Self {
        let poll_period = Duration::from_millis(poll_period_ms.max(1) as u64);

        Self {
            actions,
            poll_period,
            shared: Arc::new(Mutex::new(ListState {
                pending,
                running: Vec::new(),
                clock: Stopwatch::new(),
                runner_period: poll_period,
            })),
            finished: Arc::new(AtomicBool::new(false)),
            poll_task: None,
        }
    }

    /// Number of actions the list was built from.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Every action the list was built from, in order.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Action> {
        self.actions.iter()
    }

    /// Actions which have not been fired yet.
    pub fn remaining(&self) -> Vec<Action> {
        match self.lock() {
            Ok(s) => s.pending.iter().map(|p| p.action.clone()).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Start the clock and begin polling.
    ///
    /// An empty list finishes immediately.
    pub fn execute(&mut self) -> Result<(), ActionError> {
        self.finished.store(false, Ordering::SeqCst);

        {
            let mut state = self.lock()?;
            if state.pending.is_empty() {
                info!("Action list is empty, nothing to run");
                self.finished.store(true, Ordering::SeqCst);
                return Ok(());
            }

            state.clock.reset();
            state.clock.start();
        }

        let shared = self.shared.clone();
        let finished = self.finished.clone();

        let task = PeriodicTask::spawn("action_list", self.poll_period, move || {
            let mut state = match shared.lock() {
                Ok(s) => s,
                Err(_) => return TaskFlow::Stop,
            };

            let elapsed = state.clock.elapsed_s();
            state.poll(elapsed);

            if state.pending.is_empty() {
                finished.store(true, Ordering::SeqCst);
                TaskFlow::Stop
            } else {
                TaskFlow::Continue
            }
        })?;

        self.poll_task = Some(task);
        info!("Replaying {} actions", self.actions.len());

        Ok(())
    }

    /// Fire every pending action due at `elapsed_s`, returning how many
    /// behaviours were started.
    ///
    /// This is what the poll task runs each period, it can also be called
    /// directly to drive the list from another clock.
    pub fn poll_at(&self, elapsed_s: f64) -> Result<usize, ActionError> {
        let mut state = self.lock()?;
        let fired = state.poll(elapsed_s);

        if state.pending.is_empty() {
            self.finished.store(true, Ordering::SeqCst);
        }

        Ok(fired)
    }

    /// Returns `true` once every action has been fired.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Number of fired behaviours which are still running.
    pub fn num_running(&self) -> usize {
        match self.lock() {
            Ok(s) => s.running.iter().filter(|r| !r.is_finished()).count(),
            Err(_) => 0,
        }
    }

    /// Stop polling and end every running behaviour.
    pub fn on_interrupt(&mut self) {
        if let Some(mut t) = self.poll_task.take() {
            t.stop();
        }

        let mut state = match self.shared.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };

        for r in state.running.iter_mut() {
            r.stop();
        }
        state.running.clear();
        state.clock.stop();

        debug!("Action list interrupted, {} actions not fired", state.pending.len());
    }

    fn lock(&self) -> Result<MutexGuard<ListState>, ActionError> {
        self.shared.lock().map_err(|_| ActionError::LockPoisoned)
    }
}

impl Clone for ActionList {
    /// Copies the unfired actions into a new list with its own clock.
    fn clone(&self) -> Self {
        let pending = match self.lock() {
            Ok(s) => s.pending.clone(),
            Err(_) => Vec::new(),
        };
        let actions = pending.iter().map(|p| p.action.clone()).collect();

        Self::from_pending(actions, pending, self.poll_period.as_millis() as u32)
    }
}

impl Drop for ActionList {
    fn drop(&mut self) {
        if let Some(mut t) = self.poll_task.take() {
            t.stop();
        }
    }
}

impl std::fmt::Debug for ActionList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionList")
            .field("actions", &self.actions)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl<'a> IntoIterator for &'a ActionList {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}

impl ListState {
    fn poll(&mut self, elapsed_s: f64) -> usize {
        let mut fired = 0;
        let mut i = 0;

        while i < self.pending.len() {
            if self.pending[i].action.start_time_s() > elapsed_s {
                i += 1;
                continue;
            }

            let Pending { action, factory } = self.pending.remove(i);

            let factory = match factory {
                Some(f) => f,
                None => {
                    warn!("Dropping action \"{}\", no behaviour registered", action.name());
                    continue;
                }
            };

            let recordable = RecordableAction::playback(action.name(), factory(), action.duration_s());
            match ActionRunner::spawn(recordable, self.runner_period) {
                Ok(r) => {
                    self.running.push(r);
                    fired += 1;
                }
                Err(e) => error!("Could not run action \"{}\": {}", action.name(), e),
            }
        }

        fired
    }
}
