//! # Behaviours
//!
//! A `Behaviour` is the code behind an action. It is wrapped in a
//! `RecordableAction` which either records its own start and end offsets
//! (live) or ends it after the recorded duration (playback). The
//! `ActionRegistry` maps stored action names to factories creating fresh
//! behaviours.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use util::{
    task::{PeriodicTask, TaskFlow},
    time::Stopwatch,
};

use super::{Action, ActionError, ActionRecorder};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// The code run by an action.
pub trait Behaviour: Send {
    /// Called once when the action starts.
    fn init(&mut self) {}

    /// Called periodically while the action runs.
    fn exec(&mut self);

    /// Called once when the action ends, whether it finished or was
    /// interrupted.
    fn end(&mut self) {}

    /// Live end condition. Ignored in playback, where the recorded duration
    /// is used instead.
    fn is_finished(&self) -> bool {
        false
    }
}

/// Creates a fresh behaviour for each run of an action.
pub type BehaviourFactory = Arc<dyn Fn() -> Box<dyn Behaviour> + Send + Sync>;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Maps action names to behaviour factories.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    factories: HashMap<String, BehaviourFactory>,
}

/// A behaviour together with how its run is bounded and recorded.
pub struct RecordableAction {
    name: String,

    behaviour: Box<dyn Behaviour>,

    mode: RunMode,

    /// Time since `begin`
    clock: Stopwatch,

    /// Recorder time at `begin`, live mode only
    start_offset_s: f64,

    state: ActionState,
}

/// Runs a `RecordableAction` on its own periodic task.
pub struct ActionRunner {
    name: String,

    action: Arc<Mutex<RecordableAction>>,

    task: Option<PeriodicTask>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// How a `RecordableAction` is run.
#[derive(Clone)]
pub enum RunMode {
    /// Driven by an operator, the run is recorded into the recorder.
    Live { recorder: Arc<ActionRecorder> },

    /// Replayed, ends after `timeout_s` and records nothing.
    Playback { timeout_s: f64 },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ActionState {
    Idle,
    Running,
    Ended,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a behaviour factory under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Behaviour> + Send + Sync + 'static,
    {
        if self
            .factories
            .insert(name.to_string(), Arc::new(factory))
            .is_some()
        {
            warn!("Behaviour \"{}\" registered twice, keeping the latest", name);
        }
    }

    pub fn resolve(&self, name: &str) -> Option<BehaviourFactory> {
        self.factories.get(name).cloned()
    }

    /// Create a new behaviour for `name`.
    pub fn create(&self, name: &str) -> Option<Box<dyn Behaviour>> {
        self.factories.get(name).map(|f| f())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl RecordableAction {
    /// Create an action which records itself into `recorder` when it ends.
    pub fn live(name: &str, behaviour: Box<dyn Behaviour>, recorder: Arc<ActionRecorder>) -> Self {
        Self::new(name, behaviour, RunMode::Live { recorder })
    }

    /// Create an action which ends `timeout_s` after it begins.
    pub fn playback(name: &str, behaviour: Box<dyn Behaviour>, timeout_s: f64) -> Self {
        Self::new(name, behaviour, RunMode::Playback { timeout_s })
    }

    pub fn new(name: &str, behaviour: Box<dyn Behaviour>, mode: RunMode) -> Self {
        Self {
            name: name.to_string(),
            behaviour,
            mode,
            clock: Stopwatch::new(),
            start_offset_s: 0.0,
            state: ActionState::Idle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> &RunMode {
        &self.mode
    }

    /// Start the action. Does nothing if it already started.
    pub fn begin(&mut self) {
        if self.state != ActionState::Idle {
            return;
        }

        if let RunMode::Live { ref recorder } = self.mode {
            self.start_offset_s = recorder.elapsed_s();
        }

        self.behaviour.init();
        self.clock.start();
        self.state = ActionState::Running;

        info!("{} started", self.name);
    }

    /// Run the behaviour once, ending the action if it is finished.
    ///
    /// Returns `true` once the action has ended.
    pub fn poll(&mut self) -> bool {
        if self.state != ActionState::Running {
            return self.state == ActionState::Ended;
        }

        self.behaviour.exec();

        let finished = match self.mode {
            RunMode::Playback { timeout_s } => self.clock.elapsed_s() >= timeout_s,
            RunMode::Live { .. } => self.behaviour.is_finished(),
        };

        if finished {
            self.end();
        }

        finished
    }

    /// End the action. Ending an action which isn't running does nothing.
    pub fn end(&mut self) {
        if self.state != ActionState::Running {
            return;
        }

        self.behaviour.end();
        self.clock.stop();
        self.state = ActionState::Ended;

        info!("{} ended after {:.3} s", self.name, self.clock.elapsed_s());

        if let RunMode::Live { ref recorder } = self.mode {
            let action = Action::new(&self.name, self.start_offset_s, recorder.elapsed_s());
            if let Err(e) = recorder.add_action(action) {
                error!("Could not record {}: {}", self.name, e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == ActionState::Running
    }

    pub fn is_ended(&self) -> bool {
        self.state == ActionState::Ended
    }
}

impl ActionRunner {
    /// Begin the action and poll it every `period` until it ends.
    pub fn spawn(mut action: RecordableAction, period: Duration) -> Result<Self, ActionError> {
        let name = action.name().to_string();
        action.begin();

        let action = Arc::new(Mutex::new(action));
        let a = action.clone();

        let task = PeriodicTask::spawn(&format!("action_{}", name), period, move || {
            match a.lock() {
                Ok(mut a) => {
                    if a.poll() {
                        TaskFlow::Stop
                    } else {
                        TaskFlow::Continue
                    }
                }
                Err(_) => TaskFlow::Stop,
            }
        });

        let task = match task {
            Ok(t) => t,
            Err(e) => {
                if let Ok(mut a) = action.lock() {
                    a.end();
                }
                return Err(ActionError::TaskError(e));
            }
        };

        Ok(Self {
            name,
            action,
            task: Some(task),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` once the action has ended.
    pub fn is_finished(&self) -> bool {
        match self.action.lock() {
            Ok(a) => a.is_ended(),
            Err(_) => true,
        }
    }

    /// Stop polling and end the action if it is still running.
    pub fn stop(&mut self) {
        if let Some(mut t) = self.task.take() {
            t.stop();
        }

        match self.action.lock() {
            Ok(mut a) => a.end(),
            Err(poisoned) => poisoned.into_inner().end(),
        }
    }
}

impl Drop for ActionRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls to each behaviour hook.
    #[derive(Default)]
    pub(crate) struct Counters {
        pub init: AtomicUsize,
        pub exec: AtomicUsize,
        pub end: AtomicUsize,
    }

    pub(crate) struct CountingBehaviour {
        pub counters: Arc<Counters>,
        pub finish_after: Option<usize>,
    }

    impl Behaviour for CountingBehaviour {
        fn init(&mut self) {
            self.counters.init.fetch_add(1, Ordering::SeqCst);
        }

        fn exec(&mut self) {
            self.counters.exec.fetch_add(1, Ordering::SeqCst);
        }

        fn end(&mut self) {
            self.counters.end.fetch_add(1, Ordering::SeqCst);
        }

        fn is_finished(&self) -> bool {
            match self.finish_after {
                Some(n) => self.counters.exec.load(Ordering::SeqCst) >= n,
                None => false,
            }
        }
    }

    /// Registry with a counting behaviour registered under each name.
    pub(crate) fn counting_registry(names: &[&str]) -> (ActionRegistry, Vec<Arc<Counters>>) {
        let mut registry = ActionRegistry::new();
        let mut all = Vec::new();

        for name in names {
            let counters = Arc::new(Counters::default());
            let c = counters.clone();
            registry.register(name, move || -> Box<dyn Behaviour> {
                Box::new(CountingBehaviour {
                    counters: c.clone(),
                    finish_after: None,
                })
            });
            all.push(counters);
        }

        (registry, all)
    }

    #[test]
    fn test_registry() {
        let (registry, counters) = counting_registry(&["Intake", "Launch"]);

        assert!(registry.contains("Intake"));
        assert!(registry.resolve("Missing").is_none());
        assert_eq!(registry.names(), vec!["Intake", "Launch"]);

        let mut b = registry.create("Launch").unwrap();
        b.exec();
        assert_eq!(counters[1].exec.load(Ordering::SeqCst), 1);
        assert_eq!(counters[0].exec.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_playback_times_out() {
        let counters = Arc::new(Counters::default());
        let behaviour = CountingBehaviour {
            counters: counters.clone(),
            // Live end condition is ignored in playback
            finish_after: Some(1),
        };

        let mut action = RecordableAction::playback("Intake", Box::new(behaviour), 0.05);
        assert!(!action.poll());
        assert_eq!(counters.exec.load(Ordering::SeqCst), 0);

        action.begin();
        action.begin();
        assert_eq!(counters.init.load(Ordering::SeqCst), 1);

        assert!(!action.poll());
        assert!(!action.poll());
        std::thread::sleep(Duration::from_millis(60));
        assert!(action.poll());
        assert!(action.is_ended());

        // Further polls and ends do nothing
        assert!(action.poll());
        action.end();
        assert_eq!(counters.exec.load(Ordering::SeqCst), 3);
        assert_eq!(counters.end.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_runner_ends_on_timeout() {
        let (registry, counters) = counting_registry(&["Intake"]);
        let action = RecordableAction::playback("Intake", registry.create("Intake").unwrap(), 0.02);

        let runner = ActionRunner::spawn(action, Duration::from_millis(2)).unwrap();
        assert_eq!(runner.name(), "Intake");
        assert_eq!(counters[0].init.load(Ordering::SeqCst), 1);

        let start = std::time::Instant::now();
        while !runner.is_finished() {
            assert!(start.elapsed() < Duration::from_secs(5));
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(counters[0].end.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_runner_stop_ends_action() {
        let (registry, counters) = counting_registry(&["Intake"]);
        let action = RecordableAction::playback("Intake", registry.create("Intake").unwrap(), 60.0);

        let mut runner = ActionRunner::spawn(action, Duration::from_millis(2)).unwrap();
        std::thread::sleep(Duration::from_millis(10));
        assert!(!runner.is_finished());

        runner.stop();
        assert!(runner.is_finished());
        drop(runner);
        assert_eq!(counters[0].end.load(Ordering::SeqCst), 1);
    }
}
