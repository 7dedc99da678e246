//! # Timed actions
//!
//! Actions are discrete named behaviours (running an intake, firing a
//! launcher, ...) recorded with their start and end offsets while an
//! operator drives, then replayed at the same offsets during an autonomous
//! routine.
//!
//! - `ActionRecorder` collects `Action`s from behaviours running in live
//!   mode.
//! - `ActionList` fires each `Action` once its start offset has elapsed,
//!   running the behaviour in playback mode for the recorded duration.
//! - `ActionRegistry` turns stored action names back into behaviours.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod action_list;
mod behaviour;
mod parser;
mod recorder;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use util::{rows::RowStoreError, task::TaskError};

pub use action_list::ActionList;
pub use behaviour::{
    ActionRegistry, ActionRunner, Behaviour, BehaviourFactory, RecordableAction, RunMode,
};
pub use parser::ActionListParser;
pub use recorder::ActionRecorder;

#[cfg(test)]
pub(crate) use behaviour::test::counting_registry;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A named behaviour and the offsets it ran between.
///
/// Offsets are in seconds from the start of the recording, rounded to the
/// nearest millisecond.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    name: String,

    start_time_s: f64,

    end_time_s: f64,
}

/// Parameters of the action scheduler.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionParams {
    /// Period of the list poll and of every running behaviour.
    ///
    /// Units: milliseconds
    pub poll_period_ms: u32,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Invalid action row {0:?}: {1}")]
    InvalidRow(Vec<String>, String),

    #[error("Refusing to write an empty action list")]
    EmptyList,

    #[error("Row store error: {0}")]
    StoreError(#[from] RowStoreError),

    #[error("Could not start an action task: {0}")]
    TaskError(#[from] TaskError),

    #[error("Action state lock is poisoned")]
    LockPoisoned,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Action {
    pub fn new(name: &str, start_time_s: f64, end_time_s: f64) -> Self {
        Self {
            name: name.to_string(),
            start_time_s: round_ms(start_time_s),
            end_time_s: round_ms(end_time_s),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start_time_s(&self) -> f64 {
        self.start_time_s
    }

    pub fn end_time_s(&self) -> f64 {
        self.end_time_s
    }

    /// Time the behaviour ran for when it was recorded.
    pub fn duration_s(&self) -> f64 {
        self.end_time_s - self.start_time_s
    }

    /// Convert into a `[name, start, end]` row.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.start_time_s.to_string(),
            self.end_time_s.to_string(),
        ]
    }

    /// Parse a `[name, start, end]` row.
    pub fn from_row(row: &[String]) -> Result<Self, ActionError> {
        let invalid = |reason: &str| ActionError::InvalidRow(row.to_vec(), reason.to_string());

        if row.len() != 3 {
            return Err(invalid("expected 3 fields"));
        }

        let name = row[0].trim();
        if name.is_empty() {
            return Err(invalid("empty name"));
        }

        let start = row[1]
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid("start time is not a number"))?;
        let end = row[2]
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid("end time is not a number"))?;

        Ok(Self::new(name, start, end))
    }
}

/// Round a time in seconds to the nearest millisecond.
fn round_ms(t: f64) -> f64 {
    (t * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_times_rounded() {
        let a = Action::new("Intake", 1.23449, 2.0006);
        assert_eq!(a.start_time_s(), 1.234);
        assert_eq!(a.end_time_s(), 2.001);
        assert!((a.duration_s() - 0.767).abs() < 1e-9);
    }

    #[test]
    fn test_row_conversion() {
        let a = Action::new("Intake", 0.5, 1.25);
        assert_eq!(a.to_row(), vec!["Intake", "0.5", "1.25"]);

        let row: Vec<String> = vec!["Launch".into(), " 1.0".into(), "2".into()];
        let b = Action::from_row(&row).unwrap();
        assert_eq!(b, Action::new("Launch", 1.0, 2.0));

        for bad in [
            vec!["Launch".to_string(), "1.0".to_string()],
            vec!["".to_string(), "1.0".to_string(), "2.0".to_string()],
            vec!["Launch".to_string(), "x".to_string(), "2.0".to_string()],
        ]
        .iter()
        {
            match Action::from_row(bad) {
                Err(ActionError::InvalidRow(_, _)) => (),
                r => panic!("Expected InvalidRow, got {:?}", r),
            }
        }
    }
}
