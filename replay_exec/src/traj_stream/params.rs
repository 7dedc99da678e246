//! Parameters for the trajectory stream engine

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct StreamParams {
    /// Number of points every channel's staging buffer must strictly exceed
    /// before execution is enabled.
    pub min_points: usize,

    /// Period of the management task (fill, poll, evaluate).
    ///
    /// Units: milliseconds
    pub mgmt_period_ms: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for StreamParams {
    fn default() -> Self {
        Self {
            min_points: 5,
            mgmt_period_ms: 25.0,
        }
    }
}
