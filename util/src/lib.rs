//! Utility library for the replay software

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod host;
pub mod logger;
pub mod params;
pub mod rows;
pub mod session;
pub mod task;
pub mod time;
