//! # Replay library.
//!
//! Record a human-driven run of the drivetrain actuators and the discrete
//! actions fired during it, then play both back as an autonomous routine.
//!
//! The library is split into the capture side (`profile::Recorder`,
//! `actions::ActionRecorder`) and the replay side (`traj_stream`, which
//! streams a `profile::Profile` into each actuator's onboard buffer, and
//! `actions::ActionList`, which fires recorded actions at their offsets).
//! `routine` ties the two together behind explicit lifecycle calls.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Equipment interfaces - the actuator operations the rest of the library relies on
pub mod eqpt;

/// Motion profiles - recording, post-processing and persistence of trajectories
pub mod profile;

/// Trajectory streaming - feeds profiles into actuator buffers in real time
pub mod traj_stream;

/// Actions - record and replay of discrete timed behaviours
pub mod actions;

/// Routines - record and replay sessions driven by the embedding control loop
pub mod routine;

/// Executable parameters
pub mod params;
