//! Main replay executable entry point.
//!
//! # Architecture
//!
//! The executable drives simulated drivetrain actuators in one of two modes:
//!
//!     - `record` - A synthetic operator demand drives the actuators while the
//!       recorder samples them and a scripted live action runs. The profile
//!       and action list are written to CSV files.
//!     - `play` - The profile and action list are loaded and replayed as an
//!       auto routine until it finishes or stalls.
//!
//! Both modes run a fixed-period main loop, the recording and streaming work
//! itself happens on the library's own periodic tasks.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use structopt::StructOpt;

// Internal
use replay_lib::{
    actions::{
        ActionError, ActionList, ActionListParser, ActionRecorder, ActionRegistry, Behaviour,
        RecordableAction,
    },
    eqpt::{BufferStatus, SensorSource, SimActuator, SimHandle},
    params::ReplayExecParams,
    profile::{ProfileParser, ProfileParserError, Recorder},
    routine::{AutoRoutine, RecordSession},
    traj_stream::ChannelBinding,
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    rows::CsvFile,
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Name of the scripted action fired while recording.
const DEMO_ACTION: &str = "Intake";

/// Number of cycles the demo action runs for when driven live.
const DEMO_ACTION_CYCLES: u32 = 50;

/// Time into the recording the demo action is started.
const DEMO_ACTION_START_S: f64 = 1.0;

/// Time the synthetic operator waits before moving.
const LEAD_IN_S: f64 = 0.5;

/// Peak velocity demand of the synthetic operator.
const DEMAND_AMPLITUDE: f64 = 400.0;

/// Period of the synthetic operator demand.
const DEMAND_PERIOD_S: f64 = 4.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(
    name = "replay_exec",
    about = "Record and replay drivetrain profiles and timed actions"
)]
enum Cli {
    /// Record a profile and action list from a synthetic operator run.
    #[structopt(name = "record")]
    Record {
        /// Profile file to write
        profile: PathBuf,

        /// Action list file to write
        actions: PathBuf,

        /// Length of the recording in seconds
        #[structopt(long = "duration-s", default_value = "5.0")]
        duration_s: f64,
    },

    /// Replay a profile and, optionally, an action list.
    #[structopt(name = "play")]
    Play {
        /// Profile file to replay
        profile: PathBuf,

        /// Action list file to replay
        actions: Option<PathBuf>,
    },
}

/// Demo behaviour standing in for an intake mechanism.
struct IntakeBehaviour {
    cycles: u32,

    run_cycles: u32,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    let cli = Cli::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let tag = match cli {
        Cli::Record { .. } => "record",
        Cli::Play { .. } => "play",
    };
    let session =
        Session::new("replay_exec", tag, "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Replay Executable\n");
    info!("Running on: {}", host::get_host_info());
    info!("Session directory: {:?}\n", session.session_root);
    debug!("CLI arguments: {:?}", cli);

    // ---- LOAD PARAMETERS ----

    let params: ReplayExecParams =
        util::params::load("replay_exec.toml").wrap_err("Could not load exec params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE EQUIPMENT ----

    let sims: Vec<SimActuator> = params
        .channels
        .iter()
        .map(|c| SimActuator::new(&c.name, &params.sim))
        .collect();

    info!("{} simulated channels initialised", sims.len());

    let registry = Arc::new(demo_registry());

    // ---- RUN ----

    match cli {
        Cli::Record {
            profile,
            actions,
            duration_s,
        } => record(
            &params, &session, &sims, registry, &profile, &actions, duration_s,
        )?,
        Cli::Play { profile, actions } => {
            play(&params, &sims, &registry, &profile, actions.as_deref())?
        }
    }

    // ---- SHUTDOWN ----

    info!("End of execution");

    Ok(())
}

/// Record a synthetic operator run into the profile and action files.
fn record(
    params: &ReplayExecParams,
    run_session: &Session,
    sims: &[SimActuator],
    registry: Arc<ActionRegistry>,
    profile_path: &Path,
    actions_path: &Path,
    duration_s: f64,
) -> Result<(), Report> {
    let sources: Vec<Box<dyn SensorSource>> = sims
        .iter()
        .map(|s| Box::new(s.clone()) as Box<dyn SensorSource>)
        .collect();
    let handles: Vec<SimHandle> = sims.iter().map(|s| s.handle()).collect();

    let mut session = RecordSession::new(
        Recorder::new(sources, params.recorder.clone()),
        Arc::new(ActionRecorder::new(
            registry.clone(),
            params.actions.poll_period_ms,
        )),
    );

    session.begin().wrap_err("Failed to begin recording")?;
    info!("Recording for {:.02} s", duration_s);

    let mut live_action: Option<RecordableAction> = None;
    let mut action_fired = false;
    let start = Instant::now();

    loop {
        let cycle_start_instant = Instant::now();
        let t = start.elapsed().as_secs_f64();

        if t >= duration_s {
            break;
        }

        // ---- SYNTHETIC OPERATOR ----

        let demand = operator_demand(t);
        for (i, h) in handles.iter().enumerate() {
            // Right side slightly slower so the profile turns
            let scale = if i % 2 == 0 { 1.0 } else { 0.9 };
            h.set_demand_velocity(demand * scale);
            h.step(params.cycle_period_s * 1000.0);
        }

        // ---- LIVE ACTION ----

        if !action_fired && t >= DEMO_ACTION_START_S {
            match registry.create(DEMO_ACTION) {
                Some(b) => {
                    let mut a =
                        RecordableAction::live(DEMO_ACTION, b, session.action_recorder().clone());
                    a.begin();
                    live_action = Some(a);
                }
                None => warn!("Demo action \"{}\" is not registered", DEMO_ACTION),
            }
            action_fired = true;
        }

        if let Some(ref mut a) = live_action {
            if a.poll() {
                live_action = None;
            }
        }

        cycle_sleep(cycle_start_instant, params.cycle_period_s);
    }

    // End the action if the recording finished first
    if let Some(mut a) = live_action.take() {
        a.end();
    }

    let (recording, actions) = session.end().wrap_err("Failed to end recording")?;
    let profile = recording.into_profile();

    info!(
        "Recorded profile of {} points on {} channels, {} actions",
        profile.length(),
        profile.num_channels(),
        actions.len()
    );

    // ---- WRITE FILES ----

    // A copy of each file is also kept in the session directory
    let profile_stores = vec![
        resolve_store(profile_path, params)?,
        CsvFile::new(run_session.artefact_path("profile.csv")?),
    ];
    for store in profile_stores {
        match ProfileParser::new(store.clone()).write(&profile) {
            Ok(()) => info!("Profile written to {:?}", store.path()),
            Err(ProfileParserError::EmptyProfile) => {
                warn!("Recorded profile is empty, not written");
                break;
            }
            Err(e) => return Err(e).wrap_err("Failed to write the profile"),
        }
    }

    let actions_stores = vec![
        resolve_store(actions_path, params)?,
        CsvFile::new(run_session.artefact_path("actions.csv")?),
    ];
    for store in actions_stores {
        match ActionListParser::new(store.clone()).write(&actions) {
            Ok(()) => info!("Action list written to {:?}", store.path()),
            Err(ActionError::EmptyList) => {
                warn!("No actions recorded, not written");
                break;
            }
            Err(e) => return Err(e).wrap_err("Failed to write the action list"),
        }
    }

    Ok(())
}

/// Replay a profile and action list on the simulated channels.
fn play(
    params: &ReplayExecParams,
    sims: &[SimActuator],
    registry: &ActionRegistry,
    profile_path: &Path,
    actions_path: Option<&Path>,
) -> Result<(), Report> {
    // ---- LOAD ----

    let mut profile =
        ProfileParser::new(resolve_store(profile_path, params)?).load_or_empty(params.recorder.dt_ms);

    let poll_period_ms = params.actions.poll_period_ms;
    let actions = match actions_path {
        Some(p) => {
            ActionListParser::new(resolve_store(p, params)?).load_or_empty(registry, poll_period_ms)
        }
        None => ActionList::empty(poll_period_ms),
    };

    info!(
        "Loaded profile of {} points ({} ms per point) and {} actions",
        profile.length(),
        profile.dt_ms(),
        actions.len()
    );

    // ---- BIND ----

    if !profile.is_empty() {
        if profile.num_channels() != sims.len() {
            return Err(eyre!(
                "Profile has {} channels but {} are configured",
                profile.num_channels(),
                sims.len()
            ));
        }

        let bindings = sims
            .iter()
            .zip(params.channels.iter())
            .map(|(s, c)| ChannelBinding::new(Box::new(s.clone()), c.gain_slot))
            .collect();

        profile
            .bind(bindings, &params.stream)
            .wrap_err("Failed to bind the profile")?;
    }

    // ---- REPLAY ----

    let mut routine = AutoRoutine::new(profile, actions);
    routine.begin().wrap_err("Failed to begin the auto routine")?;

    let mut last_progress: Vec<(usize, BufferStatus)> = Vec::new();
    let mut last_progress_instant = Instant::now();

    loop {
        let cycle_start_instant = Instant::now();

        if routine.poll() {
            break;
        }

        if let Some(report) = routine.status() {
            for c in report.channels.iter() {
                debug!(
                    "{} [{}]: {}/{} pushed, staging {}, execution {}, active {} last {}",
                    c.name,
                    report.state,
                    c.next_index,
                    c.length,
                    c.buffer.staging_count,
                    c.buffer.execution_count,
                    c.buffer.active_point_valid,
                    c.buffer.active_is_last
                );
            }

            if let Some(ref f) = report.fault {
                warn!("Stream fault: {}", f);
            }

            let progress: Vec<(usize, BufferStatus)> = report
                .channels
                .iter()
                .map(|c| (c.next_index, c.buffer))
                .collect();

            if progress != last_progress {
                last_progress = progress;
                last_progress_instant = Instant::now();
            }
        }

        if last_progress_instant.elapsed().as_secs_f64() > params.stall_timeout_s {
            warn!(
                "No playback progress for {:.01} s, cancelling",
                params.stall_timeout_s
            );
            routine.cancel();
            break;
        }

        cycle_sleep(cycle_start_instant, params.cycle_period_s);
    }

    routine.end();
    info!("Auto routine {:?}", routine.state());

    Ok(())
}

/// Velocity demand of the synthetic operator at time `t`.
fn operator_demand(t: f64) -> f64 {
    if t < LEAD_IN_S {
        0.0
    } else {
        DEMAND_AMPLITUDE * (2.0 * std::f64::consts::PI * (t - LEAD_IN_S) / DEMAND_PERIOD_S).sin()
    }
}

/// Get the store for a file, bare file names are placed in the store
/// directory.
fn resolve_store(path: &Path, params: &ReplayExecParams) -> Result<CsvFile, Report> {
    let is_bare = path
        .parent()
        .map(|p| p.as_os_str().is_empty())
        .unwrap_or(true);

    if is_bare {
        let root = host::get_replay_sw_root().wrap_err("Software root is not set")?;
        Ok(CsvFile::in_dir(
            root.join(&params.store_dir),
            &path.to_string_lossy(),
        ))
    } else {
        Ok(CsvFile::new(path))
    }
}

/// Sleep for the rest of the cycle.
fn cycle_sleep(cycle_start_instant: Instant, cycle_period_s: f64) {
    let cycle_dur = Instant::now() - cycle_start_instant;

    // Get sleep duration
    match Duration::from_secs_f64(cycle_period_s).checked_sub(cycle_dur) {
        Some(d) => thread::sleep(d),
        None => warn!(
            "Cycle overran by {:.06} s",
            cycle_dur.as_secs_f64() - cycle_period_s
        ),
    }
}

/// Registry of the behaviours this executable can replay.
fn demo_registry() -> ActionRegistry {
    let mut registry = ActionRegistry::new();

    registry.register(DEMO_ACTION, || -> Box<dyn Behaviour> {
        Box::new(IntakeBehaviour {
            cycles: 0,
            run_cycles: DEMO_ACTION_CYCLES,
        })
    });

    registry
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Behaviour for IntakeBehaviour {
    fn init(&mut self) {
        self.cycles = 0;
        info!("Intake on");
    }

    fn exec(&mut self) {
        self.cycles += 1;
    }

    fn end(&mut self) {
        info!("Intake off after {} cycles", self.cycles);
    }

    fn is_finished(&self) -> bool {
        self.cycles >= self.run_cycles
    }
}
