//! Logger setup for replay executables.
//!
//! Libraries only use the `log` macros. An executable calls [`logger_init`]
//! once, after opening its [`Session`](crate::session::Session), and every
//! record is then written both to stdout (coloured) and to the session log.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use colored::{ColoredString, Colorize};
use log::info;
use thiserror::Error;

// Internal imports
use crate::session::{self, Session};

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Dependencies whose chatter is capped at `Warn` whatever the run level.
const QUIET_TARGETS: &[&str] = &["csv"];

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Minimum log level must be at least INFO, got {0}")]
    LevelTooHigh(LevelFilter),

    #[error("Could not open the session log file: {0}")]
    LogFile(std::io::Error),

    #[error("Could not install the logger: {0}")]
    Install(log::SetLoggerError),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Install the process logger.
///
/// `min_level` may not hide `Info` records. At `Debug` and `Trace` each line
/// also carries the target and thread name, since the streaming and polling
/// tasks log from their own threads.
pub fn logger_init(min_level: LevelFilter, session: &Session) -> Result<(), LoggerInitError> {
    if min_level < LevelFilter::Info {
        return Err(LoggerInitError::LevelTooHigh(min_level));
    }

    let log_file =
        fern::log_file(&session.log_file_path).map_err(LoggerInitError::LogFile)?;

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            let t = session::get_elapsed_seconds();
            let level = level_tag(record.level());

            if record.level() <= log::Level::Info {
                out.finish(format_args!("[{:10.6} {}] {}", t, level, message))
            } else {
                out.finish(format_args!(
                    "[{:10.6} {}] {} <{}> {}",
                    t,
                    level,
                    record.target(),
                    std::thread::current().name().unwrap_or("-"),
                    message
                ))
            }
        })
        .level(min_level);

    for target in QUIET_TARGETS {
        dispatch = dispatch.level_for(*target, LevelFilter::Warn);
    }

    dispatch
        .chain(std::io::stdout())
        .chain(log_file)
        .apply()
        .map_err(LoggerInitError::Install)?;

    info!("Logger ready ({} session)", session.tag);
    if let Some(e) = session::epoch() {
        info!("    epoch: {}", e);
    }
    info!("    level: {}", min_level);
    info!("    file:  {:?}", session.log_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn level_tag(level: log::Level) -> ColoredString {
    match level {
        log::Level::Error => "ERR".red().bold(),
        log::Level::Warn => "WRN".yellow(),
        log::Level::Info => "INF".normal(),
        log::Level::Debug => "DBG".dimmed(),
        log::Level::Trace => "TRC".dimmed().italic(),
    }
}
