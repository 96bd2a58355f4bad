use log::{error, info, log_enabled, warn, Level, LevelFilter};

/// Initializes the logger with the `env_logger` crate.
///
/// The level is taken from `RUST_LOG`.
pub fn init_logger() {
    env_logger::init();
}

/// Initializes the logger with a level derived from a verbosity count.
///
/// `RUST_LOG` still overrides the derived level when set.
/// 0 maps to warnings, 1 to info, 2 to debug, 3 and above to trace.
pub fn init_logger_with_verbosity(verbosity: u8) {
    env_logger::Builder::new()
        .filter_level(verbosity_filter(verbosity))
        .parse_default_env()
        .init();
}

/// Maps a `-v` count to a level filter.
pub fn verbosity_filter(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Logs an error message.
pub fn log_error(message: &str) {
    if log_enabled!(Level::Error) {
        error!("{message}");
    }
}

/// Logs a warning message.
pub fn log_warn(message: &str) {
    if log_enabled!(Level::Warn) {
        warn!("{message}");
    }
}

/// Logs an informational message.
pub fn log_info(message: &str) {
    if log_enabled!(Level::Info) {
        info!("{message}");
    }
}
