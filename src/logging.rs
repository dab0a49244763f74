use std::io::Write;

use log::{debug, error, info, warn};

/// Initializes the logger with the `env_logger` crate.
///
/// Defaults to `info` when `RUST_LOG` is unset; the timestamp is trimmed
/// to seconds because the bridge logs per-frame, not per-byte.
pub fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:<5} {}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

/// Logs an error message.
pub fn log_error(message: &str) {
    error!("{message}");
}

/// Logs a warning message.
pub fn log_warn(message: &str) {
    warn!("{message}");
}

/// Logs an informational message.
pub fn log_info(message: &str) {
    info!("{message}");
}

/// Logs a debug message.
pub fn log_debug(message: &str) {
    debug!("{message}");
}
