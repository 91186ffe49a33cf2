//! Logger bootstrap

use std::path::Path;

/// Initialise log4rs from `config_file`. When the file is missing or
/// invalid, fall back to env_logger so the process still logs.
pub fn init_logging(config_file: &str) {
    if Path::new(config_file).exists() {
        match log4rs::init_file(config_file, Default::default()) {
            Ok(()) => {
                log::info!("Logging configured from {}", config_file);
                return;
            }
            Err(e) => eprintln!("Failed to load log config {}: {}, using env_logger", config_file, e),
        }
    }

    let initialised = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
    if initialised.is_ok() {
        log::warn!("Log config {} not usable, logging to stderr", config_file);
    }
}
