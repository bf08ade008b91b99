//! kv-probe: connectivity check for Redis-compatible key-value stores
//!
//! Connects with the configured host/port/credentials, checks liveness
//! with PING, writes one key and reads it back, then prints a short
//! report on stdout. Logs go to stderr.
//!
//! Configuration via CLI arguments, `REDIS_*` environment variables or a
//! TOML file.

mod client;
mod config;
mod error;
mod probe;
mod protocols;
#[cfg(test)]
mod testing;

use config::Config;
use std::io;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    debug!(
        address = %config.connection.address(),
        key = %config.key,
        decode_responses = config.connection.decode_responses,
        cleanup = config.cleanup,
        "Starting kv-probe"
    );

    let outcome = probe::run(&config);
    outcome.write_report(&mut io::stdout().lock(), &config)?;

    if config.strict && !outcome.is_success() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
