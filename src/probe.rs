//! End-to-end connectivity check.
//!
//! The sequence is strictly linear: connect (and authenticate), PING, SET,
//! GET, optionally DEL. The first failure ends the run and becomes the
//! outcome; nothing is retried.

use crate::client::{Client, Value};
use crate::config::Config;
use crate::error::{ClientError, Result};
use std::io::{self, Write};
use tracing::{debug, info, warn};

/// How a probe run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// PING, SET and GET all succeeded. `value` is `None` if the key was
    /// gone by the time it was read.
    Success { value: Option<Value> },
    /// PING answered with something other than PONG.
    PingRejected { reply: String },
    /// The store refused the credentials.
    AuthenticationFailure,
    /// Anything else: resolution, connect, timeout, protocol or server error.
    ConnectionFailure { details: String },
}

impl ProbeOutcome {
    fn from_error(err: ClientError) -> Self {
        if err.is_auth() {
            return ProbeOutcome::AuthenticationFailure;
        }
        let details = err.to_string();
        ProbeOutcome::ConnectionFailure {
            details: if details.is_empty() {
                format!("{err:?}")
            } else {
                details
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success { .. })
    }

    /// Render the operator-facing report.
    pub fn write_report<W: Write>(&self, out: &mut W, config: &Config) -> io::Result<()> {
        match self {
            ProbeOutcome::Success { value } => {
                writeln!(
                    out,
                    "✅ SUCCESS: PONG! Connected to {}.",
                    config.connection.address()
                )?;
                match value {
                    Some(value) => writeln!(out, "   Test Value retrieved: {value}")?,
                    None => writeln!(out, "   Test Value retrieved: (nil)")?,
                }
                if config.cleanup {
                    writeln!(out, "   Test key '{}' removed.", config.key)?;
                }
            }
            ProbeOutcome::PingRejected { reply } => {
                writeln!(out, "❌ ERROR: Ping returned '{reply}' instead of PONG.")?;
            }
            ProbeOutcome::AuthenticationFailure => {
                writeln!(out, "❌ ERROR: Authentication failed. Check password.")?;
            }
            ProbeOutcome::ConnectionFailure { details } => {
                writeln!(out, "❌ ERROR: Could not connect. Details: {details}")?;
            }
        }
        Ok(())
    }
}

/// Connect to the configured store and run the full check.
///
/// The connection is closed before returning, whatever the outcome.
pub fn run(config: &Config) -> ProbeOutcome {
    info!(
        host = %config.connection.host,
        port = config.connection.port,
        auth = config.connection.password.is_some(),
        "Probing store"
    );

    let outcome = match Client::connect(&config.connection) {
        Ok(mut client) => {
            info!(peer = %client.peer(), "Connected");
            let outcome = run_with(&mut client, config);
            client.close();
            outcome
        }
        Err(err) => {
            warn!(error = %err, "Connect failed");
            ProbeOutcome::from_error(err)
        }
    };

    info!(success = outcome.is_success(), "Probe finished");
    outcome
}

/// Run the check over an already-connected client.
pub fn run_with(client: &mut Client, config: &Config) -> ProbeOutcome {
    match round_trip(client, config) {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(error = %err, "Probe failed");
            ProbeOutcome::from_error(err)
        }
    }
}

fn round_trip(client: &mut Client, config: &Config) -> Result<ProbeOutcome> {
    let pong = client.ping()?;
    if !pong.is_pong() {
        warn!(reply = %pong.describe(), "PING not answered with PONG");
        return Ok(ProbeOutcome::PingRejected {
            reply: pong.describe(),
        });
    }

    client.set(&config.key, &config.value)?;
    debug!(key = %config.key, "Value written");

    let value = client.get(&config.key)?;
    debug!(key = %config.key, found = value.is_some(), "Value read back");

    if config.cleanup {
        let removed = client.del(&config.key)?;
        debug!(key = %config.key, removed, "Key deleted");
    }

    Ok(ProbeOutcome::Success { value })
}
