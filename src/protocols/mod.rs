//! Wire protocols spoken by the probe.

pub mod resp;
