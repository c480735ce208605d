//! StatusLink probe library
//!
//! Connects the realtime client to a live project from a desktop, joins one
//! channel and prints what arrives. Useful for checking project credentials,
//! channel policies and row filters before flashing a device.

pub mod cli;
pub mod config;
pub mod error;
pub mod probe;

pub use cli::{Cli, ProbeMode};
pub use config::{ProbeConfig, ProbeSettings};
pub use error::{CliError, Result};
pub use probe::{run, HostMemory, ProbeSummary};
