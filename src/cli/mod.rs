//! Command-line interface for sshbox.
//!
//! Provides commands for running the service, applying database migrations,
//! registering owners and listing the provisionable images.

mod commands;

pub use commands::{parse_cli, parse_owner_spec, run, run_with_cli, Cli, Commands};
