//! The `cdct` command line: publish contracts, verify providers and gate
//! deployments against a broker.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod config;

pub use cli::{Cli, Command};
pub use commands::{Outcome, error_exit_code};
