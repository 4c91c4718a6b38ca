//! CLI for creating and cleaning up on-call rota events
//!
//! This crate provides the `google-rotation-planner` command-line interface.

pub mod cli;
pub mod commands;
pub mod error;

pub use cli::Cli;
pub use error::{CliError, CliResult};
