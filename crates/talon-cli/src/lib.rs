//! # talon-cli
//!
//! Command-line interface for the Talon skill runtime.
//!
//! ## Commands
//!
//! - `talon skills list|search|run|reload`: inspect and invoke skills
//! - `talon jobs list|delete|pause|resume`: manage scheduled jobs
//! - `talon serve`: run the scheduler loop until Ctrl-C

pub mod commands;

pub use commands::Cli;
