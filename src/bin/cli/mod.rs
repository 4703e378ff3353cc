//! CLI Module Organization
//!
//! - args: argument structures and subcommands
//! - commands: command execution
//! - config_builder: configuration loading
//! - output: tables and summaries printed to the terminal

pub mod args;
pub mod commands;
pub mod config_builder;
pub mod output;

// Re-export commonly used items for convenience
pub use args::*;
pub use commands::*;
