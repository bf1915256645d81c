//! CLI module for toolhost - command-line interface and subcommands.
//!
//! Provides discovery and loading of tool configs plus session housekeeping.

pub mod commands;

pub use commands::Cli;
