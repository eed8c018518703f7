//! Command-line interface: argument definitions and subcommand entry points.

mod args;

pub mod compile;
pub mod edit;
pub mod share;

pub use args::{Cli, Commands};
