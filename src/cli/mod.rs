//! Command-line interface
//!
//! `CliArgs` carries the two input files plus the knobs that become a
//! `BatchConfig` and an `EngineConfig`.

mod args;

pub use crate::logging::LogFormat;
pub use args::{CliArgs, StrategyType};

use clap::Parser;

/// Parse the process arguments
///
/// On invalid arguments, missing input files or `--help`, clap prints the
/// message and exits the process.
pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}
