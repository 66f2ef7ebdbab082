//! clreduce CLI library
//!
//! Argument parsing, presentation and batch drivers behind the `clreduce`
//! binary.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

mod commands;
mod config;
mod error;
mod output;
mod runner;

pub use commands::{
    CheckArgs, Cli, ColorArg, Commands, ConfigArgs, ConfigFormat, EmulatorModeArg, ExecutionArgs,
    ReduceWorkSizesArgs, StripLineMarkersArgs, TestArgs,
};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, ProgressReporter};
pub use runner::{
    collect_test_cases, exit_status, natural_cmp, read_exclusions, reduce_all, CaseOutcome,
    CheckReport, CheckRunner, ReductionSummary,
};
