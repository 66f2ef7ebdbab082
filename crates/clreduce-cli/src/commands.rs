//! CLI command definitions using clap

use crate::error::{CliError, CliResult};
use clap::{Args, Parser, Subcommand, ValueEnum};
use clreduce::config::keys;
use clreduce::{EmulatorMode, ExecutionConfig, OptionValue, Options};
use std::path::PathBuf;

/// clreduce: interestingness tests for OpenCL wrong-code reduction
#[derive(Parser, Debug)]
#[command(name = "clreduce")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Interestingness test for C-Reduce (exit 0 when interesting, 1 otherwise)
    Test(TestArgs),

    /// Evaluate test cases and report a verdict for each
    Check(CheckArgs),

    /// Shrink the work sizes in test case headers
    ReduceWorkSizes(ReduceWorkSizesArgs),

    /// Remove preprocessor line markers from test cases
    StripLineMarkers(StripLineMarkersArgs),

    /// Show the resolved execution configuration
    Config(ConfigArgs),
}

/// Execution options, each overridable by its environment variable
#[derive(Args, Debug, Clone, Default)]
pub struct ExecutionArgs {
    /// Launcher binary
    #[arg(long, env = "CREDUCE_TEST_CL_LAUNCHER")]
    pub cl_launcher: Option<String>,

    /// Compiler used by the static checks
    #[arg(long, env = "CREDUCE_TEST_CLANG")]
    pub clang: Option<String>,

    /// Emulator binary
    #[arg(long, env = "CREDUCE_TEST_OCLGRIND")]
    pub oclgrind: Option<String>,

    /// Include path for libclc headers
    #[arg(long, env = "CREDUCE_LIBCLC_INCLUDE_PATH")]
    pub libclc_include_path: Option<String>,

    /// Target platform index
    #[arg(long, env = "CREDUCE_TEST_PLATFORM")]
    pub platform: Option<String>,

    /// Target device index
    #[arg(long, env = "CREDUCE_TEST_DEVICE")]
    pub device: Option<String>,

    /// Emulator platform index
    #[arg(long, env = "CREDUCE_TEST_OCLGRIND_PLATFORM")]
    pub oclgrind_platform: Option<String>,

    /// Emulator device index
    #[arg(long, env = "CREDUCE_TEST_OCLGRIND_DEVICE")]
    pub oclgrind_device: Option<String>,

    /// Per-invocation timeout in seconds
    #[arg(long, env = "CREDUCE_TEST_TIMEOUT")]
    pub timeout: Option<String>,

    /// Enforce header, result-access and index checks (1/0, true/false)
    #[arg(long, env = "CREDUCE_TEST_CONSERVATIVE")]
    pub conservative: Option<String>,

    /// Run the compiler and analyzer gate (1/0, true/false)
    #[arg(long = "static", env = "CREDUCE_TEST_STATIC")]
    pub static_checks: Option<String>,

    /// Compare against the emulator reference (1/0, true/false)
    #[arg(long, env = "CREDUCE_TEST_USE_ORACLE")]
    pub use_oracle: Option<String>,

    /// optimised, unoptimised, either or all
    #[arg(long, env = "CREDUCE_TEST_OPTIMISATION_LEVEL")]
    pub optimisation_level: Option<String>,

    /// How the emulator is attached to the launcher
    #[arg(long, value_enum)]
    pub emulator_mode: Option<EmulatorModeArg>,
}

impl ExecutionArgs {
    /// The flat option mapping these arguments describe
    #[must_use]
    pub fn options(&self) -> Options {
        [
            (keys::CL_LAUNCHER, &self.cl_launcher),
            (keys::CLANG, &self.clang),
            (keys::OCLGRIND, &self.oclgrind),
            (keys::LIBCLC_INCLUDE_PATH, &self.libclc_include_path),
            (keys::PLATFORM, &self.platform),
            (keys::DEVICE, &self.device),
            (keys::OCLGRIND_PLATFORM, &self.oclgrind_platform),
            (keys::OCLGRIND_DEVICE, &self.oclgrind_device),
            (keys::TIMEOUT, &self.timeout),
            (keys::CONSERVATIVE, &self.conservative),
            (keys::STATIC_CHECKS, &self.static_checks),
            (keys::USE_ORACLE, &self.use_oracle),
            (keys::OPTIMISATION_LEVEL, &self.optimisation_level),
        ]
        .into_iter()
        .filter_map(|(key, value)| {
            value
                .as_ref()
                .map(|v| (key.to_string(), OptionValue::from(v.as_str())))
        })
        .collect()
    }

    /// Resolve the execution configuration
    pub fn resolve(&self) -> CliResult<ExecutionConfig> {
        let config = ExecutionConfig::from_options(&self.options())
            .map_err(|e| CliError::config(e.to_string()))?;
        Ok(match self.emulator_mode {
            Some(mode) => config.with_emulator_mode(mode.into()),
            None => config,
        })
    }
}

/// Arguments for the test command
#[derive(Args, Debug)]
pub struct TestArgs {
    /// Test case to evaluate
    #[arg(env = "CREDUCE_TEST_CASE")]
    pub file: Option<PathBuf>,

    /// Execution options
    #[command(flatten)]
    pub execution: ExecutionArgs,
}

/// Arguments for the check command
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Test cases to evaluate
    pub files: Vec<PathBuf>,

    /// Also evaluate every *.cl file in this directory
    #[arg(long)]
    pub test_case_dir: Option<PathBuf>,

    /// File listing test case names to skip, one per line
    #[arg(long)]
    pub exclude_file: Option<PathBuf>,

    /// Delete test cases that are not interesting
    #[arg(long)]
    pub delete: bool,

    /// Append the name of every evaluated test case to this file
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Execution options
    #[command(flatten)]
    pub execution: ExecutionArgs,
}

/// Arguments for the reduce-work-sizes command
#[derive(Args, Debug)]
pub struct ReduceWorkSizesArgs {
    /// Test cases to rewrite
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Set 1,1,1 sizes without checking interestingness
    #[arg(long)]
    pub unchecked: bool,

    /// Execution options
    #[command(flatten)]
    pub execution: ExecutionArgs,
}

/// Arguments for the strip-line-markers command
#[derive(Args, Debug)]
pub struct StripLineMarkersArgs {
    /// Files to rewrite in place
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// Arguments for the config command
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Output format
    #[arg(long, value_enum, default_value = "json")]
    pub format: ConfigFormat,

    /// Execution options
    #[command(flatten)]
    pub execution: ExecutionArgs,
}

/// Format for printing the configuration
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON
    #[default]
    Json,
    /// YAML
    Yaml,
}

impl From<ConfigFormat> for crate::output::OutputFormat {
    fn from(format: ConfigFormat) -> Self {
        match format {
            ConfigFormat::Json => Self::Json,
            ConfigFormat::Yaml => Self::Yaml,
        }
    }
}

/// Emulator attachment argument
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmulatorModeArg {
    /// Run the launcher under the emulator binary
    Wrapper,
    /// Select the emulator through environment variables
    Environment,
}

impl From<EmulatorModeArg> for EmulatorMode {
    fn from(arg: EmulatorModeArg) -> Self {
        match arg {
            EmulatorModeArg::Wrapper => Self::Wrapper,
            EmulatorModeArg::Environment => Self::Environment,
        }
    }
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
