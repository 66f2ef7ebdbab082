//! Execution backends: the checking emulator and the direct launcher.

use crate::config::{EmulatorMode, ExecutionConfig};
use crate::process::{Invocation, ProcessOutcome, ProcessRunner};
use crate::test_case::TestCase;
use std::fmt;
use tracing::debug;

/// Launcher flag that disables compiler optimisations on the target
pub const DISABLE_OPTS_FLAG: &str = "---disable_opts";

/// Emulator checks for the wrapper launch style
pub const OCLGRIND_FLAGS: &[&str] = &[
    "-Wall",
    "--uninitialized",
    "--data-races",
    "--uniform-writes",
    "--stop-errors",
    "1",
];

/// Emulator checks for the environment launch style
pub const OCLGRIND_ENV: &[(&str, &str)] = &[
    ("OCLGRIND_DIAGNOSTIC_OPTIONS", "-Wall"),
    ("OCLGRIND_UNINITIALIZED", "1"),
    ("OCLGRIND_DATA_RACES", "1"),
    ("OCLGRIND_UNIFORM_WRITES", "1"),
    ("OCLGRIND_STOP_ERRORS", "1"),
];

/// Optimisation state of a launch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Optimisation {
    /// Target compiler optimisations enabled
    Enabled,
    /// Target compiler optimisations disabled
    Disabled,
}

impl Optimisation {
    /// Whether optimisations are enabled
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled)
    }
}

impl fmt::Display for Optimisation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Enabled => "optimised",
            Self::Disabled => "unoptimised",
        })
    }
}

/// Why a launch produced no usable output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchFailure {
    /// The time budget ran out
    TimedOut,
    /// The process could not be started
    CouldNotRun(String),
    /// The process exited unsuccessfully (including checker aborts)
    Failed {
        /// Exit code, `None` when killed by a signal
        exit_code: Option<i32>,
        /// Captured standard error
        stderr: String,
    },
}

impl LaunchFailure {
    /// Whether the failure was a timeout
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

/// Stdout of a successful launch, or why there is none
pub type LaunchResult = Result<String, LaunchFailure>;

fn into_launch_result(outcome: ProcessOutcome) -> LaunchResult {
    match outcome {
        ProcessOutcome::Completed(result) if result.success() => Ok(result.stdout),
        ProcessOutcome::Completed(result) => Err(LaunchFailure::Failed {
            exit_code: result.exit_code,
            stderr: result.stderr,
        }),
        ProcessOutcome::TimedOut => Err(LaunchFailure::TimedOut),
        ProcessOutcome::CouldNotRun(reason) => Err(LaunchFailure::CouldNotRun(reason)),
    }
}

fn launcher_args(platform: u32, device: u32, test_case: &TestCase, opt: Optimisation) -> Vec<String> {
    let mut args = vec![
        "-p".to_string(),
        platform.to_string(),
        "-d".to_string(),
        device.to_string(),
        "-f".to_string(),
        test_case.path_arg(),
    ];
    if !opt.is_enabled() {
        args.push(DISABLE_OPTS_FLAG.to_string());
    }
    args
}

/// Invocation running `test_case` under the checking emulator
#[must_use]
pub fn checked_invocation(config: &ExecutionConfig, test_case: &TestCase, opt: Optimisation) -> Invocation {
    let args = launcher_args(config.oclgrind_platform, config.oclgrind_device, test_case, opt);
    let invocation = match config.emulator_mode {
        EmulatorMode::Wrapper => Invocation::new(&config.oclgrind)
            .args(OCLGRIND_FLAGS.iter().copied())
            .arg(&config.cl_launcher)
            .args(args),
        EmulatorMode::Environment => OCLGRIND_ENV
            .iter()
            .fold(Invocation::new(&config.cl_launcher), |inv, (k, v)| inv.env(*k, *v))
            .args(args),
    };
    invocation.with_timeout(config.timeout())
}

/// Invocation running `test_case` directly on the configured target
#[must_use]
pub fn direct_invocation(config: &ExecutionConfig, test_case: &TestCase, opt: Optimisation) -> Invocation {
    Invocation::new(&config.cl_launcher)
        .args(launcher_args(config.platform, config.device, test_case, opt))
        .with_timeout(config.timeout())
}

/// Runs test cases through the emulator or the launcher
#[derive(Debug)]
pub struct Backends<'a, R: ProcessRunner> {
    runner: &'a R,
    config: &'a ExecutionConfig,
}

impl<'a, R: ProcessRunner> Backends<'a, R> {
    /// Create backends over `runner`
    #[must_use]
    pub const fn new(runner: &'a R, config: &'a ExecutionConfig) -> Self {
        Self { runner, config }
    }

    /// Run under the emulator; any detected violation is a failure
    pub fn run_checked(&self, test_case: &TestCase, opt: Optimisation) -> LaunchResult {
        let result = into_launch_result(
            self.runner
                .run(&checked_invocation(self.config, test_case, opt)),
        );
        debug!(%opt, ok = result.is_ok(), "checked run");
        result
    }

    /// Run directly on the target and return its raw output
    pub fn run_direct(&self, test_case: &TestCase, opt: Optimisation) -> LaunchResult {
        let result = into_launch_result(
            self.runner
                .run(&direct_invocation(self.config, test_case, opt)),
        );
        debug!(%opt, ok = result.is_ok(), "direct run");
        result
    }
}
