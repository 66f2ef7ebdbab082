//! Interestingness oracle for wrong-code bugs.
//!
//! A test case is interesting when the target device computes a different
//! result than a trusted reference. The reference comes from the checking
//! emulator, which must agree with itself across optimisation states; when
//! reference comparison is disabled, the optimised and unoptimised target
//! launches are compared with each other instead.
//!
//! One engine produces a tagged [`Verdict`]. Two dialects read it at the
//! boundary: the strict one keeps every invalid case distinct for
//! diagnosis, the permissive one collapses them to "not interesting" for
//! the delta debugger, which only understands pass and fail.
//!
//! # Example
//!
//! ```no_run
//! use clreduce::{ExecutionConfig, SystemRunner, TestCase, WrongCodeOracle};
//!
//! let oracle = WrongCodeOracle::new(SystemRunner::new(), ExecutionConfig::from_env()?);
//! let verdict = oracle.evaluate(&TestCase::load("CLProg_0.cl")?);
//! println!("{verdict}");
//! # Ok::<(), clreduce::ReduceError>(())
//! ```

use crate::backends::{Backends, LaunchFailure, Optimisation};
use crate::config::{ExecutionConfig, OptimisationLevel};
use crate::process::ProcessRunner;
use crate::result::{ReduceError, ReduceResult};
use crate::test_case::TestCase;
use crate::validators::{self, StaticChecker};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// Evaluation stage that can reject a test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Work-size header and harness structure
    Header,
    /// Compiler and analyzer gate
    Static,
    /// Emulator reference computation
    Reference,
    /// Optimised direct launch
    Optimised,
    /// Unoptimised direct launch
    Unoptimised,
}

impl Stage {
    /// Short name used in diagnostics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Static => "static",
            Self::Reference => "oracle",
            Self::Optimised => "optimised",
            Self::Unoptimised => "unoptimised",
        }
    }

    const fn of_launch(opt: Optimisation) -> Self {
        match opt {
            Optimisation::Enabled => Self::Optimised,
            Optimisation::Disabled => Self::Unoptimised,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a test case could not be evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidTestCase {
    /// Stage that rejected the case
    pub stage: Stage,
    /// Whether the rejection came from an invocation timing out
    pub timed_out: bool,
}

impl InvalidTestCase {
    /// Rejected by a check
    #[must_use]
    pub const fn at(stage: Stage) -> Self {
        Self {
            stage,
            timed_out: false,
        }
    }

    fn from_launch(stage: Stage, failure: &LaunchFailure) -> Self {
        Self {
            stage,
            timed_out: failure.is_timeout(),
        }
    }
}

/// Outcome of one oracle evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The bug reproduces
    Interesting,
    /// The bug does not reproduce
    NotInteresting,
    /// No verdict can be drawn
    Invalid(InvalidTestCase),
}

impl Verdict {
    fn invalid(stage: Stage) -> Self {
        Self::Invalid(InvalidTestCase::at(stage))
    }

    fn from_bool(interesting: bool) -> Self {
        if interesting {
            Self::Interesting
        } else {
            Self::NotInteresting
        }
    }

    /// Permissive reading: invalid cases are not interesting
    #[must_use]
    pub const fn is_interesting(&self) -> bool {
        matches!(self, Self::Interesting)
    }

    /// Strict reading: invalid cases become typed errors
    pub fn into_result(self) -> ReduceResult<bool> {
        match self {
            Self::Interesting => Ok(true),
            Self::NotInteresting => Ok(false),
            Self::Invalid(InvalidTestCase {
                stage,
                timed_out: true,
            }) => Err(ReduceError::Timeout { stage }),
            Self::Invalid(InvalidTestCase { stage, .. }) => {
                Err(ReduceError::InvalidTestCase { stage })
            }
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interesting => f.write_str("interesting"),
            Self::NotInteresting => f.write_str("not interesting"),
            Self::Invalid(InvalidTestCase {
                stage,
                timed_out: true,
            }) => write!(f, "invalid ({stage}, timed out)"),
            Self::Invalid(InvalidTestCase { stage, .. }) => write!(f, "invalid ({stage})"),
        }
    }
}

/// How a verdict is reported as a process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Distinct codes for timeouts and invalid test cases
    Strict,
    /// Only 0 (interesting) and 1 (anything else)
    #[default]
    Permissive,
}

impl Dialect {
    /// Exit code for an interesting case
    pub const INTERESTING: i32 = 0;
    /// Exit code for a case that is not interesting
    pub const NOT_INTERESTING: i32 = 1;
    /// Strict exit code for a timeout
    pub const TIMEOUT: i32 = -1;
    /// Strict exit code for an invalid test case
    pub const INVALID: i32 = -2;

    /// Exit code for `verdict` in this dialect
    #[must_use]
    pub const fn exit_code(self, verdict: &Verdict) -> i32 {
        match (self, verdict) {
            (_, Verdict::Interesting) => Self::INTERESTING,
            (Self::Permissive, _) | (Self::Strict, Verdict::NotInteresting) => {
                Self::NOT_INTERESTING
            }
            (Self::Strict, Verdict::Invalid(InvalidTestCase { timed_out: true, .. })) => {
                Self::TIMEOUT
            }
            (Self::Strict, Verdict::Invalid(_)) => Self::INVALID,
        }
    }
}

/// A predicate the work-size reducer and delta debugger can ask
pub trait InterestingnessTest {
    /// Whether the test case at `path` still shows the bug
    fn is_interesting(&mut self, path: &Path) -> bool;
}

impl<F: FnMut(&Path) -> bool> InterestingnessTest for F {
    fn is_interesting(&mut self, path: &Path) -> bool {
        self(path)
    }
}

/// The wrong-code interestingness oracle
#[derive(Debug)]
pub struct WrongCodeOracle<R: ProcessRunner> {
    runner: R,
    config: ExecutionConfig,
}

impl<R: ProcessRunner> WrongCodeOracle<R> {
    /// Create an oracle that launches tools through `runner`
    #[must_use]
    pub const fn new(runner: R, config: ExecutionConfig) -> Self {
        Self { runner, config }
    }

    /// Configuration in use
    #[must_use]
    pub const fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    fn backends(&self) -> Backends<'_, R> {
        Backends::new(&self.runner, &self.config)
    }

    /// Load the test case at `path` and evaluate it
    pub fn evaluate_path(&self, path: impl AsRef<Path>) -> ReduceResult<Verdict> {
        Ok(self.evaluate(&TestCase::load(path)?))
    }

    /// Decide whether `test_case` still exhibits the bug
    pub fn evaluate(&self, test_case: &TestCase) -> Verdict {
        let verdict = self.decide(test_case);
        info!(test_case = %test_case.path().display(), %verdict, "evaluated");
        verdict
    }

    fn decide(&self, test_case: &TestCase) -> Verdict {
        if self.config.conservative && !validators::is_valid_launcher_test_case(test_case.content())
        {
            return Verdict::invalid(Stage::Header);
        }

        if self.config.static_checks
            && !StaticChecker::new(&self.runner, &self.config).is_statically_valid(test_case)
        {
            return Verdict::invalid(Stage::Static);
        }

        if !self.config.use_oracle {
            return self.compare_launches(test_case);
        }

        match self.compute_reference(test_case) {
            Ok(reference) => self.compare_with_reference(test_case, &reference),
            Err(invalid) => Verdict::Invalid(invalid),
        }
    }

    /// Emulator output shared by the optimised and unoptimised runs
    pub fn compute_reference(&self, test_case: &TestCase) -> Result<String, InvalidTestCase> {
        let backends = self.backends();
        let reject = |failure: LaunchFailure| {
            warn!(?failure, "reference run failed");
            InvalidTestCase::from_launch(Stage::Reference, &failure)
        };

        let optimised = backends
            .run_checked(test_case, Optimisation::Enabled)
            .map_err(reject)?;
        let unoptimised = backends
            .run_checked(test_case, Optimisation::Disabled)
            .map_err(reject)?;

        if optimised != unoptimised {
            warn!("emulator disagrees with itself across optimisation states");
            return Err(InvalidTestCase::at(Stage::Reference));
        }
        Ok(optimised)
    }

    fn differs(&self, test_case: &TestCase, opt: Optimisation, reference: &str) -> Result<bool, Verdict> {
        match self.backends().run_direct(test_case, opt) {
            Ok(output) => {
                let differs = output != reference;
                debug!(%opt, differs, "compared with reference");
                Ok(differs)
            }
            Err(failure) => Err(Verdict::Invalid(InvalidTestCase::from_launch(
                Stage::of_launch(opt),
                &failure,
            ))),
        }
    }

    /// Compare direct launches against `reference` per the optimisation level
    pub fn compare_with_reference(&self, test_case: &TestCase, reference: &str) -> Verdict {
        let result = match self.config.optimisation_level {
            OptimisationLevel::Optimised => self.differs(test_case, Optimisation::Enabled, reference),
            OptimisationLevel::Unoptimised => {
                self.differs(test_case, Optimisation::Disabled, reference)
            }
            OptimisationLevel::Either => {
                match self.differs(test_case, Optimisation::Enabled, reference) {
                    Ok(true) => Ok(true),
                    Ok(false) => self.differs(test_case, Optimisation::Disabled, reference),
                    Err(verdict) => Err(verdict),
                }
            }
            OptimisationLevel::All => {
                match self.differs(test_case, Optimisation::Enabled, reference) {
                    Ok(true) => self.differs(test_case, Optimisation::Disabled, reference),
                    other => other,
                }
            }
        };
        result.map_or_else(|verdict| verdict, Verdict::from_bool)
    }

    fn compare_launches(&self, test_case: &TestCase) -> Verdict {
        let backends = self.backends();

        let checked = backends
            .run_checked(test_case, Optimisation::Enabled)
            .and_then(|_| backends.run_checked(test_case, Optimisation::Disabled));
        if let Err(failure) = checked {
            debug!(?failure, "emulator rejected test case");
            return Verdict::NotInteresting;
        }

        let launch = |opt: Optimisation| {
            backends.run_direct(test_case, opt).map_err(|failure| {
                Verdict::Invalid(InvalidTestCase::from_launch(Stage::of_launch(opt), &failure))
            })
        };
        let outputs = launch(Optimisation::Enabled)
            .and_then(|optimised| launch(Optimisation::Disabled).map(|unoptimised| (optimised, unoptimised)));

        match outputs {
            Ok((optimised, unoptimised)) => Verdict::from_bool(optimised != unoptimised),
            Err(verdict) => verdict,
        }
    }
}

impl<R: ProcessRunner> InterestingnessTest for WrongCodeOracle<R> {
    fn is_interesting(&mut self, path: &Path) -> bool {
        match self.evaluate_path(path) {
            Ok(verdict) => verdict.is_interesting(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not evaluate test case");
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::backends::DISABLE_OPTS_FLAG;
    use crate::process::{Invocation, ProcessOutcome, ProcessResult, ScriptedRunner};

    const KERNEL: &str = "// Seed: 1 -g 4,4,4 -l 2,2,2\n\
        size_t get_linear_global_id(void) {\n\
        return (get_global_id(2) * get_global_size(1) + get_global_id(1)) * get_global_size(0) + get_global_id(0);\n\
        }\n\
        kernel void entry(global ulong *result) { result[get_linear_global_id()] = 1; }\n";

    fn test_case() -> TestCase {
        TestCase::new("CLProg_1.cl", KERNEL)
    }

    fn ok(stdout: &str) -> ProcessOutcome {
        ProcessOutcome::Completed(ProcessResult::ok(stdout))
    }

    fn failed() -> ProcessOutcome {
        ProcessOutcome::Completed(ProcessResult::exited(1))
    }

    fn is_checked(inv: &Invocation) -> bool {
        inv.program == "oclgrind"
    }

    fn is_direct(inv: &Invocation) -> bool {
        inv.program == "cl_launcher"
    }

    fn unopt(inv: &Invocation) -> bool {
        inv.has_arg(DISABLE_OPTS_FLAG)
    }

    /// Runner answering emulator and launcher runs per optimisation state
    fn scripted(
        checked_opt: ProcessOutcome,
        checked_unopt: ProcessOutcome,
        direct_opt: ProcessOutcome,
        direct_unopt: ProcessOutcome,
    ) -> ScriptedRunner {
        ScriptedRunner::new()
            .on(|i| is_checked(i) && !unopt(i), checked_opt)
            .on(|i| is_checked(i) && unopt(i), checked_unopt)
            .on(|i| is_direct(i) && !unopt(i), direct_opt)
            .on(|i| is_direct(i) && unopt(i), direct_unopt)
    }

    fn config(level: OptimisationLevel) -> ExecutionConfig {
        ExecutionConfig::default()
            .with_emulator_mode(crate::config::EmulatorMode::Wrapper)
            .with_optimisation_level(level)
    }

    fn evaluate(runner: &ScriptedRunner, config: ExecutionConfig) -> Verdict {
        WrongCodeOracle::new(runner, config).evaluate(&test_case())
    }

    fn direct_calls(runner: &ScriptedRunner) -> Vec<Invocation> {
        runner.calls().into_iter().filter(is_direct).collect()
    }

    #[test]
    fn test_missing_header_launches_nothing() {
        let runner = ScriptedRunner::new().otherwise(ok("1"));
        let tc = TestCase::new("x.cl", KERNEL.replacen(" -g 4,4,4 -l 2,2,2", "", 1));
        let verdict = WrongCodeOracle::new(&runner, config(OptimisationLevel::Either)).evaluate(&tc);
        assert_eq!(verdict, Verdict::Invalid(InvalidTestCase::at(Stage::Header)));
        assert_eq!(runner.call_count(), 0);
    }

    #[test]
    fn test_non_conservative_skips_structure_checks() {
        let runner = scripted(ok("1"), ok("1"), ok("2"), ok("1"));
        let tc = TestCase::new("x.cl", "kernel void k(global ulong *result) { result[0] = 1; }");
        let config = config(OptimisationLevel::Optimised).with_conservative(false);
        let verdict = WrongCodeOracle::new(&runner, config).evaluate(&tc);
        assert_eq!(verdict, Verdict::Interesting);
    }

    #[test]
    fn test_static_gate_rejects() {
        let runner = ScriptedRunner::new()
            .on(|i| i.program == "clang", failed())
            .otherwise(ok("1"));
        let config = config(OptimisationLevel::Either).with_static_checks(true);
        assert_eq!(
            evaluate(&runner, config),
            Verdict::Invalid(InvalidTestCase::at(Stage::Static))
        );
        assert!(runner.calls().iter().all(|i| i.program == "clang"));
    }

    #[test]
    fn test_static_gate_passes_then_compares() {
        let runner = scripted(ok("1"), ok("1"), ok("2"), ok("1"))
            .on(|i| i.program == "clang", ok(""));
        let config = config(OptimisationLevel::Either).with_static_checks(true);
        assert_eq!(evaluate(&runner, config), Verdict::Interesting);
    }

    #[test]
    fn test_reference_disagreement_is_invalid() {
        let runner = scripted(ok("1"), ok("2"), ok("3"), ok("3"));
        assert_eq!(
            evaluate(&runner, config(OptimisationLevel::Either)),
            Verdict::Invalid(InvalidTestCase::at(Stage::Reference))
        );
        assert!(direct_calls(&runner).is_empty());
    }

    #[test]
    fn test_reference_failure_is_order_independent() {
        let opt_fails = scripted(failed(), ok("1"), ok("2"), ok("2"));
        let unopt_fails = scripted(ok("1"), failed(), ok("2"), ok("2"));
        let config = config(OptimisationLevel::Either);
        let a = WrongCodeOracle::new(&opt_fails, config.clone()).compute_reference(&test_case());
        let b = WrongCodeOracle::new(&unopt_fails, config).compute_reference(&test_case());
        assert_eq!(a, b);
        assert_eq!(a, Err(InvalidTestCase::at(Stage::Reference)));
    }

    #[test]
    fn test_reference_is_idempotent() {
        let runner = scripted(ok("42\n"), ok("42\n"), failed(), failed());
        let oracle = WrongCodeOracle::new(&runner, config(OptimisationLevel::Either));
        assert_eq!(oracle.compute_reference(&test_case()), Ok("42\n".to_string()));
        assert_eq!(oracle.compute_reference(&test_case()), Ok("42\n".to_string()));
    }

    #[test]
    fn test_reference_timeout_is_flagged() {
        let runner = scripted(ProcessOutcome::TimedOut, ok("1"), ok("1"), ok("1"));
        let verdict = evaluate(&runner, config(OptimisationLevel::Either));
        assert_eq!(
            verdict,
            Verdict::Invalid(InvalidTestCase {
                stage: Stage::Reference,
                timed_out: true
            })
        );
        assert_eq!(Dialect::Strict.exit_code(&verdict), Dialect::TIMEOUT);
    }

    #[test]
    fn test_either_runs_unoptimised_after_matching_optimised() {
        let runner = scripted(ok("42\n"), ok("42\n"), ok("42\n"), ok("7\n"));
        assert_eq!(
            evaluate(&runner, config(OptimisationLevel::Either)),
            Verdict::Interesting
        );
        let direct = direct_calls(&runner);
        assert_eq!(direct.len(), 2);
        assert!(unopt(&direct[1]));
    }

    #[test]
    fn test_either_short_circuits_on_optimised_difference() {
        let runner = scripted(ok("42\n"), ok("42\n"), ok("7\n"), failed());
        assert_eq!(
            evaluate(&runner, config(OptimisationLevel::Either)),
            Verdict::Interesting
        );
        assert_eq!(direct_calls(&runner).len(), 1);
    }

    #[test]
    fn test_all_short_circuits_on_optimised_match() {
        let runner = scripted(ok("42\n"), ok("42\n"), ok("42\n"), ok("7\n"));
        assert_eq!(
            evaluate(&runner, config(OptimisationLevel::All)),
            Verdict::NotInteresting
        );
        assert_eq!(direct_calls(&runner).len(), 1);
    }

    #[test]
    fn test_direct_launch_failure_is_invalid() {
        let runner = scripted(ok("1"), ok("1"), failed(), ok("1"));
        assert_eq!(
            evaluate(&runner, config(OptimisationLevel::Optimised)),
            Verdict::Invalid(InvalidTestCase::at(Stage::Optimised))
        );

        let runner = scripted(ok("1"), ok("1"), ok("1"), ProcessOutcome::TimedOut);
        let verdict = evaluate(&runner, config(OptimisationLevel::Unoptimised));
        assert_eq!(
            verdict,
            Verdict::Invalid(InvalidTestCase {
                stage: Stage::Unoptimised,
                timed_out: true
            })
        );
    }

    /// Truth tables over (optimised differs, unoptimised differs)
    #[test]
    fn test_comparison_mode_truth_tables() {
        let reference = "R";
        for o_differs in [false, true] {
            for u_differs in [false, true] {
                let o = if o_differs { "O" } else { reference };
                let u = if u_differs { "U" } else { reference };
                let expect = |level: OptimisationLevel| match level {
                    OptimisationLevel::Optimised => o_differs,
                    OptimisationLevel::Unoptimised => u_differs,
                    OptimisationLevel::Either => o_differs || u_differs,
                    OptimisationLevel::All => o_differs && u_differs,
                };
                for level in OptimisationLevel::ALL {
                    let runner = scripted(ok(reference), ok(reference), ok(o), ok(u));
                    let verdict = evaluate(&runner, config(level));
                    assert_eq!(
                        verdict.is_interesting(),
                        expect(level),
                        "{level} with O differs={o_differs} U differs={u_differs}"
                    );
                    assert_ne!(verdict, Verdict::Invalid(InvalidTestCase::at(Stage::Reference)));
                }
            }
        }
    }

    #[test]
    fn test_without_oracle_compares_launches() {
        let config = config(OptimisationLevel::Either).with_use_oracle(false);

        let runner = scripted(ok("x"), ok("y"), ok("1"), ok("2"));
        assert_eq!(evaluate(&runner, config.clone()), Verdict::Interesting);

        let runner = scripted(ok("x"), ok("y"), ok("1"), ok("1"));
        assert_eq!(evaluate(&runner, config), Verdict::NotInteresting);
    }

    #[test]
    fn test_without_oracle_emulator_failure_is_not_interesting() {
        let config = config(OptimisationLevel::Either).with_use_oracle(false);
        let runner = scripted(ok("x"), failed(), ok("1"), ok("2"));
        assert_eq!(evaluate(&runner, config), Verdict::NotInteresting);
        assert!(direct_calls(&runner).is_empty());
    }

    #[test]
    fn test_without_oracle_launch_failure_is_invalid() {
        let config = config(OptimisationLevel::Either).with_use_oracle(false);
        let runner = scripted(ok("x"), ok("x"), ok("1"), failed());
        let verdict = evaluate(&runner, config);
        assert_eq!(verdict, Verdict::Invalid(InvalidTestCase::at(Stage::Unoptimised)));
        assert!(!verdict.is_interesting());
    }

    #[test]
    fn test_dialect_exit_codes() {
        let invalid = Verdict::Invalid(InvalidTestCase::at(Stage::Static));
        assert_eq!(Dialect::Strict.exit_code(&Verdict::Interesting), 0);
        assert_eq!(Dialect::Strict.exit_code(&Verdict::NotInteresting), 1);
        assert_eq!(Dialect::Strict.exit_code(&invalid), -2);
        assert_eq!(Dialect::Permissive.exit_code(&Verdict::Interesting), 0);
        assert_eq!(Dialect::Permissive.exit_code(&invalid), 1);
    }

    #[test]
    fn test_into_result_strict() {
        assert!(Verdict::Interesting.into_result().unwrap());
        assert!(!Verdict::NotInteresting.into_result().unwrap());
        let err = Verdict::Invalid(InvalidTestCase::at(Stage::Reference))
            .into_result()
            .unwrap_err();
        assert!(matches!(err, ReduceError::InvalidTestCase { stage: Stage::Reference }));
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(Verdict::Interesting.to_string(), "interesting");
        assert_eq!(
            Verdict::Invalid(InvalidTestCase {
                stage: Stage::Optimised,
                timed_out: true
            })
            .to_string(),
            "invalid (optimised, timed out)"
        );
    }

    #[test]
    fn test_interestingness_test_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CLProg_1.cl");
        std::fs::write(&path, KERNEL).unwrap();

        let runner = scripted(ok("1"), ok("1"), ok("2"), ok("1"));
        let mut oracle = WrongCodeOracle::new(&runner, config(OptimisationLevel::Either));
        assert!(oracle.is_interesting(&path));
        assert!(!oracle.is_interesting(&dir.path().join("missing.cl")));
    }
}
