//! Batch drivers over many test cases

use crate::error::CliResult;
use crate::output::ProgressReporter;
use clreduce::{
    reduce_work_sizes, ProcessRunner, ReductionMode, Verdict, WrongCodeOracle,
};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Process exit status for an oracle exit code (`-1` becomes 255)
#[must_use]
pub const fn exit_status(code: i32) -> u8 {
    code as u8
}

fn chunks(s: &str) -> impl Iterator<Item = &str> {
    let mut rest = s;
    std::iter::from_fn(move || {
        let first = rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = rest
            .find(|c: char| c.is_ascii_digit() != digits)
            .unwrap_or(rest.len());
        let (chunk, tail) = rest.split_at(end);
        rest = tail;
        Some(chunk)
    })
}

fn cmp_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Alpha-numeric ordering: `CLProg_2` sorts before `CLProg_10`
#[must_use]
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = chunks(a);
    let mut right = chunks(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let both_numeric = x.starts_with(|c: char| c.is_ascii_digit())
                    && y.starts_with(|c: char| c.is_ascii_digit());
                let ordering = if both_numeric {
                    cmp_numeric(x, y)
                } else {
                    x.cmp(y)
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.to_string_lossy(), |n| n.to_string_lossy())
        .into_owned()
}

/// Names listed in an exclude file, one per line
pub fn read_exclusions(path: &Path) -> CliResult<BTreeSet<String>> {
    Ok(fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect())
}

/// Gather test cases from explicit paths and an optional directory of
/// `*.cl` files, drop excluded names and sort naturally by file name
pub fn collect_test_cases(
    files: &[PathBuf],
    dir: Option<&Path>,
    exclude: Option<&Path>,
) -> CliResult<Vec<PathBuf>> {
    let mut cases = files.to_vec();
    if let Some(dir) = dir {
        let pattern = dir.join("*.cl");
        for entry in glob::glob(&pattern.to_string_lossy())? {
            match entry {
                Ok(path) => cases.push(path),
                Err(e) => warn!(error = %e, "skipping unreadable entry"),
            }
        }
    }

    if let Some(exclude) = exclude {
        let excluded = read_exclusions(exclude)?;
        cases.retain(|path| !excluded.contains(&file_name(path)));
    }

    cases.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));
    Ok(cases)
}

/// Result of checking one test case
#[derive(Debug, Clone, Serialize)]
pub struct CaseOutcome {
    /// Test case path
    pub path: PathBuf,
    /// Verdict, if the case could be evaluated
    pub verdict: Option<Verdict>,
    /// Why evaluation failed
    pub error: Option<String>,
    /// Time spent on the case
    pub duration: Duration,
}

/// Results of a batch check
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    /// Per-case results in evaluation order
    pub outcomes: Vec<CaseOutcome>,
    /// Total runtime
    pub duration: Duration,
}

impl CheckReport {
    /// Number of interesting cases
    #[must_use]
    pub fn interesting(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.verdict.as_ref().is_some_and(Verdict::is_interesting))
            .count()
    }

    /// Number of evaluated cases that were not interesting
    #[must_use]
    pub fn rejected(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.verdict.as_ref().is_some_and(|v| !v.is_interesting()))
            .count()
    }

    /// Number of cases that could not be evaluated
    #[must_use]
    pub fn errors(&self) -> usize {
        self.outcomes.iter().filter(|o| o.verdict.is_none()).count()
    }
}

/// Checks test cases one after another, continuing past failures
#[derive(Debug)]
pub struct CheckRunner<R: ProcessRunner> {
    oracle: WrongCodeOracle<R>,
    reporter: ProgressReporter,
    delete: bool,
    log: Option<PathBuf>,
}

impl<R: ProcessRunner> CheckRunner<R> {
    /// Create a runner around `oracle`
    #[must_use]
    pub const fn new(oracle: WrongCodeOracle<R>, reporter: ProgressReporter) -> Self {
        Self {
            oracle,
            reporter,
            delete: false,
            log: None,
        }
    }

    /// Delete test cases that are not interesting
    #[must_use]
    pub const fn with_delete(mut self, delete: bool) -> Self {
        self.delete = delete;
        self
    }

    /// Append evaluated test case names to `log`
    #[must_use]
    pub fn with_log(mut self, log: Option<PathBuf>) -> Self {
        self.log = log;
        self
    }

    fn append_log(&self, path: &Path) -> CliResult<()> {
        if let Some(log) = &self.log {
            let mut file = OpenOptions::new().create(true).append(true).open(log)?;
            writeln!(file, "{}", file_name(path))?;
        }
        Ok(())
    }

    fn check_one(&self, path: &Path) -> CaseOutcome {
        let start = Instant::now();
        let name = file_name(path);
        let (verdict, error) = match self.oracle.evaluate_path(path) {
            Ok(verdict) => {
                match verdict {
                    Verdict::Interesting => self.reporter.success(&format!("{name}: {verdict}")),
                    Verdict::NotInteresting => self.reporter.warning(&format!("{name}: {verdict}")),
                    Verdict::Invalid(_) => self.reporter.failure(&format!("{name}: {verdict}")),
                }
                (Some(verdict), None)
            }
            Err(e) => {
                self.reporter.failure(&format!("{name}: {e}"));
                (None, Some(e.to_string()))
            }
        };

        if verdict.is_some_and(|v| !v.is_interesting()) && self.delete {
            match fs::remove_file(path) {
                Ok(()) => info!(test_case = %name, "deleted"),
                Err(e) => warn!(test_case = %name, error = %e, "could not delete"),
            }
        }

        CaseOutcome {
            path: path.to_path_buf(),
            verdict,
            error,
            duration: start.elapsed(),
        }
    }

    /// Evaluate every case in order
    pub fn run(&mut self, cases: &[PathBuf]) -> CliResult<CheckReport> {
        let start = Instant::now();
        let mut report = CheckReport::default();

        if cases.is_empty() {
            self.reporter.warning("No test cases found");
            return Ok(report);
        }

        self.reporter
            .start_progress(cases.len() as u64, "checking test cases");
        for path in cases {
            self.reporter.set_message(&file_name(path));
            let outcome = self.check_one(path);
            self.append_log(path)?;
            report.outcomes.push(outcome);
            self.reporter.increment(1);
        }
        self.reporter.finish();

        report.duration = start.elapsed();
        self.reporter.summary(
            report.interesting(),
            report.rejected(),
            report.errors(),
            report.duration,
        );
        Ok(report)
    }
}

/// Counts from a work-size reduction batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReductionSummary {
    /// Files whose sizes were reduced
    pub reduced: usize,
    /// Files left as they were
    pub unchanged: usize,
    /// Files that could not be processed
    pub errors: usize,
}

/// Reduce the work sizes of every file, continuing past failures
pub fn reduce_all<R: ProcessRunner>(
    oracle: &mut WrongCodeOracle<R>,
    reporter: &ProgressReporter,
    files: &[PathBuf],
    mode: ReductionMode,
) -> ReductionSummary {
    let mut summary = ReductionSummary::default();
    for path in files {
        let name = file_name(path);
        match reduce_work_sizes(path, mode, oracle) {
            Ok(true) => {
                summary.reduced += 1;
                reporter.success(&format!("{name}: work sizes reduced"));
            }
            Ok(false) => {
                summary.unchanged += 1;
                reporter.info(&format!("{name}: work sizes unchanged"));
            }
            Err(e) => {
                summary.errors += 1;
                reporter.failure(&format!("{name}: {e}"));
            }
        }
    }
    summary
}
