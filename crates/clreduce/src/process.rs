//! External process execution with a time budget.
//!
//! Every compiler, analyzer, emulator and launcher call goes through a
//! [`ProcessRunner`]. The system implementation spawns the child, drains its
//! pipes on helper threads and kills it once the timeout elapses, so a hung
//! kernel never outlives its evaluation. On Unix the child leads its own
//! process group and the whole group is killed, which also takes down
//! compiler subprocesses and anything a wrapper script started.

use std::cell::RefCell;
use std::fmt;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Default per-invocation time budget
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// A fully described external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program to run (looked up on `PATH` when not a path)
    pub program: String,
    /// Arguments in order
    pub args: Vec<String>,
    /// Extra environment variables layered over the inherited environment
    pub env: Vec<(String, String)>,
    /// Upper bound on wall-clock time
    pub timeout: Duration,
}

impl Invocation {
    /// Create an invocation with no arguments and the default timeout
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Append one argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an environment override
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether `arg` appears verbatim in the argument list
    #[must_use]
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// Value of an environment override, if set
    #[must_use]
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a process that ran to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessResult {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit code, `None` when terminated by a signal
    pub exit_code: Option<i32>,
}

impl ProcessResult {
    /// A zero-exit result with the given stdout
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    /// A result with the given exit code and empty output
    #[must_use]
    pub fn exited(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            ..Self::default()
        }
    }

    /// Replace stderr
    #[must_use]
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    /// Exited with status zero
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

/// Outcome of one external invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The process ran to completion (any exit status)
    Completed(ProcessResult),
    /// The process exceeded its timeout and was killed
    TimedOut,
    /// The process could not be started
    CouldNotRun(String),
}

impl ProcessOutcome {
    /// The result, if the process ran and exited with status zero
    #[must_use]
    pub const fn successful(&self) -> Option<&ProcessResult> {
        match self {
            Self::Completed(result) if result.success() => Some(result),
            _ => None,
        }
    }

    /// Whether the invocation hit its timeout
    #[must_use]
    pub const fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

/// Executes external commands
pub trait ProcessRunner {
    /// Run `invocation` to completion or timeout
    fn run(&self, invocation: &Invocation) -> ProcessOutcome;
}

impl<R: ProcessRunner + ?Sized> ProcessRunner for &R {
    fn run(&self, invocation: &Invocation) -> ProcessOutcome {
        (**self).run(invocation)
    }
}

/// Runs commands as real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    /// Create a system runner
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buf) {
                debug!(error = %e, bytes = buf.len(), "pipe read failed");
            }
        }
        buf
    })
}

#[cfg(unix)]
fn isolate(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate(_cmd: &mut Command) {}

/// Kill the child and everything in its process group, then reap it
#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Err(e) = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL) {
        debug!(pid = child.id(), error = %e, "process group kill failed");
        if let Err(e) = child.kill() {
            debug!(pid = child.id(), error = %e, "kill failed");
        }
    }
    reap(child);
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!(pid = child.id(), error = %e, "kill failed");
    }
    reap(child);
}

fn reap(child: &mut Child) {
    if let Err(e) = child.wait() {
        debug!(pid = child.id(), error = %e, "reap failed");
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> ProcessOutcome {
        debug!(command = %invocation, timeout_secs = invocation.timeout.as_secs(), "launching");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        isolate(&mut cmd);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(program = %invocation.program, error = %e, "could not launch");
                return ProcessOutcome::CouldNotRun(format!(
                    "failed to execute {}: {e}",
                    invocation.program
                ));
            }
        };

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        // After a kill the drain threads are detached, not joined: a
        // descendant outside the group may still hold the pipes open.
        let status = match child.wait_timeout(invocation.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                terminate(&mut child);
                warn!(command = %invocation, "timed out");
                return ProcessOutcome::TimedOut;
            }
            Err(e) => {
                terminate(&mut child);
                return ProcessOutcome::CouldNotRun(format!(
                    "failed waiting for {}: {e}",
                    invocation.program
                ));
            }
        };

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();
        let result = ProcessResult {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code: status.code(),
        };
        debug!(program = %invocation.program, exit_code = ?result.exit_code, "finished");
        ProcessOutcome::Completed(result)
    }
}

type Matcher = Box<dyn Fn(&Invocation) -> bool>;

/// A runner that answers from a script instead of spawning processes.
///
/// Rules are tried in insertion order; the first matching rule's outcome
/// is returned. Every invocation is recorded for later inspection.
pub struct ScriptedRunner {
    rules: Vec<(Matcher, ProcessOutcome)>,
    fallback: ProcessOutcome,
    calls: RefCell<Vec<Invocation>>,
}

impl fmt::Debug for ScriptedRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedRunner")
            .field("rules", &self.rules.len())
            .field("fallback", &self.fallback)
            .field("calls", &self.calls.borrow().len())
            .finish()
    }
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRunner {
    /// Create a runner whose unmatched invocations cannot run
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: ProcessOutcome::CouldNotRun("no scripted outcome".to_string()),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Answer invocations matching `matcher` with `outcome`
    #[must_use]
    pub fn on<F>(mut self, matcher: F, outcome: ProcessOutcome) -> Self
    where
        F: Fn(&Invocation) -> bool + 'static,
    {
        self.rules.push((Box::new(matcher), outcome));
        self
    }

    /// Outcome for invocations no rule matches
    #[must_use]
    pub fn otherwise(mut self, outcome: ProcessOutcome) -> Self {
        self.fallback = outcome;
        self
    }

    /// All invocations seen so far
    #[must_use]
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.borrow().clone()
    }

    /// Number of invocations seen so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(&self, invocation: &Invocation) -> ProcessOutcome {
        self.calls.borrow_mut().push(invocation.clone());
        self.rules
            .iter()
            .find(|(matcher, _)| matcher(invocation))
            .map_or_else(|| self.fallback.clone(), |(_, outcome)| outcome.clone())
    }
}
