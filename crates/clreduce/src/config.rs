//! Execution configuration for the oracle.
//!
//! Resolved once per run from a flat option mapping, usually filled from
//! the `CREDUCE_TEST_*` environment variables that C-Reduce passes through
//! to the interestingness test.

use crate::result::{ReduceError, ReduceResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Option keys and their environment variables
pub mod keys {
    /// Launcher binary for direct execution
    pub const CL_LAUNCHER: &str = "cl_launcher";
    /// Compiler used for static checks
    pub const CLANG: &str = "clang";
    /// Emulator binary (wrapper launch style)
    pub const OCLGRIND: &str = "oclgrind";
    /// Extra include path for libclc headers
    pub const LIBCLC_INCLUDE_PATH: &str = "libclc_include_path";
    /// Target platform index
    pub const PLATFORM: &str = "platform";
    /// Target device index
    pub const DEVICE: &str = "device";
    /// Emulator platform index
    pub const OCLGRIND_PLATFORM: &str = "oclgrind_platform";
    /// Emulator device index
    pub const OCLGRIND_DEVICE: &str = "oclgrind_device";
    /// Per-invocation timeout in seconds
    pub const TIMEOUT: &str = "timeout";
    /// Structural header/result-access/index checks
    pub const CONSERVATIVE: &str = "conservative";
    /// Compiler and analyzer gate
    pub const STATIC_CHECKS: &str = "static_checks";
    /// Reference-comparison strategy
    pub const USE_ORACLE: &str = "use_oracle";
    /// Optimisation comparison mode
    pub const OPTIMISATION_LEVEL: &str = "optimisation_level";

    /// `(key, environment variable)` pairs
    pub const ENV_VARS: &[(&str, &str)] = &[
        (CL_LAUNCHER, "CREDUCE_TEST_CL_LAUNCHER"),
        (CLANG, "CREDUCE_TEST_CLANG"),
        (OCLGRIND, "CREDUCE_TEST_OCLGRIND"),
        (LIBCLC_INCLUDE_PATH, "CREDUCE_LIBCLC_INCLUDE_PATH"),
        (PLATFORM, "CREDUCE_TEST_PLATFORM"),
        (DEVICE, "CREDUCE_TEST_DEVICE"),
        (OCLGRIND_PLATFORM, "CREDUCE_TEST_OCLGRIND_PLATFORM"),
        (OCLGRIND_DEVICE, "CREDUCE_TEST_OCLGRIND_DEVICE"),
        (TIMEOUT, "CREDUCE_TEST_TIMEOUT"),
        (CONSERVATIVE, "CREDUCE_TEST_CONSERVATIVE"),
        (STATIC_CHECKS, "CREDUCE_TEST_STATIC"),
        (USE_ORACLE, "CREDUCE_TEST_USE_ORACLE"),
        (OPTIMISATION_LEVEL, "CREDUCE_TEST_OPTIMISATION_LEVEL"),
    ];
}

/// Which optimisation states are compared against the reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimisationLevel {
    /// Only the optimised launch must differ
    Optimised,
    /// Only the unoptimised launch must differ
    Unoptimised,
    /// Either launch differing is enough
    #[default]
    Either,
    /// Both launches must differ
    All,
}

impl OptimisationLevel {
    /// All levels in declaration order
    pub const ALL: [Self; 4] = [Self::Optimised, Self::Unoptimised, Self::Either, Self::All];

    /// Lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Optimised => "optimised",
            Self::Unoptimised => "unoptimised",
            Self::Either => "either",
            Self::All => "all",
        }
    }
}

impl fmt::Display for OptimisationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimisationLevel {
    type Err = ReduceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "optimised" | "optimized" => Ok(Self::Optimised),
            "unoptimised" | "unoptimized" => Ok(Self::Unoptimised),
            "either" => Ok(Self::Either),
            "all" => Ok(Self::All),
            other => Err(ReduceError::config(format!(
                "invalid optimisation level '{other}' (expected optimised, unoptimised, either or all)"
            ))),
        }
    }
}

/// How the checking emulator is attached to the launcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmulatorMode {
    /// `oclgrind [checks] cl_launcher ...`
    Wrapper,
    /// The launcher talks to an emulator ICD configured through
    /// `OCLGRIND_*` environment variables
    Environment,
}

impl Default for EmulatorMode {
    fn default() -> Self {
        if cfg!(windows) {
            Self::Environment
        } else {
            Self::Wrapper
        }
    }
}

/// A single value in the flat option mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    /// Boolean flag
    Bool(bool),
    /// Integer value
    Int(i64),
    /// String value
    Str(String),
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl OptionValue {
    fn as_string(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Str(s) => s.clone(),
        }
    }

    fn as_bool(&self, key: &str) -> ReduceResult<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            Self::Int(i) => Ok(*i != 0),
            Self::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" | "" => Ok(false),
                other => Err(ReduceError::config(format!(
                    "option '{key}' expects a boolean, got '{other}'"
                ))),
            },
        }
    }

    fn as_u64(&self, key: &str) -> ReduceResult<u64> {
        match self {
            Self::Int(i) => u64::try_from(*i).map_err(|_| {
                ReduceError::config(format!("option '{key}' must not be negative, got {i}"))
            }),
            Self::Str(s) => s.trim().parse().map_err(|e| {
                ReduceError::config(format!("option '{key}' expects an integer, got '{s}': {e}"))
            }),
            Self::Bool(b) => Err(ReduceError::config(format!(
                "option '{key}' expects an integer, got {b}"
            ))),
        }
    }
}

/// Flat option mapping
pub type Options = BTreeMap<String, OptionValue>;

/// Immutable configuration for one oracle run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Launcher binary for direct execution
    pub cl_launcher: String,
    /// Compiler used for static checks
    pub clang: String,
    /// Emulator binary
    pub oclgrind: String,
    /// How the emulator is attached
    pub emulator_mode: EmulatorMode,
    /// Extra include path for libclc headers
    pub libclc_include_path: Option<String>,
    /// Target platform index
    pub platform: u32,
    /// Target device index
    pub device: u32,
    /// Emulator platform index
    pub oclgrind_platform: u32,
    /// Emulator device index
    pub oclgrind_device: u32,
    /// Per-invocation timeout in seconds
    pub timeout_secs: u64,
    /// Enforce header, result-access and index-function checks
    pub conservative: bool,
    /// Run the compiler/analyzer gate
    pub static_checks: bool,
    /// Compare against an emulator-computed reference
    pub use_oracle: bool,
    /// Optimisation comparison mode
    pub optimisation_level: OptimisationLevel,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            cl_launcher: "cl_launcher".to_string(),
            clang: "clang".to_string(),
            oclgrind: "oclgrind".to_string(),
            emulator_mode: EmulatorMode::default(),
            libclc_include_path: None,
            platform: 0,
            device: 0,
            oclgrind_platform: 0,
            oclgrind_device: 0,
            timeout_secs: 300,
            conservative: true,
            static_checks: false,
            use_oracle: true,
            optimisation_level: OptimisationLevel::Either,
        }
    }
}

impl ExecutionConfig {
    /// Create the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a flat option mapping; missing keys keep their defaults
    pub fn from_options(options: &Options) -> ReduceResult<Self> {
        let mut config = Self::default();

        for (key, value) in options {
            match key.as_str() {
                keys::CL_LAUNCHER => config.cl_launcher = value.as_string(),
                keys::CLANG => config.clang = value.as_string(),
                keys::OCLGRIND => config.oclgrind = value.as_string(),
                keys::LIBCLC_INCLUDE_PATH => {
                    let path = value.as_string();
                    config.libclc_include_path = (!path.is_empty()).then_some(path);
                }
                keys::PLATFORM => config.platform = index(value, key)?,
                keys::DEVICE => config.device = index(value, key)?,
                keys::OCLGRIND_PLATFORM => config.oclgrind_platform = index(value, key)?,
                keys::OCLGRIND_DEVICE => config.oclgrind_device = index(value, key)?,
                keys::TIMEOUT => config.timeout_secs = value.as_u64(key)?,
                keys::CONSERVATIVE => config.conservative = value.as_bool(key)?,
                keys::STATIC_CHECKS => config.static_checks = value.as_bool(key)?,
                keys::USE_ORACLE => config.use_oracle = value.as_bool(key)?,
                keys::OPTIMISATION_LEVEL => {
                    config.optimisation_level = value.as_string().parse()?;
                }
                other => tracing::debug!(key = other, "ignoring unknown option"),
            }
        }

        Ok(config)
    }

    /// Collect options from a variable lookup using [`keys::ENV_VARS`]
    pub fn options_from_lookup<F>(lookup: F) -> Options
    where
        F: Fn(&str) -> Option<String>,
    {
        keys::ENV_VARS
            .iter()
            .filter_map(|(key, var)| lookup(var).map(|v| ((*key).to_string(), v.into())))
            .collect()
    }

    /// Build from the process environment
    pub fn from_env() -> ReduceResult<Self> {
        Self::from_options(&Self::options_from_lookup(|var| std::env::var(var).ok()))
    }

    /// Timeout as a duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Set the optimisation level
    #[must_use]
    pub const fn with_optimisation_level(mut self, level: OptimisationLevel) -> Self {
        self.optimisation_level = level;
        self
    }

    /// Enable or disable reference comparison
    #[must_use]
    pub const fn with_use_oracle(mut self, use_oracle: bool) -> Self {
        self.use_oracle = use_oracle;
        self
    }

    /// Enable or disable conservative structural checks
    #[must_use]
    pub const fn with_conservative(mut self, conservative: bool) -> Self {
        self.conservative = conservative;
        self
    }

    /// Enable or disable the compiler/analyzer gate
    #[must_use]
    pub const fn with_static_checks(mut self, static_checks: bool) -> Self {
        self.static_checks = static_checks;
        self
    }

    /// Set the emulator launch style
    #[must_use]
    pub const fn with_emulator_mode(mut self, mode: EmulatorMode) -> Self {
        self.emulator_mode = mode;
        self
    }

    /// Set the timeout in seconds
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

fn index(value: &OptionValue, key: &str) -> ReduceResult<u32> {
    let raw = value.as_u64(key)?;
    u32::try_from(raw)
        .map_err(|_| ReduceError::config(format!("option '{key}' is out of range: {raw}")))
}
