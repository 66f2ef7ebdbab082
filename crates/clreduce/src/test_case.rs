//! Test cases and their work-size header.
//!
//! A test case is an OpenCL source file whose first line is a comment of
//! the form `//<free text> -g X,Y,Z -l A,B,C`. The header carries the
//! global and local work sizes the launcher uses; the rest of the file is
//! opaque kernel source.

use crate::result::{ReduceError, ReduceResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

/// Number of work-size dimensions
pub const DIMENSIONS: usize = 3;

#[allow(clippy::expect_used)]
fn header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^//(.*) -g ([0-9]+),([0-9]+),([0-9]+) -l ([0-9]+),([0-9]+),([0-9]+)")
            .expect("valid header regex")
    })
}

#[allow(clippy::expect_used)]
fn line_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^# \d+ "[^"]*""#).expect("valid line marker regex"))
}

/// A three-dimensional work size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkSize(pub [u64; DIMENSIONS]);

impl WorkSize {
    /// The smallest work size, `1,1,1`
    pub const ONE: Self = Self([1; DIMENSIONS]);

    /// Create a work size from its components
    #[must_use]
    pub const fn new(x: u64, y: u64, z: u64) -> Self {
        Self([x, y, z])
    }

    /// Components in axis order
    #[must_use]
    pub const fn components(self) -> [u64; DIMENSIONS] {
        self.0
    }

    /// Whether every component of `self` is divisible by the matching
    /// component of `local`
    #[must_use]
    pub fn is_divisible_by(self, local: Self) -> bool {
        self.0
            .iter()
            .zip(local.0.iter())
            .all(|(g, l)| *l != 0 && g % l == 0)
    }

    /// Largest component
    #[must_use]
    pub fn max_component(self) -> u64 {
        self.0.iter().copied().max().unwrap_or(0)
    }
}

impl fmt::Display for WorkSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.0[0], self.0[1], self.0[2])
    }
}

impl FromStr for WorkSize {
    type Err = ReduceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != DIMENSIONS {
            return Err(ReduceError::header(format!(
                "expected {DIMENSIONS} comma separated sizes, got '{s}'"
            )));
        }
        let mut sizes = [0; DIMENSIONS];
        for (slot, part) in sizes.iter_mut().zip(parts) {
            *slot = part
                .trim()
                .parse()
                .map_err(|e| ReduceError::header(format!("bad size '{part}': {e}")))?;
            if *slot == 0 {
                return Err(ReduceError::header(format!("zero size in '{s}'")));
            }
        }
        Ok(Self(sizes))
    }
}

/// The parsed first-line comment of a test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkSizeHeader {
    /// Free text between `//` and ` -g`
    pub meta: String,
    /// Global work size
    pub global: WorkSize,
    /// Local work size
    pub local: WorkSize,
}

impl WorkSizeHeader {
    /// Parse the header from the start of `content`
    pub fn parse(content: &str) -> ReduceResult<Self> {
        let caps = header_regex()
            .captures(content)
            .ok_or_else(|| ReduceError::header("first line lacks '// ... -g X,Y,Z -l A,B,C'"))?;

        let component = |i: usize| -> ReduceResult<u64> {
            let text = &caps[i];
            let value: u64 = text
                .parse()
                .map_err(|e| ReduceError::header(format!("bad size '{text}': {e}")))?;
            if value == 0 {
                return Err(ReduceError::header("work sizes must be positive"));
            }
            Ok(value)
        };

        Ok(Self {
            meta: caps[1].to_string(),
            global: WorkSize([component(2)?, component(3)?, component(4)?]),
            local: WorkSize([component(5)?, component(6)?, component(7)?]),
        })
    }

    /// The same header with different sizes
    #[must_use]
    pub fn with_sizes(&self, global: WorkSize, local: WorkSize) -> Self {
        Self {
            meta: self.meta.clone(),
            global,
            local,
        }
    }
}

impl fmt::Display for WorkSizeHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "//{} -g {} -l {}", self.meta, self.global, self.local)
    }
}

/// Whether the first line carries a well-formed work-size header
#[must_use]
pub fn has_valid_header(content: &str) -> bool {
    header_regex().is_match(content)
}

/// Replace the header at the start of `content` with `header`.
///
/// Only the matched `//... -g X,Y,Z -l A,B,C` text changes; anything that
/// follows it on the first line, including a `\r`, is kept.
pub fn replace_header(content: &str, header: &WorkSizeHeader) -> ReduceResult<String> {
    let matched = header_regex()
        .find(content)
        .ok_or_else(|| ReduceError::header("first line lacks '// ... -g X,Y,Z -l A,B,C'"))?;
    Ok(format!("{header}{}", &content[matched.end()..]))
}

/// An OpenCL test case on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    path: PathBuf,
    content: String,
}

impl TestCase {
    /// Build a test case from already loaded content
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Read a test case from disk
    pub fn load(path: impl AsRef<Path>) -> ReduceResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        Ok(Self::new(path, content))
    }

    /// File path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Source text
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Parsed work-size header
    pub fn header(&self) -> ReduceResult<WorkSizeHeader> {
        WorkSizeHeader::parse(&self.content)
    }

    /// Path as passed to external tools
    #[must_use]
    pub fn path_arg(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Remove preprocessor line markers (`# 12 "file.h"`) from source text
#[must_use]
pub fn strip_line_markers(content: &str) -> String {
    content
        .split_inclusive('\n')
        .filter(|line| !line_marker_regex().is_match(line))
        .collect()
}

/// Strip line markers from a file in place
pub fn strip_line_markers_in_place(path: impl AsRef<Path>) -> ReduceResult<()> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    fs::write(path, strip_line_markers(&content))?;
    Ok(())
}
