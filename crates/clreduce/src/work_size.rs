//! Work-size bisection.
//!
//! Starting from one work item in one group, candidate sizes grow until the
//! interestingness test accepts one. Only the header line is ever rewritten;
//! the kernel body after it is preserved byte-for-byte.

use crate::oracle::InterestingnessTest;
use crate::result::{ReduceError, ReduceResult};
use crate::test_case::{replace_header, WorkSize, WorkSizeHeader};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// How candidate sizes are accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReductionMode {
    /// Ask the interestingness test for every candidate
    #[default]
    Checked,
    /// Write the smallest sizes without asking
    Unchecked,
}

/// Next candidate after `(global, local)` was rejected.
///
/// Every local component grows by one; every global component is then
/// raised to the nearest multiple of its new local component.
#[must_use]
pub fn grow(global: WorkSize, local: WorkSize) -> (WorkSize, WorkSize) {
    let mut next_global = global.0;
    let mut next_local = local.0;
    for (g, l) in next_global.iter_mut().zip(next_local.iter_mut()) {
        *l += 1;
        *g = g.div_ceil(*l) * *l;
    }
    (WorkSize(next_global), WorkSize(next_local))
}

/// Rewrites the work-size header of one test case.
///
/// The file stays open for the reducer's lifetime and is closed when the
/// reducer is dropped.
#[derive(Debug)]
pub struct WorkSizeReducer {
    path: PathBuf,
    file: File,
    original: String,
    header: WorkSizeHeader,
}

impl WorkSizeReducer {
    /// Open `path` for reading and writing and parse its header
    pub fn open(path: impl AsRef<Path>) -> ReduceResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let mut original = String::new();
        file.read_to_string(&mut original)?;
        let header = WorkSizeHeader::parse(&original)?;
        Ok(Self {
            path,
            file,
            original,
            header,
        })
    }

    /// Path of the test case
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Header as it was when the file was opened
    #[must_use]
    pub const fn original_header(&self) -> &WorkSizeHeader {
        &self.header
    }

    fn replace_content(&mut self, content: &str) -> ReduceResult<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.set_len(0)?;
        self.file.write_all(content.as_bytes())?;
        self.file.flush()?;
        Ok(())
    }

    /// Replace the header sizes, keeping the free text and the body
    pub fn rewrite(&mut self, global: WorkSize, local: WorkSize) -> ReduceResult<()> {
        let content = replace_header(&self.original, &self.header.with_sizes(global, local))?;
        debug!(path = %self.path.display(), %global, %local, "rewrote header");
        self.replace_content(&content)
    }

    /// Put back the content the file had when opened
    pub fn restore(&mut self) -> ReduceResult<()> {
        let original = std::mem::take(&mut self.original);
        let result = self.replace_content(&original);
        self.original = original;
        result
    }

    /// Search for the smallest interesting sizes.
    ///
    /// Returns `Ok(true)` when a candidate was accepted (or, unchecked,
    /// written). Returns `Ok(false)` after restoring the original content
    /// when the candidates catch up with the original sizes.
    pub fn run<T>(mut self, mode: ReductionMode, test: &mut T) -> ReduceResult<bool>
    where
        T: InterestingnessTest + ?Sized,
    {
        if mode == ReductionMode::Unchecked {
            self.rewrite(WorkSize::ONE, WorkSize::ONE)?;
            info!(path = %self.path.display(), "work sizes set to 1,1,1 unchecked");
            return Ok(true);
        }

        let original_global = self.header.global;
        let original_local = self.header.local;
        let (mut global, mut local) = (WorkSize::ONE, WorkSize::ONE);
        let mut steps = 0_u64;

        loop {
            steps += 1;
            self.rewrite(global, local)?;
            if test.is_interesting(&self.path) {
                info!(path = %self.path.display(), %global, %local, steps, "work sizes reduced");
                return Ok(true);
            }

            (global, local) = grow(global, local);
            let exceeds = global
                .0
                .iter()
                .zip(original_global.0.iter())
                .any(|(candidate, original)| candidate > original);
            if exceeds || (global == original_global && local == original_local) {
                self.restore()?;
                info!(path = %self.path.display(), steps, "work sizes unchanged");
                return Ok(false);
            }
        }
    }
}

/// Reduce the work sizes of the test case at `path`
pub fn reduce_work_sizes<T>(path: impl AsRef<Path>, mode: ReductionMode, test: &mut T) -> ReduceResult<bool>
where
    T: InterestingnessTest + ?Sized,
{
    WorkSizeReducer::open(path)?.run(mode, test)
}

impl std::str::FromStr for ReductionMode {
    type Err = ReduceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checked" => Ok(Self::Checked),
            "unchecked" => Ok(Self::Unchecked),
            other => Err(ReduceError::config(format!("unknown reduction mode '{other}'"))),
        }
    }
}
