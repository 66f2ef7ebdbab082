//! clreduce: interestingness testing for OpenCL wrong-code reduction
//!
//! A delta debugger shrinks a miscompiled OpenCL kernel by repeatedly
//! asking whether the smaller candidate still shows the bug. This crate
//! answers that question. It runs the kernel under a checking emulator to
//! get a trusted reference, runs it directly on the device under test, and
//! compares the two. Static validators reject candidates whose reduction
//! introduced undefined behaviour, so the reducer cannot drift from a
//! compiler bug into a broken program.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────────────┐
//! │  TestCase    │──►│ validators   │──►│ WrongCodeOracle          │
//! │  (header +   │   │ (text, clang │   │  reference: emulator x2  │
//! │   kernel)    │   │  analyzer)   │   │  compare: launcher x1..2 │
//! └──────────────┘   └──────────────┘   └────────────┬─────────────┘
//!                                                    │ Verdict
//!                           ┌────────────────────────┴──────────┐
//!                           ▼                                   ▼
//!                   strict (exit 0/1/255/254)     permissive (exit 0/1),
//!                                                 WorkSizeReducer
//! ```
//!
//! Every external tool goes through a [`ProcessRunner`], so the oracle can
//! be driven by a [`ScriptedRunner`] in tests.

#![warn(missing_docs)]

pub mod backends;
pub mod config;
pub mod oracle;
pub mod process;
mod result;
pub mod test_case;
pub mod validators;
pub mod work_size;

pub use backends::{Backends, LaunchFailure, LaunchResult, Optimisation};
pub use config::{EmulatorMode, ExecutionConfig, OptimisationLevel, OptionValue, Options};
pub use oracle::{Dialect, InterestingnessTest, InvalidTestCase, Stage, Verdict, WrongCodeOracle};
pub use process::{
    Invocation, ProcessOutcome, ProcessResult, ProcessRunner, ScriptedRunner, SystemRunner,
};
pub use result::{ReduceError, ReduceResult};
pub use test_case::{TestCase, WorkSize, WorkSizeHeader};
pub use validators::StaticChecker;
pub use work_size::{reduce_work_sizes, ReductionMode, WorkSizeReducer};
