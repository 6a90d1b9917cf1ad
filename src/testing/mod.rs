//! Test doubles for checks and the pipeline.
//!
//! - [`MockRunner`]: scripted process results, recorded command lines
//! - [`ScriptedConfirmer`]: scripted yes/no answers, or an operator abort
//! - [`StubCheck`]: a check with scripted results and fixer behaviour
//! - `ProjectFixture` (test-only): temporary project trees
//!
//! # Example
//!
//! ```rust,ignore
//! use commitguard::testing::{MockRunner, ScriptedConfirmer, StubCheck};
//!
//! let runner = MockRunner::new().on("git diff --cached", CommandOutput::ok("a.py\n"));
//! let confirmer = ScriptedConfirmer::always(true);
//! let linter = StubCheck::failing("Linter", "style").with_fixer(true);
//! ```

#[cfg(test)]
pub mod fixtures;
pub mod mocks;

#[cfg(test)]
pub use fixtures::*;
pub use mocks::*;
