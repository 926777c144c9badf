pub mod bisect;
pub mod config;
pub mod error;
pub mod git;
pub mod graph;
pub mod log;
pub mod outcome;
pub mod rebase;
pub mod reflog;
pub mod sequencer;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

pub use bisect::{BisectEngine, BisectReport, BisectSession};
pub use config::Config;
pub use error::{Error, Result};
pub use git::GitBackend;
pub use graph::{CommitGraph, CommitId};
pub use outcome::Outcome;
pub use rebase::{DisplayFormat, RebaseEngine, RebaseInstruction};
pub use reflog::ReflogEngine;
pub use tools::Tools;
