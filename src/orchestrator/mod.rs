//! Pipeline orchestration: sequential document runs over one working tree.

pub mod runner;
pub mod state;

pub use runner::{Orchestrator, relative_document};
pub use state::{DocumentReport, DocumentResult, RunReport, WorktreeLock};
