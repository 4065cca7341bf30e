//! Check orchestration: the lifecycle of a compliance check.
//!
//! A check moves `started → running → completed | failed`. [`Orchestrator::start`]
//! records the check and returns at once; a detached task runs the pipeline
//! (clone, load specs, analyze, render, publish, release) and is the only
//! writer of that check's record.

mod collaborators;
mod orchestrator;
mod pipeline;
mod store;

pub use collaborators::{Analyzer, RepositoryCollaborator};
pub use orchestrator::{Orchestrator, OrchestratorSettings, PublishTarget};
pub use store::{CheckPage, CheckStore, CheckWriter, ListFilter, MAX_PAGE_SIZE};
