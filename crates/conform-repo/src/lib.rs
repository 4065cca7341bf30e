//! Git access and scratch workspace management.
//!
//! - [`git`]: clone, commit and push through the `git` executable, with timeouts
//! - [`workspace`]: per-check scratch directories and safe removal

pub mod git;
pub mod workspace;

pub use git::{commit_message, git_version, GitClient, GitSettings, PublishRequest};
pub use workspace::Workspace;
