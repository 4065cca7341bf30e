//! Core types, configuration, and error handling for the conform service.
//!
//! This crate provides the shared foundation used by all other conform crates:
//! - [`ConformError`]: unified error type using `thiserror`
//! - [`ConformConfig`]: configuration loaded from `.conform.toml` and the environment
//! - Shared types: [`CheckRecord`], [`CheckStatus`], [`Issue`], [`Severity`],
//!   [`SpecDocument`], [`ModelHealth`]
//! - Request validation, secret redaction and requirement extraction

mod config;
mod error;
mod redact;
mod requirements;
mod types;
mod validate;

pub use config::{
    AnalysisConfig, ConformConfig, GitConfig, LlmConfig, PublishConfig, ServerConfig,
};
pub use error::ConformError;
pub use redact::{redact_secrets, secrets_for, url_userinfo, REDACTED};
pub use requirements::{extract_requirements, Requirement};
pub use types::{
    repository_name, sort_issues, CheckId, CheckRecord, CheckRequest, CheckStatus, Issue,
    IssueKind, ModelHealth, ModelStatus, OutputFormat, ResultSummary, Severity, SpecDocument,
    DEFAULT_BRANCH,
};
pub use validate::{validate_check_request, validate_git_url};

/// A convenience `Result` type for conform operations.
pub type Result<T> = std::result::Result<T, ConformError>;
