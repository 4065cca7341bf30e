//! Seams between the orchestrator and the outside world.
//!
//! The pipeline only talks to git and to the analyzer through these traits,
//! so tests can swap in local fakes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use conform_core::{ConformError, ModelHealth, SpecDocument};
use conform_repo::{GitClient, PublishRequest};
use conform_review::{AnalysisReport, ComplianceAnalyzer};
use serde_json::{Map, Value};

/// Cloning, publishing and scratch-space management.
#[async_trait]
pub trait RepositoryCollaborator: Send + Sync {
    /// Shallow-clone `branch` of `url` into the scratch directory for `key`.
    async fn clone_repo(&self, url: &str, branch: &str, key: &str)
        -> Result<PathBuf, ConformError>;

    /// Commit and push one file to a repository.
    async fn publish_file(&self, request: &PublishRequest) -> Result<(), ConformError>;

    /// Remove a scratch directory. A missing directory is not an error.
    fn release_workspace(&self, path: &Path) -> Result<(), ConformError>;

    /// Scratch directory that a clone for `key` would use.
    fn workspace_for(&self, key: &str) -> Result<PathBuf, ConformError>;

    /// HEAD commit of a clone.
    fn head_commit(&self, path: &Path) -> Option<String>;

    /// Strings that must be scrubbed from anything reported about `url`.
    fn secrets(&self, url: &str) -> Vec<String>;
}

/// Judges specifications against a clone.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(
        &self,
        repo: &Path,
        specs: &[SpecDocument],
        target_paths: Option<&[String]>,
        options: &Map<String, Value>,
    ) -> Result<AnalysisReport, ConformError>;

    async fn model_health(&self) -> ModelHealth;

    fn model_name(&self) -> &str;
}

#[async_trait]
impl RepositoryCollaborator for GitClient {
    async fn clone_repo(
        &self,
        url: &str,
        branch: &str,
        key: &str,
    ) -> Result<PathBuf, ConformError> {
        GitClient::clone_repo(self, url, branch, key).await
    }

    async fn publish_file(&self, request: &PublishRequest) -> Result<(), ConformError> {
        GitClient::publish_file(self, request).await
    }

    fn release_workspace(&self, path: &Path) -> Result<(), ConformError> {
        GitClient::release_workspace(self, path)
    }

    fn workspace_for(&self, key: &str) -> Result<PathBuf, ConformError> {
        GitClient::workspace_for(self, key)
    }

    fn head_commit(&self, path: &Path) -> Option<String> {
        GitClient::head_commit(path)
    }

    fn secrets(&self, url: &str) -> Vec<String> {
        GitClient::secrets(self, url)
    }
}

#[async_trait]
impl Analyzer for ComplianceAnalyzer {
    async fn analyze(
        &self,
        repo: &Path,
        specs: &[SpecDocument],
        target_paths: Option<&[String]>,
        options: &Map<String, Value>,
    ) -> Result<AnalysisReport, ConformError> {
        ComplianceAnalyzer::analyze(self, repo, specs, target_paths, options).await
    }

    async fn model_health(&self) -> ModelHealth {
        ComplianceAnalyzer::model_health(self).await
    }

    fn model_name(&self) -> &str {
        ComplianceAnalyzer::model_name(self)
    }
}
