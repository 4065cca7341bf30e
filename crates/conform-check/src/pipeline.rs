use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use conform_core::{redact_secrets, CheckRequest, ConformError, ResultSummary};
use conform_repo::{commit_message, PublishRequest};
use conform_review::{load_specs, render_todo, ReportContext};
use tracing::{info, warn};

use crate::collaborators::RepositoryCollaborator;
use crate::orchestrator::Inner;
use crate::store::CheckWriter;

/// Message stored in place of errors that carry internal detail.
const INTERNAL_FAILURE: &str = "internal error during check";

/// A scratch clone owned by one pipeline run. The normal path calls
/// [`CloneLease::release`]; the drop releases it only if that never ran.
struct CloneLease {
    repo: Arc<dyn RepositoryCollaborator>,
    path: Option<PathBuf>,
}

impl CloneLease {
    async fn release(mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        let repo = Arc::clone(&self.repo);
        let shown = path.display().to_string();
        match tokio::task::spawn_blocking(move || repo.release_workspace(&path)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(path = %shown, error = %e, "failed to release clone"),
            Err(e) => warn!(path = %shown, error = %e, "clone release task failed"),
        }
    }
}

impl Drop for CloneLease {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = self.repo.release_workspace(&path) {
                warn!(path = %path.display(), error = %e, "failed to release clone");
            }
        }
    }
}

/// Run one check to completion. Every outcome ends in `writer` being
/// finished, either here or by its drop guard.
pub(crate) async fn run(inner: &Inner, writer: CheckWriter, request: CheckRequest) {
    let secrets = inner.repo.secrets(&request.repository_url);
    let id = writer.id().clone();
    info!(check_id = %id, branch = %request.branch, "check running");

    writer.advance(10, "Cloning repository...");
    let clone = match inner
        .repo
        .clone_repo(&request.repository_url, &request.branch, id.as_str())
        .await
    {
        Ok(path) => path,
        Err(e) => return fail(writer, &e, &secrets),
    };
    let lease = CloneLease {
        repo: Arc::clone(&inner.repo),
        path: Some(clone.clone()),
    };

    let outcome = stages(inner, &writer, &request, &clone, &secrets).await;
    lease.release().await;

    match outcome {
        Ok((summary, report)) => {
            info!(
                check_id = %id,
                issues = summary.total_issues,
                published = summary.todo_file_url.is_some(),
                "check completed"
            );
            writer.complete(summary, report);
        }
        Err(e) => fail(writer, &e, &secrets),
    }
}

fn fail(writer: CheckWriter, error: &ConformError, secrets: &[String]) {
    let detail = redact_secrets(&error.to_string(), secrets);
    warn!(check_id = %writer.id(), code = error.code(), error = %detail, "check failed");
    if error.is_internal() {
        writer.fail(INTERNAL_FAILURE);
    } else {
        writer.fail(detail);
    }
}

async fn stages(
    inner: &Inner,
    writer: &CheckWriter,
    request: &CheckRequest,
    clone: &Path,
    secrets: &[String],
) -> Result<(ResultSummary, String), ConformError> {
    writer.advance(30, "Loading specifications...");
    let specs = {
        let path = clone.to_path_buf();
        let files = request.spec_files.clone();
        tokio::task::spawn_blocking(move || load_specs(&path, files.as_deref()))
            .await
            .map_err(|e| ConformError::Internal(format!("specification loader stopped: {e}")))??
    };

    writer.advance(50, "Analyzing code...");
    let analysis = inner
        .analyzer
        .analyze(
            clone,
            &specs,
            request.target_paths.as_deref(),
            &request.options,
        )
        .await?;

    writer.advance(80, "Generating report...");
    let commit = inner.repo.head_commit(clone);
    let context = ReportContext {
        repository_url: redact_secrets(&request.repository_url, secrets),
        branch: request.branch.clone(),
        check_id: writer.id().to_string(),
        commit: commit.clone(),
        generated_at: Utc::now(),
    };
    let report = render_todo(&context, &analysis.issues);

    let mut summary = ResultSummary::from_issues(&analysis.issues);
    summary.files_analyzed = analysis.stats.files_analyzed;
    summary.specs_checked = analysis.stats.specs_checked;
    summary.requirements_checked = analysis.stats.requirements_checked;
    summary.commit_sha = commit;

    if let Some(target) = &inner.publish {
        writer.advance(90, "Publishing report...");
        let publish = PublishRequest {
            repo_url: target.repo_url.clone(),
            branch: target.branch.clone(),
            path: target.path.clone(),
            content: report.clone(),
            message: commit_message(
                &context.repository_url,
                writer.id().as_str(),
                &request.branch,
                &context.generated_at.to_rfc3339(),
            ),
            max_bytes: target.max_bytes,
        };
        match inner.repo.publish_file(&publish).await {
            Ok(()) => summary.todo_file_url = Some(target.file_url()),
            Err(e) => {
                let mut all_secrets = secrets.to_vec();
                all_secrets.extend(inner.repo.secrets(&target.repo_url));
                let message = redact_secrets(&e.to_string(), &all_secrets);
                warn!(check_id = %writer.id(), error = %message, "failed to publish report");
                summary.publish_error = Some(message);
            }
        }
    }

    Ok((summary, report))
}
