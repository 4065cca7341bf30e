//! Clone, commit and push via the `git` executable.
//!
//! Every invocation runs with `GIT_TERMINAL_PROMPT=0`, is killed when its
//! deadline passes, and has its output scrubbed of credentials before it
//! reaches an error or a log line.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use conform_core::{redact_secrets, secrets_for, ConformError, GitConfig};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::workspace::{check_relative_path, resolve_inside, Workspace};

/// Settings for [`GitClient`].
///
/// # Examples
///
/// ```
/// use conform_core::GitConfig;
/// use conform_repo::GitSettings;
///
/// let settings = GitSettings::from(&GitConfig::default());
/// assert_eq!(settings.clone_timeout.as_secs(), 300);
/// assert_eq!(settings.user_name, "Spec Checker Bot");
/// ```
#[derive(Debug, Clone)]
pub struct GitSettings {
    /// Scratch root for all clones.
    pub workspace_root: PathBuf,
    /// Token injected into https URLs.
    pub token: Option<String>,
    /// Committer name.
    pub user_name: String,
    /// Committer email.
    pub user_email: String,
    /// Deadline for `git clone`.
    pub clone_timeout: Duration,
    /// Deadline for `git push`.
    pub push_timeout: Duration,
}

impl From<&GitConfig> for GitSettings {
    fn from(config: &GitConfig) -> Self {
        Self {
            workspace_root: config.workspace_root.clone(),
            token: config.token.clone(),
            user_name: config.user_name.clone(),
            user_email: config.user_email.clone(),
            clone_timeout: Duration::from_secs(config.clone_timeout_secs),
            push_timeout: Duration::from_secs(config.push_timeout_secs),
        }
    }
}

/// A file to commit into a repository.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    /// Destination repository.
    pub repo_url: String,
    /// Branch to commit to.
    pub branch: String,
    /// Path of the file, relative to the repository root.
    pub path: String,
    /// New file content.
    pub content: String,
    /// Commit message.
    pub message: String,
    /// Largest accepted content size in bytes.
    pub max_bytes: usize,
}

/// Commit message used when publishing a compliance report.
///
/// # Examples
///
/// ```
/// use conform_repo::commit_message;
///
/// let msg = commit_message("https://github.com/o/r.git", "chk_1", "main", "2024-01-01T00:00:00Z");
/// assert!(msg.starts_with("chore: Update compliance check results for https://github.com/o/r.git\n\n"));
/// assert!(msg.contains("- Check ID: chk_1\n"));
/// assert!(msg.ends_with("- Timestamp: 2024-01-01T00:00:00Z"));
/// ```
pub fn commit_message(
    repository_url: &str,
    check_id: &str,
    branch: &str,
    timestamp: &str,
) -> String {
    format!(
        "chore: Update compliance check results for {repository_url}\n\n\
         - Check ID: {check_id}\n\
         - Branch: {branch}\n\
         - Timestamp: {timestamp}"
    )
}

/// Version string of the installed `git`, if it can be run.
pub async fn git_version() -> Option<String> {
    let out = Command::new("git").arg("--version").output().await.ok()?;
    out.status
        .success()
        .then(|| String::from_utf8_lossy(&out.stdout).trim().to_string())
}

/// Insert `token` as userinfo into an https URL that has none.
fn authenticated_url(url: &str, token: Option<&str>) -> String {
    match (token.filter(|t| !t.is_empty()), url.strip_prefix("https://")) {
        (Some(token), Some(rest)) if !rest.split('/').next().unwrap_or("").contains('@') => {
            format!("https://{token}@{rest}")
        }
        _ => url.to_string(),
    }
}

/// Git adapter for cloning checked repositories and publishing reports.
#[derive(Debug, Clone)]
pub struct GitClient {
    settings: GitSettings,
    workspace: Workspace,
}

impl GitClient {
    /// Create a client. The workspace root is created lazily.
    pub fn new(settings: GitSettings) -> Self {
        let workspace = Workspace::new(settings.workspace_root.clone());
        Self {
            settings,
            workspace,
        }
    }

    /// The scratch workspace used for clones.
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Deterministic clone directory for a check.
    ///
    /// # Errors
    ///
    /// Returns [`ConformError::Validation`] if `key` is not a plain identifier.
    pub fn workspace_for(&self, key: &str) -> Result<PathBuf, ConformError> {
        self.workspace.repo_dir(key)
    }

    /// Credentials that must never appear in output about `url`.
    pub fn secrets(&self, url: &str) -> Vec<String> {
        secrets_for(url, self.settings.token.as_deref())
    }

    /// Shallow-clone `branch` of `url` into the check's workspace directory.
    ///
    /// A partial clone is removed before an error is returned.
    ///
    /// # Errors
    ///
    /// - [`ConformError::Timeout`] when the clone exceeds its deadline
    /// - [`ConformError::CloneFailed`] with redacted `git` output otherwise
    pub async fn clone_repo(
        &self,
        url: &str,
        branch: &str,
        key: &str,
    ) -> Result<PathBuf, ConformError> {
        let target = self.workspace.repo_dir(key)?;
        let secrets = self.secrets(url);
        let parent = target
            .parent()
            .ok_or_else(|| ConformError::Internal("clone target has no parent".into()))?;
        std::fs::create_dir_all(parent)?;
        if target.exists() {
            self.workspace.release(&target)?;
        }

        info!(
            url = %redact_secrets(url, &secrets),
            branch,
            "cloning repository"
        );
        let auth_url = authenticated_url(url, self.settings.token.as_deref());
        let result = run_git(
            None,
            &[
                "clone",
                "--depth",
                "1",
                "--branch",
                branch,
                "--single-branch",
                &auth_url,
                &target.to_string_lossy(),
            ],
            self.settings.clone_timeout,
            "git clone",
            &secrets,
        )
        .await;

        match result {
            Ok(_) => {
                info!(path = %target.display(), "cloned repository");
                Ok(target)
            }
            Err(e) => {
                if let Err(cleanup) = self.workspace.release(&target) {
                    warn!(error = %cleanup, "failed to remove partial clone");
                }
                Err(match e {
                    ConformError::Internal(msg) => ConformError::CloneFailed(msg),
                    other => other,
                })
            }
        }
    }

    /// Commit `request.content` to `request.path` in `request.repo_url` and push.
    ///
    /// Nothing is committed when the file already has that content. The
    /// scratch clone is removed on every path.
    ///
    /// # Errors
    ///
    /// - [`ConformError::PublishFailed`] for invalid paths, oversized content,
    ///   or any failing `git` step (redacted)
    /// - [`ConformError::Timeout`] when clone or push exceed their deadline
    pub async fn publish_file(&self, request: &PublishRequest) -> Result<(), ConformError> {
        check_relative_path(&request.path)
            .map_err(|e| ConformError::PublishFailed(e.to_string()))?;
        if request.content.len() > request.max_bytes {
            return Err(ConformError::PublishFailed(format!(
                "report is {} bytes, larger than the {} byte limit",
                request.content.len(),
                request.max_bytes
            )));
        }

        let workdir = self.workspace.publish_dir();
        if let Some(parent) = workdir.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let result = self.publish_in(&workdir, request).await;
        if let Err(e) = self.workspace.release(&workdir) {
            warn!(path = %workdir.display(), error = %e, "failed to remove publish clone");
        }
        result.map_err(|e| match e {
            ConformError::Internal(msg) => ConformError::PublishFailed(msg),
            ConformError::Validation(msg) => ConformError::PublishFailed(msg),
            other => other,
        })
    }

    async fn publish_in(
        &self,
        workdir: &Path,
        request: &PublishRequest,
    ) -> Result<(), ConformError> {
        let secrets = self.secrets(&request.repo_url);
        let auth_url = authenticated_url(&request.repo_url, self.settings.token.as_deref());

        run_git(
            None,
            &[
                "clone",
                "--depth",
                "1",
                "--branch",
                &request.branch,
                "--single-branch",
                &auth_url,
                &workdir.to_string_lossy(),
            ],
            self.settings.clone_timeout,
            "git clone",
            &secrets,
        )
        .await?;

        let target = resolve_inside(workdir, &request.path)?;
        tokio::fs::write(&target, &request.content).await?;

        let local = self.settings.push_timeout;
        let steps: [(&[&str], &str); 3] = [
            (
                &["config", "user.name", self.settings.user_name.as_str()],
                "git config",
            ),
            (
                &["config", "user.email", self.settings.user_email.as_str()],
                "git config",
            ),
            (&["add", "--", request.path.as_str()], "git add"),
        ];
        for (args, operation) in steps {
            run_git(Some(workdir), args, local, operation, &secrets).await?;
        }

        let status = run_git(
            Some(workdir),
            &["status", "--porcelain"],
            local,
            "git status",
            &secrets,
        )
        .await?;
        if status.stdout.iter().all(u8::is_ascii_whitespace) {
            info!(path = %request.path, "report unchanged, nothing to publish");
            return Ok(());
        }

        run_git(
            Some(workdir),
            &["commit", "-m", &request.message],
            local,
            "git commit",
            &secrets,
        )
        .await?;
        let refspec = format!("HEAD:{}", request.branch);
        run_git(
            Some(workdir),
            &["push", "origin", &refspec],
            self.settings.push_timeout,
            "git push",
            &secrets,
        )
        .await?;

        info!(
            repo = %redact_secrets(&request.repo_url, &secrets),
            path = %request.path,
            "published report"
        );
        Ok(())
    }

    /// Remove a clone created by this client. Paths outside the workspace
    /// root are refused; a missing path is fine.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is outside the root or cannot be removed.
    pub fn release_workspace(&self, path: &Path) -> Result<(), ConformError> {
        self.workspace.release(path)
    }

    /// Full SHA of `HEAD` in the repository at `path`, if readable.
    pub fn head_commit(path: &Path) -> Option<String> {
        let repo = git2::Repository::open(path).ok()?;
        let commit = repo.head().ok()?.peel_to_commit().ok()?;
        Some(commit.id().to_string())
    }
}

/// Run `git` with a deadline. Non-zero exit becomes [`ConformError::Internal`]
/// carrying redacted stderr; callers map it to their own variant.
async fn run_git(
    cwd: Option<&Path>,
    args: &[&str],
    timeout: Duration,
    operation: &str,
    secrets: &[String],
) -> Result<Output, ConformError> {
    let mut cmd = Command::new("git");
    cmd.args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    debug!(operation, "running git");

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(ConformError::Internal(redact_secrets(
                &format!("failed to run git: {e}"),
                secrets,
            )))
        }
        Err(_) => {
            warn!(operation, seconds = timeout.as_secs(), "git timed out");
            return Err(ConformError::Timeout {
                operation: operation.to_string(),
                seconds: timeout.as_secs(),
            });
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = if stderr.trim().is_empty() {
            format!("{operation} exited with {}", output.status)
        } else {
            stderr.trim().to_string()
        };
        return Err(ConformError::Internal(redact_secrets(&detail, secrets)));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{IndexAddOption, Repository, RepositoryInitOptions, Signature};
    use std::fs;
    use tempfile::TempDir;

    fn init_repo(files: &[(&str, &str)]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(dir.path(), &opts).unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
            .unwrap();
        dir
    }

    fn bare_copy(source: &Path) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let status = std::process::Command::new("git")
            .args(["clone", "--bare", "--quiet"])
            .arg(source)
            .arg(dir.path().join("origin.git"))
            .status()
            .unwrap();
        assert!(status.success());
        dir
    }

    fn file_url(path: &Path) -> String {
        format!("file://{}", path.display())
    }

    fn client(root: &Path) -> GitClient {
        GitClient::new(GitSettings {
            workspace_root: root.to_path_buf(),
            token: None,
            user_name: "Bot".into(),
            user_email: "bot@example.com".into(),
            clone_timeout: Duration::from_secs(60),
            push_timeout: Duration::from_secs(60),
        })
    }

    #[test]
    fn token_inserted_only_into_https_without_userinfo() {
        assert_eq!(
            authenticated_url("https://github.com/o/r.git", Some("tok")),
            "https://tok@github.com/o/r.git"
        );
        assert_eq!(
            authenticated_url("https://me@github.com/o/r.git", Some("tok")),
            "https://me@github.com/o/r.git"
        );
        assert_eq!(
            authenticated_url("git@github.com:o/r.git", Some("tok")),
            "git@github.com:o/r.git"
        );
        assert_eq!(
            authenticated_url("https://github.com/o/r.git", None),
            "https://github.com/o/r.git"
        );
    }

    #[tokio::test]
    async fn clone_checks_out_branch_into_workspace() {
        let source = init_repo(&[("spec/api.md", "FR-1: do things\n")]);
        let root = tempfile::tempdir().unwrap();
        let git = client(root.path());

        let path = git
            .clone_repo(&file_url(source.path()), "main", "chk_one")
            .await
            .unwrap();
        assert_eq!(path, git.workspace_for("chk_one").unwrap());
        assert!(path.join("spec/api.md").is_file());
        assert_eq!(GitClient::head_commit(&path).unwrap().len(), 40);

        git.release_workspace(&path).unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn clone_of_missing_branch_fails_and_cleans_up() {
        let source = init_repo(&[("README.md", "hi")]);
        let root = tempfile::tempdir().unwrap();
        let git = client(root.path());

        let err = git
            .clone_repo(&file_url(source.path()), "no-such-branch", "chk_two")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CLONE_FAILED");
        assert!(!git.workspace_for("chk_two").unwrap().exists());
    }

    #[tokio::test]
    async fn clone_error_never_contains_token() {
        let root = tempfile::tempdir().unwrap();
        let mut settings = client(root.path()).settings;
        settings.token = Some("sekr3t-token".into());
        let git = GitClient::new(settings);

        let err = git
            .clone_repo("https://127.0.0.1:9/o/r.git", "main", "chk_three")
            .await
            .unwrap_err();
        assert!(!err.to_string().contains("sekr3t-token"), "{err}");
    }

    #[tokio::test]
    async fn publish_commits_and_pushes_then_skips_when_unchanged() {
        let seed = init_repo(&[("README.md", "specs")]);
        let remote = bare_copy(seed.path());
        let origin = remote.path().join("origin.git");
        let root = tempfile::tempdir().unwrap();
        let git = client(root.path());

        let request = PublishRequest {
            repo_url: file_url(&origin),
            branch: "main".into(),
            path: "TODO.md".into(),
            content: "# TODO\n".into(),
            message: commit_message("https://example.com/x.git", "chk_1", "main", "now"),
            max_bytes: 1024,
        };
        git.publish_file(&request).await.unwrap();

        let repo = Repository::open_bare(&origin).unwrap();
        let head = repo
            .find_reference("refs/heads/main")
            .unwrap()
            .peel_to_commit()
            .unwrap();
        assert!(head.message().unwrap().contains("Check ID: chk_1"));
        let first = head.id();

        git.publish_file(&request).await.unwrap();
        let again = repo
            .find_reference("refs/heads/main")
            .unwrap()
            .peel_to_commit()
            .unwrap();
        assert_eq!(again.id(), first);

        let publish_root = root.path().join("publish");
        assert_eq!(fs::read_dir(publish_root).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn publish_rejects_bad_path_and_oversized_content() {
        let root = tempfile::tempdir().unwrap();
        let git = client(root.path());
        let mut request = PublishRequest {
            repo_url: "https://127.0.0.1:9/o/r.git".into(),
            branch: "main".into(),
            path: "../escape.md".into(),
            content: "x".into(),
            message: "m".into(),
            max_bytes: 10,
        };
        let err = git.publish_file(&request).await.unwrap_err();
        assert_eq!(err.code(), "PUBLISH_FAILED");
        assert!(err.to_string().contains("outside the repository"));

        request.path = "TODO.md".into();
        request.content = "x".repeat(11);
        let err = git.publish_file(&request).await.unwrap_err();
        assert!(err.to_string().contains("byte limit"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn publish_refuses_symlinked_report_path() {
        let outside = tempfile::tempdir().unwrap();
        let victim = outside.path().join("victim.txt");
        fs::write(&victim, "original").unwrap();

        let seed = init_repo(&[("README.md", "specs")]);
        std::os::unix::fs::symlink(&victim, seed.path().join("TODO.md")).unwrap();
        let repo = Repository::open(seed.path()).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("TODO.md")).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let parent = repo.head().unwrap().peel_to_commit().unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "link", &tree, &[&parent])
            .unwrap();

        let remote = bare_copy(seed.path());
        let origin = remote.path().join("origin.git");
        let root = tempfile::tempdir().unwrap();
        let git = client(root.path());
        let request = PublishRequest {
            repo_url: file_url(&origin),
            branch: "main".into(),
            path: "TODO.md".into(),
            content: "overwritten".into(),
            message: "m".into(),
            max_bytes: 1024,
        };

        let err = git.publish_file(&request).await.unwrap_err();
        assert_eq!(err.code(), "PUBLISH_FAILED");
        assert!(err.to_string().contains("symlink"));
        assert_eq!(fs::read_to_string(&victim).unwrap(), "original");
    }

    #[test]
    fn head_commit_of_non_repo_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(GitClient::head_commit(dir.path()).is_none());
    }
}
