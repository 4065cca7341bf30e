//! Scratch directories for clones.
//!
//! Every clone lives below one root: checked repositories under
//! `<root>/repos/<key>` and short-lived publish clones under
//! `<root>/publish/<uuid>`. Removal is refused for anything that does not
//! resolve strictly inside the root.

use std::path::{Component, Path, PathBuf};

use conform_core::ConformError;
use tracing::{debug, warn};

/// Scratch workspace rooted at a single directory.
///
/// # Examples
///
/// ```
/// use conform_repo::Workspace;
///
/// let ws = Workspace::new("/tmp/spec-checker");
/// let dir = ws.repo_dir("chk_0123").unwrap();
/// assert!(dir.ends_with("repos/chk_0123"));
/// assert!(ws.repo_dir("../etc").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Create a workspace handle. Nothing is touched on disk.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The configured root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root if needed and return its canonical form.
    ///
    /// # Errors
    ///
    /// Returns [`ConformError::Io`] if the directory cannot be created.
    pub fn ensure_root(&self) -> Result<PathBuf, ConformError> {
        std::fs::create_dir_all(&self.root)?;
        Ok(self.root.canonicalize()?)
    }

    /// Deterministic clone directory for `key` (a check id).
    ///
    /// # Errors
    ///
    /// Returns [`ConformError::Validation`] if `key` is not a plain identifier.
    pub fn repo_dir(&self, key: &str) -> Result<PathBuf, ConformError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(ConformError::Validation(format!(
                "invalid workspace key '{key}'"
            )));
        }
        Ok(self.root.join("repos").join(key))
    }

    /// Fresh directory path for a publish clone.
    pub fn publish_dir(&self) -> PathBuf {
        self.root
            .join("publish")
            .join(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Delete `path` recursively if it lies strictly inside the root.
    ///
    /// A path that does not exist is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConformError::Validation`] for paths outside the root (or
    /// the root itself), and [`ConformError::Io`] if removal fails.
    pub fn release(&self, path: &Path) -> Result<(), ConformError> {
        if !path.exists() {
            debug!(path = %path.display(), "workspace already gone");
            return Ok(());
        }
        let root = self.root.canonicalize()?;
        let target = path.canonicalize()?;
        if target == root || !target.starts_with(&root) {
            warn!(path = %path.display(), "refusing to remove path outside workspace root");
            return Err(ConformError::Validation(format!(
                "path {} is outside the workspace root {}",
                target.display(),
                root.display()
            )));
        }
        std::fs::remove_dir_all(&target)?;
        debug!(path = %target.display(), "released workspace");
        Ok(())
    }
}

/// Check that `relative` is a plain relative path: not empty, not absolute,
/// no `..` components and not inside `.git`.
///
/// # Errors
///
/// Returns [`ConformError::Validation`] describing the problem.
///
/// # Examples
///
/// ```
/// use conform_repo::workspace::check_relative_path;
///
/// assert!(check_relative_path("reports/TODO.md").is_ok());
/// assert!(check_relative_path("../TODO.md").is_err());
/// assert!(check_relative_path("/etc/passwd").is_err());
/// ```
pub fn check_relative_path(relative: &str) -> Result<(), ConformError> {
    let path = Path::new(relative);
    if relative.trim().is_empty() {
        return Err(ConformError::Validation("path must not be empty".into()));
    }
    if path.is_absolute() || path.has_root() {
        return Err(ConformError::Validation(format!(
            "path '{relative}' must be relative"
        )));
    }
    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(ConformError::Validation(format!(
                    "path '{relative}' is outside the repository"
                )))
            }
            Component::Normal(name) if name == ".git" => {
                return Err(ConformError::Validation(format!(
                    "path '{relative}' points into .git"
                )))
            }
            _ => {}
        }
    }
    Ok(())
}

/// Resolve `relative` below `base`, creating parent directories, and verify
/// the result stays inside `base`.
///
/// Containment is checked on the deepest existing ancestor before anything
/// is created, and again on the created parent. An existing symlink at the
/// target is refused so a later write cannot follow it.
///
/// # Errors
///
/// Returns [`ConformError::Validation`] if the path escapes `base`.
pub fn resolve_inside(base: &Path, relative: &str) -> Result<PathBuf, ConformError> {
    check_relative_path(relative)?;
    let canonical_base = base.canonicalize()?;
    let outside =
        || ConformError::Validation(format!("path '{relative}' is outside the repository"));

    let target = canonical_base.join(relative);
    let parent = target
        .parent()
        .ok_or_else(|| ConformError::Validation(format!("path '{relative}' has no parent")))?;

    let existing = parent
        .ancestors()
        .find(|p| p.symlink_metadata().is_ok())
        .unwrap_or(&canonical_base);
    if !existing.canonicalize()?.starts_with(&canonical_base) {
        return Err(outside());
    }
    std::fs::create_dir_all(parent)?;
    if !parent.canonicalize()?.starts_with(&canonical_base) {
        return Err(outside());
    }

    if let Ok(meta) = target.symlink_metadata() {
        if meta.file_type().is_symlink() {
            return Err(ConformError::Validation(format!(
                "path '{relative}' is a symlink"
            )));
        }
    }
    Ok(target)
}
