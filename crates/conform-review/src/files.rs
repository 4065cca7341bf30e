use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use conform_core::ConformError;
use tracing::{debug, warn};

/// Directories never descended into.
const SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "vendor",
    "venv",
    "env",
    "__pycache__",
    "build",
    "dist",
    "target",
    ".pytest_cache",
    "coverage",
];

/// Extensions treated as source code.
const CODE_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "java", "go", "rb", "php", "cs", "cpp", "c", "h", "hpp", "rs", "kt", "swift",
    "m",
];

/// A code file discovered in a clone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CodeFile {
    /// Path relative to the repository root, `/`-separated.
    pub relative: String,
    /// Absolute path on disk.
    pub path: PathBuf,
}

/// Returns `true` if `path` has one of the recognised source extensions.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use conform_review::files::is_code_file;
///
/// assert!(is_code_file(Path::new("src/main.rs")));
/// assert!(is_code_file(Path::new("app/server.py")));
/// assert!(!is_code_file(Path::new("README.md")));
/// ```
pub fn is_code_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| CODE_EXTENSIONS.contains(&ext))
}

fn has_glob_meta(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Collect code files under `root`, or under each of `target_paths`.
///
/// Target paths are relative to `root` and may be glob patterns. Targets
/// that do not exist or resolve outside the repository are skipped with a
/// warning. An explicitly named file is included whatever its extension.
/// The result is sorted and free of duplicates.
///
/// # Errors
///
/// Returns [`ConformError::Io`] if `root` cannot be resolved.
pub fn collect_code_files(
    root: &Path,
    target_paths: Option<&[String]>,
) -> Result<Vec<CodeFile>, ConformError> {
    let canonical_root = root.canonicalize()?;
    let mut found = BTreeSet::new();

    let targets: Vec<PathBuf> = match target_paths {
        None => vec![canonical_root.clone()],
        Some(list) if list.is_empty() => vec![canonical_root.clone()],
        Some(list) => list
            .iter()
            .flat_map(|t| expand_target(&canonical_root, t))
            .collect(),
    };

    for target in targets {
        let Ok(resolved) = target.canonicalize() else {
            warn!(target = %target.display(), "target path does not exist");
            continue;
        };
        if !resolved.starts_with(&canonical_root) {
            warn!(target = %target.display(), "target path is outside the repository");
            continue;
        }
        if resolved.is_file() {
            insert(&mut found, &canonical_root, resolved);
        } else if resolved.is_dir() {
            walk_dir(&mut found, &canonical_root, &resolved);
        }
    }

    debug!(count = found.len(), "collected code files");
    Ok(found.into_iter().collect())
}

fn expand_target(root: &Path, target: &str) -> Vec<PathBuf> {
    let trimmed = target.trim_start_matches("./");
    if !has_glob_meta(trimmed) {
        return vec![root.join(trimmed)];
    }
    let pattern = root.join(trimmed);
    match glob::glob(&pattern.to_string_lossy()) {
        Ok(paths) => paths.filter_map(Result::ok).collect(),
        Err(e) => {
            warn!(pattern = target, error = %e, "invalid target pattern");
            Vec::new()
        }
    }
}

fn walk_dir(found: &mut BTreeSet<CodeFile>, root: &Path, dir: &Path) {
    let walker = ignore::WalkBuilder::new(dir)
        .hidden(false)
        .filter_entry(|entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir && SKIP_DIRS.contains(&entry.file_name().to_string_lossy().as_ref()))
        })
        .build();

    for entry in walker {
        let Ok(entry) = entry else {
            continue;
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if is_code_file(entry.path()) {
            insert(found, root, entry.into_path());
        }
    }
}

fn insert(found: &mut BTreeSet<CodeFile>, root: &Path, path: PathBuf) {
    let relative = path
        .strip_prefix(root)
        .unwrap_or(&path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    found.insert(CodeFile { relative, path });
}

/// Read at most `max_bytes` from the start of `path`, lossily decoded.
///
/// Returns `None` if the file cannot be read.
pub fn read_prefix(path: &Path, max_bytes: usize) -> Option<String> {
    let file = std::fs::File::open(path).ok()?;
    let mut buf = Vec::with_capacity(max_bytes.min(64 * 1024));
    file.take(max_bytes as u64).read_to_end(&mut buf).ok()?;
    Some(String::from_utf8_lossy(&buf).into_owned())
}
