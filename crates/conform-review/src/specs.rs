use std::path::Path;

use conform_core::{ConformError, SpecDocument};
use tracing::{info, warn};

/// Directory scanned when no explicit spec list is given.
pub const SPEC_DIR: &str = "spec";

/// Load specification documents from a cloned repository.
///
/// With an explicit list, each entry that exists and resolves inside `repo`
/// is loaded; missing or escaping entries are skipped with a warning. Without
/// one, every `*.md` directly under `spec/` is loaded in name order. A missing
/// `spec/` directory yields an empty list. Content is decoded lossily.
///
/// # Errors
///
/// Returns [`ConformError::Io`] if `repo` itself cannot be resolved.
///
/// # Examples
///
/// ```
/// use conform_review::load_specs;
///
/// let dir = tempfile::tempdir().unwrap();
/// std::fs::create_dir(dir.path().join("spec")).unwrap();
/// std::fs::write(dir.path().join("spec/api.md"), "FR-1: serve").unwrap();
///
/// let specs = load_specs(dir.path(), None).unwrap();
/// assert_eq!(specs.len(), 1);
/// assert_eq!(specs[0].path, "spec/api.md");
/// ```
pub fn load_specs(
    repo: &Path,
    spec_files: Option<&[String]>,
) -> Result<Vec<SpecDocument>, ConformError> {
    let root = repo.canonicalize()?;
    let specs = match spec_files {
        Some(files) if !files.is_empty() => load_listed(&root, files),
        _ => load_spec_dir(&root)?,
    };
    info!(count = specs.len(), "loaded specifications");
    Ok(specs)
}

fn load_listed(root: &Path, files: &[String]) -> Vec<SpecDocument> {
    let mut specs = Vec::new();
    for file in files {
        let Ok(path) = root.join(file).canonicalize() else {
            warn!(spec = %file, "specification file not found");
            continue;
        };
        if !path.starts_with(root) || !path.is_file() {
            warn!(spec = %file, "specification file is not a file inside the repository");
            continue;
        }
        match read_lossy(&path) {
            Ok(content) => specs.push(SpecDocument {
                path: file.trim_start_matches("./").to_string(),
                content,
            }),
            Err(e) => warn!(spec = %file, error = %e, "failed to read specification"),
        }
    }
    specs
}

fn load_spec_dir(root: &Path) -> Result<Vec<SpecDocument>, ConformError> {
    let dir = root.join(SPEC_DIR);
    if !dir.is_dir() {
        warn!(repo = %root.display(), "no spec directory found");
        return Ok(Vec::new());
    }

    let mut names: Vec<String> = std::fs::read_dir(&dir)?
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| name.ends_with(".md"))
        .collect();
    names.sort();

    let mut specs = Vec::with_capacity(names.len());
    for name in names {
        match read_lossy(&dir.join(&name)) {
            Ok(content) => specs.push(SpecDocument {
                path: format!("{SPEC_DIR}/{name}"),
                content,
            }),
            Err(e) => warn!(spec = %name, error = %e, "failed to read specification"),
        }
    }
    Ok(specs)
}

fn read_lossy(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
