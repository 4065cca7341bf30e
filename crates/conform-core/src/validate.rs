use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::ConformError;
use crate::types::{CheckRequest, DEFAULT_BRANCH};

static GIT_URL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^https?://[\w\-.]+(:\d+)?/[\w\-./@]+$",
        r"^git@[\w\-.]+:[\w\-./@]+$",
        r"^git://[\w\-.]+(:\d+)?/[\w\-./@]+\.git$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

/// Check that `url` looks like a clonable git repository URL.
///
/// Accepted forms: `http(s)://host[:port]/path[.git]`, `git@host:path[.git]`
/// and `git://host[:port]/path.git`. Everything else, including the empty
/// string, is rejected.
///
/// # Examples
///
/// ```
/// use conform_core::validate_git_url;
///
/// assert!(validate_git_url("git@github.com:org/repo.git"));
/// assert!(validate_git_url("https://github.com/org/repo"));
/// assert!(!validate_git_url("ftp://example.com/repo"));
/// assert!(!validate_git_url(""));
/// ```
pub fn validate_git_url(url: &str) -> bool {
    !url.is_empty() && GIT_URL_PATTERNS.iter().any(|re| re.is_match(url))
}

fn invalid(message: &str) -> ConformError {
    ConformError::Validation(message.to_string())
}

fn string_list(value: &Value, not_array: &str, not_string: &str) -> crate::Result<Vec<String>> {
    let items = value.as_array().ok_or_else(|| invalid(not_array))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid(not_string))
        })
        .collect()
}

/// Validate a raw JSON request body and convert it into a [`CheckRequest`].
///
/// Fields are checked in a fixed order and the first problem wins. A field
/// that is present with the wrong type (including `null`) is rejected.
///
/// # Errors
///
/// Returns [`ConformError::Validation`] with a caller-facing message.
///
/// # Examples
///
/// ```
/// use conform_core::validate_check_request;
/// use serde_json::json;
///
/// let req = validate_check_request(&json!({
///     "repository_url": "https://github.com/org/repo.git",
///     "spec_files": ["spec/api.md"]
/// }))
/// .unwrap();
/// assert_eq!(req.branch, "main");
///
/// let err = validate_check_request(&json!({"branch": "dev"})).unwrap_err();
/// assert_eq!(err.to_string(), "validation error: Field 'repository_url' is required");
/// ```
pub fn validate_check_request(body: &Value) -> crate::Result<CheckRequest> {
    let obj = match body.as_object() {
        Some(obj) if !obj.is_empty() => obj,
        _ => return Err(invalid("Request body is required")),
    };

    let url = obj
        .get("repository_url")
        .ok_or_else(|| invalid("Field 'repository_url' is required"))?;
    let url = url
        .as_str()
        .filter(|u| validate_git_url(u))
        .ok_or_else(|| invalid("Invalid repository URL format"))?;

    let branch = match obj.get("branch") {
        None => DEFAULT_BRANCH.to_string(),
        Some(b) => b
            .as_str()
            .filter(|b| !b.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| invalid("Branch must be a non-empty string"))?,
    };

    let spec_files = obj
        .get("spec_files")
        .map(|v| {
            string_list(
                v,
                "spec_files must be an array",
                "All spec_files entries must be strings",
            )
        })
        .transpose()?;

    let target_paths = obj
        .get("target_paths")
        .map(|v| {
            string_list(
                v,
                "target_paths must be an array",
                "All target_paths entries must be strings",
            )
        })
        .transpose()?;

    let options = match obj.get("options") {
        None => serde_json::Map::new(),
        Some(v) => v
            .as_object()
            .cloned()
            .ok_or_else(|| invalid("options must be an object"))?,
    };

    Ok(CheckRequest {
        repository_url: url.to_string(),
        branch,
        spec_files,
        target_paths,
        options,
    })
}
