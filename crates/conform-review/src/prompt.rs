use conform_core::{IssueKind, Requirement, Severity};
use serde::Deserialize;
use tracing::warn;

const SYSTEM_PROMPT: &str = "\
You are a specification compliance auditor. You decide whether a code base \
implements a single requirement taken from its specification documents.

Rules:
- Judge only from the code excerpts you are given
- If the excerpts clearly implement the requirement, answer \"implemented\"
- If they implement part of it, answer \"partial\"
- If nothing in the excerpts addresses it, answer \"missing\"
- Do not invent file names or functions that are not shown

Respond with a JSON object:
{
  \"status\": \"implemented\" | \"partial\" | \"missing\",
  \"severity\": \"critical\" | \"high\" | \"medium\" | \"low\",
  \"description\": \"What is missing or incomplete\",
  \"suggestion\": \"How to close the gap\"
}";

/// Build the system prompt for requirement checks.
///
/// # Examples
///
/// ```
/// use conform_review::prompt::build_system_prompt;
///
/// let prompt = build_system_prompt();
/// assert!(prompt.contains("\"missing\""));
/// ```
pub fn build_system_prompt() -> String {
    SYSTEM_PROMPT.to_string()
}

/// A code excerpt shown to the model.
#[derive(Debug, Clone)]
pub struct Excerpt {
    /// Path relative to the repository root.
    pub path: String,
    /// Leading portion of the file.
    pub content: String,
}

/// Build the user prompt asking about one requirement.
///
/// # Examples
///
/// ```
/// use conform_core::Requirement;
/// use conform_review::prompt::{build_requirement_prompt, Excerpt};
///
/// let req = Requirement { id: "FR-1".into(), text: "Log every request".into() };
/// let excerpts = vec![Excerpt { path: "src/main.rs".into(), content: "fn main() {}".into() }];
/// let prompt = build_requirement_prompt(&req, "spec/api.md", &excerpts);
/// assert!(prompt.contains("FR-1"));
/// assert!(prompt.contains("src/main.rs"));
/// ```
pub fn build_requirement_prompt(
    requirement: &Requirement,
    spec_file: &str,
    excerpts: &[Excerpt],
) -> String {
    let mut prompt = format!(
        "Specification: {spec_file}\nRequirement {}: {}\n\n",
        requirement.id, requirement.text
    );
    if excerpts.is_empty() {
        prompt.push_str("No code files were found in the repository.\n");
    } else {
        prompt.push_str("Code excerpts:\n");
        for excerpt in excerpts {
            prompt.push_str(&format!(
                "\n--- {} ---\n```\n{}\n```\n",
                excerpt.path, excerpt.content
            ));
        }
    }
    prompt
}

/// The model's judgement about one requirement.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// Missing or partial. Implemented requirements produce no verdict.
    pub kind: IssueKind,
    /// Severity suggested by the model, defaulting by kind.
    pub severity: Severity,
    /// Explanation of the gap.
    pub description: String,
    /// Suggested fix.
    pub suggestion: String,
}

#[derive(Deserialize)]
struct RawVerdict {
    status: String,
    severity: Option<String>,
    description: Option<String>,
    suggestion: Option<String>,
}

/// Parse the model's JSON answer.
///
/// Returns `None` when the requirement is implemented or the answer cannot
/// be understood (a warning is logged).
///
/// # Examples
///
/// ```
/// use conform_core::Severity;
/// use conform_review::prompt::parse_verdict;
///
/// let v = parse_verdict(r#"{"status":"missing","severity":"critical","description":"d","suggestion":"s"}"#)
///     .unwrap();
/// assert_eq!(v.severity, Severity::Critical);
/// assert!(parse_verdict(r#"{"status":"implemented"}"#).is_none());
/// ```
pub fn parse_verdict(response: &str) -> Option<Verdict> {
    let cleaned = strip_code_fences(response);
    let raw: RawVerdict = match serde_json::from_str(cleaned) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "failed to parse model response");
            return None;
        }
    };

    let kind = match raw.status.to_lowercase().as_str() {
        "implemented" | "compliant" => return None,
        "partial" => IssueKind::PartialImplementation,
        "missing" => IssueKind::MissingImplementation,
        other => {
            warn!(status = other, "unknown verdict status");
            return None;
        }
    };
    let default_severity = match kind {
        IssueKind::PartialImplementation => Severity::Medium,
        _ => Severity::High,
    };
    let severity = raw
        .severity
        .and_then(|s| s.parse().ok())
        .unwrap_or(default_severity);

    Some(Verdict {
        kind,
        severity,
        description: raw.description.unwrap_or_default(),
        suggestion: raw.suggestion.unwrap_or_default(),
    })
}

fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        if let Some(inner) = rest.strip_suffix("```") {
            return inner.trim();
        }
    }
    if let Some(rest) = trimmed.strip_prefix("```") {
        if let Some(inner) = rest.strip_suffix("```") {
            return inner.trim();
        }
    }
    trimmed
}
