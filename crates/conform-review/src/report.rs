use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use conform_core::{Issue, Severity};

/// Metadata printed at the top of a report.
#[derive(Debug, Clone)]
pub struct ReportContext {
    /// Checked repository (already free of credentials).
    pub repository_url: String,
    /// Checked branch.
    pub branch: String,
    /// Identifier of the check that produced the report.
    pub check_id: String,
    /// HEAD commit of the checked clone, if known.
    pub commit: Option<String>,
    /// Time the report was rendered.
    pub generated_at: DateTime<Utc>,
}

fn heading(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "Critical",
        Severity::High => "High",
        Severity::Medium => "Medium",
        Severity::Low => "Low",
    }
}

/// Render the `TODO.md` checklist for a finished check.
///
/// Issues are grouped by severity, most severe first; empty groups are
/// omitted.
///
/// # Examples
///
/// ```
/// use conform_core::{Issue, IssueKind, Severity};
/// use conform_review::{render_todo, ReportContext};
///
/// let ctx = ReportContext {
///     repository_url: "https://github.com/org/repo.git".into(),
///     branch: "main".into(),
///     check_id: "chk_1".into(),
///     commit: None,
///     generated_at: chrono::Utc::now(),
/// };
/// let issues = vec![Issue::new(Severity::High, IssueKind::MissingImplementation, "Add auth", "none found", "implement it")];
/// let md = render_todo(&ctx, &issues);
/// assert!(md.contains("## High"));
/// assert!(md.contains("- [ ] **Add auth**"));
/// ```
pub fn render_todo(context: &ReportContext, issues: &[Issue]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Compliance TODO\n");
    let _ = writeln!(out, "- **Repository:** {}", context.repository_url);
    let _ = writeln!(out, "- **Branch:** {}", context.branch);
    let _ = writeln!(out, "- **Check ID:** {}", context.check_id);
    if let Some(commit) = &context.commit {
        let _ = writeln!(out, "- **Commit:** `{commit}`");
    }
    let _ = writeln!(
        out,
        "- **Generated:** {}\n",
        context.generated_at.to_rfc3339()
    );

    let _ = writeln!(out, "## Summary\n");
    let _ = writeln!(out, "| Severity | Count |");
    let _ = writeln!(out, "|----------|-------|");
    for severity in Severity::ALL {
        let count = issues.iter().filter(|i| i.severity == severity).count();
        let _ = writeln!(out, "| {} | {count} |", heading(severity));
    }
    let _ = writeln!(out, "| **Total** | {} |\n", issues.len());

    if issues.is_empty() {
        let _ = writeln!(out, "No outstanding compliance issues.");
        return out;
    }

    for severity in Severity::ALL {
        let group: Vec<&Issue> = issues.iter().filter(|i| i.severity == severity).collect();
        if group.is_empty() {
            continue;
        }
        let _ = writeln!(out, "## {}\n", heading(severity));
        for issue in group {
            let _ = writeln!(out, "- [ ] **{}**", issue.title);
            let source = match (&issue.spec_file, &issue.requirement_id) {
                (Some(file), Some(id)) => Some(format!("{file} ({id})")),
                (Some(file), None) => Some(file.clone()),
                (None, Some(id)) => Some(id.clone()),
                (None, None) => None,
            };
            if let Some(source) = source {
                let _ = writeln!(out, "  - Source: {source}");
            }
            if let Some(text) = &issue.requirement_text {
                let _ = writeln!(out, "  - Requirement: {text}");
            }
            if !issue.description.is_empty() {
                let _ = writeln!(out, "  - Details: {}", issue.description);
            }
            if !issue.suggestion.is_empty() {
                let _ = writeln!(out, "  - Suggestion: {}", issue.suggestion);
            }
        }
        out.push('\n');
    }

    out
}
