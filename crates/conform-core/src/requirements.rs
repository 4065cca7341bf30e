use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A single requirement extracted from a specification document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    /// `FR-1`, `NFR-2`, `SR-3`, or a generated `REQ-n` for SHALL statements.
    pub id: String,
    /// Requirement wording.
    pub text: String,
}

static NUMBERED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"((?:FR|NFR|SR)-\d+):?\s*(.+)").expect("valid regex"));

static SHALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:The service|Service|System)\s+SHALL\s+.+").expect("valid regex")
});

/// Extract requirements from markdown specification text.
///
/// Numbered requirements (`FR-1: ...`, `NFR-2 ...`, `SR-3: ...`) come first in
/// document order, followed by `SHALL` statements numbered `REQ-1`, `REQ-2`, ...
/// A SHALL statement keeps its full sentence as text.
///
/// # Examples
///
/// ```
/// use conform_core::extract_requirements;
///
/// let spec = "\
/// # API
/// FR-1: Users must authenticate with a token
/// The service SHALL log every request
/// ";
/// let reqs = extract_requirements(spec);
/// assert_eq!(reqs.len(), 2);
/// assert_eq!(reqs[0].id, "FR-1");
/// assert_eq!(reqs[0].text, "Users must authenticate with a token");
/// assert_eq!(reqs[1].id, "REQ-1");
/// assert_eq!(reqs[1].text, "The service SHALL log every request");
/// ```
pub fn extract_requirements(content: &str) -> Vec<Requirement> {
    let mut requirements: Vec<Requirement> = NUMBERED
        .captures_iter(content)
        .filter_map(|caps| {
            let id = caps.get(1)?.as_str().to_string();
            let text = caps.get(2)?.as_str().trim().to_string();
            Some(Requirement { id, text })
        })
        .collect();

    requirements.extend(
        SHALL
            .find_iter(content)
            .enumerate()
            .map(|(i, m)| Requirement {
                id: format!("REQ-{}", i + 1),
                text: m.as_str().trim().to_string(),
            }),
    );

    requirements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_requirements_with_and_without_colon() {
        let spec = "- FR-1: Provide login\n- NFR-12 Respond within 200ms\n- SR-3:   Encrypt data at rest\n";
        let reqs = extract_requirements(spec);
        let ids: Vec<&str> = reqs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["FR-1", "NFR-12", "SR-3"]);
        assert_eq!(reqs[1].text, "Respond within 200ms");
        assert_eq!(reqs[2].text, "Encrypt data at rest");
    }

    #[test]
    fn shall_statements_are_case_insensitive() {
        let spec = "the service shall cache responses\nSystem SHALL rotate logs daily\n";
        let reqs = extract_requirements(spec);
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].id, "REQ-1");
        assert_eq!(reqs[0].text, "the service shall cache responses");
        assert_eq!(reqs[1].id, "REQ-2");
    }

    #[test]
    fn numbered_come_before_shall() {
        let spec = "Service SHALL start quickly\nFR-7: Expose metrics\n";
        let reqs = extract_requirements(spec);
        assert_eq!(reqs[0].id, "FR-7");
        assert_eq!(reqs[1].id, "REQ-1");
    }

    #[test]
    fn plain_prose_has_no_requirements() {
        let spec = "# Overview\n\nThis document describes the widget.\n";
        assert!(extract_requirements(spec).is_empty());
    }

    #[test]
    fn empty_content() {
        assert!(extract_requirements("").is_empty());
    }
}
