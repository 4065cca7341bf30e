use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default branch checked when a request omits one.
pub const DEFAULT_BRANCH: &str = "main";

/// Opaque, never-reused identifier of a compliance check.
///
/// # Examples
///
/// ```
/// use conform_core::CheckId;
///
/// let a = CheckId::generate();
/// let b = CheckId::generate();
/// assert_ne!(a, b);
/// assert!(a.as_str().starts_with("chk_"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckId(String);

impl CheckId {
    /// Generate a fresh identifier from a random v4 UUID.
    pub fn generate() -> Self {
        Self(format!("chk_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CheckId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CheckId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle state of a check.
///
/// `Started → Running → Completed | Failed`. Terminal states never change.
///
/// # Examples
///
/// ```
/// use conform_core::CheckStatus;
///
/// assert!(!CheckStatus::Running.is_terminal());
/// assert!(CheckStatus::Failed.is_terminal());
/// assert_eq!("completed".parse::<CheckStatus>().unwrap(), CheckStatus::Completed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// Accepted, pipeline not yet running.
    Started,
    /// Pipeline in progress.
    Running,
    /// Pipeline finished and the report is available.
    Completed,
    /// Pipeline aborted; see the record's `error`.
    Failed,
}

impl CheckStatus {
    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, CheckStatus::Completed | CheckStatus::Failed)
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStatus::Started => write!(f, "started"),
            CheckStatus::Running => write!(f, "running"),
            CheckStatus::Completed => write!(f, "completed"),
            CheckStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for CheckStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "started" => Ok(CheckStatus::Started),
            "running" => Ok(CheckStatus::Running),
            "completed" => Ok(CheckStatus::Completed),
            "failed" => Ok(CheckStatus::Failed),
            other => Err(format!("unknown check status: {other}")),
        }
    }
}

/// Severity of a compliance issue.
///
/// # Examples
///
/// ```
/// use conform_core::Severity;
///
/// let s: Severity = serde_json::from_str("\"critical\"").unwrap();
/// assert_eq!(s, Severity::Critical);
/// assert!(Severity::Critical.rank() < Severity::Low.rank());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks release.
    Critical,
    /// Must be fixed soon.
    High,
    /// Should be fixed.
    Medium,
    /// Nice to fix; documentation-quality observations land here.
    Low,
}

impl Severity {
    /// All severities, most severe first.
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    /// Sort key: critical = 0 … low = 3.
    pub fn rank(self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::High => write!(f, "high"),
            Severity::Medium => write!(f, "medium"),
            Severity::Low => write!(f, "low"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// Category of a compliance issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// The specification itself is missing or unclear.
    Documentation,
    /// No evidence that the requirement is implemented.
    MissingImplementation,
    /// Some evidence, but the implementation looks incomplete.
    PartialImplementation,
}

/// A detected non-compliance or documentation gap.
///
/// # Examples
///
/// ```
/// use conform_core::{Issue, IssueKind, Severity};
///
/// let issue = Issue::new(
///     Severity::High,
///     IssueKind::MissingImplementation,
///     "Requirement FR-1 may not be implemented",
///     "No evidence of authentication found",
///     "Implement authentication",
/// );
/// assert_eq!(issue.severity, Severity::High);
/// assert_eq!(issue.fingerprint().len(), 64);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    /// How urgent the issue is.
    pub severity: Severity,
    /// What kind of gap was detected.
    pub kind: IssueKind,
    /// One-line summary.
    pub title: String,
    /// Explanation of the gap.
    pub description: String,
    /// Suggested remediation.
    pub suggestion: String,
    /// Specification document the issue was raised against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec_file: Option<String>,
    /// Requirement identifier, e.g. `FR-3`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirement_id: Option<String>,
    /// Requirement text as written in the specification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirement_text: Option<String>,
    /// Number of code files inspected for this issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_checked: Option<usize>,
}

impl Issue {
    /// Create an issue with no spec or requirement attribution.
    pub fn new(
        severity: Severity,
        kind: IssueKind,
        title: impl Into<String>,
        description: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            kind,
            title: title.into(),
            description: description.into(),
            suggestion: suggestion.into(),
            spec_file: None,
            requirement_id: None,
            requirement_text: None,
            files_checked: None,
        }
    }

    /// Attribute the issue to a specification document.
    pub fn with_spec_file(mut self, spec_file: impl Into<String>) -> Self {
        self.spec_file = Some(spec_file.into());
        self
    }

    /// Attribute the issue to a requirement.
    pub fn with_requirement(mut self, id: impl Into<String>, text: impl Into<String>) -> Self {
        self.requirement_id = Some(id.into());
        self.requirement_text = Some(text.into());
        self
    }

    /// Record how many code files were inspected.
    pub fn with_files_checked(mut self, count: usize) -> Self {
        self.files_checked = Some(count);
        self
    }

    /// Stable identity of the issue: SHA-256 over spec file, requirement id and title.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.spec_file.as_deref().unwrap_or_default().as_bytes());
        hasher.update([0]);
        hasher.update(self.requirement_id.as_deref().unwrap_or_default().as_bytes());
        hasher.update([0]);
        hasher.update(self.title.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Sort issues most severe first. The sort is stable within a tier.
///
/// # Examples
///
/// ```
/// use conform_core::{sort_issues, Issue, IssueKind, Severity};
///
/// let mut issues: Vec<Issue> = [Severity::Low, Severity::Critical]
///     .into_iter()
///     .map(|s| Issue::new(s, IssueKind::Documentation, "t", "d", "s"))
///     .collect();
/// sort_issues(&mut issues);
/// assert_eq!(issues[0].severity, Severity::Critical);
/// ```
pub fn sort_issues(issues: &mut [Issue]) {
    issues.sort_by_key(|i| i.severity.rank());
}

/// A specification document loaded from a cloned repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecDocument {
    /// Path relative to the repository root, `/`-separated.
    pub path: String,
    /// Raw markdown text.
    pub content: String,
}

/// Validated inputs of a check request.
///
/// # Examples
///
/// ```
/// use conform_core::CheckRequest;
///
/// let req = CheckRequest::new("https://example.com/org/repo.git");
/// assert_eq!(req.branch, "main");
/// assert!(req.spec_files.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRequest {
    /// Git URL of the repository to check.
    pub repository_url: String,
    /// Branch to check out.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Explicit specification documents, relative to the repository root.
    #[serde(default)]
    pub spec_files: Option<Vec<String>>,
    /// Restrict code analysis to these paths or glob patterns.
    #[serde(default)]
    pub target_paths: Option<Vec<String>>,
    /// Opaque analyzer options.
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

fn default_branch() -> String {
    DEFAULT_BRANCH.into()
}

impl CheckRequest {
    /// Request with the default branch and no restrictions.
    pub fn new(repository_url: impl Into<String>) -> Self {
        Self {
            repository_url: repository_url.into(),
            branch: default_branch(),
            spec_files: None,
            target_paths: None,
            options: serde_json::Map::new(),
        }
    }
}

/// Outcome counters of a completed check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSummary {
    /// Total number of issues.
    pub total_issues: usize,
    /// Issues with severity critical.
    pub critical: usize,
    /// Issues with severity high.
    pub high: usize,
    /// Issues with severity medium.
    pub medium: usize,
    /// Issues with severity low.
    pub low: usize,
    /// Code files scanned by the analyzer.
    pub files_analyzed: usize,
    /// Specification documents loaded.
    pub specs_checked: usize,
    /// Requirements evaluated across all specs.
    pub requirements_checked: usize,
    /// HEAD commit of the checked clone, when readable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    /// Where the report was published, if it was.
    pub todo_file_url: Option<String>,
    /// Redacted publish failure, if publishing was attempted and failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_error: Option<String>,
}

impl ResultSummary {
    /// Count issues per severity.
    ///
    /// # Examples
    ///
    /// ```
    /// use conform_core::{Issue, IssueKind, ResultSummary, Severity};
    ///
    /// let issues = vec![
    ///     Issue::new(Severity::High, IssueKind::MissingImplementation, "a", "", ""),
    ///     Issue::new(Severity::Low, IssueKind::Documentation, "b", "", ""),
    /// ];
    /// let summary = ResultSummary::from_issues(&issues);
    /// assert_eq!(summary.total_issues, 2);
    /// assert_eq!(summary.high, 1);
    /// assert_eq!(summary.low, 1);
    /// ```
    pub fn from_issues(issues: &[Issue]) -> Self {
        let count = |s: Severity| issues.iter().filter(|i| i.severity == s).count();
        Self {
            total_issues: issues.len(),
            critical: count(Severity::Critical),
            high: count(Severity::High),
            medium: count(Severity::Medium),
            low: count(Severity::Low),
            ..Self::default()
        }
    }
}

/// Externally visible state of one check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRecord {
    pub check_id: CheckId,
    pub status: CheckStatus,
    /// Repository name derived from the URL, used for filtering.
    pub repository: String,
    pub repository_url: String,
    pub branch: String,
    pub spec_files: Option<Vec<String>>,
    pub target_paths: Option<Vec<String>>,
    pub options: serde_json::Map<String, serde_json::Value>,
    /// 0–100.
    pub progress: u8,
    pub message: String,
    pub started_at: DateTime<Utc>,
    pub estimated_completion: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<ResultSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Rough wall-clock budget of one check, used for `estimatedCompletion`.
const ESTIMATED_CHECK_MINUTES: i64 = 5;

impl CheckRecord {
    /// Build the initial `started` record for a request.
    ///
    /// # Examples
    ///
    /// ```
    /// use conform_core::{CheckId, CheckRecord, CheckRequest, CheckStatus};
    ///
    /// let req = CheckRequest::new("https://example.com/org/repo.git");
    /// let record = CheckRecord::new(CheckId::generate(), &req, chrono::Utc::now());
    /// assert_eq!(record.status, CheckStatus::Started);
    /// assert_eq!(record.progress, 0);
    /// assert_eq!(record.repository, "repo");
    /// ```
    pub fn new(check_id: CheckId, request: &CheckRequest, now: DateTime<Utc>) -> Self {
        Self {
            check_id,
            status: CheckStatus::Started,
            repository: repository_name(&request.repository_url),
            repository_url: request.repository_url.clone(),
            branch: request.branch.clone(),
            spec_files: request.spec_files.clone(),
            target_paths: request.target_paths.clone(),
            options: request.options.clone(),
            progress: 0,
            message: "Compliance check started successfully".into(),
            started_at: now,
            estimated_completion: now + Duration::minutes(ESTIMATED_CHECK_MINUTES),
            completed_at: None,
            results: None,
            error: None,
        }
    }
}

/// Derive a repository name from a git URL: last path segment without `.git`.
///
/// # Examples
///
/// ```
/// use conform_core::repository_name;
///
/// assert_eq!(repository_name("https://github.com/org/widget.git"), "widget");
/// assert_eq!(repository_name("git@github.com:org/widget"), "widget");
/// assert_eq!(repository_name("https://github.com/org/widget/"), "widget");
/// ```
pub fn repository_name(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(trimmed);
    last.strip_suffix(".git").unwrap_or(last).to_string()
}

/// Connectivity of the model-serving backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    /// Reachable and answering.
    Connected,
    /// Could not open a connection.
    Disconnected,
    /// Reachable but returned an error or unparseable data.
    Error,
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelStatus::Connected => write!(f, "connected"),
            ModelStatus::Disconnected => write!(f, "disconnected"),
            ModelStatus::Error => write!(f, "error"),
        }
    }
}

/// Health report of the model backend. Never an error: failures are values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelHealth {
    pub status: ModelStatus,
    /// Model the analyzer is configured to use.
    pub model: String,
    #[serde(default)]
    pub models_loaded: usize,
    #[serde(default)]
    pub primary_model_available: bool,
    #[serde(default)]
    pub available_models: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelHealth {
    /// A non-connected health value carrying an error message.
    pub fn unavailable(status: ModelStatus, model: &str, error: impl Into<String>) -> Self {
        Self {
            status,
            model: model.to_string(),
            models_loaded: 0,
            primary_model_available: false,
            available_models: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Output format for CLI subcommands.
///
/// # Examples
///
/// ```
/// use conform_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summaries.
    #[default]
    Text,
    /// Machine-readable JSON.
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
