//! Compliance analysis: requirements from specification documents judged
//! against the code in a clone.
//!
//! Two evaluation modes share one pipeline. The keyword heuristic looks for
//! evidence of well-known concerns (authentication, logging, encryption, rate
//! limiting, caching) in the leading bytes of a bounded set of files. The
//! model mode sends each requirement with code excerpts to the model backend.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use conform_core::{
    extract_requirements, sort_issues, AnalysisConfig, ConformError, Issue, IssueKind,
    ModelHealth, Requirement, Severity, SpecDocument,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::files::{collect_code_files, read_prefix};
use crate::llm::{ChatMessage, LlmClient};
use crate::prompt::{build_requirement_prompt, build_system_prompt, parse_verdict, Excerpt};

/// Bytes read from the start of each context file.
const CONTEXT_BYTES: usize = 10_000;

/// Characters of each excerpt placed into a model prompt.
const PROMPT_EXCERPT_CHARS: usize = 4_000;

/// Per-run analyzer settings.
///
/// # Examples
///
/// ```
/// use conform_review::AnalysisOptions;
/// use serde_json::json;
///
/// let defaults = AnalysisOptions::default();
/// assert_eq!(defaults.max_requirements, 5);
///
/// let opts = json!({"use_llm": true, "max_requirements": 2});
/// let merged = defaults.with_overrides(opts.as_object().unwrap());
/// assert!(merged.use_llm);
/// assert_eq!(merged.max_requirements, 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisOptions {
    /// Requirements checked per specification document.
    pub max_requirements: usize,
    /// Use the model backend instead of the keyword heuristic.
    pub use_llm: bool,
    /// Code files inspected per requirement.
    pub max_context_files: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self::from(&AnalysisConfig::default())
    }
}

impl From<&AnalysisConfig> for AnalysisOptions {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            max_requirements: config.max_requirements,
            use_llm: config.use_llm,
            max_context_files: config.max_context_files,
        }
    }
}

impl AnalysisOptions {
    /// Apply recognised keys from a check's `options` object. Unknown keys
    /// and values of the wrong type are ignored.
    pub fn with_overrides(mut self, options: &Map<String, Value>) -> Self {
        if let Some(n) = options.get("max_requirements").and_then(Value::as_u64) {
            self.max_requirements = n as usize;
        }
        if let Some(b) = options.get("use_llm").and_then(Value::as_bool) {
            self.use_llm = b;
        }
        if let Some(n) = options.get("max_context_files").and_then(Value::as_u64) {
            self.max_context_files = n as usize;
        }
        self
    }
}

/// Counters describing one analysis run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStats {
    /// Specification documents examined.
    pub specs_checked: usize,
    /// Requirements evaluated across all documents.
    pub requirements_checked: usize,
    /// Code files found in scope.
    pub files_analyzed: usize,
    /// Model used, when running in model mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Result of one analysis run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisReport {
    /// Deduplicated issues, most severe first.
    pub issues: Vec<Issue>,
    /// Run counters.
    pub stats: AnalysisStats,
}

struct Topic {
    name: &'static str,
    triggers: &'static [&'static str],
    evidence: &'static [&'static str],
}

const TOPICS: &[Topic] = &[
    Topic {
        name: "authentication",
        triggers: &["auth"],
        evidence: &["auth"],
    },
    Topic {
        name: "logging",
        triggers: &["logging", "logged", "logs ", "audit"],
        evidence: &["log"],
    },
    Topic {
        name: "encryption",
        triggers: &["encrypt", "tls", "https", "ssl"],
        evidence: &["encrypt", "tls", "ssl", "cipher", "crypto"],
    },
    Topic {
        name: "rate limiting",
        triggers: &["rate limit", "rate-limit", "throttl"],
        evidence: &["ratelimit", "rate_limit", "rate-limit", "throttl", "limiter"],
    },
    Topic {
        name: "caching",
        triggers: &["cache", "caching"],
        evidence: &["cache"],
    },
];

/// Leading content of the files a requirement is judged against.
struct Context {
    files_total: usize,
    excerpts: Vec<Excerpt>,
}

/// Judges specification requirements against repository code.
#[derive(Debug, Clone)]
pub struct ComplianceAnalyzer {
    llm: LlmClient,
    defaults: AnalysisOptions,
}

impl ComplianceAnalyzer {
    /// Create an analyzer. `defaults` apply unless a check overrides them.
    pub fn new(llm: LlmClient, defaults: AnalysisOptions) -> Self {
        Self { llm, defaults }
    }

    /// Model the analyzer uses in model mode.
    pub fn model_name(&self) -> &str {
        self.llm.model()
    }

    /// Health of the model backend.
    pub async fn model_health(&self) -> ModelHealth {
        self.llm.health().await
    }

    /// Analyze `repo` against `specs`.
    ///
    /// A requirement whose evaluation fails is logged and skipped; it does
    /// not fail the run.
    ///
    /// # Errors
    ///
    /// Returns [`ConformError::AnalysisFailed`] if the repository cannot be
    /// scanned at all.
    pub async fn analyze(
        &self,
        repo: &Path,
        specs: &[SpecDocument],
        target_paths: Option<&[String]>,
        options: &Map<String, Value>,
    ) -> Result<AnalysisReport, ConformError> {
        let opts = self.defaults.with_overrides(options);
        let context = load_context(
            repo.to_path_buf(),
            target_paths.map(<[String]>::to_vec),
            opts.max_context_files,
        )
        .await?;
        info!(
            specs = specs.len(),
            files = context.files_total,
            use_llm = opts.use_llm,
            "analyzing compliance"
        );

        let mut issues = Vec::new();
        let mut requirements_checked = 0;

        if specs.is_empty() {
            issues.push(Issue::new(
                Severity::Low,
                IssueKind::Documentation,
                "No explicit requirements found",
                "No specification documents were found in the repository",
                "Add markdown specifications under spec/ or list them in spec_files",
            ));
        }

        for spec in specs {
            let requirements = extract_requirements(&spec.content);
            debug!(spec = %spec.path, count = requirements.len(), "extracted requirements");
            if requirements.is_empty() {
                issues.push(
                    Issue::new(
                        Severity::Low,
                        IssueKind::Documentation,
                        format!("No explicit requirements found in {}", spec.path),
                        "The specification file does not contain clearly marked requirements",
                        "Add explicit requirements using markers like FR-1, NFR-1, or SHALL statements",
                    )
                    .with_spec_file(&spec.path),
                );
                continue;
            }

            for requirement in requirements.iter().take(opts.max_requirements) {
                requirements_checked += 1;
                let outcome = if opts.use_llm {
                    self.check_with_model(requirement, &spec.path, &context).await
                } else {
                    Ok(check_with_keywords(requirement, &spec.path, &context))
                };
                match outcome {
                    Ok(Some(issue)) => issues.push(issue),
                    Ok(None) => {}
                    Err(e) => {
                        let err = ConformError::AnalysisFailed(format!(
                            "requirement {} in {}: {e}",
                            requirement.id, spec.path
                        ));
                        warn!(error = %err, "skipping requirement");
                    }
                }
            }
        }

        let mut seen = HashSet::new();
        issues.retain(|issue| seen.insert(issue.fingerprint()));
        sort_issues(&mut issues);

        Ok(AnalysisReport {
            issues,
            stats: AnalysisStats {
                specs_checked: specs.len(),
                requirements_checked,
                files_analyzed: context.files_total,
                model: opts.use_llm.then(|| self.model_name().to_string()),
            },
        })
    }

    async fn check_with_model(
        &self,
        requirement: &Requirement,
        spec_file: &str,
        context: &Context,
    ) -> Result<Option<Issue>, ConformError> {
        let excerpts: Vec<Excerpt> = context
            .excerpts
            .iter()
            .map(|e| Excerpt {
                path: e.path.clone(),
                content: e.content.chars().take(PROMPT_EXCERPT_CHARS).collect(),
            })
            .collect();
        let messages = [
            ChatMessage::system(build_system_prompt()),
            ChatMessage::user(build_requirement_prompt(requirement, spec_file, &excerpts)),
        ];
        let reply = self.llm.chat(&messages).await?;

        Ok(parse_verdict(&reply).map(|verdict| {
            let title = match verdict.kind {
                IssueKind::PartialImplementation => {
                    format!("Requirement {} is only partially implemented", requirement.id)
                }
                _ => format!("Requirement {} may not be implemented", requirement.id),
            };
            Issue::new(
                verdict.severity,
                verdict.kind,
                title,
                verdict.description,
                verdict.suggestion,
            )
            .with_spec_file(spec_file)
            .with_requirement(&requirement.id, &requirement.text)
            .with_files_checked(context.files_total)
        }))
    }
}

fn check_with_keywords(
    requirement: &Requirement,
    spec_file: &str,
    context: &Context,
) -> Option<Issue> {
    let text = requirement.text.to_lowercase();
    let lowered: Vec<String> = context
        .excerpts
        .iter()
        .map(|e| e.content.to_lowercase())
        .collect();

    let missing = TOPICS.iter().find(|topic| {
        topic.triggers.iter().any(|t| text.contains(t))
            && !lowered
                .iter()
                .any(|content| topic.evidence.iter().any(|e| content.contains(e)))
    })?;

    Some(
        Issue::new(
            Severity::High,
            IssueKind::MissingImplementation,
            format!("Requirement {} may not be implemented", requirement.id),
            format!("No evidence of {} implementation found in code", missing.name),
            format!("Implement {} as specified in the requirement", missing.name),
        )
        .with_spec_file(spec_file)
        .with_requirement(&requirement.id, &requirement.text)
        .with_files_checked(context.files_total),
    )
}

async fn load_context(
    repo: PathBuf,
    target_paths: Option<Vec<String>>,
    max_files: usize,
) -> Result<Context, ConformError> {
    tokio::task::spawn_blocking(move || -> Result<Context, ConformError> {
        let files = collect_code_files(&repo, target_paths.as_deref())?;
        let excerpts = files
            .iter()
            .take(max_files)
            .filter_map(|f| {
                read_prefix(&f.path, CONTEXT_BYTES).map(|content| Excerpt {
                    path: f.relative.clone(),
                    content,
                })
            })
            .collect();
        Ok(Context {
            files_total: files.len(),
            excerpts,
        })
    })
    .await
    .map_err(|e| ConformError::AnalysisFailed(format!("file scan aborted: {e}")))?
    .map_err(|e| ConformError::AnalysisFailed(e.to_string()))
}
