use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConformError;

/// Top-level configuration loaded from `.conform.toml`.
///
/// Resolution order: environment variables > config file > defaults.
///
/// # Examples
///
/// ```
/// use conform_core::ConformConfig;
///
/// let config = ConformConfig::default();
/// assert_eq!(config.server.port, 8080);
/// assert_eq!(config.server.max_concurrent_checks, 3);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConformConfig {
    /// HTTP listener and API settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Model backend settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Git access and scratch workspace settings.
    #[serde(default)]
    pub git: GitConfig,
    /// Where finished reports are committed.
    #[serde(default)]
    pub publish: PublishConfig,
    /// Analyzer behavior.
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl ConformConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConformError::Io`] if the file cannot be read, or
    /// [`ConformError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use conform_core::ConformConfig;
    /// use std::path::Path;
    ///
    /// let config = ConformConfig::from_file(Path::new(".conform.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, ConformError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConformError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use conform_core::ConformConfig;
    ///
    /// let toml = r#"
    /// [server]
    /// port = 9000
    /// "#;
    /// let config = ConformConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.server.port, 9000);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, ConformError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Override settings from environment variables.
    ///
    /// `lookup` returns the value of a variable, if set. Empty values are
    /// treated as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConformError::Config`] if a numeric variable does not parse.
    ///
    /// # Examples
    ///
    /// ```
    /// use conform_core::ConformConfig;
    ///
    /// let mut config = ConformConfig::default();
    /// config
    ///     .apply_env(|key| match key {
    ///         "SERVICE_PORT" => Some("9999".into()),
    ///         "API_KEY" => Some("secret".into()),
    ///         _ => None,
    ///     })
    ///     .unwrap();
    /// assert_eq!(config.server.port, 9999);
    /// assert_eq!(config.server.api_key.as_deref(), Some("secret"));
    /// ```
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConformError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SERVICE_HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("SERVICE_PORT") {
            self.server.port = parse_env("SERVICE_PORT", &v)?;
        }
        if let Some(v) = get("MAX_CONCURRENT_CHECKS") {
            self.server.max_concurrent_checks = parse_env("MAX_CONCURRENT_CHECKS", &v)?;
        }
        if let Some(v) = get("API_KEY") {
            self.server.api_key = Some(v);
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.server.log_level = v.to_lowercase();
        }
        if let Some(v) = get("OLLAMA_HOST") {
            self.llm.host = v;
        }
        if let Some(v) = get("OLLAMA_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("WORKSPACE_ROOT") {
            self.git.workspace_root = PathBuf::from(v);
        }
        if let Some(v) = get("GIT_TOKEN") {
            self.git.token = Some(v);
        }
        if let Some(v) = get("GIT_USER_NAME") {
            self.git.user_name = v;
        }
        if let Some(v) = get("GIT_USER_EMAIL") {
            self.git.user_email = v;
        }
        if let Some(v) = get("SPEC_REPO_URL") {
            self.publish.spec_repo_url = Some(v);
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConformError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConformError::Config(format!("{key} has invalid value '{value}'")))
}

/// HTTP listener and API configuration.
///
/// # Examples
///
/// ```
/// use conform_core::ServerConfig;
///
/// let config = ServerConfig::default();
/// assert_eq!(config.host, "0.0.0.0");
/// assert!(config.api_key.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port (default: 8080).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Soft cap on concurrently running checks (default: 3).
    #[serde(default = "default_max_concurrent_checks")]
    pub max_concurrent_checks: usize,
    /// Shared bearer token. Requests to protected routes fail while unset.
    pub api_key: Option<String>,
    /// Log verbosity used when `RUST_LOG` is not set (default: `info`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8080
}

fn default_max_concurrent_checks() -> usize {
    3
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_concurrent_checks: default_max_concurrent_checks(),
            api_key: None,
            log_level: default_log_level(),
        }
    }
}

/// Model backend configuration (Ollama-compatible API).
///
/// # Examples
///
/// ```
/// use conform_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.model, "codellama:7b-instruct");
/// assert_eq!(config.max_retries, 3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the model server.
    #[serde(default = "default_llm_host")]
    pub host: String,
    /// Model identifier.
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    /// Total attempts for a request that times out (default: 3).
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
}

fn default_llm_host() -> String {
    "http://ollama:11434".into()
}

fn default_llm_model() -> String {
    "codellama:7b-instruct".into()
}

fn default_llm_timeout() -> u64 {
    30
}

fn default_llm_retries() -> u32 {
    3
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            host: default_llm_host(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
            max_retries: default_llm_retries(),
        }
    }
}

/// Git access and scratch workspace configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Directory under which clones are created (default: `/tmp/spec-checker`).
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    /// Token for private repositories, injected into https clone URLs.
    pub token: Option<String>,
    /// Committer name for published reports.
    #[serde(default = "default_user_name")]
    pub user_name: String,
    /// Committer email for published reports.
    #[serde(default = "default_user_email")]
    pub user_email: String,
    /// Bound on `git clone` in seconds (default: 300).
    #[serde(default = "default_clone_timeout")]
    pub clone_timeout_secs: u64,
    /// Bound on `git push` in seconds (default: 60).
    #[serde(default = "default_push_timeout")]
    pub push_timeout_secs: u64,
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("/tmp/spec-checker")
}

fn default_user_name() -> String {
    "Spec Checker Bot".into()
}

fn default_user_email() -> String {
    "spec-checker@example.com".into()
}

fn default_clone_timeout() -> u64 {
    300
}

fn default_push_timeout() -> u64 {
    60
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            token: None,
            user_name: default_user_name(),
            user_email: default_user_email(),
            clone_timeout_secs: default_clone_timeout(),
            push_timeout_secs: default_push_timeout(),
        }
    }
}

/// Report publishing configuration. Publishing is off while `spec_repo_url` is unset.
///
/// # Examples
///
/// ```
/// use conform_core::PublishConfig;
///
/// let config = PublishConfig::default();
/// assert!(config.spec_repo_url.is_none());
/// assert_eq!(config.report_path, "TODO.md");
/// assert_eq!(config.max_report_bytes, 10 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Repository that receives the report.
    pub spec_repo_url: Option<String>,
    /// Path of the report inside that repository.
    #[serde(default = "default_report_path")]
    pub report_path: String,
    /// Branch to commit to.
    #[serde(default = "default_publish_branch")]
    pub branch: String,
    /// Largest report accepted for publishing.
    #[serde(default = "default_max_report_bytes")]
    pub max_report_bytes: usize,
}

fn default_report_path() -> String {
    "TODO.md".into()
}

fn default_publish_branch() -> String {
    "main".into()
}

fn default_max_report_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            spec_repo_url: None,
            report_path: default_report_path(),
            branch: default_publish_branch(),
            max_report_bytes: default_max_report_bytes(),
        }
    }
}

/// Analyzer configuration. Per-check `options` may override these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Requirements evaluated per specification document (default: 5).
    #[serde(default = "default_max_requirements")]
    pub max_requirements: usize,
    /// Ask the model backend instead of the keyword heuristic.
    #[serde(default)]
    pub use_llm: bool,
    /// Code files inspected per requirement (default: 10).
    #[serde(default = "default_max_context_files")]
    pub max_context_files: usize,
}

fn default_max_requirements() -> usize {
    5
}

fn default_max_context_files() -> usize {
    10
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_requirements: default_max_requirements(),
            use_llm: false,
            max_context_files: default_max_context_files(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = ConformConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.llm.host, "http://ollama:11434");
        assert_eq!(config.llm.timeout_secs, 30);
        assert_eq!(config.git.workspace_root, PathBuf::from("/tmp/spec-checker"));
        assert_eq!(config.git.user_name, "Spec Checker Bot");
        assert_eq!(config.git.clone_timeout_secs, 300);
        assert_eq!(config.git.push_timeout_secs, 60);
        assert_eq!(config.publish.branch, "main");
        assert_eq!(config.analysis.max_requirements, 5);
        assert!(!config.analysis.use_llm);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = ConformConfig::from_toml("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.llm.model, "codellama:7b-instruct");
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 3000
max_concurrent_checks = 8
api_key = "from-file"

[llm]
host = "http://localhost:11434"
model = "llama3"
timeout_secs = 10

[git]
workspace_root = "/var/lib/conform"
clone_timeout_secs = 120

[publish]
spec_repo_url = "https://github.com/org/specs.git"
report_path = "reports/TODO.md"

[analysis]
max_requirements = 20
use_llm = true
"#;
        let config = ConformConfig::from_toml(toml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.max_concurrent_checks, 8);
        assert_eq!(config.llm.model, "llama3");
        assert_eq!(config.llm.max_retries, 3);
        assert_eq!(config.git.workspace_root, PathBuf::from("/var/lib/conform"));
        assert_eq!(config.git.push_timeout_secs, 60);
        assert_eq!(
            config.publish.spec_repo_url.as_deref(),
            Some("https://github.com/org/specs.git")
        );
        assert_eq!(config.publish.report_path, "reports/TODO.md");
        assert_eq!(config.analysis.max_requirements, 20);
        assert!(config.analysis.use_llm);
    }

    #[test]
    fn invalid_toml_returns_error() {
        assert!(ConformConfig::from_toml("{{invalid}}").is_err());
    }

    #[test]
    fn env_overrides_file() {
        let mut config = ConformConfig::from_toml("[server]\napi_key = \"from-file\"\n").unwrap();
        config
            .apply_env(env(&[
                ("API_KEY", "from-env"),
                ("OLLAMA_MODEL", "mistral"),
                ("WORKSPACE_ROOT", "/scratch"),
                ("GIT_TOKEN", "ghp_x"),
                ("SPEC_REPO_URL", "git@github.com:o/specs.git"),
                ("LOG_LEVEL", "DEBUG"),
            ]))
            .unwrap();
        assert_eq!(config.server.api_key.as_deref(), Some("from-env"));
        assert_eq!(config.llm.model, "mistral");
        assert_eq!(config.git.workspace_root, PathBuf::from("/scratch"));
        assert_eq!(config.git.token.as_deref(), Some("ghp_x"));
        assert!(config.publish.spec_repo_url.is_some());
        assert_eq!(config.server.log_level, "debug");
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut config = ConformConfig::default();
        config.apply_env(env(&[("API_KEY", ""), ("SERVICE_PORT", " ")])).unwrap();
        assert!(config.server.api_key.is_none());
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn bad_numeric_env_is_config_error() {
        let mut config = ConformConfig::default();
        let err = config
            .apply_env(env(&[("MAX_CONCURRENT_CHECKS", "lots")]))
            .unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
        assert!(err.to_string().contains("MAX_CONCURRENT_CHECKS"));
    }
}
