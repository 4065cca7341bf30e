/// Errors that can occur across the conform service.
///
/// Each variant maps to one class of failure. Library crates use this type
/// directly; the binary converts to `miette` diagnostics at the boundary and
/// the HTTP layer maps variants to stable error codes via [`ConformError::code`].
///
/// # Examples
///
/// ```
/// use conform_core::ConformError;
///
/// let err = ConformError::NotFound("chk_123".into());
/// assert_eq!(err.code(), "NOT_FOUND");
/// assert!(err.to_string().contains("chk_123"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ConformError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    #[diagnostic(code(conform::io))]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration (e.g. no API key).
    #[error("configuration error: {0}")]
    #[diagnostic(
        code(conform::config),
        help("check .conform.toml and the service environment variables")
    )]
    Config(String),

    /// Malformed request input.
    #[error("validation error: {0}")]
    #[diagnostic(code(conform::validation))]
    Validation(String),

    /// Unknown check identifier.
    #[error("check {0} not found")]
    #[diagnostic(code(conform::not_found))]
    NotFound(String),

    /// Report requested before the check completed.
    #[error("check {0} has not completed yet")]
    #[diagnostic(code(conform::not_ready))]
    NotReady(String),

    /// A bounded network or process operation exceeded its deadline.
    #[error("{operation} timed out after {seconds} seconds")]
    #[diagnostic(code(conform::timeout))]
    Timeout {
        /// Human-readable operation name.
        operation: String,
        /// Configured bound in seconds.
        seconds: u64,
    },

    /// `git clone` failed. The message has already been redacted.
    #[error("failed to clone repository: {0}")]
    #[diagnostic(code(conform::clone_failed))]
    CloneFailed(String),

    /// Publishing the report to the spec repository failed. Redacted.
    #[error("failed to publish report: {0}")]
    #[diagnostic(code(conform::publish_failed))]
    PublishFailed(String),

    /// Unexpected failure inside the compliance analyzer.
    #[error("analysis failed: {0}")]
    #[diagnostic(code(conform::analysis_failed))]
    AnalysisFailed(String),

    /// Model backend API or response error.
    #[error("LLM error: {0}")]
    #[diagnostic(code(conform::llm))]
    Llm(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    #[diagnostic(code(conform::serialization))]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    #[diagnostic(code(conform::toml))]
    Toml(#[from] toml::de::Error),

    /// Catch-all for invariant violations.
    #[error("internal error: {0}")]
    #[diagnostic(code(conform::internal))]
    Internal(String),
}

impl ConformError {
    /// Stable machine-readable code used in API error bodies.
    ///
    /// # Examples
    ///
    /// ```
    /// use conform_core::ConformError;
    ///
    /// assert_eq!(ConformError::Config("x".into()).code(), "CONFIGURATION_ERROR");
    /// assert_eq!(ConformError::Validation("x".into()).code(), "INVALID_REQUEST");
    /// assert_eq!(ConformError::NotReady("x".into()).code(), "INVALID_REQUEST");
    /// ```
    pub fn code(&self) -> &'static str {
        match self {
            ConformError::Config(_) => "CONFIGURATION_ERROR",
            ConformError::Validation(_) | ConformError::NotReady(_) => "INVALID_REQUEST",
            ConformError::NotFound(_) => "NOT_FOUND",
            ConformError::Timeout { .. } => "TIMEOUT",
            ConformError::CloneFailed(_) => "CLONE_FAILED",
            ConformError::PublishFailed(_) => "PUBLISH_FAILED",
            ConformError::AnalysisFailed(_) => "ANALYSIS_FAILED",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Returns `true` for errors whose detail must not reach API callers.
    pub fn is_internal(&self) -> bool {
        self.code() == "INTERNAL_ERROR"
    }
}
