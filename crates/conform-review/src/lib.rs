//! Specification loading, compliance analysis and report rendering.
//!
//! - [`specs`]: find and read specification documents in a clone
//! - [`files`]: walk a clone for code files
//! - [`analyzer`]: judge requirements against code, heuristically or via the model
//! - [`llm`] and [`prompt`]: Ollama-compatible client and prompt/response handling
//! - [`report`]: render the `TODO.md` checklist

pub mod analyzer;
pub mod files;
pub mod llm;
pub mod prompt;
pub mod report;
pub mod specs;

pub use analyzer::{AnalysisOptions, AnalysisReport, AnalysisStats, ComplianceAnalyzer};
pub use llm::LlmClient;
pub use report::{render_todo, ReportContext};
pub use specs::load_specs;
