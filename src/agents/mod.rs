//! The three model-backed pipeline stages.
//!
//! Each agent fills a fixed prompt template, makes exactly one call through
//! [`LlmProvider`](crate::llm::LlmProvider) and parses the reply with the
//! grammar in [`parser`]. Agents never retry; a failed call is returned to
//! the orchestrator as the stage's typed error.

pub mod analyzer;
pub mod generator;
pub mod parser;
pub mod reviewer;

pub use analyzer::{inspect_manifests, Analyzer, ManifestInsights, RepositorySample};
pub use generator::Generator;
pub use reviewer::{readme_checks, ReadmeChecks, ReviewSummary, Reviewer};
