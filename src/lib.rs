#![doc = include_str!("../README.md")]
#![warn(clippy::all)]

//! readme-updater - multi-agent README drafting for GitHub repositories
//!
//! The pipeline discovers a user's repositories, samples each one, and runs
//! three model-backed stages over it: an analyzer, a generator and a
//! reviewer. Reviewed drafts can be previewed or written back to GitHub,
//! always after the current README has been backed up locally.
//!
//! ## Usage
//! ```rust,ignore
//! use std::sync::Arc;
//! use readme_updater::{Config, GitHubSession, LlmClient, Orchestrator, RunRequest};
//!
//! async fn example() -> readme_updater::Result<()> {
//!     let config = Config::load(None)?;
//!     let orchestrator = Orchestrator::from_config(&config, Arc::new(LlmClient::new(&config.llm)?))?;
//!     let session = GitHubSession::new(std::env::var("GITHUB_TOKEN").unwrap_or_default());
//!
//!     let report = orchestrator.run(&session, &RunRequest::default()).await?;
//!     println!("{} committed", report.committed().count());
//!     Ok(())
//! }
//! ```

/// The three model-backed stages and their response grammar
pub mod agents;
/// Session-scoped service facade and HTTP routes
pub mod api;
/// Local README backups
pub mod backup;
/// Configuration file, defaults and environment overrides
pub mod config;
/// Repository filtering, sorting and statistics
pub mod discovery;
/// Error handling types and utilities
pub mod error;
/// GitHub REST client
pub mod github;
/// Language model clients
pub mod llm;
/// Logging configuration
pub mod logging;
/// Metrics collection and reporting
pub mod metrics;
/// Shared data model
pub mod models;
/// Per-repository pipeline
pub mod orchestrator;
/// Prompt templates
pub mod prompts;

// Re-export common types
pub use backup::BackupStore;
pub use config::Config;
pub use discovery::FilterConfig;
pub use error::{LlmError, Result, UpdaterError};
pub use github::{GitHubClient, RepositoryHost};
pub use llm::{LlmClient, LlmProvider};
pub use models::{
    AnalysisResult, BackupRecord, CommitResult, CommitStatus, DraftReadme, GitHubSession, GitHubUser, QualityScore,
    RepoRef, RepositorySummary,
};
pub use orchestrator::{CommitMode, Orchestrator, PipelineState, RunReport, RunRequest, Stage};
