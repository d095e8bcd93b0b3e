//! Shared data model passed between the pipeline stages.
//!
//! Everything here is a plain value: repository snapshots, stage outputs and
//! terminal results. Nothing in this module performs I/O.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::UpdaterError;

/// Placeholder used when the model response lacks a required field
pub const UNKNOWN: &str = "unknown";

/// Owner and name of a GitHub repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoRef {
    /// User or organization login
    pub owner: String,
    /// Repository name
    pub name: String,
}

impl RepoRef {
    /// Creates a reference from its two parts
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Returns `owner/name`
    pub fn full_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoRef {
    type Err = UpdaterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || UpdaterError::Validation(format!("expected owner/repo, got '{s}'"));
        let (owner, name) = s.trim().split_once('/').ok_or_else(invalid)?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(invalid());
        }
        Ok(Self::new(owner, name))
    }
}

/// Authentication context handed to every GitHub call.
///
/// The token lives only as long as the value itself. It is deliberately not
/// serializable and is redacted from `Debug` output.
#[derive(Clone)]
pub struct GitHubSession {
    token: String,
    login: Option<String>,
}

impl GitHubSession {
    /// Creates a session from a personal access token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into().trim().to_string(),
            login: None,
        }
    }

    /// Attaches the login of the authenticated user
    pub fn with_login(mut self, login: impl Into<String>) -> Self {
        self.login = Some(login.into());
        self
    }

    /// Bearer token for the `Authorization` header
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Login of the authenticated user, once known
    pub fn login(&self) -> Option<&str> {
        self.login.as_deref()
    }
}

impl fmt::Debug for GitHubSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubSession")
            .field("token", &"<redacted>")
            .field("login", &self.login)
            .finish()
    }
}

/// The authenticated GitHub user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubUser {
    /// Account login
    pub login: String,
    /// Display name
    pub name: Option<String>,
    /// Avatar image URL
    pub avatar_url: Option<String>,
    /// Number of public repositories
    pub public_repos: u64,
    /// Number of private repositories owned by the user
    pub private_repos: u64,
}

/// Snapshot of a repository fetched once per pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySummary {
    /// User or organization login
    pub owner: String,
    /// Repository name
    pub name: String,
    /// Branch new commits land on by default
    pub default_branch: String,
    /// Primary language reported by GitHub
    pub language: Option<String>,
    /// Whether the repository is a fork
    pub is_fork: bool,
    /// Repository size in kilobytes
    pub size_kb: u64,
    /// Time of the last push
    pub pushed_at: Option<DateTime<Utc>>,
    /// Whether a README.md exists on the default branch
    pub has_readme: bool,
    /// Short description
    pub description: Option<String>,
    /// SPDX identifier of the detected license
    pub license: Option<String>,
    /// Repository topics
    pub topics: Vec<String>,
    /// Whether the repository is private
    pub private: bool,
}

impl RepositorySummary {
    /// Returns the owner/name pair
    pub fn repo_ref(&self) -> RepoRef {
        RepoRef::new(&self.owner, &self.name)
    }

    /// Returns `owner/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Structured summary produced by the analyzer stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Repository the analysis belongs to
    pub repo: RepoRef,
    /// Kind of project (CLI, library, web app...)
    pub project_type: String,
    /// Features in the order the model listed them
    pub key_features: Vec<String>,
    /// Who the project is for
    pub target_audience: String,
    /// Languages, frameworks and tools
    pub detected_stack: BTreeSet<String>,
    /// Set when required sections were missing from the model response
    pub low_confidence: bool,
}

/// A README draft moving through the generator and reviewer stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftReadme {
    /// Full markdown body
    pub body_text: String,
    /// Analysis the draft was generated from
    pub source_analysis: Arc<AnalysisResult>,
    /// Score attached by the reviewer, 0 to 100
    pub quality_score: Option<QualityScore>,
}

impl DraftReadme {
    /// Creates an unreviewed draft
    pub fn new(body_text: impl Into<String>, source_analysis: Arc<AnalysisResult>) -> Self {
        Self {
            body_text: body_text.into(),
            source_analysis,
            quality_score: None,
        }
    }
}

/// A reviewer quality score, always within `0..=100`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QualityScore(u8);

impl QualityScore {
    /// Score used when the reviewer response carries no readable score
    pub const NEUTRAL: Self = Self(50);

    /// Clamps any integer into the valid range
    pub fn clamped(value: i64) -> Self {
        // the clamp guarantees the value fits in a u8
        Self(value.clamp(0, 100) as u8)
    }

    /// Returns the score as an integer
    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for QualityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/100", self.0)
    }
}

/// Snapshot of a README taken immediately before it is overwritten
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Identifier of the record (its file name)
    pub id: String,
    /// User or organization login
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Creation time, millisecond precision
    pub timestamp: DateTime<Utc>,
    /// File holding the snapshot
    pub stored_path: PathBuf,
    /// Prior README text, `None` when no README existed
    pub original_content: Option<String>,
}

impl BackupRecord {
    /// Returns the owner/name pair
    pub fn repo_ref(&self) -> RepoRef {
        RepoRef::new(&self.owner, &self.repo)
    }
}

/// How a README write ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStatus {
    /// Written directly to a branch
    Committed,
    /// Written to a new branch with a pull request opened
    PullRequestCreated,
    /// The write did not happen
    Failed,
}

/// Terminal value per repository per run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResult {
    /// Repository full name
    pub repo: String,
    /// Branch the content was written to
    pub branch: String,
    /// Commit SHA for direct commits, pull request URL otherwise, error text on failure
    pub commit_sha_or_pr_url: String,
    /// Outcome of the write
    pub status: CommitStatus,
}

impl CommitResult {
    /// Builds the record of a write that did not happen
    pub fn failed(repo: impl Into<String>, branch: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            branch: branch.into(),
            commit_sha_or_pr_url: reason.into(),
            status: CommitStatus::Failed,
        }
    }

    /// Whether content actually reached GitHub
    pub fn is_success(&self) -> bool {
        self.status != CommitStatus::Failed
    }
}
