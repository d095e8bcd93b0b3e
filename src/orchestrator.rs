//! Per-repository pipeline.
//!
//! Each selected repository moves through
//! `Pending → Discovered → Analyzed → Generated → Reviewed → BackedUp → Committed`
//! strictly in that order, or stops in `Failed { stage, cause }` where `stage`
//! is the state it could not enter. Repositories are processed one at a time
//! and a failure never leaves its own repository.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::agents::{Analyzer, Generator, ReviewSummary, Reviewer};
use crate::backup::BackupStore;
use crate::config::{Config, PipelineConfig};
use crate::discovery::{discover, FilterConfig};
use crate::error::{LlmError, Result, UpdaterError};
use crate::github::{GitHubClient, RepositoryHost};
use crate::llm::LlmProvider;
use crate::metrics::{self, Metrics};
use crate::models::{
    BackupRecord, CommitResult, CommitStatus, DraftReadme, GitHubSession, GitHubUser, RepoRef, RepositorySummary,
};

/// Pipeline states in their only legal order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Pending,
    Discovered,
    Analyzed,
    Generated,
    Reviewed,
    BackedUp,
    Committed,
}

impl Stage {
    /// The state that must follow this one
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Discovered),
            Self::Discovered => Some(Self::Analyzed),
            Self::Analyzed => Some(Self::Generated),
            Self::Generated => Some(Self::Reviewed),
            Self::Reviewed => Some(Self::BackedUp),
            Self::BackedUp => Some(Self::Committed),
            Self::Committed => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Why a repository stopped, in a form that survives serialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureCause {
    Timeout { secs: u64 },
    AuthFailed { message: String },
    NotFound { message: String },
    RateLimited { retry_after: Option<u64> },
    Network { message: String },
    Model { message: String },
    Truncated { length: usize, minimum: usize },
    Backup { message: String },
    Commit { message: String },
    Other { message: String },
}

impl FailureCause {
    fn from_llm(cause: &LlmError) -> Self {
        match cause {
            LlmError::Timeout { secs } => Self::Timeout { secs: *secs },
            LlmError::Truncated { length, minimum } => Self::Truncated {
                length: *length,
                minimum: *minimum,
            },
            other => Self::Model {
                message: other.to_string(),
            },
        }
    }

    /// Whether the model call ran out of time
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<&UpdaterError> for FailureCause {
    fn from(error: &UpdaterError) -> Self {
        match error {
            UpdaterError::AnalysisFailed { cause, .. }
            | UpdaterError::GenerationFailed { cause, .. }
            | UpdaterError::ReviewFailed { cause, .. } => Self::from_llm(cause),
            UpdaterError::AuthFailed(message) => Self::AuthFailed {
                message: message.clone(),
            },
            UpdaterError::NotFound(message) => Self::NotFound {
                message: message.clone(),
            },
            UpdaterError::RateLimited { retry_after } => Self::RateLimited {
                retry_after: *retry_after,
            },
            UpdaterError::Network(message) => Self::Network {
                message: message.clone(),
            },
            UpdaterError::BackupFailed { .. } => Self::Backup {
                message: error.to_string(),
            },
            UpdaterError::CommitFailed { .. } => Self::Commit {
                message: error.to_string(),
            },
            other => Self::Other {
                message: other.to_string(),
            },
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { secs } => write!(f, "timeout after {}s", secs),
            Self::RateLimited { retry_after: Some(secs) } => write!(f, "rate limited, retry after {}s", secs),
            Self::RateLimited { retry_after: None } => write!(f, "rate limited"),
            Self::Truncated { length, minimum } => {
                write!(f, "output too short ({} < {} characters)", length, minimum)
            }
            Self::AuthFailed { message }
            | Self::NotFound { message }
            | Self::Network { message }
            | Self::Model { message }
            | Self::Backup { message }
            | Self::Commit { message }
            | Self::Other { message } => write!(f, "{}", message),
        }
    }
}

/// Where a repository ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineState {
    /// Last state entered successfully
    Reached { stage: Stage },
    /// Could not enter `stage`
    Failed { stage: Stage, cause: FailureCause },
}

/// Enforces the transition order for one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMachine {
    state: PipelineState,
    history: Vec<Stage>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Reached { stage: Stage::Pending },
            history: vec![Stage::Pending],
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Stages entered so far, in order
    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    /// The stage the machine would enter next, `None` when finished or failed
    pub fn pending(&self) -> Option<Stage> {
        match self.state {
            PipelineState::Reached { stage } => stage.next(),
            PipelineState::Failed { .. } => None,
        }
    }

    /// Enters `to`; only the immediate successor is accepted
    pub fn advance(&mut self, to: Stage) -> Result<()> {
        if self.pending() != Some(to) {
            return Err(UpdaterError::Validation(format!(
                "illegal transition from {:?} to {}",
                self.state, to
            )));
        }
        self.state = PipelineState::Reached { stage: to };
        self.history.push(to);
        Ok(())
    }

    /// Records a failure to enter the next stage; returns the failed stage
    pub fn fail(&mut self, error: &UpdaterError) -> Stage {
        let stage = self.pending().unwrap_or(Stage::Committed);
        self.state = PipelineState::Failed {
            stage,
            cause: FailureCause::from(error),
        };
        stage
    }
}

/// How reviewed drafts reach GitHub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommitMode {
    /// Commit to `branch`, or the default branch
    Direct { branch: Option<String> },
    /// Commit to a new branch and open a pull request
    PullRequest,
}

/// One pipeline invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Repositories to process; empty means every discovered repository
    #[serde(default)]
    pub repos: Vec<RepoRef>,
    /// Discovery filter
    #[serde(default)]
    pub filter: FilterConfig,
    /// `None` stops after `Reviewed` and keeps the drafts for preview
    #[serde(default)]
    pub mode: Option<CommitMode>,
}

/// Final record for one repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryOutcome {
    pub repo: String,
    pub state: PipelineState,
    pub history: Vec<Stage>,
    pub draft: Option<DraftReadme>,
    pub review: Option<ReviewSummary>,
    pub backup: Option<BackupRecord>,
    pub commit: Option<CommitResult>,
}

impl RepositoryOutcome {
    fn new(repo: String) -> Self {
        Self {
            repo,
            state: PipelineState::Reached { stage: Stage::Pending },
            history: Vec::new(),
            draft: None,
            review: None,
            backup: None,
            commit: None,
        }
    }

    /// Stage and cause when the repository failed
    pub fn failure(&self) -> Option<(Stage, &FailureCause)> {
        match &self.state {
            PipelineState::Failed { stage, cause } => Some((*stage, cause)),
            PipelineState::Reached { .. } => None,
        }
    }
}

/// Per-repository results of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<RepositoryOutcome>,
}

impl RunReport {
    pub fn outcome(&self, repo: &str) -> Option<&RepositoryOutcome> {
        self.outcomes.iter().find(|o| o.repo == repo)
    }

    /// Repositories whose README reached GitHub
    pub fn committed(&self) -> impl Iterator<Item = &RepositoryOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.state == PipelineState::Reached { stage: Stage::Committed })
    }

    pub fn failures(&self) -> impl Iterator<Item = &RepositoryOutcome> {
        self.outcomes.iter().filter(|o| o.failure().is_some())
    }
}

/// Backup and commit of user-supplied content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedDraft {
    pub backup: BackupRecord,
    pub commit: CommitResult,
}

/// Result of restoring a backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreOutcome {
    /// Record that was restored
    pub restored: BackupRecord,
    /// Snapshot of the README that the restore replaced
    pub replaced: BackupRecord,
    /// `None` when the repository already matched the backup
    pub commit: Option<CommitResult>,
}

/// Sequences discovery, the three agents, backup and commit
pub struct Orchestrator {
    host: Arc<dyn RepositoryHost>,
    analyzer: Analyzer,
    generator: Generator,
    reviewer: Reviewer,
    backups: BackupStore,
    commit_message: String,
    metrics: Metrics,
}

impl Orchestrator {
    pub fn new(
        host: Arc<dyn RepositoryHost>,
        llm: Arc<dyn LlmProvider>,
        backups: BackupStore,
        pipeline: &PipelineConfig,
        metrics: Metrics,
    ) -> Self {
        Self {
            host,
            analyzer: Analyzer::new(llm.clone(), pipeline.sample_byte_limit),
            generator: Generator::new(llm.clone()),
            reviewer: Reviewer::new(llm, pipeline.placeholder_tokens.clone(), pipeline.min_content_length),
            backups,
            commit_message: pipeline.commit_message.clone(),
            metrics,
        }
    }

    /// Wires the GitHub client and the backup store from configuration
    pub fn from_config(config: &Config, llm: Arc<dyn LlmProvider>) -> Result<Self> {
        let host = Arc::new(GitHubClient::from_config(config)?);
        Ok(Self::new(
            host,
            llm,
            BackupStore::new(&config.backup.dir),
            &config.pipeline,
            Metrics::new(),
        ))
    }

    pub fn host(&self) -> &Arc<dyn RepositoryHost> {
        &self.host
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Validates `token` against GitHub and returns a session that knows its login
    pub async fn authenticate(&self, token: &str) -> Result<(GitHubSession, GitHubUser)> {
        let session = GitHubSession::new(token);
        if session.token().is_empty() {
            return Err(UpdaterError::Validation("token must not be empty".into()));
        }
        let user = self.host.authenticated_user(&session).await?;
        info!("Authenticated as {}", user.login);
        Ok((session.with_login(&user.login), user))
    }

    /// Lists and filters the session's repositories
    ///
    /// GitHub errors are returned unchanged.
    pub async fn discover(&self, session: &GitHubSession, filter: &FilterConfig) -> Result<Vec<RepositorySummary>> {
        let all = self.host.list_repositories(session).await?;
        Ok(discover(all, filter, Utc::now()))
    }

    /// Runs the pipeline over the selected repositories
    ///
    /// A failure while listing repositories fails the whole batch before any
    /// model call. After that every repository gets an outcome of its own.
    #[instrument(skip_all, fields(selected = request.repos.len(), commit = request.mode.is_some()))]
    pub async fn run(&self, session: &GitHubSession, request: &RunRequest) -> Result<RunReport> {
        let started_at = Utc::now();
        self.metrics.increment(metrics::RUNS).await;

        let discovered = self.discover(session, &request.filter).await?;
        info!("Discovered {} repositories", discovered.len());

        let mut outcomes = Vec::new();
        if request.repos.is_empty() {
            for repo in &discovered {
                outcomes.push(self.process(session, repo, request.mode.as_ref()).await);
            }
        } else {
            let wanted: HashSet<&RepoRef> = request.repos.iter().collect();
            let mut found = HashSet::new();
            for repo in discovered.iter().filter(|r| wanted.contains(&r.repo_ref())) {
                found.insert(repo.repo_ref());
                outcomes.push(self.process(session, repo, request.mode.as_ref()).await);
            }
            for missing in request.repos.iter().filter(|r| !found.contains(*r)) {
                outcomes.push(self.not_discovered(missing).await);
            }
        }

        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };
        info!(
            "Run finished: {} committed, {} failed of {}",
            report.committed().count(),
            report.failures().count(),
            report.outcomes.len()
        );
        Ok(report)
    }

    async fn not_discovered(&self, repo: &RepoRef) -> RepositoryOutcome {
        let mut machine = StateMachine::new();
        let error = UpdaterError::NotFound(format!("{} is not among the discovered repositories", repo));
        let stage = machine.fail(&error);
        self.metrics.increment(&metrics::failed_key(&stage.to_string())).await;
        warn!("{}", error);

        let mut outcome = RepositoryOutcome::new(repo.full_name());
        outcome.history = machine.history().to_vec();
        outcome.state = machine.state().clone();
        outcome
    }

    /// Drives one repository as far as it goes
    #[instrument(skip_all, fields(repo = %repo.full_name()))]
    async fn process(
        &self,
        session: &GitHubSession,
        repo: &RepositorySummary,
        mode: Option<&CommitMode>,
    ) -> RepositoryOutcome {
        self.metrics.increment(metrics::REPOSITORIES).await;
        let mut machine = StateMachine::new();
        let mut outcome = RepositoryOutcome::new(repo.full_name());

        if let Err(error) = self.drive(session, repo, mode, &mut machine, &mut outcome).await {
            let stage = machine.fail(&error);
            self.metrics.increment(&metrics::failed_key(&stage.to_string())).await;
            warn!("{} failed entering {}: {}", repo.full_name(), stage, error);
        }

        outcome.history = machine.history().to_vec();
        outcome.state = machine.state().clone();
        outcome
    }

    async fn drive(
        &self,
        session: &GitHubSession,
        repo: &RepositorySummary,
        mode: Option<&CommitMode>,
        machine: &mut StateMachine,
        outcome: &mut RepositoryOutcome,
    ) -> Result<()> {
        machine.advance(Stage::Discovered)?;

        let timer = Instant::now();
        let sample = self
            .analyzer
            .collect_sample(self.host.as_ref(), session, repo)
            .await?;
        let analysis = Arc::new(self.analyzer.analyze(repo, &sample).await?);
        self.metrics.record_time("stage.analyzed", timer.elapsed()).await;
        machine.advance(Stage::Analyzed)?;

        let timer = Instant::now();
        let mut draft = self.generator.generate(repo, analysis).await?;
        self.metrics.record_time("stage.generated", timer.elapsed()).await;
        machine.advance(Stage::Generated)?;

        let timer = Instant::now();
        let is_personal_repo = session.login() == Some(repo.owner.as_str());
        let review = self.reviewer.review(&mut draft, is_personal_repo).await?;
        self.metrics.record_time("stage.reviewed", timer.elapsed()).await;
        machine.advance(Stage::Reviewed)?;
        outcome.review = Some(review);
        outcome.draft = Some(draft.clone());

        let Some(mode) = mode else {
            info!("Preview ready for {}", repo.full_name());
            return Ok(());
        };

        let repo_ref = repo.repo_ref();
        let record = self.backup_current(session, &repo_ref).await?;
        machine.advance(Stage::BackedUp)?;
        outcome.backup = Some(record.clone());

        let commit = match self
            .write(session, &repo_ref, &draft.body_text, &self.commit_message, mode, &record)
            .await
        {
            Ok(commit) => commit,
            Err(error) => {
                let branch = match mode {
                    CommitMode::Direct { branch: Some(branch) } => branch.clone(),
                    _ => repo.default_branch.clone(),
                };
                outcome.commit = Some(CommitResult::failed(repo.full_name(), branch, error.to_string()));
                return Err(error);
            }
        };
        machine.advance(Stage::Committed)?;
        outcome.commit = Some(commit);
        Ok(())
    }

    /// Snapshots the README currently on GitHub, or the absent marker
    async fn backup_current(&self, session: &GitHubSession, repo: &RepoRef) -> Result<BackupRecord> {
        let current = self.host.get_readme(session, repo).await?;
        let record = self.backups.backup(repo, current.as_deref()).await?;
        self.metrics.increment(metrics::BACKUPS).await;
        Ok(record)
    }

    /// Writes content to GitHub; callers prove a backup exists by passing it
    async fn write(
        &self,
        session: &GitHubSession,
        repo: &RepoRef,
        content: &str,
        message: &str,
        mode: &CommitMode,
        backup: &BackupRecord,
    ) -> Result<CommitResult> {
        debug_assert_eq!(&backup.repo_ref(), repo);

        let result = match mode {
            CommitMode::Direct { branch } => {
                self.host
                    .commit_readme(session, repo, content, message, branch.as_deref())
                    .await
            }
            CommitMode::PullRequest => self.host.create_pull_request(session, repo, content, message).await,
        }
        .map_err(|e| UpdaterError::commit_failed(repo.full_name(), e))?;

        match result.status {
            CommitStatus::PullRequestCreated => self.metrics.increment(metrics::PULL_REQUESTS).await,
            _ => self.metrics.increment(metrics::COMMITTED).await,
        }
        info!("{} written ({:?}), backup {}", repo, result.status, backup.id);
        Ok(result)
    }

    /// Commits an edited draft, taking a backup first
    #[instrument(skip_all, fields(repo = %repo))]
    pub async fn commit_draft(
        &self,
        session: &GitHubSession,
        repo: &RepoRef,
        content: &str,
        message: Option<&str>,
        mode: &CommitMode,
    ) -> Result<CommittedDraft> {
        if content.trim().is_empty() {
            return Err(UpdaterError::Validation("README content is empty".into()));
        }

        let backup = self.backup_current(session, repo).await?;
        let message = message.unwrap_or(&self.commit_message);
        let commit = self.write(session, repo, content, message, mode, &backup).await?;
        Ok(CommittedDraft { backup, commit })
    }

    /// Puts a backup back on GitHub
    ///
    /// The README being replaced is backed up first. An absent-marker record
    /// deletes README.md.
    #[instrument(skip(self, session))]
    pub async fn restore_backup(&self, session: &GitHubSession, backup_id: &str) -> Result<RestoreOutcome> {
        let restored = self.backups.read(backup_id).await?;
        let content = self.backups.restore(&restored).await?;
        let repo = restored.repo_ref();

        let current = self.host.get_readme(session, &repo).await?;
        let replaced = self.backups.backup(&repo, current.as_deref()).await?;
        self.metrics.increment(metrics::BACKUPS).await;

        let message = format!("Restore README.md from backup {}", restored.id);
        let commit = match (content, current) {
            (Some(content), Some(current)) if content == current => None,
            (Some(content), _) => Some(
                self.write(session, &repo, &content, &message, &CommitMode::Direct { branch: None }, &replaced)
                    .await?,
            ),
            (None, Some(_)) => Some(
                self.host
                    .delete_readme(session, &repo, &message, None)
                    .await
                    .map_err(|e| UpdaterError::commit_failed(repo.full_name(), e))?,
            ),
            (None, None) => None,
        };

        self.metrics.increment(metrics::RESTORES).await;
        info!("Restored {} from {}", repo, restored.id);
        Ok(RestoreOutcome {
            restored,
            replaced,
            commit,
        })
    }
}
