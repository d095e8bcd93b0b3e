//! Session-scoped service facade used by the HTTP server.
//!
//! A session is created from a GitHub token and lives only in memory. The
//! token, the user and the drafts of the last preview run are dropped on
//! disconnect, or once the session has been idle for [`SESSION_IDLE_HOURS`].

pub mod routes;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::discovery::{sort_repositories, summarize, FilterConfig, RepositoryStats, SortKey};
use crate::error::{Result, UpdaterError};
use crate::llm::{LlmClient, LlmProvider, ProviderHealth};
use crate::metrics::MetricsSnapshot;
use crate::models::{BackupRecord, DraftReadme, GitHubSession, GitHubUser, RepoRef, RepositorySummary};
use crate::orchestrator::{CommitMode, CommittedDraft, Orchestrator, RestoreOutcome, RunReport, RunRequest};

pub use routes::router;

/// Hours after which an unused session is dropped
pub const SESSION_IDLE_HOURS: i64 = 8;

/// Request payload for opening a session
#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    /// GitHub personal access token
    pub token: String,
}

/// Response for a new session
#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub session_id: String,
    pub user: GitHubUser,
}

/// Query options for the repository listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepositoryQuery {
    pub language: Option<String>,
    pub name: Option<String>,
    pub exclude_forks: Option<bool>,
    pub include_private: Option<bool>,
    pub min_size_kb: Option<u64>,
    pub min_age_days: Option<u32>,
    pub sort: Option<SortKey>,
}

impl RepositoryQuery {
    /// Overlays the query on a base filter
    pub fn filter(&self, base: &FilterConfig) -> FilterConfig {
        let mut filter = base.clone();
        if self.language.is_some() {
            filter.language = self.language.clone();
        }
        if self.name.is_some() {
            filter.name_query = self.name.clone();
        }
        if let Some(exclude_forks) = self.exclude_forks {
            filter.exclude_forks = exclude_forks;
        }
        if let Some(include_private) = self.include_private {
            filter.include_private = include_private;
        }
        if let Some(min_size_kb) = self.min_size_kb {
            filter.min_size_kb = min_size_kb;
        }
        if let Some(min_age_days) = self.min_age_days {
            filter.min_age_days = min_age_days;
        }
        filter
    }
}

/// Filtered repositories with statistics
#[derive(Debug, Serialize, Deserialize)]
pub struct RepositoryListing {
    pub repositories: Vec<RepositorySummary>,
    pub stats: RepositoryStats,
}

/// Request payload for a pipeline run
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    /// `owner/name` of each repository to process
    pub repos: Vec<String>,
    /// Absent for a preview run
    #[serde(default)]
    pub mode: Option<CommitMode>,
    /// Overrides the configured discovery filter
    #[serde(default)]
    pub filter: Option<FilterConfig>,
}

/// A draft kept from a preview run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftEntry {
    pub repo: String,
    pub draft: DraftReadme,
}

/// Request payload for committing edited content
#[derive(Debug, Deserialize)]
pub struct CommitRequest {
    pub repo: String,
    /// Content to commit; the stored draft when absent
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub create_pr: bool,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Backup listing filter
#[derive(Debug, Default, Deserialize)]
pub struct BackupQuery {
    pub owner: Option<String>,
    pub repo: Option<String>,
}

/// Request payload for pruning backups
#[derive(Debug, Deserialize)]
pub struct CleanupRequest {
    pub keep_last: usize,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service name
    pub service: String,
    /// Service version
    pub version: String,
    /// `healthy` or `degraded`
    pub status: String,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
    /// Model provider connectivity
    pub llm: ProviderHealth,
}

/// Service status response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub active_sessions: usize,
    pub metrics: MetricsSnapshot,
}

struct SessionState {
    session: GitHubSession,
    user: GitHubUser,
    drafts: BTreeMap<String, DraftReadme>,
    last_seen: DateTime<Utc>,
}

/// Owns the sessions and forwards work to the [`Orchestrator`]
pub struct ReadmeService {
    orchestrator: Arc<Orchestrator>,
    llm: Arc<dyn LlmProvider>,
    default_filter: FilterConfig,
    sessions: Arc<RwLock<HashMap<String, SessionState>>>,
    idle_limit: Duration,
    started_at: DateTime<Utc>,
}

impl ReadmeService {
    pub fn new(orchestrator: Arc<Orchestrator>, llm: Arc<dyn LlmProvider>, default_filter: FilterConfig) -> Self {
        Self {
            orchestrator,
            llm,
            default_filter,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_limit: Duration::hours(SESSION_IDLE_HOURS),
            started_at: Utc::now(),
        }
    }

    /// Overrides how long an unused session stays open
    pub fn with_idle_limit(mut self, idle_limit: Duration) -> Self {
        self.idle_limit = idle_limit;
        self
    }

    /// Builds the full stack from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let llm: Arc<dyn LlmProvider> = Arc::new(LlmClient::new(&config.llm)?);
        let orchestrator = Arc::new(Orchestrator::from_config(config, llm.clone())?);
        Ok(Self::new(orchestrator, llm, config.discovery.clone()))
    }

    /// Validates the token against GitHub and opens a session
    pub async fn connect(&self, request: ConnectRequest) -> Result<ConnectResponse> {
        let (session, user) = self.orchestrator.authenticate(&request.token).await?;
        let session_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, state| now - state.last_seen < self.idle_limit);
        if sessions.len() < before {
            info!("Dropped {} idle sessions", before - sessions.len());
        }
        sessions.insert(
            session_id.clone(),
            SessionState {
                session,
                user: user.clone(),
                drafts: BTreeMap::new(),
                last_seen: now,
            },
        );
        info!("Session opened for {}", user.login);
        Ok(ConnectResponse { session_id, user })
    }

    /// Drops the token and every draft of the session
    pub async fn disconnect(&self, session_id: &str) -> Result<()> {
        let removed = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or(UpdaterError::Unauthenticated)?;
        info!("Session closed for {}", removed.user.login);
        Ok(())
    }

    /// Looks up a live session and marks it used; an idle one is dropped
    async fn touch(&self, session_id: &str) -> Result<(GitHubSession, GitHubUser)> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;

        let idle = match sessions.get(session_id) {
            Some(state) => now - state.last_seen >= self.idle_limit,
            None => return Err(UpdaterError::Unauthenticated),
        };
        if idle {
            if let Some(expired) = sessions.remove(session_id) {
                info!("Session expired for {}", expired.user.login);
            }
            return Err(UpdaterError::Unauthenticated);
        }

        let state = sessions.get_mut(session_id).ok_or(UpdaterError::Unauthenticated)?;
        state.last_seen = now;
        Ok((state.session.clone(), state.user.clone()))
    }

    async fn session(&self, session_id: &str) -> Result<GitHubSession> {
        Ok(self.touch(session_id).await?.0)
    }

    /// The user behind a session
    pub async fn user(&self, session_id: &str) -> Result<GitHubUser> {
        Ok(self.touch(session_id).await?.1)
    }

    /// Discovers repositories with the query applied, optionally sorted
    pub async fn repositories(&self, session_id: &str, query: &RepositoryQuery) -> Result<RepositoryListing> {
        let session = self.session(session_id).await?;
        let filter = query.filter(&self.default_filter);

        let mut repositories = self.orchestrator.discover(&session, &filter).await?;
        if let Some(sort) = query.sort {
            sort_repositories(&mut repositories, sort);
        }
        let stats = summarize(&repositories);
        Ok(RepositoryListing { repositories, stats })
    }

    /// Runs the pipeline; drafts of the run replace the session's drafts
    ///
    /// Drafts whose write failed are kept so they can be committed again.
    pub async fn generate(&self, session_id: &str, request: GenerateRequest) -> Result<RunReport> {
        let session = self.session(session_id).await?;
        let repos = request
            .repos
            .iter()
            .map(|name| name.parse::<RepoRef>())
            .collect::<Result<Vec<_>>>()?;
        if repos.is_empty() {
            return Err(UpdaterError::Validation("select at least one repository".into()));
        }

        let run = RunRequest {
            repos,
            filter: request.filter.unwrap_or_else(|| self.default_filter.clone()),
            mode: request.mode,
        };
        let report = self.orchestrator.run(&session, &run).await?;

        let drafts = report
            .outcomes
            .iter()
            .filter(|outcome| outcome.commit.as_ref().map_or(true, |commit| !commit.is_success()))
            .filter_map(|outcome| outcome.draft.clone().map(|draft| (outcome.repo.clone(), draft)))
            .collect();
        if let Some(state) = self.sessions.write().await.get_mut(session_id) {
            state.drafts = drafts;
        }
        Ok(report)
    }

    /// Drafts kept from the last run that did not commit them
    pub async fn drafts(&self, session_id: &str) -> Result<Vec<DraftEntry>> {
        self.session(session_id).await?;
        let sessions = self.sessions.read().await;
        let state = sessions.get(session_id).ok_or(UpdaterError::Unauthenticated)?;
        Ok(state
            .drafts
            .iter()
            .map(|(repo, draft)| DraftEntry {
                repo: repo.clone(),
                draft: draft.clone(),
            })
            .collect())
    }

    /// Commits edited content, or the stored draft, after a backup
    pub async fn commit(&self, session_id: &str, request: CommitRequest) -> Result<CommittedDraft> {
        let session = self.session(session_id).await?;
        let repo: RepoRef = request.repo.parse()?;

        let content = match request.content {
            Some(content) => content,
            None => self
                .sessions
                .read()
                .await
                .get(session_id)
                .and_then(|state| state.drafts.get(&repo.full_name()))
                .map(|draft| draft.body_text.clone())
                .ok_or_else(|| UpdaterError::NotFound(format!("no draft for {}", repo)))?,
        };
        let mode = if request.create_pr {
            CommitMode::PullRequest
        } else {
            CommitMode::Direct { branch: request.branch }
        };

        let committed = self
            .orchestrator
            .commit_draft(&session, &repo, &content, request.message.as_deref(), &mode)
            .await?;

        if let Some(state) = self.sessions.write().await.get_mut(session_id) {
            state.drafts.remove(&repo.full_name());
        }
        Ok(committed)
    }

    /// Lists backups, newest first; requires a session
    pub async fn backups(&self, session_id: &str, query: &BackupQuery) -> Result<Vec<BackupRecord>> {
        self.session(session_id).await?;
        self.orchestrator
            .backups()
            .list(query.owner.as_deref(), query.repo.as_deref())
            .await
    }

    /// Reads one backup; requires a session
    pub async fn backup(&self, session_id: &str, backup_id: &str) -> Result<BackupRecord> {
        self.session(session_id).await?;
        self.orchestrator.backups().read(backup_id).await
    }

    /// Restores a backup with the session's token
    pub async fn restore(&self, session_id: &str, backup_id: &str) -> Result<RestoreOutcome> {
        let session = self.session(session_id).await?;
        self.orchestrator.restore_backup(&session, backup_id).await
    }

    /// Deletes one backup; requires a session
    pub async fn delete_backup(&self, session_id: &str, backup_id: &str) -> Result<()> {
        self.session(session_id).await?;
        self.orchestrator.backups().delete(backup_id).await
    }

    /// Prunes backups per repository; requires a session
    pub async fn cleanup_backups(&self, session_id: &str, request: &CleanupRequest) -> Result<usize> {
        self.session(session_id).await?;
        self.orchestrator
            .backups()
            .cleanup(request.owner.as_deref(), request.repo.as_deref(), request.keep_last)
            .await
    }

    pub async fn health(&self) -> HealthResponse {
        let llm = self.llm.health().await;
        HealthResponse {
            service: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            status: if llm.reachable { "healthy" } else { "degraded" }.to_string(),
            timestamp: Utc::now(),
            llm,
        }
    }

    pub async fn status(&self) -> StatusResponse {
        StatusResponse {
            status: "operational".to_string(),
            started_at: self.started_at,
            active_sessions: self.sessions.read().await.len(),
            metrics: self.orchestrator.metrics().snapshot().await,
        }
    }
}
