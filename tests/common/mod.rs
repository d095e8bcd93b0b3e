#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use readme_updater::config::PipelineConfig;
use readme_updater::github::{DirectoryEntry, EntryKind};
use readme_updater::llm::{CompletionRequest, ProviderHealth};
use readme_updater::metrics::Metrics;
use readme_updater::{
    BackupStore, CommitResult, CommitStatus, GitHubSession, GitHubUser, LlmError, LlmProvider, Orchestrator,
    RepoRef, RepositoryHost, RepositorySummary, Result, UpdaterError,
};

pub fn repository(owner: &str, name: &str, readme: bool) -> RepositorySummary {
    RepositorySummary {
        owner: owner.to_string(),
        name: name.to_string(),
        default_branch: "main".to_string(),
        language: Some("Rust".to_string()),
        is_fork: false,
        size_kb: 120,
        pushed_at: Some(Utc::now() - Duration::days(90)),
        has_readme: readme,
        description: Some(format!("{} does things", name)),
        license: Some("MIT".to_string()),
        topics: Vec::new(),
        private: false,
    }
}

/// Write calls seen by [`FakeHost`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Commit {
        repo: String,
        branch: Option<String>,
        content: String,
        /// Backups of the repository on disk when the write arrived
        backups_on_disk: usize,
    },
    PullRequest {
        repo: String,
        backups_on_disk: usize,
    },
    Delete {
        repo: String,
    },
}

/// In-memory GitHub
pub struct FakeHost {
    pub repos: Vec<RepositorySummary>,
    pub readmes: Mutex<HashMap<String, String>>,
    pub events: Mutex<Vec<HostEvent>>,
    pub list_failure: Mutex<Option<UpdaterError>>,
    pub readme_failures: Mutex<HashSet<String>>,
    pub write_failures: Mutex<HashSet<String>>,
    pub valid_token: String,
    backups: BackupStore,
}

impl FakeHost {
    pub fn new(repos: Vec<RepositorySummary>, backups: BackupStore) -> Self {
        Self {
            repos,
            readmes: Mutex::new(HashMap::new()),
            events: Mutex::new(Vec::new()),
            list_failure: Mutex::new(None),
            readme_failures: Mutex::new(HashSet::new()),
            write_failures: Mutex::new(HashSet::new()),
            valid_token: "ghp_valid".to_string(),
            backups,
        }
    }

    pub fn with_readme(self, repo: &str, content: &str) -> Self {
        self.readmes
            .lock()
            .unwrap()
            .insert(repo.to_string(), content.to_string());
        self
    }

    /// The next listing call fails with `error`
    pub fn fail_listing_with(&self, error: UpdaterError) {
        *self.list_failure.lock().unwrap() = Some(error);
    }

    /// Reading the README of `repo` fails with a network error
    pub fn fail_readme_reads_for(self, repo: &str) -> Self {
        self.readme_failures.lock().unwrap().insert(repo.to_string());
        self
    }

    /// Commits and pull requests against `repo` are rejected with a conflict
    pub fn fail_writes_for(self, repo: &str) -> Self {
        self.write_failures.lock().unwrap().insert(repo.to_string());
        self
    }

    fn check_write(&self, repo: &RepoRef) -> Result<()> {
        if self.write_failures.lock().unwrap().contains(&repo.full_name()) {
            return Err(UpdaterError::GitHubApi(
                "HTTP 409: README.md does not match the expected sha".into(),
            ));
        }
        Ok(())
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn readme(&self, repo: &str) -> Option<String> {
        self.readmes.lock().unwrap().get(repo).cloned()
    }

    fn check(&self, session: &GitHubSession) -> Result<()> {
        if session.token() == self.valid_token {
            Ok(())
        } else {
            Err(UpdaterError::AuthFailed("Bad credentials".into()))
        }
    }

    async fn backups_on_disk(&self, repo: &RepoRef) -> usize {
        self.backups
            .list(Some(&repo.owner), Some(&repo.name))
            .await
            .map(|records| records.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl RepositoryHost for FakeHost {
    async fn authenticated_user(&self, session: &GitHubSession) -> Result<GitHubUser> {
        self.check(session)?;
        Ok(GitHubUser {
            login: "demo".to_string(),
            name: Some("Demo User".to_string()),
            avatar_url: None,
            public_repos: self.repos.len() as u64,
            private_repos: 0,
        })
    }

    async fn list_repositories(&self, session: &GitHubSession) -> Result<Vec<RepositorySummary>> {
        self.check(session)?;
        if let Some(error) = self.list_failure.lock().unwrap().take() {
            return Err(error);
        }
        Ok(self.repos.clone())
    }

    async fn list_directory(
        &self,
        session: &GitHubSession,
        repo: &RepoRef,
        _path: &str,
    ) -> Result<Vec<DirectoryEntry>> {
        self.check(session)?;
        if repo.name == "empty-repo" {
            return Err(UpdaterError::NotFound("This repository is empty.".into()));
        }
        Ok(vec![
            DirectoryEntry {
                name: "Cargo.toml".into(),
                path: "Cargo.toml".into(),
                kind: EntryKind::File,
                size: 120,
            },
            DirectoryEntry {
                name: "src".into(),
                path: "src".into(),
                kind: EntryKind::Dir,
                size: 0,
            },
        ])
    }

    async fn get_file(&self, session: &GitHubSession, repo: &RepoRef, path: &str) -> Result<Option<String>> {
        self.check(session)?;
        Ok((path == "Cargo.toml").then(|| format!("[package]\nname = \"{}\"\n\n[dependencies]\ntokio = \"1\"\n", repo.name)))
    }

    async fn get_readme(&self, session: &GitHubSession, repo: &RepoRef) -> Result<Option<String>> {
        self.check(session)?;
        if self.readme_failures.lock().unwrap().contains(&repo.full_name()) {
            return Err(UpdaterError::Network("connection reset by peer".into()));
        }
        Ok(self.readme(&repo.full_name()))
    }

    async fn get_languages(&self, session: &GitHubSession, _repo: &RepoRef) -> Result<BTreeMap<String, u64>> {
        self.check(session)?;
        Ok(BTreeMap::from([("Rust".to_string(), 4096)]))
    }

    async fn commit_readme(
        &self,
        session: &GitHubSession,
        repo: &RepoRef,
        content: &str,
        _message: &str,
        branch: Option<&str>,
    ) -> Result<CommitResult> {
        self.check(session)?;
        self.check_write(repo)?;
        let backups_on_disk = self.backups_on_disk(repo).await;
        self.events.lock().unwrap().push(HostEvent::Commit {
            repo: repo.full_name(),
            branch: branch.map(str::to_string),
            content: content.to_string(),
            backups_on_disk,
        });
        self.readmes
            .lock()
            .unwrap()
            .insert(repo.full_name(), content.to_string());
        Ok(CommitResult {
            repo: repo.full_name(),
            branch: branch.unwrap_or("main").to_string(),
            commit_sha_or_pr_url: "3f2a9c1d".to_string(),
            status: CommitStatus::Committed,
        })
    }

    async fn create_pull_request(
        &self,
        session: &GitHubSession,
        repo: &RepoRef,
        _content: &str,
        _message: &str,
    ) -> Result<CommitResult> {
        self.check(session)?;
        self.check_write(repo)?;
        let backups_on_disk = self.backups_on_disk(repo).await;
        self.events.lock().unwrap().push(HostEvent::PullRequest {
            repo: repo.full_name(),
            backups_on_disk,
        });
        Ok(CommitResult {
            repo: repo.full_name(),
            branch: "readme-update-20240102030405".to_string(),
            commit_sha_or_pr_url: format!("https://github.com/{}/pull/7", repo),
            status: CommitStatus::PullRequestCreated,
        })
    }

    async fn delete_readme(
        &self,
        session: &GitHubSession,
        repo: &RepoRef,
        _message: &str,
        branch: Option<&str>,
    ) -> Result<CommitResult> {
        self.check(session)?;
        self.events.lock().unwrap().push(HostEvent::Delete { repo: repo.full_name() });
        self.readmes.lock().unwrap().remove(&repo.full_name());
        Ok(CommitResult {
            repo: repo.full_name(),
            branch: branch.unwrap_or("main").to_string(),
            commit_sha_or_pr_url: "9b8e7d6c".to_string(),
            status: CommitStatus::Committed,
        })
    }
}

/// Which agent a prompt belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Analysis,
    Generation,
    Review,
}

impl PromptKind {
    fn of(prompt: &str) -> Self {
        if prompt.starts_with("You are a senior engineer") {
            Self::Analysis
        } else if prompt.starts_with("You are reviewing") {
            Self::Review
        } else {
            Self::Generation
        }
    }
}

/// Language model that answers from fixed scripts
#[derive(Default)]
pub struct ScriptedLlm {
    calls: AtomicUsize,
    failures: Mutex<Vec<(String, PromptKind, LlmError)>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prompts of `kind` mentioning `repo` fail with `error`
    pub fn fail(self, repo: &str, kind: PromptKind, error: LlmError) -> Self {
        self.failures.lock().unwrap().push((repo.to_string(), kind, error));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn reviewed_body(repo: &str) -> String {
    format!(
        "# {repo}\n\n{}\n\n## Installation\n\n```sh\ncargo install --git https://github.com/{repo}\n```\n\n## Usage\n\nRun it.\n\n## License\n\nMIT",
        "A small and dependable Rust project. ".repeat(8)
    )
}

fn mentioned_repo(prompt: &str) -> String {
    prompt
        .split_whitespace()
        .find(|word| word.contains('/') && !word.starts_with("http"))
        .unwrap_or("unknown/unknown")
        .trim_end_matches(['.', ','])
        .to_string()
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn complete(&self, request: &CompletionRequest) -> std::result::Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let kind = PromptKind::of(&request.prompt);
        let repo = mentioned_repo(&request.prompt);

        let failure = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|(name, k, _)| *k == kind && *name == repo)
            .map(|(_, _, error)| error.clone());
        if let Some(error) = failure {
            return Err(error);
        }

        Ok(match kind {
            PromptKind::Analysis => "## Project Type\nCLI tool\n\n## Key Features\n- Fast\n- Small\n\n\
                ## Target Audience\nDevelopers automating chores.\n\n## Stack\n- Rust\n- Tokio\n"
                .to_string(),
            PromptKind::Generation => format!("```markdown\n# {repo}\n\nTODO: describe the project.\n```"),
            PromptKind::Review => format!("{}\n\nQUALITY_SCORE: 82", reviewed_body(&repo)),
        })
    }

    fn describe(&self) -> String {
        "scripted/test".to_string()
    }

    async fn health(&self) -> ProviderHealth {
        ProviderHealth {
            provider: "scripted".to_string(),
            model: "test".to_string(),
            reachable: true,
            models: vec!["test".to_string()],
            error: None,
        }
    }
}

pub fn session() -> GitHubSession {
    GitHubSession::new("ghp_valid").with_login("demo")
}

pub fn orchestrator(host: Arc<FakeHost>, llm: Arc<ScriptedLlm>, backups: BackupStore) -> Orchestrator {
    Orchestrator::new(host, llm, backups, &PipelineConfig::default(), Metrics::new())
}
