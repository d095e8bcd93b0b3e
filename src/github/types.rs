use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{GitHubUser, RepositorySummary};

#[derive(Debug, Deserialize)]
pub(crate) struct ApiUser {
    pub login: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub public_repos: u64,
    #[serde(default)]
    pub owned_private_repos: u64,
}

impl From<ApiUser> for GitHubUser {
    fn from(user: ApiUser) -> Self {
        Self {
            login: user.login,
            name: user.name,
            avatar_url: user.avatar_url,
            public_repos: user.public_repos,
            private_repos: user.owned_private_repos,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiOwner {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiLicense {
    pub spdx_id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiRepository {
    pub name: String,
    pub owner: ApiOwner,
    pub default_branch: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub size: u64,
    pub pushed_at: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub license: Option<ApiLicense>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub private: bool,
}

impl ApiRepository {
    /// Converts the wire shape, with README presence looked up separately
    pub fn into_summary(self, has_readme: bool) -> RepositorySummary {
        let license = self.license.and_then(|license| {
            license
                .spdx_id
                .filter(|id| id != "NOASSERTION")
                .or(license.name)
        });

        RepositorySummary {
            owner: self.owner.login,
            name: self.name,
            default_branch: self.default_branch.unwrap_or_else(|| "main".to_string()),
            language: self.language,
            is_fork: self.fork,
            size_kb: self.size,
            pushed_at: self.pushed_at,
            has_readme,
            description: self.description,
            license,
            topics: self.topics,
            private: self.private,
        }
    }
}

/// Kind of an entry in a repository directory listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Dir,
    /// Symlink or submodule
    #[serde(other)]
    Other,
}

/// One entry of a repository directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// File or directory name
    pub name: String,
    /// Path from the repository root
    pub path: String,
    /// Entry kind
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Size in bytes, zero for directories
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiContent {
    pub sha: String,
    pub content: Option<String>,
    pub encoding: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PutContentRequest<'a> {
    pub message: &'a str,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    pub branch: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeleteContentRequest<'a> {
    pub message: &'a str,
    pub sha: String,
    pub branch: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiCommit {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentWriteResponse {
    pub commit: ApiCommit,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiGitObject {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiGitRef {
    pub object: ApiGitObject,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRefRequest {
    #[serde(rename = "ref")]
    pub reference: String,
    pub sha: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreatePullRequest<'a> {
    pub title: &'a str,
    pub head: &'a str,
    pub base: &'a str,
    pub body: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiPullRequest {
    pub html_url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub message: Option<String>,
}
