//! GitHub REST client.
//!
//! Every call takes the caller's [`GitHubSession`]; the client itself holds no
//! credentials and never writes the token anywhere.

mod types;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, UpdaterError};
use crate::models::{CommitResult, CommitStatus, GitHubSession, GitHubUser, RepoRef, RepositorySummary};

pub use types::{DirectoryEntry, EntryKind};
use types::{
    ApiContent, ApiErrorBody, ApiGitRef, ApiPullRequest, ApiRepository, ApiUser, ContentWriteResponse,
    CreatePullRequest, CreateRefRequest, DeleteContentRequest, PutContentRequest,
};

const PER_PAGE: usize = 100;

/// Operations the pipeline needs from a repository host
#[async_trait]
pub trait RepositoryHost: Send + Sync {
    /// Returns the user the token belongs to
    async fn authenticated_user(&self, session: &GitHubSession) -> Result<GitHubUser>;

    /// Lists every repository the user can access, all pages
    async fn list_repositories(&self, session: &GitHubSession) -> Result<Vec<RepositorySummary>>;

    /// Lists one directory; `""` is the repository root
    async fn list_directory(
        &self,
        session: &GitHubSession,
        repo: &RepoRef,
        path: &str,
    ) -> Result<Vec<DirectoryEntry>>;

    /// Reads a file from the default branch, `None` when it does not exist
    async fn get_file(&self, session: &GitHubSession, repo: &RepoRef, path: &str) -> Result<Option<String>>;

    /// Reads README.md from the default branch, `None` when absent
    async fn get_readme(&self, session: &GitHubSession, repo: &RepoRef) -> Result<Option<String>>;

    /// Bytes of code per language
    async fn get_languages(&self, session: &GitHubSession, repo: &RepoRef) -> Result<BTreeMap<String, u64>>;

    /// Creates or replaces README.md on `branch`, the default branch when `None`
    async fn commit_readme(
        &self,
        session: &GitHubSession,
        repo: &RepoRef,
        content: &str,
        message: &str,
        branch: Option<&str>,
    ) -> Result<CommitResult>;

    /// Commits README.md to a fresh branch and opens a pull request against the default branch
    async fn create_pull_request(
        &self,
        session: &GitHubSession,
        repo: &RepoRef,
        content: &str,
        message: &str,
    ) -> Result<CommitResult>;

    /// Removes README.md from `branch`, the default branch when `None`
    async fn delete_readme(
        &self,
        session: &GitHubSession,
        repo: &RepoRef,
        message: &str,
        branch: Option<&str>,
    ) -> Result<CommitResult>;
}

/// [`RepositoryHost`] backed by the GitHub REST API
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    api_base: String,
    readme_path: String,
    branch_prefix: String,
}

impl GitHubClient {
    /// Creates a client against `api_base`
    pub fn new(api_base: impl Into<String>, timeout: Duration, user_agent: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|e| UpdaterError::Config(format!("invalid user agent: {}", e)))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static("2022-11-28"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| UpdaterError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            readme_path: "README.md".to_string(),
            branch_prefix: "readme-update".to_string(),
        })
    }

    /// Creates a client from the `github` and `pipeline` config sections
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut client = Self::new(
            &config.github.api_base,
            Duration::from_secs(config.github.timeout_secs),
            &config.github.user_agent,
        )?;
        client.readme_path = config.pipeline.readme_path.clone();
        client.branch_prefix = config.pipeline.pull_request_branch_prefix.clone();
        Ok(client)
    }

    fn request(&self, method: Method, session: &GitHubSession, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.api_base, path))
            .bearer_auth(session.token())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| UpdaterError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(error_for_status(status, &headers, &body))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| UpdaterError::GitHubApi(format!("unexpected response body: {}", e)))
    }

    async fn repository(&self, session: &GitHubSession, repo: &RepoRef) -> Result<ApiRepository> {
        let path = format!("/repos/{}/{}", repo.owner, repo.name);
        self.send_json(self.request(Method::GET, session, &path)).await
    }

    async fn default_branch(&self, session: &GitHubSession, repo: &RepoRef) -> Result<String> {
        Ok(self
            .repository(session, repo)
            .await?
            .default_branch
            .unwrap_or_else(|| "main".to_string()))
    }

    async fn contents(
        &self,
        session: &GitHubSession,
        repo: &RepoRef,
        path: &str,
        branch: Option<&str>,
    ) -> Result<Option<ApiContent>> {
        let url = format!("/repos/{}/{}/contents/{}", repo.owner, repo.name, path);
        let mut request = self.request(Method::GET, session, &url);
        if let Some(branch) = branch {
            request = request.query(&[("ref", branch)]);
        }

        match self.send_json::<ApiContent>(request).await {
            Ok(content) => Ok(Some(content)),
            Err(UpdaterError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn file_exists(&self, session: &GitHubSession, repo: &RepoRef, path: &str) -> Result<bool> {
        Ok(self.contents(session, repo, path, None).await?.is_some())
    }

    async fn resolve_branch(
        &self,
        session: &GitHubSession,
        repo: &RepoRef,
        branch: Option<&str>,
    ) -> Result<String> {
        match branch {
            Some(branch) => Ok(branch.to_string()),
            None => self.default_branch(session, repo).await,
        }
    }
}

#[async_trait]
impl RepositoryHost for GitHubClient {
    async fn authenticated_user(&self, session: &GitHubSession) -> Result<GitHubUser> {
        let user: ApiUser = self.send_json(self.request(Method::GET, session, "/user")).await?;
        Ok(user.into())
    }

    async fn list_repositories(&self, session: &GitHubSession) -> Result<Vec<RepositorySummary>> {
        let mut all_repos = Vec::new();
        let mut page = 1;

        loop {
            let request = self.request(Method::GET, session, "/user/repos").query(&[
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
                ("sort", "updated".to_string()),
                ("affiliation", "owner,collaborator,organization_member".to_string()),
            ]);
            let repos: Vec<ApiRepository> = self.send_json(request).await?;
            let count = repos.len();
            debug!("Fetched page {} with {} repositories", page, count);

            for repo in repos {
                let repo_ref = RepoRef::new(&repo.owner.login, &repo.name);
                let has_readme = match self.file_exists(session, &repo_ref, &self.readme_path).await {
                    Ok(exists) => exists,
                    Err(e @ UpdaterError::RateLimited { .. }) => return Err(e),
                    Err(e) => {
                        warn!("README check failed for {}: {}", repo_ref, e);
                        false
                    }
                };
                all_repos.push(repo.into_summary(has_readme));
            }

            if count < PER_PAGE {
                break;
            }
            page += 1;
        }

        info!("Listed {} repositories", all_repos.len());
        Ok(all_repos)
    }

    async fn list_directory(
        &self,
        session: &GitHubSession,
        repo: &RepoRef,
        path: &str,
    ) -> Result<Vec<DirectoryEntry>> {
        let url = format!("/repos/{}/{}/contents/{}", repo.owner, repo.name, path.trim_matches('/'));
        self.send_json(self.request(Method::GET, session, &url)).await
    }

    async fn get_file(&self, session: &GitHubSession, repo: &RepoRef, path: &str) -> Result<Option<String>> {
        match self.contents(session, repo, path, None).await? {
            Some(content) => decode_content(&content).map(Some),
            None => Ok(None),
        }
    }

    async fn get_readme(&self, session: &GitHubSession, repo: &RepoRef) -> Result<Option<String>> {
        self.get_file(session, repo, &self.readme_path).await
    }

    async fn get_languages(&self, session: &GitHubSession, repo: &RepoRef) -> Result<BTreeMap<String, u64>> {
        let url = format!("/repos/{}/{}/languages", repo.owner, repo.name);
        self.send_json(self.request(Method::GET, session, &url)).await
    }

    async fn commit_readme(
        &self,
        session: &GitHubSession,
        repo: &RepoRef,
        content: &str,
        message: &str,
        branch: Option<&str>,
    ) -> Result<CommitResult> {
        let branch = self.resolve_branch(session, repo, branch).await?;
        let existing = self.contents(session, repo, &self.readme_path, Some(&branch)).await?;

        let url = format!("/repos/{}/{}/contents/{}", repo.owner, repo.name, self.readme_path);
        let body = PutContentRequest {
            message,
            content: BASE64.encode(content.as_bytes()),
            sha: existing.map(|c| c.sha),
            branch: &branch,
        };
        let written: ContentWriteResponse = self
            .send_json(self.request(Method::PUT, session, &url).json(&body))
            .await?;

        info!("Committed {} to {}@{}", self.readme_path, repo, branch);
        Ok(CommitResult {
            repo: repo.full_name(),
            branch,
            commit_sha_or_pr_url: written.commit.sha,
            status: CommitStatus::Committed,
        })
    }

    async fn create_pull_request(
        &self,
        session: &GitHubSession,
        repo: &RepoRef,
        content: &str,
        message: &str,
    ) -> Result<CommitResult> {
        let base = self.default_branch(session, repo).await?;

        let ref_url = format!("/repos/{}/{}/git/ref/heads/{}", repo.owner, repo.name, base);
        let base_ref: ApiGitRef = self.send_json(self.request(Method::GET, session, &ref_url)).await?;

        let head = format!("{}-{}", self.branch_prefix, Utc::now().format("%Y%m%d%H%M%S%3f"));
        let create_ref = CreateRefRequest {
            reference: format!("refs/heads/{}", head),
            sha: base_ref.object.sha,
        };
        let refs_url = format!("/repos/{}/{}/git/refs", repo.owner, repo.name);
        self.send(self.request(Method::POST, session, &refs_url).json(&create_ref))
            .await?;

        self.commit_readme(session, repo, content, message, Some(&head)).await?;

        let pulls_url = format!("/repos/{}/{}/pulls", repo.owner, repo.name);
        let pull = CreatePullRequest {
            title: message,
            head: &head,
            base: &base,
            body: "This pull request updates README.md with a generated draft.",
        };
        let created: ApiPullRequest = self
            .send_json(self.request(Method::POST, session, &pulls_url).json(&pull))
            .await?;

        info!("Opened pull request {} for {}", created.html_url, repo);
        Ok(CommitResult {
            repo: repo.full_name(),
            branch: head,
            commit_sha_or_pr_url: created.html_url,
            status: CommitStatus::PullRequestCreated,
        })
    }

    async fn delete_readme(
        &self,
        session: &GitHubSession,
        repo: &RepoRef,
        message: &str,
        branch: Option<&str>,
    ) -> Result<CommitResult> {
        let branch = self.resolve_branch(session, repo, branch).await?;
        let existing = self
            .contents(session, repo, &self.readme_path, Some(&branch))
            .await?
            .ok_or_else(|| UpdaterError::NotFound(format!("{} in {}", self.readme_path, repo)))?;

        let url = format!("/repos/{}/{}/contents/{}", repo.owner, repo.name, self.readme_path);
        let body = DeleteContentRequest {
            message,
            sha: existing.sha,
            branch: &branch,
        };
        let written: ContentWriteResponse = self
            .send_json(self.request(Method::DELETE, session, &url).json(&body))
            .await?;

        warn!("Deleted {} from {}@{}", self.readme_path, repo, branch);
        Ok(CommitResult {
            repo: repo.full_name(),
            branch,
            commit_sha_or_pr_url: written.commit.sha,
            status: CommitStatus::Committed,
        })
    }
}

/// Maps a non-success GitHub response onto the error taxonomy
pub(crate) fn error_for_status(status: StatusCode, headers: &HeaderMap, body: &str) -> UpdaterError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| status.to_string());

    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let exhausted = header("x-ratelimit-remaining") == Some("0");

    match status {
        StatusCode::TOO_MANY_REQUESTS => UpdaterError::RateLimited {
            retry_after: retry_after(headers),
        },
        StatusCode::FORBIDDEN if exhausted || header("retry-after").is_some() => UpdaterError::RateLimited {
            retry_after: retry_after(headers),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => UpdaterError::AuthFailed(message),
        StatusCode::NOT_FOUND => UpdaterError::NotFound(message),
        _ => UpdaterError::GitHubApi(format!("HTTP {}: {}", status.as_u16(), message)),
    }
}

fn retry_after(headers: &HeaderMap) -> Option<u64> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if let Some(secs) = header("retry-after").and_then(|v| v.trim().parse::<u64>().ok()) {
        return Some(secs);
    }
    header("x-ratelimit-reset")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map(|reset| (reset - Utc::now().timestamp()).max(0) as u64)
}

fn decode_content(content: &ApiContent) -> Result<String> {
    let raw = content.content.as_deref().unwrap_or_default();
    if content.encoding.as_deref().unwrap_or("base64") != "base64" {
        return Ok(raw.to_string());
    }

    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64
        .decode(cleaned)
        .map_err(|e| UpdaterError::GitHubApi(format!("invalid base64 content: {}", e)))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn client_for(server: &Server) -> GitHubClient {
        GitHubClient::new(server.url(), Duration::from_secs(5), "readme-updater-tests").unwrap()
    }

    fn session() -> GitHubSession {
        GitHubSession::new("ghp_test")
    }

    #[tokio::test]
    async fn test_list_repositories_maps_fields() {
        let mut server = Server::new_async().await;
        let repos = server
            .mock("GET", Matcher::Regex(r"^/user/repos".into()))
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer ghp_test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!([{
                    "name": "widgets",
                    "owner": {"login": "acme"},
                    "default_branch": "trunk",
                    "language": "Rust",
                    "fork": false,
                    "size": 420,
                    "pushed_at": "2024-01-02T03:04:05Z",
                    "description": "Widget toolkit",
                    "license": {"spdx_id": "MIT", "name": "MIT License"},
                    "topics": ["cli"],
                    "private": true
                }])
                .to_string(),
            )
            .create_async()
            .await;
        let readme = server
            .mock("GET", "/repos/acme/widgets/contents/README.md")
            .with_status(404)
            .with_body(r#"{"message": "Not Found"}"#)
            .create_async()
            .await;

        let listed = client_for(&server).list_repositories(&session()).await.unwrap();

        repos.assert_async().await;
        readme.assert_async().await;
        assert_eq!(listed.len(), 1);
        let repo = &listed[0];
        assert_eq!(repo.full_name(), "acme/widgets");
        assert_eq!(repo.default_branch, "trunk");
        assert_eq!(repo.size_kb, 420);
        assert_eq!(repo.license.as_deref(), Some("MIT"));
        assert!(repo.private);
        assert!(!repo.has_readme);
    }

    #[tokio::test]
    async fn test_readme_check_failure_does_not_drop_listing() {
        let mut server = Server::new_async().await;
        let listed_repo = |name: &str| json!({"name": name, "owner": {"login": "acme"}, "default_branch": "main"});
        server
            .mock("GET", Matcher::Regex(r"^/user/repos".into()))
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!([listed_repo("widgets"), listed_repo("gadgets")]).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/repos/acme/widgets/contents/README.md")
            .with_status(200)
            .with_body(json!({"sha": "abc", "content": "", "encoding": "base64"}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/repos/acme/gadgets/contents/README.md")
            .with_status(451)
            .with_body(r#"{"message": "Repository access blocked"}"#)
            .create_async()
            .await;

        let listed = client_for(&server).list_repositories(&session()).await.unwrap();

        let flags: Vec<_> = listed.iter().map(|r| (r.name.as_str(), r.has_readme)).collect();
        assert_eq!(flags, vec![("widgets", true), ("gadgets", false)]);
    }

    #[tokio::test]
    async fn test_rate_limited_readme_check_aborts_listing() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", Matcher::Regex(r"^/user/repos".into()))
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!([{"name": "widgets", "owner": {"login": "acme"}}]).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/repos/acme/widgets/contents/README.md")
            .with_status(429)
            .with_header("retry-after", "30")
            .create_async()
            .await;

        let result = client_for(&server).list_repositories(&session()).await;
        assert!(matches!(result, Err(UpdaterError::RateLimited { retry_after: Some(30) })));
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_auth_failed() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/user")
            .with_status(401)
            .with_body(r#"{"message": "Bad credentials"}"#)
            .create_async()
            .await;

        let result = client_for(&server).authenticated_user(&session()).await;
        assert!(matches!(result, Err(UpdaterError::AuthFailed(ref m)) if m == "Bad credentials"));
    }

    #[tokio::test]
    async fn test_exhausted_quota_maps_to_rate_limited() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", Matcher::Regex(r"^/user/repos".into()))
            .match_query(Matcher::Any)
            .with_status(403)
            .with_header("x-ratelimit-remaining", "0")
            .with_header("retry-after", "60")
            .with_body(r#"{"message": "API rate limit exceeded"}"#)
            .create_async()
            .await;

        let result = client_for(&server).list_repositories(&session()).await;
        assert!(matches!(result, Err(UpdaterError::RateLimited { retry_after: Some(60) })));
    }

    #[tokio::test]
    async fn test_get_readme_decodes_and_handles_absence() {
        let mut server = Server::new_async().await;
        let encoded = BASE64.encode("# Widgets\n\nHello");
        let wrapped = format!("{}\n{}", &encoded[..8], &encoded[8..]);
        server
            .mock("GET", "/repos/acme/widgets/contents/README.md")
            .with_status(200)
            .with_body(json!({"sha": "abc", "content": wrapped, "encoding": "base64"}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/repos/demo/empty-repo/contents/README.md")
            .with_status(404)
            .with_body(r#"{"message": "Not Found"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let present = client.get_readme(&session(), &RepoRef::new("acme", "widgets")).await.unwrap();
        let absent = client.get_readme(&session(), &RepoRef::new("demo", "empty-repo")).await.unwrap();

        assert_eq!(present.as_deref(), Some("# Widgets\n\nHello"));
        assert_eq!(absent, None);
    }

    #[tokio::test]
    async fn test_commit_readme_updates_existing_file() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", Matcher::Regex(r"^/repos/acme/widgets/contents/README\.md".into()))
            .match_query(Matcher::UrlEncoded("ref".into(), "main".into()))
            .with_status(200)
            .with_body(json!({"sha": "old-sha", "content": "", "encoding": "base64"}).to_string())
            .create_async()
            .await;
        let put = server
            .mock("PUT", "/repos/acme/widgets/contents/README.md")
            .match_body(Matcher::PartialJson(json!({
                "sha": "old-sha",
                "branch": "main",
                "content": BASE64.encode("# New"),
            })))
            .with_status(200)
            .with_body(json!({"commit": {"sha": "new-sha"}}).to_string())
            .create_async()
            .await;

        let result = client_for(&server)
            .commit_readme(&session(), &RepoRef::new("acme", "widgets"), "# New", "Update README.md", Some("main"))
            .await
            .unwrap();

        put.assert_async().await;
        assert_eq!(result.commit_sha_or_pr_url, "new-sha");
        assert_eq!(result.status, CommitStatus::Committed);
    }

    #[tokio::test]
    async fn test_create_pull_request_flow() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widgets")
            .with_status(200)
            .with_body(json!({"name": "widgets", "owner": {"login": "acme"}, "default_branch": "main"}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/repos/acme/widgets/git/ref/heads/main")
            .with_status(200)
            .with_body(json!({"object": {"sha": "base-sha"}}).to_string())
            .create_async()
            .await;
        let create_ref = server
            .mock("POST", "/repos/acme/widgets/git/refs")
            .match_body(Matcher::PartialJson(json!({"sha": "base-sha"})))
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;
        server
            .mock("GET", Matcher::Regex(r"^/repos/acme/widgets/contents/README\.md".into()))
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"message": "Not Found"}"#)
            .create_async()
            .await;
        server
            .mock("PUT", "/repos/acme/widgets/contents/README.md")
            .with_status(201)
            .with_body(json!({"commit": {"sha": "branch-sha"}}).to_string())
            .create_async()
            .await;
        server
            .mock("POST", "/repos/acme/widgets/pulls")
            .match_body(Matcher::PartialJson(json!({"base": "main"})))
            .with_status(201)
            .with_body(json!({"html_url": "https://github.com/acme/widgets/pull/7"}).to_string())
            .create_async()
            .await;

        let result = client_for(&server)
            .create_pull_request(&session(), &RepoRef::new("acme", "widgets"), "# New", "Update README.md")
            .await
            .unwrap();

        create_ref.assert_async().await;
        assert_eq!(result.status, CommitStatus::PullRequestCreated);
        assert_eq!(result.commit_sha_or_pr_url, "https://github.com/acme/widgets/pull/7");
        let stamp = result.branch.strip_prefix("readme-update-").unwrap();
        assert_eq!(stamp.len(), 17);
        assert!(stamp.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_rate_limit_reset_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        let reset = (Utc::now().timestamp() + 120).to_string();
        headers.insert("x-ratelimit-reset", HeaderValue::from_str(&reset).unwrap());

        match error_for_status(StatusCode::FORBIDDEN, &headers, "") {
            UpdaterError::RateLimited { retry_after: Some(secs) } => assert!((118..=120).contains(&secs)),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(
            error_for_status(StatusCode::FORBIDDEN, &HeaderMap::new(), "{}"),
            UpdaterError::AuthFailed(_)
        ));
    }
}
