use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Custom result type alias for the application
pub type Result<T> = std::result::Result<T, UpdaterError>;

/// Underlying cause of a failed language-model stage
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    /// The provider did not answer within the configured timeout
    #[error("timed out after {secs}s")]
    Timeout {
        /// Configured request timeout in seconds
        secs: u64,
    },

    /// The provider could not be reached
    #[error("connection error: {0}")]
    Connection(String),

    /// The provider answered with a non-success HTTP status
    #[error("provider returned HTTP {status}: {message}")]
    Provider {
        /// HTTP status code
        status: u16,
        /// Body or reason reported by the provider
        message: String,
    },

    /// The provider answered with a body we could not decode
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The provider answered with no text at all
    #[error("empty response")]
    EmptyResponse,

    /// The revised text is shorter than the configured minimum
    #[error("output truncated: {length} characters, minimum is {minimum}")]
    Truncated {
        /// Character count of the rejected text
        length: usize,
        /// Configured minimum character count
        minimum: usize,
    },
}

/// Errors that can occur while discovering, drafting, backing up or committing READMEs
#[derive(Debug, Error)]
pub enum UpdaterError {
    /// GitHub rejected the token (HTTP 401, or 403 without rate-limit headers)
    #[error("GitHub authentication failed: {0}")]
    AuthFailed(String),

    /// The repository, file or backup does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// GitHub rate limit exceeded; `retry_after` is in seconds when GitHub reported it
    #[error("Rate limit exceeded{}", .retry_after.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited {
        /// Seconds to wait before the next attempt
        retry_after: Option<u64>,
    },

    /// Network connectivity errors
    #[error("Network error: {0}")]
    Network(String),

    /// Any other non-success response from the GitHub API
    #[error("GitHub API error: {0}")]
    GitHubApi(String),

    /// The analyzer stage failed for a repository
    #[error("Analysis failed for {repo}: {cause}")]
    AnalysisFailed {
        /// Repository full name
        repo: String,
        /// Underlying model failure
        #[source]
        cause: LlmError,
    },

    /// The generator stage failed for a repository
    #[error("Generation failed for {repo}: {cause}")]
    GenerationFailed {
        /// Repository full name
        repo: String,
        /// Underlying model failure
        #[source]
        cause: LlmError,
    },

    /// The reviewer stage failed for a repository
    #[error("Review failed for {repo}: {cause}")]
    ReviewFailed {
        /// Repository full name
        repo: String,
        /// Underlying model failure or length violation
        #[source]
        cause: LlmError,
    },

    /// A backup file could not be written or read
    #[error("Backup failed at {}: {source}", .path.display())]
    BackupFailed {
        /// File the store tried to touch
        path: PathBuf,
        /// Filesystem error
        #[source]
        source: io::Error,
    },

    /// Writing README content to GitHub failed
    #[error("Commit failed for {repo}: {cause}")]
    CommitFailed {
        /// Repository full name
        repo: String,
        /// GitHub client error raised during the write
        #[source]
        cause: Box<UpdaterError>,
    },

    /// The request carried no valid session
    #[error("Not authenticated")]
    Unauthenticated,

    /// Input validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// I/O errors
    #[error("IO error: {0}")]
    IO(#[from] io::Error),

    /// JSON parsing/serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request/response errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl UpdaterError {
    /// Checks if this error is transient and retryable
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Http(_) | Self::RateLimited { .. }
        )
    }

    /// Checks if this error is fatal and should terminate processing
    pub fn is_fatal(&self) -> bool {
        !self.is_transient()
    }

    /// Wraps a GitHub client error raised while writing README content
    pub fn commit_failed(repo: impl Into<String>, cause: UpdaterError) -> Self {
        Self::CommitFailed {
            repo: repo.into(),
            cause: Box::new(cause),
        }
    }
}
