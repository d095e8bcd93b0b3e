//! axum routes over [`ReadmeService`].

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::{BackupQuery, CleanupRequest, CommitRequest, ConnectRequest, GenerateRequest, ReadmeService, RepositoryQuery};
use crate::error::UpdaterError;

/// Header carrying the id returned by `POST /api/session`
pub const SESSION_HEADER: &str = "x-session-id";

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Error response with a JSON body
#[derive(Debug)]
pub struct ApiError(UpdaterError);

impl From<UpdaterError> for ApiError {
    fn from(error: UpdaterError) -> Self {
        Self(error)
    }
}

/// HTTP status for an error
pub fn status_for(error: &UpdaterError) -> StatusCode {
    match error {
        UpdaterError::Unauthenticated | UpdaterError::AuthFailed(_) => StatusCode::UNAUTHORIZED,
        UpdaterError::NotFound(_) => StatusCode::NOT_FOUND,
        UpdaterError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        UpdaterError::Validation(_) => StatusCode::BAD_REQUEST,
        UpdaterError::AnalysisFailed { .. }
        | UpdaterError::GenerationFailed { .. }
        | UpdaterError::ReviewFailed { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected: {}", self.0);
        }

        let mut response = (status, Json(json!({ "error": self.0.to_string() }))).into_response();
        if let UpdaterError::RateLimited { retry_after: Some(secs) } = &self.0 {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

fn session_id(headers: &HeaderMap) -> std::result::Result<&str, ApiError> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or(ApiError(UpdaterError::Unauthenticated))
}

/// Builds the application router
pub fn router(service: Arc<ReadmeService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/api/session", post(connect).get(current_user).delete(disconnect))
        .route("/api/repositories", get(repositories))
        .route("/api/generate", post(generate))
        .route("/api/drafts", get(drafts))
        .route("/api/commit", post(commit))
        .route("/api/backups", get(list_backups))
        .route("/api/backups/cleanup", post(cleanup_backups))
        .route("/api/backups/:id", get(read_backup).delete(delete_backup))
        .route("/api/backups/:id/restore", post(restore_backup))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn health(State(service): State<Arc<ReadmeService>>) -> Json<Value> {
    Json(json!(service.health().await))
}

async fn status(State(service): State<Arc<ReadmeService>>) -> Json<Value> {
    Json(json!(service.status().await))
}

async fn connect(
    State(service): State<Arc<ReadmeService>>,
    Json(request): Json<ConnectRequest>,
) -> ApiResult<Value> {
    let response = service.connect(request).await?;
    Ok(Json(json!(response)))
}

async fn current_user(State(service): State<Arc<ReadmeService>>, headers: HeaderMap) -> ApiResult<Value> {
    let user = service.user(session_id(&headers)?).await?;
    Ok(Json(json!({ "user": user })))
}

async fn disconnect(State(service): State<Arc<ReadmeService>>, headers: HeaderMap) -> ApiResult<Value> {
    service.disconnect(session_id(&headers)?).await?;
    Ok(Json(json!({ "disconnected": true })))
}

async fn repositories(
    State(service): State<Arc<ReadmeService>>,
    headers: HeaderMap,
    Query(query): Query<RepositoryQuery>,
) -> ApiResult<Value> {
    let listing = service.repositories(session_id(&headers)?, &query).await?;
    Ok(Json(json!(listing)))
}

async fn generate(
    State(service): State<Arc<ReadmeService>>,
    headers: HeaderMap,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<Value> {
    info!("Pipeline requested for {} repositories", request.repos.len());
    let report = service.generate(session_id(&headers)?, request).await?;
    Ok(Json(json!(report)))
}

async fn drafts(State(service): State<Arc<ReadmeService>>, headers: HeaderMap) -> ApiResult<Value> {
    let drafts = service.drafts(session_id(&headers)?).await?;
    Ok(Json(json!({ "drafts": drafts })))
}

async fn commit(
    State(service): State<Arc<ReadmeService>>,
    headers: HeaderMap,
    Json(request): Json<CommitRequest>,
) -> ApiResult<Value> {
    let committed = service.commit(session_id(&headers)?, request).await?;
    Ok(Json(json!(committed)))
}

async fn list_backups(
    State(service): State<Arc<ReadmeService>>,
    headers: HeaderMap,
    Query(query): Query<BackupQuery>,
) -> ApiResult<Value> {
    let backups = service.backups(session_id(&headers)?, &query).await?;
    Ok(Json(json!({ "total": backups.len(), "backups": backups })))
}

async fn read_backup(
    State(service): State<Arc<ReadmeService>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let record = service.backup(session_id(&headers)?, &id).await?;
    Ok(Json(json!(record)))
}

async fn restore_backup(
    State(service): State<Arc<ReadmeService>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let outcome = service.restore(session_id(&headers)?, &id).await?;
    Ok(Json(json!(outcome)))
}

async fn delete_backup(
    State(service): State<Arc<ReadmeService>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> std::result::Result<StatusCode, ApiError> {
    service.delete_backup(session_id(&headers)?, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn cleanup_backups(
    State(service): State<Arc<ReadmeService>>,
    headers: HeaderMap,
    Json(request): Json<CleanupRequest>,
) -> ApiResult<Value> {
    let removed = service.cleanup_backups(session_id(&headers)?, &request).await?;
    Ok(Json(json!({ "removed": removed })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&UpdaterError::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(&UpdaterError::AuthFailed("bad".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(&UpdaterError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&UpdaterError::RateLimited { retry_after: Some(60) }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_for(&UpdaterError::GenerationFailed {
                repo: "acme/widgets".into(),
                cause: LlmError::Timeout { secs: 120 },
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&UpdaterError::commit_failed("acme/widgets", UpdaterError::NotFound("repo".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status_for(&UpdaterError::Config("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_rate_limit_sets_retry_after() {
        let response = ApiError(UpdaterError::RateLimited { retry_after: Some(60) }).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "60");
    }
}
