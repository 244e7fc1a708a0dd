//! API request handlers

use crate::auth::TenantContext;
use crate::error::CoreError;
use crate::jsonapi::{Document, WriteDocument};
use crate::neo4j::{QueryExecutor, QueryObject};
use crate::service::{ResourceService, ServiceError, ServiceResult};
use crate::AuthConfig;
use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Shared server state
pub struct ServerState {
    pub service: ResourceService,
    pub executor: Arc<dyn QueryExecutor>,
    /// Auth config; None means deny-by-default
    pub auth_config: Option<AuthConfig>,
    /// Deadline for the whole parse → query → serialise chain of one request
    pub request_timeout: Duration,
    /// Allowed CORS origins as regex patterns; empty allows any origin
    pub cors_origins: Vec<String>,
}

/// Shared API state
pub type ApiState = Arc<ServerState>;

// ============================================================================
// Health check
// ============================================================================

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub neo4j: String,
}

/// Health check handler. Round-trips a trivial query to Neo4j.
///
/// Returns 200 + `"ok"` when the graph answers, 503 + `"unhealthy"` otherwise.
pub async fn health(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    let probe = state
        .executor
        .read_one(QueryObject::new("RETURN 1 AS ok").returning(["ok"]));
    let neo4j_ok = matches!(
        tokio::time::timeout(state.request_timeout, probe).await,
        Ok(Ok(Some(_)))
    );

    let (http_status, status, neo4j) = if neo4j_ok {
        (StatusCode::OK, "ok", "connected")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy", "disconnected")
    };

    (
        http_status,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            neo4j: neo4j.to_string(),
        }),
    )
}

// ============================================================================
// Resources
// ============================================================================

/// Run a service call under the per-request deadline
async fn with_deadline<T, F>(state: &ServerState, fut: F) -> Result<T, AppError>
where
    F: Future<Output = ServiceResult<T>>,
{
    match tokio::time::timeout(state.request_timeout, fut).await {
        Ok(result) => result.map_err(AppError::from),
        Err(_) => Err(AppError::Timeout {
            detail: format!(
                "Request did not complete within {:?}",
                state.request_timeout
            ),
            retryable: false,
        }),
    }
}

/// `GET /api/{resource}`
pub async fn list_resources(
    State(state): State<ApiState>,
    ctx: TenantContext,
    Path(resource): Path<String>,
    uri: Uri,
) -> Result<Json<Document>, AppError> {
    let doc = with_deadline(
        &state,
        state.service.list(&ctx, &resource, uri.query(), uri.path()),
    )
    .await?;
    Ok(Json(doc))
}

/// `GET /api/{resource}/{id}`
pub async fn get_resource(
    State(state): State<ApiState>,
    ctx: TenantContext,
    Path((resource, id)): Path<(String, String)>,
    uri: Uri,
) -> Result<Json<Document>, AppError> {
    let doc = with_deadline(&state, state.service.get(&ctx, &resource, &id, uri.query())).await?;
    Ok(Json(doc))
}

/// `POST /api/{resource}`
pub async fn create_resource(
    State(state): State<ApiState>,
    ctx: TenantContext,
    Path(resource): Path<String>,
    Json(body): Json<WriteDocument>,
) -> Result<(StatusCode, Json<Document>), AppError> {
    let doc = with_deadline(&state, state.service.create(&ctx, &resource, body)).await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

/// `PATCH|PUT /api/{resource}/{id}`
pub async fn update_resource(
    State(state): State<ApiState>,
    ctx: TenantContext,
    Path((resource, id)): Path<(String, String)>,
    Json(body): Json<WriteDocument>,
) -> Result<Json<Document>, AppError> {
    let doc = with_deadline(&state, state.service.update(&ctx, &resource, &id, body)).await?;
    Ok(Json(doc))
}

/// `DELETE /api/{resource}/{id}`
pub async fn delete_resource(
    State(state): State<ApiState>,
    ctx: TenantContext,
    Path((resource, id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    with_deadline(&state, state.service.delete(&ctx, &resource, &id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Error handling
// ============================================================================

/// Application error type
#[derive(Debug)]
pub enum AppError {
    Internal(anyhow::Error),
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    /// `retryable` adds a `Retry-After` hint; only reads that timed out set it
    Timeout { detail: String, retryable: bool },
}

/// Seconds clients are told to wait before retrying a timed-out read
const RETRY_AFTER_SECS: &str = "1";

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let mut retry_after = false;
        let (status, detail) = match self {
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Timeout { detail, retryable } => {
                retry_after = retryable;
                (StatusCode::GATEWAY_TIMEOUT, detail)
            }
        };

        let body = Json(serde_json::json!({
            "errors": [{
                "status": status.as_u16().to_string(),
                "title": status.canonical_reason().unwrap_or("Error"),
                "detail": detail,
            }]
        }));

        let mut resp = (status, body).into_response();
        if retry_after {
            resp.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from_static(RETRY_AFTER_SECS),
            );
        }
        resp
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { .. } => AppError::NotFound(err.to_string()),
            CoreError::Forbidden { .. } => AppError::Forbidden(err.to_string()),
            CoreError::ReadTimeout(_) | CoreError::AmbiguousWrite(_) => AppError::Timeout {
                retryable: err.is_retryable(),
                detail: err.to_string(),
            },
            other => AppError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::UnknownResource(_) => AppError::NotFound(err.to_string()),
            ServiceError::Invalid(msg) => AppError::BadRequest(msg),
            ServiceError::Conflict(msg) => AppError::Conflict(msg),
            ServiceError::Core(core) => core.into(),
        }
    }
}
