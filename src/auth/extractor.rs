//! TenantContext extractor for Axum handlers.
//!
//! Reads the context inserted by the `require_auth` middleware.

use crate::api::handlers::{ApiState, AppError};
use crate::auth::TenantContext;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

impl FromRequestParts<ApiState> for TenantContext {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &ApiState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let ctx = parts.extensions.get::<TenantContext>().cloned();
        async move {
            ctx.ok_or_else(|| {
                AppError::Unauthorized("Authentication required, no tenant in request".to_string())
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neo4j::mock::MockExecutor;
    use crate::test_helpers::mock_server_state;
    use axum::http::Request;

    #[tokio::test]
    async fn test_extracts_tenant_from_extensions() {
        let state = mock_server_state(None, MockExecutor::new());
        let (mut parts, _) = Request::builder().uri("/").body(()).unwrap().into_parts();
        parts
            .extensions
            .insert(TenantContext::tenant("c1", Some("u1")));

        let ctx = TenantContext::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert_eq!(ctx, TenantContext::tenant("c1", Some("u1")));
    }

    #[tokio::test]
    async fn test_missing_tenant_is_unauthorized() {
        let state = mock_server_state(None, MockExecutor::new());
        let (mut parts, _) = Request::builder().uri("/").body(()).unwrap().into_parts();

        let err = TenantContext::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
