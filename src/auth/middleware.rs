//! Auth middleware for Axum routes.
//!
//! Validates JWT Bearer tokens and injects the caller's [`TenantContext`]
//! into request extensions. Deny-by-default: if `auth_config` is None, all
//! requests are rejected.

use crate::api::handlers::{ApiState, AppError};
use crate::auth::jwt::{decode_jwt, Claims};
use crate::auth::TenantContext;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// Middleware that requires a valid JWT Bearer token.
///
/// # Behavior
/// 1. If `auth_config` is `None` → 403 Forbidden (deny-by-default)
/// 2. Extract `Authorization: Bearer <token>` header → 401 if missing
/// 3. Validate JWT with the configured secret → 401 if invalid/expired
/// 4. Resolve the tenant: a company claim scopes every query to it; admins
///    without a company run globally; anyone else → 403
/// 5. Inject `TenantContext` and `Claims` into request extensions
pub async fn require_auth(
    State(state): State<ApiState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_config = state.auth_config.as_ref().ok_or_else(|| {
        AppError::Forbidden("Authentication not configured, access denied".to_string())
    })?;

    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization header format".to_string()))?;

    let claims = decode_jwt(token, &auth_config.jwt_secret)
        .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))?;

    let tenant = tenant_for(&claims)?;
    tracing::debug!(
        user = %claims.sub,
        company = tenant.company_id.as_deref().unwrap_or("*"),
        "Authenticated request"
    );

    req.extensions_mut().insert(tenant);
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

fn tenant_for(claims: &Claims) -> Result<TenantContext, AppError> {
    match (&claims.company_id, claims.admin) {
        (Some(company_id), _) => Ok(TenantContext::tenant(
            company_id,
            Some(claims.sub.as_str()),
        )),
        (None, true) => Ok(TenantContext {
            company_id: None,
            user_id: Some(claims.sub.clone()),
        }),
        (None, false) => Err(AppError::Forbidden("Token carries no company".to_string())),
    }
}

// ============================================================================
// Tests
// ============================================================================
