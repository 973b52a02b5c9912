use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use pollchat_types::api::Claims;
use pollchat_types::models::Role;

use crate::error::ApiError;
use crate::state::AppState;

/// Validate the bearer token and attach its claims to the request.
///
/// No token at all is 401; a token that fails verification is 403.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("No token provided.".into()))?;

    let claims = state.tokens.verify(token).map_err(|e| {
        debug!("rejected bearer token: {}", e);
        ApiError::Forbidden("Invalid token.".into())
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Must run inside `require_auth`.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, ApiError> {
    let is_admin = req
        .extensions()
        .get::<Claims>()
        .is_some_and(|claims| claims.role == Role::Admin);
    if !is_admin {
        return Err(ApiError::Forbidden("Admin access required.".into()));
    }
    Ok(next.run(req).await)
}
