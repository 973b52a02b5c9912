use axum::{
    Extension, Json,
    extract::{Path, State, rejection::PathRejection},
};
use uuid::Uuid;

use pollchat_types::api::{Claims, UserSummary};
use pollchat_types::models::User;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Everyone but the caller, as chat contacts.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<UserSummary>>> {
    let me = claims.sub;
    let users = state.store.call(move |db| db.list_users_except(me)).await?;

    Ok(Json(
        users
            .into_iter()
            .map(|u| UserSummary {
                id: u.id,
                username: u.username,
            })
            .collect(),
    ))
}

/// Public profile lookup. The password hash never leaves the DB layer.
pub async fn single_user(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<User>> {
    let Path(id) = id?;
    state
        .store
        .call(move |db| db.get_user(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("User not found."))
}
