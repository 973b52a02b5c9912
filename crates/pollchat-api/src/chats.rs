use axum::{
    Extension, Json,
    extract::{Path, State, rejection::PathRejection},
};
use uuid::Uuid;

use pollchat_types::api::Claims;
use pollchat_types::models::{ChatMessage, Participants};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// History for one conversation, in send order. REST fallback for the
/// WebSocket `fetch-messages` event.
pub async fn get_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ids: Result<Path<(Uuid, Uuid)>, PathRejection>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    let Path((a, b)) = ids?;
    let pair = Participants::new(a, b)
        .ok_or_else(|| ApiError::validation("A chat needs two distinct participants."))?;
    if !pair.contains(claims.sub) {
        return Err(ApiError::Forbidden(
            "Not a participant of this conversation.".into(),
        ));
    }

    state
        .store
        .call(move |db| db.get_chat_messages(&pair))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Chat not found."))
}
