use axum::{
    Extension, Json,
    extract::{Path, State, rejection::{JsonRejection, PathRejection}},
    http::StatusCode,
};
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use pollchat_db::models::VoteOutcome;
use pollchat_types::api::{
    Claims, CreatePollRequest, CreatePollResponse, VoteRequest, VoteResponse,
};
use pollchat_types::models::Poll;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn create_poll(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    req: Result<Json<CreatePollRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreatePollResponse>)> {
    let Json(req) = req?;

    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::validation("Poll title is required."));
    }
    let options: Vec<String> = req.options.iter().map(|o| o.trim().to_string()).collect();
    if options.len() < 2 {
        return Err(ApiError::validation("A poll needs at least two options."));
    }
    if options.iter().any(String::is_empty) {
        return Err(ApiError::validation("Poll options must not be blank."));
    }
    if req.expiry_date.is_some_and(|expiry| expiry <= Utc::now()) {
        return Err(ApiError::validation("Expiry date must be in the future."));
    }

    let creator = claims.sub;
    let expiry = req.expiry_date;
    let poll = state
        .store
        .call(move |db| db.create_poll(creator, &title, &options, expiry))
        .await?;

    info!("{} created poll {}", claims.username, poll.id);
    Ok((
        StatusCode::CREATED,
        Json(CreatePollResponse {
            message: "Poll created successfully.".into(),
            poll_id: poll.id,
        }),
    ))
}

/// Polls that have not expired, newest first.
pub async fn list_polls(State(state): State<AppState>) -> ApiResult<Json<Vec<Poll>>> {
    let now = Utc::now();
    let polls = state.store.call(move |db| db.list_open_polls(now)).await?;
    Ok(Json(polls))
}

pub async fn get_poll(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Poll>> {
    let Path(id) = id?;
    state
        .store
        .call(move |db| db.get_poll(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Poll not found."))
}

pub async fn vote(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    id: Result<Path<Uuid>, PathRejection>,
    req: Result<Json<VoteRequest>, JsonRejection>,
) -> ApiResult<Json<VoteResponse>> {
    let Path(poll_id) = id?;
    let Json(req) = req?;

    let voter = claims.sub;
    let now = Utc::now();
    let outcome = state
        .store
        .call(move |db| db.vote(poll_id, voter, req.option_index, now))
        .await?;

    match outcome {
        VoteOutcome::Recorded(poll) => {
            debug!("{} voted on poll {}", claims.username, poll_id);
            Ok(Json(VoteResponse {
                message: "Vote recorded successfully.".into(),
                poll,
            }))
        }
        VoteOutcome::NotFound => Err(ApiError::not_found("Poll not found.")),
        VoteOutcome::Expired => Err(ApiError::validation("This poll has expired.")),
        VoteOutcome::AlreadyVoted => {
            Err(ApiError::validation("You have already voted on this poll."))
        }
        VoteOutcome::InvalidOption => Err(ApiError::validation("Invalid option index.")),
    }
}
