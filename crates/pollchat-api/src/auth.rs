use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;

use pollchat_auth::{hash_password, verify_password};
use pollchat_db::models::CreateUser;
use pollchat_types::api::{
    Claims, LoginRequest, LoginResponse, MessageResponse, RegisterRequest, RegisterResponse,
    UserSummary,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn register(
    State(state): State<AppState>,
    req: Result<Json<RegisterRequest>, axum::extract::rejection::JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = req?;
    validate_registration(&req)?;

    // Hashing is CPU-bound
    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;

    let username = req.username.clone();
    let email = req.email.trim().to_string();
    let created = state
        .store
        .call(move |db| db.create_user(&username, &email, &password_hash))
        .await?;

    match created {
        CreateUser::Created(user) => {
            info!("registered {} ({}) as {}", user.username, user.id, user.role);
            Ok((
                StatusCode::CREATED,
                Json(RegisterResponse {
                    message: "User registered successfully.".into(),
                    user_id: user.id,
                }),
            ))
        }
        CreateUser::UsernameTaken => Err(ApiError::validation("Username already exists.")),
        CreateUser::EmailTaken => Err(ApiError::validation("Email already exists.")),
    }
}

fn validate_registration(req: &RegisterRequest) -> ApiResult<()> {
    if req.username.trim().is_empty() || req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("Username, email and password are required."));
    }
    let len = req.username.chars().count();
    if !(3..=32).contains(&len) || req.username.trim() != req.username {
        return Err(ApiError::validation(
            "Username must be 3 to 32 characters without surrounding spaces.",
        ));
    }
    if !req.email.contains('@') {
        return Err(ApiError::validation("Email address is not valid."));
    }
    if req.password.chars().count() < 8 {
        return Err(ApiError::validation("Password must be at least 8 characters."));
    }
    Ok(())
}

pub async fn login(
    State(state): State<AppState>,
    req: Result<Json<LoginRequest>, axum::extract::rejection::JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let Json(req) = req?;
    if req.username.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("Username and password are required."));
    }

    let username = req.username.clone();
    let row = state
        .store
        .call(move |db| db.get_user_by_username(&username))
        .await?
        .ok_or_else(invalid_credentials)?;

    let stored_hash = row.password.clone();
    let password = req.password;
    let matches =
        tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash)).await??;
    if !matches {
        return Err(invalid_credentials());
    }

    let user = row.to_user()?;
    let token = state
        .tokens
        .issue(user.id, &user.username, user.role)
        .map_err(|e| ApiError::Internal(e.into()))?;

    info!("{} logged in", user.username);
    Ok(Json(LoginResponse {
        message: "Login successful.".into(),
        token,
        user: UserSummary {
            id: user.id,
            username: user.username,
        },
    }))
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid username or password.".into())
}

pub async fn admin(Extension(claims): Extension<Claims>) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: format!("Permission granted. Welcome, {}.", claims.username),
    })
}
