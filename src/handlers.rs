//! Route handlers for authentication and the protected profile.
use log::{info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::api::{self, ApiError};
use crate::auth;
use crate::models::User;
use crate::requests::{LoginRequest, RegisterRequest};
use crate::router::{AppState, RequestContext, Response};

#[derive(Debug, Serialize)]
pub struct LoginPayload {
    pub token: String,
    pub user: User,
}

/// `POST /api/auth/register`
pub async fn register(ctx: RequestContext, state: AppState) -> Response {
    match register_user(&ctx, &state).await {
        Ok(user) => api::success(201, "User registered successfully", user),
        Err(e) => e.into_response(),
    }
}

/// `POST /api/auth/login`
pub async fn login(ctx: RequestContext, state: AppState) -> Response {
    match authenticate(&ctx, &state).await {
        Ok(payload) => api::success(200, "Login successful", payload),
        Err(e) => e.into_response(),
    }
}

/// `GET /api/profile`, behind [`auth::protected`].
pub async fn profile(ctx: RequestContext, _state: AppState) -> Response {
    match ctx.claims {
        Some(claims) => Response::json(
            json!({ "message": "Protected route", "user": claims }),
            200,
            Default::default(),
        ),
        None => ApiError::unauthorized("Missing or malformed token").into_response(),
    }
}

fn parse_body<T: DeserializeOwned>(ctx: &RequestContext) -> Result<T, ApiError> {
    serde_json::from_str(&ctx.body).map_err(|e| ApiError::InvalidInput(e.to_string()))
}

async fn register_user(ctx: &RequestContext, state: &AppState) -> Result<User, ApiError> {
    let input: RegisterRequest = parse_body(ctx)?;
    let errors = input.validate();
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let password = input.password.clone();
    let cost = state.settings.bcrypt_cost;
    let hash = tokio::task::spawn_blocking(move || auth::hash_password(&password, cost))
        .await
        .map_err(|e| ApiError::internal("Could not hash password", e))?
        .map_err(|e| ApiError::internal("Could not hash password", e))?;

    let user = User::insert(
        &state.db,
        input.name.trim(),
        &input.email,
        &hash,
        input.user_type(),
    )
    .await
    .map_err(|e| ApiError::internal("Could not create user", e))?;

    info!("Registered user #{} ({})", user.id, user.user_type);
    Ok(user)
}

async fn authenticate(ctx: &RequestContext, state: &AppState) -> Result<LoginPayload, ApiError> {
    let input: LoginRequest = parse_body(ctx)?;
    let errors = input.validate();
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let user = match User::find_by_email(&state.db, &input.email).await {
        Ok(Some(user)) if user.is_active => user,
        Ok(_) => return Err(ApiError::invalid_credentials()),
        Err(e) => return Err(ApiError::internal("Could not look up user", e)),
    };

    let password = input.password.clone();
    let hash = user.password.clone();
    let matches = tokio::task::spawn_blocking(move || auth::verify_password(&password, &hash))
        .await
        .map_err(|e| ApiError::internal("Could not verify password", e))?;
    match matches {
        Ok(true) => {}
        Ok(false) => return Err(ApiError::invalid_credentials()),
        Err(e) => {
            warn!("Stored hash for user #{} is unreadable: {}", user.id, e);
            return Err(ApiError::invalid_credentials());
        }
    }

    let token = state
        .jwt
        .issue(user.id, &user.email)
        .map_err(|e| ApiError::internal("Could not generate token", e))?;
    Ok(LoginPayload { token, user })
}

