/// Authentication endpoints
///
/// - `POST /v1/auth/signup` - Create an account and open a session
/// - `POST /v1/auth/login` - Open a session
/// - `POST /v1/auth/logout` - Revoke the presented session
/// - `GET  /v1/auth/me` - Profile of the caller
///
/// Sessions are opaque bearer tokens. Send them as
/// `Authorization: Bearer <token>`.
use crate::{
    app::AppState,
    error::{ApiError, ApiResult, ValidationErrorDetail},
    middleware::auth::AuthContext,
    routes::SuccessResponse,
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::{Deserialize, Serialize};
use taskshare_shared::{
    auth::password,
    models::UserProfile,
    services::{LoginOutcome, NewAccount},
};
use validator::Validate;

/// Signup request
#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, max = 50, message = "Username must be 1-50 characters"))]
    pub username: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub password: String,
}

/// Session token plus the caller's profile
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

impl From<LoginOutcome> for AuthResponse {
    fn from(outcome: LoginOutcome) -> Self {
        Self {
            token: outcome.token,
            user: outcome.user,
        }
    }
}

/// Register a new user
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/signup
/// Content-Type: application/json
///
/// {
///   "email": "user@example.com",
///   "username": "alice",
///   "password": "correct horse"
/// }
/// ```
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Validation failed
/// - `409 Conflict`: Email already registered
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    req.validate()?;

    password::validate_password_strength(&req.password)
        .map_err(|e| ApiError::ValidationError(vec![ValidationErrorDetail::new("password", e)]))?;

    let outcome = state
        .accounts
        .signup(NewAccount {
            email: req.email,
            username: req.username,
            password: req.password,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(outcome.into())))
}

/// Login with email and password
///
/// # Errors
///
/// - `401 Unauthorized`: Unknown email or wrong password
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    req.validate()?;

    let outcome = state.accounts.login(&req.email, &req.password).await?;
    Ok(Json(outcome.into()))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<SuccessResponse>> {
    state.accounts.logout(&auth.token).await?;
    Ok(Json(SuccessResponse::ok()))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<UserProfile>> {
    Ok(Json(state.accounts.me(&auth.user_id).await?))
}
