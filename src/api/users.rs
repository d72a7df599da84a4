//! User account endpoints

use axum::{extract::State, http::StatusCode};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::user::{SigninRequest, SignupRequest, UpdateProfile, User},
    AppState,
};

use super::{AuthenticatedUser, Json};

/// Token issued on signup and signin
#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub message: String,
    /// Bearer token for subsequent requests
    pub token: String,
    pub user: User,
}

#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    pub message: String,
    pub user: User,
}

/// Create an account
#[utoipa::path(
    post,
    path = "/users/signup",
    tag = "users",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid signup data", body = crate::error::ErrorResponse),
        (status = 409, description = "Username or e-mail taken", body = crate::error::ErrorResponse)
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let (token, user) = state.services.users.signup(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "Signup successful".to_string(),
            token,
            user,
        }),
    ))
}

/// Sign in with username and password
#[utoipa::path(
    post,
    path = "/users/signin",
    tag = "users",
    request_body = SigninRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse)
    )
)]
pub async fn signin(
    State(state): State<AppState>,
    Json(request): Json<SigninRequest>,
) -> AppResult<Json<AuthResponse>> {
    let (token, user) = state.services.users.signin(request).await?;
    Ok(Json(AuthResponse {
        message: "Signin successful".to_string(),
        token,
        user,
    }))
}

/// Update own profile (e-mail and/or password)
#[utoipa::path(
    put,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = UpdateProfile,
    responses(
        (status = 200, description = "Profile updated", body = UserResponse),
        (status = 400, description = "Nothing to update", body = crate::error::ErrorResponse),
        (status = 401, description = "Not authenticated or wrong current password", body = crate::error::ErrorResponse),
        (status = 409, description = "E-mail taken", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(profile): Json<UpdateProfile>,
) -> AppResult<Json<UserResponse>> {
    let user = state.services.users.update_profile(claims.user_id, profile).await?;
    Ok(Json(UserResponse {
        message: "Profile updated successfully".to_string(),
        user,
    }))
}
