//! Login endpoint.
//!
//! POST /api/auth exchanges an email and password for a session token.

use crate::auth::{AuthError, verify_password};
use crate::server::state::AppState;
use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use vidly_core::store::UserDirectory;
use vidly_core::validation;
use vidly_web::{AppError, ClientIp, JsonBody};

/// Login credentials.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Login email
    pub email: String,
    /// Plain password
    pub password: String,
}

/// Issued session token.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Send back in the `x-auth-token` header
    pub token: String,
}

/// Log in.
///
/// Unknown emails and wrong passwords fail the same way.
///
/// # Errors
///
/// 400 when the body is malformed or the credentials do not match.
pub async fn login(
    ClientIp(ip): ClientIp,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    validation::email(&request.email)?;
    if request.password.is_empty() {
        return Err(validation::ValidationError::new("password", "is required").into());
    }

    let Some(user) = state.store.find_user_by_email(&request.email).await? else {
        tracing::warn!(%ip, email = %request.email, "Login with unknown email");
        return Err(AuthError::InvalidCredentials.into());
    };

    if !verify_password(&request.password, &user.password_hash) {
        tracing::warn!(%ip, user_id = %user.id, "Login with wrong password");
        return Err(AuthError::InvalidCredentials.into());
    }

    let token = state.tokens.issue(&user);
    tracing::info!(%ip, user_id = %user.id, "User logged in");
    Ok(Json(LoginResponse { token }))
}
