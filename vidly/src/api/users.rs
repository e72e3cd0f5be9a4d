//! User account endpoints.
//!
//! - GET /api/users/me - The caller's own account (requires auth)
//! - GET /api/users - List accounts (requires auth)
//! - POST /api/users - Create an account (requires admin)
//! - DELETE /api/users/:id - Delete an account (requires admin)
//!
//! Password hashes are never serialized.

use crate::auth::{self, AUTH_TOKEN_HEADER, CurrentUser, RequireAdmin};
use crate::server::state::AppState;
use axum::{
    Json,
    extract::State,
    http::{HeaderName, HeaderValue},
    response::{AppendHeaders, IntoResponse},
};
use serde::Deserialize;
use vidly_core::store::{Repository, UserDirectory};
use vidly_core::types::{User, UserId};
use vidly_core::validation;
use vidly_web::{AppError, JsonBody, PathId};

const NOT_FOUND: &str = "The user with the given ID was not found.";

/// Body of a create request.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    /// Display name
    pub name: String,
    /// Login email
    pub email: String,
    /// Plain password
    pub password: String,
    /// Administrator flag
    #[serde(default)]
    pub is_admin: bool,
}

/// The caller's own account.
///
/// # Errors
///
/// 404 when the account was deleted after the token was issued.
pub async fn me(
    CurrentUser(identity): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<User>, AppError> {
    Repository::<User>::find(&*state.store, identity.user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(NOT_FOUND))
}

/// List accounts by name.
///
/// # Errors
///
/// 500 when the store cannot be read.
pub async fn list_users(
    CurrentUser(_): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(Repository::<User>::list(&*state.store).await?))
}

/// Create an account and log it in.
///
/// The new account's token is returned in the `x-auth-token` header.
///
/// # Errors
///
/// 400 when a field is invalid or the email is already registered.
pub async fn create_user(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    validation::user_name(&request.name)?;
    validation::email(&request.email)?;
    validation::password(&request.password)?;

    if state
        .store
        .find_user_by_email(&request.email)
        .await?
        .is_some()
    {
        return Err(AppError::bad_request("User already registered."));
    }

    let user = register(&state, &request).await?;
    let token = state.tokens.issue(&user);
    let header = HeaderValue::from_str(&token).map_err(|err| AppError::from(anyhow::Error::from(err)))?;

    tracing::info!(user_id = %user.id, created_by = %admin.user_id, is_admin = user.is_admin, "User created");
    Ok((
        AppendHeaders([(HeaderName::from_static(AUTH_TOKEN_HEADER), header)]),
        Json(user),
    ))
}

/// Delete an account and revoke its tokens.
///
/// # Errors
///
/// 400 on a malformed id, 404 when missing.
pub async fn delete_user(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    PathId(id): PathId<UserId>,
) -> Result<Json<User>, AppError> {
    let user = Repository::<User>::delete(&*state.store, id)
        .await?
        .ok_or_else(|| AppError::not_found(NOT_FOUND))?;
    state.tokens.revoke_user(id);

    tracing::info!(user_id = %id, deleted_by = %admin.user_id, "User deleted");
    Ok(Json(user))
}

async fn register(state: &AppState, request: &CreateUserRequest) -> Result<User, AppError> {
    let password_hash = auth::hash_password(&request.password)?;
    let user = Repository::<User>::insert(
        &*state.store,
        User {
            id: UserId::new(),
            name: request.name.trim().to_string(),
            email: request.email.clone(),
            password_hash,
            is_admin: request.is_admin,
        },
    )
    .await?;
    Ok(user)
}
