//! Genre endpoints.
//!
//! - GET /api/genres - List genres by name
//! - GET /api/genres/:id - Get one genre
//! - POST /api/genres - Create a genre (requires auth)
//! - PUT /api/genres/:id - Rename a genre (requires auth)
//! - DELETE /api/genres/:id - Delete a genre (requires admin)

use super::or_not_found;
use crate::auth::{CurrentUser, RequireAdmin};
use crate::server::state::AppState;
use axum::{Json, extract::State};
use serde::Deserialize;
use vidly_core::store::Repository;
use vidly_core::types::{Genre, GenreId};
use vidly_core::validation;
use vidly_web::{AppError, JsonBody, PathId};

const NOT_FOUND: &str = "The genre with the given ID was not found.";

// ============================================================================
// Request Types
// ============================================================================

/// Body of create and update requests.
#[derive(Debug, Deserialize)]
pub struct GenreRequest {
    /// Genre name
    pub name: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// List every genre, sorted by name.
///
/// # Errors
///
/// 500 when the store cannot be read.
pub async fn list_genres(State(state): State<AppState>) -> Result<Json<Vec<Genre>>, AppError> {
    let genres = Repository::<Genre>::list(&*state.store).await?;
    Ok(Json(genres))
}

/// Get one genre.
///
/// # Errors
///
/// 400 on a malformed id, 404 when missing.
pub async fn get_genre(
    State(state): State<AppState>,
    PathId(id): PathId<GenreId>,
) -> Result<Json<Genre>, AppError> {
    Repository::<Genre>::find(&*state.store, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(NOT_FOUND))
}

/// Create a genre.
///
/// # Errors
///
/// 400 when the name is invalid.
pub async fn create_genre(
    CurrentUser(_): CurrentUser,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<GenreRequest>,
) -> Result<Json<Genre>, AppError> {
    validation::genre_name(&request.name)?;

    let genre = Repository::<Genre>::insert(
        &*state.store,
        Genre {
            id: GenreId::new(),
            name: request.name,
        },
    )
    .await?;

    tracing::info!(genre_id = %genre.id, name = %genre.name, "Genre created");
    Ok(Json(genre))
}

/// Rename a genre.
///
/// Movies keep the genre name they were saved with.
///
/// # Errors
///
/// 400 when the name is invalid, 404 when the genre is missing.
pub async fn update_genre(
    CurrentUser(_): CurrentUser,
    State(state): State<AppState>,
    PathId(id): PathId<GenreId>,
    JsonBody(request): JsonBody<GenreRequest>,
) -> Result<Json<Genre>, AppError> {
    validation::genre_name(&request.name)?;

    let genre = Repository::<Genre>::update(
        &*state.store,
        Genre {
            id,
            name: request.name,
        },
    )
    .await
    .map_err(or_not_found(NOT_FOUND))?;

    Ok(Json(genre))
}

/// Delete a genre.
///
/// # Errors
///
/// 404 when the genre is missing.
pub async fn delete_genre(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    PathId(id): PathId<GenreId>,
) -> Result<Json<Genre>, AppError> {
    let genre = Repository::<Genre>::delete(&*state.store, id)
        .await?
        .ok_or_else(|| AppError::not_found(NOT_FOUND))?;

    tracing::info!(genre_id = %id, deleted_by = %admin.user_id, "Genre deleted");
    Ok(Json(genre))
}
