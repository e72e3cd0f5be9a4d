//! Movie endpoints.
//!
//! - GET /api/movies - List movies by title
//! - GET /api/movies/:id - Get one movie
//! - POST /api/movies - Create a movie (requires auth)
//! - PUT /api/movies/:id - Update a movie (requires auth)
//! - DELETE /api/movies/:id - Delete a movie (requires admin)
//! - DELETE /api/movies - Delete every movie without an active rental (requires admin)

use super::or_not_found;
use crate::auth::{CurrentUser, RequireAdmin};
use crate::server::state::AppState;
use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use vidly_core::store::Repository;
use vidly_core::types::{Genre, GenreId, GenreSnapshot, Money, Movie, MovieId};
use vidly_core::validation;
use vidly_web::{AppError, JsonBody, PathId};

const NOT_FOUND: &str = "The movie with the given ID was not found.";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body of create and update requests.
#[derive(Debug, Deserialize)]
pub struct MovieRequest {
    /// Title
    pub title: String,
    /// Genre to file the movie under
    pub genre_id: GenreId,
    /// Copies on the shelf
    pub number_in_stock: u32,
    /// Price per day, in cents
    pub daily_rental_rate: Money,
}

impl MovieRequest {
    fn validate(&self) -> Result<(), AppError> {
        validation::movie_title(&self.title)?;
        validation::stock(self.number_in_stock)?;
        validation::daily_rate(self.daily_rental_rate)?;
        Ok(())
    }
}

/// Result of a bulk delete.
#[derive(Debug, Serialize)]
pub struct DeletedCount {
    /// Records removed
    pub deleted: u64,
}

// ============================================================================
// Handlers
// ============================================================================

/// List every movie, sorted by title.
///
/// # Errors
///
/// 500 when the store cannot be read.
pub async fn list_movies(State(state): State<AppState>) -> Result<Json<Vec<Movie>>, AppError> {
    Ok(Json(Repository::<Movie>::list(&*state.store).await?))
}

/// Get one movie.
///
/// # Errors
///
/// 400 on a malformed id, 404 when missing.
pub async fn get_movie(
    State(state): State<AppState>,
    PathId(id): PathId<MovieId>,
) -> Result<Json<Movie>, AppError> {
    Repository::<Movie>::find(&*state.store, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(NOT_FOUND))
}

/// Create a movie.
///
/// # Errors
///
/// 400 when a field is invalid or the genre does not exist.
pub async fn create_movie(
    CurrentUser(_): CurrentUser,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<MovieRequest>,
) -> Result<Json<Movie>, AppError> {
    request.validate()?;
    let genre = resolve_genre(&state, request.genre_id).await?;

    let movie = Repository::<Movie>::insert(
        &*state.store,
        Movie {
            id: MovieId::new(),
            title: request.title,
            genre,
            number_in_stock: request.number_in_stock,
            daily_rental_rate: request.daily_rental_rate,
            pending_transactions: Vec::new(),
        },
    )
    .await?;

    tracing::info!(movie_id = %movie.id, title = %movie.title, "Movie created");
    Ok(Json(movie))
}

/// Update a movie.
///
/// Pending transaction markers are kept as stored.
///
/// # Errors
///
/// 400 when a field is invalid or the genre does not exist, 404 when the
/// movie is missing.
pub async fn update_movie(
    CurrentUser(_): CurrentUser,
    State(state): State<AppState>,
    PathId(id): PathId<MovieId>,
    JsonBody(request): JsonBody<MovieRequest>,
) -> Result<Json<Movie>, AppError> {
    request.validate()?;

    if Repository::<Movie>::find(&*state.store, id).await?.is_none() {
        return Err(AppError::not_found(NOT_FOUND));
    }
    let genre = resolve_genre(&state, request.genre_id).await?;

    let movie = Repository::<Movie>::update(
        &*state.store,
        Movie {
            id,
            title: request.title,
            genre,
            number_in_stock: request.number_in_stock,
            daily_rental_rate: request.daily_rental_rate,
            pending_transactions: Vec::new(),
        },
    )
    .await
    .map_err(or_not_found(NOT_FOUND))?;

    Ok(Json(movie))
}

/// Delete a movie.
///
/// # Errors
///
/// 404 when missing, 409 while a copy is out.
pub async fn delete_movie(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    PathId(id): PathId<MovieId>,
) -> Result<Json<Movie>, AppError> {
    let movie = Repository::<Movie>::delete(&*state.store, id)
        .await?
        .ok_or_else(|| AppError::not_found(NOT_FOUND))?;

    tracing::info!(movie_id = %id, deleted_by = %admin.user_id, "Movie deleted");
    Ok(Json(movie))
}

/// Delete every movie that has no copy out.
///
/// # Errors
///
/// 500 when the store fails.
pub async fn delete_all_movies(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<DeletedCount>, AppError> {
    let deleted = Repository::<Movie>::delete_all(&*state.store).await?;
    tracing::warn!(deleted, deleted_by = %admin.user_id, "Movies deleted in bulk");
    Ok(Json(DeletedCount { deleted }))
}

async fn resolve_genre(state: &AppState, id: GenreId) -> Result<GenreSnapshot, AppError> {
    Repository::<Genre>::find(&*state.store, id)
        .await?
        .map(|genre| GenreSnapshot::from(&genre))
        .ok_or_else(|| AppError::bad_request("Invalid genre."))
}
