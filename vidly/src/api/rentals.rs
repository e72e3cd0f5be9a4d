//! Rental endpoints.
//!
//! - GET /api/rentals?rental_type=borrow|return - Rentals with that marker, newest first
//! - GET /api/rentals/:id - One rental
//! - POST /api/rentals - Borrow (or return, with `rental_type`) a movie (requires auth)
//! - POST /api/returns - Return a movie (requires auth)
//!
//! Writes go through the rental workflow, which runs the precondition
//! checks and makes the movie, customer, rental and transaction writes
//! atomic.

use crate::auth::CurrentUser;
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use vidly_core::types::{CustomerId, MovieId, Rental, RentalId, RentalKind};
use vidly_core::validation::ValidationError;
use vidly_runtime::RentalReceipt;
use vidly_web::{AppError, CorrelationId, JsonBody, PathId};

// ============================================================================
// Request Types
// ============================================================================

/// Query parameters for listing rentals.
#[derive(Debug, Default, Deserialize)]
pub struct ListRentalsQuery {
    /// `borrow` (default) or `return`
    pub rental_type: Option<String>,
}

/// Body of POST /api/rentals.
#[derive(Debug, Deserialize)]
pub struct RentalRequest {
    /// Customer borrowing or returning
    pub customer_id: CustomerId,
    /// Movie borrowed or returned
    pub movie_id: MovieId,
    /// Defaults to `borrow`
    #[serde(default)]
    pub rental_type: Option<RentalKind>,
}

/// Body of POST /api/returns.
#[derive(Debug, Deserialize)]
pub struct ReturnRequest {
    /// Customer returning the movie
    pub customer_id: CustomerId,
    /// Movie being returned
    pub movie_id: MovieId,
}

// ============================================================================
// Handlers
// ============================================================================

/// List rentals carrying the requested marker.
///
/// # Errors
///
/// 400 for an unknown `rental_type`, 404 when nothing matches.
pub async fn list_rentals(
    State(state): State<AppState>,
    Query(query): Query<ListRentalsQuery>,
) -> Result<Json<Vec<Rental>>, AppError> {
    let kind = match query.rental_type.as_deref() {
        None | Some("") => RentalKind::Borrow,
        Some(raw) => raw.parse::<RentalKind>().map_err(|_| {
            ValidationError::new("rental_type", "must be one of [borrow, return]")
        })?,
    };

    let rentals = state.workflow.list_active_rentals(kind).await?;
    if rentals.is_empty() {
        return Err(AppError::not_found("No rentals found"));
    }
    Ok(Json(rentals))
}

/// Get one rental.
///
/// # Errors
///
/// 400 on a malformed id, 404 when missing.
pub async fn get_rental(
    State(state): State<AppState>,
    PathId(id): PathId<RentalId>,
) -> Result<Json<Rental>, AppError> {
    Ok(Json(state.workflow.get_rental(id).await?))
}

/// Borrow a movie, or return it when `rental_type` is `return`.
///
/// # Errors
///
/// - 404 when the customer or movie does not exist
/// - 400 when a rental rule rejects the request
/// - 500 when the writes could not be completed
pub async fn create_rental(
    CurrentUser(identity): CurrentUser,
    CorrelationId(correlation_id): CorrelationId,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RentalRequest>,
) -> Result<Json<RentalReceipt>, AppError> {
    let intent = request.rental_type.unwrap_or(RentalKind::Borrow);
    tracing::debug!(
        %correlation_id,
        user_id = %identity.user_id,
        customer_id = %request.customer_id,
        movie_id = %request.movie_id,
        %intent,
        "Rental request received"
    );

    let receipt = state
        .workflow
        .submit_rental_request(request.customer_id, request.movie_id, intent)
        .await?;
    Ok(Json(receipt))
}

/// Return a borrowed movie and charge the rental fee.
///
/// # Errors
///
/// Same as [`create_rental`].
pub async fn create_return(
    CurrentUser(identity): CurrentUser,
    CorrelationId(correlation_id): CorrelationId,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<ReturnRequest>,
) -> Result<Json<RentalReceipt>, AppError> {
    tracing::debug!(
        %correlation_id,
        user_id = %identity.user_id,
        customer_id = %request.customer_id,
        movie_id = %request.movie_id,
        "Return request received"
    );

    let receipt = state
        .workflow
        .submit_rental_request(request.customer_id, request.movie_id, RentalKind::Return)
        .await?;
    Ok(Json(receipt))
}
