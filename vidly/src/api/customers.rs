//! Customer endpoints. Every route requires authentication; deletes
//! require an administrator.
//!
//! The rented count and pending transaction markers belong to the rental
//! workflow and cannot be written here.

use super::movies::DeletedCount;
use super::or_not_found;
use crate::auth::{CurrentUser, RequireAdmin};
use crate::server::state::AppState;
use axum::{Json, extract::State};
use serde::Deserialize;
use vidly_core::store::Repository;
use vidly_core::types::{Customer, CustomerId};
use vidly_core::validation;
use vidly_web::{AppError, JsonBody, PathId};

const NOT_FOUND: &str = "The customer with the given ID was not found.";

/// Body of create and update requests.
#[derive(Debug, Deserialize)]
pub struct CustomerRequest {
    /// Full name
    pub name: String,
    /// Ten digit phone number
    pub phone: String,
    /// Gold membership, off when absent
    #[serde(default)]
    pub is_gold: bool,
}

impl CustomerRequest {
    fn validate(&self) -> Result<(), AppError> {
        validation::customer_name(&self.name)?;
        validation::phone(&self.phone)?;
        Ok(())
    }
}

/// List customers by name.
///
/// # Errors
///
/// 500 when the store cannot be read.
pub async fn list_customers(
    CurrentUser(_): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Customer>>, AppError> {
    Ok(Json(Repository::<Customer>::list(&*state.store).await?))
}

/// Get one customer.
///
/// # Errors
///
/// 400 on a malformed id, 404 when missing.
pub async fn get_customer(
    CurrentUser(_): CurrentUser,
    State(state): State<AppState>,
    PathId(id): PathId<CustomerId>,
) -> Result<Json<Customer>, AppError> {
    Repository::<Customer>::find(&*state.store, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(NOT_FOUND))
}

/// Register a customer with nothing rented.
///
/// # Errors
///
/// 400 when the name or phone is invalid.
pub async fn create_customer(
    CurrentUser(_): CurrentUser,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CustomerRequest>,
) -> Result<Json<Customer>, AppError> {
    request.validate()?;

    let customer = Repository::<Customer>::insert(
        &*state.store,
        Customer {
            id: CustomerId::new(),
            name: request.name,
            phone: request.phone,
            is_gold: request.is_gold,
            number_of_movies_rented: 0,
            pending_transactions: Vec::new(),
        },
    )
    .await?;

    tracing::info!(customer_id = %customer.id, "Customer created");
    Ok(Json(customer))
}

/// Update contact details and membership.
///
/// The rented count and pending markers are kept as stored.
///
/// # Errors
///
/// 400 when a field is invalid, 404 when the customer is missing.
pub async fn update_customer(
    CurrentUser(_): CurrentUser,
    State(state): State<AppState>,
    PathId(id): PathId<CustomerId>,
    JsonBody(request): JsonBody<CustomerRequest>,
) -> Result<Json<Customer>, AppError> {
    request.validate()?;

    let customer = Repository::<Customer>::update(
        &*state.store,
        Customer {
            id,
            name: request.name,
            phone: request.phone,
            is_gold: request.is_gold,
            number_of_movies_rented: 0,
            pending_transactions: Vec::new(),
        },
    )
    .await
    .map_err(or_not_found(NOT_FOUND))?;

    Ok(Json(customer))
}

/// Delete a customer.
///
/// # Errors
///
/// 404 when missing, 409 while the customer has a movie out.
pub async fn delete_customer(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    PathId(id): PathId<CustomerId>,
) -> Result<Json<Customer>, AppError> {
    let customer = Repository::<Customer>::delete(&*state.store, id)
        .await?
        .ok_or_else(|| AppError::not_found(NOT_FOUND))?;

    tracing::info!(customer_id = %id, deleted_by = %admin.user_id, "Customer deleted");
    Ok(Json(customer))
}

/// Delete every customer without an active rental.
///
/// # Errors
///
/// 500 when the store fails.
pub async fn delete_all_customers(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<DeletedCount>, AppError> {
    let deleted = Repository::<Customer>::delete_all(&*state.store).await?;
    tracing::warn!(deleted, deleted_by = %admin.user_id, "Customers deleted in bulk");
    Ok(Json(DeletedCount { deleted }))
}
