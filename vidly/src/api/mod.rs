//! HTTP API endpoints.
//!
//! Organized by resource:
//! - `auth`: Login
//! - `users`: Accounts and the current user
//! - `genres`, `movies`: Catalog
//! - `customers`: Store customers
//! - `rentals`: Borrowing, returning and the rental ledger

pub mod auth;
pub mod customers;
pub mod genres;
pub mod movies;
pub mod rentals;
pub mod users;

use vidly_core::error::StoreError;
use vidly_web::AppError;

/// Map a store error, replacing "not found" with a resource specific message.
fn or_not_found(message: &'static str) -> impl FnOnce(StoreError) -> AppError {
    move |err| match err {
        StoreError::NotFound { .. } => AppError::not_found(message),
        other => other.into(),
    }
}
