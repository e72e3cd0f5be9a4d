//! Application state for the Vidly HTTP server.
//!
//! Contains the shared resources handlers need:
//! - The record store (catalog, customers, users, rental ledger)
//! - The rental workflow
//! - The token registry (for authentication extractors)

use crate::auth::TokenRegistry;
use axum::extract::FromRef;
use std::sync::Arc;
use vidly_core::store::Database;
use vidly_runtime::RentalWorkflow;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; every field is reference counted.
#[derive(Clone)]
pub struct AppState {
    /// Record store
    pub store: Arc<dyn Database>,

    /// Borrow and return requests
    pub workflow: RentalWorkflow,

    /// Issued session tokens
    pub tokens: TokenRegistry,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<dyn Database>, workflow: RentalWorkflow, tokens: TokenRegistry) -> Self {
        Self {
            store,
            workflow,
            tokens,
        }
    }
}

// Lets the auth extractors pull the registry out of AppState
impl FromRef<AppState> for TokenRegistry {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.tokens.clone()
    }
}

// Used by the readiness check
impl FromRef<AppState> for Arc<dyn Database> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.store)
    }
}
