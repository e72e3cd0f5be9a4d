//! Vidly movie rental REST API.
//!
//! Customers borrow and return movies; staff manage the catalog, the
//! customer list and user accounts over HTTP.
//!
//! # Architecture
//!
//! - **`config`**: environment driven configuration
//! - **`auth`**: password hashing, session tokens and the auth extractors
//! - **`api`**: one module of handlers per resource
//! - **`server`**: application state, router and lifecycle
//!
//! Rental requests are delegated to [`vidly_runtime::RentalWorkflow`];
//! records live behind [`vidly_core::store::Database`], either in memory
//! or in `PostgreSQL`.
//!
//! # Quick Start
//!
//! ```bash
//! ADMIN_EMAIL=root@vidly.test ADMIN_PASSWORD='S3cret!pw' cargo run --bin vidly-server
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod auth;
pub mod config;
pub mod server;

pub use config::Config;
pub use server::{AppState, Application, ServerError, build_router};
