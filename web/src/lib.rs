//! Axum integration for Vidly.
//!
//! This crate holds the HTTP plumbing that does not depend on any particular
//! route table:
//!
//! - [`AppError`]: maps [`RentalError`](vidly_core::error::RentalError),
//!   [`StoreError`](vidly_core::error::StoreError) and validation failures to
//!   status codes and a `{"code", "message"}` JSON body
//! - extractors for correlation ids, client IPs, typed path ids and JSON bodies
//! - the correlation id middleware
//! - liveness and readiness handlers
//!
//! # Request Flow
//!
//! 1. The correlation id layer opens an `http_request` span
//! 2. Extractors parse ids and bodies, rejecting malformed input with 400
//! 3. The handler calls the store or the rental workflow
//! 4. Errors convert into [`AppError`] with `?`

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

pub use error::AppError;
pub use extractors::{ClientIp, CorrelationId, JsonBody, PathId};
pub use middleware::{CORRELATION_ID_HEADER, CorrelationIdExt, correlation_id_layer};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
