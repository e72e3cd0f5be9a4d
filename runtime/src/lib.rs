//! # Vidly Runtime
//!
//! Executes rental requests against a [`Database`](vidly_core::store::Database).
//!
//! ## Core Components
//!
//! - **[`RentalWorkflow`]**: checks preconditions, drives the transaction
//!   reducer and applies the writes, either inside a native transaction or
//!   with compensating rollback
//! - **[`rollback`]**: executes reducer effects, retrying compensations
//! - **[`retry`]**: exponential backoff
//! - **[`metrics`]**: Prometheus counters and histograms
//! - **[`health`]**: readiness reporting
//!
//! ## Example
//!
//! ```ignore
//! use vidly_runtime::RentalWorkflow;
//! use vidly_core::types::RentalKind;
//!
//! let workflow = RentalWorkflow::new(store, clock);
//! let receipt = workflow
//!     .submit_rental_request(customer_id, movie_id, RentalKind::Borrow)
//!     .await?;
//! println!("rental {} opened", receipt.rental.id);
//! ```

/// Readiness reporting
pub mod health;

/// Prometheus metrics for observability
pub mod metrics;

/// Retry logic with exponential backoff
pub mod retry;

/// Effect execution and compensating rollback
pub mod rollback;

/// The rental workflow engine
pub mod workflow;

pub use health::{HealthCheck, HealthReport, HealthStatus};
pub use retry::RetryPolicy;
pub use workflow::{ConsistencyStrategy, RentalReceipt, RentalWorkflow};
