//! Error types for persistence and the rental workflow.

use crate::types::{CustomerId, MovieId, RentalId, RentalKind, TransactionId};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by a persistence backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Record does not exist.
    #[error("{entity} with id {id} not found")]
    NotFound {
        /// Kind of record
        entity: &'static str,
        /// Requested ID
        id: String,
    },

    /// A conditional write found the record in a state that forbids it
    /// (stock would go negative, rental cap exceeded, record still referenced).
    #[error("Conflict on {entity} {id}: {reason}")]
    Conflict {
        /// Kind of record
        entity: &'static str,
        /// Record ID
        id: String,
        /// What the condition rejected
        reason: String,
    },

    /// A uniqueness constraint rejected the write.
    #[error("Duplicate {entity}: {reason}")]
    Duplicate {
        /// Kind of record
        entity: &'static str,
        /// Which constraint
        reason: String,
    },

    /// The backend cannot open a multi-record transaction.
    #[error("Transactions are not supported: {0}")]
    TransactionsUnsupported(String),

    /// Backend failure (connection lost, driver error, lock poisoned).
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Shorthand for [`StoreError::NotFound`].
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`StoreError::Conflict`].
    #[must_use]
    pub fn conflict(entity: &'static str, id: impl ToString, reason: impl Into<String>) -> Self {
        Self::Conflict {
            entity,
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Why a rental request was rejected or failed.
///
/// Precondition variants name the customer and movie involved so callers can
/// show the reason as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RentalError {
    /// No customer with the requested id.
    #[error("Customer with id {customer_id} does not exist")]
    CustomerNotFound {
        /// Requested customer
        customer_id: CustomerId,
    },

    /// Return requested by a customer with nothing rented.
    #[error("{customer} has no rented movies to return")]
    NothingToReturn {
        /// Customer name
        customer: String,
    },

    /// Borrow requested by a customer at the cap.
    #[error("Sorry {customer}, you can not rent more than {limit} movies")]
    RentalLimitExceeded {
        /// Customer name
        customer: String,
        /// The cap
        limit: u32,
    },

    /// No movie with the requested id.
    #[error("Movie with id {movie_id} was not found")]
    MovieNotFound {
        /// Requested movie
        movie_id: MovieId,
    },

    /// The customer already has an active rental of this movie.
    #[error("{customer}, you have already borrowed one copy of {title} on {date_out}")]
    AlreadyBorrowed {
        /// Customer name
        customer: String,
        /// Movie title
        title: String,
        /// Checkout time of the existing rental
        date_out: DateTime<Utc>,
    },

    /// Return requested for a movie the customer does not have.
    #[error("{customer} has not borrowed {title}, so it can not be returned")]
    NotBorrowed {
        /// Customer name
        customer: String,
        /// Movie title
        title: String,
    },

    /// No copies left on the shelf.
    #[error("Sorry, {title} is out of stock! Please check later")]
    OutOfStock {
        /// Movie title
        title: String,
    },

    /// No rental with the requested id.
    #[error("Rental with id {rental_id} was not found")]
    RentalNotFound {
        /// Requested rental
        rental_id: RentalId,
    },

    /// A native transaction was required and could not be opened.
    #[error("Transaction could not be started: {reason}")]
    TransactionUnavailable {
        /// Backend detail
        reason: String,
    },

    /// Unexpected persistence failure. Any writes already applied were undone.
    #[error("Could not {operation}: {source}")]
    Store {
        /// What was being attempted, e.g. "borrow movie"
        operation: &'static str,
        /// Underlying failure
        #[source]
        source: StoreError,
    },

    /// Undoing a partial write failed; the listed records need manual reconciliation.
    #[error("Rollback of transaction {transaction_id} failed after '{cause}': {}", .failures.join("; "))]
    RollbackFailed {
        /// Transaction being rolled back
        transaction_id: TransactionId,
        /// The failure that triggered the rollback
        cause: String,
        /// One entry per failed compensation step
        failures: Vec<String>,
    },
}

impl RentalError {
    /// Wrap a persistence failure hit while handling a `intent` request.
    #[must_use]
    pub const fn store(intent: RentalKind, source: StoreError) -> Self {
        let operation = match intent {
            RentalKind::Borrow => "borrow movie",
            RentalKind::Return => "return movie",
        };
        Self::Store { operation, source }
    }

    /// Whether this is a business-rule rejection rather than a fault.
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::CustomerNotFound { .. }
                | Self::NothingToReturn { .. }
                | Self::RentalLimitExceeded { .. }
                | Self::MovieNotFound { .. }
                | Self::AlreadyBorrowed { .. }
                | Self::NotBorrowed { .. }
                | Self::OutOfStock { .. }
        )
    }

    /// Short machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::CustomerNotFound { .. } => "CUSTOMER_NOT_FOUND",
            Self::NothingToReturn { .. } => "NOTHING_TO_RETURN",
            Self::RentalLimitExceeded { .. } => "RENTAL_LIMIT_EXCEEDED",
            Self::MovieNotFound { .. } => "MOVIE_NOT_FOUND",
            Self::AlreadyBorrowed { .. } => "ALREADY_BORROWED",
            Self::NotBorrowed { .. } => "NOT_BORROWED",
            Self::OutOfStock { .. } => "OUT_OF_STOCK",
            Self::RentalNotFound { .. } => "RENTAL_NOT_FOUND",
            Self::TransactionUnavailable { .. } => "TRANSACTION_UNAVAILABLE",
            Self::Store { .. } => "STORE_ERROR",
            Self::RollbackFailed { .. } => "ROLLBACK_FAILED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn already_borrowed_names_customer_movie_and_date() {
        let date_out = Utc
            .with_ymd_and_hms(2025, 3, 14, 12, 0, 0)
            .single()
            .unwrap_or_default();
        let err = RentalError::AlreadyBorrowed {
            customer: "Ada Lovelace".to_string(),
            title: "Metropolis".to_string(),
            date_out,
        };
        let message = err.to_string();
        assert!(message.starts_with("Ada Lovelace, you have already borrowed one copy of Metropolis"));
        assert!(message.contains("2025-03-14"));
        assert!(err.is_precondition());
    }

    #[test]
    fn faults_are_not_preconditions() {
        let err = RentalError::TransactionUnavailable {
            reason: "no replica set".to_string(),
        };
        assert!(!err.is_precondition());
        assert_eq!(err.code(), "TRANSACTION_UNAVAILABLE");
    }

    #[test]
    fn rollback_failure_lists_every_step() {
        let err = RentalError::RollbackFailed {
            transaction_id: TransactionId::new(),
            cause: "rental insert failed".to_string(),
            failures: vec!["movie stock".to_string(), "customer count".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("movie stock; customer count"));
    }

    #[test]
    fn store_error_display() {
        let err = StoreError::conflict("movie", "42", "stock would go negative");
        assert_eq!(err.to_string(), "Conflict on movie 42: stock would go negative");
    }
}
