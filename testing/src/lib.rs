//! # Vidly Testing
//!
//! Testing utilities for the Vidly workspace.
//!
//! This crate provides:
//! - [`InMemoryStore`]: a complete [`Database`](vidly_core::store::Database)
//!   with optional native sessions and per-operation fault injection
//! - Deterministic clocks
//! - Record fixtures
//! - Property-based testing strategies
//! - [`ReducerTest`] and effect assertions
//!
//! ## Example
//!
//! ```ignore
//! use vidly_testing::{InMemoryStore, fixtures, test_clock};
//! use vidly_runtime::RentalWorkflow;
//!
//! #[tokio::test]
//! async fn borrow_decrements_stock() {
//!     let store = Arc::new(InMemoryStore::new());
//!     let workflow = RentalWorkflow::new(store.clone(), Arc::new(test_clock()));
//!     // seed with fixtures::movie(...) and fixtures::customer(...)
//! }
//! ```

use chrono::{DateTime, Utc};
use vidly_core::environment::Clock;

/// In-memory store
pub mod memory;


/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use vidly_testing::mocks::FixedClock;
    /// use vidly_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// A clock tests can move forward, e.g. to accrue rental fees.
    ///
    /// Clones share the same time.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Start at `time`.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to `time`.
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = time;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(crate::fixtures::epoch())
    }
}

/// Record builders with sensible defaults.
pub mod fixtures {
    use chrono::{DateTime, Utc};
    use vidly_core::types::{
        Customer, CustomerId, Genre, GenreId, GenreSnapshot, Money, Movie, MovieId, Rental,
        RentalId, User, UserId,
    };

    /// 2025-01-01 00:00:00 UTC
    #[must_use]
    pub fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// A genre.
    #[must_use]
    pub fn genre(name: &str) -> Genre {
        Genre {
            id: GenreId::new(),
            name: name.to_string(),
        }
    }

    /// A drama with `stock` copies at `rate_cents` per day.
    #[must_use]
    pub fn movie(title: &str, stock: u32, rate_cents: i64) -> Movie {
        Movie {
            id: MovieId::new(),
            title: title.to_string(),
            genre: GenreSnapshot::from(&genre("Drama")),
            number_in_stock: stock,
            daily_rental_rate: Money::from_cents(rate_cents),
            pending_transactions: Vec::new(),
        }
    }

    /// A regular customer with `rented` movies out.
    #[must_use]
    pub fn customer(name: &str, rented: u32) -> Customer {
        Customer {
            id: CustomerId::new(),
            name: name.to_string(),
            phone: "5550100100".to_string(),
            is_gold: false,
            number_of_movies_rented: rented,
            pending_transactions: Vec::new(),
        }
    }

    /// A user whose password hash is a placeholder.
    #[must_use]
    pub fn user(email: &str, is_admin: bool) -> User {
        User {
            id: UserId::new(),
            name: "Test User".to_string(),
            email: email.to_string(),
            password_hash: "not-a-real-hash".to_string(),
            is_admin,
        }
    }

    /// An active rental checked out at `date_out`.
    #[must_use]
    pub fn rental(customer: &Customer, movie: &Movie, date_out: DateTime<Utc>) -> Rental {
        Rental::open(RentalId::new(), customer, movie, date_out)
    }
}

/// Test helpers and utilities
pub mod helpers {
    use tracing_subscriber::EnvFilter;

    /// Install a test-friendly tracing subscriber once per process.
    ///
    /// Honors `RUST_LOG`, defaulting to `warn`.
    pub fn init_tracing() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use vidly_core::types::RentalKind;

    /// One request in a generated script: indexes into the seeded customers
    /// and movies.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScriptedRequest {
        /// Customer index
        pub customer: usize,
        /// Movie index
        pub movie: usize,
        /// Borrow or return
        pub intent: RentalKind,
    }

    /// Borrow or return, equally likely.
    pub fn rental_kind() -> impl Strategy<Value = RentalKind> {
        prop_oneof![Just(RentalKind::Borrow), Just(RentalKind::Return)]
    }

    /// Scripts of up to `max_len` requests over `customers` × `movies`.
    pub fn request_script(
        customers: usize,
        movies: usize,
        max_len: usize,
    ) -> impl Strategy<Value = Vec<ScriptedRequest>> {
        prop::collection::vec(
            (0..customers, 0..movies, rental_kind()).prop_map(|(customer, movie, intent)| {
                ScriptedRequest {
                    customer,
                    movie,
                    intent,
                }
            }),
            0..=max_len,
        )
    }
}

// Re-export commonly used items
pub use memory::{InMemorySession, InMemoryStore, StoreOp};
pub use mocks::{FixedClock, ManualClock, test_clock};
pub use reducer_test::ReducerTest;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
        assert_eq!(time1.to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(fixtures::epoch());
        let copy = clock.clone();
        clock.advance(chrono::Duration::days(3));
        assert_eq!(copy.now() - fixtures::epoch(), chrono::Duration::days(3));
    }
}
