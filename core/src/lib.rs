//! # Vidly Core
//!
//! Domain types and pure business logic for the Vidly movie-rental service.
//!
//! Everything in this crate is free of I/O. The rental workflow itself lives in
//! `vidly-runtime`; this crate gives it the pieces it composes:
//!
//! - **Types** ([`types`]): movies, customers, rentals, transactions and their ids
//! - **Rules** ([`rules`]): the ordered precondition checks and the write plan
//! - **Fee** ([`fee`]): the return fee calculator
//! - **Transaction** ([`transaction`]): the `initial -> pending -> applied -> done` state
//!   machine with its compensation journal, written as a [`reducer::Reducer`]
//! - **Store** ([`store`]): the persistence traits backends implement
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell
//! - Explicit Effects (no hidden I/O)
//! - Dependency Injection via Environment

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

pub mod error;
pub mod fee;
pub mod rules;
pub mod store;
pub mod transaction;
pub mod types;
pub mod validation;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action against the current state
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed by the runtime
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects are values, not execution. The runtime interprets them against a store.
pub mod effect {
    use crate::transaction::Compensation;
    use crate::types::{CustomerId, MovieId, Transaction, TransactionId};
    use std::future::Future;
    use std::pin::Pin;

    /// Effect type - describes a side effect to be executed
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Action>>),

        /// Persist the transaction record in its current state
        RecordTransaction(Transaction),

        /// Undo one write that was already applied
        Compensate(Compensation),

        /// Drop the in-flight transaction id from the movie and the customer
        ReleasePendingMarkers {
            /// Transaction whose markers are removed
            transaction_id: TransactionId,
            /// Movie carrying the marker
            movie_id: MovieId,
            /// Customer carrying the marker
            customer_id: CustomerId,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::RecordTransaction(transaction) => f
                    .debug_tuple("Effect::RecordTransaction")
                    .field(transaction)
                    .finish(),
                Effect::Compensate(compensation) => f
                    .debug_tuple("Effect::Compensate")
                    .field(compensation)
                    .finish(),
                Effect::ReleasePendingMarkers {
                    transaction_id,
                    movie_id,
                    customer_id,
                } => f
                    .debug_struct("Effect::ReleasePendingMarkers")
                    .field("transaction_id", transaction_id)
                    .field("movie_id", movie_id)
                    .field("customer_id", customer_id)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Flatten nested `Sequential`/`Parallel` groups into execution order.
        ///
        /// `None` entries are dropped. Parallel groups keep their declared order.
        #[must_use]
        pub fn flatten(self) -> Vec<Effect<Action>> {
            match self {
                Effect::None => Vec::new(),
                Effect::Parallel(effects) | Effect::Sequential(effects) => {
                    effects.into_iter().flat_map(Effect::flatten).collect()
                },
                other => vec![other],
            }
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Checkout and return timestamps, and therefore rental fees, are
    /// all read through a `Clock`.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::effect::Effect;
    use super::environment::{Clock, SystemClock};

    #[test]
    fn flatten_drops_none_and_keeps_order() {
        let effect: Effect<()> = Effect::chain(vec![
            Effect::None,
            Effect::merge(vec![Effect::None]),
            Effect::chain(vec![]),
        ]);
        assert!(effect.flatten().is_empty());
    }

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
