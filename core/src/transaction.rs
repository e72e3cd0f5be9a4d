//! Transaction state machine for one rental attempt.
//!
//! The reducer tracks a [`Transaction`] through
//! `initial → pending → applied → done` and keeps a journal of every write
//! applied while pending. When the attempt fails, it emits one
//! [`Compensation`] per journal entry, newest first, then releases the
//! pending markers and records the transaction as `canceled`.
//!
//! The reducer never touches storage. The runtime executes the effects it
//! returns against whichever store (or session) the attempt runs on.

use crate::effect::Effect;
use crate::environment::Clock;
use crate::reducer::Reducer;
use crate::types::{
    CustomerId, MovieId, Rental, RentalId, RentalKind, Transaction, TransactionId,
    TransactionState,
};
use smallvec::{SmallVec, smallvec};
use std::sync::Arc;

/// A write that landed while the transaction was pending.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AppliedWrite {
    /// Movie stock moved by `delta`.
    MovieStock {
        /// Movie
        movie_id: MovieId,
        /// Applied change
        delta: i32,
    },
    /// Customer rented count moved by `delta`.
    CustomerRentals {
        /// Customer
        customer_id: CustomerId,
        /// Applied change
        delta: i32,
    },
    /// A new rental was inserted.
    RentalOpened {
        /// Inserted rental
        rental_id: RentalId,
    },
    /// An active rental was closed; `previous` is its state before the return.
    RentalClosed {
        /// Rental before it was closed
        previous: Rental,
    },
}

impl AppliedWrite {
    /// The write that undoes this one.
    #[must_use]
    pub fn compensation(&self) -> Compensation {
        match self {
            Self::MovieStock { movie_id, delta } => Compensation::RestoreMovieStock {
                movie_id: *movie_id,
                delta: -delta,
            },
            Self::CustomerRentals { customer_id, delta } => {
                Compensation::RestoreCustomerRentals {
                    customer_id: *customer_id,
                    delta: -delta,
                }
            },
            Self::RentalOpened { rental_id } => Compensation::DeleteRental {
                rental_id: *rental_id,
            },
            Self::RentalClosed { previous } => Compensation::ReopenRental {
                previous: previous.clone(),
            },
        }
    }
}

/// A compensating write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Compensation {
    /// Move the stock back by `delta`.
    RestoreMovieStock {
        /// Movie
        movie_id: MovieId,
        /// Change that restores the previous stock
        delta: i32,
    },
    /// Move the rented count back by `delta`.
    RestoreCustomerRentals {
        /// Customer
        customer_id: CustomerId,
        /// Change that restores the previous count
        delta: i32,
    },
    /// Remove a rental the attempt created.
    DeleteRental {
        /// Rental to remove
        rental_id: RentalId,
    },
    /// Put a closed rental back to its active form.
    ReopenRental {
        /// Rental as it was before the return
        previous: Rental,
    },
}

impl Compensation {
    /// Record kind this step writes to, for logs.
    #[must_use]
    pub const fn entity(&self) -> &'static str {
        match self {
            Self::RestoreMovieStock { .. } => "movie",
            Self::RestoreCustomerRentals { .. } => "customer",
            Self::DeleteRental { .. } | Self::ReopenRental { .. } => "rental",
        }
    }

    /// Short step name, for logs.
    #[must_use]
    pub const fn step(&self) -> &'static str {
        match self {
            Self::RestoreMovieStock { .. } => "restore_movie_stock",
            Self::RestoreCustomerRentals { .. } => "restore_customer_rentals",
            Self::DeleteRental { .. } => "delete_rental",
            Self::ReopenRental { .. } => "reopen_rental",
        }
    }

    /// ID of the record this step writes to.
    #[must_use]
    pub fn entity_id(&self) -> String {
        match self {
            Self::RestoreMovieStock { movie_id, .. } => movie_id.to_string(),
            Self::RestoreCustomerRentals { customer_id, .. } => customer_id.to_string(),
            Self::DeleteRental { rental_id } => rental_id.to_string(),
            Self::ReopenRental { previous } => previous.id.to_string(),
        }
    }
}

/// Reducer state: the transaction plus its write journal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionProgress {
    /// `None` until [`TransactionAction::Begin`]
    pub transaction: Option<Transaction>,
    /// Writes applied while pending, oldest first
    pub journal: Vec<AppliedWrite>,
}

impl TransactionProgress {
    /// Current lifecycle state, if begun.
    #[must_use]
    pub fn state(&self) -> Option<TransactionState> {
        self.transaction.as_ref().map(|t| t.state)
    }
}

/// Inputs to the transaction reducer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionAction {
    /// Create the transaction in `initial`.
    Begin {
        /// New transaction ID
        id: TransactionId,
        /// Movie
        source: MovieId,
        /// Customer
        destination: CustomerId,
        /// Borrow or return
        kind: RentalKind,
    },
    /// `initial → pending`; writes may start.
    MarkPending,
    /// One write landed.
    WriteApplied(AppliedWrite),
    /// `pending → applied`; all writes landed.
    MarkApplied,
    /// `applied → done`; release markers.
    Complete,
    /// Cancel and compensate everything in the journal.
    Fail {
        /// Why the attempt failed
        reason: String,
    },
}

/// Environment for the transaction reducer.
#[derive(Clone)]
pub struct TransactionEnvironment {
    /// Timestamps for `created_at`/`updated_at`
    pub clock: Arc<dyn Clock>,
}

impl TransactionEnvironment {
    /// Create an environment from a clock.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

/// Drives [`TransactionProgress`] through the transaction lifecycle.
///
/// Actions that would break the lifecycle (for example `Complete` while
/// pending) leave the state untouched and produce no effects.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransactionReducer;

impl TransactionReducer {
    fn advance(
        state: &mut TransactionProgress,
        next: TransactionState,
        env: &TransactionEnvironment,
    ) -> Option<Transaction> {
        let transaction = state.transaction.as_mut()?;
        if !transaction.state.can_transition_to(next) {
            return None;
        }
        transaction.state = next;
        transaction.updated_at = env.clock.now();
        Some(transaction.clone())
    }
}

impl Reducer for TransactionReducer {
    type State = TransactionProgress;
    type Action = TransactionAction;
    type Environment = TransactionEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            TransactionAction::Begin {
                id,
                source,
                destination,
                kind,
            } => {
                if state.transaction.is_some() {
                    return SmallVec::new();
                }
                let now = env.clock.now();
                let transaction = Transaction {
                    id,
                    source,
                    destination,
                    state: TransactionState::Initial,
                    transaction_type: kind,
                    created_at: now,
                    updated_at: now,
                };
                state.transaction = Some(transaction.clone());
                state.journal.clear();
                smallvec![Effect::RecordTransaction(transaction)]
            },

            TransactionAction::MarkPending => {
                Self::advance(state, TransactionState::Pending, env)
                    .map(|t| smallvec![Effect::RecordTransaction(t)])
                    .unwrap_or_default()
            },

            TransactionAction::WriteApplied(write) => {
                if state.state() == Some(TransactionState::Pending) {
                    state.journal.push(write);
                }
                SmallVec::new()
            },

            TransactionAction::MarkApplied => {
                Self::advance(state, TransactionState::Applied, env)
                    .map(|t| smallvec![Effect::RecordTransaction(t)])
                    .unwrap_or_default()
            },

            TransactionAction::Complete => {
                let Some(done) = Self::advance(state, TransactionState::Done, env) else {
                    return SmallVec::new();
                };
                state.journal.clear();
                smallvec![Effect::chain(vec![
                    Effect::ReleasePendingMarkers {
                        transaction_id: done.id,
                        movie_id: done.source,
                        customer_id: done.destination,
                    },
                    Effect::RecordTransaction(done),
                ])]
            },

            TransactionAction::Fail { reason: _ } => {
                let Some(canceled) = Self::advance(state, TransactionState::Canceled, env) else {
                    return SmallVec::new();
                };

                let mut steps: Vec<Effect<TransactionAction>> = state
                    .journal
                    .drain(..)
                    .rev()
                    .map(|write| Effect::Compensate(write.compensation()))
                    .collect();
                steps.push(Effect::ReleasePendingMarkers {
                    transaction_id: canceled.id,
                    movie_id: canceled.source,
                    customer_id: canceled.destination,
                });
                steps.push(Effect::RecordTransaction(canceled));

                smallvec![Effect::chain(steps)]
            },
        }
    }
}
