//! The rental workflow engine.
//!
//! [`RentalWorkflow::submit_rental_request`] takes a borrow or return request
//! from precondition checks to committed writes:
//!
//! 1. Read customer, movie and the active rental, checking the rules after
//!    each read (see [`vidly_core::rules`]).
//! 2. Begin a [`Transaction`] and mark it pending.
//! 3. Write movie stock, customer count and rental, in that order, each
//!    tagged with the transaction id.
//! 4. Mark the transaction applied, release the markers and mark it done.
//!
//! If any write fails, the attempt is rolled back so that no partial borrow
//! or return is ever visible. With a backend that supports native
//! transactions, steps 1 to 4 run inside one session and rollback is an
//! abort. Otherwise every applied write is undone with a compensating write.

use crate::metrics::RentalMetrics;
use crate::retry::RetryPolicy;
use crate::rollback::{self, Effects, RollbackMode};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use vidly_core::effect::Effect;
use vidly_core::environment::Clock;
use vidly_core::error::{RentalError, StoreError};
use vidly_core::reducer::Reducer;
use vidly_core::rules::{self, RentalPlan, RentalWrite};
use vidly_core::store::{Database, RentalStore, Session};
use vidly_core::transaction::{
    AppliedWrite, TransactionAction, TransactionEnvironment, TransactionProgress,
    TransactionReducer,
};
use vidly_core::types::{
    CustomerId, MAX_RENTALS_PER_CUSTOMER, MovieId, Rental, RentalId, RentalKind, Transaction,
    TransactionId, TransactionState,
};
use vidly_core::smallvec;

/// How a rental attempt is kept atomic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsistencyStrategy {
    /// Native transactions when the backend has them, compensation otherwise.
    #[default]
    Auto,
    /// Always use a native transaction; fail if none can be opened.
    NativeTransaction,
    /// Always apply writes one by one and compensate on failure.
    Compensating,
}

impl fmt::Display for ConsistencyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::NativeTransaction => write!(f, "transaction"),
            Self::Compensating => write!(f, "compensating"),
        }
    }
}

impl FromStr for ConsistencyStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "transaction" | "native" => Ok(Self::NativeTransaction),
            "compensating" => Ok(Self::Compensating),
            other => Err(format!(
                "unknown consistency strategy '{other}' (expected auto, transaction or compensating)"
            )),
        }
    }
}

/// A completed borrow or return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RentalReceipt {
    /// The rental as written: newly opened, or closed with its fee
    pub rental: Rental,
    /// The transaction record, in `done`
    pub transaction: Transaction,
}

/// One transaction attempt: reducer state plus the reducer itself.
struct Attempt {
    id: TransactionId,
    progress: TransactionProgress,
    env: TransactionEnvironment,
}

impl Attempt {
    fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            id: TransactionId::new(),
            progress: TransactionProgress::default(),
            env: TransactionEnvironment::new(clock),
        }
    }

    fn send(&mut self, action: TransactionAction) -> Effects {
        TransactionReducer.reduce(&mut self.progress, action, &self.env)
    }

    /// Cancel the attempt even if the reducer already considers it done.
    ///
    /// A native session can fail after `done` was written inside it; the
    /// abort discards that record, so the canceled one is written directly.
    fn abandon(&mut self, reason: &StoreError) -> Effects {
        let effects = self.send(TransactionAction::Fail {
            reason: reason.to_string(),
        });
        if !effects.is_empty() {
            return effects;
        }
        match self.progress.transaction.as_mut() {
            Some(transaction) if transaction.state != TransactionState::Canceled => {
                transaction.state = TransactionState::Canceled;
                transaction.updated_at = self.env.clock.now();
                smallvec![Effect::RecordTransaction(transaction.clone())]
            },
            _ => Effects::new(),
        }
    }

    fn receipt(&self, rental: Rental, intent: RentalKind) -> Result<RentalReceipt, RentalError> {
        self.progress
            .transaction
            .clone()
            .map(|transaction| RentalReceipt {
                rental,
                transaction,
            })
            .ok_or_else(|| {
                RentalError::store(
                    intent,
                    StoreError::Backend("transaction record missing after completion".to_string()),
                )
            })
    }
}

/// Executes borrow and return requests.
#[derive(Clone)]
pub struct RentalWorkflow {
    store: Arc<dyn Database>,
    clock: Arc<dyn Clock>,
    strategy: ConsistencyStrategy,
    rollback_policy: RetryPolicy,
}

impl RentalWorkflow {
    /// Create a workflow with the `Auto` strategy and the default rollback policy.
    #[must_use]
    pub fn new(store: Arc<dyn Database>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            strategy: ConsistencyStrategy::Auto,
            rollback_policy: RetryPolicy::default(),
        }
    }

    /// Set the consistency strategy.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: ConsistencyStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set how compensating writes are retried.
    #[must_use]
    pub fn with_rollback_policy(mut self, policy: RetryPolicy) -> Self {
        self.rollback_policy = policy;
        self
    }

    /// The strategy requests will actually run with.
    #[must_use]
    pub fn effective_strategy(&self) -> ConsistencyStrategy {
        match self.strategy {
            ConsistencyStrategy::Auto if self.store.supports_transactions() => {
                ConsistencyStrategy::NativeTransaction
            },
            ConsistencyStrategy::Auto => ConsistencyStrategy::Compensating,
            explicit => explicit,
        }
    }

    /// Borrow or return one movie for one customer.
    ///
    /// # Errors
    ///
    /// - a precondition variant of [`RentalError`] when a business rule rejects
    ///   the request (nothing is written)
    /// - [`RentalError::TransactionUnavailable`] when a native transaction is
    ///   required but cannot be opened
    /// - [`RentalError::Store`] when a write failed and was rolled back
    /// - [`RentalError::RollbackFailed`] when undoing a partial write failed
    #[tracing::instrument(
        skip_all,
        fields(customer_id = %customer_id, movie_id = %movie_id, intent = %intent)
    )]
    pub async fn submit_rental_request(
        &self,
        customer_id: CustomerId,
        movie_id: MovieId,
        intent: RentalKind,
    ) -> Result<RentalReceipt, RentalError> {
        let started = Instant::now();

        let result = match self.effective_strategy() {
            ConsistencyStrategy::Compensating => {
                self.submit_compensating(customer_id, movie_id, intent).await
            },
            _ => self.submit_native(customer_id, movie_id, intent).await,
        };

        match &result {
            Ok(receipt) => tracing::info!(
                rental_id = %receipt.rental.id,
                transaction_id = %receipt.transaction.id,
                "Rental request completed"
            ),
            Err(err) if err.is_precondition() => {
                tracing::info!(reason = %err, "Rental request rejected");
            },
            Err(err) => tracing::error!(error = %err, "Rental request failed"),
        }
        RentalMetrics::record_request(intent, result.as_ref().map(|_| ()), started.elapsed());
        result
    }

    /// Rentals carrying the given marker, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`RentalError::Store`] when the ledger cannot be read.
    pub async fn list_active_rentals(&self, kind: RentalKind) -> Result<Vec<Rental>, RentalError> {
        self.store
            .list_rentals(kind)
            .await
            .map_err(|source| RentalError::Store {
                operation: "list rentals",
                source,
            })
    }

    /// Load one rental.
    ///
    /// # Errors
    ///
    /// Returns [`RentalError::RentalNotFound`] for an unknown id.
    pub async fn get_rental(&self, rental_id: RentalId) -> Result<Rental, RentalError> {
        self.store
            .find_rental(rental_id)
            .await
            .map_err(|source| RentalError::Store {
                operation: "load rental",
                source,
            })?
            .ok_or(RentalError::RentalNotFound { rental_id })
    }

    async fn submit_native(
        &self,
        customer_id: CustomerId,
        movie_id: MovieId,
        intent: RentalKind,
    ) -> Result<RentalReceipt, RentalError> {
        let session = self.store.begin().await.map_err(|err| {
            tracing::warn!(error = %err, "Could not open a native transaction");
            RentalError::TransactionUnavailable {
                reason: err.to_string(),
            }
        })?;

        let plan = match approve(&*session, customer_id, movie_id, intent, self.clock.as_ref()).await
        {
            Ok(plan) => plan,
            Err(err) => {
                discard(session).await;
                return Err(err);
            },
        };

        let mut attempt = Attempt::new(Arc::clone(&self.clock));
        let outcome = match drive(&*session, &mut attempt, &plan).await {
            Ok(rental) => rollback::run_effects(&*session, attempt.send(TransactionAction::Complete))
                .await
                .map(|()| rental),
            Err(err) => Err(err),
        };

        let failure = match outcome {
            Ok(rental) => match session.commit().await {
                Ok(()) => {
                    RentalMetrics::record_transaction(TransactionState::Done);
                    return attempt.receipt(rental, intent);
                },
                Err(err) => err,
            },
            Err(err) => {
                discard(session).await;
                err
            },
        };

        tracing::warn!(
            transaction_id = %attempt.id,
            error = %failure,
            "Native transaction aborted"
        );
        let effects = attempt.abandon(&failure);
        rollback::roll_back(
            self.store.as_ref(),
            attempt.id,
            effects,
            RollbackMode::Discarded,
            &self.rollback_policy,
        )
        .await;
        RentalMetrics::record_transaction(TransactionState::Canceled);

        Err(self.explain(&plan, failure).await)
    }

    async fn submit_compensating(
        &self,
        customer_id: CustomerId,
        movie_id: MovieId,
        intent: RentalKind,
    ) -> Result<RentalReceipt, RentalError> {
        let store = self.store.as_ref();
        let plan = approve(store, customer_id, movie_id, intent, self.clock.as_ref()).await?;

        let mut attempt = Attempt::new(Arc::clone(&self.clock));
        let failure = match drive(store, &mut attempt, &plan).await {
            Ok(rental) => {
                let applied = attempt.progress.clone();
                match rollback::run_effects(store, attempt.send(TransactionAction::Complete)).await
                {
                    Ok(()) => {
                        RentalMetrics::record_transaction(TransactionState::Done);
                        return attempt.receipt(rental, intent);
                    },
                    Err(err) => {
                        // `done` never reached the store; undo from `applied`.
                        attempt.progress = applied;
                        err
                    },
                }
            },
            Err(err) => err,
        };

        tracing::warn!(
            transaction_id = %attempt.id,
            error = %failure,
            "Rental attempt failed, compensating"
        );
        let effects = attempt.send(TransactionAction::Fail {
            reason: failure.to_string(),
        });
        let failures = rollback::roll_back(
            store,
            attempt.id,
            effects,
            RollbackMode::Compensate,
            &self.rollback_policy,
        )
        .await;
        RentalMetrics::record_rollback(failures.is_empty());
        RentalMetrics::record_transaction(TransactionState::Canceled);

        if !failures.is_empty() {
            return Err(RentalError::RollbackFailed {
                transaction_id: attempt.id,
                cause: failure.to_string(),
                failures,
            });
        }

        Err(self.explain(&plan, failure).await)
    }

    /// Turn a write failure into the business error it stands for.
    ///
    /// Conditional writes fail when a concurrent request got there first; the
    /// result is the same rejection the precondition check would have given.
    async fn explain(&self, plan: &RentalPlan, failure: StoreError) -> RentalError {
        let rental = plan.rental.rental();
        let customer = rental.customer.name.clone();
        let title = rental.movie.title.clone();

        match (&failure, plan.intent) {
            (StoreError::Conflict { entity: "movie", .. }, RentalKind::Borrow) => {
                RentalError::OutOfStock { title }
            },
            (StoreError::Conflict { entity: "customer", .. }, RentalKind::Borrow) => {
                RentalError::RentalLimitExceeded {
                    customer,
                    limit: MAX_RENTALS_PER_CUSTOMER,
                }
            },
            (StoreError::Conflict { entity: "customer", .. }, RentalKind::Return) => {
                RentalError::NothingToReturn { customer }
            },
            (StoreError::Conflict { entity: "rental", .. }, RentalKind::Return) => {
                RentalError::NotBorrowed { customer, title }
            },
            (StoreError::Duplicate { entity: "rental", .. }, RentalKind::Borrow) => {
                match self
                    .store
                    .find_active_rental(plan.customer_id, plan.movie_id)
                    .await
                {
                    Ok(Some(existing)) => RentalError::AlreadyBorrowed {
                        customer,
                        title,
                        date_out: existing.date_out,
                    },
                    _ => RentalError::store(plan.intent, failure),
                }
            },
            _ => RentalError::store(plan.intent, failure),
        }
    }
}

/// Read and check, in rule order, then build the write plan.
async fn approve<S>(
    store: &S,
    customer_id: CustomerId,
    movie_id: MovieId,
    intent: RentalKind,
    clock: &dyn Clock,
) -> Result<RentalPlan, RentalError>
where
    S: RentalStore + ?Sized,
{
    let read_failed = |source| RentalError::store(intent, source);

    let customer = store.find_customer(customer_id).await.map_err(read_failed)?;
    let customer = rules::require_customer(customer_id, customer)?;
    rules::check_customer(intent, &customer)?;

    let movie = store.find_movie(movie_id).await.map_err(read_failed)?;
    let movie = rules::require_movie(movie_id, movie)?;

    let active = store
        .find_active_rental(customer_id, movie_id)
        .await
        .map_err(read_failed)?;
    let active = rules::check_rental(intent, &customer, &movie, active)?;

    Ok(rules::plan(
        intent,
        &customer,
        &movie,
        active,
        RentalId::new(),
        clock.now(),
    ))
}

/// Begin the transaction and apply every write up to `applied`.
async fn drive<S>(store: &S, attempt: &mut Attempt, plan: &RentalPlan) -> Result<Rental, StoreError>
where
    S: RentalStore + ?Sized,
{
    let id = attempt.id;
    let begin = attempt.send(TransactionAction::Begin {
        id,
        source: plan.movie_id,
        destination: plan.customer_id,
        kind: plan.intent,
    });
    rollback::run_effects(store, begin).await?;
    rollback::run_effects(store, attempt.send(TransactionAction::MarkPending)).await?;

    store
        .adjust_movie_stock(plan.movie_id, plan.stock_delta, Some(id))
        .await?;
    attempt.send(TransactionAction::WriteApplied(AppliedWrite::MovieStock {
        movie_id: plan.movie_id,
        delta: plan.stock_delta,
    }));

    store
        .adjust_customer_rentals(plan.customer_id, plan.rented_delta, Some(id))
        .await?;
    attempt.send(TransactionAction::WriteApplied(
        AppliedWrite::CustomerRentals {
            customer_id: plan.customer_id,
            delta: plan.rented_delta,
        },
    ));

    let rental = match &plan.rental {
        RentalWrite::Open(rental) => {
            let opened = store.insert_rental(rental.clone()).await?;
            attempt.send(TransactionAction::WriteApplied(
                AppliedWrite::RentalOpened {
                    rental_id: opened.id,
                },
            ));
            opened
        },
        RentalWrite::Close { previous, closed } => {
            let closed = store.close_rental(closed.clone()).await?;
            attempt.send(TransactionAction::WriteApplied(
                AppliedWrite::RentalClosed {
                    previous: previous.clone(),
                },
            ));
            closed
        },
    };

    rollback::run_effects(store, attempt.send(TransactionAction::MarkApplied)).await?;
    Ok(rental)
}

async fn discard(session: Box<dyn Session>) {
    if let Err(err) = session.abort().await {
        tracing::warn!(error = %err, "Aborting native transaction failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parses_config_values() {
        assert_eq!(
            "auto".parse::<ConsistencyStrategy>(),
            Ok(ConsistencyStrategy::Auto)
        );
        assert_eq!(
            " Transaction ".parse::<ConsistencyStrategy>(),
            Ok(ConsistencyStrategy::NativeTransaction)
        );
        assert_eq!(
            "compensating".parse::<ConsistencyStrategy>(),
            Ok(ConsistencyStrategy::Compensating)
        );
        assert!("two-phase".parse::<ConsistencyStrategy>().is_err());
    }

    #[test]
    fn strategy_display_round_trips() {
        for strategy in [
            ConsistencyStrategy::Auto,
            ConsistencyStrategy::NativeTransaction,
            ConsistencyStrategy::Compensating,
        ] {
            assert_eq!(strategy.to_string().parse::<ConsistencyStrategy>(), Ok(strategy));
        }
    }
}
