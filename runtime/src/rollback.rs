//! Executing transaction effects.
//!
//! The transaction reducer describes what must be written; this module
//! writes it. Two paths exist:
//!
//! - [`run_effects`] is used while the attempt moves forward. The first
//!   failure aborts the attempt.
//! - [`roll_back`] executes the effects of a failed attempt. Every step is
//!   tried even if an earlier one failed; failures are logged and collected.

use crate::retry::{RetryPolicy, retry_with_backoff, retry_with_predicate};
use vidly_core::effect::Effect;
use vidly_core::error::StoreError;
use vidly_core::store::RentalStore;
use vidly_core::transaction::{Compensation, TransactionAction};
use vidly_core::types::TransactionId;

/// Effects produced by one reducer step.
pub type Effects = vidly_core::SmallVec<[Effect<TransactionAction>; 4]>;

/// How a failed attempt's writes are undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackMode {
    /// Undo each applied write with a compensating write.
    Compensate,
    /// The writes were discarded with the native transaction; only record the
    /// canceled transaction.
    Discarded,
}

/// Execute forward-path effects in order.
///
/// # Errors
///
/// Returns the first store failure.
pub async fn run_effects<S>(store: &S, effects: Effects) -> Result<(), StoreError>
where
    S: RentalStore + ?Sized,
{
    for effect in effects.into_iter().flat_map(Effect::flatten) {
        match effect {
            Effect::RecordTransaction(transaction) => {
                tracing::debug!(
                    transaction_id = %transaction.id,
                    state = %transaction.state,
                    "Recording transaction"
                );
                store.save_transaction(transaction).await?;
            },
            Effect::ReleasePendingMarkers {
                transaction_id,
                movie_id,
                customer_id,
            } => {
                store
                    .release_pending_markers(transaction_id, movie_id, customer_id)
                    .await?;
            },
            Effect::Compensate(compensation) => {
                apply_compensation(store, &compensation).await?;
            },
            Effect::Future(fut) => {
                if fut.await.is_some() {
                    tracing::warn!("Transaction effects do not feed actions back; dropped");
                }
            },
            Effect::None | Effect::Parallel(_) | Effect::Sequential(_) => {},
        }
    }
    Ok(())
}

/// Execute the effects of a failed attempt.
///
/// Compensations are retried on backend errors according to `policy`.
/// Releasing the pending markers is idempotent and is retried on any error.
/// Returns one message per step that could not be completed; an empty vector
/// means the store is back to its state before the attempt.
pub async fn roll_back<S>(
    store: &S,
    transaction_id: TransactionId,
    effects: Effects,
    mode: RollbackMode,
    policy: &RetryPolicy,
) -> Vec<String>
where
    S: RentalStore + ?Sized,
{
    let mut failures = Vec::new();

    for effect in effects.into_iter().flat_map(Effect::flatten) {
        match effect {
            Effect::Compensate(compensation) if mode == RollbackMode::Compensate => {
                let step = &compensation;
                let result = retry_with_predicate(
                    policy,
                    || apply_compensation(store, step),
                    is_transient,
                )
                .await;
                if let Err(err) = result {
                    tracing::error!(
                        entity = compensation.entity(),
                        entity_id = %compensation.entity_id(),
                        transaction_id = %transaction_id,
                        step = compensation.step(),
                        error = %err,
                        "Compensation failed"
                    );
                    failures.push(format!(
                        "{} {} ({}): {err}",
                        compensation.entity(),
                        compensation.entity_id(),
                        compensation.step()
                    ));
                }
            },
            Effect::ReleasePendingMarkers {
                transaction_id,
                movie_id,
                customer_id,
            } if mode == RollbackMode::Compensate => {
                let result = retry_with_backoff(policy, || {
                    store.release_pending_markers(transaction_id, movie_id, customer_id)
                })
                .await;
                if let Err(err) = result {
                    tracing::error!(
                        transaction_id = %transaction_id,
                        step = "release_pending_markers",
                        error = %err,
                        "Releasing pending markers failed"
                    );
                    failures.push(format!("pending markers: {err}"));
                }
            },
            Effect::RecordTransaction(transaction) => {
                if let Err(err) = store.save_transaction(transaction).await {
                    tracing::warn!(
                        transaction_id = %transaction_id,
                        error = %err,
                        "Could not record canceled transaction"
                    );
                }
            },
            _ => {},
        }
    }

    failures
}

async fn apply_compensation<S>(store: &S, compensation: &Compensation) -> Result<(), StoreError>
where
    S: RentalStore + ?Sized,
{
    tracing::debug!(
        step = compensation.step(),
        entity_id = %compensation.entity_id(),
        "Applying compensation"
    );
    match compensation {
        Compensation::RestoreMovieStock { movie_id, delta } => {
            store.adjust_movie_stock(*movie_id, *delta, None).await?;
        },
        Compensation::RestoreCustomerRentals { customer_id, delta } => {
            store
                .adjust_customer_rentals(*customer_id, *delta, None)
                .await?;
        },
        Compensation::DeleteRental { rental_id } => {
            store.delete_rental(*rental_id).await?;
        },
        Compensation::ReopenRental { previous } => {
            store.replace_rental(previous.clone()).await?;
        },
    }
    Ok(())
}

const fn is_transient(err: &StoreError) -> bool {
    matches!(err, StoreError::Backend(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_backend_errors_are_retried() {
        assert!(is_transient(&StoreError::Backend("reset".to_string())));
        assert!(!is_transient(&StoreError::not_found("movie", "1")));
        assert!(!is_transient(&StoreError::conflict("movie", "1", "negative")));
    }
}
