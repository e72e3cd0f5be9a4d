//! Transaction state machine tests, written Given/When/Then.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use vidly_core::effect::Effect;
use vidly_core::reducer::Reducer;
use vidly_core::transaction::{
    AppliedWrite, Compensation, TransactionAction, TransactionEnvironment, TransactionProgress,
    TransactionReducer,
};
use vidly_core::types::{
    CustomerId, CustomerSnapshot, Money, MovieId, MovieSnapshot, Rental, RentalId, RentalKind,
    TransactionId, TransactionState,
};
use vidly_testing::reducer_test::assertions;
use vidly_testing::{ReducerTest, fixtures, test_clock};

fn env() -> TransactionEnvironment {
    TransactionEnvironment::new(Arc::new(test_clock()))
}

/// State after `actions`, starting from a fresh `Begin`.
fn after(
    kind: RentalKind,
    actions: Vec<TransactionAction>,
) -> (TransactionProgress, MovieId, CustomerId) {
    let movie_id = MovieId::new();
    let customer_id = CustomerId::new();
    let env = env();
    let mut state = TransactionProgress::default();
    let begin = TransactionAction::Begin {
        id: TransactionId::new(),
        source: movie_id,
        destination: customer_id,
        kind,
    };
    for action in std::iter::once(begin).chain(actions) {
        let _ = TransactionReducer.reduce(&mut state, action, &env);
    }
    (state, movie_id, customer_id)
}

#[test]
fn begin_records_initial_transaction() {
    let movie_id = MovieId::new();
    let customer_id = CustomerId::new();

    ReducerTest::new(TransactionReducer)
        .with_env(env())
        .given_state(TransactionProgress::default())
        .when_action(TransactionAction::Begin {
            id: TransactionId::new(),
            source: movie_id,
            destination: customer_id,
            kind: RentalKind::Borrow,
        })
        .then_state(move |state| {
            let transaction = state.transaction.as_ref().expect("transaction begun");
            assert_eq!(transaction.state, TransactionState::Initial);
            assert_eq!(transaction.source, movie_id);
            assert_eq!(transaction.destination, customer_id);
            assert_eq!(transaction.created_at, fixtures::epoch());
        })
        .then_effects(|effects| {
            assertions::assert_effects_count(effects, 1);
            assertions::assert_records_state(effects, TransactionState::Initial);
        })
        .run();
}

#[test]
fn complete_releases_markers_then_records_done() {
    let (mut state, movie_id, customer_id) = after(RentalKind::Borrow, vec![TransactionAction::MarkPending]);
    for action in [
        TransactionAction::WriteApplied(AppliedWrite::MovieStock { movie_id, delta: -1 }),
        TransactionAction::MarkApplied,
    ] {
        let _ = TransactionReducer.reduce(&mut state, action, &env());
    }

    ReducerTest::new(TransactionReducer)
        .with_env(env())
        .given_state(state)
        .when_action(TransactionAction::Complete)
        .then_state(|state| {
            assert_eq!(state.state(), Some(TransactionState::Done));
            assert!(state.journal.is_empty());
        })
        .then_effects(move |effects| {
            assert!(matches!(
                assertions::flattened(effects).as_slice(),
                [
                    Effect::ReleasePendingMarkers { movie_id: m, customer_id: c, .. },
                    Effect::RecordTransaction(t),
                ] if *m == movie_id && *c == customer_id && t.state == TransactionState::Done
            ));
        })
        .run();
}

#[test]
fn borrow_failure_compensates_newest_first_with_opposite_sign() {
    let rental_id = RentalId::new();
    let (mut state, movie_id, customer_id) = after(RentalKind::Borrow, vec![TransactionAction::MarkPending]);
    for write in [
        AppliedWrite::MovieStock { movie_id, delta: -1 },
        AppliedWrite::CustomerRentals { customer_id, delta: 1 },
        AppliedWrite::RentalOpened { rental_id },
    ] {
        let _ = TransactionReducer.reduce(&mut state, TransactionAction::WriteApplied(write), &env());
    }

    ReducerTest::new(TransactionReducer)
        .with_env(env())
        .given_state(state)
        .when_action(TransactionAction::Fail {
            reason: "rental insert failed".to_string(),
        })
        .then_state(|state| {
            assert_eq!(state.state(), Some(TransactionState::Canceled));
            assert!(state.journal.is_empty());
        })
        .then_effects(move |effects| {
            assert_eq!(
                assertions::compensations(effects),
                vec![
                    Compensation::DeleteRental { rental_id },
                    Compensation::RestoreCustomerRentals { customer_id, delta: -1 },
                    Compensation::RestoreMovieStock { movie_id, delta: 1 },
                ]
            );
            assert!(matches!(
                assertions::flattened(effects).as_slice(),
                [
                    Effect::Compensate(_),
                    Effect::Compensate(_),
                    Effect::Compensate(_),
                    Effect::ReleasePendingMarkers { .. },
                    Effect::RecordTransaction(t),
                ] if t.state == TransactionState::Canceled
            ));
        })
        .run();
}

#[test]
fn return_failure_restores_with_symmetric_deltas() {
    let (mut state, movie_id, customer_id) = after(RentalKind::Return, vec![TransactionAction::MarkPending]);
    let previous = Rental {
        id: RentalId::new(),
        customer: CustomerSnapshot {
            id: customer_id,
            name: "Ada Lovelace".to_string(),
            phone: "5550000000".to_string(),
        },
        movie: MovieSnapshot {
            id: movie_id,
            title: "Heat".to_string(),
            daily_rental_rate: Money::from_dollars(1),
        },
        date_out: fixtures::epoch(),
        date_returned: None,
        rental_type: RentalKind::Borrow,
        rental_fee: None,
    };
    for write in [
        AppliedWrite::MovieStock { movie_id, delta: 1 },
        AppliedWrite::CustomerRentals { customer_id, delta: -1 },
        AppliedWrite::RentalClosed { previous: previous.clone() },
    ] {
        let _ = TransactionReducer.reduce(&mut state, TransactionAction::WriteApplied(write), &env());
    }

    ReducerTest::new(TransactionReducer)
        .with_env(env())
        .given_state(state)
        .when_action(TransactionAction::Fail {
            reason: "transaction save failed".to_string(),
        })
        .then_effects(move |effects| {
            assert_eq!(
                assertions::compensations(effects),
                vec![
                    Compensation::ReopenRental { previous },
                    Compensation::RestoreCustomerRentals { customer_id, delta: 1 },
                    Compensation::RestoreMovieStock { movie_id, delta: -1 },
                ]
            );
            assertions::assert_releases_markers(effects);
        })
        .run();
}

#[test]
fn applied_transaction_can_still_be_canceled() {
    let (mut state, movie_id, _) = after(RentalKind::Borrow, vec![TransactionAction::MarkPending]);
    let _ = TransactionReducer.reduce(
        &mut state,
        TransactionAction::WriteApplied(AppliedWrite::MovieStock { movie_id, delta: -1 }),
        &env(),
    );
    let _ = TransactionReducer.reduce(&mut state, TransactionAction::MarkApplied, &env());

    ReducerTest::new(TransactionReducer)
        .with_env(env())
        .given_state(state)
        .when_action(TransactionAction::Fail {
            reason: "marker release failed".to_string(),
        })
        .then_state(|state| {
            assert_eq!(state.state(), Some(TransactionState::Canceled));
        })
        .then_effects(move |effects| {
            assert_eq!(
                assertions::compensations(effects),
                vec![Compensation::RestoreMovieStock { movie_id, delta: 1 }]
            );
        })
        .run();
}

#[test]
fn complete_before_applied_is_ignored() {
    let (state, _, _) = after(RentalKind::Borrow, vec![TransactionAction::MarkPending]);

    ReducerTest::new(TransactionReducer)
        .with_env(env())
        .given_state(state)
        .when_action(TransactionAction::Complete)
        .then_state(|state| {
            assert_eq!(state.state(), Some(TransactionState::Pending));
        })
        .then_effects(|effects| {
            assertions::assert_no_effects(effects);
        })
        .run();
}

#[test]
fn mark_applied_from_initial_is_ignored() {
    let (state, _, _) = after(RentalKind::Borrow, Vec::new());

    ReducerTest::new(TransactionReducer)
        .with_env(env())
        .given_state(state)
        .when_action(TransactionAction::MarkApplied)
        .then_state(|state| {
            assert_eq!(state.state(), Some(TransactionState::Initial));
        })
        .then_effects(|effects| {
            assertions::assert_no_effects(effects);
        })
        .run();
}

#[test]
fn done_transactions_cannot_be_canceled() {
    let (state, _, _) = after(
        RentalKind::Borrow,
        vec![
            TransactionAction::MarkPending,
            TransactionAction::MarkApplied,
            TransactionAction::Complete,
        ],
    );

    ReducerTest::new(TransactionReducer)
        .with_env(env())
        .given_state(state)
        .when_action(TransactionAction::Fail {
            reason: "late failure".to_string(),
        })
        .then_state(|state| {
            assert_eq!(state.state(), Some(TransactionState::Done));
        })
        .then_effects(|effects| {
            assertions::assert_no_effects(effects);
        })
        .run();
}

#[test]
fn writes_outside_pending_are_not_journaled() {
    let (state, movie_id, _) = after(RentalKind::Borrow, Vec::new());

    ReducerTest::new(TransactionReducer)
        .with_env(env())
        .given_state(state)
        .when_action(TransactionAction::WriteApplied(AppliedWrite::MovieStock {
            movie_id,
            delta: -1,
        }))
        .then_state(|state| {
            assert!(state.journal.is_empty());
        })
        .then_effects(|effects| {
            assertions::assert_no_effects(effects);
        })
        .run();
}
