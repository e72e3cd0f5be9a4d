//! Rental business rules.
//!
//! The workflow reads customer, movie and active rental one at a time and runs
//! the matching check after each read, so the first failing rule decides the
//! error:
//!
//! 1. customer exists
//! 2. return: customer has something rented
//! 3. borrow: customer is under the cap
//! 4. movie exists
//! 5. active rental lookup
//! 6. borrow: no active rental for the pair
//! 7. return: an active rental exists for the pair
//! 8. borrow: movie in stock
//!
//! Once every rule passes, [`plan`] turns the request into the ordered writes.

use crate::error::RentalError;
use crate::fee::close_rental;
use crate::types::{
    Customer, CustomerId, MAX_RENTALS_PER_CUSTOMER, Movie, MovieId, Rental, RentalId, RentalKind,
};
use chrono::{DateTime, Utc};

/// Rule 1: the customer must exist.
///
/// # Errors
///
/// [`RentalError::CustomerNotFound`] when `customer` is `None`.
pub fn require_customer(
    customer_id: CustomerId,
    customer: Option<Customer>,
) -> Result<Customer, RentalError> {
    customer.ok_or(RentalError::CustomerNotFound { customer_id })
}

/// Rules 2 and 3: the customer's rented count allows the request.
///
/// # Errors
///
/// [`RentalError::NothingToReturn`] or [`RentalError::RentalLimitExceeded`].
pub fn check_customer(intent: RentalKind, customer: &Customer) -> Result<(), RentalError> {
    match intent {
        RentalKind::Return if customer.number_of_movies_rented == 0 => {
            Err(RentalError::NothingToReturn {
                customer: customer.name.clone(),
            })
        },
        RentalKind::Borrow if customer.at_rental_limit() => Err(RentalError::RentalLimitExceeded {
            customer: customer.name.clone(),
            limit: MAX_RENTALS_PER_CUSTOMER,
        }),
        _ => Ok(()),
    }
}

/// Rule 4: the movie must exist.
///
/// # Errors
///
/// [`RentalError::MovieNotFound`] when `movie` is `None`.
pub fn require_movie(movie_id: MovieId, movie: Option<Movie>) -> Result<Movie, RentalError> {
    movie.ok_or(RentalError::MovieNotFound { movie_id })
}

/// Rules 6 to 8, given the result of the active rental lookup (rule 5).
///
/// Returns the active rental for a return.
///
/// # Errors
///
/// [`RentalError::AlreadyBorrowed`], [`RentalError::NotBorrowed`] or
/// [`RentalError::OutOfStock`].
pub fn check_rental(
    intent: RentalKind,
    customer: &Customer,
    movie: &Movie,
    active: Option<Rental>,
) -> Result<Option<Rental>, RentalError> {
    match (intent, active) {
        (RentalKind::Borrow, Some(existing)) => Err(RentalError::AlreadyBorrowed {
            customer: customer.name.clone(),
            title: movie.title.clone(),
            date_out: existing.date_out,
        }),
        (RentalKind::Return, None) => Err(RentalError::NotBorrowed {
            customer: customer.name.clone(),
            title: movie.title.clone(),
        }),
        (RentalKind::Borrow, None) if !movie.in_stock() => Err(RentalError::OutOfStock {
            title: movie.title.clone(),
        }),
        (RentalKind::Borrow, None) => Ok(None),
        (RentalKind::Return, Some(existing)) => Ok(Some(existing)),
    }
}

/// What happens to the rental ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RentalWrite {
    /// Insert a new active rental.
    Open(Rental),
    /// Replace the active rental with its closed form; `previous` is kept for rollback.
    Close {
        /// The rental as it was before the return
        previous: Rental,
        /// The rental with return date, fee and `return` marker
        closed: Rental,
    },
}

impl RentalWrite {
    /// The rental as it will look once written.
    #[must_use]
    pub const fn rental(&self) -> &Rental {
        match self {
            Self::Open(rental) | Self::Close { closed: rental, .. } => rental,
        }
    }
}

/// The ordered writes of one approved request: movie, customer, rental.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RentalPlan {
    /// Borrow or return
    pub intent: RentalKind,
    /// Movie whose stock moves
    pub movie_id: MovieId,
    /// Change to the movie's stock
    pub stock_delta: i32,
    /// Customer whose count moves
    pub customer_id: CustomerId,
    /// Change to the customer's rented count
    pub rented_delta: i32,
    /// Ledger write
    pub rental: RentalWrite,
}

/// Build the write plan for an approved request.
///
/// `active` must be the result of [`check_rental`]; `now` becomes the checkout
/// or return timestamp.
#[must_use]
pub fn plan(
    intent: RentalKind,
    customer: &Customer,
    movie: &Movie,
    active: Option<Rental>,
    rental_id: RentalId,
    now: DateTime<Utc>,
) -> RentalPlan {
    let (stock_delta, rented_delta, rental) = match active {
        Some(previous) => {
            let mut closed = previous.clone();
            close_rental(&mut closed, now);
            (1, -1, RentalWrite::Close { previous, closed })
        },
        None => (
            -1,
            1,
            RentalWrite::Open(Rental::open(rental_id, customer, movie, now)),
        ),
    };

    RentalPlan {
        intent,
        movie_id: movie.id,
        stock_delta,
        customer_id: customer.id,
        rented_delta,
        rental,
    }
}
