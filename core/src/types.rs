//! Domain types for the Vidly rental service.
//!
//! This module contains identifiers, value objects, and the records the
//! rental workflow reads and writes: genres, movies, customers, users,
//! rentals and transactions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum number of movies a customer may have out at once.
pub const MAX_RENTALS_PER_CUSTOMER: u32 = 10;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a genre
    GenreId
);
define_id!(
    /// Unique identifier for a movie
    MovieId
);
define_id!(
    /// Unique identifier for a customer
    CustomerId
);
define_id!(
    /// Unique identifier for a user account
    UserId
);
define_id!(
    /// Unique identifier for a rental record
    RentalId
);
define_id!(
    /// Unique identifier for one workflow attempt
    TransactionId
);

// ============================================================================
// Value Objects
// ============================================================================

/// Money amount in cents.
///
/// Whole cents avoid floating point drift when fees are multiplied out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Create from cents
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Create from whole dollars
    #[must_use]
    pub const fn from_dollars(dollars: i64) -> Self {
        Self(dollars.saturating_mul(100))
    }

    /// Amount in cents
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Multiply by a whole number of units, saturating on overflow
    #[must_use]
    pub const fn times(self, units: i64) -> Self {
        Self(self.0.saturating_mul(units))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}

/// Whether a rental request takes a movie out or brings it back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RentalKind {
    /// Take a copy out of stock
    Borrow,
    /// Bring a copy back
    Return,
}

impl RentalKind {
    /// Lowercase wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Borrow => "borrow",
            Self::Return => "return",
        }
    }
}

impl fmt::Display for RentalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RentalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "borrow" => Ok(Self::Borrow),
            "return" => Ok(Self::Return),
            other => Err(format!("unknown rental type '{other}'")),
        }
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// A movie genre
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    /// Genre ID
    pub id: GenreId,
    /// Display name
    pub name: String,
}

/// Genre as embedded in a movie record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreSnapshot {
    /// Genre ID
    pub id: GenreId,
    /// Genre name at the time the movie was saved
    pub name: String,
}

impl From<&Genre> for GenreSnapshot {
    fn from(genre: &Genre) -> Self {
        Self {
            id: genre.id,
            name: genre.name.clone(),
        }
    }
}

/// A movie in the catalog
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    /// Movie ID
    pub id: MovieId,
    /// Title
    pub title: String,
    /// Genre
    pub genre: GenreSnapshot,
    /// Copies on the shelf, never negative
    pub number_in_stock: u32,
    /// Price per day of rental
    pub daily_rental_rate: Money,
    /// Transactions currently touching this movie, empty at rest
    #[serde(default)]
    pub pending_transactions: Vec<TransactionId>,
}

impl Movie {
    /// Whether at least one copy is on the shelf
    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.number_in_stock > 0
    }
}

// ============================================================================
// People
// ============================================================================

/// A store customer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Customer ID
    pub id: CustomerId,
    /// Full name
    pub name: String,
    /// Ten digit phone number
    pub phone: String,
    /// Gold membership
    #[serde(default)]
    pub is_gold: bool,
    /// Movies currently out, within `0..=MAX_RENTALS_PER_CUSTOMER`
    #[serde(default)]
    pub number_of_movies_rented: u32,
    /// Transactions currently touching this customer, empty at rest
    #[serde(default)]
    pub pending_transactions: Vec<TransactionId>,
}

impl Customer {
    /// Whether the customer has reached the rental cap
    #[must_use]
    pub const fn at_rental_limit(&self) -> bool {
        self.number_of_movies_rented >= MAX_RENTALS_PER_CUSTOMER
    }
}

/// A user account allowed to call the API
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User ID
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Login email, unique
    pub email: String,
    /// Argon2 PHC string
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Administrator flag
    #[serde(default)]
    pub is_admin: bool,
}

// ============================================================================
// Rentals
// ============================================================================

/// Customer details copied into a rental when it is created
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerSnapshot {
    /// Customer ID (normalized reference)
    pub id: CustomerId,
    /// Name at checkout
    pub name: String,
    /// Phone at checkout
    pub phone: String,
}

impl From<&Customer> for CustomerSnapshot {
    fn from(customer: &Customer) -> Self {
        Self {
            id: customer.id,
            name: customer.name.clone(),
            phone: customer.phone.clone(),
        }
    }
}

/// Movie details copied into a rental when it is created
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieSnapshot {
    /// Movie ID (normalized reference)
    pub id: MovieId,
    /// Title at checkout
    pub title: String,
    /// Daily rate at checkout; the return fee uses this rate
    pub daily_rental_rate: Money,
}

impl From<&Movie> for MovieSnapshot {
    fn from(movie: &Movie) -> Self {
        Self {
            id: movie.id,
            title: movie.title.clone(),
            daily_rental_rate: movie.daily_rental_rate,
        }
    }
}

/// One borrow, later closed by a return
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rental {
    /// Rental ID
    pub id: RentalId,
    /// Customer at checkout
    pub customer: CustomerSnapshot,
    /// Movie at checkout
    pub movie: MovieSnapshot,
    /// When the copy went out
    pub date_out: DateTime<Utc>,
    /// When the copy came back
    pub date_returned: Option<DateTime<Utc>>,
    /// `borrow` while active, `return` once closed
    pub rental_type: RentalKind,
    /// Fee charged at return
    pub rental_fee: Option<Money>,
}

impl Rental {
    /// Open a new rental at `date_out`
    #[must_use]
    pub fn open(id: RentalId, customer: &Customer, movie: &Movie, date_out: DateTime<Utc>) -> Self {
        Self {
            id,
            customer: CustomerSnapshot::from(customer),
            movie: MovieSnapshot::from(movie),
            date_out,
            date_returned: None,
            rental_type: RentalKind::Borrow,
            rental_fee: None,
        }
    }

    /// Active means borrowed and not yet returned
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.rental_type, RentalKind::Borrow) && self.date_returned.is_none()
    }
}

// ============================================================================
// Transactions
// ============================================================================

/// Lifecycle of one workflow attempt.
///
/// ```text
/// initial → pending → applied → done
///    └─────────┴─────────┴──→ canceled
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionState {
    /// Record created, nothing written yet
    Initial,
    /// Writes in flight
    Pending,
    /// All writes landed
    Applied,
    /// Markers released, terminal
    Done,
    /// Rolled back, terminal
    Canceled,
}

impl TransactionState {
    /// Whether moving to `next` respects the lifecycle
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Initial, Self::Pending)
                | (Self::Pending, Self::Applied)
                | (Self::Applied, Self::Done)
                | (Self::Initial | Self::Pending | Self::Applied, Self::Canceled)
        )
    }

    /// `done` or `canceled`
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Canceled)
    }

    /// Lowercase wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Pending => "pending",
            Self::Applied => "applied",
            Self::Done => "done",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(Self::Initial),
            "pending" => Ok(Self::Pending),
            "applied" => Ok(Self::Applied),
            "done" => Ok(Self::Done),
            "canceled" => Ok(Self::Canceled),
            other => Err(format!("unknown transaction state '{other}'")),
        }
    }
}

/// Record of one borrow or return attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction ID
    pub id: TransactionId,
    /// Movie the copy moves from or to
    pub source: MovieId,
    /// Customer on the other end
    pub destination: CustomerId,
    /// Current lifecycle state
    pub state: TransactionState,
    /// Borrow or return
    pub transaction_type: RentalKind,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last state change
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_display() {
        assert_eq!(Money::from_cents(1450).to_string(), "$14.50");
        assert_eq!(Money::from_cents(-5).to_string(), "-$0.05");
        assert_eq!(Money::from_dollars(2).times(7), Money::from_dollars(14));
    }

    #[test]
    fn transaction_lifecycle_is_monotonic() {
        use TransactionState::{Applied, Canceled, Done, Initial, Pending};

        assert!(Initial.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Applied));
        assert!(Applied.can_transition_to(Done));
        assert!(Pending.can_transition_to(Canceled));
        assert!(Initial.can_transition_to(Canceled));

        assert!(!Pending.can_transition_to(Initial));
        assert!(!Initial.can_transition_to(Applied));
        assert!(!Done.can_transition_to(Canceled));
        assert!(!Canceled.can_transition_to(Pending));
    }

    #[test]
    fn rental_kind_round_trips_through_str() {
        assert_eq!("borrow".parse::<RentalKind>(), Ok(RentalKind::Borrow));
        assert_eq!(RentalKind::Return.to_string(), "return");
        assert!("lend".parse::<RentalKind>().is_err());
    }

    #[test]
    fn ids_parse_from_strings() {
        let id = MovieId::new();
        let parsed: MovieId = id.to_string().parse().unwrap_or_default();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<MovieId>().is_err());
    }

    #[test]
    fn serialized_names_match_wire_format() {
        let json = serde_json::to_string(&TransactionState::Canceled).unwrap_or_default();
        assert_eq!(json, "\"canceled\"");
        let json = serde_json::to_string(&RentalKind::Borrow).unwrap_or_default();
        assert_eq!(json, "\"borrow\"");
    }
}
