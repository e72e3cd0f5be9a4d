//! Return fee calculator.
//!
//! `fee = whole days elapsed × daily rate`. Partial days are not charged, so a
//! same-day return costs nothing.

use crate::types::{Money, Rental, RentalKind};
use chrono::{DateTime, Utc};

/// Whole days between checkout and return, truncated toward zero.
///
/// A return timestamp earlier than the checkout (clock skew) counts as zero days.
#[must_use]
pub fn days_elapsed(date_out: DateTime<Utc>, returned_at: DateTime<Utc>) -> i64 {
    (returned_at - date_out).num_days().max(0)
}

/// Fee owed for a rental that went out at `date_out` and came back at `returned_at`.
#[must_use]
pub fn rental_fee(date_out: DateTime<Utc>, returned_at: DateTime<Utc>, daily_rate: Money) -> Money {
    daily_rate.times(days_elapsed(date_out, returned_at))
}

/// Close an active rental in place: stamp the return time, compute the fee
/// from the rate captured at checkout, and flip the marker to `return`.
pub fn close_rental(rental: &mut Rental, returned_at: DateTime<Utc>) {
    rental.date_returned = Some(returned_at);
    rental.rental_fee = Some(rental_fee(
        rental.date_out,
        returned_at,
        rental.movie.daily_rental_rate,
    ));
    rental.rental_type = RentalKind::Return;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn day_zero() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 9, 30, 0)
            .single()
            .unwrap_or_default()
    }

    #[test]
    fn seven_days_at_two_dollars_costs_fourteen() {
        let out = day_zero();
        let back = out + Duration::days(7);
        assert_eq!(rental_fee(out, back, Money::from_dollars(2)), Money::from_dollars(14));
    }

    #[test]
    fn same_day_return_is_free() {
        let out = day_zero();
        let back = out + Duration::hours(23) + Duration::minutes(59);
        assert_eq!(days_elapsed(out, back), 0);
        assert_eq!(rental_fee(out, back, Money::from_dollars(3)), Money::ZERO);
    }

    #[test]
    fn partial_days_are_truncated() {
        let out = day_zero();
        let back = out + Duration::days(2) + Duration::hours(20);
        assert_eq!(days_elapsed(out, back), 2);
    }

    #[test]
    fn return_before_checkout_counts_as_zero_days() {
        let out = day_zero();
        assert_eq!(days_elapsed(out, out - Duration::days(1)), 0);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn fee_is_whole_days_times_rate(
                days in 0i64..3650,
                extra_minutes in 0i64..1440,
                rate_cents in 0i64..=25_500,
            ) {
                let out = day_zero();
                let back = out + Duration::days(days) + Duration::minutes(extra_minutes);
                let fee = rental_fee(out, back, Money::from_cents(rate_cents));
                prop_assert_eq!(fee.cents(), days * rate_cents);
            }
        }
    }
}
