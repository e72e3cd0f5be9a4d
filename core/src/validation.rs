//! Input validation for records coming in over the API.

use crate::types::Money;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static WORDS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]+( [A-Za-z]+)*$").ok());
static TWO_OR_MORE_WORDS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]+( [A-Za-z]+)+$").ok());
static PHONE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^\d{10}$").ok());
static EMAIL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// Largest stock a movie may carry.
pub const MAX_STOCK: u32 = 255;

/// Largest daily rate, in cents.
pub const MAX_DAILY_RATE: Money = Money::from_dollars(255);

/// A field failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("\"{field}\" {message}")]
pub struct ValidationError {
    /// Offending field
    pub field: &'static str,
    /// What is wrong with it
    pub message: String,
}

impl ValidationError {
    /// Create a validation error.
    #[must_use]
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

fn matches(pattern: &LazyLock<Option<Regex>>, value: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(value))
}

fn length(field: &'static str, value: &str, min: usize, max: usize) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len < min {
        return Err(ValidationError::new(
            field,
            format!("length must be at least {min} characters long"),
        ));
    }
    if len > max {
        return Err(ValidationError::new(
            field,
            format!("length must be less than or equal to {max} characters long"),
        ));
    }
    Ok(())
}

/// Genre names: 5 to 50 letters, words separated by single spaces.
///
/// # Errors
///
/// Returns the first rule the name breaks.
pub fn genre_name(name: &str) -> Result<(), ValidationError> {
    length("name", name, 5, 50)?;
    if !matches(&WORDS, name) {
        return Err(ValidationError::new(
            "name",
            "must contain only letters, with single spaces between words",
        ));
    }
    Ok(())
}

/// Movie titles: 2 to 50 characters.
///
/// # Errors
///
/// Returns the first rule the title breaks.
pub fn movie_title(title: &str) -> Result<(), ValidationError> {
    if title.trim() != title {
        return Err(ValidationError::new("title", "must not start or end with spaces"));
    }
    length("title", title, 2, 50)
}

/// Stock between 0 and [`MAX_STOCK`].
///
/// # Errors
///
/// Fails above the maximum.
pub fn stock(number_in_stock: u32) -> Result<(), ValidationError> {
    if number_in_stock > MAX_STOCK {
        return Err(ValidationError::new(
            "number_in_stock",
            format!("must be less than or equal to {MAX_STOCK}"),
        ));
    }
    Ok(())
}

/// Daily rate between zero and [`MAX_DAILY_RATE`].
///
/// # Errors
///
/// Fails when negative or above the maximum.
pub fn daily_rate(rate: Money) -> Result<(), ValidationError> {
    if rate < Money::ZERO {
        return Err(ValidationError::new("daily_rental_rate", "must not be negative"));
    }
    if rate > MAX_DAILY_RATE {
        return Err(ValidationError::new(
            "daily_rental_rate",
            format!("must be less than or equal to {MAX_DAILY_RATE}"),
        ));
    }
    Ok(())
}

/// Customer names: 4 to 50 letters, at least two words, single spaces.
///
/// # Errors
///
/// Returns the first rule the name breaks.
pub fn customer_name(name: &str) -> Result<(), ValidationError> {
    length("name", name, 4, 50)?;
    if !matches(&TWO_OR_MORE_WORDS, name) {
        return Err(ValidationError::new(
            "name",
            "must be at least two words of letters separated by single spaces",
        ));
    }
    Ok(())
}

/// Phone numbers: exactly ten digits.
///
/// # Errors
///
/// Fails on anything else.
pub fn phone(phone: &str) -> Result<(), ValidationError> {
    if !matches(&PHONE, phone) {
        return Err(ValidationError::new("phone", "must be exactly 10 digits"));
    }
    Ok(())
}

/// User display names: 2 to 50 characters.
///
/// # Errors
///
/// Returns the first rule the name breaks.
pub fn user_name(name: &str) -> Result<(), ValidationError> {
    length("name", name.trim(), 2, 50)
}

/// Email addresses: 5 to 255 characters, `local@domain.tld`.
///
/// # Errors
///
/// Returns the first rule the address breaks.
pub fn email(email: &str) -> Result<(), ValidationError> {
    length("email", email, 5, 255)?;
    if !matches(&EMAIL, email) {
        return Err(ValidationError::new("email", "must be a valid email"));
    }
    Ok(())
}

/// Passwords: 8 to 255 characters with a lowercase letter, an uppercase
/// letter, a digit and a symbol.
///
/// # Errors
///
/// Returns the first rule the password breaks.
pub fn password(password: &str) -> Result<(), ValidationError> {
    length("password", password, 8, 255)?;
    let checks: [(fn(&char) -> bool, &str); 4] = [
        (char::is_ascii_lowercase, "a lowercase letter"),
        (char::is_ascii_uppercase, "an uppercase letter"),
        (char::is_ascii_digit, "a digit"),
        (|c: &char| !c.is_alphanumeric() && !c.is_whitespace(), "a symbol"),
    ];
    for (check, what) in checks {
        if !password.chars().any(|c| check(&c)) {
            return Err(ValidationError::new("password", format!("must contain {what}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genre_names() {
        assert!(genre_name("Action").is_ok());
        assert!(genre_name("Science Fiction").is_ok());
        assert!(genre_name("War").is_err());
        assert!(genre_name("Sci  Fi Films").is_err());
        assert!(genre_name("Horror 2").is_err());
    }

    #[test]
    fn customer_names_need_two_words() {
        assert!(customer_name("Ada Lovelace").is_ok());
        assert!(customer_name("Ada").is_err());
        assert!(customer_name("Adaline").is_err());
        assert!(customer_name(" Ada Lovelace").is_err());
    }

    #[test]
    fn phones_are_ten_digits() {
        assert!(phone("0123456789").is_ok());
        assert!(phone("012345678").is_err());
        assert!(phone("01234-6789").is_err());
    }

    #[test]
    fn password_complexity() {
        assert!(password("Sup3r$ecret").is_ok());
        let err = password("sup3r$ecret").err();
        assert_eq!(
            err.map(|e| e.message),
            Some("must contain an uppercase letter".to_string())
        );
        assert!(password("Sh0rt!").is_err());
        assert!(password("NoSymbols123").is_err());
    }

    #[test]
    fn email_shape() {
        assert!(email("ada@example.com").is_ok());
        assert!(email("ada.example.com").is_err());
        assert!(email("a@b").is_err());
    }

    #[test]
    fn rates_and_stock() {
        assert!(daily_rate(Money::from_cents(250)).is_ok());
        assert!(daily_rate(Money::from_cents(-1)).is_err());
        assert!(daily_rate(Money::from_dollars(256)).is_err());
        assert!(stock(255).is_ok());
        assert!(stock(256).is_err());
    }

    #[test]
    fn error_message_names_field() {
        let err = movie_title("A").err().map(|e| e.to_string());
        assert_eq!(
            err.as_deref(),
            Some("\"title\" length must be at least 2 characters long")
        );
    }
}
