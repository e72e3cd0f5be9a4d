//! Credentials and session tokens.
//!
//! - Passwords are stored as argon2 PHC strings.
//! - Logging in issues an opaque 256-bit token (base64url). Only its SHA-256
//!   digest is kept in the [`TokenRegistry`], together with an expiry.
//! - Handlers require authentication through the [`CurrentUser`] and
//!   [`RequireAdmin`] extractors, which read the `x-auth-token` header.

pub mod middleware;

pub use middleware::{AUTH_TOKEN_HEADER, CurrentUser, RequireAdmin};

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use vidly_core::environment::Clock;
use vidly_core::types::{User, UserId};
use vidly_web::AppError;

/// Authentication failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No token header on a protected route.
    #[error("Access denied. No token provided.")]
    MissingToken,

    /// Token unknown, malformed or expired.
    #[error("Invalid token.")]
    InvalidToken,

    /// Authenticated, but not an administrator.
    #[error("Access denied.")]
    Forbidden,

    /// Login with an unknown email or a wrong password.
    #[error("Invalid email or password.")]
    InvalidCredentials,

    /// The password hasher failed.
    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken => Self::unauthorized(err.to_string()),
            AuthError::InvalidToken | AuthError::InvalidCredentials => {
                Self::bad_request(err.to_string())
            },
            AuthError::Forbidden => Self::forbidden(err.to_string()),
            AuthError::Hashing(_) => {
                Self::internal("An internal error occurred").with_source(err.into())
            },
        }
    }
}

/// Hash `password` with a fresh random salt.
///
/// # Errors
///
/// Returns [`AuthError::Hashing`] if argon2 rejects its input.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::Hashing(err.to_string()))
}

/// Check `password` against a stored PHC string.
///
/// A malformed stored hash counts as a mismatch.
#[must_use]
pub fn verify_password(password: &str, stored: &str) -> bool {
    PasswordHash::new(stored).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

/// Who a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    /// The authenticated user
    pub user_id: UserId,
    /// Admin flag at the time the token was issued
    pub is_admin: bool,
}

#[derive(Debug, Clone, Copy)]
struct IssuedToken {
    identity: Identity,
    expires_at: DateTime<Utc>,
}

/// Server-side record of issued tokens.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct TokenRegistry {
    tokens: Arc<Mutex<HashMap<[u8; 32], IssuedToken>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRegistry")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenRegistry {
    /// Registry whose tokens live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            tokens: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            clock,
        }
    }

    /// Issue a token for `user`.
    ///
    /// The returned string is handed to the client and never stored.
    #[must_use]
    pub fn issue(&self, user: &User) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);

        let now = self.clock.now();
        let expires_at = chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let issued = IssuedToken {
            identity: Identity {
                user_id: user.id,
                is_admin: user.is_admin,
            },
            expires_at,
        };

        let mut tokens = self.lock();
        tokens.retain(|_, t| t.expires_at > now);
        tokens.insert(digest(&token), issued);
        drop(tokens);

        tracing::debug!(user_id = %user.id, "Token issued");
        token
    }

    /// Resolve a presented token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] for unknown or expired tokens.
    pub fn resolve(&self, token: &str) -> Result<Identity, AuthError> {
        let key = digest(token);
        let mut tokens = self.lock();
        match tokens.get(&key) {
            Some(issued) if issued.expires_at > self.clock.now() => Ok(issued.identity),
            Some(_) => {
                tokens.remove(&key);
                Err(AuthError::InvalidToken)
            },
            None => Err(AuthError::InvalidToken),
        }
    }

    /// Drop every token issued to `user_id`.
    pub fn revoke_user(&self, user_id: UserId) {
        self.lock().retain(|_, t| t.identity.user_id != user_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<[u8; 32], IssuedToken>> {
        // A poisoned map is still consistent: every write is a single insert or retain.
        self.tokens
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidly_testing::ManualClock;
    use vidly_testing::fixtures;

    #[test]
    fn password_round_trip() {
        let hash = hash_password("Sup3r$ecret").unwrap_or_default();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("Sup3r$ecret", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("Sup3r$ecret", "not-a-phc-string"));
    }

    #[test]
    fn tokens_resolve_until_they_expire() {
        let clock = ManualClock::new(fixtures::epoch());
        let registry = TokenRegistry::new(Duration::from_secs(60), Arc::new(clock.clone()));
        let user = fixtures::user("ada@example.com", true);

        let token = registry.issue(&user);
        let identity = registry.resolve(&token);
        assert_eq!(
            identity,
            Ok(Identity {
                user_id: user.id,
                is_admin: true
            })
        );
        assert_eq!(registry.resolve("forged"), Err(AuthError::InvalidToken));

        clock.advance(chrono::Duration::seconds(61));
        assert_eq!(registry.resolve(&token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn revoking_a_user_drops_their_tokens() {
        let registry = TokenRegistry::new(Duration::from_secs(60), Arc::new(vidly_testing::test_clock()));
        let user = fixtures::user("grace@example.com", false);
        let token = registry.issue(&user);

        registry.revoke_user(user.id);

        assert_eq!(registry.resolve(&token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn auth_errors_map_to_statuses() {
        use axum::http::StatusCode;
        assert_eq!(AppError::from(AuthError::MissingToken).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::from(AuthError::InvalidToken).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::from(AuthError::Forbidden).status(), StatusCode::FORBIDDEN);
    }
}
