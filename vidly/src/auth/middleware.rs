//! Authentication extractors.
//!
//! # Usage
//!
//! ```rust,ignore
//! // Any logged-in user
//! async fn me(CurrentUser(identity): CurrentUser) -> ... { }
//!
//! // Administrators only
//! async fn delete_user(RequireAdmin(identity): RequireAdmin, ...) -> ... { }
//! ```
//!
//! Both read the token from the `x-auth-token` header and resolve it
//! through the [`TokenRegistry`] held in application state.

use super::{AuthError, Identity, TokenRegistry};
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use vidly_web::AppError;

/// Header carrying the session token, on requests and on user creation.
pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// Authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    TokenRegistry: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTH_TOKEN_HEADER)
            .ok_or(AuthError::MissingToken)?
            .to_str()
            .map_err(|_| AuthError::InvalidToken)?;

        let registry = TokenRegistry::from_ref(state);
        let identity = registry.resolve(token.trim()).inspect_err(|_| {
            tracing::debug!(path = %parts.uri.path(), "Rejected unknown or expired token");
        })?;

        Ok(Self(identity))
    }
}

/// Authenticated administrator.
#[derive(Debug, Clone, Copy)]
pub struct RequireAdmin(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for RequireAdmin
where
    TokenRegistry: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(identity) = CurrentUser::from_request_parts(parts, state).await?;

        if !identity.is_admin {
            tracing::warn!(
                user_id = %identity.user_id,
                path = %parts.uri.path(),
                "Non-admin attempted admin operation"
            );
            return Err(AuthError::Forbidden.into());
        }

        Ok(Self(identity))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use std::time::Duration;
    use vidly_testing::fixtures;

    fn registry() -> TokenRegistry {
        TokenRegistry::new(Duration::from_secs(60), Arc::new(vidly_testing::test_clock()))
    }

    fn parts(token: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/genres");
        if let Some(token) = token {
            builder = builder.header(AUTH_TOKEN_HEADER, token);
        }
        builder.body(()).expect("Valid request").into_parts().0
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let err = CurrentUser::from_request_parts(&mut parts(None), &registry())
            .await
            .expect_err("should reject");
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.message(), "Access denied. No token provided.");
    }

    #[tokio::test]
    async fn unknown_token_is_bad_request() {
        let err = CurrentUser::from_request_parts(&mut parts(Some("bogus")), &registry())
            .await
            .expect_err("should reject");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "Invalid token.");
    }

    #[tokio::test]
    async fn issued_token_resolves_to_its_user() {
        let registry = registry();
        let user = fixtures::user("ada@example.com", false);
        let token = registry.issue(&user);

        let CurrentUser(identity) = CurrentUser::from_request_parts(&mut parts(Some(&token)), &registry)
            .await
            .expect("should accept");
        assert_eq!(identity.user_id, user.id);
        assert!(!identity.is_admin);
    }

    #[tokio::test]
    async fn admin_routes_reject_regular_users() {
        let registry = registry();
        let regular = registry.issue(&fixtures::user("grace@example.com", false));
        let admin = registry.issue(&fixtures::user("root@example.com", true));

        let err = RequireAdmin::from_request_parts(&mut parts(Some(&regular)), &registry)
            .await
            .expect_err("should reject");
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let RequireAdmin(identity) = RequireAdmin::from_request_parts(&mut parts(Some(&admin)), &registry)
            .await
            .expect("should accept");
        assert!(identity.is_admin);
    }
}
