use core::convert::Infallible;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, Key, SignedCookieJar};
use gradreg_config::Config;

use crate::error::AppError;

const COOKIE_NAME_IDENTITY: &str = "__Host_gradreg_identity";

/// Derives the cookie-signing key from the configured secret. A stable
/// secret keeps sessions valid across restarts.
pub fn signing_key(secret: &str) -> Result<Key, AppError> {
    // Key::derive_from panics below this
    if secret.len() < 32 {
        return Err(AppError::WeakCookieKey);
    }
    Ok(Key::derive_from(secret.as_bytes()))
}

/// The signed-cookie session. Holds the authenticated identity (the
/// institutional email address) once the caller has logged in.
#[must_use]
pub struct Session {
    jar: SignedCookieJar,
    identity: Option<String>,
}

impl Session {
    /// The Session Guard: every registration call starts here.
    pub fn identity(&self) -> Result<&str, AppError> {
        self.identity.as_deref().ok_or(AppError::Unauthenticated)
    }

    pub fn log_in(self, email: String) -> SignedCookieJar {
        let cookie = Cookie::build((COOKIE_NAME_IDENTITY, email))
            .path("/")
            .http_only(true)
            .build();
        self.jar.add(cookie)
    }

    pub fn log_out(self) -> SignedCookieJar {
        self.jar
            .remove(Cookie::build(COOKIE_NAME_IDENTITY).path("/").build())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
    Key: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = SignedCookieJar::from_request_parts(parts, state).await?;
        let identity = jar
            .get(COOKIE_NAME_IDENTITY)
            .map(|cookie| cookie.value().to_owned());
        Ok(Self { jar, identity })
    }
}

/// Marker extractor gating the admin routes on the configured shared token.
pub struct AdminToken;

#[async_trait]
impl<S> FromRequestParts<S> for AdminToken
where
    S: Send + Sync,
    Arc<Config>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = Arc::<Config>::from_ref(state);
        let provided = parts
            .headers
            .get("x-admin-token")
            .and_then(|value| value.to_str().ok());
        if provided == Some(config.auth.admin_token.as_str()) {
            Ok(Self)
        } else {
            Err(AppError::AdminForbidden)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::session::signing_key;

    #[test]
    fn same_secret_derives_the_same_key() {
        let secret = "0123456789abcdef0123456789abcdef";
        assert_eq!(
            signing_key(secret).unwrap().master(),
            signing_key(secret).unwrap().master()
        );
    }

    #[test]
    fn short_secrets_are_refused() {
        assert!(signing_key("too short").is_err());
        assert!(signing_key("").is_err());
    }
}
