use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use axum_extra::extract::cookie::SignedCookieJar;
use gradreg_config::Config;
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::routes::Message;
use crate::session::Session;

#[derive(Deserialize)]
pub struct LoginPayload {
    pub email: String,
}

/// The identity provider itself is external; this endpoint only gates the
/// institutional mail domain and issues the signed session cookie.
pub async fn login(
    State(config): State<Arc<Config>>,
    session: Session,
    Json(payload): Json<LoginPayload>,
) -> Result<(SignedCookieJar, Json<Message>), AppError> {
    let email = payload.email.trim().to_lowercase();
    if !domain_allowed(&email, &config.auth.email_domain) {
        return Err(AppError::EmailDomainNotAllowed(
            config.auth.email_domain.clone(),
        ));
    }
    info!(%email, "login");
    Ok((
        session.log_in(email),
        Json(Message {
            message: "Signed in.".to_owned(),
        }),
    ))
}

pub async fn logout(session: Session) -> (SignedCookieJar, Json<Message>) {
    (
        session.log_out(),
        Json(Message {
            message: "Signed out.".to_owned(),
        }),
    )
}

/// Accepts the configured domain and any subdomain of it.
fn domain_allowed(email: &str, allowed: &str) -> bool {
    let Some((local_part, domain)) = email.rsplit_once('@') else {
        return false;
    };
    if local_part.is_empty() {
        return false;
    }
    let domain = domain.to_ascii_lowercase();
    let allowed = allowed.to_ascii_lowercase();
    domain == allowed || domain.ends_with(&format!(".{allowed}"))
}

#[cfg(test)]
mod tests {
    use crate::routes::login::domain_allowed;

    #[test]
    fn institutional_domain_and_subdomains_are_accepted() {
        assert!(domain_allowed("b1234567@example.edu", "example.edu"));
        assert!(domain_allowed("b1234567@student.example.edu", "example.edu"));
    }

    #[test]
    fn foreign_domains_are_rejected() {
        assert!(!domain_allowed("b1234567@gmail.com", "example.edu"));
        // a suffix without the dot boundary must not pass
        assert!(!domain_allowed("b1234567@evilexample.edu", "example.edu"));
        assert!(!domain_allowed("no-at-sign", "example.edu"));
        assert!(!domain_allowed("@example.edu", "example.edu"));
    }
}
