use core::fmt::{Debug, Display};

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

/// Gate for the login endpoint and the admin routes.
#[derive(Deserialize, Clone)]
pub struct AuthConfig {
    /// Institutional mail domain. Logins are accepted for this domain and any
    /// subdomain of it.
    pub email_domain: String,
    /// Shared secret expected in the `x-admin-token` header of admin routes.
    pub admin_token: String,
    /// Secret the session cookies are signed with. Sessions survive restarts
    /// as long as this stays the same; at least 32 bytes.
    pub cookie_key: String,
}

#[derive(Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory uploaded portraits are written to.
    pub root: String,
    /// URL prefix under which the storage root is served, without trailing
    /// slash (for example `http://localhost:3000/media`).
    pub public_base: String,
}

#[derive(Deserialize, Clone)]
pub struct VisionConfig {
    /// Base URL of the face-detection service, without trailing slash.
    pub base_url: String,
    #[serde(default = "default_vision_timeout_ms")]
    pub timeout_ms: u64,
}

const fn default_vision_timeout_ms() -> u64 {
    10_000
}

#[derive(Deserialize, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub database_url: String,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub vision: VisionConfig,
}

#[derive(thiserror::Error)]
pub enum ConfigError {
    #[error("config error: {0}")]
    Extract(#[from] figment::Error),
}

impl Debug for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

pub fn get_config() -> Result<Config, ConfigError> {
    Ok(Figment::new()
        .merge(Toml::file("gradreg.toml"))
        .merge(Env::prefixed("GRADREG_").split("__"))
        .extract()?)
}

#[cfg(test)]
mod tests {
    use figment::providers::{Format, Toml};
    use figment::Figment;

    use crate::Config;

    #[test]
    fn full_config_extracts() {
        let config: Config = Figment::new()
            .merge(Toml::string(
                r#"
                listen_addr = "127.0.0.1:3000"
                database_url = "postgres://localhost/gradreg"

                [auth]
                email_domain = "student.example.edu"
                admin_token = "hunter2"
                cookie_key = "0123456789abcdef0123456789abcdef"

                [storage]
                root = "/var/lib/gradreg/media"
                public_base = "http://localhost:3000/media"

                [vision]
                base_url = "http://localhost:8089"
                "#,
            ))
            .extract()
            .unwrap();
        assert_eq!(config.auth.email_domain, "student.example.edu");
        assert_eq!(config.vision.timeout_ms, 10_000);
    }

    #[test]
    fn missing_section_is_an_error() {
        let result: Result<Config, _> = Figment::new()
            .merge(Toml::string(r#"listen_addr = "127.0.0.1:3000""#))
            .extract();
        assert!(result.is_err());
    }
}
