//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables. Nested keys use
//! `__` as the separator, e.g. `LOGIN_GOV__HOSTNAME` or `SESSION__SECRET`.
//!
//! See [`LoginGovConfig`](portal_platform_access::LoginGovConfig) for the
//! identity provider settings.

use portal_platform_access::{ApplicationHosts, LoginGovConfig};
use serde::Deserialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Minimum length of the session signing secret.
pub const MIN_SESSION_SECRET_BYTES: usize = 32;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Session cookie configuration.
    pub session: SessionConfig,

    /// Login.gov configuration.
    pub login_gov: LoginGovConfig,

    /// Hostname of each application.
    pub hosts: ApplicationHosts,

    /// Listener configuration.
    #[serde(default)]
    pub listen: ListenConfig,
}

/// Session-related configuration.
#[derive(Clone, Deserialize)]
pub struct SessionConfig {
    /// Secret the session cookie signing key is derived from.
    pub secret: String,

    /// Session lifetime in minutes.
    #[serde(default = "default_session_expiry_minutes")]
    pub expiry_minutes: i64,

    /// Disables session expiry. Local development only.
    #[serde(default)]
    pub no_session_timeout: bool,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Defaults to true for production safety; set to false for local HTTP development.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"<redacted>")
            .field("expiry_minutes", &self.expiry_minutes)
            .field("no_session_timeout", &self.no_session_timeout)
            .field("secure_cookies", &self.secure_cookies)
            .finish()
    }
}

fn default_session_expiry_minutes() -> i64 {
    15
}

fn default_secure_cookies() -> bool {
    true
}

/// Where the server listens.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_interface")]
    pub interface: IpAddr,

    /// Port of the browser-facing listener.
    #[serde(default = "default_port")]
    pub port: u16,

    /// The mutual-TLS listener, if enabled.
    #[serde(default)]
    pub mutual_tls: Option<MutualTlsConfig>,
}

fn default_interface() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            port: default_port(),
            mutual_tls: None,
        }
    }
}

impl ListenConfig {
    pub fn web_addr(&self) -> SocketAddr {
        SocketAddr::new(self.interface, self.port)
    }
}

/// The mutual-TLS listener.
#[derive(Debug, Clone, Deserialize)]
pub struct MutualTlsConfig {
    pub port: u16,
    /// PEM certificate chain presented by the server.
    pub cert_path: PathBuf,
    /// PEM private key of the server certificate.
    pub key_path: PathBuf,
    /// PEM bundle of CAs client certificates must chain to.
    pub client_ca_path: PathBuf,
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let config: Self = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks constraints serde cannot express.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.session.secret.len() < MIN_SESSION_SECRET_BYTES {
            return Err(config::ConfigError::Message(format!(
                "session.secret must be at least {MIN_SESSION_SECRET_BYTES} bytes"
            )));
        }
        if self.session.expiry_minutes <= 0 {
            return Err(config::ConfigError::Message(
                "session.expiry_minutes must be positive".to_string(),
            ));
        }
        if self.session.no_session_timeout {
            tracing::warn!("session timeout is disabled; never do this outside local development");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_platform_access::Application;
    use serde_json::json;

    fn minimal(secret: &str) -> serde_json::Value {
        json!({
            "database_url": "postgres://localhost/portal",
            "session": { "secret": secret },
            "login_gov": {
                "hostname": "idp.example.gov",
                "secret_key": "pem",
                "my_client_id": "mil",
                "office_client_id": "office",
                "admin_client_id": "admin"
            },
            "hosts": {
                "mil": "milmovelocal",
                "office": "officelocal",
                "admin": "adminlocal"
            }
        })
    }

    #[test]
    fn session_config_has_correct_defaults() {
        let config: ServerConfig =
            serde_json::from_value(minimal(&"s".repeat(32))).expect("deserialize");
        assert_eq!(config.session.expiry_minutes, 15);
        assert!(!config.session.no_session_timeout);
        assert!(config.session.secure_cookies);
        assert_eq!(config.listen.port, 8080);
        assert!(config.listen.mutual_tls.is_none());
        assert_eq!(config.hosts.resolve("officelocal"), Some(Application::Office));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn short_session_secret_is_rejected() {
        let config: ServerConfig =
            serde_json::from_value(minimal("too-short")).expect("deserialize");
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let secret = "s".repeat(48);
        let config: ServerConfig =
            serde_json::from_value(minimal(&secret)).expect("deserialize");
        let printed = format!("{config:?}");
        assert!(!printed.contains(&secret));
        assert!(printed.contains("expiry_minutes: 15"));
    }

    #[test]
    fn mutual_tls_listener_is_optional() {
        let mut value = minimal(&"s".repeat(40));
        value["listen"] = json!({
            "port": 9443,
            "mutual_tls": {
                "port": 9444,
                "cert_path": "/etc/portal/server.pem",
                "key_path": "/etc/portal/server.key",
                "client_ca_path": "/etc/portal/clients.pem"
            }
        });
        let config: ServerConfig = serde_json::from_value(value).expect("deserialize");
        let mtls = config.listen.mutual_tls.as_ref().expect("mutual tls");
        assert_eq!(mtls.port, 9444);
        assert_eq!(config.listen.web_addr().port(), 9443);
    }
}
