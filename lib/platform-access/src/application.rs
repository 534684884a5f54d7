//! The three applications served by one portal deployment.
//!
//! Every request is attributed to exactly one application based on the
//! hostname that received it. The application decides which OIDC client is
//! used, which session cookie is read, and which identity record a login
//! must be linked to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A user-facing application of the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Application {
    /// The customer (service member) application.
    Mil,
    /// The office-staff application.
    Office,
    /// The administrator application.
    Admin,
}

impl Application {
    /// All applications, in a stable order.
    pub const ALL: [Application; 3] = [Application::Mil, Application::Office, Application::Admin];

    /// Returns the short name used in cookie names, logs, and configuration.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mil => "mil",
            Self::Office => "office",
            Self::Admin => "admin",
        }
    }

    /// Name of the cookie that carries this application's session.
    #[must_use]
    pub fn session_cookie_name(&self) -> &'static str {
        match self {
            Self::Mil => "mil_session_token",
            Self::Office => "office_session_token",
            Self::Admin => "admin_session_token",
        }
    }

    /// Name of the cookie that carries the OIDC state hash during login.
    #[must_use]
    pub fn state_cookie_name(&self) -> &'static str {
        match self {
            Self::Mil => "mil_lg_state",
            Self::Office => "office_lg_state",
            Self::Admin => "admin_lg_state",
        }
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps request hostnames to applications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationHosts {
    mil: String,
    office: String,
    admin: String,
}

impl ApplicationHosts {
    #[must_use]
    pub fn new(mil: String, office: String, admin: String) -> Self {
        Self { mil, office, admin }
    }

    /// Returns the configured hostname for an application.
    #[must_use]
    pub fn hostname(&self, application: Application) -> &str {
        match application {
            Application::Mil => &self.mil,
            Application::Office => &self.office,
            Application::Admin => &self.admin,
        }
    }

    /// Resolves the application for a `Host` header value.
    ///
    /// Any port suffix is ignored and the comparison is case-insensitive.
    #[must_use]
    pub fn resolve(&self, host: &str) -> Option<Application> {
        let hostname = strip_port(host);
        Application::ALL
            .into_iter()
            .find(|app| self.hostname(*app).eq_ignore_ascii_case(hostname))
    }
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literals keep their colons.
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    host.split(':').next().unwrap_or(host)
}
