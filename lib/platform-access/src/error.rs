//! Error types for the platform-access crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `StoreError`: persistence failures reported by a store implementation
//! - `AuthorizationError`: outcomes of the login authorization decision
//! - `CertError`: rejections of a mutual-TLS client certificate

use crate::application::Application;
use portal_core::UserId;
use std::fmt;

/// Errors reported by persistence collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The query itself failed.
    Query { details: String },
    /// A stored row could not be turned into a domain value.
    Decode { details: String },
    /// A row that must exist was missing.
    Inconsistent { details: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query { details } => write!(f, "store query failed: {details}"),
            Self::Decode { details } => write!(f, "failed to decode stored row: {details}"),
            Self::Inconsistent { details } => write!(f, "inconsistent store state: {details}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from the login authorization decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// No authorization record matches the login.
    Unauthorized {
        email: String,
        application: Application,
    },
    /// A matching record exists but has been deactivated.
    UserDeactivated {
        email: String,
        application: Application,
    },
    /// The office fallback found no Transportation Ordering Officer role.
    TooUnauthorized { user_id: UserId },
    /// The decision could not be made because persistence failed.
    Store,
}

impl AuthorizationError {
    /// Returns true for the kinds that mean "this caller may not log in",
    /// as opposed to an internal failure.
    #[must_use]
    pub fn is_denial(&self) -> bool {
        !matches!(self, Self::Store)
    }
}

impl fmt::Display for AuthorizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized { email, application } => {
                write!(f, "no {application} user record for '{email}'")
            }
            Self::UserDeactivated { email, application } => {
                write!(f, "{application} user record for '{email}' is deactivated")
            }
            Self::TooUnauthorized { user_id } => {
                write!(f, "user {user_id} does not hold the TOO role")
            }
            Self::Store => write!(f, "authorization lookup failed"),
        }
    }
}

impl std::error::Error for AuthorizationError {}

/// Errors from client-certificate verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertError {
    /// The peer presented no certificate, or an empty one.
    NoCertificate,
    /// The certificate digest matches no registered client certificate.
    UnknownCertificate { digest: String },
    /// The registry lookup failed.
    Lookup,
}

impl fmt::Display for CertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCertificate => write!(f, "no client certificate presented"),
            Self::UnknownCertificate { digest } => {
                write!(f, "unknown client certificate with sha256 digest {digest}")
            }
            Self::Lookup => write!(f, "client certificate lookup failed"),
        }
    }
}

impl std::error::Error for CertError {}
