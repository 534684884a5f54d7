//! Signed session cookies.
//!
//! The whole `Session` is serialized into its application's cookie and
//! signed with a key derived from the configured secret. A cookie that fails
//! verification, has expired, or belongs to another application is ignored.

use axum::http::HeaderMap;
use axum_extra::extract::SignedCookieJar;
use axum_extra::extract::cookie::{Cookie, Key, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use portal_platform_access::{Application, Session};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::fmt;
use time::Duration as TimeDuration;

use crate::config::SessionConfig;

/// Errors from writing a session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session could not be serialized.
    Encode { details: String },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode { details } => write!(f, "failed to encode session: {details}"),
        }
    }
}

impl std::error::Error for SessionError {}

/// What is stored in the cookie.
#[derive(Debug, Serialize, Deserialize)]
struct SessionEnvelope {
    session: Session,
    /// Unix seconds. Absent when session timeouts are disabled.
    expires_at: Option<i64>,
}

/// Reads and writes session cookies.
#[derive(Clone)]
pub struct SessionCodec {
    key: Key,
    expiry: Duration,
    no_session_timeout: bool,
    secure: bool,
}

impl SessionCodec {
    /// Creates a codec from the session configuration.
    ///
    /// The signing key is the SHA-512 of the configured secret.
    pub fn new(config: &SessionConfig) -> Self {
        let digest = Sha512::digest(config.secret.as_bytes());
        Self {
            key: Key::from(&digest[..]),
            expiry: Duration::minutes(config.expiry_minutes),
            no_session_timeout: config.no_session_timeout,
            secure: config.secure_cookies,
        }
    }

    /// An empty jar signed with this codec's key.
    pub fn jar(&self) -> SignedCookieJar {
        SignedCookieJar::new(self.key.clone())
    }

    /// The jar of cookies sent with a request, verified with this codec's key.
    pub fn request_jar(&self, headers: &HeaderMap) -> SignedCookieJar {
        SignedCookieJar::from_headers(headers, self.key.clone())
    }

    /// Whether cookies carry the Secure attribute.
    pub fn secure(&self) -> bool {
        self.secure
    }

    /// Decodes the session for `application` from request headers.
    pub fn read(&self, headers: &HeaderMap, application: Application) -> Option<Session> {
        let jar = self.request_jar(headers);
        let cookie = jar.get(application.session_cookie_name())?;
        let bytes = URL_SAFE_NO_PAD.decode(cookie.value()).ok()?;
        let envelope: SessionEnvelope = serde_json::from_slice(&bytes).ok()?;

        if envelope
            .expires_at
            .is_some_and(|expires_at| expires_at <= Utc::now().timestamp())
        {
            tracing::debug!(application = %application, "ignoring expired session cookie");
            return None;
        }
        if envelope.session.application() != application {
            tracing::warn!(
                application = %application,
                cookie_application = %envelope.session.application(),
                "ignoring session cookie issued for another application"
            );
            return None;
        }
        Some(envelope.session)
    }

    /// Adds the cookie for `session` to `jar`.
    pub fn write(
        &self,
        jar: SignedCookieJar,
        session: &Session,
    ) -> Result<SignedCookieJar, Report<SessionError>> {
        let expires_at =
            (!self.no_session_timeout).then(|| (Utc::now() + self.expiry).timestamp());
        let envelope = SessionEnvelope {
            session: session.clone(),
            expires_at,
        };
        let json = serde_json::to_vec(&envelope).map_err(|e| SessionError::Encode {
            details: e.to_string(),
        })?;

        let mut cookie = Cookie::build((
            session.application().session_cookie_name(),
            URL_SAFE_NO_PAD.encode(json),
        ))
        .path("/")
        .http_only(true)
        .secure(self.secure)
        .same_site(SameSite::Lax)
        .build();
        if !self.no_session_timeout {
            cookie.set_max_age(TimeDuration::seconds(self.expiry.num_seconds()));
        }

        Ok(jar.add(cookie))
    }
}
