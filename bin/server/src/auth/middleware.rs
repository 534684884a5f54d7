//! Session loading middleware and authentication extractors for Axum.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use portal_platform_access::{ClientCert, Session, SessionState};
use std::sync::Arc;

use super::AppState;

/// Attaches the request's session to its extensions.
///
/// The application is chosen by the `Host` header. Requests without a
/// valid cookie for that application get a fresh anonymous session.
pub async fn load_session(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().host())
        .map(str::to_string);

    let Some(application) = host.as_deref().and_then(|h| state.hosts.resolve(h)) else {
        tracing::warn!(host = ?host, "request for unknown host");
        return (StatusCode::BAD_REQUEST, "Bad Request").into_response();
    };

    let session = state
        .sessions
        .read(request.headers(), application)
        .unwrap_or_else(|| {
            Session::new(application, state.hosts.hostname(application).to_string())
        });
    request.extensions_mut().insert(session);

    next.run(request).await
}

/// The session loaded for this request.
pub struct CurrentSession(pub Session);

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .map(CurrentSession)
            .ok_or(AuthRejection::MissingSession)
    }
}

/// Extractor for requiring a session authenticated for its application.
///
/// Office and admin sessions must also be linked to their office or admin
/// user record.
pub struct RequireUser(pub Session);

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentSession(session) = CurrentSession::from_request_parts(parts, state).await?;

        match session.state() {
            SessionState::Authenticated => Ok(RequireUser(session)),
            SessionState::Anonymous => {
                tracing::warn!("unauthorized access, no identity token in session");
                Err(AuthRejection::NotAuthenticated)
            }
            SessionState::PendingIdentity => {
                tracing::warn!(
                    application = %session.application(),
                    user_id = ?session.user_id(),
                    "session lacks the record its application requires"
                );
                Err(AuthRejection::NotAuthenticated)
            }
        }
    }
}

/// The client certificate the mutual-TLS listener accepted for this
/// connection.
pub struct CurrentClientCert(pub ClientCert);

impl<S> FromRequestParts<S> for CurrentClientCert
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ClientCert>()
            .cloned()
            .map(CurrentClientCert)
            .ok_or(AuthRejection::NoClientCert)
    }
}

/// Extractor for requiring a client certificate with Prime API access.
pub struct RequirePrime(pub ClientCert);

impl<S> FromRequestParts<S> for RequirePrime
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentClientCert(cert) = CurrentClientCert::from_request_parts(parts, state).await?;

        if !cert.allows_prime() {
            tracing::warn!(client_cert_id = %cert.id(), "client certificate lacks prime access");
            return Err(AuthRejection::Forbidden);
        }

        Ok(RequirePrime(cert))
    }
}

/// Rejection type for authentication extractors.
#[derive(Debug)]
pub enum AuthRejection {
    NotAuthenticated,
    NoClientCert,
    Forbidden,
    MissingSession,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::NotAuthenticated | Self::NoClientCert => {
                (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
            }
            Self::Forbidden => (StatusCode::FORBIDDEN, "Forbidden").into_response(),
            Self::MissingSession => {
                tracing::error!("session middleware did not run for this route");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}
