//! Authentication for the portal server.
//!
//! This module provides:
//! - The Login.gov OIDC client
//! - Signed, per-application session cookies
//! - Login, callback and logout routes
//! - Session loading middleware and extractors for Axum routes
//! - The PostgreSQL identity store
//!
//! Which application a request belongs to (customer, office or admin) is
//! decided by its `Host` header. Each application has its own session cookie
//! and Login.gov client.

pub mod db;
pub mod middleware;
pub mod oidc;
pub mod routes;
pub mod session;

use axum::{Router, routing::get};
use portal_platform_access::{ApplicationHosts, LoginGovConfig, RoleAuthorizer, Session};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use middleware::{CurrentClientCert, CurrentSession, RequirePrime, RequireUser};
pub use oidc::{IdentityProvider, LoginGovProvider};
pub use routes::{callback, is_logged_in, logout, redirect_to_login};
pub use session::SessionCodec;

/// Shared application state.
pub struct AppState {
    /// Login.gov client.
    pub provider: Arc<dyn IdentityProvider>,
    /// The login authorization decision.
    pub authorizer: RoleAuthorizer,
    /// Session cookie codec.
    pub sessions: SessionCodec,
    /// Hostname of each application.
    pub hosts: ApplicationHosts,
    /// Login.gov settings, used for landing URLs.
    pub login_gov: LoginGovConfig,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        authorizer: RoleAuthorizer,
        sessions: SessionCodec,
        hosts: ApplicationHosts,
        login_gov: LoginGovConfig,
    ) -> Self {
        Self {
            provider,
            authorizer,
            sessions,
            hosts,
            login_gov,
        }
    }

    /// Where a browser lands after logging in or out of the session's
    /// application.
    pub fn landing_url(&self, session: &Session) -> String {
        self.login_gov.landing_url(session.hostname())
    }
}

/// Builds the browser-facing router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/auth/login-gov", get(redirect_to_login))
        .route(portal_platform_access::CALLBACK_PATH, get(callback))
        .route("/auth/logout", get(logout))
        .route("/auth/is_logged_in", get(is_logged_in))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::load_session,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
