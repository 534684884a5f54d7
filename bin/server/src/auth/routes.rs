//! Authentication routes for login, callback, and logout.

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use portal_platform_access::{Application, AuthorizationError, Session};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use time::Duration as TimeDuration;

use super::{
    AppState,
    middleware::CurrentSession,
    oidc::ProviderError,
    session::SessionError,
};

/// Lifetime of the login state cookie.
const LOGIN_STATE_MINUTES: i64 = 30;

/// Identity token of sessions created by local development logins, which
/// Login.gov knows nothing about.
const DEVLOCAL_ID_TOKEN: &str = "devlocal";

/// Query parameters for the OIDC callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Response body of `/auth/is_logged_in`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoggedInStatus {
    pub is_logged_in: bool,
}

/// SHA-256 hex of a login nonce, as kept in the state cookie.
fn state_digest(nonce: &str) -> String {
    hex::encode(Sha256::digest(nonce.as_bytes()))
}

fn with_error(url: &str, code: &str) -> String {
    format!("{url}?error={code}")
}

/// Initiates the OIDC login flow by redirecting to Login.gov.
pub async fn redirect_to_login(
    State(state): State<Arc<AppState>>,
    CurrentSession(session): CurrentSession,
    headers: HeaderMap,
) -> Result<Response, AuthError> {
    if session.user_id().is_some() {
        tracing::info!(user_id = ?session.user_id(), "already logged in, redirecting to landing");
        return Ok(Redirect::temporary(&state.landing_url(&session)).into_response());
    }

    let application = session.application();
    let login = state
        .provider
        .authorization_url(application)
        .map_err(|report| AuthError::provider(report, &session))?;

    let cookie = Cookie::build((
        application.state_cookie_name(),
        state_digest(&login.nonce),
    ))
    .path("/")
    .http_only(true)
    .secure(state.sessions.secure())
    .same_site(SameSite::Lax)
    .max_age(TimeDuration::minutes(LOGIN_STATE_MINUTES));
    let jar = state.sessions.request_jar(&headers).add(cookie);

    tracing::info!(application = %application, "redirecting to Login.gov");
    Ok((jar, Redirect::temporary(&login.redirect_url)).into_response())
}

/// Handles the OIDC callback after the user authenticates with Login.gov.
///
/// The session cookie is only written once the login is fully authorized.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    CurrentSession(session): CurrentSession,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Result<Response, AuthError> {
    let application = session.application();
    let landing_url = state.landing_url(&session);

    if let Some(error) = query.error.as_deref() {
        return match error {
            "access_denied" => {
                tracing::warn!(application = %application, "login cancelled at Login.gov");
                Ok(Redirect::temporary(&landing_url).into_response())
            }
            "invalid_request" => Err(AuthError::InvalidRequest {
                application,
                details: "Login.gov reported invalid_request".to_string(),
            }),
            other => {
                tracing::error!(application = %application, error = %other, "unknown error from Login.gov");
                Ok(Redirect::temporary(&with_error(&landing_url, "UNKNOWN_ERROR")).into_response())
            }
        };
    }

    let jar = state.sessions.request_jar(&headers);
    let state_cookie_name = application.state_cookie_name();
    let Some(expected) = jar.get(state_cookie_name) else {
        tracing::error!(
            application = %application,
            cookie = state_cookie_name,
            "login state cookie missing"
        );
        return Err(AuthError::MissingLoginState);
    };

    let returned = query.state.as_deref().unwrap_or_default();
    if expected.value() != state_digest(returned) {
        tracing::error!(
            application = %application,
            "state returned from Login.gov does not match the login state cookie"
        );
        let jar = jar.remove(Cookie::build(state_cookie_name).path("/"));
        return Ok((
            jar,
            Redirect::temporary(&with_error(&landing_url, "SIGNIN_ERROR")),
        )
            .into_response());
    }

    let Some(code) = query.code.as_deref().filter(|code| !code.is_empty()) else {
        return Err(AuthError::InvalidRequest {
            application,
            details: "callback carried no authorization code".to_string(),
        });
    };

    let provider_session = state
        .provider
        .exchange_token(code, application)
        .await
        .map_err(|report| AuthError::provider(report, &session))?;
    let open_id = state
        .provider
        .fetch_user(&provider_session)
        .await
        .map_err(|report| AuthError::provider(report, &session))?;

    tracing::info!(
        application = %application,
        email = %open_id.email,
        hostname = %session.hostname(),
        "new login"
    );

    let session = Session::new(application, session.hostname().to_string())
        .with_provider_identity(provider_session.id_token, open_id.email.clone());
    let session = state
        .authorizer
        .authorize(session, &open_id)
        .await
        .map_err(|report| AuthError::Authorization {
            report,
            email: open_id.email.clone(),
            application,
        })?;

    let jar = state
        .sessions
        .write(jar, &session)
        .map_err(|report| AuthError::Session {
            report,
            application,
        })?
        .remove(Cookie::build(state_cookie_name).path("/"));

    Ok((jar, Redirect::temporary(&landing_url)).into_response())
}

/// Logs out of the application and of Login.gov.
///
/// The rewritten cookie carries no identity token, user or roles.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    CurrentSession(session): CurrentSession,
    headers: HeaderMap,
) -> Result<Response, AuthError> {
    let application = session.application();
    let landing_url = state.landing_url(&session);

    let logout_url = match session.id_token() {
        "" => {
            tracing::info!(application = %application, "session has no identity token");
            landing_url
        }
        DEVLOCAL_ID_TOKEN => landing_url,
        id_token => state.provider.logout_url(&landing_url, id_token),
    };

    let jar = state
        .sessions
        .write(state.sessions.request_jar(&headers), &session.logged_out())
        .map_err(|report| AuthError::Session {
            report,
            application,
        })?;

    tracing::info!(application = %application, "user logged out");
    Ok((jar, Redirect::temporary(&logout_url)).into_response())
}

/// Reports whether the request's session belongs to a logged-in user.
pub async fn is_logged_in(CurrentSession(session): CurrentSession) -> Json<LoggedInStatus> {
    Json(LoggedInStatus {
        is_logged_in: session.is_logged_in(),
    })
}

/// Authentication errors.
#[derive(Debug)]
pub enum AuthError {
    /// The login state cookie was not sent back.
    MissingLoginState,
    /// The callback request itself was unusable.
    InvalidRequest {
        application: Application,
        details: String,
    },
    Provider {
        report: Report<ProviderError>,
        email: String,
        application: Application,
    },
    Authorization {
        report: Report<AuthorizationError>,
        email: String,
        application: Application,
    },
    Session {
        report: Report<SessionError>,
        application: Application,
    },
}

impl AuthError {
    fn provider(report: Report<ProviderError>, session: &Session) -> Self {
        Self::Provider {
            report,
            email: session.email().to_string(),
            application: session.application(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::MissingLoginState => StatusCode::FORBIDDEN,
            Self::InvalidRequest {
                application,
                details,
            } => {
                tracing::error!(application = %application, error = %details, "invalid callback request");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Provider {
                report,
                email,
                application,
            } => {
                tracing::error!(
                    email = %email,
                    application = %application,
                    error = %report,
                    "Login.gov request failed"
                );
                if matches!(report.current_context(), ProviderError::TokenEndpoint { .. }) {
                    StatusCode::UNAUTHORIZED
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
            Self::Authorization {
                report,
                email,
                application,
            } => {
                if report.current_context().is_denial() {
                    tracing::warn!(
                        email = %email,
                        application = %application,
                        error = %report,
                        "login not authorized"
                    );
                    StatusCode::UNAUTHORIZED
                } else {
                    tracing::error!(
                        email = %email,
                        application = %application,
                        error = %report,
                        "login authorization failed"
                    );
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
            Self::Session {
                report,
                application,
            } => {
                tracing::error!(application = %application, error = %report, "failed to write session");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = match status {
            StatusCode::UNAUTHORIZED => "Unauthorized",
            StatusCode::FORBIDDEN => "Forbidden",
            _ => "Internal Server Error",
        };
        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::oidc::{IdentityProvider, LoginData, ProviderSession};
    use crate::auth::{SessionCodec, router};
    use crate::config::SessionConfig;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::header::{COOKIE, HOST, LOCATION, SET_COOKIE};
    use axum::http::{Request, Response as HttpResponse};
    use axum_extra::extract::SignedCookieJar;
    use chrono::Utc;
    use portal_core::{OfficeUserId, RoleId, ServiceMemberId, UserId};
    use portal_platform_access::{
        ApplicationHosts, LoginGovConfig, MemoryStore, OfficeUser, OpenIdUser, Role,
        RoleAuthorizer, RoleType, User, UserStore,
    };
    use tower::ServiceExt;

    const NONCE: &str = "fixed-test-nonce";

    struct FakeProvider {
        user: OpenIdUser,
        token_error: Option<ProviderError>,
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        fn authorization_url(
            &self,
            application: Application,
        ) -> Result<LoginData, Report<ProviderError>> {
            Ok(LoginData {
                redirect_url: format!("https://idp.test/authorize?client={application}&state={NONCE}"),
                nonce: NONCE.to_string(),
            })
        }

        async fn exchange_token(
            &self,
            _code: &str,
            _application: Application,
        ) -> Result<ProviderSession, Report<ProviderError>> {
            match &self.token_error {
                Some(error) => Err(error.clone().into()),
                None => Ok(ProviderSession {
                    access_token: "access".to_string(),
                    expires_at: Utc::now(),
                    id_token: "id-token".to_string(),
                }),
            }
        }

        async fn fetch_user(
            &self,
            _session: &ProviderSession,
        ) -> Result<OpenIdUser, Report<ProviderError>> {
            Ok(self.user.clone())
        }

        fn logout_url(&self, redirect_url: &str, id_token: &str) -> String {
            format!("https://idp.test/logout?id_token_hint={id_token}&post_logout_redirect_uri={redirect_url}")
        }
    }

    fn open_id(email: &str) -> OpenIdUser {
        OpenIdUser {
            user_id: format!("subject-{email}"),
            email: email.to_string(),
            first_name: Some("Pat".to_string()),
            last_name: Some("Doe".to_string()),
        }
    }

    fn codec() -> SessionCodec {
        SessionCodec::new(&SessionConfig {
            secret: "a-test-secret-that-is-at-least-32-bytes-long".to_string(),
            expiry_minutes: 15,
            no_session_timeout: false,
            secure_cookies: false,
        })
    }

    struct Harness {
        store: Arc<MemoryStore>,
        state: Arc<AppState>,
    }

    impl Harness {
        fn new(user: OpenIdUser) -> Self {
            Self::with_token_error(user, None)
        }

        fn with_token_error(user: OpenIdUser, token_error: Option<ProviderError>) -> Self {
            let store = Arc::new(MemoryStore::new());
            let login_gov = LoginGovConfig::new(
                "idp.test".to_string(),
                "unused".to_string(),
                "mil-client".to_string(),
                "office-client".to_string(),
                "admin-client".to_string(),
            )
            .with_callback("http".to_string(), 3000);
            let state = Arc::new(AppState::new(
                Arc::new(FakeProvider { user, token_error }),
                RoleAuthorizer::new(store.clone()),
                codec(),
                ApplicationHosts::new(
                    "milmovelocal".to_string(),
                    "officelocal".to_string(),
                    "adminlocal".to_string(),
                ),
                login_gov,
            ));
            Self { store, state }
        }

        async fn get(&self, host: &str, uri: &str, cookies: Option<String>) -> HttpResponse<Body> {
            let mut request = Request::builder().uri(uri).header(HOST, host);
            if let Some(cookies) = cookies {
                request = request.header(COOKIE, cookies);
            }
            router(self.state.clone())
                .oneshot(request.body(Body::empty()).expect("request"))
                .await
                .expect("response")
        }
    }

    /// Request Cookie header carrying the jar's cookies.
    fn cookie_header(jar: SignedCookieJar) -> String {
        set_cookies(&jar.into_response())
            .iter()
            .filter_map(|c| c.split(';').next())
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn set_cookies<B>(response: &HttpResponse<B>) -> Vec<String> {
        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }

    fn location<B>(response: &HttpResponse<B>) -> &str {
        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .expect("location header")
    }

    fn state_cookie(application: Application, nonce: &str) -> String {
        cookie_header(codec().jar().add(Cookie::new(
            application.state_cookie_name(),
            state_digest(nonce),
        )))
    }

    /// The session the response's cookies would carry on the next request.
    fn session_after<B>(response: &HttpResponse<B>, application: Application) -> Option<Session> {
        let cookies = set_cookies(response)
            .iter()
            .filter_map(|c| c.split(';').next())
            .collect::<Vec<_>>()
            .join("; ");
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, cookies.parse().expect("header"));
        codec().read(&headers, application)
    }

    fn sets_session_cookie<B>(response: &HttpResponse<B>, application: Application) -> bool {
        set_cookies(response)
            .iter()
            .any(|c| c.starts_with(application.session_cookie_name()))
    }

    #[tokio::test]
    async fn login_redirects_to_provider_with_state_cookie() {
        let harness = Harness::new(open_id("sm@example.com"));

        let response = harness.get("officelocal", "/auth/login-gov", None).await;

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert!(location(&response).starts_with("https://idp.test/authorize?client=office"));
        let cookies = set_cookies(&response);
        let state = cookies
            .iter()
            .find(|c| c.starts_with("office_lg_state="))
            .expect("state cookie");
        assert!(state.contains("HttpOnly"));
        assert!(state.contains("SameSite=Lax"));
        assert!(state.contains("Max-Age=1800"));
    }

    #[tokio::test]
    async fn login_with_existing_user_goes_to_landing() {
        let harness = Harness::new(open_id("sm@example.com"));
        let session = Session::new(Application::Mil, "milmovelocal".to_string())
            .with_provider_identity("id-token".to_string(), "sm@example.com".to_string())
            .with_user_id(portal_core::UserId::new());
        let cookies = cookie_header(codec().write(codec().jar(), &session).expect("write"));

        let response = harness
            .get("milmovelocal", "/auth/login-gov", Some(cookies))
            .await;

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&response), "http://milmovelocal:3000/");
    }

    #[tokio::test]
    async fn unknown_host_is_rejected() {
        let harness = Harness::new(open_id("sm@example.com"));
        let response = harness.get("elsewhere.test", "/auth/login-gov", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn access_denied_returns_to_landing_without_session() {
        let harness = Harness::new(open_id("sm@example.com"));

        let response = harness
            .get(
                "milmovelocal",
                "/auth/login-gov/callback?error=access_denied",
                Some(state_cookie(Application::Mil, NONCE)),
            )
            .await;

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&response), "http://milmovelocal:3000/");
        assert!(!sets_session_cookie(&response, Application::Mil));
    }

    #[tokio::test]
    async fn invalid_request_is_a_server_error() {
        let harness = Harness::new(open_id("sm@example.com"));
        let response = harness
            .get("milmovelocal", "/auth/login-gov/callback?error=invalid_request", None)
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn unknown_provider_error_is_surfaced_on_landing() {
        let harness = Harness::new(open_id("sm@example.com"));
        let response = harness
            .get("milmovelocal", "/auth/login-gov/callback?error=temporarily_unavailable", None)
            .await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            location(&response),
            "http://milmovelocal:3000/?error=UNKNOWN_ERROR"
        );
    }

    #[tokio::test]
    async fn missing_state_cookie_is_forbidden() {
        let harness = Harness::new(open_id("sm@example.com"));
        let response = harness
            .get(
                "milmovelocal",
                &format!("/auth/login-gov/callback?code=abc&state={NONCE}"),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn state_mismatch_clears_state_cookie() {
        let harness = Harness::new(open_id("sm@example.com"));

        let response = harness
            .get(
                "milmovelocal",
                "/auth/login-gov/callback?code=abc&state=another-tab",
                Some(state_cookie(Application::Mil, NONCE)),
            )
            .await;

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            location(&response),
            "http://milmovelocal:3000/?error=SIGNIN_ERROR"
        );
        let cookies = set_cookies(&response);
        assert!(
            cookies
                .iter()
                .any(|c| c.starts_with("mil_lg_state=") && c.contains("Max-Age=0"))
        );
        assert!(!sets_session_cookie(&response, Application::Mil));
    }

    #[tokio::test]
    async fn customer_login_writes_authenticated_session() {
        let harness = Harness::new(open_id("sm@example.com"));

        let response = harness
            .get(
                "milmovelocal",
                &format!("/auth/login-gov/callback?code=abc&state={NONCE}"),
                Some(state_cookie(Application::Mil, NONCE)),
            )
            .await;

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&response), "http://milmovelocal:3000/");
        let session = session_after(&response, Application::Mil).expect("session cookie");
        assert!(session.is_authenticated());
        assert_eq!(session.email(), "sm@example.com");
        assert_eq!(session.id_token(), "id-token");
        assert_eq!(session.first_name(), "Pat");
        assert_eq!(harness.store.user_count().await, 1);
    }

    #[tokio::test]
    async fn office_login_claims_office_user() {
        let harness = Harness::new(open_id("ppso@example.mil"));
        let office_user_id = OfficeUserId::new();
        harness
            .store
            .insert_office_user(OfficeUser::new(
                office_user_id,
                "ppso@example.mil".to_string(),
                true,
                None,
                "Pat".to_string(),
                "Doe".to_string(),
            ))
            .await;

        let response = harness
            .get(
                "officelocal",
                &format!("/auth/login-gov/callback?code=abc&state={NONCE}"),
                Some(state_cookie(Application::Office, NONCE)),
            )
            .await;

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        let session = session_after(&response, Application::Office).expect("session cookie");
        assert_eq!(session.office_user_id(), Some(office_user_id));
        assert!(session.is_authenticated());
        let claimed = harness.store.office_user(office_user_id).await.expect("row");
        assert_eq!(claimed.user_id(), session.user_id());
    }

    #[tokio::test]
    async fn callback_discards_earlier_session_contents() {
        let harness = Harness::new(open_id("ppso@example.mil"));
        let office_user_id = OfficeUserId::new();
        harness
            .store
            .insert_office_user(OfficeUser::new(
                office_user_id,
                "ppso@example.mil".to_string(),
                true,
                None,
                "Pat".to_string(),
                "Doe".to_string(),
            ))
            .await;
        let stale = Session::new(Application::Office, "officelocal".to_string())
            .with_provider_identity("old-token".to_string(), "old@example.mil".to_string())
            .with_user_id(UserId::new())
            .with_service_member_id(ServiceMemberId::new())
            .with_role(RoleType::TransportationOrderingOfficer);
        let jar = codec()
            .write(
                codec().jar().add(Cookie::new(
                    Application::Office.state_cookie_name(),
                    state_digest(NONCE),
                )),
                &stale,
            )
            .expect("stale session");

        let response = harness
            .get(
                "officelocal",
                &format!("/auth/login-gov/callback?code=abc&state={NONCE}"),
                Some(cookie_header(jar)),
            )
            .await;

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        let session = session_after(&response, Application::Office).expect("session cookie");
        assert_eq!(session.office_user_id(), Some(office_user_id));
        assert_eq!(session.service_member_id(), None);
        assert!(!session.has_role(RoleType::TransportationOrderingOfficer));
        assert_eq!(session.id_token(), "id-token");
        assert_eq!(session.email(), "ppso@example.mil");
    }

    #[test]
    fn authorization_store_failure_is_a_server_error() {
        let response = AuthError::Authorization {
            report: AuthorizationError::Store.into(),
            email: "ppso@example.mil".to_string(),
            application: Application::Office,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn inactive_office_user_is_unauthorized() {
        let harness = Harness::new(open_id("retired@example.mil"));
        harness
            .store
            .insert_office_user(OfficeUser::new(
                OfficeUserId::new(),
                "retired@example.mil".to_string(),
                false,
                None,
                "Ret".to_string(),
                "Ired".to_string(),
            ))
            .await;

        let response = harness
            .get(
                "officelocal",
                &format!("/auth/login-gov/callback?code=abc&state={NONCE}"),
                Some(state_cookie(Application::Office, NONCE)),
            )
            .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(!sets_session_cookie(&response, Application::Office));
    }

    #[tokio::test]
    async fn office_login_without_record_falls_back_to_too_role() {
        let login = open_id("too@example.mil");
        let harness = Harness::new(login.clone());
        let user = harness
            .store
            .create_user(User::new(login.user_id.clone(), login.email.clone()))
            .await
            .expect("user");
        harness
            .store
            .assign_role(
                user.id(),
                Role::new(
                    RoleId::new(),
                    RoleType::TransportationOrderingOfficer,
                    "Transportation Ordering Officer".to_string(),
                ),
            )
            .await;

        let response = harness
            .get(
                "officelocal",
                &format!("/auth/login-gov/callback?code=abc&state={NONCE}"),
                Some(state_cookie(Application::Office, NONCE)),
            )
            .await;

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        let session = session_after(&response, Application::Office).expect("session cookie");
        assert!(session.has_role(RoleType::TransportationOrderingOfficer));
        assert_eq!(session.user_id(), Some(user.id()));
        assert!(session.is_logged_in());
        assert_eq!(session.office_user_id(), None);
    }

    #[tokio::test]
    async fn admin_login_without_record_is_unauthorized() {
        let harness = Harness::new(open_id("nobody@example.mil"));
        let response = harness
            .get(
                "adminlocal",
                &format!("/auth/login-gov/callback?code=abc&state={NONCE}"),
                Some(state_cookie(Application::Admin, NONCE)),
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(!sets_session_cookie(&response, Application::Admin));
    }

    #[tokio::test]
    async fn rejected_code_is_unauthorized() {
        let harness = Harness::with_token_error(
            open_id("sm@example.com"),
            Some(ProviderError::TokenEndpoint {
                error: "invalid_grant".to_string(),
            }),
        );
        let response = harness
            .get(
                "milmovelocal",
                &format!("/auth/login-gov/callback?code=stale&state={NONCE}"),
                Some(state_cookie(Application::Mil, NONCE)),
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unreachable_provider_is_a_server_error() {
        let harness = Harness::with_token_error(
            open_id("sm@example.com"),
            Some(ProviderError::Transport {
                details: "connection refused".to_string(),
            }),
        );
        let response = harness
            .get(
                "milmovelocal",
                &format!("/auth/login-gov/callback?code=abc&state={NONCE}"),
                Some(state_cookie(Application::Mil, NONCE)),
            )
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn logout_clears_session_and_redirects_to_provider() {
        let harness = Harness::new(open_id("ppso@example.mil"));
        let session = Session::new(Application::Office, "officelocal".to_string())
            .with_provider_identity("id-token".to_string(), "ppso@example.mil".to_string())
            .with_user_id(portal_core::UserId::new())
            .with_office_user_id(OfficeUserId::new())
            .with_role(RoleType::TransportationOrderingOfficer);
        let cookies = cookie_header(codec().write(codec().jar(), &session).expect("write"));

        let response = harness
            .get("officelocal", "/auth/logout", Some(cookies))
            .await;

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert!(location(&response).starts_with("https://idp.test/logout?id_token_hint=id-token"));
        assert!(location(&response).ends_with("post_logout_redirect_uri=http://officelocal:3000/"));

        let after = session_after(&response, Application::Office).expect("rewritten cookie");
        assert_eq!(after.id_token(), "");
        assert_eq!(after.user_id(), None);
        assert_eq!(after.office_user_id(), None);
        assert!(after.roles().is_empty());
        assert!(!after.is_logged_in());
    }

    #[tokio::test]
    async fn devlocal_logout_skips_provider() {
        let harness = Harness::new(open_id("sm@example.com"));
        let session = Session::new(Application::Mil, "milmovelocal".to_string())
            .with_provider_identity(DEVLOCAL_ID_TOKEN.to_string(), "sm@example.com".to_string())
            .with_user_id(portal_core::UserId::new());
        let cookies = cookie_header(codec().write(codec().jar(), &session).expect("write"));

        let response = harness
            .get("milmovelocal", "/auth/logout", Some(cookies))
            .await;

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&response), "http://milmovelocal:3000/");
        let after = session_after(&response, Application::Mil).expect("rewritten cookie");
        assert!(!after.is_logged_in());
    }

    #[tokio::test]
    async fn is_logged_in_reports_session_state() {
        let harness = Harness::new(open_id("sm@example.com"));

        let response = harness.get("milmovelocal", "/auth/is_logged_in", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let status: LoggedInStatus = serde_json::from_slice(&body).expect("json");
        assert_eq!(status, LoggedInStatus { is_logged_in: false });

        let session = Session::new(Application::Mil, "milmovelocal".to_string())
            .with_provider_identity("id-token".to_string(), "sm@example.com".to_string())
            .with_user_id(portal_core::UserId::new());
        let cookies = cookie_header(codec().write(codec().jar(), &session).expect("write"));
        let response = harness
            .get("milmovelocal", "/auth/is_logged_in", Some(cookies))
            .await;
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert_eq!(&body[..], br#"{"isLoggedIn":true}"#);
    }
}
