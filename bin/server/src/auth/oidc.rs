//! Login.gov OIDC client.
//!
//! Authorization URLs are built with the openidconnect crate. The token
//! endpoint call is made by hand because Login.gov authenticates clients
//! with an RS256-signed client assertion instead of a client secret.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use openidconnect::core::{
    CoreAuthenticationFlow, CoreClient, CoreJsonWebKeySet, CoreProviderMetadata,
};
use openidconnect::url::Url;
use openidconnect::{AuthUrl, ClientId, CsrfToken, IssuerUrl, Nonce, RedirectUrl, Scope};
use portal_platform_access::{Application, ApplicationHosts, LoginGovConfig, OpenIdUser};
use rand::RngCore;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Assurance level requested from Login.gov.
pub const ACR_VALUES: &str = "http://idmanagement.gov/ns/assurance/loa/1";

/// `client_assertion_type` for JWT bearer client authentication.
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Lifetime of a client assertion.
pub const CLIENT_ASSERTION_EXPIRY_MINUTES: i64 = 15;

/// Errors from talking to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// No OIDC client is registered for the application.
    UnknownApplication { application: Application },
    /// A provider or callback URL could not be parsed.
    InvalidUrl { details: String },
    /// Provider metadata discovery failed.
    Discovery { details: String },
    /// The client assertion signing key is not a usable RSA PEM key.
    InvalidSigningKey { details: String },
    /// Signing the client assertion failed.
    Signing { details: String },
    /// The provider could not be reached or answered with an error status.
    Transport { details: String },
    /// The provider answered with a body that could not be understood.
    MalformedResponse { details: String },
    /// The token endpoint reported an error in its response body.
    TokenEndpoint { error: String },
    /// The user-info endpoint rejected the request.
    UserInfo { details: String },
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownApplication { application } => {
                write!(f, "no OIDC client registered for {application}")
            }
            Self::InvalidUrl { details } => write!(f, "invalid provider URL: {details}"),
            Self::Discovery { details } => write!(f, "OIDC discovery failed: {details}"),
            Self::InvalidSigningKey { details } => {
                write!(f, "invalid client assertion key: {details}")
            }
            Self::Signing { details } => write!(f, "failed to sign client assertion: {details}"),
            Self::Transport { details } => write!(f, "provider request failed: {details}"),
            Self::MalformedResponse { details } => {
                write!(f, "malformed provider response: {details}")
            }
            Self::TokenEndpoint { error } => write!(f, "token endpoint returned error '{error}'"),
            Self::UserInfo { details } => write!(f, "user info request failed: {details}"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// The URL to send the browser to, and the nonce embedded in it.
///
/// The nonce doubles as the OAuth2 `state` parameter.
#[derive(Debug, Clone)]
pub struct LoginData {
    pub redirect_url: String,
    pub nonce: String,
}

/// Tokens returned by a successful code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSession {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub id_token: String,
}

/// Operations the login handlers need from the identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Builds the authorization redirect for `application`.
    fn authorization_url(
        &self,
        application: Application,
    ) -> Result<LoginData, Report<ProviderError>>;

    /// Exchanges an authorization code using `application`'s client.
    async fn exchange_token(
        &self,
        code: &str,
        application: Application,
    ) -> Result<ProviderSession, Report<ProviderError>>;

    /// Loads the user behind a provider session.
    async fn fetch_user(
        &self,
        session: &ProviderSession,
    ) -> Result<OpenIdUser, Report<ProviderError>>;

    /// Builds the provider logout URL.
    fn logout_url(&self, redirect_url: &str, id_token: &str) -> String;
}

/// Provider endpoints.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub issuer: Url,
    pub authorization: Url,
    pub token: Url,
    pub userinfo: Url,
    pub logout: Url,
}

impl ProviderEndpoints {
    /// Login.gov's fixed endpoint layout under `base`.
    pub fn login_gov(base: &Url) -> Result<Self, Report<ProviderError>> {
        let join = |path: &str| {
            base.join(path).map_err(|e| ProviderError::InvalidUrl {
                details: format!("{base}{path}: {e}"),
            })
        };
        Ok(Self {
            issuer: base.clone(),
            authorization: join("/openid_connect/authorize")?,
            token: join("/api/openid_connect/token")?,
            userinfo: join("/api/openid_connect/userinfo")?,
            logout: join("/openid_connect/logout")?,
        })
    }
}

#[derive(Debug, Clone)]
struct ProviderClient {
    client_id: String,
    redirect_url: String,
}

/// Login.gov client for all three applications.
pub struct LoginGovProvider {
    endpoints: ProviderEndpoints,
    clients: HashMap<Application, ProviderClient>,
    secret_key: String,
    http: reqwest::Client,
}

impl LoginGovProvider {
    /// Creates a provider by discovering Login.gov's metadata once for all
    /// applications.
    #[tracing::instrument(skip_all, fields(hostname = %config.hostname()))]
    pub async fn discover(
        config: &LoginGovConfig,
        hosts: &ApplicationHosts,
    ) -> Result<Self, Report<ProviderError>> {
        let issuer_url =
            IssuerUrl::new(config.issuer_url()).map_err(|e| ProviderError::InvalidUrl {
                details: format!("issuer: {e}"),
            })?;
        let http = http_client(config)?;

        let metadata = CoreProviderMetadata::discover_async(issuer_url, &http)
            .await
            .map_err(|e| ProviderError::Discovery {
                details: e.to_string(),
            })?;

        let mut endpoints = ProviderEndpoints::login_gov(metadata.issuer().url())?;
        endpoints.authorization = metadata.authorization_endpoint().url().clone();
        if let Some(token) = metadata.token_endpoint() {
            endpoints.token = token.url().clone();
        }
        if let Some(userinfo) = metadata.userinfo_endpoint() {
            endpoints.userinfo = userinfo.url().clone();
        }

        tracing::info!(issuer = %endpoints.issuer, "discovered Login.gov provider");
        Ok(Self::with_http_client(endpoints, config, hosts, http))
    }

    /// Creates a provider with known endpoints.
    pub fn new(
        endpoints: ProviderEndpoints,
        config: &LoginGovConfig,
        hosts: &ApplicationHosts,
    ) -> Result<Self, Report<ProviderError>> {
        let http = http_client(config)?;
        Ok(Self::with_http_client(endpoints, config, hosts, http))
    }

    fn with_http_client(
        endpoints: ProviderEndpoints,
        config: &LoginGovConfig,
        hosts: &ApplicationHosts,
        http: reqwest::Client,
    ) -> Self {
        let clients = Application::ALL
            .into_iter()
            .map(|app| {
                let client = ProviderClient {
                    client_id: config.client_id(app).to_string(),
                    redirect_url: config.callback_url(hosts.hostname(app)),
                };
                (app, client)
            })
            .collect();
        Self {
            endpoints,
            clients,
            secret_key: config.secret_key().to_string(),
            http,
        }
    }

    fn client(&self, application: Application) -> Result<&ProviderClient, ProviderError> {
        self.clients
            .get(&application)
            .ok_or(ProviderError::UnknownApplication { application })
    }

    /// Exchanges `code` at the token endpoint, authenticating as
    /// `client_id` with an assertion valid for `expiry`.
    pub async fn request_token(
        &self,
        code: &str,
        client_id: &str,
        expiry: Duration,
    ) -> Result<ProviderSession, Report<ProviderError>> {
        let assertion = create_client_assertion(
            &self.secret_key,
            client_id,
            self.endpoints.token.as_str(),
            Utc::now() + expiry,
        )?;

        let response = self
            .http
            .post(self.endpoints.token.clone())
            .form(&token_params(code, &assertion))
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        match serde_json::from_str::<TokenEndpointResponse>(&body) {
            Ok(token) if !token.error.is_empty() => Err(ProviderError::TokenEndpoint {
                error: token.error,
            }
            .into()),
            _ if !status.is_success() => Err(ProviderError::Transport {
                details: format!("token endpoint returned {status}"),
            }
            .into()),
            Ok(token) if token.access_token.is_empty() => Err(ProviderError::MalformedResponse {
                details: "token response has no access_token".to_string(),
            }
            .into()),
            Ok(token) => Ok(ProviderSession {
                expires_at: token_expiry(token.expires_in)?,
                access_token: token.access_token,
                id_token: token.id_token,
            }),
            Err(e) => Err(ProviderError::MalformedResponse {
                details: e.to_string(),
            }
            .into()),
        }
    }
}

#[async_trait]
impl IdentityProvider for LoginGovProvider {
    fn authorization_url(
        &self,
        application: Application,
    ) -> Result<LoginData, Report<ProviderError>> {
        let client = self.client(application)?;
        let redirect_url =
            RedirectUrl::new(client.redirect_url.clone()).map_err(|e| ProviderError::InvalidUrl {
                details: format!("redirect {}: {e}", client.redirect_url),
            })?;

        let oidc_client = CoreClient::new(
            ClientId::new(client.client_id.clone()),
            IssuerUrl::from_url(self.endpoints.issuer.clone()),
            CoreJsonWebKeySet::new(Vec::new()),
        )
        .set_auth_uri(AuthUrl::from_url(self.endpoints.authorization.clone()))
        .set_redirect_uri(redirect_url);

        let nonce = generate_nonce();
        let state = nonce.clone();
        let request_nonce = nonce.clone();
        let (url, _, _) = oidc_client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                move || CsrfToken::new(state),
                move || Nonce::new(request_nonce),
            )
            .add_scope(Scope::new("email".to_string()))
            .add_extra_param("acr_values", ACR_VALUES)
            .url();

        Ok(LoginData {
            redirect_url: url.to_string(),
            nonce,
        })
    }

    #[tracing::instrument(skip(self, code))]
    async fn exchange_token(
        &self,
        code: &str,
        application: Application,
    ) -> Result<ProviderSession, Report<ProviderError>> {
        let client_id = self.client(application)?.client_id.clone();
        self.request_token(
            code,
            &client_id,
            Duration::minutes(CLIENT_ASSERTION_EXPIRY_MINUTES),
        )
        .await
    }

    #[tracing::instrument(skip_all)]
    async fn fetch_user(
        &self,
        session: &ProviderSession,
    ) -> Result<OpenIdUser, Report<ProviderError>> {
        let response = self
            .http
            .get(self.endpoints.userinfo.clone())
            .bearer_auth(&session.access_token)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::UserInfo {
                details: format!("user info endpoint returned {status}"),
            }
            .into());
        }

        let claims: UserInfoClaims =
            response
                .json()
                .await
                .map_err(|e| ProviderError::MalformedResponse {
                    details: e.to_string(),
                })?;

        Ok(OpenIdUser {
            user_id: claims.sub,
            email: claims.email,
            first_name: claims.given_name,
            last_name: claims.family_name,
        })
    }

    fn logout_url(&self, redirect_url: &str, id_token: &str) -> String {
        let mut url = self.endpoints.logout.clone();
        url.query_pairs_mut()
            .append_pair("id_token_hint", id_token)
            .append_pair("post_logout_redirect_uri", redirect_url)
            .append_pair("state", &generate_nonce());
        url.to_string()
    }
}

fn http_client(config: &LoginGovConfig) -> Result<reqwest::Client, Report<ProviderError>> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(std::time::Duration::from_secs(config.timeout_seconds()))
        .build()
        .map_err(|e| {
            ProviderError::Transport {
                details: format!("failed to create HTTP client: {e}"),
            }
            .into()
        })
}

/// Converts a provider-supplied `expires_in` into an absolute time.
fn token_expiry(expires_in: i64) -> Result<DateTime<Utc>, ProviderError> {
    Duration::try_seconds(expires_in)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .ok_or_else(|| ProviderError::MalformedResponse {
            details: format!("token expires_in out of range: {expires_in}"),
        })
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    ProviderError::Transport {
        details: e.to_string(),
    }
}

/// Returns 64 random bytes, base64url encoded.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 64];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE.encode(bytes)
}

/// Claims of the client assertion JWT.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClientAssertionClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub jti: String,
    pub exp: i64,
}

/// Signs a client assertion for `client_id` addressed to `audience`.
pub fn create_client_assertion(
    secret_key_pem: &str,
    client_id: &str,
    audience: &str,
    expires_at: DateTime<Utc>,
) -> Result<String, Report<ProviderError>> {
    let key = EncodingKey::from_rsa_pem(secret_key_pem.as_bytes()).map_err(|e| {
        ProviderError::InvalidSigningKey {
            details: e.to_string(),
        }
    })?;

    let claims = ClientAssertionClaims {
        iss: client_id.to_string(),
        sub: client_id.to_string(),
        aud: audience.to_string(),
        jti: generate_nonce(),
        exp: expires_at.timestamp(),
    };

    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key).map_err(|e| {
        ProviderError::Signing {
            details: e.to_string(),
        }
        .into()
    })
}

/// Form fields of the token request.
pub fn token_params<'a>(code: &'a str, client_assertion: &'a str) -> [(&'static str, &'a str); 4] {
    [
        ("client_assertion", client_assertion),
        ("client_assertion_type", CLIENT_ASSERTION_TYPE),
        ("code", code),
        ("grant_type", "authorization_code"),
    ]
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_in: i64,
    #[serde(default)]
    id_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfoClaims {
    sub: String,
    email: String,
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    family_name: Option<String>,
}
