//! The mutual-TLS listener for machine clients.
//!
//! rustls requires every client to present a certificate chaining to the
//! configured client CA bundle. After the handshake the leaf certificate must
//! also be registered in the `client_certs` table; connections presenting an
//! unregistered certificate are closed before any request is read. Accepted
//! connections carry their `ClientCert` as a request extension.

use axum::{Extension, Json, Router, routing::get};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use portal_platform_access::{CertVerifier, ClientCert};
use rootcause::prelude::Report;
use rustls::ServerConfig;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower_http::trace::TraceLayer;

use crate::auth::CurrentClientCert;
use crate::config::MutualTlsConfig;

/// How long a client may take to finish the TLS handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from setting up the mutual-TLS listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsSetupError {
    /// A PEM file could not be read or parsed.
    Pem { path: String, details: String },
    /// A PEM file held no certificates.
    NoCertificates { path: String },
    /// rustls rejected the configuration.
    Config { details: String },
}

impl fmt::Display for TlsSetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pem { path, details } => write!(f, "failed to load PEM '{path}': {details}"),
            Self::NoCertificates { path } => write!(f, "no certificates in '{path}'"),
            Self::Config { details } => write!(f, "invalid TLS configuration: {details}"),
        }
    }
}

impl std::error::Error for TlsSetupError {}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, Report<TlsSetupError>> {
    let pem_error = |details: String| TlsSetupError::Pem {
        path: path.display().to_string(),
        details,
    };
    let certs = CertificateDer::pem_file_iter(path)
        .map_err(|e| pem_error(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| pem_error(e.to_string()))?;

    if certs.is_empty() {
        return Err(TlsSetupError::NoCertificates {
            path: path.display().to_string(),
        }
        .into());
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, Report<TlsSetupError>> {
    PrivateKeyDer::from_pem_file(path).map_err(|e| {
        TlsSetupError::Pem {
            path: path.display().to_string(),
            details: e.to_string(),
        }
        .into()
    })
}

/// Builds the rustls configuration, requiring client certificates signed by
/// the configured CA bundle.
pub fn server_config(config: &MutualTlsConfig) -> Result<Arc<ServerConfig>, Report<TlsSetupError>> {
    let mut roots = rustls::RootCertStore::empty();
    for ca in load_certs(&config.client_ca_path)? {
        roots.add(ca).map_err(|e| TlsSetupError::Config {
            details: e.to_string(),
        })?;
    }

    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| TlsSetupError::Config {
            details: e.to_string(),
        })?;

    let server = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(load_certs(&config.cert_path)?, load_key(&config.key_path)?)
        .map_err(|e| TlsSetupError::Config {
            details: e.to_string(),
        })?;
    Ok(Arc::new(server))
}

/// Builds the machine-client router.
pub fn router() -> Router {
    Router::new()
        .route("/client_certs/current", get(current_client_cert))
        .layer(TraceLayer::new_for_http())
}

/// Returns the registered certificate, and its permissions, the caller
/// connected with.
async fn current_client_cert(CurrentClientCert(cert): CurrentClientCert) -> Json<ClientCert> {
    Json(cert)
}

async fn complete_handshake<T>(
    handshake: impl Future<Output = io::Result<T>>,
    limit: Duration,
) -> io::Result<T> {
    tokio::time::timeout(limit, handshake)
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "TLS handshake timed out"))?
}

/// Accepts mutual-TLS connections until the listener fails.
pub async fn serve(
    listener: TcpListener,
    tls: Arc<ServerConfig>,
    verifier: CertVerifier,
    app: Router,
) {
    let acceptor = TlsAcceptor::from(tls);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(error = %e, "failed to accept mutual-TLS connection");
                continue;
            }
        };

        let acceptor = acceptor.clone();
        let verifier = verifier.clone();
        let app = app.clone();
        tokio::spawn(async move {
            let stream = match complete_handshake(acceptor.accept(stream), HANDSHAKE_TIMEOUT).await
            {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(peer = %peer, error = %e, "TLS handshake failed");
                    return;
                }
            };

            let leaf = stream
                .get_ref()
                .1
                .peer_certificates()
                .and_then(|certs| certs.first())
                .map(|cert| cert.as_ref().to_vec());
            let cert = match verifier.verify_peer_certificate(leaf.as_deref()).await {
                Ok(cert) => cert,
                Err(report) => {
                    tracing::warn!(peer = %peer, error = %report, "client certificate rejected");
                    return;
                }
            };
            tracing::debug!(peer = %peer, client_cert_id = %cert.id(), "mutual-TLS connection accepted");

            let service = TowerToHyperService::new(app.layer(Extension(cert)));
            if let Err(e) = auto::Builder::new(TokioExecutor::new())
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                tracing::debug!(peer = %peer, error = %e, "mutual-TLS connection closed with error");
            }
        });
    }
}
