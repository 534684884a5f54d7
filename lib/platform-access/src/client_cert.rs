//! Client certificates for the machine-to-machine API.
//!
//! Machine clients authenticate with mutual TLS. A client certificate is
//! accepted only if the SHA-256 digest of its DER bytes matches a registered
//! `ClientCert`, whose flags then decide what the client may do.

use portal_core::ClientCertId;
use rootcause::prelude::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::error::CertError;
use crate::store::ClientCertStore;

/// Branch of service an orders permission is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Army,
    Navy,
    MarineCorps,
    AirForce,
    CoastGuard,
}

/// An operation on orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrdersOperation {
    Read,
    Write,
}

/// Per-branch read and write permission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchAccess {
    pub read: bool,
    pub write: bool,
}

impl BranchAccess {
    #[must_use]
    pub fn allows(&self, operation: OrdersOperation) -> bool {
        match operation {
            OrdersOperation::Read => self.read,
            OrdersOperation::Write => self.write,
        }
    }
}

/// The permission flags carried by a client certificate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCertPermissions {
    pub allow_orders_api: bool,
    pub allow_prime: bool,
    pub army: BranchAccess,
    pub navy: BranchAccess,
    pub marine_corps: BranchAccess,
    pub air_force: BranchAccess,
    pub coast_guard: BranchAccess,
}

/// A registered client certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCert {
    id: ClientCertId,
    sha256_digest: String,
    subject: String,
    permissions: ClientCertPermissions,
}

impl ClientCert {
    #[must_use]
    pub fn new(
        id: ClientCertId,
        sha256_digest: String,
        subject: String,
        permissions: ClientCertPermissions,
    ) -> Self {
        Self {
            id,
            sha256_digest,
            subject,
            permissions,
        }
    }

    #[must_use]
    pub fn id(&self) -> ClientCertId {
        self.id
    }

    /// Lowercase hex SHA-256 of the certificate's DER bytes.
    #[must_use]
    pub fn sha256_digest(&self) -> &str {
        &self.sha256_digest
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn permissions(&self) -> &ClientCertPermissions {
        &self.permissions
    }

    #[must_use]
    pub fn allows_orders_api(&self) -> bool {
        self.permissions.allow_orders_api
    }

    #[must_use]
    pub fn allows_prime(&self) -> bool {
        self.permissions.allow_prime
    }

    /// Returns true if this client may perform `operation` on orders for
    /// `branch`. Requires orders API access as well as the branch flag.
    #[must_use]
    pub fn allows(&self, branch: Branch, operation: OrdersOperation) -> bool {
        if !self.allows_orders_api() {
            return false;
        }
        let access = match branch {
            Branch::Army => self.permissions.army,
            Branch::Navy => self.permissions.navy,
            Branch::MarineCorps => self.permissions.marine_corps,
            Branch::AirForce => self.permissions.air_force,
            Branch::CoastGuard => self.permissions.coast_guard,
        };
        access.allows(operation)
    }
}

/// Computes the registry digest of a DER-encoded certificate.
#[must_use]
pub fn client_cert_digest(der: &[u8]) -> String {
    hex::encode(Sha256::digest(der))
}

/// Checks presented client certificates against the registry.
#[derive(Clone)]
pub struct CertVerifier {
    store: Arc<dyn ClientCertStore>,
}

impl CertVerifier {
    #[must_use]
    pub fn new(store: Arc<dyn ClientCertStore>) -> Self {
        Self { store }
    }

    /// Verifies the leaf certificate of a TLS peer.
    ///
    /// An absent or empty certificate is rejected without consulting the
    /// registry.
    pub async fn verify_peer_certificate(
        &self,
        leaf: Option<&[u8]>,
    ) -> Result<ClientCert, Report<CertError>> {
        let der = match leaf {
            Some(der) if !der.is_empty() => der,
            _ => return Err(CertError::NoCertificate.into()),
        };

        let digest = client_cert_digest(der);
        let cert = self
            .store
            .fetch_client_cert(&digest)
            .await
            .context(CertError::Lookup)?;

        match cert {
            Some(cert) => {
                tracing::debug!(client_cert_id = %cert.id(), "client certificate accepted");
                Ok(cert)
            }
            None => {
                tracing::warn!(digest = %digest, "unknown client certificate");
                Err(CertError::UnknownCertificate { digest }.into())
            }
        }
    }
}
