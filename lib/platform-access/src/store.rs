//! Persistence seams for identity resolution.
//!
//! Implementations live elsewhere: `MemoryStore` in this crate for tests and
//! local development, and a Postgres store in the server.

use async_trait::async_trait;
use portal_core::{AdminUserId, OfficeUserId, UserId};
use rootcause::prelude::Report;

use crate::client_cert::ClientCert;
use crate::error::StoreError;
use crate::user::{AdminUser, OfficeUser, User, UserIdentity};

/// Storage for users.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Looks up a user by the identity provider's subject.
    async fn find_user_by_login_gov_uuid(
        &self,
        login_gov_uuid: &str,
    ) -> Result<Option<User>, Report<StoreError>>;

    /// Inserts a user unless one already exists for the same subject, and
    /// returns the stored row.
    async fn create_user(&self, user: User) -> Result<User, Report<StoreError>>;

    /// Loads the identity projection for a user, roles included.
    async fn fetch_user_identity(
        &self,
        user_id: UserId,
    ) -> Result<Option<UserIdentity>, Report<StoreError>>;
}

/// Storage for pre-provisioned office users.
#[async_trait]
pub trait OfficeUserStore: Send + Sync {
    /// Finds an office user by email, ignoring case.
    async fn fetch_office_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<OfficeUser>, Report<StoreError>>;

    /// Links an unclaimed office user to `user_id` and returns the stored
    /// record. A record that is already claimed is returned unchanged.
    async fn claim_office_user(
        &self,
        id: OfficeUserId,
        user_id: UserId,
    ) -> Result<OfficeUser, Report<StoreError>>;
}

/// Storage for pre-provisioned admin users.
#[async_trait]
pub trait AdminUserStore: Send + Sync {
    /// Finds an admin user by email, ignoring case.
    async fn fetch_admin_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<AdminUser>, Report<StoreError>>;

    /// Links an unclaimed admin user to `user_id` and returns the stored
    /// record. A record that is already claimed is returned unchanged.
    async fn claim_admin_user(
        &self,
        id: AdminUserId,
        user_id: UserId,
    ) -> Result<AdminUser, Report<StoreError>>;
}

/// Registry of client certificates.
#[async_trait]
pub trait ClientCertStore: Send + Sync {
    /// Finds a client certificate by the hex SHA-256 of its DER bytes.
    async fn fetch_client_cert(
        &self,
        sha256_digest: &str,
    ) -> Result<Option<ClientCert>, Report<StoreError>>;
}

/// Everything the login flow needs from storage.
pub trait IdentityStore: UserStore + OfficeUserStore + AdminUserStore {}

impl<T: UserStore + OfficeUserStore + AdminUserStore> IdentityStore for T {}
