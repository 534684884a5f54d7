//! In-memory identity storage for tests and local development.

use async_trait::async_trait;
use portal_core::{AdminUserId, OfficeUserId, ServiceMemberId, UserId};
use rootcause::prelude::Report;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::client_cert::ClientCert;
use crate::error::StoreError;
use crate::role::Role;
use crate::store::{AdminUserStore, ClientCertStore, OfficeUserStore, UserStore};
use crate::user::{AdminUser, OfficeUser, User, UserIdentity};

#[derive(Debug, Clone)]
struct ServiceMemberRow {
    id: ServiceMemberId,
    first_name: Option<String>,
    middle: Option<String>,
    last_name: Option<String>,
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    roles: HashMap<UserId, Vec<Role>>,
    service_members: HashMap<UserId, ServiceMemberRow>,
    office_users: HashMap<OfficeUserId, OfficeUser>,
    admin_users: HashMap<AdminUserId, AdminUser>,
    client_certs: HashMap<String, ClientCert>,
}

/// In-memory implementation of every store trait.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    client_cert_lookups: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_office_user(&self, office_user: OfficeUser) {
        self.tables
            .write()
            .await
            .office_users
            .insert(office_user.id(), office_user);
    }

    pub async fn insert_admin_user(&self, admin_user: AdminUser) {
        self.tables
            .write()
            .await
            .admin_users
            .insert(admin_user.id(), admin_user);
    }

    pub async fn insert_client_cert(&self, cert: ClientCert) {
        self.tables
            .write()
            .await
            .client_certs
            .insert(cert.sha256_digest().to_string(), cert);
    }

    /// Grants a role to a user.
    pub async fn assign_role(&self, user_id: UserId, role: Role) {
        let mut tables = self.tables.write().await;
        let roles = tables.roles.entry(user_id).or_default();
        if !roles.iter().any(|r| r.role_type() == role.role_type()) {
            roles.push(role);
        }
    }

    /// Attaches a service member profile to a user.
    pub async fn insert_service_member(
        &self,
        user_id: UserId,
        id: ServiceMemberId,
        first_name: Option<String>,
        middle: Option<String>,
        last_name: Option<String>,
    ) {
        self.tables.write().await.service_members.insert(
            user_id,
            ServiceMemberRow {
                id,
                first_name,
                middle,
                last_name,
            },
        );
    }

    pub async fn user_count(&self) -> usize {
        self.tables.read().await.users.len()
    }

    pub async fn office_user(&self, id: OfficeUserId) -> Option<OfficeUser> {
        self.tables.read().await.office_users.get(&id).cloned()
    }

    pub async fn admin_user(&self, id: AdminUserId) -> Option<AdminUser> {
        self.tables.read().await.admin_users.get(&id).cloned()
    }

    /// Number of client certificate lookups served so far.
    #[must_use]
    pub fn client_cert_lookups(&self) -> usize {
        self.client_cert_lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_login_gov_uuid(
        &self,
        login_gov_uuid: &str,
    ) -> Result<Option<User>, Report<StoreError>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.login_gov_uuid() == login_gov_uuid)
            .cloned())
    }

    async fn create_user(&self, user: User) -> Result<User, Report<StoreError>> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables
            .users
            .values()
            .find(|u| u.login_gov_uuid() == user.login_gov_uuid())
        {
            return Ok(existing.clone());
        }
        tables.users.insert(user.id(), user.clone());
        Ok(user)
    }

    async fn fetch_user_identity(
        &self,
        user_id: UserId,
    ) -> Result<Option<UserIdentity>, Report<StoreError>> {
        let tables = self.tables.read().await;
        let Some(user) = tables.users.get(&user_id) else {
            return Ok(None);
        };

        let office = tables
            .office_users
            .values()
            .find(|o| o.user_id() == Some(user_id));
        let admin = tables
            .admin_users
            .values()
            .find(|a| a.user_id() == Some(user_id));
        let service_member = tables.service_members.get(&user_id);

        let first_name = service_member
            .and_then(|sm| sm.first_name.clone())
            .or_else(|| office.map(|o| o.first_name().to_string()));
        let last_name = service_member
            .and_then(|sm| sm.last_name.clone())
            .or_else(|| office.map(|o| o.last_name().to_string()));

        Ok(Some(UserIdentity {
            id: user.id(),
            login_gov_email: user.login_gov_email().to_string(),
            service_member_id: service_member.map(|sm| sm.id),
            office_user_id: office.map(OfficeUser::id),
            office_active: office.map(OfficeUser::is_active),
            admin_user_id: admin.map(AdminUser::id),
            admin_active: admin.map(AdminUser::is_active),
            first_name,
            last_name,
            middle: service_member.and_then(|sm| sm.middle.clone()),
            roles: tables.roles.get(&user_id).cloned().unwrap_or_default(),
        }))
    }
}

#[async_trait]
impl OfficeUserStore for MemoryStore {
    async fn fetch_office_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<OfficeUser>, Report<StoreError>> {
        let tables = self.tables.read().await;
        Ok(tables
            .office_users
            .values()
            .find(|o| o.email().eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn claim_office_user(
        &self,
        id: OfficeUserId,
        user_id: UserId,
    ) -> Result<OfficeUser, Report<StoreError>> {
        let mut tables = self.tables.write().await;
        let Some(record) = tables.office_users.remove(&id) else {
            return Err(StoreError::Inconsistent {
                details: format!("office user {id} disappeared while claiming"),
            }
            .into());
        };
        let record = record.claimed_by(user_id);
        tables.office_users.insert(id, record.clone());
        Ok(record)
    }
}

#[async_trait]
impl AdminUserStore for MemoryStore {
    async fn fetch_admin_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<AdminUser>, Report<StoreError>> {
        let tables = self.tables.read().await;
        Ok(tables
            .admin_users
            .values()
            .find(|a| a.email().eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn claim_admin_user(
        &self,
        id: AdminUserId,
        user_id: UserId,
    ) -> Result<AdminUser, Report<StoreError>> {
        let mut tables = self.tables.write().await;
        let Some(record) = tables.admin_users.remove(&id) else {
            return Err(StoreError::Inconsistent {
                details: format!("admin user {id} disappeared while claiming"),
            }
            .into());
        };
        let record = record.claimed_by(user_id);
        tables.admin_users.insert(id, record.clone());
        Ok(record)
    }
}

#[async_trait]
impl ClientCertStore for MemoryStore {
    async fn fetch_client_cert(
        &self,
        sha256_digest: &str,
    ) -> Result<Option<ClientCert>, Report<StoreError>> {
        self.client_cert_lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .tables
            .read()
            .await
            .client_certs
            .get(sha256_digest)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::RoleType;
    use portal_core::RoleId;

    #[tokio::test]
    async fn create_user_is_idempotent_per_subject() {
        let store = MemoryStore::new();
        let first = store
            .create_user(User::new("sub-1".to_string(), "a@example.com".to_string()))
            .await
            .expect("create");
        let second = store
            .create_user(User::new("sub-1".to_string(), "a@example.com".to_string()))
            .await
            .expect("create again");
        assert_eq!(first.id(), second.id());
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn office_user_lookup_ignores_case() {
        let store = MemoryStore::new();
        let record = OfficeUser::new(
            OfficeUserId::new(),
            "Too@Example.mil".to_string(),
            true,
            None,
            "Tess".to_string(),
            "Officer".to_string(),
        );
        store.insert_office_user(record.clone()).await;
        let found = store
            .fetch_office_user_by_email("too@example.MIL")
            .await
            .expect("lookup");
        assert_eq!(found, Some(record));
    }

    #[tokio::test]
    async fn identity_includes_roles_and_claimed_records() {
        let store = MemoryStore::new();
        let user = store
            .create_user(User::new("sub-2".to_string(), "too@example.mil".to_string()))
            .await
            .expect("create");
        let office_id = OfficeUserId::new();
        store
            .insert_office_user(OfficeUser::new(
                office_id,
                "too@example.mil".to_string(),
                true,
                None,
                "Tess".to_string(),
                "Officer".to_string(),
            ))
            .await;
        store
            .claim_office_user(office_id, user.id())
            .await
            .expect("claim");
        store
            .assign_role(
                user.id(),
                Role::new(
                    RoleId::new(),
                    RoleType::TransportationOrderingOfficer,
                    "Transportation Ordering Officer".to_string(),
                ),
            )
            .await;

        let identity = store
            .fetch_user_identity(user.id())
            .await
            .expect("fetch")
            .expect("identity exists");
        assert_eq!(identity.office_user_id, Some(office_id));
        assert_eq!(identity.office_active, Some(true));
        assert_eq!(identity.first_name.as_deref(), Some("Tess"));
        assert!(identity
            .role_set()
            .has_role(RoleType::TransportationOrderingOfficer));
    }

    #[tokio::test]
    async fn identity_for_unknown_user_is_none() {
        let store = MemoryStore::new();
        let identity = store
            .fetch_user_identity(UserId::new())
            .await
            .expect("fetch");
        assert!(identity.is_none());
    }
}
