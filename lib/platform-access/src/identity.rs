//! Resolution of an external identity to internal records.
//!
//! These collaborators do the storage work behind a login: creating the
//! user, claiming pre-provisioned office and admin records, and loading the
//! identity projection used by the TOO role check.

use portal_core::{AdminUserId, OfficeUserId};
use rootcause::prelude::Report;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{AuthorizationError, StoreError};
use crate::role::{Role, RoleType};
use crate::session::Session;
use crate::store::{AdminUserStore, OfficeUserStore, UserStore};
use crate::user::{AdminUser, OfficeUser, OpenIdUser, User, UserIdentity};

/// Outcome of linking a user to a pre-provisioned record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Association<Id> {
    /// The record exists, is active, and is linked to the user.
    Associated(Id),
    /// No record matches the user's email.
    NotFound,
    /// A record matches but has been deactivated.
    Deactivated,
}

/// Creates users on first login.
#[derive(Clone)]
pub struct UserCreator {
    store: Arc<dyn UserStore>,
}

impl UserCreator {
    #[must_use]
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Returns the user for an external identity, creating it if needed.
    ///
    /// Repeated calls for the same subject return the same user.
    pub async fn get_or_create(&self, open_id: &OpenIdUser) -> Result<User, Report<StoreError>> {
        if let Some(user) = self
            .store
            .find_user_by_login_gov_uuid(&open_id.user_id)
            .await?
        {
            return Ok(user);
        }

        let user = self
            .store
            .create_user(User::new(open_id.user_id.clone(), open_id.email.clone()))
            .await?;
        info!(user_id = %user.id(), email = %user.login_gov_email(), "created user on first login");
        Ok(user)
    }
}

/// Links users to pre-provisioned office user records.
#[derive(Clone)]
pub struct OfficeUserAssociator {
    store: Arc<dyn OfficeUserStore>,
}

impl OfficeUserAssociator {
    #[must_use]
    pub fn new(store: Arc<dyn OfficeUserStore>) -> Self {
        Self { store }
    }

    /// Finds the office user for an email, ignoring case.
    pub async fn fetch_office_user(
        &self,
        email: &str,
    ) -> Result<Option<OfficeUser>, Report<StoreError>> {
        self.store.fetch_office_user_by_email(email).await
    }

    /// Claims the office user matching `email`, the address the identity
    /// provider returned for this login, on behalf of `user`.
    pub async fn associate_office_user(
        &self,
        user: &User,
        email: &str,
    ) -> Result<Association<OfficeUserId>, Report<StoreError>> {
        let Some(record) = self.fetch_office_user(email).await? else {
            return Ok(Association::NotFound);
        };
        if !record.is_active() {
            return Ok(Association::Deactivated);
        }
        if record.user_id().is_none() {
            let claimed = self.store.claim_office_user(record.id(), user.id()).await?;
            debug!(office_user_id = %claimed.id(), user_id = %user.id(), "claimed office user");
        }
        Ok(Association::Associated(record.id()))
    }
}

/// Links users to pre-provisioned admin user records.
#[derive(Clone)]
pub struct AdminUserAssociator {
    store: Arc<dyn AdminUserStore>,
}

impl AdminUserAssociator {
    #[must_use]
    pub fn new(store: Arc<dyn AdminUserStore>) -> Self {
        Self { store }
    }

    /// Finds the admin user for an email, ignoring case.
    pub async fn fetch_admin_user(
        &self,
        email: &str,
    ) -> Result<Option<AdminUser>, Report<StoreError>> {
        self.store.fetch_admin_user_by_email(email).await
    }

    /// Claims the admin user matching `email`, the address the identity
    /// provider returned for this login, on behalf of `user`.
    pub async fn associate_admin_user(
        &self,
        user: &User,
        email: &str,
    ) -> Result<Association<AdminUserId>, Report<StoreError>> {
        let Some(record) = self.fetch_admin_user(email).await? else {
            return Ok(Association::NotFound);
        };
        if !record.is_active() {
            return Ok(Association::Deactivated);
        }
        if record.user_id().is_none() {
            let claimed = self.store.claim_admin_user(record.id(), user.id()).await?;
            debug!(admin_user_id = %claimed.id(), user_id = %user.id(), "claimed admin user");
        }
        Ok(Association::Associated(record.id()))
    }
}

/// Checks whether a user holds the Transportation Ordering Officer role.
#[derive(Clone)]
pub struct TooRoleChecker {
    store: Arc<dyn UserStore>,
}

impl TooRoleChecker {
    #[must_use]
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Loads the identity projection for `user`, roles included.
    pub async fn fetch_user_identity(
        &self,
        user: &User,
    ) -> Result<UserIdentity, Report<StoreError>> {
        self.store
            .fetch_user_identity(user.id())
            .await?
            .ok_or_else(|| {
                StoreError::Inconsistent {
                    details: format!("no identity for user {}", user.id()),
                }
                .into()
            })
    }

    /// Returns the TOO role held by `identity`.
    ///
    /// Only inspects the loaded projection.
    pub fn verify_has_too_role(
        identity: &UserIdentity,
    ) -> Result<Role, Report<AuthorizationError>> {
        identity
            .roles
            .iter()
            .find(|role| role.role_type() == RoleType::TransportationOrderingOfficer)
            .cloned()
            .ok_or_else(|| {
                AuthorizationError::TooUnauthorized {
                    user_id: identity.id,
                }
                .into()
            })
    }
}

/// Finds or creates the user behind an external identity and attaches what
/// is already known about them to the session.
#[derive(Clone)]
pub struct IdentityResolver {
    users: UserCreator,
    store: Arc<dyn UserStore>,
}

impl IdentityResolver {
    #[must_use]
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self {
            users: UserCreator::new(store.clone()),
            store,
        }
    }

    /// Returns the session with the user id, service member id, and names
    /// set, together with the resolved user.
    pub async fn resolve(
        &self,
        session: Session,
        open_id: &OpenIdUser,
    ) -> Result<(Session, User), Report<StoreError>> {
        let user = self.users.get_or_create(open_id).await?;
        let mut session = session.with_user_id(user.id()).with_names(
            open_id.first_name.as_deref().unwrap_or_default(),
            "",
            open_id.last_name.as_deref().unwrap_or_default(),
        );

        if let Some(identity) = self.store.fetch_user_identity(user.id()).await? {
            if let Some(service_member_id) = identity.service_member_id {
                session = session.with_service_member_id(service_member_id);
            }
            session = session.with_names(
                identity.first_name.as_deref().unwrap_or_default(),
                identity.middle.as_deref().unwrap_or_default(),
                identity.last_name.as_deref().unwrap_or_default(),
            );
        }

        Ok((session, user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::Application;
    use crate::memory::MemoryStore;
    use portal_core::{RoleId, ServiceMemberId, UserId};

    fn open_id(sub: &str, email: &str) -> OpenIdUser {
        OpenIdUser {
            user_id: sub.to_string(),
            email: email.to_string(),
            first_name: None,
            last_name: None,
        }
    }

    fn office_user(email: &str, active: bool, user_id: Option<UserId>) -> OfficeUser {
        OfficeUser::new(
            OfficeUserId::new(),
            email.to_string(),
            active,
            user_id,
            "Tess".to_string(),
            "Officer".to_string(),
        )
    }

    #[tokio::test]
    async fn get_or_create_creates_once() {
        let store = Arc::new(MemoryStore::new());
        let creator = UserCreator::new(store.clone());
        let first = creator
            .get_or_create(&open_id("sub-1", "a@example.com"))
            .await
            .expect("create");
        let second = creator
            .get_or_create(&open_id("sub-1", "a@example.com"))
            .await
            .expect("find");
        assert_eq!(first, second);
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn associate_claims_unlinked_record() {
        let store = Arc::new(MemoryStore::new());
        let record = office_user("too@example.mil", true, None);
        store.insert_office_user(record.clone()).await;
        let user = User::new("sub-1".to_string(), "TOO@example.mil".to_string());

        let outcome = OfficeUserAssociator::new(store.clone())
            .associate_office_user(&user, "TOO@example.mil")
            .await
            .expect("associate");
        assert_eq!(outcome, Association::Associated(record.id()));
        let stored = store.office_user(record.id()).await.expect("record");
        assert_eq!(stored.user_id(), Some(user.id()));
    }

    #[tokio::test]
    async fn associate_keeps_existing_claim() {
        let store = Arc::new(MemoryStore::new());
        let original = UserId::new();
        let record = office_user("too@example.mil", true, Some(original));
        store.insert_office_user(record.clone()).await;
        let user = User::new("sub-2".to_string(), "too@example.mil".to_string());

        let outcome = OfficeUserAssociator::new(store.clone())
            .associate_office_user(&user, "too@example.mil")
            .await
            .expect("associate");
        assert_eq!(outcome, Association::Associated(record.id()));
        let stored = store.office_user(record.id()).await.expect("record");
        assert_eq!(stored.user_id(), Some(original));
    }

    #[tokio::test]
    async fn associate_reports_deactivated_and_missing() {
        let store = Arc::new(MemoryStore::new());
        let record = office_user("gone@example.mil", false, None);
        store.insert_office_user(record.clone()).await;
        let associator = OfficeUserAssociator::new(store.clone());

        let deactivated = associator
            .associate_office_user(
                &User::new("sub-3".to_string(), "gone@example.mil".to_string()),
                "gone@example.mil",
            )
            .await
            .expect("associate");
        assert_eq!(deactivated, Association::Deactivated);
        let stored = store.office_user(record.id()).await.expect("record");
        assert_eq!(stored.user_id(), None);

        let missing = associator
            .associate_office_user(
                &User::new("sub-4".to_string(), "nobody@example.mil".to_string()),
                "nobody@example.mil",
            )
            .await
            .expect("associate");
        assert_eq!(missing, Association::NotFound);
    }

    #[tokio::test]
    async fn admin_associate_claims_record() {
        let store = Arc::new(MemoryStore::new());
        let record = AdminUser::new(
            AdminUserId::new(),
            "admin@example.mil".to_string(),
            true,
            None,
            "Ada".to_string(),
            "Admin".to_string(),
        );
        store.insert_admin_user(record.clone()).await;
        let user = User::new("sub-5".to_string(), "old-admin@example.mil".to_string());

        let outcome = AdminUserAssociator::new(store.clone())
            .associate_admin_user(&user, "admin@example.mil")
            .await
            .expect("associate");
        assert_eq!(outcome, Association::Associated(record.id()));
        let stored = store.admin_user(record.id()).await.expect("record");
        assert_eq!(stored.user_id(), Some(user.id()));
    }

    #[tokio::test]
    async fn too_check_inspects_loaded_roles() {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .create_user(User::new("sub-6".to_string(), "too@example.mil".to_string()))
            .await
            .expect("create");
        let checker = TooRoleChecker::new(store.clone());

        let identity = checker.fetch_user_identity(&user).await.expect("identity");
        let err = TooRoleChecker::verify_has_too_role(&identity).expect_err("no role yet");
        assert_eq!(
            err.current_context(),
            &AuthorizationError::TooUnauthorized { user_id: user.id() }
        );

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
        let identity = checker.fetch_user_identity(&user).await.expect("identity");
        let role = TooRoleChecker::verify_has_too_role(&identity).expect("has role");
        assert_eq!(role.role_type(), RoleType::TransportationOrderingOfficer);
    }

    #[tokio::test]
    async fn too_check_fails_for_unknown_user() {
        let checker = TooRoleChecker::new(Arc::new(MemoryStore::new()));
        let user = User::new("sub-7".to_string(), "x@example.mil".to_string());
        let err = checker
            .fetch_user_identity(&user)
            .await
            .expect_err("no identity");
        assert!(matches!(
            err.current_context(),
            StoreError::Inconsistent { .. }
        ));
    }

    #[tokio::test]
    async fn resolve_attaches_service_member_and_names() {
        let store = Arc::new(MemoryStore::new());
        let resolver = IdentityResolver::new(store.clone());
        let login = OpenIdUser {
            user_id: "sub-8".to_string(),
            email: "sm@example.com".to_string(),
            first_name: Some("Sam".to_string()),
            last_name: Some("Member".to_string()),
        };

        let session = Session::new(Application::Mil, "milmovelocal".to_string());
        let (session, user) = resolver
            .resolve(session, &login)
            .await
            .expect("resolve");
        assert_eq!(session.user_id(), Some(user.id()));
        assert_eq!(session.service_member_id(), None);
        assert_eq!(session.first_name(), "Sam");

        let sm_id = ServiceMemberId::new();
        store
            .insert_service_member(
                user.id(),
                sm_id,
                Some("Samuel".to_string()),
                Some("J".to_string()),
                Some("Member".to_string()),
            )
            .await;
        let session = Session::new(Application::Mil, "milmovelocal".to_string());
        let (session, _) = resolver
            .resolve(session, &login)
            .await
            .expect("resolve");
        assert_eq!(session.service_member_id(), Some(sm_id));
        assert_eq!(session.first_name(), "Samuel");
        assert_eq!(session.middle(), "J");
    }
}
