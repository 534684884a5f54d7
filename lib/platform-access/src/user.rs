//! User records and the identity projections built from them.
//!
//! A `User` is created exactly once per external identity, the first time
//! that identity logs in. `OfficeUser` and `AdminUser` rows are provisioned
//! out of band and are only ever *claimed* here: their `user_id` moves from
//! unset to the id of the logging-in user.

use portal_core::{AdminUserId, OfficeUserId, ServiceMemberId, UserId};
use serde::{Deserialize, Serialize};

use crate::role::{Role, RoleSet};

/// A persisted user, keyed by the identity provider's subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    id: UserId,
    login_gov_uuid: String,
    login_gov_email: String,
}

impl User {
    /// Creates a new user with a freshly generated id.
    #[must_use]
    pub fn new(login_gov_uuid: String, login_gov_email: String) -> Self {
        Self::with_id(UserId::new(), login_gov_uuid, login_gov_email)
    }

    /// Reconstitutes a user from storage.
    #[must_use]
    pub fn with_id(id: UserId, login_gov_uuid: String, login_gov_email: String) -> Self {
        Self {
            id,
            login_gov_uuid,
            login_gov_email,
        }
    }

    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    /// The identity provider's subject for this user.
    #[must_use]
    pub fn login_gov_uuid(&self) -> &str {
        &self.login_gov_uuid
    }

    #[must_use]
    pub fn login_gov_email(&self) -> &str {
        &self.login_gov_email
    }
}

/// Fields shared by the pre-provisioned staff records.
macro_rules! define_staff_record {
    ($(#[$meta:meta])* $name:ident, $id:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            id: $id,
            email: String,
            active: bool,
            user_id: Option<UserId>,
            first_name: String,
            last_name: String,
        }

        impl $name {
            #[must_use]
            pub fn new(
                id: $id,
                email: String,
                active: bool,
                user_id: Option<UserId>,
                first_name: String,
                last_name: String,
            ) -> Self {
                Self {
                    id,
                    email,
                    active,
                    user_id,
                    first_name,
                    last_name,
                }
            }

            #[must_use]
            pub fn id(&self) -> $id {
                self.id
            }

            #[must_use]
            pub fn email(&self) -> &str {
                &self.email
            }

            #[must_use]
            pub fn is_active(&self) -> bool {
                self.active
            }

            /// The user that claimed this record, if any.
            #[must_use]
            pub fn user_id(&self) -> Option<UserId> {
                self.user_id
            }

            #[must_use]
            pub fn first_name(&self) -> &str {
                &self.first_name
            }

            #[must_use]
            pub fn last_name(&self) -> &str {
                &self.last_name
            }

            /// Returns the record linked to `user_id`, unless it was
            /// already claimed, in which case it is returned unchanged.
            #[must_use]
            pub fn claimed_by(mut self, user_id: UserId) -> Self {
                if self.user_id.is_none() {
                    self.user_id = Some(user_id);
                }
                self
            }
        }
    };
}

define_staff_record!(
    /// A pre-provisioned office-staff record.
    OfficeUser,
    OfficeUserId
);

define_staff_record!(
    /// A pre-provisioned administrator record.
    AdminUser,
    AdminUserId
);

/// A read-optimized view of everything known about a user.
///
/// Loaded in one go so that role checks can run without further storage
/// access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: UserId,
    pub login_gov_email: String,
    pub service_member_id: Option<ServiceMemberId>,
    pub office_user_id: Option<OfficeUserId>,
    pub office_active: Option<bool>,
    pub admin_user_id: Option<AdminUserId>,
    pub admin_active: Option<bool>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub middle: Option<String>,
    pub roles: Vec<Role>,
}

impl UserIdentity {
    /// Returns the role types held by this identity.
    #[must_use]
    pub fn role_set(&self) -> RoleSet {
        self.roles.iter().map(Role::role_type).collect()
    }
}

/// The external identity returned by the provider's user-info endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenIdUser {
    /// The provider's subject.
    pub user_id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}
