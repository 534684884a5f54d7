//! The per-request session value.
//!
//! A session is carried in a signed cookie and never stored server-side.
//! Handlers treat it as an immutable value: each stage of a login returns a
//! new session, and only the final value is written back to the cookie.

use portal_core::{AdminUserId, OfficeUserId, ServiceMemberId, UserId};
use serde::{Deserialize, Serialize};

use crate::application::Application;
use crate::role::{RoleSet, RoleType};

/// Where a session is in the login lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No identity token.
    Anonymous,
    /// The provider has vouched for the caller but authorization has not
    /// finished.
    PendingIdentity,
    /// The caller is logged in to the session's application.
    Authenticated,
}

/// A session for one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    application: Application,
    hostname: String,
    #[serde(default)]
    user_id: Option<UserId>,
    #[serde(default)]
    service_member_id: Option<ServiceMemberId>,
    #[serde(default)]
    office_user_id: Option<OfficeUserId>,
    #[serde(default)]
    admin_user_id: Option<AdminUserId>,
    /// Empty when logged out.
    #[serde(default)]
    id_token: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    middle: String,
    #[serde(default)]
    roles: RoleSet,
}

impl Session {
    /// Creates an anonymous session for a request.
    #[must_use]
    pub fn new(application: Application, hostname: String) -> Self {
        Self {
            application,
            hostname,
            user_id: None,
            service_member_id: None,
            office_user_id: None,
            admin_user_id: None,
            id_token: String::new(),
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            middle: String::new(),
            roles: RoleSet::none(),
        }
    }

    #[must_use]
    pub fn application(&self) -> Application {
        self.application
    }

    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    #[must_use]
    pub fn service_member_id(&self) -> Option<ServiceMemberId> {
        self.service_member_id
    }

    #[must_use]
    pub fn office_user_id(&self) -> Option<OfficeUserId> {
        self.office_user_id
    }

    #[must_use]
    pub fn admin_user_id(&self) -> Option<AdminUserId> {
        self.admin_user_id
    }

    #[must_use]
    pub fn id_token(&self) -> &str {
        &self.id_token
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    #[must_use]
    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    #[must_use]
    pub fn middle(&self) -> &str {
        &self.middle
    }

    #[must_use]
    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    #[must_use]
    pub fn is_mil_app(&self) -> bool {
        self.application == Application::Mil
    }

    #[must_use]
    pub fn is_office_app(&self) -> bool {
        self.application == Application::Office
    }

    #[must_use]
    pub fn is_admin_app(&self) -> bool {
        self.application == Application::Admin
    }

    /// Returns true if the session carries the given role.
    #[must_use]
    pub fn has_role(&self, role_type: RoleType) -> bool {
        self.roles.has_role(role_type)
    }

    /// Returns true if a user has logged in through this session.
    ///
    /// This includes office sessions admitted through the Transportation
    /// Ordering Officer role, which carry no office user record.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        !self.id_token.is_empty() && self.user_id.is_some()
    }

    /// Returns true if the session is fully authenticated for its
    /// application.
    ///
    /// Office sessions additionally require an office user record and admin
    /// sessions an admin user record.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        if !self.is_logged_in() {
            return false;
        }
        match self.application {
            Application::Mil => true,
            Application::Office => self.office_user_id.is_some(),
            Application::Admin => self.admin_user_id.is_some(),
        }
    }

    /// Returns the lifecycle state of the session.
    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.id_token.is_empty() {
            SessionState::Anonymous
        } else if self.is_authenticated() {
            SessionState::Authenticated
        } else {
            SessionState::PendingIdentity
        }
    }

    /// Records the provider's identity token and email.
    #[must_use]
    pub fn with_provider_identity(mut self, id_token: String, email: String) -> Self {
        self.id_token = id_token;
        self.email = email;
        self
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    #[must_use]
    pub fn with_service_member_id(mut self, service_member_id: ServiceMemberId) -> Self {
        self.service_member_id = Some(service_member_id);
        self
    }

    #[must_use]
    pub fn with_office_user_id(mut self, office_user_id: OfficeUserId) -> Self {
        self.office_user_id = Some(office_user_id);
        self
    }

    #[must_use]
    pub fn with_admin_user_id(mut self, admin_user_id: AdminUserId) -> Self {
        self.admin_user_id = Some(admin_user_id);
        self
    }

    /// Sets the display names. Empty values leave the current name in place.
    #[must_use]
    pub fn with_names(mut self, first_name: &str, middle: &str, last_name: &str) -> Self {
        if !first_name.is_empty() {
            self.first_name = first_name.to_string();
        }
        if !middle.is_empty() {
            self.middle = middle.to_string();
        }
        if !last_name.is_empty() {
            self.last_name = last_name.to_string();
        }
        self
    }

    #[must_use]
    pub fn with_role(mut self, role_type: RoleType) -> Self {
        self.roles = self.roles.with_role(role_type);
        self
    }

    /// Returns the session as it should be stored after logout.
    ///
    /// The identity token, user and sub-identity ids, and roles are cleared.
    /// The application and hostname are kept.
    #[must_use]
    pub fn logged_out(self) -> Self {
        Self::new(self.application, self.hostname)
    }
}
