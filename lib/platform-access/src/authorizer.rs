//! The login authorization decision.
//!
//! After the identity provider vouches for a caller, `RoleAuthorizer`
//! decides whether the caller may use the session's application and which
//! identity records and roles the session receives.
//!
//! The decision is a fixed tree:
//!
//! - Every login gets a user record.
//! - Admin logins need an active admin user record. There is no fallback.
//! - Office logins need an active office user record. When no record exists
//!   at all, a user holding the Transportation Ordering Officer role is
//!   admitted anyway. A deactivated record is never overridden.
//! - Customer logins need nothing further.

use rootcause::prelude::{Report, ResultExt};
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::Application;
use crate::error::AuthorizationError;
use crate::identity::{
    AdminUserAssociator, Association, IdentityResolver, OfficeUserAssociator, TooRoleChecker,
};
use crate::session::Session;
use crate::store::IdentityStore;
use crate::user::{OpenIdUser, User};

/// Maps a verified external identity to an authorized session.
#[derive(Clone)]
pub struct RoleAuthorizer {
    resolver: IdentityResolver,
    office_users: OfficeUserAssociator,
    admin_users: AdminUserAssociator,
    too_roles: TooRoleChecker,
}

impl RoleAuthorizer {
    /// Creates an authorizer whose collaborators all share `store`.
    #[must_use]
    pub fn new<S: IdentityStore + 'static>(store: Arc<S>) -> Self {
        Self {
            resolver: IdentityResolver::new(store.clone()),
            office_users: OfficeUserAssociator::new(store.clone()),
            admin_users: AdminUserAssociator::new(store.clone()),
            too_roles: TooRoleChecker::new(store),
        }
    }

    /// Authorizes `open_id` for the session's application.
    ///
    /// Returns the authorized session. On error nothing about the incoming
    /// session should be persisted.
    pub async fn authorize(
        &self,
        session: Session,
        open_id: &OpenIdUser,
    ) -> Result<Session, Report<AuthorizationError>> {
        let application = session.application();
        let (session, user) = self
            .resolver
            .resolve(session, open_id)
            .await
            .context(AuthorizationError::Store)?;

        let email = open_id.email.as_str();
        let session = match application {
            Application::Admin => self.authorize_admin(session, &user, email).await?,
            Application::Office => self.authorize_office(session, &user, email).await?,
            Application::Mil => session,
        };

        info!(
            user_id = %user.id(),
            email = %email,
            application = %application,
            "login authorized"
        );
        Ok(session)
    }

    async fn authorize_admin(
        &self,
        session: Session,
        user: &User,
        email: &str,
    ) -> Result<Session, Report<AuthorizationError>> {
        let outcome = self
            .admin_users
            .associate_admin_user(user, email)
            .await
            .context(AuthorizationError::Store)?;

        match outcome {
            Association::Associated(admin_user_id) => {
                Ok(session.with_admin_user_id(admin_user_id))
            }
            Association::NotFound => Err(unauthorized(email, Application::Admin).into()),
            Association::Deactivated => Err(deactivated(user, email, Application::Admin).into()),
        }
    }

    async fn authorize_office(
        &self,
        session: Session,
        user: &User,
        email: &str,
    ) -> Result<Session, Report<AuthorizationError>> {
        let outcome = self
            .office_users
            .associate_office_user(user, email)
            .await
            .context(AuthorizationError::Store)?;

        match outcome {
            Association::Associated(office_user_id) => {
                Ok(session.with_office_user_id(office_user_id))
            }
            Association::Deactivated => {
                Err(deactivated(user, email, Application::Office).into())
            }
            Association::NotFound => {
                let identity = self
                    .too_roles
                    .fetch_user_identity(user)
                    .await
                    .context(AuthorizationError::Store)?;
                let role = TooRoleChecker::verify_has_too_role(&identity).inspect_err(|_| {
                    warn!(
                        user_id = %user.id(),
                        email = %email,
                        "no office user record and no TOO role"
                    );
                })?;
                info!(
                    user_id = %user.id(),
                    email = %email,
                    "office login admitted by TOO role"
                );
                if session.has_role(role.role_type()) {
                    Ok(session)
                } else {
                    Ok(session.with_role(role.role_type()))
                }
            }
        }
    }
}

fn unauthorized(email: &str, application: Application) -> AuthorizationError {
    AuthorizationError::Unauthorized {
        email: email.to_string(),
        application,
    }
}

fn deactivated(user: &User, email: &str, application: Application) -> AuthorizationError {
    warn!(
        user_id = %user.id(),
        email = %email,
        application = %application,
        "login rejected for deactivated record"
    );
    AuthorizationError::UserDeactivated {
        email: email.to_string(),
        application,
    }
}
