//! Identity and authorization for the portal.
//!
//! This crate provides:
//! - The `Session` value carried in each application's cookie
//! - Users, pre-provisioned office and admin records, and roles
//! - Storage seams (`UserStore`, `OfficeUserStore`, `AdminUserStore`,
//!   `ClientCertStore`) with an in-memory implementation
//! - `RoleAuthorizer`, the login authorization decision
//! - `CertVerifier`, the mutual-TLS client certificate check
//! - `LoginGovConfig`, the identity provider configuration
//!
//! # Example
//!
//! ```
//! use portal_platform_access::{Application, MemoryStore, OpenIdUser, RoleAuthorizer, Session};
//! use std::sync::Arc;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let authorizer = RoleAuthorizer::new(Arc::new(MemoryStore::new()));
//!
//! let session = Session::new(Application::Mil, "milmovelocal".to_string())
//!     .with_provider_identity("id-token".to_string(), "sm@example.com".to_string());
//! let login = OpenIdUser {
//!     user_id: "provider-subject".to_string(),
//!     email: "sm@example.com".to_string(),
//!     first_name: None,
//!     last_name: None,
//! };
//!
//! let session = authorizer.authorize(session, &login).await.unwrap();
//! assert!(session.is_authenticated());
//! # });
//! ```

pub mod application;
pub mod authorizer;
pub mod client_cert;
pub mod error;
pub mod identity;
pub mod login_gov;
pub mod memory;
pub mod role;
pub mod session;
pub mod store;
pub mod user;

// Re-export main types at crate root
pub use application::{Application, ApplicationHosts};
pub use authorizer::RoleAuthorizer;
pub use client_cert::{
    Branch, BranchAccess, CertVerifier, ClientCert, ClientCertPermissions, OrdersOperation,
    client_cert_digest,
};
pub use error::{AuthorizationError, CertError, StoreError};
pub use identity::{
    AdminUserAssociator, Association, IdentityResolver, OfficeUserAssociator, TooRoleChecker,
    UserCreator,
};
pub use login_gov::{CALLBACK_PATH, LoginGovConfig};
pub use memory::MemoryStore;
pub use role::{Role, RoleSet, RoleType, UnknownRoleType};
pub use session::{Session, SessionState};
pub use store::{AdminUserStore, ClientCertStore, IdentityStore, OfficeUserStore, UserStore};
pub use user::{AdminUser, OfficeUser, OpenIdUser, User, UserIdentity};
