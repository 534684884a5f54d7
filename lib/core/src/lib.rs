//! Core identifier types and utilities shared by the portal authentication crates.
//!
//! This crate provides the strongly-typed record identifiers used throughout
//! the workspace.

pub mod id;

pub use id::{
    AdminUserId, ClientCertId, Id, IdKind, OfficeUserId, ParseIdError, RoleId, ServiceMemberId,
    UserId,
};
