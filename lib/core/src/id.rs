//! Strongly-typed ID types for identity records.
//!
//! Every record ID is an [`Id`] tagged with a kind marker, so a `UserId` can
//! never be passed where an `OfficeUserId` is expected. IDs wrap a ULID: they
//! sort by creation time and are stored as text.
//!
//! The text form carries the kind's prefix (`usr_01J...`). Parsing accepts
//! either the prefixed form or a bare ULID. The serde form is the bare ULID.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// A kind of record an [`Id`] can identify.
pub trait IdKind {
    /// Text prefix of the displayed form.
    const PREFIX: &'static str;
    /// Name used in parse errors.
    const NAME: &'static str;
}

/// Kind markers.
pub mod kind {
    use super::IdKind;

    macro_rules! kinds {
        ($($(#[$meta:meta])* $kind:ident => $prefix:literal, $name:literal;)*) => {
            $(
                $(#[$meta])*
                #[derive(Debug)]
                pub enum $kind {}

                impl IdKind for $kind {
                    const PREFIX: &'static str = $prefix;
                    const NAME: &'static str = $name;
                }
            )*
        };
    }

    kinds! {
        /// A platform user, created on first login.
        User => "usr", "UserId";
        /// A service member record owned by a customer user.
        ServiceMember => "sm", "ServiceMemberId";
        /// A pre-provisioned office user record.
        OfficeUser => "ofc", "OfficeUserId";
        /// A pre-provisioned admin user record.
        AdminUser => "adm", "AdminUserId";
        /// A role row.
        Role => "role", "RoleId";
        /// A registered mutual-TLS client certificate.
        ClientCert => "cert", "ClientCertId";
    }
}

pub type UserId = Id<kind::User>;
pub type ServiceMemberId = Id<kind::ServiceMember>;
pub type OfficeUserId = Id<kind::OfficeUser>;
pub type AdminUserId = Id<kind::AdminUser>;
pub type RoleId = Id<kind::Role>;
pub type ClientCertId = Id<kind::ClientCert>;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// An ID of a record of kind `K`.
pub struct Id<K> {
    ulid: Ulid,
    kind: PhantomData<fn() -> K>,
}

impl<K> Id<K> {
    /// Generates a fresh ID.
    #[must_use]
    pub fn new() -> Self {
        Self::from_ulid(Ulid::new())
    }

    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            kind: PhantomData,
        }
    }

    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<K> Default for Id<K> {
    fn default() -> Self {
        Self::new()
    }
}

// Implemented by hand so the marker `K` needs no bounds.

impl<K> Clone for Id<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Id<K> {}

impl<K> PartialEq for Id<K> {
    fn eq(&self, other: &Self) -> bool {
        self.ulid == other.ulid
    }
}

impl<K> Eq for Id<K> {}

impl<K> PartialOrd for Id<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Id<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ulid.cmp(&other.ulid)
    }
}

impl<K> Hash for Id<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ulid.hash(state);
    }
}

impl<K: IdKind> fmt::Debug for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", K::NAME, self.ulid)
    }
}

impl<K: IdKind> fmt::Display for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", K::PREFIX, self.ulid)
    }
}

impl<K: IdKind> FromStr for Id<K> {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s
            .strip_prefix(K::PREFIX)
            .and_then(|rest| rest.strip_prefix('_'))
            .unwrap_or(s);

        Ulid::from_str(raw)
            .map(Self::from_ulid)
            .map_err(|e| ParseIdError {
                id_type: K::NAME,
                reason: e.to_string(),
            })
    }
}

impl<K> From<Ulid> for Id<K> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<K> Serialize for Id<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.ulid.serialize(serializer)
    }
}

impl<'de, K> Deserialize<'de> for Id<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ulid::deserialize(deserializer).map(Self::from_ulid)
    }
}
