//! Role types and role sets.
//!
//! Roles are persisted rows linked many-to-many with users. A session only
//! carries the role *types* it was granted at login. Roles are additive:
//! nothing in this crate revokes a role.

use portal_core::RoleId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleType {
    Customer,
    /// Transportation Ordering Officer.
    TransportationOrderingOfficer,
    /// Transportation Invoicing Officer.
    TransportationInvoicingOfficer,
    ContractingOfficer,
    ServicesCounselor,
    PrimeSimulator,
    QaeCsr,
}

impl RoleType {
    /// Returns the stored string form of the role type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::TransportationOrderingOfficer => "transportation_ordering_officer",
            Self::TransportationInvoicingOfficer => "transportation_invoicing_officer",
            Self::ContractingOfficer => "contracting_officer",
            Self::ServicesCounselor => "services_counselor",
            Self::PrimeSimulator => "prime_simulator",
            Self::QaeCsr => "qae_csr",
        }
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored role type string is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRoleType(pub String);

impl fmt::Display for UnknownRoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role type '{}'", self.0)
    }
}

impl std::error::Error for UnknownRoleType {}

impl std::str::FromStr for RoleType {
    type Err = UnknownRoleType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "transportation_ordering_officer" => Ok(Self::TransportationOrderingOfficer),
            "transportation_invoicing_officer" => Ok(Self::TransportationInvoicingOfficer),
            "contracting_officer" => Ok(Self::ContractingOfficer),
            "services_counselor" => Ok(Self::ServicesCounselor),
            "prime_simulator" => Ok(Self::PrimeSimulator),
            "qae_csr" => Ok(Self::QaeCsr),
            other => Err(UnknownRoleType(other.to_string())),
        }
    }
}

/// A persisted role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    id: RoleId,
    role_type: RoleType,
    role_name: String,
}

impl Role {
    #[must_use]
    pub fn new(id: RoleId, role_type: RoleType, role_name: String) -> Self {
        Self {
            id,
            role_type,
            role_name,
        }
    }

    #[must_use]
    pub fn id(&self) -> RoleId {
        self.id
    }

    #[must_use]
    pub fn role_type(&self) -> RoleType {
        self.role_type
    }

    /// Human-readable name, e.g. "Transportation Ordering Officer".
    #[must_use]
    pub fn role_name(&self) -> &str {
        &self.role_name
    }
}

/// The set of role types granted to a session.
///
/// Insertion order is preserved and duplicates are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet {
    roles: Vec<RoleType>,
}

impl RoleSet {
    /// Creates an empty role set.
    #[must_use]
    pub fn none() -> Self {
        Self { roles: Vec::new() }
    }

    /// Returns true if the set contains the given role type.
    #[must_use]
    pub fn has_role(&self, role_type: RoleType) -> bool {
        self.roles.contains(&role_type)
    }

    /// Returns a set that also contains `role_type`.
    #[must_use]
    pub fn with_role(mut self, role_type: RoleType) -> Self {
        if !self.has_role(role_type) {
            self.roles.push(role_type);
        }
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Returns the role types as a slice.
    #[must_use]
    pub fn roles(&self) -> &[RoleType] {
        &self.roles
    }
}

impl FromIterator<RoleType> for RoleSet {
    fn from_iter<I: IntoIterator<Item = RoleType>>(iter: I) -> Self {
        iter.into_iter().fold(Self::none(), Self::with_role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_set_none_is_empty() {
        let roles = RoleSet::none();
        assert!(roles.is_empty());
        assert!(!roles.has_role(RoleType::TransportationOrderingOfficer));
    }

    #[test]
    fn with_role_does_not_duplicate() {
        let roles = RoleSet::none()
            .with_role(RoleType::TransportationOrderingOfficer)
            .with_role(RoleType::TransportationOrderingOfficer);
        assert_eq!(roles.roles(), &[RoleType::TransportationOrderingOfficer]);
    }

    #[test]
    fn from_iter_deduplicates_and_keeps_order() {
        let roles: RoleSet = [
            RoleType::ServicesCounselor,
            RoleType::Customer,
            RoleType::ServicesCounselor,
        ]
        .into_iter()
        .collect();
        assert_eq!(
            roles.roles(),
            &[RoleType::ServicesCounselor, RoleType::Customer]
        );
    }

    #[test]
    fn role_type_string_forms_match() {
        for role_type in [
            RoleType::Customer,
            RoleType::TransportationOrderingOfficer,
            RoleType::TransportationInvoicingOfficer,
            RoleType::ContractingOfficer,
            RoleType::ServicesCounselor,
            RoleType::PrimeSimulator,
            RoleType::QaeCsr,
        ] {
            let json = serde_json::to_string(&role_type).expect("serialize");
            assert_eq!(json, format!("\"{}\"", role_type.as_str()));
            assert_eq!(role_type.as_str().parse::<RoleType>(), Ok(role_type));
        }
    }

    #[test]
    fn unknown_role_type_is_rejected() {
        let err = "ppm_wizard".parse::<RoleType>().expect_err("should fail");
        assert_eq!(err, UnknownRoleType("ppm_wizard".to_string()));
    }

    #[test]
    fn role_accessors() {
        let id = RoleId::new();
        let role = Role::new(
            id,
            RoleType::TransportationOrderingOfficer,
            "Transportation Ordering Officer".to_string(),
        );
        assert_eq!(role.id(), id);
        assert_eq!(role.role_type(), RoleType::TransportationOrderingOfficer);
        assert_eq!(role.role_name(), "Transportation Ordering Officer");
    }
}
