use entity::sea_orm_active_enums::OwnerKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Subject of a credit balance: a user or an organization.
///
/// Both kinds share identical ledger behavior and differ only in identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Owner {
    User(Uuid),
    Organization(Uuid),
}

impl Owner {
    pub fn kind(&self) -> OwnerKind {
        match self {
            Self::User(_) => OwnerKind::User,
            Self::Organization(_) => OwnerKind::Organization,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::User(id) | Self::Organization(id) => *id,
        }
    }

    /// Rebuild an owner from its stored `(owner_kind, owner_id)` pair
    pub fn from_parts(kind: OwnerKind, id: Uuid) -> Self {
        match kind {
            OwnerKind::User => Self::User(id),
            OwnerKind::Organization => Self::Organization(id),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{}", id),
            Self::Organization(id) => write!(f, "organization:{}", id),
        }
    }
}

/// Organization state of a user, as seen by the credits tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "organizationId", rename_all = "camelCase")]
pub enum OrganizationContext {
    NoOrganization,
    HasOrganization(Uuid),
}

impl OrganizationContext {
    pub fn has_organization(&self) -> bool {
        matches!(self, Self::HasOrganization(_))
    }

    /// Ledger owner for organization-scoped operations, if any
    pub fn owner(&self) -> Option<Owner> {
        match self {
            Self::NoOrganization => None,
            Self::HasOrganization(id) => Some(Owner::Organization(*id)),
        }
    }
}
