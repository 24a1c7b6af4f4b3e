use uuid::Uuid;

/// Outcome of an ownership check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allowed,
    Forbidden,
}

impl Access {
    pub fn is_allowed(self) -> bool {
        self == Access::Allowed
    }
}

/// Ownership guard: only the owner of a resource may act on it.
pub fn authorize(identity_id: Uuid, resource_owner_id: Uuid) -> Access {
    if identity_id == resource_owner_id {
        Access::Allowed
    } else {
        Access::Forbidden
    }
}
