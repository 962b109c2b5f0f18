use serde::{Deserialize, Serialize};

use unitgate_core::{PrincipalId, UnitId};

use crate::roles::{Role, Tier};

/// The actor a decision is made for.
///
/// Built once per request from the identity provider's claims and never
/// mutated afterwards. `role == None` means the request is unauthenticated.
/// A unit-scoped role with `unit_id == None` is a valid but unbound principal:
/// every check for it is denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub role: Option<Role>,
    pub unit_id: Option<UnitId>,
}

impl Principal {
    pub fn new(id: PrincipalId, role: Role, unit_id: Option<UnitId>) -> Self {
        Self {
            id,
            role: Some(role),
            unit_id,
        }
    }

    /// Principal for a request that carried no credentials.
    pub fn anonymous() -> Self {
        Self {
            id: PrincipalId::from_uuid(uuid::Uuid::nil()),
            role: None,
            unit_id: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.role.is_some()
    }

    pub fn tier(&self) -> Option<Tier> {
        self.role.map(|r| r.tier())
    }
}
