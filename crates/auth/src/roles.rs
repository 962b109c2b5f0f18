//! Role taxonomy: the closed role enumeration and its tier table.
//!
//! `tier_of` is the only place that knows which tier a role belongs to. Other
//! modules must ask it instead of inspecting role names.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authority tier. "Strategic audits, unit executes."
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    /// Network-wide, read-oriented authority with narrow administrative writes.
    Strategic,
    /// Full authority inside exactly one bound unit.
    Tactical,
    /// Function-specific authority inside one bound unit.
    Operational,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Strategic, Tier::Tactical, Tier::Operational];

    /// Roles that belong to this tier, in declaration order.
    pub fn roles(self) -> impl Iterator<Item = Role> {
        Role::ALL.into_iter().filter(move |r| tier_of(*r) == self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Strategic => "STRATEGIC",
            Tier::Tactical => "TACTICAL",
            Tier::Operational => "OPERATIONAL",
        }
    }

    /// Whether principals of this tier must be bound to a unit to be granted anything.
    pub fn is_unit_scoped(&self) -> bool {
        !matches!(self, Tier::Strategic)
    }
}

impl core::fmt::Display for Tier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role carried by an authenticated principal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Network headquarters administrator.
    AdminMatriz,
    /// Network manager.
    GestorRede,
    /// Unit director.
    DiretorUnidade,
    /// Pedagogical coordinator.
    CoordPedagogico,
    /// Unit secretary.
    Secretaria,
    /// Nutritionist (health data only).
    Nutricionista,
    /// Teacher.
    Professor,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::AdminMatriz,
        Role::GestorRede,
        Role::DiretorUnidade,
        Role::CoordPedagogico,
        Role::Secretaria,
        Role::Nutricionista,
        Role::Professor,
    ];

    /// Wire name, as issued by the identity provider.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::AdminMatriz => "ADMIN_MATRIZ",
            Role::GestorRede => "GESTOR_REDE",
            Role::DiretorUnidade => "DIRETOR_UNIDADE",
            Role::CoordPedagogico => "COORD_PEDAGOGICO",
            Role::Secretaria => "SECRETARIA",
            Role::Nutricionista => "NUTRICIONISTA",
            Role::Professor => "PROFESSOR",
        }
    }

    pub fn tier(&self) -> Tier {
        tier_of(*self)
    }
}

/// Tier membership table.
///
/// Exhaustive by construction: adding a role without assigning it a tier is a
/// compile error.
pub const fn tier_of(role: Role) -> Tier {
    match role {
        Role::AdminMatriz | Role::GestorRede => Tier::Strategic,
        Role::DiretorUnidade | Role::CoordPedagogico | Role::Secretaria => Tier::Tactical,
        Role::Nutricionista | Role::Professor => Tier::Operational,
    }
}

/// A role name outside the closed enumeration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
