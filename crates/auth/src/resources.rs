//! Resource catalog.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use unitgate_core::UnitId;

/// Kind of record an action targets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    DailyLog,
    Student,
    Class,
    Appointment,
    MaterialRequest,
    Planning,
    UnitSettings,
    Unit,
    Report,
}

/// Partition of the catalog.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    /// Unit-owned, day-to-day records.
    Operational,
    /// Unit configuration and unit lifecycle.
    Administrative,
    /// Read-only informational output.
    Informational,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 9] = [
        ResourceKind::DailyLog,
        ResourceKind::Student,
        ResourceKind::Class,
        ResourceKind::Appointment,
        ResourceKind::MaterialRequest,
        ResourceKind::Planning,
        ResourceKind::UnitSettings,
        ResourceKind::Unit,
        ResourceKind::Report,
    ];

    pub const fn category(self) -> ResourceCategory {
        match self {
            ResourceKind::DailyLog
            | ResourceKind::Student
            | ResourceKind::Class
            | ResourceKind::Appointment
            | ResourceKind::MaterialRequest
            | ResourceKind::Planning => ResourceCategory::Operational,
            ResourceKind::UnitSettings | ResourceKind::Unit => ResourceCategory::Administrative,
            ResourceKind::Report => ResourceCategory::Informational,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::DailyLog => "daily-log",
            ResourceKind::Student => "student",
            ResourceKind::Class => "class",
            ResourceKind::Appointment => "appointment",
            ResourceKind::MaterialRequest => "material-request",
            ResourceKind::Planning => "planning",
            ResourceKind::UnitSettings => "unit-settings",
            ResourceKind::Unit => "unit",
            ResourceKind::Report => "report",
        }
    }
}

pub const fn is_operational(kind: ResourceKind) -> bool {
    matches!(kind.category(), ResourceCategory::Operational)
}

pub const fn is_administrative(kind: ResourceKind) -> bool {
    matches!(kind.category(), ResourceCategory::Administrative)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown resource kind '{0}'")]
pub struct UnknownResourceKind(pub String);

impl FromStr for ResourceKind {
    type Err = UnknownResourceKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownResourceKind(s.to_string()))
    }
}

impl core::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The record an action targets.
///
/// `owner_unit_id` must come from authoritative storage at decision time, never
/// from client input. It is `None` for kinds that are not unit-scoped (e.g.
/// creating a new unit).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceReference {
    pub kind: ResourceKind,
    pub owner_unit_id: Option<UnitId>,
}

impl ResourceReference {
    pub fn owned(kind: ResourceKind, owner: UnitId) -> Self {
        Self {
            kind,
            owner_unit_id: Some(owner),
        }
    }

    pub fn unowned(kind: ResourceKind) -> Self {
        Self {
            kind,
            owner_unit_id: None,
        }
    }
}
