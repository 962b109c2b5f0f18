//! Decision values produced by the engine.

use serde::{Deserialize, Serialize};

/// What the principal wants to do with the resource.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Write,
    Delete,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Read, Action::Write, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Delete => "delete",
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, Action::Read)
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable explanation attached to every decision.
///
/// Adapters map these to status codes and user text; the engine never does.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    Unauthenticated,
    UnitNotBound,
    CrossUnitDenied,
    UnitExecutesOnly,
    StrategicDeniedDefault,
    HealthScopeOnly,
    UndefinedPermission,
    GlobalRead,
    StrategicAdminException,
    UnitFullAccess,
    BasicOperationalAccess,
}

impl ReasonCode {
    pub const ALL: [ReasonCode; 11] = [
        ReasonCode::Unauthenticated,
        ReasonCode::UnitNotBound,
        ReasonCode::CrossUnitDenied,
        ReasonCode::UnitExecutesOnly,
        ReasonCode::StrategicDeniedDefault,
        ReasonCode::HealthScopeOnly,
        ReasonCode::UndefinedPermission,
        ReasonCode::GlobalRead,
        ReasonCode::StrategicAdminException,
        ReasonCode::UnitFullAccess,
        ReasonCode::BasicOperationalAccess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::Unauthenticated => "UNAUTHENTICATED",
            ReasonCode::UnitNotBound => "UNIT_NOT_BOUND",
            ReasonCode::CrossUnitDenied => "CROSS_UNIT_DENIED",
            ReasonCode::UnitExecutesOnly => "UNIT_EXECUTES_ONLY",
            ReasonCode::StrategicDeniedDefault => "STRATEGIC_DENIED_DEFAULT",
            ReasonCode::HealthScopeOnly => "HEALTH_SCOPE_ONLY",
            ReasonCode::UndefinedPermission => "UNDEFINED_PERMISSION",
            ReasonCode::GlobalRead => "GLOBAL_READ",
            ReasonCode::StrategicAdminException => "STRATEGIC_ADMIN_EXCEPTION",
            ReasonCode::UnitFullAccess => "UNIT_FULL_ACCESS",
            ReasonCode::BasicOperationalAccess => "BASIC_OPERATIONAL_ACCESS",
        }
    }
}

impl core::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of the evaluation rule that produced a decision.
///
/// Declared in evaluation order. Each rule has exactly one outcome.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleId {
    #[serde(rename = "unauthenticated")]
    Unauthenticated,
    #[serde(rename = "strategic.global_read")]
    StrategicGlobalRead,
    #[serde(rename = "strategic.operational_mutation")]
    StrategicOperationalMutation,
    #[serde(rename = "strategic.admin_exception")]
    StrategicAdminException,
    #[serde(rename = "strategic.default_deny")]
    StrategicDefaultDeny,
    #[serde(rename = "unit.not_bound")]
    UnitNotBound,
    #[serde(rename = "unit.cross_unit")]
    CrossUnit,
    #[serde(rename = "tactical.full_access")]
    TacticalFullAccess,
    #[serde(rename = "operational.professor_basic")]
    ProfessorBasicAccess,
    #[serde(rename = "operational.nutritionist_health_scope")]
    NutritionistHealthScope,
    #[serde(rename = "operational.nutritionist_out_of_scope")]
    NutritionistOutOfScope,
    #[serde(rename = "operational.undefined")]
    OperationalUndefined,
}

impl RuleId {
    pub const ALL: [RuleId; 12] = [
        RuleId::Unauthenticated,
        RuleId::StrategicGlobalRead,
        RuleId::StrategicOperationalMutation,
        RuleId::StrategicAdminException,
        RuleId::StrategicDefaultDeny,
        RuleId::UnitNotBound,
        RuleId::CrossUnit,
        RuleId::TacticalFullAccess,
        RuleId::ProfessorBasicAccess,
        RuleId::NutritionistHealthScope,
        RuleId::NutritionistOutOfScope,
        RuleId::OperationalUndefined,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::Unauthenticated => "unauthenticated",
            RuleId::StrategicGlobalRead => "strategic.global_read",
            RuleId::StrategicOperationalMutation => "strategic.operational_mutation",
            RuleId::StrategicAdminException => "strategic.admin_exception",
            RuleId::StrategicDefaultDeny => "strategic.default_deny",
            RuleId::UnitNotBound => "unit.not_bound",
            RuleId::CrossUnit => "unit.cross_unit",
            RuleId::TacticalFullAccess => "tactical.full_access",
            RuleId::ProfessorBasicAccess => "operational.professor_basic",
            RuleId::NutritionistHealthScope => "operational.nutritionist_health_scope",
            RuleId::NutritionistOutOfScope => "operational.nutritionist_out_of_scope",
            RuleId::OperationalUndefined => "operational.undefined",
        }
    }

    /// The verdict this rule yields when it matches.
    pub const fn outcome(self) -> (bool, ReasonCode) {
        match self {
            RuleId::Unauthenticated => (false, ReasonCode::Unauthenticated),
            RuleId::StrategicGlobalRead => (true, ReasonCode::GlobalRead),
            RuleId::StrategicOperationalMutation => (false, ReasonCode::UnitExecutesOnly),
            RuleId::StrategicAdminException => (true, ReasonCode::StrategicAdminException),
            RuleId::StrategicDefaultDeny => (false, ReasonCode::StrategicDeniedDefault),
            RuleId::UnitNotBound => (false, ReasonCode::UnitNotBound),
            RuleId::CrossUnit => (false, ReasonCode::CrossUnitDenied),
            RuleId::TacticalFullAccess => (true, ReasonCode::UnitFullAccess),
            RuleId::ProfessorBasicAccess => (true, ReasonCode::BasicOperationalAccess),
            RuleId::NutritionistHealthScope => (true, ReasonCode::HealthScopeOnly),
            RuleId::NutritionistOutOfScope => (false, ReasonCode::HealthScopeOnly),
            RuleId::OperationalUndefined => (false, ReasonCode::UndefinedPermission),
        }
    }
}

impl core::fmt::Display for RuleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allow/deny verdict plus the reason and the rule that produced it.
///
/// Produced fresh by every `decide` call. Do not cache across requests: unit
/// bindings can change between them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub reason_code: ReasonCode,
    pub rule_id: RuleId,
}

impl Decision {
    pub const fn from_rule(rule: RuleId) -> Self {
        let (allowed, reason_code) = rule.outcome();
        Self {
            allowed,
            reason_code,
            rule_id: rule,
        }
    }

    pub fn is_denied(&self) -> bool {
        !self.allowed
    }
}
