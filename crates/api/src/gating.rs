//! UI gating adapter: renders a [`Decision`] as the state of a UI control.
//!
//! Holds no authorization rules. The only inputs are the decision and the
//! configured presentation for denials.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use unitgate_auth::{Decision, ReasonCode, RuleId};

/// How denied controls are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatingMode {
    /// Show the control disabled, with the denial reason as hint text.
    #[default]
    Disable,
    /// Leave the control out entirely.
    Hide,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown gating mode: {0:?} (expected \"disable\" or \"hide\")")]
pub struct UnknownGatingMode(pub String);

impl FromStr for GatingMode {
    type Err = UnknownGatingMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disable" | "disabled" => Ok(Self::Disable),
            "hide" | "hidden" => Ok(Self::Hide),
            _ => Err(UnknownGatingMode(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ControlState {
    Enabled,
    Disabled {
        reason_code: ReasonCode,
        rule_id: RuleId,
        reason: &'static str,
    },
    Hidden,
}

impl ControlState {
    pub fn is_enabled(&self) -> bool {
        matches!(self, ControlState::Enabled)
    }
}

pub fn render(decision: &Decision, mode: GatingMode) -> ControlState {
    if decision.allowed {
        return ControlState::Enabled;
    }
    match mode {
        GatingMode::Disable => ControlState::Disabled {
            reason_code: decision.reason_code,
            rule_id: decision.rule_id,
            reason: reason_text(decision.reason_code),
        },
        GatingMode::Hide => ControlState::Hidden,
    }
}

/// Hint text for a denial reason.
pub fn reason_text(code: ReasonCode) -> &'static str {
    match code {
        ReasonCode::Unauthenticated => "Sign in to use this action.",
        ReasonCode::UnitNotBound => "Your account is not linked to a unit.",
        ReasonCode::CrossUnitDenied => "This record belongs to another unit.",
        ReasonCode::UnitExecutesOnly => "Network roles can view this record; changes are made by the unit.",
        ReasonCode::StrategicDeniedDefault => "Network roles cannot change this resource.",
        ReasonCode::HealthScopeOnly => "Available only for health and nutrition records.",
        ReasonCode::UndefinedPermission => "Your role has no access to this action.",
        ReasonCode::GlobalRead
        | ReasonCode::StrategicAdminException
        | ReasonCode::UnitFullAccess
        | ReasonCode::BasicOperationalAccess => "",
    }
}
