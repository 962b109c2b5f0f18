use serde::Serialize;
use thiserror::Error;

use unitgate_core::{PrincipalId, UnitId};

use crate::decision::{Action, Decision, ReasonCode, RuleId};
use crate::principal::Principal;
use crate::resources::{ResourceKind, ResourceReference, is_administrative, is_operational};
use crate::roles::{Role, Tier, tier_of};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: {reason_code} ({rule_id})")]
    Denied {
        reason_code: ReasonCode,
        rule_id: RuleId,
    },

    /// The record moved to another unit between the decision and the mutation.
    #[error("ownership changed: decided for {granted:?}, record now owned by {current:?}")]
    OwnershipChanged {
        granted: Option<UnitId>,
        current: Option<UnitId>,
    },
}

impl Decision {
    /// Convert into a `Result`, for callers that propagate denials with `?`.
    pub fn into_result(self) -> Result<Decision, AuthzError> {
        if self.allowed {
            Ok(self)
        } else {
            Err(AuthzError::Denied {
                reason_code: self.reason_code,
                rule_id: self.rule_id,
            })
        }
    }
}

/// Decide whether `principal` may perform `action` on `resource`.
///
/// - No IO
/// - No panics
/// - No state: safe to call from any number of threads at once
///
/// Rules are evaluated in a fixed order and the first match wins.
pub fn decide(principal: &Principal, resource: &ResourceReference, action: Action) -> Decision {
    evaluate(principal, resource, action, &mut ())
}

/// Receives every rule the evaluator considers, in order.
trait Trace {
    fn check(&mut self, rule: RuleId, matched: bool);
}

impl Trace for () {
    fn check(&mut self, _rule: RuleId, _matched: bool) {}
}

impl Trace for Vec<RuleCheck> {
    fn check(&mut self, rule: RuleId, matched: bool) {
        self.push(RuleCheck { rule_id: rule, matched });
    }
}

/// Record the check and return the decision when it matched.
fn step<T: Trace>(trace: &mut T, rule: RuleId, matched: bool) -> Option<Decision> {
    trace.check(rule, matched);
    matched.then(|| Decision::from_rule(rule))
}

fn evaluate<T: Trace>(
    principal: &Principal,
    resource: &ResourceReference,
    action: Action,
    trace: &mut T,
) -> Decision {
    let Some(role) = principal.role else {
        trace.check(RuleId::Unauthenticated, true);
        return Decision::from_rule(RuleId::Unauthenticated);
    };
    trace.check(RuleId::Unauthenticated, false);

    match tier_of(role) {
        Tier::Strategic => evaluate_strategic(resource.kind, action, trace),
        tier @ (Tier::Tactical | Tier::Operational) => {
            evaluate_unit_scoped(role, tier, principal.unit_id, resource, trace)
        }
    }
}

fn evaluate_strategic<T: Trace>(kind: ResourceKind, action: Action, trace: &mut T) -> Decision {
    step(trace, RuleId::StrategicGlobalRead, action == Action::Read)
        .or_else(|| step(trace, RuleId::StrategicOperationalMutation, is_operational(kind)))
        .or_else(|| step(trace, RuleId::StrategicAdminException, is_administrative(kind)))
        .unwrap_or_else(|| {
            trace.check(RuleId::StrategicDefaultDeny, true);
            Decision::from_rule(RuleId::StrategicDefaultDeny)
        })
}

fn evaluate_unit_scoped<T: Trace>(
    role: Role,
    tier: Tier,
    unit_id: Option<UnitId>,
    resource: &ResourceReference,
    trace: &mut T,
) -> Decision {
    let Some(unit_id) = unit_id else {
        trace.check(RuleId::UnitNotBound, true);
        return Decision::from_rule(RuleId::UnitNotBound);
    };
    trace.check(RuleId::UnitNotBound, false);

    let foreign_owner = matches!(resource.owner_unit_id, Some(owner) if owner != unit_id);
    if let Some(d) = step(trace, RuleId::CrossUnit, foreign_owner) {
        return d;
    }

    if let Some(d) = step(trace, RuleId::TacticalFullAccess, tier == Tier::Tactical) {
        return d;
    }

    let rule = match role {
        // Unrestricted for every action and kind. Kept as-is pending product confirmation.
        Role::Professor => RuleId::ProfessorBasicAccess,
        Role::Nutricionista if in_health_scope(resource.kind) => RuleId::NutritionistHealthScope,
        Role::Nutricionista => RuleId::NutritionistOutOfScope,
        Role::AdminMatriz
        | Role::GestorRede
        | Role::DiretorUnidade
        | Role::CoordPedagogico
        | Role::Secretaria => RuleId::OperationalUndefined,
    };
    trace.check(rule, true);
    Decision::from_rule(rule)
}

fn in_health_scope(kind: ResourceKind) -> bool {
    matches!(
        kind,
        ResourceKind::DailyLog | ResourceKind::Student | ResourceKind::Report
    )
}

/// Re-check record ownership at mutation time.
///
/// Call this inside the same transaction (or under the same lock) that performs
/// the write, passing the owner read within that transaction. The earlier
/// `decide` result was made for `granted.owner_unit_id`; if the record has since
/// moved, the mutation must not proceed.
pub fn revalidate_ownership(
    granted: &ResourceReference,
    current_owner: Option<UnitId>,
) -> Result<(), AuthzError> {
    if granted.owner_unit_id == current_owner {
        Ok(())
    } else {
        Err(AuthzError::OwnershipChanged {
            granted: granted.owner_unit_id,
            current: current_owner,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decision Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// One rule the evaluator looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuleCheck {
    pub rule_id: RuleId,
    pub matched: bool,
}

/// The principal's binding as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrincipalState {
    pub principal_id: PrincipalId,
    pub role: Option<Role>,
    pub tier: Option<Tier>,
    pub unit_id: Option<UnitId>,
}

/// Why a decision came out the way it did.
///
/// Answers "why was this request allowed/denied?" for debug endpoints and logs.
/// The `trace` lists every rule considered up to and including the one that
/// matched; the last entry is always the matching rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionExplanation {
    pub decision: Decision,
    pub principal: PrincipalState,
    pub resource: ResourceReference,
    pub action: Action,
    pub trace: Vec<RuleCheck>,
}

/// Evaluate like `decide` and also return the rule trace.
pub fn explain(
    principal: &Principal,
    resource: &ResourceReference,
    action: Action,
) -> DecisionExplanation {
    let mut trace: Vec<RuleCheck> = Vec::new();
    let decision = evaluate(principal, resource, action, &mut trace);

    DecisionExplanation {
        decision,
        principal: PrincipalState {
            principal_id: principal.id,
            role: principal.role,
            tier: principal.tier(),
            unit_id: principal.unit_id,
        },
        resource: *resource,
        action,
        trace,
    }
}
