//! Drift detection: compare a member's roles with the tier their tenure implies.

use crate::member::MemberSnapshot;
use crate::tier::TierTable;
use crate::types::{MemberId, RoleId};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

// ---------------------------------------------------------------------------
// RoleOp
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "op", content = "role", rename_all = "snake_case")]
pub enum RoleOp {
    Add(RoleId),
    Remove(RoleId),
}

impl fmt::Display for RoleOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleOp::Add(r) => write!(f, "add role {r}"),
            RoleOp::Remove(r) => write!(f, "remove role {r}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Correction
// ---------------------------------------------------------------------------

/// The role changes that bring one member to their correct tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Correction {
    pub member_id: MemberId,
    pub member_name: String,
    /// Absent when the member already holds the correct tier role and only
    /// stale tier roles need to go.
    pub role_to_add: Option<RoleId>,
    pub roles_to_remove: BTreeSet<RoleId>,
}

impl Correction {
    /// Operations in submission order: removals first, then the addition.
    pub fn ops(&self) -> Vec<RoleOp> {
        self.roles_to_remove
            .iter()
            .copied()
            .map(RoleOp::Remove)
            .chain(self.role_to_add.map(RoleOp::Add))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Join time unavailable.
    UnknownTenure,
    /// Tenure below every configured threshold.
    NoApplicableTier,
    /// The tier's role could not be resolved or created this cycle.
    TierRoleUnresolved { role_name: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnknownTenure => f.write_str("tenure unknown"),
            SkipReason::NoApplicableTier => f.write_str("no applicable tier"),
            SkipReason::TierRoleUnresolved { role_name } => {
                write!(f, "tier role '{role_name}' unresolved")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    Converged,
    Skip(SkipReason),
    Correct(Correction),
}

/// Decide what, if anything, `snapshot` needs to match its tier.
///
/// Only tier roles are ever added or removed. A member holding the right tier
/// role alongside other tier roles still gets a correction that strips the
/// extras.
pub fn detect(snapshot: &MemberSnapshot, table: &TierTable) -> Detection {
    let Some(target) = table.resolve_tier(snapshot.tenure_days) else {
        return Detection::Skip(match snapshot.tenure_days {
            None => SkipReason::UnknownTenure,
            Some(_) => SkipReason::NoApplicableTier,
        });
    };

    let Some(target_role) = target.role_id else {
        return Detection::Skip(SkipReason::TierRoleUnresolved {
            role_name: target.role_name.clone(),
        });
    };

    let stale: BTreeSet<RoleId> = snapshot
        .role_ids
        .iter()
        .copied()
        .filter(|r| *r != target_role && table.is_tier_role(*r))
        .collect();
    let holds_target = snapshot.holds(target_role);

    if holds_target && stale.is_empty() {
        return Detection::Converged;
    }

    Detection::Correct(Correction {
        member_id: snapshot.id,
        member_name: snapshot.name.clone(),
        role_to_add: (!holds_target).then_some(target_role),
        roles_to_remove: stale,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
