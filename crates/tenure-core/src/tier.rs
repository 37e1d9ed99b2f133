//! The tier table: which role a member should hold for a given tenure.

use crate::api::{Directory, RoleApi};
use crate::config::TierConfig;
use crate::error::{Result, TenureError};
use crate::types::{CommunityId, RoleId};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

// ---------------------------------------------------------------------------
// TierDefinition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierDefinition {
    pub min_tenure_days: u32,
    pub role_name: String,
    /// Remote role id, filled in by [`TierTable::ensure_roles_exist`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<RoleId>,
}

impl TierDefinition {
    pub fn new(min_tenure_days: u32, role_name: impl Into<String>) -> Self {
        Self {
            min_tenure_days,
            role_name: role_name.into(),
            role_id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// TierVerification
// ---------------------------------------------------------------------------

/// Outcome of one `ensure_roles_exist` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TierVerification {
    /// Tiers with a usable role id after the pass.
    pub resolved: usize,
    /// Role names created during the pass.
    pub created: Vec<String>,
    /// Role names left unresolved; members due these tiers are skipped.
    pub failed: Vec<String>,
}

// ---------------------------------------------------------------------------
// TierTable
// ---------------------------------------------------------------------------

/// Tier definitions in ascending threshold order.
///
/// Construction rejects any table where resolution would have to guess:
/// duplicate thresholds, thresholds out of order, duplicate or blank role
/// names, or no tiers at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierTable {
    tiers: Vec<TierDefinition>,
}

impl TierTable {
    pub fn new(tiers: Vec<TierDefinition>) -> Result<Self> {
        if tiers.is_empty() {
            return Err(TenureError::Configuration(
                "at least one tier must be configured".into(),
            ));
        }

        let mut thresholds = HashSet::new();
        let mut names = HashSet::new();
        for tier in &tiers {
            if tier.role_name.trim().is_empty() {
                return Err(TenureError::Configuration(format!(
                    "tier at {} days has a blank role name",
                    tier.min_tenure_days
                )));
            }
            if !thresholds.insert(tier.min_tenure_days) {
                return Err(TenureError::Configuration(format!(
                    "more than one tier uses the threshold {} days",
                    tier.min_tenure_days
                )));
            }
            if !names.insert(tier.role_name.as_str()) {
                return Err(TenureError::Configuration(format!(
                    "role '{}' is used by more than one tier",
                    tier.role_name
                )));
            }
        }

        for pair in tiers.windows(2) {
            if pair[1].min_tenure_days <= pair[0].min_tenure_days {
                return Err(TenureError::Configuration(format!(
                    "tier thresholds must be listed in increasing order: '{}' ({} days) follows '{}' ({} days)",
                    pair[1].role_name,
                    pair[1].min_tenure_days,
                    pair[0].role_name,
                    pair[0].min_tenure_days
                )));
            }
        }

        Ok(Self { tiers })
    }

    pub fn from_config(tiers: &[TierConfig]) -> Result<Self> {
        Self::new(
            tiers
                .iter()
                .map(|t| TierDefinition::new(t.days, t.role_name.clone()))
                .collect(),
        )
    }

    pub fn tiers(&self) -> &[TierDefinition] {
        &self.tiers
    }

    /// The most senior tier whose threshold `tenure_days` meets.
    ///
    /// Unknown tenure resolves to no tier.
    pub fn resolve_tier(&self, tenure_days: Option<u32>) -> Option<&TierDefinition> {
        let days = tenure_days?;
        self.tiers.iter().rev().find(|t| t.min_tenure_days <= days)
    }

    pub fn is_tier_role(&self, role: RoleId) -> bool {
        self.tiers.iter().any(|t| t.role_id == Some(role))
    }

    pub fn tier_for_role(&self, role: RoleId) -> Option<&TierDefinition> {
        self.tiers.iter().find(|t| t.role_id == Some(role))
    }

    /// Make sure every tier has a remote role, creating the missing ones.
    ///
    /// Remote roles are listed once per call. A cached id that no longer
    /// exists remotely is dropped and resolved again by name; a name with no
    /// remote match is created. Failures are per tier: the tier stays
    /// unresolved for this pass and the others carry on. When the listing
    /// itself fails nothing is created, since a role that merely could not be
    /// seen would be duplicated.
    pub async fn ensure_roles_exist<A>(&mut self, community: CommunityId, api: &A) -> TierVerification
    where
        A: Directory + RoleApi,
    {
        debug!(%community, "ensuring tier roles exist");
        let mut verification = TierVerification::default();

        let remote = match api.list_roles(community).await {
            Ok(roles) => roles,
            Err(e) => {
                error!(%community, error = %e, "failed to list roles; keeping cached tier roles");
                for tier in &self.tiers {
                    if tier.role_id.is_some() {
                        verification.resolved += 1;
                    } else {
                        verification.failed.push(tier.role_name.clone());
                    }
                }
                return verification;
            }
        };

        for tier in &mut self.tiers {
            if let Some(id) = tier.role_id {
                if remote.iter().any(|r| r.id == id) {
                    verification.resolved += 1;
                    continue;
                }
                warn!(
                    %community,
                    role = %tier.role_name,
                    role_id = %id,
                    "cached tier role no longer exists; resolving again"
                );
                tier.role_id = None;
            }

            if let Some(found) = remote.iter().find(|r| r.name == tier.role_name) {
                tier.role_id = Some(found.id);
                verification.resolved += 1;
                continue;
            }

            match api.create_role(community, &tier.role_name).await {
                Ok(role) => {
                    info!(%community, role = %role.name, role_id = %role.id, "created tier role");
                    tier.role_id = Some(role.id);
                    verification.resolved += 1;
                    verification.created.push(tier.role_name.clone());
                }
                Err(e) => {
                    error!(
                        %community,
                        role = %tier.role_name,
                        error = %e,
                        "failed to create tier role; tier skipped this cycle"
                    );
                    verification.failed.push(tier.role_name.clone());
                }
            }
        }

        verification
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
