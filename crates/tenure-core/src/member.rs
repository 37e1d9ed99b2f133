use crate::types::{MemberId, RoleId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

/// A member as read at the start of a scan. Never written back to: corrections
/// describe the desired state and go through the role API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberSnapshot {
    pub id: MemberId,
    /// Display name, only used for log context.
    pub name: String,
    /// Whole days since the member joined. `None` when the join time is
    /// unavailable or not in the past.
    pub tenure_days: Option<u32>,
    pub role_ids: BTreeSet<RoleId>,
}

impl MemberSnapshot {
    pub fn new(
        id: MemberId,
        name: impl Into<String>,
        tenure_days: Option<u32>,
        role_ids: impl IntoIterator<Item = RoleId>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            tenure_days,
            role_ids: role_ids.into_iter().collect(),
        }
    }

    /// Build a snapshot from a join timestamp, measuring tenure at `now`.
    pub fn from_joined_at(
        id: MemberId,
        name: impl Into<String>,
        joined_at: Option<DateTime<Utc>>,
        role_ids: impl IntoIterator<Item = RoleId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(id, name, tenure_days(joined_at, now), role_ids)
    }

    pub fn holds(&self, role: RoleId) -> bool {
        self.role_ids.contains(&role)
    }
}

/// Whole days elapsed between `joined_at` and `now`, truncated.
///
/// A missing join time, or one after `now`, yields `None`: the member's tenure
/// is unknown and they are left alone rather than defaulted to a tier.
pub fn tenure_days(joined_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<u32> {
    let joined = joined_at?;
    if joined > now {
        return None;
    }
    u32::try_from(now.signed_duration_since(joined).num_days()).ok()
}
