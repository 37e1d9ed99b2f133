//! Discord REST payloads, trimmed to the fields the reconciler reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tenure_core::member::MemberSnapshot;
use tenure_core::types::{CommunityDescriptor, CommunityId, MemberId, RoleDescriptor, RoleId};

#[derive(Debug, Deserialize)]
pub(crate) struct User {
    pub id: MemberId,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GuildMember {
    /// Absent only in gateway payloads, but tolerated here.
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<RoleId>,
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
}

impl GuildMember {
    pub fn into_snapshot(self, now: DateTime<Utc>) -> Option<MemberSnapshot> {
        let user = self.user?;
        let name = self
            .nick
            .or(user.global_name)
            .unwrap_or(user.username);
        Some(MemberSnapshot::from_joined_at(
            user.id,
            name,
            self.joined_at,
            self.roles,
            now,
        ))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Role {
    pub id: RoleId,
    pub name: String,
}

impl From<Role> for RoleDescriptor {
    fn from(r: Role) -> Self {
        RoleDescriptor::new(r.id, r.name)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PartialGuild {
    pub id: CommunityId,
    pub name: String,
}

impl From<PartialGuild> for CommunityDescriptor {
    fn from(g: PartialGuild) -> Self {
        CommunityDescriptor::new(g.id, g.name)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRole<'a> {
    pub name: &'a str,
    pub mentionable: bool,
    pub hoist: bool,
}

/// Body of a 429 response.
#[derive(Debug, Deserialize)]
pub(crate) struct RateLimited {
    /// Seconds, possibly fractional.
    pub retry_after: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn member_name_prefers_nick_then_global_name() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let json = r#"[
            {"user": {"id": "1", "username": "ada", "global_name": "Ada L"}, "nick": "countess",
             "roles": ["10"], "joined_at": "2024-04-27T00:00:00.000000+00:00"},
            {"user": {"id": "2", "username": "bob", "global_name": "Bob"}, "roles": []},
            {"user": {"id": "3", "username": "cy"}, "roles": [], "joined_at": null}
        ]"#;
        let members: Vec<GuildMember> = serde_json::from_str(json).unwrap();
        let snaps: Vec<_> = members
            .into_iter()
            .filter_map(|m| m.into_snapshot(now))
            .collect();

        assert_eq!(snaps[0].name, "countess");
        assert_eq!(snaps[0].tenure_days, Some(400));
        assert!(snaps[0].holds(RoleId(10)));
        assert_eq!(snaps[1].name, "Bob");
        assert_eq!(snaps[1].tenure_days, None);
        assert_eq!(snaps[2].name, "cy");
    }

    #[test]
    fn member_without_user_is_dropped() {
        let m: GuildMember = serde_json::from_str(r#"{"roles": []}"#).unwrap();
        assert!(m.into_snapshot(Utc::now()).is_none());
    }
}
