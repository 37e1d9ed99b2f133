//! In-memory `Directory` + `RoleApi` used by the engine's unit tests.

use crate::api::{Alert, AlertSink, ApiError, ApiResult, Directory, RoleApi};
use crate::member::MemberSnapshot;
use crate::types::{CommunityDescriptor, CommunityId, MemberId, RoleDescriptor, RoleId};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    ListRoles(CommunityId),
    ListMembers(CommunityId),
    Create(String),
    Add(MemberId, RoleId),
    Remove(MemberId, RoleId),
}

#[derive(Debug, Clone)]
struct FakeMember {
    name: String,
    tenure_days: Option<u32>,
    roles: BTreeSet<RoleId>,
}

#[derive(Default)]
struct FakeState {
    communities: Vec<CommunityDescriptor>,
    roles: HashMap<CommunityId, Vec<RoleDescriptor>>,
    members: HashMap<CommunityId, Vec<(MemberId, FakeMember)>>,
    next_role_id: u64,
    calls: Vec<Call>,
    /// Remaining rate-limited responses per (member, role).
    rate_limits: HashMap<(MemberId, RoleId), u32>,
    retry_after: Option<std::time::Duration>,
    forbidden_members: HashSet<MemberId>,
    broken_communities: bool,
    broken_member_listing: HashSet<CommunityId>,
    broken_role_listing: HashSet<CommunityId>,
    uncreatable_roles: HashSet<String>,
}

#[derive(Default)]
pub(crate) struct FakeApi {
    state: Mutex<FakeState>,
}

impl FakeApi {
    pub(crate) fn new() -> Self {
        let api = Self::default();
        api.state.lock().unwrap().next_role_id = 1000;
        api
    }

    pub(crate) fn community(&self, id: u64, name: &str) -> CommunityId {
        let id = CommunityId(id);
        let mut s = self.state.lock().unwrap();
        s.communities.push(CommunityDescriptor::new(id, name));
        s.roles.entry(id).or_default();
        s.members.entry(id).or_default();
        id
    }

    /// The bot is removed from `community`.
    pub(crate) fn leave(&self, community: CommunityId) {
        self.state
            .lock()
            .unwrap()
            .communities
            .retain(|c| c.id != community);
    }

    pub(crate) fn role(&self, community: CommunityId, name: &str) -> RoleId {
        let mut s = self.state.lock().unwrap();
        s.next_role_id += 1;
        let id = RoleId(s.next_role_id);
        s.roles
            .entry(community)
            .or_default()
            .push(RoleDescriptor::new(id, name));
        id
    }

    pub(crate) fn delete_role(&self, community: CommunityId, role: RoleId) {
        let mut s = self.state.lock().unwrap();
        if let Some(roles) = s.roles.get_mut(&community) {
            roles.retain(|r| r.id != role);
        }
    }

    pub(crate) fn role_id(&self, community: CommunityId, name: &str) -> Option<RoleId> {
        let s = self.state.lock().unwrap();
        s.roles
            .get(&community)?
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.id)
    }

    pub(crate) fn member(
        &self,
        community: CommunityId,
        id: u64,
        tenure_days: Option<u32>,
        roles: &[RoleId],
    ) -> MemberId {
        let id = MemberId(id);
        let mut s = self.state.lock().unwrap();
        s.members.entry(community).or_default().push((
            id,
            FakeMember {
                name: format!("member-{}", id.0),
                tenure_days,
                roles: roles.iter().copied().collect(),
            },
        ));
        id
    }

    pub(crate) fn member_roles(&self, community: CommunityId, member: MemberId) -> BTreeSet<RoleId> {
        let s = self.state.lock().unwrap();
        s.members[&community]
            .iter()
            .find(|(id, _)| *id == member)
            .map(|(_, m)| m.roles.clone())
            .unwrap_or_default()
    }

    pub(crate) fn rate_limit(&self, member: MemberId, role: RoleId, times: u32) {
        self.state
            .lock()
            .unwrap()
            .rate_limits
            .insert((member, role), times);
    }

    pub(crate) fn advise_retry_after(&self, after: std::time::Duration) {
        self.state.lock().unwrap().retry_after = Some(after);
    }

    pub(crate) fn forbid(&self, member: MemberId) {
        self.state.lock().unwrap().forbidden_members.insert(member);
    }

    pub(crate) fn break_community_listing(&self) {
        self.state.lock().unwrap().broken_communities = true;
    }

    pub(crate) fn break_member_listing(&self, community: CommunityId) {
        self.state
            .lock()
            .unwrap()
            .broken_member_listing
            .insert(community);
    }

    pub(crate) fn break_role_listing(&self, community: CommunityId) {
        self.state
            .lock()
            .unwrap()
            .broken_role_listing
            .insert(community);
    }

    pub(crate) fn refuse_create(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .uncreatable_roles
            .insert(name.to_string());
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn mutation_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Add(..) | Call::Remove(..)))
            .collect()
    }

    fn mutate(
        &self,
        community: CommunityId,
        member: MemberId,
        role: RoleId,
        add: bool,
    ) -> ApiResult<()> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(if add {
            Call::Add(member, role)
        } else {
            Call::Remove(member, role)
        });
        if s.forbidden_members.contains(&member) {
            return Err(ApiError::Permission("missing permissions".into()));
        }
        let retry_after = s.retry_after;
        if let Some(remaining) = s.rate_limits.get_mut(&(member, role)) {
            if *remaining > 0 {
                *remaining = remaining.saturating_sub(1);
                return Err(ApiError::RateLimited { retry_after });
            }
        }
        let entry = s
            .members
            .get_mut(&community)
            .and_then(|ms| ms.iter_mut().find(|(id, _)| *id == member))
            .ok_or_else(|| ApiError::NotFound(format!("member {member}")))?;
        if add {
            entry.1.roles.insert(role);
        } else {
            entry.1.roles.remove(&role);
        }
        Ok(())
    }
}

impl Directory for FakeApi {
    async fn communities(&self) -> ApiResult<Vec<CommunityDescriptor>> {
        let s = self.state.lock().unwrap();
        if s.broken_communities {
            return Err(ApiError::Transient("gateway timeout".into()));
        }
        Ok(s.communities.clone())
    }

    async fn list_members(&self, community: CommunityId) -> ApiResult<Vec<MemberSnapshot>> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::ListMembers(community));
        if s.broken_member_listing.contains(&community) {
            return Err(ApiError::Transient("502 Bad Gateway".into()));
        }
        Ok(s.members
            .get(&community)
            .map(|ms| {
                ms.iter()
                    .map(|(id, m)| {
                        MemberSnapshot::new(*id, m.name.clone(), m.tenure_days, m.roles.clone())
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_roles(&self, community: CommunityId) -> ApiResult<Vec<RoleDescriptor>> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::ListRoles(community));
        if s.broken_role_listing.contains(&community) {
            return Err(ApiError::Transient("connection reset".into()));
        }
        Ok(s.roles.get(&community).cloned().unwrap_or_default())
    }
}

impl RoleApi for FakeApi {
    async fn create_role(&self, community: CommunityId, name: &str) -> ApiResult<RoleDescriptor> {
        {
            let mut s = self.state.lock().unwrap();
            s.calls.push(Call::Create(name.to_string()));
            if s.uncreatable_roles.contains(name) {
                return Err(ApiError::Permission("cannot manage roles".into()));
            }
        }
        let id = self.role(community, name);
        Ok(RoleDescriptor::new(id, name))
    }

    async fn add_role(&self, community: CommunityId, member: MemberId, role: RoleId) -> ApiResult<()> {
        self.mutate(community, member, role, true)
    }

    async fn remove_role(
        &self,
        community: CommunityId,
        member: MemberId,
        role: RoleId,
    ) -> ApiResult<()> {
        self.mutate(community, member, role, false)
    }
}

/// Alert sink that keeps everything it is given.
#[derive(Default)]
pub(crate) struct RecordingAlerts {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlerts {
    pub(crate) fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingAlerts {
    fn notify(&self, alert: Alert) {
        self.alerts.lock().unwrap().push(alert);
    }
}
