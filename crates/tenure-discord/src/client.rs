use crate::error::DiscordError;
use crate::wire::{CreateRole, GuildMember, PartialGuild, RateLimited, Role};
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tenure_core::api::{ApiError, ApiResult, Directory, RoleApi};
use tenure_core::member::MemberSnapshot;
use tenure_core::types::{CommunityDescriptor, CommunityId, MemberId, RoleDescriptor, RoleId};
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://discord.com/api/v10";

const USER_AGENT: &str = concat!(
    "DiscordBot (https://github.com/orchard9/tenure, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);
const AUDIT_LOG_REASON: &str = "X-Audit-Log-Reason";
const MEMBER_PAGE: usize = 1000;
const GUILD_PAGE: usize = 200;
/// Longest wait honoured from a 429; anything above is clamped.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(600);

/// Discord bot client implementing the engine's [`Directory`] and [`RoleApi`].
///
/// Every call is a single HTTP request. Retrying is the caller's business:
/// a 429 surfaces as [`ApiError::RateLimited`] with the advised wait.
#[derive(Debug, Clone)]
pub struct DiscordClient {
    http: reqwest::Client,
    base_url: String,
}

impl DiscordClient {
    pub fn new(token: &str) -> crate::Result<Self> {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(token: &str, base_url: impl Into<String>) -> crate::Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(DiscordError::MissingToken);
        }
        let mut auth = HeaderValue::from_str(&format!("Bot {token}"))
            .map_err(|_| DiscordError::InvalidToken)?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, req: RequestBuilder, what: &str) -> ApiResult<Response> {
        let resp = req
            .send()
            .await
            .map_err(|e| ApiError::Transient(format!("{what}: {e}")))?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(error_for(resp, what).await)
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> ApiResult<T> {
        let resp = self.send(self.http.get(self.url(path)), what).await?;
        resp.json()
            .await
            .map_err(|e| ApiError::Transient(format!("{what}: malformed response: {e}")))
    }

    async fn member_role(
        &self,
        add: bool,
        community: CommunityId,
        member: MemberId,
        role: RoleId,
    ) -> ApiResult<()> {
        let url = self.url(&format!("/guilds/{community}/members/{member}/roles/{role}"));
        let req = if add {
            self.http.put(url)
        } else {
            self.http.delete(url)
        };
        let what = if add { "add member role" } else { "remove member role" };
        self.send(req.header(AUDIT_LOG_REASON, "Tenure tier update"), what)
            .await?;
        Ok(())
    }
}

/// Map a non-success response onto the engine's error kinds.
async fn error_for(resp: Response, what: &str) -> ApiError {
    let status = resp.status();
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            let header = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<f64>().ok());
            let body = resp.json::<RateLimited>().await.ok().map(|b| b.retry_after);
            let retry_after = body
                .or(header)
                .filter(|s| s.is_finite() && *s >= 0.0)
                .map(|s| {
                    Duration::try_from_secs_f64(s)
                        .map_or(MAX_RETRY_AFTER, |wait| wait.min(MAX_RETRY_AFTER))
                });
            warn!(what, ?retry_after, "rate limited by Discord");
            ApiError::RateLimited { retry_after }
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ApiError::Permission(format!("{what}: {status}"))
        }
        StatusCode::NOT_FOUND => ApiError::NotFound(what.to_string()),
        _ => ApiError::Transient(format!("{what}: {status}")),
    }
}

impl Directory for DiscordClient {
    async fn communities(&self) -> ApiResult<Vec<CommunityDescriptor>> {
        let mut out = Vec::new();
        let mut after = 0u64;
        loop {
            let path = format!("/users/@me/guilds?limit={GUILD_PAGE}&after={after}");
            let page: Vec<PartialGuild> = self.get_json(&path, "list guilds").await?;
            let full = page.len() == GUILD_PAGE;
            if let Some(last) = page.last() {
                after = last.id.0;
            }
            out.extend(page.into_iter().map(CommunityDescriptor::from));
            if !full {
                break;
            }
        }
        debug!(count = out.len(), "listed guilds");
        Ok(out)
    }

    async fn list_members(&self, community: CommunityId) -> ApiResult<Vec<MemberSnapshot>> {
        let now = Utc::now();
        let mut out = Vec::new();
        let mut after = 0u64;
        loop {
            let path = format!("/guilds/{community}/members?limit={MEMBER_PAGE}&after={after}");
            let page: Vec<GuildMember> = self.get_json(&path, "list members").await?;
            let full = page.len() == MEMBER_PAGE;
            let last = page
                .iter()
                .filter_map(|m| m.user.as_ref().map(|u| u.id.0))
                .max();
            out.extend(page.into_iter().filter_map(|m| m.into_snapshot(now)));
            match last {
                Some(id) if full => after = id,
                _ => break,
            }
        }
        debug!(%community, count = out.len(), "listed members");
        Ok(out)
    }

    async fn list_roles(&self, community: CommunityId) -> ApiResult<Vec<RoleDescriptor>> {
        let roles: Vec<Role> = self
            .get_json(&format!("/guilds/{community}/roles"), "list roles")
            .await?;
        Ok(roles.into_iter().map(RoleDescriptor::from).collect())
    }
}

impl RoleApi for DiscordClient {
    async fn create_role(&self, community: CommunityId, name: &str) -> ApiResult<RoleDescriptor> {
        let req = self
            .http
            .post(self.url(&format!("/guilds/{community}/roles")))
            .header(AUDIT_LOG_REASON, "Tenure tier role")
            .json(&CreateRole {
                name,
                mentionable: false,
                hoist: false,
            });
        let resp = self.send(req, "create role").await?;
        let role: Role = resp
            .json()
            .await
            .map_err(|e| ApiError::Transient(format!("create role: malformed response: {e}")))?;
        Ok(role.into())
    }

    async fn add_role(&self, community: CommunityId, member: MemberId, role: RoleId) -> ApiResult<()> {
        self.member_role(true, community, member, role).await
    }

    async fn remove_role(
        &self,
        community: CommunityId,
        member: MemberId,
        role: RoleId,
    ) -> ApiResult<()> {
        self.member_role(false, community, member, role).await
    }
}
