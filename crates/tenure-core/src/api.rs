//! Seams between the engine and the outside world.
//!
//! The engine never talks to a platform directly. It reads communities,
//! members and roles through [`Directory`], writes through [`RoleApi`], and
//! reports noteworthy events through [`AlertSink`]. `tenure-discord` provides
//! the production implementation of the first two.

use crate::member::MemberSnapshot;
use crate::types::{CommunityDescriptor, CommunityId, MemberId, RoleDescriptor, RoleId};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ApiError
// ---------------------------------------------------------------------------

/// Failure of a single remote call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// The remote API asked us to slow down. Retriable.
    #[error("rate limited{}", .retry_after.map(|d| format!(" (retry after {:.1}s)", d.as_secs_f64())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    /// The remote API refused the operation. Never retried.
    #[error("permission denied: {0}")]
    Permission(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Network or server fault.
    #[error("transient API failure: {0}")]
    Transient(String),
}

impl ApiError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApiError::RateLimited { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::Permission(_) => "permission",
            ApiError::NotFound(_) => "not_found",
            ApiError::Transient(_) => "transient",
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Directory / RoleApi
// ---------------------------------------------------------------------------

/// Read side of the community directory.
pub trait Directory {
    /// Every community the reconciler can see.
    fn communities(&self) -> impl Future<Output = ApiResult<Vec<CommunityDescriptor>>> + Send;

    /// Fresh snapshots of every member of `community`.
    fn list_members(
        &self,
        community: CommunityId,
    ) -> impl Future<Output = ApiResult<Vec<MemberSnapshot>>> + Send;

    fn list_roles(
        &self,
        community: CommunityId,
    ) -> impl Future<Output = ApiResult<Vec<RoleDescriptor>>> + Send;
}

/// Write side of the community directory.
pub trait RoleApi {
    fn create_role(
        &self,
        community: CommunityId,
        name: &str,
    ) -> impl Future<Output = ApiResult<RoleDescriptor>> + Send;

    fn add_role(
        &self,
        community: CommunityId,
        member: MemberId,
        role: RoleId,
    ) -> impl Future<Output = ApiResult<()>> + Send;

    fn remove_role(
        &self,
        community: CommunityId,
        member: MemberId,
        role: RoleId,
    ) -> impl Future<Output = ApiResult<()>> + Send;
}

impl<T: Directory> Directory for Arc<T> {
    fn communities(&self) -> impl Future<Output = ApiResult<Vec<CommunityDescriptor>>> + Send {
        (**self).communities()
    }

    fn list_members(
        &self,
        community: CommunityId,
    ) -> impl Future<Output = ApiResult<Vec<MemberSnapshot>>> + Send {
        (**self).list_members(community)
    }

    fn list_roles(
        &self,
        community: CommunityId,
    ) -> impl Future<Output = ApiResult<Vec<RoleDescriptor>>> + Send {
        (**self).list_roles(community)
    }
}

impl<T: RoleApi> RoleApi for Arc<T> {
    fn create_role(
        &self,
        community: CommunityId,
        name: &str,
    ) -> impl Future<Output = ApiResult<RoleDescriptor>> + Send {
        (**self).create_role(community, name)
    }

    fn add_role(
        &self,
        community: CommunityId,
        member: MemberId,
        role: RoleId,
    ) -> impl Future<Output = ApiResult<()>> + Send {
        (**self).add_role(community, member, role)
    }

    fn remove_role(
        &self,
        community: CommunityId,
        member: MemberId,
        role: RoleId,
    ) -> impl Future<Output = ApiResult<()>> + Send {
        (**self).remove_role(community, member, role)
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub title: String,
    pub message: String,
    pub priority: u8,
}

impl Alert {
    pub fn new(title: impl Into<String>, message: impl Into<String>, priority: u8) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            priority,
        }
    }
}

/// Best-effort notification channel.
///
/// `notify` must return promptly: implementations that do I/O hand the
/// delivery off to a background task and log their own failures.
pub trait AlertSink {
    fn notify(&self, alert: Alert);
}

impl<T: AlertSink + ?Sized> AlertSink for Arc<T> {
    fn notify(&self, alert: Alert) {
        (**self).notify(alert)
    }
}

/// Sink that drops every alert. Used when no alert endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAlerts;

impl AlertSink for NoopAlerts {
    fn notify(&self, alert: Alert) {
        tracing::debug!(title = %alert.title, "alert dropped: no alert sink configured");
    }
}
