//! Role mutation with bounded retry on rate limits.

use crate::api::{ApiError, RoleApi};
use crate::drift::{Correction, RoleOp};
use crate::types::{CommunityId, MemberId, RoleId};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per operation, including the first.
    pub max_retries: u32,
    /// Pause after every role operation, successful or not.
    pub operation_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            operation_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Wait before the next attempt when the server gave no retry-after:
    /// `attempt * 2` seconds, `attempt` being 1-based.
    pub fn fallback_backoff(attempt: u32) -> Duration {
        Duration::from_secs(u64::from(attempt) * 2)
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    Applied { attempts: u32 },
    Abandoned { attempts: u32, error: ApiError },
}

impl MutationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MutationOutcome::Applied { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            MutationOutcome::Applied { attempts } | MutationOutcome::Abandoned { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// One abandoned operation, kept for the cycle report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedOperation {
    pub member_id: MemberId,
    pub member_name: String,
    pub op: RoleOp,
    pub error_kind: &'static str,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrectionOutcome {
    pub applied: usize,
    pub failed: Vec<FailedOperation>,
}

impl CorrectionOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// RoleMutator
// ---------------------------------------------------------------------------

/// Applies role operations for one community, one at a time.
///
/// Nothing escapes as an error: every operation ends as a
/// [`MutationOutcome`], and a failed operation never stops the ones after it.
pub struct RoleMutator<'a, A> {
    api: &'a A,
    community: CommunityId,
    policy: RetryPolicy,
}

impl<'a, A: RoleApi> RoleMutator<'a, A> {
    pub fn new(api: &'a A, community: CommunityId, policy: RetryPolicy) -> Self {
        Self {
            api,
            community,
            policy,
        }
    }

    pub async fn add_role(&self, member: MemberId, role: RoleId) -> MutationOutcome {
        self.perform(member, RoleOp::Add(role)).await
    }

    pub async fn remove_role(&self, member: MemberId, role: RoleId) -> MutationOutcome {
        self.perform(member, RoleOp::Remove(role)).await
    }

    /// Apply a correction: removals first, then the addition, pausing
    /// `operation_delay` after each.
    pub async fn apply(&self, correction: &Correction) -> CorrectionOutcome {
        let mut outcome = CorrectionOutcome::default();
        for op in correction.ops() {
            match self.perform(correction.member_id, op).await {
                MutationOutcome::Applied { .. } => {
                    debug!(
                        community = %self.community,
                        member = %correction.member_name,
                        "{op}"
                    );
                    outcome.applied += 1;
                }
                MutationOutcome::Abandoned { error, .. } => {
                    outcome.failed.push(FailedOperation {
                        member_id: correction.member_id,
                        member_name: correction.member_name.clone(),
                        op,
                        error_kind: error.kind(),
                        error: error.to_string(),
                    });
                }
            }
            if !self.policy.operation_delay.is_zero() {
                tokio::time::sleep(self.policy.operation_delay).await;
            }
        }
        outcome
    }

    async fn perform(&self, member: MemberId, op: RoleOp) -> MutationOutcome {
        let max_attempts = self.policy.max_retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match op {
                RoleOp::Add(role) => self.api.add_role(self.community, member, role).await,
                RoleOp::Remove(role) => self.api.remove_role(self.community, member, role).await,
            };

            let error = match result {
                Ok(()) => return MutationOutcome::Applied { attempts: attempt },
                Err(e) => e,
            };

            match error {
                ApiError::RateLimited { retry_after } if attempt < max_attempts => {
                    let wait = retry_after.unwrap_or_else(|| RetryPolicy::fallback_backoff(attempt));
                    warn!(
                        community = %self.community,
                        %member,
                        attempt,
                        "rate limited on {op}; retrying in {:.1}s",
                        wait.as_secs_f64()
                    );
                    tokio::time::sleep(wait).await;
                }
                error if error.is_rate_limited() => {
                    error!(
                        community = %self.community,
                        %member,
                        attempts = attempt,
                        "still rate limited on {op}; giving up"
                    );
                    return MutationOutcome::Abandoned {
                        attempts: attempt,
                        error,
                    };
                }
                error => {
                    error!(
                        community = %self.community,
                        %member,
                        kind = error.kind(),
                        error = %error,
                        "failed to {op}; abandoning"
                    );
                    return MutationOutcome::Abandoned {
                        attempts: attempt,
                        error,
                    };
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
