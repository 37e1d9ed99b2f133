//! One reconciliation pass over one community.
//!
//! A [`ReconciliationCycle`] is created once per community and reused across
//! runs so the tier table's role ids stay cached. Each [`run`] walks
//! `Idle → VerifyingTiers → Scanning → Draining → Idle` and returns a
//! [`CycleReport`]; nothing inside a run is surfaced as an error.
//!
//! [`run`]: ReconciliationCycle::run

use crate::api::{Directory, RoleApi};
use crate::batch::{Batch, BatchPolicy, BatchScheduler};
use crate::config::ReconcileConfig;
use crate::drift::{detect, Detection};
use crate::mutator::{FailedOperation, RetryPolicy, RoleMutator};
use crate::shutdown::Shutdown;
use crate::tier::{TierTable, TierVerification};
use crate::types::{CommunityDescriptor, CommunityId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// CyclePhase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Idle,
    VerifyingTiers,
    Scanning,
    Draining,
}

// ---------------------------------------------------------------------------
// CycleReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub run_id: Uuid,
    pub community: CommunityId,
    pub community_name: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub tiers: TierVerification,
    pub members_scanned: usize,
    pub converged: usize,
    pub skipped: usize,
    /// Corrections detected during the scan.
    pub corrections: usize,
    /// Size of each submitted batch, in order.
    pub batches: Vec<usize>,
    pub operations_applied: usize,
    pub failed_operations: Vec<FailedOperation>,
    /// Corrections detected but dropped because shutdown interrupted the scan.
    pub discarded: usize,
    pub interrupted: bool,
    /// Community-level failure that ended the run early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CycleReport {
    fn start(community: &CommunityDescriptor) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            community: community.id,
            community_name: community.name.clone(),
            started_at: Utc::now(),
            finished_at: None,
            tiers: TierVerification::default(),
            members_scanned: 0,
            converged: 0,
            skipped: 0,
            corrections: 0,
            batches: Vec::new(),
            operations_applied: 0,
            failed_operations: Vec::new(),
            discarded: 0,
            interrupted: false,
            error: None,
        }
    }

    /// True when every tier resolved, every operation landed and the scan ran
    /// to completion.
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
            && !self.interrupted
            && self.tiers.failed.is_empty()
            && self.failed_operations.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ReconciliationCycle
// ---------------------------------------------------------------------------

pub struct ReconciliationCycle {
    community: CommunityDescriptor,
    tiers: TierTable,
    batch_policy: BatchPolicy,
    retry_policy: RetryPolicy,
    phase: CyclePhase,
}

impl ReconciliationCycle {
    pub fn new(community: CommunityDescriptor, tiers: TierTable, config: &ReconcileConfig) -> Self {
        Self {
            community,
            tiers,
            batch_policy: config.batch_policy(),
            retry_policy: config.retry_policy(),
            phase: CyclePhase::Idle,
        }
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    fn enter(&mut self, phase: CyclePhase) {
        debug!(community = %self.community.id, from = ?self.phase, to = ?phase, "cycle phase");
        self.phase = phase;
    }

    pub async fn run<A>(&mut self, api: &A, shutdown: &mut Shutdown) -> CycleReport
    where
        A: Directory + RoleApi,
    {
        let id = self.community.id;
        let mut report = CycleReport::start(&self.community);
        info!(community = %self.community, run_id = %report.run_id, "reconciliation cycle started");

        self.enter(CyclePhase::VerifyingTiers);
        report.tiers = self.tiers.ensure_roles_exist(id, api).await;

        self.enter(CyclePhase::Scanning);
        let members = match api.list_members(id).await {
            Ok(members) => members,
            Err(e) => {
                error!(community = %self.community, error = %e, "failed to list members");
                report.error = Some(format!("failed to list members: {e}"));
                return self.finish(report);
            }
        };

        let mutator = RoleMutator::new(api, id, self.retry_policy);
        let mut scheduler = BatchScheduler::new(self.batch_policy, Instant::now());

        for member in &members {
            if shutdown.is_triggered() {
                report.interrupted = true;
                break;
            }
            report.members_scanned += 1;

            match detect(member, &self.tiers) {
                Detection::Converged => {
                    debug!(community = %id, member = %member.name, "already converged");
                    report.converged += 1;
                }
                Detection::Skip(reason) => {
                    debug!(community = %id, member = %member.name, %reason, "member skipped");
                    report.skipped += 1;
                }
                Detection::Correct(correction) => {
                    debug!(
                        community = %id,
                        member = %member.name,
                        add = ?correction.role_to_add,
                        remove = ?correction.roles_to_remove,
                        "drift detected"
                    );
                    report.corrections += 1;
                    scheduler.push(correction);
                }
            }

            if let Some(batch) = scheduler.poll_flush(Instant::now()) {
                submit(&mutator, batch, &mut report).await;
                if !shutdown.sleep(scheduler.inter_batch_delay()).await {
                    report.interrupted = true;
                    break;
                }
                scheduler.resume(Instant::now());
            }

            // One member per turn, so shutdown can land mid-scan.
            tokio::task::yield_now().await;
        }

        if report.interrupted {
            report.discarded = scheduler.discard();
            warn!(
                community = %self.community,
                discarded = report.discarded,
                "shutdown requested; scan stopped"
            );
        } else {
            self.enter(CyclePhase::Draining);
            if let Some(batch) = scheduler.drain() {
                submit(&mutator, batch, &mut report).await;
            }
        }

        self.finish(report)
    }

    fn finish(&mut self, mut report: CycleReport) -> CycleReport {
        self.enter(CyclePhase::Idle);
        report.finished_at = Some(Utc::now());
        info!(
            community = %self.community,
            scanned = report.members_scanned,
            converged = report.converged,
            skipped = report.skipped,
            corrections = report.corrections,
            batches = report.batches.len(),
            applied = report.operations_applied,
            failed = report.failed_operations.len(),
            "reconciliation cycle finished"
        );
        report
    }
}

async fn submit<A: RoleApi>(mutator: &RoleMutator<'_, A>, batch: Batch, report: &mut CycleReport) {
    info!(community = %report.community, seq = batch.seq, size = batch.len(), "submitting batch");
    report.batches.push(batch.len());
    for correction in &batch.corrections {
        let outcome = mutator.apply(correction).await;
        if outcome.is_complete() {
            info!(
                community = %report.community,
                member = %correction.member_name,
                ops = outcome.applied,
                "member corrected"
            );
        }
        report.operations_applied += outcome.applied;
        report.failed_operations.extend(outcome.failed);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TierConfig;
    use crate::shutdown;
    use crate::testing::{Call, FakeApi};
    use crate::types::RoleId;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;

    fn tiers() -> TierTable {
        TierTable::from_config(&[
            TierConfig::new(0, "New"),
            TierConfig::new(30, "Member"),
            TierConfig::new(180, "Veteran"),
            TierConfig::new(365, "Senior"),
        ])
        .unwrap()
    }

    fn cycle(c: CommunityId, config: &ReconcileConfig) -> ReconciliationCycle {
        ReconciliationCycle::new(CommunityDescriptor::new(c, "guild"), tiers(), config)
    }

    fn fast_config() -> ReconcileConfig {
        ReconcileConfig {
            inter_batch_delay_secs: 0,
            operation_delay_secs: 0,
            ..ReconcileConfig::default()
        }
    }

    fn id(api: &FakeApi, c: CommunityId, name: &str) -> RoleId {
        api.role_id(c, name).unwrap()
    }

    /// Yield until the spawned cycle has listed members and scanned the first.
    async fn until_scanning(api: &FakeApi) {
        while !api.calls().iter().any(|c| matches!(c, Call::ListMembers(_))) {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn senior_member_converges_in_one_pass() {
        let api = FakeApi::new();
        let c = api.community(1, "guild");
        let new = api.role(c, "New");
        let m = api.member(c, 1, Some(400), &[new]);
        let mut cy = cycle(c, &ReconcileConfig::default());

        let report = cy.run(&api, &mut Shutdown::never()).await;

        let senior = id(&api, c, "Senior");
        assert_eq!(api.member_roles(c, m), BTreeSet::from([senior]));
        assert_eq!(report.corrections, 1);
        assert_eq!(report.operations_applied, 2);
        assert!(report.is_clean());
        assert_eq!(cy.phase(), CyclePhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn second_run_is_a_no_op() {
        let api = FakeApi::new();
        let c = api.community(1, "guild");
        let member = api.role(c, "Member");
        let veteran = api.role(c, "Veteran");
        api.member(c, 1, Some(200), &[member, veteran]);
        api.member(c, 2, Some(3), &[]);
        let mut cy = cycle(c, &fast_config());

        let first = cy.run(&api, &mut Shutdown::never()).await;
        let mutations = api.mutation_calls().len();
        let second = cy.run(&api, &mut Shutdown::never()).await;

        assert_eq!(first.corrections, 2);
        assert_eq!(second.corrections, 0);
        assert_eq!(second.converged, 2);
        assert_eq!(api.mutation_calls().len(), mutations);
        assert!(second.tiers.created.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn exclusive_tier_role_after_convergence() {
        let api = FakeApi::new();
        let c = api.community(1, "guild");
        let member = api.role(c, "Member");
        let veteran = api.role(c, "Veteran");
        let m = api.member(c, 1, Some(45), &[member, veteran]);
        let mut cy = cycle(c, &fast_config());

        cy.run(&api, &mut Shutdown::never()).await;

        assert_eq!(api.member_roles(c, m), BTreeSet::from([member]));
    }

    #[tokio::test(start_paused = true)]
    async fn twenty_five_corrections_flush_as_ten_ten_five() {
        let api = FakeApi::new();
        let c = api.community(1, "guild");
        for n in 0..25 {
            api.member(c, n, Some(40), &[]);
        }
        let mut cy = cycle(c, &ReconcileConfig::default());
        let start = Instant::now();

        let report = cy.run(&api, &mut Shutdown::never()).await;

        assert_eq!(report.batches, vec![10, 10, 5]);
        assert_eq!(report.operations_applied, 25);
        // Two mid-scan pauses of 60s plus 1s after each of the 25 additions.
        assert_eq!(start.elapsed(), Duration::from_secs(2 * 60 + 25));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_tenure_is_never_touched() {
        let api = FakeApi::new();
        let c = api.community(1, "guild");
        let new = api.role(c, "New");
        let veteran = api.role(c, "Veteran");
        let m = api.member(c, 1, None, &[new, veteran]);
        let mut cy = cycle(c, &fast_config());

        let report = cy.run(&api, &mut Shutdown::never()).await;

        assert_eq!(report.skipped, 1);
        assert!(api.mutation_calls().is_empty());
        assert_eq!(api.member_roles(c, m), BTreeSet::from([new, veteran]));
    }

    #[tokio::test(start_paused = true)]
    async fn failing_member_does_not_stop_the_rest() {
        let api = FakeApi::new();
        let c = api.community(1, "guild");
        let bad = api.member(c, 1, Some(40), &[]);
        let good = api.member(c, 2, Some(40), &[]);
        api.forbid(bad);
        let mut cy = cycle(c, &fast_config());

        let report = cy.run(&api, &mut Shutdown::never()).await;

        assert_eq!(report.failed_operations.len(), 1);
        assert_eq!(report.failed_operations[0].member_id, bad);
        assert_eq!(report.failed_operations[0].error_kind, "permission");
        assert!(api.member_roles(c, good).contains(&id(&api, c, "Member")));
        assert!(!report.is_clean());
    }

    #[tokio::test(start_paused = true)]
    async fn member_listing_failure_ends_run_with_error() {
        let api = FakeApi::new();
        let c = api.community(1, "guild");
        api.break_member_listing(c);
        let mut cy = cycle(c, &fast_config());

        let report = cy.run(&api, &mut Shutdown::never()).await;

        assert!(report.error.as_deref().unwrap().contains("502"));
        assert_eq!(report.members_scanned, 0);
        assert_eq!(cy.phase(), CyclePhase::Idle);
        // Tier verification still happened before the scan.
        assert_eq!(report.tiers.resolved, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn unresolved_tier_skips_only_its_members() {
        let api = FakeApi::new();
        let c = api.community(1, "guild");
        api.refuse_create("Senior");
        let senior = api.member(c, 1, Some(400), &[]);
        let regular = api.member(c, 2, Some(40), &[]);
        let mut cy = cycle(c, &fast_config());

        let report = cy.run(&api, &mut Shutdown::never()).await;

        assert_eq!(report.tiers.failed, vec!["Senior"]);
        assert_eq!(report.skipped, 1);
        assert!(api.member_roles(c, senior).is_empty());
        assert_eq!(api.member_roles(c, regular).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_pause_stops_scan_and_discards_pending() {
        let api = FakeApi::new();
        let c = api.community(1, "guild");
        for n in 0..15 {
            api.member(c, n, Some(40), &[]);
        }
        let config = ReconcileConfig {
            max_batch_size: 5,
            operation_delay_secs: 0,
            ..ReconcileConfig::default()
        };
        let mut cy = cycle(c, &config);
        let (trigger, mut shutdown) = shutdown::channel();

        let run = tokio::spawn(async move {
            let report = cy.run(&api, &mut shutdown).await;
            (report, api)
        });
        // First batch is submitted instantly, then the 60s pause starts.
        tokio::time::sleep(Duration::from_secs(30)).await;
        trigger.trigger();
        let (report, api) = run.await.unwrap();

        assert!(report.interrupted);
        assert_eq!(report.batches, vec![5]);
        assert_eq!(report.members_scanned, 5);
        assert_eq!(report.discarded, 0);
        let adds = api
            .mutation_calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Add(..)))
            .count();
        assert_eq!(adds, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_between_members_discards_partial_batch() {
        let api = Arc::new(FakeApi::new());
        let c = api.community(1, "guild");
        for n in 0..50 {
            api.member(c, n, Some(40), &[]);
        }
        let config = ReconcileConfig {
            max_batch_size: 100,
            ..fast_config()
        };
        let mut cy = cycle(c, &config);
        let (trigger, mut shutdown) = shutdown::channel();

        let run = tokio::spawn({
            let api = api.clone();
            async move { cy.run(&api, &mut shutdown).await }
        });
        until_scanning(&api).await;
        trigger.trigger();
        let report = run.await.unwrap();

        assert!(report.interrupted);
        assert!(report.members_scanned < 50);
        assert!(report.discarded > 0);
        assert_eq!(report.discarded, report.corrections);
        assert!(report.batches.is_empty());
        assert!(api.mutation_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn window_flushes_after_a_converged_member() {
        let api = Arc::new(FakeApi::new());
        let c = api.community(1, "guild");
        let member = api.role(c, "Member");
        api.member(c, 1, Some(40), &[]);
        api.member(c, 2, Some(40), &[member]);
        api.member(c, 3, Some(40), &[]);
        let mut cy = cycle(c, &fast_config());

        let run = tokio::spawn({
            let api = api.clone();
            async move { cy.run(&api, &mut Shutdown::never()).await }
        });
        // Member 1 is pending; let its window run out before member 2.
        until_scanning(&api).await;
        tokio::time::advance(Duration::from_secs(600)).await;
        let report = run.await.unwrap();

        assert_eq!(report.converged, 1);
        assert_eq!(report.batches, vec![1, 1]);
        assert_eq!(report.operations_applied, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_before_run_scans_nothing() {
        let api = FakeApi::new();
        let c = api.community(1, "guild");
        api.member(c, 1, Some(40), &[]);
        let mut cy = cycle(c, &fast_config());
        let (trigger, mut shutdown) = shutdown::channel();
        trigger.trigger();

        let report = cy.run(&api, &mut shutdown).await;

        assert!(report.interrupted);
        assert_eq!(report.members_scanned, 0);
        assert!(api.mutation_calls().is_empty());
    }
}
