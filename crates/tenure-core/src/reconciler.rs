//! Periodic driver: one reconciliation cycle per community, every period.

use crate::api::{Alert, AlertSink, Directory, RoleApi};
use crate::config::Config;
use crate::cycle::{CycleReport, ReconciliationCycle};
use crate::error::Result;
use crate::shutdown::Shutdown;
use crate::tier::TierTable;
use crate::types::{CommunityDescriptor, CommunityId};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Latest report per community, published after every cycle.
pub type ReportBoard = BTreeMap<CommunityId, CycleReport>;

pub struct Reconciler<A, S> {
    api: A,
    alerts: S,
    tiers: TierTable,
    config: Config,
    cycles: BTreeMap<CommunityId, ReconciliationCycle>,
    board: watch::Sender<ReportBoard>,
}

impl<A, S> Reconciler<A, S>
where
    A: Directory + RoleApi,
    S: AlertSink,
{
    /// Fails only when the configured tier table is unusable.
    pub fn new(api: A, alerts: S, config: &Config) -> Result<Self> {
        let (board, _) = watch::channel(ReportBoard::new());
        Ok(Self {
            api,
            alerts,
            tiers: config.tier_table()?,
            config: config.clone(),
            cycles: BTreeMap::new(),
            board,
        })
    }

    /// Subscribe to the report board.
    pub fn reports(&self) -> watch::Receiver<ReportBoard> {
        self.board.subscribe()
    }

    /// Reconcile every visible community once, in id order.
    pub async fn run_once(&mut self, shutdown: &mut Shutdown) -> Vec<CycleReport> {
        let mut communities = match self.api.communities().await {
            Ok(communities) => communities,
            Err(e) => {
                error!(error = %e, "failed to list communities");
                self.alerts.notify(Alert::new(
                    "Tenure reconciliation failed",
                    format!("Could not list communities: {e}"),
                    self.config.alerts.priority,
                ));
                return Vec::new();
            }
        };
        communities.retain(|c| self.config.allows(c.id));
        communities.sort_by_key(|c| c.id);
        self.prune(&communities);

        let mut reports = Vec::with_capacity(communities.len());
        for community in communities {
            if shutdown.is_triggered() {
                break;
            }
            let id = community.id;
            let cycle = self.cycles.entry(id).or_insert_with(|| {
                ReconciliationCycle::new(community, self.tiers.clone(), &self.config.reconcile)
            });

            let report = cycle.run(&self.api, shutdown).await;

            if let Some(reason) = &report.error {
                self.alerts.notify(Alert::new(
                    format!("Tenure reconciliation failed: {}", report.community_name),
                    reason.clone(),
                    self.config.alerts.priority,
                ));
            } else if !report.is_clean() {
                warn!(
                    community = %id,
                    failed = report.failed_operations.len(),
                    unresolved_tiers = report.tiers.failed.len(),
                    interrupted = report.interrupted,
                    "reconciliation cycle finished with problems"
                );
            }

            self.board.send_modify(|board| {
                board.insert(id, report.clone());
            });
            reports.push(report);
        }
        reports
    }

    /// Forget communities that are gone or no longer allowed.
    fn prune(&mut self, present: &[CommunityDescriptor]) {
        let present: BTreeSet<CommunityId> = present.iter().map(|c| c.id).collect();
        self.cycles.retain(|id, _| {
            let keep = present.contains(id);
            if !keep {
                debug!(community = %id, "community gone; dropping its cycle");
            }
            keep
        });
        self.board.send_if_modified(|board| {
            let before = board.len();
            board.retain(|id, _| present.contains(id));
            board.len() != before
        });
    }

    /// Run immediately, then once per cycle period, until shutdown.
    ///
    /// A run that overruns the period delays the next tick instead of
    /// bunching up missed ones.
    pub async fn run(mut self, mut shutdown: Shutdown) {
        let period = self.config.reconcile.cycle_period();
        info!(period_secs = period.as_secs(), "reconciler started");
        self.alerts.notify(Alert::new(
            "Reconciler started",
            "Tenure reconciliation is running",
            self.config.alerts.startup_priority,
        ));

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.triggered() => break,
            }
            self.run_once(&mut shutdown).await;
            if shutdown.is_triggered() {
                break;
            }
        }
        info!("reconciler stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
