use chrono::{DateTime, Utc};
use tenure_core::reconciler::ReportBoard;
use tokio::sync::watch;

/// Shared state for all routes. Read-only: the reconciler publishes reports
/// through the watch channel and the server only ever borrows the latest.
#[derive(Clone)]
pub struct AppState {
    pub reports: watch::Receiver<ReportBoard>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(reports: watch::Receiver<ReportBoard>) -> Self {
        Self {
            reports,
            started_at: Utc::now(),
        }
    }
}
