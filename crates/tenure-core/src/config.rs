use crate::batch::BatchPolicy;
use crate::error::{Result, TenureError};
use crate::mutator::RetryPolicy;
use crate::tier::TierTable;
use crate::types::CommunityId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default file name looked up in the working directory.
pub const CONFIG_FILE: &str = "tenure.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

impl ConfigWarning {
    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Warning,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// TierConfig
// ---------------------------------------------------------------------------

/// One configured tier: members with at least `days` of tenure get `role_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierConfig {
    pub days: u32,
    pub role_name: String,
}

impl TierConfig {
    pub fn new(days: u32, role_name: impl Into<String>) -> Self {
        Self {
            days,
            role_name: role_name.into(),
        }
    }
}

fn default_tiers() -> Vec<TierConfig> {
    vec![
        TierConfig::new(0, "New Member"),
        TierConfig::new(30, "Member"),
        TierConfig::new(180, "Veteran Member"),
        TierConfig::new(365, "Senior Member"),
    ]
}

// ---------------------------------------------------------------------------
// ReconcileConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_accumulation_window")]
    pub accumulation_window_secs: u64,
    #[serde(default = "default_inter_batch_delay")]
    pub inter_batch_delay_secs: u64,
    #[serde(default = "default_operation_delay")]
    pub operation_delay_secs: u64,
    /// Total attempts per role operation, including the first.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_cycle_period")]
    pub cycle_period_secs: u64,
}

fn default_max_batch_size() -> usize {
    10
}

fn default_accumulation_window() -> u64 {
    600
}

fn default_inter_batch_delay() -> u64 {
    60
}

fn default_operation_delay() -> u64 {
    1
}

fn default_max_retries() -> u32 {
    5
}

fn default_cycle_period() -> u64 {
    600
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            accumulation_window_secs: default_accumulation_window(),
            inter_batch_delay_secs: default_inter_batch_delay(),
            operation_delay_secs: default_operation_delay(),
            max_retries: default_max_retries(),
            cycle_period_secs: default_cycle_period(),
        }
    }
}

impl ReconcileConfig {
    pub fn batch_policy(&self) -> BatchPolicy {
        BatchPolicy {
            max_batch_size: self.max_batch_size.max(1),
            accumulation_window: Duration::from_secs(self.accumulation_window_secs),
            inter_batch_delay: Duration::from_secs(self.inter_batch_delay_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.max(1),
            operation_delay: Duration::from_secs(self.operation_delay_secs),
        }
    }

    pub fn cycle_period(&self) -> Duration {
        Duration::from_secs(self.cycle_period_secs.max(1))
    }
}

// ---------------------------------------------------------------------------
// HealthConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_enabled")]
    pub enabled: bool,
    #[serde(default = "default_health_bind")]
    pub bind: String,
}

fn default_health_enabled() -> bool {
    true
}

fn default_health_bind() -> String {
    "0.0.0.0:8015".to_string()
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: default_health_enabled(),
            bind: default_health_bind(),
        }
    }
}

// ---------------------------------------------------------------------------
// AlertConfig
// ---------------------------------------------------------------------------

/// Alert priorities. The endpoint and token come from the environment
/// (`GOTIFY_URL`, `GOTIFY_KEY`) so the file can be committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_alert_priority")]
    pub priority: u8,
    #[serde(default = "default_startup_priority")]
    pub startup_priority: u8,
}

fn default_alert_priority() -> u8 {
    5
}

fn default_startup_priority() -> u8 {
    10
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            priority: default_alert_priority(),
            startup_priority: default_startup_priority(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_tiers")]
    pub tiers: Vec<TierConfig>,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    /// Restrict reconciliation to these communities. Empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub communities: Vec<CommunityId>,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            tiers: default_tiers(),
            reconcile: ReconcileConfig::default(),
            communities: Vec::new(),
            health: HealthConfig::default(),
            alerts: AlertConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TenureError::ConfigNotFound(path.to_path_buf()));
        }
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(data)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    /// Load and reject any error-level finding. Warnings are returned so the
    /// caller can log them.
    pub fn load_validated(path: &Path) -> Result<(Self, Vec<ConfigWarning>)> {
        let cfg = Self::load(path)?;
        let warnings = cfg.validate();
        if let Some(err) = warnings.iter().find(|w| w.level == WarnLevel::Error) {
            return Err(TenureError::Configuration(err.message.clone()));
        }
        Ok((cfg, warnings))
    }

    pub fn tier_table(&self) -> Result<TierTable> {
        TierTable::from_config(&self.tiers)
    }

    pub fn allows(&self, community: CommunityId) -> bool {
        self.communities.is_empty() || self.communities.contains(&community)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        // 1. Tier table must be unambiguous
        if let Err(e) = self.tier_table() {
            let message = match e {
                TenureError::Configuration(m) => m,
                other => other.to_string(),
            };
            warnings.push(ConfigWarning::error(message));
        }

        // 2. Batching and retry bounds
        let r = &self.reconcile;
        if r.max_batch_size == 0 {
            warnings.push(ConfigWarning::error("reconcile.max_batch_size must be at least 1"));
        }
        if r.max_retries == 0 {
            warnings.push(ConfigWarning::error("reconcile.max_retries must be at least 1"));
        } else if r.max_retries > 10 {
            warnings.push(ConfigWarning::warning(format!(
                "reconcile.max_retries={} (>10 is unusual)",
                r.max_retries
            )));
        }
        if r.cycle_period_secs == 0 {
            warnings.push(ConfigWarning::error("reconcile.cycle_period_secs must be at least 1"));
        }

        // 3. Pacing that is technically valid but risky against rate limits
        if r.inter_batch_delay_secs == 0 {
            warnings.push(ConfigWarning::warning(
                "reconcile.inter_batch_delay_secs is 0: batches are submitted back to back",
            ));
        }
        if r.operation_delay_secs == 0 {
            warnings.push(ConfigWarning::warning(
                "reconcile.operation_delay_secs is 0: role operations are not spaced out",
            ));
        }

        // 4. Health bind address
        if self.health.enabled && self.health.bind.parse::<std::net::SocketAddr>().is_err() {
            warnings.push(ConfigWarning::error(format!(
                "health.bind '{}' is not a socket address",
                self.health.bind
            )));
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
