use crate::output::{print_json, print_table};
use anyhow::Context;
use std::path::Path;
use tenure_core::config::{Config, WarnLevel};

pub fn run(path: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(path).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({
            "tiers": config.tiers,
            "reconcile": config.reconcile,
            "communities": config.communities,
            "health": config.health,
            "warnings": warnings,
        }))?;
    } else {
        let rows: Vec<Vec<String>> = config
            .tiers
            .iter()
            .map(|t| vec![t.days.to_string(), t.role_name.clone()])
            .collect();
        print_table(&["DAYS", "ROLE"], &rows);

        let r = &config.reconcile;
        println!();
        println!(
            "batches of {} (window {}s, pause {}s), {}s between operations, {} attempts, every {}s",
            r.max_batch_size,
            r.accumulation_window_secs,
            r.inter_batch_delay_secs,
            r.operation_delay_secs,
            r.max_retries,
            r.cycle_period_secs
        );
        if config.communities.is_empty() {
            println!("communities: all");
        } else {
            let ids: Vec<String> = config.communities.iter().map(|c| c.to_string()).collect();
            println!("communities: {}", ids.join(", "));
        }

        if warnings.is_empty() {
            println!("Config is valid. No warnings.");
        }
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
