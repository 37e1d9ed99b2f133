use crate::output::print_json;
use anyhow::Context;
use std::path::Path;
use tenure_core::config::Config;

pub fn run(path: &Path, days: u32, json: bool) -> anyhow::Result<()> {
    let config = Config::load(path).context("failed to load config")?;
    let table = config.tier_table().context("invalid tier table")?;
    let tier = table.resolve_tier(Some(days));

    if json {
        return print_json(&serde_json::json!({
            "days": days,
            "tier": tier,
        }));
    }

    match tier {
        Some(t) => println!(
            "{days} days -> {} (tier starts at {} days)",
            t.role_name, t.min_tenure_days
        ),
        None => println!("{days} days -> no tier applies"),
    }
    Ok(())
}
