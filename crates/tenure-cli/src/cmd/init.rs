use anyhow::Context;
use std::path::Path;
use tenure_core::config::Config;
use tenure_core::io;

const HEADER: &str = "\
# Tenure tier reconciler.
#
# Each tier gives its role to members whose tenure (whole days since joining)
# meets `days`; a member holds exactly one tier role, the most senior one due.
# Secrets are read from the environment: DISCORD_BOT_TOKEN, GOTIFY_URL,
# GOTIFY_KEY.
";

pub fn run(path: &Path) -> anyhow::Result<()> {
    let body = serde_yaml::to_string(&Config::default()).context("failed to render config")?;
    let written = io::write_if_missing(path, format!("{HEADER}\n{body}").as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;

    if written {
        println!("  created: {}", path.display());
    } else {
        println!("  exists:  {}", path.display());
    }
    Ok(())
}
