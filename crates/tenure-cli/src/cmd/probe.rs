use crate::alerts::GotifySink;
use crate::output::print_json;
use std::time::Duration;
use tenure_core::api::Alert;
use tracing::{error, info, warn};

const PROBE_PRIORITY: u8 = 10;

pub fn run(url: &str, gotify: Option<GotifySink>, json: bool) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let failure = rt.block_on(probe(url));

    if json {
        print_json(&serde_json::json!({
            "url": url,
            "healthy": failure.is_none(),
            "error": failure,
        }))?;
    }

    let Some(reason) = failure else {
        info!(url, "reconciler is healthy");
        if !json {
            println!("healthy");
        }
        return Ok(());
    };

    error!(url, "{reason}");
    if let Some(sink) = gotify {
        let alert = Alert::new("Tenure health check", reason.clone(), PROBE_PRIORITY);
        if let Err(e) = rt.block_on(sink.send(&alert)) {
            warn!("alert not delivered: {e:#}");
        }
    }
    anyhow::bail!("{reason}")
}

/// `None` when the endpoint answered 2xx, otherwise why it is unhealthy.
async fn probe(url: &str) -> Option<String> {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
    {
        Ok(c) => c,
        Err(e) => return Some(format!("health check failed: {e}")),
    };
    match client.get(url).send().await {
        Ok(resp) if resp.status().is_success() => None,
        Ok(resp) => Some(format!(
            "health check failed with status code {}",
            resp.status().as_u16()
        )),
        Err(e) => Some(format!("health check failed: {e}")),
    }
}
