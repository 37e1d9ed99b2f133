//! Gotify push notifications.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tenure_core::api::{Alert, AlertSink, NoopAlerts};

#[derive(clap::Args, Debug, Clone, Default)]
pub struct GotifyArgs {
    /// Gotify server URL; alerts are disabled without it
    #[arg(long, env = "GOTIFY_URL")]
    gotify_url: Option<String>,

    /// Gotify application token
    #[arg(long, env = "GOTIFY_KEY", hide_env_values = true)]
    gotify_key: Option<String>,
}

impl GotifyArgs {
    /// The configured sink, or `None` unless both URL and token are set.
    pub fn gotify(&self) -> Option<GotifySink> {
        match (self.gotify_url.as_deref(), self.gotify_key.as_deref()) {
            (Some(url), Some(key)) if !url.trim().is_empty() && !key.trim().is_empty() => {
                Some(GotifySink::new(url, key))
            }
            _ => None,
        }
    }

    pub fn sink(&self) -> Arc<dyn AlertSink + Send + Sync> {
        match self.gotify() {
            Some(sink) => Arc::new(sink),
            None => {
                tracing::debug!("GOTIFY_URL/GOTIFY_KEY not set; alerts disabled");
                Arc::new(NoopAlerts)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct GotifySink {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

impl GotifySink {
    pub fn new(url: &str, token: &str) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            endpoint: format!("{}/message", url.trim().trim_end_matches('/')),
            token: token.trim().to_string(),
        }
    }

    /// Deliver one alert and wait for Gotify to accept it.
    pub async fn send(&self, alert: &Alert) -> anyhow::Result<()> {
        self.http
            .post(&self.endpoint)
            .query(&[("token", &self.token)])
            .json(alert)
            .send()
            .await
            .context("failed to reach Gotify")?
            .error_for_status()
            .context("Gotify rejected the alert")?;
        Ok(())
    }
}

impl AlertSink for GotifySink {
    /// Fire and forget on the current runtime; failures are only logged.
    fn notify(&self, alert: Alert) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(title = %alert.title, "no runtime to deliver alert on; dropped");
            return;
        };
        let sink = self.clone();
        handle.spawn(async move {
            if let Err(e) = sink.send(&alert).await {
                tracing::warn!(title = %alert.title, "alert not delivered: {e:#}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn alert() -> Alert {
        Alert::new("Reconciler started", "Tenure reconciliation is running", 10)
    }

    #[tokio::test]
    async fn send_posts_alert_with_token() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/message")
            .match_query(Matcher::UrlEncoded("token".into(), "abc".into()))
            .match_body(Matcher::Json(serde_json::json!({
                "title": "Reconciler started",
                "message": "Tenure reconciliation is running",
                "priority": 10
            })))
            .with_status(200)
            .create_async()
            .await;

        GotifySink::new(&format!("{}/", server.url()), "abc")
            .send(&alert())
            .await
            .unwrap();

        m.assert_async().await;
    }

    #[tokio::test]
    async fn send_reports_rejection() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/message")
            .match_query(Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let err = GotifySink::new(&server.url(), "wrong")
            .send(&alert())
            .await
            .unwrap_err();

        assert!(format!("{err:#}").contains("rejected"));
    }

    #[tokio::test]
    async fn notify_delivers_in_background() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/message")
            .match_query(Matcher::Any)
            .create_async()
            .await;

        GotifySink::new(&server.url(), "abc").notify(alert());

        for _ in 0..100 {
            if m.matched_async().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        m.assert_async().await;
    }

    #[test]
    fn sink_requires_url_and_key() {
        let args = GotifyArgs {
            gotify_url: Some("http://gotify".into()),
            gotify_key: None,
        };
        assert!(args.gotify().is_none());
        let args = GotifyArgs {
            gotify_url: Some("http://gotify".into()),
            gotify_key: Some("k".into()),
        };
        assert_eq!(args.gotify().unwrap().endpoint, "http://gotify/message");
    }
}
