//! Push gateways.
//!
//! Delivery is best-effort by contract; these adapters report failures and
//! the caller logs and drops them.

use async_trait::async_trait;
use domains::{PushGateway, PushMessage};
use tracing::info;

/// Logs pushes instead of delivering them. Used when no provider is
/// configured.
#[derive(Debug, Default, Clone)]
pub struct LogPushGateway;

#[async_trait]
impl PushGateway for LogPushGateway {
    async fn send(&self, message: PushMessage) -> anyhow::Result<()> {
        info!(
            receiver = %message.receiver_id,
            kind = ?message.kind,
            title = %message.title,
            "push (log only)"
        );
        Ok(())
    }
}

/// POSTs each message as JSON to a provider webhook.
#[cfg(feature = "push-webhook")]
pub struct WebhookPushGateway {
    client: reqwest::Client,
    url: String,
}

#[cfg(feature = "push-webhook")]
impl WebhookPushGateway {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()?;
        Ok(Self { client, url: url.into() })
    }
}

#[cfg(feature = "push-webhook")]
#[async_trait]
impl PushGateway for WebhookPushGateway {
    async fn send(&self, message: PushMessage) -> anyhow::Result<()> {
        self.client
            .post(&self.url)
            .json(&message)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
