use crate::domain_model::OriginChange;
use crate::domain_port::OriginChangeNotifier;
use anyhow::Context;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// Posts origin change events as JSON to a single callback URL. One attempt, no retry.
#[derive(Clone)]
pub struct ReqwestWebhookNotifier {
    client: Client,
    url: String,
}

impl ReqwestWebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait::async_trait]
impl OriginChangeNotifier for ReqwestWebhookNotifier {
    async fn notify_origin_change(&self, event: &OriginChange) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .context("failed to send webhook request")?;

        info!(status = %response.status(), user_id = %event.user_id, "webhook notified");
        response
            .error_for_status()
            .context("webhook endpoint returned an error status")?;
        Ok(())
    }
}

/// Used when no webhook URL is configured.
#[derive(Debug, Default)]
pub struct DisabledNotifier;

#[async_trait::async_trait]
impl OriginChangeNotifier for DisabledNotifier {
    async fn notify_origin_change(&self, event: &OriginChange) -> anyhow::Result<()> {
        debug!(user_id = %event.user_id, ip = %event.ip, "webhook disabled, dropping origin change");
        Ok(())
    }
}
