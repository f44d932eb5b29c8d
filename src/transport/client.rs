use anyhow::{Context, Result};
use std::time::Duration;

use super::protocol::notify_url;
use crate::gossip::Pusher;
use crate::membership::types::Node;
use crate::register::RegisterState;

/// Pushes register snapshots to peers over HTTP.
pub struct HttpPusher {
    http_client: reqwest::Client,
    notifier: String,
    timeout: Duration,
}

impl HttpPusher {
    /// `notifier` is the address peers will log as the origin of our pushes.
    pub fn new(notifier: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            notifier: notifier.into(),
            timeout,
        }
    }
}

impl Pusher for HttpPusher {
    async fn push(&self, peer: &Node, state: RegisterState) -> Result<()> {
        let url = notify_url(peer.http_addr, state);

        let response = self
            .http_client
            .post(&url)
            .query(&[("notifier", self.notifier.as_str())])
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", peer.http_addr))?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Notify to {} failed: {}",
                peer.http_addr,
                response.status()
            ));
        }

        Ok(())
    }
}
