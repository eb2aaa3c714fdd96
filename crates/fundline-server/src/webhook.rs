//! Lead forwarding.
//!
//! When `FUNDLINE_LEAD_WEBHOOK_URL` is configured, every stored lead is
//! POSTed as JSON to that URL from a background task. The submitting client
//! never waits on the forward, and a failed forward only produces a warning:
//! the lead is already in the database.

use std::time::Duration;

use fundline_storage::Lead;

/// Timeout for a single forward attempt.
const FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

/// Fire-and-forget lead forwarder.
#[derive(Debug, Clone)]
pub struct LeadForwarder {
    url: String,
    #[cfg(feature = "lead-webhook")]
    client: reqwest::Client,
}

impl LeadForwarder {
    /// Build a forwarder for `url`.
    ///
    /// Returns `None` (with a warning) if the HTTP client cannot be built or
    /// the server was compiled without the `lead-webhook` feature.
    #[must_use]
    pub fn new(url: &str) -> Option<Self> {
        #[cfg(feature = "lead-webhook")]
        {
            match reqwest::Client::builder().timeout(FORWARD_TIMEOUT).build() {
                Ok(client) => Some(Self {
                    url: url.to_owned(),
                    client,
                }),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to build lead webhook client, forwarding disabled");
                    None
                }
            }
        }

        #[cfg(not(feature = "lead-webhook"))]
        {
            tracing::warn!(
                url,
                timeout_secs = FORWARD_TIMEOUT.as_secs(),
                "lead webhook configured but the 'lead-webhook' feature is disabled"
            );
            None
        }
    }

    /// Target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Forward `lead` in the background.
    #[cfg(feature = "lead-webhook")]
    pub fn forward(&self, lead: Lead) {
        let client = self.client.clone();
        let url = self.url.clone();
        tokio::spawn(async move {
            match client.post(&url).json(&lead).send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::debug!(lead_id = lead.id, "lead forwarded");
                }
                Ok(resp) => {
                    tracing::warn!(
                        lead_id = lead.id,
                        status = %resp.status(),
                        "lead webhook rejected forward"
                    );
                }
                Err(e) => {
                    tracing::warn!(lead_id = lead.id, error = %e, "lead webhook unreachable");
                }
            }
        });
    }

    #[cfg(not(feature = "lead-webhook"))]
    pub fn forward(&self, lead: Lead) {
        tracing::debug!(lead_id = lead.id, url = %self.url, "lead forwarding compiled out");
    }
}
