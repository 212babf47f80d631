use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use super::error::DeliveryError;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::payload::CanonicalPayload;

/// Sends one canonical record to the records service.
#[allow(async_fn_in_trait)]
pub trait Deliver {
    /// One attempt, no retry. Every failure comes back as a value.
    async fn deliver(&self, payload: &CanonicalPayload) -> Result<(), DeliveryError>;
}

pub struct DeliveryClient {
    client: Client,
    base_url: String,
    api_token: String,
}

impl DeliveryClient {
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        Self::with_base_url(
            config.base_url.clone(),
            config.api_token.clone(),
            config.timeout(),
            config.connect_timeout(),
        )
    }

    /// Client pointing at an explicit base URL with explicit bounds.
    pub fn with_base_url(
        base_url: String,
        api_token: String,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, SyncError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url,
            api_token,
        })
    }

    /// `base_url` joined with the payload's resource path.
    pub fn endpoint(&self, payload: &CanonicalPayload) -> String {
        let path = payload.delivery_type().resource_path();
        if self.base_url.ends_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }
}

impl Deliver for DeliveryClient {
    async fn deliver(&self, payload: &CanonicalPayload) -> Result<(), DeliveryError> {
        let url = self.endpoint(payload);
        let mut request = self.client.post(&url).json(&[payload]);
        if !self.api_token.is_empty() {
            request = request.bearer_auth(&self.api_token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                let err = DeliveryError::from(err);
                warn!(%url, error = %err, "delivery failed");
                return Err(err);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            warn!(%url, status = status.as_u16(), "delivery rejected");
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                message,
            });
        }

        debug!(%url, "delivered");
        Ok(())
    }
}
