//! reqwest-backed notifier

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::error::{NotifyError, NotifyResult};
use crate::{notification_url, Notifier, ACTION_HEADER, API_KEY_HEADER, DELIVER_EVENT_NOTIFICATION};

/// Notifier settings
#[derive(Debug, Clone, Default)]
pub struct NotifierConfig {
    /// Per-request deadline. `None` leaves the transport default in place.
    pub timeout: Option<Duration>,
}

/// Delivers notifications with a single HTTP POST per call
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: Client,
    timeout: Option<Duration>,
}

impl HttpNotifier {
    pub fn new(config: NotifierConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    /// Reuse an existing client (shared connection pool)
    pub fn with_client(client: Client, config: NotifierConfig) -> Self {
        Self {
            client,
            timeout: config.timeout,
        }
    }
}

impl Default for HttpNotifier {
    fn default() -> Self {
        Self::new(NotifierConfig::default())
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn deliver<P>(&self, endpoint_url: &str, api_key: &str, payload: &P) -> NotifyResult<()>
    where
        P: Serialize + Sync + ?Sized,
    {
        let body = serde_json::to_vec(payload).map_err(|source| NotifyError::Serialize {
            url: endpoint_url.to_string(),
            source,
        })?;
        let api_key = HeaderValue::from_str(api_key).map_err(|_| NotifyError::InvalidApiKey {
            url: endpoint_url.to_string(),
        })?;

        let mut request = self
            .client
            .post(notification_url(endpoint_url))
            .header(CONTENT_TYPE, "application/json")
            .header(API_KEY_HEADER, api_key)
            .header(ACTION_HEADER, DELIVER_EVENT_NOTIFICATION)
            .body(body);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|source| NotifyError::Connectivity {
                url: endpoint_url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Delivery {
                url: endpoint_url.to_string(),
                status: status.as_u16(),
            });
        }

        let body: serde_json::Value =
            response
                .json()
                .await
                .map_err(|source| NotifyError::InvalidResponse {
                    url: endpoint_url.to_string(),
                    source,
                })?;

        debug!(endpoint = %endpoint_url, body = %body, "notification response from endpoint");
        Ok(())
    }
}
