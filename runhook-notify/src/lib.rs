//! runhook-notify: push run notifications to job endpoints
//!
//! A delivery is one `POST {endpoint}/notification` carrying the JSON
//! payload, the environment API key and a fixed action header. There is
//! no retry; the caller sees every failure.

pub mod error;
pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

pub use error::{NotifyError, NotifyResult};
pub use http::{HttpNotifier, NotifierConfig};

/// Header carrying the environment API key
pub const API_KEY_HEADER: &str = "x-trigger-api-key";
/// Header naming the requested endpoint action
pub const ACTION_HEADER: &str = "x-trigger-action";
pub const DELIVER_EVENT_NOTIFICATION: &str = "DELIVER_EVENT_NOTIFICATION";

/// Sends a payload to an endpoint
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver<P>(&self, endpoint_url: &str, api_key: &str, payload: &P) -> NotifyResult<()>
    where
        P: Serialize + Sync + ?Sized;
}

#[async_trait]
impl<T: Notifier> Notifier for Arc<T> {
    async fn deliver<P>(&self, endpoint_url: &str, api_key: &str, payload: &P) -> NotifyResult<()>
    where
        P: Serialize + Sync + ?Sized,
    {
        (**self).deliver(endpoint_url, api_key, payload).await
    }
}

/// `{endpoint_url}/notification`, without doubling a trailing slash
pub fn notification_url(endpoint_url: &str) -> String {
    format!("{}/notification", endpoint_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_url() {
        assert_eq!(
            notification_url("https://acme.dev/api/trigger"),
            "https://acme.dev/api/trigger/notification"
        );
        assert_eq!(
            notification_url("https://acme.dev/api/trigger/"),
            "https://acme.dev/api/trigger/notification"
        );
    }
}
