use thiserror::Error;

pub type NotifyResult<T> = Result<T, NotifyError>;

/// Failures delivering a notification. Every variant names the endpoint.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// No response at all (DNS, refused connection, TLS, timeout)
    #[error("Could not connect to endpoint {url}")]
    Connectivity {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Endpoint answered with a non-success status
    #[error("Could not connect to endpoint {url}. Status code: {status}")]
    Delivery { url: String, status: u16 },

    /// Endpoint answered successfully but the body was not JSON
    #[error("Endpoint {url} returned an unreadable response body")]
    InvalidResponse {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The API key cannot be sent as a header value
    #[error("API key for endpoint {url} is not a valid header value")]
    InvalidApiKey { url: String },

    #[error("Failed to serialize notification for endpoint {url}: {source}")]
    Serialize {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl NotifyError {
    /// The endpoint the failed delivery was aimed at
    pub fn url(&self) -> &str {
        match self {
            NotifyError::Connectivity { url, .. }
            | NotifyError::Delivery { url, .. }
            | NotifyError::InvalidResponse { url, .. }
            | NotifyError::InvalidApiKey { url }
            | NotifyError::Serialize { url, .. } => url,
        }
    }

    /// HTTP status for [`NotifyError::Delivery`]
    pub fn status(&self) -> Option<u16> {
        match self {
            NotifyError::Delivery { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_error_names_endpoint_and_status() {
        let err = NotifyError::Delivery {
            url: "https://example.com/api/trigger".into(),
            status: 500,
        };
        assert_eq!(
            err.to_string(),
            "Could not connect to endpoint https://example.com/api/trigger. Status code: 500"
        );
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.url(), "https://example.com/api/trigger");
    }
}
