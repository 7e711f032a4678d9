//! Error types for feed fetching and subscriptions.

use std::time::Duration;

use reqwest::StatusCode;

use crate::stop::StopCause;

/// Errors that can occur while fetching from or subscribing to an HTTP feed.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The endpoint is not a valid `http` or `https` URL.
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint {
        /// The endpoint as given by the caller.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The client configuration was rejected.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        message: String,
    },

    /// HTTP request failed at the network level.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The per-request timeout elapsed before the response was read.
    #[error("request timed out after {timeout:?}")]
    RequestTimeout {
        /// The configured per-request timeout.
        timeout: Duration,
    },

    /// The stop signal fired while a request was in flight.
    #[error("request interrupted by stop signal")]
    Interrupted,

    /// Server returned a status other than 200 OK.
    #[error("got error response from server. status: {status}{}", body_suffix(.body))]
    ServerError {
        /// HTTP status returned by the server.
        status: StatusCode,
        /// Response body, when the server advertised one.
        body: Option<String>,
    },

    /// The response body was not a JSON array of events.
    #[error("malformed response: {0}")]
    MalformedResponse(#[from] serde_json::Error),

    /// The subscription was stopped with a cause.
    #[error("subscription cancelled: {cause}")]
    Cancelled {
        /// Why the subscription was stopped.
        cause: StopCause,
    },
}

impl FeedError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns `true` for network-level failures of a single request:
    /// connection errors, request timeouts and interrupted requests.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::RequestTimeout { .. } | Self::Interrupted
        )
    }

    /// Returns `true` if a subscription treats this error as transient and
    /// retries after the poll delay.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http(_)
                | Self::RequestTimeout { .. }
                | Self::ServerError { .. }
                | Self::MalformedResponse(_)
        )
    }
}

fn body_suffix(body: &Option<String>) -> String {
    match body {
        Some(body) => format!(", body: {body}"),
        None => String::new(),
    }
}
