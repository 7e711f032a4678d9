//! HTTP feed data types: client configuration, CloudEvent model and cursor.

use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use reqwest::header::HeaderValue;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::error::FeedError;

/// Default delay between two polls.
pub const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(5);

/// Default upper bound on one HTTP round trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Method assumed when an event does not carry one.
pub const DEFAULT_METHOD: &str = "PUT";

/// Content type assumed when an event does not carry one.
pub const DEFAULT_DATA_CONTENT_TYPE: &str = "application/json";

/// Configuration for a [`FeedClient`](crate::FeedClient).
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Delay between two polls, and the fallback delay after an empty
    /// short-poll cycle or a failed cycle.
    pub poll_delay: Duration,
    /// Long-poll window sent to the server as `timeout=<ms>`.
    ///
    /// `None` (or zero) disables long-polling.
    pub long_poll_timeout: Option<Duration>,
    /// Upper bound on one HTTP round trip, including the body read.
    ///
    /// Should be longer than `long_poll_timeout` when both are set, otherwise
    /// every long-poll request is aborted before the server answers.
    pub request_timeout: Option<Duration>,
    /// Optional bearer token sent via the `Authorization` header.
    pub bearer_token: Option<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            poll_delay: DEFAULT_POLL_DELAY,
            long_poll_timeout: None,
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            bearer_token: None,
        }
    }
}

impl FeedConfig {
    /// The long-poll window, if long-polling is enabled.
    pub fn long_poll(&self) -> Option<Duration> {
        self.long_poll_timeout.filter(|timeout| !timeout.is_zero())
    }

    /// The `Authorization` header value for the bearer token, if any.
    pub fn authorization(&self) -> Option<HeaderValue> {
        self.bearer_token
            .as_ref()
            .and_then(|token| HeaderValue::from_str(&format!("Bearer {token}")).ok())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), FeedError> {
        if self.poll_delay.is_zero() {
            return Err(FeedError::config("poll delay must be > 0"));
        }
        if self.bearer_token.is_some() && self.authorization().is_none() {
            return Err(FeedError::config(
                "bearer token contains characters not allowed in an HTTP header",
            ));
        }
        if self.request_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(FeedError::config(
                "request timeout must be > 0, use None to disable it",
            ));
        }
        if let (Some(request_timeout), Some(long_poll)) = (self.request_timeout, self.long_poll()) {
            if request_timeout <= long_poll {
                warn!(
                    ?request_timeout,
                    ?long_poll,
                    "request timeout does not exceed the long-poll timeout; long-poll requests will time out"
                );
            }
        }
        Ok(())
    }
}

/// A CloudEvent received from an HTTP feed.
///
/// See <https://github.com/cloudevents/spec>. Every field is optional on the
/// wire so that minimal items like `{"id":"1"}` decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    /// CloudEvents specification version.
    #[serde(rename = "specversion", deserialize_with = "null_as_empty")]
    pub spec_version: String,
    /// Unique id of the event within the feed; the next cursor.
    #[serde(deserialize_with = "null_as_empty")]
    pub id: String,
    /// Type of the event.
    #[serde(rename = "type", deserialize_with = "null_as_empty")]
    pub event_type: String,
    /// Source system that created the event, usually a URI.
    #[serde(deserialize_with = "null_as_empty")]
    pub source: String,
    /// When the event was added to the feed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    /// Key of the business object the event is about.
    #[serde(deserialize_with = "null_as_empty")]
    pub subject: String,
    /// HTTP-equivalent method the event performs on the subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Content type of `data`.
    #[serde(rename = "datacontenttype", skip_serializing_if = "Option::is_none")]
    pub data_content_type: Option<String>,
    /// Event payload, passed through unmodified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
}

// `null` metadata decodes like a missing key.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Event {
    /// The method, defaulting to `PUT`.
    pub fn effective_method(&self) -> &str {
        self.method.as_deref().unwrap_or(DEFAULT_METHOD)
    }

    /// The content type of `data`, defaulting to `application/json`.
    pub fn effective_data_content_type(&self) -> &str {
        self.data_content_type
            .as_deref()
            .unwrap_or(DEFAULT_DATA_CONTENT_TYPE)
    }

    /// Returns `true` if the event deletes its subject.
    pub fn is_delete(&self) -> bool {
        self.effective_method().eq_ignore_ascii_case("DELETE")
    }

    /// Look up a single payload field.
    pub fn data_field(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.as_ref().and_then(|data| data.get(key))
    }
}

/// Resumption point of a subscription: the id of the last event handed to
/// the consumer. Empty means "from the beginning of the feed".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor(String);

impl Cursor {
    /// Create a cursor positioned after `last_event_id`.
    pub fn new(last_event_id: impl Into<String>) -> Self {
        Self(last_event_id.into())
    }

    /// The `lastEventId` value to send.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if no event has been consumed yet.
    pub fn is_start(&self) -> bool {
        self.0.is_empty()
    }

    /// Move the cursor onto `event`.
    pub(crate) fn advance(&mut self, event: &Event) {
        self.0.clone_from(&event.id);
    }

    /// Consume the cursor, returning the last event id.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Cursor {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Cursor {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
