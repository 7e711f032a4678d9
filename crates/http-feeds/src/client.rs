//! HTTP feed client: a single poll request against a feed endpoint.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_LENGTH};
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

use crate::error::FeedError;
use crate::stop::StopSignal;
use crate::subscription::Subscription;
use crate::types::{Cursor, Event, FeedConfig};

/// Query parameter carrying the cursor.
pub const LAST_EVENT_ID_PARAM: &str = "lastEventId";

/// Query parameter carrying the long-poll window in milliseconds.
pub const TIMEOUT_PARAM: &str = "timeout";

/// HTTP client for feed endpoints.
///
/// Cheap to clone; clones share one connection pool, so a single client can
/// drive any number of independent subscriptions.
#[derive(Debug, Clone)]
pub struct FeedClient {
    /// Client configuration.
    config: FeedConfig,
    /// Underlying HTTP client.
    client: reqwest::Client,
}

impl FeedClient {
    /// Create a new feed client with the given configuration.
    pub fn new(config: FeedConfig) -> Result<Self, FeedError> {
        Self::with_http_client(config, reqwest::Client::new())
    }

    /// Create a feed client on top of an existing `reqwest` client.
    pub fn with_http_client(config: FeedConfig, client: reqwest::Client) -> Result<Self, FeedError> {
        config.validate()?;
        Ok(Self { config, client })
    }

    /// The client configuration.
    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Parse a feed endpoint. Only `http` and `https` URLs are accepted.
    pub fn parse_endpoint(endpoint: &str) -> Result<Url, FeedError> {
        let invalid = |reason: String| FeedError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason,
        };
        let url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(invalid(format!("unsupported scheme {scheme:?}"))),
        }
    }

    /// Build the URL of one poll request.
    ///
    /// `lastEventId` is always present, empty when starting from the
    /// beginning. `timeout` is only present in long-poll mode. Both replace
    /// same-named parameters of the endpoint; other parameters are kept.
    pub fn poll_url(&self, endpoint: &Url, last_event_id: &str) -> Url {
        let mut url = endpoint.clone();
        let kept: Vec<(String, String)> = endpoint
            .query_pairs()
            .filter(|(key, _)| key != LAST_EVENT_ID_PARAM && key != TIMEOUT_PARAM)
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        {
            let mut query = url.query_pairs_mut();
            query.clear();
            query.extend_pairs(kept);
            query.append_pair(LAST_EVENT_ID_PARAM, last_event_id);
            if let Some(timeout) = self.config.long_poll() {
                query.append_pair(TIMEOUT_PARAM, &timeout.as_millis().to_string());
            }
        }

        url
    }

    /// Fetch one batch of events after `last_event_id`.
    ///
    /// Performs exactly one request. The request is bounded by the configured
    /// request timeout and aborted if `stop` fires.
    pub async fn fetch_events(
        &self,
        endpoint: &Url,
        last_event_id: &str,
        stop: &StopSignal,
    ) -> Result<Vec<Event>, FeedError> {
        let url = self.poll_url(endpoint, last_event_id);
        debug!(%url, "polling feed");

        tokio::select! {
            biased;
            _ = stop.stopped() => Err(FeedError::Interrupted),
            result = self.bounded_request(url) => result,
        }
    }

    /// Subscribe to `endpoint`, starting after `last_event_id`.
    ///
    /// Events are sent to `events` in feed order. Returns when `stop` fires
    /// (`Ok(())` for a cooperative stop, [`FeedError::Cancelled`] otherwise) or
    /// when the receiving half of `events` is dropped. Failed polls are
    /// retried after the poll delay and never returned.
    pub async fn subscribe(
        &self,
        endpoint: &str,
        last_event_id: &str,
        events: mpsc::Sender<Event>,
        stop: StopSignal,
    ) -> Result<(), FeedError> {
        let mut subscription = self.subscription(endpoint)?;
        let mut cursor = Cursor::new(last_event_id);
        subscription.run(&mut cursor, &events, &stop).await
    }

    /// Prepare a subscription to `endpoint` without starting it.
    pub fn subscription(&self, endpoint: &str) -> Result<Subscription, FeedError> {
        let endpoint = Self::parse_endpoint(endpoint)?;
        Ok(Subscription::new(self.clone(), endpoint))
    }

    async fn bounded_request(&self, url: Url) -> Result<Vec<Event>, FeedError> {
        match self.config.request_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.do_request(url))
                .await
                .map_err(|_| FeedError::RequestTimeout { timeout })?,
            None => self.do_request(url).await,
        }
    }

    /// Perform the GET request and decode the event array.
    async fn do_request(&self, url: Url) -> Result<Vec<Event>, FeedError> {
        let headers = self.build_headers();

        let resp = self.client.get(url).headers(headers).send().await?;

        let status = resp.status();

        if status != StatusCode::OK {
            let advertised = resp
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(0);
            let body = if advertised > 0 {
                Some(resp.text().await?)
            } else {
                None
            };
            return Err(FeedError::ServerError { status, body });
        }

        let bytes = resp.bytes().await?;
        let events: Option<Vec<Event>> = serde_json::from_slice(&bytes)?;
        Ok(events.unwrap_or_default())
    }

    /// Build common headers from config.
    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        // `FeedConfig::validate` rejected tokens that are not valid header values.
        if let Some(val) = self.config.authorization() {
            headers.insert(AUTHORIZATION, val);
        }

        headers
    }
}
