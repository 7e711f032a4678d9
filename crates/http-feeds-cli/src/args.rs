use std::time::Duration;

use clap::Parser;
use http_feeds::types::DEFAULT_POLL_DELAY;
use http_feeds::FeedConfig;

/// Subscribe to an HTTP feed and print every event it delivers.
#[derive(Debug, Parser)]
#[command(name = "http-feeds", version, about)]
pub struct Arguments {
    /// HTTP feed endpoint to subscribe to
    pub endpoint: String,

    /// Poll delay in milliseconds between each poll to the HTTP endpoint (0 uses the default)
    #[arg(long, value_name = "MS", default_value_t = 5000)]
    pub poll_delay: u64,

    /// Long-poll timeout in milliseconds until the server must send a response (0 disables long-polling)
    #[arg(long, value_name = "MS", default_value_t = 0)]
    pub timeout: u64,

    /// Upper bound in milliseconds on a single request (0 disables it)
    #[arg(long, value_name = "MS", default_value_t = 30_000)]
    pub request_timeout: u64,

    /// Last event ID received by the client; empty starts from the beginning
    #[arg(long, value_name = "ID", default_value = "")]
    pub last_event_id: String,

    /// Print only this key of each event's data instead of the whole event
    #[arg(long, value_name = "KEY")]
    pub field: Option<String>,

    /// Bearer token sent with every request
    #[arg(long, env = "HTTP_FEEDS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Arguments {
    /// Map the flags onto a client configuration.
    pub fn feed_config(&self) -> FeedConfig {
        let millis = |ms: u64| (ms > 0).then(|| Duration::from_millis(ms));
        FeedConfig {
            poll_delay: millis(self.poll_delay).unwrap_or(DEFAULT_POLL_DELAY),
            long_poll_timeout: millis(self.timeout),
            request_timeout: millis(self.request_timeout),
            bearer_token: self.token.clone(),
        }
    }
}
