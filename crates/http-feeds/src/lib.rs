#![deny(missing_docs)]

//! # http-feeds
//!
//! Subscription client for HTTP feeds: a sequence of CloudEvents served as
//! JSON arrays behind a plain HTTP endpoint and consumed by repeated GET
//! requests carrying a `lastEventId` cursor and, for long-polling, a `timeout`
//! in milliseconds.
//!
//! [`FeedClient::fetch_events`] performs one poll. [`FeedClient::subscribe`]
//! runs the polling loop: it keeps the cursor, retries failed polls after the
//! poll delay, and stops when its [`StopSignal`] fires.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use http_feeds::{FeedClient, FeedConfig, StopSignal};
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), http_feeds::FeedError> {
//! let client = FeedClient::new(FeedConfig {
//!     poll_delay: Duration::from_secs(1),
//!     long_poll_timeout: Some(Duration::from_secs(5)),
//!     request_timeout: Some(Duration::from_secs(10)),
//!     ..Default::default()
//! })?;
//!
//! let (tx, mut rx) = mpsc::channel(1);
//! let stop = StopSignal::new();
//!
//! let subscription = {
//!     let stop = stop.clone();
//!     tokio::spawn(async move {
//!         client
//!             .subscribe("https://example.org/inventory", "", tx, stop)
//!             .await
//!     })
//! };
//!
//! while let Some(event) = rx.recv().await {
//!     println!("{} {:?}", event.id, event.data_field("sku"));
//!     if event.id == "last-one-i-need" {
//!         stop.stop();
//!     }
//! }
//!
//! subscription.await.expect("subscription task panicked")?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod stop;
pub mod subscription;
pub mod types;


pub use client::FeedClient;
pub use error::FeedError;
pub use stop::{StopCause, StopSignal};
pub use subscription::{NoopObserver, Subscription, SubscriptionObserver, SubscriptionState};
pub use types::{Cursor, Event, FeedConfig};
