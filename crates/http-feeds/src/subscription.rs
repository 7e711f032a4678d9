//! Subscription loop: turns one feed endpoint into an ordered event stream.
//!
//! A [`Subscription`] polls its endpoint on a timer, advances the caller's
//! [`Cursor`] and hands every event to an mpsc sink. Failed polls are logged,
//! reported to the [`SubscriptionObserver`] and retried after the poll delay;
//! only the [`StopSignal`] ends the loop with an error.

use std::{fmt, sync::Arc};

use tokio::{
    sync::mpsc,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};
use url::Url;

use crate::client::FeedClient;
use crate::error::FeedError;
use crate::stop::StopSignal;
use crate::types::{Cursor, Event};

/// Subscription state machine states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Waiting for the next timer tick.
    Idle,
    /// A poll request is in flight.
    Fetching,
    /// Handing a batch to the consumer.
    Delivering,
    /// The last poll failed; the timer was pushed back by a full poll delay.
    Backoff,
    /// Stopped. Terminal.
    Cancelled,
}

impl SubscriptionState {
    /// Returns `true` if the subscription will not poll again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Delivering => "delivering",
            Self::Backoff => "backoff",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Diagnostics hook for a running subscription.
///
/// All methods default to no-ops. Observers see what the loop swallows but
/// cannot change the retry behavior.
pub trait SubscriptionObserver: Send + Sync {
    /// Called on every state transition.
    fn on_state_change(&self, _from: SubscriptionState, _to: SubscriptionState) {}

    /// Called after a batch was fully delivered.
    fn on_batch(&self, _len: usize, _cursor: &Cursor) {}

    /// Called when a poll failed and will be retried.
    fn on_fetch_error(&self, _error: &FeedError, _cursor: &Cursor) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SubscriptionObserver for NoopObserver {}

/// How one poll cycle ended without a fetch error.
enum Cycle {
    /// The batch was delivered in full.
    Delivered(usize),
    /// The consumer dropped its receiver.
    SinkClosed,
    /// The stop signal fired mid-cycle.
    Stopped,
}

/// A subscription to a single feed endpoint.
///
/// Created by [`FeedClient::subscription`]. The cursor is owned by the caller
/// and passed to [`run`](Subscription::run), so it can be read after the loop
/// exits to resume later.
pub struct Subscription {
    client: FeedClient,
    endpoint: Url,
    observer: Arc<dyn SubscriptionObserver>,
    state: SubscriptionState,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("endpoint", &self.endpoint.as_str())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    pub(crate) fn new(client: FeedClient, endpoint: Url) -> Self {
        Self {
            client,
            endpoint,
            observer: Arc::new(NoopObserver),
            state: SubscriptionState::Idle,
        }
    }

    /// Attach a diagnostics observer.
    pub fn with_observer(mut self, observer: Arc<dyn SubscriptionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// The endpoint being polled.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Current state of the loop.
    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Run the subscription until `stop` fires or `events` is closed.
    ///
    /// The first poll is issued immediately. After that a poll happens on
    /// every tick of a `poll_delay` timer. The timer is pushed back by a full
    /// poll delay after a failed poll and, when not long-polling, after an
    /// empty batch. A populated batch keeps the timer on schedule, so a tick
    /// missed while fetching or delivering fires right away. When
    /// long-polling, a populated batch is followed by the next poll at once.
    ///
    /// `cursor` is moved onto each event before the event is sent.
    pub async fn run(
        &mut self,
        cursor: &mut Cursor,
        events: &mpsc::Sender<Event>,
        stop: &StopSignal,
    ) -> Result<(), FeedError> {
        let poll_delay = self.client.config().poll_delay;
        let long_polling = self.client.config().long_poll().is_some();

        info!(
            endpoint = %self.endpoint,
            cursor = %cursor,
            ?poll_delay,
            long_polling,
            "starting subscription"
        );

        let mut ticker = interval_at(Instant::now() + poll_delay, poll_delay);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !stop.is_stopped() {
            match self.cycle(cursor, events, stop).await {
                Ok(Cycle::Delivered(len)) => {
                    self.observer.on_batch(len, cursor);
                    if len > 0 {
                        debug!(len, cursor = %cursor, "delivered batch");
                        if long_polling {
                            // The server already held the request; poll again right away.
                            ticker.reset();
                            continue;
                        }
                    } else if !long_polling {
                        ticker.reset();
                    }
                }
                Ok(Cycle::SinkClosed) => {
                    info!(cursor = %cursor, "event receiver dropped, ending subscription");
                    self.transition(SubscriptionState::Cancelled);
                    return Ok(());
                }
                Ok(Cycle::Stopped) => break,
                Err(error) => {
                    warn!(error = %error, cursor = %cursor, "poll failed, retrying after poll delay");
                    self.transition(SubscriptionState::Backoff);
                    self.observer.on_fetch_error(&error, cursor);
                    ticker.reset();
                }
            }

            self.transition(SubscriptionState::Idle);

            tokio::select! {
                biased;
                _ = stop.stopped() => break,
                _ = ticker.tick() => {}
            }
        }

        self.transition(SubscriptionState::Cancelled);
        let outcome = stop.outcome();
        match &outcome {
            Ok(()) => info!(cursor = %cursor, "subscription stopped"),
            Err(error) => info!(error = %error, cursor = %cursor, "subscription cancelled"),
        }
        outcome
    }

    /// One poll: fetch a batch, then deliver it event by event.
    async fn cycle(
        &mut self,
        cursor: &mut Cursor,
        events: &mpsc::Sender<Event>,
        stop: &StopSignal,
    ) -> Result<Cycle, FeedError> {
        self.transition(SubscriptionState::Fetching);

        let batch = match self
            .client
            .fetch_events(&self.endpoint, cursor.as_str(), stop)
            .await
        {
            Ok(batch) => batch,
            Err(FeedError::Interrupted) => return Ok(Cycle::Stopped),
            Err(error) => return Err(error),
        };

        self.transition(SubscriptionState::Delivering);

        let len = batch.len();
        for event in batch {
            cursor.advance(&event);
            tokio::select! {
                biased;
                _ = stop.stopped() => return Ok(Cycle::Stopped),
                sent = events.send(event) => {
                    if sent.is_err() {
                        return Ok(Cycle::SinkClosed);
                    }
                }
            }
        }

        Ok(Cycle::Delivered(len))
    }

    fn transition(&mut self, to: SubscriptionState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        self.observer.on_state_change(from, to);
    }
}
