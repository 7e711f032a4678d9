//! One-shot stop signal governing a subscription.
//!
//! A [`StopSignal`] wraps a [`CancellationToken`] with an optional deadline and
//! an optional cause. Every clone observes the same stop, so one clone can be
//! handed to the subscription while another is kept by whoever decides when
//! to stop it.

use std::{
    fmt,
    sync::{Arc, OnceLock},
    time::Duration,
};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a subscription was stopped with an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopCause {
    /// The stop signal's deadline elapsed.
    DeadlineExceeded,
    /// The owner stopped the subscription because of a failure elsewhere.
    Failed(String),
}

impl fmt::Display for StopCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeadlineExceeded => f.write_str("deadline exceeded"),
            Self::Failed(reason) => write!(f, "stopped: {reason}"),
        }
    }
}

/// Clone-able, one-shot cancellation signal with an optional deadline.
#[derive(Debug, Clone)]
pub struct StopSignal {
    token: CancellationToken,
    deadline: Option<Instant>,
    cause: Arc<OnceLock<StopCause>>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    /// Create a signal that only fires when stopped explicitly.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            cause: Arc::new(OnceLock::new()),
        }
    }

    /// Create a signal that fires on its own once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Create a signal that fires on its own at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..Self::new()
        }
    }

    /// Wrap an existing token, e.g. one shared with other tasks of the process.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            ..Self::new()
        }
    }

    /// The deadline, if one was set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Stop cooperatively. A subscription stopped this way returns `Ok(())`.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Stop with a failure reason. The subscription returns
    /// [`FeedError::Cancelled`](crate::FeedError::Cancelled) carrying it.
    ///
    /// Only the first cause is kept.
    pub fn stop_with_cause(&self, reason: impl Into<String>) {
        self.fire(StopCause::Failed(reason.into()));
    }

    /// Returns `true` once the signal has fired, including a passed deadline.
    pub fn is_stopped(&self) -> bool {
        if self.token.is_cancelled() {
            return true;
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.fire(StopCause::DeadlineExceeded);
                true
            }
            _ => false,
        }
    }

    /// Resolves when the signal fires.
    pub async fn stopped(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {
                        self.fire(StopCause::DeadlineExceeded);
                    }
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// The cause recorded when the signal fired, if any.
    pub fn cause(&self) -> Option<&StopCause> {
        self.cause.get()
    }

    /// Terminal result for a subscription ended by this signal.
    pub fn outcome(&self) -> Result<(), crate::FeedError> {
        match self.cause() {
            Some(cause) => Err(crate::FeedError::Cancelled {
                cause: cause.clone(),
            }),
            None => Ok(()),
        }
    }

    fn fire(&self, cause: StopCause) {
        // A cooperative stop that already happened wins over a later cause.
        if !self.token.is_cancelled() {
            let _ = self.cause.set(cause);
        }
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooperative_stop_has_no_cause() {
        let stop = StopSignal::new();
        assert!(!stop.is_stopped());

        stop.stop();
        assert!(stop.is_stopped());
        assert!(stop.cause().is_none());
        assert!(stop.outcome().is_ok());
    }

    #[test]
    fn test_stop_with_cause_is_shared_between_clones() {
        let stop = StopSignal::new();
        let other = stop.clone();

        other.stop_with_cause("upstream failed");
        assert!(stop.is_stopped());
        assert_eq!(
            stop.cause(),
            Some(&StopCause::Failed("upstream failed".to_string()))
        );
        assert!(matches!(
            stop.outcome(),
            Err(crate::FeedError::Cancelled { .. })
        ));
    }

    #[test]
    fn test_first_stop_wins() {
        let stop = StopSignal::new();
        stop.stop();
        stop.stop_with_cause("too late");
        assert!(stop.cause().is_none());

        let stop = StopSignal::new();
        stop.stop_with_cause("first");
        stop.stop_with_cause("second");
        assert_eq!(stop.cause(), Some(&StopCause::Failed("first".to_string())));
    }

    #[tokio::test]
    async fn test_deadline_fires_with_cause() {
        let stop = StopSignal::with_timeout(Duration::from_millis(20));
        assert!(!stop.is_stopped());

        tokio::time::timeout(Duration::from_secs(1), stop.stopped())
            .await
            .expect("deadline should fire");

        assert!(stop.is_stopped());
        assert_eq!(stop.cause(), Some(&StopCause::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_from_token_observes_external_cancel() {
        let token = CancellationToken::new();
        let stop = StopSignal::from_token(token.child_token());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), stop.stopped())
            .await
            .expect("parent cancel should propagate");
        assert!(stop.outcome().is_ok());
    }
}
