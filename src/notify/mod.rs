//! Outbound notification channels and send pacing.
//!
//! Channels report what the remote side did (delivered, throttled,
//! rejected); the [`Notifier`] wraps a channel with a minimum send
//! interval and a single retry after a throttle response.

pub mod telegram;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Channel contract
// ---------------------------------------------------------------------------

/// Outcome of one delivery attempt, as reported by the remote service.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryStatus {
    Delivered,
    /// Rate limited. `retry_after` is the wait the service asked for, if
    /// it sent one.
    Throttled { retry_after: Option<Duration> },
    /// Any other non-success response.
    Rejected { status: u16 },
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unparseable response: {0}")]
    Parse(String),
}

/// A destination that can accept one text message per call.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn post(&self, text: &str) -> Result<DeliveryStatus, ChannelError>;

    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// Paced notifier
// ---------------------------------------------------------------------------

/// Serializes sends through one channel, enforcing a minimum gap between
/// consecutive deliveries and retrying once on a throttle response.
pub struct Notifier {
    channel: Arc<dyn NotificationChannel>,
    min_interval: Duration,
    default_retry_wait: Duration,
    last_send: Mutex<Option<Instant>>,
}

impl Notifier {
    pub fn new(
        channel: Arc<dyn NotificationChannel>,
        min_interval: Duration,
        default_retry_wait: Duration,
    ) -> Self {
        Notifier {
            channel,
            min_interval,
            default_retry_wait,
            last_send: Mutex::new(None),
        }
    }

    /// Deliver one message, waiting out the pacing window first.
    ///
    /// Returns `true` only when the channel confirmed delivery. The pacing
    /// stamp advances only on success, so a failed send does not delay
    /// the next attempt. Concurrent callers queue on the internal lock,
    /// which keeps the gap guarantee across tasks.
    pub async fn send(&self, text: &str) -> bool {
        let mut last_send = self.last_send.lock().await;

        if let Some(last) = *last_send {
            let since = last.elapsed();
            if since < self.min_interval {
                let wait = self.min_interval - since;
                debug!(wait_ms = wait.as_millis() as u64, "Pacing outbound message");
                sleep(wait).await;
            }
        }

        match self.attempt(text).await {
            Some(DeliveryStatus::Delivered) => {
                *last_send = Some(Instant::now());
                true
            }
            _ => false,
        }
    }

    async fn attempt(&self, text: &str) -> Option<DeliveryStatus> {
        let status = match self.channel.post(text).await {
            Ok(status) => status,
            Err(e) => {
                warn!(channel = self.channel.name(), error = %e, "Send failed");
                return None;
            }
        };

        let retry_after = match status {
            DeliveryStatus::Delivered => return Some(DeliveryStatus::Delivered),
            DeliveryStatus::Throttled { retry_after } => retry_after,
            DeliveryStatus::Rejected { status } => {
                warn!(channel = self.channel.name(), status, "Message rejected");
                return Some(DeliveryStatus::Rejected { status });
            }
        };

        // One retry after the wait the service asked for.
        let wait = retry_after.unwrap_or(self.default_retry_wait);
        warn!(
            channel = self.channel.name(),
            wait_secs = wait.as_secs(),
            "Throttled, retrying once"
        );
        sleep(wait).await;

        match self.channel.post(text).await {
            Ok(DeliveryStatus::Delivered) => Some(DeliveryStatus::Delivered),
            Ok(status) => {
                warn!(channel = self.channel.name(), ?status, "Retry not delivered");
                Some(status)
            }
            Err(e) => {
                warn!(channel = self.channel.name(), error = %e, "Retry failed");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// Channel that plays back a script of responses and records when
    /// each post arrived.
    struct ScriptedChannel {
        script: StdMutex<Vec<Result<DeliveryStatus, ChannelError>>>,
        posts: StdMutex<Vec<(Instant, String)>>,
    }

    impl ScriptedChannel {
        fn new(script: Vec<Result<DeliveryStatus, ChannelError>>) -> Arc<Self> {
            Arc::new(ScriptedChannel {
                script: StdMutex::new(script),
                posts: StdMutex::new(Vec::new()),
            })
        }

        fn post_count(&self) -> usize {
            self.posts.lock().unwrap().len()
        }

        fn post_times(&self) -> Vec<Instant> {
            self.posts.lock().unwrap().iter().map(|(t, _)| *t).collect()
        }
    }

    #[async_trait]
    impl NotificationChannel for ScriptedChannel {
        async fn post(&self, text: &str) -> Result<DeliveryStatus, ChannelError> {
            self.posts
                .lock()
                .unwrap()
                .push((Instant::now(), text.to_string()));
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Ok(DeliveryStatus::Delivered)
            } else {
                script.remove(0)
            }
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn delivered() -> Result<DeliveryStatus, ChannelError> {
        Ok(DeliveryStatus::Delivered)
    }

    fn throttled(retry_after: Option<Duration>) -> Result<DeliveryStatus, ChannelError> {
        Ok(DeliveryStatus::Throttled { retry_after })
    }

    #[tokio::test]
    async fn test_send_delivers_and_reports_true() {
        let channel = ScriptedChannel::new(vec![delivered()]);
        let notifier = Notifier::new(channel.clone(), Duration::ZERO, Duration::ZERO);
        assert!(notifier.send("hello").await);
        assert_eq!(channel.post_count(), 1);
    }

    #[tokio::test]
    async fn test_throttle_then_delivered_retries_once() {
        let channel = ScriptedChannel::new(vec![
            throttled(Some(Duration::from_millis(20))),
            delivered(),
        ]);
        let notifier =
            Notifier::new(channel.clone(), Duration::ZERO, Duration::from_millis(5));

        let start = Instant::now();
        assert!(notifier.send("hello").await);
        assert_eq!(channel.post_count(), 2);
        // Waited out the service-provided retry interval.
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_double_throttle_gives_up() {
        let channel = ScriptedChannel::new(vec![
            throttled(None),
            throttled(None),
        ]);
        let notifier =
            Notifier::new(channel.clone(), Duration::ZERO, Duration::from_millis(5));
        assert!(!notifier.send("hello").await);
        assert_eq!(channel.post_count(), 2);
    }

    #[tokio::test]
    async fn test_rejected_is_not_retried() {
        let channel = ScriptedChannel::new(vec![Ok(DeliveryStatus::Rejected { status: 400 })]);
        let notifier = Notifier::new(channel.clone(), Duration::ZERO, Duration::ZERO);
        assert!(!notifier.send("hello").await);
        assert_eq!(channel.post_count(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_reports_false() {
        let channel = ScriptedChannel::new(vec![Err(ChannelError::Parse(
            "bad payload".to_string(),
        ))]);
        let notifier = Notifier::new(channel.clone(), Duration::ZERO, Duration::ZERO);
        assert!(!notifier.send("hello").await);
    }

    #[tokio::test]
    async fn test_minimum_gap_between_deliveries() {
        let channel = ScriptedChannel::new(Vec::new());
        let notifier = Notifier::new(channel.clone(), Duration::from_millis(40), Duration::ZERO);

        assert!(notifier.send("first").await);
        assert!(notifier.send("second").await);
        assert!(notifier.send("third").await);

        let times = channel.post_times();
        assert_eq!(times.len(), 3);
        assert!(times[1] - times[0] >= Duration::from_millis(40));
        assert!(times[2] - times[1] >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_failed_send_does_not_advance_pacing() {
        let channel = ScriptedChannel::new(vec![
            Ok(DeliveryStatus::Rejected { status: 500 }),
            delivered(),
        ]);
        let notifier =
            Notifier::new(channel.clone(), Duration::from_millis(200), Duration::ZERO);

        let start = Instant::now();
        assert!(!notifier.send("first").await);
        // No delivery happened, so the next send is not paced.
        assert!(notifier.send("second").await);
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_concurrent_sends_keep_gap() {
        let channel = ScriptedChannel::new(Vec::new());
        let notifier = Arc::new(Notifier::new(
            channel.clone(),
            Duration::from_millis(30),
            Duration::ZERO,
        ));

        let mut handles = Vec::new();
        for i in 0..3 {
            let notifier = notifier.clone();
            handles.push(tokio::spawn(async move {
                notifier.send(&format!("msg {i}")).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let mut times = channel.post_times();
        times.sort();
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(30));
        }
    }
}
