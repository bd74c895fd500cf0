//! Live fan-out of newly appended messages.
//!
//! All channels share one bounded broadcast stream. Each subscription filters
//! it down to a single channel and coalesces what arrives into time-windowed
//! batches: a window opens with the first matching message and is flushed `W`
//! later, so a burst of posts reaches the subscriber as one notification.
//!
//! Publishing never waits on subscribers. A subscriber that falls more than the
//! buffer capacity behind loses the oldest messages it has not read yet; the
//! loss is logged and counted, never reported to the poster.

use crate::message::{ChannelId, Message};
use futures_util::stream::BoxStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};

/// Default batching window.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(300);

/// Default broadcast buffer capacity.
pub const DEFAULT_CAPACITY: usize = 1024;

/// A live subscription: non-empty batches of one channel's messages, in append order.
pub type BatchStream = BoxStream<'static, Vec<Arc<Message>>>;

/// Broadcaster statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveStats {
    /// Number of live subscriptions.
    pub subscribers: usize,
    /// Messages skipped by lagging subscribers since start.
    pub dropped: u64,
}

/// Multicast stream of new messages.
#[derive(Debug)]
pub struct LiveBroadcaster {
    sender: broadcast::Sender<Arc<Message>>,
    window: Duration,
    capacity: usize,
    dropped: Arc<AtomicU64>,
}

impl LiveBroadcaster {
    /// Create a broadcaster with the given batching window and buffer capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(window: Duration, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        info!(window_ms = window.as_millis() as u64, capacity, "Creating live broadcaster");
        Self {
            sender,
            window,
            capacity,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get the batching window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Get the buffer capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Publish a message to every live subscription.
    ///
    /// Returns the number of subscriptions that will see it.
    pub fn publish(&self, message: Arc<Message>) -> usize {
        let channel = message.channel_id.clone();
        let count = self.sender.send(message).unwrap_or_default();
        trace!(channel = %channel, receivers = count, "Published message");
        count
    }

    /// Subscribe to one channel's messages.
    ///
    /// The subscription starts receiving immediately, even before the stream
    /// is first polled. Dropping the stream cancels it.
    #[must_use]
    pub fn subscribe(&self, channel_id: &str) -> BatchStream {
        let mut rx = self.sender.subscribe();
        let window = self.window;
        let dropped = Arc::clone(&self.dropped);
        let channel: ChannelId = channel_id.to_string();

        debug!(channel = %channel, subscribers = self.sender.receiver_count(), "Live subscription opened");

        Box::pin(async_stream::stream! {
            let mut batch: Vec<Arc<Message>> = Vec::new();
            let mut deadline: Option<Instant> = None;

            loop {
                let received = match deadline {
                    Some(at) => tokio::select! {
                        biased;
                        () = time::sleep_until(at) => None,
                        recv = rx.recv() => Some(recv),
                    },
                    None => Some(rx.recv().await),
                };

                match received {
                    None => {
                        deadline = None;
                        trace!(channel = %channel, size = batch.len(), "Window closed");
                        yield std::mem::take(&mut batch);
                    }
                    Some(Ok(message)) => {
                        if message.channel_id != channel {
                            continue;
                        }
                        if deadline.is_none() {
                            deadline = Some(Instant::now() + window);
                        }
                        batch.push(message);
                    }
                    Some(Err(RecvError::Lagged(skipped))) => {
                        dropped.fetch_add(skipped, Ordering::Relaxed);
                        warn!(channel = %channel, skipped, "Live subscriber lagging, messages dropped");
                    }
                    Some(Err(RecvError::Closed)) => {
                        if !batch.is_empty() {
                            yield std::mem::take(&mut batch);
                        }
                        debug!(channel = %channel, "Live stream closed");
                        break;
                    }
                }
            }
        })
    }

    /// Get broadcaster statistics.
    #[must_use]
    pub fn stats(&self) -> LiveStats {
        LiveStats {
            subscribers: self.sender.receiver_count(),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for LiveBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use futures_util::StreamExt;
    use tokio::sync::mpsc;

    fn message(channel: &str, sequence: u64, body: &str) -> Arc<Message> {
        Arc::new(Message::new(channel, sequence, "alice", body, Utc::now()))
    }

    fn bodies(batch: &[Arc<Message>]) -> Vec<&str> {
        batch.iter().map(|m| m.body.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_delivered_as_one_batch() {
        let broadcaster = LiveBroadcaster::default();
        let mut stream = broadcaster.subscribe("general");

        broadcaster.publish(message("general", 1, "message1"));
        broadcaster.publish(message("general", 2, "message2"));

        let started = Instant::now();
        let batch = stream.next().await.unwrap();
        assert_eq!(bodies(&batch), vec!["message1", "message2"]);
        assert!(started.elapsed() >= DEFAULT_WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_posts_are_separate_batches() {
        let broadcaster = LiveBroadcaster::default();
        let mut stream = broadcaster.subscribe("general");

        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(batch) = stream.next().await {
                if tx.send(batch).is_err() {
                    break;
                }
            }
        });

        broadcaster.publish(message("general", 1, "message1"));
        time::sleep(DEFAULT_WINDOW * 2).await;
        broadcaster.publish(message("general", 2, "message2"));

        assert_eq!(bodies(&rx.recv().await.unwrap()), vec!["message1"]);
        assert_eq!(bodies(&rx.recv().await.unwrap()), vec!["message2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_only_see_their_channel() {
        let broadcaster = LiveBroadcaster::default();
        let mut general = broadcaster.subscribe("general");
        let mut random = broadcaster.subscribe("random");

        broadcaster.publish(message("general", 1, "g1"));
        broadcaster.publish(message("random", 1, "r1"));
        broadcaster.publish(message("general", 2, "g2"));

        assert_eq!(bodies(&general.next().await.unwrap()), vec!["g1", "g2"]);
        assert_eq!(bodies(&random.next().await.unwrap()), vec!["r1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_subscriber_gets_the_full_stream() {
        let broadcaster = LiveBroadcaster::default();
        let mut first = broadcaster.subscribe("general");
        let mut second = broadcaster.subscribe("general");

        assert_eq!(broadcaster.publish(message("general", 1, "hello")), 2);

        assert_eq!(bodies(&first.next().await.unwrap()), vec!["hello"]);
        assert_eq!(bodies(&second.next().await.unwrap()), vec!["hello"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_windows_are_not_emitted() {
        let broadcaster = LiveBroadcaster::default();
        let mut stream = broadcaster.subscribe("general");

        broadcaster.publish(message("random", 1, "elsewhere"));

        let next = time::timeout(Duration::from_secs(5), stream.next()).await;
        assert!(next.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lagging_subscriber_drops_oldest() {
        let broadcaster = LiveBroadcaster::new(DEFAULT_WINDOW, 2);
        let mut stream = broadcaster.subscribe("general");

        for i in 1..=5 {
            broadcaster.publish(message("general", i, &format!("message{i}")));
        }

        let batch = stream.next().await.unwrap();
        assert_eq!(bodies(&batch), vec!["message4", "message5"]);
        assert_eq!(broadcaster.stats().dropped, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closing_broadcaster_flushes_and_ends_stream() {
        let broadcaster = LiveBroadcaster::default();
        let mut stream = broadcaster.subscribe("general");

        broadcaster.publish(message("general", 1, "last words"));
        drop(broadcaster);

        assert_eq!(bodies(&stream.next().await.unwrap()), vec!["last words"]);
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_dropping_stream_cancels_subscription() {
        let broadcaster = LiveBroadcaster::default();
        let first = broadcaster.subscribe("general");
        let _second = broadcaster.subscribe("general");
        assert_eq!(broadcaster.stats().subscribers, 2);

        drop(first);
        assert_eq!(broadcaster.stats().subscribers, 1);
        assert_eq!(broadcaster.publish(message("general", 1, "still here")), 1);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let broadcaster = LiveBroadcaster::default();
        assert_eq!(broadcaster.publish(message("general", 1, "nobody")), 0);
    }
}
