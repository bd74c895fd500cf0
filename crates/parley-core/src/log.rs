//! Append-only message log for a single channel.
//!
//! Appends take the write lock for the whole allocate-and-push step, so
//! sequence numbers always match list position. Reads share the read lock and
//! never observe a half-applied append.

use crate::error::ChatError;
use crate::message::{ChannelId, Message, MessageId};
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

/// Ordered message log for one channel.
#[derive(Debug)]
pub struct ChannelLog {
    channel_id: ChannelId,
    messages: RwLock<Vec<Arc<Message>>>,
}

impl ChannelLog {
    /// Create an empty log.
    #[must_use]
    pub fn new(channel_id: impl Into<ChannelId>) -> Self {
        Self {
            channel_id: channel_id.into(),
            messages: RwLock::new(Vec::new()),
        }
    }

    /// Get the channel id.
    #[must_use]
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Append a message and return it with its assigned sequence number.
    pub fn append(
        &self,
        author: impl Into<String>,
        body: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Arc<Message> {
        self.append_with(author, body, timestamp, |_| {})
    }

    /// Append a message and hand it to `on_append` before the write lock is
    /// released.
    ///
    /// Callbacks therefore observe messages in sequence order, even with
    /// concurrent appenders. `on_append` must not block or touch this log.
    pub fn append_with<F>(
        &self,
        author: impl Into<String>,
        body: impl Into<String>,
        timestamp: DateTime<Utc>,
        on_append: F,
    ) -> Arc<Message>
    where
        F: FnOnce(&Arc<Message>),
    {
        let mut messages = self.write();
        let sequence = messages.last().map_or(1, |m| m.sequence_number + 1);
        let message = Arc::new(Message::new(
            self.channel_id.clone(),
            sequence,
            author,
            body,
            timestamp,
        ));
        messages.push(Arc::clone(&message));
        on_append(&message);
        drop(messages);

        trace!(channel = %self.channel_id, sequence, "Appended message");
        message
    }

    /// Fetch up to `max_count` of the latest messages, oldest first.
    ///
    /// Only messages strictly after `after` are returned, unless more than
    /// `max_count` of them exist. In that case the newest `max_count` are
    /// returned and the gap between the anchor and the page is skipped. An
    /// unknown anchor is treated as no anchor.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::InvalidArgument`] if `max_count` is zero.
    pub fn find_latest(
        &self,
        max_count: usize,
        after: Option<&MessageId>,
    ) -> Result<Vec<Arc<Message>>, ChatError> {
        check_page_size(max_count)?;

        let messages = self.read();
        let len = messages.len();
        let start = after
            .and_then(|id| messages.iter().rposition(|m| &m.message_id == id))
            .map_or(0, |index| index + 1);

        let start = if len - start > max_count {
            len - max_count
        } else {
            start
        };

        Ok(messages[start..].to_vec())
    }

    /// Get the newest message, if any.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<Message>> {
        self.read().last().cloned()
    }

    /// Get the number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Check if no message has been appended yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // Nothing after the push can leave the vector half-written, so a poisoned
    // lock still guards a consistent vector.
    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<Message>>> {
        self.messages.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<Message>>> {
        self.messages.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Reject page sizes below one.
pub(crate) fn check_page_size(max_count: usize) -> Result<(), ChatError> {
    if max_count == 0 {
        return Err(ChatError::InvalidArgument(
            "Can't fetch less than 1 message".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeSet;
    use std::thread;

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_707_380_158_462).unwrap()
    }

    fn bodies(messages: &[Arc<Message>]) -> Vec<&str> {
        messages.iter().map(|m| m.body.as_str()).collect()
    }

    fn seeded(count: usize) -> (ChannelLog, Vec<Arc<Message>>) {
        let log = ChannelLog::new("channel1");
        let appended = (1..=count)
            .map(|i| log.append(format!("user{i}"), format!("message{i}"), t0()))
            .collect();
        (log, appended)
    }

    #[test]
    fn test_empty_log() {
        let log = ChannelLog::new("channel1");
        assert!(log.is_empty());
        assert!(log.latest().is_none());
        assert!(log.find_latest(10, None).unwrap().is_empty());
    }

    #[test]
    fn test_append_assigns_consecutive_sequence_numbers() {
        let (log, appended) = seeded(3);

        let sequences: Vec<u64> = appended.iter().map(|m| m.sequence_number).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(log.len(), 3);
        assert_eq!(log.latest().unwrap().body, "message3");
        assert_eq!(appended[0].channel_id, "channel1");
        assert_eq!(appended[0].timestamp, t0());
    }

    #[test]
    fn test_find_latest_returns_everything_when_page_is_large() {
        let (log, appended) = seeded(2);
        assert_eq!(log.find_latest(10, None).unwrap(), appended);
    }

    #[test]
    fn test_find_latest_limits_to_newest() {
        let (log, _) = seeded(6);
        let page = log.find_latest(5, None).unwrap();
        assert_eq!(
            bodies(&page),
            vec!["message2", "message3", "message4", "message5", "message6"]
        );
    }

    #[test]
    fn test_find_latest_after_anchor() {
        let (log, appended) = seeded(3);
        let page = log
            .find_latest(10, Some(&appended[0].message_id))
            .unwrap();
        assert_eq!(bodies(&page), vec!["message2", "message3"]);
    }

    #[test]
    fn test_find_latest_after_newest_is_empty() {
        let (log, appended) = seeded(3);
        let page = log.find_latest(10, Some(&appended[2].message_id)).unwrap();
        assert!(page.is_empty());
    }

    #[test]
    fn test_find_latest_ignores_anchor_when_backlog_exceeds_page() {
        let (log, appended) = seeded(3);
        // Two unread messages but room for one: the newest wins, message2 is skipped.
        let page = log.find_latest(1, Some(&appended[0].message_id)).unwrap();
        assert_eq!(bodies(&page), vec!["message3"]);
    }

    #[test]
    fn test_find_latest_unknown_anchor() {
        let (log, _) = seeded(3);
        let unknown = MessageId::from("does-not-exist");
        let page = log.find_latest(2, Some(&unknown)).unwrap();
        assert_eq!(bodies(&page), vec!["message2", "message3"]);
    }

    #[test]
    fn test_find_latest_rejects_zero() {
        let (log, _) = seeded(1);
        assert!(matches!(
            log.find_latest(0, None),
            Err(ChatError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_append_with_observes_sequence_order() {
        let log = Arc::new(ChannelLog::new("busy"));
        let observed = Arc::new(std::sync::Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let log = Arc::clone(&log);
                let observed = Arc::clone(&observed);
                thread::spawn(move || {
                    for i in 0..500 {
                        log.append_with(format!("writer{t}"), format!("{i}"), t0(), |m| {
                            observed.lock().unwrap().push(m.sequence_number);
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let observed = observed.lock().unwrap();
        assert_eq!(*observed, (1..=2000).collect::<Vec<u64>>());
    }

    #[test]
    fn test_concurrent_appends_have_no_gaps() {
        let log = Arc::new(ChannelLog::new("busy"));
        let threads = 8;
        let per_thread = 250;

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    (0..per_thread)
                        .map(|i| log.append(format!("writer{t}"), format!("{i}"), t0()).sequence_number)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = BTreeSet::new();
        for handle in handles {
            for sequence in handle.join().unwrap() {
                assert!(seen.insert(sequence), "sequence {sequence} issued twice");
            }
        }

        let total = (threads * per_thread) as u64;
        assert_eq!(seen, (1..=total).collect::<BTreeSet<_>>());

        let all = log.find_latest(threads * per_thread, None).unwrap();
        let in_order: Vec<u64> = all.iter().map(|m| m.sequence_number).collect();
        assert_eq!(in_order, (1..=total).collect::<Vec<_>>());
    }
}
