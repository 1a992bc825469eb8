//! Append-only, time-ordered store of every routed message.
//!
//! Insertion order is the ordering contract: ingestion timestamps are
//! clamped so the sequence never decreases, and equal timestamps keep
//! insertion order. Retention is an external concern; nothing here deletes.

use chrono::{DateTime, Utc};

use crate::models::Message;

#[derive(Default)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Server ingestion timestamp for the next append: wall clock, clamped
    /// so the log never runs backwards if the clock does.
    pub fn ingestion_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.messages.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        }
    }

    /// Append a message, clamping its timestamp so the log never runs
    /// backwards. Returns the message as stored.
    pub fn append(&mut self, mut message: Message) -> Message {
        if let Some(last) = self.messages.last() {
            if message.timestamp < last.timestamp {
                message.timestamp = last.timestamp;
            }
        }
        self.messages.push(message.clone());
        message
    }

    /// All messages between `a` and `b` in either direction, ascending by
    /// timestamp with insertion order breaking ties. Recomputed from the
    /// current log on every call.
    pub fn history(&self, a: &str, b: &str) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| (m.from == a && m.to == b) || (m.from == b && m.to == a))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn message(from: &str, to: &str, text: &str, timestamp: DateTime<Utc>) -> Message {
        Message {
            id: uuid::Uuid::new_v4().to_string(),
            from: from.to_string(),
            to: to.to_string(),
            text: text.to_string(),
            timestamp,
        }
    }

    #[test]
    fn history_filters_the_unordered_pair() {
        let mut log = MessageLog::new();
        let now = Utc::now();
        log.append(message("alice", "bob", "one", now));
        log.append(message("bob", "alice", "two", now));
        log.append(message("alice", "carol", "other", now));

        let history = log.history("alice", "bob");

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, "one");
        assert_eq!(history[1].text, "two");
        // Symmetric in its arguments.
        assert_eq!(log.history("bob", "alice"), history);
    }

    #[test]
    fn history_is_idempotent() {
        let mut log = MessageLog::new();
        log.append(message("alice", "bob", "one", Utc::now()));

        let first = log.history("alice", "bob");
        let second = log.history("alice", "bob");

        assert_eq!(first, second);
    }

    #[test]
    fn history_of_unknown_pair_is_empty() {
        let log = MessageLog::new();
        assert!(log.history("alice", "carol").is_empty());
    }

    #[test]
    fn ingestion_timestamp_never_runs_backwards() {
        let mut log = MessageLog::new();
        let future = Utc::now() + Duration::minutes(5);
        log.append(message("alice", "bob", "from the future", future));

        let ts = log.ingestion_timestamp();

        assert_eq!(ts, future);
    }

    #[test]
    fn append_clamps_a_backdated_timestamp() {
        let mut log = MessageLog::new();
        let now = Utc::now();
        log.append(message("alice", "bob", "first", now));

        let stored = log.append(message("alice", "bob", "late", now - Duration::minutes(5)));

        assert_eq!(stored.timestamp, now);
        let history = log.history("alice", "bob");
        assert_eq!(history[1].timestamp, now);
        assert!(history[0].timestamp <= history[1].timestamp);
    }

    #[test]
    fn ingestion_timestamp_tracks_the_clock_otherwise() {
        let mut log = MessageLog::new();
        let past = Utc::now() - Duration::minutes(5);
        log.append(message("alice", "bob", "old", past));

        assert!(log.ingestion_timestamp() > past);
    }
}
