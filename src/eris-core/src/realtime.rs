//! Per-session event fan-out.
//!
//! Each live debate gets a broadcast channel for streaming subscribers and a
//! short backlog of sequenced events so polling clients can catch up with
//! `since`. Topics of finished debates are kept for a retention window and
//! then dropped by [`EventHub::sweep`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::orchestrator::{DebateCallback, DebateEvent};

/// Events kept per session for polling clients.
pub const BACKLOG_LEN: usize = 256;

const CHANNEL_CAPACITY: usize = 256;

/// Something a client watching a debate should hear about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HubEvent {
    Debate(DebateEvent),
    /// The AI started writing its speech for a turn.
    AiGenerating { turn_index: usize },
    /// Generating the AI speech failed; the turn is still open.
    AiFailed { turn_index: usize, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencedEvent {
    /// Starts at 1 and increases by one per published event.
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub event: HubEvent,
}

struct Topic {
    sender: broadcast::Sender<SequencedEvent>,
    backlog: VecDeque<SequencedEvent>,
    last_seq: u64,
    ended_at: Option<DateTime<Utc>>,
}

impl Topic {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            backlog: VecDeque::with_capacity(BACKLOG_LEN),
            last_seq: 0,
            ended_at: None,
        }
    }

    fn expired(&self, cutoff: DateTime<Utc>) -> bool {
        match self.ended_at {
            Some(ended_at) => ended_at <= cutoff,
            // Created by a subscriber that has since gone away.
            None => self.backlog.is_empty() && self.sender.receiver_count() == 0,
        }
    }
}

/// Cloning shares the same hub.
#[derive(Clone, Default)]
pub struct EventHub {
    topics: Arc<Mutex<HashMap<Uuid, Topic>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, session_id: Uuid, event: HubEvent) -> SequencedEvent {
        let mut topics = self.topics.lock();
        let topic = topics.entry(session_id).or_insert_with(Topic::new);

        topic.last_seq += 1;
        let sequenced = SequencedEvent {
            seq: topic.last_seq,
            at: Utc::now(),
            event,
        };

        if topic.backlog.len() == BACKLOG_LEN {
            topic.backlog.pop_front();
        }
        topic.backlog.push_back(sequenced.clone());
        if matches!(sequenced.event, HubEvent::Debate(DebateEvent::DebateEnd)) {
            topic.ended_at = Some(sequenced.at);
        }

        // No subscribers is fine; the backlog still has it.
        let _ = topic.sender.send(sequenced.clone());
        sequenced
    }

    pub fn subscribe(&self, session_id: Uuid) -> broadcast::Receiver<SequencedEvent> {
        self.topics
            .lock()
            .entry(session_id)
            .or_insert_with(Topic::new)
            .sender
            .subscribe()
    }

    /// Backlogged events with a sequence number greater than `seq`, oldest
    /// first. Events older than the backlog are gone.
    pub fn since(&self, session_id: Uuid, seq: u64) -> Vec<SequencedEvent> {
        self.topics
            .lock()
            .get(&session_id)
            .map(|topic| {
                topic
                    .backlog
                    .iter()
                    .filter(|e| e.seq > seq)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn last_seq(&self, session_id: Uuid) -> u64 {
        self.topics
            .lock()
            .get(&session_id)
            .map_or(0, |topic| topic.last_seq)
    }

    /// Forget a session. Open subscriptions end once they drain.
    pub fn close(&self, session_id: Uuid) {
        self.topics.lock().remove(&session_id);
    }

    /// Drop topics whose debate ended more than `retention` before `now`,
    /// plus empty topics nobody listens to. Returns how many were dropped.
    pub fn sweep(&self, now: DateTime<Utc>, retention: chrono::Duration) -> usize {
        let cutoff = now - retention;
        let mut topics = self.topics.lock();
        let before = topics.len();
        topics.retain(|_, topic| !topic.expired(cutoff));
        before - topics.len()
    }

    pub fn len(&self) -> usize {
        self.topics.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.lock().is_empty()
    }

    /// An orchestrator callback that publishes into this hub.
    pub fn debate_callback(&self, session_id: Uuid) -> DebateCallback {
        let hub = self.clone();
        Box::new(move |event| {
            hub.publish(session_id, HubEvent::Debate(event));
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_numbers_are_per_session() {
        let hub = EventHub::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert_eq!(hub.publish(a, HubEvent::Debate(DebateEvent::DebateEnd)).seq, 1);
        assert_eq!(hub.publish(a, HubEvent::AiGenerating { turn_index: 0 }).seq, 2);
        assert_eq!(hub.publish(b, HubEvent::AiGenerating { turn_index: 0 }).seq, 1);
        assert_eq!(hub.last_seq(a), 2);
        assert_eq!(hub.last_seq(Uuid::new_v4()), 0);
    }

    #[test]
    fn test_since_filters_and_backlog_is_bounded() {
        let hub = EventHub::new();
        let session = Uuid::new_v4();
        for turn_index in 0..300 {
            hub.publish(session, HubEvent::AiGenerating { turn_index });
        }

        let all = hub.since(session, 0);
        assert_eq!(all.len(), BACKLOG_LEN);
        assert_eq!(all[0].seq, 300 - BACKLOG_LEN as u64 + 1);
        assert_eq!(all.last().unwrap().seq, 300);

        let tail = hub.since(session, 298);
        assert_eq!(tail.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![299, 300]);
        assert!(hub.since(session, 300).is_empty());
        assert!(hub.since(Uuid::new_v4(), 0).is_empty());
    }

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let hub = EventHub::new();
        let session = Uuid::new_v4();
        let mut rx = hub.subscribe(session);

        let callback = hub.debate_callback(session);
        callback(DebateEvent::DebateStart {
            topic: "Resolved: test.".into(),
        });

        let received = rx.recv().await.unwrap();
        assert_eq!(received.seq, 1);
        assert!(matches!(
            received.event,
            HubEvent::Debate(DebateEvent::DebateStart { .. })
        ));
    }

    #[test]
    fn test_event_json_shape() {
        let event = HubEvent::Debate(DebateEvent::DebateEnd);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "debate", "type": "debate_end"}));

        let failed = HubEvent::AiFailed {
            turn_index: 3,
            message: "boom".into(),
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["kind"], "ai_failed");
        assert_eq!(json["turn_index"], 3);
    }

    #[tokio::test]
    async fn test_close_ends_subscriptions() {
        let hub = EventHub::new();
        let session = Uuid::new_v4();
        let mut rx = hub.subscribe(session);
        hub.close(session);
        assert!(rx.recv().await.is_err());
    }

    #[tokio::test]
    async fn test_sweep_drops_ended_topics_after_retention() {
        let hub = EventHub::new();
        let finished = Uuid::new_v4();
        let running = Uuid::new_v4();
        hub.publish(running, HubEvent::AiGenerating { turn_index: 0 });
        hub.publish(finished, HubEvent::Debate(DebateEvent::DebateEnd));
        let mut rx = hub.subscribe(finished);

        let retention = chrono::Duration::minutes(10);
        assert_eq!(hub.sweep(Utc::now(), retention), 0);
        assert_eq!(hub.since(finished, 0).len(), 1);

        let later = Utc::now() + chrono::Duration::minutes(11);
        assert_eq!(hub.sweep(later, retention), 1);
        assert_eq!(hub.len(), 1);
        assert_eq!(hub.last_seq(finished), 0);
        assert_eq!(hub.last_seq(running), 1);
        assert!(rx.recv().await.is_err());
    }

    #[test]
    fn test_sweep_drops_abandoned_subscriptions() {
        let hub = EventHub::new();
        let session = Uuid::new_v4();
        let rx = hub.subscribe(session);
        assert_eq!(hub.sweep(Utc::now(), chrono::Duration::zero()), 0);
        drop(rx);
        assert_eq!(hub.sweep(Utc::now(), chrono::Duration::zero()), 1);
        assert!(hub.is_empty());
    }
}
