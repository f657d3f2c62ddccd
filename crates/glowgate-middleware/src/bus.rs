//! Per-topic publish/subscribe relay bus.
//!
//! Every subscriber owns an unbounded queue, so a slow listener never loses
//! frames and never blocks the publisher or the other listeners.
//!
//! # Topics
//!
//! | Topic | Path | Frames |
//! |---|---|---|
//! | [`Topic::Events`] | `/events` | one JSON event per frame |
//! | [`Topic::LocalEvents`] | `/local-events` | one JSON event per frame |
//! | [`Topic::Connection`] | `/connection` | literal `connected` / `disconnected` |
//! | [`Topic::OtaProgress`] | `/ota-progress` | JSON progress payload |
//!
//! # Delivery
//!
//! A subscriber sees every frame published after it subscribed, in publish
//! order, exactly once. Nothing is replayed to late subscribers, and a topic
//! without subscribers drops frames silently. A dropped receiver is pruned on
//! the next publish.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

/// The four independent relay lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    /// Events emitted on the controller network.
    Events,
    /// Events emitted locally on the connected controller.
    LocalEvents,
    /// Session status tokens.
    Connection,
    /// Firmware upload progress.
    OtaProgress,
}

impl Topic {
    pub const ALL: [Topic; 4] = [
        Topic::Events,
        Topic::LocalEvents,
        Topic::Connection,
        Topic::OtaProgress,
    ];

    /// HTTP path the topic is served on.
    pub fn path(&self) -> &'static str {
        match self {
            Topic::Events => "/events",
            Topic::LocalEvents => "/local-events",
            Topic::Connection => "/connection",
            Topic::OtaProgress => "/ota-progress",
        }
    }

    fn index(self) -> usize {
        match self {
            Topic::Events => 0,
            Topic::LocalEvents => 1,
            Topic::Connection => 2,
            Topic::OtaProgress => 3,
        }
    }
}

/// A single frame travelling through the bus.
#[derive(Debug, Clone, Serialize)]
pub struct RelayMessage {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub topic: Topic,
    /// Already-encoded frame body: JSON text or a literal token.
    pub data: String,
}

type Lane = Mutex<Vec<mpsc::UnboundedSender<RelayMessage>>>;

/// Shared relay bus. Clone it cheaply – all clones share the same
/// subscriber lists.
#[derive(Clone, Debug, Default)]
pub struct RelayBus {
    lanes: Arc<[Lane; 4]>,
}

impl RelayBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `data` to `topic`.
    ///
    /// Returns the number of subscribers that were handed the frame; `0`
    /// means nobody was listening and the frame was dropped.
    pub fn publish(&self, topic: Topic, data: impl Into<String>) -> usize {
        let message = RelayMessage {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            topic,
            data: data.into(),
        };
        // Sending under the lock keeps publish order identical for every
        // subscriber when publishers race.
        let mut subscribers = self.lane(topic).lock();
        subscribers.retain(|tx| tx.send(message.clone()).is_ok());
        subscribers.len()
    }

    /// Subscribe to `topic`. Only frames published from now on are seen.
    pub fn subscribe(&self, topic: Topic) -> TopicReceiver {
        let (tx, receiver) = mpsc::unbounded_channel();
        self.lane(topic).lock().push(tx);
        TopicReceiver { topic, receiver }
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        let mut subscribers = self.lane(topic).lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    fn lane(&self, topic: Topic) -> &Lane {
        &self.lanes[topic.index()]
    }
}

// ---------------------------------------------------------------------------
// Topic-bound receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`].
///
/// Obtained via [`RelayBus::subscribe`].
#[derive(Debug)]
pub struct TopicReceiver {
    topic: Topic,
    receiver: mpsc::UnboundedReceiver<RelayMessage>,
}

impl TopicReceiver {
    /// Wait for the next frame on this topic. `None` once every clone of
    /// the bus has been dropped.
    pub async fn recv(&mut self) -> Option<RelayMessage> {
        self.receiver.recv().await
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Convert into a stream of frames that ends when the bus shuts down.
    pub fn into_stream(self) -> impl Stream<Item = RelayMessage> + Send + 'static {
        UnboundedReceiverStream::new(self.receiver)
    }
}
