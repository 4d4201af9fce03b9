//! Notification Module
//!
//! Hands fresh snapshots and alert transitions to whoever delivers them
//! (dashboards over websockets, email, SMS). Delivery itself lives outside
//! the engine.

use crate::alerts::AlertTransition;
use crate::kpi::MetricSnapshot;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Receiver of engine events. Methods must not block.
pub trait AnalyticsSink: Send + Sync {
    /// A snapshot was freshly computed (cache hits are not reported).
    fn snapshot_computed(&self, _snapshot: &MetricSnapshot) {}

    /// An alert was raised, escalated or resolved.
    fn alert_transition(&self, _transition: &AlertTransition) {}
}

/// Event published by [`BroadcastSink`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AnalyticsEvent {
    Snapshot { snapshot: MetricSnapshot },
    Alert { transition: AlertTransition },
}

/// Fans events out to any number of subscribers.
///
/// Slow subscribers lag and lose the oldest events; the engine never waits.
pub struct BroadcastSink {
    sender: broadcast::Sender<AnalyticsEvent>,
}

impl BroadcastSink {
    /// Create a sink buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AnalyticsEvent> {
        self.sender.subscribe()
    }

    /// Current subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn publish(&self, event: AnalyticsEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl AnalyticsSink for BroadcastSink {
    fn snapshot_computed(&self, snapshot: &MetricSnapshot) {
        self.publish(AnalyticsEvent::Snapshot {
            snapshot: snapshot.clone(),
        });
    }

    fn alert_transition(&self, transition: &AlertTransition) {
        self.publish(AnalyticsEvent::Alert {
            transition: transition.clone(),
        });
    }
}
