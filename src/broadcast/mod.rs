//! In-process pub/sub hub (§4.6.2, C6): one channel per topic, push-only
//! subscribers, at-most-once delivery, slow subscribers dropped rather
//! than allowed to block a publisher. Per-topic order is preserved;
//! across topics there is no ordering guarantee.

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::model::RunStatus;

/// Bounded so one never-draining subscriber can't grow memory without
/// limit; once full, `tokio::sync::broadcast` drops the oldest
/// unreceived message for lagging subscribers instead of blocking.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobRunEvent {
    Claimed { run_id: Uuid, pipeline_id: Uuid },
    Started { run_id: Uuid, pipeline_id: Uuid },
    Finished { run_id: Uuid, pipeline_id: Uuid, status: RunStatus },
    Expired { run_id: Uuid, pipeline_id: Uuid },
}

impl JobRunEvent {
    pub fn claimed(run_id: Uuid, pipeline_id: Uuid) -> Self {
        JobRunEvent::Claimed { run_id, pipeline_id }
    }

    pub fn started(run_id: Uuid, pipeline_id: Uuid) -> Self {
        JobRunEvent::Started { run_id, pipeline_id }
    }

    pub fn finished(run_id: Uuid, pipeline_id: Uuid, status: RunStatus) -> Self {
        JobRunEvent::Finished { run_id, pipeline_id, status }
    }

    pub fn expired(run_id: Uuid, pipeline_id: Uuid) -> Self {
        JobRunEvent::Expired { run_id, pipeline_id }
    }

    fn topic(&self) -> Uuid {
        match self {
            JobRunEvent::Claimed { pipeline_id, .. }
            | JobRunEvent::Started { pipeline_id, .. }
            | JobRunEvent::Finished { pipeline_id, .. }
            | JobRunEvent::Expired { pipeline_id, .. } => *pipeline_id,
        }
    }
}

/// A single process-wide node; there is no cross-process fan-out, by
/// design — cross-process observers poll the REST snapshot instead.
pub struct BroadcastHub {
    topics: DashMap<Uuid, broadcast::Sender<JobRunEvent>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        BroadcastHub {
            topics: DashMap::new(),
        }
    }

    pub fn subscribe(&self, pipeline_id: Uuid) -> broadcast::Receiver<JobRunEvent> {
        self.topics
            .entry(pipeline_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publishing with no subscribers is a no-op, not an error: missed
    /// events are never replayed (§4.6).
    pub fn publish(&self, event: JobRunEvent) {
        if let Some(sender) = self.topics.get(&event.topic()) {
            let _ = sender.send(event);
        }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        BroadcastHub::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_events_for_its_topic_only() {
        let hub = BroadcastHub::new();
        let pipeline_a = Uuid::new_v4();
        let pipeline_b = Uuid::new_v4();
        let mut sub_a = hub.subscribe(pipeline_a);
        let _sub_b = hub.subscribe(pipeline_b);

        hub.publish(JobRunEvent::claimed(Uuid::new_v4(), pipeline_a));
        hub.publish(JobRunEvent::claimed(Uuid::new_v4(), pipeline_b));

        let received = sub_a.recv().await.unwrap();
        assert!(matches!(received, JobRunEvent::Claimed { .. }));
        assert!(sub_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let hub = BroadcastHub::new();
        hub.publish(JobRunEvent::claimed(Uuid::new_v4(), Uuid::new_v4()));
    }
}
