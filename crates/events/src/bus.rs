//! In-process job event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`JobEvent`]s. It is
//! designed to be shared via `Arc<EventBus>` between the engine and any
//! number of consumers (job cards, log writers).

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use veoflow_core::types::JobId;

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// Consumer-facing status attached to every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Running,
    Success,
    Error,
}

/// One job-state-change notification.
///
/// Consumers receive at least one event per meaningful transition and
/// must tolerate several `Running` events for the same job.
#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    pub job_id: JobId,
    /// Human-readable progress message for job cards and logs.
    pub message: String,
    pub status: EventStatus,
    /// Serving URI of the finished video, present on success.
    pub result_ref: Option<String>,
    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    /// A `running` progress event.
    pub fn running(job_id: impl Into<JobId>, message: impl Into<String>) -> Self {
        Self::new(job_id, message, EventStatus::Running, None)
    }

    /// A terminal `success` event, optionally carrying the result ref.
    pub fn success(
        job_id: impl Into<JobId>,
        message: impl Into<String>,
        result_ref: Option<String>,
    ) -> Self {
        Self::new(job_id, message, EventStatus::Success, result_ref)
    }

    /// A terminal `error` event.
    pub fn error(job_id: impl Into<JobId>, message: impl Into<String>) -> Self {
        Self::new(job_id, message, EventStatus::Error, None)
    }

    fn new(
        job_id: impl Into<JobId>,
        message: impl Into<String>,
        status: EventStatus,
        result_ref: Option<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            message: message.into(),
            status,
            result_ref,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`JobEvent`].
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are
    /// dropped and slow receivers observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: JobEvent) {
        // Ignore the SendError -- it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(JobEvent::success(
            "j1",
            "Video ready",
            Some("https://example.com/v.mp4".into()),
        ));

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.job_id, "j1");
        assert_eq!(received.status, EventStatus::Success);
        assert_eq!(
            received.result_ref.as_deref(),
            Some("https://example.com/v.mp4")
        );
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(JobEvent::running("j2", "Submitting generation request"));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");
        assert_eq!(e1.job_id, "j2");
        assert_eq!(e2.job_id, "j2");
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(JobEvent::error("j3", "Submission failed"));
    }

    #[test]
    fn statuses_serialize_lowercase() {
        let event = JobEvent::running("j4", "working");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "running");

        let event = JobEvent::error("j4", "broken");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "error");
    }
}
