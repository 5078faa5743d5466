//! In-process fan-out of notifications to connected WebSocket clients.

use mentor_core::roadmap::DiagnosticSummary;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Events pushed to users over `/ws`.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A student finished a diagnostic on one of the teacher's goals.
    #[serde(rename_all = "camelCase")]
    DiagnosticFinished {
        goal_id: Uuid,
        session_id: Uuid,
        student_id: String,
        summary: DiagnosticSummary,
    },
}

/// A notification and the user it is meant for.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub recipient: String,
    pub notification: Notification,
}

pub trait NotificationHub: Send + Sync {
    /// Delivers to every current subscriber. Nobody listening is not an error.
    fn publish(&self, recipient: &str, notification: Notification);

    fn subscribe(&self) -> broadcast::Receiver<Envelope>;
}

pub struct BroadcastHub {
    tx: broadcast::Sender<Envelope>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
}

impl NotificationHub for BroadcastHub {
    fn publish(&self, recipient: &str, notification: Notification) {
        let envelope = Envelope {
            recipient: recipient.to_string(),
            notification,
        };
        if self.tx.send(envelope).is_err() {
            debug!(%recipient, "No WebSocket subscribers; notification dropped");
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn finished() -> Notification {
        Notification::DiagnosticFinished {
            goal_id: Uuid::nil(),
            session_id: Uuid::nil(),
            student_id: "student-1".to_string(),
            summary: DiagnosticSummary::default(),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let hub = BroadcastHub::new(4);
        hub.publish("teacher-1", finished());
    }

    #[tokio::test]
    async fn test_subscribers_receive_envelopes() {
        let hub = BroadcastHub::new(4);
        let mut rx = hub.subscribe();
        hub.publish("teacher-1", finished());

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.recipient, "teacher-1");
        assert_eq!(envelope.notification, finished());
    }

    #[test]
    fn test_notification_wire_format() {
        let json = serde_json::to_value(finished()).unwrap();
        assert_eq!(json["type"], "diagnostic_finished");
        assert_eq!(json["studentId"], "student-1");
        assert_eq!(json["sessionId"], json!(Uuid::nil()));
        assert_eq!(json["summary"]["total"], 0);
    }
}
