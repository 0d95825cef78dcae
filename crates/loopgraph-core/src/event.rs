use tokio::sync::broadcast;

use crate::types::RunEvent;

/// Fan-out of [`RunEvent`]s to every live subscriber.
///
/// Publishing never blocks the executor. A subscriber that falls more than
/// `capacity` events behind sees `RecvError::Lagged` on its next receive.
pub struct EventBus {
    tx: broadcast::Sender<RunEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Returns how many subscribers saw the event; zero when nobody listens.
    pub fn publish(&self, event: RunEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunId;

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        let delivered = bus.publish(RunEvent::StepCompleted {
            run_id: RunId::new(),
            step: 0,
            node: "a".into(),
            next: None,
        });
        assert_eq!(delivered, 0);
    }

    #[test]
    fn test_subscriber_receives_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let _other = bus.subscribe();
        let delivered = bus.publish(RunEvent::StepCompleted {
            run_id: RunId::from("r"),
            step: 1,
            node: "b".into(),
            next: Some("c".into()),
        });
        assert_eq!(delivered, 2);
        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.run_id().as_str(), "r");
    }
}
