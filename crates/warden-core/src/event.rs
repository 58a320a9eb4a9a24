use crate::types::KernelEvent;

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<KernelEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: KernelEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<KernelEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.publish(KernelEvent::RunFinished {
            run_id: "r1".into(),
            succeeded: true,
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn subscribers_receive_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        for i in 0..3 {
            bus.publish(KernelEvent::StageStarted {
                run_id: "r1".into(),
                index: i,
                nodes: vec![],
            });
        }
        for i in 0..3 {
            match rx.try_recv().unwrap() {
                KernelEvent::StageStarted { index, .. } => assert_eq!(index, i),
                other => panic!("unexpected event {:?}", other),
            }
        }
    }
}
