use std::sync::Mutex;

use tokio::sync::mpsc;

use wisp_store::ChatId;

/// Cross-view notification that an identified chat's canonical state changed.
///
/// Subscribers filter by id themselves and must tolerate duplicate delivery:
/// an optimistic mutation publishes once up front and once on confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    /// A chat's title changed. `new_title` is `None` when subscribers should
    /// refetch canonical state instead of trusting a carried value.
    TitleChanged {
        chat_id: ChatId,
        new_title: Option<String>,
    },
    ChatDeleted { chat_id: ChatId },
}

impl Invalidation {
    pub fn chat_id(&self) -> ChatId {
        match self {
            Self::TitleChanged { chat_id, .. } | Self::ChatDeleted { chat_id } => *chat_id,
        }
    }
}

/// Fire-and-forget publish/subscribe for invalidation events.
///
/// Delivery is FIFO per subscriber; publishing never blocks and never fails.
/// Dropped subscriptions are pruned on the next publish.
#[derive(Debug, Default)]
pub struct InvalidationBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Invalidation>>>,
}

impl InvalidationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> InvalidationSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.lock_subscribers().push(sender);
        InvalidationSubscription { events: receiver }
    }

    pub fn publish(&self, event: Invalidation) {
        tracing::debug!(event = ?event, "publishing invalidation");
        self.lock_subscribers()
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<Invalidation>>> {
        // A poisoned lock only means a subscriber list mutation panicked;
        // the list itself is still usable.
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One subscriber's view of the bus.
#[derive(Debug)]
pub struct InvalidationSubscription {
    events: mpsc::UnboundedReceiver<Invalidation>,
}

impl InvalidationSubscription {
    pub async fn recv(&mut self) -> Option<Invalidation> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Invalidation> {
        self.events.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_to_every_registered_subscriber_in_order() {
        let bus = InvalidationBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        let chat_id = ChatId::new_v4();

        bus.publish(Invalidation::TitleChanged {
            chat_id,
            new_title: Some("renamed".to_string()),
        });
        bus.publish(Invalidation::ChatDeleted { chat_id });

        for subscription in [&mut first, &mut second] {
            assert_eq!(
                subscription.try_recv(),
                Some(Invalidation::TitleChanged {
                    chat_id,
                    new_title: Some("renamed".to_string()),
                })
            );
            assert_eq!(
                subscription.try_recv(),
                Some(Invalidation::ChatDeleted { chat_id })
            );
            assert_eq!(subscription.try_recv(), None);
        }
    }

    #[test]
    fn publish_outlives_dropped_subscribers() {
        let bus = InvalidationBus::new();
        let subscription = bus.subscribe();
        drop(subscription);

        // Must not fail or deliver anywhere.
        bus.publish(Invalidation::ChatDeleted {
            chat_id: ChatId::new_v4(),
        });

        let mut late = bus.subscribe();
        assert_eq!(late.try_recv(), None);
    }
}
