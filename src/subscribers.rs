use crate::state::VehicleState;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("Subscriber channel closed")]
    Closed,

    #[error("Subscriber failed: {0}")]
    Failed(String),
}

/// Handle returned by `subscribe`, used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

/// Receives a snapshot after every state mutation.
pub trait Subscriber: Send {
    fn on_state(&mut self, state: &VehicleState) -> Result<(), SubscriberError>;
}

impl<F> Subscriber for F
where
    F: FnMut(&VehicleState) -> Result<(), SubscriberError> + Send,
{
    fn on_state(&mut self, state: &VehicleState) -> Result<(), SubscriberError> {
        self(state)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub failed: u64,
    pub panicked: u64,
}

/// Listener list with per-listener failure isolation.
#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Box<dyn Subscriber>)>,
    stats: DeliveryStats,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: Box<dyn Subscriber>) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscribers.push((id, subscriber));
        id
    }

    /// Returns whether `id` was registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
        self.subscribers.len() != before
    }

    /// Hands `state` to every subscriber. A subscriber that errors or panics
    /// is logged and skipped; the rest still receive the snapshot.
    pub fn publish(&mut self, state: &VehicleState) {
        for (id, subscriber) in self.subscribers.iter_mut() {
            match panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_state(state))) {
                Ok(Ok(())) => self.stats.delivered += 1,
                Ok(Err(e)) => {
                    self.stats.failed += 1;
                    warn!("Subscriber {:?} failed: {}", id, e);
                }
                Err(_) => {
                    self.stats.panicked += 1;
                    warn!("Subscriber {:?} panicked while handling snapshot", id);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn get_stats(&self) -> &DeliveryStats {
        &self.stats
    }
}

impl core::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.subscribers.len())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, Box<dyn Subscriber>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let subscriber: Box<dyn Subscriber> = Box::new(move |_: &VehicleState| -> Result<(), SubscriberError> {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (count, subscriber)
    }

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let mut registry = SubscriberRegistry::new();
        let (a, sub_a) = counter();
        let (b, sub_b) = counter();
        registry.subscribe(sub_a);
        registry.subscribe(sub_b);

        registry.publish(&VehicleState::new());

        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(registry.get_stats().delivered, 2);
    }

    #[test]
    fn test_unsubscribe_removes_only_that_subscriber() {
        let mut registry = SubscriberRegistry::new();
        let (a, sub_a) = counter();
        let (b, sub_b) = counter();
        let id_a = registry.subscribe(sub_a);
        registry.subscribe(sub_b);

        assert!(registry.unsubscribe(id_a));
        assert!(!registry.unsubscribe(id_a));
        registry.publish(&VehicleState::new());

        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_failing_subscriber_is_isolated() {
        let mut registry = SubscriberRegistry::new();
        registry.subscribe(Box::new(|_: &VehicleState| -> Result<(), SubscriberError> {
            Err(SubscriberError::Failed("boom".into()))
        }));
        registry.subscribe(Box::new(|_: &VehicleState| -> Result<(), SubscriberError> {
            panic!("listener bug")
        }));
        let (count, sub) = counter();
        registry.subscribe(sub);

        registry.publish(&VehicleState::new());
        registry.publish(&VehicleState::new());

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(registry.get_stats().failed, 2);
        assert_eq!(registry.get_stats().panicked, 2);
        assert_eq!(registry.len(), 3);
    }
}
