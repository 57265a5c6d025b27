//! Item subscriptions and hardware event dispatch.
//!
//! Subscribers are keyed by PHI id, so dispatching an event costs one map
//! lookup plus one call per subscriber of that PHI.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uc_common::driver::{EventSink, StateMap};
use uc_common::item::{Item, ItemUpdateSink};

type Subscribers = HashMap<String, HashMap<String, Arc<dyn Item>>>;

/// `phi_id` → items subscribed to that PHI's events.
///
/// Cloning yields another handle to the same subscriber table.
#[derive(Clone, Default)]
pub struct ItemBinding {
    subscribers: Arc<RwLock<Subscribers>>,
}

impl ItemBinding {
    /// Create an empty binding table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure a (possibly empty) subscriber set exists for `phi_id`.
    pub fn ensure(&self, phi_id: &str) {
        self.subscribers
            .write()
            .entry(phi_id.to_string())
            .or_default();
    }

    /// Drop the subscriber set of `phi_id`.
    pub fn remove(&self, phi_id: &str) {
        self.subscribers.write().remove(phi_id);
    }

    /// Add `item` to the subscribers of `phi_id`. Adding twice is a no-op.
    pub fn subscribe(&self, phi_id: &str, item: Arc<dyn Item>) {
        self.subscribers
            .write()
            .entry(phi_id.to_string())
            .or_default()
            .insert(item.full_id().to_string(), item);
    }

    /// Remove the item `full_id` from the subscribers of `phi_id`.
    ///
    /// Returns whether the item was subscribed.
    pub fn unsubscribe(&self, phi_id: &str, full_id: &str) -> bool {
        self.subscribers
            .write()
            .get_mut(phi_id)
            .is_some_and(|set| set.remove(full_id).is_some())
    }

    /// Number of items subscribed to `phi_id`.
    pub fn subscriber_count(&self, phi_id: &str) -> usize {
        self.subscribers.read().get(phi_id).map_or(0, HashMap::len)
    }

    /// Snapshot of the items subscribed to `phi_id`.
    pub fn subscribers(&self, phi_id: &str) -> Vec<Arc<dyn Item>> {
        self.subscribers
            .read()
            .get(phi_id)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether a subscriber set exists for `phi_id`.
    pub fn contains(&self, phi_id: &str) -> bool {
        self.subscribers.read().contains_key(phi_id)
    }
}

/// Routes PHI events to subscribed items.
pub struct EventDispatcher {
    binding: ItemBinding,
    sink: Arc<dyn ItemUpdateSink>,
}

impl EventDispatcher {
    /// Dispatch events of `binding`'s subscribers into `sink`.
    pub fn new(binding: ItemBinding, sink: Arc<dyn ItemUpdateSink>) -> Self {
        Self { binding, sink }
    }
}

impl EventSink for EventDispatcher {
    fn handle_phi_event(&self, phi_id: &str, port: &str, data: &StateMap) {
        // The lock is released before calling into the item model.
        for item in self.binding.subscribers(phi_id) {
            if item.updates_allowed() && !item.is_destroyed() {
                debug!(
                    "event on PHI {phi_id}, port {port}, updating item {}",
                    item.full_id()
                );
                self.sink.update_item(&item, data);
            }
        }
    }
}
