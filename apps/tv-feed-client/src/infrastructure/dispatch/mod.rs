//! Event Dispatch Hub
//!
//! Fan-out point between the single connection read task and any number
//! of retrieval orchestrators. Every subscriber receives every event on
//! an unbounded channel; dropping a subscription detaches it, and
//! clearing the hub (connection loss, explicit close) ends every
//! subscriber's stream so blocked receivers wake with `None`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::domain::event::ChartEvent;

/// Registry of live event subscribers.
#[derive(Debug, Default)]
pub struct DispatchHub {
    subscribers: Mutex<HashMap<u64, mpsc::UnboundedSender<ChartEvent>>>,
    next_id: AtomicU64,
}

impl DispatchHub {
    /// Create a hub with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber.
    pub fn subscribe(self: Arc<Self>) -> EventSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().insert(id, tx);
        EventSubscription { id, rx, hub: self }
    }

    /// Deliver one event to every live subscriber, pruning any whose
    /// receiver has gone away.
    pub fn dispatch(&self, event: &ChartEvent) {
        self.subscribers
            .lock()
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    /// Drop every subscriber channel, ending all subscription streams.
    pub fn clear(&self) {
        self.subscribers.lock().clear();
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().remove(&id);
    }
}

/// One subscriber's view of the event flow.
///
/// Receives every event dispatched after the subscription was opened.
/// Detaches from the hub on drop.
#[derive(Debug)]
pub struct EventSubscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<ChartEvent>,
    hub: Arc<DispatchHub>,
}

impl EventSubscription {
    /// Receive the next event.
    ///
    /// Returns `None` once the hub has been cleared and all queued events
    /// were consumed.
    pub async fn recv(&mut self) -> Option<ChartEvent> {
        self.rx.recv().await
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}
