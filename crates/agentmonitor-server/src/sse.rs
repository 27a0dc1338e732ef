//! SSE hub: a bounded subscriber registry with per-client filters and
//! per-client bounded queues. Publishing is non-blocking everywhere; a
//! subscriber that cannot keep up is dropped rather than allowed to
//! stall the others.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use agentmonitor_types::{ClientFilter, StreamMessage};
use tokio::sync::mpsc;
use uuid::Uuid;

struct Subscriber {
    tx: mpsc::Sender<StreamMessage>,
    filter: ClientFilter,
}

pub struct SseHub {
    registry: Mutex<HashMap<Uuid, Subscriber>>,
    max_clients: usize,
    /// Per-client queue depth, sized to one full live feed. A client
    /// that falls a feed behind is disconnected on the next publish.
    queue_depth: usize,
}

/// Live subscription handle. Dropping it (client disconnect, stream
/// abort) deregisters the subscriber.
pub struct Subscription {
    pub id: Uuid,
    pub rx: mpsc::Receiver<StreamMessage>,
    hub: Arc<SseHub>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.remove(self.id);
    }
}

impl futures::Stream for Subscription {
    type Item = StreamMessage;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl SseHub {
    pub fn new(max_clients: usize, queue_depth: usize) -> Arc<Self> {
        Arc::new(Self {
            registry: Mutex::new(HashMap::new()),
            max_clients,
            queue_depth: queue_depth.max(8),
        })
    }

    /// Register a subscriber, or report saturation without mutating the
    /// registry. The `connected` frame is queued before the handle is
    /// returned, so it is always the first frame on the wire.
    pub fn subscribe(self: &Arc<Self>, filter: ClientFilter) -> Option<Subscription> {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.queue_depth);

        {
            let mut registry = self.registry.lock().expect("sse registry poisoned");
            if registry.len() >= self.max_clients {
                return None;
            }
            registry.insert(id, Subscriber { tx: tx.clone(), filter });
        }

        // Queue capacity is fresh; this cannot fail.
        let _ = tx.try_send(StreamMessage::Connected {
            client_id: id.to_string(),
        });

        Some(Subscription {
            id,
            rx,
            hub: Arc::clone(self),
        })
    }

    /// Fan a message out to every matching subscriber. Subscribers with
    /// a full or closed queue are dropped from the registry; nobody
    /// blocks.
    pub fn publish(&self, message: &StreamMessage) {
        let mut stale = Vec::new();
        {
            let registry = self.registry.lock().expect("sse registry poisoned");
            for (id, subscriber) in registry.iter() {
                if !subscriber.filter.matches(message) {
                    continue;
                }
                if subscriber.tx.try_send(message.clone()).is_err() {
                    stale.push(*id);
                }
            }
        }
        for id in stale {
            tracing::debug!(client = %id, "dropping slow sse subscriber");
            self.remove(id);
        }
    }

    pub fn client_count(&self) -> usize {
        self.registry.lock().expect("sse registry poisoned").len()
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    /// Drain the registry on shutdown; closing the queues ends every
    /// subscriber stream.
    pub fn close_all(&self) {
        self.registry.lock().expect("sse registry poisoned").clear();
    }

    fn remove(&self, id: Uuid) {
        self.registry.lock().expect("sse registry poisoned").remove(&id);
    }
}
