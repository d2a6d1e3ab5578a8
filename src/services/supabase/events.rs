use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;

use crate::models::{AuthChangeEvent, AuthStateChange, Session};

type Subscribers = Mutex<HashMap<u64, UnboundedSender<AuthStateChange>>>;

/// Fans auth state changes out to every live subscription, in emission order.
///
/// Each subscription gets its own unbounded queue, so a slow callback delays
/// only itself and never misses a change.
#[derive(Clone)]
pub struct AuthBroadcaster {
    subscribers: Arc<Subscribers>,
    next_id: Arc<AtomicU64>,
}

impl AuthBroadcaster {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Run `callback` for every change emitted after this call returns.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe<F>(&self, mut callback: F) -> AuthSubscription
    where
        F: FnMut(AuthChangeEvent, Option<Session>) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, mut receiver) = mpsc::unbounded_channel::<AuthStateChange>();
        self.subscribers.lock().insert(id, sender);

        let task = tokio::spawn(async move {
            while let Some(change) = receiver.recv().await {
                callback(change.event, change.session);
            }
        });

        tracing::debug!(subscription = id, "Auth state subscription registered");
        AuthSubscription {
            id,
            task,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    pub fn emit(&self, event: AuthChangeEvent, session: Option<Session>) {
        // Held across the sends so concurrent emitters reach every subscriber in the same order.
        let mut subscribers = self.subscribers.lock();

        subscribers.retain(|id, sender| {
            let delivered = sender
                .send(AuthStateChange {
                    event,
                    session: session.clone(),
                })
                .is_ok();
            if !delivered {
                tracing::debug!(subscription = *id, "Dropping closed auth subscription");
            }
            delivered
        });

        tracing::debug!(event = ?event, subscribers = subscribers.len(), "Auth state change emitted");
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for AuthBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Live auth subscription. Dropping it unregisters the callback.
pub struct AuthSubscription {
    id: u64,
    task: JoinHandle<()>,
    subscribers: Weak<Subscribers>,
}

impl AuthSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(self) {}
}

impl fmt::Debug for AuthSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSubscription").field("id", &self.id).finish()
    }
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.lock().remove(&self.id);
        }
        self.task.abort();
        tracing::debug!(subscription = self.id, "Auth state subscription removed");
    }
}
