//! Event bus for inbound MIDI messages
//!
//! One bus is established per controller. A pump task drains the gateway's
//! event stream and fans every message out to the registered callbacks, in
//! arrival order. Each [`ContextId`] holds at most one callback: registering
//! again for the same context replaces the previous one. Nothing is buffered
//! for late subscribers.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, trace};

use crate::gateway::MidiEventStream;
use crate::protocol::MidiMessage;

/// Subscriber callback
///
/// Runs on the pump task, so it must not block.
pub type MidiCallback = Arc<dyn Fn(&MidiMessage) + Send + Sync>;

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Identity of one consumer (a view, a monitor, a test listener)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocate a fresh, process-unique context
    pub fn new() -> Self {
        Self(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

struct Entry {
    subscription: u64,
    callback: MidiCallback,
}

#[derive(Default)]
struct Registry {
    entries: Mutex<HashMap<ContextId, Entry>>,
    next_subscription: AtomicU64,
}

impl Registry {
    fn remove_if_current(&self, context: ContextId, subscription: u64) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(&context) {
            Some(entry) if entry.subscription == subscription => {
                entries.remove(&context);
                true
            }
            _ => false,
        }
    }
}

/// Fan-out of inbound MIDI messages to per-context callbacks
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `context`, replacing any previous callback
    ///
    /// The callback stays registered until the returned guard is dropped or
    /// another registration for the same context replaces it.
    pub fn subscribe<F>(&self, context: ContextId, callback: F) -> Subscription
    where
        F: Fn(&MidiMessage) + Send + Sync + 'static,
    {
        let subscription = self.registry.next_subscription.fetch_add(1, Ordering::Relaxed);
        let replaced = self
            .registry
            .entries
            .lock()
            .insert(
                context,
                Entry {
                    subscription,
                    callback: Arc::new(callback),
                },
            )
            .is_some();

        debug!(%context, replaced, "MIDI event callback registered");

        Subscription {
            registry: Arc::downgrade(&self.registry),
            context,
            subscription,
        }
    }

    /// Deliver one message to every current callback
    pub fn dispatch(&self, message: &MidiMessage) {
        // Snapshot so callbacks may (un)subscribe without deadlocking
        let callbacks: Vec<MidiCallback> = self
            .registry
            .entries
            .lock()
            .values()
            .map(|entry| entry.callback.clone())
            .collect();

        trace!(subscribers = callbacks.len(), "dispatch {}", message);
        for callback in callbacks {
            callback(message);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.entries.lock().len()
    }

    pub fn is_subscribed(&self, context: ContextId) -> bool {
        self.registry.entries.lock().contains_key(&context)
    }

    /// Drain `events` into this bus until the stream ends
    pub fn spawn_pump(&self, mut events: MidiEventStream) -> JoinHandle<()> {
        let bus = self.clone();
        tokio::spawn(async move {
            while let Some(message) = events.next().await {
                bus.dispatch(&message);
            }
            debug!("MIDI event stream closed");
        })
    }
}

/// Registration guard returned by [`EventBus::subscribe`]
///
/// Dropping it removes the callback, unless a newer registration for the
/// same context has already replaced it.
#[must_use = "dropping a Subscription unregisters its callback"]
pub struct Subscription {
    registry: Weak<Registry>,
    context: ContextId,
    subscription: u64,
}

impl Subscription {
    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.remove_if_current(self.context, self.subscription) {
                debug!(context = %self.context, "MIDI event callback removed");
            }
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("context", &self.context)
            .field("subscription", &self.subscription)
            .finish()
    }
}
