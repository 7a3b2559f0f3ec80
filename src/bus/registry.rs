use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::de::DeserializeOwned;
use serde_json::Value;

type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    listeners: HashMap<String, Vec<(u64, Callback)>>,
}

impl RegistryInner {
    fn remove(&mut self, event: &str, id: u64) -> bool {
        let Some(entries) = self.listeners.get_mut(event) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.listeners.remove(event);
        }
        removed
    }
}

/// Registry of event subscribers keyed by event name.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct EventRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        let counts: HashMap<&str, usize> = inner
            .listeners
            .iter()
            .map(|(name, entries)| (name.as_str(), entries.len()))
            .collect();
        f.debug_struct("EventRegistry").field("listeners", &counts).finish()
    }
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // A panicking subscriber never runs under the lock, so poisoning only
        // happens on a bug inside the registry itself.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `callback` for `event`. The subscriber stays registered until
    /// the returned handle is unsubscribed or dropped.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, event: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let event = event.into();
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner
            .listeners
            .entry(event.clone())
            .or_default()
            .push((id, Arc::new(callback)));
        tracing::debug!(event = %event, subscription = id, "subscriber registered");

        Subscription {
            id,
            event,
            registry: Arc::downgrade(&self.inner),
            detached: false,
        }
    }

    /// Like [`subscribe`](Self::subscribe), decoding each payload into `T`
    /// first. Payloads that fail to decode are logged and skipped.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe_typed<T, F>(&self, event: impl Into<String>, callback: F) -> Subscription
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        let event = event.into();
        let name = event.clone();
        self.subscribe(event, move |payload| {
            match serde_json::from_value::<T>(payload.clone()) {
                Ok(decoded) => callback(decoded),
                Err(error) => {
                    tracing::warn!(event = %name, "dropping malformed event payload: {error}");
                }
            }
        })
    }

    /// Invoke every subscriber of `event` with `payload`, in registration
    /// order. Returns the number of subscribers invoked.
    pub fn dispatch(&self, event: &str, payload: &Value) -> usize {
        // Snapshot so callbacks can (un)subscribe without deadlocking.
        let callbacks: Vec<Callback> = {
            let inner = self.lock();
            match inner.listeners.get(event) {
                Some(entries) => entries.iter().map(|(_, cb)| cb.clone()).collect(),
                None => Vec::new(),
            }
        };

        if callbacks.is_empty() {
            tracing::debug!(event, "no subscribers for event");
            return 0;
        }

        tracing::debug!(event, subscribers = callbacks.len(), "dispatching event");
        for callback in &callbacks {
            callback(payload);
        }
        callbacks.len()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.lock().listeners.get(event).map_or(0, Vec::len)
    }

    /// Remove every subscriber of every event.
    pub fn clear(&self) {
        self.lock().listeners.clear();
    }
}

/// Handle to a registered subscriber.
///
/// Dropping the handle unsubscribes. Use [`detach`](Self::detach) to keep the
/// subscriber alive for as long as the registry is.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    event: String,
    registry: Weak<Mutex<RegistryInner>>,
    detached: bool,
}

impl Subscription {
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Remove the subscriber. Returns false if it was already gone (the
    /// registry was cleared or dropped).
    pub fn unsubscribe(mut self) -> bool {
        self.detached = true;
        self.remove()
    }

    pub fn detach(mut self) {
        self.detached = true;
    }

    fn remove(&self) -> bool {
        let Some(inner) = self.registry.upgrade() else {
            return false;
        };
        let mut inner = inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let removed = inner.remove(&self.event, self.id);
        if removed {
            tracing::debug!(event = %self.event, subscription = self.id, "subscriber removed");
        }
        removed
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.detached {
            self.remove();
        }
    }
}
