//! In-memory view of the signed-in user's outstanding notifications.
//!
//! The list is a cache of server state. REST results replace it wholesale;
//! live pushes and user actions patch it in place. The unread counter is
//! kept by increment/decrement and only reconciled with the server on
//! [`NotificationStore::fetch_unread_count`].
//!
//! State lives in a `tokio::sync::watch` channel, which doubles as the change
//! feed for presentation code. It is only locked synchronously, never across
//! an await.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::api::{ClientError, ListQuery, NotificationApi};
use crate::bus::event_types::EVENT_NOTIFICATION;
use crate::bus::{EventRegistry, Subscription};
use crate::model::{Notification, NotificationId};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreSnapshot {
    pub notifications: Vec<Notification>,
    pub unread_count: u64,
    /// True while at least one full list fetch is in flight.
    pub loading: bool,
}

#[derive(Clone)]
pub struct NotificationStore {
    api: Arc<dyn NotificationApi>,
    query: ListQuery,
    state: Arc<watch::Sender<StoreSnapshot>>,
    fetches: Arc<AtomicUsize>,
}

impl NotificationStore {
    pub fn new(api: Arc<dyn NotificationApi>) -> Self {
        let (state, _) = watch::channel(StoreSnapshot::default());
        Self {
            api,
            query: ListQuery::default(),
            state: Arc::new(state),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Filters applied by [`fetch_all`](Self::fetch_all).
    pub fn with_query(mut self, query: ListQuery) -> Self {
        self.query = query;
        self
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.state.borrow().clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.state.borrow().notifications.clone()
    }

    pub fn unread_count(&self) -> u64 {
        self.state.borrow().unread_count
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// Receiver that observes every state change.
    pub fn subscribe_changes(&self) -> watch::Receiver<StoreSnapshot> {
        self.state.subscribe()
    }

    /// Replace the local list with the server's. Prior state is kept on error.
    ///
    /// Overlapping fetches each replace the list as they complete; `loading`
    /// stays set until the last one finishes.
    pub async fn fetch_all(&self) -> Result<usize, ClientError> {
        let _fetch = FetchGuard::begin(self);
        let notifications = self.api.list(&self.query).await?;
        let count = notifications.len();
        self.state.send_modify(|state| state.notifications = notifications);
        debug!(count, "notification list replaced");
        Ok(count)
    }

    /// Replace the local counter with the server's.
    pub async fn fetch_unread_count(&self) -> Result<u64, ClientError> {
        let count = self.api.unread_count().await?;
        self.state.send_if_modified(|state| {
            let changed = state.unread_count != count;
            state.unread_count = count;
            changed
        });
        Ok(count)
    }

    /// [`fetch_all`](Self::fetch_all) then [`fetch_unread_count`](Self::fetch_unread_count).
    pub async fn refresh(&self) -> Result<(), ClientError> {
        self.fetch_all().await?;
        self.fetch_unread_count().await?;
        Ok(())
    }

    /// Mark one notification read. The server deletes it, so it is removed
    /// locally and the counter drops by one. Returns whether a local entry was
    /// removed; repeated calls for the same id change nothing locally.
    pub async fn mark_as_read(&self, id: NotificationId) -> Result<bool, ClientError> {
        self.api.mark_read(id).await?;
        let removed = self.state.send_if_modified(|state| {
            let removed = remove_by_id(&mut state.notifications, id);
            if removed {
                state.unread_count = state.unread_count.saturating_sub(1);
            }
            removed
        });
        debug!(%id, removed, "notification marked read");
        Ok(removed)
    }

    /// Mark everything read. Only entries already flagged read survive
    /// locally and the counter is zeroed. Returns how many entries were removed.
    pub async fn mark_all_as_read(&self) -> Result<usize, ClientError> {
        self.api.mark_all_read().await?;
        let mut removed = 0;
        self.state.send_modify(|state| {
            let before = state.notifications.len();
            state.notifications.retain(|notification| notification.is_read);
            removed = before - state.notifications.len();
            state.unread_count = 0;
        });
        debug!(removed, "all notifications marked read");
        Ok(removed)
    }

    /// Delete one notification. The counter is left as is.
    pub async fn delete_notification(&self, id: NotificationId) -> Result<bool, ClientError> {
        self.api.delete(id).await?;
        let removed = self
            .state
            .send_if_modified(|state| remove_by_id(&mut state.notifications, id));
        debug!(%id, removed, "notification deleted");
        Ok(removed)
    }

    /// Record a live push: newest first, counter up by one.
    pub fn apply_live(&self, notification: Notification) {
        debug!(id = %notification.id, kind = %notification.kind, "live notification");
        self.state.send_modify(|state| {
            state.notifications.insert(0, notification);
            state.unread_count = state.unread_count.saturating_add(1);
        });
    }

    /// Route live `notification` events from `events` into this store.
    #[must_use = "dropping the subscription stops live updates"]
    pub fn listen(&self, events: &EventRegistry) -> Subscription {
        let store = self.clone();
        events.subscribe_typed(EVENT_NOTIFICATION, move |notification: Notification| {
            store.apply_live(notification);
        })
    }

    /// Discard all local state.
    pub fn clear(&self) {
        self.state.send_replace(StoreSnapshot::default());
    }
}

/// Counts one in-flight list fetch, including fetches dropped mid-request.
struct FetchGuard<'a> {
    store: &'a NotificationStore,
}

impl<'a> FetchGuard<'a> {
    fn begin(store: &'a NotificationStore) -> Self {
        store.state.send_modify(|state| {
            store.fetches.fetch_add(1, Ordering::SeqCst);
            state.loading = true;
        });
        Self { store }
    }
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        let fetches = &self.store.fetches;
        self.store.state.send_if_modified(|state| {
            let last = fetches.fetch_sub(1, Ordering::SeqCst) == 1;
            let changed = last && state.loading;
            if last {
                state.loading = false;
            }
            changed
        });
    }
}

fn remove_by_id(notifications: &mut Vec<Notification>, id: NotificationId) -> bool {
    let before = notifications.len();
    notifications.retain(|notification| notification.id != id);
    notifications.len() != before
}
