//! Observable credential state.
//!
//! The store is the single authority for whether the client considers itself
//! logged in. Listeners are called synchronously on every change, outside the
//! internal lock, so a listener may read the store again.

use crate::payload::UserId;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};
use tracing::debug;

/// A confirmed login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub user_id: UserId,
}

/// What the client currently believes about the session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CredentialState {
    /// Bootstrap has not decided yet.
    #[default]
    Unknown,
    Anonymous,
    Authenticated(Session),
}

impl CredentialState {
    pub fn authenticated(user_id: UserId) -> Self {
        CredentialState::Authenticated(Session { user_id })
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            CredentialState::Authenticated(session) => Some(&session.user_id),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, CredentialState::Authenticated(_))
    }
}

type Listener = Arc<dyn Fn(&CredentialState) + Send + Sync>;

struct Inner {
    state: CredentialState,
    listeners: Vec<(u64, Listener)>,
    next_id: u64,
}

/// Shared, observable [`CredentialState`].
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<Mutex<Inner>>,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: CredentialState::Unknown,
                listeners: Vec::new(),
                next_id: 0,
            })),
        }
    }

    pub fn get(&self) -> CredentialState {
        self.inner.lock().state.clone()
    }

    /// Replace the state. Returns true and notifies listeners only when
    /// the value actually changed.
    pub fn set(&self, state: CredentialState) -> bool {
        let listeners: Vec<Listener> = {
            let mut inner = self.inner.lock();
            if inner.state == state {
                return false;
            }
            inner.state = state.clone();
            inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };

        debug!(
            authenticated = state.is_authenticated(),
            listeners = listeners.len(),
            "Credential state changed"
        );
        for listener in listeners {
            listener(&state);
        }
        true
    }

    /// Register `listener` for future changes. It stays registered until the
    /// returned [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&CredentialState) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push((id, Arc::new(listener)));
        Subscription {
            store: Some(Arc::downgrade(&self.inner)),
            id,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }
}

/// Handle for a registered listener.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    store: Option<Weak<Mutex<Inner>>>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    /// Keep the listener registered for the lifetime of the store.
    pub fn detach(mut self) {
        self.store = None;
    }

    fn remove(&mut self) {
        if let Some(inner) = self.store.take().and_then(|weak| weak.upgrade()) {
            inner.lock().listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_set_notifies_only_on_change() {
        let store = CredentialStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _subscription = store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(store.set(CredentialState::Anonymous));
        assert!(!store.set(CredentialState::Anonymous));
        assert!(store.set(CredentialState::authenticated(UserId::from("1"))));
        assert!(!store.set(CredentialState::authenticated(UserId::from("1"))));
        assert!(store.set(CredentialState::authenticated(UserId::from("2"))));

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_listener_sees_new_state_and_can_read_store() {
        let store = CredentialStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let reader = store.clone();
        let _subscription = store.subscribe(move |state| {
            assert_eq!(&reader.get(), state);
            seen_clone.lock().push(state.user_id().cloned());
        });

        store.set(CredentialState::authenticated(UserId::from("5")));
        store.set(CredentialState::Anonymous);

        assert_eq!(*seen.lock(), vec![Some(UserId::from("5")), None]);
    }

    #[test]
    fn test_drop_and_unsubscribe_remove_listener() {
        let store = CredentialStore::new();
        let first = store.subscribe(|_| {});
        let second = store.subscribe(|_| {});
        assert_eq!(store.listener_count(), 2);

        drop(first);
        assert_eq!(store.listener_count(), 1);

        second.unsubscribe();
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn test_detach_keeps_listener() {
        let store = CredentialStore::new();
        store.subscribe(|_| {}).detach();
        assert_eq!(store.listener_count(), 1);
    }

    #[test]
    fn test_subscription_outliving_store_is_harmless() {
        let store = CredentialStore::new();
        let subscription = store.subscribe(|_| {});
        drop(store);
        drop(subscription);
    }

    #[test]
    fn test_state_helpers() {
        let state = CredentialState::authenticated(UserId::from("8"));
        assert!(state.is_authenticated());
        assert_eq!(state.user_id().map(UserId::as_str), Some("8"));
        assert!(!CredentialState::Unknown.is_authenticated());
        assert_eq!(CredentialState::default(), CredentialState::Unknown);
    }
}
