// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Auth change notifications.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A change in authentication state, pushed by the server flow or another
/// tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

type Handler = Arc<dyn Fn(&AuthEvent) + Send + Sync>;

/// Token returned by [`AuthEvents::subscribe`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a Subscription leaves the handler registered"]
pub struct Subscription(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(u64, Handler)>,
}

/// Observer list for [`AuthEvent`]s. Cloning shares the list.
#[derive(Clone, Default)]
pub struct AuthEvents {
    registry: Arc<Mutex<Registry>>,
}

impl AuthEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.handlers.push((id, Arc::new(handler)));
        Subscription(id)
    }

    /// Returns false if the subscription was already removed.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut registry = lock(&self.registry);
        let before = registry.handlers.len();
        registry.handlers.retain(|(id, _)| *id != subscription.0);
        registry.handlers.len() != before
    }

    /// Run every handler, in registration order, before returning.
    ///
    /// Handlers are called outside the lock and may subscribe or unsubscribe;
    /// such changes apply from the next event.
    pub fn emit(&self, event: &AuthEvent) {
        let handlers: Vec<Handler> = lock(&self.registry)
            .handlers
            .iter()
            .map(|(_, h)| h.clone())
            .collect();
        tracing::debug!(?event, subscribers = handlers.len(), "Auth event");
        for handler in handlers {
            handler(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).handlers.len()
    }
}

impl std::fmt::Debug for AuthEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthEvents")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
