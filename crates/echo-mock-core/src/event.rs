//! Handler registries shared by all channel variants.
//!
//! An [`EventRegistry`] holds at most one handler per event name. Registering
//! a second handler under the same name replaces the first.

use dashmap::DashMap;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// An event name.
pub type EventName = String;

/// A registered callback.
pub type Handler<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Event name to handler mapping.
#[derive(Default)]
pub struct EventRegistry {
    handlers: DashMap<EventName, Handler<Value>>,
}

impl EventRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `event`.
    ///
    /// Returns `true` if a previously registered handler was replaced.
    pub fn insert(&self, event: impl Into<EventName>, handler: Handler<Value>) -> bool {
        self.handlers.insert(event.into(), handler).is_some()
    }

    /// Get the handler registered for `event`.
    ///
    /// The handler is cloned out so it can be invoked without holding the
    /// registry's shard lock.
    #[must_use]
    pub fn get(&self, event: &str) -> Option<Handler<Value>> {
        self.handlers.get(event).map(|entry| Arc::clone(entry.value()))
    }

    /// Check if a handler is registered for `event`.
    #[must_use]
    pub fn contains(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }

    /// Get the number of registered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if no events are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Get all registered event names.
    #[must_use]
    pub fn names(&self) -> Vec<EventName> {
        self.handlers.iter().map(|e| e.key().clone()).collect()
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("events", &self.names())
            .finish()
    }
}

/// A slot holding at most one handler.
pub struct HandlerSlot<T> {
    handler: Mutex<Option<Handler<T>>>,
}

impl<T> HandlerSlot<T> {
    /// Create an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handler: Mutex::new(None),
        }
    }

    /// Store a handler, returning `true` if one was already set.
    pub fn set(&self, handler: Handler<T>) -> bool {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handler)
            .is_some()
    }

    /// Get the stored handler.
    #[must_use]
    pub fn get(&self) -> Option<Handler<T>> {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Check if a handler is stored.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl<T> Default for HandlerSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for HandlerSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSlot")
            .field("set", &self.is_set())
            .finish()
    }
}
