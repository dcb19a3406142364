//! Private channels.
//!
//! Private channels add client-originated whisper events and a single
//! notification callback on top of broadcast events. Whispers are exposed
//! through the [`Whispering`] capability so presence channels can share them
//! without inheriting notifications.

use crate::channel::{Broadcasting, ChannelCore, ChannelError, ChannelId};
use crate::diagnostics::{Diagnostics, TracingDiagnostics};
use crate::event::{EventName, EventRegistry, HandlerSlot};
use crate::metrics;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

/// Prefix under which whisper handlers are stored.
pub const CLIENT_EVENT_PREFIX: &str = "client-";

/// Build the registry key for a whispered event.
#[must_use]
pub fn client_event_key(event: &str) -> EventName {
    format!("{CLIENT_EVENT_PREFIX}{event}")
}

/// Whisper handlers, keyed by [`client_event_key`].
#[derive(Debug, Default)]
pub struct ClientEvents {
    events: EventRegistry,
}

impl ClientEvents {
    /// Create an empty whisper registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the underlying registry.
    #[must_use]
    pub fn registry(&self) -> &EventRegistry {
        &self.events
    }
}

/// Client whisper capability.
pub trait Whispering: Broadcasting {
    /// Get the whisper handlers.
    fn client_events(&self) -> &ClientEvents;

    /// Listen for a whispered client event.
    fn listen_for_whisper<F>(&self, event: &str, handler: F) -> &Self
    where
        F: Fn(Value) + Send + Sync + 'static,
        Self: Sized,
    {
        let key = client_event_key(event);
        let replaced = self.client_events().registry().insert(key, Arc::new(handler));
        debug!(channel = %self.name(), event = %event, replaced, "Listening for whisper");
        self
    }

    /// Deliver a whispered `payload` to the handler registered for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::UnknownClientEvent`] if nothing listens for
    /// the whisper.
    fn whisper(&self, event: &str, payload: Value) -> Result<(), ChannelError> {
        let Some(handler) = self.client_events().registry().get(&client_event_key(event)) else {
            return self
                .core()
                .reject(ChannelError::UnknownClientEvent(event.to_string()));
        };
        trace!(channel = %self.name(), event = %event, "Whispering");
        metrics::record_dispatch("whisper");
        handler(payload);
        Ok(())
    }

    /// Check if a handler is registered for the whispered `event`.
    fn whisper_exists(&self, event: &str) -> bool {
        self.client_events()
            .registry()
            .contains(&client_event_key(event))
    }
}

/// A private channel.
#[derive(Debug)]
pub struct PrivateChannel {
    core: ChannelCore,
    client_events: ClientEvents,
    notification: HandlerSlot<Value>,
}

impl PrivateChannel {
    /// Create a private channel reporting through `tracing`.
    #[must_use]
    pub fn new(name: impl Into<ChannelId>) -> Self {
        Self::with_diagnostics(name, Arc::new(TracingDiagnostics))
    }

    /// Create a private channel with a diagnostics collaborator.
    #[must_use]
    pub fn with_diagnostics(name: impl Into<ChannelId>, diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self {
            core: ChannelCore::new(name, diagnostics),
            client_events: ClientEvents::new(),
            notification: HandlerSlot::new(),
        }
    }

    /// Set the notification handler, replacing any previous one.
    pub fn notification<F>(&self, handler: F) -> &Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let replaced = self.notification.set(Arc::new(handler));
        debug!(channel = %self.name(), replaced, "Listening for notifications");
        self
    }

    /// Deliver a notification to the notification handler.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::NoNotificationHandler`] if
    /// [`notification`](Self::notification) was never called.
    pub fn notify(&self, notifiable: Value) -> Result<(), ChannelError> {
        let Some(handler) = self.notification.get() else {
            return self.core.reject(ChannelError::NoNotificationHandler);
        };
        trace!(channel = %self.name(), "Notifying");
        metrics::record_dispatch("notification");
        handler(notifiable);
        Ok(())
    }

    /// Check if a notification handler is set.
    #[must_use]
    pub fn has_notification_handler(&self) -> bool {
        self.notification.is_set()
    }
}

impl Broadcasting for PrivateChannel {
    fn core(&self) -> &ChannelCore {
        &self.core
    }
}

impl Whispering for PrivateChannel {
    fn client_events(&self) -> &ClientEvents {
        &self.client_events
    }
}
