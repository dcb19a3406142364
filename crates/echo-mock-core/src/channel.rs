//! Channel abstraction for the mock.
//!
//! A channel is a named event registry. Application code registers
//! listeners on it, and test code plays the broadcaster by firing events
//! into it. Capabilities are layered by composition: every variant carries a
//! [`ChannelCore`] and exposes it through [`Broadcasting`]; private and
//! presence channels add whispers on top (see [`crate::private`]).

use crate::diagnostics::{Diagnostics, TracingDiagnostics};
use crate::event::{EventName, EventRegistry};
use crate::member::SubscriptionId;
use crate::metrics;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Prefix of private channel names.
pub const PRIVATE_PREFIX: &str = "private-";

/// Prefix of presence channel names.
pub const PRESENCE_PREFIX: &str = "presence-";

/// A fully-qualified channel name.
pub type ChannelId = String;

/// The variant of a channel, fixed by its fully-qualified name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Plain broadcast channel.
    Public,
    /// Channel with whispers and notifications.
    Private,
    /// Channel with whispers and a member roster.
    Presence,
}

impl ChannelKind {
    /// Resolve the variant for a fully-qualified name.
    ///
    /// `presence-` takes precedence over `private-`; anything else is public.
    #[must_use]
    pub fn from_name(full_name: &str) -> Self {
        if full_name.starts_with(PRESENCE_PREFIX) {
            Self::Presence
        } else if full_name.starts_with(PRIVATE_PREFIX) {
            Self::Private
        } else {
            Self::Public
        }
    }

    /// Get the name prefix for this variant.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Public => "",
            Self::Private => PRIVATE_PREFIX,
            Self::Presence => PRESENCE_PREFIX,
        }
    }

    /// Build the fully-qualified name for a bare channel name.
    #[must_use]
    pub fn full_name(self, name: &str) -> ChannelId {
        format!("{}{}", self.prefix(), name)
    }

    /// Get a static label for this variant.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Presence => "presence",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel errors.
///
/// The display text of each variant is also the diagnostic reported when
/// the call is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// No handler registered for the broadcast event.
    #[error("Channel didn't listen to event: {0}")]
    UnknownEvent(EventName),

    /// No handler registered for the whispered client event.
    #[error("Channel didn't listen to client event: {0}")]
    UnknownClientEvent(EventName),

    /// A join was attempted with a null user.
    #[error("user is null")]
    MissingUser,

    /// A join was attempted with a user that is not a JSON object.
    #[error("member must be a JSON object")]
    InvalidMember,

    /// A leave was attempted without a subscription id.
    #[error("subscription id is null")]
    MissingSubscriptionId,

    /// No member holds the subscription id.
    #[error("Cannot find user by subscription id {0}")]
    MemberNotFound(SubscriptionId),

    /// Notifications were used on a presence channel.
    #[error("Presence channel doesn't support notification")]
    NotificationsUnsupported,

    /// `notify` was called before a notification handler was set.
    #[error("notification handler is not set")]
    NoNotificationHandler,

    /// A registry lookup found no channel under the name.
    #[error("Echo doesn't have channel: {0}")]
    ChannelNotFound(ChannelId),
}

impl ChannelError {
    /// Get a static label for metrics.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::UnknownEvent(_) => "unknown_event",
            Self::UnknownClientEvent(_) => "unknown_client_event",
            Self::MissingUser => "missing_user",
            Self::InvalidMember => "invalid_member",
            Self::MissingSubscriptionId => "missing_subscription_id",
            Self::MemberNotFound(_) => "member_not_found",
            Self::NotificationsUnsupported => "notifications_unsupported",
            Self::NoNotificationHandler => "no_notification_handler",
            Self::ChannelNotFound(_) => "channel_not_found",
        }
    }
}

/// State shared by every channel variant.
pub struct ChannelCore {
    /// Fully-qualified channel name.
    name: ChannelId,
    /// Broadcast event listeners.
    events: EventRegistry,
    /// Where rejected calls are reported.
    diagnostics: Arc<dyn Diagnostics>,
}

impl ChannelCore {
    pub(crate) fn new(name: impl Into<ChannelId>, diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self {
            name: name.into(),
            events: EventRegistry::new(),
            diagnostics,
        }
    }

    /// Get the channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the broadcast event listeners.
    #[must_use]
    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    /// Report a rejected call and hand the error back.
    pub(crate) fn reject<T>(&self, error: ChannelError) -> Result<T, ChannelError> {
        self.report_error(&error);
        Err(error)
    }

    /// Record and report a rejected call without failing it.
    pub(crate) fn report_error(&self, error: &ChannelError) {
        metrics::record_rejection(error);
        self.diagnostics.warn(&error.to_string());
    }

    /// Report a diagnostic that does not reject the call.
    pub(crate) fn report(&self, message: &str) {
        self.diagnostics.warn(message);
    }
}

impl fmt::Debug for ChannelCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelCore")
            .field("name", &self.name)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

/// Broadcast event capability, shared by every channel variant.
pub trait Broadcasting {
    /// Get the shared channel state.
    fn core(&self) -> &ChannelCore;

    /// Get the fully-qualified channel name.
    fn name(&self) -> &str {
        self.core().name()
    }

    /// Listen for a broadcast event.
    ///
    /// A later registration under the same name replaces this one.
    fn listen<F>(&self, event: impl Into<EventName>, handler: F) -> &Self
    where
        F: Fn(Value) + Send + Sync + 'static,
        Self: Sized,
    {
        let event = event.into();
        let replaced = self.core().events().insert(event.clone(), Arc::new(handler));
        debug!(channel = %self.name(), event = %event, replaced, "Listening for event");
        self
    }

    /// Deliver `payload` to the handler registered for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::UnknownEvent`] if nothing listens to `event`.
    fn broadcast(&self, event: &str, payload: Value) -> Result<(), ChannelError> {
        let Some(handler) = self.core().events().get(event) else {
            return self
                .core()
                .reject(ChannelError::UnknownEvent(event.to_string()));
        };
        trace!(channel = %self.name(), event = %event, "Broadcasting event");
        metrics::record_dispatch("event");
        handler(payload);
        Ok(())
    }

    /// Check if a handler is registered for `event`.
    fn event_exists(&self, event: &str) -> bool {
        self.core().events().contains(event)
    }
}

/// A plain broadcast channel.
#[derive(Debug)]
pub struct Channel {
    core: ChannelCore,
}

impl Channel {
    /// Create a channel reporting through `tracing`.
    #[must_use]
    pub fn new(name: impl Into<ChannelId>) -> Self {
        Self::with_diagnostics(name, Arc::new(TracingDiagnostics))
    }

    /// Create a channel with a diagnostics collaborator.
    #[must_use]
    pub fn with_diagnostics(name: impl Into<ChannelId>, diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self {
            core: ChannelCore::new(name, diagnostics),
        }
    }
}

impl Broadcasting for Channel {
    fn core(&self) -> &ChannelCore {
        &self.core
    }
}
