//! Channel registry.
//!
//! The registry is the entry point test code talks to. It maps bare channel
//! names to fully-qualified ones, lazily creates the channel variant the
//! name calls for, and hands out shared handles. A name's variant is fixed
//! the first time it is resolved.

use crate::channel::{Broadcasting, Channel, ChannelCore, ChannelError, ChannelId, ChannelKind};
use crate::config::RegistryConfig;
use crate::diagnostics::{Diagnostics, TracingDiagnostics};
use crate::member::SubscriptionIds;
use crate::metrics;
use crate::presence::PresenceChannel;
use crate::private::PrivateChannel;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// A shared handle to a channel of any variant.
#[derive(Debug, Clone)]
pub enum ChannelHandle {
    /// A plain channel.
    Public(Arc<Channel>),
    /// A private channel.
    Private(Arc<PrivateChannel>),
    /// A presence channel.
    Presence(Arc<PresenceChannel>),
}

impl ChannelHandle {
    /// Get the channel variant.
    #[must_use]
    pub fn kind(&self) -> ChannelKind {
        match self {
            Self::Public(_) => ChannelKind::Public,
            Self::Private(_) => ChannelKind::Private,
            Self::Presence(_) => ChannelKind::Presence,
        }
    }

    /// Get the plain channel, if this is one.
    #[must_use]
    pub fn as_public(&self) -> Option<&Arc<Channel>> {
        match self {
            Self::Public(channel) => Some(channel),
            _ => None,
        }
    }

    /// Get the private channel, if this is one.
    #[must_use]
    pub fn as_private(&self) -> Option<&Arc<PrivateChannel>> {
        match self {
            Self::Private(channel) => Some(channel),
            _ => None,
        }
    }

    /// Get the presence channel, if this is one.
    #[must_use]
    pub fn as_presence(&self) -> Option<&Arc<PresenceChannel>> {
        match self {
            Self::Presence(channel) => Some(channel),
            _ => None,
        }
    }

    /// Convert into the plain channel, if this is one.
    #[must_use]
    pub fn into_public(self) -> Option<Arc<Channel>> {
        match self {
            Self::Public(channel) => Some(channel),
            _ => None,
        }
    }

    /// Convert into the private channel, if this is one.
    #[must_use]
    pub fn into_private(self) -> Option<Arc<PrivateChannel>> {
        match self {
            Self::Private(channel) => Some(channel),
            _ => None,
        }
    }

    /// Convert into the presence channel, if this is one.
    #[must_use]
    pub fn into_presence(self) -> Option<Arc<PresenceChannel>> {
        match self {
            Self::Presence(channel) => Some(channel),
            _ => None,
        }
    }

    /// Check if both handles point at the same channel instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Public(a), Self::Public(b)) => Arc::ptr_eq(a, b),
            (Self::Private(a), Self::Private(b)) => Arc::ptr_eq(a, b),
            (Self::Presence(a), Self::Presence(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Broadcasting for ChannelHandle {
    fn core(&self) -> &ChannelCore {
        match self {
            Self::Public(channel) => channel.core(),
            Self::Private(channel) => channel.core(),
            Self::Presence(channel) => channel.core(),
        }
    }
}

/// The channel registry.
pub struct Registry {
    /// Channels indexed by fully-qualified name.
    channels: DashMap<ChannelId, ChannelHandle>,
    /// Configuration.
    config: RegistryConfig,
    /// Shared with every channel the registry creates.
    diagnostics: Arc<dyn Diagnostics>,
}

impl Registry {
    /// Create a new registry with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        Self::with_diagnostics(config, Arc::new(TracingDiagnostics))
    }

    /// Create a new registry reporting to a diagnostics collaborator.
    #[must_use]
    pub fn with_diagnostics(config: RegistryConfig, diagnostics: Arc<dyn Diagnostics>) -> Self {
        info!("Creating registry with config: {:?}", config);
        metrics::describe_metrics();
        Self {
            channels: DashMap::new(),
            config,
            diagnostics,
        }
    }

    /// Get the registry configuration.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Get or create the channel named `name`.
    ///
    /// The name is used as-is, so `channel("presence-room")` resolves to the
    /// same presence channel as `join("room")`.
    pub fn channel(&self, name: &str) -> ChannelHandle {
        self.resolve(name)
    }

    /// Get or create the private channel `private-{name}`.
    pub fn private(&self, name: &str) -> Arc<PrivateChannel> {
        let full_name = ChannelKind::Private.full_name(name);
        match self.resolve(&full_name) {
            ChannelHandle::Private(channel) => channel,
            other => unreachable!("`{full_name}` resolved to a {} channel", other.kind()),
        }
    }

    /// Get or create the presence channel `presence-{name}`.
    pub fn join(&self, name: &str) -> Arc<PresenceChannel> {
        let full_name = ChannelKind::Presence.full_name(name);
        match self.resolve(&full_name) {
            ChannelHandle::Presence(channel) => channel,
            other => unreachable!("`{full_name}` resolved to a {} channel", other.kind()),
        }
    }

    /// Get or create a channel by fully-qualified name.
    pub fn resolve(&self, full_name: &str) -> ChannelHandle {
        if let Some(entry) = self.channels.get(full_name) {
            return entry.value().clone();
        }

        self.channels
            .entry(full_name.to_string())
            .or_insert_with(|| self.create(full_name))
            .value()
            .clone()
    }

    fn create(&self, full_name: &str) -> ChannelHandle {
        let kind = ChannelKind::from_name(full_name);
        debug!(channel = %full_name, kind = %kind, "Creating new channel");
        metrics::record_channel_created(kind);

        let diagnostics = Arc::clone(&self.diagnostics);
        match kind {
            ChannelKind::Public => {
                ChannelHandle::Public(Arc::new(Channel::with_diagnostics(full_name, diagnostics)))
            }
            ChannelKind::Private => ChannelHandle::Private(Arc::new(
                PrivateChannel::with_diagnostics(full_name, diagnostics),
            )),
            ChannelKind::Presence => ChannelHandle::Presence(Arc::new(PresenceChannel::with_parts(
                full_name,
                SubscriptionIds::from_config(&self.config.subscription_ids),
                diagnostics,
            ))),
        }
    }

    /// Look up the channel named `name` without creating it.
    pub fn get_channel(&self, name: &str) -> Option<ChannelHandle> {
        self.get_channel_by_full_name(name)
    }

    /// Look up the private channel `private-{name}` without creating it.
    pub fn get_private_channel(&self, name: &str) -> Option<Arc<PrivateChannel>> {
        self.get_channel_by_full_name(&ChannelKind::Private.full_name(name))
            .and_then(ChannelHandle::into_private)
    }

    /// Look up the presence channel `presence-{name}` without creating it.
    pub fn get_presence_channel(&self, name: &str) -> Option<Arc<PresenceChannel>> {
        self.get_channel_by_full_name(&ChannelKind::Presence.full_name(name))
            .and_then(ChannelHandle::into_presence)
    }

    /// Look up a channel by fully-qualified name without creating it.
    ///
    /// Reports a diagnostic if the channel does not exist.
    pub fn get_channel_by_full_name(&self, full_name: &str) -> Option<ChannelHandle> {
        let found = self.channels.get(full_name).map(|e| e.value().clone());
        if found.is_none() {
            let error = ChannelError::ChannelNotFound(full_name.to_string());
            metrics::record_rejection(&error);
            self.diagnostics.warn(&error.to_string());
        }
        found
    }

    /// Check if the channel named `name` exists.
    #[must_use]
    pub fn channel_exists(&self, name: &str) -> bool {
        self.channel_exists_by_full_name(name)
    }

    /// Check if the private channel `private-{name}` exists.
    #[must_use]
    pub fn private_channel_exists(&self, name: &str) -> bool {
        self.channel_exists_by_full_name(&ChannelKind::Private.full_name(name))
    }

    /// Check if the presence channel `presence-{name}` exists.
    #[must_use]
    pub fn presence_channel_exists(&self, name: &str) -> bool {
        self.channel_exists_by_full_name(&ChannelKind::Presence.full_name(name))
    }

    /// Check if a channel exists by fully-qualified name.
    #[must_use]
    pub fn channel_exists_by_full_name(&self, full_name: &str) -> bool {
        self.channels.contains_key(full_name)
    }

    /// Get all fully-qualified channel names.
    #[must_use]
    pub fn channel_names(&self) -> Vec<ChannelId> {
        self.channels.iter().map(|e| e.key().clone()).collect()
    }

    /// Get the number of channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Check if no channel was created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            channel_count: self.channels.len(),
            ..RegistryStats::default()
        };
        for entry in self.channels.iter() {
            match entry.value() {
                ChannelHandle::Public(_) => stats.public += 1,
                ChannelHandle::Private(_) => stats.private += 1,
                ChannelHandle::Presence(channel) => {
                    stats.presence += 1;
                    stats.presence_members += channel.member_count();
                }
            }
        }
        stats
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("channels", &self.channel_names())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of channels.
    pub channel_count: usize,
    /// Number of plain channels.
    pub public: usize,
    /// Number of private channels.
    pub private: usize,
    /// Number of presence channels.
    pub presence: usize,
    /// Members across all presence rosters.
    pub presence_members: usize,
}
