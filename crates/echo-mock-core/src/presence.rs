//! Presence channels.
//!
//! A presence channel tracks a roster of members on top of broadcast events
//! and whispers. Test code drives the roster as the server would:
//!
//! - [`i_join`](PresenceChannel::i_join) - the local user subscribed; `here`
//!   receives the whole roster
//! - [`user_join`](PresenceChannel::user_join) - another user arrived;
//!   `joining` receives that user
//! - [`user_leave`](PresenceChannel::user_leave) - a user left; `leaving`
//!   receives that user
//!
//! Handlers only receive broadcast projections (see [`Member::broadcast_user`]).
//! Notifications are not available on presence channels.

use crate::channel::{Broadcasting, ChannelCore, ChannelError, ChannelId};
use crate::diagnostics::{Diagnostics, TracingDiagnostics};
use crate::event::HandlerSlot;
use crate::member::{Member, SubscriptionId, SubscriptionIds};
use crate::metrics;
use crate::private::{ClientEvents, Whispering};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Members in join order, with the id allocator that numbered them.
#[derive(Debug)]
struct Roster {
    members: Vec<Member>,
    ids: SubscriptionIds,
}

impl Roster {
    fn admit(&mut self, record: Map<String, Value>) -> &Member {
        let subscription_id = self.ids.next_id();
        self.members.push(Member::new(record, subscription_id));
        &self.members[self.members.len() - 1]
    }

    /// Remove every member holding `subscription_id`.
    ///
    /// Returns the earliest-joined removed member and how many were removed.
    fn remove(&mut self, subscription_id: SubscriptionId) -> Option<(Member, usize)> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.members)
            .into_iter()
            .partition(|m| m.subscription_id() == subscription_id);
        self.members = kept;

        let count = removed.len();
        removed.into_iter().next().map(|member| (member, count))
    }

    fn broadcast_users(&self) -> Vec<Value> {
        self.members.iter().map(Member::broadcast_user).collect()
    }
}

/// A presence channel.
#[derive(Debug)]
pub struct PresenceChannel {
    core: ChannelCore,
    client_events: ClientEvents,
    roster: Mutex<Roster>,
    here: HandlerSlot<Vec<Value>>,
    joining: HandlerSlot<Value>,
    leaving: HandlerSlot<Value>,
}

impl PresenceChannel {
    /// Create a presence channel with random ids, reporting through `tracing`.
    #[must_use]
    pub fn new(name: impl Into<ChannelId>) -> Self {
        Self::with_parts(name, SubscriptionIds::default(), Arc::new(TracingDiagnostics))
    }

    /// Create a presence channel with an id allocator and a diagnostics collaborator.
    #[must_use]
    pub fn with_parts(
        name: impl Into<ChannelId>,
        ids: SubscriptionIds,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Self {
        Self {
            core: ChannelCore::new(name, diagnostics),
            client_events: ClientEvents::new(),
            roster: Mutex::new(Roster {
                members: Vec::new(),
                ids,
            }),
            here: HandlerSlot::new(),
            joining: HandlerSlot::new(),
            leaving: HandlerSlot::new(),
        }
    }

    /// Set the handler receiving the full roster on [`i_join`](Self::i_join).
    pub fn here<F>(&self, handler: F) -> &Self
    where
        F: Fn(Vec<Value>) + Send + Sync + 'static,
    {
        self.here.set(Arc::new(handler));
        self
    }

    /// Set the handler receiving members added by [`user_join`](Self::user_join).
    pub fn joining<F>(&self, handler: F) -> &Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.joining.set(Arc::new(handler));
        self
    }

    /// Set the handler receiving members removed by [`user_leave`](Self::user_leave).
    pub fn leaving<F>(&self, handler: F) -> &Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.leaving.set(Arc::new(handler));
        self
    }

    /// Presence channels do not support notifications.
    ///
    /// Reports [`ChannelError::NotificationsUnsupported`] and leaves the
    /// channel unchanged.
    pub fn notification<F>(&self, _handler: F) -> &Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.core
            .report_error(&ChannelError::NotificationsUnsupported);
        self
    }

    /// Presence channels do not support notifications.
    ///
    /// # Errors
    ///
    /// Always returns [`ChannelError::NotificationsUnsupported`].
    pub fn notify(&self, _notifiable: Value) -> Result<(), ChannelError> {
        self.core.reject(ChannelError::NotificationsUnsupported)
    }

    /// Simulate the local user subscribing.
    ///
    /// Adds `user` to the roster, then hands the `here` handler the
    /// broadcast projection of every member, newest last.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::MissingUser`] for `null` and
    /// [`ChannelError::InvalidMember`] for a non-object user. Nothing is
    /// added in either case.
    pub fn i_join(&self, user: Value) -> Result<(), ChannelError> {
        let record = self.accept(user)?;

        let (subscription_id, users) = {
            let mut roster = self.roster();
            let subscription_id = roster.admit(record).subscription_id();
            (subscription_id, roster.broadcast_users())
        };

        debug!(
            channel = %self.name(),
            subscription_id,
            members = users.len(),
            "Presence: subscribed"
        );
        metrics::record_join(self.name(), users.len());

        match self.here.get() {
            Some(handler) => handler(users),
            None => self.missing_handler("here"),
        }
        Ok(())
    }

    /// Simulate another user joining.
    ///
    /// Adds `user` to the roster and hands the `joining` handler its
    /// broadcast projection. The returned id is the only way to remove the
    /// member later.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::MissingUser`] for `null` and
    /// [`ChannelError::InvalidMember`] for a non-object user. Nothing is
    /// added in either case.
    pub fn user_join(&self, user: Value) -> Result<SubscriptionId, ChannelError> {
        let record = self.accept(user)?;

        let (subscription_id, joined, count) = {
            let mut roster = self.roster();
            let member = roster.admit(record);
            let subscription_id = member.subscription_id();
            let joined = member.broadcast_user();
            (subscription_id, joined, roster.members.len())
        };

        debug!(
            channel = %self.name(),
            subscription_id,
            members = count,
            "Presence: member joined"
        );
        metrics::record_join(self.name(), count);

        match self.joining.get() {
            Some(handler) => handler(joined),
            None => self.missing_handler("joining"),
        }
        Ok(subscription_id)
    }

    /// Simulate a user leaving.
    ///
    /// Removes every member holding `subscription_id` and hands the `leaving`
    /// handler the broadcast projection of the earliest-joined one. Accepts
    /// a bare id or an `Option` so a missing id can be passed through.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::MissingSubscriptionId`] for `None` and
    /// [`ChannelError::MemberNotFound`] if no member holds the id. The
    /// roster is unchanged in either case.
    pub fn user_leave(
        &self,
        subscription_id: impl Into<Option<SubscriptionId>>,
    ) -> Result<(), ChannelError> {
        let Some(subscription_id) = subscription_id.into() else {
            return self.core.reject(ChannelError::MissingSubscriptionId);
        };

        let (removed, count) = {
            let mut roster = self.roster();
            let removed = roster.remove(subscription_id);
            (removed, roster.members.len())
        };

        let Some((member, removed)) = removed else {
            return self
                .core
                .reject(ChannelError::MemberNotFound(subscription_id));
        };

        debug!(
            channel = %self.name(),
            subscription_id,
            removed,
            members = count,
            "Presence: member left"
        );
        metrics::record_leave(self.name(), removed, count);

        match self.leaving.get() {
            Some(handler) => handler(member.broadcast_user()),
            None => self.missing_handler("leaving"),
        }
        Ok(())
    }

    /// Get the stored members, including their subscription ids.
    #[must_use]
    pub fn members(&self) -> Vec<Member> {
        self.roster().members.clone()
    }

    /// Get the broadcast projection of every member, in join order.
    #[must_use]
    pub fn broadcast_members(&self) -> Vec<Value> {
        self.roster().broadcast_users()
    }

    /// Get the number of members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.roster().members.len()
    }

    /// Check if the roster is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roster().members.is_empty()
    }

    /// Check if any member holds `subscription_id`.
    #[must_use]
    pub fn has_member(&self, subscription_id: SubscriptionId) -> bool {
        self.roster()
            .members
            .iter()
            .any(|m| m.subscription_id() == subscription_id)
    }

    fn accept(&self, user: Value) -> Result<Map<String, Value>, ChannelError> {
        match user {
            Value::Object(record) => Ok(record),
            Value::Null => self.core.reject(ChannelError::MissingUser),
            _ => self.core.reject(ChannelError::InvalidMember),
        }
    }

    fn missing_handler(&self, kind: &str) {
        self.core.report(&format!(
            "no {kind} handler registered on {}",
            self.name()
        ));
    }

    fn roster(&self) -> MutexGuard<'_, Roster> {
        self.roster.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Broadcasting for PresenceChannel {
    fn core(&self) -> &ChannelCore {
        &self.core
    }
}

impl Whispering for PresenceChannel {
    fn client_events(&self) -> &ClientEvents {
        &self.client_events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CapturedDiagnostics;
    use crate::metrics::testing::CountingRecorder;
    use serde_json::json;

    type Calls<T> = Arc<Mutex<Vec<T>>>;

    fn calls<T>() -> Calls<T> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn channel_with(ids: SubscriptionIds) -> (PresenceChannel, Arc<CapturedDiagnostics>) {
        let diagnostics = Arc::new(CapturedDiagnostics::new());
        let channel = PresenceChannel::with_parts("presence-room", ids, diagnostics.clone());
        (channel, diagnostics)
    }

    fn sequential_channel() -> (PresenceChannel, Arc<CapturedDiagnostics>) {
        channel_with(SubscriptionIds::sequential())
    }

    #[test]
    fn test_i_join_sends_full_roster() {
        let (channel, diagnostics) = sequential_channel();
        let here = calls();

        let sink = Arc::clone(&here);
        channel.here(move |users| sink.lock().unwrap().push(users));

        channel.i_join(json!({"id": 1})).unwrap();
        channel.i_join(json!({"id": 2})).unwrap();

        assert_eq!(
            *here.lock().unwrap(),
            vec![
                vec![json!({"id": 1})],
                vec![json!({"id": 1}), json!({"id": 2})],
            ]
        );
        assert_eq!(channel.member_count(), 2);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_i_join_includes_members_from_user_join() {
        let (channel, _) = sequential_channel();
        let here = calls();

        let sink = Arc::clone(&here);
        channel.here(move |users| sink.lock().unwrap().push(users));
        channel.joining(|_| {});

        channel.user_join(json!({"id": 1})).unwrap();
        channel.i_join(json!({"id": 2})).unwrap();

        let here = here.lock().unwrap();
        assert_eq!(here.len(), 1);
        assert_eq!(here[0], vec![json!({"id": 1}), json!({"id": 2})]);
    }

    #[test]
    fn test_user_join_returns_id_and_sanitizes() {
        let (channel, _) = channel_with(SubscriptionIds::random(1000));
        let joined = calls();

        let sink = Arc::clone(&joined);
        channel.joining(move |user| sink.lock().unwrap().push(user));

        let id = channel.user_join(json!({"id": 5, "name": "Eve"})).unwrap();
        assert!(id < 1000);

        assert_eq!(*joined.lock().unwrap(), vec![json!({"id": 5, "name": "Eve"})]);

        let members = channel.members();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].subscription_id(), id);
        assert_eq!(
            members[0].to_value(),
            json!({"id": 5, "name": "Eve", "subscriptionId": id})
        );
    }

    #[test]
    fn test_join_then_leave() {
        let (channel, diagnostics) = sequential_channel();
        let joined = calls();
        let left = calls();

        let join_sink = Arc::clone(&joined);
        let leave_sink = Arc::clone(&left);
        channel
            .joining(move |user| join_sink.lock().unwrap().push(user))
            .leaving(move |user| leave_sink.lock().unwrap().push(user));

        let id = channel.user_join(json!({"id": 5})).unwrap();
        channel.user_leave(id).unwrap();

        assert_eq!(*joined.lock().unwrap(), vec![json!({"id": 5})]);
        assert_eq!(*left.lock().unwrap(), vec![json!({"id": 5})]);
        assert!(channel.is_empty());
        assert!(!channel.has_member(id));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_leave_keeps_other_members() {
        let (channel, _) = sequential_channel();
        channel.joining(|_| {}).leaving(|_| {});

        let a = channel.user_join(json!({"id": "a"})).unwrap();
        let b = channel.user_join(json!({"id": "b"})).unwrap();
        let c = channel.user_join(json!({"id": "c"})).unwrap();

        channel.user_leave(b).unwrap();

        assert_eq!(
            channel.broadcast_members(),
            vec![json!({"id": "a"}), json!({"id": "c"})]
        );
        assert!(channel.has_member(a));
        assert!(channel.has_member(c));
    }

    #[test]
    fn test_leave_removes_all_colliding_members() {
        // Random ids from a range of one: every member gets id 0
        let (channel, _) = channel_with(SubscriptionIds::random(1));
        let left = calls();

        let sink = Arc::clone(&left);
        channel
            .joining(|_| {})
            .leaving(move |user| sink.lock().unwrap().push(user));

        let first = channel.user_join(json!({"id": 1})).unwrap();
        let second = channel.user_join(json!({"id": 2})).unwrap();
        assert_eq!(first, second);

        channel.user_leave(first).unwrap();

        assert!(channel.is_empty());
        // One notification, for the earliest-joined match
        assert_eq!(*left.lock().unwrap(), vec![json!({"id": 1})]);
    }

    #[test]
    fn test_leave_unknown_id_is_noop() {
        let (channel, diagnostics) = sequential_channel();
        let left = calls();

        let sink = Arc::clone(&left);
        channel
            .joining(|_| {})
            .leaving(move |user| sink.lock().unwrap().push(user));
        channel.user_join(json!({"id": 1})).unwrap();

        assert_eq!(
            channel.user_leave(99_u32),
            Err(ChannelError::MemberNotFound(99))
        );
        assert_eq!(channel.member_count(), 1);
        assert!(left.lock().unwrap().is_empty());
        assert_eq!(
            diagnostics.messages(),
            vec!["Cannot find user by subscription id 99".to_string()]
        );
    }

    #[test]
    fn test_leave_missing_id_is_noop() {
        let (channel, diagnostics) = sequential_channel();
        channel.joining(|_| {});
        channel.user_join(json!({"id": 1})).unwrap();

        assert_eq!(
            channel.user_leave(None),
            Err(ChannelError::MissingSubscriptionId)
        );
        assert_eq!(channel.member_count(), 1);
        assert!(diagnostics.contains("subscription id is null"));
    }

    #[test]
    fn test_join_null_user_is_noop() {
        let (channel, diagnostics) = sequential_channel();
        let here = calls();
        let joined = calls();

        let here_sink = Arc::clone(&here);
        let join_sink = Arc::clone(&joined);
        channel
            .here(move |users| here_sink.lock().unwrap().push(users))
            .joining(move |user| join_sink.lock().unwrap().push(user));

        assert_eq!(channel.i_join(Value::Null), Err(ChannelError::MissingUser));
        assert_eq!(
            channel.user_join(Value::Null),
            Err(ChannelError::MissingUser)
        );

        assert!(channel.is_empty());
        assert!(here.lock().unwrap().is_empty());
        assert!(joined.lock().unwrap().is_empty());
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.contains("user is null"));
    }

    #[test]
    fn test_join_non_object_user_is_noop() {
        let (channel, diagnostics) = sequential_channel();
        channel.joining(|_| {});

        assert_eq!(
            channel.user_join(json!(42)),
            Err(ChannelError::InvalidMember)
        );
        assert!(channel.is_empty());
        assert!(diagnostics.contains("member must be a JSON object"));
    }

    #[test]
    fn test_missing_lifecycle_handler_still_updates_roster() {
        let (channel, diagnostics) = sequential_channel();

        channel.i_join(json!({"id": 1})).unwrap();
        assert_eq!(channel.member_count(), 1);
        assert!(diagnostics.contains("no here handler registered on presence-room"));

        let id = channel.user_join(json!({"id": 2})).unwrap();
        assert_eq!(channel.member_count(), 2);
        assert!(diagnostics.contains("no joining handler registered on presence-room"));

        channel.user_leave(id).unwrap();
        assert_eq!(channel.broadcast_members(), vec![json!({"id": 1})]);
        assert!(diagnostics.contains("no leaving handler registered on presence-room"));
        assert_eq!(diagnostics.len(), 3);
    }

    #[test]
    fn test_projection_does_not_touch_roster() {
        let (channel, _) = sequential_channel();
        let here = calls();

        let sink = Arc::clone(&here);
        channel.here(move |users| sink.lock().unwrap().push(users));
        channel.i_join(json!({"id": 1, "tags": ["admin"]})).unwrap();

        assert_eq!(
            channel.members()[0].to_value(),
            json!({"id": 1, "tags": ["admin"], "subscriptionId": 0})
        );
        assert_eq!(
            here.lock().unwrap()[0],
            vec![json!({"id": 1, "tags": ["admin"]})]
        );
    }

    #[test]
    fn test_notifications_unsupported() {
        let (channel, diagnostics) = sequential_channel();
        let notified = calls::<Value>();

        let sink = Arc::clone(&notified);
        channel
            .notification(move |n| sink.lock().unwrap().push(n))
            .listen("MessageSent", |_| {});

        assert!(channel.event_exists("MessageSent"));
        assert_eq!(
            channel.notify(json!({})),
            Err(ChannelError::NotificationsUnsupported)
        );
        assert!(notified.lock().unwrap().is_empty());
        assert_eq!(
            diagnostics.messages(),
            vec![
                "Presence channel doesn't support notification".to_string(),
                "Presence channel doesn't support notification".to_string(),
            ]
        );
    }

    #[test]
    fn test_notification_is_counted_as_rejection() {
        let (channel, diagnostics) = sequential_channel();
        let recorder = CountingRecorder::default();

        ::metrics::with_local_recorder(&recorder, || {
            channel.notification(|_| {}).here(|_| {});
            channel.i_join(json!({"id": 1})).unwrap();
        });

        assert_eq!(
            recorder.count(
                crate::metrics::names::REJECTED_CALLS,
                Some(("reason", "notifications_unsupported"))
            ),
            1
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(channel.member_count(), 1);
    }

    #[test]
    fn test_presence_whispers_and_events() {
        let (channel, _) = sequential_channel();
        let whispers = calls();

        let sink = Arc::clone(&whispers);
        channel
            .listen_for_whisper("typing", move |event| sink.lock().unwrap().push(event))
            .listen("MessageSent", |_| {});

        channel.whisper("typing", json!({"id": 1})).unwrap();
        assert_eq!(*whispers.lock().unwrap(), vec![json!({"id": 1})]);
        assert!(channel.event_exists("MessageSent"));
        assert!(channel.whisper("stopped", json!({})).is_err());
    }

    #[test]
    fn test_handler_can_read_roster() {
        let channel = Arc::new(PresenceChannel::with_parts(
            "presence-room",
            SubscriptionIds::sequential(),
            Arc::new(CapturedDiagnostics::new()),
        ));
        let counts = calls();

        let inner = Arc::clone(&channel);
        let sink = Arc::clone(&counts);
        channel.joining(move |_| sink.lock().unwrap().push(inner.member_count()));

        channel.user_join(json!({"id": 1})).unwrap();
        channel.user_join(json!({"id": 2})).unwrap();

        assert_eq!(*counts.lock().unwrap(), vec![1, 2]);
    }
}
