// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Event hooks
//!
//! Observability collaborators plug into the system in two ways:
//!
//! - `EventHooks`: up to four callbacks invoked synchronously on the dispatch path. A slow hook
//!   slows the operation that fired it, and a panicking hook unwinds into the caller. Hooks
//!   must not block.
//! - The `SystemEvent` stream: the same events published on a bounded broadcast channel. Consume
//!   it with a `Sink` to keep observability work off the dispatch path. Slow consumers lag and
//!   lose events instead of slowing dispatch.
//!

use crate::Error;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use std::{fmt, sync::Arc};

/// Hook called with an actor identity.
pub type ActorHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Hook called with an actor identity and the failure.
pub type FailureHook = Arc<dyn Fn(&str, &Error) + Send + Sync>;

/// Hook called with sender, target and message type of a delivered message.
pub type MessageHook = Arc<dyn Fn(&str, &str, &str) + Send + Sync>;

/// Optional callbacks invoked by the actor system.
#[derive(Clone, Default)]
pub struct EventHooks {
    /// Called after an actor is spawned and registered.
    pub on_actor_started: Option<ActorHook>,
    /// Called after an actor is stopped and removed.
    pub on_actor_stopped: Option<ActorHook>,
    /// Called when an actor fails to start or stop, or its handler fails.
    pub on_actor_failed: Option<FailureHook>,
    /// Called after every successful delivery.
    pub on_message_sent: Option<MessageHook>,
}

impl EventHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_actor_started<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_actor_started = Some(Arc::new(hook));
        self
    }

    pub fn on_actor_stopped<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_actor_stopped = Some(Arc::new(hook));
        self
    }

    pub fn on_actor_failed<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &Error) + Send + Sync + 'static,
    {
        self.on_actor_failed = Some(Arc::new(hook));
        self
    }

    pub fn on_message_sent<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &str, &str) + Send + Sync + 'static,
    {
        self.on_message_sent = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for EventHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHooks")
            .field("on_actor_started", &self.on_actor_started.is_some())
            .field("on_actor_stopped", &self.on_actor_stopped.is_some())
            .field("on_actor_failed", &self.on_actor_failed.is_some())
            .field("on_message_sent", &self.on_message_sent.is_some())
            .finish()
    }
}

/// System event.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SystemEvent {
    /// An actor was spawned.
    ActorStarted { id: String, actor_type: String },
    /// An actor was stopped and removed.
    ActorStopped { id: String },
    /// An actor failed.
    ActorFailed { id: String, error: Error },
    /// A message was delivered to an actor mailbox.
    MessageSent {
        from: String,
        to: String,
        message_type: String,
    },
}

/// Fans system events out to the hooks and the broadcast channel.
#[derive(Clone)]
pub(crate) struct EventBus {
    hooks: Arc<RwLock<EventHooks>>,
    events: broadcast::Sender<SystemEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            hooks: Arc::new(RwLock::new(EventHooks::default())),
            events,
        }
    }

    pub(crate) fn set_hooks(&self, hooks: EventHooks) {
        debug!("Replacing system event hooks: {:?}", &hooks);
        *self.hooks.write() = hooks;
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.events.subscribe()
    }

    // Each hook is cloned out of the lock before it runs, so a hook may call back into the
    // system (including `set_event_handlers`) without deadlocking.

    pub(crate) fn actor_started(&self, id: &str, actor_type: &str) {
        let hook = self.hooks.read().on_actor_started.clone();
        if let Some(hook) = hook {
            hook(id);
        }
        self.publish(SystemEvent::ActorStarted {
            id: id.to_owned(),
            actor_type: actor_type.to_owned(),
        });
    }

    pub(crate) fn actor_stopped(&self, id: &str) {
        let hook = self.hooks.read().on_actor_stopped.clone();
        if let Some(hook) = hook {
            hook(id);
        }
        self.publish(SystemEvent::ActorStopped { id: id.to_owned() });
    }

    pub(crate) fn actor_failed(&self, id: &str, error: &Error) {
        let hook = self.hooks.read().on_actor_failed.clone();
        if let Some(hook) = hook {
            hook(id, error);
        }
        self.publish(SystemEvent::ActorFailed {
            id: id.to_owned(),
            error: error.clone(),
        });
    }

    pub(crate) fn message_sent(&self, from: &str, to: &str, message_type: &str) {
        let hook = self.hooks.read().on_message_sent.clone();
        if let Some(hook) = hook {
            hook(from, to, message_type);
        }
        self.publish(SystemEvent::MessageSent {
            from: from.to_owned(),
            to: to.to_owned(),
            message_type: message_type.to_owned(),
        });
    }

    fn publish(&self, event: SystemEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_hooks_and_events() {
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let calls = Arc::new(AtomicUsize::new(0));

        let started = calls.clone();
        let sent = calls.clone();
        bus.set_hooks(
            EventHooks::new()
                .on_actor_started(move |_| {
                    started.fetch_add(1, Ordering::SeqCst);
                })
                .on_message_sent(move |from, to, message_type| {
                    assert_eq!((from, to, message_type), ("api", "d1", "ping"));
                    sent.fetch_add(10, Ordering::SeqCst);
                }),
        );

        bus.actor_started("d1", "driver");
        bus.message_sent("api", "d1", "ping");
        // No hook set: only the event is published.
        bus.actor_stopped("d1");

        assert_eq!(calls.load(Ordering::SeqCst), 11);
        assert_eq!(
            events.try_recv().unwrap(),
            SystemEvent::ActorStarted {
                id: "d1".to_owned(),
                actor_type: "driver".to_owned()
            }
        );
        assert!(matches!(
            events.try_recv().unwrap(),
            SystemEvent::MessageSent { .. }
        ));
        assert_eq!(
            events.try_recv().unwrap(),
            SystemEvent::ActorStopped { id: "d1".to_owned() }
        );
    }

    #[test]
    fn test_hook_can_replace_hooks() {
        let bus = EventBus::new(1);
        let inner = bus.clone();
        bus.set_hooks(EventHooks::new().on_actor_stopped(move |_| {
            inner.set_hooks(EventHooks::new());
        }));
        bus.actor_stopped("a");
        assert!(bus.hooks.read().on_actor_stopped.is_none());
    }
}
