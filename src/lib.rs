// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! In-process actor runtime.
//! Re-exports the `actor` crate: actors with bounded mailboxes, the actor system registry,
//! system metrics and event hooks.

pub use actor::{
    Actor, ActorHook, ActorMetrics, ActorRef, ActorState, ActorSystem,
    BoxedHandler, Error as ActorError, EventHooks, FailureHook,
    FailureObserver, FnHandler, Handler, MailboxReceiver, Message,
    MessageHook, Sink, Subscriber, SupervisionStrategy, SystemConfig,
    SystemEvent, SystemMetrics, handler_fn,
};
