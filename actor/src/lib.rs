// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor runtime
//!
//! An in-process actor runtime. Independent actors, each with its own bounded mailbox, process
//! messages one at a time on their own tokio task. A central [`ActorSystem`] spawns, addresses,
//! broadcasts to, monitors and stops them.
//!
//! ## Overview
//!
//! - **Actors**: an [`Actor`] owns one identity, one type tag, a bounded FIFO mailbox and a
//!   [`Handler`]. Its processing loop handles one [`Message`] at a time, so the handler never runs
//!   concurrently with itself for the same actor. A failing or panicking handler is counted in the
//!   actor metrics and the loop moves on to the next message.
//! - **Delivery**: sending is a non-blocking enqueue. A full mailbox rejects the message with
//!   [`Error::MailboxFull`] instead of waiting. Delivery success says nothing about the handler
//!   outcome.
//! - **Registry**: the [`ActorSystem`] keeps every spawned actor under its unique identity and
//!   addresses it by identity ([`ActorSystem::send_message`]) or by type
//!   ([`ActorSystem::broadcast_message`]).
//! - **Metrics**: every actor keeps [`ActorMetrics`]. The system keeps [`SystemMetrics`] and a
//!   background task refreshes throughput and latency every [`SystemConfig::metrics_interval`].
//! - **Observability**: [`EventHooks`] are called synchronously on spawn, stop, failure and
//!   delivery. The same occurrences are published as [`SystemEvent`]s, which a [`Sink`] forwards
//!   to a [`Subscriber`] on its own task.
//!
//! ## Cancellation
//!
//! The runtime is driven by `tokio_util` cancellation tokens. [`ActorSystem::start`] derives a
//! child token from the caller's token; every actor derives its own child token from the
//! system's. Cancelling the caller's token stops every processing loop; messages still queued are
//! discarded.
//!
//! ## Example
//!
//! ```ignore
//! use actor::{ActorSystem, Error, Message, SupervisionStrategy, handler_fn};
//! use tokio_util::sync::CancellationToken;
//!
//! let system = ActorSystem::new("drivers");
//! let token = CancellationToken::new();
//! system.start(&token).await?;
//!
//! system
//!     .spawn_actor(
//!         "driver",
//!         "driver-1",
//!         64,
//!         handler_fn(|message| {
//!             tracing::info!("{} from {}", message.message_type(), message.sender());
//!             Ok(())
//!         }),
//!         SupervisionStrategy::Restart,
//!     )
//!     .await?;
//!
//! system
//!     .send_message("driver-1", Message::encode("speed", "api", &42u32)?)
//!     .await?;
//! system
//!     .broadcast_message("driver", Message::empty("halt", "api"))
//!     .await?;
//!
//! system.stop().await?;
//! ```
//!

mod actor;
mod config;
mod error;
mod handler;
mod hooks;
mod message;
mod metrics;
mod runner;
mod sink;
mod supervision;
mod system;

//
// Actors
//

/// A single actor: identity, type tag, bounded mailbox, lifecycle state and handler.
pub use actor::Actor;

/// Point-in-time snapshot of the metrics of one actor.
pub use actor::ActorMetrics;

/// Lifecycle state of an actor: `Idle`, `Processing`, `Stopped` or `Error`.
pub use actor::ActorState;

/// Callback the runner invokes after every handler failure.
pub use actor::FailureObserver;

/// Message processing behavior supplied when an actor is created.
///
/// Implemented for every async closure `Fn(Message) -> impl Future<Output = Result<(), Error>>`.
/// Wrap synchronous closures with [`handler_fn`].
pub use handler::Handler;

/// Shared handler, sync-closure adapter and mailbox receiver type.
pub use handler::{BoxedHandler, FnHandler, MailboxReceiver, handler_fn};

/// Envelope carried through the runtime.
pub use message::Message;

//
// Error Handling
//

/// Error type for every runtime operation and for handler results.
pub use error::Error;

//
// System
//

/// Registry and dispatcher of actors.
pub use system::ActorSystem;

/// Registry entry of a spawned actor.
pub use system::ActorRef;

/// Tunables of an [`ActorSystem`].
pub use config::SystemConfig;

/// Point-in-time snapshot of the system-wide metrics.
pub use metrics::SystemMetrics;

/// Supervision label recorded on every spawned actor.
pub use supervision::SupervisionStrategy;

//
// Event System
//

/// Optional callbacks invoked by the system on spawn, stop, failure and delivery.
pub use hooks::EventHooks;

/// Callback types stored in [`EventHooks`].
pub use hooks::{ActorHook, FailureHook, MessageHook};

/// Events published on the system event stream.
pub use hooks::SystemEvent;

/// Forwards the system event stream to a [`Subscriber`].
pub use sink::Sink;

/// Consumer of system events.
pub use sink::Subscriber;
