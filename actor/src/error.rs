// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Errors module
//!
//! Every error the runtime detects is returned synchronously to the direct caller of the
//! offending operation. Handler errors are the exception: they are logged and counted by the
//! actor's runner and never reach the sender.
//!

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the actor runtime.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// The actor identity is empty.
    #[error("Actor id can not be empty.")]
    EmptyId,
    /// An actor with the same identity is already registered.
    #[error("Actor {0} exist.")]
    Exists(String),
    /// The mailbox capacity must be a positive number.
    #[error("Invalid mailbox capacity {0} for actor.")]
    InvalidCapacity(usize),
    /// The actor could not be started.
    #[error("An error occurred while starting the actor: {0}.")]
    Start(String),
    /// The actor system has not been started.
    #[error("The actor system is not started.")]
    NotStarted,
    /// No actor is registered under the identity.
    #[error("Actor {0} not found.")]
    NotFound(String),
    /// The actor is stopped and rejects messages.
    #[error("Actor {0} is stopped.")]
    Stopped(String),
    /// The actor mailbox is at capacity.
    #[error("Mailbox of actor {0} is full.")]
    MailboxFull(String),
    /// The actor cancellation token is already cancelled.
    #[error("Context of actor {0} is cancelled.")]
    Cancelled(String),
    /// No actor of the given type is registered.
    #[error("No actors of type {0}.")]
    NoActorsOfType(String),
    /// Some recipients of a broadcast rejected the message.
    #[error("Broadcast to {actor_type} actors failed for {} recipient(s).", failures.len())]
    Broadcast {
        /// The type tag the message was broadcast to.
        actor_type: String,
        /// Recipient identity and delivery error for every failed recipient.
        failures: Vec<(String, Error)>,
    },
    /// The actor processing loop could not be stopped cleanly.
    #[error("An error occurred while stopping actor {0}.")]
    Stop(String),
    /// Some actors did not stop cleanly during system shutdown.
    #[error("{failed} actor(s) failed to stop cleanly.")]
    Shutdown {
        /// Number of actors that did not stop cleanly.
        failed: usize,
    },
    /// A payload could not be encoded or decoded.
    #[error("Payload error: {0}")]
    Payload(String),
    /// Error that does not compromise the operation of the system.
    #[error("Error: {0}")]
    Functional(String),
}

impl Error {
    /// True if the error is a capacity error the caller is expected to handle (retry or shed
    /// load).
    pub fn is_mailbox_full(&self) -> bool {
        matches!(self, Error::MailboxFull(_))
    }
}
