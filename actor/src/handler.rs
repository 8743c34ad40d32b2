// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Handler
//!
//! The `handler` module provides the `Handler` trait, the single message-handling function an
//! actor receives at construction, and the bounded mailbox channel the runner consumes.
//!

use crate::{Error, Message};

use async_trait::async_trait;

use tokio::sync::mpsc;

use std::{future::Future, sync::Arc};

/// Message handling behavior of an actor.
///
/// The runner calls `handle` once per dequeued message, never concurrently for the same actor.
/// An `Err` is logged and counted by the runner and never reaches the sender.
///
/// Any async closure `Fn(Message) -> impl Future<Output = Result<(), Error>>` is a handler:
///
/// ```ignore
/// let handler = |msg: Message| async move {
///     debug!("Got {}", msg.message_type());
///     Ok(())
/// };
/// ```
///
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Handles a message.
    ///
    /// # Arguments
    ///
    /// * `message` - The message dequeued from the actor mailbox.
    ///
    /// # Returns
    ///
    /// Returns `Ok(())` if the message was processed, or the handler error otherwise.
    ///
    async fn handle(&self, message: Message) -> Result<(), Error>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    async fn handle(&self, message: Message) -> Result<(), Error> {
        (self)(message).await
    }
}

/// Handler built from a synchronous closure.
pub struct FnHandler<F> {
    f: F,
}

/// Wraps a synchronous closure as a `Handler`.
///
/// Useful for handlers that never await, such as counters or in-memory projections.
///
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&Message) -> Result<(), Error> + Send + Sync + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(&Message) -> Result<(), Error> + Send + Sync + 'static,
{
    async fn handle(&self, message: Message) -> Result<(), Error> {
        (self.f)(&message)
    }
}

/// Shared handler.
pub type BoxedHandler = Arc<dyn Handler>;

/// Mailbox receiver.
pub type MailboxReceiver = mpsc::Receiver<Message>;

/// Mailbox sender.
pub type MailboxSender = mpsc::Sender<Message>;

/// Mailbox.
pub type Mailbox = (MailboxSender, MailboxReceiver);

/// Bounded mailbox factory.
///
/// # Errors
///
/// Returns `Error::InvalidCapacity` if `capacity` is zero.
///
pub fn mailbox(capacity: usize) -> Result<Mailbox, Error> {
    if capacity == 0 {
        return Err(Error::InvalidCapacity(capacity));
    }
    Ok(mpsc::channel(capacity))
}
