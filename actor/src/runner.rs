// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor runner
//!
//! The `ActorRunner` is the processing loop of a single actor. It owns the receiving half of the
//! mailbox while it runs, so exactly one task consumes each mailbox: messages from one sender are
//! handled in send order and the handler is never invoked concurrently for the same actor.
//!
//! Each iteration waits for either the next message or the cancellation of the actor token.
//! Cancellation wins when both are ready. A message is handled to completion before the token is
//! looked at again, so a stop waits for the in-flight handler.
//!
//! Handler errors and panics are counted, logged and reported to the failure observer. They never
//! end the loop and never reach the sender.
//!

use crate::{
    Error, Message,
    actor::{ActorState, FailureObserver, MetricsState},
    handler::{BoxedHandler, MailboxReceiver},
};

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::{select, sync::watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc, time::Instant};

/// Processing loop of an actor.
pub(crate) struct ActorRunner {
    /// Identity of the actor, for logging and failure reports.
    id: String,
    /// Mailbox receiver. Closed and drained when the loop exits.
    receiver: MailboxReceiver,
    /// The actor handler.
    handler: BoxedHandler,
    /// Lifecycle state shared with the actor.
    state: Arc<RwLock<ActorState>>,
    /// Metrics shared with the actor.
    metrics: Arc<Mutex<MetricsState>>,
    /// Cancelled by `Actor::stop` or by the parent token.
    token: CancellationToken,
    failure_observer: Option<FailureObserver>,
    /// Signals every `Actor::stop` caller once the loop has exited.
    exited: watch::Sender<bool>,
}

impl ActorRunner {
    pub(crate) fn new(
        id: String,
        receiver: MailboxReceiver,
        handler: BoxedHandler,
        state: Arc<RwLock<ActorState>>,
        metrics: Arc<Mutex<MetricsState>>,
        token: CancellationToken,
        failure_observer: Option<FailureObserver>,
        exited: watch::Sender<bool>,
    ) -> Self {
        debug!("Creating new actor runner for {}.", &id);
        Self {
            id,
            receiver,
            handler,
            state,
            metrics,
            token,
            failure_observer,
            exited,
        }
    }

    /// Runs the loop until the token is cancelled or the mailbox is closed.
    pub(crate) async fn run(mut self) {
        debug!("Running actor {}.", &self.id);

        loop {
            select! {
                biased;
                _ = self.token.cancelled() => {
                    debug!("Actor {} received the stop signal.", &self.id);
                    break;
                }
                msg = self.receiver.recv() => {
                    if let Some(msg) = msg {
                        self.handle(msg).await;
                    } else {
                        debug!("Mailbox of actor {} is closed.", &self.id);
                        break;
                    }
                }
            }
        }

        self.close();
        self.exited.send_replace(true);
        debug!("Actor {} is terminated.", &self.id);
    }

    /// Invokes the handler for one message and records the outcome.
    async fn handle(&mut self, msg: Message) {
        let message_id = msg.id();
        let message_type = msg.message_type().to_owned();
        debug!(
            "Actor {} handling message {} of type {}.",
            &self.id, message_id, &message_type
        );

        let started = Instant::now();
        let result = AssertUnwindSafe(self.handler.handle(msg))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(Error::Functional(format!(
                    "handler panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });
        let elapsed = started.elapsed();

        self.metrics.lock().record_outcome(elapsed, result.as_ref().err());

        if let Err(err) = result {
            error!(
                "Actor {} failed to handle message {} of type {}: {}",
                &self.id, message_id, &message_type, err
            );
            if let Some(observer) = &self.failure_observer {
                observer(&self.id, &err);
            }
        }
    }

    /// Closes the mailbox, discards what is left and marks the actor stopped.
    fn close(&mut self) {
        self.receiver.close();
        let mut discarded = 0;
        while self.receiver.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!(
                "Actor {} discarded {} pending message(s).",
                &self.id, discarded
            );
        }

        {
            let mut state = self.state.write();
            if *state == ActorState::Processing {
                *state = ActorState::Stopped;
            }
        }
        self.metrics.lock().mark_stopped();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
