// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor
//!
//! The `actor` module provides the `Actor` type: one identity, one type tag, one bounded mailbox,
//! one lifecycle state and the handler supplied at construction. The actor's queue and state are
//! shared between its runner (the processing loop) and every sender holding a reference to it.
//!

use crate::{
    Error, Message,
    handler::{BoxedHandler, Handler, MailboxReceiver, MailboxSender, mailbox},
    runner::ActorRunner,
};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::{
    runtime::Handle,
    sync::{mpsc::error::TrySendError, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

/// Callback notified by the runner every time the handler fails.
pub type FailureObserver = Arc<dyn Fn(&str, &Error) + Send + Sync>;

/// Lifecycle state of an actor.
///
/// ```text
/// Idle ──start──► Processing ──stop──► Stopped
///                      │
///                      └──stop (loop did not exit cleanly)──► Error
/// ```
///
/// A handler failure never changes the state: failures are counted and the actor keeps
/// processing. `Stopped` and `Error` are terminal and both reject new messages.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActorState {
    /// Constructed, processing loop not started. Messages are buffered.
    Idle,
    /// Processing loop running.
    Processing,
    /// Mailbox closed and processing loop exited.
    Stopped,
    /// The processing loop could not be shut down cleanly.
    Error,
}

impl ActorState {
    /// True for the terminal states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActorState::Stopped | ActorState::Error)
    }
}

impl fmt::Display for ActorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorState::Idle => write!(f, "idle"),
            ActorState::Processing => write!(f, "processing"),
            ActorState::Stopped => write!(f, "stopped"),
            ActorState::Error => write!(f, "error"),
        }
    }
}

/// Point-in-time snapshot of an actor's metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActorMetrics {
    /// Messages accepted into the mailbox.
    pub messages_received: u64,
    /// Messages whose handler returned `Ok`.
    pub messages_processed: u64,
    /// Messages whose handler returned an error or panicked.
    pub messages_failed: u64,
    /// Incremental mean of the handler duration over processed and failed messages.
    pub average_process_time: Duration,
    /// Last enqueue or handler completion.
    pub last_activity: Option<DateTime<Utc>>,
    /// Messages waiting in the mailbox.
    pub queue_depth: usize,
    /// Time since the actor was started, frozen once the loop exits.
    pub uptime: Duration,
    /// Text of the most recent handler error.
    pub last_error: Option<String>,
}

impl ActorMetrics {
    /// Number of messages the handler has been invoked for.
    pub fn messages_handled(&self) -> u64 {
        self.messages_processed + self.messages_failed
    }
}

/// Mutable metrics shared by the actor and its runner.
#[derive(Debug, Default)]
pub(crate) struct MetricsState {
    pub(crate) received: u64,
    pub(crate) processed: u64,
    pub(crate) failed: u64,
    pub(crate) average: Duration,
    pub(crate) last_activity: Option<DateTime<Utc>>,
    pub(crate) last_error: Option<String>,
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
}

impl MetricsState {
    pub(crate) fn record_received(&mut self) {
        self.received += 1;
        self.last_activity = Some(Utc::now());
    }

    /// Records a handler outcome. Counters and the running average are updated together so a
    /// concurrent snapshot never sees one without the other.
    pub(crate) fn record_outcome(
        &mut self,
        elapsed: Duration,
        error: Option<&Error>,
    ) {
        match error {
            None => self.processed += 1,
            Some(error) => {
                self.failed += 1;
                self.last_error = Some(error.to_string());
            }
        }
        let n = u128::from(self.processed + self.failed);
        let total = self.average.as_nanos() * (n - 1) + elapsed.as_nanos();
        self.average =
            Duration::from_nanos(u64::try_from(total / n).unwrap_or(u64::MAX));
        self.last_activity = Some(Utc::now());
    }

    pub(crate) fn mark_started(&mut self) {
        self.started_at = Some(Instant::now());
    }

    pub(crate) fn mark_stopped(&mut self) {
        if self.stopped_at.is_none() {
            self.stopped_at = Some(Instant::now());
        }
    }

    fn uptime(&self) -> Duration {
        match (self.started_at, self.stopped_at) {
            (Some(start), Some(stop)) => stop.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }
}

/// An actor: a bounded mailbox consumed by a single processing loop.
///
/// Actors are normally created through `ActorSystem::spawn_actor`, which owns them from then on.
/// They can also be driven directly, which is what the unit tests do:
///
/// ```ignore
/// let actor = Actor::new("echo-1", "echo", 16, |msg: Message| async move { Ok(()) })?;
/// actor.start(&CancellationToken::new())?;
/// actor.send(Message::empty("ping", "tester"))?;
/// actor.stop().await?;
/// ```
///
pub struct Actor {
    id: String,
    actor_type: String,
    capacity: usize,
    state: Arc<RwLock<ActorState>>,
    sender: MailboxSender,
    receiver: Mutex<Option<MailboxReceiver>>,
    handler: BoxedHandler,
    metrics: Arc<Mutex<MetricsState>>,
    token: Mutex<Option<CancellationToken>>,
    task: Mutex<Option<JoinHandle<()>>>,
    /// Set to `true` by the runner when its loop exits. Closed if the loop is aborted.
    exited: Mutex<Option<watch::Receiver<bool>>>,
    stop_timeout: Option<Duration>,
    failure_observer: Option<FailureObserver>,
}

impl Actor {
    /// Creates an idle actor.
    ///
    /// # Arguments
    ///
    /// * `id` - Unique, non-empty identity.
    /// * `actor_type` - Category tag used by broadcasts.
    /// * `capacity` - Mailbox capacity, must be positive.
    /// * `handler` - The message handler.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyId` or `Error::InvalidCapacity` for invalid arguments.
    ///
    pub fn new(
        id: impl Into<String>,
        actor_type: impl Into<String>,
        capacity: usize,
        handler: impl Handler,
    ) -> Result<Self, Error> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::EmptyId);
        }
        let (sender, receiver) = mailbox(capacity)?;
        debug!("Creating actor {}.", &id);
        Ok(Self {
            id,
            actor_type: actor_type.into(),
            capacity,
            state: Arc::new(RwLock::new(ActorState::Idle)),
            sender,
            receiver: Mutex::new(Some(receiver)),
            handler: Arc::new(handler),
            metrics: Arc::new(Mutex::new(MetricsState::default())),
            token: Mutex::new(None),
            task: Mutex::new(None),
            exited: Mutex::new(None),
            stop_timeout: None,
            failure_observer: None,
        })
    }

    /// Bounds how long `stop` waits for an in-flight handler. `None` waits forever.
    pub fn with_stop_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Registers a callback invoked by the runner after every handler failure.
    pub fn with_failure_observer(mut self, observer: FailureObserver) -> Self {
        self.failure_observer = Some(observer);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn actor_type(&self) -> &str {
        &self.actor_type
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ActorState {
        *self.state.read()
    }

    /// Starts the processing loop on the current tokio runtime.
    ///
    /// The actor's cancellation token is a child of `parent`, so cancelling the parent stops the
    /// loop as well.
    ///
    /// # Errors
    ///
    /// Returns `Error::Start` if the actor is not idle, its mailbox receiver was taken with
    /// `receive`, or there is no tokio runtime in scope.
    ///
    pub fn start(&self, parent: &CancellationToken) -> Result<(), Error> {
        let mut state = self.state.write();
        if *state != ActorState::Idle {
            return Err(Error::Start(format!(
                "actor {} is {}",
                self.id, *state
            )));
        }
        let runtime = Handle::try_current().map_err(|_| {
            Error::Start("tokio runtime handle not in scope".to_owned())
        })?;
        let receiver = self.receiver.lock().take().ok_or_else(|| {
            Error::Start(format!("mailbox of actor {} was taken", self.id))
        })?;

        let token = parent.child_token();
        *self.token.lock() = Some(token.clone());
        let (exited, exited_receiver) = watch::channel(false);
        *self.exited.lock() = Some(exited_receiver);
        self.metrics.lock().mark_started();

        let runner = ActorRunner::new(
            self.id.clone(),
            receiver,
            self.handler.clone(),
            self.state.clone(),
            self.metrics.clone(),
            token,
            self.failure_observer.clone(),
            exited,
        );
        *state = ActorState::Processing;
        *self.task.lock() = Some(runtime.spawn(runner.run()));
        debug!("Actor {} is started.", &self.id);
        Ok(())
    }

    /// Stops the actor and waits for its processing loop to exit.
    ///
    /// Idempotent: stopping a stopped actor succeeds without doing anything. Concurrent callers
    /// all return once the loop has exited. A message sent concurrently is either enqueued
    /// before the state changes or rejected with `Error::Stopped`. Messages still queued when the
    /// loop exits are discarded.
    ///
    /// # Errors
    ///
    /// Returns `Error::Stop` if the loop panicked, or did not exit within the stop timeout and
    /// was aborted. The actor is left in `ActorState::Error`.
    ///
    pub async fn stop(&self) -> Result<(), Error> {
        // The runner marks itself stopped when its parent token is cancelled, so a terminal
        // state alone does not mean the loop has been joined.
        let already_stopped = {
            let mut state = self.state.write();
            if state.is_terminal() {
                true
            } else {
                *state = ActorState::Stopped;
                false
            }
        };
        if !already_stopped {
            debug!("Stopping actor {}.", &self.id);
        }

        if let Some(token) = self.token.lock().as_ref() {
            token.cancel();
        }
        // Never started: close the mailbox here since there is no runner to do it.
        if let Some(mut receiver) = self.receiver.lock().take() {
            receiver.close();
        }

        let task = self.task.lock().take();
        let Some(task) = task else {
            // Another caller owns the join handle: wait for the loop to exit.
            let exited = self.exited.lock().clone();
            if let Some(mut exited) = exited {
                let _ = exited.wait_for(|exited| *exited).await;
            }
            if already_stopped {
                debug!("Actor {} is already stopped.", &self.id);
            }
            self.metrics.lock().mark_stopped();
            return Ok(());
        };

        let abort = task.abort_handle();
        let outcome = match self.stop_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, task).await {
                Ok(joined) => joined.map_err(|e| e.to_string()),
                Err(_) => {
                    abort.abort();
                    Err(format!("handler still running after {:?}", timeout))
                }
            },
            None => task.await.map_err(|e| e.to_string()),
        };

        match outcome {
            Ok(()) => {
                debug!("Actor {} is stopped.", &self.id);
                Ok(())
            }
            Err(reason) => {
                error!("Actor {} failed to stop: {}", &self.id, reason);
                *self.state.write() = ActorState::Error;
                self.metrics.lock().mark_stopped();
                Err(Error::Stop(self.id.clone()))
            }
        }
    }

    /// Enqueues a message without waiting for mailbox capacity.
    ///
    /// # Errors
    ///
    /// * `Error::Stopped` - the actor is stopped or in error.
    /// * `Error::Cancelled` - the actor's cancellation token is cancelled.
    /// * `Error::MailboxFull` - the mailbox is at capacity.
    ///
    pub fn send(&self, message: Message) -> Result<(), Error> {
        // The read guard is held across the enqueue so `stop` can not interleave.
        let state = self.state.read();
        if state.is_terminal() {
            debug!("Rejecting message for stopped actor {}.", &self.id);
            return Err(Error::Stopped(self.id.clone()));
        }
        if self
            .token
            .lock()
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
        {
            return Err(Error::Cancelled(self.id.clone()));
        }
        match self.sender.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                warn!(
                    "Mailbox of actor {} is full, message {} rejected.",
                    &self.id,
                    message.id()
                );
                return Err(Error::MailboxFull(self.id.clone()));
            }
            Err(TrySendError::Closed(_)) => {
                return Err(Error::Stopped(self.id.clone()));
            }
        }
        drop(state);

        self.metrics.lock().record_received();
        Ok(())
    }

    /// Takes the mailbox receiver of an idle actor, for inspection in tests.
    ///
    /// Returns `None` once the actor has started. An actor whose receiver was taken can no
    /// longer be started.
    ///
    pub fn receive(&self) -> Option<MailboxReceiver> {
        let state = self.state.read();
        if *state != ActorState::Idle {
            return None;
        }
        self.receiver.lock().take()
    }

    /// Returns a snapshot of the actor metrics.
    pub fn metrics(&self) -> ActorMetrics {
        let metrics = self.metrics.lock();
        ActorMetrics {
            messages_received: metrics.received,
            messages_processed: metrics.processed,
            messages_failed: metrics.failed,
            average_process_time: metrics.average,
            last_activity: metrics.last_activity,
            queue_depth: self.sender.max_capacity() - self.sender.capacity(),
            uptime: metrics.uptime(),
            last_error: metrics.last_error.clone(),
        }
    }
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("id", &self.id)
            .field("actor_type", &self.actor_type)
            .field("capacity", &self.capacity)
            .field("state", &self.state())
            .finish()
    }
}
