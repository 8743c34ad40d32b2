// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor system
//!
//! The `system` module provides the `ActorSystem` type. The `ActorSystem` is responsible for
//! spawning, addressing and stopping actors. It owns the registry of running actors, the system
//! metrics and the event hooks.
//!
//! Each piece of shared state has its own lock: the lifecycle, the registry, the metrics and the
//! hooks. Hooks are always invoked with no lock held other than the lifecycle lock, which is
//! only taken by `start`, `stop`, `spawn_actor` and `run_sink`, so a hook may call back into
//! `send_message`, `broadcast_message`, `get_actor` or `stop_actor`.
//!

use crate::{
    Actor, ActorMetrics, ActorState, Error, Message, Sink,
    config::SystemConfig,
    handler::Handler,
    hooks::{EventBus, EventHooks, SystemEvent},
    metrics::{MetricsAggregator, SharedMetrics, SystemMetrics},
    supervision::SupervisionStrategy,
};

use futures::future::join_all;
use tokio::{
    runtime::Handle,
    select,
    sync::{Mutex, RwLock, broadcast, watch},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, warn};

use std::{collections::HashMap, fmt, sync::Arc};

/// Registry entry of a spawned actor.
///
/// Cheap to clone. Holding an `ActorRef` keeps the actor value alive, but not registered:
/// once `stop_actor` removes it, the system no longer routes messages to it.
///
#[derive(Clone)]
pub struct ActorRef {
    id: String,
    actor_type: String,
    actor: Arc<Actor>,
    strategy: SupervisionStrategy,
}

impl ActorRef {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn actor_type(&self) -> &str {
        &self.actor_type
    }

    /// Supervision strategy recorded at spawn time.
    pub fn strategy(&self) -> SupervisionStrategy {
        self.strategy
    }

    /// The actor behind this reference.
    pub fn actor(&self) -> &Arc<Actor> {
        &self.actor
    }

    pub fn state(&self) -> ActorState {
        self.actor.state()
    }

    pub fn metrics(&self) -> ActorMetrics {
        self.actor.metrics()
    }
}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("id", &self.id)
            .field("actor_type", &self.actor_type)
            .field("strategy", &self.strategy)
            .field("state", &self.actor.state())
            .finish()
    }
}

/// Lifecycle of the system.
#[derive(Default)]
struct Lifecycle {
    /// Internal token, a child of the token given to `start`. `Some` while started.
    token: Option<CancellationToken>,
    /// `Some` while a shutdown is in progress. Set to `true` once it completes.
    shutdown: Option<watch::Receiver<bool>>,
}

/// Actor system.
///
/// Cloning an `ActorSystem` gives another handle to the same system.
///
#[derive(Clone)]
pub struct ActorSystem {
    /// Name of this system instance.
    name: Arc<str>,
    config: SystemConfig,
    /// The actors registered in this actor system.
    actors: Arc<RwLock<HashMap<String, ActorRef>>>,
    metrics: SharedMetrics,
    lifecycle: Arc<Mutex<Lifecycle>>,
    events: EventBus,
    /// Background tasks: the metrics aggregator and the sinks.
    tasks: TaskTracker,
}

impl ActorSystem {
    /// Creates a stopped actor system with the default configuration.
    pub fn new(name: &str) -> Self {
        Self::with_config(name, SystemConfig::default())
    }

    /// Creates a stopped actor system.
    pub fn with_config(name: &str, config: SystemConfig) -> Self {
        debug!("Creating actor system {}.", name);
        Self {
            name: Arc::from(name),
            events: EventBus::new(config.event_capacity),
            config,
            actors: Arc::new(RwLock::new(HashMap::new())),
            metrics: SharedMetrics::default(),
            lifecycle: Arc::new(Mutex::new(Lifecycle::default())),
            tasks: TaskTracker::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// True between `start` and `stop`.
    pub async fn is_started(&self) -> bool {
        self.lifecycle.lock().await.token.is_some()
    }

    /// Starts the system: derives the internal token from `token` and launches the metrics
    /// aggregator. Starting a started system does nothing.
    ///
    /// # Errors
    ///
    /// Returns `Error::Start` if there is no tokio runtime in scope or the metrics interval is
    /// zero.
    ///
    pub async fn start(&self, token: &CancellationToken) -> Result<(), Error> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.token.is_some() {
            debug!("Actor system {} is already started.", &self.name);
            return Ok(());
        }
        if lifecycle.shutdown.is_some() {
            return Err(Error::Start(format!(
                "actor system {} is stopping",
                self.name
            )));
        }
        Handle::try_current().map_err(|_| {
            Error::Start("tokio runtime handle not in scope".to_owned())
        })?;
        if self.config.metrics_interval.is_zero() {
            return Err(Error::Start(
                "metrics interval must be positive".to_owned(),
            ));
        }

        let token = token.child_token();
        self.metrics.write().reset();
        self.tasks.reopen();
        let aggregator = MetricsAggregator::new(
            self.actors.clone(),
            self.metrics.clone(),
            self.config.metrics_interval,
            token.clone(),
        );
        self.tasks.spawn(aggregator.run());
        lifecycle.token = Some(token);

        debug!("Running actor system {}...", &self.name);
        Ok(())
    }

    /// Stops the system: cancels the internal token, stops every registered actor, and waits
    /// for every processing loop and background task to exit. Registered actors stay in the
    /// registry. Stopping a stopped system does nothing; a stop issued while another one is in
    /// progress waits for it to complete.
    ///
    /// The lifecycle lock is released before waiting on the actors, so in-flight handlers may
    /// call back into the system. Such calls see a system that is not started.
    ///
    /// # Errors
    ///
    /// Returns `Error::Shutdown` with the number of actors that did not stop cleanly. All the
    /// other actors are stopped regardless.
    ///
    pub async fn stop(&self) -> Result<(), Error> {
        let (refs, done) = {
            let mut lifecycle = self.lifecycle.lock().await;
            let Some(token) = lifecycle.token.take() else {
                let shutdown = lifecycle.shutdown.clone();
                drop(lifecycle);
                if let Some(mut shutdown) = shutdown {
                    debug!("Actor system {} is stopping, waiting.", &self.name);
                    let _ = shutdown.wait_for(|done| *done).await;
                } else {
                    debug!("Actor system {} is not running.", &self.name);
                }
                return Ok(());
            };
            debug!("Stopping actor system {}...", &self.name);
            let (done, shutdown) = watch::channel(false);
            lifecycle.shutdown = Some(shutdown);
            token.cancel();
            (self.list_actors().await, done)
        };

        let results = join_all(refs.iter().map(|actor_ref| async move {
            (actor_ref.id(), actor_ref.actor().stop().await)
        }))
        .await;
        let failures: Vec<(String, Error)> = results
            .into_iter()
            .filter_map(|(id, result)| {
                result.err().map(|err| (id.to_owned(), err))
            })
            .collect();

        self.tasks.close();
        self.tasks.wait().await;
        self.metrics.write().mark_stopped();

        self.lifecycle.lock().await.shutdown = None;
        done.send_replace(true);

        for (id, err) in &failures {
            self.events.actor_failed(id, err);
        }
        if failures.is_empty() {
            debug!("Actor system {} stopped.", &self.name);
            Ok(())
        } else {
            error!(
                "Actor system {} stopped, {} actor(s) did not stop cleanly.",
                &self.name,
                failures.len()
            );
            Err(Error::Shutdown {
                failed: failures.len(),
            })
        }
    }

    /// Spawns and registers an actor.
    ///
    /// # Arguments
    ///
    /// * `actor_type` - Category tag of the actor.
    /// * `id` - Unique, non-empty identity.
    /// * `capacity` - Mailbox capacity.
    /// * `handler` - The message handler.
    /// * `strategy` - Supervision label stored on the reference.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotStarted`, `Error::EmptyId`, `Error::InvalidCapacity`,
    /// `Error::Exists` if the identity is taken (the registered actor is left untouched), or
    /// `Error::Start` if the actor could not be started.
    ///
    pub async fn spawn_actor(
        &self,
        actor_type: &str,
        id: &str,
        capacity: usize,
        handler: impl Handler,
        strategy: SupervisionStrategy,
    ) -> Result<ActorRef, Error> {
        let lifecycle = self.lifecycle.lock().await;
        let Some(token) = lifecycle.token.as_ref() else {
            return Err(Error::NotStarted);
        };

        let events = self.events.clone();
        let actor = Actor::new(id, actor_type, capacity, handler)?
            .with_stop_timeout(self.config.actor_stop_timeout)
            .with_failure_observer(Arc::new(move |id: &str, err: &Error| {
                events.actor_failed(id, err)
            }));

        let started = {
            let mut actors = self.actors.write().await;
            if actors.contains_key(id) {
                error!("Actor '{}' already exists!", id);
                return Err(Error::Exists(id.to_owned()));
            }
            actor.start(token).map(|()| {
                let actor_ref = ActorRef {
                    id: id.to_owned(),
                    actor_type: actor_type.to_owned(),
                    actor: Arc::new(actor),
                    strategy,
                };
                actors.insert(id.to_owned(), actor_ref.clone());
                actor_ref
            })
        };
        drop(lifecycle);

        match started {
            Ok(actor_ref) => {
                self.metrics.write().actor_spawned();
                debug!(
                    "Actor {} of type {} spawned ({} supervision).",
                    id, actor_type, strategy
                );
                self.events.actor_started(id, actor_type);
                Ok(actor_ref)
            }
            Err(err) => {
                error!("Actor {} failed to start: {}", id, err);
                self.events.actor_failed(id, &err);
                Err(err)
            }
        }
    }

    /// Stops an actor and removes it from the registry.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if no actor is registered under `id`, or `Error::Stop` if the
    /// actor did not stop cleanly (it is removed anyway).
    ///
    pub async fn stop_actor(&self, id: &str) -> Result<(), Error> {
        let actor_ref = self
            .actors
            .write()
            .await
            .remove(id)
            .ok_or_else(|| Error::NotFound(id.to_owned()))?;
        self.metrics.write().actor_stopped();

        match actor_ref.actor().stop().await {
            Ok(()) => {
                debug!("Actor {} removed from system {}.", id, &self.name);
                self.events.actor_stopped(id);
                Ok(())
            }
            Err(err) => {
                self.events.actor_failed(id, &err);
                Err(err)
            }
        }
    }

    /// Retrieves a registered actor.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if no actor is registered under `id`.
    ///
    pub async fn get_actor(&self, id: &str) -> Result<ActorRef, Error> {
        self.actors
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_owned()))
    }

    /// Delivers a message to the mailbox of the actor registered under `to`.
    ///
    /// Delivery is a non-blocking enqueue. The result says nothing about the handler outcome.
    ///
    /// # Errors
    ///
    /// `Error::NotFound`, `Error::Stopped`, `Error::MailboxFull` or `Error::Cancelled`, each
    /// carrying the target identity.
    ///
    pub async fn send_message(
        &self,
        to: &str,
        message: Message,
    ) -> Result<(), Error> {
        let actor_ref = self.get_actor(to).await?;
        let from = message.sender().to_owned();
        let message_type = message.message_type().to_owned();

        actor_ref.actor().send(message)?;

        self.metrics.write().messages_delivered(1);
        self.events.message_sent(&from, to, &message_type);
        Ok(())
    }

    /// Delivers a copy of the message to every actor of the given type.
    ///
    /// Delivery is attempted to every recipient; failures do not stop the remaining deliveries,
    /// and successful deliveries are counted even when others fail.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoActorsOfType` if no actor of that type is registered, or
    /// `Error::Broadcast` listing every recipient that rejected the message.
    ///
    pub async fn broadcast_message(
        &self,
        actor_type: &str,
        message: Message,
    ) -> Result<(), Error> {
        let targets = self.actors_of_type(actor_type).await;
        if targets.is_empty() {
            return Err(Error::NoActorsOfType(actor_type.to_owned()));
        }

        let mut failures = Vec::new();
        for target in &targets {
            match target.actor().send(message.clone()) {
                Ok(()) => {
                    self.metrics.write().messages_delivered(1);
                    self.events.message_sent(
                        message.sender(),
                        target.id(),
                        message.message_type(),
                    );
                }
                Err(err) => {
                    warn!(
                        "Broadcast of message {} to actor {} failed: {}",
                        message.id(),
                        target.id(),
                        err
                    );
                    failures.push((target.id().to_owned(), err));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Broadcast {
                actor_type: actor_type.to_owned(),
                failures,
            })
        }
    }

    /// Snapshot of the registered actors of the given type.
    pub async fn actors_of_type(&self, actor_type: &str) -> Vec<ActorRef> {
        self.actors
            .read()
            .await
            .values()
            .filter(|actor_ref| actor_ref.actor_type() == actor_type)
            .cloned()
            .collect()
    }

    /// Snapshot of every registered actor.
    pub async fn list_actors(&self) -> Vec<ActorRef> {
        self.actors.read().await.values().cloned().collect()
    }

    /// Returns a snapshot of the system metrics.
    pub fn metrics(&self) -> SystemMetrics {
        self.metrics.read().snapshot()
    }

    /// Replaces the event hooks.
    pub fn set_event_handlers(&self, hooks: EventHooks) {
        self.events.set_hooks(hooks);
    }

    /// Subscribes to the system event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.events.subscribe()
    }

    /// Runs a sink on a background task until the system stops.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotStarted` if the system is not started.
    ///
    pub async fn run_sink(&self, mut sink: Sink) -> Result<(), Error> {
        let token = self
            .lifecycle
            .lock()
            .await
            .token
            .clone()
            .ok_or(Error::NotStarted)?;
        self.tasks.spawn(async move {
            select! {
                _ = sink.run() => {}
                _ = token.cancelled() => {}
            }
        });
        Ok(())
    }
}

impl fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorSystem")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use crate::handler::handler_fn;

    use tracing_test::traced_test;

    use std::time::Duration;

    fn fast_config() -> SystemConfig {
        SystemConfig::default().with_metrics_interval(Duration::from_millis(20))
    }

    #[tokio::test]
    #[traced_test]
    async fn test_start_stop_actor_system() {
        let system = ActorSystem::new("test");
        let token = CancellationToken::new();
        system.start(&token).await.unwrap();
        system.start(&token).await.unwrap();
        assert!(system.is_started().await);
        assert!(logs_contain("Running actor system test..."));
        assert!(logs_contain("Actor system test is already started."));

        system.stop().await.unwrap();
        system.stop().await.unwrap();
        assert!(!system.is_started().await);
        assert!(logs_contain("Stopping actor system test..."));
        assert!(logs_contain("Actor system test stopped."));
        assert!(logs_contain("Actor system test is not running."));
    }

    #[tokio::test]
    async fn test_spawn_requires_started_system() {
        let system = ActorSystem::new("test");
        let result = system
            .spawn_actor(
                "echo",
                "echo-1",
                4,
                handler_fn(|_| Ok(())),
                SupervisionStrategy::Ignore,
            )
            .await;
        assert_eq!(result.unwrap_err(), Error::NotStarted);
    }

    #[tokio::test]
    async fn test_zero_metrics_interval_is_rejected() {
        let system = ActorSystem::with_config(
            "test",
            SystemConfig::default().with_metrics_interval(Duration::ZERO),
        );
        let result = system.start(&CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::Start(_))));
        assert!(!system.is_started().await);
    }

    #[tokio::test]
    async fn test_system_stop_keeps_registry() {
        let system = ActorSystem::with_config("test", fast_config());
        system.start(&CancellationToken::new()).await.unwrap();
        let actor_ref = system
            .spawn_actor(
                "echo",
                "echo-1",
                4,
                handler_fn(|_| Ok(())),
                SupervisionStrategy::Restart,
            )
            .await
            .unwrap();
        system.stop().await.unwrap();

        assert_eq!(actor_ref.state(), ActorState::Stopped);
        let listed = system.list_actors().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].strategy(), SupervisionStrategy::Restart);
        assert_eq!(
            system.send_message("echo-1", Message::empty("m", "t")).await,
            Err(Error::Stopped("echo-1".to_owned()))
        );
        assert_eq!(system.metrics().active_actors, 0);
    }

    #[tokio::test]
    async fn test_parent_token_cancellation_stops_actors() {
        let system = ActorSystem::with_config("test", fast_config());
        let token = CancellationToken::new();
        system.start(&token).await.unwrap();
        let actor_ref = system
            .spawn_actor(
                "echo",
                "echo-1",
                4,
                handler_fn(|_| Ok(())),
                SupervisionStrategy::Ignore,
            )
            .await
            .unwrap();

        token.cancel();
        assert!(
            system
                .send_message("echo-1", Message::empty("m", "t"))
                .await
                .is_err()
        );
        system.stop().await.unwrap();
        assert_eq!(actor_ref.state(), ActorState::Stopped);
    }

    #[tokio::test]
    async fn test_aggregator_updates_metrics() {
        let system = ActorSystem::with_config("test", fast_config());
        system.start(&CancellationToken::new()).await.unwrap();
        system
            .spawn_actor(
                "echo",
                "echo-1",
                16,
                |_msg: Message| async move {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    Ok::<(), Error>(())
                },
                SupervisionStrategy::Ignore,
            )
            .await
            .unwrap();
        // Idle actor: contributes nothing to the latency.
        system
            .spawn_actor(
                "echo",
                "echo-2",
                16,
                handler_fn(|_| Ok(())),
                SupervisionStrategy::Ignore,
            )
            .await
            .unwrap();

        for _ in 0..5 {
            system
                .send_message("echo-1", Message::empty("m", "t"))
                .await
                .unwrap();
        }

        let mut metrics = system.metrics();
        for _ in 0..100 {
            metrics = system.metrics();
            if metrics.last_update.is_some()
                && metrics.average_latency >= Duration::from_millis(2)
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(metrics.total_messages, 5);
        assert_eq!(metrics.total_actors, 2);
        assert_eq!(metrics.active_actors, 2);
        assert!(metrics.last_update.is_some());
        assert!(metrics.average_latency >= Duration::from_millis(2));
        assert!(metrics.uptime > Duration::ZERO);

        system.stop().await.unwrap();
    }
}
