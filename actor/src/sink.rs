// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Event sink and subscriber pattern implementation.
//!
//! A sink receives `SystemEvent`s from the system broadcast channel on its own task and notifies
//! a subscriber, keeping observability work off the dispatch path.

use crate::SystemEvent;

use async_trait::async_trait;
use tokio::sync::broadcast::{Receiver as EventReceiver, error::RecvError};

use tracing::{debug, warn};

/// A sink that receives system events and notifies a subscriber.
///
pub struct Sink {
    /// The subscriber that will be notified of events.
    subscriber: Box<dyn Subscriber>,
    /// The broadcast receiver for system events.
    event_receiver: EventReceiver<SystemEvent>,
}

impl Sink {
    /// Creates a new Sink with the given event receiver and subscriber.
    ///
    /// # Arguments
    ///
    /// * `event_receiver` - Receiver obtained from `ActorSystem::subscribe`.
    /// * `subscriber` - Implementation of the Subscriber trait that will process events.
    ///
    pub fn new(
        event_receiver: EventReceiver<SystemEvent>,
        subscriber: impl Subscriber,
    ) -> Self {
        Sink {
            subscriber: Box::new(subscriber),
            event_receiver,
        }
    }

    /// Runs the sink's event processing loop until the event channel is closed. Lagged events
    /// are skipped.
    ///
    pub async fn run(&mut self) {
        loop {
            match self.event_receiver.recv().await {
                Ok(event) => {
                    debug!(
                        "Received event: {:?}. Notify to the subscriber.",
                        event
                    );
                    self.subscriber.notify(event).await;
                }
                Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Sink lagged behind, {} event(s) skipped.", skipped);
                    continue;
                }
            }
        }
    }
}

/// Trait for types that process system events delivered by a `Sink`.
///
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    /// Called for every event received by the sink.
    ///
    /// # Arguments
    ///
    /// * `event` - The event to process.
    ///
    async fn notify(&self, event: SystemEvent);
}

#[cfg(test)]
mod tests {

    use super::*;

    use tokio::sync::{Mutex, broadcast};

    use std::sync::Arc;

    struct Collector(Arc<Mutex<Vec<SystemEvent>>>);

    #[async_trait]
    impl Subscriber for Collector {
        async fn notify(&self, event: SystemEvent) {
            self.0.lock().await.push(event);
        }
    }

    #[tokio::test]
    async fn test_sink_runs_until_closed() {
        let (sender, receiver) = broadcast::channel(8);
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut sink = Sink::new(receiver, Collector(events.clone()));

        sender
            .send(SystemEvent::ActorStopped { id: "a".to_owned() })
            .unwrap();
        drop(sender);
        sink.run().await;

        assert_eq!(
            events.lock().await.as_slice(),
            &[SystemEvent::ActorStopped { id: "a".to_owned() }]
        );
    }
}
