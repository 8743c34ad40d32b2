// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Tests for event hooks, the system event stream and sinks.

use actor::{
    ActorSystem, Error, EventHooks, Message, Sink, Subscriber,
    SupervisionStrategy, SystemConfig, SystemEvent, handler_fn,
};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

use std::{
    sync::{
        Arc, Mutex as StdMutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

#[derive(Clone, Default)]
pub struct EventCollector {
    pub events: Arc<Mutex<Vec<SystemEvent>>>,
}

#[async_trait]
impl Subscriber for EventCollector {
    async fn notify(&self, event: SystemEvent) {
        self.events.lock().await.push(event);
    }
}

async fn started_system() -> ActorSystem {
    let system = ActorSystem::with_config(
        "events",
        SystemConfig::default().with_metrics_interval(Duration::from_millis(50)),
    );
    system.start(&CancellationToken::new()).await.unwrap();
    system
}

#[tokio::test]
async fn test_hooks_are_called() {
    let system = started_system().await;
    let calls = Arc::new(StdMutex::new(Vec::new()));

    let started = calls.clone();
    let stopped = calls.clone();
    let failed = calls.clone();
    let sent = calls.clone();
    system.set_event_handlers(
        EventHooks::new()
            .on_actor_started(move |id| {
                started.lock().unwrap().push(format!("started {}", id));
            })
            .on_actor_stopped(move |id| {
                stopped.lock().unwrap().push(format!("stopped {}", id));
            })
            .on_actor_failed(move |id, error| {
                failed.lock().unwrap().push(format!("failed {} {}", id, error));
            })
            .on_message_sent(move |from, to, message_type| {
                sent.lock()
                    .unwrap()
                    .push(format!("sent {} {} {}", from, to, message_type));
            }),
    );

    let worker = system
        .spawn_actor(
            "worker",
            "fail-1",
            8,
            handler_fn(|_| Err(Error::Functional("rejected".to_owned()))),
            SupervisionStrategy::Ignore,
        )
        .await
        .unwrap();
    system
        .send_message("fail-1", Message::empty("job", "api"))
        .await
        .unwrap();
    for _ in 0..200 {
        if worker.metrics().messages_failed == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    system.stop_actor("fail-1").await.unwrap();

    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            "started fail-1".to_owned(),
            "sent api fail-1 job".to_owned(),
            "failed fail-1 Error: rejected".to_owned(),
            "stopped fail-1".to_owned(),
        ]
    );
    system.stop().await.unwrap();
}

#[tokio::test]
async fn test_hooks_can_call_back_into_the_system() {
    let system = started_system().await;
    let inner = system.clone();
    let forwarded = Arc::new(AtomicUsize::new(0));

    // Every message sent to the front actor is forwarded to the back actor from the hook.
    system.set_event_handlers(EventHooks::new().on_message_sent(
        move |_, to, message_type| {
            if to == "front" {
                let inner = inner.clone();
                let message_type = message_type.to_owned();
                tokio::spawn(async move {
                    let _ = inner
                        .send_message(
                            "back",
                            Message::empty(message_type, "front"),
                        )
                        .await;
                });
            }
        },
    ));

    let counter = forwarded.clone();
    system
        .spawn_actor(
            "relay",
            "back",
            8,
            handler_fn(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            SupervisionStrategy::Ignore,
        )
        .await
        .unwrap();
    system
        .spawn_actor(
            "relay",
            "front",
            8,
            handler_fn(|_| Ok(())),
            SupervisionStrategy::Ignore,
        )
        .await
        .unwrap();

    system
        .send_message("front", Message::empty("job", "api"))
        .await
        .unwrap();
    for _ in 0..200 {
        if forwarded.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(forwarded.load(Ordering::SeqCst), 1);
    assert_eq!(system.metrics().total_messages, 2);
    system.stop().await.unwrap();
}

#[tokio::test]
async fn test_synchronous_stop_from_hook() {
    let system = started_system().await;
    let inner = system.clone();
    let stopped = Arc::new(AtomicUsize::new(0));

    let counter = stopped.clone();
    system.set_event_handlers(
        EventHooks::new()
            .on_actor_stopped(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .on_message_sent(move |_, to, _| {
                let inner = inner.clone();
                let to = to.to_owned();
                tokio::spawn(async move {
                    let _ = inner.stop_actor(&to).await;
                });
            }),
    );
    system
        .spawn_actor(
            "worker",
            "once",
            8,
            handler_fn(|_| Ok(())),
            SupervisionStrategy::Ignore,
        )
        .await
        .unwrap();
    system
        .send_message("once", Message::empty("job", "api"))
        .await
        .unwrap();

    for _ in 0..200 {
        if stopped.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(stopped.load(Ordering::SeqCst), 1);
    assert!(system.get_actor("once").await.is_err());
    system.stop().await.unwrap();
}

#[tokio::test]
#[traced_test]
async fn test_sink_receives_system_events() {
    let system = started_system().await;
    let collector = EventCollector::default();
    system
        .run_sink(Sink::new(system.subscribe(), collector.clone()))
        .await
        .unwrap();

    system
        .spawn_actor(
            "driver",
            "driver-1",
            8,
            handler_fn(|_| Ok(())),
            SupervisionStrategy::Ignore,
        )
        .await
        .unwrap();
    system
        .broadcast_message("driver", Message::empty("halt", "api"))
        .await
        .unwrap();
    system.stop_actor("driver-1").await.unwrap();

    let expected = vec![
        SystemEvent::ActorStarted {
            id: "driver-1".to_owned(),
            actor_type: "driver".to_owned(),
        },
        SystemEvent::MessageSent {
            from: "api".to_owned(),
            to: "driver-1".to_owned(),
            message_type: "halt".to_owned(),
        },
        SystemEvent::ActorStopped {
            id: "driver-1".to_owned(),
        },
    ];
    for _ in 0..200 {
        if collector.events.lock().await.len() == expected.len() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(*collector.events.lock().await, expected);

    system.stop().await.unwrap();
}

#[tokio::test]
async fn test_sink_requires_started_system() {
    let system = ActorSystem::new("events");
    let sink = Sink::new(system.subscribe(), EventCollector::default());
    assert_eq!(system.run_sink(sink).await, Err(Error::NotStarted));
}

#[tokio::test]
async fn test_event_stream_reports_failures() {
    let system = started_system().await;
    let mut events = system.subscribe();
    system
        .spawn_actor(
            "worker",
            "fail-1",
            8,
            handler_fn(|_| Err(Error::Functional("nope".to_owned()))),
            SupervisionStrategy::Ignore,
        )
        .await
        .unwrap();
    system
        .send_message("fail-1", Message::empty("job", "api"))
        .await
        .unwrap();

    let mut failure = None;
    while let Ok(Ok(event)) =
        tokio::time::timeout(Duration::from_secs(2), events.recv()).await
    {
        if let SystemEvent::ActorFailed { id, error } = event {
            failure = Some((id, error));
            break;
        }
    }
    assert_eq!(
        failure,
        Some((
            "fail-1".to_owned(),
            Error::Functional("nope".to_owned())
        ))
    );
    system.stop().await.unwrap();
}
