// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # System metrics
//!
//! Counters maintained by the actor system on every spawn, stop and delivery, plus the
//! aggregation task that periodically derives throughput and average handler latency from the
//! per-actor metrics.
//!

use crate::{ActorRef, ActorState};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::{
    select,
    sync::RwLock as AsyncRwLock,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

/// Point-in-time snapshot of the system metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemMetrics {
    /// Actors spawned since the system was created.
    pub total_actors: u64,
    /// Actors spawned and not yet stopped.
    pub active_actors: u64,
    /// Successful deliveries since the system was started.
    pub total_messages: u64,
    /// Deliveries per second over the last aggregation interval.
    pub messages_per_second: f64,
    /// Mean of the average handler time of the processing actors.
    pub average_latency: Duration,
    /// Time since the system was started.
    pub uptime: Duration,
    /// Last run of the aggregation task.
    pub last_update: Option<DateTime<Utc>>,
}

/// Shared, lock-guarded system metrics.
#[derive(Debug, Default)]
pub(crate) struct MetricsState {
    snapshot: SystemMetrics,
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
}

/// Handle to the system metrics.
pub(crate) type SharedMetrics = Arc<RwLock<MetricsState>>;

impl MetricsState {
    /// Marks the system started and clears the message counters.
    pub(crate) fn reset(&mut self) {
        self.snapshot.total_messages = 0;
        self.snapshot.messages_per_second = 0.0;
        self.snapshot.average_latency = Duration::ZERO;
        self.snapshot.last_update = None;
        self.started_at = Some(Instant::now());
        self.stopped_at = None;
    }

    pub(crate) fn mark_stopped(&mut self) {
        self.stopped_at = Some(Instant::now());
        self.snapshot.active_actors = 0;
    }

    pub(crate) fn actor_spawned(&mut self) {
        self.snapshot.total_actors += 1;
        self.snapshot.active_actors += 1;
    }

    pub(crate) fn actor_stopped(&mut self) {
        self.snapshot.active_actors =
            self.snapshot.active_actors.saturating_sub(1);
    }

    pub(crate) fn messages_delivered(&mut self, count: u64) {
        self.snapshot.total_messages += count;
    }

    pub(crate) fn total_messages(&self) -> u64 {
        self.snapshot.total_messages
    }

    /// Snapshot with uptime computed now.
    pub(crate) fn snapshot(&self) -> SystemMetrics {
        let uptime = match (self.started_at, self.stopped_at) {
            (Some(start), Some(stop)) => stop.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        };
        SystemMetrics {
            uptime,
            ..self.snapshot.clone()
        }
    }

    fn update(&mut self, messages_per_second: f64, average_latency: Duration) {
        self.snapshot.messages_per_second = messages_per_second;
        self.snapshot.average_latency = average_latency;
        self.snapshot.last_update = Some(Utc::now());
    }
}

/// Deliveries per second for `delta` deliveries over `elapsed`.
pub(crate) fn throughput(delta: u64, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds > 0.0 {
        delta as f64 / seconds
    } else {
        0.0
    }
}

/// Mean of the given latencies, zero when there are none.
pub(crate) fn mean_latency(latencies: &[Duration]) -> Duration {
    if latencies.is_empty() {
        return Duration::ZERO;
    }
    let total: Duration = latencies.iter().sum();
    total / u32::try_from(latencies.len()).unwrap_or(u32::MAX)
}

/// Periodic metrics aggregation task.
pub(crate) struct MetricsAggregator {
    actors: Arc<AsyncRwLock<HashMap<String, ActorRef>>>,
    metrics: SharedMetrics,
    interval: Duration,
    token: CancellationToken,
}

impl MetricsAggregator {
    pub(crate) fn new(
        actors: Arc<AsyncRwLock<HashMap<String, ActorRef>>>,
        metrics: SharedMetrics,
        interval: Duration,
        token: CancellationToken,
    ) -> Self {
        Self {
            actors,
            metrics,
            interval,
            token,
        }
    }

    /// Runs until the token is cancelled.
    pub(crate) async fn run(self) {
        debug!("Running metrics aggregator every {:?}.", self.interval);
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        let mut last_total = self.metrics.read().total_messages();
        let mut last_tick = Instant::now();
        loop {
            select! {
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {
                    self.aggregate(&mut last_total, &mut last_tick).await;
                }
            }
        }
        debug!("Metrics aggregator stopped.");
    }

    async fn aggregate(&self, last_total: &mut u64, last_tick: &mut Instant) {
        let refs: Vec<ActorRef> =
            self.actors.read().await.values().cloned().collect();
        let latencies: Vec<Duration> = refs
            .iter()
            .filter(|actor_ref| actor_ref.state() == ActorState::Processing)
            .map(|actor_ref| actor_ref.metrics())
            .filter(|metrics| metrics.messages_handled() > 0)
            .map(|metrics| metrics.average_process_time)
            .collect();

        let now = Instant::now();
        let mut metrics = self.metrics.write();
        let total = metrics.total_messages();
        let messages_per_second = throughput(
            total.saturating_sub(*last_total),
            now.duration_since(*last_tick),
        );
        metrics.update(messages_per_second, mean_latency(&latencies));
        *last_total = total;
        *last_tick = now;
    }
}
