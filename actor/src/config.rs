// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # System configuration
//!
//! `SystemConfig` holds the tunables of an `ActorSystem`. It deserializes with `serde`, so the
//! hosting service can embed it in its own configuration file; every missing field takes its
//! default.
//!

use serde::{Deserialize, Serialize};

use std::time::Duration;

/// Actor system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Interval of the metrics aggregation task.
    pub metrics_interval: Duration,
    /// How long stopping an actor waits for its in-flight handler. `None` waits forever.
    pub actor_stop_timeout: Option<Duration>,
    /// Capacity of the system event broadcast channel.
    pub event_capacity: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            metrics_interval: Duration::from_secs(5),
            actor_stop_timeout: Some(Duration::from_secs(30)),
            event_capacity: 1024,
        }
    }
}

impl SystemConfig {
    /// Sets the metrics aggregation interval.
    pub fn with_metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = interval;
        self
    }

    /// Sets the actor stop timeout.
    pub fn with_actor_stop_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.actor_stop_timeout = timeout;
        self
    }

    /// Sets the event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_builder() {
        let config = SystemConfig::default()
            .with_metrics_interval(Duration::from_millis(100))
            .with_actor_stop_timeout(None)
            .with_event_capacity(8);
        assert_eq!(config.metrics_interval, Duration::from_millis(100));
        assert_eq!(config.actor_stop_timeout, None);
        assert_eq!(config.event_capacity, 8);
    }

    #[test]
    fn test_defaults() {
        let config = SystemConfig::default();
        assert_eq!(config.metrics_interval, Duration::from_secs(5));
        assert_eq!(config.actor_stop_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.event_capacity, 1024);
    }
}
