// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Supervision strategies
//!

use serde::{Deserialize, Serialize};

use std::{fmt, str::FromStr};

/// Supervision strategy recorded for an actor at spawn time.
///
/// The strategy is a label: it is stored on the `ActorRef`, listed and logged, but the system
/// does not restart or stop actors on its own. Handler failures are counted and the actor keeps
/// processing whatever the label says.
///
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum SupervisionStrategy {
    /// The actor is meant to be restarted after a failure.
    Restart,
    /// The actor is meant to be stopped after a failure.
    Stop,
    /// Failures are meant to be ignored.
    #[default]
    Ignore,
}

impl fmt::Display for SupervisionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisionStrategy::Restart => write!(f, "restart"),
            SupervisionStrategy::Stop => write!(f, "stop"),
            SupervisionStrategy::Ignore => write!(f, "ignore"),
        }
    }
}

impl FromStr for SupervisionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "restart" => Ok(SupervisionStrategy::Restart),
            "stop" => Ok(SupervisionStrategy::Stop),
            "ignore" => Ok(SupervisionStrategy::Ignore),
            other => Err(format!("unknown supervision strategy `{}`", other)),
        }
    }
}
