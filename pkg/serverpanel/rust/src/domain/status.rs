// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a supervised server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    /// No OS process attached.
    #[default]
    Stopped,
    /// Spawned, readiness marker not seen yet.
    Starting,
    /// Readiness marker observed.
    Running,
    /// Graceful shutdown requested, waiting for exit.
    Stopping,
}

impl ServerStatus {
    /// Starting or running: the record believes an OS process backs it.
    pub fn is_active(self) -> bool {
        matches!(self, ServerStatus::Starting | ServerStatus::Running)
    }

    /// Any status other than stopped: an OS process may still back the record,
    /// so liveness checks apply.
    pub fn may_have_process(self) -> bool {
        self != ServerStatus::Stopped
    }

    pub(crate) fn can_transition_to(self, next: ServerStatus) -> bool {
        use ServerStatus::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Starting, Running)
                | (Stopping, Running)
                | (Starting, Stopping)
                | (Running, Stopping)
                | (Starting, Stopped)
                | (Running, Stopped)
                | (Stopping, Stopped)
        ) || self == next
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServerStatus::Stopped => "stopped",
            ServerStatus::Starting => "starting",
            ServerStatus::Running => "running",
            ServerStatus::Stopping => "stopping",
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stopped" => Ok(ServerStatus::Stopped),
            "starting" => Ok(ServerStatus::Starting),
            "running" => Ok(ServerStatus::Running),
            "stopping" => Ok(ServerStatus::Stopping),
            other => Err(format!("unknown server status '{other}'")),
        }
    }
}
