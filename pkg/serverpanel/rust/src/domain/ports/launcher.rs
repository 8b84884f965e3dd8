// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::domain::{LaunchCommand, Result, ServerConfig};

/// Builds the invocation for a server
pub trait Launcher: Send + Sync {
    fn launch_command(&self, config: &ServerConfig) -> Result<LaunchCommand>;
}
