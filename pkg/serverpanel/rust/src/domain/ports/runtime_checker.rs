// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::domain::PanelError;
use async_trait::async_trait;

/// Result of probing the runtime a server needs (a JVM for Paper).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuntimeInfo {
    pub installed: bool,
    pub version: Option<String>,
    pub compatible: bool,
}

impl RuntimeInfo {
    /// Why this runtime cannot start a server, or `None` when it can.
    pub fn problem(&self) -> Option<String> {
        if !self.installed {
            return Some("java runtime not found; install Java 17 or newer".to_string());
        }
        if !self.compatible {
            return Some(format!(
                "java {} is not compatible; Java 17 or newer is required",
                self.version.as_deref().unwrap_or("unknown")
            ));
        }
        None
    }
}

/// Port checked before every start
#[async_trait]
pub trait RuntimeChecker: Send + Sync {
    /// An `Err` means the probe itself failed, not that the runtime is missing.
    async fn check_runtime(&self) -> Result<RuntimeInfo, PanelError>;
}
