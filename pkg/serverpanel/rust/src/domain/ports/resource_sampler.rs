// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use serde::Serialize;

/// Last sampled resource usage. Advisory only; may be one poll behind.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ResourceGauges {
    pub cpu_percent: f32,
    pub memory_bytes: u64,
}

/// OS process accounting queries
pub trait ResourceSampler: Send + Sync {
    /// True if `pid` names a live (non-zombie) process.
    fn is_alive(&self, pid: u32) -> bool;

    /// CPU and resident memory for `pid`, or `None` if it cannot be read.
    fn sample(&self, pid: u32) -> Option<ResourceGauges>;
}
