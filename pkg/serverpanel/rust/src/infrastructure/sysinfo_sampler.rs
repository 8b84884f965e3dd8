// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::domain::ports::{ResourceGauges, ResourceSampler};
use std::sync::Mutex;
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};

/// `ResourceSampler` backed by `sysinfo`.
///
/// One `System` is kept across calls so CPU usage is computed against the
/// previous refresh.
pub struct SysinfoSampler {
    system: Mutex<System>,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn with_process<T>(&self, pid: u32, f: impl FnOnce(&sysinfo::Process) -> T) -> Option<T> {
        let mut system = self.system.lock().ok()?;
        let pid = Pid::from_u32(pid);
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).map(f)
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for SysinfoSampler {
    fn is_alive(&self, pid: u32) -> bool {
        self.with_process(pid, |p| {
            !matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead)
        })
        .unwrap_or(false)
    }

    fn sample(&self, pid: u32) -> Option<ResourceGauges> {
        self.with_process(pid, |p| ResourceGauges {
            cpu_percent: p.cpu_usage(),
            memory_bytes: p.memory(),
        })
    }
}
