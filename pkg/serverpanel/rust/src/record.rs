// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! In-memory state of one supervised server.
//!
//! Each mutable field has its own lock so that the output reader, the
//! liveness poller and supervisor calls for one server never contend with
//! those of another.

use crate::domain::ports::{ResourceGauges, ResourceSampler};
use crate::domain::{ConsoleBuffer, ConsoleLine, ServerConfig, ServerStatus};
use crate::store::ConfigStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::process::{Child, ChildStdin};
use tracing::{debug, warn};

/// Runtime fields that change together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeState {
    pub status: ServerStatus,
    pub pid: Option<u32>,
    /// Bumped on every successful spawn.
    pub generation: u64,
}

/// Locked separately from the handle so a stalled write never blocks
/// `try_wait` callers.
pub(crate) type SharedStdin = Arc<tokio::sync::Mutex<ChildStdin>>;

/// OS handle for a process this panel spawned.
#[derive(Debug)]
pub(crate) struct RunningHandle {
    pub child: Child,
    pub stdin: Option<SharedStdin>,
    pub pid: u32,
    pub generation: u64,
}

#[derive(Debug)]
pub struct ProcessRecord {
    config: ServerConfig,
    state: Mutex<RuntimeState>,
    handle: tokio::sync::Mutex<Option<RunningHandle>>,
    // Serializes start/stop for this server only.
    lifecycle: tokio::sync::Mutex<()>,
    console: Mutex<ConsoleBuffer>,
    gauges: Mutex<ResourceGauges>,
    persist_pending: AtomicBool,
}

impl ProcessRecord {
    pub fn new(config: ServerConfig, console_capacity: usize) -> Self {
        let state = RuntimeState {
            status: config.status,
            pid: config.pid,
            generation: 0,
        };
        Self {
            config,
            state: Mutex::new(state),
            handle: tokio::sync::Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
            console: Mutex::new(ConsoleBuffer::new(console_capacity)),
            gauges: Mutex::new(ResourceGauges::default()),
            persist_pending: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> RuntimeState {
        *lock(&self.state)
    }

    pub fn status(&self) -> ServerStatus {
        lock(&self.state).status
    }

    pub(crate) fn handle(&self) -> &tokio::sync::Mutex<Option<RunningHandle>> {
        &self.handle
    }

    pub(crate) async fn lifecycle(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.lifecycle.lock().await
    }

    /// Record a fresh spawn and return its generation.
    pub(crate) fn begin_run(&self, pid: u32) -> u64 {
        lock(&self.console).clear();
        *lock(&self.gauges) = ResourceGauges::default();
        let mut state = lock(&self.state);
        state.generation += 1;
        state.status = ServerStatus::Starting;
        state.pid = Some(pid);
        state.generation
    }

    /// Readiness observed by the reader of `generation`.
    pub(crate) fn mark_running(&self, generation: u64) -> bool {
        let mut state = lock(&self.state);
        let eligible = state.generation == generation
            && matches!(state.status, ServerStatus::Starting | ServerStatus::Stopping);
        if eligible {
            state.status = ServerStatus::Running;
        }
        eligible
    }

    pub(crate) fn mark_stopping(&self) -> bool {
        self.transition(ServerStatus::Stopping)
    }

    /// Shared exit transition for every detection path. Only applies if
    /// `generation` is still current; a second call is a no-op.
    pub fn mark_exited(&self, generation: u64) -> bool {
        let changed = {
            let mut state = lock(&self.state);
            if state.generation != generation || state.status == ServerStatus::Stopped {
                false
            } else {
                state.status = ServerStatus::Stopped;
                state.pid = None;
                true
            }
        };
        if changed {
            *lock(&self.gauges) = ResourceGauges::default();
            debug!(server = %self.name(), generation, "marked stopped");
        }
        changed
    }

    fn transition(&self, next: ServerStatus) -> bool {
        let mut state = lock(&self.state);
        if !state.status.can_transition_to(next) {
            warn!(server = %self.name(), from = %state.status, to = %next, "rejected status transition");
            return false;
        }
        state.status = next;
        true
    }

    pub(crate) fn append_output(&self, text: String) {
        lock(&self.console).push(ConsoleLine::now(text));
    }

    pub fn console_output(&self, max_lines: usize) -> Vec<String> {
        lock(&self.console).recent(max_lines)
    }

    pub fn console_len(&self) -> usize {
        lock(&self.console).len()
    }

    pub fn gauges(&self) -> ResourceGauges {
        *lock(&self.gauges)
    }

    pub(crate) fn set_gauges(&self, gauges: ResourceGauges) {
        *lock(&self.gauges) = gauges;
    }

    pub fn persist_pending(&self) -> bool {
        self.persist_pending.load(Ordering::Acquire)
    }

    /// Write pid and status through the store. On failure the record stays
    /// flagged until a later persist succeeds.
    pub fn persist(&self, store: &ConfigStore) -> bool {
        let state = self.state();
        let saved = store.update_runtime(self.name(), state.pid, state.status);
        self.persist_pending.store(!saved, Ordering::Release);
        if !saved {
            warn!(server = %self.name(), status = %state.status, "failed to persist runtime state, will retry");
        }
        saved
    }

    /// Whether the OS process behind this record still runs.
    ///
    /// A held child handle is asked via `try_wait`, which also reaps it;
    /// adopted processes are checked through the sampler.
    pub(crate) async fn probe_alive(&self, sampler: &dyn ResourceSampler) -> bool {
        let mut guard = self.handle.lock().await;
        if let Some(handle) = guard.as_mut() {
            return match handle.child.try_wait() {
                Ok(Some(status)) => {
                    debug!(server = %self.name(), pid = handle.pid, %status, "child exited");
                    guard.take();
                    false
                }
                Ok(None) => true,
                Err(e) => {
                    warn!(server = %self.name(), error = %e, "try_wait failed, asking the sampler");
                    sampler.is_alive(handle.pid)
                }
            };
        }
        drop(guard);
        self.state().pid.is_some_and(|pid| sampler.is_alive(pid))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
