// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Liveness poller
//! Periodic backstop for exits the output reader did not observe, and the
//! source of the CPU/memory gauges.

use crate::supervisor::Shared;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

struct Running {
    token: CancellationToken,
    task: JoinHandle<()>,
}

pub struct LivenessPoller {
    shared: Arc<Shared>,
    interval: Duration,
    running: Mutex<Option<Running>>,
}

impl LivenessPoller {
    pub(crate) fn new(shared: Arc<Shared>, interval: Duration) -> Self {
        Self {
            shared,
            interval,
            running: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.slot().as_ref().is_some_and(|r| !r.task.is_finished())
    }

    /// Spawn the polling task. Returns false if it was already running.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return false;
        }

        let token = CancellationToken::new();
        let task = tokio::spawn(run(self.shared.clone(), self.interval, token.clone()));
        *slot = Some(Running { token, task });
        info!(interval_ms = self.interval.as_millis() as u64, "liveness poller started");
        true
    }

    /// Cancel the task and wait for it, bounded by a timeout. Idempotent.
    pub async fn stop(&self) {
        let Some(Running { token, task }) = self.slot().take() else {
            return;
        };
        token.cancel();
        match timeout(JOIN_TIMEOUT, task).await {
            Ok(Ok(())) => info!("liveness poller stopped"),
            Ok(Err(e)) => warn!(error = %e, "liveness poller task failed"),
            Err(_) => warn!("liveness poller did not stop in time"),
        }
    }

    /// Run one sweep inline.
    pub async fn poll_once(&self) {
        sweep(&self.shared).await;
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn run(shared: Arc<Shared>, period: Duration, token: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => sweep(&shared).await,
        }
    }
    debug!("liveness poller loop exited");
}

async fn sweep(shared: &Shared) {
    for record in shared.snapshot() {
        if record.persist_pending() {
            record.persist(&shared.store);
        }
        let state = record.state();
        if !state.status.may_have_process() {
            continue;
        }
        if !shared.confirm_alive(&record).await {
            continue;
        }
        if let Some(gauges) = state.pid.and_then(|pid| shared.sampler.sample(pid)) {
            record.set_gauges(gauges);
        }
    }
}
