// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Process supervisor
//! Owns every `ProcessRecord` and coordinates create/start/stop/restart/delete
//! against the store, the OS and the injected ports.

use crate::domain::ports::{
    ArtifactFetcher, Launcher, ResourceGauges, ResourceSampler, RuntimeChecker,
};
use crate::domain::{
    CONSOLE_CAPACITY, MemorySize, PanelError, ReadinessMarker, Result, ServerConfig, ServerStatus,
    validate_jar_name,
};
use crate::infrastructure::signals;
use crate::liveness::LivenessPoller;
use crate::output_reader::OutputReaderTask;
use crate::record::{ProcessRecord, RunningHandle, SharedStdin};
use crate::scaffold;
use crate::store::ConfigStore;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, error, info, warn};

/// Version fetched when the artifact name carries none.
pub const DEFAULT_FETCH_VERSION: &str = "1.20.6";
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(30);
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(2);
const KILL_WAIT: Duration = Duration::from_secs(10);
const ADOPTED_POLL: Duration = Duration::from_millis(100);
const STOP_COMMAND: &str = "stop";
/// Upper bound for one stdin write, including waiting for the stdin lock.
const STDIN_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub stop_grace: Duration,
    pub restart_delay: Duration,
    /// Parent of server directories created without an explicit path.
    pub servers_root: PathBuf,
    pub readiness: ReadinessMarker,
    pub console_capacity: usize,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            stop_grace: DEFAULT_STOP_GRACE,
            restart_delay: DEFAULT_RESTART_DELAY,
            servers_root: std::env::current_dir()
                .map(|cwd| cwd.join("servers"))
                .unwrap_or_else(|_| PathBuf::from("servers")),
            readiness: ReadinessMarker::default(),
            console_capacity: CONSOLE_CAPACITY,
        }
    }
}

/// External collaborators, injected at construction.
#[derive(Clone)]
pub struct SupervisorPorts {
    pub runtime: Arc<dyn RuntimeChecker>,
    pub fetcher: Arc<dyn ArtifactFetcher>,
    pub sampler: Arc<dyn ResourceSampler>,
    pub launcher: Arc<dyn Launcher>,
}

/// Parameters for `create()`.
#[derive(Debug, Clone)]
pub struct NewServer {
    pub version: String,
    pub min_ram: String,
    pub max_ram: String,
    /// Defaults to `<servers_root>/<name>`.
    pub storage_path: Option<PathBuf>,
    pub port: u16,
    pub storage_limit_gb: u64,
}

impl Default for NewServer {
    fn default() -> Self {
        Self {
            version: "1.20.1".to_string(),
            min_ram: crate::domain::server_config::DEFAULT_MIN_RAM.to_string(),
            max_ram: crate::domain::server_config::DEFAULT_MAX_RAM.to_string(),
            storage_path: None,
            port: crate::domain::server_config::DEFAULT_PORT,
            storage_limit_gb: crate::domain::server_config::DEFAULT_STORAGE_LIMIT_GB,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was running; no signal sent and nothing persisted.
    AlreadyStopped,
    /// Exited within the grace period.
    Graceful,
    /// Killed after the grace period.
    Forced,
}

/// Row returned by `list()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerSummary {
    pub name: String,
    pub status: ServerStatus,
    pub pid: Option<u32>,
    pub port: u16,
    pub path: String,
    pub jar: String,
    pub gauges: ResourceGauges,
}

/// State shared with the liveness poller.
pub(crate) struct Shared {
    pub store: Arc<ConfigStore>,
    pub records: RwLock<HashMap<String, Arc<ProcessRecord>>>,
    pub sampler: Arc<dyn ResourceSampler>,
}

impl Shared {
    pub fn get(&self, name: &str) -> Option<Arc<ProcessRecord>> {
        self.records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }

    pub fn snapshot(&self) -> Vec<Arc<ProcessRecord>> {
        let mut records: Vec<_> = self
            .records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();
        records.sort_by(|a, b| a.name().cmp(b.name()));
        records
    }

    /// Confirm a record that believes it is active; correct it if the OS
    /// process is gone. Returns whether it is still alive.
    pub async fn confirm_alive(&self, record: &ProcessRecord) -> bool {
        let state = record.state();
        if record.probe_alive(self.sampler.as_ref()).await {
            return true;
        }
        if record.mark_exited(state.generation) {
            warn!(server = %record.name(), pid = ?state.pid, "server process is gone, marking stopped");
            record.persist(&self.store);
        }
        false
    }

    pub fn flush_pending(&self) {
        for record in self.snapshot() {
            if record.persist_pending() {
                debug!(server = %record.name(), "retrying pending persist");
                record.persist(&self.store);
            }
        }
    }

    fn records_mut(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<ProcessRecord>>> {
        self.records
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct ProcessSupervisor {
    shared: Arc<Shared>,
    // Held across the duplicate check and registration.
    create_lock: tokio::sync::Mutex<()>,
    options: SupervisorOptions,
    runtime: Arc<dyn RuntimeChecker>,
    fetcher: Arc<dyn ArtifactFetcher>,
    launcher: Arc<dyn Launcher>,
}

impl ProcessSupervisor {
    /// Load the store and rebuild the in-memory records.
    ///
    /// A persisted pid that still names a live process is adopted as
    /// running (without an I/O handle); everything else is reset to stopped.
    pub fn new(store: Arc<ConfigStore>, options: SupervisorOptions, ports: SupervisorPorts) -> Self {
        let mut servers = store.load();
        let mut corrected = false;
        for config in servers.values_mut() {
            match config.pid.filter(|pid| ports.sampler.is_alive(*pid)) {
                Some(pid) => {
                    info!(server = %config.name, pid, "adopting server process from a previous run");
                    if config.status != ServerStatus::Running {
                        config.status = ServerStatus::Running;
                        corrected = true;
                    }
                }
                None => {
                    if config.pid.is_some() || config.status != ServerStatus::Stopped {
                        debug!(server = %config.name, pid = ?config.pid, status = %config.status, "resetting stale runtime state");
                        config.pid = None;
                        config.status = ServerStatus::Stopped;
                        corrected = true;
                    }
                }
            }
        }
        if corrected && !store.save(&servers) {
            error!("failed to persist corrected runtime state at startup");
        }

        let records: HashMap<String, Arc<ProcessRecord>> = servers
            .into_iter()
            .map(|(name, config)| {
                let record = ProcessRecord::new(config, options.console_capacity);
                (name, Arc::new(record))
            })
            .collect();

        info!(
            store = %store.path().display(),
            servers = records.len(),
            "process supervisor initialized"
        );

        Self {
            shared: Arc::new(Shared {
                store,
                records: RwLock::new(records),
                sampler: ports.sampler,
            }),
            create_lock: tokio::sync::Mutex::new(()),
            options,
            runtime: ports.runtime,
            fetcher: ports.fetcher,
            launcher: ports.launcher,
        }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.shared.store
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    /// A poller sharing this supervisor's records. Call `start()` on it.
    pub fn liveness_poller(&self, interval: Duration) -> LivenessPoller {
        LivenessPoller::new(self.shared.clone(), interval)
    }

    /// Register a new server and scaffold its directory.
    pub async fn create(&self, name: &str, params: NewServer) -> Result<ServerConfig> {
        validate_name(name)?;
        let _create = self.create_lock.lock().await;
        self.shared.flush_pending();

        if self.shared.get(name).is_some() || self.shared.store.get(name).is_some() {
            return Err(PanelError::DuplicateName(name.to_string()));
        }
        let min = MemorySize::parse(&params.min_ram)?;
        let max = MemorySize::parse(&params.max_ram)?;
        if min.bytes() > max.bytes() {
            return Err(PanelError::InvalidConfiguration(format!(
                "min memory {} exceeds max memory {}",
                min.as_str(),
                max.as_str()
            )));
        }
        if params.port == 0 {
            return Err(PanelError::InvalidConfiguration(
                "port must be between 1 and 65535".to_string(),
            ));
        }
        let jar = format!("paper-{}.jar", params.version.trim());
        validate_jar_name(&jar)?;

        let path = params
            .storage_path
            .unwrap_or_else(|| self.options.servers_root.join(name));
        let mut config = ServerConfig::with_defaults(name);
        config.path = path.display().to_string();
        config.jar = jar;
        config.min_ram = min.as_str().to_string();
        config.max_ram = max.as_str().to_string();
        config.port = params.port;
        config.storage_limit_gb = params.storage_limit_gb;

        let launch = self.launcher.launch_command(&config)?;
        scaffold::write_all(&config, &launch).map_err(|e| {
            PanelError::IoFailure(format!("failed to scaffold {}: {e}", path.display()))
        })?;

        self.shared.store.insert_new(config.clone())?;

        let record = Arc::new(ProcessRecord::new(config.clone(), self.options.console_capacity));
        let mut records = self.shared.records_mut();
        if records.contains_key(name) {
            return Err(PanelError::DuplicateName(name.to_string()));
        }
        records.insert(name.to_string(), record);
        drop(records);
        info!(server = %name, path = %config.path, port = config.port, "created server");
        Ok(config)
    }

    /// Spawn the server. Returns once the process exists; readiness is
    /// reported later through the status.
    pub async fn start(&self, name: &str) -> Result<()> {
        let record = self.record(name)?;
        self.shared.flush_pending();
        let _lifecycle = record.lifecycle().await;

        match record.status() {
            ServerStatus::Starting | ServerStatus::Running => {
                debug!(server = %name, "start requested but server is already active");
                return Ok(());
            }
            ServerStatus::Stopping => {
                return Err(PanelError::LaunchFailure(format!(
                    "server '{name}' is stopping"
                )));
            }
            ServerStatus::Stopped => {}
        }

        match self.runtime.check_runtime().await {
            Ok(info) => {
                if let Some(problem) = info.problem() {
                    return Err(PanelError::MissingDependency(problem));
                }
            }
            Err(e) => {
                warn!(server = %name, error = %e, "runtime check failed, starting anyway");
            }
        }

        let config = record.config();
        let dir = config.working_dir();
        if !dir.is_dir() {
            return Err(PanelError::LaunchFailure(format!(
                "working directory {} does not exist",
                dir.display()
            )));
        }

        let launch = self.launcher.launch_command(config)?;
        if !dir.join(scaffold::START_SCRIPT).exists()
            && let Err(e) = scaffold::write_start_script(&dir, &launch)
        {
            warn!(server = %name, error = %e, "failed to recreate start script");
        }

        let jar = dir.join(&config.jar);
        if !jar.is_file() {
            let version = config.version_tag().unwrap_or(DEFAULT_FETCH_VERSION);
            info!(server = %name, version, jar = %config.jar, "server jar missing, fetching");
            if !self.fetcher.ensure_artifact(version, &dir, &config.jar).await || !jar.is_file() {
                return Err(PanelError::ArtifactUnavailable(format!(
                    "{} could not be obtained for version {version}",
                    config.jar
                )));
            }
        }

        let mut command = Command::new(&launch.program);
        command
            .args(&launch.args)
            .current_dir(&dir)
            .envs(launch.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);

        let mut child = command.spawn().map_err(|e| {
            PanelError::LaunchFailure(format!("failed to spawn '{}': {e}", launch.program))
        })?;
        let Some(pid) = child.id() else {
            return Err(PanelError::LaunchFailure(
                "spawned process exited before reporting a pid".to_string(),
            ));
        };
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdin = child.stdin.take().map(|stdin| Arc::new(tokio::sync::Mutex::new(stdin)));

        let generation = {
            let mut handle = record.handle().lock().await;
            let generation = record.begin_run(pid);
            *handle = Some(RunningHandle {
                child,
                stdin,
                pid,
                generation,
            });
            generation
        };
        record.persist(&self.shared.store);

        OutputReaderTask::new(
            record.clone(),
            self.shared.store.clone(),
            self.options.readiness.clone(),
            generation,
        )
        .spawn(stdout, stderr);

        info!(server = %name, pid, generation, "server process started");
        Ok(())
    }

    /// Graceful stop with a forced fallback after the grace period.
    pub async fn stop(&self, name: &str) -> Result<StopOutcome> {
        let record = self.record(name)?;
        self.shared.flush_pending();
        let _lifecycle = record.lifecycle().await;

        let state = record.state();
        if state.status == ServerStatus::Stopped {
            return Ok(StopOutcome::AlreadyStopped);
        }

        let taken = record.handle().lock().await.take();
        let outcome = match taken {
            Some(mut handle) => {
                if matches!(handle.child.try_wait(), Ok(Some(_))) {
                    debug!(server = %name, "process already exited");
                    record.mark_exited(handle.generation);
                    record.persist(&self.shared.store);
                    return Ok(StopOutcome::AlreadyStopped);
                }
                record.mark_stopping();
                record.persist(&self.shared.store);
                let outcome = self.stop_child(name, &mut handle).await;
                record.mark_exited(handle.generation);
                outcome
            }
            None => match state.pid.filter(|pid| self.shared.sampler.is_alive(*pid)) {
                Some(pid) => {
                    record.mark_stopping();
                    record.persist(&self.shared.store);
                    let outcome = self.stop_adopted(name, pid).await;
                    record.mark_exited(state.generation);
                    outcome
                }
                None => {
                    record.mark_exited(state.generation);
                    record.persist(&self.shared.store);
                    return Ok(StopOutcome::AlreadyStopped);
                }
            },
        };

        record.persist(&self.shared.store);
        info!(server = %name, outcome = ?outcome, "server stopped");
        Ok(outcome)
    }

    async fn stop_child(&self, name: &str, handle: &mut RunningHandle) -> StopOutcome {
        let grace = self.options.stop_grace;
        match handle.stdin.as_ref() {
            Some(stdin) => {
                if let Err(e) = write_line(stdin, STOP_COMMAND).await {
                    warn!(server = %name, error = %e, "failed to send stop command");
                }
            }
            None => warn!(server = %name, "no stdin handle, waiting for exit before killing"),
        }

        match timeout(grace, handle.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(server = %name, %status, "server exited gracefully");
                return StopOutcome::Graceful;
            }
            Ok(Err(e)) => warn!(server = %name, error = %e, "wait failed, killing"),
            Err(_) => warn!(
                server = %name,
                pid = handle.pid,
                grace_secs = grace.as_secs(),
                "stop grace period elapsed, killing"
            ),
        }

        if let Err(e) = handle.child.start_kill() {
            warn!(server = %name, error = %e, "kill failed");
        }
        if timeout(KILL_WAIT, handle.child.wait()).await.is_err() {
            error!(server = %name, pid = handle.pid, "process still running after kill, giving up");
        }
        StopOutcome::Forced
    }

    async fn stop_adopted(&self, name: &str, pid: u32) -> StopOutcome {
        info!(server = %name, pid, "terminating adopted server process");
        signals::terminate(pid);
        if self.wait_for_exit(pid, self.options.stop_grace).await {
            return StopOutcome::Graceful;
        }
        warn!(server = %name, pid, "adopted process ignored SIGTERM, killing");
        signals::kill(pid);
        if !self.wait_for_exit(pid, KILL_WAIT).await {
            error!(server = %name, pid, "adopted process still running after kill, giving up");
        }
        StopOutcome::Forced
    }

    async fn wait_for_exit(&self, pid: u32, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            if !self.shared.sampler.is_alive(pid) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(ADOPTED_POLL).await;
        }
    }

    /// `stop()`, settle, `start()`.
    pub async fn restart(&self, name: &str) -> Result<()> {
        self.stop(name).await?;
        sleep(self.options.restart_delay).await;
        self.start(name).await
    }

    /// Stop and unregister a server. Files on disk are kept.
    pub async fn delete(&self, name: &str) -> Result<()> {
        self.stop(name).await?;
        if !self.shared.store.remove(name) {
            return Err(PanelError::IoFailure(format!(
                "failed to remove server '{name}' from the store"
            )));
        }
        self.shared.records_mut().remove(name);
        info!(server = %name, "deleted server");
        Ok(())
    }

    /// Write one line to the server's stdin. False unless it was delivered.
    pub async fn send_command(&self, name: &str, command: &str) -> bool {
        if command.contains(['\n', '\r']) {
            warn!(server = %name, "rejected command containing a line break");
            return false;
        }
        let Some(record) = self.shared.get(name) else {
            return false;
        };
        if !record.status().is_active() {
            return false;
        }

        // Only hold the handle lock for the exit check; the write itself may stall.
        let stdin = {
            let mut guard = record.handle().lock().await;
            let Some(handle) = guard.as_mut() else {
                debug!(server = %name, "no stdin handle for server");
                return false;
            };
            if !matches!(handle.child.try_wait(), Ok(None)) {
                return false;
            }
            let Some(stdin) = handle.stdin.clone() else {
                return false;
            };
            stdin
        };
        match write_line(&stdin, command).await {
            Ok(()) => {
                debug!(server = %name, command, "sent console command");
                true
            }
            Err(e) => {
                warn!(server = %name, error = %e, "failed to write console command");
                false
            }
        }
    }

    /// Most recent console lines, oldest first. Empty for unknown servers.
    pub fn get_console_output(&self, name: &str, max_lines: usize) -> Vec<String> {
        self.shared
            .get(name)
            .map(|record| record.console_output(max_lines))
            .unwrap_or_default()
    }

    /// Current status, corrected first if the process vanished.
    pub async fn get_status(&self, name: &str) -> Result<ServerStatus> {
        let record = self.record(name)?;
        if record.status().may_have_process() {
            self.shared.confirm_alive(&record).await;
        }
        Ok(record.status())
    }

    /// Fresh CPU and memory gauges for an active server.
    pub async fn get_stats(&self, name: &str) -> Option<ResourceGauges> {
        let record = self.shared.get(name)?;
        if !record.status().is_active() || !self.shared.confirm_alive(&record).await {
            return None;
        }
        if let Some(gauges) = record.state().pid.and_then(|pid| self.shared.sampler.sample(pid)) {
            record.set_gauges(gauges);
        }
        Some(record.gauges())
    }

    pub fn list(&self) -> Vec<ServerSummary> {
        self.shared
            .snapshot()
            .into_iter()
            .map(|record| {
                let state = record.state();
                let config = record.config();
                ServerSummary {
                    name: config.name.clone(),
                    status: state.status,
                    pid: state.pid,
                    port: config.port,
                    path: config.path.clone(),
                    jar: config.jar.clone(),
                    gauges: record.gauges(),
                }
            })
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.shared
            .snapshot()
            .iter()
            .map(|record| record.name().to_string())
            .collect()
    }

    /// Stop every server that is not already stopped.
    pub async fn stop_all(&self) {
        for name in self.names() {
            match self.stop(&name).await {
                Ok(StopOutcome::AlreadyStopped) => {}
                Ok(outcome) => debug!(server = %name, outcome = ?outcome, "stopped on shutdown"),
                Err(e) => error!(server = %name, error = %e, "failed to stop server"),
            }
        }
    }

    fn record(&self, name: &str) -> Result<Arc<ProcessRecord>> {
        self.shared
            .get(name)
            .ok_or_else(|| PanelError::NotFound(name.to_string()))
    }
}

/// Server names become directory names.
fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| Err(PanelError::InvalidName(format!("'{name}': {reason}")));
    if name.trim().is_empty() {
        return invalid("must not be empty");
    }
    if name != name.trim() {
        return invalid("must not start or end with whitespace");
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return invalid("must not contain path separators");
    }
    if name.chars().any(char::is_control) {
        return invalid("must not contain control characters");
    }
    Ok(())
}

/// Write `line` and a newline, giving up after `STDIN_WRITE_TIMEOUT`. A child
/// that stopped reading its stdin fills the pipe and would block forever.
async fn write_line(stdin: &SharedStdin, line: &str) -> std::io::Result<()> {
    let mut bytes = Vec::with_capacity(line.len() + 1);
    bytes.extend_from_slice(line.as_bytes());
    bytes.push(b'\n');
    let write = async {
        let mut stdin = stdin.lock().await;
        stdin.write_all(&bytes).await?;
        stdin.flush().await
    };
    timeout(STDIN_WRITE_TIMEOUT, write).await.map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::TimedOut, "stdin write timed out")
    })?
}
