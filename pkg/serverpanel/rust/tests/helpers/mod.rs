// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

#![allow(dead_code)]

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serverpanel::domain::ports::{ArtifactFetcher, Launcher, RuntimeChecker, RuntimeInfo};
use serverpanel::domain::{LaunchCommand, PanelError};
use serverpanel::infrastructure::SysinfoSampler;
use serverpanel::{
    ConfigStore, NewServer, ProcessSupervisor, ServerConfig, ServerStatus, SupervisorOptions,
    SupervisorPorts,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const READY_LINE: &str = "Done (1.234s)! For help, type \"help\"";

/// Prints a boot line, then acts on stdin: `ready` prints the readiness
/// line, `stop` exits, anything else is echoed back. Builtins only, so no
/// grandchild keeps the output pipes open.
pub const SERVER_SCRIPT: &str = r#"echo "Loading libraries, please wait..."
while read line; do
  case "$line" in
    ready) echo 'Done (1.234s)! For help, type "help"' ;;
    stop) echo "Stopping the server"; exit 0 ;;
    *) echo "echo: $line" ;;
  esac
done"#;

/// Becomes ready immediately and ignores `stop`.
pub const STUBBORN_SCRIPT: &str = r#"echo 'Done (0.5s)! For help, type "help"'
while read line; do :; done"#;

/// Becomes ready, then never reads its stdin again.
pub const DEAF_SCRIPT: &str = r#"echo 'Done (0.5s)! For help, type "help"'
exec sleep 30"#;

/// Prints 1500 numbered lines, then idles.
pub const FLOOD_SCRIPT: &str = r#"i=0
while [ $i -lt 1500 ]; do echo "line $i"; i=$((i+1)); done
while read line; do :; done"#;

/// Closes its output right away but keeps running.
pub const SILENT_SCRIPT: &str = r#"exec >/dev/null 2>&1
while read line; do :; done"#;

/// Exits on its own shortly after starting.
pub const SHORT_LIVED_SCRIPT: &str = r#"echo 'Done (0.1s)! For help, type "help"'
echo "bye"
exit 3"#;

/// Launches `/bin/sh -c <script>` instead of a JVM.
pub struct ScriptLauncher {
    script: Mutex<String>,
}

impl ScriptLauncher {
    pub fn new(script: &str) -> Self {
        Self {
            script: Mutex::new(script.to_string()),
        }
    }

    pub fn set_script(&self, script: &str) {
        *self.script.lock().unwrap() = script.to_string();
    }
}

impl Launcher for ScriptLauncher {
    fn launch_command(&self, _config: &ServerConfig) -> serverpanel::Result<LaunchCommand> {
        Ok(LaunchCommand {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), self.script.lock().unwrap().clone()],
            env: vec![("PYTHONUNBUFFERED".to_string(), "1".to_string())],
        })
    }
}

/// Launcher pointing at a program that does not exist.
pub struct BrokenLauncher;

impl Launcher for BrokenLauncher {
    fn launch_command(&self, _config: &ServerConfig) -> serverpanel::Result<LaunchCommand> {
        Ok(LaunchCommand {
            program: "/nonexistent/serverpanel-test-binary".to_string(),
            args: vec![],
            env: vec![],
        })
    }
}

pub enum StubRuntime {
    Compatible,
    Missing,
    Outdated,
    ProbeFails,
}

#[async_trait]
impl RuntimeChecker for StubRuntime {
    async fn check_runtime(&self) -> serverpanel::Result<RuntimeInfo> {
        match self {
            StubRuntime::Compatible => Ok(RuntimeInfo {
                installed: true,
                version: Some("21.0.2".to_string()),
                compatible: true,
            }),
            StubRuntime::Missing => Ok(RuntimeInfo::default()),
            StubRuntime::Outdated => Ok(RuntimeInfo {
                installed: true,
                version: Some("1.8.0_392".to_string()),
                compatible: false,
            }),
            StubRuntime::ProbeFails => Err(PanelError::IoFailure("probe timed out".to_string())),
        }
    }
}

/// Writes a placeholder jar when `succeed` is set; counts calls.
pub struct StubFetcher {
    succeed: bool,
    calls: AtomicUsize,
    last_version: Mutex<Option<String>>,
}

impl StubFetcher {
    pub fn new(succeed: bool) -> Self {
        Self {
            succeed,
            calls: AtomicUsize::new(0),
            last_version: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_version(&self) -> Option<String> {
        self.last_version.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactFetcher for StubFetcher {
    async fn ensure_artifact(&self, version_tag: &str, dest_dir: &Path, file_name: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_version.lock().unwrap() = Some(version_tag.to_string());
        if !self.succeed {
            return false;
        }
        std::fs::write(dest_dir.join(file_name), b"PK\x03\x04").is_ok()
    }
}

/// A supervisor over a temp directory with stub ports.
pub struct TestPanel {
    pub dir: TempDir,
    pub store: Arc<ConfigStore>,
    pub supervisor: ProcessSupervisor,
    pub launcher: Arc<ScriptLauncher>,
    pub fetcher: Arc<StubFetcher>,
}

pub struct PanelBuilder {
    script: String,
    runtime: StubRuntime,
    fetch_succeeds: bool,
    stop_grace: Duration,
    broken_launcher: bool,
    dir: Option<TempDir>,
}

impl PanelBuilder {
    pub fn new(script: &str) -> Self {
        Self {
            script: script.to_string(),
            runtime: StubRuntime::Compatible,
            fetch_succeeds: true,
            stop_grace: Duration::from_secs(5),
            broken_launcher: false,
            dir: None,
        }
    }

    pub fn runtime(mut self, runtime: StubRuntime) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn fetch_fails(mut self) -> Self {
        self.fetch_succeeds = false;
        self
    }

    pub fn stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn broken_launcher(mut self) -> Self {
        self.broken_launcher = true;
        self
    }

    /// Reuse an existing directory (and the store inside it).
    pub fn in_dir(mut self, dir: TempDir) -> Self {
        self.dir = Some(dir);
        self
    }

    pub fn build(self) -> TestPanel {
        let dir = self.dir.unwrap_or_else(|| tempfile::tempdir().unwrap());
        let store = Arc::new(ConfigStore::open(dir.path()));
        let launcher = Arc::new(ScriptLauncher::new(&self.script));
        let fetcher = Arc::new(StubFetcher::new(self.fetch_succeeds));
        let options = SupervisorOptions {
            stop_grace: self.stop_grace,
            restart_delay: Duration::from_millis(100),
            servers_root: dir.path().join("servers"),
            ..SupervisorOptions::default()
        };
        let launch_port: Arc<dyn Launcher> = if self.broken_launcher {
            Arc::new(BrokenLauncher)
        } else {
            launcher.clone()
        };
        let ports = SupervisorPorts {
            runtime: Arc::new(self.runtime),
            fetcher: fetcher.clone(),
            sampler: Arc::new(SysinfoSampler::new()),
            launcher: launch_port,
        };
        let supervisor = ProcessSupervisor::new(store.clone(), options, ports);
        TestPanel {
            dir,
            store,
            supervisor,
            launcher,
            fetcher,
        }
    }
}

impl TestPanel {
    pub fn new(script: &str) -> Self {
        PanelBuilder::new(script).build()
    }

    pub async fn create(&self, name: &str) -> ServerConfig {
        self.supervisor
            .create(name, NewServer::default())
            .await
            .unwrap_or_else(|e| panic!("failed to create {name}: {e}"))
    }

    pub fn pid(&self, name: &str) -> Option<u32> {
        self.supervisor
            .list()
            .into_iter()
            .find(|s| s.name == name)
            .and_then(|s| s.pid)
    }

    /// Status as recorded, without the self-healing probe.
    pub fn recorded_status(&self, name: &str) -> Option<ServerStatus> {
        self.supervisor
            .list()
            .into_iter()
            .find(|s| s.name == name)
            .map(|s| s.status)
    }

    pub async fn wait_for_status(&self, name: &str, want: ServerStatus, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.recorded_status(name) == Some(want) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    pub async fn wait_for_console(&self, name: &str, needle: &str, timeout: Duration) -> bool {
        wait_for(timeout, || {
            self.supervisor
                .get_console_output(name, 1000)
                .iter()
                .any(|l| l.contains(needle))
        })
        .await
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
pub async fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

/// Check if a PID names a live, non-zombie process.
pub fn pid_is_alive(pid: u32) -> bool {
    use serverpanel::domain::ports::ResourceSampler;
    SysinfoSampler::new().is_alive(pid)
}

pub fn kill_pid(pid: u32, sig: Signal) {
    signal::kill(Pid::from_raw(pid as i32), sig).expect("failed to signal process");
}
