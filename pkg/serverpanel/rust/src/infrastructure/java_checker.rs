// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::domain::ports::{Launcher, RuntimeChecker, RuntimeInfo};
use crate::domain::{LaunchCommand, PanelError, Result, ServerConfig, java_command};
use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

pub const MIN_JAVA_MAJOR: u32 = 17;
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Probes `<java> -version`.
pub struct JavaRuntimeChecker {
    java: String,
}

impl JavaRuntimeChecker {
    pub fn new(java: impl Into<String>) -> Self {
        Self { java: java.into() }
    }
}

#[async_trait]
impl RuntimeChecker for JavaRuntimeChecker {
    async fn check_runtime(&self) -> Result<RuntimeInfo> {
        let output = Command::new(&self.java)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match timeout(PROBE_TIMEOUT, output).await {
            Err(_) => {
                return Err(PanelError::IoFailure(format!(
                    "'{} -version' did not finish within {}s",
                    self.java,
                    PROBE_TIMEOUT.as_secs()
                )));
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => {
                debug!(java = %self.java, "java executable not found");
                return Ok(RuntimeInfo::default());
            }
            Ok(Err(e)) => {
                return Err(PanelError::IoFailure(format!(
                    "failed to run '{} -version': {e}",
                    self.java
                )));
            }
            Ok(Ok(output)) => output,
        };

        // The banner goes to stderr on every JDK vendor we know of.
        let banner = [output.stderr.as_slice(), output.stdout.as_slice()].concat();
        let banner = String::from_utf8_lossy(&banner);
        let version = parse_version(&banner);
        let compatible = version
            .as_deref()
            .and_then(major_version)
            .is_some_and(|major| major >= MIN_JAVA_MAJOR);
        debug!(java = %self.java, version = ?version, compatible, "probed java runtime");

        Ok(RuntimeInfo {
            installed: true,
            version,
            compatible,
        })
    }
}

/// First double-quoted token in a `java -version` banner, e.g.
/// `openjdk version "17.0.2" 2022-01-18`.
pub fn parse_version(banner: &str) -> Option<String> {
    let start = banner.find('"')? + 1;
    let len = banner[start..].find('"')?;
    let version = &banner[start..start + len];
    (!version.is_empty()).then(|| version.to_string())
}

/// `17.0.2` -> 17, `1.8.0_392` -> 8, `21-ea` -> 21.
pub fn major_version(version: &str) -> Option<u32> {
    let mut parts = version.split(['.', '_', '-', '+']);
    let first: u32 = parts.next()?.parse().ok()?;
    if first == 1 {
        parts.next()?.parse().ok()
    } else {
        Some(first)
    }
}

/// `Launcher` that runs the configured java binary with the tuned argv.
pub struct JavaLauncher {
    java: String,
}

impl JavaLauncher {
    pub fn new(java: impl Into<String>) -> Self {
        Self { java: java.into() }
    }
}

impl Launcher for JavaLauncher {
    fn launch_command(&self, config: &ServerConfig) -> Result<LaunchCommand> {
        java_command(&self.java, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_banners() {
        let openjdk = "openjdk version \"17.0.2\" 2022-01-18\nOpenJDK Runtime Environment";
        assert_eq!(parse_version(openjdk).as_deref(), Some("17.0.2"));

        let legacy = "java version \"1.8.0_392\"\nJava(TM) SE Runtime Environment";
        assert_eq!(parse_version(legacy).as_deref(), Some("1.8.0_392"));

        assert_eq!(parse_version("no quotes here"), None);
        assert_eq!(parse_version("version \"\""), None);
    }

    #[test]
    fn test_major_version() {
        assert_eq!(major_version("17.0.2"), Some(17));
        assert_eq!(major_version("21"), Some(21));
        assert_eq!(major_version("1.8.0_392"), Some(8));
        assert_eq!(major_version("22-ea"), Some(22));
        assert_eq!(major_version("garbage"), None);
    }

    #[tokio::test]
    async fn test_missing_binary_reports_not_installed() {
        let checker = JavaRuntimeChecker::new("/nonexistent/bin/java-for-tests");
        let info = checker.check_runtime().await.unwrap();
        assert!(!info.installed);
        assert!(!info.compatible);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fake_java_banner() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("java");
        std::fs::write(
            &fake,
            "#!/bin/sh\necho 'openjdk version \"11.0.20\" 2023-07-18' >&2\n",
        )
        .unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let info = JavaRuntimeChecker::new(fake.display().to_string())
            .check_runtime()
            .await
            .unwrap();
        assert!(info.installed);
        assert_eq!(info.version.as_deref(), Some("11.0.20"));
        assert!(!info.compatible);
    }
}
