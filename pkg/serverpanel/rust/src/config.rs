// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Panel configuration from environment variables
//!
//! Every setting has a default, so an empty environment yields a working
//! configuration.

use crate::supervisor::SupervisorOptions;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_STOP_GRACE_SECS: u64 = 30;
const DEFAULT_RESTART_DELAY_SECS: u64 = 2;
const DEFAULT_JAVA: &str = "java";
const DEFAULT_STOP_ON_EXIT: bool = false;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Directory holding `servers.json`; `None` means the app-local default.
    pub data_dir: Option<PathBuf>,

    /// Parent of newly created server directories
    pub servers_dir: PathBuf,

    pub poll_interval: Duration,

    /// How long `stop` waits after the stop command before killing
    pub stop_grace: Duration,

    pub restart_delay: Duration,

    /// Java executable used for launches and the runtime check
    pub java: String,

    /// Stop all servers when the daemon exits
    pub stop_on_exit: bool,

    pub log_level: String,
}

impl PanelConfig {
    pub fn from_env() -> Self {
        Self {
            data_dir: env::var_os("SERVERPANEL_DATA_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            servers_dir: env::var_os("SERVERPANEL_SERVERS_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(default_servers_dir),
            poll_interval: Duration::from_millis(Self::parse_u64(
                "SERVERPANEL_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )),
            stop_grace: Duration::from_secs(Self::parse_u64(
                "SERVERPANEL_STOP_GRACE_SECS",
                DEFAULT_STOP_GRACE_SECS,
            )),
            restart_delay: Duration::from_secs(Self::parse_u64(
                "SERVERPANEL_RESTART_DELAY_SECS",
                DEFAULT_RESTART_DELAY_SECS,
            )),
            java: env::var("SERVERPANEL_JAVA")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_JAVA.to_string()),
            stop_on_exit: Self::parse_bool("SERVERPANEL_STOP_ON_EXIT", DEFAULT_STOP_ON_EXIT),
            log_level: Self::parse_log_level(),
        }
    }

    fn parse_u64(var_name: &str, default: u64) -> u64 {
        env::var(var_name)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(default)
    }

    fn parse_bool(var_name: &str, default: bool) -> bool {
        env::var(var_name)
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" => Some(false),
                _ => None,
            })
            .unwrap_or(default)
    }

    fn parse_log_level() -> String {
        // SERVERPANEL_LOG_LEVEL > RUST_LOG > default
        env::var("SERVERPANEL_LOG_LEVEL")
            .or_else(|_| env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval.is_zero() {
            return Err("SERVERPANEL_POLL_INTERVAL_MS must be greater than zero".to_string());
        }
        if self.java.trim().is_empty() {
            return Err("SERVERPANEL_JAVA must not be empty".to_string());
        }
        Ok(())
    }

    pub fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions {
            stop_grace: self.stop_grace,
            restart_delay: self.restart_delay,
            servers_root: self.servers_dir.clone(),
            ..SupervisorOptions::default()
        }
    }
}

fn default_servers_dir() -> PathBuf {
    env::current_dir()
        .map(|cwd| cwd.join("servers"))
        .unwrap_or_else(|_| PathBuf::from("servers"))
}
