// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::domain::ServerStatus;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;

pub const DEFAULT_JAR: &str = "paper-1.20.1.jar";
pub const DEFAULT_MIN_RAM: &str = "512M";
pub const DEFAULT_MAX_RAM: &str = "1024M";
pub const DEFAULT_PORT: u16 = 25565;
pub const DEFAULT_STORAGE_LIMIT_GB: u64 = 10;

const KNOWN_KEYS: [&str; 9] = [
    "name",
    "path",
    "jar",
    "min_ram",
    "max_ram",
    "port",
    "storage_limit",
    "pid",
    "status",
];

/// Persisted description of one server plus its last known runtime state.
///
/// Keys this crate does not own are kept in `extra` and written back
/// untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub path: String,
    pub jar: String,
    pub min_ram: String,
    pub max_ram: String,
    pub port: u16,
    #[serde(rename = "storage_limit")]
    pub storage_limit_gb: u64,
    pub pid: Option<u32>,
    pub status: ServerStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServerConfig {
    /// A config with every field at its documented default.
    pub fn with_defaults(name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: format!("servers/{name}"),
            jar: DEFAULT_JAR.to_string(),
            min_ram: DEFAULT_MIN_RAM.to_string(),
            max_ram: DEFAULT_MAX_RAM.to_string(),
            port: DEFAULT_PORT,
            storage_limit_gb: DEFAULT_STORAGE_LIMIT_GB,
            pid: None,
            status: ServerStatus::Stopped,
            extra: Map::new(),
        }
    }

    /// Working directory, resolved against the current directory when relative.
    pub fn working_dir(&self) -> PathBuf {
        let path = PathBuf::from(&self.path);
        if path.is_absolute() {
            return path;
        }
        std::env::current_dir()
            .map(|cwd| cwd.join(&path))
            .unwrap_or(path)
    }

    /// Version embedded in a `paper-<version>.jar` artifact name.
    pub fn version_tag(&self) -> Option<&str> {
        self.jar
            .strip_prefix("paper-")
            .and_then(|rest| rest.strip_suffix(".jar"))
            .filter(|v| !v.is_empty())
    }
}

/// Normalize a whole store document.
///
/// Anything that is not a JSON object becomes the empty map; entries that
/// are not objects are dropped.
pub fn normalize_document(doc: Value) -> BTreeMap<String, ServerConfig> {
    let Value::Object(entries) = doc else {
        warn!("server store document is not an object, starting from an empty map");
        return BTreeMap::new();
    };

    entries
        .into_iter()
        .filter_map(|(key, entry)| normalize_entry(&key, entry).map(|cfg| (key, cfg)))
        .collect()
}

/// Normalize a single entry stored under `key`, filling defaults for missing
/// or malformed fields.
pub fn normalize_entry(key: &str, entry: Value) -> Option<ServerConfig> {
    let Value::Object(mut obj) = entry else {
        warn!(server = %key, "skipping server entry that is not an object");
        return None;
    };

    let mut cfg = ServerConfig::with_defaults(key);

    if let Some(Value::String(name)) = obj.remove("name")
        && name != key
    {
        warn!(server = %key, stored_name = %name, "stored name differs from key, using key");
    }
    if let Some(path) = take_string(&mut obj, "path") {
        cfg.path = path;
    }
    if let Some(jar) = take_string(&mut obj, "jar") {
        cfg.jar = jar;
    }
    if let Some(min_ram) = take_string(&mut obj, "min_ram") {
        cfg.min_ram = min_ram;
    }
    if let Some(max_ram) = take_string(&mut obj, "max_ram") {
        cfg.max_ram = max_ram;
    }
    if let Some(port) = obj
        .remove("port")
        .and_then(|v| v.as_u64())
        .filter(|p| (1..=u64::from(u16::MAX)).contains(p))
    {
        cfg.port = port as u16;
    }
    if let Some(limit) = obj.remove("storage_limit").and_then(|v| v.as_u64()) {
        cfg.storage_limit_gb = limit;
    }
    cfg.pid = obj
        .remove("pid")
        .and_then(|v| v.as_u64())
        .filter(|pid| *pid > 0 && *pid <= u64::from(u32::MAX))
        .map(|pid| pid as u32);
    if let Some(Value::String(status)) = obj.remove("status") {
        cfg.status = status.parse().unwrap_or_else(|e| {
            warn!(server = %key, error = %e, "resetting unknown status to stopped");
            ServerStatus::Stopped
        });
    }

    for known in KNOWN_KEYS {
        obj.remove(known);
    }
    cfg.extra = obj;
    Some(cfg)
}

fn take_string(obj: &mut Map<String, Value>, key: &str) -> Option<String> {
    match obj.remove(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    }
}
