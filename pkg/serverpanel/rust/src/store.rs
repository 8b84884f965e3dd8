// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Durable `name -> ServerConfig` map backed by `servers.json`.
//!
//! Writes go to a temp file that is fsynced and renamed over the target, so
//! readers never observe a partial file. A file that fails to parse is moved
//! to `servers.json.backup` and replaced by an empty map. A file that cannot
//! be read at all is left alone, and every mutating helper refuses to write.

use crate::domain::{PanelError, ServerConfig, ServerStatus, normalize_document};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

pub const STORE_FILE: &str = "servers.json";
const TMP_SUFFIX: &str = "tmp";
const BACKUP_SUFFIX: &str = "backup";
#[cfg_attr(not(windows), allow(dead_code))]
const ASIDE_SUFFIX: &str = "bak";
const WRITE_PROBE: &str = ".write_test";
const FALLBACK_DIR: &str = "serverpanel";

pub type ServerMap = BTreeMap<String, ServerConfig>;

/// Pick the directory holding `servers.json`.
///
/// Priority: `override_dir`, then the directory of the running executable,
/// then the current directory. The chosen directory must accept a probe
/// write; otherwise `<tmp>/serverpanel` is used.
pub fn resolve_storage_location(override_dir: Option<PathBuf>) -> PathBuf {
    let preferred = override_dir
        .or_else(|| {
            std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf))
        })
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    match probe_writable(&preferred) {
        Ok(()) => preferred,
        Err(e) => {
            let fallback = std::env::temp_dir().join(FALLBACK_DIR);
            warn!(
                dir = %preferred.display(),
                fallback = %fallback.display(),
                error = %e,
                "storage directory is not writable, falling back"
            );
            if let Err(e) = fs::create_dir_all(&fallback) {
                error!(dir = %fallback.display(), error = %e, "failed to create fallback storage directory");
            }
            fallback
        }
    }
}

fn probe_writable(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let probe = dir.join(WRITE_PROBE);
    File::create(&probe)?.write_all(b"ok")?;
    fs::remove_file(&probe)
}

/// File-backed server store. Every public method is one critical section.
#[derive(Debug)]
pub struct ConfigStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl ConfigStore {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(STORE_FILE)
    }

    /// Read and normalize the store. Never fails; an unreadable file reads as
    /// empty. See module docs.
    pub fn load(&self) -> ServerMap {
        let _guard = self.guard();
        self.load_locked().unwrap_or_default()
    }

    /// Normalize and atomically replace the store. Returns false on any I/O
    /// failure, leaving the previous file intact.
    pub fn save(&self, servers: &ServerMap) -> bool {
        let _guard = self.guard();
        self.save_locked(servers)
    }

    pub fn get(&self, name: &str) -> Option<ServerConfig> {
        let _guard = self.guard();
        self.load_locked().ok()?.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        let _guard = self.guard();
        self.load_locked()
            .map(|servers| servers.into_keys().collect())
            .unwrap_or_default()
    }

    /// Insert or replace the entry for `config.name`.
    pub fn insert(&self, config: ServerConfig) -> bool {
        let _guard = self.guard();
        let Ok(mut servers) = self.load_locked() else {
            return false;
        };
        servers.insert(config.name.clone(), config);
        self.save_locked(&servers)
    }

    /// Insert `config` unless its name is already taken.
    pub fn insert_new(&self, config: ServerConfig) -> Result<(), PanelError> {
        let _guard = self.guard();
        let mut servers = self.load_locked().map_err(|e| {
            PanelError::IoFailure(format!("failed to read {}: {e}", self.path().display()))
        })?;
        if servers.contains_key(&config.name) {
            return Err(PanelError::DuplicateName(config.name));
        }
        let name = config.name.clone();
        servers.insert(name.clone(), config);
        if !self.save_locked(&servers) {
            return Err(PanelError::IoFailure(format!(
                "failed to persist server '{name}'"
            )));
        }
        Ok(())
    }

    /// True if the entry is gone afterwards (absent entries count as removed).
    pub fn remove(&self, name: &str) -> bool {
        let _guard = self.guard();
        let Ok(mut servers) = self.load_locked() else {
            return false;
        };
        if servers.remove(name).is_none() {
            return true;
        }
        self.save_locked(&servers)
    }

    /// Overwrite the runtime fields of one entry, keeping everything else.
    pub fn update_runtime(&self, name: &str, pid: Option<u32>, status: ServerStatus) -> bool {
        let _guard = self.guard();
        let Ok(mut servers) = self.load_locked() else {
            return false;
        };
        let Some(entry) = servers.get_mut(name) else {
            warn!(server = %name, "cannot persist runtime state for unknown server");
            return false;
        };
        if entry.pid == pid && entry.status == status {
            return true;
        }
        entry.pid = pid;
        entry.status = status;
        self.save_locked(&servers)
    }

    /// Write a timestamped copy of the current store next to it.
    pub fn backup(&self) -> Option<PathBuf> {
        let _guard = self.guard();
        let servers = self.load_locked().ok()?;
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let target = self.dir.join(format!("servers.backup.{secs}.json"));
        match render(&servers).and_then(|bytes| fs::write(&target, bytes)) {
            Ok(()) => {
                info!(path = %target.display(), servers = servers.len(), "wrote server store backup");
                Some(target)
            }
            Err(e) => {
                error!(path = %target.display(), error = %e, "failed to write server store backup");
                None
            }
        }
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Absent and corrupt files read as empty; any other read error is
    /// returned so callers do not overwrite contents they never saw.
    fn load_locked(&self) -> io::Result<ServerMap> {
        let path = self.path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "server store absent, creating an empty one");
                let empty = ServerMap::new();
                self.save_locked(&empty);
                return Ok(empty);
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to read server store");
                return Err(e);
            }
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(doc) => Ok(normalize_document(doc)),
            Err(e) => {
                let backup = self.sibling(BACKUP_SUFFIX);
                warn!(
                    path = %path.display(),
                    backup = %backup.display(),
                    error = %e,
                    "server store is corrupt, quarantining it"
                );
                if let Err(e) = quarantine(&path, &backup) {
                    error!(error = %e, "failed to quarantine corrupt server store");
                }
                let empty = ServerMap::new();
                self.save_locked(&empty);
                Ok(empty)
            }
        }
    }

    fn save_locked(&self, servers: &ServerMap) -> bool {
        let target = self.path();
        let tmp = self.sibling(TMP_SUFFIX);
        let result = render(servers)
            .and_then(|bytes| write_synced(&tmp, &bytes))
            .and_then(|()| self.replace(&tmp, &target));
        match result {
            Ok(()) => true,
            Err(e) => {
                error!(path = %target.display(), error = %e, "failed to save server store");
                let _ = fs::remove_file(&tmp);
                false
            }
        }
    }

    #[cfg(not(windows))]
    fn replace(&self, tmp: &Path, target: &Path) -> io::Result<()> {
        fs::rename(tmp, target)?;
        // Persist the rename itself.
        File::open(&self.dir)?.sync_all()
    }

    #[cfg(windows)]
    fn replace(&self, tmp: &Path, target: &Path) -> io::Result<()> {
        if !target.exists() {
            return fs::rename(tmp, target);
        }
        let aside = self.sibling(ASIDE_SUFFIX);
        let _ = fs::remove_file(&aside);
        fs::rename(target, &aside)?;
        if let Err(e) = fs::rename(tmp, target) {
            let _ = fs::rename(&aside, target);
            return Err(e);
        }
        let _ = fs::remove_file(&aside);
        Ok(())
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{STORE_FILE}.{suffix}"))
    }
}

fn render(servers: &ServerMap) -> io::Result<Vec<u8>> {
    let doc = serde_json::to_value(servers).map_err(io::Error::other)?;
    // Round-trip through normalization so what lands on disk is exactly what
    // load() would hand back.
    let normalized = normalize_document(doc);
    let mut bytes = serde_json::to_vec_pretty(&normalized).map_err(io::Error::other)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn quarantine(path: &Path, backup: &Path) -> io::Result<()> {
    match fs::remove_file(backup) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::rename(path, backup)
}
