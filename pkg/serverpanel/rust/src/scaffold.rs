// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Files written into a fresh server directory.

use crate::domain::{LaunchCommand, ServerConfig};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc2822;
use tracing::debug;

pub const SUBDIRS: [&str; 2] = ["plugins", "logs"];

#[cfg(unix)]
pub const START_SCRIPT: &str = "start.sh";
#[cfg(not(unix))]
pub const START_SCRIPT: &str = "start.bat";

/// Create the server directory layout and every scaffold file.
pub fn write_all(config: &ServerConfig, launch: &LaunchCommand) -> io::Result<()> {
    let dir = config.working_dir();
    for sub in SUBDIRS {
        fs::create_dir_all(dir.join(sub))?;
    }
    write_start_script(&dir, launch)?;
    fs::write(dir.join("server.properties"), server_properties(config))?;
    fs::write(dir.join("eula.txt"), "eula=true\n")?;
    debug!(server = %config.name, dir = %dir.display(), "scaffolded server directory");
    Ok(())
}

/// Write the start script for manual launches; returns its path.
pub fn write_start_script(dir: &Path, launch: &LaunchCommand) -> io::Result<PathBuf> {
    let path = dir.join(START_SCRIPT);
    fs::write(&path, start_script(launch))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    }
    Ok(path)
}

#[cfg(unix)]
fn start_script(launch: &LaunchCommand) -> String {
    format!("#!/bin/sh\ncd \"$(dirname \"$0\")\"\nexec {}\n", launch.script_line())
}

#[cfg(not(unix))]
fn start_script(launch: &LaunchCommand) -> String {
    format!("@echo off\r\ncd /d \"%~dp0\"\r\n{}\r\npause\r\n", launch.script_line())
}

pub fn server_properties(config: &ServerConfig) -> String {
    let generated = OffsetDateTime::now_utc()
        .format(&Rfc2822)
        .unwrap_or_default();
    format!(
        "#Minecraft server properties\n\
         #Generated {generated}\n\
         server-port={port}\n\
         motd=\\u00A76{name} \\u00A77- Paper server\n\
         online-mode=true\n\
         max-players=20\n\
         difficulty=easy\n\
         gamemode=survival\n\
         pvp=true\n\
         spawn-protection=16\n\
         view-distance=10\n\
         simulation-distance=10\n\
         network-compression-threshold=256\n\
         sync-chunk-writes=false\n\
         enable-command-block=false\n\
         level-name=world\n",
        port = config.port,
        name = config.name,
    )
}
