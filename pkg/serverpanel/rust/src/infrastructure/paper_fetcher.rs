// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Downloads Paper server jars from the PaperMC v2 API.

use crate::domain::ports::ArtifactFetcher;
use async_trait::async_trait;
use serde::Deserialize;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

pub const PAPER_API: &str = "https://api.papermc.io/v2/projects/paper";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
struct BuildsResponse {
    builds: Vec<Build>,
}

#[derive(Debug, Deserialize)]
struct Build {
    build: u64,
    downloads: Downloads,
}

#[derive(Debug, Deserialize)]
struct Downloads {
    application: Application,
}

#[derive(Debug, Deserialize)]
struct Application {
    name: String,
}

pub struct PaperArtifactFetcher {
    base_url: String,
    timeout: Duration,
}

impl PaperArtifactFetcher {
    pub fn new() -> Self {
        Self::with_base_url(PAPER_API)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: REQUEST_TIMEOUT,
        }
    }
}

impl Default for PaperArtifactFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactFetcher for PaperArtifactFetcher {
    async fn ensure_artifact(&self, version_tag: &str, dest_dir: &Path, file_name: &str) -> bool {
        let target = dest_dir.join(file_name);
        if is_nonempty_file(&target) {
            return true;
        }

        let base_url = self.base_url.clone();
        let timeout = self.timeout;
        let version = version_tag.to_string();
        let target_clone = target.clone();
        let result =
            tokio::task::spawn_blocking(move || download(&base_url, timeout, &version, &target_clone))
                .await;

        match result {
            Ok(Ok(build)) => {
                info!(version = %version_tag, build, path = %target.display(), "downloaded server jar");
                is_nonempty_file(&target)
            }
            Ok(Err(e)) => {
                warn!(version = %version_tag, error = %e, "server jar download failed");
                false
            }
            Err(e) => {
                error!(error = %e, "server jar download task failed");
                false
            }
        }
    }
}

fn download(base_url: &str, timeout: Duration, version: &str, target: &Path) -> io::Result<u64> {
    let agent = ureq::AgentBuilder::new().timeout(timeout).build();

    let builds: BuildsResponse = agent
        .get(&format!("{base_url}/versions/{version}/builds"))
        .call()
        .map_err(io::Error::other)?
        .into_json()?;
    let (build, name) = latest_build(&builds).ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("no builds published for {version}"))
    })?;

    let response = agent
        .get(&format!(
            "{base_url}/versions/{version}/builds/{build}/downloads/{name}"
        ))
        .call()
        .map_err(io::Error::other)?;

    let tmp = partial_path(target);
    let copied = File::create(&tmp).and_then(|mut file| {
        let n = io::copy(&mut response.into_reader(), &mut file)?;
        file.sync_all()?;
        Ok(n)
    });
    match copied {
        Ok(0) => {
            let _ = fs::remove_file(&tmp);
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "empty download"))
        }
        Ok(_) => fs::rename(&tmp, target).map(|()| build),
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

fn latest_build(resp: &BuildsResponse) -> Option<(u64, &str)> {
    resp.builds
        .iter()
        .max_by_key(|b| b.build)
        .map(|b| (b.build, b.downloads.application.name.as_str()))
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    target.with_file_name(name)
}

fn is_nonempty_file(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
}
