// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use async_trait::async_trait;
use std::path::Path;

/// Port used by `start()` when the server jar is missing on disk
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Place `file_name` for `version_tag` into `dest_dir`.
    /// Returns true only if the file exists and is non-empty afterwards.
    async fn ensure_artifact(&self, version_tag: &str, dest_dir: &Path, file_name: &str) -> bool;
}
