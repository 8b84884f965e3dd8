// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Panel-level errors
//! Every variant is returned to the caller; a corrupt store is recovered
//! inside `ConfigStore` and never shows up here.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PanelError {
    #[error("Server '{0}' not found")]
    NotFound(String),

    #[error("Server '{0}' already exists")]
    DuplicateName(String),

    #[error("Invalid server name: {0}")]
    InvalidName(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // Start preconditions, one per actionable fix
    #[error("Missing runtime dependency: {0}")]
    MissingDependency(String),

    #[error("Server artifact unavailable: {0}")]
    ArtifactUnavailable(String),

    #[error("Failed to launch server: {0}")]
    LaunchFailure(String),

    #[error("I/O failure: {0}")]
    IoFailure(String),
}

pub type Result<T> = std::result::Result<T, PanelError>;
