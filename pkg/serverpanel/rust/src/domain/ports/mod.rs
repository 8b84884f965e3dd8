// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Ports for the collaborators the supervisor depends on.
//! Implementations live in `crate::infrastructure`; tests provide stubs.

pub mod artifact_fetcher;
pub mod launcher;
pub mod resource_sampler;
pub mod runtime_checker;

pub use artifact_fetcher::ArtifactFetcher;
pub use launcher::Launcher;
pub use resource_sampler::{ResourceGauges, ResourceSampler};
pub use runtime_checker::{RuntimeChecker, RuntimeInfo};
