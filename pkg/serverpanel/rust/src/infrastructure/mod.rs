// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Adapters implementing the domain ports against the real OS and network.

pub mod java_checker;
pub mod paper_fetcher;
pub mod signals;
pub mod sysinfo_sampler;

pub use java_checker::{JavaLauncher, JavaRuntimeChecker};
pub use paper_fetcher::PaperArtifactFetcher;
pub use sysinfo_sampler::SysinfoSampler;
