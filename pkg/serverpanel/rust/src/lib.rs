// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Lifecycle core of a local game-server control panel: a durable server
//! store, a process supervisor with console capture and command injection,
//! and a liveness poller.

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod liveness;
mod output_reader;
pub mod record;
pub mod scaffold;
pub mod store;
pub mod supervisor;

pub use config::PanelConfig;
pub use domain::{PanelError, Result, ServerConfig, ServerStatus};
pub use liveness::LivenessPoller;
pub use record::ProcessRecord;
pub use store::{ConfigStore, resolve_storage_location};
pub use supervisor::{
    NewServer, ProcessSupervisor, ServerSummary, StopOutcome, SupervisorOptions, SupervisorPorts,
};
