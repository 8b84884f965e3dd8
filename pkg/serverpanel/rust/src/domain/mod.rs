// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

pub mod console;
pub mod error;
pub mod launch;
pub mod ports;
pub mod readiness;
pub mod server_config;
pub mod status;

pub use console::{CONSOLE_CAPACITY, ConsoleBuffer, ConsoleLine, init_local_offset};
pub use error::{PanelError, Result};
pub use launch::{LaunchCommand, MemorySize, java_command, validate_jar_name};
pub use readiness::ReadinessMarker;
pub use server_config::{ServerConfig, normalize_document, normalize_entry};
pub use status::ServerStatus;
