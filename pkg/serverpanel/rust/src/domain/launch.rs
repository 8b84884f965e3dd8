// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Launch argv construction
//! Invocations are built from validated fields into an argument vector; no
//! shell ever sees them.

use crate::domain::{PanelError, Result, ServerConfig};

/// Environment hint asking the child (and any wrapper it runs under) not to
/// block-buffer its output.
pub const UNBUFFERED_ENV: (&str, &str) = ("PYTHONUNBUFFERED", "1");

/// G1 tuning flags passed to every server JVM. Callers cannot extend this list.
pub const JVM_TUNING_FLAGS: &[&str] = &[
    "-XX:+UseG1GC",
    "-XX:+ParallelRefProcEnabled",
    "-XX:MaxGCPauseMillis=200",
    "-XX:+UnlockExperimentalVMOptions",
    "-XX:+DisableExplicitGC",
    "-XX:+AlwaysPreTouch",
    "-XX:G1NewSizePercent=30",
    "-XX:G1MaxNewSizePercent=40",
    "-XX:G1HeapRegionSize=8M",
    "-XX:G1ReservePercent=20",
    "-XX:G1HeapWastePercent=5",
    "-XX:G1MixedGCCountTarget=4",
    "-XX:InitiatingHeapOccupancyPercent=15",
    "-XX:G1MixedGCLiveThresholdPercent=90",
    "-XX:G1RSetUpdatingPauseTimePercent=5",
    "-XX:SurvivorRatio=32",
    "-XX:+PerfDisableSharedMem",
    "-XX:MaxTenuringThreshold=1",
    "-Dusing.aikars.flags=https://mcflags.emc.gs",
    "-Daikars.new.flags=true",
];

/// A fully resolved program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl LaunchCommand {
    /// Render as a single line for the generated start script. Arguments are
    /// validated upstream and never contain whitespace.
    pub fn script_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// JVM heap size such as `512M`, `2G` or `1048576`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySize(String);

impl MemorySize {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let digits = raw.strip_suffix(['K', 'k', 'M', 'm', 'G', 'g']).unwrap_or(raw);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PanelError::InvalidConfiguration(format!(
                "invalid memory size '{raw}', expected digits with an optional K/M/G suffix"
            )));
        }
        if digits.bytes().all(|b| b == b'0') {
            return Err(PanelError::InvalidConfiguration(format!(
                "memory size '{raw}' must be greater than zero"
            )));
        }
        Ok(Self(raw.to_uppercase()))
    }

    pub fn bytes(&self) -> u64 {
        let (digits, multiplier) = match self.0.as_bytes().last() {
            Some(b'K') => (&self.0[..self.0.len() - 1], 1u64 << 10),
            Some(b'M') => (&self.0[..self.0.len() - 1], 1u64 << 20),
            Some(b'G') => (&self.0[..self.0.len() - 1], 1u64 << 30),
            _ => (self.0.as_str(), 1),
        };
        digits.parse::<u64>().unwrap_or(0).saturating_mul(multiplier)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Plain `*.jar` file name inside the working directory.
pub fn validate_jar_name(jar: &str) -> Result<()> {
    let plain = !jar.is_empty()
        && !jar.contains(['/', '\\'])
        && !jar.starts_with('-')
        && !jar.contains(char::is_whitespace)
        && jar != ".."
        && jar.ends_with(".jar");
    if plain {
        Ok(())
    } else {
        Err(PanelError::InvalidConfiguration(format!(
            "artifact '{jar}' must be a plain .jar file name"
        )))
    }
}

/// `java -Xms.. -Xmx.. <tuning> -jar <jar> nogui`
pub fn java_command(java: &str, config: &ServerConfig) -> Result<LaunchCommand> {
    let min = MemorySize::parse(&config.min_ram)?;
    let max = MemorySize::parse(&config.max_ram)?;
    if min.bytes() > max.bytes() {
        return Err(PanelError::InvalidConfiguration(format!(
            "min memory {} exceeds max memory {}",
            min.as_str(),
            max.as_str()
        )));
    }
    validate_jar_name(&config.jar)?;

    let mut args = Vec::with_capacity(JVM_TUNING_FLAGS.len() + 5);
    args.push(format!("-Xms{}", min.as_str()));
    args.push(format!("-Xmx{}", max.as_str()));
    args.extend(JVM_TUNING_FLAGS.iter().map(|f| f.to_string()));
    args.push("-jar".to_string());
    args.push(config.jar.clone());
    args.push("nogui".to_string());

    Ok(LaunchCommand {
        program: java.to_string(),
        args,
        env: vec![(UNBUFFERED_ENV.0.to_string(), UNBUFFERED_ENV.1.to_string())],
    })
}
