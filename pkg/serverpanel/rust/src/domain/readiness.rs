// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

/// Substrings that together mark a server as done starting.
///
/// Paper prints `Done (3.21s)! For help, type "help"` once the world is
/// loaded. This is human-readable text and may change between server
/// releases, so it is configurable rather than a hard contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessMarker {
    needles: Vec<String>,
}

impl ReadinessMarker {
    pub fn new<I, S>(needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            needles: needles.into_iter().map(Into::into).collect(),
        }
    }

    /// True when every needle occurs in `line`. An empty marker never matches.
    pub fn matches(&self, line: &str) -> bool {
        !self.needles.is_empty() && self.needles.iter().all(|n| line.contains(n.as_str()))
    }
}

impl Default for ReadinessMarker {
    fn default() -> Self {
        Self::new(["Done (", "For help, type"])
    }
}
