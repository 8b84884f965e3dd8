// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::VecDeque;
use std::sync::OnceLock;
use time::{OffsetDateTime, UtcOffset};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

pub const CONSOLE_CAPACITY: usize = 1000;

static LOCAL_OFFSET: OnceLock<UtcOffset> = OnceLock::new();

const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[hour]:[minute]:[second]");

/// One captured output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLine {
    pub timestamp: OffsetDateTime,
    pub text: String,
}

impl ConsoleLine {
    pub fn now(text: String) -> Self {
        Self {
            timestamp: local_now(),
            text,
        }
    }

    /// `[HH:MM:SS] text`
    pub fn render(&self) -> String {
        let stamp = self
            .timestamp
            .format(TIMESTAMP_FORMAT)
            .unwrap_or_else(|_| "--:--:--".to_string());
        format!("[{stamp}] {}", self.text)
    }
}

/// Bounded console history. Pushing past capacity evicts the oldest line.
#[derive(Debug)]
pub struct ConsoleBuffer {
    lines: VecDeque<ConsoleLine>,
    capacity: usize,
}

impl ConsoleBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: ConsoleLine) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// The most recent `max_lines` lines, oldest first.
    pub fn recent(&self, max_lines: usize) -> Vec<String> {
        let skip = self.lines.len().saturating_sub(max_lines);
        self.lines.iter().skip(skip).map(ConsoleLine::render).collect()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ConsoleBuffer {
    fn default() -> Self {
        Self::new(CONSOLE_CAPACITY)
    }
}

/// Resolve the offset used for console stamps. The lookup only succeeds
/// while the process is single-threaded on most Unix targets, so call this
/// before starting the async runtime. The first result is kept; UTC if the
/// lookup failed.
pub fn init_local_offset() -> UtcOffset {
    *LOCAL_OFFSET.get_or_init(|| UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC))
}

fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(init_local_offset())
}
