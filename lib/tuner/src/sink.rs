// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! One-way log sink supplied by the host library.
//!
//! The host hands each communicator a logger so tuner messages land in the
//! host's own debug stream. The tuner only writes to it.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::Mutex;

/// Severity levels understood by the host logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    None = 0,
    Version = 1,
    Warn = 2,
    Info = 3,
    Abort = 4,
    Trace = 5,
}

bitflags! {
    /// Host subsystems a message can be attributed to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Subsystem: u64 {
        const INIT = 0x1;
        const COLL = 0x2;
        const P2P = 0x4;
        const SHM = 0x8;
        const NET = 0x10;
        const GRAPH = 0x20;
        const TUNING = 0x40;
        const ENV = 0x80;
        const ALLOC = 0x100;
        const CALL = 0x200;
        const PROXY = 0x400;
        const NVLS = 0x800;
        const BOOTSTRAP = 0x1000;
        const REG = 0x2000;
        const PROFILE = 0x4000;
        const ALL = !0;
    }
}

/// Write-only destination for tuner log messages.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, subsystem: Subsystem, message: fmt::Arguments<'_>);
}

impl fmt::Debug for dyn LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LogSink")
    }
}

/// Forwards host log messages to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TracingSink {
    pub fn shared() -> Arc<dyn LogSink> {
        Arc::new(TracingSink)
    }
}

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, subsystem: Subsystem, message: fmt::Arguments<'_>) {
        let subsystem = subsystem.bits();
        match level {
            LogLevel::None => {}
            LogLevel::Abort => tracing::error!(target: "dynamo_tuner::host", subsystem, "{}", message),
            LogLevel::Warn => tracing::warn!(target: "dynamo_tuner::host", subsystem, "{}", message),
            LogLevel::Version | LogLevel::Info => {
                tracing::info!(target: "dynamo_tuner::host", subsystem, "{}", message)
            }
            LogLevel::Trace => tracing::trace!(target: "dynamo_tuner::host", subsystem, "{}", message),
        }
    }
}

/// Captured log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub subsystem: Subsystem,
    pub message: String,
}

/// Keeps every message in memory. Used by tests and diagnostics tooling.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.records
            .lock()
            .iter()
            .any(|r| r.level == level && r.message.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, subsystem: Subsystem, message: fmt::Arguments<'_>) {
        self.records.lock().push(LogRecord {
            level,
            subsystem,
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records() {
        let sink = MemorySink::new();
        sink.log(LogLevel::Info, Subsystem::TUNING, format_args!("picked {}", 3));
        sink.log(LogLevel::Warn, Subsystem::INIT | Subsystem::ENV, format_args!("odd"));

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message, "picked 3");
        assert!(records[1].subsystem.contains(Subsystem::ENV));
        assert!(sink.contains(LogLevel::Warn, "odd"));
        assert!(!sink.contains(LogLevel::Info, "odd"));
    }

    #[test]
    fn test_tracing_sink_accepts_all_levels() {
        let sink = TracingSink::shared();
        for level in [
            LogLevel::None,
            LogLevel::Version,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Abort,
            LogLevel::Trace,
        ] {
            sink.log(level, Subsystem::ALL, format_args!("level {:?}", level));
        }
    }
}
