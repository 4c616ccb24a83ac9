// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Serialize unexpected-condition reports to the error log.
// Author: Lukas Bower

//! Append-only error log for unexpected driver conditions.
//!
//! Ordinary negative results (ENOENT, EACCES, EEXIST, EISDIR, ...) are never
//! recorded here; the log exists so operators can diagnose attach failures,
//! marshalling failures, and unexpected remote faults.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::port::RemoteFault;

/// Mutex-serialized, append-only text sink.
///
/// Disabled when no path is configured. Every I/O failure inside the sink is
/// swallowed: logging must never take the driver down with it.
#[derive(Debug)]
pub struct ErrorLog {
    path: Option<PathBuf>,
    lock: Mutex<()>,
}

impl ErrorLog {
    /// Create a sink writing to `path`, or a disabled sink for `None`.
    #[must_use]
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// Create a disabled sink.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// True when a log file is configured.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.path.is_some()
    }

    /// Truncate the log file, verifying the daemon can write to it.
    ///
    /// Must run before handlers start recording. Returns false when the file
    /// cannot be created.
    pub fn initialize(&self) -> bool {
        let Some(path) = &self.path else {
            return true;
        };
        let Ok(_guard) = self.lock.lock() else {
            return false;
        };
        File::create(path).is_ok()
    }

    /// Append one line, prefixed by the handler name.
    pub fn record(&self, handler: &str, message: &str) {
        self.append(&format!("{handler}: {message}"));
    }

    /// Append a remote fault report.
    ///
    /// Writes the remote stack trace when `stack_trace` is set and the fault
    /// carries one; otherwise a one-line description.
    pub fn record_fault(&self, handler: &str, fault: &RemoteFault, stack_trace: bool) {
        if stack_trace {
            if let Some(trace) = fault.trace() {
                self.append(trace);
                return;
            }
        }
        self.record(handler, &fault.to_string());
    }

    fn append(&self, text: &str) {
        let Some(path) = &self.path else {
            return;
        };
        let Ok(_guard) = self.lock.lock() else {
            return;
        };
        let Ok(mut file) = OpenOptions::new().append(true).create(true).open(path) else {
            return;
        };
        let _ = writeln!(file, "{text}");
    }
}
