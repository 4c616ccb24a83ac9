// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Capture immutable mount-time configuration.
// Author: Lukas Bower

//! Mount-time configuration, captured once at startup and read-only to every
//! handler afterwards.

use std::path::PathBuf;

/// Mask selecting the permission bits of a mode value.
pub const PERMISSION_MASK: u32 = 0o777;

/// Default naming-service host.
pub const DEFAULT_SERVER: &str = "127.0.0.1";

/// Default permission bits for files.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Default permission bits for directories.
pub const DEFAULT_DIRECTORY_MODE: u32 = 0o755;

/// Immutable mount options.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Naming-service host identifier.
    pub server: String,
    /// Naming-service TCP port.
    pub port: u16,
    /// Permission bits applied to every file.
    pub file_mode: u32,
    /// Permission bits applied to every directory.
    pub directory_mode: u32,
    /// Optional truncate-and-append error log file.
    pub error_log: Option<PathBuf>,
}

impl MountConfig {
    /// Build a configuration, sanitizing the mode values.
    ///
    /// Only permission bits survive: an object-type bit supplied on the
    /// command line must never reach the filesystem.
    pub fn new(
        server: impl Into<String>,
        port: u16,
        file_mode: u32,
        directory_mode: u32,
        error_log: Option<PathBuf>,
    ) -> Self {
        Self {
            server: server.into(),
            port,
            file_mode: file_mode & PERMISSION_MASK,
            directory_mode: directory_mode & PERMISSION_MASK,
            error_log,
        }
    }
}

impl Default for MountConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_SERVER,
            crate::SERVICE_PORT,
            DEFAULT_FILE_MODE,
            DEFAULT_DIRECTORY_MODE,
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = MountConfig::default();
        assert_eq!(config.server, "127.0.0.1");
        assert_eq!(config.file_mode, 0o644);
        assert_eq!(config.directory_mode, 0o755);
        assert!(config.error_log.is_none());
    }

    #[test]
    fn type_bits_are_stripped_from_modes() {
        let config = MountConfig::new("host", 6000, 0o100644, 0o040755, None);
        assert_eq!(config.file_mode, 0o644);
        assert_eq!(config.directory_mode, 0o755);
    }

    #[test]
    fn permission_bits_survive_unchanged() {
        let config = MountConfig::new("host", 6000, 0o7777, 0o7777, None);
        assert_eq!(config.file_mode, 0o777);
        assert_eq!(config.directory_mode, 0o777);
    }
}
