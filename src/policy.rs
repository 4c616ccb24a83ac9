// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Decide access from mount-time mode bits.
// Author: Lukas Bower

//! Mode policy and path classification.
//!
//! The filesystem presents itself as owned by the mounting user, so every
//! check consults the owner-class permission bits only; group and other
//! classes are never examined.

use bitflags::bitflags;

use crate::config::MountConfig;

bitflags! {
    /// Requested access kinds, mirroring the POSIX `access(2)` mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessRequest: u32 {
        /// Read access (`R_OK`).
        const READ = libc::R_OK as u32;
        /// Write access (`W_OK`).
        const WRITE = libc::W_OK as u32;
        /// Execute or traverse access (`X_OK`).
        const EXEC = libc::X_OK as u32;
    }
}

impl AccessRequest {
    /// Decode a raw `access(2)` mask. Unknown bits are ignored; `F_OK`
    /// (zero) decodes to the empty request, which is always permitted.
    #[must_use]
    pub fn from_mask(mask: i32) -> Self {
        Self::from_bits_truncate(mask as u32)
    }
}

/// Return true when `mode` permits every requested access kind.
#[must_use]
pub fn may_access(mode: u32, request: AccessRequest) -> bool {
    if request.contains(AccessRequest::READ) && mode & (libc::S_IRUSR as u32) == 0 {
        return false;
    }
    if request.contains(AccessRequest::WRITE) && mode & (libc::S_IWUSR as u32) == 0 {
        return false;
    }
    if request.contains(AccessRequest::EXEC) && mode & (libc::S_IXUSR as u32) == 0 {
        return false;
    }
    true
}

/// Per-mount access policy, derived once from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct AccessPolicy {
    /// Permission bits reported for files.
    pub file_mode: u32,
    /// Permission bits reported for directories.
    pub directory_mode: u32,
    /// Directories may be listed.
    pub can_list: bool,
    /// Directories may gain and lose entries.
    pub can_modify: bool,
    /// Directories may be traversed to reach their children.
    pub can_traverse: bool,
}

impl AccessPolicy {
    /// Derive the policy booleans from the mount configuration.
    #[must_use]
    pub fn new(config: &MountConfig) -> Self {
        Self {
            file_mode: config.file_mode,
            directory_mode: config.directory_mode,
            can_list: may_access(config.directory_mode, AccessRequest::READ),
            can_modify: may_access(config.directory_mode, AccessRequest::WRITE),
            can_traverse: may_access(config.directory_mode, AccessRequest::EXEC),
        }
    }
}

/// Return true when the path names the mount root.
///
/// The VFS library guarantees canonical `/`-separated paths with no `.` or
/// `..` components, so an exact comparison suffices.
#[must_use]
pub fn is_root(path: &str) -> bool {
    path == "/"
}
