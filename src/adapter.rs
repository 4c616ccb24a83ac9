// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Translate VFS operations into remote naming-service calls.
// Author: Lukas Bower

//! Filesystem operation handlers, one per VFS callback.
//!
//! Every handler returns `Ok` or a positive POSIX error code; the VFS shim
//! owns the sign convention of the host library. Error precedence is
//! occasionally surprising: creating an object in a missing directory
//! reports EACCES rather than ENOENT when directory modification is
//! forbidden, because the access check is local while the existence check
//! costs a remote round trip. Traversal checks, where performed at all,
//! come first.

use std::fmt;

use crate::config::MountConfig;
use crate::errlog::ErrorLog;
use crate::fault;
use crate::policy::{self, may_access, AccessPolicy, AccessRequest};
use crate::port::{CallError, RemoteCallPort, ThreadAttachment};

/// POSIX error code carried as a positive value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Errno(i32);

impl Errno {
    /// Permission denied.
    pub const ACCES: Errno = Errno(libc::EACCES);
    /// No such file or directory.
    pub const NOENT: Errno = Errno(libc::ENOENT);
    /// File exists.
    pub const EXIST: Errno = Errno(libc::EEXIST);
    /// Operation not permitted.
    pub const PERM: Errno = Errno(libc::EPERM);
    /// Is a directory.
    pub const ISDIR: Errno = Errno(libc::EISDIR);
    /// Not a directory.
    pub const NOTDIR: Errno = Errno(libc::ENOTDIR);
    /// Invalid argument.
    pub const INVAL: Errno = Errno(libc::EINVAL);
    /// Input/output error.
    pub const IO: Errno = Errno(libc::EIO);
    /// Operation not supported.
    pub const NOTSUP: Errno = Errno(libc::ENOTSUP);
    /// File too large.
    pub const FBIG: Errno = Errno(libc::EFBIG);
    /// Operation canceled.
    pub const CANCELED: Errno = Errno(libc::ECANCELED);

    /// Raw positive errno value.
    #[must_use]
    pub fn raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            libc::EACCES => "EACCES",
            libc::ENOENT => "ENOENT",
            libc::EEXIST => "EEXIST",
            libc::EPERM => "EPERM",
            libc::EISDIR => "EISDIR",
            libc::ENOTDIR => "ENOTDIR",
            libc::EINVAL => "EINVAL",
            libc::EIO => "EIO",
            libc::ENOTSUP => "ENOTSUP",
            libc::EFBIG => "EFBIG",
            libc::ECANCELED => "ECANCELED",
            other => return write!(f, "errno {other}"),
        };
        f.write_str(name)
    }
}

/// Result of a filesystem operation.
pub type OpResult<T> = Result<T, Errno>;

/// Kind of a filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectKind {
    /// Regular file.
    #[default]
    File,
    /// Directory.
    Directory,
}

/// Attributes reported by `getattr`.
///
/// Fields the remote protocol does not carry stay zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Attributes {
    /// File or directory.
    pub kind: ObjectKind,
    /// Full mode: object-type bit plus configured permission bits.
    pub mode: u32,
    /// Link count; always 1 for existing objects.
    pub nlink: u32,
    /// Size in bytes; 0 for directories.
    pub size: u64,
}

impl Attributes {
    /// Attributes of a regular file of the given size under `policy`.
    #[must_use]
    pub fn file(policy: &AccessPolicy, size: u64) -> Self {
        Self {
            kind: ObjectKind::File,
            mode: FILE_TYPE | policy.file_mode,
            nlink: 1,
            size,
        }
    }

    /// Attributes of a directory under `policy`.
    #[must_use]
    pub fn directory(policy: &AccessPolicy) -> Self {
        Self {
            kind: ObjectKind::Directory,
            mode: DIRECTORY_TYPE | policy.directory_mode,
            nlink: 1,
            size: 0,
        }
    }
}

/// Synthetic filesystem statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStatistics {
    /// Preferred I/O block size.
    pub block_size: u64,
    /// Fragment size; reported equal to the block size.
    pub fragment_size: u64,
    /// Total data blocks.
    pub blocks: u64,
    /// Free blocks.
    pub blocks_free: u64,
    /// Free blocks available to unprivileged users.
    pub blocks_available: u64,
}

const FILE_TYPE: u32 = libc::S_IFREG as u32;
const DIRECTORY_TYPE: u32 = libc::S_IFDIR as u32;

/// Block size and block counts reported by `statfs`.
const STATFS_UNIT: u64 = 0x0010_0000;

/// Clamp a transfer length to what the remote's signed 32-bit API accepts.
///
/// Without the clamp, an oversized length would be taken modulo 2^32 on the
/// remote side and silently shorten the transfer.
fn saturate_length(length: usize) -> usize {
    length.min(i32::MAX as usize)
}

/// Operation adapter translating VFS callbacks into remote calls.
///
/// Handlers take `&self` and may run concurrently from many threads. The
/// configuration-derived policy is immutable; the error log serializes
/// internally; the port is required to be thread-safe.
pub struct Adapter<P: RemoteCallPort> {
    policy: AccessPolicy,
    host: String,
    port: P,
    log: ErrorLog,
}

impl<P: RemoteCallPort> Adapter<P> {
    /// Build the adapter for a mount.
    pub fn new(config: &MountConfig, port: P, log: ErrorLog) -> Self {
        Self {
            policy: AccessPolicy::new(config),
            host: config.server.clone(),
            port,
            log,
        }
    }

    /// The derived access policy.
    #[must_use]
    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// The error log sink; the lifecycle controller truncates it at mount.
    #[must_use]
    pub fn error_log(&self) -> &ErrorLog {
        &self.log
    }

    /// The remote call port.
    #[must_use]
    pub fn port(&self) -> &P {
        &self.port
    }

    /// One-time remote bootstrap, invoked before any other handler.
    pub fn initialize(&self) -> OpResult<()> {
        let port = self.attach("init")?;
        if let Err(err) = port.initialize(self.host.as_bytes()) {
            match err {
                CallError::Fault(fault) => self.log.record_fault("init", &fault, true),
                CallError::Transport(err) => self.log.record("init", &format!("EIO: {err}.")),
            }
            self.log.record("init", "cannot initialize filesystem.");
            return Err(Errno::IO);
        }
        Ok(())
    }

    /// Report attributes for `path`.
    pub fn getattr(&self, path: &str) -> OpResult<Attributes> {
        if policy::is_root(path) {
            return Ok(Attributes::directory(&self.policy));
        }
        if !self.policy.can_traverse {
            return Err(Errno::ACCES);
        }
        let port = self.attach("getattr")?;
        let directory = port
            .directory(path.as_bytes())
            .map_err(|err| self.fail("getattr", err))?;
        // Clear every field before filling; attributes the remote protocol
        // does not carry stay zero.
        let mut status = Attributes::default();
        if directory {
            status.kind = ObjectKind::Directory;
            status.mode = DIRECTORY_TYPE | self.policy.directory_mode;
        } else {
            let size = port
                .size(path.as_bytes())
                .map_err(|err| self.fail("getattr", err))?;
            status.kind = ObjectKind::File;
            status.mode = FILE_TYPE | self.policy.file_mode;
            status.size = size.max(0) as u64;
        }
        status.nlink = 1;
        Ok(status)
    }

    /// Create a file.
    ///
    /// The caller-supplied mode and device numbers are ignored; the
    /// filesystem cannot store them.
    pub fn mknod(&self, path: &str) -> OpResult<()> {
        if policy::is_root(path) {
            return Err(Errno::EXIST);
        }
        if !self.policy.can_traverse {
            return Err(Errno::ACCES);
        }
        if !self.policy.can_modify {
            return Err(Errno::ACCES);
        }
        let port = self.attach("mknod")?;
        let created = port
            .create_file(path.as_bytes())
            .map_err(|err| self.fail("mknod", err))?;
        if created {
            Ok(())
        } else {
            Err(Errno::EXIST)
        }
    }

    /// Create a directory. Symmetric to [`Self::mknod`].
    pub fn mkdir(&self, path: &str) -> OpResult<()> {
        if policy::is_root(path) {
            return Err(Errno::EXIST);
        }
        if !self.policy.can_traverse {
            return Err(Errno::ACCES);
        }
        if !self.policy.can_modify {
            return Err(Errno::ACCES);
        }
        let port = self.attach("mkdir")?;
        let created = port
            .create_directory(path.as_bytes())
            .map_err(|err| self.fail("mkdir", err))?;
        if created {
            Ok(())
        } else {
            Err(Errno::EXIST)
        }
    }

    /// Delete a file or directory. One handler serves both `unlink` and
    /// `rmdir`.
    pub fn remove(&self, path: &str) -> OpResult<()> {
        // The naming server refuses to delete the root as well; the check is
        // repeated here as part of traversal gating.
        if policy::is_root(path) {
            return Err(Errno::PERM);
        }
        if !self.policy.can_traverse {
            return Err(Errno::ACCES);
        }
        if !self.policy.can_modify {
            return Err(Errno::ACCES);
        }
        let port = self.attach("delete")?;
        let deleted = port
            .delete(path.as_bytes())
            .map_err(|err| self.fail("delete", err))?;
        if deleted {
            Ok(())
        } else {
            self.log
                .record("delete", "EPERM: cannot delete file or directory.");
            Err(Errno::PERM)
        }
    }

    /// Truncate a file to length zero.
    ///
    /// Only truncation to zero is supported; its purpose is to let files be
    /// cleared when they are opened. The operation is deliberately
    /// non-atomic: the file is deleted and re-created with separate remote
    /// calls, and a concurrent client can act within the gap. A lost
    /// re-creation race reports ECANCELED.
    pub fn truncate(&self, path: &str, new_size: u64) -> OpResult<()> {
        if new_size != 0 {
            return Err(Errno::NOTSUP);
        }
        // The remote side would refuse to truncate the root on its own; the
        // check is needed here anyway as part of traversal gating.
        if policy::is_root(path) {
            return Err(Errno::ISDIR);
        }
        if !self.policy.can_traverse {
            return Err(Errno::ACCES);
        }
        let port = self.attach("truncate")?;
        let directory = port
            .directory(path.as_bytes())
            .map_err(|err| self.fail("truncate", err))?;
        if directory {
            return Err(Errno::ISDIR);
        }
        if !may_access(self.policy.file_mode, AccessRequest::WRITE) {
            return Err(Errno::ACCES);
        }
        let deleted = port
            .delete(path.as_bytes())
            .map_err(|err| self.fail("truncate", err))?;
        if !deleted {
            self.log
                .record("truncate", "EPERM: cannot delete file or directory.");
            return Err(Errno::PERM);
        }
        let created = port
            .create_file(path.as_bytes())
            .map_err(|err| self.fail("truncate", err))?;
        if !created {
            return Err(Errno::CANCELED);
        }
        Ok(())
    }

    /// Open a file, verifying existence and access.
    ///
    /// Returns the file's current size, which the shim stores as the open
    /// handle; later reads hand it back so the remote side can clamp
    /// requests near the end of file. Exclusive create (`O_EXCL`) is refused
    /// with ENOTSUP rather than silently accepted.
    pub fn open(&self, path: &str, flags: i32) -> OpResult<u64> {
        if policy::is_root(path) {
            return Err(Errno::NOENT);
        }
        if !self.policy.can_traverse {
            return Err(Errno::ACCES);
        }
        // Confirms the path names an existing file and captures its size.
        let size = {
            let port = self.attach("open")?;
            port.size(path.as_bytes())
                .map_err(|err| self.fail("open", err))?
        };
        if (flags & libc::O_RDWR) == libc::O_RDWR
            && !may_access(self.policy.file_mode, AccessRequest::READ | AccessRequest::WRITE)
        {
            return Err(Errno::ACCES);
        }
        // O_RDONLY is zero, so this check applies to every open request.
        if (flags & libc::O_RDONLY) == libc::O_RDONLY
            && !may_access(self.policy.file_mode, AccessRequest::READ)
        {
            return Err(Errno::ACCES);
        }
        if (flags & libc::O_WRONLY) == libc::O_WRONLY
            && !may_access(self.policy.file_mode, AccessRequest::WRITE)
        {
            return Err(Errno::ACCES);
        }
        if (flags & libc::O_EXCL) != 0 {
            return Err(Errno::NOTSUP);
        }
        Ok(size.max(0) as u64)
    }

    /// Read from an open file into `buffer`.
    ///
    /// Returns the number of bytes read and zero-fills the remainder of the
    /// buffer. Reads past the end of file yield a short count, never an
    /// error. `handle` is the size captured by [`Self::open`].
    pub fn read(
        &self,
        path: &str,
        buffer: &mut [u8],
        offset: u64,
        handle: u64,
    ) -> OpResult<usize> {
        let length = saturate_length(buffer.len()) as i32;
        // An offset beyond the signed 64-bit range lies past any
        // representable end of file.
        let Ok(remote_offset) = i64::try_from(offset) else {
            buffer.fill(0);
            return Ok(0);
        };
        let port = self.attach("read")?;
        let data = port
            .read(path.as_bytes(), remote_offset, length, handle as i64)
            .map_err(|err| self.fail("read", err))?;
        let received = data.len().min(buffer.len());
        buffer[..received].copy_from_slice(&data[..received]);
        buffer[received..].fill(0);
        Ok(received)
    }

    /// Write `data` at `offset`; the file grows as needed.
    ///
    /// Returns the number of bytes written, which equals the request length
    /// after 32-bit saturation.
    pub fn write(&self, path: &str, data: &[u8], offset: u64) -> OpResult<usize> {
        let length = saturate_length(data.len());
        let Ok(remote_offset) = i64::try_from(offset) else {
            return Err(Errno::FBIG);
        };
        match offset.checked_add(length as u64) {
            Some(end) if end <= i64::MAX as u64 => {}
            _ => return Err(Errno::FBIG),
        }
        let port = self.attach("write")?;
        port.write(path.as_bytes(), remote_offset, &data[..length])
            .map_err(|err| self.fail("write", err))?;
        Ok(length)
    }

    /// Synthesize filesystem statistics.
    ///
    /// No communication is performed; the only purpose is to report enough
    /// free space that file managers agree to copy into the mount.
    #[must_use]
    pub fn statfs(&self) -> FsStatistics {
        FsStatistics {
            block_size: STATFS_UNIT,
            fragment_size: STATFS_UNIT,
            blocks: STATFS_UNIT,
            blocks_free: STATFS_UNIT,
            blocks_available: STATFS_UNIT,
        }
    }

    /// Open a directory for listing.
    pub fn opendir(&self, path: &str) -> OpResult<()> {
        if !policy::is_root(path) && !self.policy.can_traverse {
            return Err(Errno::ACCES);
        }
        let directory = {
            let port = self.attach("opendir")?;
            port.directory(path.as_bytes())
                .map_err(|err| self.fail("opendir", err))?
        };
        if !directory {
            return Err(Errno::NOTDIR);
        }
        if !self.policy.can_list {
            return Err(Errno::ACCES);
        }
        Ok(())
    }

    /// List a directory, feeding each child name to `fill`.
    ///
    /// The whole listing is fetched on every call; partial reads would need
    /// either extra round trips or a cache that can go stale between calls.
    /// `fill` returns true when its buffer is full, which ends the walk
    /// early.
    pub fn readdir(&self, path: &str, fill: &mut dyn FnMut(&str) -> bool) -> OpResult<()> {
        let port = self.attach("readdir")?;
        let children = port
            .list(path.as_bytes())
            .map_err(|err| self.fail("readdir", err))?;
        for name in children.split(|&byte| byte == 0) {
            if name.is_empty() {
                continue;
            }
            let name = String::from_utf8_lossy(name);
            if fill(&name) {
                break;
            }
        }
        Ok(())
    }

    /// Check access to `path` for the requested mask.
    ///
    /// Checks behave as if the mounting user owns every object. Without
    /// this handler some file browsers would treat every file as
    /// executable.
    pub fn access(&self, path: &str, request: AccessRequest) -> OpResult<()> {
        if policy::is_root(path) {
            return check(self.policy.directory_mode, request);
        }
        if !self.policy.can_traverse {
            return Err(Errno::ACCES);
        }
        let directory = {
            let port = self.attach("access")?;
            port.directory(path.as_bytes())
                .map_err(|err| self.fail("access", err))?
        };
        let mode = if directory {
            self.policy.directory_mode
        } else {
            self.policy.file_mode
        };
        check(mode, request)
    }

    fn attach(&self, handler: &'static str) -> OpResult<ThreadAttachment<'_, P>> {
        ThreadAttachment::new(&self.port).map_err(|err| {
            self.log.record(
                handler,
                "EIO: cannot attach current thread to the remote call port.",
            );
            log::debug!("{handler}: attach failed: {err}");
            Errno::IO
        })
    }

    fn fail(&self, handler: &'static str, err: CallError) -> Errno {
        match err {
            CallError::Fault(fault) => {
                let errno = fault::classify(&fault);
                self.log.record_fault(handler, &fault, false);
                errno
            }
            CallError::Transport(err) => {
                self.log.record(handler, &format!("EIO: {err}."));
                Errno::IO
            }
        }
    }
}

fn check(mode: u32, request: AccessRequest) -> OpResult<()> {
    if may_access(mode, request) {
        Ok(())
    } else {
        Err(Errno::ACCES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use crate::port::{RemoteCall, RemoteFault, RemoteValue, TransportError};

    enum Reply {
        Value(RemoteValue),
        Fault(RemoteFault),
        Transport,
    }

    struct ScriptedPort {
        replies: Mutex<VecDeque<Reply>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedPort {
        fn new(replies: Vec<Reply>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    impl RemoteCallPort for ScriptedPort {
        fn attach(&self) -> Result<(), TransportError> {
            Ok(())
        }

        fn detach(&self) {}

        fn call(&self, call: RemoteCall<'_>) -> Result<RemoteValue, CallError> {
            self.calls
                .lock()
                .expect("calls lock")
                .push(call.method().to_owned());
            match self.replies.lock().expect("replies lock").pop_front() {
                Some(Reply::Value(value)) => Ok(value),
                Some(Reply::Fault(fault)) => Err(CallError::Fault(fault)),
                Some(Reply::Transport) | None => {
                    Err(CallError::Transport(TransportError::NotAttached))
                }
            }
        }
    }

    fn not_found() -> RemoteFault {
        RemoteFault::new("java/io/FileNotFoundException", "no such object")
    }

    fn scripted(replies: Vec<Reply>) -> Adapter<ScriptedPort> {
        Adapter::new(
            &MountConfig::default(),
            ScriptedPort::new(replies),
            ErrorLog::disabled(),
        )
    }

    fn adapter_with_modes(
        file_mode: u32,
        directory_mode: u32,
        replies: Vec<Reply>,
    ) -> Adapter<ScriptedPort> {
        let config = MountConfig::new("127.0.0.1", crate::SERVICE_PORT, file_mode, directory_mode, None);
        Adapter::new(&config, ScriptedPort::new(replies), ErrorLog::disabled())
    }

    #[test]
    fn root_getattr_is_synthesized_locally() {
        let adapter = scripted(Vec::new());
        let status = adapter.getattr("/").expect("root attributes");
        assert_eq!(status.kind, ObjectKind::Directory);
        assert_eq!(status.mode, 0o040_755);
        assert_eq!(status.nlink, 1);
        assert_eq!(status.size, 0);
        assert!(adapter.port().calls().is_empty());
    }

    #[test]
    fn file_getattr_queries_kind_then_size() {
        let adapter = scripted(vec![
            Reply::Value(RemoteValue::Bool(false)),
            Reply::Value(RemoteValue::I64(10)),
        ]);
        let status = adapter.getattr("/a.txt").expect("file attributes");
        assert_eq!(status.kind, ObjectKind::File);
        assert_eq!(status.mode, 0o100_644);
        assert_eq!(status.size, 10);
        assert_eq!(adapter.port().calls(), vec!["directory", "size"]);
    }

    #[test]
    fn missing_objects_surface_as_enoent() {
        let adapter = scripted(vec![Reply::Fault(not_found())]);
        assert_eq!(adapter.getattr("/foo"), Err(Errno::NOENT));
    }

    #[test]
    fn traversal_gate_precedes_every_remote_call() {
        let adapter = adapter_with_modes(0o644, 0o600, Vec::new());
        assert_eq!(adapter.getattr("/a"), Err(Errno::ACCES));
        assert_eq!(adapter.mknod("/a"), Err(Errno::ACCES));
        assert_eq!(adapter.mkdir("/a"), Err(Errno::ACCES));
        assert_eq!(adapter.remove("/a"), Err(Errno::ACCES));
        assert_eq!(adapter.truncate("/a", 0), Err(Errno::ACCES));
        assert_eq!(adapter.open("/a", libc::O_RDONLY), Err(Errno::ACCES));
        assert_eq!(adapter.access("/a", AccessRequest::READ), Err(Errno::ACCES));
        assert!(adapter.port().calls().is_empty());
    }

    #[test]
    fn root_objects_are_protected() {
        let adapter = scripted(Vec::new());
        assert_eq!(adapter.mknod("/"), Err(Errno::EXIST));
        assert_eq!(adapter.mkdir("/"), Err(Errno::EXIST));
        assert_eq!(adapter.remove("/"), Err(Errno::PERM));
        assert_eq!(adapter.truncate("/", 0), Err(Errno::ISDIR));
        assert_eq!(adapter.open("/", libc::O_RDONLY), Err(Errno::NOENT));
        assert!(adapter.port().calls().is_empty());
    }

    #[test]
    fn mknod_reports_existing_objects() {
        let adapter = scripted(vec![Reply::Value(RemoteValue::Bool(false))]);
        assert_eq!(adapter.mknod("/a.txt"), Err(Errno::EXIST));
    }

    #[test]
    fn directory_modification_gate_applies_before_creation() {
        let adapter = adapter_with_modes(0o644, 0o500, Vec::new());
        assert_eq!(adapter.mknod("/a"), Err(Errno::ACCES));
        assert_eq!(adapter.mkdir("/a"), Err(Errno::ACCES));
        assert!(adapter.port().calls().is_empty());
    }

    #[test]
    fn failed_deletion_maps_to_eperm() {
        let adapter = scripted(vec![Reply::Value(RemoteValue::Bool(false))]);
        assert_eq!(adapter.remove("/stuck"), Err(Errno::PERM));
    }

    #[test]
    fn partial_truncate_is_unsupported() {
        let adapter = scripted(Vec::new());
        assert_eq!(adapter.truncate("/a.txt", 1), Err(Errno::NOTSUP));
        assert!(adapter.port().calls().is_empty());
    }

    #[test]
    fn truncate_refuses_directories() {
        let adapter = scripted(vec![Reply::Value(RemoteValue::Bool(true))]);
        assert_eq!(adapter.truncate("/docs", 0), Err(Errno::ISDIR));
        assert_eq!(adapter.port().calls(), vec!["directory"]);
    }

    #[test]
    fn truncate_requires_writable_files() {
        let adapter = adapter_with_modes(0o444, 0o755, vec![Reply::Value(RemoteValue::Bool(false))]);
        assert_eq!(adapter.truncate("/a.txt", 0), Err(Errno::ACCES));
        assert_eq!(adapter.port().calls(), vec!["directory"]);
    }

    #[test]
    fn truncate_reports_the_recreation_race() {
        let adapter = scripted(vec![
            Reply::Value(RemoteValue::Bool(false)),
            Reply::Value(RemoteValue::Bool(true)),
            Reply::Value(RemoteValue::Bool(false)),
        ]);
        assert_eq!(adapter.truncate("/a.txt", 0), Err(Errno::CANCELED));
        assert_eq!(
            adapter.port().calls(),
            vec!["directory", "delete", "createFile"]
        );
    }

    #[test]
    fn open_captures_the_size_as_handle() {
        let adapter = scripted(vec![Reply::Value(RemoteValue::I64(42))]);
        assert_eq!(adapter.open("/a.txt", libc::O_RDONLY), Ok(42));
    }

    #[test]
    fn open_checks_requested_access_against_file_mode() {
        let adapter = adapter_with_modes(0o444, 0o755, vec![Reply::Value(RemoteValue::I64(1))]);
        assert_eq!(adapter.open("/a.txt", libc::O_WRONLY), Err(Errno::ACCES));
        let adapter = adapter_with_modes(0o444, 0o755, vec![Reply::Value(RemoteValue::I64(1))]);
        assert_eq!(adapter.open("/a.txt", libc::O_RDWR), Err(Errno::ACCES));
    }

    #[test]
    fn exclusive_create_is_refused() {
        let adapter = scripted(vec![Reply::Value(RemoteValue::I64(1))]);
        assert_eq!(
            adapter.open("/a.txt", libc::O_RDONLY | libc::O_EXCL),
            Err(Errno::NOTSUP)
        );
    }

    #[test]
    fn short_reads_zero_fill_the_buffer() {
        let adapter = scripted(vec![Reply::Value(RemoteValue::Bytes(b"s!".to_vec()))]);
        let mut buffer = [0xAAu8; 100];
        let count = adapter.read("/a.txt", &mut buffer, 8, 10).expect("read");
        assert_eq!(count, 2);
        assert_eq!(&buffer[..2], b"s!");
        assert!(buffer[2..].iter().all(|&byte| byte == 0));
    }

    #[test]
    fn reads_past_the_representable_range_return_zero() {
        let adapter = scripted(Vec::new());
        let mut buffer = [0xAAu8; 16];
        let count = adapter
            .read("/a.txt", &mut buffer, u64::MAX, 10)
            .expect("read");
        assert_eq!(count, 0);
        assert!(buffer.iter().all(|&byte| byte == 0));
        assert!(adapter.port().calls().is_empty());
    }

    #[test]
    fn oversized_write_offsets_are_efbig() {
        let adapter = scripted(Vec::new());
        assert_eq!(adapter.write("/a.txt", b"x", u64::MAX), Err(Errno::FBIG));
        assert_eq!(
            adapter.write("/a.txt", b"x", i64::MAX as u64),
            Err(Errno::FBIG)
        );
        assert!(adapter.port().calls().is_empty());
    }

    #[test]
    fn write_returns_the_saturated_length() {
        let adapter = scripted(vec![Reply::Value(RemoteValue::Unit)]);
        assert_eq!(adapter.write("/a.txt", b"hello", 0), Ok(5));
    }

    #[test]
    fn transfer_lengths_saturate_at_the_signed_32_bit_maximum() {
        assert_eq!(saturate_length(10), 10);
        assert_eq!(saturate_length(i32::MAX as usize), i32::MAX as usize);
        assert_eq!(saturate_length(3_usize << 30), i32::MAX as usize);
    }

    #[test]
    fn opendir_rejects_files_and_unlistable_directories() {
        let adapter = scripted(vec![Reply::Value(RemoteValue::Bool(false))]);
        assert_eq!(adapter.opendir("/a.txt"), Err(Errno::NOTDIR));
        // Write and traverse without read: the directory exists but cannot
        // be listed.
        let adapter = adapter_with_modes(0o644, 0o300, vec![Reply::Value(RemoteValue::Bool(true))]);
        assert_eq!(adapter.opendir("/docs"), Err(Errno::ACCES));
    }

    #[test]
    fn readdir_honors_the_fill_backpressure() {
        let adapter = scripted(vec![Reply::Value(RemoteValue::Bytes(
            b"one\0two\0three\0".to_vec(),
        ))]);
        let mut seen = Vec::new();
        adapter
            .readdir("/", &mut |name| {
                seen.push(name.to_owned());
                seen.len() == 2
            })
            .expect("readdir");
        assert_eq!(seen, vec!["one", "two"]);
    }

    #[test]
    fn access_uses_the_mode_for_the_object_kind() {
        let adapter = scripted(Vec::new());
        assert_eq!(adapter.access("/", AccessRequest::READ), Ok(()));
        let adapter = scripted(vec![Reply::Value(RemoteValue::Bool(false))]);
        assert_eq!(adapter.access("/a.txt", AccessRequest::EXEC), Err(Errno::ACCES));
        let adapter = scripted(vec![Reply::Value(RemoteValue::Bool(true))]);
        assert_eq!(adapter.access("/docs", AccessRequest::EXEC), Ok(()));
    }

    #[test]
    fn statfs_reports_synthetic_geometry() {
        let adapter = scripted(Vec::new());
        let stats = adapter.statfs();
        assert_eq!(stats.block_size, 0x10_0000);
        assert_eq!(stats.fragment_size, stats.block_size);
        assert_eq!(stats.blocks, 0x10_0000);
        assert_eq!(stats.blocks_free, 0x10_0000);
        assert_eq!(stats.blocks_available, 0x10_0000);
        assert!(adapter.port().calls().is_empty());
    }

    #[test]
    fn transport_errors_map_to_eio() {
        let adapter = scripted(vec![Reply::Transport]);
        assert_eq!(adapter.getattr("/a.txt"), Err(Errno::IO));
    }
}
