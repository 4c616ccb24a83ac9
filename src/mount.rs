// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Bridge fuser callbacks onto the operation adapter.
// Author: Lukas Bower

//! FUSE shim.
//!
//! The kernel addresses objects by inode while the remote protocol is
//! path-addressed, so the shim keeps a bidirectional inode ↔ path table and
//! forwards every callback to the matching [`Adapter`] operation. The
//! library drives these callbacks from its own threads and provides no
//! per-request coordination; everything shared here is immutable or behind
//! a mutex.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, MountOption, ReplyAttr, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
    TimeOrNow, FUSE_ROOT_ID,
};
use log::warn;

use crate::adapter::{Adapter, Attributes, ObjectKind};
use crate::policy::AccessRequest;
use crate::port::RemoteCallPort;

/// Attribute validity period handed to the kernel. Attributes can change
/// remotely at any time and are cheap to refetch, so keep it short.
const TTL: Duration = Duration::from_secs(1);

/// Bidirectional inode ↔ path map.
///
/// Entries are never evicted: a path keeps its inode for the lifetime of
/// the mount, even if the object is deleted and re-created remotely.
#[derive(Debug)]
struct InodeTable {
    by_inode: HashMap<u64, String>,
    by_path: HashMap<String, u64>,
    next_inode: u64,
}

impl InodeTable {
    fn new() -> Self {
        let mut table = Self {
            by_inode: HashMap::new(),
            by_path: HashMap::new(),
            next_inode: FUSE_ROOT_ID + 1,
        };
        table.insert("/");
        table
    }

    fn insert(&mut self, path: &str) -> u64 {
        if let Some(existing) = self.by_path.get(path) {
            return *existing;
        }
        let inode = if path == "/" {
            FUSE_ROOT_ID
        } else {
            let inode = self.next_inode;
            self.next_inode = self.next_inode.saturating_add(1);
            inode
        };
        self.by_inode.insert(inode, path.to_owned());
        self.by_path.insert(path.to_owned(), inode);
        inode
    }

    fn path_for(&self, inode: u64) -> Option<String> {
        self.by_inode.get(&inode).cloned()
    }
}

/// FUSE driver state.
///
/// The adapter is created before mount and dropped in `destroy`, which
/// tears down the remote call port exactly once.
pub struct NameFs<P: RemoteCallPort> {
    adapter: Option<Adapter<P>>,
    inodes: Mutex<InodeTable>,
}

impl<P: RemoteCallPort> NameFs<P> {
    /// Wrap an adapter for mounting.
    #[must_use]
    pub fn new(adapter: Adapter<P>) -> Self {
        Self {
            adapter: Some(adapter),
            inodes: Mutex::new(InodeTable::new()),
        }
    }

    fn resolve(&self, inode: u64) -> Option<String> {
        self.inodes.lock().expect("inode table lock").path_for(inode)
    }

    fn remember(&self, path: &str) -> u64 {
        self.inodes.lock().expect("inode table lock").insert(path)
    }

    fn child_path(parent: &str, name: &OsStr) -> String {
        let name = name.to_string_lossy();
        if parent == "/" {
            format!("/{name}")
        } else {
            format!("{parent}/{name}")
        }
    }

    fn file_attr(inode: u64, attributes: &Attributes) -> FileAttr {
        let kind = match attributes.kind {
            ObjectKind::Directory => FileType::Directory,
            ObjectKind::File => FileType::RegularFile,
        };
        FileAttr {
            ino: inode,
            size: attributes.size,
            blocks: 0,
            atime: SystemTime::UNIX_EPOCH,
            mtime: SystemTime::UNIX_EPOCH,
            ctime: SystemTime::UNIX_EPOCH,
            crtime: SystemTime::UNIX_EPOCH,
            kind,
            perm: (attributes.mode & 0o7777) as u16,
            nlink: attributes.nlink,
            uid: 0,
            gid: 0,
            rdev: 0,
            blksize: 512,
            flags: 0,
        }
    }
}

impl<P: RemoteCallPort> Filesystem for NameFs<P> {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), libc::c_int> {
        let Some(adapter) = self.adapter.as_ref() else {
            return Err(libc::EIO);
        };
        if !adapter.error_log().initialize() {
            warn!("cannot initialize the error log");
            return Err(libc::EIO);
        }
        adapter.initialize().map_err(|errno| errno.raw())
    }

    fn destroy(&mut self) {
        // Drops the adapter and, with it, the remote call port.
        self.adapter = None;
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(adapter) = self.adapter.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let Some(parent_path) = self.resolve(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let path = Self::child_path(&parent_path, name);
        match adapter.getattr(&path) {
            Ok(attributes) => {
                let inode = self.remember(&path);
                reply.entry(&TTL, &Self::file_attr(inode, &attributes), 0);
            }
            Err(errno) => reply.error(errno.raw()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, inode: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(adapter) = self.adapter.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let Some(path) = self.resolve(inode) else {
            reply.error(libc::ENOENT);
            return;
        };
        match adapter.getattr(&path) {
            Ok(attributes) => reply.attr(&TTL, &Self::file_attr(inode, &attributes)),
            Err(errno) => reply.error(errno.raw()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        inode: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(adapter) = self.adapter.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let Some(path) = self.resolve(inode) else {
            reply.error(libc::ENOENT);
            return;
        };
        // Only size changes are supported; the filesystem stores no modes,
        // owners, or times.
        let Some(new_size) = size else {
            reply.error(libc::ENOSYS);
            return;
        };
        if let Err(errno) = adapter.truncate(&path, new_size) {
            reply.error(errno.raw());
            return;
        }
        match adapter.getattr(&path) {
            Ok(attributes) => reply.attr(&TTL, &Self::file_attr(inode, &attributes)),
            Err(errno) => reply.error(errno.raw()),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        let Some(adapter) = self.adapter.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let Some(parent_path) = self.resolve(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let path = Self::child_path(&parent_path, name);
        match adapter.mknod(&path) {
            Ok(()) => {
                let inode = self.remember(&path);
                let attributes = Attributes::file(adapter.policy(), 0);
                reply.entry(&TTL, &Self::file_attr(inode, &attributes), 0);
            }
            Err(errno) => reply.error(errno.raw()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(adapter) = self.adapter.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let Some(parent_path) = self.resolve(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let path = Self::child_path(&parent_path, name);
        match adapter.mkdir(&path) {
            Ok(()) => {
                let inode = self.remember(&path);
                let attributes = Attributes::directory(adapter.policy());
                reply.entry(&TTL, &Self::file_attr(inode, &attributes), 0);
            }
            Err(errno) => reply.error(errno.raw()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(adapter) = self.adapter.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let Some(parent_path) = self.resolve(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let path = Self::child_path(&parent_path, name);
        match adapter.remove(&path) {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno.raw()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        // Deletion is one handler for files and directories alike.
        let Some(adapter) = self.adapter.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let Some(parent_path) = self.resolve(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let path = Self::child_path(&parent_path, name);
        match adapter.remove(&path) {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno.raw()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, inode: u64, flags: i32, reply: ReplyOpen) {
        let Some(adapter) = self.adapter.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let Some(path) = self.resolve(inode) else {
            reply.error(libc::ENOENT);
            return;
        };
        match adapter.open(&path, flags) {
            // The handle slot carries the size captured at open time.
            Ok(handle) => reply.opened(handle, 0),
            Err(errno) => reply.error(errno.raw()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn read(
        &mut self,
        _req: &Request<'_>,
        inode: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(adapter) = self.adapter.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let Some(path) = self.resolve(inode) else {
            reply.error(libc::ENOENT);
            return;
        };
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        let mut buffer = vec![0u8; size as usize];
        match adapter.read(&path, &mut buffer, offset as u64, fh) {
            Ok(count) => reply.data(&buffer[..count]),
            Err(errno) => reply.error(errno.raw()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write(
        &mut self,
        _req: &Request<'_>,
        inode: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Some(adapter) = self.adapter.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let Some(path) = self.resolve(inode) else {
            reply.error(libc::ENOENT);
            return;
        };
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        match adapter.write(&path, data, offset as u64) {
            Ok(written) => reply.written(written as u32),
            Err(errno) => reply.error(errno.raw()),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        // Nothing is cached.
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn fsync(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, inode: u64, _flags: i32, reply: ReplyOpen) {
        let Some(adapter) = self.adapter.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let Some(path) = self.resolve(inode) else {
            reply.error(libc::ENOENT);
            return;
        };
        match adapter.opendir(&path) {
            Ok(()) => reply.opened(0, 0),
            Err(errno) => reply.error(errno.raw()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        inode: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(adapter) = self.adapter.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let Some(path) = self.resolve(inode) else {
            reply.error(libc::ENOENT);
            return;
        };
        // The full listing is fetched on every call; the offset only skips
        // entries already delivered to the kernel.
        let mut names = Vec::new();
        if let Err(errno) = adapter.readdir(&path, &mut |name| {
            names.push(name.to_owned());
            false
        }) {
            reply.error(errno.raw());
            return;
        }
        let mut listing = Vec::with_capacity(names.len().saturating_add(2));
        listing.push((inode, FileType::Directory, ".".to_owned()));
        listing.push((FUSE_ROOT_ID, FileType::Directory, "..".to_owned()));
        for name in names {
            let child = Self::child_path(&path, OsStr::new(&name));
            let child_inode = self.remember(&child);
            // Entry kinds are refined by the subsequent lookup.
            listing.push((child_inode, FileType::RegularFile, name));
        }
        let start = usize::try_from(offset).unwrap_or(0);
        for (index, (entry_inode, kind, name)) in listing.into_iter().enumerate().skip(start) {
            if reply.add(entry_inode, (index + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        reply.ok();
    }

    fn fsyncdir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _datasync: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let Some(adapter) = self.adapter.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let stats = adapter.statfs();
        reply.statfs(
            stats.blocks,
            stats.blocks_free,
            stats.blocks_available,
            0,
            0,
            stats.block_size as u32,
            0,
            stats.fragment_size as u32,
        );
    }

    fn access(&mut self, _req: &Request<'_>, inode: u64, mask: i32, reply: ReplyEmpty) {
        let Some(adapter) = self.adapter.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let Some(path) = self.resolve(inode) else {
            reply.error(libc::ENOENT);
            return;
        };
        match adapter.access(&path, AccessRequest::from_mask(mask)) {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno.raw()),
        }
    }
}

/// Mount the filesystem at `mountpoint` and serve callbacks until unmount.
pub fn mount<P: RemoteCallPort + 'static>(adapter: Adapter<P>, mountpoint: &Path) -> Result<()> {
    let filesystem = NameFs::new(adapter);
    let options = [
        MountOption::FSName("namefs".to_owned()),
        MountOption::AutoUnmount,
    ];
    fuser::mount2(filesystem, mountpoint, &options)
        .with_context(|| format!("mount {}", mountpoint.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_root_path_owns_the_root_inode() {
        let table = InodeTable::new();
        assert_eq!(table.path_for(FUSE_ROOT_ID).as_deref(), Some("/"));
    }

    #[test]
    fn paths_keep_their_inode() {
        let mut table = InodeTable::new();
        let first = table.insert("/a.txt");
        let second = table.insert("/a.txt");
        assert_eq!(first, second);
        assert_ne!(first, FUSE_ROOT_ID);
        assert_eq!(table.path_for(first).as_deref(), Some("/a.txt"));
    }

    #[test]
    fn child_paths_join_without_double_slashes() {
        assert_eq!(
            NameFs::<crate::port::inproc::InProcessPort>::child_path("/", OsStr::new("a")),
            "/a"
        );
        assert_eq!(
            NameFs::<crate::port::inproc::InProcessPort>::child_path("/docs", OsStr::new("a")),
            "/docs/a"
        );
    }

    #[test]
    fn attributes_translate_to_kernel_form() {
        let attributes = Attributes {
            kind: ObjectKind::File,
            mode: 0o100_644,
            nlink: 1,
            size: 10,
        };
        let attr = NameFs::<crate::port::inproc::InProcessPort>::file_attr(7, &attributes);
        assert_eq!(attr.ino, 7);
        assert_eq!(attr.size, 10);
        assert_eq!(attr.perm, 0o644);
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.nlink, 1);
        assert_eq!(attr.uid, 0);
        assert_eq!(attr.gid, 0);
    }
}
