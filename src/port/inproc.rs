// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Provide an in-process namespace for mock mounts and tests.
// Author: Lukas Bower

//! In-process implementation of the remote call port.
//!
//! Backs `namefs --mock` mounts and the test suite with an in-memory
//! namespace that honors the same contract as the real executor, including
//! its fault classes, read clamping against the caller-supplied length
//! handle, and NUL-terminated directory listings.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::{CallError, RemoteCall, RemoteCallPort, RemoteFault, RemoteValue, TransportError};

const ILLEGAL_ARGUMENT: &str = "java/lang/IllegalArgumentException";
const INDEX_OUT_OF_BOUNDS: &str = "java/lang/IndexOutOfBoundsException";
const FILE_NOT_FOUND: &str = "java/io/FileNotFoundException";

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Directory(BTreeMap<String, Node>),
}

impl Node {
    fn is_directory(&self) -> bool {
        matches!(self, Node::Directory(_))
    }
}

/// In-memory remote call port.
///
/// Attach and detach invocations are counted so tests can verify that every
/// handler balances them.
#[derive(Debug)]
pub struct InProcessPort {
    root: Mutex<Node>,
    attach_calls: AtomicU64,
    detach_calls: AtomicU64,
}

impl Default for InProcessPort {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcessPort {
    /// Create a port holding an empty namespace.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Mutex::new(Node::Directory(BTreeMap::new())),
            attach_calls: AtomicU64::new(0),
            detach_calls: AtomicU64::new(0),
        }
    }

    /// Seed a directory, creating missing parents.
    pub fn seed_directory(&self, path: &str) {
        let mut root = self.root.lock().expect("namespace lock");
        let mut node = &mut *root;
        for component in path.split('/').filter(|component| !component.is_empty()) {
            let Node::Directory(children) = node else {
                return;
            };
            node = children
                .entry(component.to_owned())
                .or_insert_with(|| Node::Directory(BTreeMap::new()));
        }
    }

    /// Seed a file with the given contents, creating missing parents.
    pub fn seed_file(&self, path: &str, contents: &[u8]) {
        let Some((parent, name)) = split_parent(path) else {
            return;
        };
        self.seed_directory(parent);
        let mut root = self.root.lock().expect("namespace lock");
        if let Some(Node::Directory(children)) = lookup_mut(&mut root, parent) {
            children.insert(name.to_owned(), Node::File(contents.to_vec()));
        }
    }

    /// Number of attach invocations observed.
    pub fn attach_calls(&self) -> u64 {
        self.attach_calls.load(Ordering::Relaxed)
    }

    /// Number of detach invocations observed.
    pub fn detach_calls(&self) -> u64 {
        self.detach_calls.load(Ordering::Relaxed)
    }

    fn directory(&self, path: &[u8]) -> Result<RemoteValue, CallError> {
        let components = parse_path(path)?;
        let root = self.root.lock().expect("namespace lock");
        let node = lookup_components(&root, &components)
            .ok_or_else(|| file_not_found("path does not refer to an existing object"))?;
        Ok(RemoteValue::Bool(node.is_directory()))
    }

    fn size(&self, path: &[u8]) -> Result<RemoteValue, CallError> {
        let components = parse_path(path)?;
        let root = self.root.lock().expect("namespace lock");
        match lookup_components(&root, &components) {
            Some(Node::File(contents)) => Ok(RemoteValue::I64(contents.len() as i64)),
            _ => Err(file_not_found("path does not refer to an existing file")),
        }
    }

    fn create(&self, path: &[u8], directory: bool) -> Result<RemoteValue, CallError> {
        let components = parse_path(path)?;
        let Some((name, parents)) = components.split_last() else {
            return Err(illegal_argument("the root directory cannot be created"));
        };
        let mut root = self.root.lock().expect("namespace lock");
        let Some(Node::Directory(children)) = lookup_components_mut(&mut root, parents) else {
            return Err(file_not_found("parent directory does not exist"));
        };
        if children.contains_key(name) {
            return Ok(RemoteValue::Bool(false));
        }
        let node = if directory {
            Node::Directory(BTreeMap::new())
        } else {
            Node::File(Vec::new())
        };
        children.insert(name.clone(), node);
        Ok(RemoteValue::Bool(true))
    }

    fn delete(&self, path: &[u8]) -> Result<RemoteValue, CallError> {
        let components = parse_path(path)?;
        let Some((name, parents)) = components.split_last() else {
            // The root directory can never be deleted.
            return Ok(RemoteValue::Bool(false));
        };
        let mut root = self.root.lock().expect("namespace lock");
        let Some(Node::Directory(children)) = lookup_components_mut(&mut root, parents) else {
            return Err(file_not_found("object does not exist"));
        };
        if children.remove(name).is_none() {
            return Err(file_not_found("object does not exist"));
        }
        Ok(RemoteValue::Bool(true))
    }

    fn read(
        &self,
        path: &[u8],
        offset: i64,
        length: i32,
        handle: i64,
    ) -> Result<RemoteValue, CallError> {
        let components = parse_path(path)?;
        let root = self.root.lock().expect("namespace lock");
        let Some(Node::File(contents)) = lookup_components(&root, &components) else {
            return Err(file_not_found("path does not refer to an existing file"));
        };
        if offset < 0 {
            return Err(illegal_argument("offset is negative"));
        }
        if length < 0 {
            return Err(index_out_of_bounds("length is negative"));
        }
        // The caller supplies the file length it captured at open time; the
        // request is clamped against that, not against the live contents.
        if offset >= handle {
            return Ok(RemoteValue::Bytes(Vec::new()));
        }
        let wanted = i64::from(length).min(handle - offset);
        let start = (offset as usize).min(contents.len());
        let end = start.saturating_add(wanted as usize).min(contents.len());
        Ok(RemoteValue::Bytes(contents[start..end].to_vec()))
    }

    fn write(&self, path: &[u8], offset: i64, data: &[u8]) -> Result<RemoteValue, CallError> {
        let components = parse_path(path)?;
        let mut root = self.root.lock().expect("namespace lock");
        let Some(Node::File(contents)) = lookup_components_mut(&mut root, &components) else {
            return Err(file_not_found("path does not refer to an existing file"));
        };
        if offset < 0 {
            return Err(index_out_of_bounds("offset is negative"));
        }
        let offset = offset as usize;
        let end = offset.saturating_add(data.len());
        if contents.len() < end {
            contents.resize(end, 0);
        }
        contents[offset..end].copy_from_slice(data);
        Ok(RemoteValue::Unit)
    }

    fn list(&self, path: &[u8]) -> Result<RemoteValue, CallError> {
        let components = parse_path(path)?;
        let root = self.root.lock().expect("namespace lock");
        let Some(Node::Directory(children)) = lookup_components(&root, &components) else {
            return Err(file_not_found("path does not refer to an existing directory"));
        };
        let mut flattened = Vec::new();
        for name in children.keys() {
            // Names with embedded NUL cannot survive the stream encoding
            // and are dropped, exactly as the real executor drops them.
            if name.bytes().any(|byte| byte == 0) {
                continue;
            }
            flattened.extend_from_slice(name.as_bytes());
            flattened.push(0);
        }
        Ok(RemoteValue::Bytes(flattened))
    }
}

impl RemoteCallPort for InProcessPort {
    fn attach(&self) -> Result<(), TransportError> {
        self.attach_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn detach(&self) {
        self.detach_calls.fetch_add(1, Ordering::Relaxed);
    }

    fn call(&self, call: RemoteCall<'_>) -> Result<RemoteValue, CallError> {
        match call {
            RemoteCall::Initialize { .. } => Ok(RemoteValue::Unit),
            RemoteCall::Directory { path } => self.directory(path),
            RemoteCall::Size { path } => self.size(path),
            RemoteCall::CreateFile { path } => self.create(path, false),
            RemoteCall::CreateDirectory { path } => self.create(path, true),
            RemoteCall::Delete { path } => self.delete(path),
            RemoteCall::Read {
                path,
                offset,
                length,
                handle,
            } => self.read(path, offset, length, handle),
            RemoteCall::Write { path, offset, data } => self.write(path, offset, data),
            RemoteCall::List { path } => self.list(path),
        }
    }
}

fn parse_path(path: &[u8]) -> Result<Vec<String>, CallError> {
    let text = std::str::from_utf8(path)
        .map_err(|_| illegal_argument("path is not a valid UTF-8 string"))?;
    if !text.starts_with('/') {
        return Err(illegal_argument("path is not absolute"));
    }
    Ok(text
        .split('/')
        .filter(|component| !component.is_empty())
        .map(str::to_owned)
        .collect())
}

fn split_parent(path: &str) -> Option<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');
    let index = trimmed.rfind('/')?;
    let name = &trimmed[index + 1..];
    if name.is_empty() {
        return None;
    }
    Some((&trimmed[..index.max(1)], name))
}

fn lookup_components<'t>(root: &'t Node, components: &[String]) -> Option<&'t Node> {
    let mut node = root;
    for component in components {
        let Node::Directory(children) = node else {
            return None;
        };
        node = children.get(component)?;
    }
    Some(node)
}

fn lookup_components_mut<'t>(root: &'t mut Node, components: &[String]) -> Option<&'t mut Node> {
    let mut node = root;
    for component in components {
        let Node::Directory(children) = node else {
            return None;
        };
        node = children.get_mut(component)?;
    }
    Some(node)
}

fn lookup_mut<'t>(root: &'t mut Node, path: &str) -> Option<&'t mut Node> {
    let mut node = root;
    for component in path.split('/').filter(|component| !component.is_empty()) {
        let Node::Directory(children) = node else {
            return None;
        };
        node = children.get_mut(component)?;
    }
    Some(node)
}

fn fault(class: &str, ancestry: &[&str], message: &str) -> CallError {
    CallError::Fault(
        RemoteFault::new(class, message)
            .with_ancestry(ancestry.iter().map(|&name| name.to_owned()).collect()),
    )
}

fn file_not_found(message: &str) -> CallError {
    fault(
        FILE_NOT_FOUND,
        &["java/io/IOException", "java/lang/Exception", "java/lang/Throwable"],
        message,
    )
}

fn illegal_argument(message: &str) -> CallError {
    fault(
        ILLEGAL_ARGUMENT,
        &["java/lang/RuntimeException", "java/lang/Exception", "java/lang/Throwable"],
        message,
    )
}

fn index_out_of_bounds(message: &str) -> CallError {
    fault(
        INDEX_OUT_OF_BOUNDS,
        &["java/lang/RuntimeException", "java/lang/Exception", "java/lang/Throwable"],
        message,
    )
}
