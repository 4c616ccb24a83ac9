// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Define the remote call port boundary.
// Author: Lukas Bower

//! The remote call port: the boundary through which handlers invoke named
//! operations on the remote executor.
//!
//! Ports multiplex a shared transport that binds per-thread state, so a
//! thread must be attached before it calls and detached afterwards. The
//! [`ThreadAttachment`] guard scopes that contract: it attaches on
//! construction and detaches in `Drop`, on every exit path.

/// In-process namespace for mock mounts and tests.
pub mod inproc;
/// Blocking TCP call port.
pub mod tcp;
/// Framed wire encoding shared by the TCP port and its peers.
pub mod wire;

use std::fmt;
use std::io;

use thiserror::Error;

/// One invocation of a named remote operation.
#[derive(Debug, Clone, Copy)]
pub enum RemoteCall<'a> {
    /// One-time remote-side bootstrap with the naming-server host.
    Initialize {
        /// Host identifier, UTF-8 bytes.
        host: &'a [u8],
    },
    /// Ask whether a path names a directory (true) or a file (false).
    Directory {
        /// Absolute path bytes.
        path: &'a [u8],
    },
    /// Ask for a file's length in bytes.
    Size {
        /// Absolute path bytes.
        path: &'a [u8],
    },
    /// Create a file; false means an object already exists there.
    CreateFile {
        /// Absolute path bytes.
        path: &'a [u8],
    },
    /// Create a directory; same convention as `CreateFile`.
    CreateDirectory {
        /// Absolute path bytes.
        path: &'a [u8],
    },
    /// Delete a file or directory; false means it could not be deleted.
    Delete {
        /// Absolute path bytes.
        path: &'a [u8],
    },
    /// Read up to `length` bytes starting at `offset`.
    Read {
        /// Absolute path bytes.
        path: &'a [u8],
        /// Starting offset in the file.
        offset: i64,
        /// Maximum number of bytes to return.
        length: i32,
        /// File length captured at open time; the remote clamps against it.
        handle: i64,
    },
    /// Write a buffer at `offset`, extending the file if needed.
    Write {
        /// Absolute path bytes.
        path: &'a [u8],
        /// Starting offset in the file.
        offset: i64,
        /// Bytes to write.
        data: &'a [u8],
    },
    /// List a directory as a NUL-terminated name stream.
    List {
        /// Absolute path bytes.
        path: &'a [u8],
    },
}

impl RemoteCall<'_> {
    /// Stable wire name of the operation.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            RemoteCall::Initialize { .. } => "initialize",
            RemoteCall::Directory { .. } => "directory",
            RemoteCall::Size { .. } => "size",
            RemoteCall::CreateFile { .. } => "createFile",
            RemoteCall::CreateDirectory { .. } => "createDirectory",
            RemoteCall::Delete { .. } => "delete",
            RemoteCall::Read { .. } => "read",
            RemoteCall::Write { .. } => "write",
            RemoteCall::List { .. } => "list",
        }
    }
}

/// Typed result of a successful remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteValue {
    /// No result.
    Unit,
    /// Boolean result.
    Bool(bool),
    /// 64-bit integer result.
    I64(i64),
    /// Byte-array result.
    Bytes(Vec<u8>),
}

/// Structured failure reported by the remote executor.
///
/// The class name is a stable slash-separated string drawn from a closed set
/// of known classes plus an open tail. The ancestry lists the superclass
/// chain as the remote reports it, most derived first, so classification can
/// match a subclass it has never heard of against a known ancestor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFault {
    class: String,
    ancestry: Vec<String>,
    message: String,
    trace: Option<String>,
}

impl RemoteFault {
    /// Build a fault with no ancestry or trace.
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            ancestry: Vec::new(),
            message: message.into(),
            trace: None,
        }
    }

    /// Attach the superclass chain, most derived first.
    #[must_use]
    pub fn with_ancestry(mut self, ancestry: Vec<String>) -> Self {
        self.ancestry = ancestry;
        self
    }

    /// Attach a remote stack trace.
    #[must_use]
    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    /// The fault's own class name.
    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Human-readable description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Remote stack trace, when the executor supplied one.
    #[must_use]
    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }

    /// True when the fault's class, or any reported superclass, matches.
    #[must_use]
    pub fn is_instance_of(&self, class: &str) -> bool {
        self.class == class || self.ancestry.iter().any(|ancestor| ancestor == class)
    }
}

impl fmt::Display for RemoteFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Dotted form, as the remote runtime itself prints failure classes.
        let dotted = self.class.replace('/', ".");
        if self.message.is_empty() {
            write!(f, "{dotted}")
        } else {
            write!(f, "{dotted}: {}", self.message)
        }
    }
}

/// Failure to deliver or complete a remote call.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer could not be reached.
    #[error("cannot connect to {endpoint}: {source}")]
    Connect {
        /// Remote endpoint description.
        endpoint: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// The connection failed mid-call.
    #[error("connection failed: {0}")]
    Io(#[from] io::Error),
    /// A request could not be encoded for the wire.
    #[error("cannot encode {method} request: {reason}")]
    Encode {
        /// Operation being encoded.
        method: &'static str,
        /// Encoder diagnostic.
        reason: String,
    },
    /// A reply could not be decoded from the wire.
    #[error("cannot decode reply: {reason}")]
    Decode {
        /// Decoder diagnostic.
        reason: String,
    },
    /// The reply value does not match the method signature.
    #[error("unexpected reply shape for {method}")]
    ReplyShape {
        /// Operation whose reply was malformed.
        method: &'static str,
    },
    /// The calling thread is not attached to the port.
    #[error("calling thread is not attached to the remote call port")]
    NotAttached,
}

/// Remote call failure: a structured fault or a transport error.
#[derive(Debug, Error)]
pub enum CallError {
    /// The remote executor reported a named failure.
    #[error("{0}")]
    Fault(RemoteFault),
    /// The call could not be delivered or completed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Boundary through which the driver invokes remote operations.
///
/// Implementations must be safe to use from many threads at once; the
/// attach and detach primitives are cheap and idempotent per thread.
pub trait RemoteCallPort: Send + Sync {
    /// Register the calling thread with the port.
    fn attach(&self) -> Result<(), TransportError>;

    /// De-register the calling thread.
    fn detach(&self);

    /// Invoke a remote operation on behalf of the attached thread.
    fn call(&self, call: RemoteCall<'_>) -> Result<RemoteValue, CallError>;
}

/// Scoped thread attachment.
///
/// Handlers hold one of these for the duration of their remote traffic; the
/// `Drop` implementation detaches unconditionally, so no error path can leak
/// the thread's port state.
#[derive(Debug)]
pub struct ThreadAttachment<'a, P: RemoteCallPort + ?Sized> {
    port: &'a P,
}

impl<'a, P: RemoteCallPort + ?Sized> ThreadAttachment<'a, P> {
    /// Attach the calling thread to `port`.
    pub fn new(port: &'a P) -> Result<Self, TransportError> {
        port.attach()?;
        Ok(Self { port })
    }

    /// Remote bootstrap with the naming-server host.
    pub fn initialize(&self, host: &[u8]) -> Result<(), CallError> {
        match self.port.call(RemoteCall::Initialize { host })? {
            RemoteValue::Unit => Ok(()),
            _ => Err(reply_shape("initialize")),
        }
    }

    /// True when `path` names a directory, false when it names a file.
    pub fn directory(&self, path: &[u8]) -> Result<bool, CallError> {
        match self.port.call(RemoteCall::Directory { path })? {
            RemoteValue::Bool(value) => Ok(value),
            _ => Err(reply_shape("directory")),
        }
    }

    /// Length of the file at `path`.
    pub fn size(&self, path: &[u8]) -> Result<i64, CallError> {
        match self.port.call(RemoteCall::Size { path })? {
            RemoteValue::I64(value) => Ok(value),
            _ => Err(reply_shape("size")),
        }
    }

    /// Create a file; false when an object already exists at `path`.
    pub fn create_file(&self, path: &[u8]) -> Result<bool, CallError> {
        match self.port.call(RemoteCall::CreateFile { path })? {
            RemoteValue::Bool(value) => Ok(value),
            _ => Err(reply_shape("createFile")),
        }
    }

    /// Create a directory; same convention as [`Self::create_file`].
    pub fn create_directory(&self, path: &[u8]) -> Result<bool, CallError> {
        match self.port.call(RemoteCall::CreateDirectory { path })? {
            RemoteValue::Bool(value) => Ok(value),
            _ => Err(reply_shape("createDirectory")),
        }
    }

    /// Delete the object at `path`; false when it could not be deleted.
    pub fn delete(&self, path: &[u8]) -> Result<bool, CallError> {
        match self.port.call(RemoteCall::Delete { path })? {
            RemoteValue::Bool(value) => Ok(value),
            _ => Err(reply_shape("delete")),
        }
    }

    /// Read up to `length` bytes at `offset` from the file at `path`.
    pub fn read(
        &self,
        path: &[u8],
        offset: i64,
        length: i32,
        handle: i64,
    ) -> Result<Vec<u8>, CallError> {
        match self.port.call(RemoteCall::Read {
            path,
            offset,
            length,
            handle,
        })? {
            RemoteValue::Bytes(value) => Ok(value),
            _ => Err(reply_shape("read")),
        }
    }

    /// Write `data` at `offset` into the file at `path`.
    pub fn write(&self, path: &[u8], offset: i64, data: &[u8]) -> Result<(), CallError> {
        match self.port.call(RemoteCall::Write { path, offset, data })? {
            RemoteValue::Unit => Ok(()),
            _ => Err(reply_shape("write")),
        }
    }

    /// List the directory at `path` as a NUL-terminated name stream.
    pub fn list(&self, path: &[u8]) -> Result<Vec<u8>, CallError> {
        match self.port.call(RemoteCall::List { path })? {
            RemoteValue::Bytes(value) => Ok(value),
            _ => Err(reply_shape("list")),
        }
    }
}

impl<P: RemoteCallPort + ?Sized> Drop for ThreadAttachment<'_, P> {
    fn drop(&mut self) {
        self.port.detach();
    }
}

fn reply_shape(method: &'static str) -> CallError {
    CallError::Transport(TransportError::ReplyShape { method })
}
