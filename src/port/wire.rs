// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Frame and encode remote calls for the TCP port.
// Author: Lukas Bower

//! Framed wire encoding for the TCP call port.
//!
//! Frames are a 4-byte big-endian length prefix followed by a MessagePack
//! body. A connection carries strictly alternating request and reply frames.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use super::{RemoteCall, RemoteFault, RemoteValue, TransportError};

/// Upper bound on a frame body, guarding against corrupt length prefixes.
pub const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

/// Typed argument as carried on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum WireArg {
    /// Raw byte array.
    Bytes(Vec<u8>),
    /// 32-bit integer.
    I32(i32),
    /// 64-bit integer.
    I64(i64),
}

/// A single remote invocation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireRequest {
    /// Operation name.
    pub method: String,
    /// Positional arguments.
    pub args: Vec<WireArg>,
}

/// Typed result value as carried on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum WireValue {
    /// No result.
    Unit,
    /// Boolean result.
    Bool(bool),
    /// 64-bit integer result.
    I64(i64),
    /// Byte-array result.
    Bytes(Vec<u8>),
}

/// Structured remote failure as carried on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireFault {
    /// Failure class name, slash-separated.
    pub class: String,
    /// Superclass chain, most derived first.
    pub ancestry: Vec<String>,
    /// Human-readable description.
    pub message: String,
    /// Optional remote stack trace.
    pub trace: Option<String>,
}

/// Reply to a single request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum WireReply {
    /// Successful result.
    Value(WireValue),
    /// Named remote failure.
    Fault(WireFault),
}

impl From<&RemoteCall<'_>> for WireRequest {
    fn from(call: &RemoteCall<'_>) -> Self {
        let args = match call {
            RemoteCall::Initialize { host } => vec![WireArg::Bytes(host.to_vec())],
            RemoteCall::Directory { path }
            | RemoteCall::Size { path }
            | RemoteCall::CreateFile { path }
            | RemoteCall::CreateDirectory { path }
            | RemoteCall::Delete { path }
            | RemoteCall::List { path } => vec![WireArg::Bytes(path.to_vec())],
            RemoteCall::Read {
                path,
                offset,
                length,
                handle,
            } => vec![
                WireArg::Bytes(path.to_vec()),
                WireArg::I64(*offset),
                WireArg::I32(*length),
                WireArg::I64(*handle),
            ],
            RemoteCall::Write { path, offset, data } => vec![
                WireArg::Bytes(path.to_vec()),
                WireArg::I64(*offset),
                WireArg::Bytes(data.to_vec()),
            ],
        };
        Self {
            method: call.method().to_owned(),
            args,
        }
    }
}

impl From<WireValue> for RemoteValue {
    fn from(value: WireValue) -> Self {
        match value {
            WireValue::Unit => RemoteValue::Unit,
            WireValue::Bool(value) => RemoteValue::Bool(value),
            WireValue::I64(value) => RemoteValue::I64(value),
            WireValue::Bytes(value) => RemoteValue::Bytes(value),
        }
    }
}

impl From<WireFault> for RemoteFault {
    fn from(fault: WireFault) -> Self {
        let mut value = RemoteFault::new(fault.class, fault.message).with_ancestry(fault.ancestry);
        if let Some(trace) = fault.trace {
            value = value.with_trace(trace);
        }
        value
    }
}

/// Encode a request body.
pub fn encode_request(call: &RemoteCall<'_>) -> Result<Vec<u8>, TransportError> {
    rmp_serde::to_vec(&WireRequest::from(call)).map_err(|err| TransportError::Encode {
        method: call.method(),
        reason: err.to_string(),
    })
}

/// Decode a request body.
pub fn decode_request(body: &[u8]) -> Result<WireRequest, TransportError> {
    rmp_serde::from_slice(body).map_err(|err| TransportError::Decode {
        reason: err.to_string(),
    })
}

/// Encode a reply body.
pub fn encode_reply(reply: &WireReply) -> Result<Vec<u8>, TransportError> {
    rmp_serde::to_vec(reply).map_err(|err| TransportError::Encode {
        method: "reply",
        reason: err.to_string(),
    })
}

/// Decode a reply body.
pub fn decode_reply(body: &[u8]) -> Result<WireReply, TransportError> {
    rmp_serde::from_slice(body).map_err(|err| TransportError::Decode {
        reason: err.to_string(),
    })
}

/// Write one length-prefixed frame.
pub fn write_frame<W: Write>(writer: &mut W, body: &[u8]) -> Result<(), TransportError> {
    let length = u32::try_from(body.len())
        .ok()
        .filter(|length| *length <= MAX_FRAME_BYTES)
        .ok_or_else(|| TransportError::Encode {
            method: "frame",
            reason: format!("body of {} bytes exceeds the frame limit", body.len()),
        })?;
    writer.write_all(&length.to_be_bytes())?;
    writer.write_all(body)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed frame.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>, TransportError> {
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix)?;
    let length = u32::from_be_bytes(prefix);
    if length > MAX_FRAME_BYTES {
        return Err(TransportError::Decode {
            reason: format!("frame of {length} bytes exceeds the frame limit"),
        });
    }
    let mut body = vec![0u8; length as usize];
    reader.read_exact(&mut body)?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrip_preserves_arguments() {
        let call = RemoteCall::Read {
            path: b"/docs/readme.txt",
            offset: 8,
            length: 100,
            handle: 10,
        };
        let body = encode_request(&call).expect("encode");
        let request = decode_request(&body).expect("decode");
        assert_eq!(request.method, "read");
        assert_eq!(request.args.len(), 4);
        assert_eq!(request.args[0], WireArg::Bytes(b"/docs/readme.txt".to_vec()));
        assert_eq!(request.args[1], WireArg::I64(8));
        assert_eq!(request.args[2], WireArg::I32(100));
        assert_eq!(request.args[3], WireArg::I64(10));
    }

    #[test]
    fn reply_roundtrip_preserves_faults() {
        let reply = WireReply::Fault(WireFault {
            class: "java/io/FileNotFoundException".to_owned(),
            ancestry: vec!["java/io/IOException".to_owned()],
            message: "no such file".to_owned(),
            trace: None,
        });
        let body = encode_reply(&reply).expect("encode");
        assert_eq!(decode_reply(&body).expect("decode"), reply);
    }

    #[test]
    fn frames_roundtrip_through_a_stream() {
        let mut stream = Vec::new();
        write_frame(&mut stream, b"hello").expect("write");
        let mut cursor = &stream[..];
        assert_eq!(read_frame(&mut cursor).expect("read"), b"hello");
        assert!(cursor.is_empty());
    }

    #[test]
    fn oversized_frames_are_rejected() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&u32::MAX.to_be_bytes());
        let mut cursor = &stream[..];
        assert!(read_frame(&mut cursor).is_err());
    }
}
