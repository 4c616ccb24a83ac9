// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Speak the framed call protocol over TCP.
// Author: Lukas Bower

//! Blocking TCP implementation of the remote call port.

use std::cell::{Cell, RefCell};
use std::io::{self, BufReader};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::debug;

use super::wire;
use super::{CallError, RemoteCall, RemoteCallPort, RemoteValue, TransportError};

/// Socket timeout applied to connect, read, and write.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

thread_local! {
    // One remote connection per attached thread, tagged with its endpoint
    // so a port targeting a different peer never inherits it.
    static CONNECTION: RefCell<Option<Connection>> = const { RefCell::new(None) };
    static ATTACHED: Cell<bool> = const { Cell::new(false) };
}

struct Connection {
    endpoint: String,
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

/// Remote call port speaking length-prefixed MessagePack frames over TCP.
///
/// Attach binds the calling thread to its own connection, established
/// lazily; detach releases the attachment. The connection itself is kept
/// for the thread's next attachment, which keeps attach cheap.
#[derive(Debug, Clone)]
pub struct TcpCallPort {
    endpoint: String,
    timeout: Duration,
}

impl TcpCallPort {
    /// Create a port targeting `host:port`. No connection is made until a
    /// thread attaches.
    #[must_use]
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            endpoint: format!("{host}:{port}"),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    fn connect(&self) -> Result<Connection, TransportError> {
        let address = self
            .endpoint
            .as_str()
            .to_socket_addrs()
            .map_err(|err| TransportError::Connect {
                endpoint: self.endpoint.clone(),
                source: err,
            })?
            .next()
            .ok_or_else(|| TransportError::Connect {
                endpoint: self.endpoint.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses resolved"),
            })?;
        let stream = TcpStream::connect_timeout(&address, self.timeout).map_err(|err| {
            TransportError::Connect {
                endpoint: self.endpoint.clone(),
                source: err,
            }
        })?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        let reader = BufReader::new(stream.try_clone()?);
        debug!("connected to {}", self.endpoint);
        Ok(Connection {
            endpoint: self.endpoint.clone(),
            stream,
            reader,
        })
    }

    fn exchange(&self, call: &RemoteCall<'_>) -> Result<Vec<u8>, TransportError> {
        let body = wire::encode_request(call)?;
        CONNECTION.with(|slot| {
            let mut slot = slot.borrow_mut();
            let connection = slot.as_mut().ok_or(TransportError::NotAttached)?;
            let result = wire::write_frame(&mut connection.stream, &body)
                .and_then(|()| wire::read_frame(&mut connection.reader));
            if result.is_err() {
                // A failed exchange leaves the stream in an unknown framing
                // state; drop it so the next attach reconnects.
                *slot = None;
            }
            result
        })
    }
}

impl RemoteCallPort for TcpCallPort {
    fn attach(&self) -> Result<(), TransportError> {
        if ATTACHED.with(Cell::get) {
            return Ok(());
        }
        CONNECTION.with(|slot| {
            let mut slot = slot.borrow_mut();
            let reusable = slot
                .as_ref()
                .is_some_and(|connection| connection.endpoint == self.endpoint);
            if !reusable {
                *slot = Some(self.connect()?);
            }
            Ok::<(), TransportError>(())
        })?;
        ATTACHED.with(|flag| flag.set(true));
        Ok(())
    }

    fn detach(&self) {
        ATTACHED.with(|flag| flag.set(false));
    }

    fn call(&self, call: RemoteCall<'_>) -> Result<RemoteValue, CallError> {
        if !ATTACHED.with(Cell::get) {
            return Err(TransportError::NotAttached.into());
        }
        let body = self.exchange(&call)?;
        match wire::decode_reply(&body)? {
            wire::WireReply::Value(value) => Ok(RemoteValue::from(value)),
            wire::WireReply::Fault(fault) => Err(CallError::Fault(fault.into())),
        }
    }
}
