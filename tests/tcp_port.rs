// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Exercise the TCP call port against a scripted wire peer.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::net::{SocketAddr, TcpListener};
use std::thread::JoinHandle;

use serial_test::serial;

use namefs::fault;
use namefs::adapter::Errno;
use namefs::port::tcp::TcpCallPort;
use namefs::port::wire::{
    decode_request, encode_reply, read_frame, write_frame, WireFault, WireReply, WireValue,
};
use namefs::port::{CallError, RemoteCallPort, ThreadAttachment, TransportError};

/// Serve one connection, answering each request with the next scripted
/// reply, then exit.
fn spawn_peer(replies: Vec<WireReply>) -> (SocketAddr, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind scripted peer");
    let address = listener.local_addr().expect("local address");
    let handle = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut reader = stream.try_clone().expect("clone stream");
        let mut methods = Vec::new();
        for reply in replies {
            let Ok(body) = read_frame(&mut reader) else {
                break;
            };
            let request = decode_request(&body).expect("decode request");
            methods.push(request.method);
            let body = encode_reply(&reply).expect("encode reply");
            write_frame(&mut stream, &body).expect("write reply");
        }
        methods
    });
    (address, handle)
}

#[test]
#[serial]
fn values_and_faults_cross_the_wire() {
    let (address, peer) = spawn_peer(vec![
        WireReply::Value(WireValue::Bool(true)),
        WireReply::Fault(WireFault {
            class: "java/io/FileNotFoundException".to_owned(),
            ancestry: vec!["java/io/IOException".to_owned()],
            message: "no such file".to_owned(),
            trace: None,
        }),
    ]);
    let port = TcpCallPort::new("127.0.0.1", address.port());
    let attachment = ThreadAttachment::new(&port).expect("attach");
    assert!(attachment.directory(b"/docs").expect("directory"));
    let err = attachment.directory(b"/nope").expect_err("scripted fault");
    match err {
        CallError::Fault(remote) => {
            assert_eq!(remote.class(), "java/io/FileNotFoundException");
            assert_eq!(fault::classify(&remote), Errno::NOENT);
        }
        CallError::Transport(other) => panic!("expected a fault, got {other}"),
    }
    drop(attachment);
    assert_eq!(peer.join().expect("peer"), vec!["directory", "directory"]);
}

#[test]
#[serial]
fn calls_without_attachment_are_rejected() {
    let (address, peer) = spawn_peer(Vec::new());
    let port = TcpCallPort::new("127.0.0.1", address.port());
    let err = port
        .call(namefs::port::RemoteCall::Directory { path: b"/" })
        .expect_err("not attached");
    assert!(matches!(
        err,
        CallError::Transport(TransportError::NotAttached)
    ));
    // Attach once so the scripted peer's accept completes, then let the
    // guard detach.
    let attachment = ThreadAttachment::new(&port).expect("attach");
    drop(attachment);
    let _ = peer.join();
}

#[test]
#[serial]
fn unreachable_peers_fail_attach_with_a_connect_error() {
    // Bind then drop to obtain a port with no listener behind it.
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let address = listener.local_addr().expect("local address");
    drop(listener);
    let port = TcpCallPort::new("127.0.0.1", address.port());
    let err = ThreadAttachment::new(&port).expect_err("connect must fail");
    assert!(matches!(err, TransportError::Connect { .. }));
}
