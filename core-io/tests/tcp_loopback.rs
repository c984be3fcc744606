use std::io::{Read, Write};
use std::thread;
use std::time::Duration;

use bridge_traits::ffi::SpecialAddress;
use core_io::net::{HostAddress, TcpServer, TcpSocket};

const TIMEOUT: Option<Duration> = Some(Duration::from_secs(5));

#[test]
fn test_echo_over_loopback() {
    let mut server = TcpServer::new();
    assert!(server.listen(&HostAddress::from_special(SpecialAddress::LocalHost), 0));
    assert!(server.is_listening());
    let port = server.server_port();
    assert_ne!(port, 0);
    assert_eq!(server.server_address().to_string(), "127.0.0.1");

    let client = thread::spawn(move || {
        let mut socket = TcpSocket::new();
        assert!(socket.connect_to_host("127.0.0.1", port));
        assert!(socket.wait_for_connected(TIMEOUT));
        assert_eq!(socket.peer_port(), port);

        socket.write_all(b"ping").unwrap();
        let mut reply = [0u8; 4];
        socket.read_exact(&mut reply).unwrap();
        socket.close();
        reply
    });

    assert!(server.wait_for_new_connection(TIMEOUT).unwrap());
    let mut accepted = server.next_pending_connection().unwrap();
    assert!(accepted.is_connected());
    assert!(accepted.socket_descriptor().is_valid());
    assert!(accepted.peer_address().is_loopback());

    let mut request = [0u8; 4];
    accepted.read_exact(&mut request).unwrap();
    assert_eq!(&request, b"ping");
    accepted.write_all(b"pong").unwrap();

    assert_eq!(&client.join().unwrap(), b"pong");

    // Peer closed: reads report end of stream.
    let mut tail = [0u8; 1];
    assert_eq!(accepted.read(&mut tail).unwrap(), 0);
}

#[test]
fn test_connect_to_closed_port_fails() {
    let port = {
        let mut server = TcpServer::new();
        assert!(server.listen(&HostAddress::from_special(SpecialAddress::LocalHost), 0));
        server.server_port()
    };

    let mut socket = TcpSocket::new();
    assert!(socket.connect_to_host("127.0.0.1", port));
    assert!(!socket.wait_for_connected(TIMEOUT));
    assert!(!socket.is_connected());
    assert!(!socket.error_string().is_empty());
}

#[test]
fn test_pending_connections_respect_limit() {
    let mut server = TcpServer::new();
    assert_eq!(server.max_pending_connections(), 30);
    server.set_max_pending_connections(1);
    assert!(server.listen(&HostAddress::from_special(SpecialAddress::LocalHost), 0));
    let port = server.server_port();

    let clients: Vec<TcpSocket> = (0..2)
        .map(|_| {
            let mut socket = TcpSocket::new();
            assert!(socket.connect_to_host("127.0.0.1", port));
            assert!(socket.wait_for_connected(TIMEOUT));
            socket
        })
        .collect();

    assert!(server.wait_for_new_connection(TIMEOUT).unwrap());
    let first = server.next_pending_connection();
    assert!(first.is_some());

    // The second client was left in the backlog and is accepted now.
    assert!(server.has_pending_connections());
    assert!(server.next_pending_connection().is_some());
    assert!(server.next_pending_connection().is_none());
    drop(clients);
}
