use std::time::Duration;

use core_io::net::{HostAddress, NetworkDatagram, UdpSocket};

const TIMEOUT: Option<Duration> = Some(Duration::from_secs(5));

fn bound_localhost() -> UdpSocket {
    let mut socket = UdpSocket::new();
    socket.bind(&HostAddress::from_string("127.0.0.1"), 0).unwrap();
    assert!(socket.is_bound());
    assert!(socket.socket_descriptor().is_valid());
    socket
}

#[test]
fn test_request_and_reply() {
    let mut client = bound_localhost();
    let mut server = bound_localhost();
    let server_port = server.local_port();
    assert_ne!(server_port, 0);

    let mut request = NetworkDatagram::to(b"lookup", &server.local_address(), server_port);
    request.set_hop_limit(Some(2));
    assert_eq!(client.send_datagram(&request).unwrap(), 6);

    assert!(server.wait_for_ready_read(TIMEOUT));
    assert_eq!(server.pending_datagram_size(), Some(6));
    let received = server.receive_datagram(None).unwrap();
    assert_eq!(received.data().as_slice(), b"lookup");
    assert_eq!(received.sender_port(), Some(client.local_port()));
    assert_eq!(received.destination_port(), Some(server_port));
    assert!(received.sender_address().is_some_and(|a| a.is_loopback()));

    server.send_datagram(&received.make_reply(b"answer")).unwrap();
    assert!(client.wait_for_ready_read(TIMEOUT));
    let mut buf = [0u8; 64];
    let (len, from, port) = client.read_datagram(&mut buf).unwrap();
    assert_eq!(&buf[..len], b"answer");
    assert_eq!(from.to_string(), "127.0.0.1");
    assert_eq!(port, server_port);
}

#[test]
fn test_receive_truncates_to_max_size() {
    let mut sender = UdpSocket::new();
    let mut receiver = bound_localhost();
    let port = receiver.local_port();

    sender
        .write_datagram(b"0123456789", &HostAddress::from_string("127.0.0.1"), port)
        .unwrap();
    // The first send binds to an ephemeral port.
    assert!(sender.is_bound());

    assert!(receiver.wait_for_ready_read(TIMEOUT));
    let datagram = receiver.receive_datagram(Some(4)).unwrap();
    assert_eq!(datagram.data().as_slice(), b"0123");
    assert!(!receiver.has_pending_datagrams());
    assert!(receiver.receive_datagram(None).is_err());
}

#[test]
fn test_connected_write_reaches_peer() {
    let mut receiver = bound_localhost();
    let port = receiver.local_port();

    let mut sender = UdpSocket::new();
    sender.connect_to_host("127.0.0.1", port).unwrap();
    assert_eq!(sender.peer_port(), port);
    assert_eq!(sender.write(b"ping").unwrap(), 4);

    assert!(receiver.wait_for_ready_read(TIMEOUT));
    let mut buf = [0u8; 8];
    let (len, _, from_port) = receiver.read_datagram(&mut buf).unwrap();
    assert_eq!(&buf[..len], b"ping");
    assert_eq!(from_port, sender.local_port());

    receiver.close();
    assert!(!receiver.is_bound());
    assert!(!receiver.wait_for_ready_read(Some(Duration::from_millis(10))));
}
