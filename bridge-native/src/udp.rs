//! Connectionless UDP socket.
//!
//! The socket is non-blocking once bound: reads fail with `-1` when nothing
//! is queued and `wait_for_ready_read` does the waiting. Sending on an
//! unbound socket binds it to an ephemeral port first.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::os::fd::AsRawFd;

use bridge_traits::ffi::ByteView;
use tracing::{debug, warn};

use crate::bytearray::{write_bytes, NativeByteArray};
use crate::datagram::{write_datagram, NativeNetworkDatagram, NetworkDatagramData};
use crate::hostaddress::{write_address, Addr, HostAddressData, NativeHostAddress};
use crate::socket::{address_of, wait_readable, NativeSocketDescriptor};

/// Largest payload a single datagram can carry.
const MAX_DATAGRAM: usize = 65_535;

pub struct NativeUdpSocket {
    socket: Option<UdpSocket>,
    peer: Option<SocketAddr>,
    error: String,
}

/// Dual-stack sockets report IPv4 peers as mapped addresses.
fn canonical(addr: SocketAddr) -> SocketAddr {
    SocketAddr::new(addr.ip().to_canonical(), addr.port())
}

impl NativeUdpSocket {
    fn new() -> Self {
        Self {
            socket: None,
            peer: None,
            error: "Unknown error".to_string(),
        }
    }

    fn fail(&mut self, message: impl Into<String>) -> bool {
        self.error = message.into();
        debug!(error = %self.error, "UDP socket error");
        false
    }

    fn bind(&mut self, address: &HostAddressData, port: u16) -> bool {
        if self.socket.is_some() {
            return self.fail("The socket is already bound");
        }
        let ip = match address.addr {
            Addr::Null | Addr::Any => Some(IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
            _ => address.ip(),
        };
        match ip {
            Some(ip) => self.bind_to(SocketAddr::new(ip, port)),
            None => self.fail("Invalid address"),
        }
    }

    fn bind_to(&mut self, addr: SocketAddr) -> bool {
        let bound = UdpSocket::bind(addr).and_then(|socket| {
            socket.set_nonblocking(true)?;
            Ok(socket)
        });
        match bound {
            Ok(socket) => {
                debug!(addr = ?socket.local_addr().ok(), "UDP socket bound");
                self.socket = Some(socket);
                true
            }
            Err(err) => self.fail(err.to_string()),
        }
    }

    fn ensure_bound(&mut self, target: SocketAddr) -> bool {
        if self.socket.is_some() {
            return true;
        }
        let any = match target {
            SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        self.bind_to(SocketAddr::new(any, 0))
    }

    /// `target` in the address family of the bound socket.
    fn routable(&self, target: SocketAddr) -> SocketAddr {
        let local_v6 = self
            .socket
            .as_ref()
            .and_then(|socket| socket.local_addr().ok())
            .is_some_and(|local| local.is_ipv6());
        match target {
            SocketAddr::V4(v4) if local_v6 => SocketAddr::new(IpAddr::V6(v4.ip().to_ipv6_mapped()), v4.port()),
            other => other,
        }
    }

    fn connect(&mut self, host: &str, port: u16) -> bool {
        let target = match (host, port).to_socket_addrs() {
            Ok(mut targets) => targets.next(),
            Err(err) => return self.fail(err.to_string()),
        };
        let Some(target) = target else {
            return self.fail("Host not found");
        };
        if !self.ensure_bound(target) {
            return false;
        }
        let target = self.routable(target);
        let connected = match &self.socket {
            Some(socket) => socket.connect(target),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "The socket is not bound")),
        };
        match connected {
            Ok(()) => {
                debug!(%target, "UDP socket connected");
                self.peer = Some(target);
                true
            }
            Err(err) => self.fail(err.to_string()),
        }
    }

    fn pending_size(&self) -> i64 {
        let Some(socket) = &self.socket else {
            return -1;
        };
        let mut scratch = vec![0u8; MAX_DATAGRAM];
        socket.peek(&mut scratch).map_or(-1, |len| len as i64)
    }

    /// `None` when nothing is queued or the read failed.
    fn recv(&mut self, buf: &mut [u8]) -> Option<(usize, SocketAddr)> {
        let received = match &self.socket {
            Some(socket) => socket.recv_from(buf),
            None => {
                self.fail("The socket is not bound");
                return None;
            }
        };
        match received {
            Ok((len, from)) => Some((len, canonical(from))),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                self.fail("No datagram available");
                None
            }
            Err(err) => {
                self.fail(err.to_string());
                None
            }
        }
    }

    /// Sends to `target`, or to the connected peer when `target` is `None`.
    fn send(&mut self, data: &[u8], target: Option<SocketAddr>, hop_limit: i32) -> i64 {
        let Some(target) = target.or(self.peer) else {
            self.fail("The datagram has no destination");
            return -1;
        };
        if !self.ensure_bound(target) {
            return -1;
        }
        let target = self.routable(target);
        let Some(socket) = &self.socket else {
            return -1;
        };

        let restore_ttl = if hop_limit >= 0 && target.is_ipv4() {
            let previous = socket.ttl().ok();
            if let Err(err) = socket.set_ttl(hop_limit as u32) {
                warn!(error = %err, hop_limit, "Could not apply hop limit");
            }
            previous
        } else {
            None
        };

        let sent = socket.send_to(data, target);

        if let Some(ttl) = restore_ttl {
            // Best effort; the next datagram with a hop limit sets it again.
            let _ = socket.set_ttl(ttl);
        }

        match sent {
            Ok(len) => len as i64,
            Err(err) => {
                self.fail(err.to_string());
                -1
            }
        }
    }

    fn local(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|socket| socket.local_addr().ok())
    }

    fn multicast(&mut self, group: &HostAddressData, join: bool) -> bool {
        let Some(group) = group.ip() else {
            return self.fail("Invalid multicast group");
        };
        let changed = match (&self.socket, group) {
            (None, _) => Err(io::Error::new(io::ErrorKind::NotConnected, "The socket is not bound")),
            (Some(socket), IpAddr::V4(group)) if join => socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED),
            (Some(socket), IpAddr::V4(group)) => socket.leave_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED),
            (Some(socket), IpAddr::V6(group)) if join => socket.join_multicast_v6(&group, 0),
            (Some(socket), IpAddr::V6(group)) => socket.leave_multicast_v6(&group, 0),
        };
        match changed {
            Ok(()) => true,
            Err(err) => self.fail(err.to_string()),
        }
    }
}

fn socket_addr(address: &HostAddressData, port: u16) -> Option<SocketAddr> {
    address.ip().map(|ip| SocketAddr::new(ip, port))
}

#[no_mangle]
pub extern "C" fn netbridge_udpsocket_new() -> *mut NativeUdpSocket {
    Box::into_raw(Box::new(NativeUdpSocket::new()))
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_udpsocket_delete(socket: *mut NativeUdpSocket) {
    if !socket.is_null() {
        drop(Box::from_raw(socket));
    }
}

/// A null or any address binds every interface; port `0` picks a free one.
#[no_mangle]
pub unsafe extern "C" fn netbridge_udpsocket_bind(
    socket: *mut NativeUdpSocket,
    address: *const NativeHostAddress,
    port: u16,
) -> bool {
    (*socket).bind(&*address, port)
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_udpsocket_connect_to_host(
    socket: *mut NativeUdpSocket,
    host: ByteView,
    port: u16,
) -> bool {
    let host = String::from_utf8_lossy(host.as_slice()).into_owned();
    (*socket).connect(&host, port)
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_udpsocket_is_bound(socket: *const NativeUdpSocket) -> bool {
    (*socket).socket.is_some()
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_udpsocket_socket_descriptor(
    socket: *const NativeUdpSocket,
) -> NativeSocketDescriptor {
    (*socket)
        .socket
        .as_ref()
        .map_or(NativeSocketDescriptor::INVALID, |s| NativeSocketDescriptor::of(s.as_raw_fd()))
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_udpsocket_local_address(
    socket: *const NativeUdpSocket,
    out: *mut NativeHostAddress,
) {
    write_address(out, address_of((*socket).local()));
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_udpsocket_local_port(socket: *const NativeUdpSocket) -> u16 {
    (*socket).local().map_or(0, |addr| addr.port())
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_udpsocket_peer_address(
    socket: *const NativeUdpSocket,
    out: *mut NativeHostAddress,
) {
    write_address(out, address_of((*socket).peer.map(canonical)));
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_udpsocket_peer_port(socket: *const NativeUdpSocket) -> u16 {
    (*socket).peer.map_or(0, |addr| addr.port())
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_udpsocket_has_pending_datagrams(socket: *const NativeUdpSocket) -> bool {
    (*socket)
        .socket
        .as_ref()
        .is_some_and(|s| wait_readable(s, 0).unwrap_or(false))
}

/// Size of the next datagram, `-1` when none is queued.
#[no_mangle]
pub unsafe extern "C" fn netbridge_udpsocket_pending_datagram_size(socket: *const NativeUdpSocket) -> i64 {
    (*socket).pending_size()
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_udpsocket_wait_for_ready_read(socket: *mut NativeUdpSocket, msecs: i32) -> bool {
    let socket = &mut *socket;
    let Some(udp) = &socket.socket else {
        return socket.fail("The socket is not bound");
    };
    match wait_readable(udp, msecs) {
        Ok(true) => true,
        Ok(false) => socket.fail("Socket operation timed out"),
        Err(err) => socket.fail(err.to_string()),
    }
}

/// Reads one datagram, truncated to `max_size`. `address` and `port` are
/// optional; when given they are always written.
#[no_mangle]
pub unsafe extern "C" fn netbridge_udpsocket_read_datagram(
    socket: *mut NativeUdpSocket,
    data: *mut u8,
    max_size: usize,
    address: *mut NativeHostAddress,
    port: *mut u16,
) -> i64 {
    let socket = &mut *socket;
    let mut empty = [0u8; 0];
    let buf = if data.is_null() {
        &mut empty[..]
    } else {
        std::slice::from_raw_parts_mut(data, max_size)
    };
    let received = socket.recv(buf);

    if !address.is_null() {
        write_address(address, address_of(received.map(|(_, from)| from)));
    }
    if !port.is_null() {
        *port = received.map_or(0, |(_, from)| from.port());
    }
    received.map_or(-1, |(len, _)| len as i64)
}

/// Always writes `out`; a failed read yields a null datagram. A negative
/// `max_size` reads the whole datagram.
#[no_mangle]
pub unsafe extern "C" fn netbridge_udpsocket_receive_datagram(
    socket: *mut NativeUdpSocket,
    max_size: i64,
    out: *mut NativeNetworkDatagram,
) {
    let socket = &mut *socket;
    let capacity = usize::try_from(max_size).map_or(MAX_DATAGRAM, |max| max.min(MAX_DATAGRAM));
    let mut buf = vec![0u8; capacity];

    let datagram = match socket.recv(&mut buf) {
        Some((len, from)) => {
            buf.truncate(len.min(capacity));
            let local = socket.local();
            NetworkDatagramData {
                data: buf,
                sender: HostAddressData::from_ip(from.ip()),
                sender_port: i32::from(from.port()),
                destination: address_of(local.map(canonical)),
                destination_port: local.map_or(-1, |addr| i32::from(addr.port())),
                ..NetworkDatagramData::default()
            }
        }
        None => NetworkDatagramData::default(),
    };
    write_datagram(out, datagram);
}

/// A null `address` sends to the connected peer.
#[no_mangle]
pub unsafe extern "C" fn netbridge_udpsocket_write_datagram(
    socket: *mut NativeUdpSocket,
    data: ByteView,
    address: *const NativeHostAddress,
    port: u16,
) -> i64 {
    let socket = &mut *socket;
    let target = if address.is_null() {
        None
    } else {
        match socket_addr(&*address, port) {
            Some(target) => Some(target),
            None => {
                socket.fail("Invalid destination address");
                return -1;
            }
        }
    };
    socket.send(data.as_slice(), target, -1)
}

/// Sends to the datagram's destination, or to the connected peer when it
/// has none. The datagram's hop limit applies to this send only.
#[no_mangle]
pub unsafe extern "C" fn netbridge_udpsocket_send_datagram(
    socket: *mut NativeUdpSocket,
    datagram: *const NativeNetworkDatagram,
) -> i64 {
    let (socket, datagram) = (&mut *socket, &*datagram);
    let target = u16::try_from(datagram.destination_port)
        .ok()
        .and_then(|port| socket_addr(&datagram.destination, port));
    socket.send(&datagram.data, target, datagram.hop_limit)
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_udpsocket_join_multicast_group(
    socket: *mut NativeUdpSocket,
    group: *const NativeHostAddress,
) -> bool {
    (*socket).multicast(&*group, true)
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_udpsocket_leave_multicast_group(
    socket: *mut NativeUdpSocket,
    group: *const NativeHostAddress,
) -> bool {
    (*socket).multicast(&*group, false)
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_udpsocket_close(socket: *mut NativeUdpSocket) {
    let socket = &mut *socket;
    socket.socket = None;
    socket.peer = None;
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_udpsocket_error_string(
    socket: *const NativeUdpSocket,
    out: *mut NativeByteArray,
) {
    write_bytes(out, (*socket).error.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Shared;
    use std::mem::MaybeUninit;

    fn bound_localhost() -> NativeUdpSocket {
        let mut socket = NativeUdpSocket::new();
        assert!(socket.bind(&HostAddressData::parse("127.0.0.1"), 0));
        socket
    }

    #[test]
    fn test_datagram_round_trip() {
        unsafe {
            let mut a = bound_localhost();
            let mut b = bound_localhost();
            let b_port = netbridge_udpsocket_local_port(&b);

            let request = Shared::new(NetworkDatagramData {
                destination: HostAddressData::parse("127.0.0.1"),
                destination_port: i32::from(b_port),
                hop_limit: 4,
                ..NetworkDatagramData::new(b"hello")
            });
            assert_eq!(netbridge_udpsocket_send_datagram(&mut a, &request), 5);

            assert!(netbridge_udpsocket_wait_for_ready_read(&mut b, 1_000));
            assert!(netbridge_udpsocket_has_pending_datagrams(&b));
            assert_eq!(netbridge_udpsocket_pending_datagram_size(&b), 5);

            let mut slot = MaybeUninit::<NativeNetworkDatagram>::uninit();
            netbridge_udpsocket_receive_datagram(&mut b, -1, slot.as_mut_ptr());
            let received = slot.assume_init();
            assert_eq!(received.data, b"hello");
            assert_eq!(received.sender_port, i32::from(netbridge_udpsocket_local_port(&a)));
            assert_eq!(received.destination_port, i32::from(b_port));

            let reply = Shared::new(received.make_reply(b"hi"));
            assert_eq!(netbridge_udpsocket_send_datagram(&mut b, &reply), 2);
            assert!(netbridge_udpsocket_wait_for_ready_read(&mut a, 1_000));

            let mut buf = [0u8; 1];
            let mut port = 0u16;
            let read = netbridge_udpsocket_read_datagram(&mut a, buf.as_mut_ptr(), 1, std::ptr::null_mut(), &mut port);
            assert_eq!(read, 1);
            assert_eq!(&buf, b"h");
            assert_eq!(port, b_port);

            // The truncated tail is discarded with the datagram.
            assert_eq!(netbridge_udpsocket_pending_datagram_size(&a), -1);
        }
    }

    #[test]
    fn test_read_without_datagram_fails() {
        unsafe {
            let mut socket = bound_localhost();
            let mut buf = [0u8; 8];
            let read = netbridge_udpsocket_read_datagram(
                &mut socket,
                buf.as_mut_ptr(),
                buf.len(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            );
            assert_eq!(read, -1);
            assert_eq!(socket.error, "No datagram available");
            assert!(!netbridge_udpsocket_wait_for_ready_read(&mut socket, 10));
        }
    }

    #[test]
    fn test_send_needs_destination() {
        let mut socket = NativeUdpSocket::new();
        assert_eq!(socket.send(b"x", None, -1), -1);
        assert_eq!(socket.error, "The datagram has no destination");
        assert!(socket.socket.is_none());
    }

    #[test]
    fn test_connected_socket_sends_to_peer() {
        let mut receiver = bound_localhost();
        let port = receiver.local().map(|addr| addr.port()).unwrap();

        let mut sender = NativeUdpSocket::new();
        assert!(sender.connect("127.0.0.1", port));
        assert_eq!(sender.send(b"ping", None, -1), 4);

        let udp = receiver.socket.as_ref().unwrap();
        assert!(wait_readable(udp, 1_000).unwrap());
        let (len, from) = receiver.recv(&mut [0u8; 16]).unwrap();
        assert_eq!(len, 4);
        assert_eq!(from, sender.local().unwrap());
    }
}
