//! UDP sockets.
//!
//! Reads never block; use [`UdpSocket::wait_for_ready_read`] first.

use std::io;
use std::time::Duration;

use bridge_traits::ffi::ByteView;
use tracing::debug;

use super::datagram::NetworkDatagram;
use super::hostaddress::HostAddress;
use super::socket::{timeout_msecs, SocketDescriptor};
use crate::bytearray::{string_from, ByteArray};
use crate::util::{construct, owned_object};

owned_object! {
    /// Connectionless socket. Unbound until [`bind`](UdpSocket::bind); the
    /// first send binds it to an ephemeral port.
    pub struct UdpSocket(RawUdpSocket) {
        delete: netbridge_udpsocket_delete,
    }
}

extern "C" {
    fn netbridge_udpsocket_new() -> *mut RawUdpSocket;
    fn netbridge_udpsocket_bind(socket: *mut RawUdpSocket, address: *const HostAddress, port: u16) -> bool;
    fn netbridge_udpsocket_connect_to_host(socket: *mut RawUdpSocket, host: ByteView, port: u16) -> bool;
    fn netbridge_udpsocket_is_bound(socket: *const RawUdpSocket) -> bool;
    fn netbridge_udpsocket_socket_descriptor(socket: *const RawUdpSocket) -> SocketDescriptor;
    fn netbridge_udpsocket_local_address(socket: *const RawUdpSocket, out: *mut HostAddress);
    fn netbridge_udpsocket_local_port(socket: *const RawUdpSocket) -> u16;
    fn netbridge_udpsocket_peer_address(socket: *const RawUdpSocket, out: *mut HostAddress);
    fn netbridge_udpsocket_peer_port(socket: *const RawUdpSocket) -> u16;
    fn netbridge_udpsocket_has_pending_datagrams(socket: *const RawUdpSocket) -> bool;
    fn netbridge_udpsocket_pending_datagram_size(socket: *const RawUdpSocket) -> i64;
    fn netbridge_udpsocket_wait_for_ready_read(socket: *mut RawUdpSocket, msecs: i32) -> bool;
    fn netbridge_udpsocket_read_datagram(
        socket: *mut RawUdpSocket,
        data: *mut u8,
        max_size: usize,
        address: *mut HostAddress,
        port: *mut u16,
    ) -> i64;
    fn netbridge_udpsocket_receive_datagram(socket: *mut RawUdpSocket, max_size: i64, out: *mut NetworkDatagram);
    fn netbridge_udpsocket_write_datagram(
        socket: *mut RawUdpSocket,
        data: ByteView,
        address: *const HostAddress,
        port: u16,
    ) -> i64;
    fn netbridge_udpsocket_send_datagram(socket: *mut RawUdpSocket, datagram: *const NetworkDatagram) -> i64;
    fn netbridge_udpsocket_join_multicast_group(socket: *mut RawUdpSocket, group: *const HostAddress) -> bool;
    fn netbridge_udpsocket_leave_multicast_group(socket: *mut RawUdpSocket, group: *const HostAddress) -> bool;
    fn netbridge_udpsocket_close(socket: *mut RawUdpSocket);
    fn netbridge_udpsocket_error_string(socket: *const RawUdpSocket, out: *mut ByteArray);
}

impl UdpSocket {
    pub fn new() -> Self {
        let raw = unsafe { netbridge_udpsocket_new() };
        Self {
            raw: std::ptr::NonNull::new(raw).unwrap_or_else(|| std::process::abort()),
        }
    }

    /// A null or any address binds every interface. Port `0` picks a free port.
    pub fn bind(&mut self, address: &HostAddress, port: u16) -> io::Result<()> {
        if unsafe { netbridge_udpsocket_bind(self.as_mut_ptr(), address, port) } {
            Ok(())
        } else {
            Err(self.last_error())
        }
    }

    /// Fixes the default destination and filters incoming datagrams to it.
    pub fn connect_to_host(&mut self, host: &str, port: u16) -> io::Result<()> {
        let host = ByteView::from_slice(host.as_bytes());
        if unsafe { netbridge_udpsocket_connect_to_host(self.as_mut_ptr(), host, port) } {
            Ok(())
        } else {
            Err(self.last_error())
        }
    }

    pub fn is_bound(&self) -> bool {
        unsafe { netbridge_udpsocket_is_bound(self.as_ptr()) }
    }

    pub fn socket_descriptor(&self) -> SocketDescriptor {
        unsafe { netbridge_udpsocket_socket_descriptor(self.as_ptr()) }
    }

    pub fn local_address(&self) -> HostAddress {
        unsafe { construct(|out| netbridge_udpsocket_local_address(self.as_ptr(), out)) }
    }

    pub fn local_port(&self) -> u16 {
        unsafe { netbridge_udpsocket_local_port(self.as_ptr()) }
    }

    pub fn peer_address(&self) -> HostAddress {
        unsafe { construct(|out| netbridge_udpsocket_peer_address(self.as_ptr(), out)) }
    }

    pub fn peer_port(&self) -> u16 {
        unsafe { netbridge_udpsocket_peer_port(self.as_ptr()) }
    }

    pub fn has_pending_datagrams(&self) -> bool {
        unsafe { netbridge_udpsocket_has_pending_datagrams(self.as_ptr()) }
    }

    pub fn pending_datagram_size(&self) -> Option<usize> {
        usize::try_from(unsafe { netbridge_udpsocket_pending_datagram_size(self.as_ptr()) }).ok()
    }

    pub fn wait_for_ready_read(&mut self, timeout: Option<Duration>) -> bool {
        unsafe { netbridge_udpsocket_wait_for_ready_read(self.as_mut_ptr(), timeout_msecs(timeout)) }
    }

    /// Reads one datagram into `buf`, dropping whatever does not fit.
    pub fn read_datagram(&mut self, buf: &mut [u8]) -> io::Result<(usize, HostAddress, u16)> {
        let mut address = std::mem::MaybeUninit::<HostAddress>::uninit();
        let mut port = 0u16;
        let count = unsafe {
            netbridge_udpsocket_read_datagram(
                self.as_mut_ptr(),
                buf.as_mut_ptr(),
                buf.len(),
                address.as_mut_ptr(),
                &mut port,
            )
        };
        let address = unsafe { address.assume_init() };
        match usize::try_from(count) {
            Ok(count) => Ok((count, address, port)),
            Err(_) => Err(self.last_error()),
        }
    }

    /// Receives the next datagram with its addressing. `None` reads it whole.
    pub fn receive_datagram(&mut self, max_size: Option<usize>) -> io::Result<NetworkDatagram> {
        let max_size = max_size.map_or(-1, |max| i64::try_from(max).unwrap_or(i64::MAX));
        let datagram = unsafe { construct(|out| netbridge_udpsocket_receive_datagram(self.as_mut_ptr(), max_size, out)) };
        if datagram.is_null() {
            return Err(self.last_error());
        }
        Ok(datagram)
    }

    pub fn write_datagram(&mut self, data: &[u8], address: &HostAddress, port: u16) -> io::Result<usize> {
        let count = unsafe {
            netbridge_udpsocket_write_datagram(self.as_mut_ptr(), ByteView::from_slice(data), address, port)
        };
        usize::try_from(count).map_err(|_| self.last_error())
    }

    /// Sends to the connected peer.
    pub fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let count = unsafe {
            netbridge_udpsocket_write_datagram(self.as_mut_ptr(), ByteView::from_slice(data), std::ptr::null(), 0)
        };
        usize::try_from(count).map_err(|_| self.last_error())
    }

    /// Sends to the datagram's destination, falling back to the connected
    /// peer.
    pub fn send_datagram(&mut self, datagram: &NetworkDatagram) -> io::Result<usize> {
        let count = unsafe { netbridge_udpsocket_send_datagram(self.as_mut_ptr(), datagram) };
        usize::try_from(count).map_err(|_| self.last_error())
    }

    pub fn join_multicast_group(&mut self, group: &HostAddress) -> io::Result<()> {
        if unsafe { netbridge_udpsocket_join_multicast_group(self.as_mut_ptr(), group) } {
            Ok(())
        } else {
            Err(self.last_error())
        }
    }

    pub fn leave_multicast_group(&mut self, group: &HostAddress) -> io::Result<()> {
        if unsafe { netbridge_udpsocket_leave_multicast_group(self.as_mut_ptr(), group) } {
            Ok(())
        } else {
            Err(self.last_error())
        }
    }

    pub fn close(&mut self) {
        debug!(local_port = self.local_port(), "Closing UDP socket");
        unsafe { netbridge_udpsocket_close(self.as_mut_ptr()) }
    }

    pub fn error_string(&self) -> String {
        unsafe { string_from(|out| netbridge_udpsocket_error_string(self.as_ptr(), out)) }
    }

    fn last_error(&self) -> io::Error {
        io::Error::other(self.error_string())
    }
}

impl Default for UdpSocket {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbound_socket() {
        let mut socket = UdpSocket::new();
        assert!(!socket.is_bound());
        assert!(!socket.socket_descriptor().is_valid());
        assert_eq!(socket.local_port(), 0);
        assert!(!socket.has_pending_datagrams());
        assert_eq!(socket.pending_datagram_size(), None);

        let mut buf = [0u8; 8];
        let err = socket.read_datagram(&mut buf).unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn test_write_without_peer_fails() {
        let mut socket = UdpSocket::new();
        assert!(socket.write(b"nowhere").is_err());
        assert!(socket.send_datagram(&NetworkDatagram::new(b"nowhere")).is_err());
    }
}
