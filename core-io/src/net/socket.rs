//! Blocking TCP server and client sockets.
//!
//! Timeouts are `Option<Duration>`; `None` waits forever.

use std::io::{self, Read, Write};
use std::os::fd::RawFd;
use std::time::Duration;

use bridge_traits::abi::Relocatable;
use bridge_traits::ffi::ByteView;
use bridge_traits::{assert_abi_contract, assert_same_layout};
use tracing::debug;

use super::hostaddress::HostAddress;
use crate::bytearray::{string_from, ByteArray};
use crate::util::{construct, owned_object};

/// Platform socket handle.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketDescriptor {
    fd: isize,
}

unsafe impl Relocatable for SocketDescriptor {}

assert_abi_contract!(Trivial, SocketDescriptor, { fd: isize });
assert_same_layout!(SocketDescriptor, bridge_native::NativeSocketDescriptor);

impl SocketDescriptor {
    pub const INVALID: Self = Self { fd: -1 };

    pub fn from_raw_fd(fd: RawFd) -> Self {
        Self { fd: fd as isize }
    }

    pub fn is_valid(&self) -> bool {
        self.fd >= 0
    }

    pub fn as_raw_fd(&self) -> Option<RawFd> {
        self.is_valid().then_some(self.fd as RawFd)
    }
}

impl Default for SocketDescriptor {
    fn default() -> Self {
        Self::INVALID
    }
}

owned_object! {
    /// Listening socket that queues accepted connections.
    pub struct TcpServer(RawTcpServer) {
        delete: netbridge_tcpserver_delete,
    }
}

owned_object! {
    /// Connected (or connecting) TCP stream.
    pub struct TcpSocket(RawTcpSocket) {
        delete: netbridge_tcpsocket_delete,
    }
}

extern "C" {
    fn netbridge_tcpserver_new() -> *mut RawTcpServer;
    fn netbridge_tcpserver_listen(server: *mut RawTcpServer, address: *const HostAddress, port: u16) -> bool;
    fn netbridge_tcpserver_is_listening(server: *const RawTcpServer) -> bool;
    fn netbridge_tcpserver_close(server: *mut RawTcpServer);
    fn netbridge_tcpserver_server_address(server: *const RawTcpServer, out: *mut HostAddress);
    fn netbridge_tcpserver_server_port(server: *const RawTcpServer) -> u16;
    fn netbridge_tcpserver_socket_descriptor(server: *const RawTcpServer) -> SocketDescriptor;
    fn netbridge_tcpserver_wait_for_new_connection(
        server: *mut RawTcpServer,
        msecs: i32,
        timed_out: *mut bool,
    ) -> bool;
    fn netbridge_tcpserver_has_pending_connections(server: *mut RawTcpServer) -> bool;
    fn netbridge_tcpserver_set_max_pending_connections(server: *mut RawTcpServer, max: i32);
    fn netbridge_tcpserver_max_pending_connections(server: *const RawTcpServer) -> i32;
    fn netbridge_tcpserver_next_pending_connection(server: *mut RawTcpServer) -> *mut RawTcpSocket;
    fn netbridge_tcpserver_error_string(server: *const RawTcpServer, out: *mut ByteArray);

    fn netbridge_tcpsocket_new() -> *mut RawTcpSocket;
    fn netbridge_tcpsocket_connect_to_host(socket: *mut RawTcpSocket, host: ByteView, port: u16) -> bool;
    fn netbridge_tcpsocket_wait_for_connected(socket: *mut RawTcpSocket, msecs: i32) -> bool;
    fn netbridge_tcpsocket_wait_for_ready_read(socket: *mut RawTcpSocket, msecs: i32) -> bool;
    fn netbridge_tcpsocket_is_connected(socket: *const RawTcpSocket) -> bool;
    fn netbridge_tcpsocket_socket_descriptor(socket: *const RawTcpSocket) -> SocketDescriptor;
    fn netbridge_tcpsocket_set_socket_descriptor(socket: *mut RawTcpSocket, descriptor: SocketDescriptor) -> bool;
    fn netbridge_tcpsocket_local_address(socket: *const RawTcpSocket, out: *mut HostAddress);
    fn netbridge_tcpsocket_local_port(socket: *const RawTcpSocket) -> u16;
    fn netbridge_tcpsocket_peer_address(socket: *const RawTcpSocket, out: *mut HostAddress);
    fn netbridge_tcpsocket_peer_port(socket: *const RawTcpSocket) -> u16;
    fn netbridge_tcpsocket_read(socket: *mut RawTcpSocket, data: *mut u8, max_size: usize) -> i64;
    fn netbridge_tcpsocket_write(socket: *mut RawTcpSocket, data: ByteView) -> i64;
    fn netbridge_tcpsocket_close(socket: *mut RawTcpSocket);
    fn netbridge_tcpsocket_error_string(socket: *const RawTcpSocket, out: *mut ByteArray);
}

/// `-1` for forever, otherwise whole milliseconds saturated to `i32`.
pub(super) fn timeout_msecs(timeout: Option<Duration>) -> i32 {
    match timeout {
        Some(timeout) => i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX),
        None => -1,
    }
}

impl TcpServer {
    pub fn new() -> Self {
        let raw = unsafe { netbridge_tcpserver_new() };
        Self {
            raw: std::ptr::NonNull::new(raw).unwrap_or_else(|| std::process::abort()),
        }
    }

    /// Binds and listens; a null or any address listens on every interface.
    /// Port `0` picks a free port.
    pub fn listen(&mut self, address: &HostAddress, port: u16) -> bool {
        unsafe { netbridge_tcpserver_listen(self.as_mut_ptr(), address, port) }
    }

    pub fn is_listening(&self) -> bool {
        unsafe { netbridge_tcpserver_is_listening(self.as_ptr()) }
    }

    /// Stops listening and drops connections that were never picked up.
    pub fn close(&mut self) {
        unsafe { netbridge_tcpserver_close(self.as_mut_ptr()) }
    }

    pub fn server_address(&self) -> HostAddress {
        unsafe { construct(|out| netbridge_tcpserver_server_address(self.as_ptr(), out)) }
    }

    pub fn server_port(&self) -> u16 {
        unsafe { netbridge_tcpserver_server_port(self.as_ptr()) }
    }

    pub fn socket_descriptor(&self) -> SocketDescriptor {
        unsafe { netbridge_tcpserver_socket_descriptor(self.as_ptr()) }
    }

    /// `Ok(true)` once a connection is pending, `Ok(false)` on timeout.
    pub fn wait_for_new_connection(&mut self, timeout: Option<Duration>) -> io::Result<bool> {
        let mut timed_out = false;
        let ready = unsafe {
            netbridge_tcpserver_wait_for_new_connection(self.as_mut_ptr(), timeout_msecs(timeout), &mut timed_out)
        };
        if ready || timed_out {
            return Ok(ready);
        }
        Err(io::Error::other(self.error_string()))
    }

    /// Accepted connections held before callers pick them up; 30 by default.
    /// Further clients wait in the kernel's listen backlog.
    pub fn set_max_pending_connections(&mut self, max: i32) {
        unsafe { netbridge_tcpserver_set_max_pending_connections(self.as_mut_ptr(), max) }
    }

    pub fn max_pending_connections(&self) -> i32 {
        unsafe { netbridge_tcpserver_max_pending_connections(self.as_ptr()) }
    }

    pub fn has_pending_connections(&mut self) -> bool {
        unsafe { netbridge_tcpserver_has_pending_connections(self.as_mut_ptr()) }
    }

    pub fn next_pending_connection(&mut self) -> Option<TcpSocket> {
        let raw = unsafe { netbridge_tcpserver_next_pending_connection(self.as_mut_ptr()) };
        TcpSocket::from_raw(raw)
    }

    pub fn error_string(&self) -> String {
        unsafe { string_from(|out| netbridge_tcpserver_error_string(self.as_ptr(), out)) }
    }
}

impl Default for TcpServer {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpSocket {
    pub fn new() -> Self {
        let raw = unsafe { netbridge_tcpsocket_new() };
        Self {
            raw: std::ptr::NonNull::new(raw).unwrap_or_else(|| std::process::abort()),
        }
    }

    /// Resolves `host`; the connection is made by
    /// [`wait_for_connected`](Self::wait_for_connected).
    pub fn connect_to_host(&mut self, host: &str, port: u16) -> bool {
        unsafe { netbridge_tcpsocket_connect_to_host(self.as_mut_ptr(), ByteView::from_slice(host.as_bytes()), port) }
    }

    pub fn wait_for_connected(&mut self, timeout: Option<Duration>) -> bool {
        unsafe { netbridge_tcpsocket_wait_for_connected(self.as_mut_ptr(), timeout_msecs(timeout)) }
    }

    pub fn wait_for_ready_read(&mut self, timeout: Option<Duration>) -> bool {
        unsafe { netbridge_tcpsocket_wait_for_ready_read(self.as_mut_ptr(), timeout_msecs(timeout)) }
    }

    pub fn is_connected(&self) -> bool {
        unsafe { netbridge_tcpsocket_is_connected(self.as_ptr()) }
    }

    pub fn socket_descriptor(&self) -> SocketDescriptor {
        unsafe { netbridge_tcpsocket_socket_descriptor(self.as_ptr()) }
    }

    /// Adopts a connected descriptor.
    ///
    /// # Safety
    ///
    /// `descriptor` must be an open TCP socket nothing else owns; the
    /// socket closes it on drop.
    pub unsafe fn set_socket_descriptor(&mut self, descriptor: SocketDescriptor) -> bool {
        netbridge_tcpsocket_set_socket_descriptor(self.as_mut_ptr(), descriptor)
    }

    pub fn local_address(&self) -> HostAddress {
        unsafe { construct(|out| netbridge_tcpsocket_local_address(self.as_ptr(), out)) }
    }

    pub fn local_port(&self) -> u16 {
        unsafe { netbridge_tcpsocket_local_port(self.as_ptr()) }
    }

    pub fn peer_address(&self) -> HostAddress {
        unsafe { construct(|out| netbridge_tcpsocket_peer_address(self.as_ptr(), out)) }
    }

    pub fn peer_port(&self) -> u16 {
        unsafe { netbridge_tcpsocket_peer_port(self.as_ptr()) }
    }

    pub fn close(&mut self) {
        debug!(peer_port = self.peer_port(), "Closing TCP socket");
        unsafe { netbridge_tcpsocket_close(self.as_mut_ptr()) }
    }

    pub fn error_string(&self) -> String {
        unsafe { string_from(|out| netbridge_tcpsocket_error_string(self.as_ptr(), out)) }
    }

    fn last_error(&self) -> io::Error {
        io::Error::other(self.error_string())
    }
}

impl Default for TcpSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for TcpSocket {
    /// Blocks until data arrives; `Ok(0)` once the peer has closed.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = unsafe { netbridge_tcpsocket_read(self.as_mut_ptr(), buf.as_mut_ptr(), buf.len()) };
        usize::try_from(count).map_err(|_| self.last_error())
    }
}

impl Write for TcpSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let count = unsafe { netbridge_tcpsocket_write(self.as_mut_ptr(), ByteView::from_slice(buf)) };
        usize::try_from(count).map_err(|_| self.last_error())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::ffi::SpecialAddress;

    #[test]
    fn test_descriptor_validity() {
        assert!(!SocketDescriptor::default().is_valid());
        assert_eq!(SocketDescriptor::from_raw_fd(3).as_raw_fd(), Some(3));
    }

    #[test]
    fn test_wait_times_out_without_clients() {
        let mut server = TcpServer::new();
        assert!(server.listen(&HostAddress::from_special(SpecialAddress::LocalHost), 0));
        assert!(server.socket_descriptor().is_valid());
        assert!(matches!(
            server.wait_for_new_connection(Some(Duration::from_millis(10))),
            Ok(false)
        ));
        assert!(server.next_pending_connection().is_none());
    }

    #[test]
    fn test_unconnected_socket_reports_error() {
        let mut socket = TcpSocket::new();
        assert!(!socket.is_connected());
        let mut buf = [0u8; 4];
        let err = socket.read(&mut buf).unwrap_err();
        assert_eq!(err.to_string(), "The socket is not connected");
    }
}
