//! Blocking TCP server and socket.
//!
//! Waits are bounded with `poll(2)`; a negative timeout waits forever.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::os::fd::{AsFd, AsRawFd, FromRawFd, RawFd};
use std::time::Duration;

use bridge_traits::abi::Relocatable;
use bridge_traits::assert_abi_contract;
use bridge_traits::ffi::ByteView;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{debug, warn};

use crate::bytearray::{write_bytes, NativeByteArray};
use crate::hostaddress::{write_address, Addr, HostAddressData, NativeHostAddress};

/// Platform socket handle; `-1` when there is none.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeSocketDescriptor {
    pub fd: isize,
}

unsafe impl Relocatable for NativeSocketDescriptor {}

assert_abi_contract!(Trivial, NativeSocketDescriptor, { fd: isize });

impl NativeSocketDescriptor {
    pub(crate) const INVALID: Self = Self { fd: -1 };

    pub(crate) fn of(fd: RawFd) -> Self {
        Self { fd: fd as isize }
    }
}

/// Waits until `fd` is readable. `Ok(false)` on timeout.
pub(crate) fn wait_readable(fd: &impl AsFd, msecs: i32) -> io::Result<bool> {
    let timeout = if msecs < 0 {
        PollTimeout::NONE
    } else {
        PollTimeout::try_from(msecs).unwrap_or(PollTimeout::MAX)
    };
    let mut fds = [PollFd::new(fd.as_fd(), PollFlags::POLLIN)];
    let ready = poll(&mut fds, timeout).map_err(io::Error::from)?;
    Ok(ready > 0)
}

pub(crate) fn address_of(addr: Option<SocketAddr>) -> HostAddressData {
    addr.map(|addr| HostAddressData::from_ip(addr.ip()))
        .unwrap_or_default()
}

pub const DEFAULT_MAX_PENDING_CONNECTIONS: i32 = 30;

pub struct NativeTcpServer {
    listener: Option<TcpListener>,
    pending: VecDeque<TcpStream>,
    max_pending: i32,
    error: String,
}

impl Default for NativeTcpServer {
    fn default() -> Self {
        Self {
            listener: None,
            pending: VecDeque::new(),
            max_pending: DEFAULT_MAX_PENDING_CONNECTIONS,
            error: String::new(),
        }
    }
}

impl NativeTcpServer {
    fn fail(&mut self, message: impl Into<String>) -> bool {
        self.error = message.into();
        warn!(error = %self.error, "TCP server error");
        false
    }

    fn listen(&mut self, address: &HostAddressData, port: u16) -> bool {
        if self.listener.is_some() {
            return self.fail("The server is already listening");
        }
        let ip = match address.addr {
            Addr::Null | Addr::Any => "::".parse().ok(),
            _ => address.ip(),
        };
        let Some(ip) = ip else {
            return self.fail("Invalid address");
        };
        let bound = TcpListener::bind(SocketAddr::new(ip, port)).and_then(|listener| {
            listener.set_nonblocking(true)?;
            Ok(listener)
        });
        match bound {
            Ok(listener) => {
                debug!(addr = ?listener.local_addr().ok(), "TCP server listening");
                self.listener = Some(listener);
                true
            }
            Err(err) => self.fail(err.to_string()),
        }
    }

    /// Moves connections the kernel has queued into `pending`, up to the
    /// pending limit. The rest stay in the listen backlog.
    fn accept_ready(&mut self) -> io::Result<()> {
        let Some(listener) = &self.listener else {
            return Ok(());
        };
        let limit = usize::try_from(self.max_pending).unwrap_or(0);
        while self.pending.len() < limit {
            match listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(false)?;
                    debug!(%peer, "Accepted connection");
                    self.pending.push_back(stream);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(err) => return Err(err),
            }
        }
        debug!(limit, "Pending connection limit reached");
        Ok(())
    }

    fn wait_for_new_connection(&mut self, msecs: i32, timed_out: &mut bool) -> bool {
        *timed_out = false;
        if let Err(err) = self.accept_ready() {
            return self.fail(err.to_string());
        }
        if !self.pending.is_empty() {
            return true;
        }
        let Some(listener) = &self.listener else {
            return self.fail("The server is not listening");
        };
        if self.pending.len() >= usize::try_from(self.max_pending).unwrap_or(0) {
            return self.fail("Too many pending connections");
        }
        match wait_readable(listener, msecs) {
            Ok(true) => match self.accept_ready() {
                Ok(()) => !self.pending.is_empty(),
                Err(err) => self.fail(err.to_string()),
            },
            Ok(false) => {
                *timed_out = true;
                false
            }
            Err(err) => self.fail(err.to_string()),
        }
    }
}

pub struct NativeTcpSocket {
    stream: Option<TcpStream>,
    targets: Vec<SocketAddr>,
    error: String,
}

impl NativeTcpSocket {
    fn new(stream: Option<TcpStream>) -> Self {
        Self {
            stream,
            targets: Vec::new(),
            error: "Unknown error".to_string(),
        }
    }

    fn fail(&mut self, message: impl Into<String>) -> bool {
        self.error = message.into();
        debug!(error = %self.error, "TCP socket error");
        false
    }

    fn connect(&mut self, msecs: i32) -> bool {
        if self.stream.is_some() {
            return true;
        }
        let mut last_error = None;
        for target in std::mem::take(&mut self.targets) {
            let attempt = if msecs < 0 {
                TcpStream::connect(target)
            } else {
                TcpStream::connect_timeout(&target, Duration::from_millis(msecs.max(1) as u64))
            };
            match attempt {
                Ok(stream) => {
                    debug!(%target, "Connected");
                    self.stream = Some(stream);
                    return true;
                }
                Err(err) => last_error = Some(err),
            }
        }
        match last_error {
            Some(err) => self.fail(err.to_string()),
            None => self.fail("No host to connect to"),
        }
    }
}

#[no_mangle]
pub extern "C" fn netbridge_tcpserver_new() -> *mut NativeTcpServer {
    Box::into_raw(Box::default())
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpserver_delete(server: *mut NativeTcpServer) {
    if !server.is_null() {
        drop(Box::from_raw(server));
    }
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpserver_listen(
    server: *mut NativeTcpServer,
    address: *const NativeHostAddress,
    port: u16,
) -> bool {
    (*server).listen(&*address, port)
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpserver_is_listening(server: *const NativeTcpServer) -> bool {
    (*server).listener.is_some()
}

/// Stops listening and drops connections nobody picked up.
#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpserver_close(server: *mut NativeTcpServer) {
    (*server).listener = None;
    (*server).pending.clear();
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpserver_server_address(
    server: *const NativeTcpServer,
    out: *mut NativeHostAddress,
) {
    let local = (*server).listener.as_ref().and_then(|l| l.local_addr().ok());
    write_address(out, address_of(local));
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpserver_server_port(server: *const NativeTcpServer) -> u16 {
    (*server)
        .listener
        .as_ref()
        .and_then(|listener| listener.local_addr().ok())
        .map_or(0, |addr| addr.port())
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpserver_socket_descriptor(
    server: *const NativeTcpServer,
) -> NativeSocketDescriptor {
    (*server)
        .listener
        .as_ref()
        .map_or(NativeSocketDescriptor::INVALID, |l| NativeSocketDescriptor::of(l.as_raw_fd()))
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpserver_set_max_pending_connections(
    server: *mut NativeTcpServer,
    max: i32,
) {
    (*server).max_pending = max;
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpserver_max_pending_connections(server: *const NativeTcpServer) -> i32 {
    (*server).max_pending
}

/// `*timed_out` tells a timeout apart from an error.
#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpserver_wait_for_new_connection(
    server: *mut NativeTcpServer,
    msecs: i32,
    timed_out: *mut bool,
) -> bool {
    let mut expired = false;
    let ready = (*server).wait_for_new_connection(msecs, &mut expired);
    if !timed_out.is_null() {
        *timed_out = expired;
    }
    ready
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpserver_has_pending_connections(server: *mut NativeTcpServer) -> bool {
    let server = &mut *server;
    if let Err(err) = server.accept_ready() {
        server.fail(err.to_string());
    }
    !server.pending.is_empty()
}

/// Ownership of the returned socket passes to the caller; null when no
/// connection is pending.
#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpserver_next_pending_connection(
    server: *mut NativeTcpServer,
) -> *mut NativeTcpSocket {
    match (*server).pending.pop_front() {
        Some(stream) => Box::into_raw(Box::new(NativeTcpSocket::new(Some(stream)))),
        None => std::ptr::null_mut(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpserver_error_string(
    server: *const NativeTcpServer,
    out: *mut NativeByteArray,
) {
    write_bytes(out, (*server).error.as_bytes());
}

#[no_mangle]
pub extern "C" fn netbridge_tcpsocket_new() -> *mut NativeTcpSocket {
    Box::into_raw(Box::new(NativeTcpSocket::new(None)))
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpsocket_delete(socket: *mut NativeTcpSocket) {
    if !socket.is_null() {
        drop(Box::from_raw(socket));
    }
}

/// Resolves `host`; the connection itself is made by `wait_for_connected`.
#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpsocket_connect_to_host(
    socket: *mut NativeTcpSocket,
    host: ByteView,
    port: u16,
) -> bool {
    let socket = &mut *socket;
    let host = String::from_utf8_lossy(host.as_slice()).into_owned();
    match (host.as_str(), port).to_socket_addrs() {
        Ok(targets) => {
            socket.targets = targets.collect();
            !socket.targets.is_empty() || socket.fail("Host not found")
        }
        Err(err) => socket.fail(err.to_string()),
    }
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpsocket_wait_for_connected(
    socket: *mut NativeTcpSocket,
    msecs: i32,
) -> bool {
    (*socket).connect(msecs)
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpsocket_wait_for_ready_read(
    socket: *mut NativeTcpSocket,
    msecs: i32,
) -> bool {
    let socket = &mut *socket;
    let Some(stream) = &socket.stream else {
        return socket.fail("The socket is not connected");
    };
    match wait_readable(stream, msecs) {
        Ok(true) => true,
        Ok(false) => socket.fail("Socket operation timed out"),
        Err(err) => socket.fail(err.to_string()),
    }
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpsocket_is_connected(socket: *const NativeTcpSocket) -> bool {
    (*socket).stream.is_some()
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpsocket_socket_descriptor(
    socket: *const NativeTcpSocket,
) -> NativeSocketDescriptor {
    (*socket)
        .stream
        .as_ref()
        .map_or(NativeSocketDescriptor::INVALID, |s| NativeSocketDescriptor::of(s.as_raw_fd()))
}

/// Adopts an already connected descriptor; the socket takes ownership.
#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpsocket_set_socket_descriptor(
    socket: *mut NativeTcpSocket,
    descriptor: NativeSocketDescriptor,
) -> bool {
    let socket = &mut *socket;
    if descriptor.fd < 0 {
        return socket.fail("Invalid socket descriptor");
    }
    socket.stream = Some(TcpStream::from_raw_fd(descriptor.fd as RawFd));
    true
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpsocket_local_address(
    socket: *const NativeTcpSocket,
    out: *mut NativeHostAddress,
) {
    let local = (*socket).stream.as_ref().and_then(|s| s.local_addr().ok());
    write_address(out, address_of(local));
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpsocket_local_port(socket: *const NativeTcpSocket) -> u16 {
    (*socket)
        .stream
        .as_ref()
        .and_then(|s| s.local_addr().ok())
        .map_or(0, |addr| addr.port())
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpsocket_peer_address(
    socket: *const NativeTcpSocket,
    out: *mut NativeHostAddress,
) {
    let peer = (*socket).stream.as_ref().and_then(|s| s.peer_addr().ok());
    write_address(out, address_of(peer));
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpsocket_peer_port(socket: *const NativeTcpSocket) -> u16 {
    (*socket)
        .stream
        .as_ref()
        .and_then(|s| s.peer_addr().ok())
        .map_or(0, |addr| addr.port())
}

/// Blocks until data arrives. Bytes read, `0` once the peer closed, `-1` on
/// failure.
#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpsocket_read(
    socket: *mut NativeTcpSocket,
    data: *mut u8,
    max_size: usize,
) -> i64 {
    let socket = &mut *socket;
    let Some(stream) = socket.stream.as_mut() else {
        socket.fail("The socket is not connected");
        return -1;
    };
    if data.is_null() {
        return 0;
    }
    match stream.read(std::slice::from_raw_parts_mut(data, max_size)) {
        Ok(count) => count as i64,
        Err(err) => {
            socket.fail(err.to_string());
            -1
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpsocket_write(socket: *mut NativeTcpSocket, data: ByteView) -> i64 {
    let socket = &mut *socket;
    let bytes = data.as_slice();
    let Some(stream) = socket.stream.as_mut() else {
        socket.fail("The socket is not connected");
        return -1;
    };
    match stream.write_all(bytes) {
        Ok(()) => bytes.len() as i64,
        Err(err) => {
            socket.fail(err.to_string());
            -1
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpsocket_close(socket: *mut NativeTcpSocket) {
    if let Some(stream) = (*socket).stream.take() {
        // The peer may already be gone.
        let _ = stream.shutdown(Shutdown::Both);
    }
    (*socket).targets.clear();
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_tcpsocket_error_string(
    socket: *const NativeTcpSocket,
    out: *mut NativeByteArray,
) {
    write_bytes(out, (*socket).error.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    #[test]
    fn test_accept_and_exchange() {
        unsafe {
            let server = netbridge_tcpserver_new();
            let localhost = HostAddressData::parse("127.0.0.1");
            assert!((*server).listen(&localhost, 0));
            let port = netbridge_tcpserver_server_port(server);
            assert_ne!(port, 0);

            let client = netbridge_tcpsocket_new();
            assert!(netbridge_tcpsocket_connect_to_host(
                client,
                ByteView::from_slice(b"127.0.0.1"),
                port
            ));
            assert!(netbridge_tcpsocket_wait_for_connected(client, 1_000));

            let mut timed_out = true;
            assert!(netbridge_tcpserver_wait_for_new_connection(server, 1_000, &mut timed_out));
            assert!(!timed_out);
            let accepted = netbridge_tcpserver_next_pending_connection(server);
            assert!(!accepted.is_null());
            assert!(netbridge_tcpserver_next_pending_connection(server).is_null());

            assert_eq!(netbridge_tcpsocket_write(client, ByteView::from_slice(b"ping")), 4);
            assert!(netbridge_tcpsocket_wait_for_ready_read(accepted, 1_000));
            let mut buf = [0u8; 8];
            let read = netbridge_tcpsocket_read(accepted, buf.as_mut_ptr(), buf.len());
            assert_eq!(&buf[..read as usize], b"ping");

            netbridge_tcpsocket_delete(accepted);
            netbridge_tcpsocket_delete(client);
            netbridge_tcpserver_delete(server);
        }
    }

    #[test]
    fn test_pending_queue_is_capped() {
        unsafe {
            let server = netbridge_tcpserver_new();
            assert_eq!(netbridge_tcpserver_max_pending_connections(server), DEFAULT_MAX_PENDING_CONNECTIONS);
            netbridge_tcpserver_set_max_pending_connections(server, 2);
            assert!((*server).listen(&HostAddressData::parse("127.0.0.1"), 0));
            let port = netbridge_tcpserver_server_port(server);

            let clients: Vec<_> = (0..3)
                .map(|_| {
                    let client = netbridge_tcpsocket_new();
                    assert!(netbridge_tcpsocket_connect_to_host(
                        client,
                        ByteView::from_slice(b"127.0.0.1"),
                        port
                    ));
                    assert!(netbridge_tcpsocket_wait_for_connected(client, 1_000));
                    client
                })
                .collect();

            assert!(netbridge_tcpserver_wait_for_new_connection(server, 1_000, ptr::null_mut()));
            assert_eq!((*server).pending.len(), 2);

            let first = netbridge_tcpserver_next_pending_connection(server);
            assert!(netbridge_tcpserver_has_pending_connections(server));
            assert_eq!((*server).pending.len(), 2);

            let rest = [
                netbridge_tcpserver_next_pending_connection(server),
                netbridge_tcpserver_next_pending_connection(server),
            ];
            assert!(!first.is_null() && rest.iter().all(|s| !s.is_null()));
            assert!(netbridge_tcpserver_next_pending_connection(server).is_null());

            for socket in clients.into_iter().chain(rest).chain([first]) {
                netbridge_tcpsocket_delete(socket);
            }
            netbridge_tcpserver_delete(server);
        }
    }

    #[test]
    fn test_wait_times_out_without_clients() {
        unsafe {
            let server = netbridge_tcpserver_new();
            assert!((*server).listen(&HostAddressData::parse("127.0.0.1"), 0));
            let mut timed_out = false;
            assert!(!netbridge_tcpserver_wait_for_new_connection(server, 10, &mut timed_out));
            assert!(timed_out);
            netbridge_tcpserver_delete(server);

            let socket = netbridge_tcpsocket_new();
            assert_eq!(netbridge_tcpsocket_read(socket, ptr::null_mut(), 0), -1);
            netbridge_tcpsocket_delete(socket);
        }
    }
}
