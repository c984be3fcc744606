//! UDP datagrams.

use std::fmt;

use bridge_traits::ffi::ByteView;

use super::hostaddress::HostAddress;
use crate::bytearray::ByteArray;
use crate::util::{construct, shared_handle};

shared_handle! {
    /// The payload and addressing of one UDP datagram.
    ///
    /// A datagram with neither a sender nor a destination address is null.
    /// Received datagrams carry both.
    pub struct NetworkDatagram => bridge_native::NativeNetworkDatagram {
        default: netbridge_datagram_init_default,
        clone: netbridge_datagram_clone,
        drop: netbridge_datagram_drop,
        eq: netbridge_datagram_eq,
        ref_count: netbridge_datagram_ref_count,
        live: netbridge_datagram_live_payloads,
    }
}

extern "C" {
    fn netbridge_datagram_new(data: ByteView, out: *mut NetworkDatagram);
    fn netbridge_datagram_new_to(data: ByteView, destination: *const HostAddress, port: u16, out: *mut NetworkDatagram);
    fn netbridge_datagram_clear(datagram: *mut NetworkDatagram);
    fn netbridge_datagram_data(datagram: *const NetworkDatagram, out: *mut ByteArray);
    fn netbridge_datagram_set_data(datagram: *mut NetworkDatagram, data: ByteView);
    fn netbridge_datagram_is_valid(datagram: *const NetworkDatagram) -> bool;
    fn netbridge_datagram_is_null(datagram: *const NetworkDatagram) -> bool;
    fn netbridge_datagram_sender_address(datagram: *const NetworkDatagram, out: *mut HostAddress);
    fn netbridge_datagram_sender_port(datagram: *const NetworkDatagram) -> i32;
    fn netbridge_datagram_set_sender(datagram: *mut NetworkDatagram, address: *const HostAddress, port: u16);
    fn netbridge_datagram_destination_address(datagram: *const NetworkDatagram, out: *mut HostAddress);
    fn netbridge_datagram_destination_port(datagram: *const NetworkDatagram) -> i32;
    fn netbridge_datagram_set_destination(datagram: *mut NetworkDatagram, address: *const HostAddress, port: u16);
    fn netbridge_datagram_hop_limit(datagram: *const NetworkDatagram) -> i32;
    fn netbridge_datagram_set_hop_limit(datagram: *mut NetworkDatagram, count: i32);
    fn netbridge_datagram_interface_index(datagram: *const NetworkDatagram) -> u32;
    fn netbridge_datagram_set_interface_index(datagram: *mut NetworkDatagram, index: u32);
    fn netbridge_datagram_make_reply(datagram: *const NetworkDatagram, payload: ByteView, out: *mut NetworkDatagram);
}

fn present(address: HostAddress) -> Option<HostAddress> {
    (!address.is_null()).then_some(address)
}

impl NetworkDatagram {
    pub fn new(data: impl AsRef<[u8]>) -> Self {
        unsafe { construct(|out| netbridge_datagram_new(ByteView::from_slice(data.as_ref()), out)) }
    }

    /// A datagram ready for [`UdpSocket::send_datagram`](super::UdpSocket::send_datagram).
    pub fn to(data: impl AsRef<[u8]>, destination: &HostAddress, port: u16) -> Self {
        unsafe {
            construct(|out| netbridge_datagram_new_to(ByteView::from_slice(data.as_ref()), destination, port, out))
        }
    }

    /// Resets payload and metadata.
    pub fn clear(&mut self) {
        unsafe { netbridge_datagram_clear(self) }
    }

    pub fn data(&self) -> ByteArray {
        unsafe { construct(|out| netbridge_datagram_data(self, out)) }
    }

    pub fn set_data(&mut self, data: impl AsRef<[u8]>) {
        unsafe { netbridge_datagram_set_data(self, ByteView::from_slice(data.as_ref())) }
    }

    pub fn is_valid(&self) -> bool {
        unsafe { netbridge_datagram_is_valid(self) }
    }

    pub fn is_null(&self) -> bool {
        unsafe { netbridge_datagram_is_null(self) }
    }

    pub fn sender_address(&self) -> Option<HostAddress> {
        present(unsafe { construct(|out| netbridge_datagram_sender_address(self, out)) })
    }

    pub fn sender_port(&self) -> Option<u16> {
        u16::try_from(unsafe { netbridge_datagram_sender_port(self) }).ok()
    }

    pub fn set_sender(&mut self, address: &HostAddress, port: u16) {
        unsafe { netbridge_datagram_set_sender(self, address, port) }
    }

    pub fn destination_address(&self) -> Option<HostAddress> {
        present(unsafe { construct(|out| netbridge_datagram_destination_address(self, out)) })
    }

    pub fn destination_port(&self) -> Option<u16> {
        u16::try_from(unsafe { netbridge_datagram_destination_port(self) }).ok()
    }

    pub fn set_destination(&mut self, address: &HostAddress, port: u16) {
        unsafe { netbridge_datagram_set_destination(self, address, port) }
    }

    /// IPv4 TTL or IPv6 hop limit; `None` uses the system default.
    pub fn hop_limit(&self) -> Option<i32> {
        let count = unsafe { netbridge_datagram_hop_limit(self) };
        (count >= 0).then_some(count)
    }

    pub fn set_hop_limit(&mut self, count: Option<i32>) {
        unsafe { netbridge_datagram_set_hop_limit(self, count.unwrap_or(-1)) }
    }

    pub fn interface_index(&self) -> Option<u32> {
        let index = unsafe { netbridge_datagram_interface_index(self) };
        (index != 0).then_some(index)
    }

    pub fn set_interface_index(&mut self, index: Option<u32>) {
        unsafe { netbridge_datagram_set_interface_index(self, index.unwrap_or(0)) }
    }

    /// A datagram carrying `payload` back to this datagram's sender.
    pub fn make_reply(&self, payload: impl AsRef<[u8]>) -> Self {
        unsafe { construct(|out| netbridge_datagram_make_reply(self, ByteView::from_slice(payload.as_ref()), out)) }
    }
}

impl fmt::Debug for NetworkDatagram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkDatagram")
            .field("len", &self.data().len())
            .field("sender", &self.sender_address())
            .field("sender_port", &self.sender_port())
            .field("destination", &self.destination_address())
            .field("destination_port", &self.destination_port())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_datagram_is_null() {
        let datagram = NetworkDatagram::new(b"payload");
        assert!(datagram.is_null());
        assert_eq!(datagram.data().as_slice(), b"payload");
        assert_eq!(datagram.sender_port(), None);
        assert_eq!(datagram.hop_limit(), None);
        assert_eq!(datagram.interface_index(), None);
        assert_eq!(NetworkDatagram::default(), NetworkDatagram::new(b""));
    }

    #[test]
    fn test_addressed_datagram() {
        let mut datagram = NetworkDatagram::to(b"", &HostAddress::from_string("::1"), 53);
        assert!(datagram.is_valid());
        assert_eq!(datagram.destination_port(), Some(53));
        assert_eq!(datagram.destination_address().map(|a| a.to_string()).as_deref(), Some("::1"));

        datagram.set_hop_limit(Some(8));
        datagram.set_interface_index(Some(2));
        assert_eq!(datagram.hop_limit(), Some(8));
        assert_eq!(datagram.interface_index(), Some(2));

        datagram.clear();
        assert!(datagram.is_null());
        assert_eq!(datagram.destination_port(), None);
    }

    #[test]
    fn test_reply_targets_sender() {
        let mut received = NetworkDatagram::new(b"ping");
        received.set_sender(&HostAddress::from_string("192.0.2.10"), 4000);
        received.set_destination(&HostAddress::from_string("192.0.2.20"), 5000);

        let reply = received.make_reply(b"pong");
        assert_eq!(reply.data().as_slice(), b"pong");
        assert_eq!(reply.destination_address(), Some(HostAddress::from_string("192.0.2.10")));
        assert_eq!(reply.destination_port(), Some(4000));
        assert_eq!(reply.sender_port(), Some(5000));
    }
}
