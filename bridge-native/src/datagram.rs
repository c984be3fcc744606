//! UDP datagrams: a payload plus the addressing metadata it travels with.
//!
//! Ports are `-1` and the hop limit is `-1` until set. Interface index `0`
//! means no particular interface.

use bridge_traits::assert_abi_contract;
use bridge_traits::ffi::ByteView;

use crate::bytearray::{write_bytes, NativeByteArray};
use crate::handle::{export_shared_handle, payload, Shared};
use crate::hostaddress::{write_address, HostAddressData, NativeHostAddress};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkDatagramData {
    pub data: Vec<u8>,
    pub sender: HostAddressData,
    pub sender_port: i32,
    pub destination: HostAddressData,
    pub destination_port: i32,
    pub hop_limit: i32,
    pub interface_index: u32,
}

impl Default for NetworkDatagramData {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            sender: HostAddressData::default(),
            sender_port: -1,
            destination: HostAddressData::default(),
            destination_port: -1,
            hop_limit: -1,
            interface_index: 0,
        }
    }
}

payload!(NetworkDatagramData, "NetworkDatagram");

pub type NativeNetworkDatagram = Shared<NetworkDatagramData>;

assert_abi_contract!(SharedHandle, NativeNetworkDatagram, { d: usize });

impl NetworkDatagramData {
    pub fn new(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
            ..Self::default()
        }
    }

    /// Valid once either end has an address. An empty payload is fine.
    pub fn is_valid(&self) -> bool {
        !self.sender.is_null() || !self.destination.is_null()
    }

    /// A datagram addressed back to this one's sender. Replies to a
    /// broadcast or multicast destination leave the sender address unset so
    /// the system picks a unicast one.
    pub fn make_reply(&self, payload: &[u8]) -> Self {
        let sender = if self.destination.is_non_unicast() {
            HostAddressData::default()
        } else {
            self.destination.clone()
        };
        Self {
            data: payload.to_vec(),
            sender,
            sender_port: self.destination_port,
            destination: self.sender.clone(),
            destination_port: self.sender_port,
            hop_limit: -1,
            interface_index: self.interface_index,
        }
    }
}

pub(crate) unsafe fn write_datagram(out: *mut NativeNetworkDatagram, data: NetworkDatagramData) {
    out.write(Shared::new(data));
}

export_shared_handle!(NativeNetworkDatagram {
    default: netbridge_datagram_init_default,
    clone: netbridge_datagram_clone,
    drop: netbridge_datagram_drop,
    eq: netbridge_datagram_eq,
    ref_count: netbridge_datagram_ref_count,
    live: netbridge_datagram_live_payloads,
});

#[no_mangle]
pub unsafe extern "C" fn netbridge_datagram_new(data: ByteView, out: *mut NativeNetworkDatagram) {
    write_datagram(out, NetworkDatagramData::new(data.as_slice()));
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_datagram_new_to(
    data: ByteView,
    destination: *const NativeHostAddress,
    port: u16,
    out: *mut NativeNetworkDatagram,
) {
    let destination = &*destination;
    write_datagram(
        out,
        NetworkDatagramData {
            destination: HostAddressData::clone(destination),
            destination_port: i32::from(port),
            ..NetworkDatagramData::new(data.as_slice())
        },
    );
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_datagram_clear(datagram: *mut NativeNetworkDatagram) {
    let datagram = &mut *datagram;
    *datagram.make_mut() = NetworkDatagramData::default();
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_datagram_data(datagram: *const NativeNetworkDatagram, out: *mut NativeByteArray) {
    let datagram = &*datagram;
    write_bytes(out, datagram.data.as_slice());
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_datagram_set_data(datagram: *mut NativeNetworkDatagram, data: ByteView) {
    let datagram = &mut *datagram;
    datagram.make_mut().data = data.as_slice().to_vec();
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_datagram_is_valid(datagram: *const NativeNetworkDatagram) -> bool {
    let datagram = &*datagram;
    datagram.is_valid()
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_datagram_is_null(datagram: *const NativeNetworkDatagram) -> bool {
    let datagram = &*datagram;
    !datagram.is_valid()
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_datagram_sender_address(
    datagram: *const NativeNetworkDatagram,
    out: *mut NativeHostAddress,
) {
    let datagram = &*datagram;
    write_address(out, datagram.sender.clone());
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_datagram_sender_port(datagram: *const NativeNetworkDatagram) -> i32 {
    let datagram = &*datagram;
    datagram.sender_port
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_datagram_set_sender(
    datagram: *mut NativeNetworkDatagram,
    address: *const NativeHostAddress,
    port: u16,
) {
    let (datagram, address) = (&mut *datagram, &*address);
    let data = datagram.make_mut();
    data.sender = HostAddressData::clone(address);
    data.sender_port = i32::from(port);
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_datagram_destination_address(
    datagram: *const NativeNetworkDatagram,
    out: *mut NativeHostAddress,
) {
    let datagram = &*datagram;
    write_address(out, datagram.destination.clone());
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_datagram_destination_port(datagram: *const NativeNetworkDatagram) -> i32 {
    let datagram = &*datagram;
    datagram.destination_port
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_datagram_set_destination(
    datagram: *mut NativeNetworkDatagram,
    address: *const NativeHostAddress,
    port: u16,
) {
    let (datagram, address) = (&mut *datagram, &*address);
    let data = datagram.make_mut();
    data.destination = HostAddressData::clone(address);
    data.destination_port = i32::from(port);
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_datagram_hop_limit(datagram: *const NativeNetworkDatagram) -> i32 {
    let datagram = &*datagram;
    datagram.hop_limit
}

/// Negative counts reset to the system default.
#[no_mangle]
pub unsafe extern "C" fn netbridge_datagram_set_hop_limit(datagram: *mut NativeNetworkDatagram, count: i32) {
    let datagram = &mut *datagram;
    datagram.make_mut().hop_limit = count.max(-1);
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_datagram_interface_index(datagram: *const NativeNetworkDatagram) -> u32 {
    let datagram = &*datagram;
    datagram.interface_index
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_datagram_set_interface_index(datagram: *mut NativeNetworkDatagram, index: u32) {
    let datagram = &mut *datagram;
    datagram.make_mut().interface_index = index;
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_datagram_make_reply(
    datagram: *const NativeNetworkDatagram,
    payload: ByteView,
    out: *mut NativeNetworkDatagram,
) {
    let datagram = &*datagram;
    write_datagram(out, datagram.make_reply(payload.as_slice()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn received(destination: &str) -> NetworkDatagramData {
        NetworkDatagramData {
            sender: HostAddressData::parse("192.0.2.7"),
            sender_port: 5000,
            destination: HostAddressData::parse(destination),
            destination_port: 6000,
            hop_limit: 12,
            interface_index: 3,
            ..NetworkDatagramData::new(b"question")
        }
    }

    #[test]
    fn test_default_is_null() {
        let datagram = NetworkDatagramData::default();
        assert!(!datagram.is_valid());
        assert_eq!(datagram.sender_port, -1);
        assert_eq!(datagram.hop_limit, -1);

        // An empty payload does not make a datagram invalid.
        let addressed = NetworkDatagramData {
            destination: HostAddressData::parse("::1"),
            ..NetworkDatagramData::default()
        };
        assert!(addressed.is_valid());
    }

    #[test]
    fn test_reply_swaps_endpoints() {
        let reply = received("198.51.100.1").make_reply(b"answer");
        assert_eq!(reply.data, b"answer");
        assert_eq!(reply.destination, HostAddressData::parse("192.0.2.7"));
        assert_eq!(reply.destination_port, 5000);
        assert_eq!(reply.sender, HostAddressData::parse("198.51.100.1"));
        assert_eq!(reply.sender_port, 6000);
        assert_eq!(reply.interface_index, 3);
        assert_eq!(reply.hop_limit, -1);
    }

    #[test]
    fn test_reply_to_group_drops_sender_address() {
        for group in ["239.1.2.3", "255.255.255.255", "ff02::1"] {
            let reply = received(group).make_reply(b"");
            assert!(reply.sender.is_null(), "{group}");
            assert_eq!(reply.sender_port, 6000);
        }
    }

    #[test]
    fn test_setters_detach() {
        unsafe {
            let mut original = Shared::new(received("198.51.100.1"));
            let mut copy = original.clone();
            netbridge_datagram_set_hop_limit(&mut copy, -20);
            netbridge_datagram_set_data(&mut copy, ByteView::from_slice(b"changed"));
            assert_eq!(copy.hop_limit, -1);
            assert_eq!(original.data, b"question");
            assert_eq!(original.hop_limit, 12);
            netbridge_datagram_clear(&mut original);
            assert!(netbridge_datagram_is_null(&original));
        }
    }
}
