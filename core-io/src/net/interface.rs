//! Network interfaces and their address entries.

use std::ffi::c_void;
use std::fmt;

use bridge_traits::ffi::{ByteView, InterfaceFlags, InterfaceType, PushFn};

use super::hostaddress::HostAddress;
use crate::bytearray::{string_from, ByteArray};
use crate::util::{collect, construct, shared_handle};

shared_handle! {
    /// One IP address configured on an interface.
    pub struct NetworkAddressEntry => bridge_native::NativeAddressEntry {
        default: netbridge_addressentry_init_default,
        clone: netbridge_addressentry_clone,
        drop: netbridge_addressentry_drop,
        eq: netbridge_addressentry_eq,
        ref_count: netbridge_addressentry_ref_count,
        live: netbridge_addressentry_live_payloads,
    }
}

shared_handle! {
    /// Snapshot of a network interface taken when it was looked up.
    pub struct NetworkInterface => bridge_native::NativeNetworkInterface {
        default: netbridge_interface_init_default,
        clone: netbridge_interface_clone,
        drop: netbridge_interface_drop,
        eq: netbridge_interface_eq,
        ref_count: netbridge_interface_ref_count,
        live: netbridge_interface_live_payloads,
    }
}

extern "C" {
    fn netbridge_interface_all(push: PushFn, ctx: *mut c_void) -> usize;
    fn netbridge_interface_all_addresses(push: PushFn, ctx: *mut c_void) -> usize;
    fn netbridge_interface_from_name(name: ByteView, out: *mut NetworkInterface) -> bool;
    fn netbridge_interface_from_index(index: i32, out: *mut NetworkInterface) -> bool;
    fn netbridge_interface_index_from_name(name: ByteView) -> i32;
    fn netbridge_interface_name_from_index(index: i32, out: *mut ByteArray) -> bool;
    fn netbridge_interface_is_valid(iface: *const NetworkInterface) -> bool;
    fn netbridge_interface_index(iface: *const NetworkInterface) -> i32;
    fn netbridge_interface_name(iface: *const NetworkInterface, out: *mut ByteArray);
    fn netbridge_interface_human_readable_name(iface: *const NetworkInterface, out: *mut ByteArray);
    fn netbridge_interface_flags(iface: *const NetworkInterface) -> InterfaceFlags;
    fn netbridge_interface_hardware_address(iface: *const NetworkInterface, out: *mut ByteArray);
    fn netbridge_interface_type(iface: *const NetworkInterface) -> InterfaceType;
    fn netbridge_interface_mtu(iface: *const NetworkInterface) -> i32;
    fn netbridge_interface_address_entries(iface: *const NetworkInterface, push: PushFn, ctx: *mut c_void) -> usize;

    fn netbridge_addressentry_ip(entry: *const NetworkAddressEntry, out: *mut HostAddress);
    fn netbridge_addressentry_set_ip(entry: *mut NetworkAddressEntry, ip: *const HostAddress);
    fn netbridge_addressentry_netmask(entry: *const NetworkAddressEntry, out: *mut HostAddress);
    fn netbridge_addressentry_set_netmask(entry: *mut NetworkAddressEntry, netmask: *const HostAddress);
    fn netbridge_addressentry_broadcast(entry: *const NetworkAddressEntry, out: *mut HostAddress);
    fn netbridge_addressentry_set_broadcast(entry: *mut NetworkAddressEntry, broadcast: *const HostAddress);
    fn netbridge_addressentry_prefix_length(entry: *const NetworkAddressEntry) -> i32;
    fn netbridge_addressentry_set_prefix_length(entry: *mut NetworkAddressEntry, length: i32);
    fn netbridge_addressentry_is_permanent(entry: *const NetworkAddressEntry) -> bool;
    fn netbridge_addressentry_is_lifetime_known(entry: *const NetworkAddressEntry) -> bool;
}

impl NetworkAddressEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ip(&self) -> HostAddress {
        unsafe { construct(|out| netbridge_addressentry_ip(self, out)) }
    }

    pub fn set_ip(&mut self, ip: &HostAddress) {
        unsafe { netbridge_addressentry_set_ip(self, ip) }
    }

    /// Derived from the prefix length; null while that is unknown.
    pub fn netmask(&self) -> HostAddress {
        unsafe { construct(|out| netbridge_addressentry_netmask(self, out)) }
    }

    /// A netmask of the other family, or a non-contiguous one, clears the
    /// prefix length.
    pub fn set_netmask(&mut self, netmask: &HostAddress) {
        unsafe { netbridge_addressentry_set_netmask(self, netmask) }
    }

    pub fn broadcast(&self) -> HostAddress {
        unsafe { construct(|out| netbridge_addressentry_broadcast(self, out)) }
    }

    pub fn set_broadcast(&mut self, broadcast: &HostAddress) {
        unsafe { netbridge_addressentry_set_broadcast(self, broadcast) }
    }

    /// `-1` while unknown.
    pub fn prefix_length(&self) -> i32 {
        unsafe { netbridge_addressentry_prefix_length(self) }
    }

    pub fn set_prefix_length(&mut self, length: i32) {
        unsafe { netbridge_addressentry_set_prefix_length(self, length) }
    }

    pub fn is_permanent(&self) -> bool {
        unsafe { netbridge_addressentry_is_permanent(self) }
    }

    pub fn is_lifetime_known(&self) -> bool {
        unsafe { netbridge_addressentry_is_lifetime_known(self) }
    }
}

impl fmt::Debug for NetworkAddressEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkAddressEntry")
            .field("ip", &self.ip())
            .field("prefix_length", &self.prefix_length())
            .field("broadcast", &self.broadcast())
            .finish()
    }
}

impl NetworkInterface {
    pub fn all_interfaces() -> Vec<NetworkInterface> {
        unsafe { collect(|push, ctx| netbridge_interface_all(push, ctx)) }
    }

    /// Every address of every interface that is up.
    pub fn all_addresses() -> Vec<HostAddress> {
        unsafe { collect(|push, ctx| netbridge_interface_all_addresses(push, ctx)) }
    }

    pub fn interface_from_name(name: &str) -> Option<NetworkInterface> {
        let mut found = false;
        let iface = unsafe {
            construct(|out| found = netbridge_interface_from_name(ByteView::from_slice(name.as_bytes()), out))
        };
        found.then_some(iface)
    }

    pub fn interface_from_index(index: i32) -> Option<NetworkInterface> {
        let mut found = false;
        let iface = unsafe { construct(|out| found = netbridge_interface_from_index(index, out)) };
        found.then_some(iface)
    }

    /// `0` when no interface has that name.
    pub fn interface_index_from_name(name: &str) -> i32 {
        unsafe { netbridge_interface_index_from_name(ByteView::from_slice(name.as_bytes())) }
    }

    pub fn interface_name_from_index(index: i32) -> Option<String> {
        let mut found = false;
        let name = unsafe { string_from(|out| found = netbridge_interface_name_from_index(index, out)) };
        found.then_some(name)
    }

    pub fn is_valid(&self) -> bool {
        unsafe { netbridge_interface_is_valid(self) }
    }

    pub fn index(&self) -> i32 {
        unsafe { netbridge_interface_index(self) }
    }

    pub fn name(&self) -> String {
        unsafe { string_from(|out| netbridge_interface_name(self, out)) }
    }

    pub fn human_readable_name(&self) -> String {
        unsafe { string_from(|out| netbridge_interface_human_readable_name(self, out)) }
    }

    pub fn flags(&self) -> InterfaceFlags {
        unsafe { netbridge_interface_flags(self) }
    }

    /// Colon-separated upper-case hex, empty when there is none.
    pub fn hardware_address(&self) -> String {
        unsafe { string_from(|out| netbridge_interface_hardware_address(self, out)) }
    }

    pub fn interface_type(&self) -> InterfaceType {
        unsafe { netbridge_interface_type(self) }
    }

    /// `0` when unknown.
    pub fn mtu(&self) -> i32 {
        unsafe { netbridge_interface_mtu(self) }
    }

    pub fn address_entries(&self) -> Vec<NetworkAddressEntry> {
        unsafe { collect(|push, ctx| netbridge_interface_address_entries(self, push, ctx)) }
    }
}

impl fmt::Debug for NetworkInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkInterface")
            .field("index", &self.index())
            .field("name", &self.name())
            .field("flags", &self.flags())
            .field("type", &self.interface_type())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::ffi::SpecialAddress;

    #[test]
    fn test_entry_netmask_tracks_prefix() {
        let mut entry = NetworkAddressEntry::new();
        assert_eq!(entry.prefix_length(), -1);
        assert!(entry.netmask().is_null());

        entry.set_ip(&HostAddress::from_string("192.168.4.7"));
        entry.set_prefix_length(24);
        assert_eq!(entry.netmask().to_string(), "255.255.255.0");

        entry.set_netmask(&HostAddress::from_string("255.255.0.0"));
        assert_eq!(entry.prefix_length(), 16);

        entry.set_netmask(&HostAddress::from_special(SpecialAddress::LocalHostIPv6));
        assert_eq!(entry.prefix_length(), -1);
    }

    #[test]
    fn test_unknown_interface_lookups() {
        assert!(NetworkInterface::interface_from_name("no-such-if0").is_none());
        assert_eq!(NetworkInterface::interface_index_from_name("no-such-if0"), 0);
        assert!(!NetworkInterface::default().is_valid());
    }
}
