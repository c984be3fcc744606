//! IPv4 and IPv6 host addresses.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use bridge_traits::abi::Relocatable;
use bridge_traits::ffi::{ByteView, NetworkLayerProtocol, SpecialAddress};
use bridge_traits::{assert_abi_contract, assert_same_layout, BridgeError};
use tracing::debug;

use crate::bytearray::{string_from, ByteArray};
use crate::util::{construct, shared_handle};

/// Sixteen IPv6 address bytes in network order.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Ipv6AddrBytes {
    pub c: [u8; 16],
}

unsafe impl Relocatable for Ipv6AddrBytes {}

assert_abi_contract!(Trivial, Ipv6AddrBytes, { c: [u8; 16] });
assert_same_layout!(Ipv6AddrBytes, bridge_native::NativeIpv6Address);

impl From<Ipv6Addr> for Ipv6AddrBytes {
    fn from(ip: Ipv6Addr) -> Self {
        Self { c: ip.octets() }
    }
}

impl From<Ipv6AddrBytes> for Ipv6Addr {
    fn from(bytes: Ipv6AddrBytes) -> Self {
        Ipv6Addr::from(bytes.c)
    }
}

shared_handle! {
    /// An IPv4 or IPv6 address, possibly with a scope id. The default value
    /// is the null address.
    pub struct HostAddress => bridge_native::NativeHostAddress {
        default: netbridge_hostaddress_init_default,
        clone: netbridge_hostaddress_clone,
        drop: netbridge_hostaddress_drop,
        eq: netbridge_hostaddress_eq,
        ref_count: netbridge_hostaddress_ref_count,
        live: netbridge_hostaddress_live_payloads,
    }
}

extern "C" {
    fn netbridge_hostaddress_from_string(text: ByteView, out: *mut HostAddress);
    fn netbridge_hostaddress_from_ipv4(ip4: u32, out: *mut HostAddress);
    fn netbridge_hostaddress_from_ipv6(ip6: *const Ipv6AddrBytes, out: *mut HostAddress);
    fn netbridge_hostaddress_from_special(special: SpecialAddress, out: *mut HostAddress);
    fn netbridge_hostaddress_set_address(address: *mut HostAddress, text: ByteView) -> bool;
    fn netbridge_hostaddress_clear(address: *mut HostAddress);
    fn netbridge_hostaddress_is_null(address: *const HostAddress) -> bool;
    fn netbridge_hostaddress_protocol(address: *const HostAddress) -> NetworkLayerProtocol;
    fn netbridge_hostaddress_to_ipv4(address: *const HostAddress, ok: *mut bool) -> u32;
    fn netbridge_hostaddress_to_ipv6(address: *const HostAddress) -> Ipv6AddrBytes;
    fn netbridge_hostaddress_scope_id(address: *const HostAddress, out: *mut ByteArray);
    fn netbridge_hostaddress_set_scope_id(address: *mut HostAddress, scope_id: ByteView);
    fn netbridge_hostaddress_is_loopback(address: *const HostAddress) -> bool;
    fn netbridge_hostaddress_is_broadcast(address: *const HostAddress) -> bool;
    fn netbridge_hostaddress_is_multicast(address: *const HostAddress) -> bool;
    fn netbridge_hostaddress_is_link_local(address: *const HostAddress) -> bool;
    fn netbridge_hostaddress_is_site_local(address: *const HostAddress) -> bool;
    fn netbridge_hostaddress_is_unique_local_unicast(address: *const HostAddress) -> bool;
    fn netbridge_hostaddress_is_private_use(address: *const HostAddress) -> bool;
    fn netbridge_hostaddress_is_global(address: *const HostAddress) -> bool;
    fn netbridge_hostaddress_is_in_subnet(
        address: *const HostAddress,
        subnet: *const HostAddress,
        netmask: i32,
    ) -> bool;
    fn netbridge_hostaddress_parse_subnet(text: ByteView, out: *mut HostAddress) -> i32;
    fn netbridge_hostaddress_to_string(address: *const HostAddress, out: *mut ByteArray);
}

impl HostAddress {
    /// Parses `text`; the result is null when it is not an address.
    pub fn from_string(text: &str) -> Self {
        unsafe { construct(|out| netbridge_hostaddress_from_string(ByteView::from_slice(text.as_bytes()), out)) }
    }

    /// Like [`from_string`](Self::from_string), with `None` instead of a null
    /// address.
    pub fn parse(text: &str) -> Option<Self> {
        let address = Self::from_string(text);
        if address.is_null() {
            debug!(input = %text, "Not a host address");
            return None;
        }
        Some(address)
    }

    /// From a host-order IPv4 address.
    pub fn from_ipv4(ip4: u32) -> Self {
        unsafe { construct(|out| netbridge_hostaddress_from_ipv4(ip4, out)) }
    }

    pub fn from_ipv6(ip6: Ipv6AddrBytes) -> Self {
        unsafe { construct(|out| netbridge_hostaddress_from_ipv6(&ip6, out)) }
    }

    pub fn from_special(special: SpecialAddress) -> Self {
        unsafe { construct(|out| netbridge_hostaddress_from_special(special, out)) }
    }

    /// Replaces the address; on failure the address becomes null.
    pub fn set_address(&mut self, text: &str) -> bool {
        unsafe { netbridge_hostaddress_set_address(self, ByteView::from_slice(text.as_bytes())) }
    }

    pub fn clear(&mut self) {
        unsafe { netbridge_hostaddress_clear(self) }
    }

    pub fn is_null(&self) -> bool {
        unsafe { netbridge_hostaddress_is_null(self) }
    }

    pub fn protocol(&self) -> NetworkLayerProtocol {
        unsafe { netbridge_hostaddress_protocol(self) }
    }

    /// Host-order IPv4 address, also for IPv4-mapped IPv6 addresses.
    pub fn to_ipv4_address(&self) -> Option<u32> {
        let mut ok = false;
        let ip4 = unsafe { netbridge_hostaddress_to_ipv4(self, &mut ok) };
        ok.then_some(ip4)
    }

    /// IPv6 form; IPv4 addresses come back IPv4-mapped.
    pub fn to_ipv6_address(&self) -> Ipv6AddrBytes {
        unsafe { netbridge_hostaddress_to_ipv6(self) }
    }

    pub fn to_ip_addr(&self) -> Option<IpAddr> {
        match self.protocol() {
            NetworkLayerProtocol::IPv4Protocol => {
                self.to_ipv4_address().map(|ip4| IpAddr::V4(Ipv4Addr::from(ip4)))
            }
            NetworkLayerProtocol::IPv6Protocol => Some(IpAddr::V6(self.to_ipv6_address().into())),
            _ => None,
        }
    }

    pub fn scope_id(&self) -> String {
        unsafe { string_from(|out| netbridge_hostaddress_scope_id(self, out)) }
    }

    /// Ignored for IPv4 addresses.
    pub fn set_scope_id(&mut self, scope_id: &str) {
        unsafe { netbridge_hostaddress_set_scope_id(self, ByteView::from_slice(scope_id.as_bytes())) }
    }

    pub fn is_loopback(&self) -> bool {
        unsafe { netbridge_hostaddress_is_loopback(self) }
    }

    pub fn is_broadcast(&self) -> bool {
        unsafe { netbridge_hostaddress_is_broadcast(self) }
    }

    pub fn is_multicast(&self) -> bool {
        unsafe { netbridge_hostaddress_is_multicast(self) }
    }

    pub fn is_link_local(&self) -> bool {
        unsafe { netbridge_hostaddress_is_link_local(self) }
    }

    pub fn is_site_local(&self) -> bool {
        unsafe { netbridge_hostaddress_is_site_local(self) }
    }

    pub fn is_unique_local_unicast(&self) -> bool {
        unsafe { netbridge_hostaddress_is_unique_local_unicast(self) }
    }

    pub fn is_private_use(&self) -> bool {
        unsafe { netbridge_hostaddress_is_private_use(self) }
    }

    /// Unicast and routable; private and unique-local ranges count.
    pub fn is_global(&self) -> bool {
        unsafe { netbridge_hostaddress_is_global(self) }
    }

    pub fn is_in_subnet(&self, subnet: &HostAddress, netmask: i32) -> bool {
        unsafe { netbridge_hostaddress_is_in_subnet(self, subnet, netmask) }
    }

    /// Parses `address/prefix`, `address/netmask` or a bare address.
    pub fn parse_subnet(text: &str) -> Option<(HostAddress, i32)> {
        let mut prefix = 0;
        let base = unsafe {
            construct(|out| {
                prefix = netbridge_hostaddress_parse_subnet(ByteView::from_slice(text.as_bytes()), out)
            })
        };
        (prefix >= 0).then_some((base, prefix))
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = unsafe { string_from(|out| netbridge_hostaddress_to_string(self, out)) };
        f.write_str(&text)
    }
}

impl fmt::Debug for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostAddress({self})")
    }
}

impl FromStr for HostAddress {
    type Err = BridgeError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse(text)
            .ok_or_else(|| BridgeError::InvalidArgument(format!("{text:?} is not a host address")))
    }
}

impl From<Ipv4Addr> for HostAddress {
    fn from(ip: Ipv4Addr) -> Self {
        Self::from_ipv4(u32::from(ip))
    }
}

impl From<Ipv6Addr> for HostAddress {
    fn from(ip: Ipv6Addr) -> Self {
        Self::from_ipv6(ip.into())
    }
}

impl From<IpAddr> for HostAddress {
    fn from(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(ip) => ip.into(),
            IpAddr::V6(ip) => ip.into(),
        }
    }
}

impl From<SpecialAddress> for HostAddress {
    fn from(special: SpecialAddress) -> Self {
        Self::from_special(special)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_by_default() {
        let address = HostAddress::default();
        assert!(address.is_null());
        assert_eq!(address.protocol(), NetworkLayerProtocol::UnknownNetworkLayerProtocol);
        assert_eq!(address.to_ipv4_address(), None);
        assert_eq!(address.to_string(), "");
    }

    #[test]
    fn test_std_conversions_round_trip() {
        let v4 = HostAddress::from(Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(v4.to_string(), "192.168.1.10");
        assert_eq!(v4.to_ip_addr(), Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10))));

        let v6 = HostAddress::from(Ipv6Addr::LOCALHOST);
        assert!(v6.is_loopback());
        assert_eq!(v6.to_ipv6_address(), Ipv6AddrBytes::from(Ipv6Addr::LOCALHOST));
    }

    #[test]
    fn test_parse_subnet_reports_prefix() {
        let (base, prefix) = HostAddress::parse_subnet("10.1.0.0/16").unwrap();
        assert_eq!(prefix, 16);
        assert!(HostAddress::from_string("10.1.200.3").is_in_subnet(&base, prefix));
        assert!(HostAddress::parse_subnet("not a subnet").is_none());
    }

    #[test]
    fn test_from_str_rejects_garbage() {
        assert!("::1".parse::<HostAddress>().is_ok());
        assert!("300.1.1.1".parse::<HostAddress>().is_err());
    }
}
