//! IPv4 / IPv6 host addresses.
//!
//! Classification follows the toolkit's rules: IPv4-mapped IPv6 addresses
//! classify as their IPv4 counterpart, and private-use, unique-local and
//! site-local ranges still count as global.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bridge_traits::abi::Relocatable;
use bridge_traits::assert_abi_contract;
use bridge_traits::ffi::{ByteView, NetworkLayerProtocol, SpecialAddress};
use tracing::debug;

use crate::bytearray::{write_bytes, NativeByteArray};
use crate::handle::{export_shared_handle, payload, Shared};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Addr {
    #[default]
    Null,
    V4(Ipv4Addr),
    V6(Ipv6Addr),
    /// Dual-stack wildcard.
    Any,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostAddressData {
    pub addr: Addr,
    pub scope_id: String,
}

payload!(HostAddressData, "HostAddress");

pub type NativeHostAddress = Shared<HostAddressData>;

assert_abi_contract!(SharedHandle, NativeHostAddress, { d: usize });

/// Sixteen address bytes in network order.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NativeIpv6Address {
    pub c: [u8; 16],
}

unsafe impl Relocatable for NativeIpv6Address {}

assert_abi_contract!(Trivial, NativeIpv6Address, { c: [u8; 16] });

/// Address class in the order of precedence used by the predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Unspecified,
    Loopback,
    LinkLocal,
    Multicast { global: bool },
    Broadcast,
    Reserved,
    SiteLocal,
    UniqueLocal,
    PrivateV4,
    Global,
}

fn classify_v4(ip: Ipv4Addr) -> Class {
    let [a, b, ..] = ip.octets();
    if ip.is_unspecified() {
        Class::Unspecified
    } else if ip.is_broadcast() {
        Class::Broadcast
    } else if a == 127 {
        Class::Loopback
    } else if a == 169 && b == 254 {
        Class::LinkLocal
    } else if ip.is_multicast() {
        // 224.0.0.0/24 is link-local multicast.
        Class::Multicast {
            global: !(a == 224 && b == 0 && ip.octets()[2] == 0),
        }
    } else if a >= 240 {
        Class::Reserved
    } else if ip.is_private() {
        Class::PrivateV4
    } else {
        Class::Global
    }
}

fn classify_v6(ip: Ipv6Addr) -> Class {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return classify_v4(v4);
    }
    let segments = ip.segments();
    if ip.is_unspecified() {
        Class::Unspecified
    } else if ip.is_loopback() {
        Class::Loopback
    } else if segments[0] & 0xff00 == 0xff00 {
        Class::Multicast {
            global: segments[0] & 0x000f == 0x000e,
        }
    } else if segments[0] & 0xffc0 == 0xfe80 {
        Class::LinkLocal
    } else if segments[0] & 0xffc0 == 0xfec0 {
        Class::SiteLocal
    } else if segments[0] & 0xfe00 == 0xfc00 {
        Class::UniqueLocal
    } else {
        Class::Global
    }
}

impl HostAddressData {
    fn classify(&self) -> Option<Class> {
        match self.addr {
            Addr::Null => None,
            Addr::Any => Some(Class::Unspecified),
            Addr::V4(ip) => Some(classify_v4(ip)),
            Addr::V6(ip) => Some(classify_v6(ip)),
        }
    }

    fn is_class(&self, pred: impl Fn(Class) -> bool) -> bool {
        self.classify().is_some_and(pred)
    }

    pub fn is_null(&self) -> bool {
        self.addr == Addr::Null
    }

    /// Broadcast or multicast.
    pub fn is_non_unicast(&self) -> bool {
        self.is_class(|class| matches!(class, Class::Broadcast | Class::Multicast { .. }))
    }

    pub fn protocol(&self) -> NetworkLayerProtocol {
        match self.addr {
            Addr::Null => NetworkLayerProtocol::UnknownNetworkLayerProtocol,
            Addr::V4(_) => NetworkLayerProtocol::IPv4Protocol,
            Addr::V6(_) => NetworkLayerProtocol::IPv6Protocol,
            Addr::Any => NetworkLayerProtocol::AnyIPProtocol,
        }
    }

    pub fn to_ipv4(&self) -> Option<Ipv4Addr> {
        match self.addr {
            Addr::V4(ip) => Some(ip),
            Addr::V6(ip) => ip.to_ipv4_mapped(),
            Addr::Any => Some(Ipv4Addr::UNSPECIFIED),
            Addr::Null => None,
        }
    }

    pub fn to_ipv6(&self) -> Ipv6Addr {
        match self.addr {
            Addr::V4(ip) => ip.to_ipv6_mapped(),
            Addr::V6(ip) => ip,
            Addr::Any | Addr::Null => Ipv6Addr::UNSPECIFIED,
        }
    }

    pub fn ip(&self) -> Option<IpAddr> {
        match self.addr {
            Addr::V4(ip) => Some(IpAddr::V4(ip)),
            Addr::V6(ip) => Some(IpAddr::V6(ip)),
            Addr::Any => Some(IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
            Addr::Null => None,
        }
    }

    /// Parses `a.b.c.d`, `x:y::z` or `x:y::z%scope`. Anything else is null.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let (ip, scope) = match text.split_once('%') {
            Some((ip, scope)) => (ip, scope),
            None => (text, ""),
        };
        let ip = ip.trim_start_matches('[').trim_end_matches(']');

        if let Ok(v4) = ip.parse::<Ipv4Addr>() {
            if scope.is_empty() {
                return Self::from_ip(IpAddr::V4(v4));
            }
        } else if let Ok(v6) = ip.parse::<Ipv6Addr>() {
            return Self {
                addr: Addr::V6(v6),
                scope_id: scope.to_string(),
            };
        }
        debug!(input = %text, "Rejected host address");
        Self::default()
    }

    pub fn from_ip(ip: IpAddr) -> Self {
        Self {
            addr: match ip {
                IpAddr::V4(ip) => Addr::V4(ip),
                IpAddr::V6(ip) => Addr::V6(ip),
            },
            scope_id: String::new(),
        }
    }

    pub fn from_special(special: SpecialAddress) -> Self {
        let addr = match special {
            SpecialAddress::Null => Addr::Null,
            SpecialAddress::Broadcast => Addr::V4(Ipv4Addr::BROADCAST),
            SpecialAddress::LocalHost => Addr::V4(Ipv4Addr::LOCALHOST),
            SpecialAddress::LocalHostIPv6 => Addr::V6(Ipv6Addr::LOCALHOST),
            SpecialAddress::Any => Addr::Any,
            SpecialAddress::AnyIPv6 => Addr::V6(Ipv6Addr::UNSPECIFIED),
            SpecialAddress::AnyIPv4 => Addr::V4(Ipv4Addr::UNSPECIFIED),
        };
        Self {
            addr,
            scope_id: String::new(),
        }
    }

    pub fn is_in_subnet(&self, subnet: &Self, netmask: i32) -> bool {
        if netmask < 0 {
            return false;
        }
        match (self.addr, subnet.addr) {
            (Addr::V4(ip), Addr::V4(net)) => {
                netmask <= 32 && prefix_eq(&ip.octets(), &net.octets(), netmask as u32)
            }
            (Addr::V6(ip), Addr::V6(net)) => {
                netmask <= 128 && prefix_eq(&ip.octets(), &net.octets(), netmask as u32)
            }
            _ => false,
        }
    }

    /// `addr/prefix` or `addr/dotted-netmask`; host bits are cleared.
    pub fn parse_subnet(text: &str) -> Option<(Self, i32)> {
        let text = text.trim();
        let (ip, mask) = match text.split_once('/') {
            Some((ip, mask)) => (ip, Some(mask.trim())),
            None => (text, None),
        };

        let mut base = Self::parse(ip);
        base.scope_id.clear();
        let prefix = match (base.addr, mask) {
            (Addr::V4(_), None) => 32,
            (Addr::V6(_), None) => 128,
            (Addr::V4(_), Some(mask)) => match mask.parse::<u32>() {
                Ok(prefix) if prefix <= 32 => prefix,
                Ok(_) => return None,
                Err(_) => netmask_to_prefix(mask.parse::<Ipv4Addr>().ok()?)?,
            },
            (Addr::V6(_), Some(mask)) => match mask.parse::<u32>() {
                Ok(prefix) if prefix <= 128 => prefix,
                _ => return None,
            },
            _ => return None,
        };

        base.addr = match base.addr {
            Addr::V4(ip) => Addr::V4(Ipv4Addr::from(clear_host_bits(ip.octets(), prefix))),
            Addr::V6(ip) => Addr::V6(Ipv6Addr::from(clear_host_bits(ip.octets(), prefix))),
            other => other,
        };
        Some((base, prefix as i32))
    }

    pub fn display(&self) -> String {
        let mut text = match self.addr {
            Addr::Null => return String::new(),
            Addr::Any => "::".to_string(),
            Addr::V4(ip) => ip.to_string(),
            Addr::V6(ip) => ip.to_string(),
        };
        if !self.scope_id.is_empty() {
            text.push('%');
            text.push_str(&self.scope_id);
        }
        text
    }
}

fn prefix_eq(a: &[u8], b: &[u8], prefix: u32) -> bool {
    let full = (prefix / 8) as usize;
    if a[..full] != b[..full] {
        return false;
    }
    let rest = prefix % 8;
    if rest == 0 {
        return true;
    }
    let mask = 0xffu8 << (8 - rest);
    a[full] & mask == b[full] & mask
}

fn clear_host_bits<const N: usize>(mut octets: [u8; N], prefix: u32) -> [u8; N] {
    for (i, octet) in octets.iter_mut().enumerate() {
        let bit = (i * 8) as u32;
        if bit >= prefix {
            *octet = 0;
        } else if prefix - bit < 8 {
            *octet &= 0xffu8 << (8 - (prefix - bit));
        }
    }
    octets
}

fn netmask_to_prefix(mask: Ipv4Addr) -> Option<u32> {
    let bits = u32::from(mask);
    let prefix = bits.leading_ones();
    (bits.checked_shl(prefix).unwrap_or(0) == 0).then_some(prefix)
}

impl NativeHostAddress {
    pub fn from_data(data: HostAddressData) -> Self {
        Shared::new(data)
    }
}

pub(crate) unsafe fn write_address(out: *mut NativeHostAddress, data: HostAddressData) {
    out.write(NativeHostAddress::from_data(data));
}

export_shared_handle!(NativeHostAddress {
    default: netbridge_hostaddress_init_default,
    clone: netbridge_hostaddress_clone,
    drop: netbridge_hostaddress_drop,
    eq: netbridge_hostaddress_eq,
    ref_count: netbridge_hostaddress_ref_count,
    live: netbridge_hostaddress_live_payloads,
});

#[no_mangle]
pub unsafe extern "C" fn netbridge_hostaddress_from_string(
    text: ByteView,
    out: *mut NativeHostAddress,
) {
    let text = String::from_utf8_lossy(text.as_slice());
    write_address(out, HostAddressData::parse(&text));
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_hostaddress_from_ipv4(ip4: u32, out: *mut NativeHostAddress) {
    write_address(out, HostAddressData::from_ip(IpAddr::V4(Ipv4Addr::from(ip4))));
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_hostaddress_from_ipv6(
    ip6: *const NativeIpv6Address,
    out: *mut NativeHostAddress,
) {
    let ip6 = &*ip6;
    write_address(out, HostAddressData::from_ip(IpAddr::V6(Ipv6Addr::from(ip6.c))));
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_hostaddress_from_special(
    special: SpecialAddress,
    out: *mut NativeHostAddress,
) {
    write_address(out, HostAddressData::from_special(special));
}

/// Returns `false`, leaving a null address, when `text` does not parse.
#[no_mangle]
pub unsafe extern "C" fn netbridge_hostaddress_set_address(
    address: *mut NativeHostAddress,
    text: ByteView,
) -> bool {
    let address = &mut *address;
    let text = String::from_utf8_lossy(text.as_slice());
    let parsed = HostAddressData::parse(&text);
    let ok = parsed.addr != Addr::Null;
    *address.make_mut() = parsed;
    ok
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_hostaddress_clear(address: *mut NativeHostAddress) {
    let address = &mut *address;
    *address.make_mut() = HostAddressData::default();
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_hostaddress_is_null(address: *const NativeHostAddress) -> bool {
    let address = &*address;
    address.is_null()
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_hostaddress_protocol(
    address: *const NativeHostAddress,
) -> NetworkLayerProtocol {
    let address = &*address;
    address.protocol()
}

/// `*ok` is set to whether the address has an IPv4 form.
#[no_mangle]
pub unsafe extern "C" fn netbridge_hostaddress_to_ipv4(
    address: *const NativeHostAddress,
    ok: *mut bool,
) -> u32 {
    let address = &*address;
    let ip = address.to_ipv4();
    if !ok.is_null() {
        *ok = ip.is_some();
    }
    ip.map(u32::from).unwrap_or(0)
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_hostaddress_to_ipv6(
    address: *const NativeHostAddress,
) -> NativeIpv6Address {
    let address = &*address;
    NativeIpv6Address {
        c: address.to_ipv6().octets(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_hostaddress_scope_id(
    address: *const NativeHostAddress,
    out: *mut NativeByteArray,
) {
    let address = &*address;
    write_bytes(out, address.scope_id.as_bytes());
}

/// Scope ids only apply to IPv6 addresses.
#[no_mangle]
pub unsafe extern "C" fn netbridge_hostaddress_set_scope_id(
    address: *mut NativeHostAddress,
    scope_id: ByteView,
) {
    let address = &mut *address;
    if matches!(address.addr, Addr::V6(_)) {
        address.make_mut().scope_id = String::from_utf8_lossy(scope_id.as_slice()).into_owned();
    }
}

macro_rules! export_predicate {
    ($($name:ident => $pat:pat),+ $(,)?) => {
        $(
            #[no_mangle]
            pub unsafe extern "C" fn $name(address: *const NativeHostAddress) -> bool {
                let address = &*address;
                address.is_class(|class| matches!(class, $pat))
            }
        )+
    };
}

export_predicate! {
    netbridge_hostaddress_is_loopback => Class::Loopback,
    netbridge_hostaddress_is_broadcast => Class::Broadcast,
    netbridge_hostaddress_is_multicast => Class::Multicast { .. },
    netbridge_hostaddress_is_link_local => Class::LinkLocal,
    netbridge_hostaddress_is_site_local => Class::SiteLocal,
    netbridge_hostaddress_is_unique_local_unicast => Class::UniqueLocal,
    netbridge_hostaddress_is_private_use => Class::UniqueLocal | Class::PrivateV4,
    netbridge_hostaddress_is_global => Class::Global
        | Class::SiteLocal
        | Class::UniqueLocal
        | Class::PrivateV4
        | Class::Multicast { global: true },
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_hostaddress_is_in_subnet(
    address: *const NativeHostAddress,
    subnet: *const NativeHostAddress,
    netmask: i32,
) -> bool {
    let address = &*address;
    address.is_in_subnet(&*subnet, netmask)
}

/// Writes the network address into `out` and returns the prefix length, or
/// writes a null address and returns `-1`.
#[no_mangle]
pub unsafe extern "C" fn netbridge_hostaddress_parse_subnet(
    text: ByteView,
    out: *mut NativeHostAddress,
) -> i32 {
    let text = String::from_utf8_lossy(text.as_slice());
    match HostAddressData::parse_subnet(&text) {
        Some((base, prefix)) => {
            write_address(out, base);
            prefix
        }
        None => {
            debug!(input = %text, "Rejected subnet");
            write_address(out, HostAddressData::default());
            -1
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_hostaddress_to_string(
    address: *const NativeHostAddress,
    out: *mut NativeByteArray,
) {
    let address = &*address;
    write_bytes(out, address.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> HostAddressData {
        HostAddressData::parse(text)
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(parse("192.168.1.20").display(), "192.168.1.20");
        assert_eq!(parse(" fe80::1%eth0 ").display(), "fe80::1%eth0");
        assert_eq!(parse("not an address").addr, Addr::Null);
        assert_eq!(parse("10.0.0.1%eth0").addr, Addr::Null);
    }

    #[test]
    fn test_classification() {
        assert!(parse("127.0.0.1").is_class(|c| c == Class::Loopback));
        assert!(parse("::ffff:127.0.0.1").is_class(|c| c == Class::Loopback));
        assert!(parse("fd00::1").is_class(|c| c == Class::UniqueLocal));
        assert!(parse("169.254.3.4").is_class(|c| c == Class::LinkLocal));
        assert!(parse("8.8.8.8").is_class(|c| c == Class::Global));
        assert!(parse("10.1.2.3").is_class(|c| c == Class::PrivateV4));
        assert!(!HostAddressData::default().is_class(|_| true));
    }

    #[test]
    fn test_parse_subnet_clears_host_bits() {
        let (base, prefix) = HostAddressData::parse_subnet("192.168.17.5/20").unwrap();
        assert_eq!(base.display(), "192.168.16.0");
        assert_eq!(prefix, 20);

        let (base, prefix) = HostAddressData::parse_subnet("10.9.8.7/255.255.0.0").unwrap();
        assert_eq!((base.display().as_str(), prefix), ("10.9.0.0", 16));

        assert!(HostAddressData::parse_subnet("10.0.0.0/255.0.255.0").is_none());
        assert!(HostAddressData::parse_subnet("2001:db8::/129").is_none());
    }

    #[test]
    fn test_is_in_subnet() {
        let net = parse("192.168.0.0");
        assert!(parse("192.168.200.1").is_in_subnet(&net, 16));
        assert!(!parse("192.169.0.1").is_in_subnet(&net, 16));
        assert!(!parse("::1").is_in_subnet(&net, 0));
    }
}
