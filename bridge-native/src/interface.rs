//! Network interfaces and their address entries, read from `getifaddrs`.

use std::collections::BTreeMap;
use std::ffi::c_void;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bridge_traits::assert_abi_contract;
use bridge_traits::ffi::{ByteView, InterfaceFlags, InterfaceType, PushFn};
use nix::ifaddrs::getifaddrs;
use nix::net::if_::{if_indextoname, if_nametoindex, InterfaceFlags as IfFlags};
use nix::sys::socket::{SockaddrLike, SockaddrStorage};
use tracing::{debug, warn};

use crate::bytearray::{write_bytes, NativeByteArray};
use crate::handle::{export_shared_handle, payload, Shared};
use crate::hostaddress::{write_address, Addr, HostAddressData, NativeHostAddress};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressEntryData {
    pub ip: HostAddressData,
    pub broadcast: HostAddressData,
    /// `-1` while unknown.
    pub prefix_length: i32,
}

impl Default for AddressEntryData {
    fn default() -> Self {
        Self {
            ip: HostAddressData::default(),
            broadcast: HostAddressData::default(),
            prefix_length: -1,
        }
    }
}

payload!(AddressEntryData, "NetworkAddressEntry");

pub type NativeAddressEntry = Shared<AddressEntryData>;

assert_abi_contract!(SharedHandle, NativeAddressEntry, { d: usize });

fn address_bits(data: &HostAddressData) -> Option<u32> {
    match data.addr {
        Addr::V4(_) => Some(32),
        Addr::V6(_) => Some(128),
        Addr::Null | Addr::Any => None,
    }
}

/// Prefix length of a contiguous netmask.
fn mask_prefix(mask: &HostAddressData) -> Option<i32> {
    let (bits, width) = match mask.addr {
        Addr::V4(ip) => (u128::from(u32::from(ip)) << 96, 32),
        Addr::V6(ip) => (u128::from(ip), 128),
        Addr::Null | Addr::Any => return None,
    };
    let prefix = bits.leading_ones();
    let contiguous = bits.checked_shl(prefix).unwrap_or(0) == 0;
    (contiguous && prefix <= width).then_some(prefix as i32)
}

impl AddressEntryData {
    pub fn netmask(&self) -> HostAddressData {
        let prefix = match u32::try_from(self.prefix_length) {
            Ok(prefix) => prefix,
            Err(_) => return HostAddressData::default(),
        };
        let ip = match address_bits(&self.ip) {
            Some(32) => IpAddr::V4(Ipv4Addr::from(u32::MAX.checked_shl(32 - prefix).unwrap_or(0))),
            Some(_) => IpAddr::V6(Ipv6Addr::from(u128::MAX.checked_shl(128 - prefix).unwrap_or(0))),
            None => return HostAddressData::default(),
        };
        HostAddressData::from_ip(ip)
    }

    /// A netmask of another family, or a non-contiguous one, clears the prefix.
    pub fn set_netmask(&mut self, mask: &HostAddressData) {
        self.prefix_length = match (address_bits(&self.ip), address_bits(mask)) {
            (Some(own), Some(other)) if own == other => mask_prefix(mask).unwrap_or(-1),
            _ => -1,
        };
    }

    pub fn set_prefix_length(&mut self, length: i32) {
        self.prefix_length = match address_bits(&self.ip) {
            Some(bits) if (0..=bits as i32).contains(&length) => length,
            _ => -1,
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkInterfaceData {
    /// `0` marks an invalid interface.
    pub index: i32,
    pub name: String,
    pub flags: InterfaceFlags,
    pub hardware_address: String,
    pub interface_type: Option<InterfaceType>,
    pub mtu: i32,
    pub entries: Vec<NativeAddressEntry>,
}

payload!(NetworkInterfaceData, "NetworkInterface");

pub type NativeNetworkInterface = Shared<NetworkInterfaceData>;

assert_abi_contract!(SharedHandle, NativeNetworkInterface, { d: usize });

fn host_address(storage: &SockaddrStorage) -> Option<HostAddressData> {
    if let Some(v4) = storage.as_sockaddr_in() {
        return Some(HostAddressData::from_ip(IpAddr::V4(v4.ip())));
    }
    let v6 = storage.as_sockaddr_in6()?;
    let mut data = HostAddressData::from_ip(IpAddr::V6(v6.ip()));
    if v6.scope_id() != 0 {
        data.scope_id = if_indextoname(v6.scope_id())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| v6.scope_id().to_string());
    }
    Some(data)
}

fn convert_flags(flags: IfFlags) -> InterfaceFlags {
    let mut converted = InterfaceFlags::empty();
    for (native, flag) in [
        (IfFlags::IFF_UP, InterfaceFlags::IS_UP),
        (IfFlags::IFF_RUNNING, InterfaceFlags::IS_RUNNING),
        (IfFlags::IFF_BROADCAST, InterfaceFlags::CAN_BROADCAST),
        (IfFlags::IFF_LOOPBACK, InterfaceFlags::IS_LOOP_BACK),
        (IfFlags::IFF_POINTOPOINT, InterfaceFlags::IS_POINT_TO_POINT),
        (IfFlags::IFF_MULTICAST, InterfaceFlags::CAN_MULTICAST),
    ] {
        if flags.contains(native) {
            converted |= flag;
        }
    }
    converted
}

fn sysfs_value(name: &str, attribute: &str) -> Option<i32> {
    fs::read_to_string(format!("/sys/class/net/{name}/{attribute}"))
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Maps the interface's ARP hardware type (`ARPHRD_*`).
fn interface_type(name: &str, flags: InterfaceFlags) -> InterfaceType {
    if flags.contains(InterfaceFlags::IS_LOOP_BACK) {
        return InterfaceType::Loopback;
    }
    match sysfs_value(name, "type") {
        Some(1) if fs::metadata(format!("/sys/class/net/{name}/wireless")).is_ok() => {
            InterfaceType::Wifi
        }
        Some(1) => InterfaceType::Ethernet,
        Some(24) => InterfaceType::Ieee1394,
        Some(256) => InterfaceType::Slip,
        Some(280) => InterfaceType::CanBus,
        Some(512) => InterfaceType::Ppp,
        Some(772) => InterfaceType::Loopback,
        Some(774) => InterfaceType::Fddi,
        Some(768 | 769 | 776 | 778 | 65534) => InterfaceType::Virtual,
        Some(801) => InterfaceType::Wifi,
        Some(804) => InterfaceType::Ieee802154,
        Some(820) => InterfaceType::Phonet,
        Some(825) => InterfaceType::SixLoWPAN,
        _ => InterfaceType::Unknown,
    }
}

fn hardware_address(octets: [u8; 6]) -> String {
    octets
        .iter()
        .map(|octet| format!("{octet:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Snapshot of every interface, ordered by index.
pub fn all_interfaces() -> Vec<NetworkInterfaceData> {
    let addrs = match getifaddrs() {
        Ok(addrs) => addrs,
        Err(err) => {
            warn!(error = %err, "getifaddrs failed");
            return Vec::new();
        }
    };

    let mut by_name: BTreeMap<String, NetworkInterfaceData> = BTreeMap::new();
    for ifaddr in addrs {
        let iface = by_name
            .entry(ifaddr.interface_name.clone())
            .or_insert_with(|| {
                let flags = convert_flags(ifaddr.flags);
                NetworkInterfaceData {
                    index: if_nametoindex(ifaddr.interface_name.as_str())
                        .map(|index| index as i32)
                        .unwrap_or(0),
                    name: ifaddr.interface_name.clone(),
                    flags,
                    hardware_address: String::new(),
                    interface_type: Some(interface_type(&ifaddr.interface_name, flags)),
                    mtu: sysfs_value(&ifaddr.interface_name, "mtu").unwrap_or(0),
                    entries: Vec::new(),
                }
            });

        let Some(address) = ifaddr.address.as_ref() else {
            continue;
        };
        if let Some(link) = address.as_link_addr() {
            if let Some(octets) = link.addr() {
                if octets != [0; 6] {
                    iface.hardware_address = hardware_address(octets);
                }
            }
            continue;
        }
        let Some(ip) = host_address(address) else {
            debug!(family = ?address.family(), "Skipping unsupported address family");
            continue;
        };

        let mut entry = AddressEntryData {
            ip,
            ..AddressEntryData::default()
        };
        if let Some(mask) = ifaddr.netmask.as_ref().and_then(host_address) {
            entry.set_netmask(&mask);
        }
        if iface.flags.contains(InterfaceFlags::CAN_BROADCAST) {
            if let Some(broadcast) = ifaddr.broadcast.as_ref().and_then(host_address) {
                entry.broadcast = broadcast;
            }
        }
        iface.entries.push(Shared::new(entry));
    }

    let mut interfaces: Vec<_> = by_name.into_values().collect();
    interfaces.sort_by_key(|iface| iface.index);
    interfaces
}

export_shared_handle!(NativeNetworkInterface {
    default: netbridge_interface_init_default,
    clone: netbridge_interface_clone,
    drop: netbridge_interface_drop,
    eq: netbridge_interface_eq,
    ref_count: netbridge_interface_ref_count,
    live: netbridge_interface_live_payloads,
});

export_shared_handle!(NativeAddressEntry {
    default: netbridge_addressentry_init_default,
    clone: netbridge_addressentry_clone,
    drop: netbridge_addressentry_drop,
    eq: netbridge_addressentry_eq,
    ref_count: netbridge_addressentry_ref_count,
    live: netbridge_addressentry_live_payloads,
});

unsafe fn push_interfaces(
    interfaces: impl IntoIterator<Item = NetworkInterfaceData>,
    push: PushFn,
    ctx: *mut c_void,
) -> usize {
    let mut count = 0;
    for data in interfaces {
        let iface = NativeNetworkInterface::new(data);
        push(ctx, (&iface as *const NativeNetworkInterface).cast());
        count += 1;
    }
    count
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_interface_all(push: PushFn, ctx: *mut c_void) -> usize {
    push_interfaces(all_interfaces(), push, ctx)
}

/// IP addresses of every interface that is up.
#[no_mangle]
pub unsafe extern "C" fn netbridge_interface_all_addresses(push: PushFn, ctx: *mut c_void) -> usize {
    let mut count = 0;
    for iface in all_interfaces() {
        if !iface.flags.contains(InterfaceFlags::IS_UP) {
            continue;
        }
        for entry in &iface.entries {
            let address = NativeHostAddress::from_data(entry.ip.clone());
            push(ctx, (&address as *const NativeHostAddress).cast());
            count += 1;
        }
    }
    count
}

unsafe fn write_found(
    found: Option<NetworkInterfaceData>,
    out: *mut NativeNetworkInterface,
) -> bool {
    let ok = found.is_some();
    out.write(Shared::new(found.unwrap_or_default()));
    ok
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_interface_from_name(
    name: ByteView,
    out: *mut NativeNetworkInterface,
) -> bool {
    let name = String::from_utf8_lossy(name.as_slice());
    write_found(
        all_interfaces().into_iter().find(|iface| iface.name == name),
        out,
    )
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_interface_from_index(
    index: i32,
    out: *mut NativeNetworkInterface,
) -> bool {
    write_found(
        all_interfaces()
            .into_iter()
            .find(|iface| index > 0 && iface.index == index),
        out,
    )
}

/// `0` when no interface has that name.
#[no_mangle]
pub unsafe extern "C" fn netbridge_interface_index_from_name(name: ByteView) -> i32 {
    let name = String::from_utf8_lossy(name.as_slice());
    if_nametoindex(&*name)
        .map(|index| index as i32)
        .unwrap_or(0)
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_interface_name_from_index(
    index: i32,
    out: *mut NativeByteArray,
) -> bool {
    let name = u32::try_from(index)
        .ok()
        .filter(|&index| index > 0)
        .and_then(|index| if_indextoname(index).ok());
    match name {
        Some(name) => {
            write_bytes(out, name.into_bytes());
            true
        }
        None => {
            write_bytes(out, Vec::new());
            false
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_interface_is_valid(iface: *const NativeNetworkInterface) -> bool {
    let iface = &*iface;
    !iface.name.is_empty()
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_interface_index(iface: *const NativeNetworkInterface) -> i32 {
    let iface = &*iface;
    iface.index
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_interface_name(
    iface: *const NativeNetworkInterface,
    out: *mut NativeByteArray,
) {
    let iface = &*iface;
    write_bytes(out, iface.name.as_bytes());
}

/// Unix interfaces have no separate display name.
#[no_mangle]
pub unsafe extern "C" fn netbridge_interface_human_readable_name(
    iface: *const NativeNetworkInterface,
    out: *mut NativeByteArray,
) {
    let iface = &*iface;
    write_bytes(out, iface.name.as_bytes());
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_interface_flags(iface: *const NativeNetworkInterface) -> InterfaceFlags {
    let iface = &*iface;
    iface.flags
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_interface_hardware_address(
    iface: *const NativeNetworkInterface,
    out: *mut NativeByteArray,
) {
    let iface = &*iface;
    write_bytes(out, iface.hardware_address.as_bytes());
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_interface_type(iface: *const NativeNetworkInterface) -> InterfaceType {
    let iface = &*iface;
    iface.interface_type.unwrap_or(InterfaceType::Unknown)
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_interface_mtu(iface: *const NativeNetworkInterface) -> i32 {
    let iface = &*iface;
    iface.mtu
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_interface_address_entries(
    iface: *const NativeNetworkInterface,
    push: PushFn,
    ctx: *mut c_void,
) -> usize {
    let iface = &*iface;
    for entry in &iface.entries {
        push(ctx, (entry as *const NativeAddressEntry).cast());
    }
    iface.entries.len()
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_addressentry_ip(
    entry: *const NativeAddressEntry,
    out: *mut NativeHostAddress,
) {
    let entry = &*entry;
    write_address(out, entry.ip.clone());
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_addressentry_set_ip(
    entry: *mut NativeAddressEntry,
    ip: *const NativeHostAddress,
) {
    let entry = &mut *entry;
    entry.make_mut().ip = HostAddressData::clone(&*ip);
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_addressentry_netmask(
    entry: *const NativeAddressEntry,
    out: *mut NativeHostAddress,
) {
    let entry = &*entry;
    write_address(out, entry.netmask());
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_addressentry_set_netmask(
    entry: *mut NativeAddressEntry,
    netmask: *const NativeHostAddress,
) {
    let entry = &mut *entry;
    entry.make_mut().set_netmask(&*netmask);
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_addressentry_broadcast(
    entry: *const NativeAddressEntry,
    out: *mut NativeHostAddress,
) {
    let entry = &*entry;
    write_address(out, entry.broadcast.clone());
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_addressentry_set_broadcast(
    entry: *mut NativeAddressEntry,
    broadcast: *const NativeHostAddress,
) {
    let entry = &mut *entry;
    entry.make_mut().broadcast = HostAddressData::clone(&*broadcast);
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_addressentry_prefix_length(entry: *const NativeAddressEntry) -> i32 {
    let entry = &*entry;
    entry.prefix_length
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_addressentry_set_prefix_length(
    entry: *mut NativeAddressEntry,
    length: i32,
) {
    let entry = &mut *entry;
    entry.make_mut().set_prefix_length(length);
}

/// Address lifetimes are not reported by `getifaddrs`, so every entry is
/// permanent.
#[no_mangle]
pub unsafe extern "C" fn netbridge_addressentry_is_permanent(_entry: *const NativeAddressEntry) -> bool {
    true
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_addressentry_is_lifetime_known(
    _entry: *const NativeAddressEntry,
) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_interface_is_listed() {
        let interfaces = all_interfaces();
        let Some(lo) = interfaces
            .iter()
            .find(|iface| iface.flags.contains(InterfaceFlags::IS_LOOP_BACK))
        else {
            return;
        };
        assert!(lo.index > 0);
        assert_eq!(lo.interface_type, Some(InterfaceType::Loopback));
    }

    #[test]
    fn test_netmask_follows_prefix_length() {
        let mut entry = AddressEntryData {
            ip: HostAddressData::parse("192.168.1.10"),
            ..AddressEntryData::default()
        };
        entry.set_prefix_length(24);
        assert_eq!(entry.netmask().display(), "255.255.255.0");

        entry.set_netmask(&HostAddressData::parse("255.255.0.0"));
        assert_eq!(entry.prefix_length, 16);

        entry.set_netmask(&HostAddressData::parse("255.0.255.0"));
        assert_eq!(entry.prefix_length, -1);

        entry.set_netmask(&HostAddressData::parse("ffff::"));
        assert_eq!(entry.prefix_length, -1);

        entry.set_prefix_length(33);
        assert_eq!(entry.prefix_length, -1);
    }

    #[test]
    fn test_hardware_address_format() {
        assert_eq!(hardware_address([0, 0x1a, 0x2b, 0x3c, 0x4d, 0xff]), "00:1A:2B:3C:4D:FF");
    }
}
