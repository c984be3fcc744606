//! # Host Bindings
//!
//! Safe host-side types over the `netbridge_*` entry points.
//!
//! ## Overview
//!
//! Every type here is declared against its own opaque layout and calls the
//! toolkit only through `extern "C"` symbols. Each one carries a compile-time
//! ABI contract and a layout check against the toolkit's view of it:
//! - Shared handles ([`ByteArray`], [`net::HostAddress`], ...) clone and drop
//!   through the toolkit's reference counting
//! - Trivial values ([`DeadlineTimer`], [`ByteArrayView`], ...) are copied
//! - Cursors ([`ssl::AltNamesIter`], ...) borrow the map they walk
//!
//! Objects with identity ([`EventLoop`], sockets, devices, hashes) own a
//! heap-allocated toolkit object and are move-only.
//!
//! ## Features
//!
//! - `fs` - [`device::Buffer`], [`device::File`] and [`device::TemporaryFile`]
//! - `net` - addresses, HTTP headers, cookies, interfaces, TCP and UDP
//! - `ssl` - certificates, keys and alternative names (implies `net`)

// Links the toolkit's exported symbols into the final binary.
extern crate bridge_native as _;

mod util;

pub mod bytearray;
pub mod deadline;
pub mod eventloop;
pub mod hash;

#[cfg(feature = "fs")]
pub mod device;
#[cfg(feature = "net")]
pub mod net;
#[cfg(feature = "ssl")]
pub mod ssl;

use bridge_traits::ContractInfo;

pub use bytearray::{ByteArray, ByteArrayView};
pub use deadline::DeadlineTimer;
pub use eventloop::EventLoop;
pub use hash::CryptographicHash;

#[cfg(feature = "fs")]
pub use device::{Buffer, File, IoDevice, TemporaryFile};

/// ABI contracts of every bridged value type in this build.
pub fn contracts() -> Vec<ContractInfo> {
    #[allow(unused_mut)]
    let mut contracts = vec![
        ContractInfo::of::<ByteArray>(),
        ContractInfo::of::<ByteArrayView<'static>>(),
        ContractInfo::of::<DeadlineTimer>(),
    ];

    #[cfg(feature = "net")]
    contracts.extend([
        ContractInfo::of::<net::Ipv6AddrBytes>(),
        ContractInfo::of::<net::HostAddress>(),
        ContractInfo::of::<net::HeaderPair>(),
        ContractInfo::of::<net::HttpHeaders>(),
        ContractInfo::of::<net::NetworkCookie>(),
        ContractInfo::of::<net::NetworkDatagram>(),
        ContractInfo::of::<net::NetworkAddressEntry>(),
        ContractInfo::of::<net::NetworkInterface>(),
        ContractInfo::of::<net::SocketDescriptor>(),
    ]);

    #[cfg(feature = "ssl")]
    contracts.extend([
        ContractInfo::of::<ssl::SslCertificate>(),
        ContractInfo::of::<ssl::SslKey>(),
        ContractInfo::of::<ssl::AlternativeNames>(),
        ContractInfo::of::<ssl::AltNamesIter<'static>>(),
        ContractInfo::of::<ssl::AltNamesKeys<'static>>(),
        ContractInfo::of::<ssl::AltNamesValues<'static>>(),
    ]);

    contracts
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::ValueShape;

    #[test]
    fn test_contract_report_covers_every_shape() {
        let contracts = contracts();
        assert!(contracts.iter().any(|c| c.shape == ValueShape::Trivial));
        assert!(contracts.iter().any(|c| c.shape == ValueShape::SharedHandle));
        #[cfg(feature = "ssl")]
        assert!(contracts.iter().any(|c| c.shape == ValueShape::Cursor));

        let handle = contracts.iter().find(|c| c.name == "ByteArray").unwrap();
        assert_eq!(handle.layout.size, std::mem::size_of::<usize>());
    }
}
