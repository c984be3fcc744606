//! # Native Network Toolkit
//!
//! The toolkit side of the bridge: value types, devices, sockets and
//! certificates exported as `netbridge_*` C entry points.
//!
//! ## Overview
//!
//! Every value type comes in one of three shapes (see
//! [`bridge_traits::abi`]):
//! - Trivial records such as [`NativeDeadlineTimer`] and [`NativeIpv6Address`]
//! - Implicitly shared handles built on [`Shared`], one pointer to a
//!   reference-counted payload with copy-on-write mutation
//! - Cursors such as [`NativeAltNamesCursor`], a `(pos, end)` pair into a
//!   payload owned by some handle
//!
//! Objects with identity (event loops, devices, TCP and UDP sockets, hashes)
//! are heap allocated with a `_new`/`_delete` pair.
//!
//! ## Calling Convention
//!
//! - Values are returned through `*mut T` out-params that the callee writes
//!   without reading or dropping the previous contents
//! - Lists are handed to a [`PushFn`](bridge_traits::ffi::PushFn) one
//!   borrowed item at a time
//! - Byte strings go in as [`ByteView`](bridge_traits::ffi::ByteView)s
//!
//! ## Features
//!
//! `fs`, `net` and `ssl` gate the same groups of entry points as the host
//! crate's features. `fs` pulls in `tempfile`, `net` pulls in `cookie` and
//! `url`, `ssl` adds `x509-parser` and `base64`.

#![allow(clippy::missing_safety_doc)]

mod handle;

pub mod bytearray;
pub mod deadline;
pub mod eventloop;
pub mod hash;

#[cfg(feature = "net")]
pub mod cookie;
#[cfg(feature = "net")]
pub mod datagram;
#[cfg(feature = "net")]
pub mod headers;
#[cfg(feature = "net")]
pub mod hostaddress;
#[cfg(feature = "net")]
pub mod interface;
#[cfg(feature = "fs")]
pub mod iodevice;
#[cfg(feature = "net")]
pub mod socket;
#[cfg(feature = "ssl")]
pub mod ssl;
#[cfg(feature = "net")]
pub mod udp;

pub use bytearray::NativeByteArray;
pub use deadline::NativeDeadlineTimer;
pub use eventloop::NativeEventLoop;
pub use handle::{Payload, PayloadCounter, Shared};
pub use hash::NativeCryptographicHash;

#[cfg(feature = "net")]
pub use cookie::NativeNetworkCookie;
#[cfg(feature = "net")]
pub use datagram::NativeNetworkDatagram;
#[cfg(feature = "net")]
pub use headers::{NativeHeaderPair, NativeHttpHeaders};
#[cfg(feature = "net")]
pub use hostaddress::{NativeHostAddress, NativeIpv6Address};
#[cfg(feature = "net")]
pub use interface::{NativeAddressEntry, NativeNetworkInterface};
#[cfg(feature = "fs")]
pub use iodevice::NativeIoDevice;
#[cfg(feature = "net")]
pub use socket::{NativeSocketDescriptor, NativeTcpServer, NativeTcpSocket};
#[cfg(feature = "net")]
pub use udp::NativeUdpSocket;
#[cfg(feature = "ssl")]
pub use ssl::altnames::{NativeAltNamesCursor, NativeAlternativeNames};
#[cfg(feature = "ssl")]
pub use ssl::certificate::NativeSslCertificate;
#[cfg(feature = "ssl")]
pub use ssl::key::NativeSslKey;
