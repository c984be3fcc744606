//! Addresses, HTTP value types, interfaces, TCP and UDP.

mod cookie;
mod datagram;
mod headers;
mod hostaddress;
mod interface;
mod socket;
mod udp;

pub use cookie::NetworkCookie;
pub use datagram::NetworkDatagram;
pub use headers::{HeaderPair, HttpHeaders};
pub use hostaddress::{HostAddress, Ipv6AddrBytes};
pub use interface::{NetworkAddressEntry, NetworkInterface};
pub use socket::{SocketDescriptor, TcpServer, TcpSocket};
pub use udp::UdpSocket;
