//! Certificates, keys and subject alternative names.
//!
//! Everything here is parsed, never verified: signatures and chains are not
//! checked.

mod altnames;
mod certificate;
mod key;

pub use altnames::{AltNamesIter, AltNamesKeys, AltNamesValues, AlternativeNames};
pub use certificate::SslCertificate;
pub use key::SslKey;
