use std::fmt;

use bridge_traits::ffi::{ByteView, EncodingFormat, KeyAlgorithm, KeyType};
use tracing::debug;

use crate::bytearray::ByteArray;
use crate::util::{construct, shared_handle};

shared_handle! {
    /// A public or private key. Passphrase-protected keys load as null.
    pub struct SslKey => bridge_native::NativeSslKey {
        default: netbridge_sslkey_init_default,
        clone: netbridge_sslkey_clone,
        drop: netbridge_sslkey_drop,
        eq: netbridge_sslkey_eq,
        ref_count: netbridge_sslkey_ref_count,
        live: netbridge_sslkey_live_payloads,
    }
}

extern "C" {
    fn netbridge_sslkey_from_data(
        encoded: ByteView,
        algorithm: KeyAlgorithm,
        format: EncodingFormat,
        key_type: KeyType,
        out: *mut SslKey,
    );
    fn netbridge_sslkey_algorithm(key: *const SslKey) -> KeyAlgorithm;
    fn netbridge_sslkey_type(key: *const SslKey) -> KeyType;
    fn netbridge_sslkey_length(key: *const SslKey) -> i32;
    fn netbridge_sslkey_is_null(key: *const SslKey) -> bool;
    fn netbridge_sslkey_clear(key: *mut SslKey);
    fn netbridge_sslkey_to_der(key: *const SslKey, out: *mut ByteArray);
    fn netbridge_sslkey_to_pem(key: *const SslKey, out: *mut ByteArray);
}

impl SslKey {
    /// Loads a key; the result is null when `encoded` is not a key of the
    /// given algorithm and type.
    pub fn from_data(encoded: &[u8], algorithm: KeyAlgorithm, format: EncodingFormat, key_type: KeyType) -> Self {
        unsafe {
            construct(|out| {
                netbridge_sslkey_from_data(ByteView::from_slice(encoded), algorithm, format, key_type, out)
            })
        }
    }

    /// Like [`from_data`](Self::from_data), with `None` for a null key.
    pub fn parse(encoded: &[u8], algorithm: KeyAlgorithm, format: EncodingFormat, key_type: KeyType) -> Option<Self> {
        let key = Self::from_data(encoded, algorithm, format, key_type);
        if key.is_null() {
            debug!(?algorithm, ?key_type, "No key in input");
            return None;
        }
        Some(key)
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        unsafe { netbridge_sslkey_algorithm(self) }
    }

    pub fn key_type(&self) -> KeyType {
        unsafe { netbridge_sslkey_type(self) }
    }

    /// Size in bits, `-1` for a null key.
    pub fn length(&self) -> i32 {
        unsafe { netbridge_sslkey_length(self) }
    }

    pub fn is_null(&self) -> bool {
        unsafe { netbridge_sslkey_is_null(self) }
    }

    pub fn clear(&mut self) {
        unsafe { netbridge_sslkey_clear(self) }
    }

    pub fn to_der(&self) -> ByteArray {
        unsafe { construct(|out| netbridge_sslkey_to_der(self, out)) }
    }

    pub fn to_pem(&self) -> ByteArray {
        unsafe { construct(|out| netbridge_sslkey_to_pem(self, out)) }
    }
}

impl fmt::Debug for SslKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SslKey")
            .field("algorithm", &self.algorithm())
            .field("type", &self.key_type())
            .field("length", &self.length())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_loads_null() {
        let key = SslKey::from_data(b"nope", KeyAlgorithm::Rsa, EncodingFormat::Pem, KeyType::PrivateKey);
        assert!(key.is_null());
        assert_eq!(key.length(), -1);
        assert!(key.to_pem().is_empty());
        assert!(SslKey::parse(b"nope", KeyAlgorithm::Rsa, EncodingFormat::Der, KeyType::PublicKey).is_none());
    }

    #[test]
    fn test_default_key_is_null() {
        let mut key = SslKey::default();
        assert!(key.is_null());
        key.clear();
        assert!(key.to_der().is_empty());
    }
}
