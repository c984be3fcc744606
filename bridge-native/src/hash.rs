//! Incremental SHA-2 hashing.

use bridge_traits::ffi::{ByteView, CryptographicHashAlgorithm};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use crate::bytearray::{write_bytes, NativeByteArray};

#[derive(Clone)]
enum State {
    Sha224(Sha224),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

#[derive(Clone)]
pub struct NativeCryptographicHash {
    algorithm: CryptographicHashAlgorithm,
    state: State,
}

impl NativeCryptographicHash {
    pub fn new(algorithm: CryptographicHashAlgorithm) -> Self {
        let state = match algorithm {
            CryptographicHashAlgorithm::Sha224 => State::Sha224(Sha224::new()),
            CryptographicHashAlgorithm::Sha256 => State::Sha256(Sha256::new()),
            CryptographicHashAlgorithm::Sha384 => State::Sha384(Sha384::new()),
            CryptographicHashAlgorithm::Sha512 => State::Sha512(Sha512::new()),
        };
        Self { algorithm, state }
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            State::Sha224(hasher) => hasher.update(data),
            State::Sha256(hasher) => hasher.update(data),
            State::Sha384(hasher) => hasher.update(data),
            State::Sha512(hasher) => hasher.update(data),
        }
    }

    /// Digest of everything added so far; more data may still be added.
    pub fn result(&self) -> Vec<u8> {
        match self.state.clone() {
            State::Sha224(hasher) => hasher.finalize().to_vec(),
            State::Sha256(hasher) => hasher.finalize().to_vec(),
            State::Sha384(hasher) => hasher.finalize().to_vec(),
            State::Sha512(hasher) => hasher.finalize().to_vec(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.algorithm);
    }

    pub fn digest(algorithm: CryptographicHashAlgorithm, data: &[u8]) -> Vec<u8> {
        let mut hash = Self::new(algorithm);
        hash.update(data);
        hash.result()
    }
}

#[no_mangle]
pub extern "C" fn netbridge_hash_new(algorithm: CryptographicHashAlgorithm) -> *mut NativeCryptographicHash {
    Box::into_raw(Box::new(NativeCryptographicHash::new(algorithm)))
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_hash_delete(hash: *mut NativeCryptographicHash) {
    if !hash.is_null() {
        drop(Box::from_raw(hash));
    }
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_hash_add_data(hash: *mut NativeCryptographicHash, data: ByteView) {
    (*hash).update(data.as_slice());
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_hash_result(
    hash: *const NativeCryptographicHash,
    out: *mut NativeByteArray,
) {
    write_bytes(out, (*hash).result());
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_hash_reset(hash: *mut NativeCryptographicHash) {
    (*hash).reset();
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_hash_algorithm(
    hash: *const NativeCryptographicHash,
) -> CryptographicHashAlgorithm {
    (*hash).algorithm
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_hash_hash(
    data: ByteView,
    algorithm: CryptographicHashAlgorithm,
    out: *mut NativeByteArray,
) {
    write_bytes(out, NativeCryptographicHash::digest(algorithm, data.as_slice()));
}

#[no_mangle]
pub extern "C" fn netbridge_hash_length(algorithm: CryptographicHashAlgorithm) -> i32 {
    match algorithm {
        CryptographicHashAlgorithm::Sha224 => 28,
        CryptographicHashAlgorithm::Sha256 => 32,
        CryptographicHashAlgorithm::Sha384 => 48,
        CryptographicHashAlgorithm::Sha512 => 64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut hash = NativeCryptographicHash::new(CryptographicHashAlgorithm::Sha256);
        hash.update(b"a");
        hash.update(b"bc");
        assert_eq!(hex(&hash.result()), ABC_SHA256);
        assert_eq!(
            NativeCryptographicHash::digest(CryptographicHashAlgorithm::Sha256, b"abc"),
            hash.result()
        );
    }

    #[test]
    fn test_reset_and_lengths() {
        let mut hash = NativeCryptographicHash::new(CryptographicHashAlgorithm::Sha384);
        hash.update(b"junk");
        hash.reset();
        hash.update(b"abc");
        assert_eq!(
            hash.result(),
            NativeCryptographicHash::digest(CryptographicHashAlgorithm::Sha384, b"abc")
        );
        for algorithm in [
            CryptographicHashAlgorithm::Sha224,
            CryptographicHashAlgorithm::Sha512,
        ] {
            let len = NativeCryptographicHash::digest(algorithm, b"").len();
            assert_eq!(len as i32, netbridge_hash_length(algorithm));
        }
    }
}
