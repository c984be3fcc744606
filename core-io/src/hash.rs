use std::io;

use bridge_traits::ffi::{ByteView, CryptographicHashAlgorithm};

use crate::bytearray::ByteArray;
use crate::util::{construct, owned_object};

owned_object! {
    /// Incremental SHA-2 digest.
    pub struct CryptographicHash(RawCryptographicHash) {
        delete: netbridge_hash_delete,
    }
}

extern "C" {
    fn netbridge_hash_new(algorithm: CryptographicHashAlgorithm) -> *mut RawCryptographicHash;
    fn netbridge_hash_add_data(hash: *mut RawCryptographicHash, data: ByteView);
    fn netbridge_hash_result(hash: *const RawCryptographicHash, out: *mut ByteArray);
    fn netbridge_hash_reset(hash: *mut RawCryptographicHash);
    fn netbridge_hash_algorithm(hash: *const RawCryptographicHash) -> CryptographicHashAlgorithm;
    fn netbridge_hash_hash(data: ByteView, algorithm: CryptographicHashAlgorithm, out: *mut ByteArray);
    fn netbridge_hash_length(algorithm: CryptographicHashAlgorithm) -> i32;
}

impl CryptographicHash {
    pub fn new(algorithm: CryptographicHashAlgorithm) -> Self {
        let raw = unsafe { netbridge_hash_new(algorithm) };
        Self::from_raw(raw).unwrap_or_else(|| std::process::abort())
    }

    pub fn add_data(&mut self, data: &[u8]) {
        unsafe { netbridge_hash_add_data(self.as_mut_ptr(), ByteView::from_slice(data)) }
    }

    /// Digest so far. Data added afterwards extends the same stream.
    pub fn result(&self) -> ByteArray {
        unsafe { construct(|out| netbridge_hash_result(self.as_ptr(), out)) }
    }

    pub fn reset(&mut self) {
        unsafe { netbridge_hash_reset(self.as_mut_ptr()) }
    }

    pub fn algorithm(&self) -> CryptographicHashAlgorithm {
        unsafe { netbridge_hash_algorithm(self.as_ptr()) }
    }

    pub fn hash(data: &[u8], algorithm: CryptographicHashAlgorithm) -> ByteArray {
        unsafe { construct(|out| netbridge_hash_hash(ByteView::from_slice(data), algorithm, out)) }
    }

    /// Digest size in bytes.
    pub fn hash_length(algorithm: CryptographicHashAlgorithm) -> usize {
        unsafe { netbridge_hash_length(algorithm) as usize }
    }
}

impl io::Write for CryptographicHash {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.add_data(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_streaming_matches_one_shot() {
        let mut hash = CryptographicHash::new(CryptographicHashAlgorithm::Sha384);
        hash.write_all(b"hello ").unwrap();
        hash.add_data(b"world");
        let one_shot = CryptographicHash::hash(b"hello world", CryptographicHashAlgorithm::Sha384);
        assert_eq!(hash.result(), one_shot);
        assert_eq!(one_shot.len(), CryptographicHash::hash_length(hash.algorithm()));
    }

    #[test]
    fn test_reset_starts_over() {
        let mut hash = CryptographicHash::new(CryptographicHashAlgorithm::Sha256);
        hash.add_data(b"junk");
        hash.reset();
        hash.add_data(b"abc");
        assert_eq!(
            hash.result().as_slice()[..4],
            [0xba, 0x78, 0x16, 0xbf]
        );
    }
}
