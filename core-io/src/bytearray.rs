//! Byte arrays and borrowed byte views.

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;

use bridge_traits::abi::Relocatable;
use bridge_traits::assert_abi_contract;
use bridge_traits::ffi::ByteView;

use crate::util::{construct, shared_handle};

shared_handle! {
    /// Implicitly shared, copy-on-write byte array.
    pub struct ByteArray => bridge_native::NativeByteArray {
        default: netbridge_bytearray_init_default,
        clone: netbridge_bytearray_clone,
        drop: netbridge_bytearray_drop,
        eq: netbridge_bytearray_eq,
        ref_count: netbridge_bytearray_ref_count,
        live: netbridge_bytearray_live_payloads,
    }
}

extern "C" {
    fn netbridge_bytearray_from_view(view: ByteView, out: *mut ByteArray);
    fn netbridge_bytearray_data(array: *const ByteArray) -> ByteView;
    fn netbridge_bytearray_append(array: *mut ByteArray, view: ByteView);
    fn netbridge_bytearray_clear(array: *mut ByteArray);
}

impl ByteArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        unsafe { construct(|out| netbridge_bytearray_from_view(ByteView::from_slice(bytes), out)) }
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { netbridge_bytearray_data(self).as_slice() }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Appends, detaching from other handles first.
    pub fn append(&mut self, bytes: &[u8]) {
        unsafe { netbridge_bytearray_append(self, ByteView::from_slice(bytes)) }
    }

    pub fn clear(&mut self) {
        unsafe { netbridge_bytearray_clear(self) }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_slice())
    }

    pub fn view(&self) -> ByteArrayView<'_> {
        ByteArrayView::new(self.as_slice())
    }
}

impl AsRef<[u8]> for ByteArray {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl From<&[u8]> for ByteArray {
    fn from(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<&str> for ByteArray {
    fn from(text: &str) -> Self {
        Self::from_bytes(text.as_bytes())
    }
}

impl PartialEq<[u8]> for ByteArray {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_slice() == other
    }
}

impl PartialEq<&[u8]> for ByteArray {
    fn eq(&self, other: &&[u8]) -> bool {
        self.as_slice() == *other
    }
}

impl fmt::Debug for ByteArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteArray({:?})", self.to_string_lossy())
    }
}

/// Borrowed, non-owning view of bytes, passed across the boundary by value.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ByteArrayView<'a> {
    data: *const u8,
    len: usize,
    _bytes: PhantomData<&'a [u8]>,
}

unsafe impl Relocatable for ByteArrayView<'_> {}

assert_abi_contract!(Trivial, ByteArrayView<'static>, { data: *const u8, len: usize });

impl<'a> ByteArrayView<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            data: bytes.as_ptr(),
            len: bytes.len(),
            _bytes: PhantomData,
        }
    }

    pub fn as_slice(&self) -> &'a [u8] {
        // SAFETY: built from a slice that outlives 'a.
        unsafe { ByteView::from(*self).as_slice() }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<'a> From<&'a [u8]> for ByteArrayView<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::new(bytes)
    }
}

impl<'a> From<&'a str> for ByteArrayView<'a> {
    fn from(text: &'a str) -> Self {
        Self::new(text.as_bytes())
    }
}

impl From<ByteArrayView<'_>> for ByteView {
    fn from(view: ByteArrayView<'_>) -> Self {
        ByteView {
            data: view.data,
            len: view.len,
        }
    }
}

impl fmt::Debug for ByteArrayView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ByteArrayView")
            .field(&String::from_utf8_lossy(self.as_slice()))
            .finish()
    }
}

/// Copies a native byte-array out-param into an owned string.
pub(crate) unsafe fn string_from(fill: impl FnOnce(*mut ByteArray)) -> String {
    construct(fill).to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_then_append_detaches() {
        let original = ByteArray::from_bytes(b"abc");
        let mut copy = original.clone();
        assert_eq!(original.ref_count(), 2);

        copy.append(b"def");

        assert_eq!(original.as_slice(), b"abc");
        assert_eq!(copy.as_slice(), b"abcdef");
        assert_eq!(original.ref_count(), 1);
        assert_ne!(original, copy);
    }

    #[test]
    fn test_view_borrows_without_copying() {
        let bytes = b"payload".to_vec();
        let view = ByteArrayView::new(&bytes);
        let copied = view;
        assert_eq!(copied.as_slice().as_ptr(), bytes.as_ptr());
        assert_eq!(view.len(), 7);
    }

    #[test]
    fn test_default_is_empty() {
        let mut array = ByteArray::new();
        assert!(array.is_empty());
        array.append(b"x");
        array.clear();
        assert!(array.is_empty());
    }
}
