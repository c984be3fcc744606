//! HTTP header lists.

use std::ffi::c_void;
use std::fmt;

use bridge_traits::abi::Relocatable;
use bridge_traits::ffi::{ByteView, PushFn};
use bridge_traits::{assert_abi_contract, assert_same_layout};

use crate::bytearray::{ByteArray, ByteArrayView};
use crate::util::{collect, construct, shared_handle};

/// One borrowed `(name, value)` pair as it crosses the boundary.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct HeaderPair {
    pub name: ByteView,
    pub value: ByteView,
}

unsafe impl Relocatable for HeaderPair {}

assert_abi_contract!(Trivial, HeaderPair, { name: ByteView, value: ByteView });
assert_same_layout!(HeaderPair, bridge_native::NativeHeaderPair);

shared_handle! {
    /// Ordered list of HTTP header fields.
    ///
    /// Names are stored lower-cased and matched case-insensitively. Names
    /// must be RFC 9110 tokens and values valid field values; mutators
    /// return `false` and leave the list untouched otherwise.
    pub struct HttpHeaders => bridge_native::NativeHttpHeaders {
        default: netbridge_httpheaders_init_default,
        clone: netbridge_httpheaders_clone,
        drop: netbridge_httpheaders_drop,
        eq: netbridge_httpheaders_eq,
        ref_count: netbridge_httpheaders_ref_count,
        live: netbridge_httpheaders_live_payloads,
    }
}

extern "C" {
    fn netbridge_httpheaders_from_pairs(pairs: *const HeaderPair, len: usize, out: *mut HttpHeaders);
    fn netbridge_httpheaders_append(headers: *mut HttpHeaders, name: ByteView, value: ByteView) -> bool;
    fn netbridge_httpheaders_insert(
        headers: *mut HttpHeaders,
        index: usize,
        name: ByteView,
        value: ByteView,
    ) -> bool;
    fn netbridge_httpheaders_replace(
        headers: *mut HttpHeaders,
        index: usize,
        name: ByteView,
        value: ByteView,
    ) -> bool;
    fn netbridge_httpheaders_replace_or_append(
        headers: *mut HttpHeaders,
        name: ByteView,
        value: ByteView,
    ) -> bool;
    fn netbridge_httpheaders_remove_all(headers: *mut HttpHeaders, name: ByteView);
    fn netbridge_httpheaders_remove_at(headers: *mut HttpHeaders, index: usize);
    fn netbridge_httpheaders_clear(headers: *mut HttpHeaders);
    fn netbridge_httpheaders_reserve(headers: *mut HttpHeaders, size: usize);
    fn netbridge_httpheaders_contains(headers: *const HttpHeaders, name: ByteView) -> bool;
    fn netbridge_httpheaders_size(headers: *const HttpHeaders) -> usize;
    fn netbridge_httpheaders_value(headers: *const HttpHeaders, name: ByteView) -> ByteView;
    fn netbridge_httpheaders_values(
        headers: *const HttpHeaders,
        name: ByteView,
        push: PushFn,
        ctx: *mut c_void,
    ) -> usize;
    fn netbridge_httpheaders_combined_value(headers: *const HttpHeaders, name: ByteView, out: *mut ByteArray);
    fn netbridge_httpheaders_name_at(headers: *const HttpHeaders, index: usize) -> ByteView;
    fn netbridge_httpheaders_value_at(headers: *const HttpHeaders, index: usize) -> ByteView;
    fn netbridge_httpheaders_to_list_of_pairs(headers: *const HttpHeaders, push: PushFn, ctx: *mut c_void) -> usize;
}

unsafe extern "C" fn push_owned_pair(ctx: *mut c_void, item: *const c_void) {
    let pairs = &mut *ctx.cast::<Vec<(Vec<u8>, Vec<u8>)>>();
    let pair = *item.cast::<HeaderPair>();
    pairs.push((pair.name.as_slice().to_vec(), pair.value.as_slice().to_vec()));
}

fn view(bytes: &[u8]) -> ByteView {
    ByteView::from_slice(bytes)
}

impl HttpHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a list from pairs; invalid pairs are skipped.
    pub fn from_pairs<N, V>(pairs: &[(N, V)]) -> Self
    where
        N: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let raw: Vec<HeaderPair> = pairs
            .iter()
            .map(|(name, value)| HeaderPair {
                name: view(name.as_ref()),
                value: view(value.as_ref()),
            })
            .collect();
        unsafe { construct(|out| netbridge_httpheaders_from_pairs(raw.as_ptr(), raw.len(), out)) }
    }

    pub fn append(&mut self, name: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> bool {
        unsafe { netbridge_httpheaders_append(self, view(name.as_ref()), view(value.as_ref())) }
    }

    /// Inserts before `index`; `index == size()` appends.
    pub fn insert(&mut self, index: usize, name: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> bool {
        unsafe { netbridge_httpheaders_insert(self, index, view(name.as_ref()), view(value.as_ref())) }
    }

    pub fn replace(&mut self, index: usize, name: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> bool {
        unsafe { netbridge_httpheaders_replace(self, index, view(name.as_ref()), view(value.as_ref())) }
    }

    /// Keeps only the first field named `name`, with the new value.
    pub fn replace_or_append(&mut self, name: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> bool {
        unsafe { netbridge_httpheaders_replace_or_append(self, view(name.as_ref()), view(value.as_ref())) }
    }

    pub fn remove_all(&mut self, name: impl AsRef<[u8]>) {
        unsafe { netbridge_httpheaders_remove_all(self, view(name.as_ref())) }
    }

    /// Out-of-range indexes are ignored.
    pub fn remove_at(&mut self, index: usize) {
        unsafe { netbridge_httpheaders_remove_at(self, index) }
    }

    pub fn clear(&mut self) {
        unsafe { netbridge_httpheaders_clear(self) }
    }

    pub fn reserve(&mut self, size: usize) {
        unsafe { netbridge_httpheaders_reserve(self, size) }
    }

    pub fn contains(&self, name: impl AsRef<[u8]>) -> bool {
        unsafe { netbridge_httpheaders_contains(self, view(name.as_ref())) }
    }

    pub fn size(&self) -> usize {
        unsafe { netbridge_httpheaders_size(self) }
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// First value of `name`, borrowed from the list.
    pub fn value(&self, name: impl AsRef<[u8]>) -> Option<ByteArrayView<'_>> {
        let name = name.as_ref();
        if !self.contains(name) {
            return None;
        }
        let bytes = unsafe { netbridge_httpheaders_value(self, view(name)).as_slice() };
        Some(ByteArrayView::new(bytes))
    }

    pub fn values(&self, name: impl AsRef<[u8]>) -> Vec<ByteArray> {
        unsafe { collect(|push, ctx| netbridge_httpheaders_values(self, view(name.as_ref()), push, ctx)) }
    }

    /// All values of `name` joined with `", "`.
    pub fn combined_value(&self, name: impl AsRef<[u8]>) -> ByteArray {
        unsafe { construct(|out| netbridge_httpheaders_combined_value(self, view(name.as_ref()), out)) }
    }

    pub fn name_at(&self, index: usize) -> Option<ByteArrayView<'_>> {
        (index < self.size())
            .then(|| ByteArrayView::new(unsafe { netbridge_httpheaders_name_at(self, index).as_slice() }))
    }

    pub fn value_at(&self, index: usize) -> Option<ByteArrayView<'_>> {
        (index < self.size())
            .then(|| ByteArrayView::new(unsafe { netbridge_httpheaders_value_at(self, index).as_slice() }))
    }

    pub fn to_list_of_pairs(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut pairs = Vec::with_capacity(self.size());
        unsafe {
            netbridge_httpheaders_to_list_of_pairs(
                self,
                push_owned_pair,
                (&mut pairs as *mut Vec<(Vec<u8>, Vec<u8>)>).cast(),
            );
        }
        pairs
    }
}

impl fmt::Debug for HttpHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in self.to_list_of_pairs() {
            map.entry(
                &String::from_utf8_lossy(&name),
                &String::from_utf8_lossy(&value),
            );
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut headers = HttpHeaders::new();
        assert!(headers.append("Content-Type", "text/plain"));
        assert!(headers.contains("content-type"));
        assert_eq!(headers.name_at(0).unwrap().as_slice(), b"content-type");
        assert_eq!(headers.value("CONTENT-TYPE").unwrap().as_slice(), b"text/plain");
        assert!(headers.value("accept").is_none());
    }

    #[test]
    fn test_invalid_fields_are_rejected() {
        let mut headers = HttpHeaders::new();
        assert!(!headers.append("bad name", "x"));
        assert!(!headers.append("x-ok", "line\nbreak"));
        assert!(headers.is_empty());
    }

    #[test]
    fn test_combined_value_and_replace_or_append() {
        let mut headers = HttpHeaders::from_pairs(&[("accept", "a"), ("x", "1"), ("Accept", "b")]);
        assert_eq!(headers.combined_value("accept").as_slice(), b"a, b");
        assert_eq!(headers.values("accept").len(), 2);

        assert!(headers.replace_or_append("accept", "c"));
        assert_eq!(
            headers.to_list_of_pairs(),
            vec![
                (b"accept".to_vec(), b"c".to_vec()),
                (b"x".to_vec(), b"1".to_vec()),
            ]
        );
    }

    #[test]
    fn test_insert_replace_remove() {
        let mut headers = HttpHeaders::from_pairs(&[("a", "1"), ("c", "3")]);
        assert!(headers.insert(1, "b", "2"));
        assert!(!headers.insert(9, "z", "9"));
        assert!(headers.replace(0, "a", "one"));
        headers.remove_at(2);
        headers.remove_all("B");
        assert_eq!(headers.size(), 1);
        assert_eq!(headers.value_at(0).unwrap().as_slice(), b"one");
        assert!(headers.value_at(1).is_none());
    }
}
