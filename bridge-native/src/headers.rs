//! HTTP header list.
//!
//! An ordered list of `(name, value)` pairs. Names are validated as RFC 9110
//! tokens and stored lower-cased; values are stored with surrounding
//! whitespace removed.

use std::ffi::c_void;

use bridge_traits::abi::Relocatable;
use bridge_traits::assert_abi_contract;
use bridge_traits::ffi::{ByteView, PushFn};
use tracing::warn;

use crate::bytearray::{push_all, write_bytes, NativeByteArray};
use crate::handle::{export_shared_handle, payload, Shared};

/// Borrowed `(name, value)` pair.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NativeHeaderPair {
    pub name: ByteView,
    pub value: ByteView,
}

unsafe impl Relocatable for NativeHeaderPair {}

assert_abi_contract!(Trivial, NativeHeaderPair, { name: ByteView, value: ByteView });

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpHeadersData {
    pub entries: Vec<(Vec<u8>, Vec<u8>)>,
}

payload!(HttpHeadersData, "HttpHeaders");

pub type NativeHttpHeaders = Shared<HttpHeadersData>;

assert_abi_contract!(SharedHandle, NativeHttpHeaders, { d: usize });

fn is_tchar(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&byte)
}

fn normalize_name(name: &[u8]) -> Option<Vec<u8>> {
    (!name.is_empty() && name.iter().copied().all(is_tchar)).then(|| name.to_ascii_lowercase())
}

fn normalize_value(value: &[u8]) -> Option<Vec<u8>> {
    let valid = value
        .iter()
        .all(|&b| b == b'\t' || b == b' ' || (0x21..=0x7e).contains(&b) || b >= 0x80);
    if !valid {
        return None;
    }
    let start = value.iter().position(|b| !matches!(b, b' ' | b'\t'));
    let end = value.iter().rposition(|b| !matches!(b, b' ' | b'\t'));
    Some(match (start, end) {
        (Some(start), Some(end)) => value[start..=end].to_vec(),
        _ => Vec::new(),
    })
}

fn validated(name: &[u8], value: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    match (normalize_name(name), normalize_value(value)) {
        (Some(name), Some(value)) => Some((name, value)),
        _ => {
            warn!(
                name = %String::from_utf8_lossy(name),
                "Rejected invalid HTTP header"
            );
            None
        }
    }
}

impl HttpHeadersData {
    fn matching<'a>(&'a self, name: &'a [u8]) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.entries
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_slice())
    }

    pub fn append(&mut self, name: &[u8], value: &[u8]) -> bool {
        match validated(name, value) {
            Some(entry) => {
                self.entries.push(entry);
                true
            }
            None => false,
        }
    }

    pub fn insert(&mut self, index: usize, name: &[u8], value: &[u8]) -> bool {
        if index > self.entries.len() {
            return false;
        }
        match validated(name, value) {
            Some(entry) => {
                self.entries.insert(index, entry);
                true
            }
            None => false,
        }
    }

    pub fn replace(&mut self, index: usize, name: &[u8], value: &[u8]) -> bool {
        if index >= self.entries.len() {
            return false;
        }
        match validated(name, value) {
            Some(entry) => {
                self.entries[index] = entry;
                true
            }
            None => false,
        }
    }

    /// Replaces the first entry named `name` and drops the others, or
    /// appends when there is none.
    pub fn replace_or_append(&mut self, name: &[u8], value: &[u8]) -> bool {
        let Some((name, value)) = validated(name, value) else {
            return false;
        };
        match self.entries.iter().position(|(key, _)| *key == name) {
            Some(first) => {
                self.entries[first].1 = value;
                let mut index = 0;
                self.entries.retain(|(key, _)| {
                    let keep = index <= first || *key != name;
                    index += 1;
                    keep
                });
            }
            None => self.entries.push((name, value)),
        }
        true
    }

    pub fn remove_all(&mut self, name: &[u8]) {
        self.entries.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
    }

    pub fn combined_value(&self, name: &[u8]) -> Vec<u8> {
        self.matching(name).collect::<Vec<_>>().join(&b", "[..])
    }
}

export_shared_handle!(NativeHttpHeaders {
    default: netbridge_httpheaders_init_default,
    clone: netbridge_httpheaders_clone,
    drop: netbridge_httpheaders_drop,
    eq: netbridge_httpheaders_eq,
    ref_count: netbridge_httpheaders_ref_count,
    live: netbridge_httpheaders_live_payloads,
});

/// Builds a header list from `len` pairs; invalid pairs are skipped.
#[no_mangle]
pub unsafe extern "C" fn netbridge_httpheaders_from_pairs(
    pairs: *const NativeHeaderPair,
    len: usize,
    out: *mut NativeHttpHeaders,
) {
    let mut data = HttpHeadersData::default();
    if !pairs.is_null() {
        for pair in std::slice::from_raw_parts(pairs, len) {
            data.append(pair.name.as_slice(), pair.value.as_slice());
        }
    }
    out.write(Shared::new(data));
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_httpheaders_append(
    headers: *mut NativeHttpHeaders,
    name: ByteView,
    value: ByteView,
) -> bool {
    let headers = &mut *headers;
    headers
        .make_mut()
        .append(name.as_slice(), value.as_slice())
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_httpheaders_insert(
    headers: *mut NativeHttpHeaders,
    index: usize,
    name: ByteView,
    value: ByteView,
) -> bool {
    let headers = &mut *headers;
    headers
        .make_mut()
        .insert(index, name.as_slice(), value.as_slice())
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_httpheaders_replace(
    headers: *mut NativeHttpHeaders,
    index: usize,
    name: ByteView,
    value: ByteView,
) -> bool {
    let headers = &mut *headers;
    headers
        .make_mut()
        .replace(index, name.as_slice(), value.as_slice())
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_httpheaders_replace_or_append(
    headers: *mut NativeHttpHeaders,
    name: ByteView,
    value: ByteView,
) -> bool {
    let headers = &mut *headers;
    headers
        .make_mut()
        .replace_or_append(name.as_slice(), value.as_slice())
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_httpheaders_remove_all(
    headers: *mut NativeHttpHeaders,
    name: ByteView,
) {
    let headers = &mut *headers;
    headers.make_mut().remove_all(name.as_slice());
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_httpheaders_remove_at(headers: *mut NativeHttpHeaders, index: usize) {
    let headers = &mut *headers;
    if index < headers.entries.len() {
        headers.make_mut().entries.remove(index);
    }
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_httpheaders_clear(headers: *mut NativeHttpHeaders) {
    let headers = &mut *headers;
    headers.make_mut().entries.clear();
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_httpheaders_reserve(headers: *mut NativeHttpHeaders, size: usize) {
    let headers = &mut *headers;
    let entries = &mut headers.make_mut().entries;
    entries.reserve(size.saturating_sub(entries.len()));
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_httpheaders_contains(
    headers: *const NativeHttpHeaders,
    name: ByteView,
) -> bool {
    let headers = &*headers;
    headers.matching(name.as_slice()).next().is_some()
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_httpheaders_size(headers: *const NativeHttpHeaders) -> usize {
    let headers = &*headers;
    headers.entries.len()
}

/// First value of `name`, or an empty view.
#[no_mangle]
pub unsafe extern "C" fn netbridge_httpheaders_value(
    headers: *const NativeHttpHeaders,
    name: ByteView,
) -> ByteView {
    let headers = &*headers;
    headers
        .matching(name.as_slice())
        .next()
        .map(ByteView::from_slice)
        .unwrap_or_else(ByteView::empty)
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_httpheaders_values(
    headers: *const NativeHttpHeaders,
    name: ByteView,
    push: PushFn,
    ctx: *mut c_void,
) -> usize {
    let headers = &*headers;
    push_all(headers.matching(name.as_slice()), push, ctx)
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_httpheaders_combined_value(
    headers: *const NativeHttpHeaders,
    name: ByteView,
    out: *mut NativeByteArray,
) {
    let headers = &*headers;
    write_bytes(out, headers.combined_value(name.as_slice()));
}

/// Empty view when `index` is out of range.
#[no_mangle]
pub unsafe extern "C" fn netbridge_httpheaders_name_at(
    headers: *const NativeHttpHeaders,
    index: usize,
) -> ByteView {
    let headers = &*headers;
    headers
        .entries
        .get(index)
        .map(|(name, _)| ByteView::from_slice(name))
        .unwrap_or_else(ByteView::empty)
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_httpheaders_value_at(
    headers: *const NativeHttpHeaders,
    index: usize,
) -> ByteView {
    let headers = &*headers;
    headers
        .entries
        .get(index)
        .map(|(_, value)| ByteView::from_slice(value))
        .unwrap_or_else(ByteView::empty)
}

/// Pushes every entry as a borrowed [`NativeHeaderPair`].
#[no_mangle]
pub unsafe extern "C" fn netbridge_httpheaders_to_list_of_pairs(
    headers: *const NativeHttpHeaders,
    push: PushFn,
    ctx: *mut c_void,
) -> usize {
    let headers = &*headers;
    for (name, value) in &headers.entries {
        let pair = NativeHeaderPair {
            name: ByteView::from_slice(name),
            value: ByteView::from_slice(value),
        };
        push(ctx, (&pair as *const NativeHeaderPair).cast());
    }
    headers.entries.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_lower_cased_and_validated() {
        let mut headers = HttpHeadersData::default();
        assert!(headers.append(b"Content-Type", b"  text/plain "));
        assert!(!headers.append(b"Bad Name", b"x"));
        assert!(!headers.append(b"x-ok", b"line\r\nbreak"));
        assert_eq!(headers.entries, vec![(b"content-type".to_vec(), b"text/plain".to_vec())]);
    }

    #[test]
    fn test_combined_value_and_replace_or_append() {
        let mut headers = HttpHeadersData::default();
        headers.append(b"accept", b"text/html");
        headers.append(b"x-a", b"1");
        headers.append(b"Accept", b"application/json");
        assert_eq!(headers.combined_value(b"ACCEPT"), b"text/html, application/json");

        assert!(headers.replace_or_append(b"accept", b"*/*"));
        assert_eq!(headers.entries.len(), 2);
        assert_eq!(headers.entries[0].1, b"*/*");

        assert!(headers.replace_or_append(b"x-b", b"2"));
        assert_eq!(headers.entries.len(), 3);
    }

    #[test]
    fn test_insert_and_replace_bounds() {
        let mut headers = HttpHeadersData::default();
        assert!(!headers.replace(0, b"a", b"1"));
        assert!(headers.insert(0, b"b", b"2"));
        assert!(headers.insert(0, b"a", b"1"));
        assert!(!headers.insert(5, b"c", b"3"));
        assert_eq!(headers.entries[0].0, b"a");
        headers.remove_all(b"A");
        assert_eq!(headers.entries.len(), 1);
    }
}
