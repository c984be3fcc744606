//! Subject alternative names as a multimap from entry type to value.
//!
//! Entries are kept sorted by type, equal types in certificate order. A
//! cursor is a `(pos, end)` pair of entry pointers. It starts one slot before
//! its first element and is only dereferenced after `advance` returned
//! `true`. Cursors borrow the payload of the map they were made from and are
//! invalidated by any change to it.

use std::ffi::c_void;

use bridge_traits::abi::Relocatable;
use bridge_traits::assert_abi_contract;
use bridge_traits::ffi::{AlternativeNameEntryType, ByteView, PushFn};

use crate::bytearray::push_all;
use crate::handle::{export_shared_handle, payload, Shared};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltNameEntry {
    pub kind: AlternativeNameEntryType,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlternativeNamesData {
    entries: Vec<AltNameEntry>,
}

impl AlternativeNamesData {
    pub fn new(mut entries: Vec<AltNameEntry>) -> Self {
        entries.sort_by_key(|entry| entry.kind);
        Self { entries }
    }

    pub fn entries(&self) -> &[AltNameEntry] {
        &self.entries
    }

    fn group(&self, kind: AlternativeNameEntryType) -> &[AltNameEntry] {
        let start = self.entries.partition_point(|entry| entry.kind < kind);
        let end = self.entries.partition_point(|entry| entry.kind <= kind);
        &self.entries[start..end]
    }
}

payload!(AlternativeNamesData, "AlternativeNames");

pub type NativeAlternativeNames = Shared<AlternativeNamesData>;

assert_abi_contract!(SharedHandle, NativeAlternativeNames, { d: usize });

#[repr(C)]
pub struct NativeAltNamesCursor {
    pos: *const AltNameEntry,
    end: *const AltNameEntry,
}

unsafe impl Relocatable for NativeAltNamesCursor {}

assert_abi_contract!(Cursor, NativeAltNamesCursor, { pos: *const u8, end: *const u8 });

impl NativeAltNamesCursor {
    fn over(entries: &[AltNameEntry]) -> Self {
        let range = entries.as_ptr_range();
        Self {
            pos: range.start.wrapping_sub(1),
            end: range.end,
        }
    }

    fn advance(&mut self) -> bool {
        if self.pos == self.end {
            return false;
        }
        self.pos = self.pos.wrapping_add(1);
        self.pos != self.end
    }

    /// Moves to the last entry of the next key group.
    unsafe fn advance_key(&mut self) -> bool {
        if !self.advance() {
            return false;
        }
        let kind = (*self.pos).kind;
        while self.pos.wrapping_add(1) != self.end && (*self.pos.add(1)).kind == kind {
            self.pos = self.pos.add(1);
        }
        true
    }
}

export_shared_handle!(NativeAlternativeNames {
    default: netbridge_altnames_init_default,
    clone: netbridge_altnames_clone,
    drop: netbridge_altnames_drop,
    eq: netbridge_altnames_eq,
    ref_count: netbridge_altnames_ref_count,
    live: netbridge_altnames_live_payloads,
});

#[no_mangle]
pub unsafe extern "C" fn netbridge_altnames_len(map: *const NativeAlternativeNames) -> usize {
    let map = &*map;
    map.entries.len()
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_altnames_contains(
    map: *const NativeAlternativeNames,
    kind: AlternativeNameEntryType,
) -> bool {
    let map = &*map;
    !map.group(kind).is_empty()
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_altnames_values(
    map: *const NativeAlternativeNames,
    kind: AlternativeNameEntryType,
    push: PushFn,
    ctx: *mut c_void,
) -> usize {
    let map = &*map;
    push_all(
        map.group(kind).iter().map(|entry| entry.value.as_slice()),
        push,
        ctx,
    )
}

/// Every entry, grouped by type.
#[no_mangle]
pub unsafe extern "C" fn netbridge_altnames_iter(
    map: *const NativeAlternativeNames,
    out: *mut NativeAltNamesCursor,
) {
    let map = &*map;
    out.write(NativeAltNamesCursor::over(&map.entries));
}

/// One position per distinct type; advance with `netbridge_altnames_keys_advance`.
#[no_mangle]
pub unsafe extern "C" fn netbridge_altnames_keys(
    map: *const NativeAlternativeNames,
    out: *mut NativeAltNamesCursor,
) {
    let map = &*map;
    out.write(NativeAltNamesCursor::over(&map.entries));
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_altnames_values_for(
    map: *const NativeAlternativeNames,
    kind: AlternativeNameEntryType,
    out: *mut NativeAltNamesCursor,
) {
    let map = &*map;
    out.write(NativeAltNamesCursor::over(map.group(kind)));
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_altnames_cursor_advance(cursor: *mut NativeAltNamesCursor) -> bool {
    (*cursor).advance()
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_altnames_keys_advance(cursor: *mut NativeAltNamesCursor) -> bool {
    (*cursor).advance_key()
}

/// Only valid after an advance returned `true`.
#[no_mangle]
pub unsafe extern "C" fn netbridge_altnames_cursor_key(
    cursor: *const NativeAltNamesCursor,
) -> AlternativeNameEntryType {
    (*(*cursor).pos).kind
}

/// Only valid after an advance returned `true`.
#[no_mangle]
pub unsafe extern "C" fn netbridge_altnames_cursor_value(cursor: *const NativeAltNamesCursor) -> ByteView {
    ByteView::from_slice(&(*(*cursor).pos).value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: AlternativeNameEntryType, value: &str) -> AltNameEntry {
        AltNameEntry {
            kind,
            value: value.as_bytes().to_vec(),
        }
    }

    fn sample() -> AlternativeNamesData {
        AlternativeNamesData::new(vec![
            entry(AlternativeNameEntryType::IpAddressEntry, "127.0.0.1"),
            entry(AlternativeNameEntryType::DnsEntry, "localhost"),
            entry(AlternativeNameEntryType::DnsEntry, "example.test"),
        ])
    }

    #[test]
    fn test_cursor_visits_grouped_entries_then_stops() {
        let map = sample();
        let mut cursor = NativeAltNamesCursor::over(&map.entries);
        let mut seen = Vec::new();
        while cursor.advance() {
            seen.push(unsafe { (*cursor.pos).value.clone() });
        }
        assert_eq!(seen, vec![b"localhost".to_vec(), b"example.test".to_vec(), b"127.0.0.1".to_vec()]);
        assert!(!cursor.advance());
        assert!(!cursor.advance());
    }

    #[test]
    fn test_keys_cursor_yields_each_type_once() {
        let map = sample();
        let mut cursor = NativeAltNamesCursor::over(&map.entries);
        let mut kinds = Vec::new();
        while unsafe { cursor.advance_key() } {
            kinds.push(unsafe { (*cursor.pos).kind });
        }
        assert_eq!(
            kinds,
            vec![AlternativeNameEntryType::DnsEntry, AlternativeNameEntryType::IpAddressEntry]
        );
    }

    #[test]
    fn test_empty_group_cursor_never_advances() {
        let map = sample();
        let mut cursor = NativeAltNamesCursor::over(map.group(AlternativeNameEntryType::EmailEntry));
        assert!(!cursor.advance());
        assert!(!cursor.advance());
    }
}
