//! Subject alternative names.
//!
//! [`AlternativeNames`] is a multimap from entry type to value, ordered by
//! type. Its iterators are cursors into the map's payload: they borrow the
//! map, so it cannot change while one is alive.

use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;

use bridge_traits::abi::Relocatable;
use bridge_traits::ffi::{AlternativeNameEntryType, ByteView, PushFn};
use bridge_traits::{assert_abi_contract, assert_same_layout};

use crate::bytearray::{ByteArray, ByteArrayView};
use crate::util::{collect, construct, shared_handle};

shared_handle! {
    pub struct AlternativeNames => bridge_native::NativeAlternativeNames {
        default: netbridge_altnames_init_default,
        clone: netbridge_altnames_clone,
        drop: netbridge_altnames_drop,
        eq: netbridge_altnames_eq,
        ref_count: netbridge_altnames_ref_count,
        live: netbridge_altnames_live_payloads,
    }
}

#[repr(C)]
struct RawCursor {
    pos: *const c_void,
    end: *const c_void,
}

extern "C" {
    fn netbridge_altnames_len(map: *const AlternativeNames) -> usize;
    fn netbridge_altnames_contains(map: *const AlternativeNames, kind: AlternativeNameEntryType) -> bool;
    fn netbridge_altnames_values(
        map: *const AlternativeNames,
        kind: AlternativeNameEntryType,
        push: PushFn,
        ctx: *mut c_void,
    ) -> usize;
    fn netbridge_altnames_iter(map: *const AlternativeNames, out: *mut RawCursor);
    fn netbridge_altnames_keys(map: *const AlternativeNames, out: *mut RawCursor);
    fn netbridge_altnames_values_for(
        map: *const AlternativeNames,
        kind: AlternativeNameEntryType,
        out: *mut RawCursor,
    );
    fn netbridge_altnames_cursor_advance(cursor: *mut RawCursor) -> bool;
    fn netbridge_altnames_keys_advance(cursor: *mut RawCursor) -> bool;
    fn netbridge_altnames_cursor_key(cursor: *const RawCursor) -> AlternativeNameEntryType;
    fn netbridge_altnames_cursor_value(cursor: *const RawCursor) -> ByteView;
}

impl RawCursor {
    unsafe fn start(init: impl FnOnce(*mut RawCursor)) -> Self {
        construct(init)
    }

    unsafe fn value<'a>(&self) -> ByteArrayView<'a> {
        ByteArrayView::new(netbridge_altnames_cursor_value(self).as_slice())
    }
}

macro_rules! cursor {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[repr(C)]
        pub struct $name<'a> {
            raw: RawCursor,
            _map: PhantomData<&'a AlternativeNames>,
        }

        unsafe impl Relocatable for $name<'_> {}

        assert_abi_contract!(Cursor, $name<'static>, { pos: *const u8, end: *const u8 });
        assert_same_layout!($name<'static>, bridge_native::NativeAltNamesCursor);
    };
}

cursor! {
    /// Every `(type, value)` entry, grouped by type.
    AltNamesIter
}

cursor! {
    /// Each entry type present, once.
    AltNamesKeys
}

cursor! {
    /// The values of one entry type, in certificate order.
    AltNamesValues
}

impl<'a> Iterator for AltNamesIter<'a> {
    type Item = (AlternativeNameEntryType, ByteArrayView<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        unsafe {
            netbridge_altnames_cursor_advance(&mut self.raw)
                .then(|| (netbridge_altnames_cursor_key(&self.raw), self.raw.value()))
        }
    }
}

impl Iterator for AltNamesKeys<'_> {
    type Item = AlternativeNameEntryType;

    fn next(&mut self) -> Option<Self::Item> {
        unsafe { netbridge_altnames_keys_advance(&mut self.raw).then(|| netbridge_altnames_cursor_key(&self.raw)) }
    }
}

impl<'a> Iterator for AltNamesValues<'a> {
    type Item = ByteArrayView<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        unsafe { netbridge_altnames_cursor_advance(&mut self.raw).then(|| self.raw.value()) }
    }
}

impl AlternativeNames {
    /// Total number of entries.
    pub fn len(&self) -> usize {
        unsafe { netbridge_altnames_len(self) }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, kind: AlternativeNameEntryType) -> bool {
        unsafe { netbridge_altnames_contains(self, kind) }
    }

    /// Owned copies of the values of `kind`.
    pub fn values(&self, kind: AlternativeNameEntryType) -> Vec<ByteArray> {
        unsafe { collect(|push, ctx| netbridge_altnames_values(self, kind, push, ctx)) }
    }

    pub fn iter(&self) -> AltNamesIter<'_> {
        AltNamesIter {
            raw: unsafe { RawCursor::start(|out| netbridge_altnames_iter(self, out)) },
            _map: PhantomData,
        }
    }

    pub fn keys(&self) -> AltNamesKeys<'_> {
        AltNamesKeys {
            raw: unsafe { RawCursor::start(|out| netbridge_altnames_keys(self, out)) },
            _map: PhantomData,
        }
    }

    pub fn values_for(&self, kind: AlternativeNameEntryType) -> AltNamesValues<'_> {
        AltNamesValues {
            raw: unsafe { RawCursor::start(|out| netbridge_altnames_values_for(self, kind, out)) },
            _map: PhantomData,
        }
    }
}

impl<'a> IntoIterator for &'a AlternativeNames {
    type Item = (AlternativeNameEntryType, ByteArrayView<'a>);
    type IntoIter = AltNamesIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for AlternativeNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|(kind, value)| (kind, String::from_utf8_lossy(value.as_slice()))))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_map_cursors_stop_immediately() {
        let names = AlternativeNames::default();
        assert!(names.is_empty());
        assert!(!names.contains(AlternativeNameEntryType::DnsEntry));

        let mut iter = names.iter();
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
        assert_eq!(names.keys().count(), 0);
        assert_eq!(names.values_for(AlternativeNameEntryType::EmailEntry).count(), 0);
        assert!(names.values(AlternativeNameEntryType::DnsEntry).is_empty());
    }
}
