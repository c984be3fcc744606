//! Implicitly shared byte array.

use std::ffi::c_void;

use bridge_traits::ffi::{ByteView, PushFn};
use bridge_traits::assert_abi_contract;

use crate::handle::{export_shared_handle, payload, Shared};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteArrayData {
    pub bytes: Vec<u8>,
}

payload!(ByteArrayData, "ByteArray");

pub type NativeByteArray = Shared<ByteArrayData>;

assert_abi_contract!(SharedHandle, NativeByteArray, { d: usize });

impl NativeByteArray {
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Shared::new(ByteArrayData { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn view(&self) -> ByteView {
        ByteView::from_slice(&self.bytes)
    }
}

/// Writes a freshly allocated byte array into an uninitialized out slot.
pub(crate) unsafe fn write_bytes(out: *mut NativeByteArray, bytes: impl Into<Vec<u8>>) {
    out.write(NativeByteArray::from_vec(bytes.into()));
}

/// Hands each byte string to a host push callback.
pub(crate) unsafe fn push_all<I>(items: I, push: PushFn, ctx: *mut c_void) -> usize
where
    I: IntoIterator,
    I::Item: Into<Vec<u8>>,
{
    let mut count = 0;
    for item in items {
        let array = NativeByteArray::from_vec(item.into());
        push(ctx, (&array as *const NativeByteArray).cast());
        count += 1;
    }
    count
}

export_shared_handle!(NativeByteArray {
    default: netbridge_bytearray_init_default,
    clone: netbridge_bytearray_clone,
    drop: netbridge_bytearray_drop,
    eq: netbridge_bytearray_eq,
    ref_count: netbridge_bytearray_ref_count,
    live: netbridge_bytearray_live_payloads,
});

#[no_mangle]
pub unsafe extern "C" fn netbridge_bytearray_from_view(view: ByteView, out: *mut NativeByteArray) {
    write_bytes(out, view.as_slice());
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_bytearray_data(array: *const NativeByteArray) -> ByteView {
    let array = &*array;
    array.view()
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_bytearray_append(array: *mut NativeByteArray, view: ByteView) {
    let array = &mut *array;
    array.make_mut().bytes.extend_from_slice(view.as_slice());
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_bytearray_clear(array: *mut NativeByteArray) {
    let array = &mut *array;
    array.make_mut().bytes.clear();
}
