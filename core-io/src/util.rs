//! Calling-convention helpers shared by every wrapper.

use std::ffi::c_void;
use std::mem::MaybeUninit;

use bridge_traits::ffi::PushFn;

/// Runs a native constructor against an uninitialized slot.
///
/// # Safety
///
/// `init` must fully initialize the slot it is given.
pub(crate) unsafe fn construct<T>(init: impl FnOnce(*mut T)) -> T {
    let mut slot = MaybeUninit::<T>::uninit();
    init(slot.as_mut_ptr());
    slot.assume_init()
}

unsafe extern "C" fn push_clone<T: Clone>(ctx: *mut c_void, item: *const c_void) {
    let items = &mut *ctx.cast::<Vec<T>>();
    items.push((*item.cast::<T>()).clone());
}

/// Collects a list the native side hands out one borrowed item at a time.
///
/// # Safety
///
/// Every item `fill` pushes must point to a live value with the layout of `T`.
pub(crate) unsafe fn collect<T: Clone>(fill: impl FnOnce(PushFn, *mut c_void) -> usize) -> Vec<T> {
    let mut items = Vec::new();
    fill(push_clone::<T>, (&mut items as *mut Vec<T>).cast());
    items
}

/// Declares a host-side shared handle over a native payload.
///
/// The handle is one opaque word. Cloning, dropping, comparing and the
/// reference-count diagnostics all go through the six lifecycle symbols.
macro_rules! shared_handle {
    (
        $(#[$meta:meta])*
        pub struct $name:ident => $native:ty {
            default: $default:ident,
            clone: $clone:ident,
            drop: $drop:ident,
            eq: $eq:ident,
            ref_count: $ref_count:ident,
            live: $live:ident $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(C)]
        pub struct $name {
            _space: ::std::mem::MaybeUninit<usize>,
        }

        extern "C" {
            fn $default(out: *mut $name);
            fn $clone(src: *const $name, out: *mut $name);
            fn $drop(ptr: *mut $name);
            fn $eq(a: *const $name, b: *const $name) -> bool;
            fn $ref_count(ptr: *const $name) -> usize;
            fn $live() -> usize;
        }

        unsafe impl ::bridge_traits::abi::Relocatable for $name {}

        ::bridge_traits::assert_abi_contract!(SharedHandle, $name, { d: usize });
        ::bridge_traits::assert_same_layout!($name, $native);

        impl $name {
            /// Number of handles sharing this payload.
            pub fn ref_count(&self) -> usize {
                unsafe { $ref_count(self) }
            }

            /// Number of payloads of this type currently allocated.
            pub fn live_payloads() -> usize {
                unsafe { $live() }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                unsafe { $crate::util::construct(|out| $default(out)) }
            }
        }

        impl Clone for $name {
            fn clone(&self) -> Self {
                unsafe { $crate::util::construct(|out| $clone(self, out)) }
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                unsafe { $drop(self) }
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                unsafe { $eq(self, other) }
            }
        }

        impl Eq for $name {}
    };
}

pub(crate) use shared_handle;

/// Declares a host-side owner of a heap-allocated native object.
macro_rules! owned_object {
    (
        $(#[$meta:meta])*
        pub struct $name:ident($raw:ident) {
            delete: $delete:ident $(,)?
        }
    ) => {
        #[repr(C)]
        pub(crate) struct $raw {
            _private: [u8; 0],
        }

        extern "C" {
            fn $delete(ptr: *mut $raw);
        }

        $(#[$meta])*
        pub struct $name {
            raw: ::std::ptr::NonNull<$raw>,
        }

        impl $name {
            /// Takes ownership of a freshly allocated native object.
            #[allow(dead_code)]
            pub(crate) fn from_raw(raw: *mut $raw) -> Option<Self> {
                ::std::ptr::NonNull::new(raw).map(|raw| Self { raw })
            }

            #[allow(dead_code)]
            fn as_ptr(&self) -> *const $raw {
                self.raw.as_ptr()
            }

            #[allow(dead_code)]
            fn as_mut_ptr(&mut self) -> *mut $raw {
                self.raw.as_ptr()
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                unsafe { $delete(self.raw.as_ptr()) }
            }
        }
    };
}

pub(crate) use owned_object;
