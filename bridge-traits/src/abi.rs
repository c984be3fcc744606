//! # Cross-Boundary Value Contracts
//!
//! Compile-time checks that a value type can be moved and dropped by the host
//! without corrupting the payload owned by the native toolkit.
//!
//! ## Overview
//!
//! Every type that crosses the `netbridge_*` boundary is classified as one of
//! three [`ValueShape`]s. The shape decides which properties must hold:
//!
//! | Shape          | Layout      | `Copy` | `Clone` | needs drop | `Relocatable` |
//! |----------------|-------------|--------|---------|------------|---------------|
//! | `Trivial`      | exact match | yes    | yes     | no         | yes           |
//! | `SharedHandle` | one blob    | **no** | yes     | **yes**    | yes           |
//! | `Cursor`       | two words   | **no** | **no**  | no         | yes           |
//!
//! Violations fail the build. There is no runtime fallback.
//!
//! ## Usage
//!
//! ```
//! use bridge_traits::{assert_abi_contract, abi::Relocatable};
//!
//! #[repr(C)]
//! #[derive(Clone, Copy)]
//! pub struct DeadlineTimer {
//!     t1: i64,
//!     t2: u32,
//!     timer_type: i32,
//! }
//!
//! unsafe impl Relocatable for DeadlineTimer {}
//!
//! assert_abi_contract!(Trivial, DeadlineTimer, { t1: i64, t2: u32, timer_type: i32 });
//! ```

use serde::Serialize;
use std::fmt;

/// Ownership and lifecycle category of a bridged value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValueShape {
    /// Plain data, copied bitwise, never cleaned up.
    Trivial,
    /// One word hiding a reference-counted native payload.
    SharedHandle,
    /// A (position, end) pair bound to a container snapshot.
    Cursor,
}

impl fmt::Display for ValueShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Trivial => "trivial",
            Self::SharedHandle => "shared-handle",
            Self::Cursor => "cursor",
        };
        f.write_str(name)
    }
}

/// Marker for types that survive being moved by a raw byte copy.
///
/// # Safety
///
/// Implementors must not hold pointers into their own storage and must not
/// rely on their address staying stable. Every value type that crosses the
/// boundary by value has to opt in.
pub unsafe trait Relocatable {}

/// Size and alignment of a type, as the compiler lays it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypeLayout {
    pub size: usize,
    pub align: usize,
}

impl TypeLayout {
    pub const fn of<T>() -> Self {
        Self {
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
        }
    }
}

/// Implemented by [`assert_abi_contract!`] for every checked type.
pub trait AbiContract {
    const NAME: &'static str;
    const SHAPE: ValueShape;
    const LAYOUT: TypeLayout;
}

/// One row of the contract report logged at start-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractInfo {
    pub name: &'static str,
    pub shape: ValueShape,
    pub layout: TypeLayout,
}

impl ContractInfo {
    pub fn of<T: AbiContract>() -> Self {
        Self {
            name: T::NAME,
            shape: T::SHAPE,
            layout: T::LAYOUT,
        }
    }
}

impl fmt::Display for ContractInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] size={} align={}",
            self.name, self.shape, self.layout.size, self.layout.align
        )
    }
}

#[doc(hidden)]
pub mod __private {
    pub const fn assert_relocatable<T: super::Relocatable + Sized>() {}
    pub const fn assert_copy<T: Copy>() {}
    pub const fn assert_clone<T: Clone>() {}
}

/// Fails the build unless `$ty` has the same size and alignment as a
/// `#[repr(C)]` struct with the listed fields.
#[doc(hidden)]
#[macro_export]
macro_rules! __assert_layout {
    ($ty:ty, { $($field:ident : $field_ty:ty),+ $(,)? }) => {
        const _: () = {
            #[repr(C)]
            #[allow(dead_code)]
            struct Expected {
                $($field: $field_ty),+
            }

            assert!(
                ::core::mem::size_of::<$ty>() == ::core::mem::size_of::<Expected>(),
                concat!("size of ", stringify!($ty), " does not match its declared layout"),
            );
            assert!(
                ::core::mem::align_of::<$ty>() == ::core::mem::align_of::<Expected>(),
                concat!("alignment of ", stringify!($ty), " does not match its declared layout"),
            );
        };
    };
}

/// Fails the build if `$ty` implements `$trait`.
///
/// If `$ty: $trait`, the inferred parameter below has two candidates and the
/// path is ambiguous.
#[doc(hidden)]
#[macro_export]
macro_rules! __assert_not_impl {
    ($ty:ty, $trait:path) => {
        const _: fn() = || {
            trait AmbiguousIfImpl<A> {
                fn some_item() {}
            }

            impl<T: ?Sized> AmbiguousIfImpl<()> for T {}

            #[allow(dead_code)]
            struct Invalid;

            impl<T: ?Sized + $trait> AmbiguousIfImpl<Invalid> for T {}

            let _ = <$ty as AmbiguousIfImpl<_>>::some_item;
        };
    };
}

/// Declares the ABI contract of a bridged type and checks it at compile time.
///
/// The first argument is the [`ValueShape`], the second the type, and the
/// braces hold the fields of the in-memory shape the other side of the
/// boundary expects.
///
/// # Rejected types
///
/// A shared handle that is `Copy` would let the host duplicate a payload
/// reference without touching the count:
///
/// ```compile_fail
/// use bridge_traits::{abi::Relocatable, assert_abi_contract};
///
/// #[derive(Clone, Copy)]
/// pub struct Handle {
///     d: usize,
/// }
///
/// unsafe impl Relocatable for Handle {}
///
/// assert_abi_contract!(SharedHandle, Handle, { d: usize });
/// ```
///
/// A cursor is tied to one snapshot and must not be cloned:
///
/// ```compile_fail
/// use bridge_traits::{abi::Relocatable, assert_abi_contract};
///
/// #[derive(Clone)]
/// pub struct Iter {
///     pos: *const u8,
///     end: *const u8,
/// }
///
/// unsafe impl Relocatable for Iter {}
///
/// assert_abi_contract!(Cursor, Iter, { pos: *const u8, end: *const u8 });
/// ```
///
/// Nor may it own anything:
///
/// ```compile_fail
/// use bridge_traits::{abi::Relocatable, assert_abi_contract};
///
/// pub struct Iter {
///     pos: *const u8,
///     end: *const u8,
/// }
///
/// impl Drop for Iter {
///     fn drop(&mut self) {}
/// }
///
/// unsafe impl Relocatable for Iter {}
///
/// assert_abi_contract!(Cursor, Iter, { pos: *const u8, end: *const u8 });
/// ```
///
/// A trivial type must match its declared fields exactly:
///
/// ```compile_fail
/// use bridge_traits::{abi::Relocatable, assert_abi_contract};
///
/// #[repr(C)]
/// #[derive(Clone, Copy)]
/// pub struct Timer {
///     t1: i64,
/// }
///
/// unsafe impl Relocatable for Timer {}
///
/// assert_abi_contract!(Trivial, Timer, { t1: i64, t2: u32, timer_type: i32 });
/// ```
///
/// The same type with the right field list is accepted:
///
/// ```
/// use bridge_traits::{abi::{AbiContract, Relocatable, ValueShape}, assert_abi_contract};
///
/// #[repr(C)]
/// #[derive(Clone, Copy)]
/// pub struct Timer {
///     t1: i64,
/// }
///
/// unsafe impl Relocatable for Timer {}
///
/// assert_abi_contract!(Trivial, Timer, { t1: i64 });
/// assert_eq!(<Timer as AbiContract>::SHAPE, ValueShape::Trivial);
/// ```
#[macro_export]
macro_rules! assert_abi_contract {
    (Trivial, $ty:ty, { $($fields:tt)+ }) => {
        $crate::__assert_layout!($ty, { $($fields)+ });
        const _: () = {
            $crate::abi::__private::assert_relocatable::<$ty>();
            $crate::abi::__private::assert_copy::<$ty>();
            assert!(
                !::core::mem::needs_drop::<$ty>(),
                concat!(stringify!($ty), " must be trivially destructible"),
            );
        };
        $crate::__impl_abi_contract!(Trivial, $ty);
    };
    (SharedHandle, $ty:ty, { $($fields:tt)+ }) => {
        $crate::__assert_layout!($ty, { $($fields)+ });
        $crate::__assert_not_impl!($ty, ::core::marker::Copy);
        const _: () = {
            $crate::abi::__private::assert_relocatable::<$ty>();
            $crate::abi::__private::assert_clone::<$ty>();
            assert!(
                ::core::mem::needs_drop::<$ty>(),
                concat!(stringify!($ty), " must release its payload on drop"),
            );
        };
        $crate::__impl_abi_contract!(SharedHandle, $ty);
    };
    (Cursor, $ty:ty, { $($fields:tt)+ }) => {
        $crate::__assert_layout!($ty, { $($fields)+ });
        $crate::__assert_not_impl!($ty, ::core::marker::Copy);
        $crate::__assert_not_impl!($ty, ::core::clone::Clone);
        const _: () = {
            $crate::abi::__private::assert_relocatable::<$ty>();
            assert!(
                !::core::mem::needs_drop::<$ty>(),
                concat!(stringify!($ty), " must not own a payload"),
            );
        };
        $crate::__impl_abi_contract!(Cursor, $ty);
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __impl_abi_contract {
    ($shape:ident, $ty:ty) => {
        impl $crate::abi::AbiContract for $ty {
            const NAME: &'static str = stringify!($ty);
            const SHAPE: $crate::abi::ValueShape = $crate::abi::ValueShape::$shape;
            const LAYOUT: $crate::abi::TypeLayout = $crate::abi::TypeLayout::of::<$ty>();
        }
    };
}

/// Fails the build unless two views of the same boundary type agree on size
/// and alignment.
#[macro_export]
macro_rules! assert_same_layout {
    ($host:ty, $native:ty) => {
        const _: () = {
            assert!(
                ::core::mem::size_of::<$host>() == ::core::mem::size_of::<$native>(),
                concat!(stringify!($host), " and ", stringify!($native), " differ in size"),
            );
            assert!(
                ::core::mem::align_of::<$host>() == ::core::mem::align_of::<$native>(),
                concat!(stringify!($host), " and ", stringify!($native), " differ in alignment"),
            );
        };
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::MaybeUninit;
    use std::sync::Arc;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Plain {
        seconds: i64,
        nanos: u32,
        kind: i32,
    }

    unsafe impl Relocatable for Plain {}

    assert_abi_contract!(Trivial, Plain, { seconds: i64, nanos: u32, kind: i32 });

    #[repr(transparent)]
    #[derive(Clone)]
    struct Handle(Arc<Vec<u8>>);

    unsafe impl Relocatable for Handle {}

    assert_abi_contract!(SharedHandle, Handle, { blob: usize });

    #[repr(C)]
    struct Blob {
        _space: MaybeUninit<usize>,
    }

    assert_same_layout!(Blob, Handle);

    #[repr(C)]
    struct Position {
        pos: *const u8,
        end: *const u8,
    }

    unsafe impl Relocatable for Position {}

    assert_abi_contract!(Cursor, Position, { pos: *const u8, end: *const u8 });

    #[test]
    fn test_contract_metadata() {
        assert_eq!(<Plain as AbiContract>::SHAPE, ValueShape::Trivial);
        assert_eq!(<Handle as AbiContract>::SHAPE, ValueShape::SharedHandle);
        assert_eq!(<Position as AbiContract>::SHAPE, ValueShape::Cursor);
        assert_eq!(<Plain as AbiContract>::NAME, "Plain");
        assert_eq!(<Plain as AbiContract>::LAYOUT, TypeLayout { size: 16, align: 8 });
    }

    #[test]
    fn test_contract_info_display() {
        let info = ContractInfo::of::<Handle>();
        assert_eq!(info.layout.size, std::mem::size_of::<usize>());
        assert_eq!(
            info.to_string(),
            format!(
                "Handle [shared-handle] size={} align={}",
                std::mem::size_of::<usize>(),
                std::mem::align_of::<usize>()
            )
        );
    }

    #[test]
    fn test_trivial_copies_freely() {
        let original = Plain {
            seconds: 7,
            nanos: 9,
            kind: 1,
        };
        let copies: Vec<Plain> = (0..16).map(|_| original).collect();
        drop(copies);
        assert_eq!(original.seconds, 7);
    }
}
