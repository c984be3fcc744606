//! Implicitly shared handles.
//!
//! A [`Shared<T>`] is one pointer to a reference-counted payload. Cloning a
//! handle bumps the count; mutating through [`Shared::make_mut`] detaches a
//! private copy first when the payload is shared. Every payload kind owns a
//! [`PayloadCounter`] so the number of payloads alive can be observed from
//! the host side.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bridge_traits::abi::Relocatable;

/// Number of live payloads of one kind.
pub struct PayloadCounter {
    name: &'static str,
    live: AtomicUsize,
}

impl PayloadCounter {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            live: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    fn token(&'static self) -> LiveToken {
        self.live.fetch_add(1, Ordering::AcqRel);
        LiveToken(self)
    }
}

/// Held by a payload for as long as it is allocated.
struct LiveToken(&'static PayloadCounter);

impl Clone for LiveToken {
    fn clone(&self) -> Self {
        self.0.token()
    }
}

impl Drop for LiveToken {
    fn drop(&mut self) {
        self.0.live.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Payload stored behind a [`Shared`] handle.
pub trait Payload: Clone + 'static {
    fn counter() -> &'static PayloadCounter;
}

#[derive(Clone)]
struct Tracked<T> {
    value: T,
    _token: LiveToken,
}

#[repr(transparent)]
pub struct Shared<T: Payload>(Arc<Tracked<T>>);

// An `Arc` is a single heap pointer; moving it never touches the payload.
unsafe impl<T: Payload> Relocatable for Shared<T> {}

impl<T: Payload> Shared<T> {
    pub fn new(value: T) -> Self {
        Self(Arc::new(Tracked {
            value,
            _token: T::counter().token(),
        }))
    }

    /// Mutable access, detaching from other handles first.
    pub fn make_mut(&mut self) -> &mut T {
        &mut Arc::make_mut(&mut self.0).value
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn live_payloads() -> usize {
        T::counter().live()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: Payload> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Payload + Default> Default for Shared<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Payload> Deref for Shared<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0.value
    }
}

impl<T: Payload + PartialEq> PartialEq for Shared<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.0.value == other.0.value
    }
}

impl<T: Payload + fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.value.fmt(f)
    }
}

/// Declares the payload counter of a payload type.
macro_rules! payload {
    ($ty:ty, $name:literal) => {
        impl $crate::handle::Payload for $ty {
            fn counter() -> &'static $crate::handle::PayloadCounter {
                static COUNTER: $crate::handle::PayloadCounter =
                    $crate::handle::PayloadCounter::new($name);
                &COUNTER
            }
        }
    };
}

/// Exports the lifecycle entry points every shared handle has.
macro_rules! export_shared_handle {
    ($ty:ty {
        default: $default:ident,
        clone: $clone:ident,
        drop: $drop:ident,
        eq: $eq:ident,
        ref_count: $ref_count:ident,
        live: $live:ident $(,)?
    }) => {
        #[no_mangle]
        pub unsafe extern "C" fn $default(out: *mut $ty) {
            out.write(<$ty>::default());
        }

        #[no_mangle]
        pub unsafe extern "C" fn $clone(src: *const $ty, out: *mut $ty) {
            out.write((*src).clone());
        }

        #[no_mangle]
        pub unsafe extern "C" fn $drop(ptr: *mut $ty) {
            std::ptr::drop_in_place(ptr);
        }

        #[no_mangle]
        pub unsafe extern "C" fn $eq(a: *const $ty, b: *const $ty) -> bool {
            *a == *b
        }

        #[no_mangle]
        pub unsafe extern "C" fn $ref_count(ptr: *const $ty) -> usize {
            (*ptr).ref_count()
        }

        #[no_mangle]
        pub extern "C" fn $live() -> usize {
            <$ty>::live_payloads()
        }
    };
}

pub(crate) use {export_shared_handle, payload};

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default, PartialEq, Debug)]
    struct Sample(Vec<u8>);

    payload!(Sample, "sample");

    #[derive(Clone, Default, PartialEq, Debug)]
    struct Detached(Vec<u8>);

    payload!(Detached, "detached");

    #[test]
    fn test_clones_share_one_payload() {
        let first = Shared::new(Sample(vec![1, 2, 3]));
        let baseline = Shared::<Sample>::live_payloads();
        let clones: Vec<_> = (0..8).map(|_| first.clone()).collect();

        assert_eq!(first.ref_count(), 9);
        assert_eq!(Shared::<Sample>::live_payloads(), baseline);

        drop(clones);
        assert_eq!(first.ref_count(), 1);
    }

    #[test]
    fn test_make_mut_detaches_shared_payload() {
        let original = Shared::new(Detached(vec![1]));
        let mut copy = original.clone();

        copy.make_mut().0.push(2);

        assert_eq!((*original).0, vec![1]);
        assert_eq!((*copy).0, vec![1, 2]);
        assert!(!original.ptr_eq(&copy));
        assert_eq!(original.ref_count(), 1);
    }
}
