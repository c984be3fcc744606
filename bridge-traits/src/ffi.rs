//! # Boundary Vocabulary
//!
//! `#[repr(C)]` views, callback signatures, enums and flag sets shared by the
//! native toolkit (`bridge-native`) and the host bindings (`core-io`).
//!
//! Enums cross the boundary as `i32`. Both sides are compiled from these
//! definitions, so a value produced by one side is always a valid
//! discriminant on the other. Raw integers from elsewhere (struct fields,
//! user input) go through `TryFrom<i32>`.

use std::ffi::c_void;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

use crate::abi::Relocatable;
use crate::error::BridgeError;

/// Borrowed byte range passed by value across the boundary.
///
/// A null `data` pointer is only valid together with `len == 0`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ByteView {
    pub data: *const u8,
    pub len: usize,
}

unsafe impl Relocatable for ByteView {}

impl ByteView {
    pub const fn empty() -> Self {
        Self {
            data: std::ptr::null(),
            len: 0,
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            data: bytes.as_ptr(),
            len: bytes.len(),
        }
    }

    /// # Safety
    ///
    /// `data` must point to `len` initialized bytes that stay alive and
    /// unmodified for `'a`.
    pub unsafe fn as_slice<'a>(self) -> &'a [u8] {
        if self.data.is_null() || self.len == 0 {
            &[]
        } else {
            std::slice::from_raw_parts(self.data, self.len)
        }
    }
}

crate::assert_abi_contract!(Trivial, ByteView, { data: *const u8, len: usize });

/// Receives one borrowed item of a list produced by the native side.
///
/// `item` is only valid for the duration of the call; receivers clone it.
pub type PushFn = unsafe extern "C" fn(ctx: *mut c_void, item: *const c_void);

/// One-shot callback run by the event loop.
pub type EventFn = unsafe extern "C" fn(ctx: *mut c_void);

macro_rules! ffi_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i32)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl TryFrom<i32> for $name {
            type Error = BridgeError;

            fn try_from(value: i32) -> Result<Self, Self::Error> {
                match value {
                    $(v if v == $value => Ok(Self::$variant),)+
                    other => Err(BridgeError::InvalidArgument(format!(
                        "{} is not a valid {}",
                        other,
                        stringify!($name)
                    ))),
                }
            }
        }

        impl From<$name> for i32 {
            fn from(value: $name) -> i32 {
                value as i32
            }
        }
    };
}

ffi_enum! {
    /// Accuracy requested from a deadline timer.
    pub enum TimerType {
        PreciseTimer = 0,
        CoarseTimer = 1,
        VeryCoarseTimer = 2,
    }
}

impl Default for TimerType {
    fn default() -> Self {
        Self::CoarseTimer
    }
}

ffi_enum! {
    pub enum SpecialAddress {
        Null = 0,
        Broadcast = 1,
        LocalHost = 2,
        LocalHostIPv6 = 3,
        Any = 4,
        AnyIPv6 = 5,
        AnyIPv4 = 6,
    }
}

ffi_enum! {
    pub enum NetworkLayerProtocol {
        IPv4Protocol = 0,
        IPv6Protocol = 1,
        AnyIPProtocol = 2,
        UnknownNetworkLayerProtocol = -1,
    }
}

ffi_enum! {
    pub enum CookieRawForm {
        NameAndValueOnly = 0,
        Full = 1,
    }
}

ffi_enum! {
    /// `SameSite` cookie attribute. `Default` means the attribute is absent.
    pub enum SameSite {
        Default = 0,
        None = 1,
        Lax = 2,
        Strict = 3,
    }
}

ffi_enum! {
    pub enum EncodingFormat {
        Pem = 0,
        Der = 1,
    }
}

ffi_enum! {
    pub enum KeyAlgorithm {
        Opaque = 0,
        Rsa = 1,
        Dsa = 2,
        Ec = 3,
        Dh = 4,
    }
}

ffi_enum! {
    pub enum KeyType {
        PrivateKey = 0,
        PublicKey = 1,
    }
}

ffi_enum! {
    /// Distinguished-name attribute of a certificate subject or issuer.
    pub enum SubjectInfo {
        Organization = 0,
        CommonName = 1,
        LocalityName = 2,
        OrganizationalUnitName = 3,
        CountryName = 4,
        StateOrProvinceName = 5,
        DistinguishedNameQualifier = 6,
        SerialNumber = 7,
        EmailAddress = 8,
    }
}

ffi_enum! {
    pub enum AlternativeNameEntryType {
        EmailEntry = 0,
        DnsEntry = 1,
        IpAddressEntry = 2,
    }
}

ffi_enum! {
    pub enum CryptographicHashAlgorithm {
        Sha224 = 3,
        Sha256 = 4,
        Sha384 = 5,
        Sha512 = 6,
    }
}

ffi_enum! {
    pub enum InterfaceType {
        Unknown = 0,
        Loopback = 1,
        Virtual = 2,
        Ethernet = 3,
        Slip = 4,
        CanBus = 5,
        Ppp = 6,
        Fddi = 7,
        Wifi = 8,
        Phonet = 9,
        Ieee802154 = 10,
        SixLoWPAN = 11,
        Ieee80216 = 12,
        Ieee1394 = 13,
    }
}

macro_rules! ffi_flags {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $bits:ty {
            $(const $flag:ident = $value:expr;)+
        }
    ) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name($bits);

        impl $name {
            $(pub const $flag: Self = Self($value);)+

            pub const fn empty() -> Self {
                Self(0)
            }

            pub const fn bits(self) -> $bits {
                self.0
            }

            pub const fn from_bits_truncate(bits: $bits) -> Self {
                Self(bits & (0 $(| $value)+))
            }

            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub const fn intersects(self, other: Self) -> bool {
                self.0 & other.0 != 0
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }
        }

        impl BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl BitAnd for $name {
            type Output = Self;

            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }

        impl Not for $name {
            type Output = Self;

            fn not(self) -> Self {
                Self::from_bits_truncate(!self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut set = f.debug_set();
                $(
                    if $value != 0 && self.contains(Self::$flag) {
                        set.entry(&format_args!(stringify!($flag)));
                    }
                )+
                set.finish()
            }
        }
    };
}

ffi_flags! {
    /// Device open mode. `READ_WRITE` is `READ_ONLY | WRITE_ONLY`.
    pub struct OpenMode: u32 {
        const NOT_OPEN = 0x0000;
        const READ_ONLY = 0x0001;
        const WRITE_ONLY = 0x0002;
        const READ_WRITE = 0x0003;
        const APPEND = 0x0004;
        const TRUNCATE = 0x0008;
        const TEXT = 0x0010;
        const UNBUFFERED = 0x0020;
        const NEW_ONLY = 0x0040;
        const EXISTING_ONLY = 0x0080;
    }
}

ffi_flags! {
    pub struct InterfaceFlags: u32 {
        const IS_UP = 0x1;
        const IS_RUNNING = 0x2;
        const CAN_BROADCAST = 0x4;
        const IS_LOOP_BACK = 0x8;
        const IS_POINT_TO_POINT = 0x10;
        const CAN_MULTICAST = 0x20;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_round_trip_through_i32() {
        assert_eq!(TimerType::try_from(0).unwrap(), TimerType::PreciseTimer);
        assert_eq!(
            NetworkLayerProtocol::try_from(-1).unwrap(),
            NetworkLayerProtocol::UnknownNetworkLayerProtocol
        );
        assert_eq!(i32::from(CryptographicHashAlgorithm::Sha512), 6);
    }

    #[test]
    fn test_enum_rejects_unknown_discriminant() {
        let err = SameSite::try_from(42).unwrap_err();
        assert!(err.to_string().contains("42 is not a valid SameSite"));
    }

    #[test]
    fn test_open_mode_flags() {
        let mode = OpenMode::READ_ONLY | OpenMode::WRITE_ONLY;
        assert_eq!(mode, OpenMode::READ_WRITE);
        assert!(mode.contains(OpenMode::WRITE_ONLY));
        assert!(!mode.contains(OpenMode::APPEND));
        assert_eq!(OpenMode::from_bits_truncate(0xFF00), OpenMode::NOT_OPEN);
        assert_eq!(format!("{:?}", OpenMode::READ_ONLY | OpenMode::TRUNCATE), "{READ_ONLY, TRUNCATE}");
    }

    #[test]
    fn test_byte_view_empty_slice() {
        let view = ByteView::empty();
        assert!(unsafe { view.as_slice() }.is_empty());

        let data = b"payload";
        let view = ByteView::from_slice(data);
        assert_eq!(unsafe { view.as_slice() }, b"payload");
    }
}
