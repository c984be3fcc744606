//! # Bridge Contract
//!
//! Everything the native toolkit and the host bindings have to agree on.
//!
//! ## Overview
//!
//! This crate plays the role a shared C header plays for a native library:
//! `bridge-native` implements the `netbridge_*` entry points, `core-io`
//! declares and calls them, and both sides compile against the definitions
//! here.
//!
//! ## Modules
//!
//! - [`abi`] - Compile-time value contracts (`assert_abi_contract!`,
//!   `assert_same_layout!`) and the [`Relocatable`](abi::Relocatable) marker
//! - [`ffi`] - `#[repr(C)]` views, callback signatures, enums and flags
//! - [`time`] - [`Clock`](time::Clock) and [`LoggerSink`](time::LoggerSink)
//! - [`error`] - [`BridgeError`](error::BridgeError)
//!
//! ## Contract Shapes
//!
//! Every bridged type is declared once with its shape:
//!
//! ```ignore
//! use bridge_traits::{abi::Relocatable, assert_abi_contract};
//!
//! #[repr(C)]
//! pub struct HostAddress {
//!     _space: std::mem::MaybeUninit<usize>,
//! }
//!
//! unsafe impl Relocatable for HostAddress {}
//!
//! assert_abi_contract!(SharedHandle, HostAddress, { blob: usize });
//! ```
//!
//! A type that breaks its row of the contract does not compile.

pub mod abi;
pub mod error;
pub mod ffi;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use abi::{AbiContract, ContractInfo, Relocatable, TypeLayout, ValueShape};
pub use ffi::ByteView;
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
