// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
//#![deny(unsafe_code)]
// - 'hook/value.rs' reads union members, every constructor zero-fills the slot
// - 'ffi.rs' reads foreign `Obs` objects and C strings, calls through their vtables

//! # hybridscope
//!
//! A method-interception registry for IL2CPP-style managed runtimes. External code
//! registers observers for specific managed methods; the runtime's trampolines look
//! up every intercepted call and notify the matching observers on entry and exit,
//! passing arguments and return values as untyped 8-byte carriers.
//!
//! ## Features
//!
//! - **🎯 Exact matching** - Module, namespace, type, method name and parameter count
//! - **⚡ Cheap misses** - An unmatched call costs one map probe and allocates nothing
//! - **🧵 Concurrent by default** - Register and dispatch from any thread, no global lock
//! - **🛡️ Contained failures** - Observer panics are caught, logged and counted
//! - **🔌 C ABI** - Native plugins register through `HybridClrAddObs`
//!
//! ## Quick Start
//!
//! ### Using the Prelude
//!
//! ```rust
//! use hybridscope::prelude::*;
//!
//! let registry = Registry::new();
//! registry.register(
//!     Hook::new("heal-log", TargetDescriptor::new("Game.dll", "Core", "Player", "Heal", 1))
//!         .pre(|call, args| println!("{} #{} amount={}", call.site(), call.call_id(), args[0].as_i32()))
//!         .post(|_, ret| println!("healed to {:?}", ret.map(ValueCarrier::as_i32))),
//! );
//!
//! let site = CallSite::new("Game.dll", "Core", "Player", "Heal", 1);
//! let ret = registry.dispatch(&site, &[ValueCarrier::from_i32(10)], || {
//!     Some(ValueCarrier::from_i32(90))
//! });
//! assert_eq!(ret.map(|r| r.as_i32()), Some(90));
//! ```
//!
//! ### Process-wide Registry
//!
//! Trampolines have no way to receive a registry as a parameter, so the crate keeps
//! one per process behind [`hook::Registry::global`]. The free functions in
//! [`hook::global`] register with it.
//!
//! ## Logging
//!
//! The crate logs through [`tracing`] and installs no subscriber. Registrations are
//! logged at `debug`, contained observer panics and quarantines at `warn`. The
//! lookup-miss path logs nothing.
//!
//! ## Error Handling
//!
//! Registration, lookup and dispatch cannot fail. Errors only come from the edges:
//!
//! ```rust
//! use hybridscope::{hook::{Registry, RegistryConfig}, Error};
//!
//! match Registry::with_config(RegistryConfig::default().with_quarantine_after(0)) {
//!     Ok(_) => println!("registry ready"),
//!     Err(Error::InvalidConfig(message)) => println!("bad config: {}", message),
//!     Err(e) => println!("Other error: {}", e),
//! }
//! ```
//!
//! ### Testing
//!
//! ```bash
//! cargo test
//! cargo bench --bench dispatch
//! ```
#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use hybridscope::prelude::*;
///
/// let target = TargetDescriptor::new("Game.dll", "", "Bootstrap", "Start", 0);
/// let handle = Registry::new().register(Hook::new("boot", target));
/// assert!(handle.is_active());
/// ```
pub mod prelude;

/// Registration, matching and dispatch of method observers.
///
/// # Key Types
///
/// - [`hook::Registry`] - Maps target methods to their observers
/// - [`hook::TargetDescriptor`] / [`hook::CallSite`] - Owned and borrowed method identities
/// - [`hook::Observer`] / [`hook::Hook`] - Trait and closure builder for observers
/// - [`hook::ValueCarrier`] - The untagged argument and return transport
/// - [`hook::CallFrame`] - A call between its entry and exit notifications
pub mod hook;

/// C ABI for native observer plugins.
///
/// Exposes [`ffi::HybridClrAddObs`], which takes a C++ [`ffi::Obs`] object, and
/// [`ffi::hybridscope_add_raw_observer`] for plain C [`ffi::RawObserver`] records.
pub mod ffi;

/// `hybridscope` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
///
/// # Examples
///
/// ```rust
/// use hybridscope::{hook::RegistryConfig, Result};
///
/// fn checked(config: RegistryConfig) -> Result<RegistryConfig> {
///     config.validate()?;
///     Ok(config)
/// }
/// # assert!(checked(RegistryConfig::strict()).is_ok());
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `hybridscope` Error type
///
/// The main error type for all operations in this crate. See [`Error`] for the
/// variants and their C ABI status codes.
pub use error::Error;
