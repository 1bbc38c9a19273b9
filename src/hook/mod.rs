//! Method interception registry and dispatch.
//!
//! This module provides the registration and dispatch contract between observers
//! that want to watch managed method calls and the runtime-side trampolines that
//! intercept them. It supports:
//!
//! - **Exact identity matching**: Module, namespace, type, method and parameter count
//! - **Fan-out**: Any number of observers per method, notified in registration order
//! - **Untagged value transport**: One fixed 8-byte carrier per argument or return value
//! - **Failure containment**: Observer panics never reach the intercepted call
//!
//! How call sites are located and how code is patched to reach the trampoline is
//! outside this module; it starts where the trampoline has a [`CallSite`] and a slice
//! of [`ValueCarrier`]s in hand.
//!
//! # Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | `value` | [`ValueCarrier`] and the out-of-band kinds that decode it |
//! | `target` | [`TargetDescriptor`], [`CallSite`] and the matching key |
//! | `observer` | The [`Observer`] trait and the [`Hook`] builder |
//! | `registry` | [`Registry`] registration, lookup and deregistration |
//! | `dispatch` | Entry/exit dispatch and [`CallFrame`] |
//! | `config` | [`RegistryConfig`] |
//! | [`global`] | The process-wide registry |
//!
//! # Examples
//!
//! ## Observing a Method
//!
//! ```rust
//! use hybridscope::hook::{global, Hook, TargetDescriptor};
//!
//! global::register(
//!     Hook::new("damage-log", TargetDescriptor::new("Game.dll", "Core", "Player", "TakeDamage", 1))
//!         .pre(|call, args| println!("{} amount={}", call.site(), args[0].as_i32())),
//! );
//! ```
//!
//! ## Trampoline Side
//!
//! ```rust
//! use hybridscope::hook::{CallSite, Registry, ValueCarrier};
//!
//! fn take_damage(amount: i32) -> i32 {
//!     amount / 2
//! }
//!
//! let site = CallSite::new("Game.dll", "Core", "Player", "TakeDamage", 1);
//! let frame = Registry::global().enter(&site, &[ValueCarrier::from_i32(25)]);
//! let ret = ValueCarrier::from_i32(take_damage(25));
//! frame.exit(Some(&ret));
//! ```

mod config;
mod dispatch;
pub mod global;
mod observer;
mod registry;
mod target;
mod value;

pub use config::RegistryConfig;
pub use dispatch::{CallFrame, DispatchStats};
pub use observer::{CallContext, EnterFn, ExitFn, Hook, HookPhase, Observer};
pub use registry::{Observers, RegistrationHandle, Registry};
pub use target::{CallSite, MethodIdentity, TargetDescriptor};
pub use value::{
    ManagedObject, ManagedString, MethodSignature, TypedValue, ValueCarrier, ValueKind,
};
