//! # hybridscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the hybridscope library. Import this module to get quick access to everything
//! needed to write observers and drive dispatch.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all hybridscope operations
pub use crate::Error;

/// The result type used throughout hybridscope
pub use crate::Result;

// ================================================================================================
// Registry and Dispatch
// ================================================================================================

/// Observer registry, its configuration and handles
pub use crate::hook::{Observers, RegistrationHandle, Registry, RegistryConfig};

/// Split-form dispatch and counters
pub use crate::hook::{CallFrame, DispatchStats};

// ================================================================================================
// Method Identity
// ================================================================================================

/// Owned and borrowed method identities
pub use crate::hook::{CallSite, MethodIdentity, TargetDescriptor};

// ================================================================================================
// Observers
// ================================================================================================

/// Observer trait, closure builder and call context
pub use crate::hook::{CallContext, Hook, HookPhase, Observer};

// ================================================================================================
// Value Transport
// ================================================================================================

/// Untagged carriers and their out-of-band decoding
pub use crate::hook::{MethodSignature, TypedValue, ValueCarrier, ValueKind};
