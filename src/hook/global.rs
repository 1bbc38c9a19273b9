//! The process-wide registry.
//!
//! Intercepted call sites have no way to receive a registry through explicit
//! plumbing, so one instance lives for the whole process behind a single access
//! point, [`Registry::global`]. It is created on first use and never torn down;
//! process exit reclaims it.
//!
//! To run the process registry with a non-default configuration, call [`init`]
//! before anything touches [`Registry::global`]:
//!
//! ```rust
//! use hybridscope::hook::{global, RegistryConfig};
//!
//! let registry = global::init(RegistryConfig::strict())?;
//! assert_eq!(registry.config().quarantine_after, Some(1));
//! # Ok::<(), hybridscope::Error>(())
//! ```

use std::sync::{Arc, OnceLock};

use crate::{
    hook::{
        config::RegistryConfig,
        observer::Observer,
        registry::{RegistrationHandle, Registry},
    },
    Error, Result,
};

static GLOBAL: OnceLock<Registry> = OnceLock::new();

impl Registry {
    /// Returns the process-wide registry, creating it with the default
    /// configuration on first use.
    ///
    /// Safe to call from any thread; concurrent first calls create exactly one
    /// instance.
    pub fn global() -> &'static Registry {
        GLOBAL.get_or_init(Registry::new)
    }
}

/// Creates the process-wide registry with a custom configuration.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] if the configuration fails validation, or
/// [`Error::AlreadyInitialized`] if the process registry already exists.
pub fn init(config: RegistryConfig) -> Result<&'static Registry> {
    config.validate()?;

    let mut installed = false;
    let registry = GLOBAL.get_or_init(|| {
        installed = true;
        Registry::build(config)
    });

    if installed {
        Ok(registry)
    } else {
        Err(Error::AlreadyInitialized)
    }
}

/// Registers an observer with the process-wide registry.
pub fn register<O: Observer + 'static>(observer: O) -> RegistrationHandle {
    Registry::global().register(observer)
}

/// Registers a shared observer with the process-wide registry.
pub fn register_shared(observer: Arc<dyn Observer>) -> RegistrationHandle {
    Registry::global().register_shared(observer)
}

/// Tombstones a registration in the process-wide registry.
pub fn deregister(handle: &RegistrationHandle) -> bool {
    Registry::global().deregister(handle)
}
