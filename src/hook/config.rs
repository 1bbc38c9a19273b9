//! Registry configuration.
//!
//! The registry is an embedding interface: it has no flags and reads no environment
//! variables. Everything tunable lives in [`RegistryConfig`], built in code and
//! validated once when a registry is created.
//!
//! # Example
//!
//! ```rust
//! use hybridscope::hook::{Registry, RegistryConfig};
//!
//! // Use a preset
//! let registry = Registry::with_config(RegistryConfig::strict())?;
//!
//! // Or customize
//! let config = RegistryConfig::default()
//!     .with_shard_amount(64)
//!     .with_quarantine_after(3);
//! let registry = Registry::with_config(config)?;
//! # Ok::<(), hybridscope::Error>(())
//! ```

use crate::Result;

/// Tunables for an interception [`Registry`](crate::hook::Registry).
///
/// # Default Values
///
/// | Field | Default |
/// |-------|---------|
/// | `shard_amount` | `None` (DashMap's CPU-based default) |
/// | `quarantine_after` | `None` (never quarantine) |
/// | `suppress_reentrant` | `true` |
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Number of lock shards in the target map.
    ///
    /// Must be a power of two greater than one. More shards reduce contention
    /// between lookups and registrations that hash to different keys.
    pub shard_amount: Option<usize>,

    /// Number of contained hook panics after which an observer is tombstoned.
    ///
    /// `None` keeps invoking failing observers forever. Zero is rejected.
    pub quarantine_after: Option<u32>,

    /// Skip dispatch for calls intercepted while the same thread is running a hook
    /// of this registry.
    ///
    /// Observers that call instrumented methods themselves would otherwise recurse
    /// into their own hooks without bound. The guard is scoped to one registry: a
    /// hook of another registry on the same thread does not suppress dispatch here.
    pub suppress_reentrant: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            shard_amount: None,
            quarantine_after: None,
            suppress_reentrant: true,
        }
    }
}

impl RegistryConfig {
    /// Preset that tombstones an observer after its first hook panic.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            quarantine_after: Some(1),
            ..Self::default()
        }
    }

    /// Sets the shard count of the target map.
    #[must_use]
    pub fn with_shard_amount(mut self, shards: usize) -> Self {
        self.shard_amount = Some(shards);
        self
    }

    /// Sets the number of hook panics tolerated before quarantine.
    #[must_use]
    pub fn with_quarantine_after(mut self, failures: u32) -> Self {
        self.quarantine_after = Some(failures);
        self
    }

    /// Enables or disables re-entrancy suppression.
    #[must_use]
    pub fn with_suppress_reentrant(mut self, suppress: bool) -> Self {
        self.suppress_reentrant = suppress;
        self
    }

    /// Checks every field for range errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) if the shard
    /// amount is not a power of two greater than one, or if `quarantine_after`
    /// is zero.
    pub fn validate(&self) -> Result<()> {
        if let Some(shards) = self.shard_amount {
            if shards < 2 || !shards.is_power_of_two() {
                return Err(config_error!(
                    "shard_amount must be a power of two greater than one, got {}",
                    shards
                ));
            }
        }

        if self.quarantine_after == Some(0) {
            return Err(config_error!("quarantine_after must be at least 1"));
        }

        Ok(())
    }
}
