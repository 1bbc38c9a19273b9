//! Interception registry for observer registration and lookup.
//!
//! This module provides [`Registry`], the process-wide collection mapping
//! [`TargetDescriptor`]s to the observers registered for them, together with the
//! handle and snapshot types it hands out.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Registry                            │
//! │  DashMap<TargetDescriptor, Arc<boxcar::Vec<Registration>>>   │
//! │                                                              │
//! │   register ── shard write lock ── clone list ── push ──┐     │
//! │                                                        │     │
//! │   lookup ──── shard read lock ─── clone list ──────────┤     │
//! │                                                        ▼     │
//! │                               append-only, insertion order   │
//! │                               tombstoned, never freed        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Shard locks are held only long enough to clone the per-key list out of the map.
//! The list itself is a lock-free append-only vector: registrations push, lookups
//! iterate, and neither waits for the other. An entry becomes visible to lookups
//! only once it is fully written.
//!
//! # Deregistration
//!
//! Entries are never removed. [`Registry::deregister`] sets a tombstone flag that
//! later lookups skip; calls already past their entry dispatch still deliver exit
//! notifications to every observer that saw entry.
//!
//! Tombstoned and quarantined entries are never compacted. They keep their slot in
//! the per-key list for the life of the registry, so every matching call still
//! walks past them and checks their flag. Code that registers and deregisters
//! observers for the same key in a loop grows that list without bound.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use dashmap::DashMap;
use tracing::debug;

use crate::{
    hook::{
        config::RegistryConfig,
        dispatch::StatsCounters,
        observer::Observer,
        target::{CallSite, MethodIdentity, TargetDescriptor},
    },
    Result,
};

/// Per-key observer list, in registration order.
pub(crate) type ObserverList = Arc<boxcar::Vec<Arc<Registration>>>;

/// A registered observer and its lifecycle state.
pub(crate) struct Registration {
    id: u64,
    name: String,
    observer: Arc<dyn Observer>,
    retired: AtomicBool,
    failures: AtomicU32,
}

impl Registration {
    pub(crate) fn observer(&self) -> &dyn Observer {
        self.observer.as_ref()
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_active(&self) -> bool {
        !self.retired.load(Ordering::Acquire)
    }

    /// Sets the tombstone. Returns `true` for the one caller that flipped it.
    pub(crate) fn retire(&self) -> bool {
        !self.retired.swap(true, Ordering::AcqRel)
    }

    /// Counts a contained hook failure and returns the new total.
    pub(crate) fn record_failure(&self) -> u32 {
        self.failures.fetch_add(1, Ordering::Relaxed).saturating_add(1)
    }
}

/// Handle to one registration, returned by [`Registry::register`].
///
/// Cloning the handle does not duplicate the registration. Dropping it does not
/// deregister the observer: the registry keeps the observer alive for the lifetime
/// of the process unless [`Registry::deregister`] is called.
#[derive(Clone)]
pub struct RegistrationHandle {
    entry: Arc<Registration>,
}

impl RegistrationHandle {
    /// Returns the registration's unique id within its registry.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.entry.id
    }

    /// Returns the observer's diagnostic name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.entry.name()
    }

    /// Returns the target the observer was registered for.
    #[must_use]
    pub fn target(&self) -> &TargetDescriptor {
        self.entry.observer.target()
    }

    /// Returns `false` once the registration has been tombstoned.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.entry.is_active()
    }

    /// Returns the number of hook panics contained for this observer so far.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.entry.failures.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for RegistrationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationHandle")
            .field("id", &self.entry.id)
            .field("name", &self.entry.name)
            .field("target", self.target())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Snapshot of the observers registered for one key at lookup time.
///
/// Observers are yielded in registration order. The snapshot owns shared
/// references, so it stays valid even if observers are deregistered afterwards.
#[derive(Default)]
pub struct Observers {
    entries: Vec<Arc<Registration>>,
}

impl Observers {
    /// Returns the number of observers in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was registered for the key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates the observers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Observer> {
        self.entries.iter().map(|entry| entry.observer())
    }

    /// Iterates the observers' diagnostic names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name())
    }

    pub(crate) fn into_entries(self) -> Vec<Arc<Registration>> {
        self.entries
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Process-wide map from target descriptors to their observers.
///
/// A registry supports any number of concurrent lookups and registrations. Most
/// code uses the single process instance returned by [`Registry::global`]; separate
/// instances are useful for tests and for embedding several independent tracers.
///
/// # Examples
///
/// ```rust
/// use hybridscope::hook::{CallSite, Hook, Registry, TargetDescriptor};
///
/// let registry = Registry::new();
/// let target = TargetDescriptor::new("Game.dll", "Core", "Player", "TakeDamage", 1);
///
/// registry.register(Hook::new("first", target.clone()));
/// registry.register(Hook::new("second", target));
///
/// let site = CallSite::new("Game.dll", "Core", "Player", "TakeDamage", 1);
/// let names: Vec<_> = registry.lookup(&site).names().map(str::to_owned).collect();
/// assert_eq!(names, ["first", "second"]);
/// ```
pub struct Registry {
    pub(super) targets: DashMap<TargetDescriptor, ObserverList>,
    pub(super) config: RegistryConfig,
    pub(super) stats: StatsCounters,
    pub(super) next_call: AtomicU64,
    next_id: AtomicU64,
    live: AtomicUsize,
}

impl Registry {
    /// Creates an empty registry with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::build(RegistryConfig::default())
    }

    /// Creates an empty registry with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) if the
    /// configuration fails validation.
    pub fn with_config(config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Builds a registry from an already validated configuration.
    pub(crate) fn build(config: RegistryConfig) -> Self {
        let targets = match config.shard_amount {
            Some(shards) => DashMap::with_shard_amount(shards),
            None => DashMap::new(),
        };

        Self {
            targets,
            config,
            stats: StatsCounters::default(),
            next_call: AtomicU64::new(0),
            next_id: AtomicU64::new(0),
            live: AtomicUsize::new(0),
        }
    }

    /// Returns the configuration this registry was built with.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Registers an observer.
    ///
    /// The observer is appended to the list for its target, creating the list if
    /// this is the first registration for that key. Registration always succeeds;
    /// registering the same target twice simply fans out to both observers.
    ///
    /// The observer is visible to every lookup that starts after this call returns.
    pub fn register<O: Observer + 'static>(&self, observer: O) -> RegistrationHandle {
        self.register_shared(Arc::new(observer))
    }

    /// Registers an observer that is already shared.
    ///
    /// The same `Arc` may be registered more than once; each registration is
    /// notified independently.
    pub fn register_shared(&self, observer: Arc<dyn Observer>) -> RegistrationHandle {
        let target = observer.target().clone();
        let entry = Arc::new(Registration {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            name: observer.name(),
            observer,
            retired: AtomicBool::new(false),
            failures: AtomicU32::new(0),
        });

        // The shard lock is released before the push so lookups on this key only
        // ever contend with the map, never with the append.
        let list = Arc::clone(
            self.targets
                .entry(target)
                .or_insert_with(|| Arc::new(boxcar::Vec::new()))
                .value(),
        );
        list.push(Arc::clone(&entry));
        self.live.fetch_add(1, Ordering::Relaxed);

        debug!(
            observer = entry.name(),
            target = %entry.observer.target(),
            id = entry.id,
            "registered observer"
        );

        RegistrationHandle { entry }
    }

    /// Tombstones a registration.
    ///
    /// Returns `true` if this call retired the registration, `false` if it was
    /// already retired or belongs to a different registry.
    pub fn deregister(&self, handle: &RegistrationHandle) -> bool {
        let owned = self
            .find(&handle.target().as_call_site())
            .is_some_and(|list| list.iter().any(|(_, e)| Arc::ptr_eq(e, &handle.entry)));

        if !owned {
            return false;
        }

        let retired = self.retire(&handle.entry);
        if retired {
            debug!(
                observer = handle.name(),
                target = %handle.target(),
                id = handle.id(),
                "deregistered observer"
            );
        }
        retired
    }

    /// Returns the active observers registered for the executing call's identity.
    ///
    /// Matching is exact on all five fields. A miss costs a single failed map
    /// lookup and allocates nothing.
    #[must_use]
    pub fn lookup(&self, site: &CallSite<'_>) -> Observers {
        let Some(list) = self.find(site) else {
            return Observers::default();
        };

        Observers {
            entries: list
                .iter()
                .map(|(_, entry)| entry)
                .filter(|entry| entry.is_active())
                .cloned()
                .collect(),
        }
    }

    /// Returns the number of active registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    /// Returns `true` if no active registration exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of distinct target keys ever registered.
    #[must_use]
    pub fn targets(&self) -> usize {
        self.targets.len()
    }

    pub(super) fn find(&self, site: &CallSite<'_>) -> Option<ObserverList> {
        self.targets
            .get(site as &dyn MethodIdentity)
            .map(|list| Arc::clone(list.value()))
    }

    pub(super) fn retire(&self, entry: &Registration) -> bool {
        let retired = entry.retire();
        if retired {
            self.live.fetch_sub(1, Ordering::Relaxed);
        }
        retired
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("targets", &self.targets.len())
            .field("observers", &self.len())
            .field("config", &self.config)
            .finish()
    }
}
