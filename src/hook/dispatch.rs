//! Dispatch of matched calls to their observers.
//!
//! This is the core side of the trampoline contract. The runtime integration layer
//! resolves an intercepted call to a [`CallSite`], builds one [`ValueCarrier`] per
//! argument, and hands both to the registry:
//!
//! ```text
//! Method call intercepted
//!         │
//!         ▼
//! ┌───────────────────┐
//! │  Registry::enter  │───► No match ───► Run original, nothing else
//! └───────────────────┘
//!         │ Match found (snapshot taken)
//!         ▼
//! ┌───────────────────┐
//! │  on_enter, each   │     registration order, panics contained
//! │  observer         │
//! └───────────────────┘
//!         │
//!         ▼
//! ┌───────────────────┐
//! │  Run original     │     untouched by hook failures
//! └───────────────────┘
//!         │
//!         ▼
//! ┌───────────────────┐
//! │  CallFrame::exit  │     same observers, same order
//! └───────────────────┘
//! ```
//!
//! Trampolines that wrap the original method in a closure can use
//! [`Registry::dispatch`], which runs all three steps.
//!
//! # Failure Containment
//!
//! Each hook invocation runs under [`catch_unwind`](std::panic::catch_unwind). A
//! panicking hook is logged and counted; the remaining observers still run and the
//! original method always executes. With
//! [`RegistryConfig::quarantine_after`](crate::hook::RegistryConfig::quarantine_after)
//! set, repeatedly failing observers are tombstoned. Builds with `panic = "abort"`
//! cannot contain panics at all.
//!
//! # Re-entrancy
//!
//! While a thread is inside a hook of a registry, further intercepted calls on that
//! thread are not dispatched by the same registry (unless
//! [`suppress_reentrant`](crate::hook::RegistryConfig::suppress_reentrant) is
//! disabled). Other registries still dispatch, and nested calls made by the original
//! method body are unaffected.

use std::{
    any::Any,
    cell::RefCell,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use tracing::{trace, warn};

use crate::hook::{
    observer::{CallContext, HookPhase},
    registry::{Registration, Registry},
    target::CallSite,
    value::ValueCarrier,
};

thread_local! {
    /// Registries whose hooks are running on this thread, innermost last.
    static ACTIVE_HOOKS: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks the current thread as running a hook of one registry until dropped.
struct HookScope {
    registry: usize,
}

impl HookScope {
    fn enter(registry: &Registry) -> Self {
        let registry = registry_key(registry);
        let _ = ACTIVE_HOOKS.try_with(|active| {
            if let Ok(mut active) = active.try_borrow_mut() {
                active.push(registry);
            }
        });
        HookScope { registry }
    }

    /// `false` during thread teardown, when the thread-local is gone.
    fn is_active(registry: &Registry) -> bool {
        let registry = registry_key(registry);
        ACTIVE_HOOKS
            .try_with(|active| {
                active
                    .try_borrow()
                    .is_ok_and(|active| active.contains(&registry))
            })
            .unwrap_or(false)
    }
}

impl Drop for HookScope {
    fn drop(&mut self) {
        let _ = ACTIVE_HOOKS.try_with(|active| {
            if let Ok(mut active) = active.try_borrow_mut() {
                if let Some(pos) = active.iter().rposition(|&r| r == self.registry) {
                    active.remove(pos);
                }
            }
        });
    }
}

fn registry_key(registry: &Registry) -> usize {
    std::ptr::from_ref(registry) as usize
}

#[derive(Default)]
pub(crate) struct StatsCounters {
    matched_calls: AtomicU64,
    hook_invocations: AtomicU64,
    hook_failures: AtomicU64,
    quarantined: AtomicU64,
    suppressed: AtomicU64,
}

impl StatsCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time dispatch counters of a [`Registry`].
///
/// Lookup misses are deliberately not counted, so unmatched calls touch no shared
/// counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Calls that matched at least one active observer.
    pub matched_calls: u64,
    /// Individual entry and exit hook invocations.
    pub hook_invocations: u64,
    /// Hook invocations that panicked and were contained.
    pub hook_failures: u64,
    /// Observers tombstoned after exceeding the failure limit.
    pub quarantined: u64,
    /// Matching calls skipped because the thread was already inside a hook.
    pub suppressed: u64,
}

/// An intercepted call between its entry and exit notifications.
///
/// Returned by [`Registry::enter`]. Holds the observer snapshot taken at entry so
/// that [`exit`](Self::exit) notifies exactly the observers that saw entry, in the
/// same order, regardless of registrations or deregistrations in between.
///
/// Dropping a frame without calling `exit` skips the exit notifications, which is
/// what a trampoline does when the original method unwinds.
#[must_use = "exit hooks only run when the frame is exited"]
pub struct CallFrame<'r, 's> {
    registry: &'r Registry,
    site: CallSite<'s>,
    call_id: u64,
    observers: Vec<Arc<Registration>>,
}

impl CallFrame<'_, '_> {
    /// Returns the dispatch sequence number, or `None` if nothing matched.
    #[must_use]
    pub fn call_id(&self) -> Option<u64> {
        (!self.observers.is_empty()).then_some(self.call_id)
    }

    /// Returns `true` if no observer was notified on entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Returns the number of observers notified on entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Delivers the return value to every observer that saw entry.
    ///
    /// # Arguments
    ///
    /// * `ret` - The return value, `None` for `void` methods
    pub fn exit(self, ret: Option<&ValueCarrier>) {
        if self.observers.is_empty() {
            return;
        }

        let call = CallContext::new(self.site, self.call_id);
        for entry in &self.observers {
            self.registry.invoke(entry, HookPhase::Exit, || {
                entry.observer().on_exit(&call, ret);
            });
        }
    }
}

impl fmt::Debug for CallFrame<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallFrame")
            .field("site", &self.site)
            .field("call_id", &self.call_id())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Registry {
    /// Dispatches the entry notifications of an intercepted call.
    ///
    /// Looks up the observers for `site` and invokes their entry hooks in
    /// registration order. The returned frame must be exited after the original
    /// method returns to deliver the exit notifications.
    ///
    /// # Arguments
    ///
    /// * `site` - Identity of the executing call
    /// * `args` - One carrier per declared parameter, in declaration order
    pub fn enter<'r, 's>(
        &'r self,
        site: &CallSite<'s>,
        args: &[ValueCarrier],
    ) -> CallFrame<'r, 's> {
        let mut frame = CallFrame {
            registry: self,
            site: *site,
            call_id: 0,
            observers: Vec::new(),
        };

        if self.config.suppress_reentrant && HookScope::is_active(self) {
            if self.find(site).is_some() {
                StatsCounters::bump(&self.stats.suppressed);
                trace!(site = %site, "suppressed re-entrant dispatch");
            }
            return frame;
        }

        let observers = self.lookup(site);
        if observers.is_empty() {
            return frame;
        }

        frame.call_id = self.next_call.fetch_add(1, Ordering::Relaxed) + 1;
        frame.observers = observers.into_entries();
        StatsCounters::bump(&self.stats.matched_calls);

        let call = CallContext::new(*site, frame.call_id);
        for entry in &frame.observers {
            self.invoke(entry, HookPhase::Enter, || {
                entry.observer().on_enter(&call, args);
            });
        }

        frame
    }

    /// Dispatches a complete intercepted call.
    ///
    /// Runs the entry hooks, then `original`, then the exit hooks, and returns the
    /// original's return value unchanged. `original` runs exactly once whether or
    /// not anything matched and whatever the hooks do.
    ///
    /// # Arguments
    ///
    /// * `site` - Identity of the executing call
    /// * `args` - One carrier per declared parameter, in declaration order
    /// * `original` - The real method body; returns `None` for `void` methods
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hybridscope::hook::{CallSite, Hook, Registry, TargetDescriptor, ValueCarrier};
    ///
    /// let registry = Registry::new();
    /// registry.register(
    ///     Hook::new("tracer", TargetDescriptor::new("Game.dll", "Core", "Player", "TakeDamage", 1))
    ///         .pre(|_, args| assert_eq!(args[0].as_i32(), 25)),
    /// );
    ///
    /// let site = CallSite::new("Game.dll", "Core", "Player", "TakeDamage", 1);
    /// let ret = registry.dispatch(&site, &[ValueCarrier::from_i32(25)], || {
    ///     Some(ValueCarrier::from_i32(0))
    /// });
    /// assert_eq!(ret.map(|r| r.as_i32()), Some(0));
    /// ```
    pub fn dispatch<F>(
        &self,
        site: &CallSite<'_>,
        args: &[ValueCarrier],
        original: F,
    ) -> Option<ValueCarrier>
    where
        F: FnOnce() -> Option<ValueCarrier>,
    {
        let frame = self.enter(site, args);
        let ret = original();
        frame.exit(ret.as_ref());
        ret
    }

    /// Returns a snapshot of the dispatch counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        DispatchStats {
            matched_calls: load(&self.stats.matched_calls),
            hook_invocations: load(&self.stats.hook_invocations),
            hook_failures: load(&self.stats.hook_failures),
            quarantined: load(&self.stats.quarantined),
            suppressed: load(&self.stats.suppressed),
        }
    }

    fn invoke(&self, entry: &Registration, phase: HookPhase, hook: impl FnOnce()) {
        StatsCounters::bump(&self.stats.hook_invocations);

        let outcome = {
            let _scope = HookScope::enter(self);
            panic::catch_unwind(AssertUnwindSafe(hook))
        };
        let Err(payload) = outcome else {
            return;
        };

        StatsCounters::bump(&self.stats.hook_failures);
        let failures = entry.record_failure();
        warn!(
            observer = entry.name(),
            phase = %phase,
            failures,
            "observer hook panicked: {}",
            panic_message(payload.as_ref())
        );

        if let Some(limit) = self.config.quarantine_after {
            if failures >= limit && self.retire(entry) {
                StatsCounters::bump(&self.stats.quarantined);
                warn!(observer = entry.name(), failures, "observer quarantined");
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}
