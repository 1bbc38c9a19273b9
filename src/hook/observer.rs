//! Observer capability and the closure-based [`Hook`] builder.
//!
//! An [`Observer`] is external code that wants to be told when a specific method is
//! entered and exited. Implement the trait directly for stateful observers, or use
//! [`Hook`] to assemble one from closures:
//!
//! ```rust
//! use hybridscope::hook::{Hook, TargetDescriptor};
//!
//! let hook = Hook::new(
//!     "damage-tracer",
//!     TargetDescriptor::new("Game.dll", "Core", "Player", "TakeDamage", 1),
//! )
//! .pre(|call, args| {
//!     println!("{} #{} amount={}", call.site(), call.call_id(), args[0].as_i32());
//! })
//! .post(|_call, ret| {
//!     println!("returned {:?}", ret.map(|r| r.as_i32()));
//! });
//! ```
//!
//! # Contract
//!
//! Hooks run synchronously on the thread of the intercepted call, inline on the
//! application's hot path. They must return promptly and must not block
//! indefinitely. A hook that panics is contained by the dispatcher: the real method
//! still runs and the other observers are still notified.

use std::{fmt, sync::Arc};

use strum::Display;

use crate::hook::{
    target::{CallSite, MethodIdentity, TargetDescriptor},
    value::ValueCarrier,
};

/// The two notification points of an intercepted call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum HookPhase {
    /// Before the real method body runs.
    Enter,
    /// After the real method body returned.
    Exit,
}

/// Information about the intercepted call, passed to both hooks.
///
/// The context borrows the call-site identity from the trampoline and is only
/// valid for the duration of the hook invocation.
#[derive(Clone, Copy, Debug)]
pub struct CallContext<'a> {
    site: CallSite<'a>,
    call_id: u64,
}

impl<'a> CallContext<'a> {
    pub(crate) fn new(site: CallSite<'a>, call_id: u64) -> Self {
        Self { site, call_id }
    }

    /// Returns the identity of the executing call.
    #[must_use]
    pub fn site(&self) -> &CallSite<'a> {
        &self.site
    }

    /// Returns the dispatch sequence number of this call.
    ///
    /// Entry and exit of the same call observe the same id; concurrent calls on
    /// other threads observe different ids.
    #[must_use]
    pub fn call_id(&self) -> u64 {
        self.call_id
    }
}

/// A party interested in entry and exit of one method.
///
/// The registry takes shared, indefinite ownership of registered observers and may
/// invoke them from any number of threads at once, so implementations must be
/// `Send + Sync`.
///
/// # Examples
///
/// ```rust
/// use std::sync::atomic::{AtomicU64, Ordering};
/// use hybridscope::hook::{CallContext, Observer, TargetDescriptor, ValueCarrier};
///
/// struct CallCounter {
///     target: TargetDescriptor,
///     calls: AtomicU64,
/// }
///
/// impl Observer for CallCounter {
///     fn target(&self) -> &TargetDescriptor {
///         &self.target
///     }
///
///     fn on_enter(&self, _call: &CallContext<'_>, _args: &[ValueCarrier]) {
///         self.calls.fetch_add(1, Ordering::Relaxed);
///     }
///
///     fn on_exit(&self, _call: &CallContext<'_>, _ret: Option<&ValueCarrier>) {}
/// }
/// ```
pub trait Observer: Send + Sync {
    /// The method this observer is interested in.
    fn target(&self) -> &TargetDescriptor;

    /// Name used in diagnostics. Defaults to `Type::Method`.
    fn name(&self) -> String {
        let target = self.target();
        format!("{}::{}", target.class(), target.method())
    }

    /// Called before the real method body runs.
    ///
    /// # Arguments
    ///
    /// * `call` - Identity and sequence number of the call
    /// * `args` - One carrier per declared parameter, in declaration order; which
    ///   member each carrier holds is defined by the method's signature
    fn on_enter(&self, call: &CallContext<'_>, args: &[ValueCarrier]);

    /// Called after the real method body returned.
    ///
    /// # Arguments
    ///
    /// * `call` - Identity and sequence number of the call
    /// * `ret` - The return value, `None` for `void` methods
    fn on_exit(&self, call: &CallContext<'_>, ret: Option<&ValueCarrier>);
}

/// Type alias for entry-hook closures.
pub type EnterFn = Arc<dyn Fn(&CallContext<'_>, &[ValueCarrier]) + Send + Sync>;

/// Type alias for exit-hook closures.
pub type ExitFn = Arc<dyn Fn(&CallContext<'_>, Option<&ValueCarrier>) + Send + Sync>;

/// An observer assembled from closures.
///
/// Either handler may be omitted; a missing handler is a no-op.
#[derive(Clone)]
pub struct Hook {
    name: String,
    target: TargetDescriptor,
    enter: Option<EnterFn>,
    exit: Option<ExitFn>,
}

impl Hook {
    /// Creates a hook with no handlers.
    ///
    /// # Arguments
    ///
    /// * `name` - A descriptive name, used in diagnostics
    /// * `target` - The method to observe
    #[must_use]
    pub fn new(name: impl Into<String>, target: TargetDescriptor) -> Self {
        Self {
            name: name.into(),
            target,
            enter: None,
            exit: None,
        }
    }

    /// Sets the entry handler.
    #[must_use]
    pub fn pre<F>(mut self, handler: F) -> Self
    where
        F: Fn(&CallContext<'_>, &[ValueCarrier]) + Send + Sync + 'static,
    {
        self.enter = Some(Arc::new(handler));
        self
    }

    /// Sets the exit handler.
    #[must_use]
    pub fn post<F>(mut self, handler: F) -> Self
    where
        F: Fn(&CallContext<'_>, Option<&ValueCarrier>) + Send + Sync + 'static,
    {
        self.exit = Some(Arc::new(handler));
        self
    }

    /// Returns true if an entry handler is set.
    #[must_use]
    pub fn has_pre_hook(&self) -> bool {
        self.enter.is_some()
    }

    /// Returns true if an exit handler is set.
    #[must_use]
    pub fn has_post_hook(&self) -> bool {
        self.exit.is_some()
    }
}

impl Observer for Hook {
    fn target(&self) -> &TargetDescriptor {
        &self.target
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn on_enter(&self, call: &CallContext<'_>, args: &[ValueCarrier]) {
        if let Some(handler) = &self.enter {
            handler(call, args);
        }
    }

    fn on_exit(&self, call: &CallContext<'_>, ret: Option<&ValueCarrier>) {
        if let Some(handler) = &self.exit {
            handler(call, ret);
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("has_enter", &self.enter.is_some())
            .field("has_exit", &self.exit.is_some())
            .finish()
    }
}
