//! Method identities and exact-match keys.
//!
//! A method of interest is named by five fields: module, namespace, declaring
//! type, method name and declared parameter count. This module provides both
//! sides of the match:
//!
//! - [`TargetDescriptor`]: The owned, immutable identity an observer registers for
//! - [`CallSite`]: The borrowed identity of a call being executed
//! - [`MethodIdentity`]: The trait both implement, which defines the matching key
//!
//! # Matching
//!
//! Matching is exact: string equality on all four textual fields and integer
//! equality on the parameter count. There are no wildcards, no partial matches and
//! no namespace hierarchy traversal.
//!
//! Overloads are told apart by parameter count alone. Two overloads that share a
//! name and a parameter count map to the same key and cannot be distinguished.
//!
//! # Allocation-Free Lookup
//!
//! The registry stores [`TargetDescriptor`] keys but is queried with [`CallSite`]
//! values. Both hash and compare through `dyn MethodIdentity`, and the descriptor
//! implements [`Borrow`] into that trait object, so a lookup never has to build an
//! owned key.
//!
//! ```rust
//! use hybridscope::hook::{CallSite, MethodIdentity, TargetDescriptor};
//!
//! let target = TargetDescriptor::new("Game.dll", "Core", "Player", "TakeDamage", 1);
//! let site = CallSite::new("Game.dll", "Core", "Player", "TakeDamage", 1);
//!
//! assert!(target.matches(&site));
//! assert!(!target.matches(&CallSite::new("Game.dll", "Core", "Player", "TakeDamage", 2)));
//! ```

use std::{
    borrow::Borrow,
    fmt,
    hash::{Hash, Hasher},
};

/// The five fields that identify a method for matching.
///
/// Implemented by [`TargetDescriptor`] and [`CallSite`]. Equality and hashing of
/// `dyn MethodIdentity` are defined over exactly these fields, which makes the
/// trait object the borrowed form of registry keys.
pub trait MethodIdentity {
    /// Name of the containing module (e.g. `Assembly-CSharp.dll`).
    fn module(&self) -> &str;

    /// Namespace of the declaring type; empty for global types.
    fn namespace(&self) -> &str;

    /// Name of the declaring type.
    fn class(&self) -> &str;

    /// Name of the method.
    fn method(&self) -> &str;

    /// Declared parameter count, excluding the implicit `this`.
    fn param_count(&self) -> u32;

    /// Returns `true` if `other` names the same method under exact matching.
    fn matches(&self, other: &dyn MethodIdentity) -> bool {
        self.param_count() == other.param_count()
            && self.method() == other.method()
            && self.class() == other.class()
            && self.namespace() == other.namespace()
            && self.module() == other.module()
    }
}

impl Hash for dyn MethodIdentity + '_ {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.module().hash(state);
        self.namespace().hash(state);
        self.class().hash(state);
        self.method().hash(state);
        self.param_count().hash(state);
    }
}

impl PartialEq for dyn MethodIdentity + '_ {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other)
    }
}

impl Eq for dyn MethodIdentity + '_ {}

impl fmt::Debug for dyn MethodIdentity + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_identity(self, f)
    }
}

fn write_identity(id: &(impl MethodIdentity + ?Sized), f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{}]", id.module())?;
    if !id.namespace().is_empty() {
        write!(f, "{}.", id.namespace())?;
    }
    write!(f, "{}::{}/{}", id.class(), id.method(), id.param_count())
}

/// Immutable identity of a method an observer is interested in.
///
/// Created once at registration time and never mutated. The descriptor need not
/// be unique: any number of observers may register the same one and all of them
/// are notified.
///
/// Empty method names and similar malformed descriptors are accepted; they simply
/// never match a real call site.
#[derive(Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    module: String,
    namespace: String,
    class: String,
    method: String,
    param_count: u32,
}

impl TargetDescriptor {
    /// Creates a new target descriptor.
    ///
    /// # Arguments
    ///
    /// * `module` - Containing module, e.g. `"Assembly-CSharp.dll"`
    /// * `namespace` - Namespace of the declaring type, `""` for global types
    /// * `class` - Declaring type name
    /// * `method` - Method name
    /// * `param_count` - Declared parameter count, used to separate overloads
    #[must_use]
    pub fn new(
        module: impl Into<String>,
        namespace: impl Into<String>,
        class: impl Into<String>,
        method: impl Into<String>,
        param_count: u32,
    ) -> Self {
        Self {
            module: module.into(),
            namespace: namespace.into(),
            class: class.into(),
            method: method.into(),
            param_count,
        }
    }

    /// Returns the borrowed call-site form of this descriptor.
    #[must_use]
    pub fn as_call_site(&self) -> CallSite<'_> {
        CallSite::new(
            &self.module,
            &self.namespace,
            &self.class,
            &self.method,
            self.param_count,
        )
    }
}

impl MethodIdentity for TargetDescriptor {
    fn module(&self) -> &str {
        &self.module
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn class(&self) -> &str {
        &self.class
    }

    fn method(&self) -> &str {
        &self.method
    }

    fn param_count(&self) -> u32 {
        self.param_count
    }
}

// Must agree with the `dyn MethodIdentity` impl for `Borrow` lookups to work.
impl Hash for TargetDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self as &dyn MethodIdentity).hash(state);
    }
}

impl<'a> Borrow<dyn MethodIdentity + 'a> for TargetDescriptor {
    fn borrow(&self) -> &(dyn MethodIdentity + 'a) {
        self
    }
}

impl fmt::Debug for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_identity(self, f)
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_identity(self, f)
    }
}

impl From<CallSite<'_>> for TargetDescriptor {
    fn from(site: CallSite<'_>) -> Self {
        TargetDescriptor::new(
            site.module,
            site.namespace,
            site.class,
            site.method,
            site.param_count,
        )
    }
}

/// Identity of a call being executed, as resolved by the trampoline.
///
/// Borrows its strings from the runtime's method tables, so building one on the
/// dispatch path costs nothing.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallSite<'a> {
    /// Containing module.
    pub module: &'a str,
    /// Namespace of the declaring type; empty for global types.
    pub namespace: &'a str,
    /// Declaring type name.
    pub class: &'a str,
    /// Method name.
    pub method: &'a str,
    /// Declared parameter count.
    pub param_count: u32,
}

impl<'a> CallSite<'a> {
    /// Creates a call-site identity from its five matching fields.
    #[must_use]
    pub fn new(
        module: &'a str,
        namespace: &'a str,
        class: &'a str,
        method: &'a str,
        param_count: u32,
    ) -> Self {
        Self {
            module,
            namespace,
            class,
            method,
            param_count,
        }
    }
}

impl MethodIdentity for CallSite<'_> {
    fn module(&self) -> &str {
        self.module
    }

    fn namespace(&self) -> &str {
        self.namespace
    }

    fn class(&self) -> &str {
        self.class
    }

    fn method(&self) -> &str {
        self.method
    }

    fn param_count(&self) -> u32 {
        self.param_count
    }
}

impl fmt::Debug for CallSite<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_identity(self, f)
    }
}

impl fmt::Display for CallSite<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_identity(self, f)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::hash_map::DefaultHasher, collections::HashMap};

    use super::*;

    fn hash_of(id: &dyn MethodIdentity) -> u64 {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_descriptor_and_site_hash_alike() {
        let target = TargetDescriptor::new("Game.dll", "Core", "Player", "TakeDamage", 1);
        let site = CallSite::new("Game.dll", "Core", "Player", "TakeDamage", 1);

        assert_eq!(hash_of(&target), hash_of(&site));

        let mut hasher = DefaultHasher::new();
        target.hash(&mut hasher);
        assert_eq!(hasher.finish(), hash_of(&site));
    }

    #[test]
    fn test_exact_match_on_every_field() {
        let target = TargetDescriptor::new("Game.dll", "Core", "Player", "TakeDamage", 1);

        assert!(target.matches(&CallSite::new("Game.dll", "Core", "Player", "TakeDamage", 1)));
        assert!(!target.matches(&CallSite::new("Other.dll", "Core", "Player", "TakeDamage", 1)));
        assert!(!target.matches(&CallSite::new("Game.dll", "", "Player", "TakeDamage", 1)));
        assert!(!target.matches(&CallSite::new("Game.dll", "Core", "Enemy", "TakeDamage", 1)));
        assert!(!target.matches(&CallSite::new("Game.dll", "Core", "Player", "Heal", 1)));
        assert!(!target.matches(&CallSite::new("Game.dll", "Core", "Player", "TakeDamage", 0)));
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let target = TargetDescriptor::new("Game.dll", "Core", "Player", "TakeDamage", 1);
        assert!(!target.matches(&CallSite::new("game.dll", "Core", "Player", "TakeDamage", 1)));
    }

    #[test]
    fn test_borrowed_lookup() {
        let mut map = HashMap::new();
        map.insert(
            TargetDescriptor::new("Game.dll", "Core", "Player", "TakeDamage", 1),
            "damage",
        );
        map.insert(
            TargetDescriptor::new("Game.dll", "Core", "Player", "TakeDamage", 2),
            "damage-overload",
        );

        let site = CallSite::new("Game.dll", "Core", "Player", "TakeDamage", 2);
        assert_eq!(
            map.get(&site as &dyn MethodIdentity),
            Some(&"damage-overload")
        );

        let miss = CallSite::new("Game.dll", "Core", "Player", "Heal", 1);
        assert_eq!(map.get(&miss as &dyn MethodIdentity), None);
    }

    #[test]
    fn test_display() {
        let target = TargetDescriptor::new("Game.dll", "Core", "Player", "TakeDamage", 1);
        assert_eq!(target.to_string(), "[Game.dll]Core.Player::TakeDamage/1");

        let global = CallSite::new("Game.dll", "", "Main", "Start", 0);
        assert_eq!(global.to_string(), "[Game.dll]Main::Start/0");
    }

    #[test]
    fn test_round_trip_through_call_site() {
        let target = TargetDescriptor::new("Game.dll", "Core", "Player", "TakeDamage", 1);
        assert_eq!(TargetDescriptor::from(target.as_call_site()), target);
    }
}
