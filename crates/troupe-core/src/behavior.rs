//! Behavior sets: the role-specific operations a player gains while cast.
//!
//! A [`BehaviorSet`] is a named, immutable bundle of operations together with
//! the [`BehaviorKind`] that decides how it is attached to a player:
//!
//! - [`BehaviorKind::Mixin`]: cast directly onto a player that implements
//!   [`Castable`](crate::player::Castable)
//! - [`BehaviorKind::Wrapper`]: a [`RoleWrapper`](crate::casting::RoleWrapper)
//!   answers the set's operations and forwards everything else
//! - [`BehaviorKind::Facade`]: a [`Negotiator`](crate::negotiator::Negotiator)
//!   stands in front of the untouched player
//!
//! Operations are invoked by name. Each receives a [`RoleCall`] that exposes
//! the receiver and the owning context, so an operation can reach sibling
//! roles without any ambient state.
//!
//! # Example
//!
//! ```
//! use serde_json::Value;
//! use troupe_core::behavior::{BehaviorKind, BehaviorRegistry, BehaviorSet};
//!
//! let source = BehaviorSet::wrapper("Source").define("withdraw", |call, args| {
//!     let amount = args.first().cloned().unwrap_or(Value::from(1));
//!     call.send_self("debit", &[amount])
//! });
//!
//! assert_eq!(source.kind(), BehaviorKind::Wrapper);
//! assert!(source.defines("withdraw"));
//!
//! let mut registry = BehaviorRegistry::new();
//! registry.register(source);
//! assert!(registry.get(&"Source".into()).is_some());
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::error::{RoleError, RoleResult};
use crate::player::Player;
use crate::role::{BehaviorSetId, RoleName};

// =============================================================================
// Behavior Kind
// =============================================================================

/// Strategy used to attach a behavior set to a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BehaviorKind {
    /// Operations are cast onto the player itself.
    #[serde(alias = "module")]
    Mixin,
    /// A delegating wrapper replaces the player for the duration of the role.
    #[serde(alias = "wrap")]
    Wrapper,
    /// A negotiator proxies calls without touching the player.
    #[serde(alias = "interface")]
    Facade,
}

impl fmt::Display for BehaviorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mixin => write!(f, "mixin"),
            Self::Wrapper => write!(f, "wrapper"),
            Self::Facade => write!(f, "facade"),
        }
    }
}

impl FromStr for BehaviorKind {
    type Err = RoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mixin" | "module" => Ok(Self::Mixin),
            "wrapper" | "wrap" => Ok(Self::Wrapper),
            "facade" | "interface" => Ok(Self::Facade),
            _ => Err(RoleError::UnknownRoleType(s.to_string())),
        }
    }
}

// =============================================================================
// Role Call
// =============================================================================

/// Signature of a behavior-set operation.
pub type Operation = Arc<dyn Fn(&RoleCall<'_>, &[Value]) -> RoleResult<Value> + Send + Sync>;

/// Execution environment of a behavior-set operation.
///
/// - `role`: the role the operation runs for
/// - `receiver`: the role-player the call was addressed to (the player
///   itself for mixins and facades, the wrapper for wrapper roles)
/// - `player`: the plain player underneath the role
/// - `context`: the context whose roles are currently applied
#[derive(Clone, Copy)]
pub struct RoleCall<'a> {
    role: &'a RoleName,
    receiver: &'a dyn Player,
    player: &'a dyn Player,
    context: &'a Context,
}

impl<'a> RoleCall<'a> {
    pub(crate) fn new(
        role: &'a RoleName,
        receiver: &'a dyn Player,
        player: &'a dyn Player,
        context: &'a Context,
    ) -> Self {
        Self {
            role,
            receiver,
            player,
            context,
        }
    }

    /// The role this operation is running for.
    #[must_use]
    pub fn role(&self) -> &'a RoleName {
        self.role
    }

    /// The role-player the call was addressed to.
    #[must_use]
    pub fn receiver(&self) -> &'a dyn Player {
        self.receiver
    }

    /// The plain player bound underneath the role.
    #[must_use]
    pub fn player(&self) -> &'a dyn Player {
        self.player
    }

    /// Downcasts the plain player to its concrete type.
    #[must_use]
    pub fn player_as<T: Player>(&self) -> Option<&'a T> {
        self.player.as_any().downcast_ref::<T>()
    }

    /// The context whose roles are applied.
    #[must_use]
    pub fn context(&self) -> &'a Context {
        self.context
    }

    /// Sends an operation to the receiver, as `self.op(args)` would.
    ///
    /// # Errors
    ///
    /// Propagates whatever the receiver returns.
    pub fn send_self(&self, operation: &str, args: &[Value]) -> RoleResult<Value> {
        self.receiver.call(operation, args, self.context)
    }

    /// Sends an operation to a sibling role of the same context.
    ///
    /// # Errors
    ///
    /// Returns [`RoleError::UnknownRole`] if the context has no such role, or
    /// whatever the sibling role-player returns.
    pub fn send(&self, role: &str, operation: &str, args: &[Value]) -> RoleResult<Value> {
        self.context.send(role, operation, args)
    }
}

impl fmt::Debug for RoleCall<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleCall")
            .field("role", self.role)
            .field("player", &self.player)
            .field("context", &self.context.id())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Behavior Set
// =============================================================================

/// Named bundle of operations attached to a player while it plays a role.
///
/// Behavior sets are built once and never change afterwards; registries and
/// context classes share them through `Arc`.
#[derive(Clone)]
pub struct BehaviorSet {
    id: BehaviorSetId,
    kind: BehaviorKind,
    operations: BTreeMap<String, Operation>,
}

impl BehaviorSet {
    /// Creates an empty behavior set of the given kind.
    #[must_use]
    pub fn new(id: impl Into<BehaviorSetId>, kind: BehaviorKind) -> Self {
        Self {
            id: id.into(),
            kind,
            operations: BTreeMap::new(),
        }
    }

    /// Creates an empty [`BehaviorKind::Mixin`] set.
    #[must_use]
    pub fn mixin(id: impl Into<BehaviorSetId>) -> Self {
        Self::new(id, BehaviorKind::Mixin)
    }

    /// Creates an empty [`BehaviorKind::Wrapper`] set.
    #[must_use]
    pub fn wrapper(id: impl Into<BehaviorSetId>) -> Self {
        Self::new(id, BehaviorKind::Wrapper)
    }

    /// Creates an empty [`BehaviorKind::Facade`] set.
    #[must_use]
    pub fn facade(id: impl Into<BehaviorSetId>) -> Self {
        Self::new(id, BehaviorKind::Facade)
    }

    /// Adds an operation, replacing any earlier one with the same name.
    #[must_use]
    pub fn define<F>(mut self, name: &str, op: F) -> Self
    where
        F: Fn(&RoleCall<'_>, &[Value]) -> RoleResult<Value> + Send + Sync + 'static,
    {
        self.operations.insert(name.to_string(), Arc::new(op));
        self
    }

    /// The identifier this set is registered under.
    #[must_use]
    pub fn id(&self) -> &BehaviorSetId {
        &self.id
    }

    /// How this set is attached to players.
    #[must_use]
    pub fn kind(&self) -> BehaviorKind {
        self.kind
    }

    /// True if the set defines `operation`.
    #[must_use]
    pub fn defines(&self, operation: &str) -> bool {
        self.operations.contains_key(operation)
    }

    /// Looks up an operation by name.
    #[must_use]
    pub fn operation(&self, operation: &str) -> Option<&Operation> {
        self.operations.get(operation)
    }

    /// Operation names in sorted order.
    pub fn operation_names(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    /// Runs `operation` if the set defines it.
    pub(crate) fn invoke(
        &self,
        operation: &str,
        call: &RoleCall<'_>,
        args: &[Value],
    ) -> Option<RoleResult<Value>> {
        self.operations.get(operation).map(|op| op(call, args))
    }
}

impl fmt::Debug for BehaviorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorSet")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("operations", &self.operations.keys().collect::<Vec<_>>())
            .finish()
    }
}

// =============================================================================
// Behavior Registry
// =============================================================================

/// Lookup table from [`BehaviorSetId`] to behavior set.
///
/// Context classes consult their registry at apply and remove time; a role
/// whose identifier is not registered passes through triggers unmodified.
#[derive(Clone, Default)]
pub struct BehaviorRegistry {
    sets: HashMap<BehaviorSetId, Arc<BehaviorSet>>,
}

impl BehaviorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sets: HashMap::new(),
        }
    }

    /// Registers a behavior set under its own identifier.
    ///
    /// Returns the previously registered set with the same identifier, if any.
    pub fn register(&mut self, set: impl Into<Arc<BehaviorSet>>) -> Option<Arc<BehaviorSet>> {
        let set = set.into();
        self.sets.insert(set.id().clone(), set)
    }

    /// Looks up a behavior set by identifier.
    #[must_use]
    pub fn get(&self, id: &BehaviorSetId) -> Option<&Arc<BehaviorSet>> {
        self.sets.get(id)
    }

    /// Number of registered sets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// True if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Iterates over all registered sets in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&BehaviorSetId, &Arc<BehaviorSet>)> {
        self.sets.iter()
    }
}

impl fmt::Debug for BehaviorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.sets.keys().map(BehaviorSetId::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("BehaviorRegistry").field("sets", &ids).finish()
    }
}
