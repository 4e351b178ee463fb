//! Players: the plain data objects bound to roles.
//!
//! Any type can play a role by implementing [`Player`]. A player answers its
//! own operations by name and reports which ones it supports; the engine
//! never inspects it any further.
//!
//! # Mixin Support
//!
//! Mixin behavior sets are cast onto the player itself, so only players that
//! expose the [`Castable`] capability can take them. [`CastSlots`] provides a
//! ready-made implementation: embed one in the player, return it from
//! [`Player::castable`], and fall back to [`CastSlots::dispatch`] for
//! operations the player does not define natively.
//!
//! ```
//! use std::any::Any;
//! use serde_json::Value;
//! use troupe_core::context::Context;
//! use troupe_core::error::{RoleError, RoleResult};
//! use troupe_core::player::{CastSlots, Castable, Player};
//!
//! #[derive(Debug, Default)]
//! struct Robot {
//!     casts: CastSlots,
//! }
//!
//! impl Player for Robot {
//!     fn responds_to(&self, operation: &str) -> bool {
//!         operation == "beep" || self.casts.responds_to(operation)
//!     }
//!
//!     fn call(&self, operation: &str, args: &[Value], context: &Context) -> RoleResult<Value> {
//!         match operation {
//!             "beep" => Ok(Value::from("beep")),
//!             _ => self
//!                 .casts
//!                 .dispatch(self, operation, args, context)
//!                 .unwrap_or_else(|| Err(RoleError::no_method::<Self>(operation))),
//!         }
//!     }
//!
//!     fn as_any(&self) -> &dyn Any {
//!         self
//!     }
//!
//!     fn castable(&self) -> Option<&dyn Castable> {
//!         Some(&self.casts)
//!     }
//! }
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::behavior::{BehaviorSet, RoleCall};
use crate::context::Context;
use crate::error::RoleResult;
use crate::role::{BehaviorSetId, RoleName};

// =============================================================================
// Player Trait
// =============================================================================

/// A data object that can be bound to a role.
///
/// Players are shared between contexts through [`PlayerRef`], so they must be
/// `Send + Sync`; any mutable state needs interior mutability. The engine does
/// not coordinate access to that state across contexts.
pub trait Player: Any + Send + Sync + fmt::Debug {
    /// True if [`call`](Player::call) can answer `operation`.
    fn responds_to(&self, operation: &str) -> bool;

    /// Invokes `operation` with `args`.
    ///
    /// `context` is the context the call is made through; plain players may
    /// ignore it, role-players use it to reach sibling roles.
    ///
    /// # Errors
    ///
    /// Implementations return [`RoleError::NoMethod`](crate::error::RoleError::NoMethod)
    /// for operations they do not define, or any failure of the operation itself.
    fn call(&self, operation: &str, args: &[Value], context: &Context) -> RoleResult<Value>;

    /// Upcast for downcasting to the concrete player type.
    fn as_any(&self) -> &dyn Any;

    /// The player's cast extension point, if it accepts mixins.
    fn castable(&self) -> Option<&dyn Castable> {
        None
    }
}

/// Shared reference to a player.
pub type PlayerRef = Arc<dyn Player>;

/// Identity comparison of two player references.
#[must_use]
pub fn same_player(a: &PlayerRef, b: &PlayerRef) -> bool {
    Arc::ptr_eq(a, b)
}

/// Downcasts a player reference to its concrete type.
#[must_use]
pub fn downcast_player<T: Player>(player: &PlayerRef) -> Option<&T> {
    player.as_any().downcast_ref::<T>()
}

// =============================================================================
// Castable Capability
// =============================================================================

/// Cast extension point used by [`BehaviorKind::Mixin`](crate::behavior::BehaviorKind::Mixin) roles.
///
/// Casting mutates the player in place: the same object gains the behavior
/// set's operations until it is uncast. A player may carry several casts at
/// once, one per role it plays.
pub trait Castable {
    /// Extends the player with `behavior` for `role`.
    fn cast_as(&self, role: &RoleName, behavior: Arc<BehaviorSet>);

    /// Removes the most recent cast of `behavior` for `role`.
    ///
    /// Returns false if no such cast was active.
    fn uncast(&self, role: &RoleName, behavior: &BehaviorSetId) -> bool;

    /// Identifiers of the behavior sets currently cast, oldest first.
    fn cast_sets(&self) -> Vec<BehaviorSetId>;
}

/// Bookkeeping for the behavior sets cast onto a player.
///
/// Later casts shadow earlier ones when both define the same operation.
#[derive(Default)]
pub struct CastSlots {
    active: RwLock<Vec<(RoleName, Arc<BehaviorSet>)>>,
}

impl CastSlots {
    /// Creates an empty set of slots.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True if no behavior set is cast.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.read().is_empty()
    }

    /// True if some active cast defines `operation`.
    #[must_use]
    pub fn responds_to(&self, operation: &str) -> bool {
        self.active.read().iter().any(|(_, set)| set.defines(operation))
    }

    /// Runs `operation` from the most recent cast that defines it.
    ///
    /// `receiver` is the player owning these slots; it becomes both the
    /// receiver and the plain player of the [`RoleCall`]. Returns `None` when
    /// no active cast defines the operation.
    pub fn dispatch(
        &self,
        receiver: &dyn Player,
        operation: &str,
        args: &[Value],
        context: &Context,
    ) -> Option<RoleResult<Value>> {
        let (role, set) = self.find(operation)?;
        let call = RoleCall::new(&role, receiver, receiver, context);
        set.invoke(operation, &call, args)
    }

    fn find(&self, operation: &str) -> Option<(RoleName, Arc<BehaviorSet>)> {
        // Clone out so the lock is not held while the operation runs.
        self.active
            .read()
            .iter()
            .rev()
            .find(|(_, set)| set.defines(operation))
            .map(|(role, set)| (role.clone(), Arc::clone(set)))
    }
}

impl Castable for CastSlots {
    fn cast_as(&self, role: &RoleName, behavior: Arc<BehaviorSet>) {
        self.active.write().push((role.clone(), behavior));
    }

    fn uncast(&self, role: &RoleName, behavior: &BehaviorSetId) -> bool {
        let mut active = self.active.write();
        match active
            .iter()
            .rposition(|(r, set)| r == role && set.id() == behavior)
        {
            Some(index) => {
                active.remove(index);
                true
            }
            None => false,
        }
    }

    fn cast_sets(&self) -> Vec<BehaviorSetId> {
        self.active
            .read()
            .iter()
            .map(|(_, set)| set.id().clone())
            .collect()
    }
}

impl fmt::Debug for CastSlots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CastSlots")
            .field("active", &self.cast_sets())
            .finish()
    }
}
