//! The per-context registry of who is playing what.
//!
//! A [`RoleMap`] maps each role name to the identifier of its behavior set and
//! the player currently bound to it. Entries keep declaration order, which is
//! the order roles are applied and removed in.
//!
//! # Example
//!
//! ```
//! use std::any::Any;
//! use std::sync::Arc;
//! use serde_json::Value;
//! use troupe_core::context::Context;
//! use troupe_core::error::{RoleError, RoleResult};
//! use troupe_core::player::{Player, PlayerRef};
//! use troupe_core::role_map::RoleMap;
//!
//! #[derive(Debug)]
//! struct Clerk;
//!
//! impl Player for Clerk {
//!     fn responds_to(&self, _: &str) -> bool {
//!         false
//!     }
//!     fn call(&self, op: &str, _: &[Value], _: &Context) -> RoleResult<Value> {
//!         Err(RoleError::no_method::<Self>(op))
//!     }
//!     fn as_any(&self) -> &dyn Any {
//!         self
//!     }
//! }
//!
//! let clerk: PlayerRef = Arc::new(Clerk);
//! let mut roles = RoleMap::new();
//! roles.update("teller".into(), "Teller".into(), Arc::clone(&clerk));
//!
//! assert!(roles.is_role("teller"));
//! assert!(roles.is_player(&clerk));
//! assert!(!roles.is_player(&(Arc::new(Clerk) as PlayerRef)));
//! ```

use serde::Serialize;

use crate::player::{same_player, PlayerRef};
use crate::role::{BehaviorSetId, RoleName};

/// One entry of a [`RoleMap`].
#[derive(Debug, Clone)]
pub struct RoleBinding {
    role: RoleName,
    behavior: BehaviorSetId,
    player: PlayerRef,
}

impl RoleBinding {
    /// The role name.
    #[must_use]
    pub fn role(&self) -> &RoleName {
        &self.role
    }

    /// Identifier of the role's behavior set.
    #[must_use]
    pub fn behavior(&self) -> &BehaviorSetId {
        &self.behavior
    }

    /// The currently bound player, which may be a role-player while applied.
    #[must_use]
    pub fn player(&self) -> &PlayerRef {
        &self.player
    }

    /// Replaces the bound player, returning the previous one.
    pub(crate) fn rebind(&mut self, player: PlayerRef) -> PlayerRef {
        std::mem::replace(&mut self.player, player)
    }
}

/// Role name to `(behavior set, player)` registry owned by one context.
///
/// A `RoleMap` is never shared between contexts and carries no locking.
#[derive(Debug, Clone, Default)]
pub struct RoleMap {
    bindings: Vec<RoleBinding>,
}

impl RoleMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Sets or overwrites the binding for `role`.
    ///
    /// Overwriting keeps the role's original position in declaration order.
    pub fn update(&mut self, role: RoleName, behavior: BehaviorSetId, player: PlayerRef) {
        match self.bindings.iter_mut().find(|b| b.role == role) {
            Some(binding) => {
                binding.behavior = behavior;
                binding.player = player;
            }
            None => self.bindings.push(RoleBinding {
                role,
                behavior,
                player,
            }),
        }
    }

    /// Iterates over the bindings in declaration order.
    ///
    /// Each call starts a fresh traversal of the current state.
    pub fn iter(&self) -> impl Iterator<Item = &RoleBinding> {
        self.bindings.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut RoleBinding> {
        self.bindings.iter_mut()
    }

    /// True if a binding exists for `name`.
    #[must_use]
    pub fn is_role(&self, name: &str) -> bool {
        self.binding(name).is_some()
    }

    /// True if `candidate` is the player currently bound to some role.
    ///
    /// Compares identity, not structure.
    #[must_use]
    pub fn is_player(&self, candidate: &PlayerRef) -> bool {
        self.bindings
            .iter()
            .any(|b| same_player(&b.player, candidate))
    }

    /// The player currently bound to `name`.
    #[must_use]
    pub fn assigned_player(&self, name: &str) -> Option<&PlayerRef> {
        self.binding(name).map(RoleBinding::player)
    }

    /// The behavior set identifier bound to `name`.
    #[must_use]
    pub fn behavior_of(&self, name: &str) -> Option<&BehaviorSetId> {
        self.binding(name).map(RoleBinding::behavior)
    }

    /// The full binding for `name`.
    #[must_use]
    pub fn binding(&self, name: &str) -> Option<&RoleBinding> {
        self.bindings.iter().find(|b| b.role == name)
    }

    pub(crate) fn binding_mut(&mut self, name: &str) -> Option<&mut RoleBinding> {
        self.bindings.iter_mut().find(|b| b.role == name)
    }

    /// Number of bound roles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// True if no role is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Current players in declaration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PlayerRef> {
        self.bindings.iter().map(|b| PlayerRef::clone(&b.player)).collect()
    }

    /// Role and behavior identifiers in declaration order, without players.
    #[must_use]
    pub fn outline(&self) -> Vec<RoleOutline> {
        self.bindings
            .iter()
            .map(|b| RoleOutline {
                role: b.role.clone(),
                behavior: b.behavior.clone(),
            })
            .collect()
    }
}

/// Serializable description of a binding, used for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleOutline {
    /// The role name.
    pub role: RoleName,
    /// Identifier of the role's behavior set.
    pub behavior: BehaviorSetId,
}
