//! The casting protocol: turning players into role-players and back.
//!
//! [`apply_role`] and [`remove_role`] work on a single [`RoleBinding`] and
//! dispatch on the role's [`BehaviorKind`]:
//!
//! | Kind    | apply                                   | remove                              |
//! |---------|-----------------------------------------|-------------------------------------|
//! | Mixin   | [`Castable::cast_as`] on the player     | [`Castable::uncast`]                |
//! | Wrapper | bind a [`RoleWrapper`] around the player | bind the wrapped player again      |
//! | Facade  | bind a registered [`Negotiator`]        | deregister, bind the player again   |
//!
//! A role with no registered behavior set, or a mixin role whose player has
//! no cast extension point, passes through unmodified.
//!
//! Every role is cast independently, so a context applies and removes its
//! roles in the same declaration order.

use std::any::Any;
use std::sync::Arc;

use serde_json::Value;

use crate::behavior::{BehaviorKind, BehaviorSet, RoleCall};
use crate::context::Context;
use crate::error::RoleResult;
use crate::negotiator::{Negotiator, NegotiatorLedger};
use crate::player::{downcast_player, Castable, Player, PlayerRef};
use crate::role::RoleName;
use crate::role_map::RoleBinding;

// =============================================================================
// Role Wrapper
// =============================================================================

/// Delegating role-player for [`BehaviorKind::Wrapper`] roles.
///
/// Operations defined by the behavior set run with the wrapper as receiver;
/// every other call is forwarded unchanged to the wrapped player.
#[derive(Debug)]
pub struct RoleWrapper {
    role: RoleName,
    player: PlayerRef,
    behavior: Arc<BehaviorSet>,
}

impl RoleWrapper {
    /// Wraps `player` with the operations of `behavior`.
    #[must_use]
    pub fn new(role: RoleName, player: PlayerRef, behavior: Arc<BehaviorSet>) -> Self {
        Self {
            role,
            player,
            behavior,
        }
    }

    /// The role this wrapper plays.
    #[must_use]
    pub fn role(&self) -> &RoleName {
        &self.role
    }

    /// The behavior set providing the added operations.
    #[must_use]
    pub fn behavior(&self) -> &Arc<BehaviorSet> {
        &self.behavior
    }

    /// Borrows the wrapped player.
    #[must_use]
    pub fn wrapped(&self) -> &PlayerRef {
        &self.player
    }

    /// Returns a reference to the originally wrapped player.
    #[must_use]
    pub fn unwrap_player(&self) -> PlayerRef {
        PlayerRef::clone(&self.player)
    }
}

impl Player for RoleWrapper {
    fn responds_to(&self, operation: &str) -> bool {
        self.behavior.defines(operation) || self.player.responds_to(operation)
    }

    fn call(&self, operation: &str, args: &[Value], context: &Context) -> RoleResult<Value> {
        let call = RoleCall::new(&self.role, self, self.player.as_ref(), context);
        match self.behavior.invoke(operation, &call, args) {
            Some(result) => result,
            None => self.player.call(operation, args, context),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn castable(&self) -> Option<&dyn Castable> {
        self.player.castable()
    }
}

// =============================================================================
// Apply / Remove
// =============================================================================

/// What a casting step did to a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOutcome {
    /// The behavior set was attached or detached using the given strategy.
    Cast(BehaviorKind),
    /// The player was left as it was.
    PassedThrough,
}

/// Turns the player of `binding` into a role-player.
///
/// `behavior` is the set registered for the binding's identifier, if any.
/// Wrapper and facade roles rebind the entry to the new role-player; facade
/// negotiators are registered in `ledger` before they are bound.
pub fn apply_role(
    binding: &mut RoleBinding,
    behavior: Option<&Arc<BehaviorSet>>,
    ledger: &mut NegotiatorLedger,
) -> CastOutcome {
    let Some(behavior) = behavior else {
        tracing::debug!(
            role = %binding.role(),
            behavior = %binding.behavior(),
            "no behavior set registered, player passes through"
        );
        return CastOutcome::PassedThrough;
    };

    let role = binding.role().clone();
    let player = PlayerRef::clone(binding.player());

    match behavior.kind() {
        BehaviorKind::Mixin => {
            let Some(castable) = player.castable() else {
                tracing::debug!(
                    role = %role,
                    behavior = %behavior.id(),
                    "player has no cast extension point, mixin skipped"
                );
                return CastOutcome::PassedThrough;
            };
            castable.cast_as(&role, Arc::clone(behavior));
        }
        BehaviorKind::Wrapper => {
            let wrapper = RoleWrapper::new(role.clone(), player, Arc::clone(behavior));
            binding.rebind(Arc::new(wrapper));
        }
        BehaviorKind::Facade => {
            let negotiator =
                Negotiator::new(role.clone(), player, Arc::clone(behavior), ledger.context());
            negotiator.register(ledger);
            binding.rebind(Arc::new(negotiator));
        }
    }

    tracing::debug!(
        context = %ledger.context(),
        role = %role,
        behavior = %behavior.id(),
        kind = %behavior.kind(),
        "role applied"
    );
    CastOutcome::Cast(behavior.kind())
}

/// Restores the plain player of `binding`.
///
/// Reverses [`apply_role`]. Bindings that were never cast, such as a
/// pass-through mixin, are left untouched.
pub fn remove_role(
    binding: &mut RoleBinding,
    behavior: Option<&Arc<BehaviorSet>>,
    ledger: &mut NegotiatorLedger,
) -> CastOutcome {
    let Some(behavior) = behavior else {
        return CastOutcome::PassedThrough;
    };

    let removed = match behavior.kind() {
        BehaviorKind::Mixin => binding
            .player()
            .castable()
            .is_some_and(|castable| castable.uncast(binding.role(), behavior.id())),
        BehaviorKind::Wrapper => {
            let original =
                downcast_player::<RoleWrapper>(binding.player()).map(RoleWrapper::unwrap_player);
            match original {
                Some(original) => {
                    binding.rebind(original);
                    true
                }
                None => false,
            }
        }
        BehaviorKind::Facade => {
            let original = downcast_player::<Negotiator>(binding.player()).map(|negotiator| {
                negotiator.deregister(ledger);
                PlayerRef::clone(negotiator.player())
            });
            match original {
                Some(original) => {
                    binding.rebind(original);
                    true
                }
                None => false,
            }
        }
    };

    if !removed {
        return CastOutcome::PassedThrough;
    }

    tracing::debug!(
        context = %ledger.context(),
        role = %binding.role(),
        behavior = %behavior.id(),
        kind = %behavior.kind(),
        "role removed"
    );
    CastOutcome::Cast(behavior.kind())
}
