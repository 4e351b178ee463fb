//! Negotiators: proxies realizing [`BehaviorKind::Facade`](crate::behavior::BehaviorKind::Facade) roles.
//!
//! A facade role leaves its player untouched. While the role is applied the
//! context binds a [`Negotiator`] in the player's place, which answers calls
//! in this order:
//!
//! 1. the player itself, if it natively supports the operation
//! 2. the role's behavior set, run with the player as receiver
//! 3. otherwise [`RoleError::Unsupported`] naming the role and operation
//!
//! A negotiator refers back to its owning context by [`ContextId`] and must
//! be registered in that context's [`NegotiatorLedger`] to answer anything.
//! Removal deregisters it, so a negotiator that escaped a trigger answers
//! with [`RoleError::Detached`] instead of acting on stale bindings. The
//! ledger records which negotiator holds each role, so one discarded by
//! [`Context::reassign`] stays detached after its successor registers.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::behavior::{BehaviorSet, RoleCall};
use crate::context::Context;
use crate::error::{RoleError, RoleResult};
use crate::player::{Player, PlayerRef};
use crate::role::{ContextId, RoleName};

// =============================================================================
// Negotiator Ledger
// =============================================================================

/// Roles of one context that currently have a live negotiator.
#[derive(Debug, Clone)]
pub struct NegotiatorLedger {
    context: ContextId,
    registered: BTreeMap<RoleName, u64>,
}

impl NegotiatorLedger {
    /// Creates an empty ledger owned by `context`.
    #[must_use]
    pub fn new(context: ContextId) -> Self {
        Self {
            context,
            registered: BTreeMap::new(),
        }
    }

    /// The owning context.
    #[must_use]
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// True if a negotiator for `role` is registered.
    #[must_use]
    pub fn is_registered(&self, role: &RoleName) -> bool {
        self.registered.contains_key(role)
    }

    /// Number of registered negotiators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registered.len()
    }

    /// True if no negotiator is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }
}

// =============================================================================
// Negotiator
// =============================================================================

/// Proxy bound in place of a facade role's player while the role is applied.
#[derive(Debug)]
pub struct Negotiator {
    role: RoleName,
    player: PlayerRef,
    behavior: Arc<BehaviorSet>,
    context: ContextId,
    ticket: u64,
}

static NEXT_TICKET: AtomicU64 = AtomicU64::new(1);

impl Negotiator {
    /// Creates a negotiator for `player` playing `role` in `context`.
    ///
    /// The negotiator answers nothing until it is [registered](Self::register).
    #[must_use]
    pub fn new(
        role: RoleName,
        player: PlayerRef,
        behavior: Arc<BehaviorSet>,
        context: ContextId,
    ) -> Self {
        Self {
            role,
            player,
            behavior,
            context,
            ticket: NEXT_TICKET.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Registers with the owning context's ledger.
    ///
    /// Returns false if `ledger` belongs to another context.
    pub fn register(&self, ledger: &mut NegotiatorLedger) -> bool {
        if ledger.context != self.context {
            return false;
        }
        ledger.registered.insert(self.role.clone(), self.ticket);
        true
    }

    /// Removes this negotiator's registration, returning whether it was present.
    ///
    /// A registration held by another negotiator for the same role is kept.
    pub fn deregister(&self, ledger: &mut NegotiatorLedger) -> bool {
        if !self.holds(ledger) {
            return false;
        }
        ledger.registered.remove(&self.role);
        true
    }

    /// The role this negotiator stands in for.
    #[must_use]
    pub fn role(&self) -> &RoleName {
        &self.role
    }

    /// The untouched player behind the negotiator.
    #[must_use]
    pub fn player(&self) -> &PlayerRef {
        &self.player
    }

    /// The facade behavior set.
    #[must_use]
    pub fn behavior(&self) -> &Arc<BehaviorSet> {
        &self.behavior
    }

    /// The owning context.
    #[must_use]
    pub fn context(&self) -> ContextId {
        self.context
    }

    fn holds(&self, ledger: &NegotiatorLedger) -> bool {
        ledger.context == self.context && ledger.registered.get(&self.role) == Some(&self.ticket)
    }

    fn is_attached_to(&self, context: &Context) -> bool {
        context.id() == self.context && self.holds(context.negotiators())
    }
}

impl Player for Negotiator {
    fn responds_to(&self, operation: &str) -> bool {
        self.player.responds_to(operation) || self.behavior.defines(operation)
    }

    fn call(&self, operation: &str, args: &[Value], context: &Context) -> RoleResult<Value> {
        if !self.is_attached_to(context) {
            return Err(RoleError::Detached {
                role: self.role.to_string(),
            });
        }

        if self.player.responds_to(operation) {
            tracing::trace!(role = %self.role, operation, "negotiator delegating to player");
            return self.player.call(operation, args, context);
        }

        let player = self.player.as_ref();
        let call = RoleCall::new(&self.role, player, player, context);
        match self.behavior.invoke(operation, &call, args) {
            Some(result) => {
                tracing::trace!(role = %self.role, operation, "negotiator ran role operation");
                result
            }
            None => Err(RoleError::unsupported(self.role.as_str(), operation)),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
