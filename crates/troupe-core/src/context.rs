//! Contexts: declaring role scenarios and running their triggers.
//!
//! A [`ContextClass`] is the declaration of an interaction scenario: an
//! ordered list of roles, the behavior sets those roles take, an
//! [`ApplyPolicy`] and a set of named triggers. A [`Context`] is one run of
//! that scenario with concrete players bound to the roles.
//!
//! # Lifecycle
//!
//! Construction pairs the supplied players with the declared roles in
//! declaration order. With [`ApplyPolicy::OnInit`] the roles are applied
//! before the constructor returns and stay applied until the context is
//! dropped. With [`ApplyPolicy::OnTrigger`] (the default) players stay plain
//! until a trigger runs:
//!
//! 1. roles are applied for every binding
//! 2. the trigger body runs against the role-players
//! 3. roles are removed, whether the body succeeded, failed or panicked
//! 4. the body's result, including its original error, is returned
//!
//! Triggers take `&mut Context` while bodies only see `&Context`, so a body
//! cannot start another trigger on the same context.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use troupe_core::behavior::BehaviorSet;
//! use troupe_core::context::{ApplyPolicy, ContextClass};
//!
//! let greeting = ContextClass::builder("Greeting")
//!     .role(
//!         "host",
//!         BehaviorSet::facade("Host").define("welcome", |call, args| {
//!             let guest = call.send("guest", "name", &[])?;
//!             Ok(json!(format!("welcome {}, {}", guest.as_str().unwrap_or("?"), args.len())))
//!         }),
//!     )
//!     .plain_role("guest")
//!     .apply(ApplyPolicy::OnTrigger)
//!     .trigger("greet", |ctx, _| ctx.send("host", "welcome", &[]))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(greeting.role_names().count(), 2);
//! assert_eq!(greeting.triggers().collect::<Vec<_>>(), ["greet"]);
//! assert!(greeting.instantiate(Vec::new()).is_err());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::behavior::{BehaviorKind, BehaviorRegistry, BehaviorSet};
use crate::casting;
use crate::error::{RoleError, RoleResult};
use crate::negotiator::NegotiatorLedger;
use crate::player::{downcast_player, same_player, Player, PlayerRef};
use crate::role::{BehaviorSetId, ContextId, RoleName};
use crate::role_map::RoleMap;

// =============================================================================
// Declarations
// =============================================================================

/// When a context's roles become active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyPolicy {
    /// Roles are applied during construction and stay applied.
    OnInit,
    /// Roles are applied around each trigger call only.
    #[default]
    OnTrigger,
}

impl fmt::Display for ApplyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnInit => write!(f, "on_init"),
            Self::OnTrigger => write!(f, "on_trigger"),
        }
    }
}

/// Serializable declaration of one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDeclaration {
    /// The role name.
    pub name: RoleName,
    /// Behavior set identifier; derived from the role name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<BehaviorSetId>,
}

/// Serializable declaration of a context class, without trigger bodies.
///
/// # Example
///
/// ```
/// use troupe_core::context::{ApplyPolicy, ContextDeclaration};
///
/// let decl: ContextDeclaration = serde_json::from_str(r#"{
///     "name": "Transfer",
///     "roles": [{ "name": "source" }, { "name": "destination", "behavior": "Payee" }]
/// }"#).unwrap();
///
/// assert_eq!(decl.apply, ApplyPolicy::OnTrigger);
/// assert_eq!(decl.roles.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextDeclaration {
    /// Name of the context class.
    pub name: String,
    /// When roles become active.
    #[serde(default)]
    pub apply: ApplyPolicy,
    /// Roles in declaration order.
    pub roles: Vec<RoleDeclaration>,
}

/// Body of a trigger: the interaction logic run against the role-players.
pub type TriggerBody = Arc<dyn Fn(&Context, &[Value]) -> RoleResult<Value> + Send + Sync>;

#[derive(Debug, Clone)]
struct RoleSlot {
    name: RoleName,
    behavior: BehaviorSetId,
}

// =============================================================================
// Context Class
// =============================================================================

/// Declaration of an interaction scenario, shared by all of its contexts.
pub struct ContextClass {
    name: String,
    policy: ApplyPolicy,
    roles: Vec<RoleSlot>,
    behaviors: BehaviorRegistry,
    triggers: BTreeMap<String, TriggerBody>,
}

impl ContextClass {
    /// Starts declaring a context class.
    #[must_use]
    pub fn builder(name: &str) -> ContextClassBuilder {
        ContextClassBuilder::new(name)
    }

    /// Builds a context class from a serialized declaration.
    ///
    /// Role behavior identifiers are looked up in `behaviors` at apply time;
    /// roles whose identifier is not registered pass through unmodified.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for duplicate role or trigger names.
    pub fn from_declaration<I>(
        declaration: ContextDeclaration,
        behaviors: BehaviorRegistry,
        triggers: I,
    ) -> RoleResult<Arc<Self>>
    where
        I: IntoIterator<Item = (String, TriggerBody)>,
    {
        let mut builder = Self::builder(&declaration.name).apply(declaration.apply);
        builder.behaviors = behaviors;
        for role in declaration.roles {
            builder = match role.behavior {
                Some(id) => builder.role_ref(role.name.as_str(), id),
                None => builder.plain_role(role.name.as_str()),
            };
        }
        builder.triggers.extend(triggers);
        builder.build()
    }

    /// Creates a context of this class; see [`Context::new`].
    ///
    /// # Errors
    ///
    /// Returns [`RoleError::ArityMismatch`] if the player count is wrong.
    pub fn instantiate(self: &Arc<Self>, players: Vec<PlayerRef>) -> RoleResult<Context> {
        Context::new(Arc::clone(self), players)
    }

    /// Name of the class.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// When roles become active.
    #[must_use]
    pub fn policy(&self) -> ApplyPolicy {
        self.policy
    }

    /// Role names in declaration order.
    pub fn role_names(&self) -> impl Iterator<Item = &RoleName> {
        self.roles.iter().map(|slot| &slot.name)
    }

    /// Number of declared roles.
    #[must_use]
    pub fn role_count(&self) -> usize {
        self.roles.len()
    }

    /// Trigger names in sorted order.
    pub fn triggers(&self) -> impl Iterator<Item = &str> {
        self.triggers.keys().map(String::as_str)
    }

    /// True if a trigger named `name` is declared.
    #[must_use]
    pub fn has_trigger(&self, name: &str) -> bool {
        self.triggers.contains_key(name)
    }

    /// The behavior set registered under `id`.
    #[must_use]
    pub fn behavior_for(&self, id: &BehaviorSetId) -> Option<&Arc<BehaviorSet>> {
        self.behaviors.get(id)
    }

    /// The registry of behavior sets available to this class.
    #[must_use]
    pub fn behaviors(&self) -> &BehaviorRegistry {
        &self.behaviors
    }

    /// The serializable part of this class.
    #[must_use]
    pub fn declaration(&self) -> ContextDeclaration {
        ContextDeclaration {
            name: self.name.clone(),
            apply: self.policy,
            roles: self
                .roles
                .iter()
                .map(|slot| RoleDeclaration {
                    name: slot.name.clone(),
                    behavior: Some(slot.behavior.clone()),
                })
                .collect(),
        }
    }

    fn trigger_body(&self, name: &str) -> Option<&TriggerBody> {
        self.triggers.get(name)
    }
}

impl fmt::Debug for ContextClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextClass")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("roles", &self.roles)
            .field("behaviors", &self.behaviors)
            .field("triggers", &self.triggers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`ContextClass`].
///
/// Declaration errors are collected and reported by [`build`](Self::build).
pub struct ContextClassBuilder {
    name: String,
    policy: ApplyPolicy,
    roles: Vec<RoleSlot>,
    behaviors: BehaviorRegistry,
    triggers: Vec<(String, TriggerBody)>,
    error: Option<RoleError>,
}

impl ContextClassBuilder {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            policy: ApplyPolicy::default(),
            roles: Vec::new(),
            behaviors: BehaviorRegistry::new(),
            triggers: Vec::new(),
            error: None,
        }
    }

    /// Declares a role played with `behavior`.
    #[must_use]
    pub fn role(mut self, name: &str, behavior: BehaviorSet) -> Self {
        let id = behavior.id().clone();
        self.behaviors.register(behavior);
        self.role_ref(name, id)
    }

    /// Declares a role whose behavior set is looked up by `behavior` at apply time.
    #[must_use]
    pub fn role_ref(mut self, name: &str, behavior: impl Into<BehaviorSetId>) -> Self {
        self.roles.push(RoleSlot {
            name: RoleName::new(name),
            behavior: behavior.into(),
        });
        self
    }

    /// Declares a role under the conventional behavior identifier for `name`.
    ///
    /// The role passes through unmodified unless a set with that identifier
    /// is registered through [`behavior`](Self::behavior).
    #[must_use]
    pub fn plain_role(self, name: &str) -> Self {
        let id = BehaviorSetId::for_role(&RoleName::new(name));
        self.role_ref(name, id)
    }

    /// Declares a role by its textual type (`mixin`, `wrapper`, `interface`).
    ///
    /// The behavior set is named after the role and populated by `define`.
    /// An unrecognized type makes [`build`](Self::build) fail with
    /// [`RoleError::UnknownRoleType`].
    #[must_use]
    pub fn role_typed<F>(mut self, name: &str, kind: &str, define: F) -> Self
    where
        F: FnOnce(BehaviorSet) -> BehaviorSet,
    {
        match kind.parse::<BehaviorKind>() {
            Ok(kind) => {
                let id = BehaviorSetId::for_role(&RoleName::new(name));
                self.role(name, define(BehaviorSet::new(id, kind)))
            }
            Err(err) => {
                self.error.get_or_insert(err);
                self
            }
        }
    }

    /// Registers a behavior set without declaring a role for it.
    #[must_use]
    pub fn behavior(mut self, behavior: BehaviorSet) -> Self {
        self.behaviors.register(behavior);
        self
    }

    /// Sets when roles become active.
    #[must_use]
    pub fn apply(mut self, policy: ApplyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Declares a trigger.
    #[must_use]
    pub fn trigger<F>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(&Context, &[Value]) -> RoleResult<Value> + Send + Sync + 'static,
    {
        self.triggers.push((name.to_string(), Arc::new(body)));
        self
    }

    /// Finishes the declaration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown role type, a repeated
    /// role name or a repeated trigger name.
    pub fn build(self) -> RoleResult<Arc<ContextClass>> {
        if let Some(err) = self.error {
            return Err(err);
        }

        for (index, slot) in self.roles.iter().enumerate() {
            if self.roles[..index].iter().any(|s| s.name == slot.name) {
                return Err(RoleError::DuplicateRole {
                    context: self.name,
                    role: slot.name.to_string(),
                });
            }
        }

        let mut triggers = BTreeMap::new();
        for (name, body) in self.triggers {
            if triggers.contains_key(&name) {
                return Err(RoleError::DuplicateTrigger {
                    context: self.name,
                    trigger: name,
                });
            }
            triggers.insert(name, body);
        }

        Ok(Arc::new(ContextClass {
            name: self.name,
            policy: self.policy,
            roles: self.roles,
            behaviors: self.behaviors,
            triggers,
        }))
    }
}

impl fmt::Debug for ContextClassBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextClassBuilder")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Context
// =============================================================================

/// One run of a [`ContextClass`] with players bound to its roles.
pub struct Context {
    id: ContextId,
    class: Arc<ContextClass>,
    roles: RoleMap,
    negotiators: NegotiatorLedger,
    applied: bool,
}

impl Context {
    /// Binds `players` to the roles of `class`, in declaration order.
    ///
    /// With [`ApplyPolicy::OnInit`] the roles are applied before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`RoleError::ArityMismatch`] unless exactly one player is
    /// supplied per declared role.
    pub fn new(class: Arc<ContextClass>, players: Vec<PlayerRef>) -> RoleResult<Self> {
        let mut context = Self::preinitialize(class);
        context.initialize(players)?;
        context.postinitialize();
        Ok(context)
    }

    fn preinitialize(class: Arc<ContextClass>) -> Self {
        let id = ContextId::next();
        Self {
            id,
            class,
            roles: RoleMap::new(),
            negotiators: NegotiatorLedger::new(id),
            applied: false,
        }
    }

    fn initialize(&mut self, players: Vec<PlayerRef>) -> RoleResult<()> {
        if players.len() != self.class.role_count() {
            return Err(RoleError::ArityMismatch {
                context: self.class.name.clone(),
                expected: self.class.role_count(),
                supplied: players.len(),
            });
        }

        for (slot, player) in self.class.roles.iter().zip(players) {
            self.roles
                .update(slot.name.clone(), slot.behavior.clone(), player);
        }
        Ok(())
    }

    fn postinitialize(&mut self) {
        if self.class.policy == ApplyPolicy::OnInit {
            self.apply_roles();
        }
    }

    /// Process-unique identity of this context.
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// The class this context was created from.
    #[must_use]
    pub fn class(&self) -> &Arc<ContextClass> {
        &self.class
    }

    /// Read-only view of the current bindings.
    #[must_use]
    pub fn roles(&self) -> &RoleMap {
        &self.roles
    }

    /// Roles that currently have a registered negotiator.
    #[must_use]
    pub fn negotiators(&self) -> &NegotiatorLedger {
        &self.negotiators
    }

    /// True while role-players are bound in place of plain players.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        self.applied
    }

    /// The player currently bound to `name`.
    ///
    /// Inside a trigger this is the role-player, not the plain object.
    ///
    /// # Errors
    ///
    /// Returns [`RoleError::UnknownRole`] if no such role is declared.
    pub fn role(&self, name: &str) -> RoleResult<&PlayerRef> {
        self.roles
            .assigned_player(name)
            .ok_or_else(|| RoleError::UnknownRole {
                context: self.class.name.clone(),
                role: name.to_string(),
            })
    }

    /// Downcasts the player currently bound to `name`.
    ///
    /// Returns `None` for unknown roles, or while a wrapper or negotiator
    /// stands in for a player of type `T`.
    #[must_use]
    pub fn role_as<T: Player>(&self, name: &str) -> Option<&T> {
        self.roles.assigned_player(name).and_then(downcast_player::<T>)
    }

    /// Sends `operation` to the player currently bound to `role`.
    ///
    /// # Errors
    ///
    /// Returns [`RoleError::UnknownRole`] for an undeclared role, or whatever
    /// the role-player returns.
    pub fn send(&self, role: &str, operation: &str, args: &[Value]) -> RoleResult<Value> {
        self.role(role)?.call(operation, args, self)
    }

    /// True if `name` is a role of this context currently bound to `candidate`.
    #[must_use]
    pub fn is_role(&self, name: &str, candidate: &PlayerRef) -> bool {
        self.roles
            .assigned_player(name)
            .is_some_and(|player| same_player(player, candidate))
    }

    /// Names of the triggers this context can run.
    pub fn triggers(&self) -> impl Iterator<Item = &str> {
        self.class.triggers()
    }

    /// Runs the trigger `name` with `args`.
    ///
    /// Under [`ApplyPolicy::OnTrigger`] roles are applied first and removed
    /// afterwards, even if the body fails or panics.
    ///
    /// # Errors
    ///
    /// Returns [`RoleError::UnknownTrigger`] for an undeclared trigger, or the
    /// body's own error unchanged.
    pub fn trigger(&mut self, name: &str, args: &[Value]) -> RoleResult<Value> {
        let body = self
            .class
            .trigger_body(name)
            .cloned()
            .ok_or_else(|| RoleError::UnknownTrigger {
                context: self.class.name.clone(),
                trigger: name.to_string(),
            })?;

        let span = tracing::debug_span!(
            "trigger",
            context = %self.class.name,
            id = %self.id,
            trigger = name
        );
        let _entered = span.enter();

        let scope = TriggerScope::enter(self);
        let result = body(scope.context(), args);
        if let Err(err) = &result {
            tracing::warn!(error = %err, "trigger body failed, removing roles");
        }
        drop(scope);
        result
    }

    /// Binds `player` to `role`, returning the previously bound plain player.
    ///
    /// If roles are applied, the old role-player is removed first (discarding
    /// any negotiator) and the new player is cast in its place.
    ///
    /// # Errors
    ///
    /// Returns [`RoleError::UnknownRole`] if no such role is declared.
    pub fn reassign(&mut self, role: &str, player: PlayerRef) -> RoleResult<PlayerRef> {
        let class = Arc::clone(&self.class);
        let applied = self.applied;
        let Some(binding) = self.roles.binding_mut(role) else {
            return Err(RoleError::UnknownRole {
                context: class.name.clone(),
                role: role.to_string(),
            });
        };

        let behavior = class.behavior_for(binding.behavior());
        if applied {
            casting::remove_role(binding, behavior, &mut self.negotiators);
        }
        let previous = binding.rebind(player);
        if applied {
            casting::apply_role(binding, behavior, &mut self.negotiators);
        }
        Ok(previous)
    }

    fn apply_roles(&mut self) {
        if self.applied {
            return;
        }
        let class = Arc::clone(&self.class);
        for binding in self.roles.iter_mut() {
            let behavior = class.behavior_for(binding.behavior());
            casting::apply_role(binding, behavior, &mut self.negotiators);
        }
        self.applied = true;
    }

    fn remove_roles(&mut self) {
        if !self.applied {
            return;
        }
        let class = Arc::clone(&self.class);
        for binding in self.roles.iter_mut() {
            let behavior = class.behavior_for(binding.behavior());
            casting::remove_role(binding, behavior, &mut self.negotiators);
        }
        self.applied = false;
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        // OnInit roles stay applied for the context's lifetime; release mixins
        // cast onto shared players.
        self.remove_roles();
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("class", &self.class.name)
            .field("roles", &self.roles)
            .field("applied", &self.applied)
            .finish()
    }
}

/// Applies roles for the duration of one trigger call.
struct TriggerScope<'a> {
    context: &'a mut Context,
    managed: bool,
}

impl<'a> TriggerScope<'a> {
    fn enter(context: &'a mut Context) -> Self {
        let managed = context.class.policy == ApplyPolicy::OnTrigger;
        if managed {
            context.apply_roles();
        }
        Self { context, managed }
    }

    fn context(&self) -> &Context {
        &*self.context
    }
}

impl Drop for TriggerScope<'_> {
    fn drop(&mut self) {
        if self.managed {
            self.context.remove_roles();
        }
    }
}
