//! # Troupe Core
//!
//! Role binding for interaction scenarios.
//!
//! This crate lets a scenario declare the roles its participants play and
//! the behavior each role adds. Ordinary objects are bound to those roles
//! and gain the role's operations only while the scenario runs them.
//!
//! ## Architecture
//!
//! - **Players**: plain objects implementing [`Player`]
//! - **Behavior sets**: named operations added to a player while it plays a role
//! - **Context classes**: ordered roles, an [`ApplyPolicy`] and named triggers
//! - **Contexts**: one run of a class with players bound in a [`RoleMap`]
//!
//! Each role is cast with one of three strategies ([`BehaviorKind`]):
//!
//! - **Mixin**: the player gains the operations itself ([`Castable`])
//! - **Wrapper**: a [`RoleWrapper`] delegates to the player
//! - **Facade**: a [`Negotiator`] stands in and the player is never touched
//!
//! Under [`ApplyPolicy::OnTrigger`] every trigger applies the roles, runs its
//! body and removes the roles again, also when the body fails or panics.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use troupe_core::{ApplyPolicy, BehaviorSet, ContextClass};
//!
//! let transfer = ContextClass::builder("MoneyTransfer")
//!     .role("source", BehaviorSet::wrapper("Source").define("transfer_out", transfer_out))
//!     .role("destination", BehaviorSet::facade("Destination").define("receive", receive))
//!     .trigger("transfer", |ctx, args| ctx.send("source", "transfer_out", args))
//!     .build()?;
//!
//! let mut ctx = transfer.instantiate(vec![checking, savings])?;
//! ctx.trigger("transfer", &[json!(10)])?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod behavior;
pub mod casting;
pub mod context;
pub mod error;
pub mod negotiator;
pub mod player;
pub mod role;
pub mod role_map;

pub use behavior::{BehaviorKind, BehaviorRegistry, BehaviorSet, Operation, RoleCall};
pub use casting::{apply_role, remove_role, CastOutcome, RoleWrapper};
pub use context::{
    ApplyPolicy, Context, ContextClass, ContextClassBuilder, ContextDeclaration, RoleDeclaration,
    TriggerBody,
};
pub use error::{RoleError, RoleResult};
pub use negotiator::{Negotiator, NegotiatorLedger};
pub use player::{downcast_player, same_player, CastSlots, Castable, Player, PlayerRef};
pub use role::{BehaviorSetId, ContextId, RoleName};
pub use role_map::{RoleBinding, RoleMap, RoleOutline};

#[cfg(test)]
mod tests;
