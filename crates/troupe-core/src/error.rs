//! Error types for role binding and trigger dispatch.
//!
//! Every fallible operation in the crate returns [`RoleResult`]. Failures
//! raised by trigger bodies or behavior operations travel through
//! [`RoleError::Failed`] untouched, so callers can recover the original
//! error with [`anyhow::Error::downcast_ref`].

use thiserror::Error;

/// Convenience alias for results produced by the engine.
pub type RoleResult<T> = Result<T, RoleError>;

/// Errors raised while declaring contexts, binding players or invoking roles.
#[derive(Debug, Error)]
pub enum RoleError {
    /// A context was constructed with the wrong number of players.
    #[error("context `{context}` declares {expected} roles but was given {supplied} players")]
    ArityMismatch {
        /// Name of the context class.
        context: String,
        /// Number of declared roles.
        expected: usize,
        /// Number of players supplied to the constructor.
        supplied: usize,
    },

    /// A context class declared the same role twice.
    #[error("context `{context}` declares role `{role}` more than once")]
    DuplicateRole {
        /// Name of the context class.
        context: String,
        /// The repeated role name.
        role: String,
    },

    /// A context class declared the same trigger twice.
    #[error("context `{context}` declares trigger `{trigger}` more than once")]
    DuplicateTrigger {
        /// Name of the context class.
        context: String,
        /// The repeated trigger name.
        trigger: String,
    },

    /// A role type string did not name a known behavior kind.
    #[error("unknown role type `{0}` (expected mixin, wrapper or interface)")]
    UnknownRoleType(String),

    /// A role accessor named a role the context does not declare.
    #[error("context `{context}` has no role named `{role}`")]
    UnknownRole {
        /// Name of the context class.
        context: String,
        /// The requested role name.
        role: String,
    },

    /// A trigger was invoked that the context class does not declare.
    #[error("context `{context}` has no trigger named `{trigger}`")]
    UnknownTrigger {
        /// Name of the context class.
        context: String,
        /// The requested trigger name.
        trigger: String,
    },

    /// Neither the player nor the role's behavior set answers the operation.
    #[error("role `{role}` does not support operation `{operation}`")]
    Unsupported {
        /// Role the call was addressed to.
        role: String,
        /// Operation that could not be answered.
        operation: String,
    },

    /// A plain player was asked for an operation it does not define.
    #[error("{player} has no operation `{operation}`")]
    NoMethod {
        /// Type name of the player.
        player: &'static str,
        /// Operation that could not be answered.
        operation: String,
    },

    /// A negotiator was used outside the context that registered it.
    #[error("negotiator for role `{role}` is not registered with this context")]
    Detached {
        /// Role the negotiator was created for.
        role: String,
    },

    /// Failure raised by a trigger body or a behavior operation.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl RoleError {
    /// Builds an [`RoleError::Unsupported`] for the given role and operation.
    pub fn unsupported(role: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            role: role.into(),
            operation: operation.into(),
        }
    }

    /// Builds a [`RoleError::NoMethod`] naming the player's type.
    pub fn no_method<P: ?Sized>(operation: impl Into<String>) -> Self {
        Self::NoMethod {
            player: short_type_name::<P>(),
            operation: operation.into(),
        }
    }

    /// True for errors raised while declaring or constructing a context.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ArityMismatch { .. }
                | Self::DuplicateRole { .. }
                | Self::DuplicateTrigger { .. }
                | Self::UnknownRoleType(_)
        )
    }

    /// True when a call could not be answered by the addressed role or player.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. } | Self::NoMethod { .. })
    }
}

fn short_type_name<P: ?Sized>() -> &'static str {
    let full = std::any::type_name::<P>();
    full.rsplit("::").next().unwrap_or(full)
}
