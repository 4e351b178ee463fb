//! Identifier types for roles, behavior sets and context instances.
//!
//! - [`RoleName`]: the name of a role slot, unique within a context class
//! - [`BehaviorSetId`]: the name a behavior set is registered under
//! - [`ContextId`]: process-unique identity of a context instance
//!
//! # Naming Convention
//!
//! When a role declaration does not name its behavior set explicitly, the
//! identifier is derived from the role name with [`BehaviorSetId::for_role`]:
//!
//! ```
//! use troupe_core::role::{BehaviorSetId, RoleName};
//!
//! let role = RoleName::new("source_account");
//! assert_eq!(BehaviorSetId::for_role(&role).as_str(), "SourceAccount");
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// =============================================================================
// Role Name
// =============================================================================

/// Name of a role slot within a context class.
///
/// # Example
///
/// ```
/// use troupe_core::role::RoleName;
///
/// let role: RoleName = "destination".into();
/// assert_eq!(role.as_str(), "destination");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleName(String);

impl RoleName {
    /// Creates a new `RoleName` from a string.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    /// Returns the role name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RoleName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RoleName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<str> for RoleName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for RoleName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

// =============================================================================
// Behavior Set Identifier
// =============================================================================

/// Name under which a [`BehaviorSet`](crate::behavior::BehaviorSet) is registered.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BehaviorSetId(String);

impl BehaviorSetId {
    /// Creates a new `BehaviorSetId` from a string.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }

    /// Derives the conventional identifier for a role.
    ///
    /// Each `_`-separated word of the role name is capitalized and the
    /// separators are dropped, so `source_account` becomes `SourceAccount`.
    #[must_use]
    pub fn for_role(role: &RoleName) -> Self {
        let mut id = String::with_capacity(role.as_str().len());
        for word in role.as_str().split('_').filter(|w| !w.is_empty()) {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                id.extend(first.to_uppercase());
                id.push_str(chars.as_str());
            }
        }
        Self(id)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BehaviorSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BehaviorSetId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for BehaviorSetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// =============================================================================
// Context Identifier
// =============================================================================

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Context`](crate::context::Context) instance.
///
/// Negotiators hold a `ContextId` as their back-reference to the owning
/// context instead of a pointer.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocates the next unused identifier.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw `u64` value of this identifier.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextId({})", self.0)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
