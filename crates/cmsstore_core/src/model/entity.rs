//! Identity and change-tracking contract shared by all cached entities.

use std::fmt::{Debug, Display};
use std::hash::Hash;

/// Entity persisted by a repository and eligible for caching.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Storage identity type.
    type Id: Copy + Eq + Hash + Ord + Debug + Display + Send + Sync + 'static;

    /// Prefix used to build cache keys for this entity type.
    const CACHE_PREFIX: &'static str;

    /// Storage identity, `None` until the entity has been persisted.
    fn id(&self) -> Option<Self::Id>;

    /// Whether any tracked field differs from the last persisted state.
    fn is_dirty(&self) -> bool {
        false
    }

    /// Marks the current state as the persisted baseline.
    fn reset_dirty_properties(&mut self) {}

    fn has_identity(&self) -> bool {
        self.id().is_some()
    }
}
