//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Every row type of the sales schema is an entity keyed by its typed id;
/// storage adapters use this to enforce primary-key uniqueness generically.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Ord + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
