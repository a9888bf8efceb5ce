//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Stores rely on this to locate records for in-place replacement.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
