//! Strongly-typed identifiers used across the knowledge base.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a tenant (one bot / workspace; the isolation boundary).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(Uuid);

impl TenantId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
    /// for determinism.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for TenantId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for TenantId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for TenantId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid =
            Uuid::from_str(s.trim()).map_err(|e| DomainError::invalid_id(format!("TenantId: {e}")))?;
        Ok(Self(uuid))
    }
}

/// Identifier of a knowledge entry, unique within its tenant.
///
/// Opaque to the system: callers may supply their own ids on upsert, otherwise
/// a UUIDv7 string is generated. Ids double as file-store keys, so they are
/// restricted to printable characters without path separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Maximum accepted length of a caller-supplied id.
    pub const MAX_LEN: usize = 128;

    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Parse a caller-supplied identifier.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DomainError::invalid_id("EntryId: must not be empty"));
        }
        if raw.len() > Self::MAX_LEN {
            return Err(DomainError::invalid_id(format!(
                "EntryId: longer than {} bytes",
                Self::MAX_LEN
            )));
        }
        if raw
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control())
            || raw == "."
            || raw == ".."
        {
            return Err(DomainError::invalid_id(
                "EntryId: must not contain path separators or control characters",
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for EntryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntryId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for EntryId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_id_round_trips_through_display() {
        let id = TenantId::new();
        let parsed: TenantId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn tenant_id_rejects_garbage() {
        let err = "not-a-uuid".parse::<TenantId>().unwrap_err();
        assert!(matches!(err, DomainError::InvalidId(_)));
    }

    #[test]
    fn generated_entry_ids_are_unique() {
        let a = EntryId::generate();
        let b = EntryId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn entry_id_is_trimmed() {
        let id = EntryId::parse("  faq-1 ").unwrap();
        assert_eq!(id.as_str(), "faq-1");
    }

    #[test]
    fn entry_id_rejects_unsafe_keys() {
        for raw in ["", "   ", "a/b", "a\\b", "..", "line\nbreak"] {
            assert!(EntryId::parse(raw).is_err(), "accepted {raw:?}");
        }
        let long = "x".repeat(EntryId::MAX_LEN + 1);
        assert!(EntryId::parse(&long).is_err());
    }
}

#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: an accepted id is a safe file-store key and parses back to itself.
        #[test]
        fn accepted_ids_are_safe_and_stable(raw in "\\PC{0,140}") {
            if let Ok(id) = EntryId::parse(&raw) {
                prop_assert!(!id.as_str().contains('/'));
                prop_assert!(!id.as_str().contains('\\'));
                prop_assert!(id.as_str().len() <= EntryId::MAX_LEN);
                prop_assert_eq!(EntryId::parse(id.as_str()).unwrap(), id);
            }
        }
    }
}
