//! `kbase-core`: knowledge-base foundation types.
//!
//! Identifiers, the entry record and its validation, and the domain error
//! model. No storage or runtime concerns live here.

pub mod entity;
pub mod entry;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use entry::{Entry, EntryDraft, ValidEntry};
pub use error::{DomainError, DomainResult};
pub use id::{EntryId, TenantId};
