//! Append-only, versioned model artifact storage.

pub mod file;
pub mod in_memory;
pub mod r#trait;

pub use file::FileModelStore;
pub use in_memory::InMemoryModelStore;
pub use r#trait::{ModelStore, ModelStoreError, StoredModel};
