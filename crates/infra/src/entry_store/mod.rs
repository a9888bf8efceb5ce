//! Knowledge entry storage: the corpus training consumes.

pub mod file;
pub mod in_memory;
pub mod r#trait;

pub use file::FileEntryStore;
pub use in_memory::InMemoryEntryStore;
pub use r#trait::{EntryStore, EntryStoreError};
