// Implementations of the antinuke config store.
#![allow(unused_imports)]

pub mod in_memory;
pub mod sqlite_config_store;

// Re-export for convenience
pub use in_memory::InMemoryConfigStore;
pub use sqlite_config_store::SqliteConfigStore;
