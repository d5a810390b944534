// Discord layer - commands and event handlers.

#[path = "antinuke/mod.rs"]
pub mod antinuke;

// Re-export command types for convenience
pub use antinuke::commands::{Data, Error};
