// Discord adapters for the antinuke engine.
// Each concern gets its own file.

pub mod commands;
pub mod events;
pub mod gateway;
