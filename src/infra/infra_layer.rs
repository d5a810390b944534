// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "antinuke/antinuke_store.rs"]
pub mod antinuke;
