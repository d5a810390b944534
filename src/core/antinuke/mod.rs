// Core antinuke module - event classification, gating and punishment logic.

pub mod antinuke_models;
pub mod classifier;
pub mod debounce;
pub mod decider;
pub mod guard;
pub mod service;
pub mod threshold;

pub use antinuke_models::*;
pub use service::{AntinukeService, AuditLogReader, ConfigStore, GuildActions, ModerationLog};
