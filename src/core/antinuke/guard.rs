// Hierarchy guard - decides whether an acting user can be punished at all.
//
// Damage reversal and punishment are gated behind the same eligibility check:
// if the actor is exempt or sits above the bot, the whole incident is
// abandoned with no side effects.

use super::antinuke_models::{ActorRef, GuildAntinukeConfig, GuildSnapshot};
use std::collections::HashSet;

/// Why an actor cannot be punished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligibility {
    /// Guild whitelist, bot-owner set, or the bot itself.
    Exempt,
    /// The actor's top role is at or above the bot's; the bot cannot act.
    AboveHierarchy,
}

pub struct HierarchyGuard {
    /// Bot-wide owner ids, never punishable in any guild.
    global_owners: HashSet<u64>,
}

impl HierarchyGuard {
    pub fn new(global_owners: impl IntoIterator<Item = u64>) -> Self {
        Self {
            global_owners: global_owners.into_iter().collect(),
        }
    }

    /// Does the bot hold what it needs to operate the antinuke in this guild?
    pub fn bot_operational(&self, guild: &GuildSnapshot) -> bool {
        guild.bot_permissions.is_administrator()
    }

    pub fn eligible(
        &self,
        actor: &ActorRef,
        guild: &GuildSnapshot,
        config: &GuildAntinukeConfig,
    ) -> Result<(), Ineligibility> {
        // Never react to our own corrective actions.
        if actor.user_id == guild.bot_user_id {
            return Err(Ineligibility::Exempt);
        }
        if self.global_owners.contains(&actor.user_id) {
            return Err(Ineligibility::Exempt);
        }
        if config.whitelisted.contains(&actor.user_id) {
            return Err(Ineligibility::Exempt);
        }

        match actor.top_role_position {
            Some(position) if position < guild.bot_top_role_position => Ok(()),
            // At or above the bot, or no longer a member we can resolve: the
            // bot must abstain rather than fail every follow-up call.
            _ => Err(Ineligibility::AboveHierarchy),
        }
    }
}
