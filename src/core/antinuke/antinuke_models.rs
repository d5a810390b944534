// Antinuke domain models - data structures for the guild defense engine.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer converts gateway payloads into these snapshots and
// converts `Action`s back into API calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

// ============================================================================
// MODULES & PUNISHMENTS
// ============================================================================

/// The fixed set of guild-damaging behaviors the engine can guard against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleKind {
    ChannelDelete,
    ChannelCreate,
    RoleGive,
    RoleDelete,
    RoleCreate,
    Kick,
    Ban,
    EditRole,
    MassMention,
    Spammer,
    NewAccounts,
    BotAdd,
}

impl ModuleKind {
    pub const ALL: [ModuleKind; 12] = [
        ModuleKind::ChannelDelete,
        ModuleKind::ChannelCreate,
        ModuleKind::RoleGive,
        ModuleKind::RoleDelete,
        ModuleKind::RoleCreate,
        ModuleKind::Kick,
        ModuleKind::Ban,
        ModuleKind::EditRole,
        ModuleKind::MassMention,
        ModuleKind::Spammer,
        ModuleKind::NewAccounts,
        ModuleKind::BotAdd,
    ];

    /// Stable string form, used as the database key.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::ChannelDelete => "channel delete",
            ModuleKind::ChannelCreate => "channel create",
            ModuleKind::RoleGive => "role giving",
            ModuleKind::RoleDelete => "role delete",
            ModuleKind::RoleCreate => "role create",
            ModuleKind::Kick => "kick",
            ModuleKind::Ban => "ban",
            ModuleKind::EditRole => "edit role",
            ModuleKind::MassMention => "mass mention",
            ModuleKind::Spammer => "spammer",
            ModuleKind::NewAccounts => "new accounts",
            ModuleKind::BotAdd => "bot add",
        }
    }

    pub fn parse(s: &str) -> Option<ModuleKind> {
        ModuleKind::ALL.iter().copied().find(|m| m.as_str() == s)
    }

    /// Does `threshold` mean "qualifying events per 60s window" for this
    /// module? (`new accounts` reinterprets it as a minimum account age.)
    pub fn counts_events(&self) -> bool {
        matches!(
            self,
            ModuleKind::ChannelDelete
                | ModuleKind::ChannelCreate
                | ModuleKind::RoleDelete
                | ModuleKind::RoleCreate
                | ModuleKind::RoleGive
                | ModuleKind::Kick
                | ModuleKind::Ban
        )
    }

    /// Join-screening modules punish the joining member itself, so
    /// near-simultaneous events are distinct incidents and must not be
    /// collapsed by the debounce gate.
    pub fn collapses_duplicates(&self) -> bool {
        !matches!(self, ModuleKind::Spammer | ModuleKind::NewAccounts)
    }

    /// Strip makes no sense for modules acting on members who just joined
    /// and hold no roles yet.
    pub fn allows_strip(&self) -> bool {
        !matches!(self, ModuleKind::Spammer | ModuleKind::NewAccounts)
    }

    /// Modules evaluated at member-join time. Their target gets the same
    /// whitelist exemption the actor does.
    pub fn join_screened(&self) -> bool {
        matches!(
            self,
            ModuleKind::Spammer | ModuleKind::NewAccounts | ModuleKind::BotAdd
        )
    }
}

impl std::fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The punitive action a module is configured to take against the actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PunishmentKind {
    Ban,
    Kick,
    Strip,
}

impl PunishmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PunishmentKind::Ban => "ban",
            PunishmentKind::Kick => "kick",
            PunishmentKind::Strip => "strip",
        }
    }

    pub fn parse(s: &str) -> Option<PunishmentKind> {
        match s {
            "ban" => Some(PunishmentKind::Ban),
            "kick" => Some(PunishmentKind::Kick),
            "strip" => Some(PunishmentKind::Strip),
            _ => None,
        }
    }
}

impl std::fmt::Display for PunishmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PERMISSIONS
// ============================================================================

/// A raw Discord permission bitfield.
///
/// Only the bits the danger classifier cares about are named; the full value
/// is kept so reverts can restore a role's exact permission set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Permissions(pub u64);

impl Permissions {
    pub const KICK_MEMBERS: u64 = 1 << 1;
    pub const BAN_MEMBERS: u64 = 1 << 2;
    pub const ADMINISTRATOR: u64 = 1 << 3;
    pub const MANAGE_CHANNELS: u64 = 1 << 4;
    pub const MANAGE_GUILD: u64 = 1 << 5;
    pub const MENTION_EVERYONE: u64 = 1 << 17;
    pub const MANAGE_ROLES: u64 = 1 << 28;
    pub const MANAGE_WEBHOOKS: u64 = 1 << 29;

    const DANGEROUS: u64 = Self::KICK_MEMBERS
        | Self::BAN_MEMBERS
        | Self::ADMINISTRATOR
        | Self::MANAGE_CHANNELS
        | Self::MANAGE_GUILD
        | Self::MENTION_EVERYONE
        | Self::MANAGE_ROLES
        | Self::MANAGE_WEBHOOKS;

    pub fn contains(&self, bits: u64) -> bool {
        self.0 & bits == bits
    }

    /// A role carrying any of these permissions can be used to take over or
    /// damage a guild.
    pub fn is_dangerous(&self) -> bool {
        self.0 & Self::DANGEROUS != 0
    }

    pub fn is_administrator(&self) -> bool {
        self.contains(Self::ADMINISTRATOR)
    }

    pub fn bits(&self) -> u64 {
        self.0
    }
}

// ============================================================================
// SNAPSHOTS
// ============================================================================

/// Guild-level context captured at event time. Recomputed per event, never
/// cached across suspension points.
#[derive(Debug, Clone)]
pub struct GuildSnapshot {
    pub guild_id: u64,
    pub owner_id: u64,
    pub member_count: u64,
    pub bot_user_id: u64,
    pub bot_top_role_position: u16,
    pub bot_permissions: Permissions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoleSnapshot {
    pub role_id: u64,
    pub name: String,
    pub color: u32,
    pub hoist: bool,
    pub managed: bool,
    pub mentionable: bool,
    pub permissions: Permissions,
    pub position: u16,
}

impl RoleSnapshot {
    /// Can the bot add or remove this role from members?
    pub fn assignable_by_bot(&self, guild: &GuildSnapshot) -> bool {
        !self.managed
            && self.role_id != guild.guild_id // @everyone
            && self.position < guild.bot_top_role_position
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Voice,
    Category,
    News,
    Stage,
    Forum,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSnapshot {
    pub channel_id: u64,
    pub name: String,
    pub kind: ChannelKind,
    pub parent_id: Option<u64>,
    pub topic: Option<String>,
    pub nsfw: bool,
    pub position: u16,
}

/// A user acting inside a guild, as much as we could resolve of them.
/// `top_role_position` is `None` when the user is no longer a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorRef {
    pub user_id: u64,
    pub top_role_position: Option<u16>,
}

#[derive(Debug, Clone, Copy)]
pub struct MemberSnapshot {
    pub user_id: u64,
    pub is_bot: bool,
    pub top_role_position: u16,
}

impl MemberSnapshot {
    pub fn actor(&self) -> ActorRef {
        ActorRef {
            user_id: self.user_id,
            top_role_position: Some(self.top_role_position),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct JoinedMember {
    pub user_id: u64,
    pub is_bot: bool,
    pub flagged_spammer: bool,
    pub account_created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct RoleMention {
    pub role_id: u64,
    pub member_count: u64,
}

#[derive(Debug, Clone)]
pub struct MessageSnapshot {
    pub channel_id: u64,
    /// `None` when the message came from a webhook.
    pub author: Option<MemberSnapshot>,
    pub webhook_id: Option<u64>,
    pub mentions_everyone: bool,
    pub role_mentions: Vec<RoleMention>,
}

// ============================================================================
// EVENTS
// ============================================================================

/// Per-event context supplied alongside every `GuildEvent`.
#[derive(Debug, Clone)]
pub struct EventContext {
    pub guild: GuildSnapshot,
    pub observed_at: DateTime<Utc>,
}

/// A gateway event reduced to what the classifier needs.
#[derive(Debug, Clone)]
pub enum GuildEvent {
    ChannelCreated { channel: ChannelSnapshot },
    ChannelDeleted { channel: ChannelSnapshot },
    RoleCreated { role: RoleSnapshot },
    RoleDeleted { role: RoleSnapshot },
    RoleUpdated { before: RoleSnapshot, after: RoleSnapshot },
    RolesGranted {
        member: MemberSnapshot,
        before: Vec<RoleSnapshot>,
        granted: Vec<RoleSnapshot>,
    },
    MemberRemoved { user_id: u64 },
    MemberBanned { user_id: u64 },
    MemberJoined { member: JoinedMember },
    MessagePosted { message: MessageSnapshot },
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Per-guild antinuke configuration row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildAntinukeConfig {
    pub guild_id: u64,
    pub configured: bool,
    /// The only user allowed to change ownership-level settings. Defaults to
    /// the guild owner at setup time, transferable.
    pub owner_id: u64,
    pub admins: BTreeSet<u64>,
    pub whitelisted: BTreeSet<u64>,
    pub log_channel: Option<u64>,
}

impl GuildAntinukeConfig {
    pub fn new(guild_id: u64, owner_id: u64) -> Self {
        Self {
            guild_id,
            configured: true,
            owner_id,
            admins: BTreeSet::new(),
            whitelisted: BTreeSet::new(),
            log_channel: None,
        }
    }

    pub fn is_admin(&self, user_id: u64) -> bool {
        user_id == self.owner_id || self.admins.contains(&user_id)
    }
}

/// One enabled module for a guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRule {
    pub module: ModuleKind,
    pub punishment: PunishmentKind,
    /// Event count per 60s window, or minimum account age in seconds for
    /// `new accounts`. `None` for modules without a threshold concept.
    pub threshold: Option<u32>,
}

// ============================================================================
// AUDIT LOG
// ============================================================================

/// The audit-log action kinds the engine attributes events through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditActionKind {
    ChannelCreate,
    ChannelDelete,
    RoleCreate,
    RoleDelete,
    RoleUpdate,
    MemberRoleUpdate,
    Kick,
    BanAdd,
    BotAdd,
}

/// The single most recent matching audit-log entry. Best-effort attribution,
/// not cryptographic proof of authorship.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub actor: ActorRef,
    pub target_id: Option<u64>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// ACTIONS & OUTCOMES
// ============================================================================

/// A concrete corrective or punitive step executed against the guild.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Ban { user_id: u64, reason: String },
    Kick { user_id: u64, reason: String },
    /// Remove every dangerous assignable role except the booster role.
    StripRoles { user_id: u64, reason: String },
    DeleteChannel { channel_id: u64 },
    RecreateChannel { channel: ChannelSnapshot },
    DeleteRole { role_id: u64 },
    RecreateRole { role: RoleSnapshot },
    RevertRoleMentionable { role_id: u64, mentionable: bool },
    RevertRolePermissions { role_id: u64, permissions: Permissions },
    SetMemberRoles {
        user_id: u64,
        role_ids: Vec<u64>,
        reason: String,
    },
    DeleteWebhook { webhook_id: u64 },
}

impl Action {
    /// Short human-readable form, used in the moderation log embed.
    pub fn describe(&self) -> String {
        match self {
            Action::Ban { user_id, .. } => format!("banned <@{user_id}>"),
            Action::Kick { user_id, .. } => format!("kicked <@{user_id}>"),
            Action::StripRoles { user_id, .. } => {
                format!("stripped dangerous roles from <@{user_id}>")
            }
            Action::DeleteChannel { channel_id } => format!("deleted channel `{channel_id}`"),
            Action::RecreateChannel { channel } => {
                format!("recreated channel `{}`", channel.name)
            }
            Action::DeleteRole { role_id } => format!("deleted role `{role_id}`"),
            Action::RecreateRole { role } => format!("recreated role `{}`", role.name),
            Action::RevertRoleMentionable { role_id, .. } => {
                format!("reverted mentionable flag on role `{role_id}`")
            }
            Action::RevertRolePermissions { role_id, .. } => {
                format!("reverted permissions of role `{role_id}`")
            }
            Action::SetMemberRoles { user_id, .. } => {
                format!("restored roles of <@{user_id}>")
            }
            Action::DeleteWebhook { webhook_id } => format!("deleted webhook `{webhook_id}`"),
        }
    }
}

/// Why an incident stopped short of a full punishment cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    NotConfigured,
    ModuleDisabled,
    NotActionable,
    MissingBotPermissions,
    Unattributed,
    Whitelisted,
    HierarchyProtected,
    BelowThreshold,
    DebounceClaimed,
}

/// What actually happened for one (event, module) pair.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Dropped with no side effects.
    Abandoned(AbandonReason),
    /// Compensating actions ran, but the punishment cycle was gated away by
    /// the threshold counter or the debounce gate.
    Reverted {
        module: ModuleKind,
        compensated: usize,
        gated_by: AbandonReason,
    },
    /// Full cycle: compensation, punishment, optional log post.
    Executed { report: IncidentReport, logged: bool },
}

/// Summary of an executed incident, posted to the guild's log channel.
#[derive(Debug, Clone, PartialEq)]
pub struct IncidentReport {
    pub module: ModuleKind,
    pub actor_id: Option<u64>,
    pub reason: String,
    pub detected_at: DateTime<Utc>,
    /// Descriptions of every attempted action, compensating first.
    pub actions: Vec<String>,
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("antinuke is not configured in this guild")]
    NotConfigured,

    #[error("antinuke is already configured in this guild")]
    AlreadyConfigured,

    #[error("only the antinuke owner can do this")]
    NotOwner,

    #[error("only antinuke admins can do this")]
    NotAdmin,

    #[error("strip cannot be the punishment for the {0} module")]
    StripNotAllowed(ModuleKind),

    #[error("the {0} module is not enabled")]
    ModuleNotEnabled(ModuleKind),
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("gateway error: {0}")]
    Gateway(String),
}

/// Render a second count the way humans read it ("2 days 3 hours").
pub fn format_timespan(total_secs: u64) -> String {
    if total_secs == 0 {
        return "0 seconds".to_string();
    }

    let units = [
        (86_400, "day"),
        (3_600, "hour"),
        (60, "minute"),
        (1, "second"),
    ];

    let mut remaining = total_secs;
    let mut parts = Vec::new();
    for (size, name) in units {
        let count = remaining / size;
        remaining %= size;
        if count > 0 {
            let plural = if count == 1 { "" } else { "s" };
            parts.push(format!("{count} {name}{plural}"));
        }
    }
    parts.join(" ")
}
